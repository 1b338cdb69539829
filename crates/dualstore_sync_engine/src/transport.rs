//! Remote transport abstraction.

use crate::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use dualstore_core::{EntityRecord, SyncVerb};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

/// One verb-dispatched call against the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    /// What to do.
    pub verb: SyncVerb,
    /// Resolved resource URL.
    pub url: String,
    /// Body for `create` and `update`.
    pub payload: Option<Value>,
}

impl RemoteRequest {
    /// Creates a request without a body.
    pub fn new(verb: SyncVerb, url: impl Into<String>) -> Self {
        Self {
            verb,
            url: url.into(),
            payload: None,
        }
    }

    /// Creates a `read` of a whole collection.
    pub fn read(url: impl Into<String>) -> Self {
        Self::new(SyncVerb::Read, url)
    }

    /// Builds the request that sends `record` with `verb`.
    ///
    /// The URL is resolved against `base_route`, and the record's wire
    /// payload is attached when the verb carries a body.
    pub fn for_record(
        record: &EntityRecord,
        verb: SyncVerb,
        base_route: &str,
        remote_id_attribute: &str,
    ) -> Self {
        let request = Self::new(verb, record.url_for_sync(base_route, verb));
        if verb.has_body() {
            request.with_payload(record.to_wire_payload(remote_id_attribute))
        } else {
            request
        }
    }

    /// Attaches a body.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// A remote transport performs request/response calls against the remote store.
///
/// Every dispatch reports exactly one outcome: the response payload, or a
/// [`RemoteError`]. Implementations decide how verbs map onto the wire.
///
/// # Implementors
///
/// - [`MockTransport`] - Scripted responses for testing
/// - [`crate::HttpTransport`] - REST over any [`crate::HttpClient`]
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Performs one call.
    async fn dispatch(&self, request: RemoteRequest) -> RemoteResult<Value>;

    /// Checks if the transport believes the remote store is reachable.
    fn is_connected(&self) -> bool;
}

/// A mock transport for testing.
///
/// Responses are scripted per verb and consumed in order. A verb with no
/// scripted response fails with [`RemoteError::InvalidResponse`].
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    stalled: AtomicBool,
    responses: Mutex<HashMap<SyncVerb, VecDeque<RemoteResult<Value>>>>,
    requests: Mutex<Vec<RemoteRequest>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a new connected mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            stalled: AtomicBool::new(false),
            responses: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queues the outcome of the next `verb` dispatch.
    pub fn push_response(&self, verb: SyncVerb, response: RemoteResult<Value>) {
        self.responses
            .lock()
            .entry(verb)
            .or_default()
            .push_back(response);
    }

    /// Queues a successful response.
    pub fn respond(&self, verb: SyncVerb, payload: Value) {
        self.push_response(verb, Ok(payload));
    }

    /// Queues a failure.
    pub fn fail(&self, verb: SyncVerb, error: RemoteError) {
        self.push_response(verb, Err(error));
    }

    /// Sets the connected state. A disconnected mock fails every dispatch.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Makes every later dispatch hang without ever completing.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    /// Returns every request dispatched so far.
    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().clone()
    }

    /// Returns the requests dispatched with `verb`.
    pub fn requests_for(&self, verb: SyncVerb) -> Vec<RemoteRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|request| request.verb == verb)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RemoteTransport for MockTransport {
    async fn dispatch(&self, request: RemoteRequest) -> RemoteResult<Value> {
        let verb = request.verb;
        self.requests.lock().push(request);

        if !self.is_connected() {
            return Err(RemoteError::unreachable("mock transport is disconnected"));
        }
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let next = self
            .responses
            .lock()
            .get_mut(&verb)
            .and_then(VecDeque::pop_front);
        next.unwrap_or_else(|| {
            Err(RemoteError::invalid_response(format!(
                "no mock {verb} response set"
            )))
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
