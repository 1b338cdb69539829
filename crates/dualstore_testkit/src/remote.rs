//! An in-process authoritative remote store.

use async_trait::async_trait;
use dualstore_core::{Attributes, SyncVerb};
use dualstore_sync_engine::{
    HttpResponse, LoopbackServer, RemoteError, RemoteRequest, RemoteResult, RemoteTransport,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
struct Injected {
    verb: Option<SyncVerb>,
    url: Option<String>,
    error: RemoteError,
    once: bool,
}

impl Injected {
    fn matches(&self, request: &RemoteRequest) -> bool {
        self.verb.map_or(true, |verb| verb == request.verb)
            && self.url.as_deref().map_or(true, |url| url == request.url)
    }
}

#[derive(Debug)]
struct Collection {
    entities: BTreeMap<u64, Attributes>,
    next_id: u64,
}

/// A REST-style remote collection held in memory.
///
/// It assigns numeric ids under `id`, answers `create`/`read`/`update`/
/// `delete` on `route` and `route/{id}/`, and can be taken offline or told to
/// fail chosen requests. Use it directly as a [`RemoteTransport`] or behind
/// an [`HttpTransport`](dualstore_sync_engine::HttpTransport) through a
/// [`LoopbackClient`](dualstore_sync_engine::LoopbackClient).
#[derive(Debug)]
pub struct RemoteFixture {
    route: String,
    online: AtomicBool,
    collection: Mutex<Collection>,
    failures: Mutex<VecDeque<Injected>>,
    requests: Mutex<Vec<RemoteRequest>>,
}

impl RemoteFixture {
    /// Creates an empty, online remote collection at `route`.
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into().trim_end_matches('/').to_string(),
            online: AtomicBool::new(true),
            collection: Mutex::new(Collection {
                entities: BTreeMap::new(),
                next_id: 1,
            }),
            failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns the collection route.
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Takes the remote store online or offline.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Returns true if the remote store is online.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Fails the next request with `verb`.
    pub fn fail_next(&self, verb: SyncVerb, error: RemoteError) {
        self.failures.lock().push_back(Injected {
            verb: Some(verb),
            url: None,
            error,
            once: true,
        });
    }

    /// Fails every request to `url` until [`RemoteFixture::clear_failures`].
    pub fn fail_url(&self, url: impl Into<String>, error: RemoteError) {
        self.failures.lock().push_back(Injected {
            verb: None,
            url: Some(url.into()),
            error,
            once: false,
        });
    }

    /// Removes every injected failure.
    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// Sets the id the next create will be assigned.
    pub fn set_next_id(&self, id: u64) {
        self.collection.lock().next_id = id;
    }

    /// Inserts an entity as if another client had created it.
    pub fn seed(&self, attributes: Value) -> u64 {
        let mut collection = self.collection.lock();
        let id = collection.next_id;
        collection.next_id += 1;
        collection.entities.insert(id, strip_id(attributes));
        id
    }

    /// Inserts or replaces an entity under a chosen id.
    pub fn insert(&self, id: u64, attributes: Value) {
        let mut collection = self.collection.lock();
        collection.next_id = collection.next_id.max(id + 1);
        collection.entities.insert(id, strip_id(attributes));
    }

    /// Returns an entity with its id.
    pub fn get(&self, id: u64) -> Option<Value> {
        self.collection
            .lock()
            .entities
            .get(&id)
            .map(|attributes| with_id(id, attributes))
    }

    /// Returns every stored id.
    pub fn ids(&self) -> Vec<u64> {
        self.collection.lock().entities.keys().copied().collect()
    }

    /// Returns the number of stored entities.
    pub fn len(&self) -> usize {
        self.collection.lock().entities.len()
    }

    /// Returns true if no entity is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().clone()
    }

    /// Returns the URL addressing one entity.
    pub fn item_url(&self, id: u64) -> String {
        format!("{}/{}/", self.route, id)
    }

    /// Serves one request.
    pub fn handle_request(&self, request: &RemoteRequest) -> RemoteResult<Value> {
        self.requests.lock().push(request.clone());
        if !self.is_online() {
            return Err(RemoteError::unreachable("connection refused"));
        }
        if let Some(error) = self.take_failure(request) {
            return Err(error);
        }

        let Some(rest) = request.url.strip_prefix(&self.route) else {
            return Err(not_found(&request.url));
        };
        let rest = rest.trim_matches('/');
        let mut collection = self.collection.lock();

        if rest.is_empty() {
            return match request.verb {
                SyncVerb::Read => Ok(Value::Array(
                    collection
                        .entities
                        .iter()
                        .map(|(id, attributes)| with_id(*id, attributes))
                        .collect(),
                )),
                SyncVerb::Create => {
                    let attributes = request_attributes(request)?;
                    let id = collection.next_id;
                    collection.next_id += 1;
                    let created = with_id(id, &attributes);
                    collection.entities.insert(id, attributes);
                    Ok(created)
                }
                SyncVerb::Update | SyncVerb::Delete => Err(method_not_allowed()),
            };
        }

        let Ok(id) = rest.parse::<u64>() else {
            return Err(not_found(&request.url));
        };
        match request.verb {
            SyncVerb::Read => collection
                .entities
                .get(&id)
                .map(|attributes| with_id(id, attributes))
                .ok_or_else(|| not_found(&request.url)),
            SyncVerb::Update => {
                let attributes = request_attributes(request)?;
                let slot = collection
                    .entities
                    .get_mut(&id)
                    .ok_or_else(|| not_found(&request.url))?;
                *slot = attributes;
                Ok(with_id(id, slot))
            }
            SyncVerb::Delete => collection
                .entities
                .remove(&id)
                .map(|_| Value::Null)
                .ok_or_else(|| not_found(&request.url)),
            SyncVerb::Create => Err(method_not_allowed()),
        }
    }

    fn take_failure(&self, request: &RemoteRequest) -> Option<RemoteError> {
        let mut failures = self.failures.lock();
        let index = failures.iter().position(|rule| rule.matches(request))?;
        if failures[index].once {
            failures.remove(index).map(|rule| rule.error)
        } else {
            Some(failures[index].error.clone())
        }
    }
}

fn strip_id(value: Value) -> Attributes {
    match value {
        Value::Object(mut map) => {
            map.shift_remove("id");
            map
        }
        _ => Attributes::new(),
    }
}

fn with_id(id: u64, attributes: &Attributes) -> Value {
    let mut map = Attributes::new();
    map.insert("id".to_string(), json!(id));
    for (name, value) in attributes {
        map.insert(name.clone(), value.clone());
    }
    Value::Object(map)
}

fn request_attributes(request: &RemoteRequest) -> RemoteResult<Attributes> {
    match &request.payload {
        Some(payload @ Value::Object(_)) => Ok(strip_id(payload.clone())),
        _ => Err(RemoteError::Rejected {
            status: 400,
            body: json!({"error": "expected a JSON object"}),
        }),
    }
}

fn not_found(url: &str) -> RemoteError {
    RemoteError::Rejected {
        status: 404,
        body: json!({"error": format!("{url} not found")}),
    }
}

fn method_not_allowed() -> RemoteError {
    RemoteError::Rejected {
        status: 405,
        body: json!({"error": "method not allowed"}),
    }
}

#[async_trait]
impl RemoteTransport for RemoteFixture {
    async fn dispatch(&self, request: RemoteRequest) -> RemoteResult<Value> {
        self.handle_request(&request)
    }

    fn is_connected(&self) -> bool {
        self.is_online()
    }
}

impl LoopbackServer for RemoteFixture {
    fn handle(
        &self,
        method: &str,
        path: &str,
        body: Option<&[u8]>,
    ) -> Result<HttpResponse, String> {
        let verb = match method {
            "POST" => SyncVerb::Create,
            "GET" => SyncVerb::Read,
            "PUT" => SyncVerb::Update,
            "DELETE" => SyncVerb::Delete,
            _ => return Ok(HttpResponse::json(405, &json!({"error": "method not allowed"}))),
        };
        let payload = match body.map(serde_json::from_slice::<Value>).transpose() {
            Ok(payload) => payload,
            Err(e) => return Ok(HttpResponse::json(400, &json!({"error": e.to_string()}))),
        };

        let mut request = RemoteRequest::new(verb, path);
        request.payload = payload;
        match self.handle_request(&request) {
            Ok(Value::Null) => Ok(HttpResponse::new(204, Vec::new())),
            Ok(value) => {
                let status = if verb == SyncVerb::Create { 201 } else { 200 };
                Ok(HttpResponse::json(status, &value))
            }
            Err(RemoteError::Rejected { status, body }) => Ok(HttpResponse::json(status, &body)),
            Err(RemoteError::Unreachable(message)) => Err(message),
            Err(RemoteError::Timeout(limit)) => Err(format!("timed out after {limit:?}")),
            Err(RemoteError::InvalidResponse(message)) => {
                Ok(HttpResponse::json(500, &json!({"error": message})))
            }
        }
    }
}
