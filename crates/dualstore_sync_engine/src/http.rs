//! HTTP transport implementation.
//!
//! This module maps sync verbs onto REST calls with JSON bodies.
//! The actual HTTP client is abstracted via a trait to allow different
//! implementations (reqwest, hyper, etc.).

use crate::error::{RemoteError, RemoteResult};
use crate::transport::{RemoteRequest, RemoteTransport};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Creates a response with a JSON body.
    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string().into_bytes())
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
/// An `Err` means no response was received at all (connection refused,
/// DNS failure, reset); any status code the server sends is an `Ok`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends one request.
    async fn send(
        &self,
        method: &'static str,
        url: &str,
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// REST transport over an [`HttpClient`].
///
/// `create` is `POST`, `read` is `GET`, `update` is `PUT` and `delete` is
/// `DELETE`. A 2xx response succeeds with its JSON body (`null` when empty);
/// anything else is [`RemoteError::Rejected`].
pub struct HttpTransport<C: HttpClient> {
    /// Origin prepended to request routes (e.g., "https://api.example.com").
    base_url: String,
    /// HTTP client implementation.
    client: C,
    /// Whether the last call reached the server.
    connected: AtomicBool,
    /// Set by [`HttpTransport::close`].
    closed: AtomicBool,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Closes the transport. Later dispatches fail as unreachable.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write() = Some(err.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }

    fn resolve(&self, route: &str) -> String {
        if route.contains("://") {
            route.to_string()
        } else {
            format!("{}{}", self.base_url.trim_end_matches('/'), route)
        }
    }
}

#[async_trait]
impl<C: HttpClient> RemoteTransport for HttpTransport<C> {
    async fn dispatch(&self, request: RemoteRequest) -> RemoteResult<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RemoteError::unreachable("transport closed"));
        }

        let method = request.verb.http_method();
        let url = self.resolve(&request.url);
        let body = request
            .payload
            .as_ref()
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| RemoteError::invalid_response(format!("failed to encode request: {e}")))?;

        debug!(method, url = %url, "sending request");
        let response = match self.client.send(method, &url, body).await {
            Ok(response) => response,
            Err(e) => {
                warn!(method, url = %url, error = %e, "remote store unreachable");
                self.set_error(&e);
                self.connected.store(false, Ordering::SeqCst);
                return Err(RemoteError::Unreachable(e));
            }
        };

        self.connected.store(true, Ordering::SeqCst);
        if !response.is_success() {
            let message = format!("{method} {url} returned {}", response.status);
            self.set_error(&message);
            return Err(RemoteError::Rejected {
                status: response.status,
                body: parse_body(&response.body).unwrap_or_else(|_| {
                    Value::String(String::from_utf8_lossy(&response.body).into_owned())
                }),
            });
        }

        self.clear_error();
        parse_body(&response.body)
            .map_err(|e| RemoteError::invalid_response(format!("failed to decode response: {e}")))
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
            && self.connected.load(Ordering::SeqCst)
            && self.client.is_healthy()
    }
}

fn parse_body(body: &[u8]) -> Result<Value, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        Ok(Value::Null)
    } else {
        serde_json::from_slice(body)
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles one request addressed to `path`.
    ///
    /// An `Err` simulates a connection failure.
    fn handle(&self, method: &str, path: &str, body: Option<&[u8]>) -> Result<HttpResponse, String>;
}

impl<S: LoopbackServer + ?Sized> LoopbackServer for std::sync::Arc<S> {
    fn handle(
        &self,
        method: &str,
        path: &str,
        body: Option<&[u8]>,
    ) -> Result<HttpResponse, String> {
        (**self).handle(method, path, body)
    }
}

/// A loopback HTTP client that routes requests directly to a server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

#[async_trait]
impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn send(
        &self,
        method: &'static str,
        url: &str,
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse, String> {
        // Strip scheme and authority, keep the path
        let path = match url.find("://") {
            Some(i) => {
                let rest = &url[i + 3..];
                rest.find('/').map_or("/", |j| &rest[j..])
            }
            None => url,
        };
        self.server.handle(method, path, body.as_deref())
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualstore_core::SyncVerb;
    use serde_json::json;

    struct TestClient {
        response: RwLock<Option<Result<HttpResponse, String>>>,
        sent: RwLock<Vec<(String, String, Option<Vec<u8>>)>>,
        healthy: AtomicBool,
    }

    impl TestClient {
        fn new() -> Self {
            Self {
                response: RwLock::new(None),
                sent: RwLock::new(Vec::new()),
                healthy: AtomicBool::new(true),
            }
        }

        fn set_response(&self, resp: Result<HttpResponse, String>) {
            *self.response.write() = Some(resp);
        }

        fn set_healthy(&self, healthy: bool) {
            self.healthy.store(healthy, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl HttpClient for TestClient {
        async fn send(
            &self,
            method: &'static str,
            url: &str,
            body: Option<Vec<u8>>,
        ) -> Result<HttpResponse, String> {
            self.sent
                .write()
                .push((method.to_string(), url.to_string(), body));
            self.response
                .read()
                .clone()
                .unwrap_or_else(|| Err("No response set".into()))
        }

        fn is_healthy(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn transport_creation() {
        let transport = HttpTransport::new("https://api.example.com", TestClient::new());
        assert_eq!(transport.base_url(), "https://api.example.com");
        assert!(transport.is_connected());
    }

    #[tokio::test]
    async fn transport_close() {
        let transport = HttpTransport::new("https://api.example.com", TestClient::new());
        transport.close();
        assert!(!transport.is_connected());

        let result = transport.dispatch(RemoteRequest::read("/todos")).await;
        assert!(matches!(result, Err(RemoteError::Unreachable(_))));
    }

    #[test]
    fn transport_unhealthy_client() {
        let client = TestClient::new();
        client.set_healthy(false);
        let transport = HttpTransport::new("https://api.example.com", client);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn verbs_map_to_methods_and_json() {
        let client = TestClient::new();
        client.set_response(Ok(HttpResponse::json(201, &json!({"id": 42, "name": "a"}))));
        let transport = HttpTransport::new("https://api.example.com/", client);

        let request =
            RemoteRequest::new(SyncVerb::Create, "/todos").with_payload(json!({"name": "a"}));
        let payload = transport.dispatch(request).await.unwrap();
        assert_eq!(payload, json!({"id": 42, "name": "a"}));

        let sent = transport.client().sent.read().clone();
        assert_eq!(sent[0].0, "POST");
        assert_eq!(sent[0].1, "https://api.example.com/todos");
        assert_eq!(sent[0].2.as_deref(), Some(br#"{"name":"a"}"#.as_slice()));
    }

    #[tokio::test]
    async fn empty_body_is_null() {
        let client = TestClient::new();
        client.set_response(Ok(HttpResponse::new(204, Vec::new())));
        let transport = HttpTransport::new("https://api.example.com", client);

        let payload = transport
            .dispatch(RemoteRequest::new(SyncVerb::Delete, "/todos/1/"))
            .await
            .unwrap();
        assert_eq!(payload, Value::Null);
    }

    #[tokio::test]
    async fn error_status_is_rejected() {
        let client = TestClient::new();
        client.set_response(Ok(HttpResponse::json(422, &json!({"error": "name required"}))));
        let transport = HttpTransport::new("https://api.example.com", client);

        let err = transport
            .dispatch(RemoteRequest::new(SyncVerb::Create, "/todos"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RemoteError::Rejected {
                status: 422,
                body: json!({"error": "name required"})
            }
        );
        assert!(transport.is_connected());
        assert!(transport.last_error().is_some());
    }

    #[tokio::test]
    async fn connection_failure_marks_disconnected() {
        let client = TestClient::new();
        client.set_response(Err("connection refused".into()));
        let transport = HttpTransport::new("https://api.example.com", client);

        let err = transport
            .dispatch(RemoteRequest::read("/todos"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(!transport.is_connected());
        assert_eq!(transport.last_error().as_deref(), Some("connection refused"));

        transport
            .client()
            .set_response(Ok(HttpResponse::json(200, &json!([]))));
        transport.dispatch(RemoteRequest::read("/todos")).await.unwrap();
        assert!(transport.is_connected());
        assert!(transport.last_error().is_none());
    }

    #[tokio::test]
    async fn loopback_client_strips_origin() {
        struct Echo;
        impl LoopbackServer for Echo {
            fn handle(
                &self,
                method: &str,
                path: &str,
                _body: Option<&[u8]>,
            ) -> Result<HttpResponse, String> {
                Ok(HttpResponse::json(200, &json!({"method": method, "path": path})))
            }
        }

        let transport = HttpTransport::new("http://loopback", LoopbackClient::new(Echo));
        let payload = transport
            .dispatch(RemoteRequest::new(SyncVerb::Update, "/todos/3/"))
            .await
            .unwrap();
        assert_eq!(payload, json!({"method": "PUT", "path": "/todos/3/"}));
    }
}
