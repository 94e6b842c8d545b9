//! HTTP Forwarder
//!
//! Re-issues the inbound request against the selected machine's endpoint.
//! Any HTTP response counts as delivered; what the machine answers is its
//! own business.

use std::time::Duration;

use async_trait::async_trait;
use balance_core::{Error, MachineEntry};
use reqwest::Method;
use tracing::debug;

use super::{ForwardRequest, Forwarder};

#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
}

impl HttpForwarder {
    pub fn new(timeout: Duration) -> balance_core::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidArgument(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    fn url(machine: &MachineEntry, request: &ForwardRequest) -> String {
        let path = if request.path_and_query.starts_with('/') {
            request.path_and_query.clone()
        } else {
            format!("/{}", request.path_and_query)
        };
        format!("{}{}", machine.endpoint.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, machine: &MachineEntry, request: ForwardRequest) -> balance_core::Result<()> {
        let failure = |reason: String| Error::Forwarding {
            machine_id: machine.id.clone(),
            reason,
        };

        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| failure(format!("invalid method {}: {}", request.method, e)))?;
        let url = Self::url(machine, &request);

        let response = self
            .client
            .request(method, &url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| failure(e.to_string()))?;

        debug!("Forwarded to {} ({}): {}", machine.id, url, response.status());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{HeaderMap, Uri};
    use axum::Router;
    use std::sync::{Arc, Mutex};

    use reqwest::header::{HeaderName, HeaderValue};

    type Received = Arc<Mutex<Vec<(String, Option<Vec<u8>>, Bytes)>>>;

    async fn record(State(received): State<Received>, uri: Uri, headers: HeaderMap, body: Bytes) {
        let tag = headers.get("x-request-tag").map(|v| v.as_bytes().to_vec());
        received.lock().unwrap().push((uri.to_string(), tag, body));
    }

    async fn spawn_backend() -> (String, Received) {
        let received: Received = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new().fallback(record).with_state(received.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/", addr), received)
    }

    #[tokio::test]
    async fn test_forward_delivers_request() {
        let (endpoint, received) = spawn_backend().await;
        let machine = MachineEntry::new("m1", endpoint);
        let forwarder = HttpForwarder::new(Duration::from_secs(5)).unwrap();

        let request = ForwardRequest::new("POST", "/12345678?full=1")
            .with_header(HeaderName::from_static("x-request-tag"), HeaderValue::from_static("abc"))
            .with_body("payload");
        forwarder.forward(&machine, request).await.unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, "/12345678?full=1");
        assert_eq!(received[0].1.as_deref(), Some(&b"abc"[..]));
        assert_eq!(received[0].2, Bytes::from("payload"));
    }

    #[tokio::test]
    async fn test_forward_keeps_non_utf8_header_bytes() {
        let (endpoint, received) = spawn_backend().await;
        let machine = MachineEntry::new("m1", endpoint);
        let forwarder = HttpForwarder::new(Duration::from_secs(5)).unwrap();

        let raw = HeaderValue::from_bytes(b"caf\xe9").unwrap();
        let request = ForwardRequest::new("GET", "/").with_header(HeaderName::from_static("x-request-tag"), raw);
        forwarder.forward(&machine, request).await.unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received[0].1.as_deref(), Some(&b"caf\xe9"[..]));
    }

    #[tokio::test]
    async fn test_unreachable_machine_is_forwarding_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let machine = MachineEntry::new("m2", format!("http://{}", addr));
        let forwarder = HttpForwarder::new(Duration::from_secs(2)).unwrap();

        let result = forwarder.forward(&machine, ForwardRequest::new("GET", "/")).await;
        assert!(matches!(result, Err(Error::Forwarding { machine_id, .. }) if machine_id == "m2"));
    }

    #[test]
    fn test_url_joining() {
        let machine = MachineEntry::new("m1", "http://h1:3000/");
        let request = ForwardRequest::new("GET", "health");
        assert_eq!(HttpForwarder::url(&machine, &request), "http://h1:3000/health");
    }
}
