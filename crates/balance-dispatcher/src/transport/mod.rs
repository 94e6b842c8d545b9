//! Transport Module
//!
//! Delivery of a request to the machine the dispatcher selected.

pub mod http_forwarder;

use async_trait::async_trait;
use balance_core::MachineEntry;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

pub use http_forwarder::HttpForwarder;

/// An inbound request, detached from the HTTP server that received it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardRequest {
    pub method: String,
    /// Path plus query string, e.g. "/12345678?full=1"
    pub path_and_query: String,
    /// Forwarded as-is, including values that are not valid UTF-8
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ForwardRequest {
    pub fn new(method: impl Into<String>, path_and_query: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path_and_query: path_and_query.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }
}

/// Sends a request to a machine without waiting for a structured response
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Deliver `request` to `machine`; an error means the machine could not
    /// be reached
    async fn forward(&self, machine: &MachineEntry, request: ForwardRequest) -> balance_core::Result<()>;
}
