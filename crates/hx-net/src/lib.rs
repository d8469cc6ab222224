//! hx Networking
//!
//! Request/response types, the [`Transport`] seam the engine sends through,
//! and an async HTTP/1.1 client running on smol.

mod client;
mod http1;
pub mod loader;
mod transport;

pub use client::{ClientConfig, HttpClient, HttpClientBuilder};
pub use loader::{Method, Request};
pub use transport::{ResponseFuture, Transport};
pub use url::Url;

/// HTTP Response
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    /// Build a response from a status and a text body
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into().into_bytes(),
        }
    }

    /// Builder-style header setter
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Check if response is OK (2xx)
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Get header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get body as text (invalid UTF-8 is replaced)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Get body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, NetError> {
        serde_json::from_slice(&self.body).map_err(|e| NetError::Protocol(e.to_string()))
    }
}

/// Network error
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("network error: {0}")]
    Network(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection timed out")]
    ConnectTimeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_helpers() {
        let resp = Response::new(201, "<p>x</p>").with_header("HX-Trigger", "saved");

        assert!(resp.ok());
        assert_eq!(resp.header("hx-trigger"), Some("saved"));
        assert_eq!(resp.text(), "<p>x</p>");
    }

    #[test]
    fn test_response_json() {
        let resp = Response::new(200, r#"{"path": "/a"}"#);
        let value: serde_json::Value = resp.json().unwrap();
        assert_eq!(value["path"], "/a");
    }
}
