//! HTTP plumbing shared by every connector.
//!
//! [`HttpTransport`] abstracts request execution so connectors can be driven
//! by [`MockTransport`] in tests and by the pooled [`ReqwestTransport`] in
//! production. [`Retrying`] adds bounded backoff on transient failures and
//! [`Session`] carries the default headers all workers share.

use crate::domain::{error::GatewayError, gateway::BoxFuture};

pub mod client;
pub mod mock;
pub mod retry;
pub mod session;

pub use client::ReqwestTransport;
pub use mock::{MockCall, MockTransport};
pub use retry::{RetryPolicy, Retrying};
pub use session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }

    /// Safe to repeat without side effects on the gateway.
    pub fn is_idempotent(&self) -> bool {
        matches!(self, Self::Get)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// Cleared for calls whose caller runs its own retry loop.
    pub transport_retry: bool,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            transport_retry: true,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(body),
            transport_retry: true,
        }
    }

    /// Opts out of [`Retrying`] backoff. The request is sent once per call.
    pub fn without_transport_retry(mut self) -> Self {
        self.transport_retry = false;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// URL path with the scheme, authority and query string removed.
    pub fn path(&self) -> &str {
        let rest = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        let path = rest.find('/').map(|i| &rest[i..]).unwrap_or("/");
        path.split('?').next().unwrap_or(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn parse_json(&self) -> Result<serde_json::Value, GatewayError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Parsed body, or the status and raw text when the body is not JSON.
    /// Kept on payment items for audit.
    pub fn audit_json(&self) -> serde_json::Value {
        self.parse_json().unwrap_or_else(
            |_| serde_json::json!({ "http_status": self.status, "body": self.body }),
        )
    }

    /// Turns non-2xx answers into [`GatewayError::Status`].
    pub fn error_for_status(self) -> Result<Self, GatewayError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(GatewayError::Status {
                status: self.status,
                body: self.body,
            })
        }
    }
}

/// Executes HTTP requests. Non-2xx answers are returned as responses, only
/// failures to get an answer at all are errors.
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, GatewayError>>;
}
