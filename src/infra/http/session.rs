use {
    super::{HttpRequest, HttpResponse, HttpTransport},
    crate::domain::error::GatewayError,
    parking_lot::RwLock,
    std::sync::Arc,
};

/// Shared HTTP session of one connector: a transport plus default headers.
///
/// Headers are copied out under the read lock before each request, so the
/// lock only serializes header mutation against readers and is never held
/// across network I/O.
pub struct Session {
    transport: Arc<dyn HttpTransport>,
    headers: RwLock<Vec<(String, String)>>,
}

impl Session {
    pub fn new(transport: Arc<dyn HttpTransport>, headers: Vec<(String, String)>) -> Self {
        Self {
            transport,
            headers: RwLock::new(headers),
        }
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .read()
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    pub fn set_header(&self, name: &str, value: String) {
        let mut headers = self.headers.write();
        match headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value,
            None => headers.push((name.to_string(), value)),
        }
    }

    /// Sends with the session's default headers. Headers already set on the
    /// request take precedence.
    pub async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse, GatewayError> {
        let defaults = self.headers.read().clone();
        for (name, value) in defaults {
            if request.header(&name).is_none() {
                request.headers.push((name, value));
            }
        }
        self.transport.send(request).await
    }

    /// Sends without any session headers, for calls made before a
    /// credential exists.
    pub async fn send_bare(&self, request: HttpRequest) -> Result<HttpResponse, GatewayError> {
        self.transport.send(request).await
    }

    pub async fn get(&self, url: impl Into<String>) -> Result<HttpResponse, GatewayError> {
        self.send(HttpRequest::get(url)).await
    }

    pub async fn post_json(
        &self,
        url: impl Into<String>,
        body: serde_json::Value,
    ) -> Result<HttpResponse, GatewayError> {
        self.send(HttpRequest::post_json(url, body)).await
    }
}
