use {
    super::{HttpRequest, HttpResponse, HttpTransport},
    crate::domain::{error::GatewayError, gateway::BoxFuture},
    parking_lot::Mutex,
    std::{
        collections::{HashMap, VecDeque},
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    },
};

type Handler = Arc<dyn Fn(&HttpRequest) -> Result<HttpResponse, GatewayError> + Send + Sync>;

/// In-memory transport for tests.
///
/// Answers come from FIFO queues keyed by `"{METHOD} {path}"`, falling back to
/// an optional handler closure. Every call is recorded.
///
/// ```ignore
/// let mock = MockTransport::new();
/// mock.add_response(
///     "POST /ipg/Ibb/auth/token",
///     Ok(HttpResponse::json(200, json!({"token": "abcdefghijkl"}))),
/// );
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    responses: Arc<Mutex<HashMap<String, VecDeque<Result<HttpResponse, GatewayError>>>>>,
    handler: Arc<Mutex<Option<Handler>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    latency: Arc<Mutex<Option<Duration>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

/// Record of a call made to the mock transport.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub method: String,
    pub url: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl MockCall {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn key(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an answer for `"{METHOD} {path}"`. Answers for the same key are
    /// returned in FIFO order.
    pub fn add_response(&self, key: &str, response: Result<HttpResponse, GatewayError>) {
        self.responses
            .lock()
            .entry(key.to_string())
            .or_default()
            .push_back(response);
    }

    /// Answers every request no queued response covers.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, GatewayError> + Send + Sync + 'static,
    {
        *self.handler.lock() = Some(Arc::new(handler));
    }

    /// Delay applied to every call before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, key: &str) -> Vec<MockCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.key() == key)
            .cloned()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Highest number of calls observed executing at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn respond(&self, request: HttpRequest) -> Result<HttpResponse, GatewayError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
        };

        let key = format!("{} {}", request.method.as_str(), request.path());
        self.calls.lock().push(MockCall {
            method: request.method.as_str().to_string(),
            url: request.url.clone(),
            path: request.path().to_string(),
            headers: request.headers.clone(),
            body: request.body.clone(),
        });

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let queued = self
            .responses
            .lock()
            .get_mut(&key)
            .and_then(|queue| queue.pop_front());
        if let Some(response) = queued {
            return response;
        }

        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => handler(&request),
            None => Err(GatewayError::Transport(format!(
                "no mock response configured for {key}"
            ))),
        }
    }
}

impl HttpTransport for MockTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, GatewayError>> {
        Box::pin(self.respond(request))
    }
}

/// Decrements the in-flight counter even if the call is dropped mid-way.
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
