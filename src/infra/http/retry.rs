use {
    super::{HttpRequest, HttpResponse, HttpTransport},
    crate::domain::{error::GatewayError, gateway::BoxFuture},
    serde::Deserialize,
    std::time::Duration,
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay, doubled on every retry.
    pub backoff_ms: u64,
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 300,
            retry_statuses: vec![500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn delay(&self, retry: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(1u64 << retry.min(16)))
    }

    fn should_retry(&self, request: &HttpRequest, outcome: &Result<HttpResponse, GatewayError>) -> bool {
        if !request.transport_retry || !request.method.is_idempotent() {
            return false;
        }
        match outcome {
            Ok(response) => self.retry_statuses.contains(&response.status),
            Err(e) => e.is_transient(),
        }
    }
}

/// Transport decorator with bounded exponential backoff. Only idempotent
/// requests are repeated; a payment POST is never sent twice from here.
pub struct Retrying<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: HttpTransport> Retrying<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: HttpTransport> HttpTransport for Retrying<T> {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, GatewayError>> {
        Box::pin(async move {
            let mut retry = 0;
            loop {
                let outcome = self.inner.send(request.clone()).await;
                if retry >= self.policy.max_retries || !self.policy.should_retry(&request, &outcome) {
                    return outcome;
                }
                let delay = self.policy.delay(retry);
                match &outcome {
                    Ok(response) => tracing::warn!(
                        path = request.path(),
                        status = response.status,
                        retry = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        "transient gateway status, retrying"
                    ),
                    Err(e) => tracing::warn!(
                        path = request.path(),
                        error = %e,
                        retry = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        "transient transport error, retrying"
                    ),
                }
                tokio::time::sleep(delay).await;
                retry += 1;
            }
        })
    }
}
