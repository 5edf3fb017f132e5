use {
    super::{HttpRequest, HttpResponse, HttpTransport, Method},
    crate::domain::{error::GatewayError, gateway::BoxFuture},
    std::time::Duration,
};

/// Idle connections kept per gateway host, sized for a full batch of workers.
pub const POOL_MAX_IDLE_PER_HOST: usize = 30;

/// Production transport over a pooled `reqwest` client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, GatewayError>> {
        Box::pin(self.send_inner(request))
    }
}

impl ReqwestTransport {
    #[tracing::instrument(skip_all, fields(method = request.method.as_str(), path = request.path()))]
    async fn send_inner(&self, request: HttpRequest) -> Result<HttpResponse, GatewayError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(error = %e, "gateway request failed");
            GatewayError::from(e)
        })?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::debug!(status, response_len = body.len(), "gateway request completed");

        Ok(HttpResponse { status, body })
    }
}
