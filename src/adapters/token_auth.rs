use {
    super::token::{IssuedToken, TokenIssuer, TokenManager},
    crate::{
        config::GatewayConfig,
        domain::{
            error::GatewayError,
            gateway::{BoxFuture, GatewayConnector},
            id::PhoneNumber,
            money::Amount,
            payment::{PaymentItem, ReconcileOutcome, Settlement},
        },
        infra::http::{HttpRequest, HttpResponse, HttpTransport, Session},
    },
    serde_json::{Value, json},
    std::{sync::Arc, time::Duration},
};

pub const TOKEN_PATH: &str = "/ipg/Ibb/auth/token";
pub const LOOKUP_PATH: &str = "/ipg/Ibb/IoService/customerLookUp";
pub const PAYMENT_PATH: &str = "/ipg/Ibb/IoService/inBoundTransfer";
pub const SETTLEMENT_PATH: &str = "/ipg/Ibb/IoService/trxLookUp";

const SUCCESS_CODE: &str = "200";
const SESSION_EXPIRED_CODE: &str = "401";

const LOOKUP_RETRIES: u32 = 2;
const LOOKUP_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Mobile-money gateway authenticated with a short-lived bearer token.
pub struct TokenAuthConnector {
    config: GatewayConfig,
    session: Arc<Session>,
    tokens: TokenManager,
    lookup_retries: u32,
    lookup_retry_delay: Duration,
}

enum Lookup {
    Found(Option<String>),
    NotFound(Value),
}

impl TokenAuthConnector {
    pub fn new(config: GatewayConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let session = Arc::new(Session::new(transport, config.headers()));
        let issuer = LoginIssuer {
            session: session.clone(),
            url: config.url(TOKEN_PATH),
            login: config.basic_auth_username.clone(),
            password: config.basic_auth_password.clone(),
        };
        let tokens = TokenManager::new(
            Arc::new(issuer),
            session.clone(),
            config.token_lifetime,
            config.token_safety_margin,
        );
        Self {
            config,
            session,
            tokens,
            lookup_retries: LOOKUP_RETRIES,
            lookup_retry_delay: LOOKUP_RETRY_DELAY,
        }
    }

    pub fn with_lookup_retry(mut self, retries: u32, delay: Duration) -> Self {
        self.lookup_retries = retries;
        self.lookup_retry_delay = delay;
        self
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn payment_url(&self) -> String {
        match self.config.endpoint_payment.as_str() {
            "" => self.config.url(PAYMENT_PATH),
            path => self.config.url(path),
        }
    }

    fn settlement_url(&self, item: &PaymentItem) -> String {
        let base = match self.config.endpoint_reconciliation.as_str() {
            "" => SETTLEMENT_PATH,
            path => path,
        };
        self.config.url(&format!("{}/{}", base.trim_end_matches('/'), item.code()))
    }

    #[tracing::instrument(skip_all, fields(invoice = %item.code(), gateway = "token_auth"))]
    async fn dispatch(&self, item: &mut PaymentItem) -> Result<(), GatewayError> {
        let phone = PhoneNumber::normalize(item.phone(), &self.config.country_code)?;
        let amount = item.amount().whole_units()?;

        if self.config.customer_lookup {
            match self.lookup_customer(&phone).await? {
                Lookup::Found(name) => {
                    tracing::debug!(customer = name.as_deref().unwrap_or("-"), "recipient found")
                }
                Lookup::NotFound(data) => {
                    let code = code_of(&data, "statusCode");
                    item.record_rejection(data, "recipient not found")?;
                    return Err(GatewayError::rejected(code.as_deref(), "recipient not found"));
                }
            }
        }

        let body = json!({
            "msisdn": phone.as_str(),
            "transactionID": item.code().as_str(),
            "partner": self.config.partner_name,
            "amount": amount,
            "pin": self.config.partner_pin,
        });

        let token = self.tokens.ensure_fresh().await?;
        let mut response = self
            .authorized(HttpRequest::post_json(self.payment_url(), body.clone()), &token)
            .await?;

        if session_expired(&response) {
            tracing::warn!("gateway session expired, refreshing token and retrying once");
            item.record_payment_response(response.audit_json());
            let token = self.tokens.refresh_after_rejection(&token).await?;
            response = self
                .authorized(HttpRequest::post_json(self.payment_url(), body), &token)
                .await?;
        }

        self.apply_payment_response(item, response)
    }

    fn apply_payment_response(
        &self,
        item: &mut PaymentItem,
        response: HttpResponse,
    ) -> Result<(), GatewayError> {
        if session_expired(&response) {
            item.record_payment_response(response.audit_json());
            return Err(GatewayError::AuthenticationExpired);
        }
        if !response.is_success() {
            item.record_payment_response(response.audit_json());
            return Err(GatewayError::Status {
                status: response.status,
                body: response.body,
            });
        }

        let data = match response.parse_json() {
            Ok(data) => data,
            Err(e) => {
                item.record_payment_response(response.audit_json());
                return Err(e);
            }
        };

        match code_of(&data, "statusCode").as_deref() {
            Some(SUCCESS_CODE) => {
                let transaction_id = text_of(&data, "ibbTransactionID");
                tracing::info!(
                    transaction_id = transaction_id.as_deref().unwrap_or("-"),
                    "payment accepted"
                );
                item.record_acceptance(transaction_id, data)
            }
            Some(code) => {
                let code = code.to_string();
                let message = text_of(&data, "statusDesc").unwrap_or_default();
                tracing::warn!(status = %code, message = %message, "payment rejected");
                item.record_rejection(data, message.clone())?;
                Err(GatewayError::rejected(Some(&code), message))
            }
            None => {
                item.record_payment_response(data);
                Err(GatewayError::Validation(
                    "payment reply carries no statusCode".into(),
                ))
            }
        }
    }

    async fn lookup_customer(&self, phone: &PhoneNumber) -> Result<Lookup, GatewayError> {
        let url = self.config.url(&format!("{LOOKUP_PATH}/{}", phone.as_str()));
        let mut attempt = 0;
        loop {
            let outcome = self
                .session
                .send_bare(HttpRequest::get(url.clone()).without_transport_retry())
                .await
                .and_then(HttpResponse::error_for_status);

            match outcome {
                Ok(response) => {
                    let data = response.parse_json()?;
                    if code_of(&data, "statusCode").as_deref() == Some(SUCCESS_CODE) {
                        return Ok(Lookup::Found(text_of(&data, "customerName")));
                    }
                    tracing::warn!(
                        status = code_of(&data, "statusCode").as_deref().unwrap_or("-"),
                        "customer lookup failed"
                    );
                    return Ok(Lookup::NotFound(data));
                }
                Err(e) if e.is_transient() && attempt < self.lookup_retries => {
                    attempt += 1;
                    tracing::warn!(error = %e, attempt, "customer lookup failed, retrying");
                    tokio::time::sleep(self.lookup_retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    #[tracing::instrument(skip_all, fields(invoice = %item.code(), gateway = "token_auth"))]
    async fn check_settlement(
        &self,
        item: &mut PaymentItem,
    ) -> Result<ReconcileOutcome, GatewayError> {
        if !item.status().is_believed_paid() {
            return Ok(ReconcileOutcome::Skipped);
        }

        let url = self.settlement_url(item);
        let token = self.tokens.ensure_fresh().await?;
        let mut response = self.authorized(HttpRequest::get(url.clone()), &token).await?;
        if session_expired(&response) {
            item.record_reconciliation_response(response.audit_json());
            let token = self.tokens.refresh_after_rejection(&token).await?;
            response = self.authorized(HttpRequest::get(url), &token).await?;
            if session_expired(&response) {
                item.record_reconciliation_response(response.audit_json());
                return Err(GatewayError::AuthenticationExpired);
            }
        }

        let data = response.error_for_status()?.parse_json()?;
        let gateway_status = code_of(&data, "status");
        let settled = gateway_status.as_deref() == Some(SUCCESS_CODE);
        let amount = match (settled, data.get("amount")) {
            (true, Some(value)) => Some(Amount::from_json(value)?),
            _ => None,
        };
        let settlement = Settlement {
            settled,
            gateway_status,
            amount,
            transaction_id: text_of(&data, "ibbTransactionID"),
            raw: data,
        };

        let outcome = item.apply_settlement(&settlement);
        match &outcome {
            ReconcileOutcome::Mismatch { expected, reported } => {
                tracing::error!(%expected, %reported, "settlement amount mismatch")
            }
            ReconcileOutcome::NotSettled { gateway_status } => tracing::warn!(
                status = gateway_status.as_deref().unwrap_or("-"),
                "transaction not settled"
            ),
            other => tracing::info!(outcome = ?other, "settlement checked"),
        }
        Ok(outcome)
    }

    async fn authorized(
        &self,
        mut request: HttpRequest,
        token: &str,
    ) -> Result<HttpResponse, GatewayError> {
        request
            .headers
            .push(("Authorization".to_string(), format!("Bearer {token}")));
        self.session.send(request).await
    }
}

impl GatewayConnector for TokenAuthConnector {
    fn name(&self) -> &'static str {
        "token_auth"
    }

    fn prepare_batch(&self) -> BoxFuture<'_, Result<(), GatewayError>> {
        Box::pin(async move {
            self.tokens.force_refresh().await?;
            Ok(())
        })
    }

    fn send_payment<'a>(
        &'a self,
        item: &'a mut PaymentItem,
    ) -> BoxFuture<'a, Result<(), GatewayError>> {
        Box::pin(async move {
            let result = self.dispatch(item).await;
            if let Err(e) = &result {
                item.record_failure(e.to_string());
            }
            result
        })
    }

    fn reconcile<'a>(
        &'a self,
        item: &'a mut PaymentItem,
    ) -> BoxFuture<'a, Result<ReconcileOutcome, GatewayError>> {
        Box::pin(self.check_settlement(item))
    }
}

/// Token issuance over the login endpoint. Sent without session headers.
struct LoginIssuer {
    session: Arc<Session>,
    url: String,
    login: String,
    password: String,
}

impl TokenIssuer for LoginIssuer {
    fn issue(&self) -> BoxFuture<'_, Result<IssuedToken, GatewayError>> {
        Box::pin(async move {
            let body = json!({ "login": self.login, "password": self.password });
            let data = self
                .session
                .send_bare(HttpRequest::post_json(self.url.clone(), body))
                .await?
                .error_for_status()?
                .parse_json()?;

            let value = text_of(&data, "token")
                .ok_or_else(|| GatewayError::TokenRefresh("no token in issuer reply".into()))?;
            let expires_in = data
                .get("expiresIn")
                .and_then(|v| v.as_u64().or_else(|| v.as_str()?.parse().ok()))
                .map(Duration::from_secs);
            Ok(IssuedToken { value, expires_in })
        })
    }
}

fn session_expired(response: &HttpResponse) -> bool {
    if response.status == 401 {
        return true;
    }
    response
        .parse_json()
        .ok()
        .and_then(|data| code_of(&data, "statusCode"))
        .is_some_and(|code| code == SESSION_EXPIRED_CODE)
}

/// Status codes arrive as strings or numbers depending on the endpoint.
fn code_of(data: &Value, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_of(data: &Value, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
