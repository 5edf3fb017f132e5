use {
    crate::{
        config::GatewayConfig,
        domain::{
            error::GatewayError,
            gateway::{BoxFuture, GatewayConnector},
            id::InvoiceCode,
            money::Amount,
            payment::{PaymentItem, ReconcileOutcome},
        },
        infra::http::{HttpRequest, HttpTransport, Session},
    },
    chrono::{Local, NaiveDateTime},
    md5::{Digest, Md5},
    serde_json::{Value, json},
    std::sync::Arc,
};

pub const PAYMENT_PATH: &str = "/api/3rd/customer/transaction/payonbehalf";

const SUCCESS_CODE: &str = "01";
const REQUEST_ID_DIGITS: usize = 15;
const INVOICE_SUFFIX_LEN: usize = 4;

/// Wallet gateway that authenticates every request with an MD5 digest
/// instead of a session credential.
///
/// Payments are a single POST: a lost reply may still have moved money, so
/// nothing here sends the same payment twice.
pub struct SignatureAuthConnector {
    config: GatewayConfig,
    session: Session,
}

/// Per-call request identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestStamp {
    pub request_id: String,
    pub request_date: String,
}

impl RequestStamp {
    /// `request_date` is `yyyyMMddHHmmssfff`. `request_id` is the first four
    /// characters of the partner code followed by a 15-digit
    /// `yyMMddHHmmssfff` timestamp whose tail is the invoice code's last
    /// four characters.
    ///
    /// Only the timestamp down to the ten-second digit survives, so two
    /// invoices sharing their last four characters and stamped within the
    /// same ten-second window get the same `request_id`.
    pub fn new(partner_code: &str, invoice: &InvoiceCode, now: NaiveDateTime) -> Self {
        let prefix: String = partner_code.chars().take(4).collect();
        let suffix = invoice.suffix(INVOICE_SUFFIX_LEN);
        let timestamp = now.format("%y%m%d%H%M%S%3f").to_string();
        let keep = REQUEST_ID_DIGITS.saturating_sub(suffix.chars().count());
        let head: String = timestamp.chars().take(keep).collect();

        Self {
            request_id: format!("{prefix}{head}{suffix}"),
            request_date: now.format("%Y%m%d%H%M%S%3f").to_string(),
        }
    }
}

/// Lowercase hex MD5 of
/// `api_key + request_date + amount(####.##) + partner_code + mobile + request_id`.
pub fn sign(
    api_key: &str,
    stamp: &RequestStamp,
    amount: Amount,
    partner_code: &str,
    mobile: &str,
) -> String {
    let mut hasher = Md5::new();
    hasher.update(api_key.as_bytes());
    hasher.update(stamp.request_date.as_bytes());
    hasher.update(amount.two_decimals().as_bytes());
    hasher.update(partner_code.as_bytes());
    hasher.update(mobile.as_bytes());
    hasher.update(stamp.request_id.as_bytes());
    hex::encode(hasher.finalize())
}

impl SignatureAuthConnector {
    pub fn new(config: GatewayConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let session = Session::new(transport, config.headers());
        Self { config, session }
    }

    fn payment_url(&self) -> String {
        match self.config.endpoint_payment.as_str() {
            "" => self.config.url(PAYMENT_PATH),
            path => self.config.url(path),
        }
    }

    /// Request body for `item`, signed with the configured key.
    pub fn payment_body(
        &self,
        item: &PaymentItem,
        now: NaiveDateTime,
    ) -> Result<Value, GatewayError> {
        let mobile: String = item.phone().chars().filter(|c| !c.is_whitespace()).collect();
        if mobile.is_empty() {
            return Err(GatewayError::Validation(
                "recipient phone number is required".into(),
            ));
        }
        let stamp = RequestStamp::new(&self.config.partner_code, item.code(), now);
        let signature = sign(
            &self.config.api_key,
            &stamp,
            item.amount(),
            &self.config.partner_code,
            &mobile,
        );

        Ok(json!({
            "RequestId": stamp.request_id,
            "RequestDate": stamp.request_date,
            "PartnerCode": self.config.partner_code,
            "DesMobile": mobile,
            "TransAmount": item.amount().whole_units()?,
            "Content": format!("Payment for invoice {}", item.code()),
            "Description": "",
            "Signature": signature,
        }))
    }

    #[tracing::instrument(skip_all, fields(invoice = %item.code(), gateway = "signature_auth"))]
    async fn dispatch(&self, item: &mut PaymentItem) -> Result<(), GatewayError> {
        let body = self.payment_body(item, Local::now().naive_local())?;
        let response = self
            .session
            .send(HttpRequest::post_json(self.payment_url(), body))
            .await?;

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

        let code = data
            .get("ResponseCode")
            .and_then(Value::as_str)
            .map(str::to_string);
        match code.as_deref() {
            Some(SUCCESS_CODE) => {
                let transaction_id = data
                    .get("TransCode")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                tracing::info!(
                    transaction_id = transaction_id.as_deref().unwrap_or("-"),
                    "payment accepted"
                );
                item.record_acceptance(transaction_id, data)
            }
            Some(code) => {
                let message = data
                    .get("ResponseMessage")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                tracing::warn!(response_code = code, message = %message, "payment rejected");
                item.record_rejection(data, message.clone())?;
                Err(GatewayError::rejected(Some(code), message))
            }
            None => {
                item.record_payment_response(data);
                Err(GatewayError::Validation(
                    "payment reply carries no ResponseCode".into(),
                ))
            }
        }
    }
}

impl GatewayConnector for SignatureAuthConnector {
    fn name(&self) -> &'static str {
        "signature_auth"
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

    /// The gateway exposes no settlement lookup.
    fn reconcile<'a>(
        &'a self,
        item: &'a mut PaymentItem,
    ) -> BoxFuture<'a, Result<ReconcileOutcome, GatewayError>> {
        Box::pin(async move {
            tracing::debug!(invoice = %item.code(), "settlement lookup unsupported");
            Ok(ReconcileOutcome::Unsupported)
        })
    }
}
