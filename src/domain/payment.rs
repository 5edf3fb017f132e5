use {
    super::error::GatewayError,
    super::id::InvoiceCode,
    super::money::Amount,
    serde::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Reconciled,
    ReconciliationFailed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::Reconciled => "RECONCILED",
            Self::ReconciliationFailed => "RECONCILIATION_FAILED",
        }
    }

    pub fn can_transition_to(&self, next: &PaymentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Accepted)
                | (Self::Pending, Self::Rejected)
                | (Self::Accepted, Self::Reconciled)
                | (Self::Accepted, Self::ReconciliationFailed)
        )
    }

    /// Items a gateway has taken money for, so settlement can be checked.
    pub fn is_believed_paid(&self) -> bool {
        matches!(self, Self::Accepted | Self::Reconciled)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = GatewayError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "ACCEPTED" => Ok(Self::Accepted),
            "REJECTED" => Ok(Self::Rejected),
            "RECONCILED" => Ok(Self::Reconciled),
            "RECONCILIATION_FAILED" => Ok(Self::ReconciliationFailed),
            other => Err(GatewayError::Validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

/// One payout instruction. Created upstream, mutated here with the gateway's
/// answers, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentItem {
    code: InvoiceCode,
    amount: Amount,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payment_response: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reconciliation_response: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}

impl PaymentItem {
    pub fn new(code: InvoiceCode, amount: Amount, phone: impl Into<String>) -> Self {
        Self {
            code,
            amount,
            phone: phone.into(),
            status: PaymentStatus::Pending,
            transaction_id: None,
            payment_response: None,
            reconciliation_response: None,
            last_error: None,
        }
    }

    pub fn code(&self) -> &InvoiceCode {
        &self.code
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn payment_response(&self) -> Option<&serde_json::Value> {
        self.payment_response.as_ref()
    }

    pub fn reconciliation_response(&self) -> Option<&serde_json::Value> {
        self.reconciliation_response.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn transition_status(&mut self, new: PaymentStatus) -> Result<(), GatewayError> {
        if !self.status.can_transition_to(&new) {
            return Err(GatewayError::Validation(format!(
                "invalid status transition for {}: {} → {}",
                self.code, self.status, new
            )));
        }
        self.status = new;
        Ok(())
    }

    /// Gateway confirmed the transfer.
    pub fn record_acceptance(
        &mut self,
        transaction_id: Option<String>,
        response: serde_json::Value,
    ) -> Result<(), GatewayError> {
        self.transition_status(PaymentStatus::Accepted)?;
        self.transaction_id = transaction_id;
        self.payment_response = Some(response);
        self.last_error = None;
        Ok(())
    }

    /// Gateway explicitly declined the transfer.
    pub fn record_rejection(
        &mut self,
        response: serde_json::Value,
        reason: impl Into<String>,
    ) -> Result<(), GatewayError> {
        self.transition_status(PaymentStatus::Rejected)?;
        self.payment_response = Some(response);
        self.last_error = Some(reason.into());
        Ok(())
    }

    /// Keeps the gateway's answer for audit without moving the status.
    pub fn record_payment_response(&mut self, response: serde_json::Value) {
        self.payment_response = Some(response);
    }

    /// Keeps a settlement reply that could not be applied.
    pub fn record_reconciliation_response(&mut self, response: serde_json::Value) {
        self.reconciliation_response = Some(response);
    }

    pub fn record_failure(&mut self, reason: impl Into<String>) {
        self.last_error = Some(reason.into());
    }

    /// Applies a settlement check. A reconciled item only gets its stored
    /// response refreshed, whatever the gateway says now.
    pub fn apply_settlement(&mut self, settlement: &Settlement) -> ReconcileOutcome {
        if !self.status.is_believed_paid() {
            return ReconcileOutcome::Skipped;
        }
        self.reconciliation_response = Some(settlement.raw.clone());

        if self.status == PaymentStatus::Reconciled {
            return ReconcileOutcome::AlreadyReconciled;
        }

        if !settlement.settled {
            return ReconcileOutcome::NotSettled {
                gateway_status: settlement.gateway_status.clone(),
            };
        }

        // A settled reply without an amount counts as zero paid.
        let reported = settlement.amount.unwrap_or(Amount::ZERO);

        if self.amount.matches(reported) {
            if settlement.transaction_id.is_some() {
                self.transaction_id = settlement.transaction_id.clone();
            }
            self.status = PaymentStatus::Reconciled;
            self.last_error = None;
            ReconcileOutcome::Reconciled
        } else {
            let message = format!(
                "Amount mismatch: expected {}, got {}",
                self.amount, reported
            );
            if let Some(serde_json::Value::Object(map)) = self.reconciliation_response.as_mut() {
                map.insert(
                    "error_message".to_string(),
                    serde_json::Value::String(message.clone()),
                );
            }
            self.status = PaymentStatus::ReconciliationFailed;
            self.last_error = Some(message);
            ReconcileOutcome::Mismatch {
                expected: self.amount,
                reported,
            }
        }
    }
}

/// What a gateway reports about one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub settled: bool,
    pub gateway_status: Option<String>,
    pub amount: Option<Amount>,
    pub transaction_id: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Reconciled,
    AlreadyReconciled,
    Mismatch { expected: Amount, reported: Amount },
    NotSettled { gateway_status: Option<String> },
    /// The connector has no settlement lookup.
    Unsupported,
    /// The item was never accepted by a gateway.
    Skipped,
}

impl ReconcileOutcome {
    pub fn is_reconciled(&self) -> bool {
        matches!(self, Self::Reconciled | Self::AlreadyReconciled)
    }
}

/// Per-item result of one dispatch attempt. Consumed by the caller right away.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub item: PaymentItem,
    pub success: bool,
    pub response: Option<serde_json::Value>,
    pub error: Option<String>,
}
