use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::error::GatewayError;

/// Unique code of a payout instruction, sent to gateways as the invoice id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InvoiceCode(String);

impl InvoiceCode {
    pub fn new(code: impl Into<String>) -> Result<Self, GatewayError> {
        let code = code.into();
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err(GatewayError::Validation(
                "InvoiceCode cannot be empty".to_string(),
            ));
        }
        if trimmed.contains('/') {
            return Err(GatewayError::Validation(format!(
                "InvoiceCode cannot contain '/', got: {code}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last `n` characters, or the whole code when shorter.
    pub fn suffix(&self, n: usize) -> &str {
        let count = self.0.chars().count();
        if count <= n {
            return &self.0;
        }
        let start = self
            .0
            .char_indices()
            .nth(count - n)
            .map(|(i, _)| i)
            .unwrap_or(0);
        &self.0[start..]
    }
}

impl TryFrom<String> for InvoiceCode {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<InvoiceCode> for String {
    fn from(code: InvoiceCode) -> Self {
        code.0
    }
}

/// Recipient MSISDN in the local format gateways expect.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Strips a leading `+` and then a leading `country_code`.
    pub fn normalize(raw: &str, country_code: &str) -> Result<Self, GatewayError> {
        let mut number: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        if let Some(rest) = number.strip_prefix('+') {
            number = rest.to_string();
        }
        if !country_code.is_empty()
            && let Some(rest) = number.strip_prefix(country_code)
        {
            number = rest.to_string();
        }
        if number.is_empty() {
            return Err(GatewayError::Validation(
                "recipient phone number is required".to_string(),
            ));
        }
        if !number.chars().all(|c| c.is_ascii_digit()) {
            return Err(GatewayError::Validation(format!(
                "recipient phone number must be numeric, got: {raw}"
            )));
        }
        Ok(Self(number))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
