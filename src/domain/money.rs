use {
    super::error::GatewayError,
    rust_decimal::{Decimal, prelude::ToPrimitive},
    rust_decimal_macros::dec,
    serde::{Deserialize, Serialize},
    std::{fmt, str::FromStr},
};

/// Absolute tolerance used when comparing a settled amount against the
/// expected one. Absorbs rounding in gateway-side float handling.
pub const AMOUNT_TOLERANCE: Decimal = dec!(0.01);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, GatewayError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(GatewayError::Validation(format!(
                "Amount cannot be negative, got: {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Parses the amount field of a gateway reply. Gateways send it either as
    /// a JSON number or as a string.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, GatewayError> {
        let raw = match value {
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::String(s) => s.trim().to_string(),
            other => {
                return Err(GatewayError::Validation(format!(
                    "amount must be a number or string, got: {other}"
                )));
            }
        };
        let parsed = Decimal::from_str(&raw)
            .or_else(|_| Decimal::from_scientific(&raw))
            .map_err(|e| GatewayError::Validation(format!("unparsable amount {raw:?}: {e}")))?;
        Self::new(parsed)
    }

    /// `####.##` rendering used in request signatures.
    pub fn two_decimals(&self) -> String {
        format!("{:.2}", self.0.round_dp(2))
    }

    /// Whole currency units, as gateways that take integer amounts expect.
    pub fn whole_units(&self) -> Result<i64, GatewayError> {
        self.0
            .trunc()
            .to_i64()
            .ok_or_else(|| GatewayError::Validation(format!("amount out of range: {}", self.0)))
    }

    pub fn matches_within(&self, other: Amount, tolerance: Decimal) -> bool {
        (self.0 - other.0).abs() < tolerance
    }

    pub fn matches(&self, other: Amount) -> bool {
        self.matches_within(other, AMOUNT_TOLERANCE)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = GatewayError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
