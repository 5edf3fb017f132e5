use thiserror::Error;

/// Fatal configuration problems. Raised while resolving an endpoint, never
/// during dispatch.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    MissingField(&'static str),

    #[error("unknown payment gateway connector: {0:?}")]
    UnknownConnector(String),

    #[error("invalid value for {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },

    #[error("reading settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing settings: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("configuration: {0}")]
    Configuration(#[from] ConfigError),

    /// Network failure or timeout. Retried by the transport where the method allows it.
    #[error("transport: {0}")]
    Transport(String),

    #[error("gateway answered HTTP {status}")]
    Status { status: u16, body: String },

    #[error("gateway session expired")]
    AuthenticationExpired,

    #[error("token refresh failed: {0}")]
    TokenRefresh(String),

    /// The gateway explicitly declined the payment. Needs an operator, never retried.
    #[error("rejected by gateway ({}): {message}", code.as_deref().unwrap_or("-"))]
    Rejected {
        code: Option<String>,
        message: String,
    },

    #[error("validation: {0}")]
    Validation(String),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("approval: {0}")]
    Approval(String),
}

impl GatewayError {
    pub fn rejected(code: Option<&str>, message: impl Into<String>) -> Self {
        Self::Rejected {
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    /// Failures worth another attempt in a later pass.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_business_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = GatewayError::Status {
            status: 503,
            body: String::new(),
        };
        assert!(err.is_transient());
        assert!(GatewayError::Transport("timed out".into()).is_transient());
    }

    #[test]
    fn rejections_and_client_errors_are_not_transient() {
        let rejected = GatewayError::rejected(Some("402"), "insufficient funds");
        assert!(!rejected.is_transient());
        assert!(rejected.is_business_rejection());
        assert_eq!(
            rejected.to_string(),
            "rejected by gateway (402): insufficient funds"
        );

        let bad_request = GatewayError::Status {
            status: 400,
            body: "{}".into(),
        };
        assert!(!bad_request.is_transient());
        assert!(!GatewayError::AuthenticationExpired.is_transient());
    }
}
