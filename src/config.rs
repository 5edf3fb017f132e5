//! Gateway settings: global defaults per endpoint, overlaid with the
//! endpoint's own overrides, resolved once into an immutable [`GatewayConfig`].

use {
    crate::domain::error::ConfigError,
    base64::{Engine as _, engine::general_purpose::STANDARD as BASE64},
    serde::Deserialize,
    serde_json::{Map, Value},
    std::{collections::HashMap, env, fmt, path::Path, str::FromStr, time::Duration},
};

pub const GATEWAYS_FILE_ENV: &str = "PAYOUT_GATEWAYS_FILE";

const DEFAULT_TIMEOUT_SECS: f64 = 30.0;
const DEFAULT_COUNTRY_CODE: &str = "257";
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 60;
const DEFAULT_TOKEN_SAFETY_MARGIN_SECS: u64 = 5;

pub type SettingsMap = Map<String, Value>;

/// Global defaults keyed by endpoint name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct GatewaySettings(HashMap<String, SettingsMap>);

impl GatewaySettings {
    pub fn new(entries: HashMap<String, SettingsMap>) -> Self {
        Self(entries)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Loads the file named by `PAYOUT_GATEWAYS_FILE`, or nothing when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var(GATEWAYS_FILE_ENV) {
            Ok(path) => Self::from_path(path),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn get(&self, endpoint: &str) -> Option<&SettingsMap> {
        self.0.get(endpoint)
    }
}

/// A payment point: its name selects the global defaults, its overrides win
/// field by field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentEndpoint {
    pub name: String,
    #[serde(default)]
    pub overrides: SettingsMap,
}

impl PaymentEndpoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overrides: SettingsMap::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: SettingsMap) -> Self {
        self.overrides = overrides;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthType {
    #[default]
    None,
    Token,
    Basic,
}

impl FromStr for AuthType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "token" => Ok(Self::Token),
            "basic" => Ok(Self::Basic),
            other => Err(ConfigError::InvalidValue {
                field: "payment_gateway_auth_type",
                value: other.to_string(),
            }),
        }
    }
}

/// Statically known connector implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorKind {
    TokenAuth,
    SignatureAuth,
}

impl ConnectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenAuth => "token_auth",
            Self::SignatureAuth => "signature_auth",
        }
    }
}

impl FromStr for ConnectorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "token_auth" | "token" | "ibb" => Ok(Self::TokenAuth),
            "signature_auth" | "signature" | "lumicash" => Ok(Self::SignatureAuth),
            _ => Err(ConfigError::UnknownConnector(s.to_string())),
        }
    }
}

/// Fully resolved settings for one connector instance.
#[derive(Clone)]
#[non_exhaustive]
pub struct GatewayConfig {
    pub endpoint: String,
    pub connector: ConnectorKind,
    pub base_url: String,
    pub endpoint_payment: String,
    pub endpoint_reconciliation: String,
    pub api_key: String,
    pub basic_auth_username: String,
    pub basic_auth_password: String,
    pub auth_type: AuthType,
    pub timeout: Duration,
    pub partner_name: String,
    pub partner_pin: String,
    pub partner_code: String,
    pub country_code: String,
    pub customer_lookup: bool,
    pub token_lifetime: Duration,
    pub token_safety_margin: Duration,
}

impl GatewayConfig {
    pub fn resolve(
        endpoint: &PaymentEndpoint,
        settings: &GatewaySettings,
    ) -> Result<Self, ConfigError> {
        let mut merged = settings.get(&endpoint.name).cloned().unwrap_or_default();
        for (key, value) in &endpoint.overrides {
            merged.insert(key.clone(), value.clone());
        }
        Self::from_map(&endpoint.name, &merged)
    }

    pub fn from_map(endpoint: &str, map: &SettingsMap) -> Result<Self, ConfigError> {
        let connector_name = text(map, "payment_gateway_connector");
        if connector_name.is_empty() {
            return Err(ConfigError::MissingField("payment_gateway_connector"));
        }
        let connector = connector_name.parse::<ConnectorKind>()?;

        let base_url = text(map, "gateway_base_url").trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ConfigError::MissingField("gateway_base_url"));
        }

        let timeout_secs = float(map, "payment_gateway_timeout", DEFAULT_TIMEOUT_SECS)?;
        if !(timeout_secs.is_finite() && timeout_secs > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "payment_gateway_timeout",
                value: timeout_secs.to_string(),
            });
        }

        let country_code = match text(map, "country_code") {
            c if c.is_empty() => DEFAULT_COUNTRY_CODE.to_string(),
            c => c,
        };

        let config = Self {
            endpoint: endpoint.to_string(),
            connector,
            base_url,
            endpoint_payment: text(map, "endpoint_payment"),
            endpoint_reconciliation: text(map, "endpoint_reconciliation"),
            api_key: text(map, "payment_gateway_api_key"),
            basic_auth_username: text(map, "payment_gateway_basic_auth_username"),
            basic_auth_password: text(map, "payment_gateway_basic_auth_password"),
            auth_type: text(map, "payment_gateway_auth_type").parse()?,
            timeout: Duration::from_secs_f64(timeout_secs),
            partner_name: text(map, "partner_name"),
            partner_pin: text(map, "partner_pin"),
            partner_code: text(map, "partner_code"),
            country_code,
            customer_lookup: boolean(map, "customer_lookup", true)?,
            token_lifetime: Duration::from_secs(unsigned(
                map,
                "token_lifetime_secs",
                DEFAULT_TOKEN_LIFETIME_SECS,
            )?),
            token_safety_margin: Duration::from_secs(unsigned(
                map,
                "token_safety_margin_secs",
                DEFAULT_TOKEN_SAFETY_MARGIN_SECS,
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let required: Vec<(&'static str, &str)> = match self.connector {
            ConnectorKind::TokenAuth => vec![
                ("payment_gateway_basic_auth_username", self.basic_auth_username.as_str()),
                ("payment_gateway_basic_auth_password", self.basic_auth_password.as_str()),
                ("partner_name", self.partner_name.as_str()),
                ("partner_pin", self.partner_pin.as_str()),
            ],
            ConnectorKind::SignatureAuth => vec![
                ("payment_gateway_api_key", self.api_key.as_str()),
                ("partner_code", self.partner_code.as_str()),
            ],
        };
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(field));
            }
        }
        if self.auth_type == AuthType::Token && self.api_key.is_empty() {
            return Err(ConfigError::MissingField("payment_gateway_api_key"));
        }
        Ok(())
    }

    /// Default headers for every request, with the Authorization header the
    /// declared auth type calls for.
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        match self.auth_type {
            AuthType::None => {}
            AuthType::Token => {
                headers.push(("Authorization".to_string(), format!("Bearer {}", self.api_key)));
            }
            AuthType::Basic => {
                let credentials = BASE64.encode(format!(
                    "{}:{}",
                    self.basic_auth_username, self.basic_auth_password
                ));
                headers.push(("Authorization".to_string(), format!("Basic {credentials}")));
            }
        }
        headers
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("endpoint", &self.endpoint)
            .field("connector", &self.connector)
            .field("base_url", &self.base_url)
            .field("auth_type", &self.auth_type)
            .field("timeout", &self.timeout)
            .field("partner_name", &self.partner_name)
            .field("partner_code", &self.partner_code)
            .field("customer_lookup", &self.customer_lookup)
            .finish_non_exhaustive()
    }
}

/// Batch dispatch tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub batch_size: usize,
    pub max_workers: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            max_workers: 20,
        }
    }
}

impl DispatchConfig {
    /// Reads `PAYOUT_BATCH_SIZE` and `PAYOUT_MAX_WORKERS`, keeping defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(v) = env_usize("PAYOUT_BATCH_SIZE")? {
            config.batch_size = v;
        }
        if let Some(v) = env_usize("PAYOUT_MAX_WORKERS")? {
            config.max_workers = v;
        }
        Ok(config)
    }

    /// Worker pool size for one batch.
    pub fn workers(&self) -> usize {
        self.batch_size.min(self.max_workers).max(1)
    }
}

fn env_usize(key: &'static str) -> Result<Option<usize>, ConfigError> {
    let Ok(raw) = env::var(key) else {
        return Ok(None);
    };
    match raw.trim().parse::<usize>() {
        Ok(v) if v > 0 => Ok(Some(v)),
        _ => Err(invalid(key, raw)),
    }
}

fn text(map: &SettingsMap, key: &str) -> String {
    match map.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn float(map: &SettingsMap, key: &'static str, default: f64) -> Result<f64, ConfigError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| invalid(key, n.to_string())),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(default),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| invalid(key, s.clone())),
        Some(other) => Err(invalid(key, other.to_string())),
    }
}

fn unsigned(map: &SettingsMap, key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| invalid(key, n.to_string())),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(default),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| invalid(key, s.clone())),
        Some(other) => Err(invalid(key, other.to_string())),
    }
}

fn boolean(map: &SettingsMap, key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(default),
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(invalid(key, s.clone())),
        },
        Some(other) => Err(invalid(key, other.to_string())),
    }
}

fn invalid(field: &'static str, value: String) -> ConfigError {
    ConfigError::InvalidValue { field, value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings() -> GatewaySettings {
        GatewaySettings::from_json_str(
            &json!({
                "mobile": {
                    "payment_gateway_connector": "token_auth",
                    "gateway_base_url": "https://ipg.example.bi/",
                    "payment_gateway_basic_auth_username": "partner",
                    "payment_gateway_basic_auth_password": "secret",
                    "partner_name": "MERANKA",
                    "partner_pin": "1234",
                    "payment_gateway_timeout": 15
                },
                "wallet": {
                    "payment_gateway_connector": "signature_auth",
                    "gateway_base_url": "https://wallet.example.bi",
                    "payment_gateway_api_key": "k3y",
                    "partner_code": "PART01"
                }
            })
            .to_string(),
        )
        .unwrap()
    }

    fn overrides(value: Value) -> SettingsMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = GatewayConfig::resolve(&PaymentEndpoint::new("wallet"), &settings()).unwrap();
        assert_eq!(config.connector, ConnectorKind::SignatureAuth);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.auth_type, AuthType::None);
        assert_eq!(config.endpoint_payment, "");
        assert_eq!(config.country_code, "257");
        assert!(config.customer_lookup);
    }

    #[test]
    fn overrides_win_field_by_field() {
        let endpoint = PaymentEndpoint::new("mobile").with_overrides(overrides(json!({
            "partner_pin": "9999",
            "payment_gateway_timeout": "45"
        })));
        let config = GatewayConfig::resolve(&endpoint, &settings()).unwrap();
        assert_eq!(config.partner_pin, "9999");
        assert_eq!(config.partner_name, "MERANKA");
        assert_eq!(config.timeout, Duration::from_secs(45));
        assert_eq!(config.base_url, "https://ipg.example.bi");
    }

    #[test]
    fn unknown_connector_is_fatal() {
        let endpoint = PaymentEndpoint::new("mobile").with_overrides(overrides(json!({
            "payment_gateway_connector": "payments.gateways.Missing"
        })));
        let err = GatewayConfig::resolve(&endpoint, &settings()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownConnector(_)));
    }

    #[test]
    fn missing_required_fields_are_fatal() {
        let err = GatewayConfig::resolve(&PaymentEndpoint::new("nowhere"), &settings()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("payment_gateway_connector")));

        let endpoint = PaymentEndpoint::new("wallet").with_overrides(overrides(json!({
            "partner_code": ""
        })));
        let err = GatewayConfig::resolve(&endpoint, &settings()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("partner_code")));

        let endpoint = PaymentEndpoint::new("wallet").with_overrides(overrides(json!({
            "gateway_base_url": ""
        })));
        let err = GatewayConfig::resolve(&endpoint, &settings()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("gateway_base_url")));
    }

    #[test]
    fn basic_auth_header_is_base64() {
        let endpoint = PaymentEndpoint::new("mobile").with_overrides(overrides(json!({
            "payment_gateway_auth_type": "basic"
        })));
        let config = GatewayConfig::resolve(&endpoint, &settings()).unwrap();
        let headers = config.headers();
        assert!(headers.contains(&(
            "Authorization".to_string(),
            "Basic cGFydG5lcjpzZWNyZXQ=".to_string()
        )));
        assert!(headers.contains(&("Content-Type".to_string(), "application/json".to_string())));
    }

    #[test]
    fn token_auth_header_uses_api_key() {
        let endpoint = PaymentEndpoint::new("wallet").with_overrides(overrides(json!({
            "payment_gateway_auth_type": "token"
        })));
        let config = GatewayConfig::resolve(&endpoint, &settings()).unwrap();
        assert!(config
            .headers()
            .contains(&("Authorization".to_string(), "Bearer k3y".to_string())));
    }

    #[test]
    fn no_auth_header_by_default() {
        let config = GatewayConfig::resolve(&PaymentEndpoint::new("wallet"), &settings()).unwrap();
        assert!(config.headers().iter().all(|(k, _)| k != "Authorization"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let endpoint = PaymentEndpoint::new("wallet").with_overrides(overrides(json!({
            "payment_gateway_auth_type": "oauth"
        })));
        assert!(GatewayConfig::resolve(&endpoint, &settings()).is_err());

        let endpoint = PaymentEndpoint::new("wallet").with_overrides(overrides(json!({
            "payment_gateway_timeout": "soon"
        })));
        assert!(GatewayConfig::resolve(&endpoint, &settings()).is_err());
    }

    #[test]
    fn debug_output_hides_credentials() {
        let config = GatewayConfig::resolve(&PaymentEndpoint::new("mobile"), &settings()).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret"));
        assert!(!rendered.contains("1234"));
    }

    #[test]
    fn dispatch_workers_capped_by_batch_size() {
        let config = DispatchConfig {
            batch_size: 5,
            max_workers: 20,
        };
        assert_eq!(config.workers(), 5);
        let config = DispatchConfig {
            batch_size: 50,
            max_workers: 8,
        };
        assert_eq!(config.workers(), 8);
    }

    #[test]
    fn settings_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"{"wallet": {"payment_gateway_connector": "lumicash", "gateway_base_url": "https://w", "payment_gateway_api_key": "k", "partner_code": "P1"}}"#,
        )
        .unwrap();

        let settings = GatewaySettings::from_path(file.path()).unwrap();
        let config = GatewayConfig::resolve(&PaymentEndpoint::new("wallet"), &settings).unwrap();
        assert_eq!(config.connector, ConnectorKind::SignatureAuth);

        let missing = GatewaySettings::from_path(file.path().with_extension("absent"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
