use {
    super::{signature_auth::SignatureAuthConnector, token_auth::TokenAuthConnector},
    crate::{
        config::{ConnectorKind, GatewayConfig, GatewaySettings, PaymentEndpoint},
        domain::{error::GatewayError, gateway::GatewayConnector},
        infra::http::{HttpTransport, ReqwestTransport, RetryPolicy, Retrying},
    },
    std::{collections::HashMap, sync::Arc},
    tracing::info,
};

/// Connectors resolved at startup, keyed by endpoint name. Engines receive
/// their connector from here instead of locating one at dispatch time.
pub struct ConnectorRegistry {
    connectors: HashMap<String, Arc<dyn GatewayConnector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            connectors: HashMap::new(),
        }
    }

    /// Maps a resolved configuration to its connector variant.
    pub fn build(
        config: GatewayConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Arc<dyn GatewayConnector> {
        match config.connector {
            ConnectorKind::TokenAuth => Arc::new(TokenAuthConnector::new(config, transport)),
            ConnectorKind::SignatureAuth => {
                Arc::new(SignatureAuthConnector::new(config, transport))
            }
        }
    }

    /// Pooled client with the default retry policy and the endpoint's timeout.
    pub fn production_transport(
        config: &GatewayConfig,
    ) -> Result<Arc<dyn HttpTransport>, GatewayError> {
        let client = ReqwestTransport::new(config.timeout)?;
        Ok(Arc::new(Retrying::new(client, RetryPolicy::default())))
    }

    pub fn register(&mut self, name: String, connector: Arc<dyn GatewayConnector>) {
        info!(endpoint = %name, connector = connector.name(), "registering gateway connector");
        self.connectors.insert(name, connector);
    }

    /// Resolves `endpoint` against `settings`, builds its connector over
    /// `transport` and registers it. Fails on incomplete settings.
    pub fn resolve(
        &mut self,
        endpoint: &PaymentEndpoint,
        settings: &GatewaySettings,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Arc<dyn GatewayConnector>, GatewayError> {
        let config = GatewayConfig::resolve(endpoint, settings)?;
        let connector = Self::build(config, transport);
        self.register(endpoint.name.clone(), connector.clone());
        Ok(connector)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn GatewayConnector>> {
        self.connectors.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.connectors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
