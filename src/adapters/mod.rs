pub mod registry;
pub mod signature_auth;
pub mod token;
pub mod token_auth;

pub use registry::ConnectorRegistry;
pub use signature_auth::SignatureAuthConnector;
pub use token::{TokenIssuer, TokenManager};
pub use token_auth::TokenAuthConnector;
