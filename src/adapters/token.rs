//! Bearer-token lifecycle for token-auth gateways.
//!
//! One [`TokenManager`] per connector. Readers take a snapshot under a
//! short read lock; refreshes are serialized by an async mutex and re-check
//! the token after acquiring it, so a crowd of workers hitting an expired
//! token produces a single issuance call.

use {
    crate::{
        domain::{error::GatewayError, gateway::BoxFuture},
        infra::http::Session,
    },
    parking_lot::RwLock,
    std::{
        sync::{
            Arc,
            atomic::{AtomicU64, Ordering},
        },
        time::Duration,
    },
    tokio::{sync::Mutex, time::Instant},
};

/// Shortest string accepted as a bearer token.
pub const MIN_TOKEN_LEN: usize = 8;

const MIN_TTL: Duration = Duration::from_secs(1);

/// What the issuance endpoint handed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub value: String,
    /// Lifetime declared by the issuer, when it declares one.
    pub expires_in: Option<Duration>,
}

/// Performs the unauthenticated token-issuance call.
pub trait TokenIssuer: Send + Sync {
    fn issue(&self) -> BoxFuture<'_, Result<IssuedToken, GatewayError>>;
}

#[derive(Clone, PartialEq, Eq)]
pub struct GatewayToken {
    value: String,
    expires_at: Instant,
}

impl GatewayToken {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl std::fmt::Debug for GatewayToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Unset,
    Valid,
    Expired,
}

pub struct TokenManager {
    issuer: Arc<dyn TokenIssuer>,
    session: Arc<Session>,
    lifetime: Duration,
    safety_margin: Duration,
    token: RwLock<Option<GatewayToken>>,
    refresh_lock: Mutex<()>,
    issued: AtomicU64,
}

impl TokenManager {
    pub fn new(
        issuer: Arc<dyn TokenIssuer>,
        session: Arc<Session>,
        lifetime: Duration,
        safety_margin: Duration,
    ) -> Self {
        Self {
            issuer,
            session,
            lifetime,
            safety_margin,
            token: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            issued: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> TokenState {
        match self.token.read().as_ref() {
            None => TokenState::Unset,
            Some(token) if token.is_valid() => TokenState::Valid,
            Some(_) => TokenState::Expired,
        }
    }

    pub fn current(&self) -> Option<GatewayToken> {
        self.token.read().clone()
    }

    /// Number of tokens installed since construction.
    pub fn issued_count(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// Returns a valid token, refreshing first if there is none or it expired.
    pub async fn ensure_fresh(&self) -> Result<String, GatewayError> {
        if let Some(token) = self.valid_snapshot() {
            return Ok(token);
        }
        self.refresh_unless(|current| current.is_valid()).await
    }

    /// Replaces the token whatever its state. Used once per dispatch batch.
    pub async fn force_refresh(&self) -> Result<String, GatewayError> {
        self.refresh_unless(|_| false).await
    }

    /// Replaces `stale` after the gateway refused it. If another worker
    /// already installed a newer token, that one is returned instead.
    pub async fn refresh_after_rejection(&self, stale: &str) -> Result<String, GatewayError> {
        self.refresh_unless(|current| current.value != stale && current.is_valid())
            .await
    }

    fn valid_snapshot(&self) -> Option<String> {
        self.token
            .read()
            .as_ref()
            .filter(|t| t.is_valid())
            .map(|t| t.value.clone())
    }

    async fn refresh_unless<F>(&self, keep: F) -> Result<String, GatewayError>
    where
        F: Fn(&GatewayToken) -> bool + Send,
    {
        let _guard = self.refresh_lock.lock().await;

        let current = self.token.read().clone();
        if let Some(token) = current.filter(|t| keep(t)) {
            tracing::debug!("token refreshed by another worker");
            return Ok(token.value);
        }

        self.install().await
    }

    /// Must run under `refresh_lock`.
    async fn install(&self) -> Result<String, GatewayError> {
        let issued = self.issuer.issue().await.map_err(|e| {
            tracing::warn!(error = %e, "token issuance failed");
            match e {
                GatewayError::TokenRefresh(_) => e,
                other => GatewayError::TokenRefresh(other.to_string()),
            }
        })?;

        if !is_plausible(&issued.value) {
            tracing::warn!(len = issued.value.len(), "issuer returned an implausible token");
            return Err(GatewayError::TokenRefresh(
                "issuer returned an implausible token".into(),
            ));
        }

        let ttl = issued
            .expires_in
            .unwrap_or(self.lifetime)
            .saturating_sub(self.safety_margin)
            .max(MIN_TTL);

        self.session
            .set_header("Authorization", format!("Bearer {}", issued.value));
        *self.token.write() = Some(GatewayToken {
            value: issued.value.clone(),
            expires_at: Instant::now() + ttl,
        });
        self.issued.fetch_add(1, Ordering::SeqCst);

        tracing::info!(ttl_secs = ttl.as_secs(), "gateway token refreshed");
        Ok(issued.value)
    }
}

fn is_plausible(token: &str) -> bool {
    token.len() >= MIN_TOKEN_LEN && !token.chars().any(char::is_whitespace)
}
