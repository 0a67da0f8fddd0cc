//! # Token Manager
//!
//! OAuth token management for the vacuum cloud.
//! It exchanges account credentials for access tokens and handles automatic
//! refresh before expiration.
//!
//! ## Authentication Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Token Lifecycle                                   │
//! │                                                                         │
//! │  ┌────────────────┐          ┌─────────────────────────────────────┐   │
//! │  │  rovac-bridge  │          │  Cloud OAuth (POST /oauth/token)    │   │
//! │  └───────┬────────┘          └────────────────┬────────────────────┘   │
//! │          │                                    │                         │
//! │          │  1. grant_type=password            │                         │
//! │          │     (email + password, Basic auth) │                         │
//! │          │───────────────────────────────────►│                         │
//! │          │  2. access + refresh token,        │                         │
//! │          │     expires_in                     │                         │
//! │          │◄───────────────────────────────────│                         │
//! │          │                                    │                         │
//! │          │  [Later: within margin of expiry]  │                         │
//! │          │                                    │                         │
//! │          │  3. grant_type=refresh_token       │                         │
//! │          │───────────────────────────────────►│                         │
//! │          │  4. New token pair                 │                         │
//! │          │◄───────────────────────────────────│                         │
//! │          │                                    │                         │
//! │          │  [Refresh rejected?]               │                         │
//! │          │  5. Fall back to password grant    │                         │
//! │          │───────────────────────────────────►│                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Token Storage
//! Tokens live in memory only. A refresh is attempted once; if the cloud
//! rejects it (revoked refresh token), the manager falls straight back to a
//! password grant rather than failing the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::BridgeResult;

/// Default margin before token expiration to trigger refresh (1 minute)
pub const DEFAULT_REFRESH_MARGIN_SECS: u64 = 60;

/// Lifetime assumed when the cloud omits `expires_in` (30 minutes)
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 1800;

// =============================================================================
// Credential
// =============================================================================

/// Token pair held after a successful grant.
#[derive(Debug, Clone)]
pub struct Credential {
    /// The OAuth access token. Doubles as the MQTT password and client ID.
    pub access_token: String,
    /// Refresh token for getting new access tokens.
    pub refresh_token: String,
    /// When the access token expires (local monotonic time).
    pub expires_at: Instant,
}

impl Credential {
    /// Check if the token is expired or about to expire within `margin`.
    pub fn needs_refresh(&self, margin: Duration) -> bool {
        Instant::now() + margin >= self.expires_at
    }

    /// Check if the token is completely expired (no grace period).
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Get remaining valid time.
    pub fn remaining_secs(&self) -> u64 {
        self.expires_at
            .saturating_duration_since(Instant::now())
            .as_secs()
    }
}

/// Raw response of a token grant, before expiry bookkeeping.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until expiry; `None` when the cloud omitted it.
    pub expires_in: Option<u64>,
}

impl TokenGrant {
    fn into_credential(self) -> Credential {
        let lifetime = self.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        Credential {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        }
    }
}

// =============================================================================
// Token Endpoint
// =============================================================================

/// The two OAuth grants the manager needs. Implemented against the real
/// cloud by [`CloudApi`], and by in-memory fakes in tests.
///
/// [`CloudApi`]: crate::cloud::CloudApi
pub trait TokenEndpoint: Send + Sync {
    /// `grant_type=password` with the account credentials.
    fn password_grant(
        &self,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = BridgeResult<TokenGrant>> + Send;

    /// `grant_type=refresh_token`.
    fn refresh_grant(
        &self,
        refresh_token: &str,
    ) -> impl std::future::Future<Output = BridgeResult<TokenGrant>> + Send;
}

// =============================================================================
// Token Manager
// =============================================================================

/// Manages the OAuth credential for one account.
///
/// Cheap to clone; clones share the same credential cache.
pub struct TokenManager<E: TokenEndpoint> {
    endpoint: Arc<E>,
    email: String,
    password: String,
    refresh_margin: Duration,
    credential: Arc<RwLock<Option<Credential>>>,
}

impl<E: TokenEndpoint> Clone for TokenManager<E> {
    fn clone(&self) -> Self {
        TokenManager {
            endpoint: self.endpoint.clone(),
            email: self.email.clone(),
            password: self.password.clone(),
            refresh_margin: self.refresh_margin,
            credential: self.credential.clone(),
        }
    }
}

impl<E: TokenEndpoint> TokenManager<E> {
    /// Creates a new manager. No network traffic happens until the first
    /// [`get_valid_token`](Self::get_valid_token) call.
    pub fn new(endpoint: E, email: String, password: String, refresh_margin: Duration) -> Self {
        TokenManager {
            endpoint: Arc::new(endpoint),
            email,
            password,
            refresh_margin,
            credential: Arc::new(RwLock::new(None)),
        }
    }

    /// Returns a valid access token, authenticating or refreshing as needed.
    ///
    /// ## Flow
    /// 1. If the cached token is outside the refresh margin, return it
    /// 2. If it is within the margin but not expired, try a refresh grant
    /// 3. On refresh failure (or no token at all), run a password grant
    pub async fn get_valid_token(&self) -> BridgeResult<String> {
        // Check current credential state
        {
            let guard = self.credential.read().await;
            if let Some(cred) = guard.as_ref() {
                if !cred.needs_refresh(self.refresh_margin) {
                    debug!(remaining_secs = cred.remaining_secs(), "Using cached token");
                    return Ok(cred.access_token.clone());
                }
            }
        }

        // Need to refresh or authenticate
        let mut guard = self.credential.write().await;

        // Double-check after acquiring write lock
        if let Some(cred) = guard.as_ref() {
            if !cred.needs_refresh(self.refresh_margin) {
                return Ok(cred.access_token.clone());
            }

            // Try to refresh while the old token still works
            if !cred.is_expired() {
                match self.endpoint.refresh_grant(&cred.refresh_token).await {
                    Ok(grant) => {
                        let new_cred = grant.into_credential();
                        info!(
                            expires_in_secs = new_cred.remaining_secs(),
                            "Token refreshed"
                        );
                        let access_token = new_cred.access_token.clone();
                        *guard = Some(new_cred);
                        return Ok(access_token);
                    }
                    Err(e) => {
                        warn!(?e, "Token refresh failed, will re-authenticate");
                    }
                }
            }
        }

        // Need fresh authentication
        let grant = self
            .endpoint
            .password_grant(&self.email, &self.password)
            .await?;
        let new_cred = grant.into_credential();
        info!(
            expires_in_secs = new_cred.remaining_secs(),
            "Authenticated with cloud"
        );
        let access_token = new_cred.access_token.clone();
        *guard = Some(new_cred);

        Ok(access_token)
    }

    /// Drops the cached credential so the next call re-authenticates.
    /// Called when a cloud request comes back 401.
    pub async fn invalidate(&self) {
        *self.credential.write().await = None;
        debug!("Credential invalidated");
    }

    /// Get current credential (without triggering refresh).
    pub async fn current(&self) -> Option<Credential> {
        self.credential.read().await.clone()
    }

    /// Check if we hold a non-expired token.
    pub async fn is_authenticated(&self) -> bool {
        match self.credential.read().await.as_ref() {
            Some(cred) => !cred.is_expired(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fake endpoint that counts grants and hands out sequenced tokens.
    struct FakeEndpoint {
        password_calls: AtomicU32,
        refresh_calls: AtomicU32,
        expires_in: Option<u64>,
        refresh_fails: bool,
    }

    impl FakeEndpoint {
        fn new(expires_in: Option<u64>) -> Self {
            FakeEndpoint {
                password_calls: AtomicU32::new(0),
                refresh_calls: AtomicU32::new(0),
                expires_in,
                refresh_fails: false,
            }
        }
    }

    impl TokenEndpoint for FakeEndpoint {
        async fn password_grant(&self, _email: &str, _password: &str) -> BridgeResult<TokenGrant> {
            let n = self.password_calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(TokenGrant {
                access_token: format!("access-{}", n),
                refresh_token: format!("refresh-{}", n),
                expires_in: self.expires_in,
            })
        }

        async fn refresh_grant(&self, refresh_token: &str) -> BridgeResult<TokenGrant> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if self.refresh_fails {
                return Err(BridgeError::AuthFailed("refresh token revoked".into()));
            }
            Ok(TokenGrant {
                access_token: format!("refreshed-from-{}", refresh_token),
                refresh_token: refresh_token.to_string(),
                expires_in: self.expires_in,
            })
        }
    }

    fn manager(endpoint: FakeEndpoint, margin_secs: u64) -> TokenManager<FakeEndpoint> {
        TokenManager::new(
            endpoint,
            "me@example.com".into(),
            "secret".into(),
            Duration::from_secs(margin_secs),
        )
    }

    #[test]
    fn test_credential_needs_refresh() {
        let cred = Credential {
            access_token: "t".into(),
            refresh_token: "r".into(),
            expires_at: Instant::now() + Duration::from_secs(30),
        };

        // 30s left against a 60s margin: refresh, but not expired
        assert!(cred.needs_refresh(Duration::from_secs(60)));
        assert!(!cred.is_expired());

        // Against a 5s margin it is still comfortably valid
        assert!(!cred.needs_refresh(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_first_call_authenticates() {
        let mgr = manager(FakeEndpoint::new(Some(1800)), 60);
        assert!(!mgr.is_authenticated().await);

        let token = mgr.get_valid_token().await.unwrap();
        assert_eq!(token, "access-1");
        assert!(mgr.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_cached_token_is_reused() {
        let mgr = manager(FakeEndpoint::new(Some(1800)), 60);

        let first = mgr.get_valid_token().await.unwrap();
        let second = mgr.get_valid_token().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(mgr.endpoint.password_calls.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.endpoint.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_token_within_margin_is_refreshed() {
        // 30s lifetime against a 60s margin: always inside the margin,
        // never fully expired at the second call
        let mgr = manager(FakeEndpoint::new(Some(30)), 60);

        let first = mgr.get_valid_token().await.unwrap();
        assert_eq!(first, "access-1");

        let second = mgr.get_valid_token().await.unwrap();
        assert_eq!(second, "refreshed-from-refresh-1");
        assert_eq!(mgr.endpoint.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_falls_back_to_password() {
        let endpoint = FakeEndpoint {
            refresh_fails: true,
            ..FakeEndpoint::new(Some(30))
        };
        let mgr = manager(endpoint, 60);

        let first = mgr.get_valid_token().await.unwrap();
        assert_eq!(first, "access-1");

        // Refresh is attempted, fails, and the password grant takes over
        let second = mgr.get_valid_token().await.unwrap();
        assert_eq!(second, "access-2");
        assert_eq!(mgr.endpoint.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.endpoint.password_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reauth() {
        let mgr = manager(FakeEndpoint::new(Some(1800)), 60);

        let first = mgr.get_valid_token().await.unwrap();
        mgr.invalidate().await;
        assert!(!mgr.is_authenticated().await);

        let second = mgr.get_valid_token().await.unwrap();
        assert_ne!(first, second);
        assert_eq!(mgr.endpoint.password_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_expires_in_uses_default_lifetime() {
        let mgr = manager(FakeEndpoint::new(None), 60);
        mgr.get_valid_token().await.unwrap();

        let cred = mgr.current().await.unwrap();
        // Default lifetime is 30 minutes, well outside the margin
        assert!(cred.remaining_secs() > DEFAULT_TOKEN_LIFETIME_SECS - 10);
    }
}
