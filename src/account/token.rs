//! Session tokens and refresh
//!
//! Each account carries two sessions: an "external" one backing Web API
//! calls and an "internal" web-player session whose token is powerful
//! enough to authorize the receiver application on a cast device. Both
//! share the same guard logic: compare the expiry stamp against the clock
//! with a safety margin, refresh through the session's capability when
//! stale, and replace the token in one swap. Refresh failures surface as
//! `AuthError` and are never retried here; retry policy belongs to the
//! caller.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, warn};

/// Tokens are treated as expired this long before their literal expiry,
/// so a request issued just before the boundary does not race it.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Default web-player token endpoint root
const WEB_PLAYER_BASE_URL: &str = "https://open.spotify.com";

/// Default OAuth token endpoint root
const OAUTH_BASE_URL: &str = "https://accounts.spotify.com";

/// Browser user agent sent on web-player token requests; the endpoint
/// rejects obviously non-browser clients.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/105.0.0.0 Safari/537.36";

/// Token refresh error types
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("stored credentials rejected: {0}")]
    CredentialsExpired(String),

    #[error("token endpoint returned status {0}")]
    Status(u16),

    #[error("token request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

/// An access token with its absolute expiry, in epoch seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    pub access_token: String,
    pub expires_at: u64,
}

impl SessionToken {
    pub fn new(access_token: impl Into<String>, expires_at: u64) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// True once the token is within the safety margin of its expiry
    pub fn is_expired(&self) -> bool {
        epoch_now() + EXPIRY_MARGIN.as_secs() >= self.expires_at
    }
}

fn epoch_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Capability that can mint a fresh session token
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self) -> Result<SessionToken, AuthError>;
}

/// Guarded token state for one session
pub struct Session {
    token: Mutex<Option<SessionToken>>,
    refresher: Box<dyn TokenRefresher>,
}

impl Session {
    pub fn new(refresher: Box<dyn TokenRefresher>) -> Self {
        Self {
            token: Mutex::new(None),
            refresher,
        }
    }

    /// Seed the session with a known token (restored state)
    pub fn with_token(refresher: Box<dyn TokenRefresher>, token: SessionToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
            refresher,
        }
    }

    /// Current token without any freshness guarantee
    pub fn current(&self) -> Option<SessionToken> {
        self.token.lock().clone()
    }

    /// Ensure the token is valid, refreshing when missing or stale.
    /// Safe to call redundantly; a fresh token makes this a no-op.
    pub async fn ensure_valid(&self) -> Result<(), AuthError> {
        {
            let token = self.token.lock();
            if let Some(token) = token.as_ref() {
                if !token.is_expired() {
                    return Ok(());
                }
            }
        }

        debug!("session token missing or stale, refreshing");
        let fresh = self.refresher.refresh().await?;
        *self.token.lock() = Some(fresh);
        Ok(())
    }

    /// Valid access token, refreshing first when needed
    pub async fn token(&self) -> Result<String, AuthError> {
        self.ensure_valid().await?;
        self.current()
            .map(|token| token.access_token)
            .ok_or_else(|| AuthError::InvalidResponse("refresh yielded no token".to_string()))
    }

    /// Valid full token including its expiry stamp
    pub async fn session_token(&self) -> Result<SessionToken, AuthError> {
        self.ensure_valid().await?;
        self.current()
            .ok_or_else(|| AuthError::InvalidResponse("refresh yielded no token".to_string()))
    }
}

// =============================================================================
// Web-player session (cookie exchange)
// =============================================================================

/// Refresher exchanging stored web-player cookies for an access token
pub struct WebPlayerAuth {
    base_url: String,
    client: reqwest::Client,
    sp_dc: String,
    sp_key: String,
}

impl WebPlayerAuth {
    pub fn new(sp_dc: impl Into<String>, sp_key: impl Into<String>) -> Self {
        Self::with_base_url(sp_dc, sp_key, WEB_PLAYER_BASE_URL)
    }

    /// Create with a custom endpoint root (for testing)
    pub fn with_base_url(
        sp_dc: impl Into<String>,
        sp_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            // The endpoint signals expired cookies with a redirect, so
            // redirects must stay visible.
            client: reqwest::Client::builder()
                .redirect(Policy::none())
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            sp_dc: sp_dc.into(),
            sp_key: sp_key.into(),
        }
    }
}

#[async_trait]
impl TokenRefresher for WebPlayerAuth {
    async fn refresh(&self) -> Result<SessionToken, AuthError> {
        let url = format!(
            "{}/get_access_token?reason=transport&productType=web_player",
            self.base_url
        );

        let response = self
            .client
            .get(&url)
            .header("user-agent", BROWSER_USER_AGENT)
            .header(
                "cookie",
                format!("sp_dc={}; sp_key={}", self.sp_dc, self.sp_key),
            )
            .send()
            .await?;

        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get("location")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            warn!("web-player token request redirected to {}", location);
            if location.contains("_authfailed") {
                return Err(AuthError::CredentialsExpired(
                    "sp_dc / sp_key cookies are expired, update them in config".to_string(),
                ));
            }
            return Err(AuthError::Status(status.as_u16()));
        }

        if status != StatusCode::OK {
            return Err(AuthError::Status(status.as_u16()));
        }

        let body: Value = response.json().await?;
        let access_token = body
            .get("accessToken")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AuthError::InvalidResponse("token response without accessToken".to_string())
            })?
            .to_string();
        let expires_ms = body
            .get("accessTokenExpirationTimestampMs")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                AuthError::InvalidResponse("token response without expiration".to_string())
            })?;

        debug!("web-player token refreshed");
        Ok(SessionToken::new(access_token, expires_ms / 1000))
    }
}

// =============================================================================
// OAuth session (refresh-token grant)
// =============================================================================

/// Refresher running the standard refresh-token grant
pub struct OAuthRefresher {
    base_url: String,
    client: reqwest::Client,
    client_id: String,
    refresh_token: String,
}

impl OAuthRefresher {
    pub fn new(client_id: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self::with_base_url(client_id, refresh_token, OAUTH_BASE_URL)
    }

    /// Create with a custom endpoint root (for testing)
    pub fn with_base_url(
        client_id: impl Into<String>,
        refresh_token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            client_id: client_id.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    async fn refresh(&self) -> Result<SessionToken, AuthError> {
        let url = format!("{}/api/token", self.base_url);

        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
                ("client_id", self.client_id.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            return Err(AuthError::CredentialsExpired(
                "refresh token was revoked, re-authorize the account".to_string(),
            ));
        }
        if status != StatusCode::OK {
            return Err(AuthError::Status(status.as_u16()));
        }

        let body: Value = response.json().await?;
        let access_token = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AuthError::InvalidResponse("token response without access_token".to_string())
            })?
            .to_string();
        let expires_in = body
            .get("expires_in")
            .and_then(Value::as_u64)
            .unwrap_or(3600);

        debug!("oauth token refreshed, valid for {}s", expires_in);
        Ok(SessionToken::new(access_token, epoch_now() + expires_in))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct StubRefresher {
        calls: Arc<AtomicU32>,
        lifetime: u64,
    }

    #[async_trait]
    impl TokenRefresher for StubRefresher {
        async fn refresh(&self) -> Result<SessionToken, AuthError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SessionToken::new(
                format!("token-{}", n),
                epoch_now() + self.lifetime,
            ))
        }
    }

    #[test]
    fn test_token_expiry_honors_margin() {
        let live = SessionToken::new("t", epoch_now() + 3600);
        assert!(!live.is_expired());

        // Inside the safety margin counts as expired
        let closing = SessionToken::new("t", epoch_now() + 10);
        assert!(closing.is_expired());

        let dead = SessionToken::new("t", epoch_now().saturating_sub(10));
        assert!(dead.is_expired());
    }

    #[tokio::test]
    async fn test_ensure_valid_skips_refresh_while_fresh() {
        let calls = Arc::new(AtomicU32::new(0));
        let session = Session::with_token(
            Box::new(StubRefresher {
                calls: calls.clone(),
                lifetime: 3600,
            }),
            SessionToken::new("seed", epoch_now() + 3600),
        );

        session.ensure_valid().await.unwrap();
        session.ensure_valid().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.token().await.unwrap(), "seed");
    }

    #[tokio::test]
    async fn test_ensure_valid_refreshes_stale_token() {
        let calls = Arc::new(AtomicU32::new(0));
        let session = Session::with_token(
            Box::new(StubRefresher {
                calls: calls.clone(),
                lifetime: 3600,
            }),
            SessionToken::new("stale", epoch_now()),
        );

        session.ensure_valid().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.token().await.unwrap(), "token-0");

        // Redundant calls stay idempotent
        session.ensure_valid().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_session_refreshes_on_first_use() {
        let calls = Arc::new(AtomicU32::new(0));
        let session = Session::new(Box::new(StubRefresher {
            calls: calls.clone(),
            lifetime: 3600,
        }));

        let token = session.token().await.unwrap();
        assert_eq!(token, "token-0");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
