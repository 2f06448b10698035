//! Receiver launch state machine
//!
//! Starting playback on a cast device requires the music service's
//! receiver application to be running and authorized with a device-scoped
//! token. The handshake on the receiver namespace goes:
//!
//! 1. `getInfo` out, carrying the deterministic device id
//! 2. `getInfoResponse` in, carrying the receiver's `clientID`
//! 3. token exchange against the device-auth endpoint (HTTP)
//! 4. `addUser` out, carrying the exchanged token blob
//! 5. `addUserResponse` (ready) or `addUserError` (bad credentials) in
//!
//! The caller blocks on `launch` with one-second poll granularity while
//! inbound messages, delivered on the transport's receive path, advance
//! the state and flip the completion signal. One launcher is bound to one
//! device; overlapping launches on the same launcher are a caller error,
//! and each new launch resets the previous attempt's state.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::cast::transport::{
    CastError, CastMessage, CastTransport, TYPE_ADD_USER, TYPE_ADD_USER_ERROR,
    TYPE_ADD_USER_RESPONSE, TYPE_GET_INFO, TYPE_GET_INFO_RESPONSE,
};

/// Default bound on the whole handshake
pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Longer bound used by quick-play flows, where the device may still be
/// waking up
pub const QUICK_PLAY_TIMEOUT: Duration = Duration::from_secs(20);

/// Poll granularity of the launch wait
const WAIT_POLL: Duration = Duration::from_secs(1);

/// Bound on the device-auth token exchange
const AUTH_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default device-auth endpoint root
const DEVICE_AUTH_BASE_URL: &str = "https://spclient.wg.spotify.com";

/// Derive the stable protocol-level device id from a cast device's
/// display name. Pure; exposed for diagnostics.
pub fn cast_device_id(friendly_name: &str) -> String {
    format!("{:x}", md5::compute(friendly_name.as_bytes()))
}

/// Launch failure types
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("timed out after {0:?} waiting for the receiver to become ready")]
    Timeout(Duration),

    #[error("receiver rejected the provided credentials")]
    CredentialsRejected,

    #[error(transparent)]
    Transport(#[from] CastError),

    #[error("device token exchange failed: {0}")]
    AuthExchange(String),
}

/// Phase of the current launch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchPhase {
    #[default]
    Idle,
    AwaitingInfo,
    AwaitingAuth,
    Launched,
    Failed,
}

#[derive(Default)]
struct Attempt {
    phase: LaunchPhase,
    access_token: Option<String>,
    expires: Option<u64>,
    client_id: Option<String>,
    device_id: Option<String>,
    credential_error: bool,
}

/// Launch negotiator for one cast device
pub struct ReceiverLauncher {
    transport: Arc<dyn CastTransport>,
    http: reqwest::Client,
    auth_base_url: String,
    attempt: Mutex<Attempt>,
    ready: Notify,
}

impl ReceiverLauncher {
    pub fn new(transport: Arc<dyn CastTransport>) -> Self {
        Self::with_auth_base_url(transport, DEVICE_AUTH_BASE_URL)
    }

    /// Create with a custom device-auth endpoint root (for testing)
    pub fn with_auth_base_url(
        transport: Arc<dyn CastTransport>,
        auth_base_url: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            http: reqwest::Client::builder()
                .timeout(AUTH_EXCHANGE_TIMEOUT)
                .build()
                .unwrap_or_default(),
            auth_base_url: auth_base_url.into(),
            attempt: Mutex::new(Attempt::default()),
            ready: Notify::new(),
        }
    }

    /// Display name of the bound device
    pub fn device_name(&self) -> &str {
        self.transport.friendly_name()
    }

    /// Phase of the current attempt
    pub fn phase(&self) -> LaunchPhase {
        self.attempt.lock().phase
    }

    /// True once the receiver reported ready
    pub fn is_launched(&self) -> bool {
        self.phase() == LaunchPhase::Launched
    }

    /// True when the receiver explicitly rejected the credentials
    pub fn credential_error(&self) -> bool {
        self.attempt.lock().credential_error
    }

    /// Protocol device id of the current attempt, once assigned
    pub fn device_id(&self) -> Option<String> {
        self.attempt.lock().device_id.clone()
    }

    /// Client id assigned by the receiver, once the info response arrived
    pub fn client_id(&self) -> Option<String> {
        self.attempt.lock().client_id.clone()
    }

    /// Expiry of the token backing the current attempt
    pub fn token_expiry(&self) -> Option<u64> {
        self.attempt.lock().expires
    }

    /// Run the launch handshake and wait for the receiver to become
    /// ready, bounded by `timeout`.
    ///
    /// Resets any state left over from a previous attempt. Returns once
    /// the receiver acknowledged the user, or fails with a distinct
    /// error for a credential rejection versus a timeout.
    pub async fn launch(
        &self,
        access_token: &str,
        expires: u64,
        timeout: Duration,
    ) -> Result<(), LaunchError> {
        info!(
            "launching receiver application on `{}` (token valid until {})",
            self.transport.friendly_name(),
            expires
        );

        {
            let mut attempt = self.attempt.lock();
            *attempt = Attempt {
                phase: LaunchPhase::AwaitingInfo,
                access_token: Some(access_token.to_string()),
                expires: Some(expires),
                ..Attempt::default()
            };
        }

        self.transport.start_app().await?;
        self.transport
            .send(CastMessage::new(
                TYPE_GET_INFO,
                json!({
                    "remoteName": self.transport.friendly_name(),
                    "deviceID": cast_device_id(self.transport.friendly_name()),
                    "deviceAPI_isGroup": false,
                }),
            ))
            .await?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let attempt = self.attempt.lock();
                match attempt.phase {
                    LaunchPhase::Launched => {
                        info!(
                            "receiver ready on `{}` as device `{}`",
                            self.transport.friendly_name(),
                            attempt.device_id.as_deref().unwrap_or("?")
                        );
                        return Ok(());
                    }
                    LaunchPhase::Failed if attempt.credential_error => {
                        return Err(LaunchError::CredentialsRejected);
                    }
                    _ => {}
                }
            }

            if tokio::time::Instant::now() >= deadline {
                self.attempt.lock().phase = LaunchPhase::Failed;
                return Err(LaunchError::Timeout(timeout));
            }

            // Bounded wait, re-checked at poll granularity; a signal set
            // between checks wakes the loop immediately.
            let _ = tokio::time::timeout(WAIT_POLL, self.ready.notified()).await;
        }
    }

    /// Launch with the longer quick-play bound
    pub async fn quick_play(&self, access_token: &str, expires: u64) -> Result<(), LaunchError> {
        self.launch(access_token, expires, QUICK_PLAY_TIMEOUT).await
    }

    /// Inbound message handler. Wire this to the transport's receive
    /// path; it never blocks the waiter and only advances state plus the
    /// completion signal.
    pub async fn handle_message(&self, message: CastMessage) {
        match message.kind.as_str() {
            TYPE_GET_INFO_RESPONSE => {
                // A duplicate response simply restarts the exchange.
                if let Err(err) = self.authorize(&message.payload).await {
                    warn!("device authorization failed: {}", err);
                }
            }
            TYPE_ADD_USER_RESPONSE => {
                debug!("receiver acknowledged user");
                self.attempt.lock().phase = LaunchPhase::Launched;
                self.ready.notify_waiters();
            }
            TYPE_ADD_USER_ERROR => {
                warn!("receiver rejected credentials");
                {
                    let mut attempt = self.attempt.lock();
                    attempt.credential_error = true;
                    attempt.device_id = None;
                    attempt.phase = LaunchPhase::Failed;
                }
                self.ready.notify_waiters();
            }
            other => debug!("ignoring receiver message `{}`", other),
        }
    }

    /// Exchange the account token for a device-scoped one and hand it to
    /// the receiver
    async fn authorize(&self, payload: &Value) -> Result<(), LaunchError> {
        let client_id = payload
            .get("clientID")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                LaunchError::AuthExchange("info response without clientID".to_string())
            })?
            .to_string();

        let device_id = cast_device_id(self.transport.friendly_name());

        let access_token = {
            let mut attempt = self.attempt.lock();
            attempt.client_id = Some(client_id.clone());
            attempt.device_id = Some(device_id.clone());
            attempt.access_token.clone().ok_or_else(|| {
                LaunchError::AuthExchange("no access token for this attempt".to_string())
            })?
        };

        debug!("exchanging token for device `{}`", device_id);
        let response = self
            .http
            .post(format!("{}/device-auth/v1/refresh", self.auth_base_url))
            .bearer_auth(&access_token)
            .header("content-type", "text/plain;charset=UTF-8")
            .body(json!({ "clientId": client_id, "deviceId": device_id }).to_string())
            .send()
            .await
            .map_err(|err| LaunchError::AuthExchange(err.to_string()))?;

        if !response.status().is_success() {
            return Err(LaunchError::AuthExchange(format!(
                "device-auth endpoint returned {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| LaunchError::AuthExchange(err.to_string()))?;
        let blob = body
            .get("accessToken")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                LaunchError::AuthExchange("device-auth response without accessToken".to_string())
            })?;

        self.transport
            .send(CastMessage::new(
                TYPE_ADD_USER,
                json!({ "blob": blob, "tokenType": "accesstoken" }),
            ))
            .await?;

        self.attempt.lock().phase = LaunchPhase::AwaitingAuth;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_is_deterministic() {
        let a = cast_device_id("Living Room speaker");
        let b = cast_device_id("Living Room speaker");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_device_id_differs_per_name() {
        let names = [
            "Living Room speaker",
            "living room speaker",
            "Kitchen",
            "Kitchen ",
            "TV",
            "Bedroom Mini",
        ];
        let ids: std::collections::HashSet<String> =
            names.iter().map(|name| cast_device_id(name)).collect();
        assert_eq!(ids.len(), names.len());
    }

    #[test]
    fn test_phase_starts_idle() {
        assert_eq!(LaunchPhase::default(), LaunchPhase::Idle);
    }
}
