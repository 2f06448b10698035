//! Cast transport capability
//!
//! The actual cast wire protocol (discovery, connection, framing) lives
//! in the casting layer of the host platform. The launcher only needs a
//! device's display name, a way to start the receiver application, and a
//! JSON message channel on the receiver's namespace, so that is the whole
//! trait. Tests drive the launcher with an in-memory transport.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Namespace of the music-service receiver application
pub const RECEIVER_NAMESPACE: &str = "urn:x-cast:com.spotify.chromecast.secure.v1";

/// Cast application id of the receiver
pub const RECEIVER_APP_ID: &str = "CC32E753";

// Message types exchanged on the receiver namespace
pub(crate) const TYPE_GET_INFO: &str = "getInfo";
pub(crate) const TYPE_GET_INFO_RESPONSE: &str = "getInfoResponse";
pub(crate) const TYPE_ADD_USER: &str = "addUser";
pub(crate) const TYPE_ADD_USER_RESPONSE: &str = "addUserResponse";
pub(crate) const TYPE_ADD_USER_ERROR: &str = "addUserError";

/// Cast transport error types
#[derive(Error, Debug)]
pub enum CastError {
    #[error("failed to start receiver application: {0}")]
    AppStart(String),

    #[error("failed to send message on receiver namespace: {0}")]
    Send(String),
}

/// A JSON message on the receiver namespace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl CastMessage {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

impl fmt::Display for CastMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

/// Channel to one cast device
///
/// Implementations must deliver inbound namespace messages to the
/// launcher's `handle_message` on their own receive path; sending must
/// never block on that path.
#[async_trait]
pub trait CastTransport: Send + Sync {
    /// Display name of the device, as shown to the user
    fn friendly_name(&self) -> &str;

    /// Make sure the receiver application is running on the device and
    /// the namespace channel is open
    async fn start_app(&self) -> Result<(), CastError>;

    /// Send a message on the receiver namespace
    async fn send(&self, message: CastMessage) -> Result<(), CastError>;
}
