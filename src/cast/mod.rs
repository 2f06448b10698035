//! Cast device integration
//!
//! - Transport: capability trait over the cast wire protocol
//! - Launcher: receiver launch and authorization state machine

pub mod launcher;
pub mod transport;

pub use launcher::{
    cast_device_id, LaunchError, LaunchPhase, ReceiverLauncher, DEFAULT_LAUNCH_TIMEOUT,
    QUICK_PLAY_TIMEOUT,
};
pub use transport::{CastError, CastMessage, CastTransport, RECEIVER_APP_ID, RECEIVER_NAMESPACE};
