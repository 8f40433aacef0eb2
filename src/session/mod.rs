//! The peer session: registration, the single connection and call, and
//! push-to-talk.
//!
//! Start one with [`Session::builder`] and drive it through the
//! [`SessionHandle`] it hands out.

pub mod error;
mod handle;
mod manager;
mod messages;
pub mod protocol;
mod ptt;
pub mod state;

pub use error::SessionError;
pub use handle::{Session, SessionBuilder, SessionHandle};
pub use messages::SessionSnapshot;
pub use protocol::ControlMessage;
pub use ptt::{RemoteIndicator, TransmissionState};
pub use state::{CloseReason, ConnectionInfo, ConnectionState, Direction};
