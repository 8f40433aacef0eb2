//! Peer-to-peer push-to-talk sessions addressed by phone number.
//!
//! A [`Session`] registers under the digits of the local number, keeps a
//! contact book, holds at most one data channel and one audio call, and
//! exchanges push-to-talk and location control messages over the channel.
//! Signaling, audio, location, storage and rendering are collaborators
//! behind traits; [`loopback`] wires sessions together in-process.

pub mod config;
pub mod identity;
pub mod location;
pub mod loopback;
pub mod media;
pub mod presentation;
pub mod registry;
pub mod session;
pub mod signaling;
pub mod store;

pub use config::SessionConfig;
pub use identity::{PeerId, format_phone_number, phone_to_id};
pub use location::LocationFix;
pub use registry::{Contact, SessionRegistry};
pub use session::{Session, SessionBuilder, SessionError, SessionHandle, SessionSnapshot};
