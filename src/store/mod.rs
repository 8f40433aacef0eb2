//! Persistence for the local number and the contact list.
//!
//! State is kept as two named entries, mirroring a browser's key/value
//! storage: [`PHONE_ENTRY`] holds the local number as entered (empty when
//! unset) and [`CONTACTS_ENTRY`] holds the serialized contact list.

pub mod error;
pub mod filestore;
pub mod memory;
pub mod traits;

pub use error::StoreError;
pub use filestore::FileStore;
pub use memory::MemoryStore;
pub use traits::RegistryStore;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub const PHONE_ENTRY: &str = "wheru-phone";
pub const CONTACTS_ENTRY: &str = "wheru-friends";

pub(crate) fn decode<T: DeserializeOwned>(entry: &'static str, data: &[u8]) -> error::Result<T> {
    serde_json::from_slice(data).map_err(|e| StoreError::Serialization {
        entry,
        reason: e.to_string(),
    })
}

pub(crate) fn encode<T: Serialize + ?Sized>(entry: &'static str, value: &T) -> error::Result<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialization {
        entry,
        reason: e.to_string(),
    })
}
