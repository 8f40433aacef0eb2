use super::error::Result;
use crate::registry::Contact;
use async_trait::async_trait;

/// Backing storage for the session registry.
///
/// Both entries are read once at startup and rewritten after every
/// registration or contact change.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// The saved local number. `None` when unset or saved as empty.
    async fn load_phone(&self) -> Result<Option<String>>;

    async fn save_phone(&self, phone: &str) -> Result<()>;

    /// The saved contacts. A missing entry is an empty list.
    async fn load_contacts(&self) -> Result<Vec<Contact>>;

    async fn save_contacts(&self, contacts: &[Contact]) -> Result<()>;
}
