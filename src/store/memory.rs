use super::error::Result;
use super::traits::RegistryStore;
use super::{CONTACTS_ENTRY, PHONE_ENTRY, decode, encode};
use crate::registry::Contact;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Volatile store. Entries are kept in their serialized form so that the
/// decoding path matches [`super::FileStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<&'static str, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite an entry with raw bytes.
    pub async fn put_raw(&self, entry: &'static str, data: impl Into<Vec<u8>>) {
        self.entries.write().await.insert(entry, data.into());
    }

    pub async fn get_raw(&self, entry: &'static str) -> Option<Vec<u8>> {
        self.entries.read().await.get(entry).cloned()
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn load_phone(&self) -> Result<Option<String>> {
        let Some(data) = self.get_raw(PHONE_ENTRY).await else {
            return Ok(None);
        };
        let phone: String = decode(PHONE_ENTRY, &data)?;
        Ok(Some(phone).filter(|p| !p.is_empty()))
    }

    async fn save_phone(&self, phone: &str) -> Result<()> {
        let data = encode(PHONE_ENTRY, phone)?;
        self.put_raw(PHONE_ENTRY, data).await;
        Ok(())
    }

    async fn load_contacts(&self) -> Result<Vec<Contact>> {
        match self.get_raw(CONTACTS_ENTRY).await {
            Some(data) => decode(CONTACTS_ENTRY, &data),
            None => Ok(Vec::new()),
        }
    }

    async fn save_contacts(&self, contacts: &[Contact]) -> Result<()> {
        let data = encode(CONTACTS_ENTRY, contacts)?;
        self.put_raw(CONTACTS_ENTRY, data).await;
        Ok(())
    }
}
