use super::error::{Result, StoreError};
use super::traits::RegistryStore;
use super::{CONTACTS_ENTRY, PHONE_ENTRY, decode, encode};
use crate::registry::Contact;
use async_trait::async_trait;
use log::debug;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Stores each entry as a JSON file under a base directory.
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    pub async fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let base_path = path.into();
        fs::create_dir_all(&base_path).await?;
        Ok(Self { base_path })
    }

    fn path_for(&self, entry: &str) -> PathBuf {
        self.base_path.join(format!("{entry}.json"))
    }

    async fn read_entry(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn write_entry(&self, entry: &'static str, data: Vec<u8>) -> Result<()> {
        let path = self.path_for(entry);
        debug!(target: "Store/File", "Writing {} ({} bytes)", path.display(), data.len());
        fs::write(path, data).await.map_err(StoreError::Io)
    }
}

#[async_trait]
impl RegistryStore for FileStore {
    async fn load_phone(&self) -> Result<Option<String>> {
        let Some(data) = self.read_entry(&self.path_for(PHONE_ENTRY)).await? else {
            return Ok(None);
        };
        let phone: String = decode(PHONE_ENTRY, &data)?;
        Ok(Some(phone).filter(|p| !p.is_empty()))
    }

    async fn save_phone(&self, phone: &str) -> Result<()> {
        self.write_entry(PHONE_ENTRY, encode(PHONE_ENTRY, phone)?)
            .await
    }

    async fn load_contacts(&self) -> Result<Vec<Contact>> {
        match self.read_entry(&self.path_for(CONTACTS_ENTRY)).await? {
            Some(data) => decode(CONTACTS_ENTRY, &data),
            None => Ok(Vec::new()),
        }
    }

    async fn save_contacts(&self, contacts: &[Contact]) -> Result<()> {
        self.write_entry(CONTACTS_ENTRY, encode(CONTACTS_ENTRY, contacts)?)
            .await
    }
}
