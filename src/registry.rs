//! Local identity and contact book.

use crate::identity::{PeerId, format_phone_number};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("contact {0} is already added")]
    DuplicateContact(PeerId),

    #[error("contact not found: {0}")]
    NotFound(PeerId),
}

/// A known remote party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: PeerId,
    pub name: String,
    /// Display form of the number, persisted under `phone`.
    #[serde(rename = "phone")]
    pub formatted_number: String,
}

impl Contact {
    pub fn new(name: &str, phone: &str) -> Result<Self, RegistryError> {
        let name = name.trim();
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(RegistryError::MissingField("phone"));
        }
        if name.is_empty() {
            return Err(RegistryError::MissingField("name"));
        }
        let id = PeerId::from_phone(phone);
        if id.is_empty() {
            return Err(RegistryError::MissingField("phone"));
        }
        Ok(Self {
            id,
            name: name.to_string(),
            formatted_number: format_phone_number(phone),
        })
    }
}

/// Holds the local number and the contact list.
///
/// Contacts are unique by id and are only ever added or removed, never
/// edited in place.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    /// The number as the user entered it; the identifier is derived from it.
    local_source: Option<String>,
    contacts: Vec<Contact>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries. An empty saved number means unset.
    pub fn restore(local_source: Option<String>, contacts: Vec<Contact>) -> Self {
        let mut registry = Self {
            local_source: local_source.filter(|p| !p.trim().is_empty()),
            contacts: Vec::with_capacity(contacts.len()),
        };
        for contact in contacts {
            if registry.find(&contact.id).is_none() {
                registry.contacts.push(contact);
            }
        }
        registry
    }

    /// Set the local number and return the identifier derived from it.
    pub fn set_local_number(&mut self, phone: &str) -> Result<PeerId, RegistryError> {
        let phone = phone.trim();
        let id = PeerId::from_phone(phone);
        if id.is_empty() {
            return Err(RegistryError::MissingField("phone"));
        }
        self.local_source = Some(phone.to_string());
        Ok(id)
    }

    /// The number exactly as persisted.
    pub fn local_source(&self) -> Option<&str> {
        self.local_source.as_deref()
    }

    /// The local number formatted for display.
    pub fn local_number(&self) -> Option<String> {
        self.local_source.as_deref().map(format_phone_number)
    }

    pub fn local_id(&self) -> Option<PeerId> {
        self.local_source.as_deref().map(PeerId::from_phone)
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn find(&self, id: &PeerId) -> Option<&Contact> {
        self.contacts.iter().find(|c| &c.id == id)
    }

    pub fn add_contact(&mut self, name: &str, phone: &str) -> Result<Contact, RegistryError> {
        let contact = Contact::new(name, phone)?;
        if self.find(&contact.id).is_some() {
            return Err(RegistryError::DuplicateContact(contact.id));
        }
        self.contacts.push(contact.clone());
        Ok(contact)
    }

    pub fn delete_contact(&mut self, id: &PeerId) -> Result<Contact, RegistryError> {
        let index = self
            .contacts
            .iter()
            .position(|c| &c.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        Ok(self.contacts.remove(index))
    }
}
