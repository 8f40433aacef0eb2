//! Phone-number identities.
//!
//! Every endpoint is addressed on the rendezvous by the digits of its phone
//! number. Formatting is only ever applied for display; the identifier keeps
//! exactly the digit characters the user typed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Digits-only identifier used as the rendezvous name of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Derive the identifier for a phone number in any notation.
    pub fn from_phone(phone: &str) -> Self {
        Self(phone_to_id(phone))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The identifier rendered as a phone number, e.g. for an unknown caller.
    pub fn display_number(&self) -> String {
        format_phone_number(&self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PeerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(phone: &str) -> Self {
        Self::from_phone(phone)
    }
}

/// Strip everything but the ASCII digits.
pub fn phone_to_id(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Format a North American number as `+1 (NPA) NXX-XXXX`.
///
/// Ten digit numbers get the implied `+1` country code. Anything that is not
/// a ten or eleven digit NANP number is returned unchanged.
pub fn format_phone_number(phone: &str) -> String {
    let cleaned = phone_to_id(phone);
    let national = match cleaned.len() {
        11 if cleaned.starts_with('1') => &cleaned[1..],
        10 => cleaned.as_str(),
        _ => return phone.to_string(),
    };
    format!(
        "+1 ({}) {}-{}",
        &national[0..3],
        &national[3..6],
        &national[6..]
    )
}
