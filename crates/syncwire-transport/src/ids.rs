use std::fmt;

use crate::error::{Result, TransportError};

/// Maximum length of a transport identifier in UTF-8 bytes.
pub const MAX_TRANSPORT_ID_LENGTH: usize = 64;

/// Local handle for a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContactId(pub u32);

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "contact-{}", self.0)
    }
}

/// Identifies a transport carrier, e.g. `"tcp"` or `"file"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(String);

impl TransportId {
    /// Create a transport identifier, rejecting empty or over-long names.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.len() > MAX_TRANSPORT_ID_LENGTH {
            return Err(TransportError::InvalidConfig(format!(
                "transport id must be 1..={MAX_TRANSPORT_ID_LENGTH} bytes, got {}",
                id.len()
            )));
        }
        Ok(Self(id))
    }

    /// Identifier for a built-in carrier whose name is known to be valid.
    pub(crate) fn builtin(id: &'static str) -> Self {
        debug_assert!(!id.is_empty() && id.len() <= MAX_TRANSPORT_ID_LENGTH);
        Self(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
