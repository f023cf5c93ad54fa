//! Mailbox addresses

use std::fmt;

use mailparse::MailAddr;
use serde::{Deserialize, Serialize};

/// An email address with an optional display name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// Display name, e.g. `Jane Doe`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The mailbox itself, e.g. `jane@example.com`
    pub email: String,
}

impl Address {
    /// Creates an address without a display name.
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Creates an address with a display name.
    #[must_use]
    pub fn named(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: email.into(),
        }
    }

    /// Structural check that the mailbox is a single `local@domain` address.
    ///
    /// Deliverability and provider-specific rules are left to the provider.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let email = self.email.trim();
        if email.is_empty() {
            return false;
        }

        let Ok(parsed) = mailparse::addrparse(email) else {
            return false;
        };

        match parsed.as_slice() {
            [MailAddr::Single(info)] => info
                .addr
                .split_once('@')
                .is_some_and(|(local, domain)| {
                    !local.is_empty() && !domain.is_empty() && !domain.contains('@')
                }),
            _ => false,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) if !name.is_empty() => write!(f, "{name} <{}>", self.email),
            _ => f.write_str(&self.email),
        }
    }
}
