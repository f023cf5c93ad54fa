//! Outbound messages and template requests

use std::fmt;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::{address::Address, error::ValidationError};

/// Priority hint passed through to providers that support it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Marketing, newsletters
    Low,
    #[default]
    Normal,
    /// Alerts, notifications
    High,
    /// Security alerts, critical notifications
    Urgent,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        })
    }
}

/// A single outbound email.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub from: Address,
    #[serde(default)]
    pub to: Vec<Address>,
    #[serde(default)]
    pub cc: Vec<Address>,
    #[serde(default)]
    pub bcc: Vec<Address>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub html_body: String,
    #[serde(default)]
    pub text_body: String,
    /// Custom headers
    #[serde(default)]
    pub headers: AHashMap<String, String>,
    #[serde(default)]
    pub priority: Priority,
    /// Provider-specific tracking data
    #[serde(default)]
    pub metadata: AHashMap<String, String>,
}

impl Email {
    /// Starts a new email from the given sender.
    #[must_use]
    pub fn new(from: Address) -> Self {
        Self {
            from,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn to(mut self, address: Address) -> Self {
        self.to.push(address);
        self
    }

    #[must_use]
    pub fn cc(mut self, address: Address) -> Self {
        self.cc.push(address);
        self
    }

    #[must_use]
    pub fn bcc(mut self, address: Address) -> Self {
        self.bcc.push(address);
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    #[must_use]
    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        self.text_body = body.into();
        self
    }

    #[must_use]
    pub fn html_body(mut self, body: impl Into<String>) -> Self {
        self.html_body = body.into();
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Total number of recipients across `to`, `cc` and `bcc`.
    #[must_use]
    pub const fn total_recipients(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }

    /// All recipients, in `to`, `cc`, `bcc` order.
    pub fn recipients(&self) -> impl Iterator<Item = &Address> {
        self.to.iter().chain(&self.cc).chain(&self.bcc)
    }

    /// Checks the message has the structure every provider requires.
    ///
    /// # Errors
    ///
    /// Returns the first field found to be invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.from.is_valid() {
            return Err(ValidationError::with_value(
                "from",
                "invalid or missing sender address",
                &self.from.email,
            ));
        }

        if self.to.is_empty() {
            return Err(ValidationError::new("to", "at least one recipient required"));
        }

        for (field, addresses) in [("to", &self.to), ("cc", &self.cc), ("bcc", &self.bcc)] {
            if let Some((index, address)) = addresses
                .iter()
                .enumerate()
                .find(|(_, address)| !address.is_valid())
            {
                return Err(ValidationError::with_value(
                    field,
                    format!("invalid address at index {index}"),
                    &address.email,
                ));
            }
        }

        if self.subject.trim().is_empty() {
            return Err(ValidationError::new("subject", "subject is required"));
        }

        if self.text_body.trim().is_empty() && self.html_body.trim().is_empty() {
            return Err(ValidationError::new(
                "body",
                "either text or HTML body is required",
            ));
        }

        Ok(())
    }
}

/// A request to render a named template and send the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateRequest {
    /// Base template name; `<name>.subject`, `<name>.html` and `<name>.text` are rendered
    pub template: String,
    pub from: Address,
    #[serde(default)]
    pub to: Vec<Address>,
    #[serde(default)]
    pub cc: Vec<Address>,
    #[serde(default)]
    pub bcc: Vec<Address>,
    /// Explicit subject; when absent the `<name>.subject` template is rendered
    #[serde(default)]
    pub subject: Option<String>,
    /// Data made available to the templates
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub headers: AHashMap<String, String>,
    #[serde(default)]
    pub metadata: AHashMap<String, serde_json::Value>,
}

impl TemplateRequest {
    #[must_use]
    pub fn new(template: impl Into<String>, from: Address) -> Self {
        Self {
            template: template.into(),
            from,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn to(mut self, address: Address) -> Self {
        self.to.push(address);
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    #[must_use]
    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Name of one part of the template, e.g. `welcome.html`.
    #[must_use]
    pub fn part(&self, part: &str) -> String {
        format!("{}.{part}", self.template)
    }
}
