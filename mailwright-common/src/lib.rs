//! Shared types for the mailwright mailer
//!
//! This crate holds everything the resilience primitives and the client need to
//! agree on:
//! - The message model ([`Email`], [`Address`], [`TemplateRequest`])
//! - Provider outcomes ([`SendResult`], [`BatchResult`])
//! - The classified error taxonomy ([`MailError`])
//! - The collaborator contracts ([`Provider`], [`TemplateEngine`])
//! - Logging bootstrap

pub mod address;
pub mod error;
pub mod logging;
pub mod message;
pub mod outcome;
pub mod traits;

pub use address::Address;
pub use error::{BatchError, ErrorKind, MailError, ProviderError, TemplateError, ValidationError};
pub use message::{Email, Priority, TemplateRequest};
pub use outcome::{BatchFailure, BatchResult, SendResult};
pub use traits::{Provider, TemplateEngine};
pub use tracing;
