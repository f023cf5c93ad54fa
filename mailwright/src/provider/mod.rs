//! Built-in providers.
//!
//! Wire-level providers (HTTP APIs, SMTP relays) live outside this crate and
//! plug in through [`mailwright_common::Provider`].

pub mod memory;

pub use memory::MemoryProvider;
