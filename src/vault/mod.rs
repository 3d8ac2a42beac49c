//! Vault access for the proxy.
//!
//! ## Architectural role:
//! - `client` speaks Vault's HTTP API and implements [`crate::interface::SysBackend`]
//! - `factory` resolves connection settings and TLS, producing one client per operation
//! - `sys` holds the wire shapes of the `sys/` endpoints
//!
//! ## Testing strategy:
//! - Each module keeps its unit tests in a `#[cfg(test)] mod tests` block
//! - `test_utils.rs` starts a real Vault container for the ignored integration tests

pub mod client;
pub mod error;
pub mod factory;
pub mod sys;
#[cfg(test)]
pub mod test_utils;

pub use client::VaultClient;
pub use error::VaultError;
pub use factory::{VaultClientFactory, VaultSettings, DEFAULT_VAULT_ADDRESS};
