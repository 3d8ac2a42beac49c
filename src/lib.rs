//! vault-armor - a proxy in front of HashiCorp Vault
//!
//! The proxy exposes Vault's init, seal/unseal and declarative configuration
//! operations over HTTP and as actix actor messages.
//!
//! ## Architecture
//!
//! - `server` module - HTTP transport (talks to the facade through the actor)
//! - `actor` module - `ProxyActor`, the message surface for other actors
//! - `cli` module - Command-line interface and the `serve` entry point
//! - `service` module - the facade with its logging and metrics middleware
//! - `configure` module - fetches, classifies and applies configuration bundles
//! - `vault` module - Vault system API client and the client factory
//! - `holders` module - persistence of token holders produced by init
//! - `health` module - liveness and readiness state for the admin listener
//!
//! Configuration is an explicit [`ArmorConfig`] handed to the components that
//! need it; nothing reads ambient global state apart from the Vault CLI
//! environment variables the client factory falls back to.

pub mod actor;
pub mod cli;
pub mod config;
pub mod configure;
pub mod health;
pub mod holders;

// Trait seams between the facade and Vault
pub mod interface;

pub mod metrics;
pub mod public;
pub mod server;
pub mod service;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub mod vault;

pub use actor::{ProxyActor, ProxyEvent};
pub use config::ArmorConfig;
pub use configure::{ConfigOptions, ConfigState, Configurator};
pub use holders::DatabaseManager;
pub use service::{new_service, ProxyError, ProxyService, Service};

/// Installs the tracing subscriber. `RUST_LOG` wins; otherwise `info`.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
