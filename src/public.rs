//! Public interface for integration with other systems

pub use crate::actor::{start_proxy_actor_with_channel, ProxyActor, ProxyEvent};

// Re-export message types for cross-crate actor communication
pub use crate::actor::{ConfigureVault, InitStatus, InitVault, SealStatus, UnsealVault};

// Payloads carried by those messages
pub use crate::configure::{ConfigOptions, ConfigState};
pub use crate::service::{InitKeys, InitOptions, ProxyError, SealState, UnsealOptions};
