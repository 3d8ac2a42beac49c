use crate::vault::sys::{
    AuthInput, AuthMountOutput, InitRequest, InitResponse, LeaseConfigInput, MountInput,
    MountOutput, SealStatusResponse,
};
use crate::vault::VaultError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The Vault system API calls the proxy depends on.
///
/// `VaultClient` is the HTTP implementation; tests substitute an in-memory one.
#[async_trait]
pub trait SysBackend: Send + Sync {
    async fn init_status(&self) -> Result<bool, VaultError>;

    async fn init(&self, req: &InitRequest) -> Result<InitResponse, VaultError>;

    async fn seal_status(&self) -> Result<SealStatusResponse, VaultError>;

    /// Submit a single unseal key share.
    async fn unseal(&self, key: &str) -> Result<SealStatusResponse, VaultError>;

    /// Discard the unseal progress accumulated so far.
    async fn unseal_reset(&self) -> Result<SealStatusResponse, VaultError>;

    async fn list_mounts(&self) -> Result<BTreeMap<String, MountOutput>, VaultError>;

    async fn mount(&self, path: &str, input: &MountInput) -> Result<(), VaultError>;

    async fn tune_mount(&self, path: &str, config: &LeaseConfigInput) -> Result<(), VaultError>;

    async fn list_auth(&self) -> Result<BTreeMap<String, AuthMountOutput>, VaultError>;

    async fn enable_auth(&self, path: &str, input: &AuthInput) -> Result<(), VaultError>;

    async fn disable_auth(&self, path: &str) -> Result<(), VaultError>;

    async fn list_policies(&self) -> Result<Vec<String>, VaultError>;

    async fn put_policy(&self, name: &str, rules: &str) -> Result<(), VaultError>;

    async fn delete_policy(&self, name: &str) -> Result<(), VaultError>;
}

/// Produces a fresh, optionally token-authenticated backend for each operation.
pub trait ClientFactory: Send + Sync {
    fn connect(&self, token: Option<&str>) -> Result<Arc<dyn SysBackend>, VaultError>;
}
