//! In-memory Vault for tests. Compiled for the crate's own tests and for
//! downstream tests through the `testing` feature.

use crate::interface::{ClientFactory, SysBackend};
use crate::vault::sys::{
    AuthInput, AuthMountOutput, InitRequest, InitResponse, LeaseConfigInput, LeaseConfigOutput,
    MountInput, MountOutput, SealStatusResponse,
};
use crate::vault::VaultError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct VaultState {
    pub initialized: bool,
    pub sealed: bool,
    pub threshold: u32,
    pub progress: u32,
    pub mounts: BTreeMap<String, MountOutput>,
    pub auths: BTreeMap<String, AuthMountOutput>,
    pub policies: BTreeMap<String, String>,
    /// Every call by name and path, in order.
    pub calls: Vec<String>,
    /// Calls whose name starts with this fail with a 500.
    pub fail_on: Option<String>,
}

/// In-memory Vault. Durations like `"7h"` are stored as seconds, as Vault does.
#[derive(Debug, Default)]
pub struct FakeVault {
    pub state: Mutex<VaultState>,
}

/// Converts a Vault duration string to seconds. Unknown units parse as plain seconds.
pub fn ttl_seconds(ttl: Option<&str>) -> u64 {
    let Some(ttl) = ttl else { return 0 };
    let (num, unit) = ttl.split_at(ttl.len().saturating_sub(1));
    let n: u64 = num.parse().unwrap_or(0);
    match unit {
        "s" => n,
        "m" => n * 60,
        "h" => n * 3600,
        "d" => n * 86400,
        _ => ttl.parse().unwrap_or(0),
    }
}

fn lease(config: &LeaseConfigInput) -> LeaseConfigOutput {
    LeaseConfigOutput {
        default_lease_ttl: ttl_seconds(config.default_lease_ttl.as_deref()),
        max_lease_ttl: ttl_seconds(config.max_lease_ttl.as_deref()),
    }
}

fn lock(state: &Mutex<VaultState>) -> MutexGuard<'_, VaultState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FakeVault {
    /// Uninitialized and unsealed, with nothing mounted.
    pub fn fresh() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Initialized and sealed, waiting for `threshold` key shares.
    pub fn sealed(threshold: u32) -> Arc<Self> {
        let vault = Self::default();
        {
            let mut s = lock(&vault.state);
            s.initialized = true;
            s.sealed = true;
            s.threshold = threshold;
        }
        Arc::new(vault)
    }

    /// A dev-like server: initialized, unsealed, with the default mounts.
    pub fn dev() -> Arc<Self> {
        let vault = Self::default();
        {
            let mut s = lock(&vault.state);
            s.initialized = true;
            s.threshold = 1;
            let defaults = [("cubbyhole/", "cubbyhole"), ("secret/", "kv"), ("sys/", "system")];
            for (path, kind) in defaults {
                s.mounts.insert(
                    path.into(),
                    MountOutput {
                        mount_type: kind.into(),
                        ..Default::default()
                    },
                );
            }
            s.auths.insert(
                "token/".into(),
                MountOutput {
                    mount_type: "token".into(),
                    ..Default::default()
                },
            );
            s.policies.insert("default".into(), String::new());
            s.policies.insert("root".into(), String::new());
        }
        Arc::new(vault)
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    pub fn fail_on(&self, prefix: &str) {
        lock(&self.state).fail_on = Some(prefix.into());
    }

    pub fn insert_auth(&self, path: &str, kind: &str) {
        lock(&self.state).auths.insert(
            path.into(),
            MountOutput {
                mount_type: kind.into(),
                ..Default::default()
            },
        );
    }

    fn record(&self, call: String) -> Result<MutexGuard<'_, VaultState>, VaultError> {
        let mut s = lock(&self.state);
        if let Some(prefix) = &s.fail_on {
            if call.starts_with(prefix.as_str()) {
                return Err(VaultError::HttpStatus(500, format!("{} failed", call)));
            }
        }
        s.calls.push(call);
        Ok(s)
    }

    fn seal_status_of(s: &VaultState) -> SealStatusResponse {
        SealStatusResponse {
            seal_type: "shamir".into(),
            initialized: s.initialized,
            sealed: s.sealed,
            t: s.threshold,
            n: s.threshold,
            progress: s.progress,
            version: "1.13.3".into(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl SysBackend for FakeVault {
    async fn init_status(&self) -> Result<bool, VaultError> {
        let s = self.record("init_status".into())?;
        Ok(s.initialized)
    }

    async fn init(&self, req: &InitRequest) -> Result<InitResponse, VaultError> {
        let mut s = self.record("init".into())?;
        if s.initialized {
            return Err(VaultError::HttpStatus(400, "Vault is already initialized".into()));
        }
        s.initialized = true;
        s.sealed = true;
        s.threshold = req.secret_threshold;
        let keys: Vec<String> = (0..req.secret_shares).map(|i| format!("key-{}", i)).collect();
        Ok(InitResponse {
            keys_base64: keys.clone(),
            keys,
            root_token: "root-token".into(),
            ..Default::default()
        })
    }

    async fn seal_status(&self) -> Result<SealStatusResponse, VaultError> {
        let s = self.record("seal_status".into())?;
        Ok(Self::seal_status_of(&s))
    }

    async fn unseal(&self, key: &str) -> Result<SealStatusResponse, VaultError> {
        let mut s = self.record(format!("unseal {}", key))?;
        s.progress += 1;
        if s.progress >= s.threshold {
            s.sealed = false;
            s.progress = 0;
        }
        Ok(Self::seal_status_of(&s))
    }

    async fn unseal_reset(&self) -> Result<SealStatusResponse, VaultError> {
        let mut s = self.record("unseal_reset".into())?;
        s.progress = 0;
        Ok(Self::seal_status_of(&s))
    }

    async fn list_mounts(&self) -> Result<BTreeMap<String, MountOutput>, VaultError> {
        let s = self.record("list_mounts".into())?;
        Ok(s.mounts.clone())
    }

    async fn mount(&self, path: &str, input: &MountInput) -> Result<(), VaultError> {
        let mut s = self.record(format!("mount {}", path))?;
        let key = format!("{}/", path);
        if s.mounts.contains_key(&key) {
            return Err(VaultError::HttpStatus(
                400,
                format!("path is already in use at {}", key),
            ));
        }
        s.mounts.insert(
            key,
            MountOutput {
                mount_type: input.mount_type.clone(),
                description: input.description.clone(),
                config: lease(&input.config),
            },
        );
        Ok(())
    }

    async fn tune_mount(&self, path: &str, config: &LeaseConfigInput) -> Result<(), VaultError> {
        let mut s = self.record(format!("tune_mount {}", path))?;
        let mount = s
            .mounts
            .get_mut(&format!("{}/", path))
            .ok_or_else(|| VaultError::HttpStatus(400, format!("no mount at {}", path)))?;
        let tuned = lease(config);
        if config.default_lease_ttl.is_some() {
            mount.config.default_lease_ttl = tuned.default_lease_ttl;
        }
        if config.max_lease_ttl.is_some() {
            mount.config.max_lease_ttl = tuned.max_lease_ttl;
        }
        Ok(())
    }

    async fn list_auth(&self) -> Result<BTreeMap<String, AuthMountOutput>, VaultError> {
        let s = self.record("list_auth".into())?;
        Ok(s.auths.clone())
    }

    async fn enable_auth(&self, path: &str, input: &AuthInput) -> Result<(), VaultError> {
        let mut s = self.record(format!("enable_auth {}", path))?;
        s.auths.insert(
            format!("{}/", path),
            MountOutput {
                mount_type: input.auth_type.clone(),
                description: input.description.clone(),
                config: lease(&input.config),
            },
        );
        Ok(())
    }

    async fn disable_auth(&self, path: &str) -> Result<(), VaultError> {
        let mut s = self.record(format!("disable_auth {}", path))?;
        s.auths.remove(&format!("{}/", path));
        Ok(())
    }

    async fn list_policies(&self) -> Result<Vec<String>, VaultError> {
        let s = self.record("list_policies".into())?;
        Ok(s.policies.keys().cloned().collect())
    }

    async fn put_policy(&self, name: &str, rules: &str) -> Result<(), VaultError> {
        let mut s = self.record(format!("put_policy {}", name))?;
        s.policies.insert(name.into(), rules.into());
        Ok(())
    }

    async fn delete_policy(&self, name: &str) -> Result<(), VaultError> {
        let mut s = self.record(format!("delete_policy {}", name))?;
        s.policies.remove(name);
        Ok(())
    }
}

/// Hands out the same [`FakeVault`] for every connection and remembers the
/// token each connection asked for.
#[derive(Debug, Clone)]
pub struct FakeFactory {
    pub vault: Arc<FakeVault>,
    tokens: Arc<Mutex<Vec<Option<String>>>>,
}

impl FakeFactory {
    pub fn new(vault: Arc<FakeVault>) -> Self {
        Self {
            vault,
            tokens: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn tokens(&self) -> Vec<Option<String>> {
        self.tokens
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ClientFactory for FakeFactory {
    fn connect(&self, token: Option<&str>) -> Result<Arc<dyn SysBackend>, VaultError> {
        self.tokens
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(token.map(str::to_string));
        Ok(self.vault.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_become_seconds() {
        assert_eq!(ttl_seconds(Some("7h")), 25200);
        assert_eq!(ttl_seconds(Some("30m")), 1800);
        assert_eq!(ttl_seconds(Some("90")), 90);
        assert_eq!(ttl_seconds(None), 0);
    }

    #[tokio::test]
    async fn seal_status_reads_current_state() {
        let vault = FakeVault::sealed(3);
        vault.unseal("key-0").await.unwrap();
        let status = vault.seal_status().await.unwrap();
        assert!(status.sealed);
        assert_eq!(status.progress, 1);
        assert_eq!(vault.calls(), vec!["unseal key-0", "seal_status"]);
    }
}
