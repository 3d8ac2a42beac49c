//! Liveness and readiness state for the admin listener.

use crate::holders::{run_blocking, HolderError, TokenHolderSink};
use crate::interface::ClientFactory;
use crate::vault::VaultError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

pub const STATUS_OK: u16 = 200;
pub const STATUS_UNAVAILABLE: u16 = 503;

#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    #[error("token holder backend check failed: {0}")]
    Backend(#[from] HolderError),

    #[error("{0}")]
    PolicyDir(String),

    #[error("vault check failed: {0}")]
    Vault(#[from] VaultError),
}

/// Status codes reported by `/healthz` and `/readiness`.
#[derive(Debug)]
pub struct HealthState {
    healthz: RwLock<u16>,
    readiness: RwLock<u16>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            healthz: RwLock::new(STATUS_OK),
            readiness: RwLock::new(STATUS_OK),
        }
    }
}

impl HealthState {
    pub fn healthz(&self) -> u16 {
        self.healthz.read().map(|s| *s).unwrap_or(STATUS_UNAVAILABLE)
    }

    pub fn readiness(&self) -> u16 {
        self.readiness.read().map(|s| *s).unwrap_or(STATUS_UNAVAILABLE)
    }

    pub fn set_healthz(&self, status: u16) {
        if let Ok(mut current) = self.healthz.write() {
            info!("setting health status to {}", status);
            *current = status;
        }
    }

    pub fn set_readiness(&self, status: u16) {
        if let Ok(mut current) = self.readiness.write() {
            if *current != status {
                info!("setting readiness status to {}", status);
                *current = status;
            }
        }
    }

    /// Flips health between 200 and 503.
    pub fn toggle_healthz(&self) {
        match self.healthz() {
            STATUS_OK => self.set_healthz(STATUS_UNAVAILABLE),
            STATUS_UNAVAILABLE => self.set_healthz(STATUS_OK),
            _ => {}
        }
    }
}

/// The dependencies `/readiness` probes, in order.
pub struct ReadinessChecks {
    holders: Option<Arc<dyn TokenHolderSink>>,
    policy_dir: Option<PathBuf>,
    factory: Arc<dyn ClientFactory>,
}

impl ReadinessChecks {
    pub fn new(
        holders: Option<Arc<dyn TokenHolderSink>>,
        policy_dir: Option<PathBuf>,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            holders,
            policy_dir,
            factory,
        }
    }

    pub async fn run(&self) -> Result<(), ReadinessError> {
        if let Some(holders) = &self.holders {
            let holders = holders.clone();
            run_blocking(move || holders.check()).await?;
        }
        policy_dir_health(self.policy_dir.as_deref())?;
        self.factory.connect(None)?.init_status().await?;
        Ok(())
    }

    /// Runs the checks and records the outcome on `state`.
    pub async fn update(&self, state: &HealthState) -> u16 {
        match self.run().await {
            Ok(()) => state.set_readiness(STATUS_OK),
            Err(e) => {
                warn!("readiness check failed: {}", e);
                state.set_readiness(STATUS_UNAVAILABLE);
            }
        }
        state.readiness()
    }
}

/// The staging root must be configured; a missing directory is created.
pub fn policy_dir_health(dir: Option<&Path>) -> Result<(), ReadinessError> {
    let dir = dir.filter(|d| !d.as_os_str().is_empty()).ok_or_else(|| {
        ReadinessError::PolicyDir(
            "Download directory for configuring Vault was not specified".into(),
        )
    })?;

    match fs::metadata(dir) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(
                "creating missing policy download destination directory: {}",
                dir.display()
            );
            create_dir(dir)
                .map_err(|e| ReadinessError::PolicyDir(format!("{}: {}", dir.display(), e)))
        }
        Err(e) => Err(ReadinessError::PolicyDir(format!("{}: {}", dir.display(), e))),
    }
}

#[cfg(unix)]
fn create_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o755).create(dir)
}

#[cfg(not(unix))]
fn create_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holders::DatabaseManager;
    use crate::testing::{FakeFactory, FakeVault};

    #[test]
    fn toggle_flips_between_ok_and_unavailable() {
        let state = HealthState::default();
        assert_eq!(state.healthz(), STATUS_OK);
        state.toggle_healthz();
        assert_eq!(state.healthz(), STATUS_UNAVAILABLE);
        state.toggle_healthz();
        assert_eq!(state.healthz(), STATUS_OK);
    }

    #[test]
    fn missing_policy_dir_is_created() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("armor/policy");
        policy_dir_health(Some(&dir)).unwrap();
        assert!(dir.is_dir());
        assert!(policy_dir_health(None).is_err());
    }

    #[tokio::test]
    async fn readiness_reflects_vault_reachability() {
        let root = tempfile::tempdir().unwrap();
        let backend = FakeVault::fresh();
        backend.fail_on("init_status");
        let checks = ReadinessChecks::new(
            None,
            Some(root.path().to_path_buf()),
            Arc::new(FakeFactory::new(backend)),
        );
        let state = HealthState::default();
        assert_eq!(checks.update(&state).await, STATUS_UNAVAILABLE);

        let checks = ReadinessChecks::new(
            None,
            Some(root.path().to_path_buf()),
            Arc::new(FakeFactory::new(FakeVault::fresh())),
        );
        assert_eq!(checks.update(&state).await, STATUS_OK);
    }

    #[tokio::test]
    async fn holder_store_is_checked_first() {
        let root = tempfile::tempdir().unwrap();
        let vault = FakeVault::fresh();
        let checks = ReadinessChecks::new(
            Some(Arc::new(DatabaseManager::in_memory().unwrap())),
            Some(root.path().to_path_buf()),
            Arc::new(FakeFactory::new(vault.clone())),
        );
        checks.run().await.unwrap();
        assert_eq!(vault.calls(), vec!["init_status"]);
    }
}
