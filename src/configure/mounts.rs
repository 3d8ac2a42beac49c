//! `/sys/mounts/` requests: enabling and tuning secrets engines.

use crate::configure::{read_json, ConfigAction, ConfigRequest, ConfigureError};
use crate::interface::SysBackend;
use crate::vault::sys::{LeaseConfigInput, MountInput, MountOutput};
use std::collections::BTreeMap;
use tracing::info;

impl ConfigRequest {
    pub fn has_mount_requests(&self) -> bool {
        !self.mount_add.is_empty() || !self.mount_tune.is_empty()
    }

    /// Applies mount adds then tunes, and re-lists the mounts if anything ran.
    pub async fn handle_mounts(
        &self,
        backend: &dyn SysBackend,
    ) -> Result<Option<BTreeMap<String, MountOutput>>, ConfigureError> {
        let mut changed = false;

        if !self.mount_add.is_empty() {
            self.add_mounts(backend).await?;
            changed = true;
        }
        if !self.mount_tune.is_empty() {
            self.tune_mounts(backend).await?;
            changed = true;
        }

        if !changed {
            return Ok(None);
        }
        Ok(Some(backend.list_mounts().await?))
    }

    pub async fn add_mounts(&self, backend: &dyn SysBackend) -> Result<(), ConfigureError> {
        if self.mount_add.is_empty() {
            return Err(ConfigureError::RequestMapEmpty(ConfigAction::MountAdd));
        }

        for (path, meta) in &self.mount_add {
            let input: MountInput = read_json(&meta.full_path).await?;
            info!("Mounting {} secrets engine at {}", input.mount_type, path);
            backend.mount(path, &input).await?;
        }
        Ok(())
    }

    pub async fn tune_mounts(&self, backend: &dyn SysBackend) -> Result<(), ConfigureError> {
        if self.mount_tune.is_empty() {
            return Err(ConfigureError::RequestMapEmpty(ConfigAction::MountTune));
        }

        for (path, meta) in &self.mount_tune {
            let config: LeaseConfigInput = read_json(&meta.full_path).await?;
            info!("Tuning mount {}", path);
            backend.tune_mount(path, &config).await?;
        }
        Ok(())
    }
}
