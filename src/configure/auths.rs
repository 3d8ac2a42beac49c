//! `/sys/auth/` requests: enabling and disabling auth backends.

use crate::configure::{read_json, ConfigAction, ConfigRequest, ConfigureError};
use crate::interface::SysBackend;
use crate::vault::sys::{AuthInput, AuthMountOutput};
use std::collections::BTreeMap;
use tracing::info;

impl ConfigRequest {
    pub fn has_auth_requests(&self) -> bool {
        !self.auth_add.is_empty() || !self.auth_disable.is_empty()
    }

    /// Applies auth enables then disables, and re-lists auth backends if anything ran.
    pub async fn handle_auths(
        &self,
        backend: &dyn SysBackend,
    ) -> Result<Option<BTreeMap<String, AuthMountOutput>>, ConfigureError> {
        let mut changed = false;

        if !self.auth_add.is_empty() {
            self.add_auths(backend).await?;
            changed = true;
        }
        if !self.auth_disable.is_empty() {
            self.disable_auths(backend).await?;
            changed = true;
        }

        if !changed {
            return Ok(None);
        }
        Ok(Some(backend.list_auth().await?))
    }

    pub async fn add_auths(&self, backend: &dyn SysBackend) -> Result<(), ConfigureError> {
        if self.auth_add.is_empty() {
            return Err(ConfigureError::RequestMapEmpty(ConfigAction::AuthAdd));
        }

        for (path, meta) in &self.auth_add {
            let input: AuthInput = read_json(&meta.full_path).await?;
            info!("Enabling {} auth backend at {}", input.auth_type, path);
            backend.enable_auth(path, &input).await?;
        }
        Ok(())
    }

    /// Disable requests are driven by the path alone; file contents are ignored.
    pub async fn disable_auths(&self, backend: &dyn SysBackend) -> Result<(), ConfigureError> {
        if self.auth_disable.is_empty() {
            return Err(ConfigureError::RequestMapEmpty(ConfigAction::AuthDisable));
        }

        for path in self.auth_disable.keys() {
            info!("Disabling auth backend {}", path);
            backend.disable_auth(path).await?;
        }
        Ok(())
    }
}
