//! `/sys/policy/` requests: writing and deleting ACL policies.

use crate::configure::{read_json, ConfigAction, ConfigRequest, ConfigureError};
use crate::interface::SysBackend;
use serde::{Deserialize, Serialize};
use tracing::info;

/// On-disk shape of a policy-add file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyInput {
    pub rules: String,
}

impl ConfigRequest {
    pub fn has_policy_requests(&self) -> bool {
        !self.policy_add.is_empty() || !self.policy_disable.is_empty()
    }

    /// Applies policy writes then deletes, and re-lists policies if anything ran.
    pub async fn handle_policies(
        &self,
        backend: &dyn SysBackend,
    ) -> Result<Option<Vec<String>>, ConfigureError> {
        let mut changed = false;

        if !self.policy_add.is_empty() {
            self.add_policies(backend).await?;
            changed = true;
        }
        if !self.policy_disable.is_empty() {
            self.delete_policies(backend).await?;
            changed = true;
        }

        if !changed {
            return Ok(None);
        }
        Ok(Some(backend.list_policies().await?))
    }

    pub async fn add_policies(&self, backend: &dyn SysBackend) -> Result<(), ConfigureError> {
        if self.policy_add.is_empty() {
            return Err(ConfigureError::RequestMapEmpty(ConfigAction::PolicyAdd));
        }

        for (name, meta) in &self.policy_add {
            let input: PolicyInput = read_json(&meta.full_path).await?;
            info!("Writing policy {}", name);
            backend.put_policy(name, &input.rules).await?;
        }
        Ok(())
    }

    pub async fn delete_policies(&self, backend: &dyn SysBackend) -> Result<(), ConfigureError> {
        if self.policy_disable.is_empty() {
            return Err(ConfigureError::RequestMapEmpty(ConfigAction::PolicyDisable));
        }

        for name in self.policy_disable.keys() {
            info!("Deleting policy {}", name);
            backend.delete_policy(name).await?;
        }
        Ok(())
    }
}
