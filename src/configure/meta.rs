use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The kinds of change a configuration bundle can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigAction {
    MountAdd,
    MountTune,
    AuthAdd,
    AuthDisable,
    PolicyAdd,
    PolicyDisable,
}

impl ConfigAction {
    pub const ALL: [ConfigAction; 6] = [
        ConfigAction::MountAdd,
        ConfigAction::MountTune,
        ConfigAction::AuthAdd,
        ConfigAction::AuthDisable,
        ConfigAction::PolicyAdd,
        ConfigAction::PolicyDisable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigAction::MountAdd => "mount-add",
            ConfigAction::MountTune => "mount-tune",
            ConfigAction::AuthAdd => "auth-add",
            ConfigAction::AuthDisable => "auth-disable",
            ConfigAction::PolicyAdd => "policy-add",
            ConfigAction::PolicyDisable => "policy-disable",
        }
    }

    /// Message reported when an executor is handed an empty request map.
    pub fn empty_request_message(&self) -> &'static str {
        match self {
            ConfigAction::MountAdd => {
                "no valid vault configuration requests submitted for adding /sys/mounts/"
            }
            ConfigAction::MountTune => {
                "no valid vault configuration requests submitted for tuning /sys/mounts/"
            }
            ConfigAction::AuthAdd => {
                "no valid vault configuration requests submitted for adding /sys/auth/"
            }
            ConfigAction::AuthDisable => {
                "no valid vault configuration requests submitted for deleting /sys/auth/"
            }
            ConfigAction::PolicyAdd => {
                "no valid vault configuration requests submitted for adding /sys/policy/"
            }
            ConfigAction::PolicyDisable => {
                "no valid vault configuration requests submitted for deleting /sys/policy/"
            }
        }
    }
}

impl fmt::Display for ConfigAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered configuration file and what it asks Vault to do.
///
/// Discovery fills `full_path`, `base_path` and `file`; classification fills
/// the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPathMeta {
    pub full_path: PathBuf,
    pub base_path: PathBuf,
    #[serde(rename = "vault_base_path")]
    pub vault_end_point: String,
    pub config_path: String,
    pub action: Option<ConfigAction>,
    pub file: String,
}

impl ConfigPathMeta {
    pub fn discovered(full_path: PathBuf, base_path: PathBuf, file: String) -> Self {
        Self {
            full_path,
            base_path,
            vault_end_point: String::new(),
            config_path: String::new(),
            action: None,
            file,
        }
    }
}
