//! Application configuration.
//!
//! Values are layered, highest precedence first: command line flag, `ARMOR_*`
//! environment variable (both handled by clap in `cli.rs`), the optional TOML
//! file, then the defaults below.

use crate::vault::VaultSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_ADMIN_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_HTTP_ADDRESS: &str = "0.0.0.0:8081";
pub const DEFAULT_POLICY_CONFIG_DIR: &str = "/tmp/armor/policy";
pub const DEFAULT_HOLDER_DB_PATH: &str = "armor_holders.db";

#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("reading config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Everything the proxy needs to run, passed explicitly to the components
/// that use it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmorConfig {
    pub admin_address: String,
    pub http_address: String,
    pub vault_address: Option<String>,
    pub vault_ca_cert: Option<String>,
    pub vault_ca_path: Option<String>,
    pub vault_client_cert: Option<String>,
    pub vault_client_key: Option<String>,
    pub vault_skip_verify: Option<bool>,
    /// Staging root for fetched configuration bundles.
    pub policy_config_dir: Option<PathBuf>,
    pub holder_db_path: PathBuf,
}

impl Default for ArmorConfig {
    fn default() -> Self {
        Self {
            admin_address: DEFAULT_ADMIN_ADDRESS.to_string(),
            http_address: DEFAULT_HTTP_ADDRESS.to_string(),
            vault_address: None,
            vault_ca_cert: None,
            vault_ca_path: None,
            vault_client_cert: None,
            vault_client_key: None,
            vault_skip_verify: None,
            policy_config_dir: Some(PathBuf::from(DEFAULT_POLICY_CONFIG_DIR)),
            holder_db_path: PathBuf::from(DEFAULT_HOLDER_DB_PATH),
        }
    }
}

/// Values supplied on the command line or through `ARMOR_*` variables.
/// `None` leaves the lower layers in charge.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub admin_address: Option<String>,
    pub http_address: Option<String>,
    pub vault_address: Option<String>,
    pub vault_ca_cert: Option<String>,
    pub vault_ca_path: Option<String>,
    pub vault_client_cert: Option<String>,
    pub vault_client_key: Option<String>,
    pub vault_skip_verify: Option<bool>,
    pub policy_config_dir: Option<PathBuf>,
    pub holder_db_path: Option<PathBuf>,
}

impl ArmorConfig {
    /// Parses a TOML document; keys it leaves out keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Reads a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigFileError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw).map_err(|source| ConfigFileError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Builds the effective configuration from an optional file plus overrides.
    pub fn load(file: Option<&Path>, overrides: ConfigOverrides) -> Result<Self, ConfigFileError> {
        let base = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(base.with_overrides(overrides))
    }

    pub fn with_overrides(mut self, o: ConfigOverrides) -> Self {
        if let Some(v) = o.admin_address {
            self.admin_address = v;
        }
        if let Some(v) = o.http_address {
            self.http_address = v;
        }
        if let Some(v) = o.holder_db_path {
            self.holder_db_path = v;
        }
        self.vault_address = o.vault_address.or(self.vault_address);
        self.vault_ca_cert = o.vault_ca_cert.or(self.vault_ca_cert);
        self.vault_ca_path = o.vault_ca_path.or(self.vault_ca_path);
        self.vault_client_cert = o.vault_client_cert.or(self.vault_client_cert);
        self.vault_client_key = o.vault_client_key.or(self.vault_client_key);
        self.vault_skip_verify = o.vault_skip_verify.or(self.vault_skip_verify);
        self.policy_config_dir = o.policy_config_dir.or(self.policy_config_dir);
        self
    }

    /// The subset handed to the Vault client factory.
    pub fn vault_settings(&self) -> VaultSettings {
        VaultSettings {
            address: self.vault_address.clone(),
            ca_cert: self.vault_ca_cert.clone(),
            ca_path: self.vault_ca_path.clone(),
            client_cert: self.vault_client_cert.clone(),
            client_key: self.vault_client_key.clone(),
            skip_verify: self.vault_skip_verify,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_applied() {
        let config = ArmorConfig::default();
        assert_eq!(config.admin_address, "0.0.0.0:8080");
        assert_eq!(config.http_address, "0.0.0.0:8081");
        assert_eq!(
            config.policy_config_dir.as_deref(),
            Some(Path::new("/tmp/armor/policy"))
        );
        assert_eq!(config.vault_settings(), VaultSettings::default());
    }

    #[test]
    fn toml_file_keeps_defaults_for_missing_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            concat!(
                "vault_address = \"https://vault:8200\"\n",
                "vault_skip_verify = true\n",
                "policy_config_dir = \"/srv/armor\""
            )
        )
        .unwrap();

        let config = ArmorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.admin_address, DEFAULT_ADMIN_ADDRESS);
        assert_eq!(config.vault_address.as_deref(), Some("https://vault:8200"));
        assert_eq!(config.vault_skip_verify, Some(true));
        assert_eq!(config.policy_config_dir, Some(PathBuf::from("/srv/armor")));
    }

    #[test]
    fn overrides_beat_the_file() {
        let base = ArmorConfig::from_toml_str(
            "http_address = \"127.0.0.1:9000\"\nvault_ca_cert = \"/file/ca.pem\"",
        )
        .unwrap();
        let config = base.with_overrides(ConfigOverrides {
            vault_ca_cert: Some("/flag/ca.pem".into()),
            ..Default::default()
        });
        assert_eq!(config.http_address, "127.0.0.1:9000");
        assert_eq!(config.vault_ca_cert.as_deref(), Some("/flag/ca.pem"));
    }

    #[test]
    fn unreadable_file_is_reported() {
        let err = ArmorConfig::load(Some(Path::new("/nonexistent/armor.toml")), Default::default())
            .unwrap_err();
        assert!(matches!(err, ConfigFileError::Io { .. }));
    }
}
