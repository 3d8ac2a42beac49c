//! Builds authenticated, TLS-configured Vault clients.
//!
//! Settings are layered: values from the application configuration win, and
//! anything left unset falls back to the environment variables understood by
//! the Vault CLI (`VAULT_ADDR`, `VAULT_CACERT`, ...).

use crate::interface::{ClientFactory, SysBackend};
use crate::vault::client::DEFAULT_MAX_RETRIES;
use crate::vault::{VaultClient, VaultError};
use reqwest::{Certificate, Client, Identity};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Address used when neither configuration nor environment names one.
pub const DEFAULT_VAULT_ADDRESS: &str = "https://127.0.0.1:8200";

/// Vault connection settings taken from the application configuration.
///
/// `None` (or an empty string) means "not configured here", which defers to the
/// environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSettings {
    pub address: Option<String>,
    pub ca_cert: Option<String>,
    pub ca_path: Option<String>,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
    pub skip_verify: Option<bool>,
}

/// Fully resolved connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVaultConfig {
    pub address: String,
    pub ca_cert: Option<String>,
    pub ca_path: Option<String>,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
    pub skip_verify: bool,
    pub max_retries: u32,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

/// Parses a boolean the way Vault's CLI does; anything else is rejected.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

impl VaultSettings {
    /// Resolves against the process environment.
    pub fn resolve(&self) -> Result<ResolvedVaultConfig, VaultError> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolves against an arbitrary variable lookup.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<ResolvedVaultConfig, VaultError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let address = non_empty(&self.address)
            .or_else(|| env("VAULT_ADDRESS"))
            .or_else(|| env("VAULT_ADDR"))
            .unwrap_or_else(|| DEFAULT_VAULT_ADDRESS.to_string());

        let skip_verify = match self.skip_verify {
            Some(flag) => flag,
            None => match env("VAULT_SKIP_VERIFY") {
                Some(raw) => parse_bool(&raw).ok_or_else(|| {
                    VaultError::Config(format!("could not parse VAULT_SKIP_VERIFY '{}'", raw))
                })?,
                None => false,
            },
        };

        let max_retries = match env("VAULT_MAX_RETRIES") {
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                VaultError::Config(format!("could not parse VAULT_MAX_RETRIES '{}'", raw))
            })?,
            None => DEFAULT_MAX_RETRIES,
        };

        Ok(ResolvedVaultConfig {
            address,
            ca_cert: non_empty(&self.ca_cert).or_else(|| env("VAULT_CACERT")),
            ca_path: non_empty(&self.ca_path).or_else(|| env("VAULT_CAPATH")),
            client_cert: non_empty(&self.client_cert).or_else(|| env("VAULT_CLIENT_CERT")),
            client_key: non_empty(&self.client_key).or_else(|| env("VAULT_CLIENT_KEY")),
            skip_verify,
            max_retries,
        })
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, VaultError> {
    fs::read(path).map_err(|e| VaultError::Tls(format!("reading {}: {}", path.display(), e)))
}

impl ResolvedVaultConfig {
    /// Builds the HTTP client carrying the TLS settings.
    pub fn http_client(&self) -> Result<Client, VaultError> {
        let mut builder = Client::builder().timeout(Duration::from_secs(60));

        if let Some(ca_cert) = &self.ca_cert {
            let pem = read_file(Path::new(ca_cert))?;
            for cert in Certificate::from_pem_bundle(&pem)
                .map_err(|e| VaultError::Tls(format!("CA cert {}: {}", ca_cert, e)))?
            {
                builder = builder.add_root_certificate(cert);
            }
        }

        if let Some(ca_path) = &self.ca_path {
            let entries = fs::read_dir(ca_path)
                .map_err(|e| VaultError::Tls(format!("CA path {}: {}", ca_path, e)))?;
            for entry in entries {
                let path = entry
                    .map_err(|e| VaultError::Tls(format!("CA path {}: {}", ca_path, e)))?
                    .path();
                let is_cert = matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("pem") | Some("crt")
                );
                if !is_cert {
                    continue;
                }
                let pem = read_file(&path)?;
                for cert in Certificate::from_pem_bundle(&pem)
                    .map_err(|e| VaultError::Tls(format!("CA cert {}: {}", path.display(), e)))?
                {
                    builder = builder.add_root_certificate(cert);
                }
            }
        }

        match (&self.client_cert, &self.client_key) {
            (Some(cert), Some(key)) => {
                let cert_pem = read_file(Path::new(cert))?;
                let key_pem = read_file(Path::new(key))?;
                let identity = Identity::from_pkcs8_pem(&cert_pem, &key_pem)
                    .map_err(|e| VaultError::Tls(format!("client identity: {}", e)))?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(VaultError::Tls(
                    "client certificate and client key must be supplied together".into(),
                ))
            }
        }

        if self.skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder
            .build()
            .map_err(|e| VaultError::Network(format!("Failed to create HTTP client: {}", e)))
    }
}

/// The production [`ClientFactory`]: dials Vault afresh for every operation.
#[derive(Debug, Clone, Default)]
pub struct VaultClientFactory {
    settings: VaultSettings,
}

impl VaultClientFactory {
    pub fn new(settings: VaultSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &VaultSettings {
        &self.settings
    }

    /// Builds a concrete client, useful where the trait object is not needed.
    pub fn build(&self, token: Option<&str>) -> Result<VaultClient, VaultError> {
        let resolved = self.settings.resolve()?;
        debug!("Connecting to Vault at {}", resolved.address);
        let http = resolved.http_client()?;
        Ok(VaultClient::with_http_client(
            &resolved.address,
            token.unwrap_or_default(),
            http,
            resolved.max_retries,
        ))
    }
}

impl ClientFactory for VaultClientFactory {
    fn connect(&self, token: Option<&str>) -> Result<Arc<dyn SysBackend>, VaultError> {
        Ok(Arc::new(self.build(token)?))
    }
}
