//! Request and response shapes of the Vault `sys/` endpoints used by the proxy.
//!
//! Field names follow Vault's HTTP API so the structs serialize directly onto
//! the wire.

use crate::vault::VaultError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Body of `PUT /v1/sys/init`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InitRequest {
    pub secret_shares: u32,
    pub secret_threshold: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub stored_shares: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pgp_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub recovery_shares: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub recovery_threshold: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recovery_pgp_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub root_token_pgp_key: String,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

/// Response of `PUT /v1/sys/init`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InitResponse {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub keys_base64: Vec<String>,
    #[serde(default)]
    pub recovery_keys: Vec<String>,
    #[serde(default)]
    pub recovery_keys_base64: Vec<String>,
    pub root_token: String,
}

/// Response of `GET /v1/sys/seal-status` and `PUT /v1/sys/unseal`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SealStatusResponse {
    #[serde(rename = "type", default)]
    pub seal_type: String,
    #[serde(default)]
    pub initialized: bool,
    pub sealed: bool,
    #[serde(default)]
    pub t: u32,
    #[serde(default)]
    pub n: u32,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub cluster_name: Option<String>,
    #[serde(default)]
    pub cluster_id: Option<String>,
}

/// Lease settings as submitted to Vault, durations as strings such as `"24h"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaseConfigInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_lease_ttl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_lease_ttl: Option<String>,
}

impl LeaseConfigInput {
    pub fn is_empty(&self) -> bool {
        self.default_lease_ttl.is_none() && self.max_lease_ttl.is_none()
    }
}

/// Body of `POST /v1/sys/mounts/<path>`; also the on-disk shape of a mount-add file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MountInput {
    #[serde(rename = "type")]
    pub mount_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "LeaseConfigInput::is_empty")]
    pub config: LeaseConfigInput,
}

/// Body of `POST /v1/sys/auth/<path>`; also the on-disk shape of an auth-add file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthInput {
    #[serde(rename = "type")]
    pub auth_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "LeaseConfigInput::is_empty")]
    pub config: LeaseConfigInput,
}

/// Lease settings as reported by Vault, in seconds. Zero means "system default".
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaseConfigOutput {
    #[serde(default)]
    pub default_lease_ttl: u64,
    #[serde(default)]
    pub max_lease_ttl: u64,
}

/// One entry of a mount or auth listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MountOutput {
    #[serde(rename = "type")]
    pub mount_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub config: LeaseConfigOutput,
}

/// Auth backends are listed with the same shape as secret mounts.
pub type AuthMountOutput = MountOutput;

/// Parses the body of `GET /v1/sys/mounts` or `GET /v1/sys/auth`.
///
/// Vault has returned the listing both at the top level and wrapped in `data`;
/// both are accepted. Only keys ending in `/` are mount paths, the rest are
/// response metadata (`request_id`, `lease_id`, ...).
pub fn parse_mount_listing(body: Value) -> Result<BTreeMap<String, MountOutput>, VaultError> {
    let root = match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Object(data)) => data,
            _ => map,
        },
        other => {
            return Err(VaultError::ParseError(format!(
                "expected a JSON object for mount listing, got {}",
                other
            )))
        }
    };

    let mut out = BTreeMap::new();
    for (path, entry) in root {
        if !path.ends_with('/') || !entry.is_object() {
            continue;
        }
        let mount: MountOutput = serde_json::from_value(entry)
            .map_err(|e| VaultError::ParseError(format!("mount '{}': {}", path, e)))?;
        out.insert(path, mount);
    }
    Ok(out)
}

/// Parses the body of `GET /v1/sys/policy`.
pub fn parse_policy_listing(body: Value) -> Result<Vec<String>, VaultError> {
    let policies = body
        .get("data")
        .and_then(|d| d.get("policies"))
        .or_else(|| body.get("policies"))
        .or_else(|| body.get("data").and_then(|d| d.get("keys")))
        .and_then(|v| v.as_array())
        .ok_or_else(|| VaultError::ParseError("policy listing has no 'policies' array".into()))?;

    Ok(policies
        .iter()
        .filter_map(|p| p.as_str())
        .map(|p| p.to_string())
        .collect())
}
