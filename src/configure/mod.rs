//! The configuration engine.
//!
//! A Configure call fetches a declarative bundle into a fresh staging
//! directory, classifies the JSON files under its `data/` directory by the
//! Vault endpoint they target, applies them namespace by namespace (mounts,
//! then auth backends, then policies) and returns Vault's listings for every
//! namespace it touched.
//!
//! Changes are applied until the first failure. Nothing is rolled back, so a
//! failed call can leave Vault partially configured; re-running the bundle is
//! the recovery path.

pub mod auths;
pub mod classify;
pub mod error;
pub mod meta;
pub mod mounts;
pub mod policies;
pub mod retrieve;

pub use classify::{classify, files_by_ext, Classified, Namespace};
pub use error::ConfigureError;
pub use meta::{ConfigAction, ConfigPathMeta};
pub use retrieve::{new_request_id, DefaultGetter, Getter};

use crate::interface::SysBackend;
use crate::vault::sys::{AuthMountOutput, MountOutput};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const BUNDLE_DATA_DIR: &str = "data";
const CONFIG_FILE_EXT: &str = ".json";

/// Caller input of a Configure call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOptions {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub token: String,
}

impl ConfigOptions {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
        }
    }

    /// Both fields are required.
    pub fn validate(&self) -> Result<(), ConfigureError> {
        if self.url.is_empty() {
            return Err(ConfigureError::Validation(
                "ConfigOptions.URL validation failed on 'required' check".into(),
            ));
        }
        if self.token.is_empty() {
            return Err(ConfigureError::Validation(
                "ConfigOptions.Token validation failed on 'required' check".into(),
            ));
        }
        Ok(())
    }
}

/// Vault's state after a Configure call.
///
/// A namespace that had no requests is `None`, which is distinct from a
/// namespace that now lists nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigState {
    pub config_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mounts: Option<BTreeMap<String, MountOutput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auths: Option<BTreeMap<String, AuthMountOutput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policies: Option<Vec<String>>,
}

/// The working state of one Configure call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigRequest {
    pub config_id: String,
    #[serde(skip)]
    pub token: String,
    pub source_dir: PathBuf,
    /// Action kinds present, in discovery order, each at most once.
    pub actions: Vec<ConfigAction>,
    pub mount_add: BTreeMap<String, ConfigPathMeta>,
    pub mount_tune: BTreeMap<String, ConfigPathMeta>,
    pub auth_add: BTreeMap<String, ConfigPathMeta>,
    pub auth_disable: BTreeMap<String, ConfigPathMeta>,
    pub policy_add: BTreeMap<String, ConfigPathMeta>,
    pub policy_disable: BTreeMap<String, ConfigPathMeta>,
}

impl ConfigRequest {
    /// Discovers and classifies every configuration file under `source_dir`.
    pub fn scan(config_id: &str, token: &str, source_dir: &Path) -> Self {
        let mut request = ConfigRequest {
            config_id: config_id.to_string(),
            token: token.to_string(),
            source_dir: source_dir.to_path_buf(),
            ..Default::default()
        };
        request.categorize();
        request
    }

    fn categorize(&mut self) {
        let metaset = files_by_ext(&self.source_dir, CONFIG_FILE_EXT);
        for namespace in Namespace::ALL {
            let classified = classify(&metaset, namespace);
            self.absorb(namespace, classified);
        }
    }

    fn absorb(&mut self, namespace: Namespace, classified: Classified) {
        let Classified { add, change } = classified;
        let add_action = namespace.add_action();
        let change_action = namespace.change_action();

        if !add.is_empty() {
            self.actions.push(add_action);
        }
        if !change.is_empty() {
            self.actions.push(change_action);
        }
        *self.requests_mut(add_action) = add;
        *self.requests_mut(change_action) = change;
    }

    /// The request map backing `action`.
    pub fn requests(&self, action: ConfigAction) -> &BTreeMap<String, ConfigPathMeta> {
        match action {
            ConfigAction::MountAdd => &self.mount_add,
            ConfigAction::MountTune => &self.mount_tune,
            ConfigAction::AuthAdd => &self.auth_add,
            ConfigAction::AuthDisable => &self.auth_disable,
            ConfigAction::PolicyAdd => &self.policy_add,
            ConfigAction::PolicyDisable => &self.policy_disable,
        }
    }

    fn requests_mut(&mut self, action: ConfigAction) -> &mut BTreeMap<String, ConfigPathMeta> {
        match action {
            ConfigAction::MountAdd => &mut self.mount_add,
            ConfigAction::MountTune => &mut self.mount_tune,
            ConfigAction::AuthAdd => &mut self.auth_add,
            ConfigAction::AuthDisable => &mut self.auth_disable,
            ConfigAction::PolicyAdd => &mut self.policy_add,
            ConfigAction::PolicyDisable => &mut self.policy_disable,
        }
    }

    /// Applies every classified request and collects the resulting listings.
    pub async fn handle_requests(
        &self,
        backend: &dyn SysBackend,
    ) -> Result<ConfigState, ConfigureError> {
        let mut state = ConfigState {
            config_id: self.config_id.clone(),
            ..Default::default()
        };

        if self.has_mount_requests() {
            state.mounts = self.handle_mounts(backend).await?;
        }
        if self.has_auth_requests() {
            state.auths = self.handle_auths(backend).await?;
        }
        if self.has_policy_requests() {
            state.policies = self.handle_policies(backend).await?;
        }

        Ok(state)
    }

    /// Human-readable report of every classified request.
    pub fn dump_meta(&self) -> String {
        let mut out = String::new();
        for action in ConfigAction::ALL {
            let _ = writeln!(out, "{}:", action);
            let requests = self.requests(action);
            if requests.is_empty() {
                let _ = writeln!(out, "  no requests found");
                continue;
            }
            for (path, meta) in requests {
                let _ = writeln!(out, "  path: {:?}", path);
                let _ = writeln!(out, "    full path: {:?}", meta.full_path);
                let _ = writeln!(out, "    base: {:?}", meta.base_path);
                let _ = writeln!(out, "    vault endpoint: {:?}", meta.vault_end_point);
                let _ = writeln!(out, "    file: {:?}", meta.file);
            }
        }
        out
    }
}

/// Reads and decodes one classified file.
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigureError> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| ConfigureError::io(path, e))?;
    serde_json::from_slice(&raw).map_err(|source| ConfigureError::Deserialize {
        path: path.to_path_buf(),
        source,
    })
}

/// Validates Configure requests and turns them into classified [`ConfigRequest`]s.
#[derive(Clone)]
pub struct Configurator {
    staging_root: Option<PathBuf>,
    getter: Arc<dyn Getter>,
}

impl Configurator {
    pub fn new(staging_root: Option<PathBuf>) -> Self {
        Self::with_getter(staging_root, Arc::new(DefaultGetter::new()))
    }

    pub fn with_getter(staging_root: Option<PathBuf>, getter: Arc<dyn Getter>) -> Self {
        Self {
            staging_root,
            getter,
        }
    }

    pub fn staging_root(&self) -> Option<&Path> {
        self.staging_root
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// The staging root must be configured and be an existing directory.
    pub fn check_staging_root(&self) -> Result<&Path, ConfigureError> {
        let root = self.staging_root().ok_or(ConfigureError::DestUnset)?;
        match fs::metadata(root) {
            Ok(meta) if meta.is_dir() => Ok(root),
            Ok(_) => Err(ConfigureError::DestStatFail {
                path: root.to_path_buf(),
                source: std::io::Error::other("not a directory"),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ConfigureError::DestDoesNotExist(root.to_path_buf()))
            }
            Err(source) => Err(ConfigureError::DestStatFail {
                path: root.to_path_buf(),
                source,
            }),
        }
    }

    /// Runs every check that precedes contacting Vault, fetching the bundle
    /// along the way.
    pub async fn prepare(&self, opts: &ConfigOptions) -> Result<ConfigRequest, ConfigureError> {
        let root = self.check_staging_root()?;
        opts.validate()?;

        let request_id = new_request_id();
        let dest = root.join(&request_id);
        info!("Fetching {} for request {}", opts.url, request_id);
        self.getter.get(&dest, &opts.url).await?;

        let data = dest.join(BUNDLE_DATA_DIR);
        match fs::metadata(&data) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(ConfigureError::SrcMalformed),
            Err(e) => return Err(ConfigureError::io(&data, e)),
        }

        let token = opts.token.clone();
        let request = tokio::task::spawn_blocking(move || {
            ConfigRequest::scan(&request_id, &token, &data)
        })
        .await
        .map_err(|e| ConfigureError::Retrieval(format!("scan task failed: {}", e)))?;
        debug!("Classified configuration requests:\n{}", request.dump_meta());

        if request.actions.is_empty() {
            return Err(ConfigureError::SrcReqEmpty);
        }
        Ok(request)
    }
}

impl std::fmt::Debug for Configurator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configurator")
            .field("staging_root", &self.staging_root)
            .finish()
    }
}
