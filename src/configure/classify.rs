//! Discovery and classification of configuration files.
//!
//! A file's namespace and action come from the directory it sits in,
//! relative to the bundle's `data/` root:
//!
//! ```text
//! /sys/mounts/<path>/          mount-add
//! /sys/mounts/<path>/tune/     mount-tune
//! /sys/auth/<path>/            auth-add
//! /sys/auth/<path>/disable/    auth-disable
//! /sys/policy/<path>/          policy-add
//! /sys/policy/<path>/disable/  policy-disable
//! ```

use crate::configure::meta::{ConfigAction, ConfigPathMeta};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

const TUNE_SUFFIX: &str = "/tune/";
const DISABLE_SUFFIX: &str = "/disable/";
const ADD_SUFFIX: &str = "/";

/// The Vault configuration namespaces a bundle may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Mounts,
    Auth,
    Policy,
}

/// What the trailing directories of a path ask for, before the namespace
/// decides whether it supports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathShape {
    Tune,
    Disable,
    Add,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [Namespace::Mounts, Namespace::Auth, Namespace::Policy];

    pub fn literal(&self) -> &'static str {
        match self {
            Namespace::Mounts => "/sys/mounts/",
            Namespace::Auth => "/sys/auth/",
            Namespace::Policy => "/sys/policy/",
        }
    }

    pub fn add_action(&self) -> ConfigAction {
        match self {
            Namespace::Mounts => ConfigAction::MountAdd,
            Namespace::Auth => ConfigAction::AuthAdd,
            Namespace::Policy => ConfigAction::PolicyAdd,
        }
    }

    /// The tune action for mounts, the disable action for auth and policy.
    pub fn change_action(&self) -> ConfigAction {
        match self {
            Namespace::Mounts => ConfigAction::MountTune,
            Namespace::Auth => ConfigAction::AuthDisable,
            Namespace::Policy => ConfigAction::PolicyDisable,
        }
    }

    /// `None` marks a shape the namespace does not support.
    pub fn action_for(&self, shape: PathShape) -> Option<ConfigAction> {
        match (self, shape) {
            (_, PathShape::Add) => Some(self.add_action()),
            (Namespace::Mounts, PathShape::Tune) => Some(ConfigAction::MountTune),
            (Namespace::Auth, PathShape::Disable) => Some(ConfigAction::AuthDisable),
            (Namespace::Policy, PathShape::Disable) => Some(ConfigAction::PolicyDisable),
            // No unmount call exists, and auth/policy cannot be tuned.
            (Namespace::Mounts, PathShape::Disable) => None,
            (_, PathShape::Tune) => None,
        }
    }
}

/// Splits a namespace-relative directory into its shape and config path.
/// Suffixes are tried in order: `/tune/`, `/disable/`, then the bare `/`.
pub fn path_shape(rest: &str) -> Option<(PathShape, &str)> {
    [
        (PathShape::Tune, TUNE_SUFFIX),
        (PathShape::Disable, DISABLE_SUFFIX),
        (PathShape::Add, ADD_SUFFIX),
    ]
    .iter()
    .find_map(|(shape, suffix)| rest.strip_suffix(suffix).map(|path| (*shape, path)))
}

/// Directory of the file relative to the scanned root, as `/a/b/c/`.
pub fn relative_dir(meta: &ConfigPathMeta) -> Option<String> {
    let parent = meta.full_path.parent()?;
    let rel = parent.strip_prefix(&meta.base_path).ok()?;
    let mut out = String::from("/");
    for component in rel.components() {
        out.push_str(&component.as_os_str().to_string_lossy());
        out.push('/');
    }
    Some(out)
}

/// Classified requests of one namespace, keyed by config path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classified {
    pub add: BTreeMap<String, ConfigPathMeta>,
    /// Tune requests for mounts, disable requests for auth and policy.
    pub change: BTreeMap<String, ConfigPathMeta>,
}

/// Sorts discovered files into the add and change maps of `namespace`.
///
/// Files outside the namespace are ignored. A later file with the same config
/// path replaces an earlier one.
pub fn classify(metaset: &[ConfigPathMeta], namespace: Namespace) -> Classified {
    let mut out = Classified::default();
    let literal = namespace.literal();

    for meta in metaset {
        let Some(dir) = relative_dir(meta) else {
            continue;
        };
        let Some(rest) = dir.strip_prefix(literal) else {
            continue;
        };
        let Some((shape, config_path)) = path_shape(rest) else {
            continue;
        };

        let Some(action) = namespace.action_for(shape) else {
            warn!(
                "Skipping {}: {:?} is not supported under {}",
                meta.full_path.display(),
                shape,
                literal
            );
            continue;
        };

        let mut meta = meta.clone();
        meta.vault_end_point = literal.to_string();
        meta.config_path = config_path.to_string();
        meta.action = Some(action);

        let target = if action == namespace.add_action() {
            &mut out.add
        } else {
            &mut out.change
        };
        target.insert(config_path.to_string(), meta);
    }

    out
}

/// Recursively finds files under `search_path` whose name ends with `ext`.
///
/// A missing search path yields no files. Entries are visited in file name
/// order so classification is deterministic.
pub fn files_by_ext(search_path: &Path, ext: &str) -> Vec<ConfigPathMeta> {
    if !search_path.exists() {
        return Vec::new();
    }

    let files: Vec<ConfigPathMeta> = WalkDir::new(search_path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_string_lossy().ends_with(ext))
        .map(|e| {
            ConfigPathMeta::discovered(
                e.path().to_path_buf(),
                search_path.to_path_buf(),
                e.file_name().to_string_lossy().into_owned(),
            )
        })
        .collect();

    debug!("Found {} {} files under {}", files.len(), ext, search_path.display());
    files
}
