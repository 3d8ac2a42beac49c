//! Shared helpers for the integration tests: bundle staging on disk, plus the
//! crate's in-memory Vault re-exported for convenience.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub use vault_armor::testing::{FakeFactory, FakeVault};

/// Set up logging for tests
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// A configuration bundle laid out on disk, plus a staging root to fetch it into.
pub struct Bundle {
    pub source: TempDir,
    pub staging: TempDir,
}

impl Bundle {
    /// An empty bundle with a `data/` directory.
    pub fn new() -> Self {
        let bundle = Self::without_data();
        fs::create_dir_all(bundle.source.path().join("data")).unwrap();
        bundle
    }

    /// A bundle that does not follow the layout.
    pub fn without_data() -> Self {
        Self {
            source: tempfile::tempdir().unwrap(),
            staging: tempfile::tempdir().unwrap(),
        }
    }

    /// Writes `body` to `data/<rel>`.
    pub fn file(self, rel: &str, body: &str) -> Self {
        let path = self.source.path().join("data").join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
        self
    }

    /// Writes `body` to `<rel>` outside `data/`.
    pub fn raw_file(self, rel: &str, body: &str) -> Self {
        let path = self.source.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
        self
    }

    pub fn url(&self) -> String {
        self.source.path().display().to_string()
    }

    pub fn staging_root(&self) -> PathBuf {
        self.staging.path().to_path_buf()
    }

    /// Request directories created under the staging root so far.
    pub fn staged(&self) -> Vec<PathBuf> {
        list_dirs(self.staging.path())
    }
}

fn list_dirs(root: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(root)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs
}

pub const POSTGRES_MOUNT: &str = r#"{
  "type": "database",
  "description": "postgres credentials",
  "config": {"default_lease_ttl": "7h", "max_lease_ttl": "21h"}
}"#;

pub const AWS_MOUNT: &str = r#"{
  "type": "aws",
  "description": "aws credentials",
  "config": {"default_lease_ttl": "8h", "max_lease_ttl": "24h"}
}"#;
