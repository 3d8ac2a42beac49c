//! Fetching configuration bundles into the staging root.
//!
//! Supported sources:
//! - a local directory, given as a path or a `file://` URL, copied recursively
//! - an `http://` or `https://` URL to a `.tar.gz`/`.tgz` archive, downloaded
//!   and unpacked

use crate::configure::ConfigureError;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;
use walkdir::WalkDir;

/// A collision-free, time-sortable, path-safe request identifier.
pub fn new_request_id() -> String {
    Uuid::now_v7().to_string()
}

/// Copies or downloads `url` into `dest`, creating `dest` as needed.
#[async_trait]
pub trait Getter: Send + Sync {
    async fn get(&self, dest: &Path, url: &str) -> Result<(), ConfigureError>;
}

/// Where a source URL points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Local(PathBuf),
    Archive(String),
}

/// Picks the getter for a source URL.
pub fn detect(url: &str) -> Result<Source, ConfigureError> {
    if let Some(path) = url.strip_prefix("file://") {
        return Ok(Source::Local(PathBuf::from(path)));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            return Ok(Source::Archive(url.to_string()));
        }
        return Err(ConfigureError::Retrieval(format!(
            "unsupported source url {}: only .tar.gz/.tgz archives can be fetched over http",
            url
        )));
    }
    if url.contains("://") {
        return Err(ConfigureError::Retrieval(format!(
            "unsupported source url {}",
            url
        )));
    }
    Ok(Source::Local(PathBuf::from(url)))
}

/// Dispatches on the URL scheme.
#[derive(Debug, Clone, Default)]
pub struct DefaultGetter {
    http: reqwest::Client,
}

impl DefaultGetter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Getter for DefaultGetter {
    async fn get(&self, dest: &Path, url: &str) -> Result<(), ConfigureError> {
        match detect(url)? {
            Source::Local(src) => LocalGetter.get(dest, &src.to_string_lossy()).await,
            Source::Archive(url) => {
                ArchiveGetter {
                    http: self.http.clone(),
                }
                .get(dest, &url)
                .await
            }
        }
    }
}

/// Recursive copy of a local directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalGetter;

#[async_trait]
impl Getter for LocalGetter {
    async fn get(&self, dest: &Path, url: &str) -> Result<(), ConfigureError> {
        let src = PathBuf::from(url.strip_prefix("file://").unwrap_or(url));
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || copy_dir(&src, &dest))
            .await
            .map_err(|e| ConfigureError::Retrieval(format!("copy task failed: {}", e)))?
    }
}

fn copy_dir(src: &Path, dest: &Path) -> Result<(), ConfigureError> {
    if !src.exists() {
        return Err(ConfigureError::SrcDoesNotExist(src.display().to_string()));
    }
    if !src.is_dir() {
        return Err(ConfigureError::Retrieval(format!(
            "source {} is not a directory",
            src.display()
        )));
    }

    let src_real = fs::canonicalize(src).map_err(|e| ConfigureError::io(src, e))?;
    if resolve_dest(dest).starts_with(&src_real) {
        return Err(ConfigureError::SrcContainsDest {
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
        });
    }

    info!("Copying {} into {}", src.display(), dest.display());
    fs::create_dir_all(dest).map_err(|e| ConfigureError::io(dest, e))?;

    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(|e| ConfigureError::Retrieval(e.to_string()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| ConfigureError::Retrieval(e.to_string()))?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| ConfigureError::io(&target, e))?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target).map_err(|e| ConfigureError::io(entry.path(), e))?;
        }
    }
    Ok(())
}

/// Canonical form of a path that may not exist yet: the deepest existing
/// ancestor is resolved and the rest appended.
fn resolve_dest(dest: &Path) -> PathBuf {
    let mut missing = Vec::new();
    let mut current = dest;
    loop {
        if let Ok(real) = fs::canonicalize(current) {
            return missing.iter().rev().fold(real, |acc, part| acc.join(part));
        }
        match (current.parent(), current.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                current = parent;
            }
            _ => return dest.to_path_buf(),
        }
    }
}

/// Download and unpack of a gzipped tarball.
#[derive(Debug, Clone, Default)]
pub struct ArchiveGetter {
    http: reqwest::Client,
}

#[async_trait]
impl Getter for ArchiveGetter {
    async fn get(&self, dest: &Path, url: &str) -> Result<(), ConfigureError> {
        info!("Downloading {}", url);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ConfigureError::Retrieval(format!("{}: {}", url, e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ConfigureError::SrcDoesNotExist(url.to_string()));
        }
        if !status.is_success() {
            return Err(ConfigureError::Retrieval(format!(
                "{}: bad response code {}",
                url, status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ConfigureError::Retrieval(format!("{}: {}", url, e)))?;
        debug!("Downloaded {} bytes from {}", body.len(), url);

        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || unpack(&body, &dest))
            .await
            .map_err(|e| ConfigureError::Retrieval(format!("unpack task failed: {}", e)))?
    }
}

fn unpack(bytes: &[u8], dest: &Path) -> Result<(), ConfigureError> {
    fs::create_dir_all(dest).map_err(|e| ConfigureError::io(dest, e))?;
    let mut archive = tar::Archive::new(GzDecoder::new(Cursor::new(bytes)));
    archive
        .unpack(dest)
        .map_err(|e| ConfigureError::Retrieval(format!("unpacking archive: {}", e)))
}
