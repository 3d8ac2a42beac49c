use crate::configure::meta::ConfigAction;
use crate::vault::VaultError;
use std::path::PathBuf;

/// Failures of a Configure call, one variant per reportable condition.
#[derive(Debug, thiserror::Error)]
pub enum ConfigureError {
    #[error("policy download dest not set in config")]
    DestUnset,

    #[error("policy download dest does not exist: {0}")]
    DestDoesNotExist(PathBuf),

    #[error("policy download dest failed being stat'd: {path}: {source}")]
    DestStatFail {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Validation(String),

    #[error("{0}: no such file or directory")]
    SrcDoesNotExist(String),

    #[error("policy source {src} contains the staging directory {dest}")]
    SrcContainsDest { src: PathBuf, dest: PathBuf },

    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error("policy source does not follow prescribed layout")]
    SrcMalformed,

    #[error("no valid vault configuration files were found in source directory submitted")]
    SrcReqEmpty,

    #[error("{}", .0.empty_request_message())]
    RequestMapEmpty(ConfigAction),

    #[error("decoding {path}: {source}")]
    Deserialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Vault(#[from] VaultError),
}

impl ConfigureError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigureError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the caller sent something unusable, as opposed to a server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ConfigureError::Validation(_)
                | ConfigureError::SrcMalformed
                | ConfigureError::SrcReqEmpty
                | ConfigureError::SrcContainsDest { .. }
        )
    }
}
