#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {0}: {1}")]
    HttpStatus(u16, String),

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("Client configuration error: {0}")]
    Config(String),

    #[error("Error from reqwest: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VaultError {
    /// Whether a retry could plausibly succeed (connection failures and 5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            VaultError::Connection(_) | VaultError::Network(_) => true,
            VaultError::HttpStatus(code, _) => *code >= 500,
            VaultError::Reqwest(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}
