//! The proxy's public operations.
//!
//! [`ProxyService`] does the work; [`LoggingMiddleware`] and
//! [`InstrumentingMiddleware`] wrap any [`Service`] and add a log line and
//! request metrics to every call. [`new_service`] assembles the usual stack.

use crate::configure::{ConfigOptions, ConfigState, Configurator, ConfigureError};
use crate::holders::{run_blocking, HolderError, TokenHolder, TokenHolderSink, TokenType};
use crate::interface::ClientFactory;
use crate::metrics::record_request;
use crate::vault::sys::{InitRequest, InitResponse, SealStatusResponse};
use crate::vault::VaultError;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Configure(#[from] ConfigureError),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("vault was initialized but recording token holders failed: {0}")]
    Holder(#[from] HolderError),
}

impl ProxyError {
    /// Whether the caller sent something unusable.
    pub fn is_client_error(&self) -> bool {
        match self {
            ProxyError::InvalidRequest(_) => true,
            ProxyError::Configure(e) => e.is_client_error(),
            _ => false,
        }
    }
}

/// Options of an init call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitOptions {
    pub secret_shares: u32,
    pub secret_threshold: u32,
    pub stored_shares: u32,
    pub pgp_keys: Vec<String>,
    pub recovery_shares: u32,
    pub recovery_threshold: u32,
    pub recovery_pgp_keys: Vec<String>,
    pub root_token_pgp_key: String,
    pub root_token_holder_email: String,
    /// One address per secret share, matched to keys by position.
    pub secret_key_holder_emails: Vec<String>,
}

impl InitOptions {
    pub fn validate(&self) -> Result<(), ProxyError> {
        let emails = self.secret_key_holder_emails.len();
        if emails > 0 && emails != self.secret_shares as usize {
            return Err(ProxyError::InvalidRequest(format!(
                "{} secret key holder emails given for {} secret shares",
                emails, self.secret_shares
            )));
        }
        Ok(())
    }

    fn to_request(&self) -> InitRequest {
        InitRequest {
            secret_shares: self.secret_shares,
            secret_threshold: self.secret_threshold,
            stored_shares: self.stored_shares,
            pgp_keys: self.pgp_keys.clone(),
            recovery_shares: self.recovery_shares,
            recovery_threshold: self.recovery_threshold,
            recovery_pgp_keys: self.recovery_pgp_keys.clone(),
            root_token_pgp_key: self.root_token_pgp_key.clone(),
        }
    }
}

/// Key material returned by an init.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitKeys {
    pub keys: Vec<String>,
    pub keys_base64: Vec<String>,
    pub recovery_keys: Vec<String>,
    pub recovery_keys_base64: Vec<String>,
    pub root_token: String,
}

impl From<InitResponse> for InitKeys {
    fn from(resp: InitResponse) -> Self {
        Self {
            keys: resp.keys,
            keys_base64: resp.keys_base64,
            recovery_keys: resp.recovery_keys,
            recovery_keys_base64: resp.recovery_keys_base64,
            root_token: resp.root_token,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealState {
    pub sealed: bool,
    pub t: u32,
    pub n: u32,
    pub progress: u32,
    pub version: String,
    pub cluster_name: String,
    pub cluster_id: String,
}

impl From<SealStatusResponse> for SealState {
    fn from(resp: SealStatusResponse) -> Self {
        Self {
            sealed: resp.sealed,
            t: resp.t,
            n: resp.n,
            progress: resp.progress,
            version: resp.version,
            cluster_name: resp.cluster_name.unwrap_or_default(),
            cluster_id: resp.cluster_id.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnsealOptions {
    pub key: String,
    pub reset: bool,
}

impl UnsealOptions {
    pub fn validate(&self) -> Result<(), ProxyError> {
        if !self.reset && self.key.is_empty() {
            return Err(ProxyError::InvalidRequest(
                "'key' must be specified, or 'reset' set to true".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
pub trait Service: Send + Sync {
    async fn init_status(&self) -> Result<bool, ProxyError>;

    async fn init(&self, opts: InitOptions) -> Result<InitKeys, ProxyError>;

    async fn seal_status(&self) -> Result<SealState, ProxyError>;

    async fn unseal(&self, opts: UnsealOptions) -> Result<SealState, ProxyError>;

    async fn configure(&self, opts: ConfigOptions) -> Result<ConfigState, ProxyError>;
}

/// Talks to Vault through a fresh client per call.
pub struct ProxyService {
    factory: Arc<dyn ClientFactory>,
    configurator: Configurator,
    holders: Option<Arc<dyn TokenHolderSink>>,
}

impl ProxyService {
    pub fn new(factory: Arc<dyn ClientFactory>, configurator: Configurator) -> Self {
        Self {
            factory,
            configurator,
            holders: None,
        }
    }

    pub fn with_holders(mut self, holders: Arc<dyn TokenHolderSink>) -> Self {
        self.holders = Some(holders);
        self
    }

    async fn record_holders(
        &self,
        opts: &InitOptions,
        resp: &InitResponse,
    ) -> Result<(), ProxyError> {
        let now = Utc::now();
        let mut holders = Vec::new();

        if !opts.root_token_holder_email.is_empty() {
            holders.push(TokenHolder::new(
                &opts.root_token_holder_email,
                &resp.root_token,
                TokenType::Root,
                now,
            ));
        }
        for (email, key) in opts.secret_key_holder_emails.iter().zip(&resp.keys) {
            holders.push(TokenHolder::new(email, key, TokenType::Unseal, now));
        }

        if holders.is_empty() {
            return Ok(());
        }
        match &self.holders {
            Some(sink) => {
                let sink = sink.clone();
                Ok(run_blocking(move || sink.save_holders(&holders)).await?)
            }
            None => {
                warn!(
                    "No token holder registry configured; {} holders not recorded",
                    holders.len()
                );
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Service for ProxyService {
    async fn init_status(&self) -> Result<bool, ProxyError> {
        let client = self.factory.connect(None)?;
        Ok(client.init_status().await?)
    }

    async fn init(&self, opts: InitOptions) -> Result<InitKeys, ProxyError> {
        opts.validate()?;
        let client = self.factory.connect(None)?;
        let resp = client.init(&opts.to_request()).await?;
        info!(
            "Vault initialized with {} key shares, threshold {}",
            resp.keys.len(),
            opts.secret_threshold
        );
        self.record_holders(&opts, &resp).await?;
        Ok(resp.into())
    }

    async fn seal_status(&self) -> Result<SealState, ProxyError> {
        let client = self.factory.connect(None)?;
        Ok(client.seal_status().await?.into())
    }

    async fn unseal(&self, opts: UnsealOptions) -> Result<SealState, ProxyError> {
        opts.validate()?;
        let client = self.factory.connect(None)?;
        let resp = if opts.reset {
            client.unseal_reset().await?
        } else {
            client.unseal(&opts.key).await?
        };
        Ok(resp.into())
    }

    async fn configure(&self, opts: ConfigOptions) -> Result<ConfigState, ProxyError> {
        let request = self.configurator.prepare(&opts).await?;
        let client = self.factory.connect(Some(&request.token))?;
        Ok(request.handle_requests(client.as_ref()).await?)
    }
}

/// Logs one line per call: method, outcome and duration. Results are not
/// logged since they carry key material.
pub struct LoggingMiddleware {
    next: Arc<dyn Service>,
}

impl LoggingMiddleware {
    pub fn new(next: Arc<dyn Service>) -> Self {
        Self { next }
    }
}

fn log_outcome<T>(method: &'static str, started: Instant, result: &Result<T, ProxyError>) {
    let took = started.elapsed();
    match result {
        Ok(_) => info!(method, ?took, "request handled"),
        Err(e) => warn!(method, ?took, error = %e, "request failed"),
    }
}

#[async_trait]
impl Service for LoggingMiddleware {
    async fn init_status(&self) -> Result<bool, ProxyError> {
        let started = Instant::now();
        let result = self.next.init_status().await;
        log_outcome("InitStatus", started, &result);
        result
    }

    async fn init(&self, opts: InitOptions) -> Result<InitKeys, ProxyError> {
        let started = Instant::now();
        let result = self.next.init(opts).await;
        log_outcome("Init", started, &result);
        result
    }

    async fn seal_status(&self) -> Result<SealState, ProxyError> {
        let started = Instant::now();
        let result = self.next.seal_status().await;
        log_outcome("SealStatus", started, &result);
        result
    }

    async fn unseal(&self, opts: UnsealOptions) -> Result<SealState, ProxyError> {
        let started = Instant::now();
        let result = self.next.unseal(opts).await;
        log_outcome("Unseal", started, &result);
        result
    }

    async fn configure(&self, opts: ConfigOptions) -> Result<ConfigState, ProxyError> {
        let started = Instant::now();
        let result = self.next.configure(opts).await;
        log_outcome("Configure", started, &result);
        result
    }
}

/// Records request count and latency per method and outcome.
pub struct InstrumentingMiddleware {
    next: Arc<dyn Service>,
}

impl InstrumentingMiddleware {
    pub fn new(next: Arc<dyn Service>) -> Self {
        Self { next }
    }
}

#[async_trait]
impl Service for InstrumentingMiddleware {
    async fn init_status(&self) -> Result<bool, ProxyError> {
        let started = Instant::now();
        let result = self.next.init_status().await;
        record_request("InitStatus", result.is_err(), started.elapsed());
        result
    }

    async fn init(&self, opts: InitOptions) -> Result<InitKeys, ProxyError> {
        let started = Instant::now();
        let result = self.next.init(opts).await;
        record_request("Init", result.is_err(), started.elapsed());
        result
    }

    async fn seal_status(&self) -> Result<SealState, ProxyError> {
        let started = Instant::now();
        let result = self.next.seal_status().await;
        record_request("SealStatus", result.is_err(), started.elapsed());
        result
    }

    async fn unseal(&self, opts: UnsealOptions) -> Result<SealState, ProxyError> {
        let started = Instant::now();
        let result = self.next.unseal(opts).await;
        record_request("Unseal", result.is_err(), started.elapsed());
        result
    }

    async fn configure(&self, opts: ConfigOptions) -> Result<ConfigState, ProxyError> {
        let started = Instant::now();
        let result = self.next.configure(opts).await;
        record_request("Configure", result.is_err(), started.elapsed());
        result
    }
}

/// A [`ProxyService`] wrapped in logging, then instrumentation.
pub fn new_service(proxy: ProxyService) -> Arc<dyn Service> {
    let svc: Arc<dyn Service> = Arc::new(proxy);
    let svc: Arc<dyn Service> = Arc::new(LoggingMiddleware::new(svc));
    Arc::new(InstrumentingMiddleware::new(svc))
}
