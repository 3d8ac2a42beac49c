//! Client implementation for Vault API interactions.
//!
//! This module provides a client for making HTTP requests to the Vault API
//! with appropriate authentication, retry and error handling.

use crate::interface::SysBackend;
use crate::vault::sys::{
    self, AuthInput, AuthMountOutput, InitRequest, InitResponse, LeaseConfigInput, MountInput,
    MountOutput, SealStatusResponse,
};
use crate::vault::VaultError;
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, Method, StatusCode,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Number of retries Vault's own client performs when `VAULT_MAX_RETRIES` is unset.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Client for interacting with the Vault HTTP API.
pub struct VaultClient {
    /// Base URL of the Vault server
    pub addr: String,
    /// Auth token for Vault API requests
    pub token: String,
    /// HTTP client for making requests
    client: Client,
    /// Custom headers to add to requests
    custom_headers: HeaderMap,
    /// Extra attempts after a connection failure or 5xx response
    max_retries: u32,
}

impl VaultClient {
    /// Creates a new VaultClient with the specified address and token.
    pub fn new(addr: &str, token: &str) -> Result<Self, VaultError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| VaultError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_http_client(addr, token, client, DEFAULT_MAX_RETRIES))
    }

    /// Wraps an already configured HTTP client (TLS settings, timeouts).
    pub fn with_http_client(addr: &str, token: &str, client: Client, max_retries: u32) -> Self {
        Self {
            addr: addr.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
            custom_headers: HeaderMap::new(),
            max_retries,
        }
    }

    /// Replaces the token used for subsequent requests.
    pub fn set_token(&mut self, token: &str) {
        self.token = token.to_string();
    }

    /// Adds a custom header to the client.
    pub fn add_header(&mut self, name: &str, value: &str) -> &mut Self {
        if let (Ok(header_name), Ok(header_value)) =
            (HeaderName::from_str(name), HeaderValue::from_str(value))
        {
            self.custom_headers.insert(header_name, header_value);
        }
        self
    }

    /// Makes a GET request to the Vault API.
    pub async fn get(&self, path: &str) -> Result<Value, VaultError> {
        self.request(Method::GET, path, None).await
    }

    /// Makes a POST request to the Vault API with a JSON body.
    pub async fn post_with_body(&self, path: &str, body: Value) -> Result<Value, VaultError> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// Makes a PUT request to the Vault API with a JSON body.
    pub async fn put_with_body(&self, path: &str, body: Value) -> Result<Value, VaultError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    /// Makes a DELETE request to the Vault API.
    pub async fn delete(&self, path: &str) -> Result<Value, VaultError> {
        self.request(Method::DELETE, path, None).await
    }

    /// Sends a request, retrying transient failures up to `max_retries` times.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, VaultError> {
        let mut attempt = 0;
        loop {
            match self.send_once(method.clone(), path, body.as_ref()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "Vault request {} {} failed ({}), retry {}/{}",
                        method, path, e, attempt, self.max_retries
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, VaultError> {
        let url = format!("{}{}", self.addr, path);
        debug!("Vault request {} {}", method, url);
        let mut request = self.client.request(method, &url);

        if !self.token.is_empty() {
            request = request.header("X-Vault-Token", &self.token);
        }

        for (name, value) in self.custom_headers.iter() {
            request = request.header(name, value);
        }

        if let Some(json_body) = body {
            request = request.json(json_body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                VaultError::Connection(e.to_string())
            } else {
                VaultError::Network(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(VaultError::HttpStatus(
                status.as_u16(),
                vault_error_message(&error_text),
            ));
        }

        // Return an empty JSON object for 204 No Content responses
        if status == StatusCode::NO_CONTENT {
            return Ok(json!({}));
        }

        let text = response
            .text()
            .await
            .map_err(|e| VaultError::ParseError(format!("Failed to read response: {}", e)))?;
        if text.trim().is_empty() {
            return Ok(json!({}));
        }
        serde_json::from_str(&text)
            .map_err(|e| VaultError::ParseError(format!("Failed to parse response: {}", e)))
    }
}

/// Joins Vault's `{"errors": [...]}` body into one message, or returns the raw body.
fn vault_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|val| {
            val.get("errors").and_then(|v| v.as_array()).map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e.as_str())
                    .collect::<Vec<_>>()
                    .join("; ")
            })
        })
        .filter(|msg| !msg.is_empty())
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl SysBackend for VaultClient {
    async fn init_status(&self) -> Result<bool, VaultError> {
        let body = self.get("/v1/sys/init").await?;
        body.get("initialized")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| VaultError::ParseError("init status missing 'initialized'".into()))
    }

    async fn init(&self, req: &InitRequest) -> Result<InitResponse, VaultError> {
        let body = self
            .put_with_body("/v1/sys/init", serde_json::to_value(req)?)
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn seal_status(&self) -> Result<SealStatusResponse, VaultError> {
        let body = self.get("/v1/sys/seal-status").await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn unseal(&self, key: &str) -> Result<SealStatusResponse, VaultError> {
        let body = self
            .put_with_body("/v1/sys/unseal", json!({ "key": key }))
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn unseal_reset(&self) -> Result<SealStatusResponse, VaultError> {
        let body = self
            .put_with_body("/v1/sys/unseal", json!({ "reset": true }))
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn list_mounts(&self) -> Result<BTreeMap<String, MountOutput>, VaultError> {
        sys::parse_mount_listing(self.get("/v1/sys/mounts").await?)
    }

    async fn mount(&self, path: &str, input: &MountInput) -> Result<(), VaultError> {
        self.post_with_body(
            &format!("/v1/sys/mounts/{}", path),
            serde_json::to_value(input)?,
        )
        .await?;
        Ok(())
    }

    async fn tune_mount(&self, path: &str, config: &LeaseConfigInput) -> Result<(), VaultError> {
        self.post_with_body(
            &format!("/v1/sys/mounts/{}/tune", path),
            serde_json::to_value(config)?,
        )
        .await?;
        Ok(())
    }

    async fn list_auth(&self) -> Result<BTreeMap<String, AuthMountOutput>, VaultError> {
        sys::parse_mount_listing(self.get("/v1/sys/auth").await?)
    }

    async fn enable_auth(&self, path: &str, input: &AuthInput) -> Result<(), VaultError> {
        self.post_with_body(
            &format!("/v1/sys/auth/{}", path),
            serde_json::to_value(input)?,
        )
        .await?;
        Ok(())
    }

    async fn disable_auth(&self, path: &str) -> Result<(), VaultError> {
        self.delete(&format!("/v1/sys/auth/{}", path)).await?;
        Ok(())
    }

    async fn list_policies(&self) -> Result<Vec<String>, VaultError> {
        sys::parse_policy_listing(self.get("/v1/sys/policy").await?)
    }

    async fn put_policy(&self, name: &str, rules: &str) -> Result<(), VaultError> {
        self.put_with_body(
            &format!("/v1/sys/policy/{}", name),
            json!({ "rules": rules }),
        )
        .await?;
        Ok(())
    }

    async fn delete_policy(&self, name: &str) -> Result<(), VaultError> {
        self.delete(&format!("/v1/sys/policy/{}", name)).await?;
        Ok(())
    }
}
