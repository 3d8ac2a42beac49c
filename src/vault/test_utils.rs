use std::time::Duration;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};
use tracing::{debug, info};

const VAULT_IMAGE: &str = "hashicorp/vault";
const VAULT_TAG: &str = "1.13.3";

/// How the Vault container should start.
#[derive(Debug, Clone, Copy)]
pub enum VaultMode {
    /// Uninitialized and sealed, backed by file storage.
    Regular,
    /// Dev server: initialized, unsealed, root token `root`.
    Dev,
}

/// A running Vault container and the address it answers on.
pub struct VaultContainer {
    pub address: String,
    _container: ContainerAsync<GenericImage>,
}

/// Starts a Vault container and waits until its HTTP API answers.
pub async fn start_vault(mode: VaultMode) -> VaultContainer {
    info!("Setting up Vault container in {:?} mode", mode);

    let request = match mode {
        VaultMode::Dev => GenericImage::new(VAULT_IMAGE, VAULT_TAG)
            .with_exposed_port(8200.tcp())
            .with_wait_for(WaitFor::message_on_stdout("Vault server started!"))
            .with_env_var("VAULT_DEV_ROOT_TOKEN_ID", "root")
            .with_env_var("VAULT_DEV_LISTEN_ADDRESS", "0.0.0.0:8200")
            .with_cmd(vec!["server", "-dev", "-dev-root-token-id=root"]),
        VaultMode::Regular => {
            let local_config = r#"
            {"storage": {"file": {"path": "/vault/file"}},
             "listener": [{"tcp": { "address": "0.0.0.0:8200", "tls_disable": true}}],
             "default_lease_ttl": "168h", "max_lease_ttl": "720h"}
            "#;
            GenericImage::new(VAULT_IMAGE, VAULT_TAG)
                .with_exposed_port(8200.tcp())
                .with_wait_for(WaitFor::message_on_stdout("Vault server started!"))
                .with_env_var("VAULT_LOCAL_CONFIG", local_config)
                .with_cmd(vec!["server"])
                .with_cap_add("IPC_LOCK")
        }
    };

    let container = request.start().await.expect("Failed to start container");
    let port = container
        .get_host_port_ipv4(8200)
        .await
        .expect("Failed to map Vault port");
    let address = format!("http://127.0.0.1:{}", port);
    wait_for_vault(&address, 30, 500)
        .await
        .expect("Vault did not come up");

    VaultContainer {
        address,
        _container: container,
    }
}

/// Polls `sys/seal-status` until it answers; works for sealed servers too.
pub async fn wait_for_vault(
    vault_addr: &str,
    max_retries: usize,
    retry_delay_ms: u64,
) -> Result<(), String> {
    let client = reqwest::Client::new();
    let url = format!("{}/v1/sys/seal-status", vault_addr);

    for attempt in 1..=max_retries {
        match client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                info!("Vault answering after {} attempts", attempt);
                return Ok(());
            }
            Ok(response) => debug!("Vault not ready yet (status: {})", response.status()),
            Err(e) => debug!("Connection to Vault failed (attempt {}): {}", attempt, e),
        }
        tokio::time::sleep(Duration::from_millis(retry_delay_ms)).await;
    }

    Err(format!("Vault not ready after {} attempts", max_retries))
}
