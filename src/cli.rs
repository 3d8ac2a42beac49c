use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{ArmorConfig, ConfigOverrides};
use crate::configure::{ConfigOptions, Configurator};
use crate::health::{HealthState, ReadinessChecks};
use crate::holders::{DatabaseManager, TokenHolderSink};
use crate::interface::ClientFactory;
use crate::metrics::MetricsRecorder;
use crate::server::{start_server, AdminState};
use crate::service::{new_service, InitOptions, ProxyService, Service, UnsealOptions};
use crate::vault::VaultClientFactory;

#[derive(Parser, Debug)]
#[command(
    name = "armor",
    about = "Proxy in front of HashiCorp Vault (init, unseal and declarative configuration)",
    version
)]
pub struct Cli {
    /// Optional TOML config file.
    #[arg(long, env = "ARMOR_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: OverrideArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags that override the config file.
#[derive(Args, Debug, Default)]
pub struct OverrideArgs {
    #[arg(long, env = "ARMOR_ADMIN_ADDRESS", global = true)]
    pub admin_address: Option<String>,

    #[arg(long, env = "ARMOR_HTTP_ADDRESS", global = true)]
    pub http_address: Option<String>,

    #[arg(long, env = "ARMOR_VAULT_ADDRESS", global = true)]
    pub vault_address: Option<String>,

    #[arg(long, env = "ARMOR_VAULT_CA_CERT", global = true)]
    pub vault_ca_cert: Option<String>,

    #[arg(long, env = "ARMOR_VAULT_CA_PATH", global = true)]
    pub vault_ca_path: Option<String>,

    #[arg(long, env = "ARMOR_VAULT_CLIENT_CERT", global = true)]
    pub vault_client_cert: Option<String>,

    #[arg(long, env = "ARMOR_VAULT_CLIENT_KEY", global = true)]
    pub vault_client_key: Option<String>,

    #[arg(
        long,
        env = "ARMOR_VAULT_SKIP_VERIFY",
        global = true,
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub vault_skip_verify: Option<bool>,

    /// Staging root for fetched configuration bundles.
    #[arg(long, env = "ARMOR_POLICY_CONFIG_DIR", global = true)]
    pub policy_config_dir: Option<PathBuf>,

    /// SQLite file recording token holders.
    #[arg(long = "holder-db", env = "ARMOR_HOLDER_DB", global = true)]
    pub holder_db_path: Option<PathBuf>,
}

impl From<OverrideArgs> for ConfigOverrides {
    fn from(a: OverrideArgs) -> Self {
        ConfigOverrides {
            admin_address: a.admin_address,
            http_address: a.http_address,
            vault_address: a.vault_address,
            vault_ca_cert: a.vault_ca_cert,
            vault_ca_path: a.vault_ca_path,
            vault_client_cert: a.vault_client_cert,
            vault_client_key: a.vault_client_key,
            vault_skip_verify: a.vault_skip_verify,
            policy_config_dir: a.policy_config_dir,
            holder_db_path: a.holder_db_path,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP and admin listeners.
    Serve,
    /// Report whether Vault is initialized.
    InitStatus,
    /// Report Vault's seal state.
    SealStatus,
    /// Submit one unseal key, or reset unseal progress.
    Unseal {
        #[arg(long, value_name = "UNSEAL_KEY")]
        key: Option<String>,
        #[arg(long)]
        reset: bool,
    },
    /// Initialize Vault and record the token holders.
    Init {
        #[arg(long, default_value_t = 5)]
        secret_shares: u32,
        #[arg(long, default_value_t = 3)]
        secret_threshold: u32,
        #[arg(long, default_value_t = 0)]
        stored_shares: u32,
        #[arg(long, value_delimiter = ',')]
        pgp_keys: Vec<String>,
        #[arg(long, default_value_t = 0)]
        recovery_shares: u32,
        #[arg(long, default_value_t = 0)]
        recovery_threshold: u32,
        #[arg(long, value_delimiter = ',')]
        recovery_pgp_keys: Vec<String>,
        #[arg(long, default_value = "")]
        root_token_pgp_key: String,
        #[arg(long, default_value = "")]
        root_token_holder_email: String,
        /// One address per secret share, comma separated.
        #[arg(long, value_delimiter = ',')]
        secret_key_holder_emails: Vec<String>,
    },
    /// Apply a configuration bundle to Vault.
    Configure {
        /// Local directory, file:// URL or http(s) .tar.gz archive.
        #[arg(long)]
        url: String,
        #[arg(long, env = "VAULT_TOKEN")]
        token: String,
    },
}

fn open_holders(path: &Path) -> Option<Arc<dyn TokenHolderSink>> {
    match DatabaseManager::new(path) {
        Ok(db) => {
            info!("Token holder registry at {}", path.display());
            Some(Arc::new(db))
        }
        Err(e) => {
            error!("Failed to open token holder registry {}: {}", path.display(), e);
            None
        }
    }
}

fn build_service(
    config: &ArmorConfig,
    factory: Arc<dyn ClientFactory>,
    holders: Option<Arc<dyn TokenHolderSink>>,
) -> Arc<dyn Service> {
    let mut proxy = ProxyService::new(factory, Configurator::new(config.policy_config_dir.clone()));
    if let Some(holders) = holders {
        proxy = proxy.with_holders(holders);
    }
    new_service(proxy)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn serve(config: ArmorConfig, factory: Arc<dyn ClientFactory>) -> Result<()> {
    let metrics = match MetricsRecorder::install() {
        Ok(recorder) => Some(recorder),
        Err(e) => {
            warn!("Metrics recorder not installed: {}", e);
            None
        }
    };

    let holders = open_holders(&config.holder_db_path);
    let service = build_service(&config, factory.clone(), holders.clone());
    let admin = AdminState {
        health: Arc::new(HealthState::default()),
        checks: Arc::new(ReadinessChecks::new(
            holders,
            config.policy_config_dir.clone(),
            factory,
        )),
        metrics,
    };

    start_server(&config.http_address, &config.admin_address, service, admin)
        .await
        .context("server stopped")
}

/// Runs one parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let config = ArmorConfig::load(cli.config.as_deref(), cli.overrides.into())?;
    let factory: Arc<dyn ClientFactory> =
        Arc::new(VaultClientFactory::new(config.vault_settings()));

    match cli.command {
        Commands::Serve => serve(config, factory).await?,

        Commands::InitStatus => {
            let service = build_service(&config, factory, None);
            let initialized = service.init_status().await?;
            print_json(&serde_json::json!({ "initialized": initialized }))?;
        }

        Commands::SealStatus => {
            let service = build_service(&config, factory, None);
            print_json(&service.seal_status().await?)?;
        }

        Commands::Unseal { key, reset } => {
            let service = build_service(&config, factory, None);
            let state = service
                .unseal(UnsealOptions {
                    key: key.unwrap_or_default(),
                    reset,
                })
                .await?;
            print_json(&state)?;
        }

        Commands::Init {
            secret_shares,
            secret_threshold,
            stored_shares,
            pgp_keys,
            recovery_shares,
            recovery_threshold,
            recovery_pgp_keys,
            root_token_pgp_key,
            root_token_holder_email,
            secret_key_holder_emails,
        } => {
            let opts = InitOptions {
                secret_shares,
                secret_threshold,
                stored_shares,
                pgp_keys,
                recovery_shares,
                recovery_threshold,
                recovery_pgp_keys,
                root_token_pgp_key,
                root_token_holder_email,
                secret_key_holder_emails,
            };
            let holders = if opts.root_token_holder_email.is_empty()
                && opts.secret_key_holder_emails.is_empty()
            {
                None
            } else {
                open_holders(&config.holder_db_path)
            };
            let service = build_service(&config, factory, holders);
            let keys = service.init(opts).await?;
            print_json(&serde_json::json!({ "init": keys }))?;
        }

        Commands::Configure { url, token } => {
            let service = build_service(&config, factory, None);
            print_json(&service.configure(ConfigOptions::new(url, token)).await?)?;
        }
    }
    Ok(())
}

pub async fn run_cli() -> Result<()> {
    run(Cli::parse()).await
}
