use vault_armor::{cli, init_logging};

#[actix_rt::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    cli::run_cli().await
}
