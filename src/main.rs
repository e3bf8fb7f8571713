use anyhow::Result;
use clap::Parser;
use tracing::info;

use wizarr::bootstrap::Launcher;
use wizarr::config::AppConfig;
use wizarr::infrastructure::logger;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    logger::init();

    let cfg = AppConfig::parse();
    info!("starting wizarr {} ({} store)", wizarr::VERSION, cfg.store_type);

    Launcher::with_config(cfg).launch().await?;
    Ok(())
}
