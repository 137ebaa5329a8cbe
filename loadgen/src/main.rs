use anyhow::Context;
use clap::Parser;
use log::info;

use iris_loadgen::{runner, LoadConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .format_module_path(false)
        .init();

    let config = LoadConfig::parse();
    let summary = runner::run(config).await.context("load test failed")?;

    info!("Load test finished");
    println!("{}", summary);
    Ok(())
}
