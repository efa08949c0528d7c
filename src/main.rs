use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use kubegate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let mut config = Config::from_env()?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    config.apply_args(&args)?;

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let data_dir = config
        .data_dir
        .as_ref()
        .map(|d| d.display().to_string())
        .unwrap_or_else(|| kubegate::config::IN_MEMORY.to_string());
    info!(
        target: "startup",
        "kubegate starting: RUST_LOG='{}', http_port={}, data_dir='{}', token_ttl_secs={}, policy_file={:?}",
        rust_log,
        config.http_port,
        data_dir,
        config.token_ttl.as_secs(),
        config.policy_file
    );

    kubegate::server::run(config).await
}
