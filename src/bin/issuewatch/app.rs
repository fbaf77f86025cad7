use std::path::PathBuf;

use chrono::Utc;
use issuewatch::Result;
use issuewatch::cache::CacheStore;
use issuewatch::config::Config;
use issuewatch::github_client::GitHubClient;
use issuewatch::notify::Dispatcher;
use issuewatch::run::run_once;
use issuewatch::telemetry::init_tracing;
use tracing::info;

use super::cli::Cli;

const DEFAULT_CONFIG: &str = "config.json";

pub async fn run(cli: Cli) -> Result<()> {
    init_tracing(cli.log_filter.as_deref(), cli.json_logs)?;

    let config_path = cli
        .config
        .or_else(|| std::env::var("CONFIG_FILE").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = Config::from_env_and_file(&config_path)?;

    let client = GitHubClient::new(
        config.api_url.clone(),
        config.token.clone(),
        config.http_request_timeout,
        config.http_connect_timeout,
    )?;
    let dispatcher = Dispatcher::new(config.http_request_timeout)?;
    let store = CacheStore::new(config.cache_dir.clone());

    let report = run_once(
        &client,
        &dispatcher,
        &store,
        &config,
        Utc::now(),
        cli.dry_run,
    )
    .await?;

    info!(
        fetched = report.fetched,
        dispatched = report.dispatched,
        "monitor run completed"
    );
    Ok(())
}
