mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};
use pr_review_bot::api::metrics::init_metrics;
use pr_review_bot::config::Config;
use pr_review_bot::dispatch::{DispatchSettings, Dispatcher};
use pr_review_bot::github::{GitHubClient, GitHubTokenExchange, InstallationTokenCache};
use pr_review_bot::review::PullRequestProcessor;
use pr_review_bot::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Check => cli::run_check(&config),
    }
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!("Starting pr-review-bot v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!(?config, "Loaded configuration");

    // A bad key is fatal before any traffic is accepted
    let signer = Arc::new(cli::build_signer(&config)?);
    signer
        .sign()
        .context("GitHub App private key check failed")?;
    tracing::info!(app_id = signer.app_id(), "GitHub App private key loaded");

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.github.http_timeout_seconds))
        .build()
        .context("Failed to build HTTP client")?;

    let exchange = Arc::new(GitHubTokenExchange::new(
        http.clone(),
        config.github.api_base_url.clone(),
    ));
    let tokens = Arc::new(InstallationTokenCache::new(
        config.github.installation_id()?,
        signer,
        exchange,
        chrono::Duration::minutes(i64::from(config.github.token_cache_buffer_minutes)),
    ));
    let github = Arc::new(GitHubClient::new(http, &config.github.api_base_url, tokens)?);
    let processor = Arc::new(PullRequestProcessor::new(github));

    let metrics_handle = init_metrics().context("Failed to install metrics recorder")?;

    let dispatcher = Arc::new(Dispatcher::start(DispatchSettings::from(&config.dispatch)));
    let settings = dispatcher.settings();
    tracing::info!(
        min_workers = settings.min_workers,
        max_workers = settings.max_workers,
        queue_capacity = settings.queue_capacity,
        keep_alive_secs = settings.keep_alive.as_secs(),
        "Dispatcher started"
    );

    let state = Arc::new(
        AppState::new(config.clone(), dispatcher.clone(), processor)?.with_metrics(metrics_handle),
    );

    let app = pr_review_bot::api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Webhook server listening on http://{}", addr);
    tracing::info!("GitHub webhook endpoint: POST {}", pr_review_bot::api::WEBHOOK_ENDPOINT);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let accepted pull requests finish processing
    dispatcher.shutdown().await;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
