use market_resolver::chain::AlloyChainGateway;
use market_resolver::clock::SystemClock;
use market_resolver::config::Config;
use market_resolver::datasource::HttpDataSource;
use market_resolver::queue::{JobReport, QueueSettings, ResolutionQueue};
use market_resolver::resolution::resolver::Resolver;
use market_resolver::resolution::ResolutionState;
use market_resolver::webhook::{self, WebhookState};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

const CONFIG_FILE: &str = "resolver.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = if Path::new(CONFIG_FILE).exists() {
        Config::load(Path::new(CONFIG_FILE))?
    } else {
        Config::from_env()?
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    info!("market-resolver v{} starting", env!("CARGO_PKG_VERSION"));
    config.validate()?;

    // --- Collaborators ---
    let chain = Arc::new(AlloyChainGateway::connect(&config.chain)?);
    let data = Arc::new(HttpDataSource::new(
        config.data_source.base_url.clone(),
        Duration::from_millis(config.data_source.timeout_ms),
    )?);
    let clock = Arc::new(SystemClock);

    let resolver = Arc::new(Resolver::new(
        chain,
        data,
        clock.clone(),
        &config.resolver,
    ));

    // --- Queue ---
    let (report_tx, mut report_rx) = mpsc::unbounded_channel::<JobReport>();
    let queue = ResolutionQueue::start(
        resolver,
        QueueSettings {
            concurrency: config.resolver.batch_size,
            rate_interval: config.resolver.rate_interval(),
        },
        Some(report_tx),
    );

    let tally = tokio::spawn(async move {
        let mut committed = 0usize;
        let mut finalized = 0usize;
        let mut failed = 0usize;
        while let Some(report) = report_rx.recv().await {
            match (report.result.success, report.result.state) {
                (true, ResolutionState::CommitSubmitted) => committed += 1,
                (true, ResolutionState::Finalized) => finalized += 1,
                (false, ResolutionState::AwaitingDispute) => {}
                (false, _) => failed += 1,
                _ => {}
            }
        }
        info!(committed, finalized, failed, "resolution totals");
    });

    // --- HTTP ingress ---
    let state = WebhookState {
        queue: queue.clone(),
        secret: config.webhook.secret().map(str::to_string),
        clock,
    };
    let bind_addr = config.webhook.bind_addr();

    info!("ready - press Ctrl+C to stop");
    webhook::serve(state, &bind_addr, shutdown_signal()).await?;

    queue.shutdown().await;
    if let Err(e) = tally.await {
        error!(error = %e, "report task failed");
    }
    info!("stopped");

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutting down..."),
        Err(e) => {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
