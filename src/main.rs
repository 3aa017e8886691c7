use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use listing_harvester::browser::{ChromiumNavigator, PageNavigator};
use listing_harvester::config::{ConfigManager, FileConfigManager};
use listing_harvester::harvest::{Collaborators, SearchOrchestrator};
use listing_harvester::HarvestError;
use listing_harvester::notify::{LogNotifier, Notifier, WebhookNotifier};
use listing_harvester::storage::{ArtifactStore, CsvExporter, FileSeenRegistry, HttpImageFetcher};

const WEBHOOK_ENV: &str = "HARVESTER_WEBHOOK_URL";

#[tokio::main]
async fn main() -> listing_harvester::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chromiumoxide=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let mut config = FileConfigManager::new(config_path).load_config().await?;

    if let Ok(url) = std::env::var(WEBHOOK_ENV) {
        if !url.trim().is_empty() {
            config.notify.webhook_url = Some(url);
        }
    }

    tracing::info!("Starting Listing Harvester");

    if let Err(e) = std::fs::create_dir_all(&config.output.data_dir) {
        tracing::error!("Failed to create data directory: {}", e);
    }

    let notifier: Arc<dyn Notifier> = match config.notify.webhook_url.clone() {
        Some(url) => Arc::new(WebhookNotifier::new(url, config.notify.sender_name.clone())?),
        None => {
            tracing::info!("No webhook configured, notifications go to the log");
            Arc::new(LogNotifier::new(config.notify.sender_name.clone()))
        }
    };

    let image_fetcher = Arc::new(HttpImageFetcher::new(config.browser.user_agent.as_deref())?);

    let navigator = match ChromiumNavigator::launch(&config.browser).await {
        Ok(navigator) => Arc::new(navigator),
        Err(e) => {
            tracing::error!("Could not start the browser: {}", e);
            return Err(e);
        }
    };

    let deps = Collaborators {
        navigator: navigator.clone(),
        registry: Arc::new(FileSeenRegistry::new(config.output.seen_file.clone())),
        exporter: Arc::new(CsvExporter::new(config.output.csv_dir.clone())),
        notifier,
        image_fetcher,
        artifacts: ArtifactStore::new(config.output.screenshots_dir.clone(), config.output.images_dir.clone()),
    };
    let orchestrator = SearchOrchestrator::new(config, deps);

    let outcome = tokio::select! {
        result = orchestrator.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, shutting down");
            tracing::info!("Total unique new listings found in this run: {}", orchestrator.found_so_far());
            Err(HarvestError::Interrupted.into())
        }
    };

    if let Err(e) = navigator.close().await {
        tracing::warn!("Failed to close browser: {}", e);
    }

    match outcome {
        Ok(summary) => {
            tracing::info!(
                "Run {} finished: {} session(s), {} failed",
                summary.run_id,
                summary.sessions.len(),
                summary.failed_sessions()
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Run aborted: {}", e);
            Err(e)
        }
    }
}
