pub mod api;
pub mod classifier;
pub mod config;
pub mod db;
pub mod labeling;
pub mod models;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::classifier::OpenAiClassifier;
use crate::config::AppConfig;
use crate::labeling::{Classifier, LabelStore, LabelingService, SqliteLabelStore};

/// Process entry point: configure logging, open storage, serve until Ctrl-C.
pub async fn run() -> Result<(), String> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = AppConfig::from_env();

    let store: Arc<dyn LabelStore> = Arc::new(
        SqliteLabelStore::open(&config.database_path)
            .map_err(|e| format!("Cannot open database {}: {e}", config.database_path.display()))?,
    );
    tracing::info!(path = %config.database_path.display(), "Database ready");

    let service = match OpenAiClassifier::new(&config.classifier) {
        Ok(client) => {
            tracing::info!(model = client.model(), "Classifier configured");
            let classifier: Arc<dyn Classifier> = Arc::new(client);
            LabelingService::new(store, classifier, config.strategy)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Classifier unavailable, labeling runs will be rejected");
            LabelingService::without_classifier(store, e.to_string(), config.strategy)
        }
    };

    let mut server = api::start_api_server(Arc::new(service), config.bind_addr).await?;
    tracing::info!(addr = %server.session.server_addr, "Listening");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
    }

    server.shutdown();
    server.wait().await;
    tracing::info!("{} stopped", config::APP_NAME);
    Ok(())
}
