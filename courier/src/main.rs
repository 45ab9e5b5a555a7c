use std::sync::Arc;

use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use courier::api::{ApiServer, AppState};
use courier::config::AppConfig;
use courier::database::{self, repositories::Repositories};
use courier::logging::init_logging;
use courier::notification::{Processor, SystemClock, Transports};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env_or_default();

    // Initialize logging; the guard flushes the file writer on drop
    let (logging_config, _log_guard) = init_logging(&config.log_dir)?;

    // Initialize database
    let pool = database::init_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;

    let cancel_token = CancellationToken::new();
    logging_config.start_retention_cleanup(cancel_token.clone());

    let clock = Arc::new(SystemClock);

    let processor_handle = if config.processor_enabled {
        let processor = Arc::new(Processor::new(
            &Repositories::sqlx(pool.clone()),
            Transports::from_config(&config.transport)?,
            clock.clone(),
            config.processor.clone(),
        ));
        Some(processor.spawn(cancel_token.clone()))
    } else {
        info!("Notification processor disabled");
        None
    };

    let state = AppState::with_database(pool.clone(), clock).with_logging_config(logging_config);
    let server = ApiServer::with_state(config.api.clone(), state).with_cancel_token(cancel_token.clone());

    let shutdown = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
        shutdown.cancel();
    });

    info!(
        database_url = %config.database_url,
        base_url = %config.processor.base_url,
        "courier initialized successfully"
    );

    let result = server.run().await;
    cancel_token.cancel();

    if let Some(handle) = processor_handle
        && let Err(e) = handle.await
    {
        error!(error = %e, "Notification processor task ended abnormally");
    }
    pool.close().await;

    result?;
    Ok(())
}
