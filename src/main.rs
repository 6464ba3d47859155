use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use scorekeep::background::Background;
use scorekeep::config::Config;
use scorekeep::engine::Engine;
use scorekeep::store::MemoryStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    scorekeep::observability::init(config.metrics_port)?;

    let store = match config.journal_path() {
        Some(path) => {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            Arc::new(MemoryStore::open(&path)?)
        }
        None => Arc::new(MemoryStore::new()),
    };
    let journal = config.journal_path().map(|_| store.clone());

    let engine = Arc::new(Engine::new(store));
    let background = Background::start(engine.clone(), journal, &config);

    info!("scorekeep running");
    info!(
        "  data_dir: {}",
        config
            .data_dir
            .as_ref()
            .map_or("none (memory only)".to_string(), |d| d.display().to_string())
    );
    info!("  visit flush: {:?}", config.visit_flush_interval);
    info!("  id persist: {:?}", config.id_persist_interval);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    info!("shutdown signal received");
    background.shutdown().await;
    engine.shutdown().await;
    info!("scorekeep stopped");
    Ok(())
}
