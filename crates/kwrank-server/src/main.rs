mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use kwrank_serp::{SerpClient, SurfaceLimiters};
use kwrank_tracker::{PgStore, RefreshScheduler};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::api::{build_app, default_rate_limit_state, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(kwrank_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = kwrank_db::PoolConfig::from_app_config(&config);
    let pool = kwrank_db::connect_pool(&config.database_url, pool_config).await?;
    kwrank_db::run_migrations(&pool).await?;

    let seeds = Arc::new(kwrank_core::load_category_seeds(&config.category_seeds_path)?);
    let serp = Arc::new(SerpClient::from_config(
        &config,
        SurfaceLimiters::from_config(&config),
    )?);
    let refresh = Arc::new(RefreshScheduler::from_app_config(
        &config,
        Arc::new(PgStore::new(pool.clone())),
        serp.clone(),
    ));
    tracing::info!(
        env = %config.env,
        workers = config.worker_count,
        categories = seeds.len(),
        "kwrank-server starting"
    );

    let mut cron = scheduler::build_scheduler(Arc::clone(&refresh), &config.cycle_cron).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = {
        let refresh = Arc::clone(&refresh);
        tokio::spawn(async move { refresh.run_workers(shutdown_rx).await })
    };

    let app = build_app(
        AppState {
            pool,
            config: Arc::clone(&config),
            serp,
            scheduler: refresh,
            seeds,
        },
        default_rate_limit_state(),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_tx.send_replace(true);
        })
        .await?;

    // In-flight jobs are requeued by the workers once they see the signal.
    let stats = workers.await?;
    tracing::info!(
        completed = stats.completed,
        requeued = stats.requeued,
        "worker pool drained"
    );
    cron.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
