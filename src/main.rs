use assessment_engine::database::pool::{create_pool, run_migrations};
use assessment_engine::{
    config::{get_config, init_config},
    AppState,
};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    init_config()?;
    let config = get_config()?;

    let pool = create_pool(config).await?;
    run_migrations(&pool).await?;

    let app_state = AppState::from_pool(pool, config)?;

    {
        let state = app_state.clone();
        let interval = Duration::from_secs(config.sweep_interval_secs);
        let created_ttl = chrono::Duration::minutes(config.created_attempt_ttl_minutes);
        tokio::spawn(async move {
            loop {
                if let Err(e) = state.attempt_service.expire_overdue().await {
                    tracing::error!(error = ?e, "Expiry sweep error");
                }
                if let Err(e) = state.attempt_service.abandon_stale_created(created_ttl).await {
                    tracing::error!(error = ?e, "Stale attempt sweep error");
                }
                tokio::time::sleep(interval).await;
            }
        });
    }

    {
        let state = app_state.clone();
        let idle = Duration::from_millis(config.scoring_poll_ms);
        tokio::spawn(async move {
            loop {
                match state.scoring_worker.run_once().await {
                    Ok(true) => {}
                    Ok(false) => {
                        tokio::time::sleep(idle).await;
                    }
                    Err(e) => {
                        tracing::error!(error = ?e, "Scoring worker error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });
    }

    info!("Assessment engine workers running");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}
