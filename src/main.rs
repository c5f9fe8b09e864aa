use std::sync::Arc;
use std::time::Duration;

use rider_dispatch::api::rest::router;
use rider_dispatch::clock::{Clock, SystemClock};
use rider_dispatch::config::Config;
use rider_dispatch::engine::assignment::run_assignment_engine;
use rider_dispatch::engine::sweeper::run_expiry_sweeper;
use rider_dispatch::error::AppError;
use rider_dispatch::state::{AppState, InMemoryBackends};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    if config.log_format.eq_ignore_ascii_case("json") {
        subscriber.json().init();
    } else {
        subscriber.compact().init();
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let backends = InMemoryBackends::new(clock.clone());
    let (app_state, assignment_rx) = AppState::new(
        backends.backends(),
        clock,
        config.policy.clone(),
        config.order_queue_size,
        config.event_buffer_size,
    );
    let shared_state = Arc::new(app_state);

    let app = router(shared_state.clone());

    tokio::spawn(run_assignment_engine(shared_state.clone(), assignment_rx));
    tokio::spawn(run_expiry_sweeper(
        shared_state.clone(),
        Duration::from_secs(config.sweep_interval_secs.max(1)),
    ));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
