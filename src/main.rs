use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use slotd::api;
use slotd::calendar::BusinessHours;
use slotd::engine::Engine;
use slotd::model::{Event, ExternalId};
use slotd::notify::NotifyHub;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = env_parse("SLOTD_METRICS_PORT");
    slotd::observability::init(metrics_port);

    let port = std::env::var("SLOTD_PORT").unwrap_or_else(|_| "8080".into());
    let bind = std::env::var("SLOTD_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let data_dir = std::env::var("SLOTD_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let admins: HashSet<ExternalId> = std::env::var("SLOTD_ADMIN_IDS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    let open_hour = env_parse("SLOTD_OPEN_HOUR").unwrap_or(9);
    let close_hour = env_parse("SLOTD_CLOSE_HOUR").unwrap_or(21);
    let slot_minutes = env_parse("SLOTD_SLOT_MINUTES").unwrap_or(60);
    let hours = BusinessHours::new(open_hour, close_hour, slot_minutes)?;

    std::fs::create_dir_all(&data_dir)?;
    let wal_path = PathBuf::from(&data_dir).join("bookings.wal");

    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(wal_path, hours, notify.clone())?);

    // Best-effort announcement channel: what the bot front end consumes;
    // here a logging subscriber stands in.
    let mut events = notify.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(Event::BookingCreated { id, external_user_id, span, .. }) => {
                    info!(
                        booking = %id,
                        external_id = external_user_id,
                        start = %span.start,
                        "new booking"
                    );
                }
                Ok(Event::BookingCancelled { id }) => {
                    info!(booking = %id, "booking cancelled");
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let app = api::router(engine, admins.clone());

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("slotd listening on {addr}");
    info!("  data_dir: {data_dir}");
    info!("  business hours: {open_hour:02}:00-{close_hour:02}:00, {slot_minutes}-minute slots");
    info!("  admins: {}", admins.len());
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight requests
    let shutdown = async {
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
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("slotd stopped");
    Ok(())
}
