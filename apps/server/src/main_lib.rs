use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use leadpulse_core::{
    events::EventBus,
    leads::{LeadService, LeadServiceTrait},
};
use leadpulse_storage_sqlite::{db, leads::LeadRepository};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub struct AppState {
    pub lead_service: Arc<dyn LeadServiceTrait>,
    pub event_bus: EventBus,
    /// Cancelled on shutdown so open streams finish before the server exits.
    pub shutdown: CancellationToken,
    pub heartbeat_interval: Duration,
}

pub fn init_tracing() {
    let log_format = std::env::var("LP_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let db_path = db::init(&config.db_path)?;
    tracing::info!("Database path in use: {}", db_path);

    let pool = db::create_pool(&db_path)?;
    db::run_migrations(&pool)?;
    let writer = db::spawn_writer((*pool).clone())?;

    let event_bus = EventBus::spawn(config.subscriber_queue);
    let lead_repository = Arc::new(LeadRepository::new(pool.clone(), writer));
    let lead_service = Arc::new(LeadService::new(
        lead_repository,
        Arc::new(event_bus.clone()),
    ));

    Ok(Arc::new(AppState {
        lead_service,
        event_bus,
        shutdown: CancellationToken::new(),
        heartbeat_interval: config.heartbeat_interval,
    }))
}
