//! Service entry-point: loads configuration, connects the instrumented store
//! and serves the user account API until a shutdown signal arrives.

mod server;

use std::sync::Arc;

use actix_web::web;
#[cfg(feature = "metrics")]
use actix_web_prom::PrometheusMetricsBuilder;
use color_eyre::eyre::{Result, WrapErr, eyre};
use mockable::{Clock, DefaultClock};
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use accounts::config::AppConfig;
use accounts::domain::ports::{IdentifierGenerator, QueryMetrics, UserAccountService};
use accounts::domain::{
    LoggingClock, LoggingIdentifierGenerator, LoggingUserAccountService, SqlUserAccountService,
};
use accounts::inbound::http::health::HealthState;
use accounts::inbound::http::state::HttpState;
use accounts::outbound::identifier::RandomIdentifierGenerator;
#[cfg(feature = "metrics")]
use accounts::outbound::metrics::{PrometheusQueryMetrics, StoreMetricsRegistry};
use accounts::outbound::store::{LoggingStore, MetricsStore, PgStore};

use server::{ServerConfig, create_server};

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level()));
    if let Err(e) = fmt().with_env_filter(filter).json().try_init() {
        warn!(error = %e, "tracing init failed");
    }
}

/// Application bootstrap.
#[actix_web::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let config = AppConfig::load().map_err(|err| eyre!("failed to load configuration: {err}"))?;
    init_tracing(&config);

    let bind_addr = config.bind_addr()?;
    let public_base_url = config.public_base_url()?;
    let store_settings = config.store_settings()?;

    let clock: Arc<dyn Clock> = Arc::new(LoggingClock::new(Arc::new(DefaultClock)));
    let ids: Arc<dyn IdentifierGenerator> =
        Arc::new(LoggingIdentifierGenerator::new(Arc::new(RandomIdentifierGenerator)));

    let pg = PgStore::connect(&store_settings)
        .await
        .wrap_err("failed to connect to PostgreSQL")?;

    #[cfg(feature = "metrics")]
    let registry = StoreMetricsRegistry::new(prometheus::Registry::new());
    #[cfg(feature = "metrics")]
    let query_metrics: Arc<dyn QueryMetrics> = Arc::new(
        PrometheusQueryMetrics::new(&registry, &pg)
            .wrap_err("failed to register store metrics")?,
    );
    #[cfg(not(feature = "metrics"))]
    let query_metrics: Arc<dyn QueryMetrics> =
        Arc::new(accounts::domain::ports::NoOpQueryMetrics);

    let store = LoggingStore::new(MetricsStore::new(pg.clone(), query_metrics), Arc::clone(&clock));
    let service: Arc<dyn UserAccountService> =
        Arc::new(SqlUserAccountService::new(Arc::new(store), ids, Arc::clone(&clock)));
    let service = Arc::new(LoggingUserAccountService::new(service, clock));

    let server_config = ServerConfig::new(bind_addr, HttpState::new(service, public_base_url));
    #[cfg(feature = "metrics")]
    let server_config = server_config.with_metrics(
        PrometheusMetricsBuilder::new("accounts")
            .registry(registry.registry().clone())
            .endpoint("/metrics")
            .build()
            .map_err(|err| eyre!("failed to configure HTTP metrics: {err}"))?,
    );

    let health_state = web::Data::new(HealthState::new());
    let server = create_server(health_state.clone(), server_config)?;
    info!(%bind_addr, "serving user accounts");

    let outcome = server.await;
    health_state.mark_unhealthy();
    pg.close().await;
    info!("server stopped");
    outcome.wrap_err("HTTP server failed")
}
