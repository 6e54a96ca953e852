use crate::cli::ServeArgs;
use crate::infra::{build_gateways, fee_calculator, AppState, LoggingEventPublisher};
use crate::routes::with_registration_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use homestay::config::AppConfig;
use homestay::error::AppError;
use homestay::telemetry;
use homestay::workflows::registration::{InMemoryApplicationRepository, RegistrationService};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let policy = config.policy();
    let gateways = build_gateways(&config.gateways, policy.gateway_timeout)?;
    info!(gateways = ?gateways.available(), "payment gateways registered");

    let fees = fee_calculator(&config.registration)?;
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let events = Arc::new(LoggingEventPublisher);
    let registration_service = Arc::new(
        RegistrationService::new(repository, events, fees, policy).with_gateways(gateways),
    );

    let sweeper = registration_service.clone();
    let sweep_interval = config.registration.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            if let Err(error) = sweeper.expire_stale_payments(Utc::now()).await {
                warn!(%error, "payment expiry sweep failed");
            }
        }
    });

    let app = with_registration_routes(registration_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "homestay registration service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
