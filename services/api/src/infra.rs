use homestay::config::{GatewayConfig, RegistrationConfig};
use homestay::error::AppError;
use homestay::payments::{
    AggregatorGateway, GatewayError, HimKoshGateway, ManualUpiGateway, PaymentGateways,
};
use homestay::workflows::registration::{
    EventPublisher, FeeCalculator, PublishError, WorkflowEvent,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Publishes committed transitions to the log stream until a broker is wired in.
#[derive(Default, Clone)]
pub(crate) struct LoggingEventPublisher;

impl EventPublisher for LoggingEventPublisher {
    fn publish(&self, event: WorkflowEvent) -> Result<(), PublishError> {
        info!(
            target: "homestay::events",
            application_id = %event.application_id,
            action = %event.action,
            from = %event.from,
            to = %event.to,
            actor = %event.actor,
            version = event.version,
            "workflow event"
        );
        Ok(())
    }
}

/// Fee engine over the configured schedule, or the standard tariff when none is set.
pub(crate) fn fee_calculator(config: &RegistrationConfig) -> Result<FeeCalculator, AppError> {
    Ok(FeeCalculator::new(config.fee_schedule()?))
}

/// Register every gateway whose credentials are configured.
pub(crate) fn build_gateways(
    config: &GatewayConfig,
    timeout: Duration,
) -> Result<PaymentGateways, GatewayError> {
    let mut gateways = PaymentGateways::new();
    if let Some(himkosh) = &config.himkosh {
        gateways.register(Arc::new(HimKoshGateway::new(himkosh.clone(), timeout)?));
    }
    if let Some(aggregator) = &config.aggregator {
        gateways.register(Arc::new(AggregatorGateway::new(aggregator.clone(), timeout)?));
    }
    if let Some(manual) = &config.manual_upi {
        gateways.register(Arc::new(ManualUpiGateway::new(manual.clone())));
    }
    Ok(gateways)
}
