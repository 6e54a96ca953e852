use async_trait::async_trait;
use uuid::Uuid;

use super::gateway::{
    GatewayError, GatewaySettlement, PaymentGateway, PaymentInitiation, PaymentInstruction,
    PaymentRequest, Reconciliation,
};
use super::GatewayKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualUpiConfig {
    pub vpa: String,
    pub payee: String,
}

/// Direct UPI transfer. The owner reports the UTR and an officer confirms it, so the
/// adapter itself never learns about settlement.
pub struct ManualUpiGateway {
    config: ManualUpiConfig,
}

impl ManualUpiGateway {
    pub fn new(config: ManualUpiConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PaymentGateway for ManualUpiGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::ManualUpi
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiation, GatewayError> {
        let mut reference = Uuid::new_v4().simple().to_string();
        reference.truncate(12);
        Ok(PaymentInitiation {
            external_ref: format!("UPI-{}", reference.to_uppercase()),
            instruction: PaymentInstruction::ManualTransfer {
                vpa: self.config.vpa.clone(),
                payee: self.config.payee.clone(),
                amount: request.amount,
                note: request.application_number.clone(),
            },
        })
    }

    async fn reconcile(&self, external_ref: &str) -> Result<Reconciliation, GatewayError> {
        Ok(Reconciliation {
            external_ref: external_ref.to_string(),
            settlement: GatewaySettlement::Unpaid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn initiation_describes_the_transfer() {
        let gateway = ManualUpiGateway::new(ManualUpiConfig {
            vpa: "tourism@upi".to_string(),
            payee: "Department of Tourism".to_string(),
        });
        let initiation = gateway
            .initiate(&PaymentRequest {
                application_id: "app-1".to_string(),
                application_number: "HS/2026/000004".to_string(),
                payer: "owner-1".to_string(),
                amount: Decimal::new(630000, 2),
            })
            .await
            .expect("manual instructions");

        assert!(initiation.external_ref.starts_with("UPI-"));
        assert_eq!(
            initiation.instruction,
            PaymentInstruction::ManualTransfer {
                vpa: "tourism@upi".to_string(),
                payee: "Department of Tourism".to_string(),
                amount: Decimal::new(630000, 2),
                note: "HS/2026/000004".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn reconciliation_never_settles() {
        let gateway = ManualUpiGateway::new(ManualUpiConfig {
            vpa: "tourism@upi".to_string(),
            payee: "Tourism".to_string(),
        });
        let reconciliation = gateway.reconcile("UPI-1").await.expect("no-op");
        assert_eq!(reconciliation.settlement, GatewaySettlement::Unpaid);
    }
}
