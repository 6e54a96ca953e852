use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::GatewayKind;

/// Amount and references handed to a gateway when a payment starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRequest {
    pub application_id: String,
    pub application_number: String,
    pub payer: String,
    pub amount: Decimal,
}

/// How the client should continue the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentInstruction {
    Redirect {
        url: String,
    },
    FormPost {
        action: String,
        fields: BTreeMap<String, String>,
    },
    ManualTransfer {
        vpa: String,
        payee: String,
        amount: Decimal,
        note: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInitiation {
    pub external_ref: String,
    pub instruction: PaymentInstruction,
}

/// Settlement state reported by a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GatewaySettlement {
    /// Nothing paid yet.
    Unpaid,
    /// Money is in flight; confirmation outstanding.
    Pending,
    Success { amount: Decimal },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub external_ref: String,
    pub settlement: GatewaySettlement,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("payment gateway '{0}' is not configured")]
    NotConfigured(GatewayKind),
    #[error("{gateway} did not answer within {after:?}")]
    Timeout { gateway: GatewayKind, after: Duration },
    #[error("{gateway} unreachable: {message}")]
    Transport {
        gateway: GatewayKind,
        message: String,
    },
    #[error("{gateway} declined the request: {message}")]
    Rejected {
        gateway: GatewayKind,
        message: String,
    },
    #[error("{gateway} returned an unreadable response: {message}")]
    InvalidResponse {
        gateway: GatewayKind,
        message: String,
    },
}

impl GatewayError {
    /// Only transient failures are worth another reconciliation poll.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout { .. } | GatewayError::Transport { .. }
        )
    }
}

/// Uniform adapter contract. Reconciliation must be idempotent by external reference.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn kind(&self) -> GatewayKind;

    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiation, GatewayError>;

    async fn reconcile(&self, external_ref: &str) -> Result<Reconciliation, GatewayError>;
}

/// Adapter registry consulted by the workflow.
#[derive(Clone, Default)]
pub struct PaymentGateways {
    adapters: HashMap<GatewayKind, Arc<dyn PaymentGateway>>,
}

impl PaymentGateways {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn PaymentGateway>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn PaymentGateway>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, kind: GatewayKind) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
        self.adapters
            .get(&kind)
            .cloned()
            .ok_or(GatewayError::NotConfigured(kind))
    }

    pub fn available(&self) -> Vec<GatewayKind> {
        let mut kinds: Vec<GatewayKind> = self.adapters.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl std::fmt::Debug for PaymentGateways {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGateways")
            .field("available", &self.available())
            .finish()
    }
}
