//! Payment attempts and the gateway adapters that settle them.
//!
//! The workflow only ever talks to [`PaymentGateway`]; which adapter answers is decided by the
//! [`GatewayKind`] stored on each attempt.

mod aggregator;
mod gateway;
mod himkosh;
mod manual_upi;
mod retry;

pub use aggregator::{AggregatorConfig, AggregatorGateway};
pub use gateway::{
    GatewayError, GatewaySettlement, PaymentGateway, PaymentGateways, PaymentInitiation,
    PaymentInstruction, PaymentRequest, Reconciliation,
};
pub use himkosh::{HimKoshConfig, HimKoshGateway};
pub use manual_upi::{ManualUpiConfig, ManualUpiGateway};
pub use retry::{call_with_timeout, retry_idempotent, RetryPolicy};

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentId(pub String);

impl PaymentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registered payment channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayKind {
    /// State treasury portal.
    Himkosh,
    /// Hosted card/UPI checkout.
    Aggregator,
    /// UPI transfer confirmed by an officer.
    ManualUpi,
}

impl GatewayKind {
    pub const fn label(self) -> &'static str {
        match self {
            GatewayKind::Himkosh => "himkosh",
            GatewayKind::Aggregator => "aggregator",
            GatewayKind::ManualUpi => "manual_upi",
        }
    }
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for GatewayKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "himkosh" => Ok(GatewayKind::Himkosh),
            "aggregator" | "card" | "upi" => Ok(GatewayKind::Aggregator),
            "manual_upi" | "manual" => Ok(GatewayKind::ManualUpi),
            other => Err(format!("unknown payment gateway '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Initiated,
    PendingVerification,
    Verified,
    Failed,
}

impl PaymentStatus {
    pub const fn is_final(self) -> bool {
        matches!(self, PaymentStatus::Verified | PaymentStatus::Failed)
    }

    /// Attempts that hold the application's single settlement slot.
    pub const fn is_settling(self) -> bool {
        matches!(
            self,
            PaymentStatus::PendingVerification | PaymentStatus::Verified
        )
    }
}

/// Client-facing reading of an attempt. `AwaitingConfirmation` must never be shown as a failure:
/// funds may already have moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    NotCompleted,
    AwaitingConfirmation,
    Confirmed,
}

pub const EXPIRED_REASON: &str = "expired";

/// One payment attempt against an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub gateway: GatewayKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    pub amount: Decimal,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn initiated(
        gateway: GatewayKind,
        external_ref: String,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::generate(),
            gateway,
            external_ref: Some(external_ref),
            amount,
            status: PaymentStatus::Initiated,
            verified_amount: None,
            failure_reason: None,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn failed(
        gateway: GatewayKind,
        amount: Decimal,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::generate(),
            gateway,
            external_ref: None,
            amount,
            status: PaymentStatus::Failed,
            verified_amount: None,
            failure_reason: Some(reason.into()),
            created_at: at,
            updated_at: at,
        }
    }

    pub fn outcome(&self) -> PaymentOutcome {
        match self.status {
            PaymentStatus::Initiated | PaymentStatus::Failed => PaymentOutcome::NotCompleted,
            PaymentStatus::PendingVerification => PaymentOutcome::AwaitingConfirmation,
            PaymentStatus::Verified => PaymentOutcome::Confirmed,
        }
    }

    /// Failed only because the expiry sweep gave up waiting; the gateway may still settle it.
    pub fn is_expired(&self) -> bool {
        self.status == PaymentStatus::Failed
            && self.failure_reason.as_deref() == Some(EXPIRED_REASON)
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>, at: DateTime<Utc>) {
        self.status = PaymentStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.updated_at = at;
    }

    pub fn view(&self) -> PaymentView {
        PaymentView {
            payment: self.clone(),
            outcome: self.outcome(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentView {
    #[serde(flatten)]
    pub payment: Payment,
    pub outcome: PaymentOutcome,
}
