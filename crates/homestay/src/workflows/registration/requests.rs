use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::{ApplicationForm, ApplicationId, DocumentId, DocumentUpload};
use super::scrutiny::DocumentVerification;
use super::transitions::Action;
use crate::payments::GatewayKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateApplication {
    #[serde(flatten)]
    pub form: ApplicationForm,
    #[serde(default)]
    pub submit: bool,
}

/// Owner edit. Absent fields keep their stored value; uploads replace any unverified document of
/// the same type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateApplication {
    #[serde(default)]
    pub property_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub total_rooms: Option<u32>,
    #[serde(default)]
    pub validity_years: Option<u32>,
    #[serde(default)]
    pub female_owner: Option<bool>,
    #[serde(default)]
    pub special_region: Option<bool>,
    #[serde(default)]
    pub documents: Vec<DocumentUpload>,
    #[serde(default)]
    pub submit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePreviewRequest {
    pub category: String,
    pub total_rooms: u32,
    pub validity_years: u32,
    #[serde(default)]
    pub female_owner: bool,
    #[serde(default)]
    pub special_region: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Start,
    Accept,
    Approve,
    Reject,
    SendBack,
}

impl ReviewDecision {
    pub const fn action(self) -> Action {
        match self {
            ReviewDecision::Start => Action::StartReview,
            ReviewDecision::Accept => Action::Accept,
            ReviewDecision::Approve => Action::Approve,
            ReviewDecision::Reject => Action::Reject,
            ReviewDecision::SendBack => Action::SendBack,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemarksRequest {
    #[serde(default)]
    pub remarks: Option<String>,
}

/// Dealing-assistant checklist update; also accepted when forwarding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrutinyRequest {
    #[serde(default)]
    pub verifications: BTreeMap<DocumentId, DocumentVerification>,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtdoAcceptRequest {
    #[serde(default)]
    pub remarks: Option<String>,
    pub inspection_date: NaiveDate,
    pub inspector: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartPaymentRequest {
    pub application_id: ApplicationId,
    pub gateway: GatewayKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HimKoshInitiateRequest {
    pub application_id: ApplicationId,
}

/// UTR reported by the owner after a direct UPI transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualPaymentReport {
    pub transaction_ref: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentVerdict {
    Verified,
    Failed,
}

/// Officer decision on a payment awaiting verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDecision {
    pub status: PaymentVerdict,
    #[serde(default)]
    pub verified_amount: Option<Decimal>,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileRequest {
    pub external_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleRequest {
    pub statement: String,
}
