use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Actor, ApplicationId, ApplicationNumber, ApplicationStatus, Certificate, Document, DocumentId,
    InspectionOrder, PropertyDetails, Remark, Role, UserId,
};
use super::fees::FeeBreakdown;
use super::inspection::InspectionReport;
use super::scrutiny::{self, ScrutinyProgress};
use super::transitions::{actions_for, Action, Transition};
use crate::payments::{Payment, PaymentId, PaymentStatus, PaymentView};

/// Audit entry written in the same commit as the change it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub at: DateTime<Utc>,
    pub actor: UserId,
    pub role: Role,
    pub action: Action,
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Stored application aggregate. `version` increases by one on every committed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<ApplicationNumber>,
    pub owner: UserId,
    pub property: PropertyDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<FeeBreakdown>,
    pub status: ApplicationStatus,
    pub review_cycle: u32,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub remarks: Vec<Remark>,
    #[serde(default)]
    pub carried_over_documents: Vec<DocumentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspection: Option<InspectionOrder>,
    #[serde(default)]
    pub inspection_reports: Vec<InspectionReport>,
    #[serde(default)]
    pub payments: Vec<Payment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Certificate>,
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    pub last_transition_at: DateTime<Utc>,
    pub version: u64,
}

impl ApplicationRecord {
    pub fn draft(
        owner: UserId,
        property: PropertyDetails,
        documents: Vec<Document>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ApplicationId::generate(),
            number: None,
            owner,
            property,
            fee: None,
            status: ApplicationStatus::Draft,
            review_cycle: 0,
            documents,
            remarks: Vec::new(),
            carried_over_documents: Vec::new(),
            inspection: None,
            inspection_reports: Vec::new(),
            payments: Vec::new(),
            certificate: None,
            timeline: Vec::new(),
            created_at: at,
            submitted_at: None,
            last_transition_at: at,
            version: 0,
        }
    }

    /// Commit a validated transition: status, remark and timeline move together.
    pub fn apply(&mut self, transition: &Transition, actor: &Actor, at: DateTime<Utc>) {
        if let Some(text) = &transition.remarks {
            self.remarks.push(Remark {
                author: actor.user_id.clone(),
                role: actor.role,
                text: text.clone(),
                cycle: self.review_cycle,
                at,
            });
        }
        self.timeline.push(TimelineEntry {
            at,
            actor: actor.user_id.clone(),
            role: actor.role,
            action: transition.action,
            from: transition.from,
            to: transition.to,
            note: transition.remarks.clone(),
        });
        self.status = transition.to;
        self.last_transition_at = at;
    }

    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.owner == user
    }

    /// Report for the current review cycle, if the inspection has been filed.
    pub fn active_inspection_report(&self) -> Option<&InspectionReport> {
        self.inspection_reports
            .last()
            .filter(|report| report.cycle == self.review_cycle)
    }

    /// The attempt currently holding the settlement slot.
    pub fn settling_payment(&self) -> Option<&Payment> {
        self.payments
            .iter()
            .rev()
            .find(|payment| payment.status.is_settling())
    }

    pub fn payment_by_reference(&self, reference: &str) -> Option<&Payment> {
        self.payments.iter().find(|payment| {
            payment.id.0 == reference || payment.external_ref.as_deref() == Some(reference)
        })
    }

    pub fn payment_mut(&mut self, id: &PaymentId) -> Option<&mut Payment> {
        self.payments.iter_mut().find(|payment| &payment.id == id)
    }

    pub fn has_verified_payment(&self) -> bool {
        self.payments
            .iter()
            .any(|payment| payment.status == PaymentStatus::Verified)
    }

    pub fn view_for(&self, role: Role) -> ApplicationView {
        ApplicationView {
            id: self.id.clone(),
            number: self.number.clone(),
            owner: self.owner.clone(),
            status: self.status,
            review_cycle: self.review_cycle,
            property: self.property.clone(),
            fee: self.fee.clone(),
            documents: self.documents.clone(),
            scrutiny: scrutiny::progress(&self.documents),
            carried_over_documents: self.carried_over_documents.clone(),
            remarks: self.remarks.clone(),
            inspection: self.inspection.clone(),
            inspection_report: self.active_inspection_report().cloned(),
            payments: self.payments.iter().map(Payment::view).collect(),
            certificate: self.certificate.clone(),
            timeline: self.timeline.clone(),
            available_actions: actions_for(self.status, role),
            created_at: self.created_at,
            submitted_at: self.submitted_at,
            last_transition_at: self.last_transition_at,
            version: self.version,
        }
    }
}

/// Wire projection returned by every application endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationView {
    pub id: ApplicationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<ApplicationNumber>,
    pub owner: UserId,
    pub status: ApplicationStatus,
    pub review_cycle: u32,
    pub property: PropertyDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<FeeBreakdown>,
    pub documents: Vec<Document>,
    pub scrutiny: ScrutinyProgress,
    pub carried_over_documents: Vec<DocumentId>,
    pub remarks: Vec<Remark>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspection: Option<InspectionOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspection_report: Option<InspectionReport>,
    pub payments: Vec<PaymentView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Certificate>,
    pub timeline: Vec<TimelineEntry>,
    pub available_actions: Vec<Action>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    pub last_transition_at: DateTime<Utc>,
    pub version: u64,
}
