//! Orchestrator for the registration workflow.
//!
//! Every step follows the same shape: check the caller, validate the payload, consult the
//! transition table, then commit data, remark and timeline in one store write. A step that fails
//! anywhere before the write leaves the stored application unchanged.

mod admin;
mod payment;
mod review;

pub use admin::{ResetOperation, ResetSummary, SeedKind, SeedSummary};
pub use payment::{PaymentStart, ReconcileOutcome};

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, Utc};
use tracing::{info, warn};

use super::domain::{
    Actor, ApplicationId, ApplicationNumber, ApplicationStatus, DiscountEligibility, Document,
    DocumentStatus, DocumentUpload, PropertyDetails, Role,
};
use super::fees::{FeeBreakdown, FeeCalculator, FeeError};
use super::inspection::InspectionError;
use super::policy::RegistrationPolicy;
use super::record::{ApplicationRecord, TimelineEntry};
use super::repository::{ApplicationRepository, EventPublisher, RepositoryError, WorkflowEvent};
use super::requests::{CreateApplication, FeePreviewRequest, ListQuery, UpdateApplication};
use super::scrutiny::{self, ScrutinyError};
use super::store::ApplicationStore;
use super::transitions::{self, Action, Transition, TransitionError};
use crate::payments::{GatewayError, PaymentGateways};

const MAX_PROPERTY_NAME: usize = 200;

/// Service composing the record store, fee engine, transition table and payment adapters.
pub struct RegistrationService<R, E> {
    store: ApplicationStore<R>,
    events: Arc<E>,
    fees: FeeCalculator,
    policy: RegistrationPolicy,
    gateways: PaymentGateways,
    /// Serialises manual transaction-reference claims across applications.
    reference_claims: Mutex<()>,
}

impl<R, E> RegistrationService<R, E>
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    pub fn new(
        repository: Arc<R>,
        events: Arc<E>,
        fees: FeeCalculator,
        policy: RegistrationPolicy,
    ) -> Self {
        Self {
            store: ApplicationStore::new(repository),
            events,
            fees,
            policy,
            gateways: PaymentGateways::new(),
            reference_claims: Mutex::new(()),
        }
    }

    pub fn with_gateways(mut self, gateways: PaymentGateways) -> Self {
        self.gateways = gateways;
        self
    }

    pub fn policy(&self) -> &RegistrationPolicy {
        &self.policy
    }

    pub fn gateways(&self) -> &PaymentGateways {
        &self.gateways
    }

    pub fn store(&self) -> &ApplicationStore<R> {
        &self.store
    }

    /// Server-side fee computation; nothing is persisted.
    pub fn preview_fee(
        &self,
        request: &FeePreviewRequest,
    ) -> Result<FeeBreakdown, RegistrationError> {
        let fee = self.fees.quote(
            &request.category,
            request.total_rooms,
            request.validity_years,
            DiscountEligibility {
                female_owner: request.female_owner,
                special_region: request.special_region,
            },
        )?;
        Ok(fee)
    }

    /// Create a draft owned by `actor`, optionally submitting it straight away.
    pub fn create(
        &self,
        actor: &Actor,
        request: CreateApplication,
    ) -> Result<ApplicationRecord, RegistrationError> {
        if actor.role != Role::Owner {
            return Err(RegistrationError::Authorization(format!(
                "role '{}' may not create applications",
                actor.role
            )));
        }

        let CreateApplication { form, submit } = request;
        let eligibility = DiscountEligibility {
            female_owner: form.female_owner,
            special_region: form.special_region,
        };
        let (property, fee) = self.validate_property(
            &form.property_name,
            &form.category,
            form.total_rooms,
            form.validity_years,
            eligibility,
        )?;
        validate_uploads(&form.documents)?;

        let now = Utc::now();
        let documents = form.documents.into_iter().map(Document::from_upload).collect();
        let mut record = ApplicationRecord::draft(actor.user_id.clone(), property, documents, now);
        record.fee = Some(fee);
        record.timeline.push(TimelineEntry {
            at: now,
            actor: actor.user_id.clone(),
            role: actor.role,
            action: Action::UpdateDraft,
            from: ApplicationStatus::Draft,
            to: ApplicationStatus::Draft,
            note: Some("application created".to_string()),
        });

        let record = self.store.create(record)?;
        info!(application_id = %record.id, owner = %record.owner, "draft application created");
        self.announce(&record);

        if submit {
            return self.submit(actor, &record.id);
        }
        Ok(record)
    }

    /// Owner edit while the application is a draft or sent back.
    pub fn update(
        &self,
        actor: &Actor,
        id: &ApplicationId,
        request: UpdateApplication,
    ) -> Result<ApplicationRecord, RegistrationError> {
        validate_uploads(&request.documents)?;
        let submit = request.submit;

        let record = self.transition(actor, id, Action::UpdateDraft, None, |record, _, _| {
            let current = &record.property;
            let category = request
                .category
                .clone()
                .unwrap_or_else(|| current.category.label().to_string());
            let eligibility = DiscountEligibility {
                female_owner: request
                    .female_owner
                    .unwrap_or(current.eligibility.female_owner),
                special_region: request
                    .special_region
                    .unwrap_or(current.eligibility.special_region),
            };
            let (property, fee) = self.validate_property(
                request
                    .property_name
                    .as_deref()
                    .unwrap_or(&current.property_name),
                &category,
                request.total_rooms.unwrap_or(current.total_rooms),
                request.validity_years.unwrap_or(current.validity_years),
                eligibility,
            )?;
            record.property = property;
            record.fee = Some(fee);
            merge_uploads(&mut record.documents, &request.documents);
            Ok(())
        })?;

        if submit {
            return self.submit(actor, &record.id);
        }
        Ok(record)
    }

    /// Submit a draft or resubmit after corrections. The fee is always recomputed here; whatever
    /// the client previewed is never trusted.
    pub fn submit(
        &self,
        actor: &Actor,
        id: &ApplicationId,
    ) -> Result<ApplicationRecord, RegistrationError> {
        self.transition(actor, id, Action::Submit, None, |record, transition, now| {
            let property = &record.property;
            let fee = self.fees.compute(
                property.category,
                property.total_rooms,
                property.validity_years,
                property.eligibility,
            )?;
            record.fee = Some(fee);

            if transition.from == ApplicationStatus::SentBackForCorrections {
                record.review_cycle += 1;
                scrutiny::reopen_for_resubmission(&mut record.documents);
                record.carried_over_documents.clear();
                record.inspection = None;
            } else {
                record.review_cycle = record.review_cycle.max(1);
            }

            if record.number.is_none() {
                let year = now.year();
                let sequence = self.store.repository().next_sequence(year)?;
                record.number = Some(ApplicationNumber::new(year, sequence));
            }
            record.submitted_at = Some(now);
            Ok(())
        })
    }

    pub fn get(
        &self,
        actor: &Actor,
        id: &ApplicationId,
    ) -> Result<ApplicationRecord, RegistrationError> {
        let record = self.store.get(id)?;
        if actor.role == Role::Owner && !record.is_owned_by(&actor.user_id) {
            return Err(RegistrationError::Authorization(
                "owners may only view their own applications".to_string(),
            ));
        }
        Ok(record)
    }

    /// Role-scoped listing. Owners see their own applications, officers their work queue unless
    /// they filter by status explicitly.
    pub fn list(
        &self,
        actor: &Actor,
        query: &ListQuery,
    ) -> Result<Vec<ApplicationRecord>, RegistrationError> {
        let status = match query.status.as_deref() {
            Some(raw) => Some(raw.parse::<ApplicationStatus>().map_err(|message| {
                RegistrationError::Validation {
                    field: "status".to_string(),
                    message,
                }
            })?),
            None => None,
        };
        let queue = transitions::statuses_actionable_by(actor.role);

        let records = self
            .store
            .list()?
            .into_iter()
            .filter(|record| match actor.role {
                Role::Owner => record.is_owned_by(&actor.user_id),
                Role::Admin | Role::System => true,
                _ => status.is_some() || queue.contains(&record.status),
            })
            .filter(|record| status.map_or(true, |wanted| record.status == wanted))
            .collect();
        Ok(records)
    }

    fn validate_property(
        &self,
        property_name: &str,
        category: &str,
        total_rooms: u32,
        validity_years: u32,
        eligibility: DiscountEligibility,
    ) -> Result<(PropertyDetails, FeeBreakdown), RegistrationError> {
        let property_name = property_name.trim();
        if property_name.is_empty() {
            return Err(validation("property_name", "property name is required"));
        }
        if property_name.chars().count() > MAX_PROPERTY_NAME {
            return Err(validation(
                "property_name",
                format!("property name must be at most {MAX_PROPERTY_NAME} characters"),
            ));
        }

        let fee = self
            .fees
            .quote(category, total_rooms, validity_years, eligibility)?;
        let property = PropertyDetails {
            property_name: property_name.to_string(),
            category: fee.category,
            total_rooms,
            validity_years,
            eligibility,
        };
        Ok((property, fee))
    }

    /// Run one table-checked transition against `id` and publish it once committed.
    pub(crate) fn transition<F>(
        &self,
        actor: &Actor,
        id: &ApplicationId,
        action: Action,
        remarks: Option<&str>,
        prepare: F,
    ) -> Result<ApplicationRecord, RegistrationError>
    where
        F: FnOnce(
            &mut ApplicationRecord,
            &Transition,
            DateTime<Utc>,
        ) -> Result<(), RegistrationError>,
    {
        let now = Utc::now();
        let (record, transition) = self.store.mutate(id, |record| {
            let transition = self.authorize(actor, record, action, remarks)?;
            prepare(record, &transition, now)?;
            record.apply(&transition, actor, now);
            Ok::<_, RegistrationError>(transition)
        })?;

        info!(
            application_id = %record.id,
            action = %action,
            from = %transition.from,
            to = %transition.to,
            role = %actor.role,
            "application transitioned"
        );
        self.announce(&record);
        Ok(record)
    }

    pub(crate) fn authorize(
        &self,
        actor: &Actor,
        record: &ApplicationRecord,
        action: Action,
        remarks: Option<&str>,
    ) -> Result<Transition, RegistrationError> {
        if actor.role == Role::Owner && !record.is_owned_by(&actor.user_id) {
            return Err(RegistrationError::Authorization(
                "only the applicant may act on this application".to_string(),
            ));
        }
        let tier = self.policy.tier_for(record.property.category);
        Ok(transitions::authorize(
            record.status,
            action,
            actor.role,
            tier,
            remarks,
        )?)
    }

    /// Publish the latest timeline entry. Failures are logged; the write already committed.
    pub(crate) fn announce(&self, record: &ApplicationRecord) {
        let Some(entry) = record.timeline.last() else {
            return;
        };
        if let Err(error) = self.events.publish(WorkflowEvent::committed(record, entry)) {
            warn!(application_id = %record.id, %error, "failed to publish workflow event");
        }
    }
}

fn validate_uploads(uploads: &[DocumentUpload]) -> Result<(), RegistrationError> {
    for upload in uploads {
        if upload.document_type.trim().is_empty() {
            return Err(validation("documents", "document type is required"));
        }
        if upload.file_path.trim().is_empty() {
            return Err(validation(
                "documents",
                format!("file path is required for '{}'", upload.document_type.trim()),
            ));
        }
    }
    Ok(())
}

/// Replace unverified documents of the same type; anything else is appended.
fn merge_uploads(documents: &mut Vec<Document>, uploads: &[DocumentUpload]) {
    for upload in uploads {
        let existing = documents.iter_mut().find(|document| {
            document.document_type == upload.document_type
                && document.status != DocumentStatus::Verified
        });
        match existing {
            Some(document) => {
                document.file_path = upload.file_path.clone();
                document.status = DocumentStatus::Pending;
                document.remarks = None;
            }
            None => documents.push(Document::from_upload(upload.clone())),
        }
    }
}

pub(crate) fn validation(field: &str, message: impl Into<String>) -> RegistrationError {
    RegistrationError::Validation {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Error raised by the registration service.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("{message}")]
    Validation { field: String, message: String },
    #[error("{0}")]
    Authorization(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    ExternalGateway(GatewayError),
    #[error("application store unavailable: {0}")]
    Store(String),
}

impl From<RepositoryError> for RegistrationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound => RegistrationError::NotFound("application".to_string()),
            RepositoryError::Conflict | RepositoryError::VersionConflict { .. } => {
                RegistrationError::Conflict(format!("{error}; refetch and retry"))
            }
            RepositoryError::Unavailable(message) => RegistrationError::Store(message),
        }
    }
}

impl From<TransitionError> for RegistrationError {
    fn from(error: TransitionError) -> Self {
        match error {
            TransitionError::Terminal { .. } | TransitionError::NotPermitted { .. } => {
                RegistrationError::Conflict(error.to_string())
            }
            TransitionError::Unauthorized { .. } => {
                RegistrationError::Authorization(error.to_string())
            }
            TransitionError::RemarksRequired { .. } => validation("remarks", error.to_string()),
        }
    }
}

impl From<FeeError> for RegistrationError {
    fn from(error: FeeError) -> Self {
        validation(error.field(), error.to_string())
    }
}

impl From<ScrutinyError> for RegistrationError {
    fn from(error: ScrutinyError) -> Self {
        validation("verifications", error.to_string())
    }
}

impl From<InspectionError> for RegistrationError {
    fn from(error: InspectionError) -> Self {
        let field = match error {
            InspectionError::MissingMandatory(_) | InspectionError::UnknownCriterion(_) => {
                "mandatory"
            }
            InspectionError::ApprovalWithFailedMandatory => "recommendation",
        };
        validation(field, error.to_string())
    }
}

impl From<GatewayError> for RegistrationError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::NotConfigured(_) => validation("gateway", error.to_string()),
            other => RegistrationError::ExternalGateway(other),
        }
    }
}
