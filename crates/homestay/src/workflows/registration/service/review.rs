use super::{validation, RegistrationError, RegistrationService};
use crate::workflows::registration::domain::{
    Actor, ApplicationId, ApplicationStatus, InspectionOrder, Role,
};
use crate::workflows::registration::inspection::{InspectionFindings, InspectionRecommendation};
use crate::workflows::registration::record::ApplicationRecord;
use crate::workflows::registration::repository::{ApplicationRepository, EventPublisher};
use crate::workflows::registration::requests::{
    DtdoAcceptRequest, RemarksRequest, ReviewRequest, ScrutinyRequest,
};
use crate::workflows::registration::scrutiny;
use crate::workflows::registration::transitions::Action;

impl<R, E> RegistrationService<R, E>
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    /// District and state review (`/applications/:id/review`). These decisions carry no payload
    /// beyond remarks; scrutiny, inspection and DTDO decisions have their own operations.
    pub fn review(
        &self,
        actor: &Actor,
        id: &ApplicationId,
        request: ReviewRequest,
    ) -> Result<ApplicationRecord, RegistrationError> {
        if !matches!(actor.role, Role::DistrictOfficer | Role::StateOfficer) {
            return Err(RegistrationError::Authorization(format!(
                "{} decisions must use the dedicated review operations",
                actor.role
            )));
        }
        self.transition(
            actor,
            id,
            request.decision.action(),
            request.remarks.as_deref(),
            |_, _, _| Ok(()),
        )
    }

    pub fn start_scrutiny(
        &self,
        actor: &Actor,
        id: &ApplicationId,
    ) -> Result<ApplicationRecord, RegistrationError> {
        self.transition(actor, id, Action::StartScrutiny, None, |_, _, _| Ok(()))
    }

    /// Save document verdicts without moving the application.
    pub fn save_scrutiny(
        &self,
        actor: &Actor,
        id: &ApplicationId,
        request: ScrutinyRequest,
    ) -> Result<ApplicationRecord, RegistrationError> {
        self.transition(
            actor,
            id,
            Action::SaveScrutiny,
            request.remarks.as_deref(),
            |record, _, _| {
                scrutiny::apply_verifications(&mut record.documents, &request.verifications)?;
                Ok(())
            },
        )
    }

    /// Forward to the DTDO. Completion is not required; unverified documents are carried over
    /// so the DTDO sees them.
    pub fn forward_to_dtdo(
        &self,
        actor: &Actor,
        id: &ApplicationId,
        request: ScrutinyRequest,
    ) -> Result<ApplicationRecord, RegistrationError> {
        self.transition(
            actor,
            id,
            Action::Forward,
            request.remarks.as_deref(),
            |record, _, _| {
                scrutiny::apply_verifications(&mut record.documents, &request.verifications)?;
                record.carried_over_documents = scrutiny::progress(&record.documents).unresolved;
                Ok(())
            },
        )
    }

    pub fn send_back(
        &self,
        actor: &Actor,
        id: &ApplicationId,
        request: RemarksRequest,
    ) -> Result<ApplicationRecord, RegistrationError> {
        self.transition(
            actor,
            id,
            Action::SendBack,
            request.remarks.as_deref(),
            |_, _, _| Ok(()),
        )
    }

    pub fn dtdo_start_review(
        &self,
        actor: &Actor,
        id: &ApplicationId,
    ) -> Result<ApplicationRecord, RegistrationError> {
        self.transition(actor, id, Action::StartReview, None, |_, _, _| Ok(()))
    }

    /// Accept for inspection and record the site-visit order.
    pub fn dtdo_accept(
        &self,
        actor: &Actor,
        id: &ApplicationId,
        request: DtdoAcceptRequest,
    ) -> Result<ApplicationRecord, RegistrationError> {
        let inspector = request.inspector.trim().to_string();
        if inspector.is_empty() {
            return Err(validation("inspector", "an inspector must be assigned"));
        }

        self.transition(
            actor,
            id,
            Action::Accept,
            request.remarks.as_deref(),
            |record, _, now| {
                if request.inspection_date < now.date_naive() {
                    return Err(validation(
                        "inspection_date",
                        "inspection cannot be scheduled in the past",
                    ));
                }
                record.inspection = Some(InspectionOrder {
                    scheduled_for: request.inspection_date,
                    inspector,
                    ordered_by: actor.user_id.clone(),
                    cycle: record.review_cycle,
                });
                Ok(())
            },
        )
    }

    pub fn dtdo_reject(
        &self,
        actor: &Actor,
        id: &ApplicationId,
        request: RemarksRequest,
    ) -> Result<ApplicationRecord, RegistrationError> {
        self.transition(
            actor,
            id,
            Action::Reject,
            request.remarks.as_deref(),
            |_, _, _| Ok(()),
        )
    }

    pub fn dtdo_revert(
        &self,
        actor: &Actor,
        id: &ApplicationId,
        request: RemarksRequest,
    ) -> Result<ApplicationRecord, RegistrationError> {
        self.transition(
            actor,
            id,
            Action::Revert,
            request.remarks.as_deref(),
            |_, _, _| Ok(()),
        )
    }

    /// File the inspection report. Every mandatory checklist item must be answered.
    pub fn submit_inspection_report(
        &self,
        actor: &Actor,
        id: &ApplicationId,
        findings: InspectionFindings,
    ) -> Result<ApplicationRecord, RegistrationError> {
        let remarks = findings.remarks.clone();
        self.transition(
            actor,
            id,
            Action::CompleteInspection,
            remarks.as_deref(),
            |record, _, now| {
                if let Some(order) = &record.inspection {
                    if findings.inspected_on < order.scheduled_for {
                        return Err(validation(
                            "inspected_on",
                            "inspection date precedes the scheduled visit",
                        ));
                    }
                }
                let report = self.policy.checklist.evaluate(
                    findings,
                    actor.user_id.clone(),
                    now,
                    record.review_cycle,
                )?;
                record.inspection_reports.push(report);
                Ok(())
            },
        )
    }

    /// Approve the inspected application; the tier decides between state review and payment.
    pub fn approve_inspection(
        &self,
        actor: &Actor,
        id: &ApplicationId,
        request: RemarksRequest,
    ) -> Result<ApplicationRecord, RegistrationError> {
        self.transition(
            actor,
            id,
            Action::Approve,
            request.remarks.as_deref(),
            |record, transition, _| {
                require_inspected(transition.from)?;
                let report = record.active_inspection_report().ok_or_else(|| {
                    validation("inspection", "no inspection report filed for this cycle")
                })?;
                if !report.mandatory_met
                    || report.recommendation != InspectionRecommendation::Approve
                {
                    return Err(validation(
                        "inspection",
                        "the inspection report does not support approval",
                    ));
                }
                Ok(())
            },
        )
    }

    pub fn reject_inspection(
        &self,
        actor: &Actor,
        id: &ApplicationId,
        request: RemarksRequest,
    ) -> Result<ApplicationRecord, RegistrationError> {
        self.transition(
            actor,
            id,
            Action::Reject,
            request.remarks.as_deref(),
            |_, transition, _| require_inspected(transition.from),
        )
    }

    /// Send the application back with objections from the site visit; resubmission opens a
    /// new review cycle.
    pub fn raise_objections(
        &self,
        actor: &Actor,
        id: &ApplicationId,
        request: RemarksRequest,
    ) -> Result<ApplicationRecord, RegistrationError> {
        self.transition(
            actor,
            id,
            Action::RaiseObjections,
            request.remarks.as_deref(),
            |_, transition, _| require_inspected(transition.from),
        )
    }
}

fn require_inspected(status: ApplicationStatus) -> Result<(), RegistrationError> {
    if status == ApplicationStatus::InspectionCompleted {
        Ok(())
    } else {
        Err(RegistrationError::Conflict(format!(
            "no inspection report is awaiting a decision while the application is {status}"
        )))
    }
}
