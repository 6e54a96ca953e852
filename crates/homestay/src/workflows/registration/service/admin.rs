use std::str::FromStr;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::{validation, RegistrationError, RegistrationService};
use crate::payments::PaymentStatus;
use crate::workflows::registration::console::{self, ConsoleError, ConsoleResult};
use crate::workflows::registration::domain::{
    Actor, ApplicationId, ApplicationStatus, Role,
};
use crate::workflows::registration::record::{ApplicationRecord, TimelineEntry};
use crate::workflows::registration::repository::{ApplicationRepository, EventPublisher};
use crate::workflows::registration::requests::CreateApplication;
use crate::workflows::registration::seed::{self, SeedApplication};
use crate::workflows::registration::transitions::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetOperation {
    Applications,
    Payments,
    Inspections,
}

impl ResetOperation {
    pub const fn label(self) -> &'static str {
        match self {
            ResetOperation::Applications => "applications",
            ResetOperation::Payments => "payments",
            ResetOperation::Inspections => "inspections",
        }
    }
}

impl FromStr for ResetOperation {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "applications" => Ok(ResetOperation::Applications),
            "payments" => Ok(ResetOperation::Payments),
            "inspections" => Ok(ResetOperation::Inspections),
            other => Err(format!(
                "unknown reset operation '{other}' (expected applications, payments or inspections)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedKind {
    Demo,
    Csv,
}

impl FromStr for SeedKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "demo" => Ok(SeedKind::Demo),
            "csv" => Ok(SeedKind::Csv),
            other => Err(format!("unknown seed type '{other}' (expected demo or csv)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub operation: Option<ResetOperation>,
    pub applications_affected: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub kind: SeedKind,
    pub created: Vec<ApplicationId>,
}

impl<R, E> RegistrationService<R, E>
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    /// Drop every application record.
    pub fn reset_database(&self, actor: &Actor) -> Result<ResetSummary, RegistrationError> {
        require_admin(actor)?;
        let removed = self.store.repository().clear()?;
        warn!(admin = %actor.user_id, removed, "application store reset");
        Ok(ResetSummary {
            operation: None,
            applications_affected: removed,
        })
    }

    /// Targeted reset. Payments and inspections are rolled back on open applications only;
    /// approved and rejected applications are left as issued.
    pub fn reset(
        &self,
        actor: &Actor,
        operation: ResetOperation,
    ) -> Result<ResetSummary, RegistrationError> {
        require_admin(actor)?;
        if operation == ResetOperation::Applications {
            let summary = self.reset_database(actor)?;
            return Ok(ResetSummary {
                operation: Some(operation),
                ..summary
            });
        }

        let mut affected = 0;
        for record in self.store.list()? {
            if record.status.is_terminal() {
                continue;
            }
            let (_, changed) = self.store.mutate(&record.id, |record| {
                let now = Utc::now();
                let from = record.status;
                let to = match operation {
                    ResetOperation::Payments => reset_payments(record),
                    ResetOperation::Inspections => reset_inspections(record),
                    ResetOperation::Applications => None,
                };
                let Some(to) = to else {
                    return Ok::<_, RegistrationError>(false);
                };
                record.status = to;
                record.last_transition_at = now;
                record.timeline.push(TimelineEntry {
                    at: now,
                    actor: actor.user_id.clone(),
                    role: actor.role,
                    action: Action::AdminReset,
                    from,
                    to,
                    note: Some(format!("admin reset of {}", operation.label())),
                });
                Ok(true)
            })?;
            if changed {
                affected += 1;
            }
        }

        info!(admin = %actor.user_id, ?operation, affected, "admin reset completed");
        Ok(ResetSummary {
            operation: Some(operation),
            applications_affected: affected,
        })
    }

    /// Seed sample applications, either the built-in demo set or CSV rows from `body`.
    pub fn seed(
        &self,
        actor: &Actor,
        kind: SeedKind,
        body: &str,
    ) -> Result<SeedSummary, RegistrationError> {
        require_admin(actor)?;
        let seeds = match kind {
            SeedKind::Demo => seed::demo_applications(),
            SeedKind::Csv => seed::parse_csv(body.as_bytes())
                .map_err(|error| validation("csv", error.to_string()))?,
        };

        let mut created = Vec::with_capacity(seeds.len());
        for SeedApplication {
            owner_id,
            form,
            submit,
        } in seeds
        {
            let owner = Actor::new(owner_id, Role::Owner);
            let record = self.create(&owner, CreateApplication { form, submit })?;
            created.push(record.id);
        }

        info!(admin = %actor.user_id, ?kind, created = created.len(), "seeded applications");
        Ok(SeedSummary { kind, created })
    }

    /// Run a read-only console statement. Refused unless the deployment enables it.
    pub fn console(
        &self,
        actor: &Actor,
        statement: &str,
    ) -> Result<ConsoleResult, RegistrationError> {
        require_admin(actor)?;
        if !self.policy.console_enabled {
            return Err(RegistrationError::Authorization(
                "the data console is disabled outside development and test".to_string(),
            ));
        }
        let records: Vec<ApplicationRecord> = self.store.list()?;
        console::execute(statement, &records).map_err(|error| match error {
            ConsoleError::NotReadOnly => RegistrationError::Authorization(error.to_string()),
            other => validation("statement", other.to_string()),
        })
    }
}

fn require_admin(actor: &Actor) -> Result<(), RegistrationError> {
    if actor.role == Role::Admin {
        Ok(())
    } else {
        Err(RegistrationError::Authorization(
            "administrator role required".to_string(),
        ))
    }
}

/// Drop unsettled attempts and reopen the payment step. Returns the new status when the
/// record changed.
fn reset_payments(record: &mut ApplicationRecord) -> Option<ApplicationStatus> {
    let before = record.payments.len();
    record
        .payments
        .retain(|payment| payment.status == PaymentStatus::Verified);
    let reopened = record.status == ApplicationStatus::VerifiedForPayment;
    if before == record.payments.len() && !reopened {
        return None;
    }
    Some(if reopened {
        ApplicationStatus::PaymentPending
    } else {
        record.status
    })
}

/// Discard the current cycle's inspection so it can be filed again.
fn reset_inspections(record: &mut ApplicationRecord) -> Option<ApplicationStatus> {
    match record.status {
        ApplicationStatus::InspectionScheduled | ApplicationStatus::InspectionCompleted => {
            let cycle = record.review_cycle;
            record
                .inspection_reports
                .retain(|report| report.cycle != cycle);
            Some(ApplicationStatus::InspectionScheduled)
        }
        _ => None,
    }
}
