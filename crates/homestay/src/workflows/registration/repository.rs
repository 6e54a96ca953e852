use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ApplicationId, ApplicationStatus, Role, UserId};
use super::record::{ApplicationRecord, TimelineEntry};
use super::transitions::Action;

/// Storage abstraction so the workflow can be exercised without a database.
///
/// `replace` is a compare-and-swap on `version`: implementations must refuse the write when the
/// stored record is no longer at `expected_version`.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    fn replace(
        &self,
        record: ApplicationRecord,
        expected_version: u64,
    ) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn list(&self) -> Result<Vec<ApplicationRecord>, RepositoryError>;
    /// Look up the application owning a payment, by payment id or gateway reference.
    fn find_by_payment(&self, reference: &str)
        -> Result<Option<ApplicationRecord>, RepositoryError>;
    /// Next application number sequence for `year`, starting at 1.
    fn next_sequence(&self, year: i32) -> Result<u64, RepositoryError>;
    /// Remove every record, returning how many were dropped.
    fn clear(&self) -> Result<usize, RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record changed concurrently (expected version {expected}, found {found})")]
    VersionConflict { expected: u64, found: u64 },
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound notification hook. Projections (dashboards, caches) invalidate on these.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: WorkflowEvent) -> Result<(), PublishError>;
}

/// Emitted once per committed status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub application_id: ApplicationId,
    pub action: Action,
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
    pub actor: UserId,
    pub role: Role,
    pub version: u64,
    pub at: DateTime<Utc>,
}

impl WorkflowEvent {
    pub fn committed(record: &ApplicationRecord, entry: &TimelineEntry) -> Self {
        Self {
            application_id: record.id.clone(),
            action: entry.action,
            from: entry.from,
            to: entry.to,
            actor: entry.actor.clone(),
            role: entry.role,
            version: record.version,
            at: entry.at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("event transport unavailable: {0}")]
    Transport(String),
}
