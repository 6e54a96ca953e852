use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use super::domain::ApplicationId;
use super::record::ApplicationRecord;
use super::repository::{
    ApplicationRepository, EventPublisher, PublishError, RepositoryError, WorkflowEvent,
};

/// Process-local repository used by the service binary, the CLI demo and tests.
#[derive(Default, Clone)]
pub struct InMemoryApplicationRepository {
    records: Arc<RwLock<HashMap<ApplicationId, ApplicationRecord>>>,
    sequences: Arc<Mutex<HashMap<i32, u64>>>,
}

impl InMemoryApplicationRepository {
    pub fn len(&self) -> usize {
        self.records.read().expect("repository lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.records.write().expect("repository lock poisoned");
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn replace(
        &self,
        record: ApplicationRecord,
        expected_version: u64,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.records.write().expect("repository lock poisoned");
        match guard.get(&record.id) {
            None => Err(RepositoryError::NotFound),
            Some(stored) if stored.version != expected_version => {
                Err(RepositoryError::VersionConflict {
                    expected: expected_version,
                    found: stored.version,
                })
            }
            Some(_) => {
                guard.insert(record.id.clone(), record);
                Ok(())
            }
        }
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.records.read().expect("repository lock poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let guard = self.records.read().expect("repository lock poisoned");
        let mut records: Vec<ApplicationRecord> = guard.values().cloned().collect();
        records.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(records)
    }

    fn find_by_payment(
        &self,
        reference: &str,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.records.read().expect("repository lock poisoned");
        Ok(guard
            .values()
            .find(|record| record.payment_by_reference(reference).is_some())
            .cloned())
    }

    fn next_sequence(&self, year: i32) -> Result<u64, RepositoryError> {
        let mut guard = self.sequences.lock().expect("sequence mutex poisoned");
        let next = guard.entry(year).or_insert(0);
        *next += 1;
        Ok(*next)
    }

    fn clear(&self) -> Result<usize, RepositoryError> {
        let mut guard = self.records.write().expect("repository lock poisoned");
        let removed = guard.len();
        guard.clear();
        self.sequences
            .lock()
            .expect("sequence mutex poisoned")
            .clear();
        Ok(removed)
    }
}

/// Publisher that keeps every event; the demo prints them and tests assert on them.
#[derive(Default, Clone)]
pub struct RecordingEventPublisher {
    events: Arc<Mutex<Vec<WorkflowEvent>>>,
}

impl RecordingEventPublisher {
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().expect("event mutex poisoned").clone()
    }
}

impl EventPublisher for RecordingEventPublisher {
    fn publish(&self, event: WorkflowEvent) -> Result<(), PublishError> {
        self.events
            .lock()
            .expect("event mutex poisoned")
            .push(event);
        Ok(())
    }
}
