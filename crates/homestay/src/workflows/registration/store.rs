use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::domain::ApplicationId;
use super::record::ApplicationRecord;
use super::repository::{ApplicationRepository, RepositoryError};

/// Serialises writers per application id on top of an [`ApplicationRepository`].
///
/// Mutations run against a copy of the record and are written back with a version check, so a
/// failed closure or a rejected write leaves the stored record untouched. Readers go straight to
/// the repository and only ever observe committed records.
pub struct ApplicationStore<R> {
    repository: Arc<R>,
    locks: Mutex<HashMap<ApplicationId, Arc<Mutex<()>>>>,
}

impl<R> ApplicationStore<R>
where
    R: ApplicationRepository,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    fn lock_for(&self, id: &ApplicationId) -> Result<Arc<Mutex<()>>, RepositoryError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| RepositoryError::Unavailable("lock table poisoned".to_string()))?;
        Ok(locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    pub fn create(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        self.repository.insert(record)
    }

    pub fn get(&self, id: &ApplicationId) -> Result<ApplicationRecord, RepositoryError> {
        self.repository.fetch(id)?.ok_or(RepositoryError::NotFound)
    }

    pub fn list(&self) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        self.repository.list()
    }

    /// Apply `change` under the per-id lock and commit the result.
    ///
    /// Returns the committed record (or the unchanged one when `change` made no edits) together
    /// with whatever the closure produced.
    pub fn mutate<T, E, F>(
        &self,
        id: &ApplicationId,
        change: F,
    ) -> Result<(ApplicationRecord, T), E>
    where
        F: FnOnce(&mut ApplicationRecord) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let lock = self.lock_for(id)?;
        let result = match lock.lock() {
            Ok(_guard) => self.commit(id, change),
            Err(_) => Err(E::from(RepositoryError::Unavailable(
                "application lock poisoned".to_string(),
            ))),
        };
        drop(lock);
        self.release_lock(id);
        result
    }

    fn commit<T, E, F>(&self, id: &ApplicationId, change: F) -> Result<(ApplicationRecord, T), E>
    where
        F: FnOnce(&mut ApplicationRecord) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let current = self.get(id)?;
        let mut draft = current.clone();
        let output = change(&mut draft)?;

        if draft == current {
            return Ok((current, output));
        }

        draft.id = current.id.clone();
        draft.version = current.version + 1;
        self.repository.replace(draft.clone(), current.version)?;
        debug!(
            application_id = %draft.id,
            version = draft.version,
            status = %draft.status,
            "committed application"
        );
        Ok((draft, output))
    }

    /// Drop the id's lock once no other writer holds or waits on it.
    fn release_lock(&self, id: &ApplicationId) {
        if let Ok(mut locks) = self.locks.lock() {
            if locks
                .get(id)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                locks.remove(id);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_locks(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }
}
