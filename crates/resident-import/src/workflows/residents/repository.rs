use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::ResidentRecord;

/// A committed resident as returned by the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredResident {
    pub id: String,
    #[serde(flatten)]
    pub record: ResidentRecord,
    pub created_at: DateTime<Utc>,
}

/// Storage abstraction so the import worker can be exercised in isolation.
///
/// Implementations must reject a second active resident with the same NIK
/// with [`RepositoryError::Conflict`] and leave the store unchanged.
pub trait ResidentRepository: Send + Sync {
    fn insert(&self, record: ResidentRecord) -> Result<StoredResident, RepositoryError>;
    fn find_by_nik(&self, nik: &str) -> Result<Option<StoredResident>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("an active resident with NIK {nik} already exists")]
    Conflict { nik: String },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Process-local repository used by tests and when no database is configured.
#[derive(Debug, Default, Clone)]
pub struct InMemoryResidentRepository {
    records: Arc<Mutex<HashMap<String, StoredResident>>>,
}

impl InMemoryResidentRepository {
    pub fn len(&self) -> usize {
        self.records.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResidentRepository for InMemoryResidentRepository {
    fn insert(&self, record: ResidentRecord) -> Result<StoredResident, RepositoryError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("resident store poisoned".to_string()))?;

        if guard.contains_key(&record.nik) {
            return Err(RepositoryError::Conflict { nik: record.nik });
        }

        let stored = StoredResident {
            id: uuid::Uuid::new_v4().to_string(),
            record,
            created_at: Utc::now(),
        };
        guard.insert(stored.record.nik.clone(), stored.clone());
        Ok(stored)
    }

    fn find_by_nik(&self, nik: &str) -> Result<Option<StoredResident>, RepositoryError> {
        let guard = self
            .records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("resident store poisoned".to_string()))?;
        Ok(guard.get(nik).cloned())
    }
}

#[cfg(test)]
pub(crate) fn sample_record(nik: &str) -> ResidentRecord {
    ResidentRecord {
        nik: nik.to_string(),
        kk_number: None,
        full_name: "Budi Santoso".to_string(),
        birth_date: None,
        birth_place: None,
        gender: None,
        religion: None,
        occupation: None,
        education: None,
        email: None,
        phone: None,
        rt_number: "01".to_string(),
        rw_number: "02".to_string(),
        address: "Jl. Merdeka No.1".to_string(),
        postal_code: None,
        residence_status: Default::default(),
    }
}
