use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::workflows::residents::{
    RepositoryError, ResidenceStatus, ResidentRecord, ResidentRepository, StoredResident,
};

const BUSY_TIMEOUT_MS: u64 = 5_000;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS residents (
    id               TEXT PRIMARY KEY,
    nik              TEXT NOT NULL,
    kk_number        TEXT,
    full_name        TEXT NOT NULL,
    birth_date       TEXT,
    birth_place      TEXT,
    gender           TEXT,
    religion         TEXT,
    occupation       TEXT,
    education        TEXT,
    email            TEXT,
    phone            TEXT,
    rt_number        TEXT NOT NULL,
    rw_number        TEXT NOT NULL,
    address          TEXT NOT NULL,
    postal_code      TEXT,
    residence_status TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    deleted_at       TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS residents_active_nik
    ON residents (nik) WHERE deleted_at IS NULL;
"#;

const SELECT_COLUMNS: &str = "id, nik, kk_number, full_name, birth_date, birth_place, gender, \
     religion, occupation, education, email, phone, rt_number, rw_number, address, postal_code, \
     residence_status, created_at";

/// Resident store backed by a single SQLite connection.
///
/// NIK uniqueness is enforced by a partial unique index over rows that have
/// not been soft-deleted.
pub struct SqliteResidentRepository {
    conn: Mutex<Connection>,
}

impl SqliteResidentRepository {
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path).map_err(unavailable)?;
        Self::initialise(conn)
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        Self::initialise(conn)
    }

    fn initialise(conn: Connection) -> Result<Self, RepositoryError> {
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
            .map_err(unavailable)?;
        conn.execute_batch(SCHEMA).map_err(unavailable)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| RepositoryError::Unavailable("sqlite connection poisoned".to_string()))?;
        op(&conn)
    }
}

impl ResidentRepository for SqliteResidentRepository {
    fn insert(&self, record: ResidentRecord) -> Result<StoredResident, RepositoryError> {
        let stored = StoredResident {
            id: uuid::Uuid::new_v4().to_string(),
            record,
            created_at: Utc::now(),
        };

        self.with_conn(|conn| {
            let record = &stored.record;
            conn.execute(
                r#"
                INSERT INTO residents (
                    id, nik, kk_number, full_name, birth_date, birth_place, gender,
                    religion, occupation, education, email, phone, rt_number, rw_number,
                    address, postal_code, residence_status, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
                "#,
                params![
                    stored.id,
                    record.nik,
                    record.kk_number,
                    record.full_name,
                    record.birth_date,
                    record.birth_place,
                    record.gender,
                    record.religion,
                    record.occupation,
                    record.education,
                    record.email,
                    record.phone,
                    record.rt_number,
                    record.rw_number,
                    record.address,
                    record.postal_code,
                    record.residence_status.label(),
                    stored.created_at,
                ],
            )
            .map_err(|err| {
                if is_unique_violation(&err) {
                    RepositoryError::Conflict {
                        nik: record.nik.clone(),
                    }
                } else {
                    unavailable(err)
                }
            })?;
            Ok(())
        })?;

        Ok(stored)
    }

    fn find_by_nik(&self, nik: &str) -> Result<Option<StoredResident>, RepositoryError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SELECT_COLUMNS} FROM residents WHERE nik = ?1 AND deleted_at IS NULL"
            );
            conn.query_row(&sql, params![nik], row_to_resident)
                .optional()
                .map_err(unavailable)
        })
    }
}

fn row_to_resident(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredResident> {
    let status: String = row.get(16)?;
    let birth_date: Option<NaiveDate> = row.get(4)?;
    let created_at: DateTime<Utc> = row.get(17)?;

    Ok(StoredResident {
        id: row.get(0)?,
        record: ResidentRecord {
            nik: row.get(1)?,
            kk_number: row.get(2)?,
            full_name: row.get(3)?,
            birth_date,
            birth_place: row.get(5)?,
            gender: row.get(6)?,
            religion: row.get(7)?,
            occupation: row.get(8)?,
            education: row.get(9)?,
            email: row.get(10)?,
            phone: row.get(11)?,
            rt_number: row.get(12)?,
            rw_number: row.get(13)?,
            address: row.get(14)?,
            postal_code: row.get(15)?,
            residence_status: ResidenceStatus::parse(&status).unwrap_or_default(),
        },
        created_at,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn unavailable(err: rusqlite::Error) -> RepositoryError {
    RepositoryError::Unavailable(err.to_string())
}
