use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Opaque identifier handed out when an import job is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// How a resident occupies their dwelling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidenceStatus {
    #[default]
    Owner,
    Tenant,
    Boarding,
}

impl ResidenceStatus {
    pub const ALL: [ResidenceStatus; 3] = [Self::Owner, Self::Tenant, Self::Boarding];

    /// Case-insensitive parse of the stored label.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.label().eq_ignore_ascii_case(value))
    }

    pub fn label(self) -> &'static str {
        match self {
            ResidenceStatus::Owner => "owner",
            ResidenceStatus::Tenant => "tenant",
            ResidenceStatus::Boarding => "boarding",
        }
    }
}

/// A resident row after header normalization and validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResidentRecord {
    /// 16-digit national identity number; unique among active residents.
    pub nik: String,
    pub kk_number: Option<String>,
    pub full_name: String,
    pub birth_date: Option<NaiveDate>,
    pub birth_place: Option<String>,
    pub gender: Option<String>,
    pub religion: Option<String>,
    pub occupation: Option<String>,
    pub education: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub rt_number: String,
    pub rw_number: String,
    pub address: String,
    pub postal_code: Option<String>,
    pub residence_status: ResidenceStatus,
}

/// One data row exactly as read from the upload, keyed by raw header text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based line in the source file (the header is line 1).
    pub line_number: u64,
    pub fields: BTreeMap<String, String>,
}

/// A single problem found while checking a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowIssue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl RowIssue {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{field} {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// A row that was not committed, kept for the failure report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRow {
    pub line_number: u64,
    pub raw_fields: BTreeMap<String, String>,
    pub errors: Vec<RowIssue>,
}

impl FailedRow {
    pub fn new(row: RawRow, errors: Vec<RowIssue>) -> Self {
        Self {
            line_number: row.line_number,
            raw_fields: row.fields,
            errors,
        }
    }

    /// All issues joined into one line, as written to the failure artifact.
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}
