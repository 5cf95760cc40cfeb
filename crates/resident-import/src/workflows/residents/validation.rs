use super::domain::{ResidenceStatus, ResidentRecord, RowIssue};
use super::mapping::{CandidateRecord, CanonicalField};
use chrono::NaiveDate;

const NIK_LENGTH: usize = 16;

/// Row-local checks turning a candidate mapping into a [`ResidentRecord`].
///
/// A missing or blank residence status defaults to `owner`; a value outside
/// the known statuses is an error. Import and preview share this rule set.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowValidator;

impl RowValidator {
    pub fn validate(&self, candidate: &CandidateRecord) -> Result<ResidentRecord, Vec<RowIssue>> {
        let mut issues = Vec::new();

        let nik = required(candidate, CanonicalField::Nik, &mut issues);
        if let Some(value) = nik.as_deref() {
            if !is_digits(value, NIK_LENGTH..=NIK_LENGTH) {
                issues.push(issue(CanonicalField::Nik, "must be exactly 16 digits"));
            }
        }

        let full_name = required(candidate, CanonicalField::FullName, &mut issues);
        let rt_number = required(candidate, CanonicalField::RtNumber, &mut issues);
        let rw_number = required(candidate, CanonicalField::RwNumber, &mut issues);
        let address = required(candidate, CanonicalField::Address, &mut issues);

        for (field, value) in [
            (CanonicalField::RtNumber, rt_number.as_deref()),
            (CanonicalField::RwNumber, rw_number.as_deref()),
        ] {
            if let Some(value) = value {
                if !is_digits(value, 1..=3) {
                    issues.push(issue(field, "must be 1 to 3 digits"));
                }
            }
        }

        let kk_number = optional(candidate, CanonicalField::KkNumber);
        if let Some(value) = kk_number.as_deref() {
            if !is_digits(value, NIK_LENGTH..=NIK_LENGTH) {
                issues.push(issue(CanonicalField::KkNumber, "must be exactly 16 digits"));
            }
        }

        let birth_date = match optional(candidate, CanonicalField::BirthDate) {
            Some(raw) => match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    issues.push(issue(
                        CanonicalField::BirthDate,
                        "must be a date formatted YYYY-MM-DD",
                    ));
                    None
                }
            },
            None => None,
        };

        let email = optional(candidate, CanonicalField::Email);
        if let Some(value) = email.as_deref() {
            if !looks_like_email(value) {
                issues.push(issue(CanonicalField::Email, "must be a valid email address"));
            }
        }

        let phone = optional(candidate, CanonicalField::Phone);
        if let Some(value) = phone.as_deref() {
            if !is_digits(value.strip_prefix('+').unwrap_or(value), 8..=15) {
                issues.push(issue(
                    CanonicalField::Phone,
                    "must be 8 to 15 digits with an optional leading +",
                ));
            }
        }

        let residence_status = match optional(candidate, CanonicalField::ResidenceStatus) {
            None => ResidenceStatus::default(),
            Some(raw) => ResidenceStatus::parse(&raw).unwrap_or_else(|| {
                issues.push(issue(
                    CanonicalField::ResidenceStatus,
                    "must be one of owner, tenant, boarding",
                ));
                ResidenceStatus::default()
            }),
        };

        if !issues.is_empty() {
            return Err(issues);
        }

        match (nik, full_name, rt_number, rw_number, address) {
            (Some(nik), Some(full_name), Some(rt_number), Some(rw_number), Some(address)) => {
                Ok(ResidentRecord {
                    nik,
                    kk_number,
                    full_name,
                    birth_date,
                    birth_place: optional(candidate, CanonicalField::BirthPlace),
                    gender: optional(candidate, CanonicalField::Gender),
                    religion: optional(candidate, CanonicalField::Religion),
                    occupation: optional(candidate, CanonicalField::Occupation),
                    education: optional(candidate, CanonicalField::Education),
                    email,
                    phone,
                    rt_number,
                    rw_number,
                    address,
                    postal_code: optional(candidate, CanonicalField::PostalCode),
                    residence_status,
                })
            }
            _ => Err(vec![RowIssue::general("required fields missing")]),
        }
    }
}

fn issue(field: CanonicalField, message: &str) -> RowIssue {
    RowIssue::field(field.name(), message)
}

fn required(
    candidate: &CandidateRecord,
    field: CanonicalField,
    issues: &mut Vec<RowIssue>,
) -> Option<String> {
    match candidate.get(field).map(str::trim) {
        None => {
            issues.push(issue(field, "is required"));
            None
        }
        Some("") => {
            issues.push(issue(field, "must not be empty"));
            None
        }
        Some(value) => Some(value.to_string()),
    }
}

fn optional(candidate: &CandidateRecord, field: CanonicalField) -> Option<String> {
    candidate
        .get(field)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn is_digits(value: &str, length: std::ops::RangeInclusive<usize>) -> bool {
    length.contains(&value.len()) && value.bytes().all(|byte| byte.is_ascii_digit())
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    }
}
