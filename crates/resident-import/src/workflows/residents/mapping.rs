use super::domain::RawRow;
use super::normalizer::normalize_header;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::OnceLock;

/// Resident attributes a CSV column can feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalField {
    Nik,
    KkNumber,
    FullName,
    BirthDate,
    BirthPlace,
    Gender,
    Religion,
    Occupation,
    Education,
    Email,
    Phone,
    RtNumber,
    RwNumber,
    Address,
    PostalCode,
    ResidenceStatus,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 16] = [
        Self::Nik,
        Self::KkNumber,
        Self::FullName,
        Self::BirthDate,
        Self::BirthPlace,
        Self::Gender,
        Self::Religion,
        Self::Occupation,
        Self::Education,
        Self::Email,
        Self::Phone,
        Self::RtNumber,
        Self::RwNumber,
        Self::Address,
        Self::PostalCode,
        Self::ResidenceStatus,
    ];

    /// Name used in field-level error reports.
    pub fn name(self) -> &'static str {
        match self {
            Self::Nik => "nik",
            Self::KkNumber => "kkNumber",
            Self::FullName => "fullName",
            Self::BirthDate => "birthDate",
            Self::BirthPlace => "birthPlace",
            Self::Gender => "gender",
            Self::Religion => "religion",
            Self::Occupation => "occupation",
            Self::Education => "education",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::RtNumber => "rtNumber",
            Self::RwNumber => "rwNumber",
            Self::Address => "address",
            Self::PostalCode => "postalCode",
            Self::ResidenceStatus => "residenceStatus",
        }
    }

    /// Accepted headers in normalized form, highest priority first.
    fn synonyms(self) -> &'static [&'static str] {
        match self {
            Self::Nik => &["nik", "nik_number", "no_nik"],
            Self::KkNumber => &["kk_number", "kk", "kknumber", "no_kk"],
            Self::FullName => &["full_name", "fullname", "name"],
            Self::BirthDate => &["birth_date", "birthdate"],
            Self::BirthPlace => &["birth_place", "birthplace"],
            Self::Gender => &["gender"],
            Self::Religion => &["religion"],
            Self::Occupation => &["occupation"],
            Self::Education => &["education"],
            Self::Email => &["email"],
            Self::Phone => &["phone", "phone_number"],
            Self::RtNumber => &["rt_number", "rt", "rtnumber"],
            Self::RwNumber => &["rw_number", "rw", "rwnumber"],
            Self::Address => &["address"],
            Self::PostalCode => &["postal_code", "postalcode"],
            Self::ResidenceStatus => &["residence_status", "residencestatus"],
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

static SYNONYM_MAP: OnceLock<HashMap<&'static str, (CanonicalField, usize)>> = OnceLock::new();

fn synonym_map() -> &'static HashMap<&'static str, (CanonicalField, usize)> {
    SYNONYM_MAP.get_or_init(|| {
        let mut map = HashMap::new();
        for field in CanonicalField::ALL {
            for (priority, synonym) in field.synonyms().iter().enumerate() {
                map.insert(*synonym, (field, priority));
            }
        }
        map
    })
}

/// Field values pulled from one row. A field with no matching column is
/// absent, which validation reports differently from an empty cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateRecord {
    pub line_number: u64,
    values: BTreeMap<CanonicalField, String>,
}

impl CandidateRecord {
    pub fn get(&self, field: CanonicalField) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    pub fn is_missing(&self, field: CanonicalField) -> bool {
        !self.values.contains_key(&field)
    }

    #[cfg(test)]
    pub(crate) fn from_pairs(pairs: &[(CanonicalField, &str)]) -> Self {
        Self {
            line_number: 2,
            values: pairs
                .iter()
                .map(|(field, value)| (*field, value.to_string()))
                .collect(),
        }
    }
}

/// Resolves a file's header row to canonical fields once, then maps each row.
#[derive(Debug, Clone, Default)]
pub struct CsvRowMapper {
    columns: BTreeMap<CanonicalField, String>,
}

impl CsvRowMapper {
    pub fn from_headers<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut chosen: BTreeMap<CanonicalField, (usize, String)> = BTreeMap::new();

        for header in headers {
            let raw = header.as_ref();
            let Some(&(field, priority)) = synonym_map().get(normalize_header(raw).as_str())
            else {
                continue;
            };

            match chosen.get(&field) {
                Some((current, _)) if *current <= priority => {}
                _ => {
                    chosen.insert(field, (priority, raw.to_string()));
                }
            }
        }

        Self {
            columns: chosen
                .into_iter()
                .map(|(field, (_, header))| (field, header))
                .collect(),
        }
    }

    /// The raw header feeding `field`, if the file has one.
    pub fn column_for(&self, field: CanonicalField) -> Option<&str> {
        self.columns.get(&field).map(String::as_str)
    }

    pub fn unmapped_fields(&self) -> impl Iterator<Item = CanonicalField> + '_ {
        CanonicalField::ALL
            .into_iter()
            .filter(|field| !self.columns.contains_key(field))
    }

    pub fn map(&self, row: &RawRow) -> CandidateRecord {
        let values = self
            .columns
            .iter()
            .filter_map(|(field, header)| {
                row.fields
                    .get(header)
                    .map(|value| (*field, value.trim().to_string()))
            })
            .collect();

        CandidateRecord {
            line_number: row.line_number,
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        RawRow {
            line_number: 2,
            fields: pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }

    #[test]
    fn recognizes_header_synonyms() {
        for header in ["nik", "NIK", "nik_number", "No NIK", "\u{feff}nik"] {
            let mapper = CsvRowMapper::from_headers([header]);
            assert_eq!(mapper.column_for(CanonicalField::Nik), Some(header));
        }

        let mapper = CsvRowMapper::from_headers(["KK", "fullName", "RT", "rw_number"]);
        assert_eq!(mapper.column_for(CanonicalField::KkNumber), Some("KK"));
        assert_eq!(mapper.column_for(CanonicalField::FullName), Some("fullName"));
        assert_eq!(mapper.column_for(CanonicalField::RtNumber), Some("RT"));
        assert_eq!(mapper.column_for(CanonicalField::RwNumber), Some("rw_number"));
    }

    #[test]
    fn earliest_synonym_wins_when_several_present() {
        let mapper = CsvRowMapper::from_headers(["name", "full_name"]);
        assert_eq!(mapper.column_for(CanonicalField::FullName), Some("full_name"));

        let candidate = mapper.map(&row(&[("name", "Short"), ("full_name", "Full Name")]));
        assert_eq!(candidate.get(CanonicalField::FullName), Some("Full Name"));
    }

    #[test]
    fn absent_column_is_missing_not_empty() {
        let mapper = CsvRowMapper::from_headers(["nik", "address"]);
        let candidate = mapper.map(&row(&[("nik", "1234567890123456"), ("address", "")]));

        assert!(candidate.is_missing(CanonicalField::FullName));
        assert!(!candidate.is_missing(CanonicalField::Address));
        assert_eq!(candidate.get(CanonicalField::Address), Some(""));
        assert!(mapper
            .unmapped_fields()
            .any(|field| field == CanonicalField::FullName));
    }

    #[test]
    fn unknown_headers_are_ignored() {
        let mapper = CsvRowMapper::from_headers(["notes", "nik"]);
        let candidate = mapper.map(&row(&[("notes", "x"), ("nik", "1")]));
        assert_eq!(candidate.get(CanonicalField::Nik), Some("1"));
        assert_eq!(mapper.unmapped_fields().count(), CanonicalField::ALL.len() - 1);
    }
}
