use super::domain::RawRow;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Faults that stop a file from being read any further.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to open import file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid CSV data: {0}")]
    Csv(#[from] csv::Error),
}

/// Streams data rows from a CSV source whose first row is the header.
///
/// Values are trimmed, blank lines skipped, and rows shorter than the header
/// simply lack the trailing fields. Row numbers count the header as 1 and
/// each data record after it; skipped blank lines do not advance them.
pub struct RowReader<R> {
    inner: csv::Reader<R>,
    headers: csv::StringRecord,
    record: csv::StringRecord,
}

impl RowReader<File> {
    pub fn open(path: &Path) -> Result<Self, ImportError> {
        let file = File::open(path).map_err(|source| ImportError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file)
    }
}

impl<R: Read> RowReader<R> {
    pub fn from_reader(reader: R) -> Result<Self, ImportError> {
        let mut inner = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);
        let headers = inner.headers()?.clone();

        Ok(Self {
            inner,
            headers,
            record: csv::StringRecord::new(),
        })
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.headers.iter()
    }

    fn to_raw_row(&self) -> RawRow {
        let mut fields = BTreeMap::new();
        for (header, value) in self.headers.iter().zip(self.record.iter()) {
            fields
                .entry(header.to_string())
                .or_insert_with(|| value.to_string());
        }

        RawRow {
            line_number: self.record.position().map_or(0, |position| position.line()),
            fields,
        }
    }
}

impl<R: Read> Iterator for RowReader<R> {
    type Item = Result<RawRow, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.read_record(&mut self.record) {
            Ok(true) => Some(Ok(self.to_raw_row())),
            Ok(false) => None,
            Err(err) => Some(Err(err.into())),
        }
    }
}
