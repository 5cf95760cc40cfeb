use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::domain::RowIssue;
use super::mapping::CsvRowMapper;
use super::reader::{ImportError, RowReader};
use super::upload::UploadedFile;
use super::validation::RowValidator;

pub const DEFAULT_MAX_ROWS: u64 = 5_000;

/// Problems found on one previewed row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewRowError {
    pub row: u64,
    pub raw: BTreeMap<String, String>,
    pub errors: Vec<RowIssue>,
}

/// Dry-run verdict for a whole file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewReport {
    pub total_rows: u64,
    pub valid_count: u64,
    pub invalid_count: u64,
    pub errors: Vec<PreviewRowError>,
}

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("failed to parse CSV: {0}")]
    Read(#[from] ImportError),
    #[error("preview aborted: {0}")]
    Aborted(String),
}

/// Validates a file without committing anything.
#[derive(Debug, Clone, Copy)]
pub struct PreviewValidator {
    max_rows: u64,
    validator: RowValidator,
}

impl Default for PreviewValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROWS)
    }
}

impl PreviewValidator {
    pub fn new(max_rows: u64) -> Self {
        Self {
            max_rows,
            validator: RowValidator,
        }
    }

    pub fn max_rows(&self) -> u64 {
        self.max_rows
    }

    /// The row just past the limit is reported as an error and evaluation stops.
    pub fn preview_reader<R: Read>(
        &self,
        reader: RowReader<R>,
    ) -> Result<PreviewReport, PreviewError> {
        let mapper = CsvRowMapper::from_headers(reader.headers());
        let mut report = PreviewReport::default();

        for row in reader {
            let row = row?;
            report.total_rows += 1;

            if report.total_rows > self.max_rows {
                report.invalid_count += 1;
                report.errors.push(PreviewRowError {
                    row: row.line_number,
                    raw: row.fields,
                    errors: vec![RowIssue::general(format!(
                        "row limit exceeded, max {}",
                        self.max_rows
                    ))],
                });
                break;
            }

            match self.validator.validate(&mapper.map(&row)) {
                Ok(_) => report.valid_count += 1,
                Err(errors) => {
                    report.invalid_count += 1;
                    report.errors.push(PreviewRowError {
                        row: row.line_number,
                        raw: row.fields,
                        errors,
                    });
                }
            }
        }

        Ok(report)
    }

    pub fn preview_path(&self, path: &Path) -> Result<PreviewReport, PreviewError> {
        self.preview_reader(RowReader::open(path)?)
    }

    /// Consumes the upload so the spooled file is removed on every exit path.
    pub async fn preview_upload(&self, upload: UploadedFile) -> Result<PreviewReport, PreviewError> {
        let this = *self;
        let result = tokio::task::spawn_blocking(move || {
            let result = this.preview_path(upload.path());
            drop(upload);
            result
        })
        .await
        .map_err(|err| PreviewError::Aborted(err.to_string()))?;

        if let Err(err) = &result {
            tracing::error!(error = %err, "import preview failed");
        }
        result
    }
}
