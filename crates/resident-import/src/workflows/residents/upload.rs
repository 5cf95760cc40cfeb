use std::path::{Path, PathBuf};

/// A spooled upload on local disk.
///
/// The file is removed when the value is dropped, so whoever holds it last
/// (the preview call or the import job) is responsible for its lifetime.
#[derive(Debug)]
pub struct UploadedFile {
    path: PathBuf,
    original_name: Option<String>,
    cleanup: bool,
}

impl UploadedFile {
    /// Create an empty spool file under `dir` and return it with a writable handle.
    pub async fn create_in(
        dir: &Path,
        original_name: Option<String>,
    ) -> Result<(Self, tokio::fs::File), UploadError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("upload-{}.csv", uuid::Uuid::new_v4()));
        let file = tokio::fs::File::create(&path).await?;

        Ok((
            Self {
                path,
                original_name,
                cleanup: true,
            },
            file,
        ))
    }

    /// Take ownership of an existing file; it is deleted on drop.
    pub fn adopt(path: PathBuf, original_name: Option<String>) -> Self {
        Self {
            path,
            original_name,
            cleanup: true,
        }
    }

    /// Reference a file the caller owns; it is never deleted.
    pub fn persistent(path: PathBuf) -> Self {
        Self {
            path,
            original_name: None,
            cleanup: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original_name(&self) -> Option<&str> {
        self.original_name.as_deref()
    }
}

impl Drop for UploadedFile {
    fn drop(&mut self) {
        if !self.cleanup {
            return;
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed spooled upload"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "failed to remove spooled upload"
            ),
        }
    }
}

/// Problems receiving an uploaded file.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("no file was uploaded")]
    MissingFile,
    #[error("malformed multipart body: {0}")]
    Multipart(String),
    #[error("upload exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("failed to spool upload: {0}")]
    Io(#[from] std::io::Error),
}
