use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use unicode_normalization::UnicodeNormalization;

use crate::config::UploadConfig;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Invalid file")]
    InvalidFile,
    #[error("File too large (limit is {limit} bytes)")]
    FileTooLarge { limit: usize },
    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Local directory holding uploaded images.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    max_bytes: usize,
    allowed_extensions: Vec<String>,
}

impl UploadStore {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            max_bytes: config.max_bytes,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn ensure_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)
    }

    pub fn extract_file_extension(filename: &str) -> Option<String> {
        filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }

    pub fn is_allowed(&self, filename: &str) -> bool {
        Self::extract_file_extension(filename)
            .is_some_and(|ext| self.allowed_extensions.contains(&ext))
    }

    pub fn validate_size(&self, len: usize) -> Result<(), UploadError> {
        if len > self.max_bytes {
            return Err(UploadError::FileTooLarge {
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Checks the client file name and returns the sanitized name it will be
    /// stored under. The extension is checked on the name as sent; the
    /// sanitized name may lose it.
    pub fn accept_filename(&self, filename: &str) -> Result<String, UploadError> {
        if filename.is_empty() || !self.is_allowed(filename) {
            return Err(UploadError::InvalidFile);
        }
        let safe = secure_filename(filename);
        if safe.is_empty() {
            return Err(UploadError::InvalidFile);
        }
        Ok(safe)
    }

    /// Writes `data` under `safe_name`, replacing any earlier upload with the
    /// same name.
    pub async fn save(&self, safe_name: &str, data: &[u8]) -> Result<PathBuf, UploadError> {
        self.validate_size(data.len())?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(safe_name);
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(path)
    }
}

/// Reduces a client supplied file name to a flat ASCII name: letters are
/// transliterated through NFKD, path separators and whitespace become `_`,
/// anything outside `[A-Za-z0-9._-]` is removed, and leading or trailing
/// `.`/`_` are stripped.
pub fn secure_filename(filename: &str) -> String {
    let normalized: String = filename
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = normalized.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}
