//! Error taxonomy for registry I/O and host control.
//!
//! - NotFound: обязательный файл отсутствует (детекторы деградируют до пустого результата).
//! - InvalidFormat: документ не парсится или имеет неверную форму (файл пропускаем).
//! - SaveFailed: сбой пути записи; tmp удалён, целевой файл не тронут.
//! - ProcessControlFailed: не удалось остановить/запустить Home Assistant.
//! - Database: ошибка SQLite при чистке recorder.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("invalid format in {}: {reason}", .path.display())]
    InvalidFormat { path: PathBuf, reason: String },

    #[error("save failed for {}: {source}", .path.display())]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("host process control failed: {0}")]
    ProcessControlFailed(String),

    #[error("recorder database: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CleanupError {
    pub fn invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        CleanupError::InvalidFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CleanupError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, CleanupError>;
