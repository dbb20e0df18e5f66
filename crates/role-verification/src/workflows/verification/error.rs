use serde::Serialize;

use super::domain::{DocumentId, DocumentType, RoleName, UserId, VerificationId};
use super::repository::{FileStoreError, RepositoryError};

/// Coarse error classes surfaced to callers and mapped onto HTTP statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    StateConflict,
    UnknownRole,
    Unavailable,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::StateConflict => "state_conflict",
            Self::UnknownRole => "unknown_role",
            Self::Unavailable => "unavailable",
        }
    }
}

/// Error raised by the verification state machines and orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("verification record {0} not found")]
    RecordNotFound(VerificationId),
    #[error("no verification record exists for user {0}")]
    NoRecordForUser(UserId),
    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("invalid transition: {0}")]
    StateConflict(String),
    #[error("all required documents must be verified before approval (missing: {})", join_types(.missing))]
    IncompleteDocuments { missing: Vec<DocumentType> },
    #[error("role '{0}' is not configured in the policy registry")]
    UnknownRole(RoleName),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    FileStore(#[from] FileStoreError),
}

impl VerificationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::RecordNotFound(_) | Self::NoRecordForUser(_) | Self::DocumentNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::StateConflict(_) | Self::IncompleteDocuments { .. } => ErrorKind::StateConflict,
            Self::UnknownRole(_) => ErrorKind::UnknownRole,
            Self::Repository(RepositoryError::StaleVersion { .. }) => ErrorKind::StateConflict,
            Self::Repository(RepositoryError::NotFound) => ErrorKind::NotFound,
            Self::Repository(RepositoryError::Conflict(_)) => ErrorKind::StateConflict,
            Self::Repository(RepositoryError::Unavailable(_)) | Self::FileStore(_) => {
                ErrorKind::Unavailable
            }
        }
    }
}

fn join_types(types: &[DocumentType]) -> String {
    types
        .iter()
        .map(DocumentType::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rejects blank reasons/messages, returning the trimmed text.
pub(crate) fn require_text(value: &str, field: &str) -> Result<String, VerificationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(VerificationError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Normalizes optional notes: blank input becomes `None`.
pub(crate) fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}
