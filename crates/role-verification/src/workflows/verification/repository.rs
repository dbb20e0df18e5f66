use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::document::Document;
use super::domain::{
    DocumentId, FileRef, FileUpload, RoleName, UserId, VerificationId, VerificationStatus,
};
use super::record::VerificationRecord;

/// Selection applied when listing verification records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    All,
    Pending,
    Role(RoleName),
}

impl RecordFilter {
    pub fn matches(&self, record: &VerificationRecord) -> bool {
        match self {
            Self::All => true,
            Self::Pending => record.status == VerificationStatus::Pending,
            Self::Role(role) => &record.role == role,
        }
    }
}

/// Record mutation guarded by the version the command decided against.
#[derive(Debug, Clone)]
pub struct RecordChange {
    pub record: VerificationRecord,
    pub expected_version: u64,
}

/// Document mutation carried by a [`ChangeSet`].
#[derive(Debug, Clone)]
pub enum DocumentChange {
    Insert(Document),
    Update {
        document: Document,
        expected_version: u64,
    },
    Delete {
        id: DocumentId,
        expected_version: u64,
    },
}

/// Everything one command writes. Repositories apply it all or nothing.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub record: Option<RecordChange>,
    pub document: Option<DocumentChange>,
}

impl ChangeSet {
    pub fn record(record: VerificationRecord, expected_version: u64) -> Self {
        Self {
            record: Some(RecordChange {
                record,
                expected_version,
            }),
            document: None,
        }
    }

    pub fn document(change: DocumentChange) -> Self {
        Self {
            record: None,
            document: Some(change),
        }
    }

    pub fn with_record(mut self, record: VerificationRecord, expected_version: u64) -> Self {
        self.record = Some(RecordChange {
            record,
            expected_version,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.record.is_none() && self.document.is_none()
    }
}

/// State as stored after a successful commit, with bumped versions.
#[derive(Debug, Clone, Default)]
pub struct Committed {
    pub record: Option<VerificationRecord>,
    pub document: Option<Document>,
}

/// Storage abstraction so the orchestrator can be exercised in isolation.
pub trait VerificationRepository: Send + Sync {
    /// Stores a freshly created record; `Conflict` if the user already has one.
    fn insert_record(
        &self,
        record: VerificationRecord,
    ) -> Result<VerificationRecord, RepositoryError>;
    fn fetch_record(
        &self,
        id: &VerificationId,
    ) -> Result<Option<VerificationRecord>, RepositoryError>;
    fn fetch_record_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<VerificationRecord>, RepositoryError>;
    fn records(&self, filter: &RecordFilter) -> Result<Vec<VerificationRecord>, RepositoryError>;
    fn fetch_document(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError>;
    fn documents_for_user(&self, user_id: &UserId) -> Result<Vec<Document>, RepositoryError>;
    fn pending_documents(&self) -> Result<Vec<Document>, RepositoryError>;
    /// Applies `changes` atomically, failing with `StaleVersion` when any expected
    /// version no longer matches.
    fn commit(&self, changes: ChangeSet) -> Result<Committed, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error("record not found")]
    NotFound,
    #[error("{entity} changed concurrently (expected version {expected}, found {found})")]
    StaleVersion {
        entity: String,
        expected: u64,
        found: u64,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// External binary store. Only called after an upload passed validation.
pub trait FileStore: Send + Sync {
    fn store(&self, owner: &UserId, upload: &FileUpload) -> Result<FileRef, FileStoreError>;
    fn discard(&self, file_ref: &FileRef) -> Result<(), FileStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FileStoreError {
    #[error("file store unavailable: {0}")]
    Unavailable(String),
    #[error("file {0} is not stored")]
    Missing(FileRef),
}

/// Outbound notification hook (e-mail, in-app inbox, ...).
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notice: VerificationNotice) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeTemplate {
    DocumentRejected,
    VerificationApproved,
    VerificationRejected,
    DocumentsRequested,
}

impl NoticeTemplate {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DocumentRejected => "document_rejected",
            Self::VerificationApproved => "verification_approved",
            Self::VerificationRejected => "verification_rejected",
            Self::DocumentsRequested => "documents_requested",
        }
    }
}

/// Notification payload so routes and tests can assert integration boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationNotice {
    pub template: NoticeTemplate,
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_id: Option<VerificationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<DocumentId>,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
