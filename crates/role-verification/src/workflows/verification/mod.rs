//! Role-based identity verification.
//!
//! Two state machines (the per-user [`VerificationRecord`] and the per-upload
//! [`Document`]) are joined only through [`Readiness`], a pure view of which
//! required document types are uploaded and verified. The
//! [`VerificationOrchestrator`] is the single writer of both.

pub mod document;
pub mod domain;
pub mod error;
pub mod memory;
pub mod policy;
pub mod progress;
pub mod record;
pub mod repository;
pub mod router;
pub mod service;
pub mod statistics;
pub mod views;

#[cfg(test)]
mod tests;

pub use document::{Document, DocumentDraft, UploadPolicy};
pub use domain::{
    Caller, Capability, DocumentId, DocumentRequest, DocumentStatus, DocumentType, FileFormat,
    FileRef, FileUpload, RoleName, StoredFile, UserId, VerificationId, VerificationStatus,
    VerificationStep,
};
pub use error::{ErrorKind, VerificationError};
pub use memory::{InMemoryFileStore, InMemoryVerificationRepository, RecordingNotifier};
pub use policy::{PolicyLoadError, RolePolicy, RolePolicyRegistry};
pub use progress::{progress_for, Readiness, RequirementState};
pub use record::VerificationRecord;
pub use repository::{
    ChangeSet, Committed, DocumentChange, FileStore, FileStoreError, NoticeTemplate,
    NotificationError, NotificationPublisher, RecordChange, RecordFilter, RepositoryError,
    VerificationNotice, VerificationRepository,
};
pub use router::{verification_router, CALLER_CAPABILITY_HEADER, CALLER_ID_HEADER};
pub use service::VerificationOrchestrator;
pub use statistics::{RoleStatistics, StatusCounts, VerificationStatistics};
pub use views::{DocumentView, PendingReviewEntry, RequirementView, VerificationRecordView};
