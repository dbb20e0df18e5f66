use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    DocumentId, DocumentStatus, DocumentType, FileFormat, FileUpload, StoredFile, UserId,
};
use super::error::{optional_text, require_text, VerificationError};
use super::policy::RolePolicy;
use crate::config::DEFAULT_MAX_UPLOAD_BYTES;

/// Size and format rules applied to every upload before the file store sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_bytes: u64,
}

impl UploadPolicy {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    /// Checks type eligibility, size, and format; returns the resolved format.
    pub fn check(
        &self,
        policy: &RolePolicy,
        document_type: &DocumentType,
        upload: &FileUpload,
    ) -> Result<FileFormat, VerificationError> {
        if !policy.allows(document_type) {
            return Err(VerificationError::Validation(format!(
                "document type '{document_type}' is not accepted for this role"
            )));
        }

        let size = upload.size_bytes();
        if size == 0 {
            return Err(VerificationError::Validation("file is empty".to_string()));
        }
        if size > self.max_bytes {
            return Err(VerificationError::Validation(format!(
                "file size {size} bytes exceeds the {} byte limit",
                self.max_bytes
            )));
        }

        FileFormat::resolve(&upload.file_name, upload.content_type.as_deref()).ok_or_else(|| {
            VerificationError::Validation(
                "only PDF, JPG, PNG, and DOC/DOCX files are allowed".to_string(),
            )
        })
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

/// Applicant-supplied metadata accompanying an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDraft {
    pub document_type: DocumentType,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// One uploaded artifact and its review state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub owner: UserId,
    pub document_type: DocumentType,
    pub title: String,
    pub description: Option<String>,
    pub file: StoredFile,
    pub status: DocumentStatus,
    pub reviewed_by: Option<UserId>,
    pub review_notes: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Document {
    /// Builds a pending document from an already validated and stored upload.
    pub fn upload(
        id: DocumentId,
        owner: UserId,
        draft: DocumentDraft,
        file: StoredFile,
        now: DateTime<Utc>,
    ) -> Result<Self, VerificationError> {
        let title = require_text(&draft.title, "title")?;

        Ok(Self {
            id,
            owner,
            document_type: draft.document_type,
            title,
            description: optional_text(draft.description.as_deref()),
            file,
            status: DocumentStatus::Pending,
            reviewed_by: None,
            review_notes: None,
            reviewed_at: None,
            created_at: now,
            updated_at: now,
            version: 1,
        })
    }

    pub fn verify(
        &mut self,
        admin: &UserId,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), VerificationError> {
        self.ensure_pending("verify")?;
        self.record_review(DocumentStatus::Verified, admin, optional_text(notes), now);
        Ok(())
    }

    pub fn reject(
        &mut self,
        admin: &UserId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), VerificationError> {
        let reason = require_text(reason, "rejection reason")?;
        self.ensure_pending("reject")?;
        self.record_review(DocumentStatus::Rejected, admin, Some(reason), now);
        Ok(())
    }

    /// Only the owner may delete, and only before review.
    pub fn ensure_deletable_by(&self, caller: &UserId) -> Result<(), VerificationError> {
        if &self.owner != caller {
            return Err(VerificationError::Forbidden(format!(
                "document {} belongs to another user",
                self.id
            )));
        }
        if self.status != DocumentStatus::Pending {
            return Err(VerificationError::Forbidden(format!(
                "document {} was already {} and is kept for audit",
                self.id,
                self.status.as_str()
            )));
        }
        Ok(())
    }

    fn ensure_pending(&self, action: &str) -> Result<(), VerificationError> {
        if self.status == DocumentStatus::Pending {
            return Ok(());
        }
        Err(VerificationError::StateConflict(format!(
            "cannot {action} document {}: already {}",
            self.id,
            self.status.as_str()
        )))
    }

    fn record_review(
        &mut self,
        status: DocumentStatus,
        admin: &UserId,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.status = status;
        self.reviewed_by = Some(admin.clone());
        self.review_notes = notes;
        self.reviewed_at = Some(now);
        self.updated_at = now;
    }
}
