use chrono::{DateTime, Utc};
use serde::Serialize;

use super::document::Document;
use super::domain::{
    DocumentId, DocumentRequest, DocumentStatus, DocumentType, FileFormat, RoleName, UserId,
    VerificationId, VerificationStatus, VerificationStep,
};
use super::policy::RolePolicyRegistry;
use super::progress::Readiness;
use super::record::VerificationRecord;

/// Outward representation of a document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    pub id: DocumentId,
    pub owner: UserId,
    pub document_type: DocumentType,
    pub document_type_label: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub file_name: String,
    pub format: FileFormat,
    pub size_bytes: u64,
    pub status: DocumentStatus,
    pub status_label: &'static str,
    pub reviewed_by: Option<UserId>,
    pub review_notes: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DocumentView {
    pub fn build(document: &Document, registry: &RolePolicyRegistry) -> Self {
        Self {
            id: document.id.clone(),
            owner: document.owner.clone(),
            document_type: document.document_type.clone(),
            document_type_label: registry.label_for(&document.document_type),
            title: document.title.clone(),
            description: document.description.clone(),
            file_name: document.file.file_name.clone(),
            format: document.file.format,
            size_bytes: document.file.size_bytes,
            status: document.status,
            status_label: document.status.label(),
            reviewed_by: document.reviewed_by.clone(),
            review_notes: document.review_notes.clone(),
            reviewed_at: document.reviewed_at,
            created_at: document.created_at,
        }
    }
}

/// Upload and review state of one document type the role accepts.
#[derive(Debug, Clone, Serialize)]
pub struct RequirementView {
    pub document_type: DocumentType,
    pub label: String,
    pub required: bool,
    pub uploaded: bool,
    pub verified: bool,
    pub status: Option<DocumentStatus>,
    pub document_id: Option<DocumentId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationRecordView {
    pub id: VerificationId,
    pub user_id: UserId,
    pub role: RoleName,
    pub status: VerificationStatus,
    pub status_label: &'static str,
    pub current_step: VerificationStep,
    pub current_step_label: &'static str,
    pub progress: f64,
    pub verified_by: Option<UserId>,
    pub verification_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub document_requests: Vec<DocumentRequest>,
    pub required_documents: Vec<RequirementView>,
    pub documents: Vec<DocumentView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VerificationRecordView {
    /// Joins a record with its owner's documents. A role that has since been removed
    /// from the registry renders with an empty requirement list.
    pub fn build(
        record: &VerificationRecord,
        documents: &[Document],
        registry: &RolePolicyRegistry,
    ) -> Self {
        let required_documents = match registry.lookup(&record.role) {
            Ok(policy) => Readiness::assess(policy, documents)
                .requirements
                .into_iter()
                .map(|state| RequirementView {
                    label: registry.label_for(&state.document_type),
                    document_type: state.document_type,
                    required: state.required,
                    uploaded: state.uploaded,
                    verified: state.verified,
                    status: state.latest_status,
                    document_id: state.latest_document,
                })
                .collect(),
            Err(_) => Vec::new(),
        };

        Self {
            id: record.id.clone(),
            user_id: record.user_id.clone(),
            role: record.role.clone(),
            status: record.status,
            status_label: record.status.label(),
            current_step: record.current_step,
            current_step_label: record.current_step.label(),
            progress: record.progress,
            verified_by: record.verified_by.clone(),
            verification_date: record.verification_date,
            notes: record.notes.clone(),
            rejection_reason: record.rejection_reason.clone(),
            document_requests: record.document_requests.clone(),
            required_documents,
            documents: documents
                .iter()
                .map(|document| DocumentView::build(document, registry))
                .collect(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Review-queue row: a pending applicant who uploaded every required type.
#[derive(Debug, Clone, Serialize)]
pub struct PendingReviewEntry {
    pub verification_id: VerificationId,
    pub user_id: UserId,
    pub role: RoleName,
    pub progress: f64,
    pub total_documents: usize,
    pub verified_documents: usize,
    pub pending_documents: usize,
    pub submitted_at: DateTime<Utc>,
}

impl PendingReviewEntry {
    pub fn build(record: &VerificationRecord, documents: &[Document]) -> Self {
        let count = |status: DocumentStatus| {
            documents
                .iter()
                .filter(|document| document.status == status)
                .count()
        };

        Self {
            verification_id: record.id.clone(),
            user_id: record.user_id.clone(),
            role: record.role.clone(),
            progress: record.progress,
            total_documents: documents.len(),
            verified_documents: count(DocumentStatus::Verified),
            pending_documents: count(DocumentStatus::Pending),
            submitted_at: record.created_at,
        }
    }
}
