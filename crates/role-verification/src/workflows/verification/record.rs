use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    DocumentRequest, DocumentType, RoleName, UserId, VerificationId, VerificationStatus,
    VerificationStep,
};
use super::error::{optional_text, require_text, VerificationError};
use super::policy::RolePolicy;
use super::progress::{progress_for, Readiness};

/// Per-user verification state. Created once at registration and never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub id: VerificationId,
    pub user_id: UserId,
    pub role: RoleName,
    pub status: VerificationStatus,
    pub current_step: VerificationStep,
    pub progress: f64,
    pub verified_by: Option<UserId>,
    pub verification_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub document_requests: Vec<DocumentRequest>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl VerificationRecord {
    /// Resolves the initial state from the role policy: trusted roles start verified.
    pub fn create(
        id: VerificationId,
        user_id: UserId,
        role: RoleName,
        policy: &RolePolicy,
        now: DateTime<Utc>,
    ) -> Self {
        let mut record = Self {
            id,
            user_id,
            role,
            status: VerificationStatus::Pending,
            current_step: VerificationStep::Documents,
            progress: 0.0,
            verified_by: None,
            verification_date: None,
            notes: None,
            rejection_reason: None,
            document_requests: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 1,
        };

        if policy.auto_verify {
            record.status = VerificationStatus::Verified;
            record.current_step = VerificationStep::Final;
            record.progress = VerificationStep::Final.band();
            record.verification_date = Some(now);
            record.notes = Some("auto-verified at registration".to_string());
        } else {
            record.progress = progress_for(
                VerificationStep::Documents,
                &Readiness::assess(policy, &[]),
            );
        }

        record
    }

    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }

    /// Final approval. Requires a pending record whose required documents are all verified.
    pub fn approve(
        &mut self,
        admin: &UserId,
        notes: Option<&str>,
        readiness: &Readiness,
        now: DateTime<Utc>,
    ) -> Result<(), VerificationError> {
        self.ensure_pending("approve")?;

        let missing = readiness.missing_required();
        if !missing.is_empty() {
            return Err(VerificationError::IncompleteDocuments { missing });
        }

        self.status = VerificationStatus::Verified;
        self.current_step = VerificationStep::Final;
        self.progress = VerificationStep::Final.band();
        self.verified_by = Some(admin.clone());
        self.verification_date = Some(now);
        if let Some(notes) = optional_text(notes) {
            self.notes = Some(notes);
        }
        self.updated_at = now;
        Ok(())
    }

    /// Rejects a pending record, or re-reviews a verified one. Progress drops back to
    /// the documents step, which is the only path that lowers it.
    pub fn reject(
        &mut self,
        admin: &UserId,
        reason: &str,
        readiness: &Readiness,
        now: DateTime<Utc>,
    ) -> Result<(), VerificationError> {
        let reason = require_text(reason, "rejection reason")?;
        if self.status == VerificationStatus::Rejected {
            return Err(VerificationError::StateConflict(format!(
                "verification {} is already rejected",
                self.id
            )));
        }

        self.status = VerificationStatus::Rejected;
        self.current_step = VerificationStep::Documents;
        self.progress = progress_for(VerificationStep::Documents, readiness);
        self.verified_by = Some(admin.clone());
        self.verification_date = Some(now);
        self.rejection_reason = Some(reason);
        self.updated_at = now;
        Ok(())
    }

    /// Asks the applicant to (re-)upload `types`. Status is left untouched.
    pub fn request_documents(
        &mut self,
        admin: &UserId,
        types: Vec<DocumentType>,
        message: &str,
        policy: &RolePolicy,
        now: DateTime<Utc>,
    ) -> Result<DocumentRequest, VerificationError> {
        self.ensure_pending("request documents for")?;

        if types.is_empty() {
            return Err(VerificationError::Validation(
                "at least one document type must be requested".to_string(),
            ));
        }
        if let Some(unknown) = types.iter().find(|kind| !policy.allows(kind)) {
            return Err(VerificationError::Validation(format!(
                "document type '{unknown}' is not accepted for role '{}'",
                self.role
            )));
        }

        let message = optional_text(Some(message))
            .unwrap_or_else(|| "Additional documents required".to_string());

        let mut document_types = types;
        document_types.sort();
        document_types.dedup();

        let request = DocumentRequest {
            document_types,
            message,
            requested_by: admin.clone(),
            requested_at: now,
        };
        self.document_requests.push(request.clone());
        self.updated_at = now;

        Ok(request)
    }

    /// Re-derives progress from the current documents. Only pending records on the
    /// documents step move, and never downwards.
    pub fn recompute_progress(&mut self, readiness: &Readiness) -> bool {
        if self.status != VerificationStatus::Pending {
            return false;
        }

        let next = progress_for(self.current_step, readiness);
        if next > self.progress {
            self.progress = next;
            true
        } else {
            false
        }
    }

    fn ensure_pending(&self, action: &str) -> Result<(), VerificationError> {
        if self.status == VerificationStatus::Pending {
            return Ok(());
        }
        Err(VerificationError::StateConflict(format!(
            "cannot {action} verification {}: status is {}",
            self.id,
            self.status.as_str()
        )))
    }
}
