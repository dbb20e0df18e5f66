use serde::Serialize;

use super::document::Document;
use super::domain::{DocumentId, DocumentStatus, DocumentType, VerificationStep};
use super::policy::RolePolicy;

/// Upload and review state of one document type for one applicant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequirementState {
    pub document_type: DocumentType,
    pub required: bool,
    pub uploaded: bool,
    pub verified: bool,
    pub latest_status: Option<DocumentStatus>,
    pub latest_document: Option<DocumentId>,
}

/// Snapshot joining a role policy with the applicant's documents. This is the only
/// bridge between the document and record state machines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Readiness {
    pub requirements: Vec<RequirementState>,
}

impl Readiness {
    pub fn assess(policy: &RolePolicy, documents: &[Document]) -> Self {
        let required = policy.required_types.iter().map(|kind| (kind, true));
        let optional = policy.optional_types.iter().map(|kind| (kind, false));

        let requirements = required
            .chain(optional)
            .map(|(document_type, required)| {
                let matching = documents
                    .iter()
                    .filter(|document| &document.document_type == document_type);
                let latest = matching.clone().max_by(|a, b| {
                    a.created_at
                        .cmp(&b.created_at)
                        .then_with(|| a.id.issue_order().cmp(&b.id.issue_order()))
                });

                RequirementState {
                    document_type: document_type.clone(),
                    required,
                    uploaded: latest.is_some(),
                    verified: matching
                        .clone()
                        .any(|document| document.status == DocumentStatus::Verified),
                    latest_status: latest.map(|document| document.status),
                    latest_document: latest.map(|document| document.id.clone()),
                }
            })
            .collect();

        Self { requirements }
    }

    pub fn required(&self) -> impl Iterator<Item = &RequirementState> {
        self.requirements.iter().filter(|state| state.required)
    }

    /// Required types without a verified document.
    pub fn missing_required(&self) -> Vec<DocumentType> {
        self.required()
            .filter(|state| !state.verified)
            .map(|state| state.document_type.clone())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.required().all(|state| state.verified)
    }

    pub fn all_required_uploaded(&self) -> bool {
        self.required().all(|state| state.uploaded)
    }

    /// Share of required types that are verified; a role with no requirements is complete.
    pub fn verified_fraction(&self) -> f64 {
        let total = self.required().count();
        if total == 0 {
            return 1.0;
        }
        let verified = self.required().filter(|state| state.verified).count();
        verified as f64 / total as f64
    }
}

/// Progress for a record on `step`. Inside the documents step the value climbs from
/// the documents band towards the identity band as required types get verified.
pub fn progress_for(step: VerificationStep, readiness: &Readiness) -> f64 {
    let value = match step {
        VerificationStep::Documents => {
            let floor = VerificationStep::Documents.band();
            let ceiling = VerificationStep::Identity.band();
            floor + (ceiling - floor) * readiness.verified_fraction()
        }
        other => other.band(),
    };
    round2(value)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
