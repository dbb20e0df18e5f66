use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::VerificationError;

/// Identifier of a platform user (applicant or admin), issued by the identity store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Identifier wrapper for verification records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationId(pub String);

/// Identifier wrapper for uploaded documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl VerificationId {
    /// Issue order of a sequence id. Ids are zero-padded, so a longer id was issued later.
    pub fn issue_order(&self) -> (usize, &str) {
        (self.0.len(), self.0.as_str())
    }
}

impl DocumentId {
    pub fn issue_order(&self) -> (usize, &str) {
        (self.0.len(), self.0.as_str())
    }
}

/// Role key as configured in the policy registry (`advocate`, `citizen`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleName(pub String);

impl RoleName {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Document type key (`practice_license`, `business_license`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentType(pub String);

impl DocumentType {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! display_inner {
    ($($name:ident),+ $(,)?) => {
        $(
            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }
        )+
    };
}

display_inner!(UserId, VerificationId, DocumentId, RoleName, DocumentType, FileRef);

/// Overall approval state of a user's verification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending Verification",
            Self::Verified => "Verified",
            Self::Rejected => "Rejected",
        }
    }
}

/// Step sequence of the verification journey. Only `Documents` is driven by the
/// workflow today; later steps are reserved and stay inert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStep {
    Documents,
    Identity,
    Contact,
    RoleSpecific,
    Final,
}

impl VerificationStep {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::Documents,
            Self::Identity,
            Self::Contact,
            Self::RoleSpecific,
            Self::Final,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Documents => "Document Verification",
            Self::Identity => "Identity Verification",
            Self::Contact => "Contact Information",
            Self::RoleSpecific => "Role-Specific Requirements",
            Self::Final => "Final Approval",
        }
    }

    /// Progress percentage reached once a record sits on this step.
    pub const fn band(self) -> f64 {
        match self {
            Self::Documents => 20.0,
            Self::Identity => 40.0,
            Self::Contact => 60.0,
            Self::RoleSpecific => 80.0,
            Self::Final => 100.0,
        }
    }

    pub fn next(self) -> Option<Self> {
        let steps = Self::ordered();
        let index = steps.iter().position(|step| *step == self)?;
        steps.get(index + 1).copied()
    }
}

/// Review state of a single uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Verified,
    Rejected,
}

impl DocumentStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending Verification",
            Self::Verified => "Verified",
            Self::Rejected => "Rejected",
        }
    }
}

/// What the caller is allowed to do, resolved by the identity store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Applicant,
    Admin,
}

impl Capability {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "applicant" | "user" => Some(Self::Applicant),
            "admin" | "staff" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Explicit caller identity handed to every orchestrator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub capability: Capability,
}

impl Caller {
    pub fn applicant(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            capability: Capability::Applicant,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            capability: Capability::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.capability == Capability::Admin
    }

    /// Returns the admin's id, or `Forbidden` for applicants.
    pub fn require_admin(&self) -> Result<&UserId, VerificationError> {
        if self.is_admin() {
            Ok(&self.user_id)
        } else {
            Err(VerificationError::Forbidden(format!(
                "user {} lacks admin rights",
                self.user_id
            )))
        }
    }
}

/// Accepted upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Pdf,
    Jpeg,
    Png,
    Doc,
    Docx,
}

const DOCX_SUBTYPE: &str = "vnd.openxmlformats-officedocument.wordprocessingml.document";

impl FileFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Doc => "doc",
            Self::Docx => "docx",
        }
    }

    pub fn from_extension(raw: &str) -> Option<Self> {
        match raw.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "doc" => Some(Self::Doc),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    pub fn from_mime(mime: &mime::Mime) -> Option<Self> {
        match (mime.type_().as_str(), mime.subtype().as_str()) {
            ("application", "pdf") => Some(Self::Pdf),
            ("image", "jpeg") | ("image", "jpg") => Some(Self::Jpeg),
            ("image", "png") => Some(Self::Png),
            ("application", "msword") => Some(Self::Doc),
            ("application", DOCX_SUBTYPE) => Some(Self::Docx),
            _ => None,
        }
    }

    /// Resolves the format from the declared content type, falling back to the file
    /// extension only when the content type is missing or generic.
    pub fn resolve(file_name: &str, content_type: Option<&str>) -> Option<Self> {
        let declared = content_type
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .and_then(|raw| raw.to_ascii_lowercase().parse::<mime::Mime>().ok())
            .filter(|mime| *mime != mime::APPLICATION_OCTET_STREAM);

        match declared {
            Some(mime) => Self::from_mime(&mime),
            None => file_name
                .rsplit_once('.')
                .and_then(|(_, extension)| Self::from_extension(extension)),
        }
    }
}

/// Raw upload as received from the applicant, before it is handed to the file store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: Option<&str>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.map(str::to_string),
            bytes: bytes.into(),
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Opaque handle returned by the external file store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileRef(pub String);

/// File metadata kept on the document; the binary itself lives in the file store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub file_ref: FileRef,
    pub file_name: String,
    pub format: FileFormat,
    pub size_bytes: u64,
}

/// Admin request asking the applicant to (re-)upload specific document types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRequest {
    pub document_types: Vec<DocumentType>,
    pub message: String,
    pub requested_by: UserId,
    pub requested_at: DateTime<Utc>,
}
