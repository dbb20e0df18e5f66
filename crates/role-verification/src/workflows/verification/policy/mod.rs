//! Data-driven mapping from a role to the documents it must provide.
//!
//! Adding a role or changing its requirements is a table edit: either in
//! [`RolePolicyRegistry::standard`] or in a CSV handed to
//! [`RolePolicyRegistry::from_path`].

mod loader;

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;

use serde::Serialize;

use super::domain::{DocumentType, RoleName};
use super::error::VerificationError;

pub use loader::PolicyLoadError;

/// Requirements attached to a single role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RolePolicy {
    pub auto_verify: bool,
    pub required_types: BTreeSet<DocumentType>,
    pub optional_types: BTreeSet<DocumentType>,
}

impl RolePolicy {
    pub fn auto_verified() -> Self {
        Self {
            auto_verify: true,
            required_types: BTreeSet::new(),
            optional_types: BTreeSet::new(),
        }
    }

    pub fn reviewed(required: &[&str], optional: &[&str]) -> Self {
        Self {
            auto_verify: false,
            required_types: required.iter().map(DocumentType::new).collect(),
            optional_types: optional.iter().map(DocumentType::new).collect(),
        }
    }

    /// Types an applicant may upload for this role.
    pub fn allows(&self, document_type: &DocumentType) -> bool {
        self.required_types.contains(document_type) || self.optional_types.contains(document_type)
    }

    pub fn allowed_types(&self) -> impl Iterator<Item = &DocumentType> {
        self.required_types.iter().chain(self.optional_types.iter())
    }
}

/// Lookup table of role policies plus display labels for document types.
#[derive(Debug, Clone)]
pub struct RolePolicyRegistry {
    roles: BTreeMap<RoleName, RolePolicy>,
    labels: BTreeMap<DocumentType, String>,
}

impl RolePolicyRegistry {
    pub fn new(roles: BTreeMap<RoleName, RolePolicy>) -> Self {
        Self {
            roles,
            labels: standard_labels(),
        }
    }

    pub fn standard() -> Self {
        Self::new(standard_roles())
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, PolicyLoadError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, PolicyLoadError> {
        let roles = loader::parse_policies(reader)?;
        Ok(Self::new(roles))
    }

    pub fn lookup(&self, role: &RoleName) -> Result<&RolePolicy, VerificationError> {
        self.roles
            .get(role)
            .ok_or_else(|| VerificationError::UnknownRole(role.clone()))
    }

    pub fn roles(&self) -> impl Iterator<Item = (&RoleName, &RolePolicy)> {
        self.roles.iter()
    }

    pub fn label_for(&self, document_type: &DocumentType) -> String {
        match self.labels.get(document_type) {
            Some(label) => label.clone(),
            None => humanize(document_type.as_str()),
        }
    }
}

impl Default for RolePolicyRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn standard_roles() -> BTreeMap<RoleName, RolePolicy> {
    [
        (
            "advocate",
            RolePolicy::reviewed(
                &["roll_number_cert", "practice_license", "work_certificate"],
                &[],
            ),
        ),
        (
            "lawyer",
            RolePolicy::reviewed(
                &["professional_cert", "employment_letter"],
                &["organization_cert"],
            ),
        ),
        (
            "paralegal",
            RolePolicy::reviewed(
                &["professional_cert", "employment_letter"],
                &["organization_cert"],
            ),
        ),
        (
            "law_firm",
            RolePolicy::reviewed(
                &["business_license", "registration_cert"],
                &["firm_documents"],
            ),
        ),
        ("law_student", RolePolicy::auto_verified()),
        ("citizen", RolePolicy::auto_verified()),
    ]
    .into_iter()
    .map(|(role, policy)| (RoleName::new(role), policy))
    .collect()
}

fn standard_labels() -> BTreeMap<DocumentType, String> {
    [
        ("roll_number_cert", "Roll Number Certificate"),
        ("practice_license", "Practice License"),
        ("work_certificate", "Certificate of Work"),
        ("professional_cert", "Professional Certificate"),
        ("employment_letter", "Employment Letter"),
        ("organization_cert", "Organization Certificate"),
        ("business_license", "Business License"),
        ("registration_cert", "Registration Certificate"),
        ("firm_documents", "Other Firm Documents"),
        ("id_document", "ID Document"),
        ("academic", "Academic Certificate"),
        ("other", "Other Document"),
    ]
    .into_iter()
    .map(|(key, label)| (DocumentType::new(key), label.to_string()))
    .collect()
}

fn humanize(key: &str) -> String {
    key.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
