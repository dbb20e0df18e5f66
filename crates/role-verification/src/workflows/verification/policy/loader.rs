use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

use serde::{Deserialize, Deserializer};

use super::RolePolicy;
use crate::workflows::verification::domain::{DocumentType, RoleName};

#[derive(Debug)]
pub enum PolicyLoadError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidRow { line: u64, reason: String },
}

impl std::fmt::Display for PolicyLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyLoadError::Io(err) => write!(f, "failed to read role policy file: {}", err),
            PolicyLoadError::Csv(err) => write!(f, "invalid role policy CSV: {}", err),
            PolicyLoadError::InvalidRow { line, reason } => {
                write!(f, "role policy row {} rejected: {}", line, reason)
            }
        }
    }
}

impl std::error::Error for PolicyLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PolicyLoadError::Io(err) => Some(err),
            PolicyLoadError::Csv(err) => Some(err),
            PolicyLoadError::InvalidRow { .. } => None,
        }
    }
}

impl From<std::io::Error> for PolicyLoadError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for PolicyLoadError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

#[derive(Debug, Deserialize)]
struct PolicyRow {
    role: String,
    auto_verify: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    required: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    optional: Option<String>,
}

pub(super) fn parse_policies<R: Read>(
    reader: R,
) -> Result<BTreeMap<RoleName, RolePolicy>, PolicyLoadError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut roles = BTreeMap::new();

    for (index, record) in csv_reader.deserialize::<PolicyRow>().enumerate() {
        let row = record?;
        // header occupies line 1
        let line = index as u64 + 2;

        let role = RoleName::new(&row.role);
        if role.as_str().is_empty() {
            return Err(invalid(line, "role is blank"));
        }

        let auto_verify = parse_flag(&row.auto_verify)
            .ok_or_else(|| invalid(line, format!("auto_verify '{}'", row.auto_verify)))?;
        let required_types = split_types(row.required.as_deref());
        let optional_types = split_types(row.optional.as_deref());

        if auto_verify && !required_types.is_empty() {
            return Err(invalid(
                line,
                format!("auto-verified role '{role}' cannot require documents"),
            ));
        }

        let policy = RolePolicy {
            auto_verify,
            required_types,
            optional_types,
        };

        if roles.insert(role.clone(), policy).is_some() {
            return Err(invalid(line, format!("role '{role}' listed twice")));
        }
    }

    Ok(roles)
}

fn invalid(line: u64, reason: impl Into<String>) -> PolicyLoadError {
    PolicyLoadError::InvalidRow {
        line,
        reason: reason.into(),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" | "" => Some(false),
        _ => None,
    }
}

fn split_types(raw: Option<&str>) -> BTreeSet<DocumentType> {
    raw.unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(DocumentType::new)
        .collect()
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|raw| !raw.trim().is_empty()))
}
