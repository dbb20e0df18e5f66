use std::collections::BTreeMap;

use serde::Serialize;

use super::domain::{RoleName, VerificationStatus};
use super::policy::RolePolicyRegistry;
use super::progress::round2;
use super::record::VerificationRecord;

/// Status tallies for one population of records.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub verified: usize,
    pub pending: usize,
    pub rejected: usize,
    pub verification_rate: f64,
}

impl StatusCounts {
    fn add(&mut self, status: VerificationStatus) {
        self.total += 1;
        match status {
            VerificationStatus::Verified => self.verified += 1,
            VerificationStatus::Pending => self.pending += 1,
            VerificationStatus::Rejected => self.rejected += 1,
        }
    }

    fn finish(mut self) -> Self {
        self.verification_rate = if self.total == 0 {
            0.0
        } else {
            round2(self.verified as f64 / self.total as f64 * 100.0)
        };
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleStatistics {
    pub role: RoleName,
    #[serde(flatten)]
    pub counts: StatusCounts,
}

/// Rollup over a single snapshot of verification records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationStatistics {
    pub overview: StatusCounts,
    pub by_role: Vec<RoleStatistics>,
}

impl VerificationStatistics {
    /// Every configured role gets a row, even with no records. Records whose role
    /// has since left the registry still get counted under their own row.
    pub fn from_records(registry: &RolePolicyRegistry, records: &[VerificationRecord]) -> Self {
        let mut overview = StatusCounts::default();
        let mut by_role: BTreeMap<&RoleName, StatusCounts> = registry
            .roles()
            .map(|(role, _)| (role, StatusCounts::default()))
            .collect();

        for record in records {
            overview.add(record.status);
            by_role.entry(&record.role).or_default().add(record.status);
        }

        Self {
            overview: overview.finish(),
            by_role: by_role
                .into_iter()
                .map(|(role, counts)| RoleStatistics {
                    role: role.clone(),
                    counts: counts.finish(),
                })
                .collect(),
        }
    }

    pub fn verification_rate(&self) -> f64 {
        self.overview.verification_rate
    }

    pub fn for_role(&self, role: &RoleName) -> Option<&StatusCounts> {
        self.by_role
            .iter()
            .find(|entry| &entry.role == role)
            .map(|entry| &entry.counts)
    }
}
