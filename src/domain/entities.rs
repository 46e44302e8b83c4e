//! Domain entities representing raw and reconciled vulnerability records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value_objects::{BuildExpression, CveId};

/// Terminal state a raw record reaches during filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterStatus {
    Pending,
    Passed,
    Failed,
}

/// One source's unverified description of a vulnerability.
///
/// Owned by the driver; only the filter pipeline writes `filter_status`,
/// and the reconciliation engine never mutates records at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawVulnerability {
    pub id: i64,
    pub cve_id: CveId,
    pub description: String,
    pub discovered_at: DateTime<Utc>,
    pub source_url: String,
    pub filter_status: FilterStatus,
}

impl RawVulnerability {
    pub fn new(
        id: i64,
        cve_id: CveId,
        description: String,
        discovered_at: DateTime<Utc>,
        source_url: String,
    ) -> Self {
        Self {
            id,
            cve_id,
            description,
            discovered_at,
            source_url,
            filter_status: FilterStatus::Pending,
        }
    }

    /// Description text with surrounding whitespace removed; records with
    /// identical trimmed text belong to the same filtering equivalence
    /// class.
    pub fn trimmed_description(&self) -> &str {
        self.description.trim()
    }

    /// Host portion of the source URL, used by the merge heuristics to
    /// weigh sources against each other.
    pub fn source_domain(&self) -> &str {
        let rest = self
            .source_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.source_url);
        let host = rest.split(['/', '?']).next().unwrap_or(rest);
        host.split(':').next().unwrap_or(host)
    }
}

/// The canonical, merged record for one CVE identifier.
///
/// Produced by the reconciliation engine and re-merged as new raw records
/// arrive. The full contributor list is retained so that resynthesis can
/// recompute the description from every record that has ever contributed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeVulnerability {
    pub cve_id: CveId,
    pub description: String,
    /// Earliest discovery time over every contributor, past and present
    pub published_at: DateTime<Utc>,
    /// Latest discovery time over every contributor, past and present
    pub last_modified_at: DateTime<Utc>,
    pub build_expression: BuildExpression,
    pub contributors: Vec<RawVulnerability>,
}

impl CompositeVulnerability {
    pub fn new(
        cve_id: CveId,
        description: String,
        published_at: DateTime<Utc>,
        last_modified_at: DateTime<Utc>,
        build_expression: BuildExpression,
        contributors: Vec<RawVulnerability>,
    ) -> Self {
        Self {
            cve_id,
            description,
            published_at,
            last_modified_at,
            build_expression,
            contributors,
        }
    }

    /// Source domains of every contributing record
    pub fn source_domains(&self) -> Vec<String> {
        self.contributors
            .iter()
            .map(|record| record.source_domain().to_string())
            .collect()
    }

    /// Raw-record ids of every contributing record
    pub fn contributor_ids(&self) -> Vec<i64> {
        self.contributors.iter().map(|record| record.id).collect()
    }
}
