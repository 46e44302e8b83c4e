//! Cheap synchronous filters requiring no external calls

use std::collections::HashSet;

use async_trait::async_trait;
use regex::Regex;

use crate::domain::RawVulnerability;

use super::traits::VulnerabilityFilter;

const CVE_ID_PATTERN: &str = r"(?i)CVE-\d{4}-\d{4,7}";

/// Rejects blank or whitespace-only descriptions
pub struct BlankDescriptionFilter;

#[async_trait]
impl VulnerabilityFilter for BlankDescriptionFilter {
    fn name(&self) -> &'static str {
        "blank-description"
    }

    async fn passes(&self, record: &RawVulnerability) -> bool {
        !record.description.trim().is_empty()
    }
}

/// Rejects descriptions that are nothing but an integer
pub struct IntegerDescriptionFilter;

#[async_trait]
impl VulnerabilityFilter for IntegerDescriptionFilter {
    fn name(&self) -> &'static str {
        "integer-description"
    }

    async fn passes(&self, record: &RawVulnerability) -> bool {
        let trimmed = record.trimmed_description();
        trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit())
    }
}

/// Rejects descriptions whose single embedded CVE identifier conflicts
/// with the record's owning identifier
pub struct IdentifierConflictFilter {
    pattern: Regex,
}

impl IdentifierConflictFilter {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(CVE_ID_PATTERN).expect("Failed to compile CVE identifier pattern"),
        }
    }

    fn mentioned_ids(&self, text: &str) -> HashSet<String> {
        self.pattern
            .find_iter(text)
            .map(|found| found.as_str().to_uppercase())
            .collect()
    }
}

impl Default for IdentifierConflictFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VulnerabilityFilter for IdentifierConflictFilter {
    fn name(&self) -> &'static str {
        "identifier-conflict"
    }

    async fn passes(&self, record: &RawVulnerability) -> bool {
        let mentioned = self.mentioned_ids(&record.description);
        if mentioned.len() != 1 {
            return true;
        }
        mentioned.contains(record.cve_id.as_str())
    }
}

/// Rejects descriptions referencing multiple distinct CVE identifiers
pub struct MultipleIdentifierFilter {
    pattern: Regex,
}

impl MultipleIdentifierFilter {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(CVE_ID_PATTERN).expect("Failed to compile CVE identifier pattern"),
        }
    }
}

impl Default for MultipleIdentifierFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VulnerabilityFilter for MultipleIdentifierFilter {
    fn name(&self) -> &'static str {
        "multiple-identifiers"
    }

    async fn passes(&self, record: &RawVulnerability) -> bool {
        let distinct: HashSet<String> = self
            .pattern
            .find_iter(&record.description)
            .map(|found| found.as_str().to_uppercase())
            .collect();
        distinct.len() <= 1
    }
}

/// Rejects descriptions outside an acceptable length range
pub struct DescriptionLengthFilter {
    min_chars: usize,
    max_chars: usize,
}

impl DescriptionLengthFilter {
    pub fn new(min_chars: usize, max_chars: usize) -> Self {
        Self {
            min_chars,
            max_chars,
        }
    }
}

#[async_trait]
impl VulnerabilityFilter for DescriptionLengthFilter {
    fn name(&self) -> &'static str {
        "description-length"
    }

    async fn passes(&self, record: &RawVulnerability) -> bool {
        let length = record.trimmed_description().chars().count();
        length >= self.min_chars && length <= self.max_chars
    }
}
