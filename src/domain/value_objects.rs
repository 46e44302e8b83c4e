//! Domain value objects for vulnerability ingestion

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// A validated CVE identifier such as `CVE-2023-12345`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CveId(String);

impl CveId {
    /// Create a new CveId with validation
    pub fn new(id: String) -> Result<Self, DomainError> {
        let id = id.trim().to_uppercase();

        let invalid = || DomainError::InvalidCveId { id: id.clone() };

        let rest = id.strip_prefix("CVE-").ok_or_else(invalid)?;
        let (year, number) = rest.split_once('-').ok_or_else(invalid)?;

        if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if number.len() < 4 || !number.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        Ok(CveId(id))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CveId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CveId::new(s.to_string())
    }
}

/// Provenance tree recording which raw records combined to produce a
/// composite, and in what structure.
///
/// Leaves are raw-record ids; internal nodes record one combine operation
/// over their children. Combination is commutative, so two expressions are
/// equivalent when one can be produced from the other by reordering
/// siblings. Equivalence, not string identity, is what the merge
/// algorithms preserve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildExpression {
    Leaf(i64),
    Combine(Vec<BuildExpression>),
}

impl BuildExpression {
    /// All raw-record ids contributing to this expression
    pub fn leaves(&self) -> Vec<i64> {
        let mut ids = Vec::new();
        self.collect_leaves(&mut ids);
        ids
    }

    fn collect_leaves(&self, ids: &mut Vec<i64>) {
        match self {
            BuildExpression::Leaf(id) => ids.push(*id),
            BuildExpression::Combine(children) => {
                for child in children {
                    child.collect_leaves(ids);
                }
            }
        }
    }

    /// Structural equivalence: equal up to reordering of commutative
    /// siblings. Associativity is not rewritten, so `((1,2),3)` and
    /// `(1,(2,3))` remain distinct.
    pub fn is_equivalent(&self, other: &BuildExpression) -> bool {
        self.canonical_key() == other.canonical_key()
    }

    fn canonical_key(&self) -> String {
        match self {
            BuildExpression::Leaf(id) => format!("L{}", id),
            BuildExpression::Combine(children) => {
                let mut keys: Vec<String> =
                    children.iter().map(BuildExpression::canonical_key).collect();
                keys.sort();
                format!("C({})", keys.join(","))
            }
        }
    }
}

impl fmt::Display for BuildExpression {
    /// Persistence string form, e.g. `((17;42);96)`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildExpression::Leaf(id) => write!(f, "{}", id),
            BuildExpression::Combine(children) => {
                let parts: Vec<String> = children.iter().map(|c| c.to_string()).collect();
                write!(f, "({})", parts.join(";"))
            }
        }
    }
}

/// Read-only summary of one filtering run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterReturn {
    /// Raw records handed to the pipeline
    pub considered: usize,
    /// Distinct equivalence classes actually evaluated
    pub distinct: usize,
    /// Records holding a passed status afterwards
    pub passed: usize,
}

impl FilterReturn {
    pub fn new(considered: usize, distinct: usize, passed: usize) -> Self {
        Self {
            considered,
            distinct,
            passed,
        }
    }
}

impl fmt::Display for FilterReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records considered ({} distinct), {} passed",
            self.considered, self.distinct, self.passed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cve_id_accepts_well_formed_identifiers() {
        assert!(CveId::new("CVE-2023-12345".to_string()).is_ok());
        assert!(CveId::new("cve-2019-0001".to_string()).is_ok());
        assert_eq!(
            CveId::new("cve-2019-0001".to_string()).unwrap().as_str(),
            "CVE-2019-0001"
        );
    }

    #[test]
    fn cve_id_rejects_malformed_identifiers() {
        assert!(CveId::new("".to_string()).is_err());
        assert!(CveId::new("CVE-123-4567".to_string()).is_err());
        assert!(CveId::new("CVE-2023-12".to_string()).is_err());
        assert!(CveId::new("GHSA-xxxx-yyyy".to_string()).is_err());
        assert!(CveId::new("CVE-20a3-1234".to_string()).is_err());
    }

    #[test]
    fn build_expression_equivalence_ignores_sibling_order() {
        let left = BuildExpression::Combine(vec![
            BuildExpression::Leaf(1),
            BuildExpression::Leaf(2),
        ]);
        let right = BuildExpression::Combine(vec![
            BuildExpression::Leaf(2),
            BuildExpression::Leaf(1),
        ]);
        assert!(left.is_equivalent(&right));
        assert_ne!(left, right);
    }

    #[test]
    fn build_expression_equivalence_respects_structure() {
        let nested = BuildExpression::Combine(vec![
            BuildExpression::Combine(vec![
                BuildExpression::Leaf(1),
                BuildExpression::Leaf(2),
            ]),
            BuildExpression::Leaf(3),
        ]);
        let flat = BuildExpression::Combine(vec![
            BuildExpression::Leaf(1),
            BuildExpression::Leaf(2),
            BuildExpression::Leaf(3),
        ]);
        assert!(!nested.is_equivalent(&flat));

        let reordered = BuildExpression::Combine(vec![
            BuildExpression::Leaf(3),
            BuildExpression::Combine(vec![
                BuildExpression::Leaf(2),
                BuildExpression::Leaf(1),
            ]),
        ]);
        assert!(nested.is_equivalent(&reordered));
    }

    #[test]
    fn build_expression_serializes_to_string_form() {
        let expression = BuildExpression::Combine(vec![
            BuildExpression::Combine(vec![
                BuildExpression::Leaf(17),
                BuildExpression::Leaf(42),
            ]),
            BuildExpression::Leaf(96),
        ]);
        assert_eq!(expression.to_string(), "((17;42);96)");
        assert_eq!(expression.leaves(), vec![17, 42, 96]);
    }

    #[test]
    fn filter_return_display() {
        let summary = FilterReturn::new(10, 3, 7);
        assert_eq!(
            summary.to_string(),
            "10 records considered (3 distinct), 7 passed"
        );
    }
}
