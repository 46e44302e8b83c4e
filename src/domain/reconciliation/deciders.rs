//! Pairwise description-decision heuristics
//!
//! Every merge algorithm reduces to repeated calls of one primitive:
//! should the candidate description replace the one the composite
//! currently carries. Concrete heuristics differ only in that decision.

use std::collections::HashSet;

use tracing::warn;

/// Decides whether a candidate description should replace the current one
pub trait DescriptionDecider: Send + Sync {
    fn name(&self) -> &'static str;

    /// `true` when the candidate should replace the existing description.
    /// `existing_domains` are the source domains of every record currently
    /// contributing to the composite; `candidate_domain` is the host the
    /// candidate record was collected from.
    fn decide(
        &self,
        existing: &str,
        candidate: &str,
        existing_domains: &[String],
        candidate_domain: &str,
    ) -> bool;
}

/// Baseline heuristic: trusted source domains outrank untrusted ones,
/// longer descriptions outrank shorter ones, ties keep the incumbent.
pub struct PrecedenceDecider {
    trusted_domains: HashSet<String>,
}

impl PrecedenceDecider {
    pub fn new(trusted_domains: &[String]) -> Self {
        Self {
            trusted_domains: trusted_domains
                .iter()
                .map(|domain| domain.to_lowercase())
                .collect(),
        }
    }

    fn is_trusted(&self, domain: &str) -> bool {
        self.trusted_domains.contains(&domain.to_lowercase())
    }

    fn any_trusted(&self, domains: &[String]) -> bool {
        domains.iter().any(|domain| self.is_trusted(domain))
    }
}

impl DescriptionDecider for PrecedenceDecider {
    fn name(&self) -> &'static str {
        "precedence"
    }

    fn decide(
        &self,
        existing: &str,
        candidate: &str,
        existing_domains: &[String],
        candidate_domain: &str,
    ) -> bool {
        if existing.trim().is_empty() {
            return !candidate.trim().is_empty();
        }

        match (
            self.any_trusted(existing_domains),
            self.is_trusted(candidate_domain),
        ) {
            (false, true) => true,
            (true, false) => false,
            // Equal standing: the longer text carries more information;
            // a tie keeps the incumbent.
            _ => candidate.trim().len() > existing.trim().len(),
        }
    }
}

/// Precedence heuristic augmented with a word-overlap similarity gate: a
/// near-duplicate candidate that carries no new vocabulary never replaces
/// the incumbent, regardless of raw length.
pub struct TokenOverlapDecider {
    base: PrecedenceDecider,
    similarity_threshold: f64,
}

impl TokenOverlapDecider {
    const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

    pub fn new(trusted_domains: &[String]) -> Self {
        Self {
            base: PrecedenceDecider::new(trusted_domains),
            similarity_threshold: Self::DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    fn words(text: &str) -> HashSet<String> {
        text.split_whitespace()
            .map(|word| {
                word.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|word| !word.is_empty())
            .collect()
    }

    fn jaccard(left: &HashSet<String>, right: &HashSet<String>) -> f64 {
        if left.is_empty() && right.is_empty() {
            return 1.0;
        }
        let intersection = left.intersection(right).count() as f64;
        let union = left.union(right).count() as f64;
        intersection / union
    }
}

impl DescriptionDecider for TokenOverlapDecider {
    fn name(&self) -> &'static str {
        "token-overlap"
    }

    fn decide(
        &self,
        existing: &str,
        candidate: &str,
        existing_domains: &[String],
        candidate_domain: &str,
    ) -> bool {
        if existing.trim().is_empty() {
            return !candidate.trim().is_empty();
        }

        match (
            self.base.any_trusted(existing_domains),
            self.base.is_trusted(candidate_domain),
        ) {
            (false, true) => true,
            (true, false) => false,
            _ => {
                let existing_words = Self::words(existing);
                let candidate_words = Self::words(candidate);
                if Self::jaccard(&existing_words, &candidate_words) >= self.similarity_threshold {
                    // Near-duplicate: replace only on strictly richer vocabulary.
                    candidate_words.len() > existing_words.len()
                } else {
                    candidate.trim().len() > existing.trim().len()
                }
            }
        }
    }
}

/// Maps a configuration name to a concrete heuristic, falling back to the
/// precedence baseline for unrecognized names.
pub struct DeciderFactory;

impl DeciderFactory {
    pub fn create(name: &str, trusted_domains: &[String]) -> Box<dyn DescriptionDecider> {
        match name.to_lowercase().as_str() {
            "precedence" | "simple" => Box::new(PrecedenceDecider::new(trusted_domains)),
            "token-overlap" | "overlap" => Box::new(TokenOverlapDecider::new(trusted_domains)),
            other => {
                warn!(
                    heuristic = other,
                    "Unrecognized reconciler heuristic, falling back to precedence baseline"
                );
                Box::new(PrecedenceDecider::new(trusted_domains))
            }
        }
    }
}
