//! Reconciliation engine
//!
//! Merges a set of filtered raw records (plus any previously reconciled
//! composite) into one canonical record, extending the provenance
//! expression and recomputing the publish / last-modified range over every
//! contributor past and present. The three merge algorithms are all
//! tournaments over the single pairwise [`DescriptionDecider`] primitive.

pub mod deciders;

pub use deciders::{DeciderFactory, DescriptionDecider, PrecedenceDecider, TokenOverlapDecider};

use tracing::debug;

use super::entities::{CompositeVulnerability, RawVulnerability};
use super::errors::DomainError;
use super::value_objects::BuildExpression;

/// Algorithm used to fold new records into a composite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Fold new records in sequentially; provenance nests left
    UpdateOneByOne,
    /// Evaluate the whole batch against the current description; provenance
    /// extends with one flat combine
    UpdateBulk,
    /// Discard the current description and recompute from every record that
    /// has ever contributed; provenance flattens over all leaves
    Resynth,
}

/// Strategy-selection hook; overridable per reconciler instance
pub type StrategyHook =
    fn(Option<&CompositeVulnerability>, &[RawVulnerability]) -> MergeStrategy;

/// Default selection: full resynthesis when nothing exists yet, a single
/// pairwise step for a lone new record, one bulk pass otherwise.
pub fn default_strategy(
    existing: Option<&CompositeVulnerability>,
    new_records: &[RawVulnerability],
) -> MergeStrategy {
    match existing {
        None => MergeStrategy::Resynth,
        Some(_) if new_records.len() == 1 => MergeStrategy::UpdateOneByOne,
        Some(_) => MergeStrategy::UpdateBulk,
    }
}

/// Merges raw records into composite records.
///
/// Performs no internal synchronization: concurrent reconciliation of the
/// same composite is a caller error.
pub struct Reconciler {
    decider: Box<dyn DescriptionDecider>,
    strategy_hook: StrategyHook,
}

impl Reconciler {
    pub fn new(decider: Box<dyn DescriptionDecider>) -> Self {
        Self {
            decider,
            strategy_hook: default_strategy,
        }
    }

    /// Replace the strategy-selection hook
    pub fn with_strategy_hook(mut self, hook: StrategyHook) -> Self {
        self.strategy_hook = hook;
        self
    }

    /// Merge `new_records` into `existing`, producing the next composite.
    ///
    /// With an empty new set the existing composite is returned untouched:
    /// an equivalent build expression and identical dates. Always yields a
    /// composite; ambiguity between descriptions is resolved by the
    /// decider's own tie-break rules.
    pub fn reconcile(
        &self,
        existing: Option<CompositeVulnerability>,
        new_records: Vec<RawVulnerability>,
    ) -> Result<CompositeVulnerability, DomainError> {
        if new_records.is_empty() {
            return existing.ok_or(DomainError::NothingToReconcile);
        }

        let cve_id = match &existing {
            Some(composite) => composite.cve_id.clone(),
            None => new_records[0].cve_id.clone(),
        };
        for record in &new_records {
            if record.cve_id != cve_id {
                return Err(DomainError::IdentifierMismatch {
                    record_id: record.id,
                    expected: cve_id.to_string(),
                    found: record.cve_id.to_string(),
                });
            }
        }

        let strategy = (self.strategy_hook)(existing.as_ref(), &new_records);
        debug!(
            cve = %cve_id,
            ?strategy,
            new_records = new_records.len(),
            "Reconciling vulnerability records"
        );

        let (description, build_expression) = match strategy {
            MergeStrategy::UpdateOneByOne => self.update_one_by_one(existing.as_ref(), &new_records),
            MergeStrategy::UpdateBulk => self.update_bulk(existing.as_ref(), &new_records),
            MergeStrategy::Resynth => self.synthesize(existing.as_ref(), &new_records),
        };

        let prior_range = existing
            .as_ref()
            .map(|composite| (composite.published_at, composite.last_modified_at));

        // Contributor union across all past and present merges, deduplicated
        // by raw-record id.
        let mut contributors = existing
            .map(|composite| composite.contributors)
            .unwrap_or_default();
        for record in new_records {
            if !contributors.iter().any(|known| known.id == record.id) {
                contributors.push(record);
            }
        }

        let mut published_at = contributors[0].discovered_at;
        let mut last_modified_at = contributors[0].discovered_at;
        for record in &contributors {
            published_at = published_at.min(record.discovered_at);
            last_modified_at = last_modified_at.max(record.discovered_at);
        }
        if let Some((prior_published, prior_modified)) = prior_range {
            published_at = published_at.min(prior_published);
            last_modified_at = last_modified_at.max(prior_modified);
        }

        Ok(CompositeVulnerability::new(
            cve_id,
            description,
            published_at,
            last_modified_at,
            build_expression,
            contributors,
        ))
    }

    /// Sequential fold: each new record is decided pairwise against the
    /// running description; provenance nests left one step at a time.
    fn update_one_by_one(
        &self,
        existing: Option<&CompositeVulnerability>,
        new_records: &[RawVulnerability],
    ) -> (String, BuildExpression) {
        let (mut description, mut domains, mut expression, rest) = match existing {
            Some(composite) => (
                composite.description.clone(),
                composite.source_domains(),
                composite.build_expression.clone(),
                new_records,
            ),
            None => {
                let first = &new_records[0];
                (
                    first.description.clone(),
                    vec![first.source_domain().to_string()],
                    BuildExpression::Leaf(first.id),
                    &new_records[1..],
                )
            }
        };

        for record in rest {
            if self.decider.decide(
                &description,
                &record.description,
                &domains,
                record.source_domain(),
            ) {
                description = record.description.clone();
            }
            domains.push(record.source_domain().to_string());
            expression =
                BuildExpression::Combine(vec![expression, BuildExpression::Leaf(record.id)]);
        }

        (description, expression)
    }

    /// One pass of the whole batch against the current description;
    /// provenance extends with a single flat combine over the batch.
    fn update_bulk(
        &self,
        existing: Option<&CompositeVulnerability>,
        new_records: &[RawVulnerability],
    ) -> (String, BuildExpression) {
        let (mut description, mut domains, prior_expression) = match existing {
            Some(composite) => (
                composite.description.clone(),
                composite.source_domains(),
                Some(composite.build_expression.clone()),
            ),
            None => (String::new(), Vec::new(), None),
        };

        for record in new_records {
            if self.decider.decide(
                &description,
                &record.description,
                &domains,
                record.source_domain(),
            ) {
                description = record.description.clone();
            }
            domains.push(record.source_domain().to_string());
        }

        let mut children: Vec<BuildExpression> = prior_expression.into_iter().collect();
        children.extend(
            new_records
                .iter()
                .map(|record| BuildExpression::Leaf(record.id)),
        );

        (description, BuildExpression::Combine(children))
    }

    /// Recompute from scratch over the union of every contributing record;
    /// provenance becomes one flat combine over all leaves.
    fn synthesize(
        &self,
        existing: Option<&CompositeVulnerability>,
        new_records: &[RawVulnerability],
    ) -> (String, BuildExpression) {
        let mut all: Vec<&RawVulnerability> = existing
            .map(|composite| composite.contributors.iter().collect())
            .unwrap_or_default();
        for record in new_records {
            if !all.iter().any(|known| known.id == record.id) {
                all.push(record);
            }
        }
        // Deterministic tournament order regardless of how callers batch.
        all.sort_by_key(|record| (record.discovered_at, record.id));

        let mut description = String::new();
        let mut domains: Vec<String> = Vec::new();
        for record in &all {
            if self.decider.decide(
                &description,
                &record.description,
                &domains,
                record.source_domain(),
            ) {
                description = record.description.clone();
            }
            domains.push(record.source_domain().to_string());
        }

        let children = all
            .iter()
            .map(|record| BuildExpression::Leaf(record.id))
            .collect();

        (description, BuildExpression::Combine(children))
    }
}
