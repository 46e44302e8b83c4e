//! Application services orchestrating the ingestion workflow

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::errors::ApplicationError;
use crate::config::Config;
use crate::domain::{
    CompositeVulnerability, DeciderFactory, FilterReturn, FilterStatus, RawVulnerability,
    Reconciler,
};
use crate::infrastructure::filters::{FilterPipeline, FilterScope};
use crate::infrastructure::model::{DescriptionValidator, ModelDispatcher};

/// Result of one ingestion run for a single identifier
pub struct IngestionOutcome {
    /// The reconciled composite; absent when everything was filtered out
    /// and nothing existed before
    pub composite: Option<CompositeVulnerability>,
    /// Filtering statistics for logging by the driver
    pub filter_summary: FilterReturn,
}

/// Filters a batch of raw records and reconciles the survivors
#[async_trait]
pub trait IngestionService: Send + Sync {
    async fn ingest(
        &self,
        records: Vec<RawVulnerability>,
        existing: Option<CompositeVulnerability>,
    ) -> Result<IngestionOutcome, ApplicationError>;
}

/// Default ingestion workflow: filter pipeline followed by reconciliation
pub struct IngestionServiceImpl {
    pipeline: FilterPipeline,
    reconciler: Reconciler,
}

impl IngestionServiceImpl {
    pub fn new(pipeline: FilterPipeline, reconciler: Reconciler) -> Self {
        Self {
            pipeline,
            reconciler,
        }
    }

    /// Wire the standard pipeline and reconciler from configuration,
    /// sharing the process-wide dispatcher
    pub fn from_config(config: &Config, dispatcher: Arc<ModelDispatcher>) -> Self {
        let validator = Arc::new(DescriptionValidator::new(dispatcher));
        let pipeline = FilterPipeline::new(
            FilterScope::parse(&config.filter.scope),
            &config.filter,
            validator,
        );
        let reconciler = Reconciler::new(DeciderFactory::create(
            &config.reconciler.heuristic,
            &config.reconciler.trusted_domains,
        ));
        Self::new(pipeline, reconciler)
    }
}

#[async_trait]
impl IngestionService for IngestionServiceImpl {
    async fn ingest(
        &self,
        mut records: Vec<RawVulnerability>,
        existing: Option<CompositeVulnerability>,
    ) -> Result<IngestionOutcome, ApplicationError> {
        let filter_summary = self.pipeline.run(&mut records).await;
        info!(summary = %filter_summary, "Filtering complete");

        let passing: Vec<RawVulnerability> = records
            .into_iter()
            .filter(|record| record.filter_status == FilterStatus::Passed)
            .collect();

        if passing.is_empty() && existing.is_none() {
            return Ok(IngestionOutcome {
                composite: None,
                filter_summary,
            });
        }

        let composite = self.reconciler.reconcile(existing, passing)?;
        info!(
            cve = %composite.cve_id,
            contributors = composite.contributors.len(),
            provenance = %composite.build_expression,
            "Reconciliation complete"
        );

        Ok(IngestionOutcome {
            composite: Some(composite),
            filter_summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;
    use crate::domain::{CveId, PrecedenceDecider};
    use crate::infrastructure::filters::local_filters;
    use chrono::{Duration, Utc};

    fn record(id: i64, description: &str, hours_offset: i64) -> RawVulnerability {
        RawVulnerability::new(
            id,
            CveId::new("CVE-2023-0001".to_string()).unwrap(),
            description.to_string(),
            Utc::now() + Duration::hours(hours_offset),
            "https://example.org/feed".to_string(),
        )
    }

    fn service() -> IngestionServiceImpl {
        let filter_config = FilterConfig {
            scope: "local".to_string(),
            separate_identifiers: false,
            min_description_chars: 10,
            max_description_chars: 10_000,
            per_record_budget_seconds: 60,
        };
        let pipeline = FilterPipeline::with_filters(local_filters(&filter_config), false);
        let reconciler = Reconciler::new(Box::new(PrecedenceDecider::new(&[])));
        IngestionServiceImpl::new(pipeline, reconciler)
    }

    #[tokio::test]
    async fn ingest_filters_then_reconciles() {
        let service = service();
        let records = vec![
            record(1, "a heap overflow in the tls parser of libexample", -2),
            record(2, "   ", 0),
            record(3, "a heap overflow in the tls parser of libexample, reachable remotely", 2),
        ];

        let outcome = service.ingest(records, None).await.unwrap();
        assert_eq!(outcome.filter_summary.considered, 3);
        assert_eq!(outcome.filter_summary.passed, 2);

        let composite = outcome.composite.unwrap();
        assert_eq!(composite.contributor_ids(), vec![1, 3]);
        assert!(composite.description.contains("reachable remotely"));
        assert!(composite.published_at < composite.last_modified_at);
    }

    #[tokio::test]
    async fn ingest_without_survivors_or_history_yields_nothing() {
        let service = service();
        let outcome = service
            .ingest(vec![record(1, "   ", 0), record(2, "12345678901", 0)], None)
            .await
            .unwrap();
        assert!(outcome.composite.is_none());
        assert_eq!(outcome.filter_summary.passed, 0);
    }

    #[tokio::test]
    async fn ingest_without_survivors_keeps_the_existing_composite() {
        let service = service();
        let seeded = service
            .ingest(
                vec![record(1, "a heap overflow in the tls parser of libexample", 0)],
                None,
            )
            .await
            .unwrap()
            .composite
            .unwrap();

        let outcome = service
            .ingest(vec![record(2, "   ", 0)], Some(seeded.clone()))
            .await
            .unwrap();
        let kept = outcome.composite.unwrap();
        assert_eq!(kept.description, seeded.description);
        assert!(kept.build_expression.is_equivalent(&seeded.build_expression));
    }
}
