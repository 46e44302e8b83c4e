//! Model-backed description filter

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::application::errors::ValidatorError;
use crate::domain::RawVulnerability;
use crate::infrastructure::model::DescriptionValidator;

use super::traits::{VulnerabilityFilter, filter_all_parallel};

/// Validates descriptions through the shared dispatcher, fanning a batch
/// out in parallel.
///
/// Oversized descriptions fail immediately without a call. Indeterminate
/// outcomes (malformed replies, transport failures) default to pass:
/// discarding a possibly-valid record is judged worse than keeping a
/// dubious one.
pub struct ModelFilter {
    validator: Arc<DescriptionValidator>,
    per_record_budget: Duration,
    indeterminate: Arc<AtomicU64>,
}

impl ModelFilter {
    pub fn new(validator: Arc<DescriptionValidator>, per_record_budget: Duration) -> Self {
        Self {
            validator,
            per_record_budget,
            indeterminate: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Validation outcomes that defaulted to pass since construction
    pub fn indeterminate_count(&self) -> u64 {
        self.indeterminate.load(Ordering::Relaxed)
    }

    async fn evaluate(
        validator: Arc<DescriptionValidator>,
        indeterminate: Arc<AtomicU64>,
        record: RawVulnerability,
    ) -> bool {
        if !validator.fits_context(&record.description) {
            debug!(
                record = record.id,
                "Description exceeds the model context window"
            );
            return false;
        }

        match validator.classify(&record.description).await {
            Ok(valid) => valid,
            Err(ValidatorError::InvalidReply(reply)) => {
                indeterminate.fetch_add(1, Ordering::Relaxed);
                warn!(
                    record = record.id,
                    reply = %reply,
                    "Unrecognized validation reply; keeping record"
                );
                true
            }
            Err(ValidatorError::Model(error)) => {
                indeterminate.fetch_add(1, Ordering::Relaxed);
                warn!(
                    record = record.id,
                    error = %error,
                    "Validation call failed; keeping record"
                );
                true
            }
        }
    }
}

#[async_trait]
impl VulnerabilityFilter for ModelFilter {
    fn name(&self) -> &'static str {
        "model-validation"
    }

    async fn passes(&self, record: &RawVulnerability) -> bool {
        Self::evaluate(
            Arc::clone(&self.validator),
            Arc::clone(&self.indeterminate),
            record.clone(),
        )
        .await
    }

    async fn filter_all(&self, records: &mut Vec<RawVulnerability>) {
        let before = self.indeterminate.load(Ordering::Relaxed);
        filter_all_parallel(self.name(), records, self.per_record_budget, |record| {
            let validator = Arc::clone(&self.validator);
            let indeterminate = Arc::clone(&self.indeterminate);
            async move { Self::evaluate(validator, indeterminate, record).await }
        })
        .await;

        let defaulted = self.indeterminate.load(Ordering::Relaxed) - before;
        if defaulted > 0 {
            warn!(
                defaulted,
                batch = records.len(),
                "Indeterminate validation outcomes defaulted to pass"
            );
        }
    }
}
