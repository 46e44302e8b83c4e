//! Filter pipeline: equivalence-class compression over a configurable set
//! of filters
//!
//! Records are partitioned by exact trimmed description text and every
//! filter only ever sees one representative per class, so a description
//! repeated verbatim across many sources costs at most one model call no
//! matter how many records carry it.

pub mod local;
pub mod model;
pub mod traits;

pub use local::{
    BlankDescriptionFilter, DescriptionLengthFilter, IdentifierConflictFilter,
    IntegerDescriptionFilter, MultipleIdentifierFilter,
};
pub use model::ModelFilter;
pub use traits::VulnerabilityFilter;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::FilterConfig;
use crate::domain::{FilterReturn, FilterStatus, RawVulnerability};
use crate::infrastructure::model::DescriptionValidator;

/// Which filters a pipeline run applies
pub enum FilterScope {
    /// Every local filter plus the model-backed filter
    All,
    /// Only the cheap local filters
    LocalOnly,
    /// Only the model-backed filter
    RemoteOnly,
    /// A caller-supplied list
    Custom(Vec<Arc<dyn VulnerabilityFilter>>),
}

impl FilterScope {
    /// Parse a configured scope name, defaulting to `All` for anything
    /// unrecognized
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "all" => FilterScope::All,
            "local" => FilterScope::LocalOnly,
            "remote" => FilterScope::RemoteOnly,
            other => {
                warn!(scope = other, "Unrecognized filter scope, defaulting to all");
                FilterScope::All
            }
        }
    }
}

/// The standard set of local filters
pub fn local_filters(config: &FilterConfig) -> Vec<Arc<dyn VulnerabilityFilter>> {
    vec![
        Arc::new(BlankDescriptionFilter),
        Arc::new(IntegerDescriptionFilter),
        Arc::new(IdentifierConflictFilter::new()),
        Arc::new(MultipleIdentifierFilter::new()),
        Arc::new(DescriptionLengthFilter::new(
            config.min_description_chars,
            config.max_description_chars,
        )),
    ]
}

/// Orchestrates a filtering run over one batch of raw records
pub struct FilterPipeline {
    filters: Vec<Arc<dyn VulnerabilityFilter>>,
    separate_identifiers: bool,
}

impl FilterPipeline {
    pub fn new(
        scope: FilterScope,
        config: &FilterConfig,
        validator: Arc<DescriptionValidator>,
    ) -> Self {
        let model_filter = |validator: Arc<DescriptionValidator>| -> Arc<dyn VulnerabilityFilter> {
            Arc::new(ModelFilter::new(
                validator,
                Duration::from_secs(config.per_record_budget_seconds),
            ))
        };

        let filters = match scope {
            FilterScope::All => {
                let mut filters = local_filters(config);
                filters.push(model_filter(validator));
                filters
            }
            FilterScope::LocalOnly => local_filters(config),
            FilterScope::RemoteOnly => vec![model_filter(validator)],
            FilterScope::Custom(filters) => filters,
        };

        Self {
            filters,
            separate_identifiers: config.separate_identifiers,
        }
    }

    /// Build a pipeline from an explicit filter list
    pub fn with_filters(
        filters: Vec<Arc<dyn VulnerabilityFilter>>,
        separate_identifiers: bool,
    ) -> Self {
        Self {
            filters,
            separate_identifiers,
        }
    }

    /// Run every selected filter over the batch.
    ///
    /// Each record ends with a terminal status, and records sharing
    /// identical trimmed description text always end with the same one.
    pub async fn run(&self, records: &mut [RawVulnerability]) -> FilterReturn {
        let considered = records.len();
        if considered == 0 {
            return FilterReturn::new(0, 0, 0);
        }

        // Partition into equivalence classes and pick one representative
        // per class.
        let mut index_of: HashMap<(Option<String>, String), usize> = HashMap::new();
        let mut classes: Vec<Vec<usize>> = Vec::new();
        let mut representatives: Vec<RawVulnerability> = Vec::new();
        for (index, record) in records.iter().enumerate() {
            let key = (
                self.separate_identifiers
                    .then(|| record.cve_id.as_str().to_string()),
                record.trimmed_description().to_string(),
            );
            match index_of.get(&key) {
                Some(&class) => classes[class].push(index),
                None => {
                    index_of.insert(key, classes.len());
                    classes.push(vec![index]);
                    representatives.push(record.clone());
                }
            }
        }
        let distinct = representatives.len();

        for filter in &self.filters {
            debug!(
                filter = filter.name(),
                representatives = distinct,
                "Running filter"
            );
            filter.filter_all(&mut representatives).await;
        }

        // A representative no filter failed survives the run, including
        // those an exhausted parallel budget left untouched.
        for representative in representatives.iter_mut() {
            if representative.filter_status == FilterStatus::Pending {
                representative.filter_status = FilterStatus::Passed;
            }
        }

        // Propagate each representative's terminal status to its class.
        let mut passed = 0;
        for (representative, members) in representatives.iter().zip(&classes) {
            for &index in members {
                records[index].filter_status = representative.filter_status;
                if representative.filter_status == FilterStatus::Passed {
                    passed += 1;
                }
            }
        }

        FilterReturn::new(considered, distinct, passed)
    }
}
