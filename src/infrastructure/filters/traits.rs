//! Filter contract and the parallel fan-out variant

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::domain::{FilterStatus, RawVulnerability};

/// A single validity check over raw vulnerability records
#[async_trait]
pub trait VulnerabilityFilter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the record should survive this filter
    async fn passes(&self, record: &RawVulnerability) -> bool;

    /// Apply the check sequentially, writing each record's status.
    /// Records that already failed an earlier filter are left alone.
    async fn filter_all(&self, records: &mut Vec<RawVulnerability>) {
        for record in records.iter_mut() {
            if record.filter_status == FilterStatus::Failed {
                continue;
            }
            record.filter_status = if self.passes(record).await {
                FilterStatus::Passed
            } else {
                FilterStatus::Failed
            };
        }
    }
}

/// Parallel `filter_all` variant: one independent task per record, bounded
/// by available parallelism, under a wall-clock budget proportional to the
/// batch size.
///
/// A failed task is logged and leaves its record at the prior status
/// without disturbing siblings. When the budget runs out the remaining
/// tasks are abandoned; statuses already applied stay applied.
pub(crate) async fn filter_all_parallel<F, Fut>(
    filter_name: &'static str,
    records: &mut Vec<RawVulnerability>,
    per_record_budget: Duration,
    check: F,
) where
    F: Fn(RawVulnerability) -> Fut,
    Fut: Future<Output = bool> + Send + 'static,
{
    let parallelism = std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(4);
    let semaphore = Arc::new(Semaphore::new(parallelism));
    let mut tasks: JoinSet<(usize, bool)> = JoinSet::new();

    for (index, record) in records.iter().enumerate() {
        if record.filter_status == FilterStatus::Failed {
            continue;
        }
        let verdict = check(record.clone());
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            (index, verdict.await)
        });
    }

    let deadline = tokio::time::Instant::now() + per_record_budget * records.len() as u32;
    loop {
        match tokio::time::timeout_at(deadline, tasks.join_next()).await {
            Ok(Some(Ok((index, passed)))) => {
                records[index].filter_status = if passed {
                    FilterStatus::Passed
                } else {
                    FilterStatus::Failed
                };
            }
            Ok(Some(Err(error))) => {
                warn!(
                    filter = filter_name,
                    error = %error,
                    "Filter task failed; record keeps its previous status"
                );
            }
            Ok(None) => break,
            Err(_) => {
                warn!(
                    filter = filter_name,
                    abandoned = tasks.len(),
                    "Filter batch budget exhausted; abandoning remaining tasks"
                );
                tasks.abort_all();
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CveId;
    use chrono::Utc;

    fn record(id: i64, description: &str) -> RawVulnerability {
        RawVulnerability::new(
            id,
            CveId::new("CVE-2023-0001".to_string()).unwrap(),
            description.to_string(),
            Utc::now(),
            "https://example.org/feed".to_string(),
        )
    }

    struct RejectEmpty;

    #[async_trait]
    impl VulnerabilityFilter for RejectEmpty {
        fn name(&self) -> &'static str {
            "reject-empty"
        }

        async fn passes(&self, record: &RawVulnerability) -> bool {
            !record.description.trim().is_empty()
        }
    }

    #[tokio::test]
    async fn sequential_filter_all_writes_terminal_statuses() {
        let mut records = vec![record(1, "real text"), record(2, "   ")];
        RejectEmpty.filter_all(&mut records).await;
        assert_eq!(records[0].filter_status, FilterStatus::Passed);
        assert_eq!(records[1].filter_status, FilterStatus::Failed);
    }

    #[tokio::test]
    async fn sequential_filter_all_leaves_failed_records_alone() {
        let mut records = vec![record(1, "real text")];
        records[0].filter_status = FilterStatus::Failed;
        RejectEmpty.filter_all(&mut records).await;
        assert_eq!(records[0].filter_status, FilterStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_variant_applies_verdicts_per_record() {
        let mut records = vec![record(1, "keep"), record(2, "drop"), record(3, "keep")];
        filter_all_parallel(
            "test",
            &mut records,
            Duration::from_secs(60),
            |record| async move { record.description == "keep" },
        )
        .await;
        assert_eq!(records[0].filter_status, FilterStatus::Passed);
        assert_eq!(records[1].filter_status, FilterStatus::Failed);
        assert_eq!(records[2].filter_status, FilterStatus::Passed);
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_variant_isolates_per_record_failures() {
        let mut records = vec![record(1, "panics"), record(2, "fine")];
        filter_all_parallel(
            "test",
            &mut records,
            Duration::from_secs(60),
            |record| async move {
                if record.description == "panics" {
                    panic!("simulated task failure");
                }
                true
            },
        )
        .await;
        // The failed task's record keeps its prior status; its sibling is
        // unaffected.
        assert_eq!(records[0].filter_status, FilterStatus::Pending);
        assert_eq!(records[1].filter_status, FilterStatus::Passed);
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_variant_abandons_tasks_past_the_budget() {
        let mut records = vec![record(1, "stalls"), record(2, "fine")];
        filter_all_parallel(
            "test",
            &mut records,
            Duration::from_secs(60),
            |record| async move {
                if record.description == "stalls" {
                    tokio::time::sleep(Duration::from_secs(86_400)).await;
                }
                true
            },
        )
        .await;
        assert_eq!(records[0].filter_status, FilterStatus::Pending);
        assert_eq!(records[1].filter_status, FilterStatus::Passed);
    }
}
