//! Fan-out over the three case stores.
//!
//! Every (source, technician batch) pair becomes one task in a `JoinSet`; a
//! semaphore keeps at most `max_concurrency` store queries running. The join
//! loop collects successes, records failures per source and stops waiting at
//! the deadline or when the caller cancels, keeping what already arrived.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::models::{CaseRecord, CaseSource, DateWindow, Diagnostics};
use crate::sources::{CaseStore, RawCase};

#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<CaseRecord>,
    pub diagnostics: Diagnostics,
}

pub struct SourceFetcher {
    store: Arc<dyn CaseStore>,
    max_concurrency: usize,
    batch_size: usize,
    timeout: Duration,
}

impl SourceFetcher {
    pub fn new(store: Arc<dyn CaseStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            max_concurrency: config.max_concurrency.max(1),
            batch_size: config.batch_size.max(1),
            timeout: config.timeout,
        }
    }

    pub async fn fetch(
        &self,
        technician_ids: &[Uuid],
        window: DateWindow,
        cancel: &CancellationToken,
    ) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();
        if technician_ids.is_empty() {
            return outcome;
        }

        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut pending: BTreeMap<CaseSource, usize> = BTreeMap::new();

        for source in CaseSource::ALL {
            for batch in technician_ids.chunks(self.batch_size) {
                let store = Arc::clone(&self.store);
                let permits = Arc::clone(&permits);
                let batch = batch.to_vec();
                *pending.entry(source).or_insert(0) += 1;

                tasks.spawn(async move {
                    let result = match permits.acquire_owned().await {
                        Ok(_permit) => store.fetch_completed(source, &batch, window).await,
                        Err(err) => Err(anyhow::Error::new(err)),
                    };
                    (source, result)
                });
            }
        }

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((source, result))) => {
                        if let Some(count) = pending.get_mut(&source) {
                            *count -= 1;
                        }
                        match result {
                            Ok(rows) => {
                                debug!(%source, rows = rows.len(), "case batch fetched");
                                outcome
                                    .records
                                    .extend(rows.into_iter().map(RawCase::normalize));
                            }
                            Err(err) => {
                                let message = format!("{err:#}");
                                warn!(%source, error = %message, "case store query failed");
                                outcome.diagnostics.record_failure(source, message);
                            }
                        }
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "case fetch task did not finish");
                    }
                },
                _ = &mut deadline => {
                    warn!(timeout_ms = self.timeout.as_millis() as u64, "case fetch deadline passed");
                    outcome.diagnostics.record_timeout();
                    break;
                }
                _ = cancel.cancelled() => {
                    warn!("case fetch cancelled by caller");
                    outcome.diagnostics.record_timeout();
                    break;
                }
            }
        }
        tasks.abort_all();

        for (source, outstanding) in pending {
            if outstanding == 0 || outcome.diagnostics.failed_sources.contains(&source) {
                continue;
            }
            let reason = if outcome.diagnostics.timed_out {
                format!("{outstanding} batch(es) still outstanding when the fetch stopped")
            } else {
                format!("{outstanding} batch(es) aborted")
            };
            outcome.diagnostics.record_failure(source, reason);
        }

        outcome
    }
}
