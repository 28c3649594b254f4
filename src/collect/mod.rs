// Collection pipeline - cached, bounded-parallel captures with one forced retry pass

pub mod cache;
pub mod sources;

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::routes::parser::CaptureParser;
use crate::routes::{Asn, CanonicalDataset, Prefix};
use cache::{CollectionCache, Freshness};

/// Fetches one raw transcript for a prefix. Failure is `None`, never an error.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    async fn capture(&self, prefix: &Prefix, target_asn: Asn) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchOutcome {
    Reused,
    Captured,
    Failed,
}

/// Counts reported after a collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionSummary {
    pub requested: usize,
    pub ignored: usize,
    pub queried: usize,
    pub present: usize,
    pub missing_before_retry: BTreeSet<Prefix>,
    pub still_missing: BTreeSet<Prefix>,
}

impl CollectionSummary {
    pub fn recovered_all(&self) -> bool {
        !self.missing_before_retry.is_empty() && self.still_missing.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CollectionOutcome {
    pub dataset: CanonicalDataset,
    pub summary: CollectionSummary,
}

pub struct CollectionOrchestrator {
    cache: CollectionCache,
    source: Arc<dyn CaptureSource>,
    ignore: BTreeSet<Prefix>,
}

impl CollectionOrchestrator {
    pub fn new(cache: CollectionCache, source: Arc<dyn CaptureSource>) -> Self {
        CollectionOrchestrator {
            cache,
            source,
            ignore: BTreeSet::new(),
        }
    }

    pub fn with_ignore_list(mut self, ignore: BTreeSet<Prefix>) -> Self {
        self.ignore = ignore;
        self
    }

    /// Fetch, parse and aggregate all requested prefixes.
    ///
    /// `parallelism == 0` runs captures one after another. Prefixes still
    /// missing after the first pass get exactly one forced re-capture.
    pub async fn collect(
        &self,
        prefixes: &BTreeSet<Prefix>,
        target_asn: Asn,
        parallelism: usize,
        force: bool,
    ) -> CollectionOutcome {
        let (ignored, queried): (BTreeSet<Prefix>, BTreeSet<Prefix>) =
            prefixes.iter().partition(|p| self.ignore.contains(*p));

        for prefix in &ignored {
            tracing::info!("Skipping {} - listed in ignore file", prefix);
        }

        let failed = self.fetch_round(&queried, target_asn, parallelism, force).await;
        tracing::info!("All queries complete, parsing captures");

        let mut dataset = CanonicalDataset::new();
        self.parse_into(&mut dataset, &queried, &failed).await;

        let missing_before_retry = missing_from(&queried, &dataset);
        let still_missing = if missing_before_retry.is_empty() {
            BTreeSet::new()
        } else {
            tracing::warn!("{} prefix(es) missing from dataset, retrying", missing_before_retry.len());
            for prefix in &missing_before_retry {
                tracing::warn!("    - {}", prefix);
            }
            self.retry_missing(&mut dataset, &missing_before_retry, target_asn, parallelism)
                .await
        };

        let summary = CollectionSummary {
            requested: prefixes.len(),
            ignored: ignored.len(),
            queried: queried.len(),
            present: dataset.len(),
            missing_before_retry,
            still_missing,
        };

        tracing::info!(
            requested = summary.requested,
            ignored = summary.ignored,
            queried = summary.queried,
            present = summary.present,
            still_missing = summary.still_missing.len(),
            "Collection finished"
        );

        CollectionOutcome { dataset, summary }
    }

    /// The bounded retry pass: one forced capture per missing prefix, then a re-parse.
    /// Returns the prefixes that are still absent.
    pub async fn retry_missing(
        &self,
        dataset: &mut CanonicalDataset,
        missing: &BTreeSet<Prefix>,
        target_asn: Asn,
        parallelism: usize,
    ) -> BTreeSet<Prefix> {
        let failed = self.fetch_round(missing, target_asn, parallelism, true).await;
        self.parse_into(dataset, missing, &failed).await;

        let still_missing = missing_from(missing, dataset);
        if still_missing.is_empty() {
            tracing::info!("All previously missing prefixes recovered");
        } else {
            tracing::warn!("Still missing {} prefix(es) after retry", still_missing.len());
        }
        still_missing
    }

    /// Run one fan-out of fetches. Returns the prefixes whose capture failed.
    async fn fetch_round(
        &self,
        prefixes: &BTreeSet<Prefix>,
        target_asn: Asn,
        parallelism: usize,
        force: bool,
    ) -> BTreeSet<Prefix> {
        let mut outcomes = Vec::with_capacity(prefixes.len());

        if parallelism == 0 {
            for prefix in prefixes {
                let outcome = fetch_one(&self.cache, self.source.as_ref(), *prefix, target_asn, force).await;
                outcomes.push((*prefix, outcome));
            }
        } else {
            let semaphore = Arc::new(Semaphore::new(parallelism));
            let mut handles = Vec::with_capacity(prefixes.len());

            for prefix in prefixes.iter().copied() {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    continue;
                };
                let cache = self.cache.clone();
                let source = self.source.clone();

                handles.push((
                    prefix,
                    tokio::spawn(async move {
                        let outcome = fetch_one(&cache, source.as_ref(), prefix, target_asn, force).await;
                        drop(permit);
                        outcome
                    }),
                ));
            }

            for (prefix, handle) in handles {
                let outcome = handle.await.unwrap_or_else(|e| {
                    tracing::error!("Capture task for {} panicked: {}", prefix, e);
                    FetchOutcome::Failed
                });
                outcomes.push((prefix, outcome));
            }
        }

        let count = |kind: FetchOutcome| outcomes.iter().filter(|(_, o)| *o == kind).count();
        tracing::debug!(
            reused = count(FetchOutcome::Reused),
            captured = count(FetchOutcome::Captured),
            failed = count(FetchOutcome::Failed),
            "Fetch round done"
        );

        outcomes
            .into_iter()
            .filter(|(_, outcome)| *outcome == FetchOutcome::Failed)
            .map(|(prefix, _)| prefix)
            .collect()
    }

    async fn parse_into(&self, dataset: &mut CanonicalDataset, prefixes: &BTreeSet<Prefix>, failed: &BTreeSet<Prefix>) {
        for prefix in prefixes.difference(failed) {
            let Some(entry) = self.cache.get(prefix).await else {
                continue;
            };
            let observations = CaptureParser::parse(&entry.raw_text);
            if observations.is_empty() {
                tracing::debug!("No route records parsed for {}", prefix);
            }
            dataset.extend(*prefix, observations);
        }
    }
}

async fn fetch_one(
    cache: &CollectionCache,
    source: &dyn CaptureSource,
    prefix: Prefix,
    target_asn: Asn,
    force: bool,
) -> FetchOutcome {
    let freshness = cache.freshness(&prefix, Utc::now(), force).await;
    match freshness {
        Freshness::Fresh(age) => {
            tracing::info!("Skipping {} - cached capture is fresh ({}s old)", prefix, age.num_seconds())
        }
        Freshness::Stale(age) => {
            tracing::info!("Refreshing {} - cached capture is stale ({}s old)", prefix, age.num_seconds())
        }
        Freshness::Missing => tracing::info!("Querying {} - no cached capture found", prefix),
        Freshness::Forced => tracing::info!("Forcing re-query of {} - ignoring cache", prefix),
    }
    if !freshness.needs_fetch() {
        return FetchOutcome::Reused;
    }

    let Some(raw_text) = source.capture(&prefix, target_asn).await else {
        tracing::warn!("No output captured for {}", prefix);
        return FetchOutcome::Failed;
    };

    match cache.put(&prefix, raw_text, Utc::now()).await {
        Ok(()) => FetchOutcome::Captured,
        Err(e) => {
            tracing::error!("Failed to cache capture for {}: {}", prefix, e);
            FetchOutcome::Failed
        }
    }
}

fn missing_from(requested: &BTreeSet<Prefix>, dataset: &CanonicalDataset) -> BTreeSet<Prefix> {
    requested.iter().filter(|p| !dataset.contains(p)).copied().collect()
}
