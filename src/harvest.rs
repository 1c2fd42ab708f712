//! Run orchestration
//!
//! A [`Harvester`] ties the collaborators together for one run:
//!
//! 1. load the previous snapshot and, if there is one, the cache validators
//! 2. take over the output directory ([`StagingTransaction::begin`])
//! 3. fetch, parse and aggregate every source, chunk by chunk
//! 4. merge social data, download covers, write the snapshot
//! 5. commit, or restore if the run failed or a shutdown was requested

use crate::aggregate::{AggregationContext, Aggregator};
use crate::config::{Config, OutputLayout};
use crate::covers::{CoverStore, HttpCoverStore, download_covers_serially};
use crate::error::{Error, Result, SourceError};
use crate::feed::{FeedParser, RssFeedParser};
use crate::fetcher::{ConditionalFetcher, FeedFetcher, FetchOutcome, ValidatorCache};
use crate::retry::fetch_with_retry;
use crate::scheduler::BatchScheduler;
use crate::snapshot::{AtomicJsonWriter, SnapshotWriter, load_snapshot};
use crate::social::{NoOpSocialEnricher, SocialEnricher, accounts_for};
use crate::staging::StagingTransaction;
use crate::types::{FeedSource, Snapshot};
use chrono::Utc;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

/// Read-only inputs shared by every pipeline of a run
struct RunInputs<'a> {
    layout: &'a OutputLayout,
    prior: Option<&'a Snapshot>,
    validators: &'a ValidatorCache,
    backup: Option<&'a Path>,
}

impl RunInputs<'_> {
    fn has_prior_record(&self, key: &str) -> bool {
        self.prior
            .is_some_and(|snapshot| snapshot.channels.contains_key(key))
    }
}

/// Runs the feed ingestion pipeline
pub struct Harvester {
    config: Config,
    fetcher: Arc<dyn FeedFetcher>,
    parser: Arc<dyn FeedParser>,
    enricher: Arc<dyn SocialEnricher>,
    cover_store: Arc<dyn CoverStore>,
    writer: Arc<dyn SnapshotWriter>,
}

impl Harvester {
    /// Create a harvester with the HTTP fetcher, the `rss` parser, no social
    /// enrichment, HTTP cover downloads and atomic JSON snapshots
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or an HTTP client
    /// cannot be built
    pub fn with_defaults(config: Config) -> Result<Self> {
        config.validate()?;
        let fetcher = ConditionalFetcher::new(&config.fetch)?;
        let cover_store = HttpCoverStore::new(&config.fetch.user_agent, config.fetch.timeout)?;

        Ok(Self {
            config,
            fetcher: Arc::new(fetcher),
            parser: Arc::new(RssFeedParser),
            enricher: Arc::new(NoOpSocialEnricher),
            cover_store: Arc::new(cover_store),
            writer: Arc::new(AtomicJsonWriter),
        })
    }

    /// Replace the feed fetcher
    pub fn with_fetcher(mut self, fetcher: Arc<dyn FeedFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Replace the feed parser
    pub fn with_parser(mut self, parser: Arc<dyn FeedParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Replace the social enricher
    pub fn with_enricher(mut self, enricher: Arc<dyn SocialEnricher>) -> Self {
        self.enricher = enricher;
        self
    }

    /// Replace the cover store
    pub fn with_cover_store(mut self, cover_store: Arc<dyn CoverStore>) -> Self {
        self.cover_store = cover_store;
        self
    }

    /// Replace the snapshot writer
    pub fn with_writer(mut self, writer: Arc<dyn SnapshotWriter>) -> Self {
        self.writer = writer;
        self
    }

    /// Run to completion
    pub async fn run(&self) -> Result<Snapshot> {
        self.run_until(std::future::pending()).await
    }

    /// Run until done or until `shutdown` resolves
    ///
    /// When `shutdown` wins, in-flight work is dropped, the previous output is
    /// restored and [`Error::Interrupted`] is returned.
    pub async fn run_until<S>(&self, shutdown: S) -> Result<Snapshot>
    where
        S: Future<Output = ()>,
    {
        let layout = self.config.output.layout();
        let prior = load_snapshot(&layout.snapshot_path).await;
        let validators = if prior.is_some() {
            ValidatorCache::load(&layout.validators_path).await
        } else {
            ValidatorCache::new()
        };

        let transaction = StagingTransaction::begin(layout.clone()).await?;
        let backup = transaction.backup_dir().map(Path::to_path_buf);
        let inputs = RunInputs {
            layout: &layout,
            prior: prior.as_ref(),
            validators: &validators,
            backup: backup.as_deref(),
        };

        let outcome = tokio::select! {
            result = self.execute(&inputs) => Some(result),
            () = shutdown => None,
        };

        match outcome {
            Some(Ok(snapshot)) => {
                transaction.commit().await?;
                tracing::info!(
                    channels = snapshot.channels.len(),
                    errors = snapshot.errors.len(),
                    episodes = snapshot.episode_count,
                    "harvest complete"
                );
                Ok(snapshot)
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "harvest failed, rolling back");
                if let Err(restore_error) = transaction.restore().await {
                    tracing::error!(error = %restore_error, "rollback failed");
                }
                Err(e)
            }
            None => {
                tracing::warn!("shutdown requested, rolling back");
                transaction.restore().await?;
                Err(Error::Interrupted)
            }
        }
    }

    async fn execute(&self, inputs: &RunInputs<'_>) -> Result<Snapshot> {
        let aggregator = Aggregator::new(AggregationContext::new(&self.config, Utc::now()));
        let scheduler = BatchScheduler::new(self.config.aggregation.chunk_size);

        tracing::info!(
            sources = self.config.sources.len(),
            chunk_size = scheduler.width(),
            "harvest started"
        );

        let report = scheduler
            .run(self.config.sources.as_slice(), |index, source| {
                let aggregator = &aggregator;
                async move {
                    self.process_source(index, &source, aggregator, inputs)
                        .await
                }
            })
            .await;

        let mut state = aggregator.into_state();
        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failures.len(),
            chunks = report.chunks,
            "all sources processed"
        );
        state.push_errors(report.failures);

        if self.config.social.enabled {
            let accounts = accounts_for(self.config.sources.iter());
            if !accounts.is_empty() {
                match self.enricher.fetch_social(&accounts).await {
                    Ok(social) => {
                        let touched = state.apply_social(social);
                        tracing::info!(accounts = accounts.len(), touched, "social data merged");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "social enrichment failed, continuing without it");
                    }
                }
            }
        } else {
            tracing::info!("social enrichment disabled");
        }

        download_covers_serially(self.cover_store.as_ref(), &state.cover_jobs()).await;

        if let Err(e) = state.validators().save(&inputs.layout.validators_path).await {
            tracing::warn!(error = %e, "failed to save cache validators");
        }

        let snapshot = state.into_snapshot(Utc::now());
        self.writer
            .write_snapshot(&inputs.layout.snapshot_path, &snapshot)
            .await?;
        Ok(snapshot)
    }

    async fn process_source(
        &self,
        index: usize,
        source: &FeedSource,
        aggregator: &Aggregator,
        inputs: &RunInputs<'_>,
    ) -> std::result::Result<(), SourceError> {
        // A 304 is only usable when there is a record to reuse under this key
        let unconditional = ValidatorCache::new();
        let validators = if inputs.has_prior_record(&source.key) {
            inputs.validators
        } else {
            &unconditional
        };
        let outcome = fetch_with_retry(&self.config.retry, || {
            self.fetcher.fetch(&source.feed, validators)
        })
        .await?;

        match outcome {
            FetchOutcome::NotModified { url } => {
                let prior = inputs.prior.and_then(|snapshot| {
                    snapshot
                        .channels
                        .get(&source.key)
                        .map(|record| (record, &snapshot.episodes_in_2weeks))
                });
                let Some((record, prior_window)) = prior else {
                    return Err(SourceError::NoPriorRecord);
                };

                aggregator.reuse_prior(index, record, prior_window).await;
                if let Some(validators) = inputs.validators.get(&url) {
                    aggregator.record_validators(&url, validators.clone()).await;
                }
                self.carry_raw_payload(&source.key, inputs).await;
            }
            FetchOutcome::Fetched(feed) => {
                aggregator
                    .ingest_payload(index, source, self.parser.as_ref(), &feed.body)
                    .await?;
                aggregator
                    .record_validators(&feed.final_url, feed.validators)
                    .await;

                let path = raw_payload_path(&inputs.layout.rss_dir, &source.key);
                if let Err(e) = tokio::fs::write(&path, feed.body.as_bytes()).await {
                    tracing::warn!(key = %source.key, error = %e, "failed to store raw feed");
                }
            }
        }
        Ok(())
    }

    /// Copy the previous raw payload of an unchanged source out of the backup
    async fn carry_raw_payload(&self, key: &str, inputs: &RunInputs<'_>) {
        let Some(backup) = inputs.backup else {
            return;
        };
        let Ok(relative) = inputs.layout.rss_dir.strip_prefix(&inputs.layout.output_dir) else {
            return;
        };
        let from = raw_payload_path(&backup.join(relative), key);
        let to = raw_payload_path(&inputs.layout.rss_dir, key);
        match tokio::fs::copy(&from, &to).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(key = %key, "no previous raw feed to carry over");
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to carry over raw feed");
            }
        }
    }
}

fn raw_payload_path(rss_dir: &Path, key: &str) -> std::path::PathBuf {
    rss_dir.join(format!("{key}.xml"))
}
