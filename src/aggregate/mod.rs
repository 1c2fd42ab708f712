//! Aggregation engine
//!
//! Pipelines running concurrently inside a chunk hand their results to one
//! shared [`Aggregator`]. Everything stored carries the source's input index, so
//! the final ordering in [`AggregationState::into_snapshot`] does not depend on
//! which fetch happened to finish first.

mod extract;
mod stats;

pub use extract::{
    COVER_EXTRACTORS, cover_extension, episodes_are_newest_first, episodes_in_window,
    extract_cover_url, latest_pub_date, published_path, remove_query,
};
pub use stats::{duration_average, duration_median, file_servers, parse_duration};

use crate::config::Config;
use crate::covers::CoverJob;
use crate::error::FeedError;
use crate::feed::FeedParser;
use crate::fetcher::{ValidatorCache, Validators};
use crate::types::{EpisodeWindowEntry, FeedRecord, FeedSource, PendingError, Snapshot};
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Run-wide parameters for per-feed derivation
#[derive(Clone, Debug)]
pub struct AggregationContext {
    /// When the run started
    pub run_started: DateTime<Utc>,
    /// Oldest publish date that still counts as inside the episode window
    pub cutoff: DateTime<Utc>,
    /// Maximum length of `recentEpisodes`
    pub recent_limit: usize,
    /// Directory covers are stored in
    pub cover_dir: PathBuf,
    /// Leading directory stripped from published cover paths
    pub public_prefix: String,
}

impl AggregationContext {
    /// Derive the context from configuration
    pub fn new(config: &Config, run_started: DateTime<Utc>) -> Self {
        Self {
            run_started,
            cutoff: run_started
                .checked_sub_signed(Duration::days(i64::from(config.aggregation.window_days)))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            recent_limit: config.aggregation.recent_episodes,
            cover_dir: config.output.layout().cover_dir,
            public_prefix: config.output.public_prefix.clone(),
        }
    }

    fn cover_for(&self, key: &str, url: &str) -> (CoverJob, String) {
        let dest = self
            .cover_dir
            .join(format!("{}.{}", key, cover_extension(url)));
        let published = published_path(&dest, &self.public_prefix);
        (
            CoverJob {
                key: key.to_string(),
                src: url.to_string(),
                dest,
            },
            published,
        )
    }
}

#[derive(Debug)]
struct LatestEntry {
    index: usize,
    key: String,
    date: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct WindowSlot {
    index: usize,
    position: usize,
    entry: EpisodeWindowEntry,
}

/// Everything accumulated over one run
#[derive(Debug, Default)]
pub struct AggregationState {
    records: BTreeMap<String, FeedRecord>,
    latest: Vec<LatestEntry>,
    window: Vec<WindowSlot>,
    covers: Vec<(usize, CoverJob)>,
    errors: Vec<PendingError>,
    validators: ValidatorCache,
}

impl AggregationState {
    /// Record for `key`, if the source made it
    pub fn record(&self, key: &str) -> Option<&FeedRecord> {
        self.records.get(key)
    }

    /// Number of sources with a record
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Append per-source failures
    pub fn push_errors(&mut self, errors: impl IntoIterator<Item = PendingError>) {
        self.errors.extend(errors);
    }

    /// Validators captured during this run
    pub fn validators(&self) -> &ValidatorCache {
        &self.validators
    }

    /// Merge social data into existing records
    ///
    /// Keys without a record are ignored. Returns the number of records touched.
    pub fn apply_social(&mut self, social: BTreeMap<String, Map<String, Value>>) -> usize {
        let mut touched = 0;
        for (key, fields) in social {
            match self.records.get_mut(&key) {
                Some(record) => {
                    if record.merge_fields(fields) > 0 {
                        touched += 1;
                    }
                }
                None => {
                    tracing::debug!(key = %key, "ignoring social data for unknown source");
                }
            }
        }
        touched
    }

    /// Cover downloads to perform, in input order
    pub fn cover_jobs(&self) -> Vec<CoverJob> {
        let mut jobs: Vec<&(usize, CoverJob)> = self.covers.iter().collect();
        jobs.sort_by_key(|(index, _)| *index);
        jobs.into_iter().map(|(_, job)| job.clone()).collect()
    }

    /// Assemble the final snapshot
    ///
    /// Sources are ordered by latest publish date, newest first, ties broken by
    /// input order; sources without any dated episode come last. The episode
    /// window uses the same rule on episode dates, with feed position as the
    /// final tie-breaker.
    pub fn into_snapshot(self, updated: DateTime<Utc>) -> Snapshot {
        let mut latest = self.latest;
        latest.sort_by(|a, b| b.date.cmp(&a.date).then(a.index.cmp(&b.index)));

        let mut window = self.window;
        window.sort_by(|a, b| {
            b.entry
                .episode
                .pub_date
                .cmp(&a.entry.episode.pub_date)
                .then(a.index.cmp(&b.index))
                .then(a.position.cmp(&b.position))
        });

        let episode_count = self.records.values().map(|r| r.total).sum();

        Snapshot {
            load_order: latest.into_iter().map(|l| l.key).collect(),
            episodes_in_2weeks: window.into_iter().map(|w| w.entry).collect(),
            channels: self.records,
            updated,
            episode_count,
            errors: self.errors,
        }
    }
}

/// Shared accumulator for one run
#[derive(Debug)]
pub struct Aggregator {
    context: AggregationContext,
    state: Mutex<AggregationState>,
}

impl Aggregator {
    /// Create an empty accumulator
    pub fn new(context: AggregationContext) -> Self {
        Self {
            context,
            state: Mutex::new(AggregationState::default()),
        }
    }

    /// Parse a fetched payload and fold the resulting record into the run
    ///
    /// # Errors
    ///
    /// Returns the parser's error; nothing is recorded in that case.
    pub async fn ingest_payload(
        &self,
        index: usize,
        source: &FeedSource,
        parser: &dyn FeedParser,
        body: &str,
    ) -> Result<(), FeedError> {
        let document = parser.parse(body)?;
        let channel = document.channel;
        let key = source.key.as_str();

        if !episodes_are_newest_first(&channel.items) {
            tracing::warn!(key = %key, "episodes are not listed newest first");
        }

        let cover = extract_cover_url(&channel).map(|url| self.context.cover_for(key, &url));
        let episodes = &channel.items;
        let oldest = episodes.last();
        let newest = episodes.first();

        let record = FeedRecord {
            key: key.to_string(),
            title: channel.title.clone(),
            twitter: source.twitter.clone(),
            feed: source.feed.clone(),
            link: source.link.clone().or_else(|| channel.link.clone()),
            hashtag: source.hashtag.clone(),
            cover: cover.as_ref().map(|(_, published)| published.clone()),
            cover_url: cover.as_ref().map(|(job, _)| job.src.clone()),
            total: episodes.len(),
            first_episode_date: oldest.and_then(|e| e.pub_date),
            last_episode_date: newest.and_then(|e| e.pub_date),
            first_episode_link: oldest.and_then(|e| e.link.clone()),
            last_episode_link: newest.and_then(|e| e.link.clone()),
            recent_episodes: episodes
                .iter()
                .take(self.context.recent_limit)
                .cloned()
                .collect(),
            file_server: file_servers(episodes),
            duration_average: duration_average(episodes),
            duration_median: duration_median(episodes),
            description: channel.description.clone(),
            latest_pub_date: latest_pub_date(episodes),
            extra: Map::new(),
        };

        let window: Vec<EpisodeWindowEntry> = episodes_in_window(episodes, self.context.cutoff)
            .into_iter()
            .map(|episode| EpisodeWindowEntry {
                key: key.to_string(),
                channel_title: channel.title.clone(),
                episode,
            })
            .collect();

        tracing::debug!(
            key = %key,
            episodes = record.total,
            in_window = window.len(),
            "feed aggregated"
        );

        self.insert(index, record, window, cover.map(|(job, _)| job))
            .await;
        Ok(())
    }

    /// Carry an unchanged source's previous record into this run
    ///
    /// The prior window entries are filtered again against this run's window.
    pub async fn reuse_prior(
        &self,
        index: usize,
        prior: &FeedRecord,
        prior_window: &[EpisodeWindowEntry],
    ) {
        let window = prior_window
            .iter()
            .filter(|entry| entry.key == prior.key)
            .filter(|entry| {
                entry
                    .episode
                    .pub_date
                    .is_some_and(|date| date >= self.context.cutoff)
            })
            .cloned()
            .collect();

        // The cover directory starts empty every run, so the cover is fetched again
        let cover = prior
            .cover_url
            .as_deref()
            .map(|url| self.context.cover_for(&prior.key, url).0);

        tracing::debug!(key = %prior.key, "reusing previous record");
        self.insert(index, prior.clone(), window, cover).await;
    }

    /// Remember validators captured for `url`
    pub async fn record_validators(&self, url: &str, validators: Validators) {
        self.state.lock().await.validators.record(url, validators);
    }

    /// Consume the accumulator
    pub fn into_state(self) -> AggregationState {
        self.state.into_inner()
    }

    async fn insert(
        &self,
        index: usize,
        record: FeedRecord,
        window: Vec<EpisodeWindowEntry>,
        cover: Option<CoverJob>,
    ) {
        let mut state = self.state.lock().await;
        state.latest.push(LatestEntry {
            index,
            key: record.key.clone(),
            date: record.latest_pub_date,
        });
        state
            .window
            .extend(
                window
                    .into_iter()
                    .enumerate()
                    .map(|(position, entry)| WindowSlot {
                        index,
                        position,
                        entry,
                    }),
            );
        if let Some(job) = cover {
            state.covers.push((index, job));
        }
        state.records.insert(record.key.clone(), record);
    }
}

#[cfg(test)]
mod tests;
