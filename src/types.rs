//! Core types for feedsnap

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::error::SourceError;

/// One configured feed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    /// Stable identifier, taken from the key of the `sources` mapping
    #[serde(skip)]
    pub key: String,

    /// Feed URL
    pub feed: String,

    /// Social account handle (a leading `@` is allowed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,

    /// Hashtag used by the show
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashtag: Option<String>,

    /// Display link overriding the channel's own `<link>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl FeedSource {
    /// Create a source with only a key and a feed URL
    pub fn new(key: impl Into<String>, feed: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            feed: feed.into(),
            twitter: None,
            hashtag: None,
            link: None,
        }
    }
}

/// Ordered set of feed sources
///
/// Serialized as a JSON object keyed by source key. Object order in the file is
/// the input order of the run: it drives chunking and breaks ordering ties.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceList(Vec<FeedSource>);

impl SourceList {
    /// Build a list, rejecting duplicate keys
    pub fn new(sources: Vec<FeedSource>) -> std::result::Result<Self, String> {
        let mut seen = HashSet::new();
        for source in &sources {
            if !seen.insert(source.key.as_str()) {
                return Err(format!("duplicate source key '{}'", source.key));
            }
        }
        Ok(Self(sources))
    }

    /// Sources in input order
    pub fn as_slice(&self) -> &[FeedSource] {
        &self.0
    }

    /// Number of sources
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no sources are configured
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate sources in input order
    pub fn iter(&self) -> std::slice::Iter<'_, FeedSource> {
        self.0.iter()
    }
}

impl Serialize for SourceList {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for source in &self.0 {
            map.serialize_entry(&source.key, source)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SourceList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct SourceListVisitor;

        impl<'de> Visitor<'de> for SourceListVisitor {
            type Value = SourceList;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of source key to feed source")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<SourceList, A::Error> {
                let mut sources = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, mut source)) = access.next_entry::<String, FeedSource>()? {
                    source.key = key;
                    sources.push(source);
                }
                SourceList::new(sources).map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_map(SourceListVisitor)
    }
}

/// One episode as read from a feed
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    /// Episode title
    #[serde(default)]
    pub title: Option<String>,

    /// Episode page link
    #[serde(default)]
    pub link: Option<String>,

    /// Publication date, when the feed declares a parseable one
    #[serde(default)]
    pub pub_date: Option<DateTime<Utc>>,

    /// Raw `itunes:duration` value
    #[serde(default)]
    pub duration: Option<String>,

    /// Media enclosure URL
    #[serde(default)]
    pub enclosure_url: Option<String>,
}

/// Normalized per-source output
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRecord {
    /// Source key
    pub key: String,
    /// Channel title
    pub title: String,
    /// Social handle from configuration
    #[serde(default)]
    pub twitter: Option<String>,
    /// Feed URL from configuration
    pub feed: String,
    /// Display link (configuration override, else the channel link)
    #[serde(default)]
    pub link: Option<String>,
    /// Hashtag from configuration
    #[serde(default)]
    pub hashtag: Option<String>,
    /// Published cover path, relative to the public root
    #[serde(default)]
    pub cover: Option<String>,
    /// Remote cover image the published cover is downloaded from
    #[serde(default)]
    pub cover_url: Option<String>,
    /// Number of episodes in the feed
    #[serde(default)]
    pub total: usize,
    /// Date of the oldest episode
    #[serde(default)]
    pub first_episode_date: Option<DateTime<Utc>>,
    /// Date of the newest episode
    #[serde(default)]
    pub last_episode_date: Option<DateTime<Utc>>,
    /// Link of the oldest episode
    #[serde(default)]
    pub first_episode_link: Option<String>,
    /// Link of the newest episode
    #[serde(default)]
    pub last_episode_link: Option<String>,
    /// Newest episodes, capped
    #[serde(default)]
    pub recent_episodes: Vec<Episode>,
    /// Enclosure host → number of episodes served from it
    #[serde(default)]
    pub file_server: BTreeMap<String, usize>,
    /// Mean episode duration in seconds
    #[serde(default)]
    pub duration_average: Option<f64>,
    /// Median episode duration in seconds
    #[serde(default)]
    pub duration_median: Option<f64>,
    /// Channel description
    #[serde(default)]
    pub description: Option<String>,
    /// Most recent episode publish date
    #[serde(default)]
    pub latest_pub_date: Option<DateTime<Utc>>,
    /// Fields merged in by social enrichment that have no dedicated slot
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FeedRecord {
    /// Merge enrichment fields into this record, field by field
    ///
    /// Fields naming a typed slot overwrite it when the value has the right shape;
    /// everything else lands in [`extra`](Self::extra). Returns how many fields
    /// were applied.
    pub fn merge_fields(&mut self, fields: serde_json::Map<String, serde_json::Value>) -> usize {
        let mut applied = 0;
        for (name, value) in fields {
            let mut current = match serde_json::to_value(&*self) {
                Ok(serde_json::Value::Object(map)) => map,
                Ok(_) => return applied,
                Err(e) => {
                    tracing::warn!(key = %self.key, error = %e, "failed to serialize record for merge");
                    return applied;
                }
            };
            current.insert(name.clone(), value);
            match serde_json::from_value::<FeedRecord>(serde_json::Value::Object(current)) {
                Ok(merged) => {
                    *self = merged;
                    applied += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        key = %self.key,
                        field = %name,
                        error = %e,
                        "ignoring enrichment field with incompatible type"
                    );
                }
            }
        }
        applied
    }
}

/// An episode inside the trailing window, tagged with its source
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeWindowEntry {
    /// Owning source key
    pub key: String,
    /// Owning channel title
    #[serde(default)]
    pub channel_title: String,
    /// The episode
    #[serde(flatten)]
    pub episode: Episode,
}

/// Serialized cause of a [`PendingError`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCause {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

/// A source that did not make it into the snapshot, and why
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingError {
    /// Phase that failed (`fetch`, `parse`, `bad_rss`, ...)
    pub label: String,
    /// Source key
    #[serde(rename = "rss")]
    pub key: String,
    /// Captured cause
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCause>,
}

impl PendingError {
    /// Create an error entry with a cause
    pub fn new(
        label: impl Into<String>,
        key: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            key: key.into(),
            error: Some(ErrorCause {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// Record a failed per-source pipeline
    pub fn from_source_error(key: &str, error: &SourceError) -> Self {
        Self::new(error.label(), key, error.error_code(), error.to_string())
    }

    /// Record a pipeline that panicked
    pub fn panicked(key: &str, message: impl Into<String>) -> Self {
        Self::new("pipeline", key, "panic", message)
    }
}

/// The published document of one run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Source keys, most recently updated first
    pub load_order: Vec<String>,
    /// Episodes published inside the trailing window, newest first
    pub episodes_in_2weeks: Vec<EpisodeWindowEntry>,
    /// Source key → record
    pub channels: BTreeMap<String, FeedRecord>,
    /// Completion time of the run
    pub updated: DateTime<Utc>,
    /// Sum of `total` over all records
    #[serde(rename = "episodeCount")]
    pub episode_count: usize,
    /// Every source that did not make it into `channels`
    pub errors: Vec<PendingError>,
}

impl Snapshot {
    /// Whether every key in `load_order` and the episode window has a record and
    /// every record is ordered
    pub fn is_consistent(&self) -> bool {
        let ordered: HashSet<&str> = self.load_order.iter().map(String::as_str).collect();
        let recorded: HashSet<&str> = self.channels.keys().map(String::as_str).collect();
        ordered.len() == self.load_order.len()
            && ordered == recorded
            && self
                .episodes_in_2weeks
                .iter()
                .all(|entry| recorded.contains(entry.key.as_str()))
    }
}
