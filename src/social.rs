//! Social-data enrichment collaborator

use crate::error::Result;
use crate::types::FeedSource;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Social identity of one source
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SocialAccount {
    /// Account handle without the leading `@`
    pub twitter: Option<String>,
    /// Hashtag
    pub hashtag: Option<String>,
}

/// Social accounts of every source that has a handle or hashtag
pub fn accounts_for<'a>(
    sources: impl IntoIterator<Item = &'a FeedSource>,
) -> BTreeMap<String, SocialAccount> {
    sources
        .into_iter()
        .filter_map(|source| {
            let twitter = source
                .twitter
                .as_deref()
                .map(|handle| handle.trim().trim_start_matches('@'))
                .filter(|handle| !handle.is_empty())
                .map(str::to_string);
            let hashtag = source
                .hashtag
                .as_deref()
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string);
            (twitter.is_some() || hashtag.is_some())
                .then(|| (source.key.clone(), SocialAccount { twitter, hashtag }))
        })
        .collect()
}

/// Fetches social data for sources
#[async_trait]
pub trait SocialEnricher: Send + Sync {
    /// Return per-source fields to merge into the records
    ///
    /// Keys in the result that do not name a recorded source are ignored.
    async fn fetch_social(
        &self,
        accounts: &BTreeMap<String, SocialAccount>,
    ) -> Result<BTreeMap<String, Map<String, Value>>>;
}

/// Enricher that contributes nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpSocialEnricher;

#[async_trait]
impl SocialEnricher for NoOpSocialEnricher {
    async fn fetch_social(
        &self,
        _accounts: &BTreeMap<String, SocialAccount>,
    ) -> Result<BTreeMap<String, Map<String, Value>>> {
        Ok(BTreeMap::new())
    }
}
