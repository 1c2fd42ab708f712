//! Feed document model and the parser collaborator
//!
//! The aggregation engine only needs a handful of channel fields and a flat
//! episode list, so [`FeedDocument`] carries exactly that. Parsing sits behind
//! [`FeedParser`] so the engine can be driven from fixtures in tests.

use crate::error::FeedError;
use crate::types::Episode;
use chrono::{DateTime, Utc};

/// A parsed feed, reduced to what aggregation reads
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeedDocument {
    /// The feed's single channel
    pub channel: FeedChannel,
}

/// Channel-level fields of a feed
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeedChannel {
    /// Channel title
    pub title: String,

    /// Channel website link
    pub link: Option<String>,

    /// Channel description
    pub description: Option<String>,

    /// `itunes:image` href
    pub itunes_image: Option<String>,

    /// `href` attributes of any other `image` extension elements, in document order
    pub extension_image_hrefs: Vec<String>,

    /// `<image><url>` value
    pub image_url: Option<String>,

    /// Episodes in document order (newest first by convention)
    pub items: Vec<Episode>,
}

/// Turns a raw payload into a [`FeedDocument`]
pub trait FeedParser: Send + Sync {
    /// Parse a raw feed payload
    ///
    /// # Errors
    ///
    /// [`FeedError::MissingRoot`] when the document is not rooted at `<rss>`,
    /// [`FeedError::Parse`] for any other malformed input.
    fn parse(&self, raw: &str) -> Result<FeedDocument, FeedError>;
}

/// Default parser built on the `rss` crate
#[derive(Clone, Copy, Debug, Default)]
pub struct RssFeedParser;

impl FeedParser for RssFeedParser {
    fn parse(&self, raw: &str) -> Result<FeedDocument, FeedError> {
        let channel = raw.parse::<rss::Channel>().map_err(|e| match e {
            rss::Error::InvalidStartTag => FeedError::MissingRoot,
            other => FeedError::Parse(other.to_string()),
        })?;

        let extension_image_hrefs = channel
            .extensions()
            .values()
            .flat_map(|by_name| by_name.get("image").into_iter().flatten())
            .filter_map(|ext| ext.attrs().get("href").cloned())
            .collect();

        let items = channel.items().iter().map(episode_from_item).collect();

        Ok(FeedDocument {
            channel: FeedChannel {
                title: channel.title().to_string(),
                link: non_empty(channel.link()),
                description: non_empty(channel.description()),
                itunes_image: channel
                    .itunes_ext()
                    .and_then(|ext| ext.image())
                    .map(str::to_string),
                extension_image_hrefs,
                image_url: channel.image().map(|image| image.url().to_string()),
                items,
            },
        })
    }
}

fn episode_from_item(item: &rss::Item) -> Episode {
    Episode {
        title: item.title().map(str::to_string),
        link: item.link().map(str::to_string),
        pub_date: item.pub_date().and_then(parse_pub_date),
        duration: item
            .itunes_ext()
            .and_then(|ext| ext.duration())
            .map(str::to_string),
        enclosure_url: item.enclosure().map(|enc| enc.url().to_string()),
    }
}

/// Parse an RSS publish date
///
/// Feeds are supposed to use RFC 2822; RFC 3339 is accepted as well since
/// enough generators emit it.
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
