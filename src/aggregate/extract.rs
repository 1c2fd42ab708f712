//! Per-feed field extraction

use crate::feed::FeedChannel;
use crate::types::Episode;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Cover URL sources, tried in order; the first non-empty value wins
pub const COVER_EXTRACTORS: &[fn(&FeedChannel) -> Option<String>] =
    &[itunes_image, extension_image_href, channel_image_url];

fn itunes_image(channel: &FeedChannel) -> Option<String> {
    channel.itunes_image.clone()
}

fn extension_image_href(channel: &FeedChannel) -> Option<String> {
    channel
        .extension_image_hrefs
        .iter()
        .find(|href| !href.trim().is_empty())
        .cloned()
}

fn channel_image_url(channel: &FeedChannel) -> Option<String> {
    channel.image_url.clone()
}

/// Cover image URL of a channel with its query string removed
pub fn extract_cover_url(channel: &FeedChannel) -> Option<String> {
    COVER_EXTRACTORS
        .iter()
        .filter_map(|extract| extract(channel))
        .map(|url| url.trim().to_string())
        .find(|url| !url.is_empty())
        .map(|url| remove_query(&url).to_string())
}

/// Strip everything from the first `?`
pub fn remove_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

/// File extension for a stored cover, taken from the URL path (default `jpg`)
pub fn cover_extension(url: &str) -> String {
    let path = remove_query(url);
    let path = path.split_once('#').map_or(path, |(base, _)| base);
    let file_name = path.rsplit('/').next().unwrap_or_default();

    match file_name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => "jpg".to_string(),
    }
}

/// Public path of a stored file: `dest` with the leading `prefix` directory removed
///
/// `static/downloads/cover/a.jpg` with prefix `static` becomes
/// `/downloads/cover/a.jpg`. Paths outside `prefix` are returned whole.
pub fn published_path(dest: &Path, prefix: &str) -> String {
    let relative = dest.strip_prefix(prefix).unwrap_or(dest);
    let joined = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .filter(|c| c != "/")
        .collect::<Vec<_>>()
        .join("/");
    format!("/{joined}")
}

/// Whether dated episodes appear newest first
///
/// Undated episodes are ignored.
pub fn episodes_are_newest_first(episodes: &[Episode]) -> bool {
    let dates: Vec<DateTime<Utc>> = episodes.iter().filter_map(|e| e.pub_date).collect();
    dates.windows(2).all(|pair| pair[0] >= pair[1])
}

/// Episodes published at or after `cutoff`, in feed order
pub fn episodes_in_window(episodes: &[Episode], cutoff: DateTime<Utc>) -> Vec<Episode> {
    episodes
        .iter()
        .filter(|e| e.pub_date.is_some_and(|date| date >= cutoff))
        .cloned()
        .collect()
}

/// Most recent parsed publish date
pub fn latest_pub_date(episodes: &[Episode]) -> Option<DateTime<Utc>> {
    episodes.iter().filter_map(|e| e.pub_date).max()
}
