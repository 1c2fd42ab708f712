//! Episode statistics: hosting and duration

use crate::types::Episode;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

// `SS`, `MM:SS` or `HH:MM:SS`, optionally with fractional seconds
static DURATION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\d+(?::\d{1,2}){0,2}(?:\.\d+)?$").ok());

/// Enclosure host → number of episodes served from it
pub fn file_servers(episodes: &[Episode]) -> BTreeMap<String, usize> {
    let mut servers = BTreeMap::new();
    for episode in episodes {
        let host = episode
            .enclosure_url
            .as_deref()
            .and_then(|raw| url::Url::parse(raw).ok())
            .and_then(|url| url.host_str().map(str::to_string));
        if let Some(host) = host {
            *servers.entry(host).or_insert(0) += 1;
        }
    }
    servers
}

/// Parse an `itunes:duration` value into seconds
pub fn parse_duration(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let pattern = DURATION.as_ref()?;
    if !pattern.is_match(raw) {
        return None;
    }
    raw.split(':')
        .try_fold(0.0, |acc, part| part.parse::<f64>().ok().map(|v| acc * 60.0 + v))
}

fn durations(episodes: &[Episode]) -> Vec<f64> {
    episodes
        .iter()
        .filter_map(|e| e.duration.as_deref())
        .filter_map(parse_duration)
        .collect()
}

/// Mean duration in seconds over episodes with a parseable duration
pub fn duration_average(episodes: &[Episode]) -> Option<f64> {
    let values = durations(episodes);
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median duration in seconds over episodes with a parseable duration
pub fn duration_median(episodes: &[Episode]) -> Option<f64> {
    let mut values = durations(episodes);
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
