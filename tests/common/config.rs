//! Test configuration helpers for running harvests inside a temporary directory

use feedsnap::config::OutputConfig;
use feedsnap::{Config, FeedSource, SourceList};
use std::path::Path;
use std::time::Duration;

/// Configuration writing into `root/downloads` with fast retries
pub fn test_config(root: &Path, sources: Vec<FeedSource>) -> Config {
    let mut config = Config {
        output: OutputConfig {
            output_dir: root.join("downloads"),
            ..Default::default()
        },
        sources: SourceList::new(sources).expect("source keys must be unique"),
        ..Default::default()
    };
    config.fetch.timeout = Duration::from_secs(2);
    config.retry.initial_delay = Duration::from_millis(10);
    config.retry.max_delay = Duration::from_millis(10);
    config
}

/// Source `key` fed from `path` on the mock server at `base`
pub fn source(key: &str, base: &str, path: &str) -> FeedSource {
    FeedSource::new(key, format!("{base}{path}"))
}
