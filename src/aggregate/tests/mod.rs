// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::feed::RssFeedParser;
use crate::types::Episode;
use chrono::TimeZone;
use serde_json::json;

fn jan(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap()
}

fn context() -> AggregationContext {
    AggregationContext {
        run_started: jan(20),
        cutoff: jan(6),
        recent_limit: 5,
        cover_dir: PathBuf::from("static/downloads/cover"),
        public_prefix: "static".to_string(),
    }
}

/// RSS document with one item per day, listed newest first
fn feed_xml(title: &str, days: &[u32]) -> String {
    let items: String = days
        .iter()
        .map(|day| {
            format!(
                "<item><title>{title} {day}</title><link>https://{title}.example/{day}</link>\
                 <pubDate>{}</pubDate>\
                 <enclosure url=\"https://cdn.example/{title}/{day}.mp3\" length=\"1\" type=\"audio/mpeg\"/>\
                 </item>",
                jan(*day).to_rfc2822()
            )
        })
        .collect();
    format!(
        r#"<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd"><channel>
        <title>{title}</title><link>https://{title}.example/</link>
        <itunes:image href="https://img.example/{title}.png?v=2"/>
        {items}</channel></rss>"#
    )
}

async fn ingest(aggregator: &Aggregator, index: usize, key: &str, days: &[u32]) {
    let source = FeedSource::new(key, format!("https://{key}.example/rss"));
    aggregator
        .ingest_payload(index, &source, &RssFeedParser, &feed_xml(key, days))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_record_fields_follow_newest_first_convention() {
    let aggregator = Aggregator::new(context());
    let mut source = FeedSource::new("show", "https://show.example/rss");
    source.twitter = Some("@show".into());
    source.hashtag = Some("showcast".into());

    aggregator
        .ingest_payload(
            0,
            &source,
            &RssFeedParser,
            &feed_xml("show", &[19, 17, 15, 13, 11, 9, 7]),
        )
        .await
        .unwrap();

    let state = aggregator.into_state();
    let record = state.record("show").unwrap();
    assert_eq!(record.title, "show");
    assert_eq!(record.total, 7);
    assert_eq!(record.first_episode_date, Some(jan(7)));
    assert_eq!(record.last_episode_date, Some(jan(19)));
    assert_eq!(
        record.first_episode_link.as_deref(),
        Some("https://show.example/7")
    );
    assert_eq!(record.recent_episodes.len(), 5);
    assert_eq!(record.recent_episodes[0].pub_date, Some(jan(19)));
    assert_eq!(record.latest_pub_date, Some(jan(19)));
    assert_eq!(record.link.as_deref(), Some("https://show.example/"));
    assert_eq!(record.twitter.as_deref(), Some("@show"));
    assert_eq!(record.hashtag.as_deref(), Some("showcast"));
    assert_eq!(record.cover.as_deref(), Some("/downloads/cover/show.png"));
    assert_eq!(
        record.cover_url.as_deref(),
        Some("https://img.example/show.png")
    );
    assert_eq!(record.file_server.get("cdn.example"), Some(&7));

    let jobs = state.cover_jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(
        jobs[0].dest,
        PathBuf::from("static/downloads/cover/show.png")
    );
}

#[tokio::test]
async fn test_configured_link_overrides_channel_link() {
    let aggregator = Aggregator::new(context());
    let mut source = FeedSource::new("show", "https://show.example/rss");
    source.link = Some("https://elsewhere.example/".into());

    aggregator
        .ingest_payload(0, &source, &RssFeedParser, &feed_xml("show", &[19]))
        .await
        .unwrap();

    let state = aggregator.into_state();
    assert_eq!(
        state.record("show").unwrap().link.as_deref(),
        Some("https://elsewhere.example/")
    );
}

#[tokio::test]
async fn test_parse_failure_records_nothing() {
    let aggregator = Aggregator::new(context());
    let source = FeedSource::new("atom", "https://atom.example/feed");

    let result = aggregator
        .ingest_payload(
            0,
            &source,
            &RssFeedParser,
            r#"<feed xmlns="http://www.w3.org/2005/Atom"></feed>"#,
        )
        .await;

    assert!(matches!(result, Err(FeedError::MissingRoot)));
    let snapshot = aggregator.into_state().into_snapshot(jan(20));
    assert!(snapshot.channels.is_empty());
    assert!(snapshot.load_order.is_empty());
    assert!(snapshot.is_consistent());
}

#[tokio::test]
async fn test_order_is_independent_of_completion_order() {
    let aggregator = Aggregator::new(context());
    // Input order is [a, b, c]; completion order is reversed
    ingest(&aggregator, 2, "c", &[12]).await;
    ingest(&aggregator, 1, "b", &[12]).await;
    ingest(&aggregator, 0, "a", &[10]).await;

    let snapshot = aggregator.into_state().into_snapshot(jan(20));
    assert_eq!(snapshot.load_order, ["b", "c", "a"]);
    assert!(snapshot.is_consistent());
}

#[tokio::test]
async fn test_sources_without_dates_sort_last() {
    let aggregator = Aggregator::new(context());
    let source = FeedSource::new("undated", "https://undated.example/rss");
    aggregator
        .ingest_payload(
            0,
            &source,
            &RssFeedParser,
            r#"<rss version="2.0"><channel><title>u</title><item><title>x</title></item></channel></rss>"#,
        )
        .await
        .unwrap();
    ingest(&aggregator, 1, "old", &[2]).await;

    let snapshot = aggregator.into_state().into_snapshot(jan(20));
    assert_eq!(snapshot.load_order, ["old", "undated"]);
}

#[tokio::test]
async fn test_window_is_merged_newest_first_with_input_tie_break() {
    let aggregator = Aggregator::new(context());
    ingest(&aggregator, 1, "b", &[18, 10, 6, 5]).await;
    ingest(&aggregator, 0, "a", &[18, 12]).await;

    let snapshot = aggregator.into_state().into_snapshot(jan(20));
    let window: Vec<(&str, DateTime<Utc>)> = snapshot
        .episodes_in_2weeks
        .iter()
        .map(|e| (e.key.as_str(), e.episode.pub_date.unwrap()))
        .collect();

    assert_eq!(
        window,
        [
            ("a", jan(18)),
            ("b", jan(18)),
            ("a", jan(12)),
            ("b", jan(10)),
            ("b", jan(6)),
        ]
    );
    assert_eq!(snapshot.episode_count, 6);
}

#[tokio::test]
async fn test_reuse_prior_refilters_window() {
    let prior = FeedRecord {
        key: "kept".into(),
        title: "Kept".into(),
        total: 3,
        latest_pub_date: Some(jan(15)),
        cover_url: Some("https://img.example/kept.jpg".into()),
        cover: Some("/downloads/cover/kept.jpg".into()),
        ..Default::default()
    };
    let entry = |key: &str, day: u32| EpisodeWindowEntry {
        key: key.into(),
        channel_title: "Kept".into(),
        episode: Episode {
            pub_date: Some(jan(day)),
            ..Default::default()
        },
    };
    let prior_window = vec![entry("kept", 15), entry("other", 14), entry("kept", 3)];

    let aggregator = Aggregator::new(context());
    aggregator.reuse_prior(0, &prior, &prior_window).await;

    let state = aggregator.into_state();
    assert_eq!(state.cover_jobs().len(), 1);
    let snapshot = state.into_snapshot(jan(20));
    assert_eq!(snapshot.channels["kept"], prior);
    assert_eq!(snapshot.episodes_in_2weeks, vec![entry("kept", 15)]);
    assert_eq!(snapshot.episode_count, 3);
}

#[tokio::test]
async fn test_social_merges_only_into_existing_records() {
    let aggregator = Aggregator::new(context());
    ingest(&aggregator, 0, "a", &[12]).await;
    let mut state = aggregator.into_state();

    let mut social = BTreeMap::new();
    social.insert(
        "a".to_string(),
        json!({ "followers": 42 }).as_object().unwrap().clone(),
    );
    social.insert(
        "ghost".to_string(),
        json!({ "followers": 1 }).as_object().unwrap().clone(),
    );

    assert_eq!(state.apply_social(social), 1);
    assert_eq!(
        state.record("a").unwrap().extra.get("followers"),
        Some(&json!(42))
    );
    assert!(state.record("ghost").is_none());
    assert_eq!(state.record_count(), 1);
}

#[test]
fn test_oversized_window_reaches_back_to_the_earliest_date() {
    let mut config = Config::default();
    config.aggregation.window_days = u32::MAX;

    let context = AggregationContext::new(&config, jan(20));

    assert_eq!(context.cutoff, DateTime::<Utc>::MIN_UTC);
    assert_eq!(context.run_started, jan(20));
}

#[tokio::test]
async fn test_validators_and_errors_accumulate() {
    let aggregator = Aggregator::new(context());
    aggregator
        .record_validators(
            "https://a.example/rss",
            Validators {
                etag: Some("\"1\"".into()),
                last_modified: None,
            },
        )
        .await;

    let mut state = aggregator.into_state();
    state.push_errors([PendingError::new("fetch", "b", "timeout", "timed out")]);

    assert!(state.validators().get("https://a.example/rss").is_some());
    let snapshot = state.into_snapshot(jan(20));
    assert_eq!(snapshot.errors.len(), 1);
    assert_eq!(snapshot.errors[0].key, "b");
}
