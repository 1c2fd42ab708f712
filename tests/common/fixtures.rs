//! Feed fixtures and mock server helpers

use chrono::{DateTime, Duration, Utc};
use std::time::Duration as StdDuration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A moment `days` days before now
pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

/// RSS 2.0 document with one episode per date, in the given order
///
/// `cover` becomes the channel's `itunes:image`.
pub fn rss_feed(title: &str, dates: &[DateTime<Utc>], cover: Option<&str>) -> String {
    let items: String = dates
        .iter()
        .enumerate()
        .map(|(n, date)| {
            format!(
                r#"<item>
      <title>{title} #{n}</title>
      <link>https://{title}.example/episodes/{n}</link>
      <pubDate>{}</pubDate>
      <itunes:duration>30:00</itunes:duration>
      <enclosure url="https://media.example/{title}/{n}.mp3" length="1000" type="audio/mpeg"/>
    </item>"#,
                date.to_rfc2822()
            )
        })
        .collect();
    let image = cover
        .map(|href| format!(r#"<itunes:image href="{href}"/>"#))
        .unwrap_or_default();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
  <channel>
    <title>{title}</title>
    <link>https://{title}.example/</link>
    <description>All about {title}</description>
    {image}
    {items}
  </channel>
</rss>"#
    )
}

/// Serve `body` at `route`
pub async fn mount_feed(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Serve `body` at `route` after `delay`
pub async fn mount_slow_feed(server: &MockServer, route: &str, body: String, delay: StdDuration) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// Serve a bare status code at `route`
pub async fn mount_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Make `/{prefix}/0` redirect `redirects` times before serving `body`
pub async fn mount_redirects(server: &MockServer, prefix: &str, redirects: u32, body: String) {
    for hop in 0..redirects {
        Mock::given(method("GET"))
            .and(path(format!("/{prefix}/{hop}")))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("/{prefix}/{}", hop + 1)),
            )
            .mount(server)
            .await;
    }
    mount_feed(server, &format!("/{prefix}/{redirects}"), body).await;
}
