//! Conditional feed fetching
//!
//! One [`FeedFetcher::fetch`] call is one attempt: redirects are followed by
//! hand so every hop can carry its own conditional headers, and the whole chain
//! (body read included) runs under a single wall-clock timeout. Retrying is the
//! caller's business, see [`crate::retry`].

mod validators;

pub use validators::{ValidatorCache, Validators};

use crate::config::FetchConfig;
use crate::error::{FetchError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{
    ACCEPT, ETAG, HeaderMap, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, LOCATION,
};
use std::time::Duration;
use url::Url;

/// A feed body that was actually transferred
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedFeed {
    /// Raw payload
    pub body: String,
    /// URL that produced the body, after redirects
    pub final_url: String,
    /// Validators sent along with the body
    pub validators: Validators,
}

/// Result of a successful fetch attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The server sent a body
    Fetched(FetchedFeed),
    /// The server answered 304 for a conditional request
    NotModified {
        /// URL that answered 304
        url: String,
    },
}

/// Downloads one feed
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Perform one fetch attempt for `url`
    ///
    /// Conditional headers are taken from `validators` for every hop that has
    /// an entry.
    async fn fetch(
        &self,
        url: &str,
        validators: &ValidatorCache,
    ) -> std::result::Result<FetchOutcome, FetchError>;
}

/// HTTP fetcher with manual redirects and conditional requests
#[derive(Clone, Debug)]
pub struct ConditionalFetcher {
    client: reqwest::Client,
    accept: String,
    timeout: Duration,
    max_redirects: u32,
}

impl ConditionalFetcher {
    /// Build a fetcher from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            accept: config.accept.clone(),
            timeout: config.timeout,
            max_redirects: config.max_redirects,
        })
    }

    async fn follow(
        &self,
        url: &str,
        validators: &ValidatorCache,
    ) -> std::result::Result<FetchOutcome, FetchError> {
        let mut current = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let mut hops = 0u32;

        loop {
            let mut request = self
                .client
                .get(current.clone())
                .header(ACCEPT, self.accept.as_str());
            if let Some(cached) = validators.get(current.as_str()) {
                if let Some(etag) = &cached.etag {
                    request = request.header(IF_NONE_MATCH, etag.as_str());
                }
                if let Some(last_modified) = &cached.last_modified {
                    request = request.header(IF_MODIFIED_SINCE, last_modified.as_str());
                }
            }

            let response = request.send().await.map_err(|e| FetchError::Network {
                url: current.to_string(),
                reason: e.to_string(),
            })?;
            let status = response.status();

            if status == StatusCode::NOT_MODIFIED {
                tracing::debug!(url = %current, "feed not modified");
                return Ok(FetchOutcome::NotModified {
                    url: current.to_string(),
                });
            }

            if status.is_redirection()
                && let Some(location) = response.headers().get(LOCATION)
            {
                if hops >= self.max_redirects {
                    return Err(FetchError::TooManyRedirects {
                        url: url.to_string(),
                        max: self.max_redirects,
                    });
                }
                let location = location.to_str().map_err(|e| FetchError::InvalidUrl {
                    url: format!("{location:?}"),
                    reason: e.to_string(),
                })?;
                let next = current.join(location).map_err(|e| FetchError::InvalidUrl {
                    url: location.to_string(),
                    reason: e.to_string(),
                })?;
                hops += 1;
                tracing::debug!(from = %current, to = %next, hop = hops, "following redirect");
                current = next;
                continue;
            }

            if status.as_u16() >= 300 {
                return Err(FetchError::BadStatus {
                    url: current.to_string(),
                    status: status.as_u16(),
                });
            }

            let captured = capture_validators(response.headers());
            let body = response.text().await.map_err(|e| FetchError::Network {
                url: current.to_string(),
                reason: e.to_string(),
            })?;

            return Ok(FetchOutcome::Fetched(FetchedFeed {
                body,
                final_url: current.to_string(),
                validators: captured,
            }));
        }
    }
}

#[async_trait]
impl FeedFetcher for ConditionalFetcher {
    async fn fetch(
        &self,
        url: &str,
        validators: &ValidatorCache,
    ) -> std::result::Result<FetchOutcome, FetchError> {
        match tokio::time::timeout(self.timeout, self.follow(url, validators)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }),
        }
    }
}

fn capture_validators(headers: &HeaderMap) -> Validators {
    let read = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    Validators {
        etag: read(ETAG),
        last_modified: read(LAST_MODIFIED),
    }
}

#[cfg(test)]
mod tests;
