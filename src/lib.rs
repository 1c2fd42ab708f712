//! # feedsnap
//!
//! Podcast feed ingestion and aggregation with crash-safe publishing.
//!
//! ## Design Philosophy
//!
//! feedsnap is designed to be:
//! - **Partial-failure tolerant** - One broken feed never costs the others their place
//! - **Deterministic** - Output order depends on feed content and configuration, never on network timing
//! - **Crash-safe** - The published directory always holds a complete snapshot
//! - **Pluggable** - Parsing, social data, cover storage and snapshot writes sit behind traits
//!
//! ## Quick Start
//!
//! ```no_run
//! use feedsnap::{Config, Harvester, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("feedsnap.json")?;
//!     let harvester = Harvester::with_defaults(config)?;
//!
//!     let snapshot = run_with_shutdown(&harvester).await?;
//!     println!("{} channels, {} errors", snapshot.channels.len(), snapshot.errors.len());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Aggregation engine
pub mod aggregate;
/// Configuration types
pub mod config;
/// Cover image downloads
pub mod covers;
/// Error types
pub mod error;
/// Feed document model and parser
pub mod feed;
/// Conditional feed fetching
pub mod fetcher;
/// Run orchestration
pub mod harvest;
/// Bounded retry for feed fetches
pub mod retry;
/// Chunked batch scheduling
pub mod scheduler;
/// Snapshot persistence
pub mod snapshot;
/// Social-data enrichment
pub mod social;
/// Output directory lifecycle
pub mod staging;
/// Core data types
pub mod types;

// Re-export commonly used types
pub use config::{Config, OutputLayout};
pub use error::{Error, FeedError, FetchError, Result, SourceError, StagingError};
pub use feed::{FeedDocument, FeedParser, RssFeedParser};
pub use fetcher::{ConditionalFetcher, FeedFetcher, FetchOutcome, ValidatorCache, Validators};
pub use harvest::Harvester;
pub use scheduler::{BatchReport, BatchScheduler};
pub use staging::{StagingState, StagingTransaction};
pub use types::{
    Episode, EpisodeWindowEntry, FeedRecord, FeedSource, PendingError, Snapshot, SourceList,
};

/// Run a harvest that rolls back when a termination signal arrives.
///
/// - **Unix:** listens for SIGTERM and SIGINT. Handlers are installed before
///   the output directory is touched, so a signal during staging is not lost.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// A signal during the run restores the previous output and yields
/// [`Error::Interrupted`].
///
/// # Example
///
/// ```no_run
/// use feedsnap::{Config, Harvester, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let harvester = Harvester::with_defaults(Config::default())?;
///     run_with_shutdown(&harvester).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(harvester: &Harvester) -> Result<Snapshot> {
    let signal = termination_signal();
    harvester.run_until(signal).await
}

/// Install termination handlers now and resolve on the first signal
///
/// If no handler can be installed the returned future never resolves and the
/// run is left to finish on its own.
#[cfg(unix)]
fn termination_signal() -> impl std::future::Future<Output = ()> {
    use tokio::signal::unix::{Signal, SignalKind, signal};

    let mut listeners: Vec<(&'static str, Signal)> = [
        ("SIGTERM", SignalKind::terminate()),
        ("SIGINT", SignalKind::interrupt()),
    ]
    .into_iter()
    .filter_map(|(name, kind)| match signal(kind) {
        Ok(listener) => Some((name, listener)),
        Err(e) => {
            tracing::warn!(signal = name, error = %e, "cannot listen for signal");
            None
        }
    })
    .collect();

    async move {
        if listeners.is_empty() {
            tracing::error!("no termination handlers installed, harvest cannot be interrupted");
            return std::future::pending().await;
        }
        let waits = listeners.iter_mut().map(|(name, listener)| {
            Box::pin(async move {
                listener.recv().await;
                *name
            })
        });
        let (name, _, _) = futures::future::select_all(waits).await;
        tracing::warn!(signal = name, "termination requested, rolling back harvest");
    }
}

#[cfg(not(unix))]
fn termination_signal() -> impl std::future::Future<Output = ()> {
    async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::warn!("Ctrl+C received, rolling back harvest"),
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for Ctrl+C, harvest cannot be interrupted");
                std::future::pending::<()>().await;
            }
        }
    }
}
