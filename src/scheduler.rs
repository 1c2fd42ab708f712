//! Chunked batch scheduling of per-source pipelines
//!
//! Sources are split into consecutive chunks of at most `width`. Every pipeline
//! of a chunk is created up front and the chunk is awaited as a whole with
//! `join_all`; the next chunk starts only once all of them are terminal. No task
//! is spawned, so at most `width` fetches are ever in flight.

use crate::error::SourceError;
use crate::types::{FeedSource, PendingError};
use futures::FutureExt;
use futures::future::join_all;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Outcome of scheduling every source once
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Number of chunks executed
    pub chunks: usize,
    /// Pipelines that completed successfully
    pub succeeded: usize,
    /// One entry per failed or panicked pipeline, in input order
    pub failures: Vec<PendingError>,
}

/// Drives pipelines chunk by chunk
#[derive(Clone, Copy, Debug)]
pub struct BatchScheduler {
    width: usize,
}

impl BatchScheduler {
    /// Create a scheduler running at most `width` pipelines at once
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
        }
    }

    /// Maximum number of concurrent pipelines
    pub fn width(&self) -> usize {
        self.width
    }

    /// Run `pipeline` once for every source
    ///
    /// The pipeline receives the source's input index. A failing or panicking
    /// pipeline becomes a [`PendingError`]; its siblings are unaffected.
    pub async fn run<F, Fut>(&self, sources: &[FeedSource], pipeline: F) -> BatchReport
    where
        F: Fn(usize, FeedSource) -> Fut,
        Fut: Future<Output = Result<(), SourceError>>,
    {
        let total_chunks = sources.len().div_ceil(self.width);
        let mut report = BatchReport::default();

        for (chunk_index, chunk) in sources.chunks(self.width).enumerate() {
            let base = chunk_index * self.width;
            let pipelines: Vec<_> = chunk
                .iter()
                .enumerate()
                .map(|(offset, source)| {
                    let key = source.key.clone();
                    let run = pipeline(base + offset, source.clone());
                    async move { (key, AssertUnwindSafe(run).catch_unwind().await) }
                })
                .collect();

            for (key, outcome) in join_all(pipelines).await {
                match outcome {
                    Ok(Ok(())) => report.succeeded += 1,
                    Ok(Err(e)) => {
                        tracing::warn!(
                            key = %key,
                            label = e.label(),
                            error = %e,
                            "source failed"
                        );
                        report.failures.push(PendingError::from_source_error(&key, &e));
                    }
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        tracing::error!(key = %key, panic = %message, "source pipeline panicked");
                        report.failures.push(PendingError::panicked(&key, message));
                    }
                }
            }

            report.chunks += 1;
            tracing::info!(
                chunk = chunk_index + 1,
                of = total_chunks,
                sources = chunk.len(),
                "chunk finished"
            );
        }

        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "pipeline panicked".to_string()
    }
}
