//! Fire-and-forget observation of pipeline progress.
//!
//! Observers receive [`PipelineEvent`]s as a request moves through the
//! pipeline. Their errors are logged at `warn` and otherwise ignored: an
//! observer can never change the outcome of a request.

use std::time::Duration;

use anyhow::Result;
use tracing::warn;

use crate::error::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PipelineEvent {
    /// Similarity search finished.
    DocumentsRetrieved { count: usize, latency: Duration },
    /// The generative model answered.
    ModelInvoked { latency: Duration },
    /// A request finished successfully; `latency` is end to end.
    QueryProcessed { latency: Duration },
    QueryFailed { code: ErrorCode, latency: Duration },
}

pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent) -> Result<()>;
}

pub struct NoopObserver;

impl PipelineObserver for NoopObserver {
    fn on_event(&self, _event: &PipelineEvent) -> Result<()> {
        Ok(())
    }
}

/// Delivers `event`, swallowing observer failures.
pub fn notify(observer: &dyn PipelineObserver, event: PipelineEvent) {
    if let Err(e) = observer.on_event(&event) {
        warn!(?event, error = %e, "pipeline observer failed");
    }
}
