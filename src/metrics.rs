//! Query metrics.
//!
//! [`MetricsRecorder`] turns [`PipelineEvent`]s into metric datapoints,
//! buffers them and hands them to a [`MetricsSink`] in batches of
//! `[metrics].batch_size` (default 20). The buffer is also flushed when the
//! recorder is dropped.
//!
//! | Event | Metrics |
//! |-------|---------|
//! | documents retrieved | `DocumentsRetrieved` (Count), `RetrievalLatency` (Seconds) |
//! | model invoked | `LLMInvocationTime` (Seconds) |
//! | query processed | `QueriesProcessed` (Count), `QueryLatency` (Seconds) |
//! | query failed | `QueryErrors` (Count, `ErrorType` dimension) |
//!
//! Every datapoint carries an `Environment` dimension.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

use docsage_core::observe::{PipelineEvent, PipelineObserver};

use crate::config::MetricsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Count,
    Seconds,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Count => f.write_str("Count"),
            Unit::Seconds => f.write_str("Seconds"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricDatum {
    pub name: &'static str,
    pub value: f64,
    pub unit: Unit,
    pub dimensions: Vec<(String, String)>,
    pub timestamp: DateTime<Utc>,
}

/// Destination for flushed batches.
pub trait MetricsSink: Send + Sync {
    fn publish(&self, namespace: &str, batch: &[MetricDatum]) -> Result<()>;
}

/// Emits each datapoint as a structured `tracing` event on target
/// `docsage::metrics`, for log-based metric extraction.
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn publish(&self, namespace: &str, batch: &[MetricDatum]) -> Result<()> {
        for datum in batch {
            let dimensions = datum
                .dimensions
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(",");
            info!(
                target: "docsage::metrics",
                namespace,
                metric = datum.name,
                value = datum.value,
                unit = %datum.unit,
                dimensions = %dimensions,
                timestamp = %datum.timestamp.to_rfc3339(),
                "metric"
            );
        }
        Ok(())
    }
}

pub struct MetricsRecorder {
    namespace: String,
    environment: String,
    batch_size: usize,
    batch: Mutex<Vec<MetricDatum>>,
    sink: Arc<dyn MetricsSink>,
}

impl MetricsRecorder {
    pub fn new(config: &MetricsConfig, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            namespace: config.namespace.clone(),
            environment: config.environment.clone(),
            batch_size: config.batch_size.max(1),
            batch: Mutex::new(Vec::new()),
            sink,
        }
    }

    /// Buffers one datapoint, flushing when the batch is full.
    pub fn put_metric(
        &self,
        name: &'static str,
        value: f64,
        unit: Unit,
        dimensions: &[(&str, &str)],
    ) -> Result<()> {
        let mut all_dimensions: Vec<(String, String)> = dimensions
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        all_dimensions.push(("Environment".to_string(), self.environment.clone()));

        let full = {
            let mut batch = self.batch.lock().unwrap_or_else(|e| e.into_inner());
            batch.push(MetricDatum {
                name,
                value,
                unit,
                dimensions: all_dimensions,
                timestamp: Utc::now(),
            });
            batch.len() >= self.batch_size
        };
        if full {
            self.flush()?;
        }
        Ok(())
    }

    /// Publishes and clears the buffer. A failed batch is dropped.
    pub fn flush(&self) -> Result<()> {
        let batch = std::mem::take(&mut *self.batch.lock().unwrap_or_else(|e| e.into_inner()));
        if batch.is_empty() {
            return Ok(());
        }
        self.sink.publish(&self.namespace, &batch)
    }

    pub fn pending(&self) -> usize {
        self.batch.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl PipelineObserver for MetricsRecorder {
    fn on_event(&self, event: &PipelineEvent) -> Result<()> {
        match *event {
            PipelineEvent::DocumentsRetrieved { count, latency } => {
                self.put_metric("DocumentsRetrieved", count as f64, Unit::Count, &[])?;
                self.put_metric(
                    "RetrievalLatency",
                    latency.as_secs_f64(),
                    Unit::Seconds,
                    &[],
                )
            }
            PipelineEvent::ModelInvoked { latency } => self.put_metric(
                "LLMInvocationTime",
                latency.as_secs_f64(),
                Unit::Seconds,
                &[],
            ),
            PipelineEvent::QueryProcessed { latency } => {
                self.put_metric("QueriesProcessed", 1.0, Unit::Count, &[])?;
                self.put_metric("QueryLatency", latency.as_secs_f64(), Unit::Seconds, &[])
            }
            PipelineEvent::QueryFailed { code, .. } => self.put_metric(
                "QueryErrors",
                1.0,
                Unit::Count,
                &[("ErrorType", code.as_str())],
            ),
        }
    }
}

impl Drop for MetricsRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!(error = %e, "failed to flush metrics on shutdown");
        }
    }
}
