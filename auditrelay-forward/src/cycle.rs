//! One forwarding cycle.
//!
//! ```text
//! INIT ──open fails──▶ ABORTED   (Err(TransportInit); checkpoint untouched)
//!  │
//!  ▼
//! STREAMING ──exhausted or source fault──▶ FINALIZING ──▶ DONE (Ok(CycleReport))
//! ```
//!
//! Every event after the starting checkpoint gets exactly one send attempt.
//! The high-water mark follows the events *seen*, not the sends that
//! succeeded, so a dead collector loses messages instead of stalling the
//! journal. A source fault keeps the progress made before it.

use auditrelay_core::{Checkpoint, CheckpointStore};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ForwardError;
use crate::source::EventSource;
use crate::syslog::DatagramSink;

/// Outcome of a cycle that got past INIT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Checkpoint loaded at INIT.
    pub start: Checkpoint,
    /// Highest sequence seen; equals `start` when nothing was read.
    pub end: Checkpoint,
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Set when the source faulted mid-stream.
    pub source_fault: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl CycleReport {
    /// Whether this cycle moved the persisted checkpoint.
    pub fn advanced(&self) -> bool {
        self.end > self.start
    }
}

/// Run one cycle: load the checkpoint, open the transport with `open`,
/// forward every event after the checkpoint, then close the transport and
/// persist the new high-water mark if it moved.
///
/// # Errors
/// Only [`ForwardError::TransportInit`], returned by `open`. Nothing has been
/// read from `source` in that case.
pub fn run_cycle<S, F>(
    checkpoints: &dyn CheckpointStore,
    source: &dyn EventSource,
    open: F,
) -> Result<CycleReport, ForwardError>
where
    S: DatagramSink,
    F: FnOnce() -> Result<S, ForwardError>,
{
    let start = checkpoints.load();
    let mut sink = open()?;
    tracing::debug!("checking for journal entries after {start}");

    let mut end = start;
    let mut attempted = 0usize;
    let mut delivered = 0usize;
    let mut failed = 0usize;
    let mut source_fault = None;

    for item in source.stream_since(start) {
        let event = match item {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!("event source fault after {end}, keeping partial progress: {err}");
                source_fault = Some(err.to_string());
                break;
            }
        };

        attempted += 1;
        match sink.send(&event.payload) {
            Ok(()) => delivered += 1,
            Err(err) => {
                failed += 1;
                tracing::warn!("send of entry {} failed: {err}", event.sequence);
            }
        }
        end = end.max(event.sequence);
    }

    sink.close();

    if end > start {
        checkpoints.save(end);
        tracing::info!(
            "processed {attempted} entries ({delivered} sent, {failed} failed), new checkpoint {end}"
        );
    } else if source_fault.is_none() {
        tracing::info!("no new journal entries found in this cycle");
    }

    Ok(CycleReport {
        start,
        end,
        attempted,
        delivered,
        failed,
        source_fault,
        finished_at: Utc::now(),
    })
}
