//! # auditrelay-forward
//!
//! Checkpointed forwarding of audit journal entries to a UDP syslog collector.
//!
//! Call [`run_cycle`] for one bounded pass: load the checkpoint, stream every
//! entry after it from an [`EventSource`], send each one through a
//! [`DatagramSink`], then persist the highest sequence seen.

pub mod cycle;
pub mod error;
pub mod source;
pub mod syslog;

pub use cycle::{run_cycle, CycleReport};
pub use error::{ForwardError, SourceError};
pub use source::{EventSource, EventStream, JournalSource};
pub use syslog::{DatagramSink, SyslogForwarder, SyslogHandle};
