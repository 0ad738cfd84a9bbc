//! Event sources: ordered, restartable streams of audit events after a checkpoint.
//!
//! [`JournalSource`] reads a JSON-lines journal export, one entry per line:
//!
//! ```text
//! {"sequence": 41, "entry_type": "PW", "timestamp": "2025-09-04T08:00:00Z", "syslog_event": "<86>1 2025-09-04T08:00:00Z host QAUDJRN - PW - ..."}
//! ```
//!
//! Entries with a null `syslog_event` have nothing to forward and are skipped,
//! as are entries whose type is not in the configured filter. An I/O error
//! ends the stream with one `Err`.
//!
//! A bad line (one that does not parse, or a sequence after the checkpoint
//! that goes backwards) ends the stream with one `Err` only when the stream
//! already yielded events, so the caller checkpoints them first. A bad line
//! met before anything was yielded is logged and skipped. Every cycle
//! re-reads the file from the top, so a bad line is reported at most once
//! and never pins the checkpoint.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use auditrelay_core::{AuditEvent, Checkpoint};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{io_err, SourceError};

/// Lazy stream of events. Ends early after the first `Err`.
pub type EventStream<'a> = Box<dyn Iterator<Item = Result<AuditEvent, SourceError>> + 'a>;

/// A queryable, ordered event store keyed by sequence number.
pub trait EventSource {
    /// Every event with `sequence > after` that exists right now, ascending.
    /// Zero events is an empty stream, not an error.
    fn stream_since(&self, after: Checkpoint) -> EventStream<'_>;
}

/// JSON-lines journal export on disk.
#[derive(Debug, Clone)]
pub struct JournalSource {
    path: PathBuf,
    entry_types: Vec<String>,
}

impl JournalSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entry_types: Vec::new(),
        }
    }

    /// Only yield entries whose `entry_type` is in `types` (case-insensitive).
    /// An empty list disables the filter.
    pub fn with_entry_types(mut self, types: Vec<String>) -> Self {
        self.entry_types = types;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSource for JournalSource {
    fn stream_since(&self, after: Checkpoint) -> EventStream<'_> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("journal {} does not exist yet", self.path.display());
                return Box::new(std::iter::empty());
            }
            Err(err) => return Box::new(std::iter::once(Err(io_err(&self.path, err)))),
        };

        Box::new(JournalEvents {
            source: self,
            lines: BufReader::new(file).lines(),
            after,
            previous: None,
            line_no: 0,
            yielded: false,
            finished: false,
        })
    }
}

#[derive(Debug, Deserialize)]
struct JournalLine {
    sequence: u64,
    #[serde(default)]
    syslog_event: Option<String>,
    #[serde(default)]
    entry_type: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

struct JournalEvents<'a> {
    source: &'a JournalSource,
    lines: Lines<BufReader<File>>,
    after: Checkpoint,
    previous: Option<u64>,
    line_no: usize,
    yielded: bool,
    finished: bool,
}

impl JournalEvents<'_> {
    fn fault(&mut self, err: SourceError) -> Option<Result<AuditEvent, SourceError>> {
        self.finished = true;
        Some(Err(err))
    }

    /// `Some(Err)` to end the stream, `None` to skip the line and read on.
    fn bad_line(&mut self, err: SourceError) -> Option<Result<AuditEvent, SourceError>> {
        if self.yielded {
            return self.fault(err);
        }
        tracing::warn!("skipping journal line: {err}");
        None
    }

    fn wanted(&self, entry_type: Option<&str>) -> bool {
        let filter = &self.source.entry_types;
        if filter.is_empty() {
            return true;
        }
        entry_type
            .map(|t| filter.iter().any(|f| f.eq_ignore_ascii_case(t)))
            .unwrap_or(false)
    }
}

impl Iterator for JournalEvents<'_> {
    type Item = Result<AuditEvent, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let line = match self.lines.next() {
                None => {
                    self.finished = true;
                    return None;
                }
                Some(Err(err)) => return self.fault(io_err(&self.source.path, err)),
                Some(Ok(line)) => line,
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }

            let entry: JournalLine = match serde_json::from_str(&line) {
                Ok(entry) => entry,
                Err(source) => {
                    let err = SourceError::Malformed {
                        path: self.source.path.clone(),
                        line: self.line_no,
                        source,
                    };
                    match self.bad_line(err) {
                        Some(fault) => return Some(fault),
                        None => continue,
                    }
                }
            };

            if Checkpoint(entry.sequence) <= self.after {
                continue;
            }
            if let Some(previous) = self.previous.filter(|p| entry.sequence <= *p) {
                let err = SourceError::OutOfOrder {
                    path: self.source.path.clone(),
                    line: self.line_no,
                    previous,
                    found: entry.sequence,
                };
                match self.bad_line(err) {
                    Some(fault) => return Some(fault),
                    None => continue,
                }
            }
            self.previous = Some(entry.sequence);
            let Some(payload) = entry.syslog_event.filter(|p| !p.is_empty()) else {
                continue;
            };
            if !self.wanted(entry.entry_type.as_deref()) {
                continue;
            }

            self.yielded = true;
            return Some(Ok(AuditEvent {
                sequence: Checkpoint(entry.sequence),
                payload,
                entry_type: entry.entry_type,
                recorded_at: entry.timestamp,
            }));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn journal(dir: &TempDir, lines: &[&str]) -> JournalSource {
        let path = dir.path().join("journal.jsonl");
        std::fs::write(&path, lines.join("\n")).unwrap();
        JournalSource::new(path)
    }

    fn entry(seq: u64, kind: &str) -> String {
        format!(r#"{{"sequence":{seq},"entry_type":"{kind}","syslog_event":"<86>1 - host QAUDJRN - {kind} - entry {seq}"}}"#)
    }

    fn sequences(source: &JournalSource, after: u64) -> Vec<u64> {
        source
            .stream_since(Checkpoint(after))
            .map(|r| r.expect("event").sequence.0)
            .collect()
    }

    #[test]
    fn missing_journal_is_an_empty_stream() {
        let dir = TempDir::new().unwrap();
        let source = JournalSource::new(dir.path().join("absent.jsonl"));
        assert_eq!(source.stream_since(Checkpoint::ZERO).count(), 0);
    }

    #[test]
    fn yields_only_entries_after_checkpoint_in_order() {
        let dir = TempDir::new().unwrap();
        let lines: Vec<String> = (1..=5).map(|n| entry(n, "PW")).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let source = journal(&dir, &refs);

        assert_eq!(sequences(&source, 0), vec![1, 2, 3, 4, 5]);
        assert_eq!(sequences(&source, 3), vec![4, 5]);
        assert!(sequences(&source, 5).is_empty());
    }

    #[test]
    fn gaps_in_sequence_are_fine() {
        let dir = TempDir::new().unwrap();
        let (a, b, c) = (entry(10, "PW"), entry(20, "PW"), entry(35, "PW"));
        let source = journal(&dir, &[&a, "", &b, &c]);
        assert_eq!(sequences(&source, 12), vec![20, 35]);
    }

    #[test]
    fn null_syslog_event_is_skipped() {
        let dir = TempDir::new().unwrap();
        let (a, c) = (entry(1, "PW"), entry(3, "PW"));
        let source = journal(&dir, &[&a, r#"{"sequence":2,"syslog_event":null}"#, &c]);
        assert_eq!(sequences(&source, 0), vec![1, 3]);
    }

    #[test]
    fn entry_type_filter_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let (a, b, c) = (entry(1, "PW"), entry(2, "AF"), entry(3, "CA"));
        let source = journal(&dir, &[&a, &b, &c])
            .with_entry_types(vec!["pw".to_string(), "CA".to_string()]);
        assert_eq!(sequences(&source, 0), vec![1, 3]);
    }

    #[test]
    fn malformed_line_ends_stream_after_partial_results() {
        let dir = TempDir::new().unwrap();
        let (a, b, d) = (entry(1, "PW"), entry(2, "PW"), entry(4, "PW"));
        let source = journal(&dir, &[&a, &b, "{not json", &d]);

        let items: Vec<_> = source.stream_since(Checkpoint::ZERO).collect();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].as_ref().unwrap().sequence, Checkpoint(2));
        match &items[2] {
            Err(SourceError::Malformed { line, .. }) => assert_eq!(*line, 3),
            other => panic!("expected malformed fault, got {other:?}"),
        }
    }

    #[test]
    fn sequence_going_backwards_is_a_fault() {
        let dir = TempDir::new().unwrap();
        let (a, b, c) = (entry(5, "PW"), entry(6, "PW"), entry(6, "PW"));
        let source = journal(&dir, &[&a, &b, &c]);

        let items: Vec<_> = source.stream_since(Checkpoint::ZERO).collect();
        assert!(matches!(
            items.last(),
            Some(Err(SourceError::OutOfOrder {
                previous: 6,
                found: 6,
                ..
            }))
        ));
    }

    #[test]
    fn bad_line_before_any_event_is_skipped() {
        let dir = TempDir::new().unwrap();
        let (b, c) = (entry(1, "PW"), entry(2, "PW"));
        let source = journal(&dir, &["{truncated", &b, &c]);
        assert_eq!(sequences(&source, 0), vec![1, 2]);
    }

    #[test]
    fn malformed_line_behind_checkpoint_no_longer_blocks() {
        let dir = TempDir::new().unwrap();
        let (a, b, d) = (entry(1, "PW"), entry(2, "PW"), entry(4, "PW"));
        let source = journal(&dir, &[&a, &b, "{not json", &d]);

        // First pass reported the fault after 2; the next pass resumes at 2.
        assert_eq!(sequences(&source, 2), vec![4]);
    }

    #[test]
    fn ordering_is_only_checked_after_checkpoint() {
        let dir = TempDir::new().unwrap();
        let (a, b, c, d) = (entry(5, "PW"), entry(6, "PW"), entry(6, "PW"), entry(7, "PW"));
        let source = journal(&dir, &[&a, &b, &c, &d]);
        assert_eq!(sequences(&source, 6), vec![7]);
    }

    #[test]
    fn backwards_entry_behind_filtered_one_is_skipped_once_reported() {
        let dir = TempDir::new().unwrap();
        let (a, b, c, d) = (entry(1, "PW"), entry(9, "AF"), entry(5, "PW"), entry(10, "PW"));
        let source = journal(&dir, &[&a, &b, &c, &d]).with_entry_types(vec!["PW".to_string()]);

        let first: Vec<_> = source.stream_since(Checkpoint::ZERO).collect();
        assert_eq!(first.len(), 2);
        assert!(matches!(first[1], Err(SourceError::OutOfOrder { found: 5, .. })));

        assert_eq!(sequences(&source, 1), vec![10]);
    }

    #[test]
    fn restarting_from_same_checkpoint_sees_new_entries() {
        let dir = TempDir::new().unwrap();
        let (a, b) = (entry(1, "PW"), entry(2, "PW"));
        let source = journal(&dir, &[&a]);
        assert_eq!(sequences(&source, 0), vec![1]);

        std::fs::write(source.path(), format!("{a}\n{b}\n")).unwrap();
        assert_eq!(sequences(&source, 0), vec![1, 2]);
    }

    #[test]
    fn timestamp_and_type_are_carried_through() {
        let dir = TempDir::new().unwrap();
        let source = journal(
            &dir,
            &[r#"{"sequence":9,"entry_type":"AF","timestamp":"2025-09-04T08:00:00Z","syslog_event":"<84>1 denied"}"#],
        );
        let event = source
            .stream_since(Checkpoint::ZERO)
            .next()
            .expect("one event")
            .expect("ok");
        assert_eq!(event.payload, "<84>1 denied");
        assert_eq!(event.entry_type.as_deref(), Some("AF"));
        assert!(event.recorded_at.is_some());
    }
}
