// sink.rs — Append-only JSONL audit sink.
//
// One mutex guards the writer, the next sequence number, and the last
// line's hash together, so sequence assignment is atomic with the write:
// no two records can share a number and no number can be skipped, no
// matter how many threads record concurrently.
//
// On open the sink reads the existing file's last record and continues
// from `last.sequence + 1` — the file itself is the durable counter, so
// a restart neither reuses nor skips numbers.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use sha2::{Digest, Sha256};

use crate::error::AuditError;
use crate::record::AuditRecord;

/// The first sequence number of a fresh log.
const FIRST_SEQUENCE: u64 = 1;

struct SinkState {
    writer: BufWriter<File>,
    next_sequence: u64,
    last_hash: Option<String>,
}

/// A thread-safe, append-only audit sink backed by a JSONL file.
pub struct AuditSink {
    path: PathBuf,
    inner: Mutex<SinkState>,
}

impl AuditSink {
    /// Open (or create) the audit log at the given path, recovering the
    /// sequence counter and hash chain from any existing content.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();

        let (next_sequence, last_hash) = if path.exists() {
            match Self::read_tail(&path)? {
                Some((last_seq, hash)) => (last_seq + 1, Some(hash)),
                None => (FIRST_SEQUENCE, None),
            }
        } else {
            (FIRST_SEQUENCE, None)
        };

        // Append mode — existing records are never touched.
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            inner: Mutex::new(SinkState {
                writer: BufWriter::new(file),
                next_sequence,
                last_hash,
            }),
        })
    }

    /// Append a record, assigning its sequence number and chain link.
    ///
    /// Returns the assigned sequence. Flushes before returning, so a
    /// successful call means the record is handed to the OS — callers
    /// must not act on a decision until this has succeeded.
    pub fn record(&self, record: &mut AuditRecord) -> Result<u64, AuditError> {
        let mut state = self.lock();

        record.sequence = state.next_sequence;
        record.previous_hash = state.last_hash.clone();

        let json = serde_json::to_string(record)?;
        writeln!(state.writer, "{}", json)?;
        state.writer.flush()?;

        // Only advance the counter once the write has succeeded, so a
        // failed append leaves no gap behind it.
        state.next_sequence += 1;
        state.last_hash = Some(hash_line(&json));

        Ok(record.sequence)
    }

    /// The path of the backing log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record from a log file, oldest first.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<AuditRecord>, AuditError> {
        let file = File::open(path.as_ref()).map_err(|source| AuditError::OpenFailed {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }

    /// Verify a log file end to end: sequence numbers must be contiguous
    /// and every record's `previous_hash` must match the hash of the
    /// preceding line. Returns the number of records verified.
    pub fn verify(path: impl AsRef<Path>) -> Result<u64, AuditError> {
        let file = File::open(path.as_ref()).map_err(|source| AuditError::OpenFailed {
            path: path.as_ref().to_path_buf(),
            source,
        })?;

        let mut count = 0u64;
        let mut expected_seq: Option<u64> = None;
        let mut prev_hash: Option<String> = None;

        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let line_num = idx + 1;
            let record: AuditRecord = serde_json::from_str(&line)?;

            if let Some(expected) = expected_seq {
                if record.sequence != expected {
                    return Err(AuditError::SequenceGap {
                        line: line_num,
                        expected,
                        actual: record.sequence,
                    });
                }
            }
            // Hash the raw line, not a re-serialization — field order
            // must not affect the chain.
            if record.previous_hash != prev_hash {
                return Err(AuditError::ChainBroken { line: line_num });
            }

            expected_seq = Some(record.sequence + 1);
            prev_hash = Some(hash_line(&line));
            count += 1;
        }

        Ok(count)
    }

    /// Check that a set of records covers a contiguous range of M
    /// sequence numbers with no duplicates. Utility for completeness
    /// auditing (M concurrent calls must yield M distinct numbers).
    pub fn sequences_are_contiguous(records: &[AuditRecord]) -> bool {
        if records.is_empty() {
            return true;
        }
        let sequences: BTreeSet<u64> = records.iter().map(|r| r.sequence).collect();
        if sequences.len() != records.len() {
            return false; // duplicate
        }
        match (sequences.iter().next(), sequences.iter().next_back()) {
            (Some(first), Some(last)) => last - first + 1 == records.len() as u64,
            _ => true,
        }
    }

    /// Read the last record of an existing file: (sequence, line hash).
    fn read_tail(path: &Path) -> Result<Option<(u64, String)>, AuditError> {
        let file = File::open(path).map_err(|source| AuditError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let mut last_line: Option<String> = None;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if !line.trim().is_empty() {
                last_line = Some(line);
            }
        }
        match last_line {
            Some(line) => {
                let record: AuditRecord = serde_json::from_str(&line)?;
                Ok(Some((record.sequence, hash_line(&line))))
            }
            None => Ok(None),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SinkState> {
        // A poisoned lock means a panic elsewhere, not a corrupt file;
        // the writer and counters are still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// SHA-256 of a JSON line, lowercase hex.
fn hash_line(line: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(line.as_bytes());
    format!("{:x}", hasher.finalize())
}
