//! Error types for the shared-memory transport.

use std::io;

use thiserror::Error;

/// Errors raised while creating, attaching to, or using a segment.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Exclusive creation found an existing segment with this name.
    #[error("shared memory segment `{0}` already exists")]
    SegmentExists(String),
    /// No segment with this name exists.
    #[error("shared memory segment `{0}` does not exist")]
    SegmentMissing(String),
    /// The segment directory has no structure with this name.
    #[error("structure `{0}` not found in segment")]
    StructureMissing(String),
    /// A structure exists but its recorded size does not match the type it
    /// is being viewed as.
    #[error("structure `{name}` holds {found} bytes, expected {expected}")]
    LayoutMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    /// Constructing a structure would run past the end of the segment.
    #[error("segment out of space: {requested} bytes requested, {available} available")]
    OutOfSpace { requested: usize, available: usize },
    /// Every directory entry is in use.
    #[error("segment directory is full ({0} entries)")]
    DirectoryFull(usize),
    /// A structure name is empty or does not fit a directory entry.
    #[error("invalid structure name `{0}`")]
    NameTooLong(String),
    /// Queue capacities must be powers of two and at least 2.
    #[error("invalid queue capacity {0}: must be a power of two >= 2")]
    InvalidCapacity(usize),
    /// The worker's mailbox still holds an unread move.
    #[error("mailbox of worker {0} is still full")]
    MailboxBusy(usize),
    /// A worker id outside `0..process_count`.
    #[error("worker id {id} out of range (process count {count})")]
    InvalidWorker { id: usize, count: usize },
    /// An OS call failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience type alias for Results with TransportError.
pub type Result<T> = std::result::Result<T, TransportError>;
