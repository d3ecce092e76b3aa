//! Cross-process transport for simulation workers.
//!
//! Everything here is designed to live in a named POSIX shared-memory
//! segment and to be used concurrently from several processes: a directory
//! of named structures ([`segment`]), two message queue variants
//! ([`queue`]), per-worker response mailboxes ([`mailbox`]) and a readiness
//! barrier ([`control`]). The lock and wait primitives underneath are a spin
//! lock implementing `lock_api::RawMutex` and futex-based waits.

pub mod condvar;
pub mod control;
pub mod error;
pub mod futex;
pub mod mailbox;
pub mod queue;
pub mod segment;
pub mod spin;

pub use control::{CheckIn, ControlBlock, Countdown, Phases, WaitOutcome};
pub use error::{Result, TransportError};
pub use mailbox::ResponseCell;
pub use queue::{BlockingHeader, BlockingQueue, LockFreeQueue, MessageQueue, RingHeader, Slot};
pub use segment::{Attachment, OwnedSegment, Segment};
