//! Layout of the simulation segment: structure names, construction by the
//! manager and name resolution by every other process.

use std::time::Duration;

use clap::ValueEnum;
use game_core::constants::ROW_COUNT;
use game_core::lookup_table::{self, RowEntry, RowTable};
use game_core::message::Message;
use shm_transport::queue::capacity_for;
use shm_transport::segment::{DIRECTORY_SIZE, MIN_SEGMENT_SIZE, footprint};
use shm_transport::{
    BlockingHeader, BlockingQueue, ControlBlock, LockFreeQueue, MessageQueue, OwnedSegment,
    ResponseCell, Result, RingHeader, Segment, Slot, TransportError,
};
use tracing::info;

/// Default segment name.
pub const DEFAULT_SHM_NAME: &str = "proj2048shm";

pub const CONTROL_BLOCK: &str = "control_block";
pub const MESSAGE_BUFFER: &str = "message_buffer";
pub const MESSAGE_QUEUE: &str = "message_queue";
pub const MESSAGE_QUEUE_BLOCKING: &str = "message_queue_blocking";
pub const RESPONSE_CELLS: &str = "response_cells";
pub const MOVE_LOOKUP_TABLE: &str = "move_lookup_table";

/// Which queue variant the manager places in the segment.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum QueueKind {
    /// Lock-free multi-producer ring.
    #[default]
    LockFree,
    /// Mutex and condition variable ring.
    Blocking,
}

impl QueueKind {
    /// Directory name of the queue header for this variant.
    pub fn structure_name(self) -> &'static str {
        match self {
            QueueKind::LockFree => MESSAGE_QUEUE,
            QueueKind::Blocking => MESSAGE_QUEUE_BLOCKING,
        }
    }
}

/// Bytes needed for every structure of a segment serving `process_count`
/// workers, never less than [`MIN_SEGMENT_SIZE`].
pub fn segment_size(process_count: u8, kind: QueueKind) -> usize {
    let capacity = capacity_for(process_count as usize);
    let mut used = DIRECTORY_SIZE;
    used = footprint::<ControlBlock>(used, 1);
    used = footprint::<Slot<Message>>(used, capacity);
    used = match kind {
        QueueKind::LockFree => footprint::<RingHeader>(used, 1),
        QueueKind::Blocking => footprint::<BlockingHeader>(used, 1),
    };
    used = footprint::<ResponseCell>(used, process_count as usize);
    used = footprint::<RowEntry>(used, ROW_COUNT);
    used.max(MIN_SEGMENT_SIZE)
}

/// Constructs every structure in a freshly created segment.
pub fn populate(segment: &mut OwnedSegment, process_count: u8, kind: QueueKind) -> Result<()> {
    let capacity = capacity_for(process_count as usize);

    segment.construct(CONTROL_BLOCK, 1, |_| ControlBlock::new(process_count as u32))?;
    segment.construct(MESSAGE_BUFFER, capacity, |_| Slot::<Message>::empty())?;
    match kind {
        QueueKind::LockFree => {
            let header = RingHeader::new(capacity)?;
            segment.construct_with(MESSAGE_QUEUE, 1, |h: &mut [RingHeader]| h[0] = header)?;
        }
        QueueKind::Blocking => {
            let header = BlockingHeader::new(capacity)?;
            segment.construct_with(MESSAGE_QUEUE_BLOCKING, 1, |h: &mut [BlockingHeader]| {
                h[0] = header
            })?;
        }
    }
    segment.construct(RESPONSE_CELLS, process_count as usize, |_| ResponseCell::new())?;
    segment.construct_with::<RowEntry>(MOVE_LOOKUP_TABLE, ROW_COUNT, lookup_table::fill)?;

    info!(
        process_count,
        capacity,
        queue = ?kind,
        "initialized shared memory structures"
    );
    Ok(())
}

/// Either queue variant, resolved from the segment directory.
pub enum TransportQueue<'a> {
    LockFree(LockFreeQueue<'a, Message>),
    Blocking(BlockingQueue<'a, Message>),
}

impl TransportQueue<'_> {
    pub fn kind(&self) -> QueueKind {
        match self {
            TransportQueue::LockFree(_) => QueueKind::LockFree,
            TransportQueue::Blocking(_) => QueueKind::Blocking,
        }
    }
}

impl MessageQueue<Message> for TransportQueue<'_> {
    fn try_push(&self, item: Message) -> bool {
        match self {
            TransportQueue::LockFree(q) => q.try_push(item),
            TransportQueue::Blocking(q) => q.try_push(item),
        }
    }

    fn push_unless(&self, item: Message, cancelled: &dyn Fn() -> bool) -> bool {
        match self {
            TransportQueue::LockFree(q) => q.push_unless(item, cancelled),
            TransportQueue::Blocking(q) => q.push_unless(item, cancelled),
        }
    }

    fn pop(&self) -> Option<Message> {
        match self {
            TransportQueue::LockFree(q) => q.pop(),
            TransportQueue::Blocking(q) => q.pop(),
        }
    }

    fn pop_all(&self) -> Vec<Message> {
        match self {
            TransportQueue::LockFree(q) => q.pop_all(),
            TransportQueue::Blocking(q) => q.pop_all(),
        }
    }

    fn len(&self) -> usize {
        match self {
            TransportQueue::LockFree(q) => q.len(),
            TransportQueue::Blocking(q) => q.len(),
        }
    }

    fn capacity(&self) -> usize {
        match self {
            TransportQueue::LockFree(q) => q.capacity(),
            TransportQueue::Blocking(q) => q.capacity(),
        }
    }

    fn wait_for_data(&self, timeout: Duration) -> bool {
        match self {
            TransportQueue::LockFree(q) => q.wait_for_data(timeout),
            TransportQueue::Blocking(q) => q.wait_for_data(timeout),
        }
    }
}

/// Every structure of the segment, resolved by name.
pub struct SharedState<'a> {
    pub control: &'a ControlBlock,
    pub queue: TransportQueue<'a>,
    pub cells: &'a [ResponseCell],
    pub table: &'a RowTable,
}

impl<'a> SharedState<'a> {
    /// Resolves all structures. Any missing structure or size mismatch is an
    /// error.
    pub fn resolve(segment: &'a Segment) -> Result<Self> {
        let control = segment.find_one::<ControlBlock>(CONTROL_BLOCK)?;
        let slots = segment.find::<Slot<Message>>(MESSAGE_BUFFER)?;

        let queue = match segment.find_one::<RingHeader>(MESSAGE_QUEUE) {
            Ok(header) => TransportQueue::LockFree(LockFreeQueue::new(header, slots)?),
            Err(TransportError::StructureMissing(_)) => {
                let header = segment.find_one::<BlockingHeader>(MESSAGE_QUEUE_BLOCKING)?;
                TransportQueue::Blocking(BlockingQueue::new(header, slots)?)
            }
            Err(err) => return Err(err),
        };

        let cells = segment.find::<ResponseCell>(RESPONSE_CELLS)?;
        if cells.len() != control.process_count() as usize {
            return Err(TransportError::LayoutMismatch {
                name: RESPONSE_CELLS.to_string(),
                expected: control.process_count() as usize * std::mem::size_of::<ResponseCell>(),
                found: std::mem::size_of_val(cells),
            });
        }

        let entries = segment.find::<RowEntry>(MOVE_LOOKUP_TABLE)?;
        let table = lookup_table::as_table(entries).ok_or_else(|| TransportError::LayoutMismatch {
            name: MOVE_LOOKUP_TABLE.to_string(),
            expected: ROW_COUNT * std::mem::size_of::<RowEntry>(),
            found: std::mem::size_of_val(entries),
        })?;

        Ok(SharedState {
            control,
            queue,
            cells,
            table,
        })
    }

    pub fn process_count(&self) -> usize {
        self.cells.len()
    }

    /// Mailbox of worker `id`.
    pub fn cell(&self, id: usize) -> Result<&'a ResponseCell> {
        self.cells.get(id).ok_or(TransportError::InvalidWorker {
            id,
            count: self.cells.len(),
        })
    }
}
