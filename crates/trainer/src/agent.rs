//! Agent-side handle: drains worker states and answers with moves.

use std::time::{Duration, Instant};

use game_core::message::Message;
use game_core::moves::RESET;
use shm_transport::{MessageQueue, Result, Segment, TransportError, WaitOutcome};
use tracing::{debug, warn};

use crate::shared::SharedState;

/// The single consumer of the message queue and the only writer to worker
/// mailboxes.
pub struct Agent<'a> {
    shared: SharedState<'a>,
}

impl<'a> Agent<'a> {
    pub fn attach(segment: &'a Segment) -> Result<Self> {
        let shared = SharedState::resolve(segment)?;
        debug!(
            name = segment.name(),
            processes = shared.process_count(),
            queue = ?shared.queue.kind(),
            "agent resolved segment"
        );
        Ok(Agent { shared })
    }

    /// Completes the last barrier phase so workers start publishing.
    pub fn announce(&self) {
        self.shared.control.mark_agent_attached();
    }

    pub fn process_count(&self) -> usize {
        self.shared.process_count()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.control.is_shutdown()
    }

    pub fn pop(&self) -> Option<Message> {
        self.shared.queue.pop()
    }

    pub fn pop_all(&self) -> Vec<Message> {
        self.shared.queue.pop_all()
    }

    /// Drains the queue into one contiguous buffer of whole messages.
    pub fn pop_all_bytes(&self) -> Vec<u8> {
        let messages = self.pop_all();
        bytemuck::cast_slice::<Message, u8>(&messages).to_vec()
    }

    /// Blocks until a message is available or `timeout` elapses.
    pub fn wait_for_messages(&self, timeout: Duration) -> bool {
        self.shared.queue.wait_for_data(timeout)
    }

    /// Sends `mv` to worker `id`. Fails with [`TransportError::MailboxBusy`]
    /// if the worker has not taken its previous move.
    pub fn put_response(&self, id: usize, mv: u8) -> Result<()> {
        if self.shared.cell(id)?.try_put(mv) {
            Ok(())
        } else {
            Err(TransportError::MailboxBusy(id))
        }
    }

    /// Like [`put_response`](Self::put_response), waiting up to `timeout`
    /// for the mailbox to empty.
    pub fn put_response_blocking(&self, id: usize, mv: u8, timeout: Duration) -> Result<()> {
        if self.shared.cell(id)?.put_timeout(mv, timeout) {
            Ok(())
        } else {
            Err(TransportError::MailboxBusy(id))
        }
    }

    /// Discards queued states and sends RESET to every worker.
    ///
    /// Arms a round of one move per worker, so
    /// [`wait_round_complete`](Self::wait_round_complete) reports when every
    /// worker has picked up its reset. Returns the number of messages
    /// discarded.
    pub fn reset_all(&self) -> Result<usize> {
        let discarded = self.pop_all().len();
        let count = self.process_count();
        self.shared.control.arm_round(count as u32);
        for id in 0..count {
            self.put_response(id, RESET)?;
        }
        debug!(discarded, count, "reset all workers");
        Ok(discarded)
    }

    /// Waits until every move of the current round has been taken.
    pub fn wait_round_complete(&self, timeout: Duration) -> WaitOutcome {
        self.shared.control.wait_round_complete(Some(timeout))
    }

    /// Gathers the latest state of every worker, indexed by id.
    ///
    /// Returns once each worker has reported at least once or `timeout`
    /// elapses; workers that did not report are `None`.
    pub fn collect_round(&self, timeout: Duration) -> Vec<Option<Message>> {
        let count = self.process_count();
        let mut states = vec![None; count];
        let mut missing = count;
        let deadline = Instant::now() + timeout;

        while missing > 0 {
            for message in self.pop_all() {
                let id = message.worker_id() as usize;
                match states.get_mut(id) {
                    Some(slot) => {
                        if slot.is_none() {
                            missing -= 1;
                        }
                        *slot = Some(message);
                    }
                    None => warn!(id, count, "message from unknown worker"),
                }
            }
            if missing == 0 {
                break;
            }
            let now = Instant::now();
            if now >= deadline || self.is_shutdown() {
                break;
            }
            self.wait_for_messages(deadline - now);
        }
        states
    }
}
