//! Control-plane command plumbing, spec §4.1 ("run_command") and §5
//! ("Shared resources" — the L2/LPM tables are mutated via control-plane
//! commands while the owning worker is quiesced).
//!
//! There is no scheduler or cross-thread channel in this crate (spec §1:
//! the scheduler is an external collaborator referenced only through
//! `run_task`); [`Mailbox`] is the single-threaded stand-in a worker loop
//! would drain between batches, grounded on the teacher's
//! `NodeControlMsg`/`PipelineControlMsg` split.

use std::collections::VecDeque;

use bess_channel::error::{RecvError, SendError};

/// Commands the control plane can send to a worker between batches.
#[derive(Debug, Clone)]
pub enum ControlMsg {
    /// Ask the worker to quiesce and tear down every module it owns.
    Shutdown,
    /// Ask the worker to report `get_desc()` for every module it owns.
    CollectDescriptions,
}

/// A single-threaded FIFO mailbox a control plane enqueues into and a
/// worker loop drains between batches.
#[derive(Debug, Default)]
pub struct Mailbox<T> {
    queue: VecDeque<T>,
    closed: bool,
}

impl<T> Mailbox<T> {
    /// Creates an empty, open mailbox.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            closed: false,
        }
    }

    /// Enqueues a command. Fails if the mailbox has been closed.
    pub fn send(&mut self, msg: T) -> Result<(), SendError<T>> {
        if self.closed {
            return Err(SendError::Closed(msg));
        }
        self.queue.push_back(msg);
        Ok(())
    }

    /// Dequeues the next command, if any.
    pub fn recv(&mut self) -> Result<T, RecvError> {
        if let Some(msg) = self.queue.pop_front() {
            Ok(msg)
        } else if self.closed {
            Err(RecvError::Closed)
        } else {
            Err(RecvError::Empty)
        }
    }

    /// Closes the mailbox: further `send` calls fail, pending commands may
    /// still be drained with `recv`.
    pub fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_mailbox_rejects_sends_but_drains_pending() {
        let mut mbox: Mailbox<ControlMsg> = Mailbox::new();
        mbox.send(ControlMsg::CollectDescriptions).unwrap();
        mbox.close();
        assert!(matches!(mbox.send(ControlMsg::Shutdown), Err(SendError::Closed(_))));
        assert!(matches!(mbox.recv(), Ok(ControlMsg::CollectDescriptions)));
        assert!(matches!(mbox.recv(), Err(RecvError::Closed)));
    }
}
