//! Scheduler - When observed bursts are flushed.
//!
//! - [`FlushMode::Immediate`]: each burst is flushed as it arrives.
//! - [`FlushMode::NextFrame`]: bursts queue up; the first burst into an
//!   empty queue requests one frame callback, and everything queued before
//!   it fires is flushed together.

use std::cell::{Cell, RefCell};

use crate::frame::{self, FrameId};
use crate::tree::MutationRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    #[default]
    Immediate,
    NextFrame,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    mode: FlushMode,
    pending: RefCell<Vec<Vec<MutationRecord>>>,
    frame: Cell<Option<FrameId>>,
}

impl Scheduler {
    pub fn new(mode: FlushMode) -> Self {
        Self {
            mode,
            pending: RefCell::new(Vec::new()),
            frame: Cell::new(None),
        }
    }

    pub fn mode(&self) -> FlushMode {
        self.mode
    }

    /// Accept a burst.
    ///
    /// Returns the records to flush now, or `None` when they were queued.
    /// `on_frame` is requested as a frame callback when this burst is the
    /// first into an empty queue; it should call [`Scheduler::take_pending`].
    pub fn admit<F>(&self, burst: Vec<MutationRecord>, on_frame: F) -> Option<Vec<MutationRecord>>
    where
        F: FnOnce() + 'static,
    {
        match self.mode {
            FlushMode::Immediate => Some(burst),
            FlushMode::NextFrame => {
                if burst.is_empty() {
                    return None;
                }
                let mut pending = self.pending.borrow_mut();
                pending.push(burst);
                if self.frame.get().is_none() {
                    self.frame.set(Some(frame::request_frame(on_frame)));
                }
                None
            }
        }
    }

    /// Take every queued record, oldest burst first, and forget the frame.
    pub fn take_pending(&self) -> Vec<MutationRecord> {
        self.frame.set(None);
        self.pending.take().into_iter().flatten().collect()
    }

    /// Cancel the requested frame and discard queued bursts.
    pub fn cancel(&self) {
        if let Some(id) = self.frame.take() {
            frame::cancel_frame(id);
        }
        self.pending.borrow_mut().clear();
    }

    pub fn pending_bursts(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn has_scheduled_frame(&self) -> bool {
        self.frame.get().is_some()
    }
}
