//! Frame Clock - Callbacks deferred to the next rendering frame.
//!
//! A per-thread queue of one-shot callbacks. The host drives it by calling
//! [`run_frame`] once per frame (from its render loop, timer or test).
//! Batched reconcilers use it to coalesce every mutation burst that arrives
//! before the next frame into one flush.
//!
//! # Example
//!
//! ```ignore
//! use keyed_sync::frame;
//!
//! let id = frame::request_frame(|| println!("next frame"));
//! assert_eq!(frame::pending_frames(), 1);
//!
//! frame::run_frame(); // prints "next frame"
//! assert!(!frame::cancel_frame(id)); // already ran
//! ```

use std::cell::RefCell;

/// Handle returned by [`request_frame`], used to cancel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameId(u64);

type FrameCallback = Box<dyn FnOnce()>;

struct FrameQueue {
    callbacks: Vec<(FrameId, FrameCallback)>,
    next_id: u64,
}

impl FrameQueue {
    const fn new() -> Self {
        Self {
            callbacks: Vec::new(),
            next_id: 0,
        }
    }
}

thread_local! {
    static FRAMES: RefCell<FrameQueue> = const { RefCell::new(FrameQueue::new()) };
}

// =============================================================================
// PUBLIC API
// =============================================================================

/// Run `callback` on the next frame.
pub fn request_frame<F>(callback: F) -> FrameId
where
    F: FnOnce() + 'static,
{
    FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        let id = FrameId(frames.next_id);
        frames.next_id += 1;
        frames.callbacks.push((id, Box::new(callback)));
        id
    })
}

/// Cancel a requested callback. Returns false if it already ran or was cancelled.
pub fn cancel_frame(id: FrameId) -> bool {
    FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        let before = frames.callbacks.len();
        frames.callbacks.retain(|(frame_id, _)| *frame_id != id);
        frames.callbacks.len() != before
    })
}

/// Run every callback requested before this call, in request order.
///
/// Callbacks requested while the frame runs wait for the next frame.
/// Returns the number of callbacks run.
pub fn run_frame() -> usize {
    let callbacks = FRAMES.with(|frames| std::mem::take(&mut frames.borrow_mut().callbacks));
    let count = callbacks.len();
    for (_, callback) in callbacks {
        callback();
    }
    count
}

/// Number of callbacks waiting for the next frame.
pub fn pending_frames() -> usize {
    FRAMES.with(|frames| frames.borrow().callbacks.len())
}

/// Drop every pending callback (for testing).
pub fn reset_frames() {
    let callbacks = FRAMES.with(|frames| std::mem::take(&mut frames.borrow_mut().callbacks));
    drop(callbacks);
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn setup() {
        reset_frames();
    }

    #[test]
    fn test_runs_in_request_order() {
        setup();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            request_frame(move || log.borrow_mut().push(i));
        }
        assert_eq!(pending_frames(), 3);
        assert_eq!(run_frame(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert_eq!(pending_frames(), 0);
    }

    #[test]
    fn test_cancel() {
        setup();
        let ran = Rc::new(Cell::new(false));
        let ran_clone = ran.clone();
        let id = request_frame(move || ran_clone.set(true));

        assert!(cancel_frame(id));
        assert!(!cancel_frame(id));
        assert_eq!(run_frame(), 0);
        assert!(!ran.get());
    }

    #[test]
    fn test_request_during_frame_waits() {
        setup();
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        request_frame(move || {
            count_clone.set(count_clone.get() + 1);
            let again = count_clone.clone();
            request_frame(move || again.set(again.get() + 1));
        });

        assert_eq!(run_frame(), 1);
        assert_eq!(count.get(), 1);
        assert_eq!(pending_frames(), 1);
        assert_eq!(run_frame(), 1);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_reset() {
        setup();
        request_frame(|| {});
        reset_frames();
        assert_eq!(pending_frames(), 0);
    }
}
