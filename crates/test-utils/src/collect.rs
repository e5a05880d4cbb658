//! Callback adapters that record everything an operation emits.

use medley_core::source::{ResolveCallback, ResolveFrame, ResultCallback, ResultFrame};
use medley_types::CoreError;
use std::cell::RefCell;
use std::rc::Rc;

/// Records the frames of a streaming operation.
#[derive(Clone, Default)]
pub struct FrameCollector {
    frames: Rc<RefCell<Vec<ResultFrame>>>,
}

impl FrameCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// The callback to hand to a streaming verb.
    pub fn callback(&self) -> ResultCallback {
        let frames = self.frames.clone();
        Rc::new(move |frame| frames.borrow_mut().push(frame))
    }

    /// Everything recorded so far.
    pub fn frames(&self) -> Vec<ResultFrame> {
        self.frames.borrow().clone()
    }

    /// Number of recorded frames.
    pub fn len(&self) -> usize {
        self.frames.borrow().len()
    }

    /// True if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.frames.borrow().is_empty()
    }

    /// The remaining counts, in emission order.
    pub fn remainings(&self) -> Vec<u64> {
        self.frames.borrow().iter().map(|f| f.remaining).collect()
    }

    /// The titles of the item-bearing frames, in emission order.
    pub fn titles(&self) -> Vec<String> {
        self.frames
            .borrow()
            .iter()
            .filter_map(|f| f.media.as_ref())
            .filter_map(|m| m.borrow().title().map(ToOwned::to_owned))
            .collect()
    }

    /// The source stamps of the item-bearing frames, in emission order.
    pub fn sources(&self) -> Vec<String> {
        self.frames
            .borrow()
            .iter()
            .filter_map(|f| f.media.as_ref())
            .filter_map(|m| m.borrow().source().map(ToOwned::to_owned))
            .collect()
    }

    /// Number of item-bearing frames.
    pub fn item_count(&self) -> usize {
        self.frames.borrow().iter().filter(|f| f.media.is_some()).count()
    }

    /// Number of terminal frames (there must only ever be one).
    pub fn terminal_count(&self) -> usize {
        self.frames.borrow().iter().filter(|f| f.remaining == 0).count()
    }

    /// The error on the terminal frame, if any.
    pub fn terminal_error(&self) -> Option<CoreError> {
        self.frames
            .borrow()
            .iter()
            .find(|f| f.remaining == 0)
            .and_then(|f| f.error.clone())
    }
}

impl std::fmt::Debug for FrameCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCollector").field("frames", &self.len()).finish()
    }
}

/// Records the single reply of a resolve or media-from-uri operation.
#[derive(Clone, Default)]
pub struct ReplyCollector {
    replies: Rc<RefCell<Vec<ResolveFrame>>>,
}

impl ReplyCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// The callback to hand to a single-shot verb.
    pub fn callback(&self) -> ResolveCallback {
        let replies = self.replies.clone();
        Rc::new(move |reply| replies.borrow_mut().push(reply))
    }

    /// Everything recorded so far.
    pub fn replies(&self) -> Vec<ResolveFrame> {
        self.replies.borrow().clone()
    }

    /// Number of recorded replies.
    pub fn len(&self) -> usize {
        self.replies.borrow().len()
    }

    /// True if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.replies.borrow().is_empty()
    }

    /// The only reply. Panics unless exactly one was recorded.
    pub fn single(&self) -> ResolveFrame {
        let replies = self.replies.borrow();
        assert_eq!(replies.len(), 1, "expected exactly one reply");
        replies[0].clone()
    }
}

impl std::fmt::Debug for ReplyCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyCollector").field("replies", &self.len()).finish()
    }
}
