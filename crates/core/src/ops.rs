use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Handle of a single logical user request. Non-zero for real operations.
pub type OpId = u64;

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a fresh, process-wide unique operation id.
pub(crate) fn next_id() -> OpId {
    NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed)
}

type CancelHook = Box<dyn FnOnce()>;

struct Entry {
    cancelled: bool,
    completed: bool,
    cancel_hook: Option<CancelHook>,
    data: Option<Rc<dyn Any>>,
}

/// Per-operation lifecycle state.
///
/// An operation is *ongoing* from dispatch until it is cancelled or its
/// terminal frame arrives (*completed*), and *finished* once the last
/// post-processing stage has handed the terminal frame to the user. Finished
/// entries are dropped from the table; lookups of unknown ids fail closed
/// (they answer as a cancelled, completed, finished operation would).
#[derive(Default)]
pub(crate) struct Operations {
    entries: HashMap<OpId, Entry>,
}

impl std::fmt::Debug for Operations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operations").field("live", &self.entries.len()).finish()
    }
}

impl Operations {
    /// Registers `id` as ongoing.
    pub(crate) fn insert_ongoing(&mut self, id: OpId) {
        self.entries.insert(
            id,
            Entry { cancelled: false, completed: false, cancel_hook: None, data: None },
        );
    }

    /// Marks the terminal frame of `id` as seen.
    pub(crate) fn mark_completed(&mut self, id: OpId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.completed = true;
        }
    }

    /// Drops all state of `id`. No callback for it reaches the user anymore.
    pub(crate) fn mark_finished(&mut self, id: OpId) {
        if self.entries.remove(&id).is_some() {
            debug!(op_id = id, "operation finished");
        }
    }

    /// Flags `id` as cancelled and hands back its cancel hook, if this is
    /// the first cancellation of a live, not yet completed operation.
    ///
    /// The caller invokes the hook outside the registry borrow, so a hook is
    /// free to cancel further operations.
    pub(crate) fn begin_cancel(&mut self, id: OpId) -> Option<CancelHook> {
        match self.entries.get_mut(&id) {
            Some(entry) if !entry.cancelled && !entry.completed => {
                entry.cancelled = true;
                entry.cancel_hook.take()
            }
            _ => {
                debug!(op_id = id, "cancel on a finished or already cancelled operation");
                None
            }
        }
    }

    /// True while the operation is neither cancelled, completed nor finished.
    pub(crate) fn is_ongoing(&self, id: OpId) -> bool {
        self.entries.get(&id).map(|e| !e.cancelled && !e.completed).unwrap_or(false)
    }

    /// True once a cancel has been observed (unknown ids fail closed).
    pub(crate) fn is_cancelled(&self, id: OpId) -> bool {
        self.entries.get(&id).map(|e| e.cancelled).unwrap_or(true)
    }

    /// True once the terminal frame was seen (unknown ids fail closed).
    pub(crate) fn is_completed(&self, id: OpId) -> bool {
        self.entries.get(&id).map(|e| e.completed).unwrap_or(true)
    }

    /// True once the operation state was dropped.
    pub(crate) fn is_finished(&self, id: OpId) -> bool {
        !self.entries.contains_key(&id)
    }

    /// Installs a hook that runs when the operation is first cancelled.
    pub(crate) fn set_cancel_hook(&mut self, id: OpId, hook: CancelHook) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.cancel_hook = Some(hook);
        }
    }

    /// Attaches opaque data to the operation.
    pub(crate) fn set_data(&mut self, id: OpId, data: Rc<dyn Any>) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.data = Some(data);
        }
    }

    /// The data previously attached to the operation.
    pub(crate) fn data(&self, id: OpId) -> Option<Rc<dyn Any>> {
        self.entries.get(&id).and_then(|e| e.data.clone())
    }
}
