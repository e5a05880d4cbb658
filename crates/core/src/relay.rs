use crate::autosplit::AutoSplitCtl;
use crate::sched::Priority;
use crate::source::{
    BrowseRequest, MediaHandle, QueryRequest, ResolutionFlags, ResultCallback, ResultFrame,
    SearchRequest, Source,
};
use crate::{Framework, OpId};
use medley_types::{CoreError, KeySet};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};

/// The verb-specific part of an in-flight streaming request.
pub(crate) enum RequestKind {
    Browse { container: MediaHandle },
    Search { text: Option<String> },
    Query { query: String },
}

/// State of the relay wrapping one streaming operation.
///
/// The relay is the provider's immediate callback: every frame passes
/// through [`process`] before it reaches the next pipeline stage. The state
/// also owns everything needed to re-issue the request, which is how
/// auto-split dispatches follow-up chunks.
pub(crate) struct RelayState {
    pub(crate) op_id: OpId,
    pub(crate) source: Rc<dyn Source>,
    pub(crate) kind: RequestKind,
    pub(crate) keys: KeySet,
    pub(crate) skip: u64,
    /// Provider-visible count of the current chunk.
    pub(crate) count: u64,
    pub(crate) flags: ResolutionFlags,
    /// True when a later stage (full resolution) finishes the operation.
    pub(crate) chained: bool,
    /// Hand frames over through the task queue instead of synchronously.
    pub(crate) use_idle: bool,
    /// The next pipeline stage.
    pub(crate) next: ResultCallback,
    pub(crate) auto_split: Option<AutoSplitCtl>,
}

/// Builds the callback handed to the provider for this relay.
pub(crate) fn relay_callback(fw: &Framework, state: &Rc<RefCell<RelayState>>) -> ResultCallback {
    let fw = fw.clone();
    let state = state.clone();
    Rc::new(move |frame| process(&fw, &state, frame))
}

/// Posts the dispatch task for the relay's current request.
///
/// Idle-relay operations dispatch at default priority, everything else at
/// high priority. The task re-checks cancellation: an operation cancelled
/// before its first tick never reaches the provider and yields a single
/// synthetic cancelled terminal.
pub(crate) fn dispatch(fw: &Framework, state: &Rc<RefCell<RelayState>>) {
    let priority =
        if state.borrow().use_idle { Priority::Default } else { Priority::High };
    post_issue(fw, state, priority);
}

fn post_issue(fw: &Framework, state: &Rc<RefCell<RelayState>>, priority: Priority) {
    let fw2 = fw.clone();
    let state = state.clone();
    fw.queue().post(priority, move || issue(&fw2, &state));
}

fn issue(fw: &Framework, state: &Rc<RefCell<RelayState>>) {
    let op_id = state.borrow().op_id;
    let callback = relay_callback(fw, state);

    if fw.op_is_cancelled(op_id) {
        debug!(op_id, "operation was cancelled before dispatch");
        callback(ResultFrame {
            op_id,
            media: None,
            remaining: 0,
            error: Some(CoreError::OperationCancelled),
        });
        return;
    }

    // Clone everything out before invoking the provider: it may emit
    // synchronously, which re-enters the relay state.
    enum Verb {
        Browse(BrowseRequest),
        Search(SearchRequest),
        Query(QueryRequest),
    }
    let (source, verb) = {
        let st = state.borrow();
        let verb = match &st.kind {
            RequestKind::Browse { container } => Verb::Browse(BrowseRequest {
                op_id,
                container: container.clone(),
                keys: st.keys.clone(),
                skip: st.skip,
                count: st.count,
                flags: st.flags,
                callback,
            }),
            RequestKind::Search { text } => Verb::Search(SearchRequest {
                op_id,
                text: text.clone(),
                keys: st.keys.clone(),
                skip: st.skip,
                count: st.count,
                flags: st.flags,
                callback,
            }),
            RequestKind::Query { query } => Verb::Query(QueryRequest {
                op_id,
                query: query.clone(),
                keys: st.keys.clone(),
                skip: st.skip,
                count: st.count,
                flags: st.flags,
                callback,
            }),
        };
        (st.source.clone(), verb)
    };
    match verb {
        Verb::Browse(request) => source.browse(fw, request),
        Verb::Search(request) => source.search(fw, request),
        Verb::Query(request) => source.query(fw, request),
    }
}

/// Runs one provider frame through the relay.
pub(crate) fn process(fw: &Framework, state: &Rc<RefCell<RelayState>>, mut frame: ResultFrame) {
    let op_id = frame.op_id;
    debug!(op_id, remaining = frame.remaining, "relaying result");

    // Nothing is delivered for a finished operation.
    if fw.op_is_finished(op_id) {
        warn!(op_id, "source emitted results after the operation finished");
        return;
    }

    // A cancelled or completed operation drops items; only the terminal
    // frame falls through so every chained stage can wind down.
    if !fw.op_is_ongoing(op_id) {
        debug!(op_id, "operation is cancelled, skipping result");
        frame.media = None;
        state.borrow_mut().auto_split = None;
        if frame.remaining > 0 {
            return;
        }
        if fw.op_is_completed(op_id) {
            warn!(
                op_id,
                source = state.borrow().source.id(),
                "source emitted 'remaining=0' more than once"
            );
            return;
        }
    }

    let provider_remaining = frame.remaining;
    if let Some(ctl) = state.borrow_mut().auto_split.as_mut() {
        frame.remaining = ctl.account(provider_remaining);
    }
    let remaining = frame.remaining;

    // Idempotent sentinel against stray second terminals.
    if remaining == 0 {
        fw.op_mark_completed(op_id);
    }

    if let Some(media) = frame.media.as_ref() {
        let st = state.borrow();
        media.borrow_mut().stamp_source(st.source.id());
    }

    let (use_idle, chained, next) = {
        let st = state.borrow();
        (st.use_idle, st.chained, st.next.clone())
    };
    if use_idle {
        let fw2 = fw.clone();
        fw.queue().post_default(move || idle_deliver(&fw2, &next, chained, frame));
    } else {
        if remaining == 0 && fw.op_is_cancelled(op_id) {
            // The caller asked for cancellation; whatever the provider
            // attached to the terminal is overridden.
            frame.error = Some(CoreError::OperationCancelled);
        }
        next(frame);
        if remaining == 0 && !chained {
            fw.op_mark_finished(op_id);
        }
    }

    if state.borrow().auto_split.is_some()
        && AutoSplitCtl::wants_next_chunk(provider_remaining, remaining)
    {
        next_chunk(fw, state, remaining);
    }

    if remaining == 0 {
        debug!(op_id, "got remaining 0, releasing relay resources");
        state.borrow_mut().auto_split = None;
    }
}

/// Delivery half of the relay when running through the task queue.
///
/// Cancellation may have happened between the relay and this task, so the
/// gates run again here.
fn idle_deliver(fw: &Framework, next: &ResultCallback, chained: bool, mut frame: ResultFrame) {
    let op_id = frame.op_id;
    let cancelled = fw.op_is_cancelled(op_id);
    if cancelled {
        frame.media = None;
    }
    if !cancelled || frame.remaining == 0 {
        if cancelled {
            frame.error = Some(CoreError::OperationCancelled);
        }
        let remaining = frame.remaining;
        next(frame);
        if remaining == 0 && !chained {
            fw.op_mark_finished(op_id);
        }
    } else {
        debug!(op_id, "operation was cancelled, skipping idle result");
    }
}

fn next_chunk(fw: &Framework, state: &Rc<RefCell<RelayState>>, remaining: u64) {
    {
        let mut st = state.borrow_mut();
        let Some(ctl) = st.auto_split.as_mut() else { return };
        let (skip_delta, count) = ctl.begin_next_chunk(remaining);
        st.skip += skip_delta;
        st.count = count;
        debug!(skip = st.skip, count = st.count, "auto-split: requesting next chunk");
    }
    post_issue(fw, state, Priority::High);
}
