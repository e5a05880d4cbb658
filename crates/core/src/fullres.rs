use crate::dispatch;
use crate::source::{
    Caps, MediaHandle, ResolutionFlags, ResolveCallback, ResolveFrame, ResultCallback,
    ResultFrame, Source,
};
use crate::{Framework, OpId};
use medley_types::{CoreError, KeySet};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use tracing::{debug, warn};

/// Control block of the full-resolution engine for one streaming operation.
///
/// The engine sits between the relay and the user. Each relayed item is
/// enriched through auxiliary sources and withheld until every pending
/// resolution finished; emission is reordered back into the provider's
/// original sequence, tracked by the remaining counts seen so far.
pub(crate) struct FullResCtl {
    user_cb: ResultCallback,
    keys: KeySet,
    flags: ResolutionFlags,
    /// True when yet another stage runs after this one.
    chained: bool,
    /// Remaining counts in provider emission order; the head is the next
    /// slot to hand to the user.
    expected: VecDeque<u64>,
    /// Fully resolved items waiting for an earlier slot to finish, largest
    /// remaining first.
    waiting: Vec<Waiting>,
}

struct Waiting {
    media: Option<MediaHandle>,
    remaining: u64,
}

impl FullResCtl {
    pub(crate) fn new(user_cb: ResultCallback, keys: KeySet, flags: ResolutionFlags) -> Self {
        Self {
            user_cb,
            keys,
            flags,
            chained: false,
            expected: VecDeque::new(),
            waiting: Vec::new(),
        }
    }
}

/// Enrichment state of a single item.
struct DoneBlock {
    op_id: OpId,
    remaining: u64,
    /// Auxiliary source id → outstanding resolve operation.
    pending: HashMap<String, OpId>,
    cancelled: bool,
    ctl: Rc<RefCell<FullResCtl>>,
}

/// Builds the pipeline stage callback for a full-resolution operation.
pub(crate) fn ctl_callback(
    fw: &Framework,
    origin: &Rc<dyn Source>,
    ctl: &Rc<RefCell<FullResCtl>>,
) -> ResultCallback {
    let fw = fw.clone();
    let origin = origin.clone();
    let ctl = ctl.clone();
    Rc::new(move |frame| ctl_process(&fw, &origin, &ctl, frame))
}

fn ctl_process(
    fw: &Framework,
    origin: &Rc<dyn Source>,
    ctl: &Rc<RefCell<FullResCtl>>,
    frame: ResultFrame,
) {
    debug!(op_id = frame.op_id, remaining = frame.remaining, "full-resolution control");

    // The emission slot is learned from the frame itself; the total count is
    // not known up front.
    ctl.borrow_mut().expected.push_back(frame.remaining);

    let done = Rc::new(RefCell::new(DoneBlock {
        op_id: frame.op_id,
        remaining: frame.remaining,
        pending: HashMap::new(),
        cancelled: false,
        ctl: ctl.clone(),
    }));

    if frame.error.is_some() {
        // Nothing to enrich, but emission order must still be kept, so the
        // frame takes the same path as a resolved item.
        done_process(fw, &done, frame.media, frame.error, None);
        return;
    }
    let Some(media) = frame.media else {
        done_process(fw, &done, None, None, None);
        return;
    };

    let (keys, flags) = {
        let c = ctl.borrow();
        (c.keys.clone(), c.flags)
    };
    for aux in fw.additional_sources_for(origin.id(), &media, &keys) {
        if !aux.caps().contains(Caps::RESOLVE) {
            continue;
        }
        debug!(source = aux.name(), "using source to resolve extra metadata");
        let fw2 = fw.clone();
        let done2 = done.clone();
        let aux_id = aux.id().to_string();
        let reply_cb: ResolveCallback = Rc::new(move |reply: ResolveFrame| {
            done_process(&fw2, &done2, reply.media, reply.error, Some(&aux_id));
        });
        let resolve_id =
            dispatch::resolve_with(fw, &aux, media.clone(), keys.clone(), flags, reply_cb, false);
        done.borrow_mut().pending.insert(aux.id().to_string(), resolve_id);
    }

    if done.borrow().pending.is_empty() {
        done_process(fw, &done, Some(media), None, None);
    }
}

/// Advances an item once one of its resolutions completed (or when no
/// resolution was needed; then `completer` is `None` and a relay-side error
/// passes through untouched).
fn done_process(
    fw: &Framework,
    done: &Rc<RefCell<DoneBlock>>,
    media: Option<MediaHandle>,
    error: Option<CoreError>,
    completer: Option<&str>,
) {
    let mut error = error;
    {
        let mut d = done.borrow_mut();
        if let Some(completer) = completer {
            d.pending.remove(completer);
            // Enrichment is best effort: a resolve error costs the extra
            // metadata, the base item stays valid.
            if let Some(e) = error.take() {
                if !e.is_cancelled() {
                    warn!(error = %e, "failed to fully resolve some metadata");
                }
            }
        }
    }

    // Cancel still-pending resolutions once the operation is cancelled.
    let to_cancel: Vec<OpId> = {
        let mut d = done.borrow_mut();
        if !d.cancelled && fw.op_is_cancelled(d.op_id) {
            d.cancelled = true;
            d.pending.values().copied().collect()
        } else {
            Vec::new()
        }
    };
    for id in to_cancel {
        fw.cancel(id);
    }

    let (op_id, remaining, cancelled, pending, ctl) = {
        let d = done.borrow();
        (d.op_id, d.remaining, d.cancelled, d.pending.len(), d.ctl.clone())
    };
    if pending > 0 {
        return;
    }

    if fw.op_is_finished(op_id) {
        debug!(op_id, "operation finished, dropping fully resolved result");
        return;
    }

    let media = if cancelled { None } else { media };
    if cancelled && remaining != 0 {
        debug!(op_id, "operation cancelled, dropping fully resolved result");
        return;
    }

    let in_order = ctl.borrow().expected.front() == Some(&remaining);
    if in_order || cancelled {
        // The cancelled terminal is let through even out of order; the
        // terminal frame must always arrive.
        if cancelled && remaining == 0 && !matches!(error, Some(CoreError::OperationCancelled)) {
            error = Some(CoreError::OperationCancelled);
        }
        emit_in_order(fw, &ctl, op_id, media, remaining, error);
    } else {
        let mut c = ctl.borrow_mut();
        let pos =
            c.waiting.iter().position(|w| w.remaining < remaining).unwrap_or(c.waiting.len());
        c.waiting.insert(pos, Waiting { media, remaining });
    }
}

fn emit_in_order(
    fw: &Framework,
    ctl: &Rc<RefCell<FullResCtl>>,
    op_id: OpId,
    media: Option<MediaHandle>,
    remaining: u64,
    error: Option<CoreError>,
) {
    debug!(remaining, "result is in sort order, emitting");
    let user_cb = {
        let mut c = ctl.borrow_mut();
        c.expected.pop_front();
        c.user_cb.clone()
    };
    user_cb(ResultFrame { op_id, media, remaining, error });

    // Emitting this slot may unblock items that resolved early.
    let mut last = remaining;
    while last != 0 {
        let unblocked = {
            let mut c = ctl.borrow_mut();
            let head = c.expected.front().copied();
            let ready = match (head, c.waiting.first()) {
                (Some(head), Some(w)) => w.remaining == head,
                _ => false,
            };
            if ready {
                c.expected.pop_front();
                Some(c.waiting.remove(0))
            } else {
                None
            }
        };
        let Some(w) = unblocked else { break };
        last = w.remaining;
        user_cb(ResultFrame { op_id, media: w.media, remaining: w.remaining, error: None });
    }

    if last == 0 {
        let chained = ctl.borrow().chained;
        if !chained {
            fw.op_mark_finished(op_id);
        }
    }
}

/// Control block of full resolution for a single-shot resolve operation.
///
/// Same enrichment as the streaming engine, minus the ordering concern:
/// there is exactly one reply.
pub(crate) struct MetaResCtl {
    op_id: OpId,
    user_cb: ResolveCallback,
    keys: KeySet,
    flags: ResolutionFlags,
}

impl MetaResCtl {
    pub(crate) fn new(
        op_id: OpId,
        user_cb: ResolveCallback,
        keys: KeySet,
        flags: ResolutionFlags,
    ) -> Self {
        Self { op_id, user_cb, keys, flags }
    }
}

struct MetaDone {
    pending: HashMap<String, OpId>,
    cancelled: bool,
}

/// Builds the enrichment stage callback for a single-shot resolve.
pub(crate) fn meta_ctl_callback(
    fw: &Framework,
    origin: &Rc<dyn Source>,
    ctl: Rc<MetaResCtl>,
) -> ResolveCallback {
    let fw = fw.clone();
    let origin = origin.clone();
    Rc::new(move |reply| meta_ctl_process(&fw, &origin, &ctl, reply))
}

fn meta_ctl_process(
    fw: &Framework,
    origin: &Rc<dyn Source>,
    ctl: &Rc<MetaResCtl>,
    reply: ResolveFrame,
) {
    debug!(op_id = ctl.op_id, "full-resolution control (single shot)");

    if let Some(error) = reply.error {
        if error.is_cancelled() {
            debug!("operation cancelled");
        } else {
            warn!(error = %error, "operation failed");
        }
        (ctl.user_cb)(ResolveFrame { op_id: ctl.op_id, media: reply.media, error: Some(error) });
        fw.op_mark_finished(ctl.op_id);
        return;
    }
    let Some(media) = reply.media else {
        (ctl.user_cb)(ResolveFrame { op_id: ctl.op_id, media: None, error: None });
        fw.op_mark_finished(ctl.op_id);
        return;
    };

    let done = Rc::new(RefCell::new(MetaDone { pending: HashMap::new(), cancelled: false }));
    for aux in fw.additional_sources_for(origin.id(), &media, &ctl.keys) {
        if !aux.caps().contains(Caps::RESOLVE) {
            continue;
        }
        debug!(source = aux.name(), "using source to resolve extra metadata");
        let fw2 = fw.clone();
        let ctl2 = ctl.clone();
        let done2 = done.clone();
        let aux_id = aux.id().to_string();
        let reply_cb: ResolveCallback = Rc::new(move |reply: ResolveFrame| {
            meta_done_process(&fw2, &ctl2, &done2, reply.media, reply.error, &aux_id);
        });
        let resolve_id = dispatch::resolve_with(
            fw,
            &aux,
            media.clone(),
            ctl.keys.clone(),
            ctl.flags,
            reply_cb,
            false,
        );
        done.borrow_mut().pending.insert(aux.id().to_string(), resolve_id);
    }

    if done.borrow().pending.is_empty() {
        (ctl.user_cb)(ResolveFrame { op_id: ctl.op_id, media: Some(media), error: None });
        fw.op_mark_finished(ctl.op_id);
    }
}

fn meta_done_process(
    fw: &Framework,
    ctl: &Rc<MetaResCtl>,
    done: &Rc<RefCell<MetaDone>>,
    media: Option<MediaHandle>,
    error: Option<CoreError>,
    completer: &str,
) {
    debug!(op_id = ctl.op_id, "full-resolution done (single shot)");
    {
        let mut d = done.borrow_mut();
        d.pending.remove(completer);
    }
    if let Some(e) = error {
        if !e.is_cancelled() {
            warn!(error = %e, "failed to fully resolve some metadata");
        }
    }

    let to_cancel: Vec<OpId> = {
        let mut d = done.borrow_mut();
        if !d.cancelled && fw.op_is_cancelled(ctl.op_id) {
            d.cancelled = true;
            d.pending.values().copied().collect()
        } else {
            Vec::new()
        }
    };
    for id in to_cancel {
        fw.cancel(id);
    }

    if !done.borrow().pending.is_empty() {
        return;
    }

    let error = fw.op_is_cancelled(ctl.op_id).then_some(CoreError::OperationCancelled);
    (ctl.user_cb)(ResolveFrame { op_id: ctl.op_id, media, error });
    fw.op_mark_finished(ctl.op_id);
}
