use crate::dispatch;
use crate::source::{
    Caps, ResolutionFlags, ResultCallback, ResultFrame, Source, REMAINING_UNKNOWN,
};
use crate::{ops, Framework, OpId};
use medley_types::{CoreError, KeySet};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

/// Per-source accounting of a federated search.
#[derive(Debug, Default, Clone, Copy)]
struct ResultCount {
    /// The quota this source was asked for.
    count: u64,
    /// Items it delivered so far.
    received: u64,
    /// Last remaining count it reported.
    remaining: u64,
    /// Offset its quota started at.
    skip: u64,
}

/// State of one federated search across several sources.
///
/// The federator is the user callback of every sub-search; it merges their
/// streams into one, keeps per-source delivery accounting, and when some
/// sources under-deliver while others drained their quota exactly, chains a
/// follow-up round against the latter under the same operation id.
pub(crate) struct MultiCtl {
    op_id: OpId,
    text: Option<String>,
    keys: KeySet,
    flags: ResolutionFlags,
    user_cb: ResultCallback,
    /// Source id → accounting.
    table: HashMap<String, ResultCount>,
    /// Sub-operation ids of the current round, parallel to `sources`.
    sub_ops: Vec<OpId>,
    sources: Vec<Rc<dyn Source>>,
    /// Sources that delivered their quota exactly; candidates for more.
    sources_more: Vec<Rc<dyn Source>>,
    /// User-visible remaining count of the next emission.
    remaining: u64,
    /// Accumulated shortfall of under-delivering sources.
    pending: u64,
    sources_done: usize,
    sources_count: usize,
    /// Latched once the user received `remaining == 0`; nothing may be
    /// emitted or chained past this point.
    terminal_sent: bool,
    cancelled: bool,
}

impl std::fmt::Debug for MultiCtl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiCtl")
            .field("op_id", &self.op_id)
            .field("sources", &self.sources_count)
            .field("remaining", &self.remaining)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}

/// Searches `text` across `sources`, or across every search-capable source
/// when none are given.
///
/// Returns 0 without starting an operation when nothing can be searched; a
/// single error frame is then posted through the task queue.
pub(crate) fn multi_search(
    fw: &Framework,
    sources: Option<Vec<Rc<dyn Source>>>,
    text: Option<String>,
    keys: KeySet,
    count: u64,
    flags: ResolutionFlags,
    user_cb: ResultCallback,
) -> OpId {
    let sources = sources.unwrap_or_else(|| fw.sources_by_capability(Caps::SEARCH, true));
    if sources.is_empty() || count == 0 {
        let message = if count == 0 {
            "count must be greater than zero"
        } else {
            "no searchable sources available"
        };
        debug!(message, "refusing multiple search");
        fw.queue().post_default(move || {
            user_cb(ResultFrame {
                op_id: 0,
                media: None,
                remaining: 0,
                error: Some(CoreError::SearchFailed(message.into())),
            });
        });
        return 0;
    }

    let op_id = ops::next_id();
    let ctl = Rc::new(RefCell::new(MultiCtl {
        op_id,
        text,
        keys,
        flags,
        user_cb,
        table: HashMap::new(),
        sub_ops: Vec::new(),
        sources: Vec::new(),
        sources_more: Vec::new(),
        remaining: count - 1,
        pending: 0,
        sources_done: 0,
        sources_count: 0,
        terminal_sent: false,
        cancelled: false,
    }));

    fw.ops_mut().insert_ongoing(op_id);
    {
        let fw2 = fw.clone();
        let ctl2 = ctl.clone();
        fw.ops_mut().set_cancel_hook(op_id, Box::new(move || cancel(&fw2, &ctl2)));
    }
    fw.multi_insert(op_id, ctl.clone());

    start_round(fw, &ctl, &sources, None, count);
    op_id
}

/// Issues one round of sub-searches, partitioning `count` across `sources`.
///
/// The first source takes `count / n + count % n`, the others `count / n`.
/// `skips` carries per-source offsets when this is a follow-up round.
fn start_round(
    fw: &Framework,
    ctl: &Rc<RefCell<MultiCtl>>,
    sources: &[Rc<dyn Source>],
    skips: Option<Vec<u64>>,
    count: u64,
) {
    let n = sources.len() as u64;
    let individual = count / n;
    let first = individual + count % n;

    {
        let mut c = ctl.borrow_mut();
        c.sub_ops.clear();
        c.sources.clear();
        c.sources_more.clear();
        c.sources_done = 0;
        c.sources_count = 0;
        c.pending = 0;
    }

    for (i, source) in sources.iter().enumerate() {
        let quota = if i == 0 { first } else { individual };
        if quota == 0 {
            continue;
        }
        let skip = skips.as_ref().and_then(|s| s.get(i).copied()).unwrap_or(0);

        let (text, keys, flags) = {
            let mut c = ctl.borrow_mut();
            c.table.insert(
                source.id().to_owned(),
                ResultCount { count: quota, received: 0, remaining: 0, skip },
            );
            (c.text.clone(), c.keys.clone(), c.flags)
        };

        let fw2 = fw.clone();
        let ctl2 = ctl.clone();
        let sub_cb: ResultCallback = Rc::new(move |frame| on_sub_frame(&fw2, &ctl2, frame));

        match dispatch::search(fw, source, text, keys, skip, quota, flags, sub_cb) {
            Ok(sub_id) => {
                debug!(
                    source = source.name(),
                    sub_id, quota, skip, "searching items on source"
                );
                let mut c = ctl.borrow_mut();
                c.sub_ops.push(sub_id);
                c.sources.push(source.clone());
                c.sources_count += 1;
            }
            Err(error) => {
                // Capability was checked up front; a failure here only costs
                // this source its share.
                debug!(source = source.id(), %error, "skipping source");
                ctl.borrow_mut().table.remove(source.id());
            }
        }
    }
}

/// Handles one frame from a sub-search.
fn on_sub_frame(fw: &Framework, ctl: &Rc<RefCell<MultiCtl>>, frame: ResultFrame) {
    let (op_id, multi_remaining) = {
        let c = ctl.borrow();
        (c.op_id, c.remaining)
    };
    debug!(
        op_id,
        sub_op = frame.op_id,
        multi_remaining,
        sub_remaining = frame.remaining,
        "federated result"
    );

    // Every sub-search contributes exactly one terminal; all terminals in
    // means this round is done.
    let round_done = {
        let mut c = ctl.borrow_mut();
        if frame.remaining == 0 {
            c.sources_done += 1;
        }
        c.sources_done == c.sources_count
    };

    if ctl.borrow().cancelled {
        debug!(op_id, "operation is cancelled, skipping result");
        // The cancel terminal was already posted; the sub-searches only
        // need to drain.
        if round_done {
            finish(fw, ctl);
        }
        return;
    }

    let source = {
        let c = ctl.borrow();
        c.sub_ops.iter().position(|id| *id == frame.op_id).map(|i| c.sources[i].clone())
    };
    let Some(source) = source else {
        debug!(op_id, sub_op = frame.op_id, "frame from an unknown sub-operation");
        return;
    };

    // Per-source accounting. REMAINING_UNKNOWN means the source cannot
    // tell what is left; it makes no shortfall claim and no more-claim,
    // only its exact terminal counts against the quota.
    let emit = {
        let mut c = ctl.borrow_mut();
        if let Some(rc) = c.table.get_mut(source.id()) {
            if frame.media.is_some() {
                rc.received += 1;
            }
            rc.remaining = frame.remaining;
            let (received, quota) = (rc.received, rc.count);
            debug!(
                source = source.name(),
                received,
                remaining = rc.remaining,
                quota,
                "updated source accounting"
            );
            if frame.remaining == REMAINING_UNKNOWN {
                debug!(source = source.name(), "source does not know its remaining count");
            } else if frame.remaining == 0 {
                if received != quota {
                    c.pending += quota - received;
                } else {
                    debug!(source = source.name(), "source provided all requested results");
                    c.sources_more.push(source.clone());
                }
            }
        }
        // A lone NULL terminal of one sub-search is not the federated
        // terminal; swallow it unless it really is the last emission. Once
        // the user saw remaining=0 the stream is closed for good.
        !c.terminal_sent
            && !(frame.remaining == 0 && frame.media.is_none() && c.remaining > 0)
    };

    if emit {
        let (user_cb, remaining) = {
            let mut c = ctl.borrow_mut();
            let remaining = c.remaining;
            c.remaining = c.remaining.saturating_sub(1);
            if remaining == 0 {
                c.terminal_sent = true;
            }
            (c.user_cb.clone(), remaining)
        };
        user_cb(ResultFrame { op_id, media: frame.media, remaining, error: None });
    }

    if !round_done {
        return;
    }

    let (pending, has_more, terminal_sent) = {
        let c = ctl.borrow();
        (c.pending, !c.sources_more.is_empty(), c.terminal_sent)
    };
    if terminal_sent {
        finish(fw, ctl);
    } else if pending > 0 && has_more {
        // Some sources still have data; ask them to cover the shortfall
        // under the same operation id.
        debug!(op_id, pending, "requesting next federated chunk");
        chain_round(fw, ctl);
    } else if pending > 0 {
        // Nobody can cover the shortfall: close the stream here.
        let user_cb = {
            let mut c = ctl.borrow_mut();
            c.terminal_sent = true;
            c.user_cb.clone()
        };
        user_cb(ResultFrame { op_id, media: None, remaining: 0, error: None });
        finish(fw, ctl);
    } else {
        finish(fw, ctl);
    }
}

fn chain_round(fw: &Framework, ctl: &Rc<RefCell<MultiCtl>>) {
    let (sources, skips, count) = {
        let mut c = ctl.borrow_mut();
        let sources: Vec<Rc<dyn Source>> = c.sources_more.drain(..).collect();
        let skips: Vec<u64> = sources
            .iter()
            .map(|s| c.table.get(s.id()).map(|rc| rc.count + rc.skip).unwrap_or(0))
            .collect();
        // The continuation picks up exactly where the emissions stopped.
        c.remaining = c.pending.saturating_sub(1);
        (sources, skips, c.pending)
    };
    start_round(fw, ctl, &sources, Some(skips), count);
}

/// Cancel hook of the federated operation: cancels every sub-search and
/// posts the final terminal through the task queue. Sub-searches still
/// complete individually afterwards; their frames are dropped.
fn cancel(fw: &Framework, ctl: &Rc<RefCell<MultiCtl>>) {
    let (op_id, sub_ops, sources) = {
        let mut c = ctl.borrow_mut();
        c.cancelled = true;
        (c.op_id, c.sub_ops.clone(), c.sources.clone())
    };
    for (source, &sub_id) in sources.iter().zip(&sub_ops) {
        debug!(source = source.name(), sub_id, "cancelling sub-operation");
        fw.cancel(sub_id);
    }

    let ctl2 = ctl.clone();
    fw.queue().post_default(move || {
        let (op_id, user_cb) = {
            let c = ctl2.borrow();
            (c.op_id, c.user_cb.clone())
        };
        user_cb(ResultFrame {
            op_id,
            media: None,
            remaining: 0,
            error: Some(CoreError::OperationCancelled),
        });
    });
    debug!(op_id, "federated operation cancelled");
}

fn finish(fw: &Framework, ctl: &Rc<RefCell<MultiCtl>>) {
    let op_id = ctl.borrow().op_id;
    debug!(op_id, "federated operation finished");
    fw.multi_remove(op_id);
    fw.op_mark_finished(op_id);
}
