use crate::fullres::{self, FullResCtl, MetaResCtl};
use crate::relay::{self, RelayState, RequestKind};
use crate::sched::Priority;
use crate::source::{
    media_handle, Caps, MediaFromUriRequest, MediaHandle, RemoveCallback, RemoveFrame,
    RemoveRequest, ResolutionFlags, ResolveCallback, ResolveFrame, ResolveRequest,
    ResultCallback, Source, StoreCallback, StoreFrame, StoreRequest,
};
use crate::{ops, Framework, OpId};
use medley_types::{CoreError, KeySet, Media};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// Drops the keys the source resolves slowly, plus the ones the key
/// registry flags slow by default.
fn filter_slow(fw: &Framework, source: &Rc<dyn Source>, keys: &KeySet) -> KeySet {
    debug!("requested fast keys only");
    let fast = fw.with_key_registry(|registry| registry.filter_fast(keys));
    fast.difference(&source.slow_keys())
}

/// Assembles the pipeline for a streaming verb and posts its dispatch.
///
/// Stages are wired back to front: the user callback, then (with `FULL`)
/// the full-resolution engine, then the relay, which becomes the provider's
/// callback.
fn dispatch_stream(
    fw: &Framework,
    source: &Rc<dyn Source>,
    kind: RequestKind,
    mut keys: KeySet,
    skip: u64,
    count: u64,
    flags: ResolutionFlags,
    user_cb: ResultCallback,
) -> OpId {
    if flags.contains(ResolutionFlags::FAST_ONLY) {
        keys = filter_slow(fw, source, &keys);
    }

    let mut next = user_cb;
    let mut relay_chained = false;
    if flags.contains(ResolutionFlags::FULL) {
        debug!("requested full resolution");
        keys = fw.with_key_registry(|registry| registry.expand(&keys));
        let ctl = Rc::new(RefCell::new(FullResCtl::new(next, keys.clone(), flags)));
        next = fullres::ctl_callback(fw, source, &ctl);
        relay_chained = true;
    }

    let op_id = ops::next_id();
    let mut state = RelayState {
        op_id,
        source: source.clone(),
        kind,
        keys,
        skip,
        count,
        flags,
        chained: relay_chained,
        use_idle: flags.contains(ResolutionFlags::IDLE_RELAY),
        next,
        auto_split: None,
    };

    if let Some(threshold) = source.auto_split_threshold() {
        if threshold > 0 && count > threshold {
            debug!("auto-split: enabled");
            let ctl = crate::autosplit::AutoSplitCtl::new(threshold, count);
            state.count = ctl.chunk_count();
            state.auto_split = Some(ctl);
            debug!(skip, count = state.count, "auto-split: requesting first chunk");
        }
    }

    fw.ops_mut().insert_ongoing(op_id);
    relay::dispatch(fw, &Rc::new(RefCell::new(state)));
    op_id
}

/// Browse `container` on `source`. A `None` container targets the root.
pub(crate) fn browse(
    fw: &Framework,
    source: &Rc<dyn Source>,
    container: Option<MediaHandle>,
    keys: KeySet,
    skip: u64,
    count: u64,
    flags: ResolutionFlags,
    user_cb: ResultCallback,
) -> Result<OpId, CoreError> {
    if !source.caps().contains(Caps::BROWSE) {
        return Err(CoreError::BrowseFailed("source does not support browse".into()));
    }
    if count == 0 {
        return Err(CoreError::BrowseFailed("count must be greater than zero".into()));
    }
    let container = container.unwrap_or_else(|| media_handle(Media::container()));
    Ok(dispatch_stream(fw, source, RequestKind::Browse { container }, keys, skip, count, flags, user_cb))
}

/// Search `text` on `source`. A `None` text applies no filter.
pub(crate) fn search(
    fw: &Framework,
    source: &Rc<dyn Source>,
    text: Option<String>,
    keys: KeySet,
    skip: u64,
    count: u64,
    flags: ResolutionFlags,
    user_cb: ResultCallback,
) -> Result<OpId, CoreError> {
    if !source.caps().contains(Caps::SEARCH) {
        return Err(CoreError::SearchFailed("source does not support search".into()));
    }
    if count == 0 {
        return Err(CoreError::SearchFailed("count must be greater than zero".into()));
    }
    Ok(dispatch_stream(fw, source, RequestKind::Search { text }, keys, skip, count, flags, user_cb))
}

/// Run a source-specific `query` on `source`.
pub(crate) fn query(
    fw: &Framework,
    source: &Rc<dyn Source>,
    query: String,
    keys: KeySet,
    skip: u64,
    count: u64,
    flags: ResolutionFlags,
    user_cb: ResultCallback,
) -> Result<OpId, CoreError> {
    if !source.caps().contains(Caps::QUERY) {
        return Err(CoreError::QueryFailed("source does not support query".into()));
    }
    if count == 0 {
        return Err(CoreError::QueryFailed("count must be greater than zero".into()));
    }
    Ok(dispatch_stream(fw, source, RequestKind::Query { query }, keys, skip, count, flags, user_cb))
}

/// Resolve metadata for `media` on `source`. A `None` media targets the
/// source root.
pub(crate) fn resolve(
    fw: &Framework,
    source: &Rc<dyn Source>,
    media: Option<MediaHandle>,
    keys: KeySet,
    flags: ResolutionFlags,
    user_cb: ResolveCallback,
) -> Result<OpId, CoreError> {
    if !source.caps().contains(Caps::RESOLVE) {
        return Err(CoreError::ResolveFailed("source does not support resolve".into()));
    }
    if keys.is_empty() {
        return Err(CoreError::ResolveFailed("no keys requested".into()));
    }
    let mut keys = keys;
    if flags.contains(ResolutionFlags::FAST_ONLY) {
        keys = filter_slow(fw, source, &keys);
    }
    let media = media.unwrap_or_else(|| media_handle(Media::container()));
    Ok(resolve_with(fw, source, media, keys, flags, user_cb, flags.contains(ResolutionFlags::FULL)))
}

/// Dispatches a resolve against one source.
///
/// `install_full` adds the single-shot enrichment stage; the engine's own
/// auxiliary resolves come through here with it off, which is what keeps
/// enrichment from recursing.
pub(crate) fn resolve_with(
    fw: &Framework,
    source: &Rc<dyn Source>,
    media: MediaHandle,
    mut keys: KeySet,
    flags: ResolutionFlags,
    user_cb: ResolveCallback,
    install_full: bool,
) -> OpId {
    let op_id = ops::next_id();

    let mut next = user_cb;
    let mut chained = false;
    if install_full {
        debug!("requested full metadata resolution");
        keys = fw.with_key_registry(|registry| registry.expand(&keys));
        let ctl = Rc::new(MetaResCtl::new(op_id, next, keys.clone(), flags));
        next = fullres::meta_ctl_callback(fw, source, ctl);
        chained = true;
    }

    let relay_cb = resolve_relay_callback(fw, source, op_id, next, chained);

    fw.ops_mut().insert_ongoing(op_id);
    let priority =
        if flags.contains(ResolutionFlags::IDLE_RELAY) { Priority::Default } else { Priority::High };
    let fw2 = fw.clone();
    let source2 = source.clone();
    fw.queue().post(priority, move || {
        if fw2.op_is_cancelled(op_id) {
            debug!(op_id, "operation was cancelled before dispatch");
            relay_cb(ResolveFrame {
                op_id,
                media: Some(media),
                error: Some(CoreError::OperationCancelled),
            });
            return;
        }
        source2.resolve(
            &fw2,
            ResolveRequest { op_id, media, keys, flags, callback: relay_cb },
        );
    });
    op_id
}

/// The relay of single-shot replies: stamps the source and canonicalizes
/// the error once the operation was cancelled.
fn resolve_relay_callback(
    fw: &Framework,
    source: &Rc<dyn Source>,
    op_id: OpId,
    next: ResolveCallback,
    chained: bool,
) -> ResolveCallback {
    let fw = fw.clone();
    let source_id = source.id().to_string();
    Rc::new(move |mut reply: ResolveFrame| {
        debug!(op_id, "metadata result relay");
        if let Some(media) = reply.media.as_ref() {
            media.borrow_mut().stamp_source(&source_id);
        }
        if fw.op_is_cancelled(op_id) {
            reply.error = Some(CoreError::OperationCancelled);
        }
        next(reply);
        if !chained {
            fw.op_mark_finished(op_id);
        }
    })
}

/// Instantiate media for `uri` on a specific source.
pub(crate) fn media_from_uri(
    fw: &Framework,
    source: &Rc<dyn Source>,
    uri: &str,
    keys: KeySet,
    flags: ResolutionFlags,
    user_cb: ResolveCallback,
) -> Result<OpId, CoreError> {
    if !source.caps().contains(Caps::MEDIA_FROM_URI) {
        return Err(CoreError::MediaFromUriFailed("source does not support media-from-uri".into()));
    }
    let mut keys = keys;
    if flags.contains(ResolutionFlags::FAST_ONLY) {
        keys = filter_slow(fw, source, &keys);
    }

    let op_id = ops::next_id();
    let relay_cb = {
        let fw = fw.clone();
        let source_id = source.id().to_string();
        let relay: ResolveCallback = Rc::new(move |mut reply: ResolveFrame| {
            debug!(op_id, "media-from-uri result relay");
            if let Some(media) = reply.media.as_ref() {
                media.borrow_mut().stamp_source(&source_id);
            }
            if fw.op_is_cancelled(op_id) {
                // A cancelled probe yields no media, whatever the provider
                // answered.
                reply.media = None;
                reply.error = Some(CoreError::OperationCancelled);
            }
            user_cb(reply);
            fw.op_mark_finished(op_id);
        });
        relay
    };

    fw.ops_mut().insert_ongoing(op_id);
    let priority =
        if flags.contains(ResolutionFlags::IDLE_RELAY) { Priority::Default } else { Priority::High };
    let fw2 = fw.clone();
    let source2 = source.clone();
    let uri = uri.to_string();
    fw.queue().post(priority, move || {
        if fw2.op_is_cancelled(op_id) {
            debug!(op_id, "operation was cancelled before dispatch");
            relay_cb(ResolveFrame { op_id, media: None, error: Some(CoreError::OperationCancelled) });
            return;
        }
        source2.media_from_uri(
            &fw2,
            MediaFromUriRequest { op_id, uri, keys, flags, callback: relay_cb },
        );
    });
    Ok(op_id)
}

/// Walk the media-from-uri capable sources and dispatch against the first
/// one that claims `uri`.
///
/// When no source claims it, the callback is invoked once with no media and
/// no error, and `0` is returned.
pub(crate) fn media_from_uri_any(
    fw: &Framework,
    uri: &str,
    keys: KeySet,
    flags: ResolutionFlags,
    user_cb: ResolveCallback,
) -> OpId {
    for source in fw.sources_by_capability(Caps::MEDIA_FROM_URI, true) {
        if !source.test_media_from_uri(uri) {
            continue;
        }
        debug!(source = source.id(), uri, "source claims the uri");
        let uri_owned = uri.to_string();
        let wrapped: ResolveCallback = Rc::new(move |reply: ResolveFrame| {
            if reply.error.is_some() {
                user_cb(ResolveFrame { op_id: reply.op_id, media: None, error: reply.error });
            } else if reply.media.is_some() {
                user_cb(reply);
            } else {
                user_cb(ResolveFrame {
                    op_id: reply.op_id,
                    media: None,
                    error: Some(CoreError::MediaFromUriFailed(format!(
                        "could not resolve media for URI '{uri_owned}'"
                    ))),
                });
            }
        });
        return match media_from_uri(fw, &source, uri, keys, flags, wrapped) {
            Ok(op_id) => op_id,
            Err(_) => 0,
        };
    }

    debug!(uri, "no source claims the uri");
    user_cb(ResolveFrame { op_id: 0, media: None, error: None });
    0
}

/// Store `media` into `parent` (or the root) on `source`.
pub(crate) fn store(
    fw: &Framework,
    source: &Rc<dyn Source>,
    parent: Option<MediaHandle>,
    media: MediaHandle,
    user_cb: StoreCallback,
) -> Result<OpId, CoreError> {
    if !source.caps().contains(Caps::STORE) {
        return Err(CoreError::StoreFailed("source does not support store".into()));
    }
    if let Some(parent) = parent.as_ref() {
        if !parent.borrow().is_container() {
            return Err(CoreError::StoreFailed("parent is not a container".into()));
        }
    }
    {
        let m = media.borrow();
        if m.title().is_none() {
            return Err(CoreError::StoreFailed("media has no title, cannot store".into()));
        }
        if m.url().is_none() && !m.is_container() {
            return Err(CoreError::StoreFailed("media has no URL, cannot store".into()));
        }
    }

    let op_id = ops::next_id();
    fw.ops_mut().insert_ongoing(op_id);
    let callback: StoreCallback = {
        let fw = fw.clone();
        Rc::new(move |frame: StoreFrame| {
            user_cb(frame);
            fw.op_mark_finished(op_id);
        })
    };
    let fw2 = fw.clone();
    let source2 = source.clone();
    fw.queue().post_default(move || {
        source2.store(&fw2, StoreRequest { op_id, parent, media, callback });
    });
    Ok(op_id)
}

/// Remove `media` from `source`.
pub(crate) fn remove(
    fw: &Framework,
    source: &Rc<dyn Source>,
    media: MediaHandle,
    user_cb: RemoveCallback,
) -> Result<OpId, CoreError> {
    if !source.caps().contains(Caps::REMOVE) {
        return Err(CoreError::RemoveFailed("source does not support remove".into()));
    }
    let media_id = match media.borrow().id() {
        Some(id) => id.to_owned(),
        None => return Err(CoreError::RemoveFailed("media has no id, cannot remove".into())),
    };

    let op_id = ops::next_id();
    fw.ops_mut().insert_ongoing(op_id);
    let callback: RemoveCallback = {
        let fw = fw.clone();
        Rc::new(move |frame: RemoveFrame| {
            user_cb(frame);
            fw.op_mark_finished(op_id);
        })
    };
    let fw2 = fw.clone();
    let source2 = source.clone();
    fw.queue().post_default(move || {
        source2.remove(&fw2, RemoveRequest { op_id, media_id, media, callback });
    });
    Ok(op_id)
}
