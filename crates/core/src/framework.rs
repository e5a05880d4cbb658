use crate::multi::{self, MultiCtl};
use crate::ops::Operations;
use crate::registry::SourceRegistry;
use crate::sched::TaskQueue;
use crate::source::{
    media_handle, Caps, ChangeCallback, ChangeEvent, ChangeKind, MediaHandle, RemoveCallback,
    ResolutionFlags, ResolveCallback, ResultCallback, Source, StoreCallback,
};
use crate::{dispatch, OpId};
use medley_types::{CoreError, KeyRegistry, KeySet, Media, MetadataKey, ProviderConfig};
use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

/// Identifier of a change-notification subscription.
pub type SubscriptionId = u64;

struct Inner {
    queue: TaskQueue,
    ops: RefCell<Operations>,
    sources: RefCell<SourceRegistry>,
    keys: RefCell<KeyRegistry>,
    configs: RefCell<Vec<ProviderConfig>>,
    multi: RefCell<HashMap<OpId, Rc<RefCell<MultiCtl>>>>,
    subscribers: RefCell<Vec<(SubscriptionId, ChangeCallback)>>,
    next_subscription: Cell<SubscriptionId>,
}

/// The framework handle.
///
/// Owns the task queue, the operation registry, the source registry, the
/// metadata-key registry and the configuration table; there are no process
/// globals. The handle is cheap to clone, and all clones share state. The
/// whole framework is single-threaded and cooperative: nothing happens
/// until the queue is pumped with [`Framework::run_until_idle`] (or
/// [`TaskQueue::run_one`] on the handle from [`Framework::queue`]).
#[derive(Clone)]
pub struct Framework {
    inner: Rc<Inner>,
}

impl std::fmt::Debug for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framework")
            .field("queue", &self.inner.queue)
            .field("ops", &self.inner.ops.borrow())
            .field("sources", &self.inner.sources.borrow())
            .finish()
    }
}

impl Default for Framework {
    fn default() -> Self {
        Self::new()
    }
}

impl Framework {
    /// Creates a framework with the system metadata keys and no sources.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                queue: TaskQueue::new(),
                ops: RefCell::new(Operations::default()),
                sources: RefCell::new(SourceRegistry::default()),
                keys: RefCell::new(KeyRegistry::system()),
                configs: RefCell::new(Vec::new()),
                multi: RefCell::new(HashMap::new()),
                subscribers: RefCell::new(Vec::new()),
                next_subscription: Cell::new(1),
            }),
        }
    }

    /// The shared task queue.
    pub fn queue(&self) -> TaskQueue {
        self.inner.queue.clone()
    }

    /// Pumps the task queue until it is idle. Returns how many tasks ran.
    pub fn run_until_idle(&self) -> usize {
        self.inner.queue.run_until_idle()
    }

    // ---- sources ----

    /// Registers a source, replacing any source with the same id.
    pub fn register_source(&self, source: Rc<dyn Source>) {
        self.inner.sources.borrow_mut().register(source);
    }

    /// Unregisters and returns the source with the given id.
    pub fn unregister_source(&self, id: &str) -> Option<Rc<dyn Source>> {
        self.inner.sources.borrow_mut().unregister(id)
    }

    /// The source with the given id.
    pub fn source_by_id(&self, id: &str) -> Option<Rc<dyn Source>> {
        self.inner.sources.borrow().get(id)
    }

    /// All sources advertising `caps`, rank-ordered when `ranked`.
    pub fn sources_by_capability(&self, caps: Caps, ranked: bool) -> Vec<Rc<dyn Source>> {
        self.inner.sources.borrow().by_capability(caps, ranked)
    }

    /// The resolve-capable sources that can fill keys still missing on
    /// `media`, excluding `origin_id`.
    pub fn additional_sources_for(
        &self,
        origin_id: &str,
        media: &MediaHandle,
        keys: &KeySet,
    ) -> Vec<Rc<dyn Source>> {
        self.inner.sources.borrow().additional_sources_for(origin_id, media, keys)
    }

    // ---- metadata keys ----

    /// Registers a metadata key and returns its identifier.
    pub fn register_key(
        &self,
        name: &str,
        slow: bool,
        dependencies: &[MetadataKey],
    ) -> MetadataKey {
        self.inner.keys.borrow_mut().register(name, slow, dependencies)
    }

    /// Runs `f` with the key registry.
    pub fn with_key_registry<R>(&self, f: impl FnOnce(&KeyRegistry) -> R) -> R {
        f(&self.inner.keys.borrow())
    }

    // ---- configuration ----

    /// Adds a provider configuration.
    pub fn add_config(&self, config: ProviderConfig) {
        debug!(plugin = config.plugin(), "adding configuration");
        self.inner.configs.borrow_mut().push(config);
    }

    /// The configurations registered for `plugin`.
    pub fn configs_for(&self, plugin: &str) -> Vec<ProviderConfig> {
        self.inner
            .configs
            .borrow()
            .iter()
            .filter(|c| c.plugin() == plugin)
            .cloned()
            .collect()
    }

    // ---- operations ----

    /// Cancels an operation.
    ///
    /// Idempotent and safe from any callback. The user still receives
    /// exactly one terminal frame, carrying the canonical cancelled error.
    pub fn cancel(&self, op_id: OpId) {
        debug!(op_id, "cancel requested");
        let hook = self.inner.ops.borrow_mut().begin_cancel(op_id);
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Installs a hook invoked when the operation is first cancelled.
    /// Providers use this to abort in-flight work.
    pub fn set_cancel_hook(&self, op_id: OpId, hook: impl FnOnce() + 'static) {
        self.inner.ops.borrow_mut().set_cancel_hook(op_id, Box::new(hook));
    }

    /// Attaches opaque data to an operation; it lives until the operation
    /// finishes.
    pub fn set_operation_data(&self, op_id: OpId, data: Rc<dyn Any>) {
        self.inner.ops.borrow_mut().set_data(op_id, data);
    }

    /// The data previously attached to an operation.
    pub fn operation_data(&self, op_id: OpId) -> Option<Rc<dyn Any>> {
        self.inner.ops.borrow().data(op_id)
    }

    /// True while the operation is neither cancelled, completed nor
    /// finished.
    pub fn is_operation_ongoing(&self, op_id: OpId) -> bool {
        self.inner.ops.borrow().is_ongoing(op_id)
    }

    /// True once the operation was cancelled.
    pub fn is_operation_cancelled(&self, op_id: OpId) -> bool {
        self.inner.ops.borrow().is_cancelled(op_id)
    }

    /// True once the operation's terminal frame was seen.
    pub fn is_operation_completed(&self, op_id: OpId) -> bool {
        self.inner.ops.borrow().is_completed(op_id)
    }

    /// True once the operation's state was dropped.
    pub fn is_operation_finished(&self, op_id: OpId) -> bool {
        self.inner.ops.borrow().is_finished(op_id)
    }

    // ---- verbs ----

    /// Browses `container` (or the source root) on `source`.
    ///
    /// Streams results into `callback`: zero or more item frames followed
    /// by exactly one terminal frame.
    pub fn browse(
        &self,
        source: Rc<dyn Source>,
        container: Option<MediaHandle>,
        keys: KeySet,
        skip: u64,
        count: u64,
        flags: ResolutionFlags,
        callback: ResultCallback,
    ) -> Result<OpId, CoreError> {
        dispatch::browse(self, &source, container, keys, skip, count, flags, callback)
    }

    /// Searches `text` on `source`. `None` text applies no filter; sources
    /// unable to do that answer with
    /// [`CoreError::SearchNullUnsupported`].
    pub fn search(
        &self,
        source: Rc<dyn Source>,
        text: Option<&str>,
        keys: KeySet,
        skip: u64,
        count: u64,
        flags: ResolutionFlags,
        callback: ResultCallback,
    ) -> Result<OpId, CoreError> {
        dispatch::search(self, &source, text.map(ToOwned::to_owned), keys, skip, count, flags, callback)
    }

    /// Runs a source-specific `query` on `source`.
    pub fn query(
        &self,
        source: Rc<dyn Source>,
        query: &str,
        keys: KeySet,
        skip: u64,
        count: u64,
        flags: ResolutionFlags,
        callback: ResultCallback,
    ) -> Result<OpId, CoreError> {
        dispatch::query(self, &source, query.to_owned(), keys, skip, count, flags, callback)
    }

    /// Resolves metadata `keys` for `media` (or the source root) on
    /// `source`. The callback is invoked exactly once.
    pub fn resolve(
        &self,
        source: Rc<dyn Source>,
        media: Option<MediaHandle>,
        keys: KeySet,
        flags: ResolutionFlags,
        callback: ResolveCallback,
    ) -> Result<OpId, CoreError> {
        dispatch::resolve(self, &source, media, keys, flags, callback)
    }

    /// Instantiates a media record for `uri` on a specific source.
    pub fn media_from_uri(
        &self,
        source: Rc<dyn Source>,
        uri: &str,
        keys: KeySet,
        flags: ResolutionFlags,
        callback: ResolveCallback,
    ) -> Result<OpId, CoreError> {
        dispatch::media_from_uri(self, &source, uri, keys, flags, callback)
    }

    /// Walks the media-from-uri capable sources in rank order and
    /// dispatches against the first one claiming `uri`. When none does, the
    /// callback is invoked once with no media and no error, and 0 is
    /// returned.
    pub fn media_from_uri_any(
        &self,
        uri: &str,
        keys: KeySet,
        flags: ResolutionFlags,
        callback: ResolveCallback,
    ) -> OpId {
        dispatch::media_from_uri_any(self, uri, keys, flags, callback)
    }

    /// Stores `media` into `parent` (or the source root) on `source`.
    /// Media must carry a title, and a URL unless it is a container.
    pub fn store(
        &self,
        source: Rc<dyn Source>,
        parent: Option<MediaHandle>,
        media: MediaHandle,
        callback: StoreCallback,
    ) -> Result<OpId, CoreError> {
        dispatch::store(self, &source, parent, media, callback)
    }

    /// Removes `media` (which must carry an id) from `source`.
    pub fn remove(
        &self,
        source: Rc<dyn Source>,
        media: MediaHandle,
        callback: RemoveCallback,
    ) -> Result<OpId, CoreError> {
        dispatch::remove(self, &source, media, callback)
    }

    /// Searches `text` across `sources`, or across every search-capable
    /// source when `None`.
    ///
    /// The requested count is partitioned across the sources and topped up
    /// from sources that still have results when others under-deliver.
    /// Returns 0 (after posting a single error frame) when nothing can be
    /// searched.
    pub fn multi_search(
        &self,
        sources: Option<Vec<Rc<dyn Source>>>,
        text: Option<&str>,
        keys: KeySet,
        count: u64,
        flags: ResolutionFlags,
        callback: ResultCallback,
    ) -> OpId {
        multi::multi_search(self, sources, text.map(ToOwned::to_owned), keys, count, flags, callback)
    }

    /// The federated searches still in flight.
    pub fn active_multi_searches(&self) -> Vec<OpId> {
        self.inner.multi.borrow().keys().copied().collect()
    }

    // ---- change notification ----

    /// Subscribes to content-change notifications from all sources.
    pub fn subscribe_changes(&self, callback: ChangeCallback) -> SubscriptionId {
        let id = self.inner.next_subscription.get();
        self.inner.next_subscription.set(id + 1);
        self.inner.subscribers.borrow_mut().push((id, callback));
        id
    }

    /// Drops a change-notification subscription.
    pub fn unsubscribe_changes(&self, id: SubscriptionId) {
        self.inner.subscribers.borrow_mut().retain(|(sid, _)| *sid != id);
    }

    /// Asks `source` to start detecting content changes.
    pub fn notify_change_start(&self, source: Rc<dyn Source>) -> Result<(), CoreError> {
        if !source.caps().contains(Caps::NOTIFY_CHANGE) {
            return Err(CoreError::MetadataFailed(
                "source does not support change notification".into(),
            ));
        }
        source.notify_change_start(self)
    }

    /// Asks `source` to stop detecting content changes.
    pub fn notify_change_stop(&self, source: Rc<dyn Source>) -> Result<(), CoreError> {
        if !source.caps().contains(Caps::NOTIFY_CHANGE) {
            return Err(CoreError::MetadataFailed(
                "source does not support change notification".into(),
            ));
        }
        source.notify_change_stop(self)
    }

    /// Fans a content change out to all subscribers.
    ///
    /// Intended to be called by sources. Every item is stamped with
    /// `source_id` first; an empty item list stands for the source root.
    pub fn notify_change(
        &self,
        source_id: &str,
        items: Vec<MediaHandle>,
        kind: ChangeKind,
        location_unknown: bool,
    ) {
        let items = if items.is_empty() {
            vec![media_handle(Media::container())]
        } else {
            items
        };
        for item in &items {
            item.borrow_mut().stamp_source(source_id);
        }
        let event =
            ChangeEvent { source_id: source_id.to_owned(), items, kind, location_unknown };
        let subscribers: Vec<ChangeCallback> =
            self.inner.subscribers.borrow().iter().map(|(_, cb)| cb.clone()).collect();
        for subscriber in subscribers {
            subscriber(&event);
        }
    }

    // ---- crate internals ----

    pub(crate) fn ops(&self) -> Ref<'_, Operations> {
        self.inner.ops.borrow()
    }

    pub(crate) fn ops_mut(&self) -> RefMut<'_, Operations> {
        self.inner.ops.borrow_mut()
    }

    pub(crate) fn op_is_ongoing(&self, op_id: OpId) -> bool {
        self.ops().is_ongoing(op_id)
    }

    pub(crate) fn op_is_cancelled(&self, op_id: OpId) -> bool {
        self.ops().is_cancelled(op_id)
    }

    pub(crate) fn op_is_completed(&self, op_id: OpId) -> bool {
        self.ops().is_completed(op_id)
    }

    pub(crate) fn op_is_finished(&self, op_id: OpId) -> bool {
        self.ops().is_finished(op_id)
    }

    pub(crate) fn op_mark_completed(&self, op_id: OpId) {
        self.ops_mut().mark_completed(op_id);
    }

    pub(crate) fn op_mark_finished(&self, op_id: OpId) {
        self.ops_mut().mark_finished(op_id);
    }

    pub(crate) fn multi_insert(&self, op_id: OpId, ctl: Rc<RefCell<MultiCtl>>) {
        self.inner.multi.borrow_mut().insert(op_id, ctl);
    }

    pub(crate) fn multi_remove(&self, op_id: OpId) {
        self.inner.multi.borrow_mut().remove(&op_id);
    }
}
