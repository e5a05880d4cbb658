//! A scripted in-memory source for exercising the dispatch pipeline.

use medley_core::sched::TaskQueue;
use medley_core::source::{
    media_handle, BrowseRequest, Caps, ChangeKind, MediaFromUriRequest, QueryRequest,
    RemoveFrame, RemoveRequest, ResolveFrame, ResolveRequest, ResultCallback, ResultFrame,
    SearchRequest, Source, StoreFrame, StoreRequest,
};
use medley_core::{Framework, OpId};
use medley_types::{CoreError, KeySet, Media, MetadataKey, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;
use url::Url;

/// Runs `task` after the queue went around `ticks` times.
///
/// Used to script slow providers: each tick defers the task by one more
/// default-band round trip.
pub fn after_ticks(queue: &TaskQueue, ticks: usize, task: Box<dyn FnOnce()>) {
    if ticks == 0 {
        queue.post_default(task);
    } else {
        let queue2 = queue.clone();
        queue.post_default(move || after_ticks(&queue2, ticks - 1, task));
    }
}

/// One verb invocation a [`MockSource`] served, for asserting on what the
/// framework actually requested.
#[derive(Debug, Clone)]
pub struct ServedRequest {
    /// The verb name.
    pub verb: &'static str,
    /// The requested skip.
    pub skip: u64,
    /// The requested count.
    pub count: u64,
    /// The requested keys.
    pub keys: KeySet,
}

/// A deterministic fake source.
///
/// Serves a fixed (or generated) catalogue for the streaming verbs, fills
/// scripted values on resolve, claims URIs by scheme, and records every
/// request it was handed. Emission is synchronous by default; with
/// [`MockSource::emitting_via_queue`] every frame becomes its own task,
/// which is what lets tests cancel mid-stream.
pub struct MockSource {
    id: String,
    name: String,
    rank: i32,
    caps: Caps,
    auto_split: Option<u64>,
    supported: KeySet,
    slow: KeySet,
    items: RefCell<Vec<Media>>,
    unbounded: bool,
    emit_via_queue: bool,
    null_text_ok: bool,
    search_error: Option<CoreError>,
    resolve_fill: RefCell<Vec<(MetadataKey, Value)>>,
    resolve_error: Option<CoreError>,
    resolve_delays: RefCell<HashMap<String, usize>>,
    claim_scheme: Option<String>,
    empty_media_from_uri: bool,
    requests: RefCell<Vec<ServedRequest>>,
    notify_active: Cell<bool>,
}

impl std::fmt::Debug for MockSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSource")
            .field("id", &self.id)
            .field("caps", &self.caps)
            .field("items", &self.items.borrow().len())
            .finish()
    }
}

impl MockSource {
    /// Creates a browse/search/query-capable source with an empty catalogue.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: format!("Mock {id}"),
            id,
            rank: 0,
            caps: Caps::BROWSE | Caps::SEARCH | Caps::QUERY,
            auto_split: None,
            supported: KeySet::of(&[MetadataKey::ID, MetadataKey::TITLE, MetadataKey::URL]),
            slow: KeySet::new(),
            items: RefCell::new(Vec::new()),
            unbounded: false,
            emit_via_queue: false,
            null_text_ok: true,
            search_error: None,
            resolve_fill: RefCell::new(Vec::new()),
            resolve_error: None,
            resolve_delays: RefCell::new(HashMap::new()),
            claim_scheme: None,
            empty_media_from_uri: false,
            requests: RefCell::new(Vec::new()),
            notify_active: Cell::new(false),
        }
    }

    /// Overrides the capability set.
    pub fn with_caps(mut self, caps: Caps) -> Self {
        self.caps = caps;
        self
    }

    /// Sets the rank.
    pub fn with_rank(mut self, rank: i32) -> Self {
        self.rank = rank;
        self
    }

    /// Fills the catalogue with `n` generated audio items.
    pub fn with_items(self, n: usize) -> Self {
        for i in 0..n as u64 {
            let item = self.generated_item(i);
            self.items.borrow_mut().push(item);
        }
        self
    }

    /// Adds one record to the catalogue.
    pub fn with_media(self, media: Media) -> Self {
        self.items.borrow_mut().push(media);
        self
    }

    /// Serves exactly `count` generated items for any request, as a source
    /// with endless content would.
    pub fn unbounded(mut self) -> Self {
        self.unbounded = true;
        self
    }

    /// Emits every frame as its own task instead of synchronously.
    pub fn emitting_via_queue(mut self) -> Self {
        self.emit_via_queue = true;
        self
    }

    /// Enables auto-split at the given threshold.
    pub fn with_auto_split(mut self, threshold: u64) -> Self {
        self.auto_split = Some(threshold);
        self
    }

    /// Overrides the supported keys.
    pub fn with_supported_keys(mut self, keys: KeySet) -> Self {
        self.supported = keys;
        self
    }

    /// Declares keys this source resolves slowly.
    pub fn with_slow_keys(mut self, keys: KeySet) -> Self {
        self.slow = keys;
        self
    }

    /// Rejects NULL-text searches.
    pub fn rejecting_null_text(mut self) -> Self {
        self.null_text_ok = false;
        self
    }

    /// Fails every search with `error`.
    pub fn failing_search(mut self, error: CoreError) -> Self {
        self.search_error = Some(error);
        self
    }

    /// Offers `value` under `key` when asked to resolve.
    pub fn resolving(self, key: MetadataKey, value: impl Into<Value>) -> Self {
        self.resolve_fill.borrow_mut().push((key, value.into()));
        self
    }

    /// Fails every resolve with `error`.
    pub fn failing_resolve(mut self, error: CoreError) -> Self {
        self.resolve_error = Some(error);
        self
    }

    /// Delays the resolve of the media with `media_id` by `ticks` queue
    /// round trips.
    pub fn with_resolve_delay(self, media_id: impl Into<String>, ticks: usize) -> Self {
        self.resolve_delays.borrow_mut().insert(media_id.into(), ticks);
        self
    }

    /// Claims URIs with the given scheme for media-from-uri.
    pub fn claiming_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.claim_scheme = Some(scheme.into());
        self
    }

    /// Claims URIs but answers media-from-uri with no media.
    pub fn with_empty_media_from_uri(mut self) -> Self {
        self.empty_media_from_uri = true;
        self
    }

    /// Finishes the builder.
    pub fn into_rc(self) -> Rc<Self> {
        Rc::new(self)
    }

    /// Everything this source was asked to serve.
    pub fn requests(&self) -> Vec<ServedRequest> {
        self.requests.borrow().clone()
    }

    /// The current catalogue.
    pub fn catalogue(&self) -> Vec<Media> {
        self.items.borrow().clone()
    }

    /// True after `notify_change_start` and before `notify_change_stop`.
    pub fn notify_active(&self) -> bool {
        self.notify_active.get()
    }

    /// Pushes a content-change notification through the framework.
    pub fn emit_change(
        &self,
        fw: &Framework,
        medias: Vec<Media>,
        kind: ChangeKind,
        location_unknown: bool,
    ) {
        fw.notify_change(
            &self.id,
            medias.into_iter().map(media_handle).collect(),
            kind,
            location_unknown,
        );
    }

    fn generated_item(&self, i: u64) -> Media {
        Media::audio()
            .with_id(format!("{}-item-{i}", self.id))
            .with_title(format!("Item {i}"))
            .with_url(format!("https://{}.example/items/{i}", self.id))
    }

    fn log(&self, verb: &'static str, skip: u64, count: u64, keys: &KeySet) {
        debug!(source = %self.id, verb, skip, count, "mock source serving");
        self.requests.borrow_mut().push(ServedRequest { verb, skip, count, keys: keys.clone() });
    }

    fn slice(&self, skip: u64, count: u64) -> Vec<Media> {
        if self.unbounded {
            (skip..skip + count).map(|i| self.generated_item(i)).collect()
        } else {
            self.items.borrow().iter().skip(skip as usize).take(count as usize).cloned().collect()
        }
    }

    fn emit_frames(
        &self,
        fw: &Framework,
        callback: ResultCallback,
        op_id: OpId,
        medias: Vec<Media>,
        error: Option<CoreError>,
    ) {
        let mut frames = Vec::new();
        if error.is_some() {
            frames.push(ResultFrame { op_id, media: None, remaining: 0, error });
        } else if medias.is_empty() {
            frames.push(ResultFrame { op_id, media: None, remaining: 0, error: None });
        } else {
            let n = medias.len() as u64;
            for (i, media) in medias.into_iter().enumerate() {
                frames.push(ResultFrame {
                    op_id,
                    media: Some(media_handle(media)),
                    remaining: n - 1 - i as u64,
                    error: None,
                });
            }
        }

        if self.emit_via_queue {
            let queue = fw.queue();
            for frame in frames {
                let callback = callback.clone();
                queue.post_default(move || callback(frame));
            }
        } else {
            for frame in frames {
                callback(frame);
            }
        }
    }
}

impl Source for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn rank(&self) -> i32 {
        self.rank
    }

    fn caps(&self) -> Caps {
        self.caps
    }

    fn supported_keys(&self) -> KeySet {
        self.supported.clone()
    }

    fn slow_keys(&self) -> KeySet {
        self.slow.clone()
    }

    fn auto_split_threshold(&self) -> Option<u64> {
        self.auto_split
    }

    fn browse(&self, fw: &Framework, request: BrowseRequest) {
        self.log("browse", request.skip, request.count, &request.keys);
        let medias = self.slice(request.skip, request.count);
        self.emit_frames(fw, request.callback, request.op_id, medias, None);
    }

    fn search(&self, fw: &Framework, request: SearchRequest) {
        self.log("search", request.skip, request.count, &request.keys);
        if request.text.is_none() && !self.null_text_ok {
            self.emit_frames(
                fw,
                request.callback,
                request.op_id,
                Vec::new(),
                Some(CoreError::SearchNullUnsupported),
            );
            return;
        }
        if let Some(error) = self.search_error.clone() {
            self.emit_frames(fw, request.callback, request.op_id, Vec::new(), Some(error));
            return;
        }
        let medias = self.slice(request.skip, request.count);
        self.emit_frames(fw, request.callback, request.op_id, medias, None);
    }

    fn query(&self, fw: &Framework, request: QueryRequest) {
        self.log("query", request.skip, request.count, &request.keys);
        let medias = self.slice(request.skip, request.count);
        self.emit_frames(fw, request.callback, request.op_id, medias, None);
    }

    fn resolve(&self, fw: &Framework, request: ResolveRequest) {
        self.log("resolve", 0, 0, &request.keys);
        let delay = request
            .media
            .borrow()
            .id()
            .and_then(|id| self.resolve_delays.borrow().get(id).copied())
            .unwrap_or(0);
        let error = self.resolve_error.clone();
        let fills: Vec<(MetadataKey, Value)> = self
            .resolve_fill
            .borrow()
            .iter()
            .filter(|(key, _)| request.keys.contains(*key))
            .cloned()
            .collect();
        let media = request.media.clone();
        let callback = request.callback.clone();
        let op_id = request.op_id;
        after_ticks(
            &fw.queue(),
            delay,
            Box::new(move || {
                if let Some(error) = error {
                    callback(ResolveFrame { op_id, media: Some(media), error: Some(error) });
                    return;
                }
                {
                    let mut m = media.borrow_mut();
                    for (key, value) in fills {
                        m.set_if_missing(key, value);
                    }
                }
                callback(ResolveFrame { op_id, media: Some(media), error: None });
            }),
        );
    }

    fn test_media_from_uri(&self, uri: &str) -> bool {
        match (&self.claim_scheme, Url::parse(uri)) {
            (Some(scheme), Ok(url)) => url.scheme() == scheme,
            _ => false,
        }
    }

    fn media_from_uri(&self, fw: &Framework, request: MediaFromUriRequest) {
        self.log("media-from-uri", 0, 0, &request.keys);
        let media = (!self.empty_media_from_uri).then(|| {
            media_handle(
                Media::video()
                    .with_id(request.uri.clone())
                    .with_title(format!("Media at {}", request.uri))
                    .with_url(request.uri.clone()),
            )
        });
        let callback = request.callback.clone();
        let op_id = request.op_id;
        fw.queue().post_default(move || callback(ResolveFrame { op_id, media, error: None }));
    }

    fn store(&self, fw: &Framework, request: StoreRequest) {
        self.items.borrow_mut().push(request.media.borrow().clone());
        let callback = request.callback.clone();
        let frame = StoreFrame {
            op_id: request.op_id,
            parent: request.parent.clone(),
            media: request.media.clone(),
            error: None,
        };
        fw.queue().post_default(move || callback(frame));
    }

    fn remove(&self, fw: &Framework, request: RemoveRequest) {
        let found = {
            let mut items = self.items.borrow_mut();
            let before = items.len();
            items.retain(|m| m.id() != Some(request.media_id.as_str()));
            items.len() < before
        };
        let error = (!found).then(|| {
            CoreError::RemoveFailed(format!("no media with id '{}'", request.media_id))
        });
        let callback = request.callback.clone();
        let frame = RemoveFrame { op_id: request.op_id, media: request.media.clone(), error };
        fw.queue().post_default(move || callback(frame));
    }

    fn notify_change_start(&self, _fw: &Framework) -> Result<(), CoreError> {
        self.notify_active.set(true);
        Ok(())
    }

    fn notify_change_stop(&self, _fw: &Framework) -> Result<(), CoreError> {
        self.notify_active.set(false);
        Ok(())
    }
}
