use crate::{Framework, OpId};
use bitflags::bitflags;
use medley_types::{CoreError, KeySet, Media};
use std::cell::RefCell;
use std::rc::Rc;

/// Remaining-count sentinel for "the provider does not know".
///
/// Providers that cannot tell how many results are left may report this
/// instead of an exact count. The framework passes it through untouched and
/// the federator treats it as making no shortfall claim; only an exact `0`
/// terminates a stream.
pub const REMAINING_UNKNOWN: u64 = u64::MAX;

bitflags! {
    /// Capabilities a source advertises.
    ///
    /// Dispatch inspects this bitmask, never the concrete type: a verb is
    /// only invoked on sources that advertise the matching capability.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Caps: u32 {
        /// Browsing containers.
        const BROWSE = 1 << 0;
        /// Free-text search.
        const SEARCH = 1 << 1;
        /// Source-specific query language.
        const QUERY = 1 << 2;
        /// Resolving metadata for a single item.
        const RESOLVE = 1 << 3;
        /// Instantiating media from a URI.
        const MEDIA_FROM_URI = 1 << 4;
        /// Storing new media.
        const STORE = 1 << 5;
        /// Removing media.
        const REMOVE = 1 << 6;
        /// Emitting content-change notifications.
        const NOTIFY_CHANGE = 1 << 7;
    }
}

bitflags! {
    /// Behaviour knobs of a single operation.
    ///
    /// Unknown bits are ignored; build values with
    /// [`ResolutionFlags::from_bits_truncate`] when interfacing with foreign
    /// bitmasks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResolutionFlags: u32 {
        /// Drop keys that are slow to resolve.
        const FAST_ONLY = 1 << 0;
        /// Enrich every result through auxiliary sources.
        const FULL = 1 << 1;
        /// Hand results over through the task queue at default priority
        /// instead of synchronously.
        const IDLE_RELAY = 1 << 2;
    }
}

/// Shared handle to a media record flowing through the pipeline.
///
/// Several pipeline stages may hold the same record at once (the relay, a
/// pending enrichment, the waiting list), so records are reference counted.
pub type MediaHandle = Rc<RefCell<Media>>;

/// Wraps a media record into a shareable pipeline handle.
pub fn media_handle(media: Media) -> MediaHandle {
    Rc::new(RefCell::new(media))
}

/// One emission of a streaming operation.
#[derive(Debug, Clone)]
pub struct ResultFrame {
    /// The operation this frame belongs to.
    pub op_id: OpId,
    /// The item, if this frame carries one.
    pub media: Option<MediaHandle>,
    /// Results still to come after this frame; `0` marks the terminal frame.
    pub remaining: u64,
    /// The error, if any.
    pub error: Option<CoreError>,
}

/// The single reply of a resolve or media-from-uri operation.
#[derive(Debug, Clone)]
pub struct ResolveFrame {
    /// The operation this reply belongs to.
    pub op_id: OpId,
    /// The resolved item, if any.
    pub media: Option<MediaHandle>,
    /// The error, if any.
    pub error: Option<CoreError>,
}

/// The single reply of a store operation.
#[derive(Debug, Clone)]
pub struct StoreFrame {
    /// The operation this reply belongs to.
    pub op_id: OpId,
    /// The container the media was stored into, if one was given.
    pub parent: Option<MediaHandle>,
    /// The stored media.
    pub media: MediaHandle,
    /// The error, if any.
    pub error: Option<CoreError>,
}

/// The single reply of a remove operation.
#[derive(Debug, Clone)]
pub struct RemoveFrame {
    /// The operation this reply belongs to.
    pub op_id: OpId,
    /// The removed media.
    pub media: MediaHandle,
    /// The error, if any.
    pub error: Option<CoreError>,
}

/// Callback of a streaming operation. Invoked once per frame, ending with
/// exactly one terminal frame.
pub type ResultCallback = Rc<dyn Fn(ResultFrame)>;

/// Callback of a resolve or media-from-uri operation. Invoked exactly once.
pub type ResolveCallback = Rc<dyn Fn(ResolveFrame)>;

/// Callback of a store operation. Invoked exactly once.
pub type StoreCallback = Rc<dyn Fn(StoreFrame)>;

/// Callback of a remove operation. Invoked exactly once.
pub type RemoveCallback = Rc<dyn Fn(RemoveFrame)>;

/// A browse request as seen by a source.
#[derive(Clone)]
pub struct BrowseRequest {
    /// The operation id.
    pub op_id: OpId,
    /// The container to browse. A container without an id is the root.
    pub container: MediaHandle,
    /// The metadata keys to fill on each result.
    pub keys: KeySet,
    /// Results to skip from the start.
    pub skip: u64,
    /// Results to deliver at most. Always greater than zero.
    pub count: u64,
    /// The operation flags.
    pub flags: ResolutionFlags,
    /// Where to emit frames. Must receive exactly one terminal frame.
    pub callback: ResultCallback,
}

/// A free-text search request as seen by a source.
#[derive(Clone)]
pub struct SearchRequest {
    /// The operation id.
    pub op_id: OpId,
    /// The text to search for. `None` applies no text filter; sources that
    /// cannot do that answer with [`CoreError::SearchNullUnsupported`].
    pub text: Option<String>,
    /// The metadata keys to fill on each result.
    pub keys: KeySet,
    /// Results to skip from the start.
    pub skip: u64,
    /// Results to deliver at most. Always greater than zero.
    pub count: u64,
    /// The operation flags.
    pub flags: ResolutionFlags,
    /// Where to emit frames. Must receive exactly one terminal frame.
    pub callback: ResultCallback,
}

/// A source-specific query request as seen by a source.
#[derive(Clone)]
pub struct QueryRequest {
    /// The operation id.
    pub op_id: OpId,
    /// The query, in whatever language the source understands.
    pub query: String,
    /// The metadata keys to fill on each result.
    pub keys: KeySet,
    /// Results to skip from the start.
    pub skip: u64,
    /// Results to deliver at most. Always greater than zero.
    pub count: u64,
    /// The operation flags.
    pub flags: ResolutionFlags,
    /// Where to emit frames. Must receive exactly one terminal frame.
    pub callback: ResultCallback,
}

/// A metadata-resolve request as seen by a source.
///
/// The full requested key set is handed over; the source is expected to
/// no-op for keys the record already carries.
#[derive(Clone)]
pub struct ResolveRequest {
    /// The operation id.
    pub op_id: OpId,
    /// The record to enrich. A container without an id is the source root.
    pub media: MediaHandle,
    /// The metadata keys to resolve.
    pub keys: KeySet,
    /// The operation flags.
    pub flags: ResolutionFlags,
    /// Where to deliver the single reply.
    pub callback: ResolveCallback,
}

/// A media-from-uri request as seen by a source.
#[derive(Clone)]
pub struct MediaFromUriRequest {
    /// The operation id.
    pub op_id: OpId,
    /// The URI identifying the media resource.
    pub uri: String,
    /// The metadata keys to fill on the result.
    pub keys: KeySet,
    /// The operation flags.
    pub flags: ResolutionFlags,
    /// Where to deliver the single reply.
    pub callback: ResolveCallback,
}

/// A store request as seen by a source.
#[derive(Clone)]
pub struct StoreRequest {
    /// The operation id.
    pub op_id: OpId,
    /// The container to store into, or `None` for the source root.
    pub parent: Option<MediaHandle>,
    /// The media to store.
    pub media: MediaHandle,
    /// Where to deliver the single reply.
    pub callback: StoreCallback,
}

/// A remove request as seen by a source.
#[derive(Clone)]
pub struct RemoveRequest {
    /// The operation id.
    pub op_id: OpId,
    /// The id of the media to remove.
    pub media_id: String,
    /// The media to remove.
    pub media: MediaHandle,
    /// Where to deliver the single reply.
    pub callback: RemoveCallback,
}

impl std::fmt::Debug for BrowseRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowseRequest")
            .field("op_id", &self.op_id)
            .field("container", &self.container)
            .field("keys", &self.keys)
            .field("skip", &self.skip)
            .field("count", &self.count)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for SearchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchRequest")
            .field("op_id", &self.op_id)
            .field("text", &self.text)
            .field("keys", &self.keys)
            .field("skip", &self.skip)
            .field("count", &self.count)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for QueryRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRequest")
            .field("op_id", &self.op_id)
            .field("query", &self.query)
            .field("keys", &self.keys)
            .field("skip", &self.skip)
            .field("count", &self.count)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for ResolveRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolveRequest")
            .field("op_id", &self.op_id)
            .field("media", &self.media)
            .field("keys", &self.keys)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for MediaFromUriRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaFromUriRequest")
            .field("op_id", &self.op_id)
            .field("uri", &self.uri)
            .field("keys", &self.keys)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for StoreRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRequest")
            .field("op_id", &self.op_id)
            .field("parent", &self.parent)
            .field("media", &self.media)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for RemoveRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoveRequest")
            .field("op_id", &self.op_id)
            .field("media_id", &self.media_id)
            .field("media", &self.media)
            .finish_non_exhaustive()
    }
}

/// What happened to changed content.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    /// Existing content changed.
    Changed,
    /// Content was added.
    Added,
    /// Content was removed.
    Removed,
}

/// A content-change notification, fanned out to subscribers.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// The source the change happened in.
    pub source_id: String,
    /// The changed items, or a common ancestor container of them.
    pub items: Vec<MediaHandle>,
    /// The kind of change. Applies to every item in the list.
    pub kind: ChangeKind,
    /// True if the source cannot tell where exactly the change happened.
    pub location_unknown: bool,
}

/// Callback receiving content-change notifications.
pub type ChangeCallback = Rc<dyn Fn(&ChangeEvent)>;

/// A content provider.
///
/// Sources advertise what they can do through [`Source::caps`] and the
/// framework only invokes verbs backed by the matching capability, so the
/// provided default bodies answer with a terminal error frame as a safety
/// net. Every verb must invoke the request callback: streaming verbs one or
/// more times ending with exactly one `remaining == 0` frame, single-shot
/// verbs exactly once. Emissions may happen synchronously or from tasks
/// posted to the framework's queue.
pub trait Source {
    /// Stable identifier of this source.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Relative rank among sources; higher ranks are preferred.
    fn rank(&self) -> i32 {
        0
    }

    /// The capabilities this source supports.
    fn caps(&self) -> Caps;

    /// The metadata keys this source can provide.
    fn supported_keys(&self) -> KeySet {
        KeySet::new()
    }

    /// Of the supported keys, the ones that are slow to resolve here.
    fn slow_keys(&self) -> KeySet {
        KeySet::new()
    }

    /// Count threshold above which requests are transparently chunked, if
    /// this source wants auto-split.
    fn auto_split_threshold(&self) -> Option<u64> {
        None
    }

    /// Browses a container.
    fn browse(&self, fw: &Framework, request: BrowseRequest) {
        let _ = fw;
        (request.callback)(ResultFrame {
            op_id: request.op_id,
            media: None,
            remaining: 0,
            error: Some(CoreError::BrowseFailed("not supported".into())),
        });
    }

    /// Searches free text.
    fn search(&self, fw: &Framework, request: SearchRequest) {
        let _ = fw;
        (request.callback)(ResultFrame {
            op_id: request.op_id,
            media: None,
            remaining: 0,
            error: Some(CoreError::SearchFailed("not supported".into())),
        });
    }

    /// Runs a source-specific query.
    fn query(&self, fw: &Framework, request: QueryRequest) {
        let _ = fw;
        (request.callback)(ResultFrame {
            op_id: request.op_id,
            media: None,
            remaining: 0,
            error: Some(CoreError::QueryFailed("not supported".into())),
        });
    }

    /// Resolves metadata for one record.
    fn resolve(&self, fw: &Framework, request: ResolveRequest) {
        let _ = fw;
        (request.callback)(ResolveFrame {
            op_id: request.op_id,
            media: Some(request.media),
            error: Some(CoreError::ResolveFailed("not supported".into())),
        });
    }

    /// True if this source can instantiate media for `uri`.
    fn test_media_from_uri(&self, uri: &str) -> bool {
        let _ = uri;
        false
    }

    /// Instantiates a media record for `uri`.
    fn media_from_uri(&self, fw: &Framework, request: MediaFromUriRequest) {
        let _ = fw;
        (request.callback)(ResolveFrame {
            op_id: request.op_id,
            media: None,
            error: Some(CoreError::MediaFromUriFailed("not supported".into())),
        });
    }

    /// Stores a media record.
    fn store(&self, fw: &Framework, request: StoreRequest) {
        let _ = fw;
        (request.callback)(StoreFrame {
            op_id: request.op_id,
            parent: request.parent,
            media: request.media,
            error: Some(CoreError::StoreFailed("not supported".into())),
        });
    }

    /// Removes a media record.
    fn remove(&self, fw: &Framework, request: RemoveRequest) {
        let _ = fw;
        (request.callback)(RemoveFrame {
            op_id: request.op_id,
            media: request.media,
            error: Some(CoreError::RemoveFailed("not supported".into())),
        });
    }

    /// Starts the machinery that detects content changes.
    fn notify_change_start(&self, fw: &Framework) -> Result<(), CoreError> {
        let _ = fw;
        Ok(())
    }

    /// Stops the change-detection machinery.
    fn notify_change_stop(&self, fw: &Framework) -> Result<(), CoreError> {
        let _ = fw;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_flag_bits_are_ignored() {
        let flags = ResolutionFlags::from_bits_truncate(0xffff_ff00 | 0b011);
        assert!(flags.contains(ResolutionFlags::FAST_ONLY));
        assert!(flags.contains(ResolutionFlags::FULL));
        assert!(!flags.contains(ResolutionFlags::IDLE_RELAY));
    }

    #[test]
    fn caps_compose() {
        let caps = Caps::BROWSE | Caps::SEARCH;
        assert!(caps.contains(Caps::SEARCH));
        assert!(!caps.contains(Caps::RESOLVE));
    }
}
