/// Errors surfaced on result frames by the framework and by providers.
///
/// Every variant maps to a wire-stable code (see [`CoreError::code`]) so the
/// taxonomy stays recognizable across API boundaries. Errors are values
/// carried on frames; none of them aborts the framework.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// A browse operation failed.
    #[error("browse failed: {0}")]
    BrowseFailed(String),

    /// A search operation failed.
    #[error("search failed: {0}")]
    SearchFailed(String),

    /// A provider-specific query failed.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// A metadata fetch failed.
    #[error("metadata failed: {0}")]
    MetadataFailed(String),

    /// A media resource could not be instantiated from a URI.
    #[error("media-from-uri failed: {0}")]
    MediaFromUriFailed(String),

    /// A resolve operation failed.
    #[error("resolve failed: {0}")]
    ResolveFailed(String),

    /// A store operation failed.
    #[error("store failed: {0}")]
    StoreFailed(String),

    /// A remove operation failed.
    #[error("remove failed: {0}")]
    RemoveFailed(String),

    /// The operation was cancelled before it completed.
    #[error("operation was cancelled")]
    OperationCancelled,

    /// The source does not support searches with no text filter.
    #[error("source does not support NULL-text search")]
    SearchNullUnsupported,
}

impl CoreError {
    /// The wire-stable code for this error.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BrowseFailed(_) => "browse-failed",
            Self::SearchFailed(_) => "search-failed",
            Self::QueryFailed(_) => "query-failed",
            Self::MetadataFailed(_) => "metadata-failed",
            Self::MediaFromUriFailed(_) => "media-from-uri-failed",
            Self::ResolveFailed(_) => "resolve-failed",
            Self::StoreFailed(_) => "store-failed",
            Self::RemoveFailed(_) => "remove-failed",
            Self::OperationCancelled => "operation-cancelled",
            Self::SearchNullUnsupported => "search-null-unsupported",
        }
    }

    /// True if this is the canonical cancellation error.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::OperationCancelled)
    }
}
