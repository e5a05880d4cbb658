//! Medley Core
//!
//! The operation-dispatch and result-pipeline engine of the Medley
//! media-discovery framework. A [`Framework`] handle federates registered
//! [`Source`](source::Source) back-ends behind one asynchronous query
//! surface: browse, search, query, resolve, media-from-uri, store, remove
//! and change notification. Results stream back through a mandatory relay
//! that stamps provenance, enforces cancellation semantics, transparently
//! chunks oversized requests and, on request, enriches every item through
//! auxiliary sources while preserving emission order.
//!
//! Everything is single-threaded and cooperative, driven by a two-band
//! [`TaskQueue`](sched::TaskQueue).

#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    clippy::missing_const_for_fn,
    rustdoc::all
)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod autosplit;

mod dispatch;

mod framework;
pub use framework::{Framework, SubscriptionId};

mod fullres;

mod multi;

mod ops;
pub use ops::OpId;

mod registry;

mod relay;

/// The cooperative task queue the framework runs on.
pub mod sched;

/// The provider contract: capabilities, request descriptors, frames and
/// callbacks.
pub mod source;
