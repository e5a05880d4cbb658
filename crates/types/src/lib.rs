//! Data-model leaves used throughout the Medley framework: media records,
//! metadata keys, typed values, provider configuration and the core error
//! taxonomy.

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

/// Structs that hold per-plugin and per-source configuration.
pub mod config;
pub use config::{ConfigError, ProviderConfig};

mod error;
pub use error::CoreError;

mod keys;
pub use keys::{KeyRegistry, KeySet, MetadataKey};

mod media;
pub use media::{Media, MediaKind};

mod value;
pub use value::Value;
