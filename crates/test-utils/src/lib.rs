//! Common utilities for testing Medley components: scripted fake sources
//! and frame collectors.

pub mod collect;
pub mod mock;

pub use collect::{FrameCollector, ReplyCollector};
pub use mock::MockSource;

/// Initialize tracing for tests. This is just for local debugging purposes.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .try_init()
        .unwrap();
}
