//! lazyclone - reference-counted objects with lazy deep clone
//!
//! A deep clone of an object graph costs one label fork and one freeze
//! pass; objects are copied one at a time, when they are next written
//! through a pointer of the new branch.
//!
//! Layers, bottom-up:
//! - `allocator`: size-classed, per-thread partitioned block pools
//! - `object`: header with four counters, freeze flags and type dispatch
//! - `visit`: member traversal and the structural visitors
//! - `memo` / `label`: per-branch original-to-clone maps and their tree
//! - `ptr`: `Shared`, `Weak`, `Lazy`, `ContextPtr`, `InitPtr`
//! - `gc`: trial-deletion cycle collection over strong lazy edges
//! - `array`: shaped containers for object members

pub mod allocator;
pub mod array;
pub mod config;
pub mod gc;
pub mod label;
pub mod logging;
pub mod memo;
pub mod object;
pub mod ptr;
pub mod visit;

pub use array::{Array, Shape};
pub use config::{ConfigError, RuntimeConfig};
pub use label::Label;
pub use memo::Memo;
pub use object::{Mutable, Object, ObjectHeader};
pub use ptr::{ContextPtr, InitPtr, Lazy, Shared, Weak};
pub use visit::{Member, Traversable, Visitor};

use logging::{info, log_runtime_init, log_runtime_shutdown};

/// Runtime initialization with configuration from `LAZYCLONE_CONFIG`
pub fn init() -> Result<(), ConfigError> {
    let config = RuntimeConfig::from_env()?;
    init_with_config(config);
    Ok(())
}

/// Runtime initialization with an explicit configuration.
///
/// The first installed configuration wins; later calls only bootstrap the
/// calling thread.
pub fn init_with_config(config: RuntimeConfig) {
    config::install(config);
    logging::init();
    log_runtime_init();

    allocator::init();
    gc::init();
    label::context::root();
}

/// Runtime cleanup for the calling thread
pub fn cleanup() {
    gc::cleanup();

    let allocator = allocator::stats();
    let gc = gc::stats();
    info!(
        partitions = allocator.partitions,
        reserved_bytes = allocator.reserved_bytes,
        live_blocks = allocator.live_blocks,
        objects_collected = gc.objects_collected,
        collections_run = gc.collections_run,
        "runtime statistics"
    );
    log_runtime_shutdown();
}
