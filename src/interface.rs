//! Boundary interface
//!
//! Thin entry points in the shape of the original four-call contract:
//! raw record bytes in, raw field bytes out, integer column ids. The caller
//! context is kept per thread so callers never see it.
//!
//! ```text
//! engine_init ──► engine_write / engine_read (any thread) ──► engine_deinit
//! ```

use std::path::Path;

use crate::config::Config;
use crate::engine::{Context, Engine};
use crate::error::Result;
use crate::record::Column;

// One context per thread, shared by every handle. An identity handed out by
// one engine is reused as-is by the others; each engine reduces it modulo its
// own shard count, so it always names a valid writer.
thread_local! {
    static CONTEXT: Context = Context::new();
}

/// Opaque handle returned by `engine_init`
pub struct EngineHandle {
    engine: Engine,
}

impl EngineHandle {
    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

/// Open the engine over a fast and a slow tier directory
///
/// `host_info` and `peer_info` describe a cluster layout this engine does
/// not use; they are only logged.
pub fn engine_init(
    host_info: &str,
    peer_info: &[&str],
    fast_dir: impl AsRef<Path>,
    slow_dir: impl AsRef<Path>,
) -> Result<EngineHandle> {
    tracing::debug!(host = host_info, peers = peer_info.len(), "Ignoring cluster parameters");

    let config = Config::builder()
        .buffer_dir(fast_dir.as_ref())
        .durable_dir(slow_dir.as_ref())
        .build();
    Ok(EngineHandle {
        engine: Engine::open(config)?,
    })
}

/// Append one 272-byte record
pub fn engine_write(handle: &EngineHandle, record: &[u8]) -> Result<()> {
    CONTEXT.with(|ctx| handle.engine.append(ctx, record))
}

/// Read the `select` column of every record whose `where_column` equals
/// `key` into `out`; returns the number of matches
pub fn engine_read(
    handle: &EngineHandle,
    select: i32,
    where_column: i32,
    key: &[u8],
    out: &mut [u8],
) -> Result<usize> {
    let select = Column::try_from(select)?;
    let where_column = Column::try_from(where_column)?;
    let mut cursor = out;
    handle.engine.read(select, where_column, key, &mut cursor)
}

/// Flush and close the engine
pub fn engine_deinit(handle: EngineHandle) -> Result<()> {
    handle.engine.close()
}
