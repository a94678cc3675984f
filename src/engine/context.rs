//! Caller context
//!
//! Each writer thread owns a `Context`. The engine assigns it a shard
//! identity on first append and every later append from the same context
//! goes through the same log writer, so per-context append order is kept.

use std::cell::Cell;

/// Per-caller state; deliberately `!Sync`
#[derive(Debug, Default)]
pub struct Context {
    identity: Cell<Option<usize>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// The assigned identity, if any
    pub fn identity(&self) -> Option<usize> {
        self.identity.get()
    }

    pub(crate) fn set_identity(&self, identity: usize) {
        self.identity.set(Some(identity));
    }
}
