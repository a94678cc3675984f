//! Log Writer
//!
//! Per-shard append handle. Holds at most one buffer at a time and rotates
//! it through the manager once it fills up.

use std::sync::Arc;

use crate::error::Result;
use crate::record::RecordBytes;
use crate::tier::LogBuffer;

use super::LogBufferManager;

pub struct LogWriter {
    manager: Arc<LogBufferManager>,
    current: Option<LogBuffer>,
}

impl LogWriter {
    /// A writer that claims its first buffer on the first append
    pub fn new(manager: Arc<LogBufferManager>) -> Self {
        Self {
            manager,
            current: None,
        }
    }

    pub fn manager(&self) -> &Arc<LogBufferManager> {
        &self.manager
    }

    /// Append one record
    ///
    /// Blocks while the shard has no free buffer. A buffer taken from the
    /// pool may already be full after recovery, so rotation loops.
    pub fn append(&mut self, record: &RecordBytes) -> Result<()> {
        loop {
            if self.current.is_none() {
                self.current = Some(self.manager.get_free_buffer()?);
            }
            let Some(buffer) = self.current.as_mut() else {
                continue;
            };

            let appended = self.manager.try_append(buffer, record);
            let full = self.manager.buffer_tier().is_full(buffer.id());
            if full {
                if let Some(buffer) = self.current.take() {
                    self.manager.give_back_dirty(buffer);
                }
            }
            if appended {
                return Ok(());
            }
        }
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        if let Some(buffer) = self.current.take() {
            self.manager.give_back_free(buffer);
        }
    }
}
