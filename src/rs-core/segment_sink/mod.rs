//! Bookkeeping of what is pushed to media buffers.
//!
//! A `SegmentSink` is the interface through which chunks of media are pushed to and removed
//! from a single buffer. Each sink relies on a `SegmentInventory`, keeping track of which
//! segments are actually present in that buffer.

use thiserror::Error;

use crate::{
    content::{ChunkContext, MediaType},
    utils::time_ranges::TimeRanges,
};

mod buffered_history;
mod garbage_collector;
mod segment_inventory;
mod source_buffer;

pub use buffered_history::{BufferedHistory, BufferedHistoryEntry, BufferedRange};
pub use garbage_collector::{compute_ranges_to_clean, BufferGarbageCollector};
pub use segment_inventory::{
    BufferedChunk, ChunkStatus, InsertedChunkInfos, InventoryError, SegmentInventory,
};
pub use source_buffer::{JsMediaBuffer, MediaBuffer, MediaBufferError, SourceBufferSink};

/// Data and metadata of a chunk to push through a `SegmentSink`.
#[derive(Clone, Debug)]
pub struct PushChunkData {
    /// The chunk's actual media data.
    pub data: Vec<u8>,

    /// Information on the chunk, which will be added to the inventory once pushed.
    pub inventory_infos: InsertedChunkInfos,
}

/// Operation on a `SegmentSink` which has not been completely performed yet.
#[derive(Clone, Debug)]
pub enum SinkOperation {
    /// A chunk is being pushed.
    Push {
        infos: InsertedChunkInfos,

        /// Monotonic timestamp, in milliseconds, at which the push was scheduled.
        insertion_ts: f64,
    },

    /// Some already-buffered data is being removed, `start` and `end` giving the
    /// time range of the data to remove, in seconds.
    Remove { start: f64, end: f64 },

    /// Every chunk of that segment has been scheduled to be pushed. It will be
    /// considered complete once the operations before it are finished.
    SignalSegmentComplete(ChunkContext),
}

/// Capability allowing to push media to, and remove media from, a single media buffer while
/// keeping its inventory up to date.
pub trait SegmentSink {
    /// Returns the type of media handled by this sink.
    fn media_type(&self) -> MediaType;

    /// Schedule the push of a new chunk.
    fn push_chunk(&mut self, chunk: PushChunkData) -> Result<(), PushChunkError>;

    /// Schedule the removal of the data between `start` and `end`, in seconds.
    fn remove_buffer(&mut self, start: f64, end: f64) -> Result<(), RemoveBufferError>;

    /// Indicate that every chunk of the segment described by `content` has been scheduled to be
    /// pushed.
    fn signal_segment_complete(&mut self, content: ChunkContext);

    /// Synchronize the inventory with the time ranges currently buffered.
    fn synchronize_inventory(&mut self, buffered: &TimeRanges);

    /// Returns the inventory as it was after its last synchronization.
    fn get_last_known_inventory(&self) -> Vec<BufferedChunk>;

    /// Returns the operations scheduled but not yet finished, from the most imminent to the
    /// least.
    fn get_pending_operations(&self) -> Vec<&SinkOperation>;

    /// Free every resource linked to that sink. Every other operation fails or does nothing
    /// once this is called.
    fn dispose(&mut self);
}

/// Error encountered synchronously after trying to push a chunk through a `SegmentSink`.
#[derive(Error, Debug, PartialEq)]
pub enum PushChunkError {
    #[error("The {0} sink has already been disposed")]
    Disposed(MediaType),
    #[error("The {0} buffer is full")]
    QuotaExceeded(MediaType),
    #[error("Uncategorized Error with {0} buffer: {1}")]
    UnknownError(MediaType, String),
}

impl PushChunkError {
    /// Returns the `MediaType` associated to the `PushChunkError`.
    pub fn media_type(&self) -> MediaType {
        match self {
            PushChunkError::Disposed(m) => *m,
            PushChunkError::QuotaExceeded(m) => *m,
            PushChunkError::UnknownError(m, _) => *m,
        }
    }
}

/// Error encountered synchronously after trying to remove media data through a `SegmentSink`.
#[derive(Error, Debug, PartialEq)]
pub enum RemoveBufferError {
    #[error("The {0} sink has already been disposed")]
    Disposed(MediaType),
    #[error("Uncategorized Error with {0} buffer: {1}")]
    UnknownError(MediaType, String),
}
