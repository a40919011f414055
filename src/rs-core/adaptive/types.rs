use crate::{
    content::{ChunkContext, Representation},
    utils::time_ranges::TimeRanges,
};

/// Identifier of a segment request, unique among pending requests.
pub type RequestId = String;

/// Confidence we have in a `ScoreData`'s score.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScoreConfidenceLevel {
    /// Enough segments of that Representation were loaded to trust its score.
    High,
    Low,
}

/// "Maintainability score" of a Representation: the ratio between the playback duration of its
/// loaded segments and the time taken to load them.
///
/// A score above `1.` means that Representation can be loaded faster than it is played.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreData {
    pub score: f64,
    pub confidence_level: ScoreConfidenceLevel,
}

/// Which algorithm produced an `AbrEstimate`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbrAlgorithmType {
    BandwidthBased,
    BufferBased,
    GuessBased,
}

/// Output of the adaptive logic: the Representation that should be loaded next.
#[derive(Clone, Debug, PartialEq)]
pub struct AbrEstimate {
    /// Raw bandwidth estimate, in bits per second. `None` if not known yet.
    pub bitrate: Option<f64>,

    /// The Representation which should be loaded now.
    pub representation: Representation,

    /// If `true`, the current Representation should be switched to `representation` as soon as
    /// possible, even if it means interrupting pending requests.
    pub urgent: bool,

    /// Bitrate of the last Representation which was shown to be maintainable, divided by the
    /// playback rate.
    pub known_stable_bitrate: Option<f64>,
}

/// Progress of a pending request at a given time.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestProgress {
    /// Monotonic timestamp, in milliseconds, at which that progress was reported.
    pub timestamp: f64,

    /// Amount of bytes loaded at `timestamp`.
    pub size: u64,

    /// Total size of the resource, in bytes, if known.
    pub total_size: Option<u64>,
}

/// A pending segment request.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestInfo {
    pub id: RequestId,

    /// Monotonic timestamp, in milliseconds, at which the request began.
    pub request_timestamp: f64,

    pub content: ChunkContext,

    /// Progress events received for that request, in reception order.
    pub progress: Vec<RequestProgress>,
}

/// Event sent when a segment request begins.
#[derive(Clone, Debug)]
pub struct RequestBeginEvent {
    pub id: RequestId,
    pub request_timestamp: f64,
    pub content: ChunkContext,
}

/// Event sent when a segment request reports progress.
#[derive(Clone, Debug)]
pub struct RequestProgressEvent {
    pub id: RequestId,
    pub timestamp: f64,
    pub size: u64,
    pub total_size: Option<u64>,
}

/// Event sent once a segment has been completely loaded.
#[derive(Clone, Debug)]
pub struct MetricsEvent {
    /// Time taken by the request, in milliseconds.
    pub request_duration: f64,

    /// Size of the loaded segment, in bytes.
    pub size: u64,

    /// Duration of the loaded media, in seconds, if known from the segment's data.
    pub segment_duration: Option<f64>,

    pub content: ChunkContext,
}

/// Event sent once a segment has been pushed to its buffer.
#[derive(Clone, Debug)]
pub struct AddedSegmentEvent {
    /// Ranges buffered once the segment was pushed.
    pub buffered: TimeRanges,

    pub content: ChunkContext,
}

/// Limit on the resolution of the Representations which may be chosen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolutionLimit {
    pub width: Option<u32>,
    pub height: Option<u32>,

    /// Ratio between physical pixels and the given `width` and `height`.
    pub pixel_ratio: f64,
}
