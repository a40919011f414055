use std::fmt;

/// Type of media a buffer, an Adaptation and its Representations relate to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaType {
    Audio,
    Video,
    Text,
}

impl fmt::Display for MediaType {
    /// When wanting to display the value, just format Audio as "audio", Video as "video" and Text
    /// as "text"
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                MediaType::Audio => "audio",
                MediaType::Video => "video",
                MediaType::Text => "text",
            }
        )
    }
}

/// A playable quality variant of some media content.
#[derive(Clone, Debug, PartialEq)]
pub struct Representation {
    /// Identifier for that Representation, unique inside its Adaptation.
    pub id: String,

    /// Bitrate, in bits per second. `0.` if unknown.
    pub bitrate: f64,

    /// Width in pixels, if known and relevant.
    pub width: Option<u32>,

    /// Height in pixels, if known and relevant.
    pub height: Option<u32>,
}

impl Representation {
    pub fn new(id: impl Into<String>, bitrate: f64) -> Self {
        Self {
            id: id.into(),
            bitrate,
            width: None,
            height: None,
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }
}

/// Returns a copy of `representations` sorted by ascending bitrate.
///
/// The sort is stable: Representations with the same bitrate keep their original order.
pub fn sort_by_bitrate(representations: &[Representation]) -> Vec<Representation> {
    let mut sorted = representations.to_vec();
    sorted.sort_by(|a, b| a.bitrate.total_cmp(&b.bitrate));
    sorted
}

/// Time-bounded part of a content, in which a set of Adaptations is available.
#[derive(Clone, Debug, PartialEq)]
pub struct Period {
    pub id: String,

    /// Start time, in seconds.
    pub start: f64,

    /// End time, in seconds. `None` if not known yet.
    pub end: Option<f64>,
}

/// Set of interchangeable Representations of a single media type.
#[derive(Clone, Debug, PartialEq)]
pub struct Adaptation {
    pub id: String,
    pub media_type: MediaType,
}

/// A segment of a Representation, as announced by the Manifest.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    /// Identifier for that segment, unique inside its Representation.
    pub id: String,

    /// Start time, in seconds.
    pub time: f64,

    /// End time, in seconds.
    pub end: f64,

    /// Duration, in seconds.
    pub duration: f64,

    /// If `true`, this is an initialization segment, containing no media data.
    pub is_init: bool,

    /// If `false`, the segment is still being generated (e.g. a live segment whose end is not
    /// known yet) and its `duration` might not be reliable.
    pub complete: bool,
}

impl Segment {
    /// Creates a complete media segment starting at `time` seconds.
    pub fn media(id: impl Into<String>, time: f64, duration: f64) -> Self {
        Self {
            id: id.into(),
            time,
            end: time + duration,
            duration,
            is_init: false,
            complete: true,
        }
    }

    /// Creates an initialization segment.
    pub fn init(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            time: 0.,
            end: 0.,
            duration: 0.,
            is_init: true,
            complete: true,
        }
    }
}

/// Identify a segment with all its parent structures.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkContext {
    pub period: Period,
    pub adaptation: Adaptation,
    pub representation: Representation,
    pub segment: Segment,
}

impl ChunkContext {
    /// Returns `true` if both contexts refer to the same segment of the same Representation in
    /// the same Adaptation and Period.
    pub fn is_same_content(&self, other: &ChunkContext) -> bool {
        self.segment.id == other.segment.id
            && self.representation.id == other.representation.id
            && self.adaptation.id == other.adaptation.id
            && self.period.id == other.period.id
    }

    /// Returns the `MediaType` this context is linked to.
    pub fn media_type(&self) -> MediaType {
        self.adaptation.media_type
    }
}
