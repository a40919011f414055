/// Playback position, as seen by a playback observation.
///
/// Some devices cannot seek precisely, so the position we wanted to be at (`wanted`) can be
/// different from the one polled on the media element (`polled`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObservationPosition {
    polled: f64,
    wanted: Option<f64>,
}

impl ObservationPosition {
    pub fn new(polled: f64, wanted: Option<f64>) -> Self {
        Self { polled, wanted }
    }

    /// Returns the position, in seconds, as polled on the media element.
    pub fn polled(&self) -> f64 {
        self.polled
    }

    /// Returns the position, in seconds, we want to play at: either the target of a pending
    /// seek or the polled position.
    pub fn wanted(&self) -> f64 {
        self.wanted.unwrap_or(self.polled)
    }
}

/// Current playback conditions, as regularly reported by the playback observer.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackObservation {
    pub position: ObservationPosition,

    /// Current playback rate.
    pub speed: f64,

    /// Seconds of media buffered after `position`, in the range containing it.
    /// `f64::INFINITY` if that limit is not known.
    pub buffer_gap: f64,

    /// Duration of the content, in seconds. `f64::NAN` if not known.
    pub duration: f64,

    /// Maximum reachable position, in seconds.
    pub maximum_position: f64,

    /// `true` when playback is stalled due to a lack of buffered data.
    pub rebuffering: bool,

    /// `true` when playback does not advance despite having buffered data.
    pub freezing: bool,
}

impl PlaybackObservation {
    /// Creates a `PlaybackObservation` for regular playback at normal speed.
    pub fn new(position: f64, buffer_gap: f64) -> Self {
        Self {
            position: ObservationPosition::new(position, None),
            speed: 1.,
            buffer_gap,
            duration: f64::NAN,
            maximum_position: f64::INFINITY,
            rebuffering: false,
            freezing: false,
        }
    }

    /// Returns `buffer_gap`, or `0.` if it is not finite.
    pub fn finite_buffer_gap(&self) -> f64 {
        if self.buffer_gap.is_finite() {
            self.buffer_gap
        } else {
            0.
        }
    }
}
