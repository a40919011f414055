use std::rc::Rc;

use crate::{
    configuration::Configuration,
    utils::{clock::Clock, logger::Logger},
};

use super::types::{ScoreConfidenceLevel, ScoreData};

/// Scaled score under which the current quality is considered as not maintainable.
const MINIMUM_MAINTAINABLE_SCORE: f64 = 1.;

/// Scaled score from which we may consider raising the quality.
const MINIMUM_SCORE_FOR_RAISE: f64 = 1.15;

/// Conditions in which a segment has just been pushed, on which the `BufferBasedChooser` bases
/// its estimate.
#[derive(Clone, Copy, Debug)]
pub struct BufferBasedObservation {
    /// Seconds of media buffered after the current position. May be `f64::INFINITY` if unknown.
    pub buffer_gap: f64,

    /// Bitrate of the Representation of the segment just pushed, if known.
    pub current_bitrate: Option<f64>,

    /// Score of that Representation, if known.
    pub current_score: Option<ScoreData>,

    /// Current playback rate.
    pub speed: f64,
}

/// Choose a bitrate based on the current buffer level, in a way inspired by the BOLA
/// algorithm.
///
/// Each bitrate is associated a minimum buffer level. The quality is lowered as soon as the
/// buffer goes under the current one's level, and only raised progressively, after a delay
/// which grows when the quality keeps changing.
pub struct BufferBasedChooser {
    bitrates: Vec<f64>,
    levels_map: Vec<f64>,
    last_unsuitable_quality_timestamp: Option<f64>,
    block_raise_delay: f64,
    current_estimate: Option<f64>,
    minimum_block_raise_delay: f64,
    maximum_block_raise_delay: f64,
    raise_block_delay_increment: f64,
    raise_block_delay_decrement: f64,
    stability_check_delay: f64,
    clock: Rc<dyn Clock>,
    logger: Logger,
}

impl BufferBasedChooser {
    /// Creates a new `BufferBasedChooser` for the given list of bitrates, which has to be sorted
    /// in ascending order.
    pub fn new(
        bitrates: Vec<f64>,
        config: &Configuration,
        clock: Rc<dyn Clock>,
        logger: Logger,
    ) -> Self {
        let levels_map = get_buffer_levels(&bitrates, config.buffer_level_security_margin);
        logger.lazy_debug(&|| format!("ABR: Steps for buffer based chooser: {:?}", levels_map));
        Self {
            bitrates,
            levels_map,
            last_unsuitable_quality_timestamp: None,
            block_raise_delay: config.minimum_block_raise_delay,
            current_estimate: None,
            minimum_block_raise_delay: config.minimum_block_raise_delay,
            maximum_block_raise_delay: config.maximum_block_raise_delay,
            raise_block_delay_increment: config.raise_block_delay_increment,
            raise_block_delay_decrement: config.raise_block_delay_decrement,
            stability_check_delay: config.stability_check_delay,
            clock,
            logger,
        }
    }

    /// Update the estimate once a new segment has been pushed.
    pub fn on_added_segment(&mut self, observation: BufferBasedObservation) {
        let lowest = self.bitrates.first().copied();
        let current_bitrate = match observation.current_bitrate {
            None => {
                self.current_estimate = lowest;
                return;
            }
            Some(bitrate) => bitrate,
        };

        let mut current_idx = None;
        for (i, bitrate) in self.bitrates.iter().enumerate() {
            if *bitrate == current_bitrate {
                current_idx = Some(i);
            } else if *bitrate > current_bitrate {
                break;
            }
        }
        let current_idx = match current_idx {
            Some(idx) if self.levels_map.len() == self.bitrates.len() => idx,
            _ => {
                self.logger
                    .error("ABR: Current bitrate not found in the calculated levels");
                self.current_estimate = lowest;
                return;
            }
        };

        let scaled_score = observation.current_score.map(|score| {
            if observation.speed == 0. {
                score.score
            } else {
                score.score / observation.speed
            }
        });
        let has_high_confidence = observation
            .current_score
            .map_or(false, |s| s.confidence_level == ScoreConfidenceLevel::High);
        let buffer_gap = if observation.buffer_gap.is_finite() {
            observation.buffer_gap
        } else {
            0.
        };
        let now = self.clock.now_ms();

        let is_unsuitable = buffer_gap < self.levels_map[current_idx]
            || (has_high_confidence
                && scaled_score.map_or(false, |s| s < MINIMUM_MAINTAINABLE_SCORE));
        if is_unsuitable {
            self.update_block_raise_delay(now);
            self.last_unsuitable_quality_timestamp = Some(now);
            let lower_idx = (0..current_idx)
                .rev()
                .find(|i| buffer_gap >= self.levels_map[*i])
                .unwrap_or(0);
            self.current_estimate = Some(self.bitrates[lower_idx]);
            return;
        }

        let is_raise_blocked = self
            .last_unsuitable_quality_timestamp
            .map_or(false, |ts| now - ts < self.block_raise_delay);
        let can_raise = !is_raise_blocked
            && has_high_confidence
            && scaled_score.map_or(false, |s| s >= MINIMUM_SCORE_FOR_RAISE);
        if !can_raise {
            self.current_estimate = Some(current_bitrate);
            return;
        }

        let current_level = self.levels_map[current_idx];
        let next_idx = (current_idx + 1..self.levels_map.len())
            .find(|i| self.levels_map[*i] > current_level);
        self.current_estimate = match next_idx {
            Some(idx) if observation.buffer_gap >= self.levels_map[idx] => {
                Some(self.bitrates[idx])
            }
            _ => Some(current_bitrate),
        };
    }

    /// Returns the last bitrate estimated, or `None` if no estimate was produced yet.
    pub fn get_last_estimate(&self) -> Option<f64> {
        self.current_estimate
    }

    /// Widen the raise-blocking delay if the last unsuitable quality happened recently, or
    /// narrow it otherwise.
    fn update_block_raise_delay(&mut self, now: f64) {
        let time_since_prev = match self.last_unsuitable_quality_timestamp {
            None => -1.,
            Some(ts) => now - ts,
        };
        if time_since_prev < self.block_raise_delay + self.stability_check_delay {
            self.block_raise_delay = (self.block_raise_delay + self.raise_block_delay_increment)
                .min(self.maximum_block_raise_delay);
        } else {
            self.block_raise_delay = (self.block_raise_delay - self.raise_block_delay_decrement)
                .max(self.minimum_block_raise_delay);
        }
    }
}

/// Compute the minimum buffer level, in seconds, needed to maintain each of the given bitrates.
///
/// `bitrates` has to be sorted in ascending order. The lowest bitrate is always associated to a
/// level of `0.`. Consecutive equal bitrates share the same level.
pub fn get_buffer_levels(bitrates: &[f64], security_margin: f64) -> Vec<f64> {
    let first_bitrate = match bitrates.first() {
        None => return vec![],
        Some(first) => *first,
    };
    if !(first_bitrate > 0.) {
        return vec![0.; bitrates.len()];
    }
    let logs: Vec<f64> = bitrates.iter().map(|b| (b / first_bitrate).ln()).collect();
    let utilities: Vec<f64> = logs.iter().map(|l| l - logs[0] + 1.).collect();
    let last_utility = utilities[utilities.len() - 1];
    let gp = (last_utility - 1.) / ((bitrates.len() as f64) * 2. + 10.);
    if !(gp > 0.) || !gp.is_finite() {
        return vec![0.; bitrates.len()];
    }
    let vp = 1. / gp;

    let mut levels: Vec<f64> = Vec::with_capacity(bitrates.len());
    for i in 0..bitrates.len() {
        if i == 0 {
            levels.push(0.);
            continue;
        }
        let bi = i.clamp(1, utilities.len() - 1);
        if bitrates[bi] == bitrates[bi - 1] {
            levels.push(levels[i - 1]);
            continue;
        }
        let level = vp
            * (gp
                + (bitrates[bi] * utilities[bi - 1] - bitrates[bi - 1] * utilities[bi])
                    / (bitrates[bi] - bitrates[bi - 1]))
            + security_margin;
        levels.push(level);
    }
    levels
}
