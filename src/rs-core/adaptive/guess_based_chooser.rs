use std::rc::Rc;

use crate::{
    content::Representation,
    observation::PlaybackObservation,
    utils::{clock::Clock, logger::Logger},
};

use super::{
    last_estimate_storage::LastEstimateStorage,
    network_analyzer::estimate_request_bandwidth,
    representation_score_calculator::RepresentationScoreCalculator,
    types::{AbrAlgorithmType, RequestInfo, ScoreConfidenceLevel, ScoreData},
};

/// Delay, in milliseconds, during which guesses are blocked after each consecutive wrong guess.
const WRONG_GUESS_BLOCK_DELAY: f64 = 15_000.;

/// Maximum delay, in milliseconds, during which guesses may be blocked.
const MAXIMUM_GUESS_BLOCK_DELAY: f64 = 120_000.;

/// Estimate which Representation should be played by trying to go one quality higher than the
/// other algorithms would and checking whether it holds.
///
/// This is mostly useful in low-latency contents, where the buffer is too small for the other
/// algorithms to have enough data to confidently raise the quality.
pub struct GuessBasedChooser {
    consecutive_wrong_guesses: u32,
    block_guesses_until: f64,
    last_maintainable_bitrate: Option<f64>,
    clock: Rc<dyn Clock>,
    logger: Logger,
}

impl GuessBasedChooser {
    pub fn new(clock: Rc<dyn Clock>, logger: Logger) -> Self {
        Self {
            consecutive_wrong_guesses: 0,
            block_guesses_until: 0.,
            last_maintainable_bitrate: None,
            clock,
            logger,
        }
    }

    /// Returns the Representation to guess, or `None` if no guess should be made and the other
    /// algorithms' choice should prevail.
    ///
    /// `representations` has to be sorted by ascending bitrate and `incoming_best_bitrate` is
    /// the bitrate of the Representation chosen by the other algorithms.
    #[allow(clippy::too_many_arguments)]
    pub fn get_guess(
        &mut self,
        representations: &[Representation],
        observation: &PlaybackObservation,
        current_representation: &Representation,
        incoming_best_bitrate: f64,
        requests: &[&RequestInfo],
        last_estimate: &LastEstimateStorage,
        score_calculator: &RepresentationScoreCalculator,
    ) -> Option<Representation> {
        let buffer_gap = observation.buffer_gap;
        let speed = observation.speed;
        let last_chosen = last_estimate.representation.as_ref()?;
        let is_guessing = last_estimate.algorithm_type == Some(AbrAlgorithmType::GuessBased);

        if incoming_best_bitrate > last_chosen.bitrate {
            if is_guessing {
                self.logger.lazy_debug(&|| {
                    format!("ABR: Guessed Representation validated: {}", last_chosen.bitrate)
                });
                self.last_maintainable_bitrate = Some(last_chosen.bitrate);
                self.consecutive_wrong_guesses = 0;
            }
            return None;
        }

        let score_data = score_calculator.get_estimate(current_representation);
        if !is_guessing {
            let score_data = score_data?;
            if self.can_guess_higher(buffer_gap, speed, &score_data) {
                return get_next_representation(
                    representations,
                    current_representation,
                    &self.logger,
                )
                .cloned();
            }
            return None;
        }

        // We're already guessing
        if self.is_last_guess_validated(last_chosen, incoming_best_bitrate, score_data.as_ref()) {
            self.logger.lazy_debug(&|| {
                format!("ABR: Guessed Representation validated: {}", last_chosen.bitrate)
            });
            self.last_maintainable_bitrate = Some(last_chosen.bitrate);
            self.consecutive_wrong_guesses = 0;
        }

        if current_representation.id != last_chosen.id {
            // Still switching to the guessed Representation
            return Some(last_chosen.clone());
        }

        let now = self.clock.now_ms();
        if self.should_stop_guess(
            current_representation,
            score_data.as_ref(),
            buffer_gap,
            requests,
            now,
        ) {
            self.consecutive_wrong_guesses += 1;
            self.block_guesses_until = now
                + (f64::from(self.consecutive_wrong_guesses) * WRONG_GUESS_BLOCK_DELAY)
                    .min(MAXIMUM_GUESS_BLOCK_DELAY);
            self.logger.info(&format!(
                "ABR: Stopping guess on {}. Blocking guesses until {}",
                current_representation.id, self.block_guesses_until
            ));
            return get_previous_representation(
                representations,
                current_representation,
                &self.logger,
            )
            .cloned();
        }

        let score_data = match score_data {
            None => return Some(current_representation.clone()),
            Some(score_data) => score_data,
        };
        if self.can_guess_higher(buffer_gap, speed, &score_data) {
            if let Some(next) =
                get_next_representation(representations, current_representation, &self.logger)
            {
                return Some(next.clone());
            }
        }
        Some(current_representation.clone())
    }

    /// Returns `true` if the conditions are good enough to try a higher quality.
    fn can_guess_higher(&self, buffer_gap: f64, speed: f64, score_data: &ScoreData) -> bool {
        buffer_gap.is_finite()
            && buffer_gap >= 2.5
            && self.clock.now_ms() > self.block_guesses_until
            && score_data.confidence_level == ScoreConfidenceLevel::High
            && score_data.score / speed > 1.01
    }

    /// Returns `true` if the guessed Representation doesn't seem to be maintainable.
    fn should_stop_guess(
        &self,
        last_guess: &Representation,
        score_data: Option<&ScoreData>,
        buffer_gap: f64,
        requests: &[&RequestInfo],
        now: f64,
    ) -> bool {
        if score_data.map_or(false, |s| s.score < 1.01) {
            return true;
        }
        if score_data.map_or(true, |s| s.score < 1.2) && buffer_gap < 0.6 {
            return true;
        }

        requests
            .iter()
            .filter(|r| r.content.representation.id == last_guess.id)
            .any(|request| {
                let elapsed_time = now - request.request_timestamp;
                let segment = &request.content.segment;
                if segment.is_init {
                    elapsed_time > 1000.
                } else if elapsed_time > segment.duration * 1000. + 200. {
                    true
                } else {
                    estimate_request_bandwidth(request)
                        .map_or(false, |bw| bw < last_guess.bitrate * 0.8)
                }
            })
    }

    fn is_last_guess_validated(
        &self,
        last_guess: &Representation,
        incoming_best_bitrate: f64,
        score_data: Option<&ScoreData>,
    ) -> bool {
        if let Some(score_data) = score_data {
            if score_data.confidence_level == ScoreConfidenceLevel::High && score_data.score > 1.5
            {
                return true;
            }
        }
        incoming_best_bitrate >= last_guess.bitrate
            && self
                .last_maintainable_bitrate
                .map_or(true, |b| b < last_guess.bitrate)
    }
}

/// Returns the first Representation with a strictly higher bitrate than `current`.
fn get_next_representation<'a>(
    representations: &'a [Representation],
    current: &Representation,
    logger: &Logger,
) -> Option<&'a Representation> {
    let idx = match representations.iter().position(|r| r.id == current.id) {
        None => {
            logger.error("ABR: Current Representation not found.");
            return None;
        }
        Some(idx) => idx,
    };
    representations[idx + 1..]
        .iter()
        .find(|r| r.bitrate > current.bitrate)
}

/// Returns the last Representation with a strictly lower bitrate than `current`.
fn get_previous_representation<'a>(
    representations: &'a [Representation],
    current: &Representation,
    logger: &Logger,
) -> Option<&'a Representation> {
    let idx = match representations.iter().position(|r| r.id == current.id) {
        None => {
            logger.error("ABR: Current Representation not found.");
            return None;
        }
        Some(idx) => idx,
    };
    representations[..idx]
        .iter()
        .rev()
        .find(|r| r.bitrate < current.bitrate)
}
