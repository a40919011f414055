use std::rc::Rc;

use crate::{
    configuration::Configuration,
    content::Representation,
    observation::PlaybackObservation,
    utils::{clock::Clock, logger::Logger},
};

use super::{
    bandwidth_estimator::BandwidthEstimator,
    ewma::Ewma,
    types::{RequestInfo, RequestProgress},
};

/// Minimum number of progress events a request should have for its own bandwidth to be
/// estimated.
const MINIMUM_PROGRESS_EVENTS: usize = 5;

/// Half-life, in seconds, of the EWMA used to estimate a single request's bandwidth.
const REQUEST_EWMA_HALF_LIFE: f64 = 2.;

/// Result of `NetworkAnalyzer::get_bandwidth_estimate`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BandwidthEstimateResult {
    /// Raw bandwidth estimate, in bits per second, if one is available.
    pub bandwidth_estimate: Option<f64>,

    /// Maximum bitrate, in bits per second, the chosen Representation should have.
    pub bitrate_chosen: f64,
}

/// Analyze the network conditions to produce the maximum bitrate which should be chosen.
///
/// It switches to a more pessimistic "starvation mode" when the buffer is close to being empty.
pub struct NetworkAnalyzer {
    initial_bitrate: f64,
    in_starvation_mode: bool,
    low_latency_mode: bool,
    starvation_gap: f64,
    out_of_starvation_gap: f64,
    starvation_bitrate_factor: f64,
    regular_bitrate_factor: f64,
    starvation_duration_delta: f64,
    clock: Rc<dyn Clock>,
    logger: Logger,
}

impl NetworkAnalyzer {
    pub fn new(
        initial_bitrate: f64,
        low_latency_mode: bool,
        config: &Configuration,
        clock: Rc<dyn Clock>,
        logger: Logger,
    ) -> Self {
        Self {
            initial_bitrate,
            in_starvation_mode: false,
            low_latency_mode,
            starvation_gap: config.starvation_gap.get(low_latency_mode),
            out_of_starvation_gap: config.out_of_starvation_gap.get(low_latency_mode),
            starvation_bitrate_factor: config.starvation_bitrate_factor.get(low_latency_mode),
            regular_bitrate_factor: config.regular_bitrate_factor.get(low_latency_mode),
            starvation_duration_delta: config.starvation_duration_delta,
            clock,
            logger,
        }
    }

    /// Returns `true` if we're currently in "starvation mode".
    pub fn is_in_starvation_mode(&self) -> bool {
        self.in_starvation_mode
    }

    /// Compute the maximum bitrate the next Representation should have, based on the current
    /// playback conditions, bandwidth estimates and pending requests.
    ///
    /// `requests` has to be sorted by ascending segment time.
    pub fn get_bandwidth_estimate(
        &mut self,
        observation: &PlaybackObservation,
        bandwidth_estimator: &mut BandwidthEstimator,
        current_representation: Option<&Representation>,
        requests: &[&RequestInfo],
        last_estimated_bitrate: Option<f64>,
    ) -> BandwidthEstimateResult {
        self.update_starvation_mode(observation);

        let mut bandwidth_estimate = None;
        let mut bitrate_chosen = None;
        if self.in_starvation_mode {
            let now = self.clock.now_ms();
            bandwidth_estimate = estimate_starvation_mode_bitrate(
                requests,
                observation,
                current_representation,
                self.low_latency_mode,
                last_estimated_bitrate,
                now,
            );
            if let Some(estimate) = bandwidth_estimate {
                self.logger.info(&format!(
                    "ABR: starvation mode emergency estimate: {}",
                    estimate
                ));
                bandwidth_estimator.reset();
                bitrate_chosen = Some(match current_representation {
                    Some(rep) => estimate.min(rep.bitrate),
                    None => estimate,
                });
            }
        }

        let mut bitrate_chosen = match bitrate_chosen {
            Some(bitrate) => bitrate,
            None => {
                let factor = if self.in_starvation_mode {
                    self.starvation_bitrate_factor
                } else {
                    self.regular_bitrate_factor
                };
                bandwidth_estimate = bandwidth_estimator.get_estimate();
                match bandwidth_estimate.or(last_estimated_bitrate) {
                    Some(estimate) => estimate * factor,
                    None => self.initial_bitrate,
                }
            }
        };

        if observation.speed > 1. {
            bitrate_chosen /= observation.speed;
        }
        BandwidthEstimateResult {
            bandwidth_estimate,
            bitrate_chosen,
        }
    }

    /// Returns `true` if switching from `current_representation` to a Representation of
    /// `bitrate` should be done as soon as possible, even if it means interrupting pending
    /// requests.
    pub fn is_urgent(
        &self,
        bitrate: f64,
        current_representation: Option<&Representation>,
        requests: &[&RequestInfo],
        observation: &PlaybackObservation,
    ) -> bool {
        match current_representation {
            None => true,
            Some(current) if bitrate >= current.bitrate => false,
            Some(_) => should_directly_switch_to_low_bitrate(
                observation,
                requests,
                self.low_latency_mode,
                self.clock.now_ms(),
            ),
        }
    }

    fn update_starvation_mode(&mut self, observation: &PlaybackObservation) {
        let buffer_gap = observation.finite_buffer_gap();
        let duration = observation.duration;
        let is_buffered_until_end = !duration.is_nan()
            && buffer_gap + observation.position.polled()
                >= duration - self.starvation_duration_delta;

        if !is_buffered_until_end {
            if !self.in_starvation_mode && buffer_gap <= self.starvation_gap {
                self.logger.info(&format!(
                    "ABR: enter starvation mode. Buffer gap: {}",
                    buffer_gap
                ));
                self.in_starvation_mode = true;
            } else if self.in_starvation_mode && buffer_gap >= self.out_of_starvation_gap {
                self.logger.info(&format!(
                    "ABR: exit starvation mode. Buffer gap: {}",
                    buffer_gap
                ));
                self.in_starvation_mode = false;
            }
        } else if self.in_starvation_mode {
            self.logger
                .info("ABR: exit starvation mode, content buffered until its end");
            self.in_starvation_mode = false;
        }
    }
}

/// Estimate the bandwidth of a single request from its progress events, in bits per second.
///
/// Returns `None` if not enough progress events were received for it.
pub fn estimate_request_bandwidth(request: &RequestInfo) -> Option<f64> {
    if request.progress.len() < MINIMUM_PROGRESS_EVENTS {
        return None;
    }
    let mut ewma = Ewma::new(REQUEST_EWMA_HALF_LIFE);
    for window in request.progress.windows(2) {
        let bytes_loaded = window[1].size.saturating_sub(window[0].size);
        let elapsed_ms = window[1].timestamp - window[0].timestamp;
        let bitrate = (bytes_loaded as f64) * 8. / (elapsed_ms / 1000.);
        ewma.add_sample(elapsed_ms / 1000., bitrate);
    }
    Some(ewma.get_estimate())
}

/// Estimate the time remaining, in seconds, before the request linked to `last_progress` is
/// finished.
///
/// Returns `None` if the request's total size is unknown.
pub fn estimate_remaining_time(last_progress: &RequestProgress, bandwidth: f64) -> Option<f64> {
    let total_size = last_progress.total_size?;
    let remaining_bits = (total_size.saturating_sub(last_progress.size) as f64) * 8.;
    Some((remaining_bits / bandwidth).max(0.))
}

/// Minimum time, in milliseconds, a request has to be pending before it is considered for an
/// emergency estimate.
///
/// The upper bound is applied before the lower one, so the lower one always wins.
fn minimum_request_time(segment_duration: f64) -> f64 {
    (segment_duration * 1.5).min(3000.).max(12000.)
}

/// Produce an "emergency" bandwidth estimate, used when the buffer is close to be empty, from
/// the request of the next needed segment.
///
/// Returns `None` if no emergency estimate can or should be produced.
pub fn estimate_starvation_mode_bitrate(
    requests: &[&RequestInfo],
    observation: &PlaybackObservation,
    current_representation: Option<&Representation>,
    low_latency_mode: bool,
    last_estimated_bitrate: Option<f64>,
    now: f64,
) -> Option<f64> {
    if low_latency_mode {
        // Too much uncertainty in low-latency mode
        return None;
    }

    let buffer_gap = observation.finite_buffer_gap();
    let speed = observation.speed;
    let next_needed_position = observation.position.wanted() + buffer_gap;
    let mut concerned_requests = requests.iter().filter(|r| {
        r.content.segment.time <= next_needed_position
            && r.content.segment.end > next_needed_position
    });
    let request = match (concerned_requests.next(), concerned_requests.next()) {
        (Some(request), None) => *request,
        _ => return None,
    };

    let segment_duration = request.content.segment.duration;
    if now - request.request_timestamp < minimum_request_time(segment_duration) {
        return None;
    }

    if let (Some(last_progress), Some(bandwidth)) =
        (request.progress.last(), estimate_request_bandwidth(request))
    {
        if let Some(remaining_time) = estimate_remaining_time(last_progress, bandwidth) {
            if (now - last_progress.timestamp) / 1000. <= remaining_time {
                let expected_rebuffering_time = remaining_time - buffer_gap / speed;
                if expected_rebuffering_time > 2.5 {
                    return Some(bandwidth);
                }
            }
        }
    }

    if !request.content.segment.complete {
        return None;
    }
    let elapsed_time = (now - request.request_timestamp) / 1000.;
    let is_reasonable = elapsed_time <= (segment_duration * 1.5 + 2.) / speed;
    let current = match current_representation {
        Some(current) if !is_reasonable => current,
        _ => return None,
    };
    let factor = segment_duration / elapsed_time;
    let reduced_bitrate = current.bitrate * factor.min(0.7);
    match last_estimated_bitrate {
        Some(last) if reduced_bitrate >= last => None,
        _ => Some(reduced_bitrate),
    }
}

/// Returns `true` if the pending request for the next needed segment is not expected to finish
/// in time, in which case a lower Representation should be switched to right away.
pub fn should_directly_switch_to_low_bitrate(
    observation: &PlaybackObservation,
    requests: &[&RequestInfo],
    low_latency_mode: bool,
    now: f64,
) -> bool {
    if low_latency_mode {
        // Always switch directly in low-latency mode, the buffer is too small to wait
        return true;
    }
    let buffer_gap = observation.finite_buffer_gap();
    let next_needed_position = observation.position.wanted() + buffer_gap;
    let next_request = requests.iter().find(|r| {
        r.content.segment.duration > 0.
            && r.content.segment.time + r.content.segment.duration > next_needed_position
    });
    let next_request = match next_request {
        None => return true,
        Some(request) => request,
    };

    let (last_progress, bandwidth) = match (
        next_request.progress.last(),
        estimate_request_bandwidth(next_request),
    ) {
        (Some(last_progress), Some(bandwidth)) => (last_progress, bandwidth),
        _ => return true,
    };
    let remaining_time = match estimate_remaining_time(last_progress, bandwidth) {
        None => return false,
        Some(remaining_time) => remaining_time,
    };
    if (now - last_progress.timestamp) / 1000. > remaining_time * 1.2 {
        return true;
    }
    let expected_rebuffering_time = remaining_time - buffer_gap / observation.speed;
    expected_rebuffering_time > -1.5
}
