use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::{
    configuration::Configuration,
    content::{sort_by_bitrate, MediaType, Representation},
    observation::PlaybackObservation,
    utils::{
        clock::Clock,
        invariant::report_invariant_violation,
        logger::Logger,
        shared_reference::{SharedReference, SubscribeOptions},
        task_canceller::{CancellationSignal, TaskCanceller},
    },
};

use self::{
    bandwidth_estimator::BandwidthEstimator,
    buffer_based_chooser::{BufferBasedChooser, BufferBasedObservation},
    guess_based_chooser::GuessBasedChooser,
    last_estimate_storage::LastEstimateStorage,
    network_analyzer::{BandwidthEstimateResult, NetworkAnalyzer},
    pending_requests_store::PendingRequestsStore,
    representation_filters::{get_filtered_representations, select_optimal_representation},
    representation_score_calculator::RepresentationScoreCalculator,
};
pub use self::types::*;

pub mod bandwidth_estimator;
pub mod buffer_based_chooser;
pub mod ewma;
pub mod guess_based_chooser;
pub mod last_estimate_storage;
pub mod network_analyzer;
pub mod pending_requests_store;
pub mod representation_filters;
pub mod representation_score_calculator;
mod types;

/// Distance to the maximum position, in seconds, under which we consider playing close to the
/// live edge, where the guess-based algorithm may be used.
const MAXIMUM_DISTANCE_TO_LIVE_EDGE_FOR_GUESSES: f64 = 40.;

/// Options needed to create an `AdaptiveRepresentationSelector`.
pub struct AdaptiveSelectorOptions {
    /// Bitrate, in bits per second, assumed per media type until a bandwidth estimate can be
    /// produced. `0.` is used for media types not in that map.
    pub initial_bitrates: HashMap<MediaType, f64>,

    /// If `true`, we're playing a content in low-latency mode.
    pub low_latency_mode: bool,

    pub configuration: Rc<Configuration>,
    pub logger: Logger,
    pub clock: Rc<dyn Clock>,
}

/// Context in which Representations are estimated.
#[derive(Clone, Copy, Debug)]
pub struct EstimateContext {
    pub media_type: MediaType,

    /// `true` for contents whose Manifest may evolve, such as live contents.
    pub is_dynamic: bool,
}

/// Filters restricting which Representations may be chosen.
#[derive(Clone)]
pub struct AbrFilters {
    /// Maximum bitrate, in bits per second. `f64::INFINITY` for no limit.
    pub throttle_bitrate: SharedReference<f64>,

    /// Limit on the Representations' resolution, if one.
    pub limit_resolution: SharedReference<Option<ResolutionLimit>>,
}

impl AbrFilters {
    /// Creates `AbrFilters` with no limit.
    pub fn new() -> Self {
        Self {
            throttle_bitrate: SharedReference::new(f64::INFINITY),
            limit_resolution: SharedReference::new(None),
        }
    }
}

impl Default for AbrFilters {
    fn default() -> Self {
        Self::new()
    }
}

/// Value returned by `AdaptiveRepresentationSelector::get_estimate_reference`.
pub struct EstimateReference {
    /// Last estimate produced, `None` until a first estimate could be produced.
    pub estimates: SharedReference<Option<AbrEstimate>>,

    /// Callbacks to call at the corresponding steps of the segment-loading pipeline.
    pub callbacks: AbrCallbacks,
}

/// Chooses which Representation should be loaded, for each media type, based on network,
/// buffer and playback conditions.
///
/// A bandwidth estimator is kept per media type for the whole lifetime of the
/// `AdaptiveRepresentationSelector`, everything else is linked to a list of Representations.
pub struct AdaptiveRepresentationSelector {
    initial_bitrates: HashMap<MediaType, f64>,
    low_latency_mode: bool,
    configuration: Rc<Configuration>,
    logger: Logger,
    clock: Rc<dyn Clock>,
    bandwidth_estimators: RefCell<HashMap<MediaType, Rc<RefCell<BandwidthEstimator>>>>,
}

impl AdaptiveRepresentationSelector {
    pub fn new(options: AdaptiveSelectorOptions) -> Self {
        Self {
            initial_bitrates: options.initial_bitrates,
            low_latency_mode: options.low_latency_mode,
            configuration: options.configuration,
            logger: options.logger,
            clock: options.clock,
            bandwidth_estimators: RefCell::new(HashMap::new()),
        }
    }

    /// Produce estimates for the given context, re-computed each time the playback
    /// observation, the filters, or the buffer change.
    ///
    /// Each time `representations` changes, every estimate-related state except the bandwidth
    /// estimate is reset. Estimates stop being produced once `stop_all_estimates` is triggered.
    pub fn get_estimate_reference(
        &self,
        context: EstimateContext,
        current_representation: SharedReference<Option<Representation>>,
        representations: SharedReference<Vec<Representation>>,
        playback_observer: SharedReference<Option<PlaybackObservation>>,
        filters: AbrFilters,
        stop_all_estimates: &CancellationSignal,
    ) -> EstimateReference {
        let estimates: SharedReference<Option<AbrEstimate>> = SharedReference::new(None);
        let live_session: Rc<RefCell<Option<Rc<EstimateSession>>>> = Rc::new(RefCell::new(None));
        let session_canceller: Rc<RefCell<Option<TaskCanceller>>> = Rc::new(RefCell::new(None));

        let factory = SessionFactory {
            context,
            low_latency_mode: self.low_latency_mode,
            initial_bitrate: self
                .initial_bitrates
                .get(&context.media_type)
                .copied()
                .unwrap_or(0.),
            configuration: Rc::clone(&self.configuration),
            logger: self.logger.clone(),
            clock: Rc::clone(&self.clock),
            bandwidth_estimator: self.get_bandwidth_estimator(context.media_type),
            current_representation,
            playback_observer,
            filters,
            estimates: estimates.clone(),
        };

        let stop_signal = stop_all_estimates.clone();
        let session_canceller_clone = Rc::clone(&session_canceller);
        let live_session_clone = Rc::clone(&live_session);
        representations.subscribe(
            move |reps| {
                let previous = session_canceller_clone.borrow_mut().take();
                if let Some(previous) = previous {
                    previous.cancel();
                }
                live_session_clone.borrow_mut().take();
                if stop_signal.is_cancelled() {
                    return;
                }
                let canceller = TaskCanceller::new();
                canceller.link_to_signal(&stop_signal);
                let signal = canceller.signal();
                *session_canceller_clone.borrow_mut() = Some(canceller);
                let session = factory.start_session(reps, &signal);
                *live_session_clone.borrow_mut() = session;
            },
            SubscribeOptions {
                emit_current_value: true,
                once: false,
            },
            Some(stop_all_estimates),
        );

        let live_session_clone = Rc::clone(&live_session);
        stop_all_estimates.register(move || {
            live_session_clone.borrow_mut().take();
        });

        EstimateReference {
            estimates,
            callbacks: AbrCallbacks {
                session: live_session,
            },
        }
    }

    fn get_bandwidth_estimator(&self, media_type: MediaType) -> Rc<RefCell<BandwidthEstimator>> {
        let mut estimators = self.bandwidth_estimators.borrow_mut();
        let estimator = estimators.entry(media_type).or_insert_with(|| {
            Rc::new(RefCell::new(BandwidthEstimator::new(&self.configuration)))
        });
        Rc::clone(estimator)
    }
}

/// Callbacks informing the adaptive logic about the segment-loading pipeline.
///
/// They are always routed to the estimate session linked to the current list of
/// Representations, and do nothing when that list only contains one Representation.
#[derive(Clone)]
pub struct AbrCallbacks {
    session: Rc<RefCell<Option<Rc<EstimateSession>>>>,
}

impl AbrCallbacks {
    /// To call once a segment has been completely loaded.
    pub fn metrics(&self, evt: MetricsEvent) {
        if let Some(session) = self.live_session() {
            session.on_metrics(evt);
        }
    }

    /// To call when a segment request begins.
    pub fn request_begin(&self, evt: RequestBeginEvent) {
        if let Some(session) = self.live_session() {
            session.state.borrow_mut().requests_store.add(evt);
        }
    }

    /// To call when a segment request reports progress.
    pub fn request_progress(&self, evt: RequestProgressEvent) {
        if let Some(session) = self.live_session() {
            let res = session.state.borrow_mut().requests_store.add_progress(evt);
            if let Err(err) = res {
                report_invariant_violation(&session.logger, &err);
            }
        }
    }

    /// To call when a segment request ends, whether it succeeded or not.
    pub fn request_end(&self, id: &str) {
        if let Some(session) = self.live_session() {
            let res = session.state.borrow_mut().requests_store.remove(id);
            if let Err(err) = res {
                report_invariant_violation(&session.logger, &err);
            }
        }
    }

    /// To call once a segment has been pushed to its buffer.
    pub fn added_segment(&self, evt: AddedSegmentEvent) {
        if let Some(session) = self.live_session() {
            session.on_added_segment(evt);
        }
    }

    fn live_session(&self) -> Option<Rc<EstimateSession>> {
        self.session.borrow().clone()
    }
}

/// Everything needed to create an `EstimateSession` from a list of Representations.
struct SessionFactory {
    context: EstimateContext,
    low_latency_mode: bool,
    initial_bitrate: f64,
    configuration: Rc<Configuration>,
    logger: Logger,
    clock: Rc<dyn Clock>,
    bandwidth_estimator: Rc<RefCell<BandwidthEstimator>>,
    current_representation: SharedReference<Option<Representation>>,
    playback_observer: SharedReference<Option<PlaybackObservation>>,
    filters: AbrFilters,
    estimates: SharedReference<Option<AbrEstimate>>,
}

impl SessionFactory {
    /// Start producing estimates for `representations` until `signal` is triggered.
    ///
    /// Returns the created `EstimateSession`, or `None` if no session is needed because there is
    /// at most one Representation to choose from.
    fn start_session(
        &self,
        representations: &[Representation],
        signal: &CancellationSignal,
    ) -> Option<Rc<EstimateSession>> {
        let sorted = sort_by_bitrate(representations);
        match sorted.len() {
            0 => {
                self.logger
                    .warn("ABR: no Representation to choose from, no estimate produced");
                self.estimates.set(None);
                return None;
            }
            1 => {
                self.logger.debug("ABR: only one Representation, choosing it");
                self.estimates.set(Some(AbrEstimate {
                    bitrate: None,
                    representation: sorted[0].clone(),
                    urgent: true,
                    known_stable_bitrate: None,
                }));
                return None;
            }
            _ => {}
        }
        self.logger.lazy_debug(&|| {
            format!(
                "ABR: new {} estimate session with {} Representations",
                self.context.media_type,
                sorted.len()
            )
        });

        let bitrates = sorted.iter().map(|r| r.bitrate).collect();
        let session = Rc::new(EstimateSession {
            state: RefCell::new(SessionState {
                network_analyzer: NetworkAnalyzer::new(
                    self.initial_bitrate,
                    self.low_latency_mode,
                    &self.configuration,
                    Rc::clone(&self.clock),
                    self.logger.clone(),
                ),
                requests_store: PendingRequestsStore::new(),
                score_calculator: RepresentationScoreCalculator::new(&self.configuration),
                buffer_based_chooser: BufferBasedChooser::new(
                    bitrates,
                    &self.configuration,
                    Rc::clone(&self.clock),
                    self.logger.clone(),
                ),
                guess_based_chooser: GuessBasedChooser::new(
                    Rc::clone(&self.clock),
                    self.logger.clone(),
                ),
                last_estimate: LastEstimateStorage::new(),
                allow_buffer_based_estimates: false,
            }),
            representations: sorted,
            context: self.context,
            low_latency_mode: self.low_latency_mode,
            enter_buffer_based_algo: self.configuration.enter_buffer_based_algo,
            exit_buffer_based_algo: self.configuration.exit_buffer_based_algo,
            bandwidth_estimator: Rc::clone(&self.bandwidth_estimator),
            current_representation: self.current_representation.clone(),
            playback_observer: self.playback_observer.clone(),
            filters: self.filters.clone(),
            estimates: self.estimates.clone(),
            logger: self.logger.clone(),
        });

        let no_emit = SubscribeOptions::default();
        let session_clone = Rc::clone(&session);
        self.playback_observer
            .subscribe(move |_| session_clone.update_estimate(), no_emit, Some(signal));
        let session_clone = Rc::clone(&session);
        self.filters
            .throttle_bitrate
            .subscribe(move |_| session_clone.update_estimate(), no_emit, Some(signal));
        let session_clone = Rc::clone(&session);
        self.filters
            .limit_resolution
            .subscribe(move |_| session_clone.update_estimate(), no_emit, Some(signal));

        session.update_estimate();
        Some(session)
    }
}

struct SessionState {
    network_analyzer: NetworkAnalyzer,
    requests_store: PendingRequestsStore,
    score_calculator: RepresentationScoreCalculator,
    buffer_based_chooser: BufferBasedChooser,
    guess_based_chooser: GuessBasedChooser,
    last_estimate: LastEstimateStorage,
    allow_buffer_based_estimates: bool,
}

/// Produce estimates for a single sorted list of Representations.
struct EstimateSession {
    state: RefCell<SessionState>,
    representations: Vec<Representation>,
    context: EstimateContext,
    low_latency_mode: bool,
    enter_buffer_based_algo: f64,
    exit_buffer_based_algo: f64,
    bandwidth_estimator: Rc<RefCell<BandwidthEstimator>>,
    current_representation: SharedReference<Option<Representation>>,
    playback_observer: SharedReference<Option<PlaybackObservation>>,
    filters: AbrFilters,
    estimates: SharedReference<Option<AbrEstimate>>,
    logger: Logger,
}

impl EstimateSession {
    fn on_metrics(&self, evt: MetricsEvent) {
        self.bandwidth_estimator
            .borrow_mut()
            .add_sample(evt.request_duration, evt.size);
        let segment = &evt.content.segment;
        if segment.is_init {
            return;
        }
        let segment_duration = match evt.segment_duration {
            Some(duration) => duration,
            None if segment.complete => segment.duration,
            None => return,
        };
        self.state.borrow_mut().score_calculator.add_sample(
            &evt.content.representation,
            evt.request_duration / 1000.,
            segment_duration,
        );
    }

    fn on_added_segment(&self, evt: AddedSegmentEvent) {
        let observation = match self.playback_observer.get() {
            None => return,
            Some(observation) => observation,
        };
        let buffer_gap = evt
            .buffered
            .left_size_of_range(observation.position.wanted());
        let representation = &evt.content.representation;
        {
            let mut state = self.state.borrow_mut();
            let current_score = state.score_calculator.get_estimate(representation);
            state
                .buffer_based_chooser
                .on_added_segment(BufferBasedObservation {
                    buffer_gap,
                    current_bitrate: Some(representation.bitrate),
                    current_score,
                    speed: observation.speed,
                });
        }
        self.update_estimate();
    }

    /// Compute a new estimate and emit it.
    fn update_estimate(&self) {
        let observation = match self.playback_observer.get() {
            None => return,
            Some(observation) => observation,
        };
        let estimate = {
            let mut state = self.state.borrow_mut();
            self.compute_estimate(&mut state, &observation)
        };
        if let Some(estimate) = estimate {
            self.logger.lazy_debug(&|| {
                format!(
                    "ABR: new {} estimate: {} (urgent: {})",
                    self.context.media_type, estimate.representation.id, estimate.urgent
                )
            });
            self.estimates.set(Some(estimate));
        }
    }

    fn compute_estimate(
        &self,
        state: &mut SessionState,
        observation: &PlaybackObservation,
    ) -> Option<AbrEstimate> {
        let SessionState {
            network_analyzer,
            requests_store,
            score_calculator,
            buffer_based_chooser,
            guess_based_chooser,
            last_estimate,
            allow_buffer_based_estimates,
        } = state;

        let current_representation = self.current_representation.get();
        let resolution_limit = self.filters.limit_resolution.get();
        let filtered = get_filtered_representations(
            &self.representations,
            resolution_limit.as_ref(),
            self.filters.throttle_bitrate.get(),
        );
        let requests = requests_store.get_requests();

        let BandwidthEstimateResult {
            bandwidth_estimate,
            bitrate_chosen,
        } = network_analyzer.get_bandwidth_estimate(
            observation,
            &mut self.bandwidth_estimator.borrow_mut(),
            current_representation.as_ref(),
            &requests,
            last_estimate.bandwidth,
        );

        let speed = if observation.speed > 0. {
            observation.speed
        } else {
            1.
        };
        let known_stable_bitrate = score_calculator
            .get_last_stable_representation()
            .map(|r| r.bitrate / speed);

        let buffer_gap = observation.buffer_gap;
        if *allow_buffer_based_estimates && buffer_gap <= self.exit_buffer_based_algo {
            *allow_buffer_based_estimates = false;
        } else if !*allow_buffer_based_estimates
            && buffer_gap.is_finite()
            && buffer_gap >= self.enter_buffer_based_algo
        {
            *allow_buffer_based_estimates = true;
        }

        let from_bandwidth = select_optimal_representation(&filtered, bitrate_chosen)?.clone();
        let mut current_best_bitrate = from_bandwidth.bitrate;

        let mut from_buffer_size = None;
        if *allow_buffer_based_estimates {
            if let Some(buffer_based_bitrate) = buffer_based_chooser.get_last_estimate() {
                if buffer_based_bitrate > current_best_bitrate {
                    let rep = select_optimal_representation(&filtered, buffer_based_bitrate);
                    if let Some(rep) = rep {
                        current_best_bitrate = rep.bitrate;
                        from_buffer_size = Some(rep.clone());
                    }
                }
            }
        }

        let mut from_guess = None;
        if let Some(current) = current_representation.as_ref() {
            let wanted_position = observation.position.wanted();
            if self.low_latency_mode
                && self.context.is_dynamic
                && observation.maximum_position - wanted_position
                    < MAXIMUM_DISTANCE_TO_LIVE_EDGE_FOR_GUESSES
            {
                from_guess = guess_based_chooser.get_guess(
                    &self.representations,
                    observation,
                    current,
                    current_best_bitrate,
                    &requests,
                    last_estimate,
                    score_calculator,
                );
            }
        }

        let (representation, algorithm_type, urgent) = match from_guess {
            Some(guess) if guess.bitrate > current_best_bitrate => {
                let urgent = current_representation
                    .as_ref()
                    .map_or(true, |current| guess.bitrate < current.bitrate);
                (guess, AbrAlgorithmType::GuessBased, urgent)
            }
            _ => {
                let (representation, algorithm_type) = match from_buffer_size {
                    Some(rep) => (rep, AbrAlgorithmType::BufferBased),
                    None => (from_bandwidth, AbrAlgorithmType::BandwidthBased),
                };
                let urgent = network_analyzer.is_urgent(
                    representation.bitrate,
                    current_representation.as_ref(),
                    &requests,
                    observation,
                );
                (representation, algorithm_type, urgent)
            }
        };
        last_estimate.update(representation.clone(), bandwidth_estimate, algorithm_type);
        Some(AbrEstimate {
            bitrate: bandwidth_estimate,
            representation,
            urgent,
            known_stable_bitrate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        content::{test_utils::video_context, Segment},
        utils::{
            clock::ManualClock,
            logger::{test_utils::MemorySink, LoggerLevel},
            time_ranges::TimeRanges,
        },
    };

    struct Setup {
        reference: EstimateReference,
        current_representation: SharedReference<Option<Representation>>,
        representations: SharedReference<Vec<Representation>>,
        playback_observer: SharedReference<Option<PlaybackObservation>>,
        filters: AbrFilters,
        canceller: TaskCanceller,
        clock: Rc<ManualClock>,
    }

    fn ladder() -> Vec<Representation> {
        vec![
            Representation::new("mid", 1_000_000.),
            Representation::new("low", 500_000.),
            Representation::new("high", 2_000_000.),
        ]
    }

    fn setup(representations: Vec<Representation>, low_latency_mode: bool) -> Setup {
        let clock = Rc::new(ManualClock::new(1000.));
        let selector = AdaptiveRepresentationSelector::new(AdaptiveSelectorOptions {
            initial_bitrates: HashMap::new(),
            low_latency_mode,
            configuration: Rc::new(Configuration::default()),
            logger: Logger::default(),
            clock: clock.clone(),
        });
        let current_representation = SharedReference::new(None);
        let representations = SharedReference::new(representations);
        let playback_observer = SharedReference::new(None);
        let filters = AbrFilters::new();
        let canceller = TaskCanceller::new();
        let reference = selector.get_estimate_reference(
            EstimateContext {
                media_type: MediaType::Video,
                is_dynamic: true,
            },
            current_representation.clone(),
            representations.clone(),
            playback_observer.clone(),
            filters.clone(),
            &canceller.signal(),
        );
        Setup {
            reference,
            current_representation,
            representations,
            playback_observer,
            filters,
            canceller,
            clock,
        }
    }

    fn chosen_id(setup: &Setup) -> Option<String> {
        setup
            .reference
            .estimates
            .with(|e| e.as_ref().map(|e| e.representation.id.clone()))
    }

    fn metrics(rep: &Representation, request_duration: f64, size: u64) -> MetricsEvent {
        MetricsEvent {
            request_duration,
            size,
            segment_duration: Some(2.),
            content: video_context(rep, Segment::media("s", 0., 2.)),
        }
    }

    #[test]
    fn test_single_representation() {
        let setup = setup(vec![Representation::new("only", 1000.)], false);
        let estimate = setup.reference.estimates.get().unwrap();
        assert_eq!(estimate.representation.id, "only");
        assert!(estimate.urgent);
        assert_eq!(estimate.bitrate, None);

        // Callbacks are no-ops
        setup.reference.callbacks.request_end("unknown");
        setup
            .playback_observer
            .set(Some(PlaybackObservation::new(0., 10.)));
        assert_eq!(chosen_id(&setup).as_deref(), Some("only"));
    }

    #[test]
    fn test_bandwidth_based_estimate() {
        let setup = setup(ladder(), false);
        assert_eq!(setup.reference.estimates.get(), None);

        setup
            .playback_observer
            .set(Some(PlaybackObservation::new(10., 8.)));
        let estimate = setup.reference.estimates.get().unwrap();
        assert_eq!(estimate.representation.id, "low");
        assert!(estimate.urgent);

        let rep = Representation::new("mid", 1_000_000.);
        for _ in 0..10 {
            setup.reference.callbacks.metrics(metrics(&rep, 1000., 250_000));
        }
        setup.current_representation.set(Some(rep));
        setup
            .playback_observer
            .set(Some(PlaybackObservation::new(10., 8.)));
        let estimate = setup.reference.estimates.get().unwrap();
        // 2Mbps * 0.8
        assert_eq!(estimate.representation.id, "mid");
        assert!((estimate.bitrate.unwrap() - 2_000_000.).abs() < 1e-3);
        assert!(!estimate.urgent);
        assert_eq!(estimate.known_stable_bitrate, Some(1_000_000.));
    }

    #[test]
    fn test_filters_trigger_estimates() {
        let setup = setup(ladder(), false);
        setup
            .playback_observer
            .set(Some(PlaybackObservation::new(10., 8.)));
        let rep = Representation::new("high", 2_000_000.);
        for _ in 0..10 {
            setup.reference.callbacks.metrics(metrics(&rep, 1000., 1_000_000));
        }
        setup
            .playback_observer
            .set(Some(PlaybackObservation::new(10., 8.)));
        assert_eq!(chosen_id(&setup).as_deref(), Some("high"));

        setup.filters.throttle_bitrate.set(1_500_000.);
        assert_eq!(chosen_id(&setup).as_deref(), Some("mid"));
        setup.filters.throttle_bitrate.set(0.);
        assert_eq!(chosen_id(&setup).as_deref(), Some("low"));
    }

    #[test]
    fn test_new_representations_rebuild_session() {
        let setup = setup(ladder(), false);
        setup
            .playback_observer
            .set(Some(PlaybackObservation::new(10., 8.)));
        let rep = Representation::new("mid", 1_000_000.);
        for _ in 0..10 {
            setup.reference.callbacks.metrics(metrics(&rep, 1000., 250_000));
        }

        setup.representations.set(vec![
            Representation::new("a", 100_000.),
            Representation::new("b", 1_500_000.),
        ]);
        // The bandwidth estimate is kept between sessions
        let estimate = setup.reference.estimates.get().unwrap();
        assert_eq!(estimate.representation.id, "b");

        setup.representations.set(vec![Representation::new("c", 100.)]);
        assert_eq!(chosen_id(&setup).as_deref(), Some("c"));
    }

    #[test]
    fn test_stop_all_estimates() {
        let setup = setup(ladder(), false);
        setup
            .playback_observer
            .set(Some(PlaybackObservation::new(10., 8.)));
        assert_eq!(chosen_id(&setup).as_deref(), Some("low"));
        setup.canceller.cancel();

        setup.filters.throttle_bitrate.set(0.);
        setup
            .representations
            .set(vec![Representation::new("c", 100.)]);
        assert_eq!(chosen_id(&setup).as_deref(), Some("low"));
        assert_eq!(setup.playback_observer.listener_count(), 0);
        assert_eq!(setup.filters.throttle_bitrate.listener_count(), 0);
        assert_eq!(setup.representations.listener_count(), 0);
    }

    #[test]
    fn test_buffer_based_estimate() {
        let setup = setup(ladder(), false);
        setup
            .playback_observer
            .set(Some(PlaybackObservation::new(10., 30.)));
        assert_eq!(chosen_id(&setup).as_deref(), Some("low"));

        // Small requests: no bandwidth estimate, but a maintainable score
        let low = Representation::new("low", 500_000.);
        for _ in 0..6 {
            setup.reference.callbacks.metrics(metrics(&low, 1000., 1000));
        }
        setup.current_representation.set(Some(low.clone()));
        setup.reference.callbacks.added_segment(AddedSegmentEvent {
            buffered: TimeRanges::from_ranges(&[(0., 40.)]),
            content: video_context(&low, Segment::media("s", 38., 2.)),
        });
        let estimate = setup.reference.estimates.get().unwrap();
        assert_eq!(estimate.representation.id, "mid");
        assert!(!estimate.urgent);
        assert_eq!(estimate.known_stable_bitrate, Some(500_000.));
    }

    #[test]
    fn test_guess_based_estimate() {
        let setup = setup(ladder(), true);
        let low = Representation::new("low", 500_000.);
        for _ in 0..6 {
            setup.reference.callbacks.metrics(metrics(&low, 1000., 1000));
        }
        setup.current_representation.set(Some(low));
        let mut observation = PlaybackObservation::new(100., 3.);
        observation.maximum_position = 110.;
        setup.playback_observer.set(Some(observation.clone()));
        assert_eq!(chosen_id(&setup).as_deref(), Some("low"));

        setup.clock.advance(100.);
        setup.playback_observer.set(Some(observation));
        let estimate = setup.reference.estimates.get().unwrap();
        assert_eq!(estimate.representation.id, "mid");
        assert!(!estimate.urgent);
    }

    #[test]
    fn test_guess_when_current_representation_is_filtered_out() {
        let clock = Rc::new(ManualClock::new(1000.));
        let log_sink = Rc::new(MemorySink::default());
        let selector = AdaptiveRepresentationSelector::new(AdaptiveSelectorOptions {
            initial_bitrates: HashMap::new(),
            low_latency_mode: true,
            configuration: Rc::new(Configuration::default()),
            logger: Logger::new(log_sink.clone(), LoggerLevel::Error),
            clock: clock.clone(),
        });
        let mid = Representation::new("mid", 1_000_000.);
        let current_representation = SharedReference::new(Some(mid.clone()));
        let representations = SharedReference::new(ladder());
        let playback_observer = SharedReference::new(None);
        let filters = AbrFilters::new();
        let canceller = TaskCanceller::new();
        let reference = selector.get_estimate_reference(
            EstimateContext {
                media_type: MediaType::Video,
                is_dynamic: true,
            },
            current_representation.clone(),
            representations.clone(),
            playback_observer.clone(),
            filters.clone(),
            &canceller.signal(),
        );
        for _ in 0..6 {
            reference.callbacks.metrics(metrics(&mid, 1000., 1000));
        }
        filters.throttle_bitrate.set(600_000.);

        let mut observation = PlaybackObservation::new(100., 3.);
        observation.maximum_position = 110.;
        playback_observer.set(Some(observation.clone()));
        assert_eq!(
            reference
                .estimates
                .with(|e| e.as_ref().map(|e| e.representation.id.clone())),
            Some("low".to_owned())
        );

        clock.advance(100.);
        playback_observer.set(Some(observation));
        let estimate = reference.estimates.get().unwrap();
        assert_eq!(estimate.representation.id, "high");
        assert!(!estimate.urgent);
        assert!(log_sink.logs.borrow().is_empty());
    }

    #[test]
    fn test_request_lifecycle() {
        let setup = setup(ladder(), false);
        let rep = Representation::new("low", 500_000.);
        setup.reference.callbacks.request_begin(RequestBeginEvent {
            id: "1".to_owned(),
            request_timestamp: 1000.,
            content: video_context(&rep, Segment::media("s", 10., 2.)),
        });
        setup.reference.callbacks.request_progress(RequestProgressEvent {
            id: "1".to_owned(),
            timestamp: 1100.,
            size: 100,
            total_size: Some(1000),
        });
        {
            let session = setup.reference.callbacks.live_session().unwrap();
            let state = session.state.borrow();
            assert_eq!(state.requests_store.len(), 1);
            assert_eq!(state.requests_store.get_requests()[0].progress.len(), 1);
        }
        setup.reference.callbacks.request_end("1");
        let session = setup.reference.callbacks.live_session().unwrap();
        assert!(session.state.borrow().requests_store.is_empty());
    }
}
