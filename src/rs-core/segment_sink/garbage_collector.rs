use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use crate::{
    observation::PlaybackObservation,
    utils::{
        logger::Logger,
        shared_reference::{SharedReference, SubscribeOptions},
        task_canceller::CancellationSignal,
        time_ranges::{TimeRange, TimeRanges},
    },
};

use super::SegmentSink;

/// Returns the time ranges which should be removed from a buffer so it only contains media
/// between `max_buffer_behind` seconds before `position` and `max_buffer_ahead` seconds after
/// it.
///
/// An infinite limit means that nothing has to be removed on that side.
pub fn compute_ranges_to_clean(
    position: f64,
    buffered: &TimeRanges,
    max_buffer_behind: f64,
    max_buffer_ahead: f64,
) -> Vec<TimeRange> {
    if !max_buffer_behind.is_finite() && !max_buffer_ahead.is_finite() {
        return vec![];
    }
    let (inner_range, outer_ranges) = buffered.split_around(position);
    let mut cleaned_up: Vec<TimeRange> = vec![];

    if max_buffer_behind.is_finite() {
        let min_position = position - max_buffer_behind;
        for outer_range in &outer_ranges {
            if min_position >= outer_range.end() {
                cleaned_up.push(*outer_range);
            } else if position >= outer_range.end()
                && min_position > outer_range.start()
                && min_position < outer_range.end()
            {
                cleaned_up.push(TimeRange::new(outer_range.start(), min_position));
            }
        }
        if let Some(inner_range) = inner_range {
            if min_position > inner_range.start() {
                cleaned_up.push(TimeRange::new(inner_range.start(), min_position));
            }
        }
    }

    if max_buffer_ahead.is_finite() {
        let max_position = position + max_buffer_ahead;
        for outer_range in &outer_ranges {
            if max_position <= outer_range.start() {
                cleaned_up.push(*outer_range);
            } else if position <= outer_range.start()
                && max_position < outer_range.end()
                && max_position > outer_range.start()
            {
                cleaned_up.push(TimeRange::new(max_position, outer_range.end()));
            }
        }
        if let Some(inner_range) = inner_range {
            if max_position < inner_range.end() {
                cleaned_up.push(TimeRange::new(max_position, inner_range.end()));
            }
        }
    }

    cleaned_up.retain(|r| r.start() < r.end());
    cleaned_up
}

/// Regularly removes media too far from the current position from a `SegmentSink`'s buffer.
pub struct BufferGarbageCollector;

impl BufferGarbageCollector {
    /// Start cleaning the buffer behind `segment_sink` each time a new playback observation is
    /// received and each time one of the limits changes, until `cancel_signal` is triggered.
    ///
    /// What is buffered is deduced from the sink's last known inventory.
    ///
    /// # Arguments
    ///
    /// * `segment_sink` - The sink whose buffer should be cleaned.
    ///
    /// * `playback_observer` - Last playback observation, its wanted position being the one
    ///   around which media is kept.
    ///
    /// * `max_buffer_behind` - Maximum amount of media, in seconds, to keep before the
    ///   position. `f64::INFINITY` to never remove media behind it.
    ///
    /// * `max_buffer_ahead` - Maximum amount of media, in seconds, to keep after the position.
    ///   `f64::INFINITY` to never remove media ahead of it.
    pub fn start(
        segment_sink: Rc<RefCell<dyn SegmentSink>>,
        playback_observer: SharedReference<Option<PlaybackObservation>>,
        max_buffer_behind: SharedReference<f64>,
        max_buffer_ahead: SharedReference<f64>,
        logger: Logger,
        cancel_signal: &CancellationSignal,
    ) {
        let last_position: Rc<Cell<Option<f64>>> = Rc::new(Cell::new(None));
        let clean: Rc<dyn Fn()> = {
            let last_position = last_position.clone();
            let max_buffer_behind = max_buffer_behind.clone();
            let max_buffer_ahead = max_buffer_ahead.clone();
            let cancel_signal = cancel_signal.clone();
            Rc::new(move || {
                if cancel_signal.is_cancelled() {
                    return;
                }
                if let Some(position) = last_position.get() {
                    clean_buffer(
                        &segment_sink,
                        position,
                        max_buffer_behind.get(),
                        max_buffer_ahead.get(),
                        &logger,
                    );
                }
            })
        };

        let clean_on_observation = clean.clone();
        playback_observer.subscribe(
            move |observation| {
                if let Some(observation) = observation {
                    last_position.set(Some(observation.position.wanted()));
                    clean_on_observation();
                }
            },
            SubscribeOptions {
                emit_current_value: true,
                once: false,
            },
            Some(cancel_signal),
        );
        let clean_on_behind_update = clean.clone();
        max_buffer_behind.subscribe(
            move |_| clean_on_behind_update(),
            SubscribeOptions::default(),
            Some(cancel_signal),
        );
        max_buffer_ahead.subscribe(
            move |_| clean(),
            SubscribeOptions::default(),
            Some(cancel_signal),
        );
    }
}

fn clean_buffer(
    segment_sink: &RefCell<dyn SegmentSink>,
    position: f64,
    max_buffer_behind: f64,
    max_buffer_ahead: f64,
    logger: &Logger,
) {
    let mut segment_sink = match segment_sink.try_borrow_mut() {
        Ok(segment_sink) => segment_sink,
        Err(_) => {
            logger.warn("GC: SegmentSink busy, skipping cleaning");
            return;
        }
    };
    let mut buffered = TimeRanges::new();
    for chunk in segment_sink.get_last_known_inventory() {
        buffered.add(
            chunk.buffered_start.unwrap_or(chunk.start),
            chunk.buffered_end.unwrap_or(chunk.end),
        );
    }
    let to_clean =
        compute_ranges_to_clean(position, &buffered, max_buffer_behind, max_buffer_ahead);
    for range in to_clean {
        logger.debug(&format!(
            "GC: cleaning {} range from SegmentSink (s:{}, e:{})",
            segment_sink.media_type(),
            range.start(),
            range.end()
        ));
        if let Err(err) = segment_sink.remove_buffer(range.start(), range.end()) {
            logger.warn(&format!("GC: {}", err));
            return;
        }
    }
}
