/// Value of a configuration knob which depends on whether we're playing in "low-latency" mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LatencyModeValues {
    /// Value used for regular contents.
    pub default: f64,

    /// Value used when playing a content in low-latency mode.
    pub low_latency: f64,
}

impl LatencyModeValues {
    /// Returns the value corresponding to the given mode.
    pub fn get(&self, low_latency_mode: bool) -> f64 {
        if low_latency_mode {
            self.low_latency
        } else {
            self.default
        }
    }
}

/// Inner configuration on which the adaptive logic and the segment inventory rely.
///
/// The `Default` implementation gives the values used in production.
#[derive(Clone, Debug)]
pub struct Configuration {
    /// Half-life, in seconds, of the bandwidth-estimating EWMA reacting quickly to network
    /// changes.
    pub fast_ewma_half_life: f64,

    /// Half-life, in seconds, of the bandwidth-estimating EWMA reacting slowly to network
    /// changes.
    pub slow_ewma_half_life: f64,

    /// Half-life, in seconds, of the EWMA computing a Representation's maintainability score.
    pub score_ewma_half_life: f64,

    /// Minimum size, in bytes, a loaded resource should have to be considered in bandwidth
    /// estimates.
    ///
    /// Smaller requests (e.g. initialization segments) tend to give unreliable bandwidth samples.
    pub minimum_chunk_size: u64,

    /// Minimum amount of bytes which have to be sampled before producing a bandwidth estimate.
    pub minimum_total_bytes: u64,

    /// Buffer gap, in seconds, under which we enter "starvation mode".
    ///
    /// In that mode, bandwidth estimates are more pessimistic and emergency estimates can be
    /// produced from pending requests.
    pub starvation_gap: LatencyModeValues,

    /// Buffer gap, in seconds, at which we exit "starvation mode".
    pub out_of_starvation_gap: LatencyModeValues,

    /// Tolerance, in seconds, when checking whether the content is buffered up to its end, in
    /// which case we can never be in "starvation mode".
    pub starvation_duration_delta: f64,

    /// Factor applied to the bandwidth estimate in "starvation mode" to obtain the maximum
    /// bitrate we can choose.
    pub starvation_bitrate_factor: LatencyModeValues,

    /// Factor applied to the bandwidth estimate outside "starvation mode" to obtain the maximum
    /// bitrate we can choose.
    pub regular_bitrate_factor: LatencyModeValues,

    /// Buffer gap, in seconds, from which buffer-based estimates begin to be considered.
    pub enter_buffer_based_algo: f64,

    /// Buffer gap, in seconds, under which buffer-based estimates stop being considered.
    ///
    /// Should be lower than `enter_buffer_based_algo` so we don't oscillate between both modes.
    pub exit_buffer_based_algo: f64,

    /// Seconds added to every buffer level, except the lowest, computed by the buffer-based
    /// logic.
    pub buffer_level_security_margin: f64,

    /// Minimum delay, in milliseconds, during which the buffer-based logic won't raise the
    /// quality after choosing a quality which turned out to be unsuitable.
    pub minimum_block_raise_delay: f64,

    /// Maximum delay, in milliseconds, during which the buffer-based logic won't raise the
    /// quality after choosing a quality which turned out to be unsuitable.
    pub maximum_block_raise_delay: f64,

    /// Amount of milliseconds added to the current raise-blocking delay when a quality appears
    /// unsuitable again shortly after the last one did.
    pub raise_block_delay_increment: f64,

    /// Amount of milliseconds removed from the current raise-blocking delay when a quality
    /// appears unsuitable long after the last one did.
    pub raise_block_delay_decrement: f64,

    /// Time, in milliseconds, which added to the current raise-blocking delay, defines whether two
    /// unsuitable qualities happened "shortly" one after the other.
    pub stability_check_delay: f64,

    /// Maximum age, in milliseconds, of buffered history entries.
    pub buffered_history_retention_time: f64,

    /// Maximum number of buffered history entries kept per inventory.
    pub buffered_history_maximum_entries: usize,

    /// Duration, in seconds, under which a buffered range or a portion of a segment is considered
    /// as insignificant when synchronizing the inventory.
    pub minimum_segment_size: f64,

    /// Maximum difference, in seconds, between a segment's announced start or end and the one
    /// seen in the buffer, for the latter to be trusted.
    pub max_manifest_buffered_start_end_difference: f64,

    /// Maximum difference, in seconds, between a segment's announced duration and the one seen in
    /// the buffer, for the latter to be trusted.
    pub max_manifest_buffered_duration_difference: f64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            fast_ewma_half_life: 2.,
            slow_ewma_half_life: 10.,
            score_ewma_half_life: 5.,
            minimum_chunk_size: 16_000,
            minimum_total_bytes: 150_000,
            starvation_gap: LatencyModeValues {
                default: 5.,
                low_latency: 5.,
            },
            out_of_starvation_gap: LatencyModeValues {
                default: 7.,
                low_latency: 7.,
            },
            starvation_duration_delta: 0.1,
            starvation_bitrate_factor: LatencyModeValues {
                default: 0.72,
                low_latency: 0.72,
            },
            regular_bitrate_factor: LatencyModeValues {
                default: 0.8,
                low_latency: 0.8,
            },
            enter_buffer_based_algo: 10.,
            exit_buffer_based_algo: 5.,
            buffer_level_security_margin: 4.,
            minimum_block_raise_delay: 6000.,
            maximum_block_raise_delay: 15000.,
            raise_block_delay_increment: 3000.,
            raise_block_delay_decrement: 1000.,
            stability_check_delay: 9000.,
            buffered_history_retention_time: 60000.,
            buffered_history_maximum_entries: 200,
            minimum_segment_size: 0.005,
            max_manifest_buffered_start_end_difference: 0.4,
            max_manifest_buffered_duration_difference: 0.3,
        }
    }
}
