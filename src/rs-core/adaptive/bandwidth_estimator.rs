use crate::configuration::Configuration;

use super::ewma::Ewma;

/// Produce bandwidth estimates based on two EWMA (exponentially-weighted moving average), one
/// evolving slow and the other evolving fast.
///
/// The minimum between both is then taken into consideration to ensure a sudden fall in bandwidth
/// has a lasting impact on estimates and that we only raise that estimate once it raised for
/// enough time.
#[derive(Clone, Debug)]
pub struct BandwidthEstimator {
    fast_ewma: Ewma,
    slow_ewma: Ewma,
    bytes_sampled: u64,
    fast_half_life: f64,
    slow_half_life: f64,
    minimum_chunk_size: u64,
    minimum_total_bytes: u64,
}

impl BandwidthEstimator {
    /// Creates a new `BandwidthEstimator`
    pub fn new(config: &Configuration) -> Self {
        Self {
            fast_ewma: Ewma::new(config.fast_ewma_half_life),
            slow_ewma: Ewma::new(config.slow_ewma_half_life),
            bytes_sampled: 0,
            fast_half_life: config.fast_ewma_half_life,
            slow_half_life: config.slow_ewma_half_life,
            minimum_chunk_size: config.minimum_chunk_size,
            minimum_total_bytes: config.minimum_total_bytes,
        }
    }

    /// Feed the BandwidthEstimator a new bandwidth data sample.
    ///
    /// You may want to call this method after a new resource was loaded, in the
    /// case where you want to consider this request in the whole bandwidth
    /// estimation logic.
    pub fn add_sample(&mut self, duration_ms: f64, size_bytes: u64) {
        if size_bytes < self.minimum_chunk_size || !(duration_ms > 0.) {
            return;
        }
        let bandwidth = (size_bytes as f64) * 8000. / duration_ms;
        let weight = duration_ms / 1000.;
        self.bytes_sampled += size_bytes;
        self.fast_ewma.add_sample(weight, bandwidth);
        self.slow_ewma.add_sample(weight, bandwidth);
    }

    /// Get the current estimate made by the `BandwidthEstimator`, in bits per second.
    ///
    /// Returns `None` if it does not have enough data to produce a estimate yet.
    pub fn get_estimate(&self) -> Option<f64> {
        if self.bytes_sampled < self.minimum_total_bytes {
            None
        } else {
            Some(self.fast_ewma.get_estimate().min(self.slow_ewma.get_estimate()))
        }
    }

    /// Reset the `BandwidthEstimator` as if there was no sample added yet.
    pub fn reset(&mut self) {
        self.fast_ewma = Ewma::new(self.fast_half_life);
        self.slow_ewma = Ewma::new(self.slow_half_life);
        self.bytes_sampled = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_estimate_before_minimum_bytes() {
        let mut estimator = BandwidthEstimator::new(&Configuration::default());
        estimator.add_sample(1000., 100_000);
        assert_eq!(estimator.get_estimate(), None);
        estimator.add_sample(500., 50_000);
        let estimate = estimator.get_estimate().unwrap();
        assert!((estimate - 800_000.).abs() < 1e-3);
    }

    #[test]
    fn test_small_chunks_ignored() {
        let mut estimator = BandwidthEstimator::new(&Configuration::default());
        for _ in 0..20 {
            estimator.add_sample(10., 15_999);
        }
        assert_eq!(estimator.get_estimate(), None);
    }

    #[test]
    fn test_invalid_durations_ignored() {
        let mut estimator = BandwidthEstimator::new(&Configuration::default());
        estimator.add_sample(0., 200_000);
        estimator.add_sample(f64::NAN, 200_000);
        estimator.add_sample(-5., 200_000);
        assert_eq!(estimator.get_estimate(), None);
    }

    #[test]
    fn test_takes_the_minimum_of_both_averages() {
        let mut estimator = BandwidthEstimator::new(&Configuration::default());
        for _ in 0..10 {
            estimator.add_sample(1000., 250_000);
        }
        assert!((estimator.get_estimate().unwrap() - 2_000_000.).abs() < 1e-3);

        // A sudden drop is seen faster by the fast EWMA
        estimator.add_sample(1000., 25_000);
        let fast = estimator.fast_ewma.get_estimate();
        assert!(fast < estimator.slow_ewma.get_estimate());
        assert_eq!(estimator.get_estimate(), Some(fast));
    }

    #[test]
    fn test_reset() {
        let mut estimator = BandwidthEstimator::new(&Configuration::default());
        estimator.add_sample(1000., 200_000);
        assert!(estimator.get_estimate().is_some());
        estimator.reset();
        assert_eq!(estimator.get_estimate(), None);
    }
}
