/// Exponentially-weighted moving average.
///
/// Average considering a "weight" for each estimates and prioritizing the last samples added.
/// This is useful in media streaming where you want to calculate a continuous bandwidth
/// average, while putting more importance to the last loaded data.
///
/// Estimates are corrected for the zero-initialized start, so the first samples are not
/// under-estimated.
#[derive(Clone, Debug)]
pub struct Ewma {
    alpha: f64,
    last_estimate: f64,
    total_weight: f64,
}

impl Ewma {
    /// Creates a new Ewma with the given "half life", in seconds.
    pub fn new(half_life: f64) -> Self {
        Self {
            alpha: f64::exp(0.5f64.ln() / half_life),
            last_estimate: 0.,
            total_weight: 0.,
        }
    }

    /// Adds new sample to the `Ewma` where `val` is the value to add and `weight` is its...
    /// weight.
    ///
    /// Samples which would produce a `NaN` estimate are ignored.
    pub fn add_sample(&mut self, weight: f64, val: f64) {
        let adj_alpha = self.alpha.powf(weight);
        let new_estimate = val * (1. - adj_alpha) + adj_alpha * self.last_estimate;
        if new_estimate.is_nan() {
            return;
        }
        self.last_estimate = new_estimate;
        self.total_weight += weight;
    }

    /// Get the current estimate produced by the `Ewma`.
    ///
    /// Returns `0.` if it cannot produce an estimate yet.
    pub fn get_estimate(&self) -> f64 {
        if self.total_weight == 0. {
            0.
        } else {
            let zero_factor = 1. - self.alpha.powf(self.total_weight);
            self.last_estimate / zero_factor
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_sample() {
        assert_eq!(Ewma::new(2.).get_estimate(), 0.);
    }

    #[test]
    fn test_first_sample_is_not_underestimated() {
        let mut ewma = Ewma::new(5.);
        ewma.add_sample(1., 1000.);
        assert!((ewma.get_estimate() - 1000.).abs() < 1e-9);
    }

    #[test]
    fn test_constant_input_converges_without_overshoot() {
        let mut ewma = Ewma::new(2.);
        for _ in 0..100 {
            ewma.add_sample(0.5, 42.);
            let estimate = ewma.get_estimate();
            assert!(estimate <= 42. + 1e-9);
        }
        assert!((ewma.get_estimate() - 42.).abs() < 1e-9);
    }

    #[test]
    fn test_recent_samples_matter_more() {
        let mut ewma = Ewma::new(2.);
        ewma.add_sample(1., 100.);
        ewma.add_sample(1., 200.);
        let estimate = ewma.get_estimate();
        assert!(estimate > 150. && estimate < 200.);
    }

    #[test]
    fn test_nan_sample_ignored() {
        let mut ewma = Ewma::new(2.);
        ewma.add_sample(1., 10.);
        ewma.add_sample(1., f64::NAN);
        assert!((ewma.get_estimate() - 10.).abs() < 1e-9);
    }
}
