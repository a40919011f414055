use crate::{configuration::Configuration, content::Representation};

use super::{
    ewma::Ewma,
    types::{ScoreConfidenceLevel, ScoreData},
};

/// Minimum number of segments of the current Representation which have to be loaded for its
/// score to be trusted.
const MINIMUM_LOADED_SEGMENTS_FOR_HIGH_CONFIDENCE: u32 = 5;

/// Minimum duration of media, in seconds, of the current Representation which has to be loaded
/// for its score to be trusted.
const MINIMUM_LOADED_DURATION_FOR_HIGH_CONFIDENCE: f64 = 10.;

struct CurrentRepresentationScore {
    representation_id: String,
    ewma: Ewma,
    loaded_segments: u32,
    loaded_duration: f64,
}

/// Calculate the "maintainability score" of the last Representation for which segments were
/// loaded.
///
/// Only one Representation is scored at a time: sampling a new Representation discards what was
/// known about the previous one.
pub struct RepresentationScoreCalculator {
    half_life: f64,
    current: Option<CurrentRepresentationScore>,
    last_stable_representation: Option<Representation>,
}

impl RepresentationScoreCalculator {
    pub fn new(config: &Configuration) -> Self {
        Self {
            half_life: config.score_ewma_half_life,
            current: None,
            last_stable_representation: None,
        }
    }

    /// Add new sample data for `representation`.
    ///
    /// `request_duration` is the time taken to load a segment, in seconds, and
    /// `segment_duration` the duration of media it contained, in seconds.
    pub fn add_sample(
        &mut self,
        representation: &Representation,
        request_duration: f64,
        segment_duration: f64,
    ) {
        let ratio = segment_duration / request_duration;
        let estimate = match self.current.as_mut() {
            Some(current) if current.representation_id == representation.id => {
                current.ewma.add_sample(request_duration, ratio);
                current.loaded_segments += 1;
                current.loaded_duration += segment_duration;
                current.ewma.get_estimate()
            }
            _ => {
                let mut ewma = Ewma::new(self.half_life);
                ewma.add_sample(request_duration, ratio);
                let estimate = ewma.get_estimate();
                self.current = Some(CurrentRepresentationScore {
                    representation_id: representation.id.clone(),
                    ewma,
                    loaded_segments: 0,
                    loaded_duration: segment_duration,
                });
                estimate
            }
        };

        if estimate > 1.
            && self.last_stable_representation.as_ref().map(|r| &r.id) != Some(&representation.id)
        {
            self.last_stable_representation = Some(representation.clone());
        }
    }

    /// Get the score estimate of `representation`.
    ///
    /// Returns `None` if `representation` is not the Representation currently scored.
    pub fn get_estimate(&self, representation: &Representation) -> Option<ScoreData> {
        let current = self.current.as_ref()?;
        if current.representation_id != representation.id {
            return None;
        }
        let confidence_level = if current.loaded_segments
            >= MINIMUM_LOADED_SEGMENTS_FOR_HIGH_CONFIDENCE
            && current.loaded_duration >= MINIMUM_LOADED_DURATION_FOR_HIGH_CONFIDENCE
        {
            ScoreConfidenceLevel::High
        } else {
            ScoreConfidenceLevel::Low
        };
        Some(ScoreData {
            score: current.ewma.get_estimate(),
            confidence_level,
        })
    }

    /// Returns the last Representation whose score went above `1.`, or `None` if none did.
    pub fn get_last_stable_representation(&self) -> Option<&Representation> {
        self.last_stable_representation.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_of_unknown_representation() {
        let mut calculator = RepresentationScoreCalculator::new(&Configuration::default());
        let rep1 = Representation::new("1", 1000.);
        let rep2 = Representation::new("2", 2000.);
        assert_eq!(calculator.get_estimate(&rep1), None);
        calculator.add_sample(&rep1, 1., 2.);
        assert!(calculator.get_estimate(&rep1).is_some());
        assert_eq!(calculator.get_estimate(&rep2), None);
    }

    #[test]
    fn test_confidence_level() {
        let mut calculator = RepresentationScoreCalculator::new(&Configuration::default());
        let rep = Representation::new("1", 1000.);
        for _ in 0..5 {
            calculator.add_sample(&rep, 1., 2.);
            assert_eq!(
                calculator.get_estimate(&rep).unwrap().confidence_level,
                ScoreConfidenceLevel::Low
            );
        }
        calculator.add_sample(&rep, 1., 2.);
        let estimate = calculator.get_estimate(&rep).unwrap();
        assert_eq!(estimate.confidence_level, ScoreConfidenceLevel::High);
        assert!((estimate.score - 2.).abs() < 1e-9);
    }

    #[test]
    fn test_switching_representation_resets_score() {
        let mut calculator = RepresentationScoreCalculator::new(&Configuration::default());
        let rep1 = Representation::new("1", 1000.);
        let rep2 = Representation::new("2", 2000.);
        for _ in 0..10 {
            calculator.add_sample(&rep1, 1., 4.);
        }
        calculator.add_sample(&rep2, 4., 2.);
        assert_eq!(calculator.get_estimate(&rep1), None);
        let estimate = calculator.get_estimate(&rep2).unwrap();
        assert!((estimate.score - 0.5).abs() < 1e-9);
        assert_eq!(estimate.confidence_level, ScoreConfidenceLevel::Low);
    }

    #[test]
    fn test_last_stable_representation() {
        let mut calculator = RepresentationScoreCalculator::new(&Configuration::default());
        let rep1 = Representation::new("1", 1000.);
        let rep2 = Representation::new("2", 2000.);
        let rep3 = Representation::new("3", 500.);
        calculator.add_sample(&rep2, 4., 2.);
        assert_eq!(calculator.get_last_stable_representation(), None);
        calculator.add_sample(&rep2, 1., 4.);
        calculator.add_sample(&rep2, 1., 4.);
        calculator.add_sample(&rep2, 1., 4.);
        assert_eq!(calculator.get_last_stable_representation(), Some(&rep2));
        calculator.add_sample(&rep1, 1., 2.);
        assert_eq!(calculator.get_last_stable_representation(), Some(&rep1));

        // Not maintainable: the last stable one stays
        calculator.add_sample(&rep3, 4., 2.);
        assert_eq!(calculator.get_last_stable_representation(), Some(&rep1));
    }
}
