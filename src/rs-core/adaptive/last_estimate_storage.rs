use crate::content::Representation;

use super::types::AbrAlgorithmType;

/// Remember the last estimate emitted by the adaptive logic, and which algorithm produced it.
#[derive(Clone, Debug, Default)]
pub struct LastEstimateStorage {
    /// Bandwidth estimate linked to the last estimate, in bits per second.
    pub bandwidth: Option<f64>,

    /// Representation chosen by the last estimate.
    pub representation: Option<Representation>,

    /// Algorithm which produced the last estimate.
    pub algorithm_type: Option<AbrAlgorithmType>,
}

impl LastEstimateStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(
        &mut self,
        representation: Representation,
        bandwidth: Option<f64>,
        algorithm_type: AbrAlgorithmType,
    ) {
        self.representation = Some(representation);
        self.bandwidth = bandwidth;
        self.algorithm_type = Some(algorithm_type);
    }
}
