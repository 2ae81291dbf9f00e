//! ScenePoint - a triangulated 3D landmark.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::PointId;

/// One 2D feature observing a scene point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub camera_id: usize,
    pub timestamp_ns: u64,
    /// Extractor index of the observing feature (`Feature2D::index`).
    pub feature_index: usize,
}

/// A 3D point plus the features that observe it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenePoint {
    /// Position in world coordinates.
    pub position: Vector3<f64>,
    pub observations: Vec<Observation>,
    /// Reference-map point this point was created from, for points
    /// synthesized during calibration.
    pub reference: Option<PointId>,
}

impl ScenePoint {
    pub fn new(position: Vector3<f64>) -> Self {
        Self {
            position,
            observations: Vec::new(),
            reference: None,
        }
    }

    pub fn from_reference(position: Vector3<f64>, reference: PointId) -> Self {
        Self {
            position,
            observations: Vec::new(),
            reference: Some(reference),
        }
    }

    pub fn add_observation(&mut self, obs: Observation) {
        self.observations.push(obs);
    }

    /// Remove one occurrence of `obs`. Returns false if it was not recorded.
    pub fn remove_observation(&mut self, obs: &Observation) -> bool {
        match self.observations.iter().position(|o| o == obs) {
            Some(i) => {
                self.observations.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn num_observations(&self) -> usize {
        self.observations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_bookkeeping() {
        let mut sp = ScenePoint::from_reference(Vector3::new(1.0, 2.0, 3.0), PointId::new(9));
        sp.add_observation(Observation {
            camera_id: 0,
            timestamp_ns: 10,
            feature_index: 4,
        });
        sp.add_observation(Observation {
            camera_id: 1,
            timestamp_ns: 10,
            feature_index: 7,
        });

        sp.add_observation(Observation {
            camera_id: 0,
            timestamp_ns: 10,
            feature_index: 4,
        });

        let gone = Observation {
            camera_id: 0,
            timestamp_ns: 10,
            feature_index: 4,
        };
        assert!(sp.remove_observation(&gone));
        assert_eq!(sp.num_observations(), 2);
        assert!(sp.remove_observation(&gone));
        assert!(!sp.remove_observation(&gone));

        assert_eq!(sp.num_observations(), 1);
        assert_eq!(sp.observations[0].camera_id, 1);
        assert_eq!(sp.reference, Some(PointId::new(9)));
    }
}
