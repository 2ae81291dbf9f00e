use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::features::Descriptor;
use crate::geometry::SE3;

use super::PointId;

/// An image keypoint with its descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature2D {
    /// Pixel coordinates.
    pub keypoint: Vector2<f64>,
    pub descriptor: Descriptor,
    /// Index of the keypoint in the extractor output, kept across pruning.
    pub index: usize,
    /// Scene point this feature observes, if any.
    pub point: Option<PointId>,
}

impl Feature2D {
    pub fn new(keypoint: Vector2<f64>, descriptor: Descriptor, index: usize) -> Self {
        Self {
            keypoint,
            descriptor,
            index,
            point: None,
        }
    }
}

/// One camera's image at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub camera_id: usize,
    pub timestamp_ns: u64,
    pub features: Vec<Feature2D>,
    /// Estimated camera pose `T_cw` (world to camera). `None` until localized.
    pub pose: Option<SE3>,
}

impl Frame {
    pub fn new(camera_id: usize, timestamp_ns: u64) -> Self {
        Self {
            camera_id,
            timestamp_ns,
            features: Vec::new(),
            pose: None,
        }
    }

    pub fn is_localized(&self) -> bool {
        self.pose.is_some()
    }

    /// Drop every feature without an associated scene point.
    pub fn prune_unassociated(&mut self) {
        self.features.retain(|f| f.point.is_some());
    }

    pub fn associated_count(&self) -> usize {
        self.features.iter().filter(|f| f.point.is_some()).count()
    }
}
