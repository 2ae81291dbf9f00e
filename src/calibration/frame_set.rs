use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::geometry::so3::ypr_to_matrix;
use crate::geometry::SE3;
use crate::map::Frame;

/// Fused rig pose for one frame set: the reference camera's pose in the world.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Odometry {
    pub timestamp_ns: u64,
    pub position: Vector3<f64>,
    /// (yaw, pitch, roll), composed as `Rz(yaw) · Ry(pitch) · Rx(roll)`.
    pub attitude: Vector3<f64>,
}

impl Odometry {
    pub fn new(timestamp_ns: u64, position: Vector3<f64>, attitude: Vector3<f64>) -> Self {
        Self {
            timestamp_ns,
            position,
            attitude,
        }
    }

    pub fn yaw(&self) -> f64 {
        self.attitude.x
    }

    pub fn pitch(&self) -> f64 {
        self.attitude.y
    }

    pub fn roll(&self) -> f64 {
        self.attitude.z
    }

    /// `T_world_ref`: maps reference-camera coordinates to world coordinates.
    pub fn pose(&self) -> SE3 {
        SE3::from_rt(ypr_to_matrix(&self.attitude), self.position)
    }

    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.pose().rotation
    }
}

/// Frames believed to have been captured at the same instant, at most one per
/// camera, plus the rig pose they share.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSet {
    pub timestamp_ns: u64,
    pub frames: Vec<Frame>,
    pub odometry: Odometry,
}

impl FrameSet {
    pub fn new(timestamp_ns: u64, frames: Vec<Frame>) -> Self {
        Self {
            timestamp_ns,
            frames,
            odometry: Odometry {
                timestamp_ns,
                ..Odometry::default()
            },
        }
    }

    pub fn frame_for_camera(&self, camera_id: usize) -> Option<&Frame> {
        self.frames.iter().find(|f| f.camera_id == camera_id)
    }

    /// True if every one of `camera_count` cameras contributed a localized frame.
    pub fn is_complete(&self, camera_count: usize) -> bool {
        (0..camera_count).all(|c| {
            self.frame_for_camera(c)
                .is_some_and(|f| f.is_localized())
        })
    }

    pub fn camera_ids(&self) -> Vec<usize> {
        self.frames.iter().map(|f| f.camera_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn localized(camera_id: usize) -> Frame {
        let mut f = Frame::new(camera_id, 5);
        f.pose = Some(SE3::identity());
        f
    }

    #[test]
    fn test_completeness() {
        let set = FrameSet::new(5, vec![localized(0), localized(2)]);
        assert!(!set.is_complete(3));
        assert!(set.is_complete(1));

        let set = FrameSet::new(5, vec![localized(1), localized(0), localized(2)]);
        assert!(set.is_complete(3));
        assert_eq!(set.camera_ids(), vec![1, 0, 2]);
    }

    #[test]
    fn test_odometry_pose() {
        let odo = Odometry::new(0, Vector3::new(1.0, 2.0, 0.0), Vector3::new(std::f64::consts::FRAC_PI_2, 0.0, 0.0));
        let pose = odo.pose();

        // Yaw of 90 degrees maps the x axis onto y.
        assert_relative_eq!(pose.transform_point(&Vector3::x()), Vector3::new(1.0, 3.0, 0.0), epsilon = 1e-12);
    }
}
