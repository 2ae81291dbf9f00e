//! Rig pose from the individual camera poses of one frame set.

use nalgebra::{UnitQuaternion, Vector3};

use crate::geometry::so3::{average_quaternions, matrix_to_ypr};
use crate::geometry::SE3;
use crate::map::Frame;

use super::Odometry;

/// Fuse every localized frame into one reference-camera pose.
///
/// Each frame votes for `T_world_ref = T_cw⁻¹ · T_cam_ref⁻¹`, where
/// `extrinsics[camera]` maps camera coordinates into the reference camera.
/// Positions are averaged arithmetically, orientations with the quaternion
/// mean. Returns `None` when no frame carries a pose.
pub fn estimate_odometry(frames: &[Frame], extrinsics: &[SE3], timestamp_ns: u64) -> Option<Odometry> {
    let mut positions = Vector3::zeros();
    let mut rotations: Vec<UnitQuaternion<f64>> = Vec::with_capacity(frames.len());

    for frame in frames {
        let (Some(pose_cw), Some(t_cam_ref)) = (frame.pose, extrinsics.get(frame.camera_id)) else {
            continue;
        };
        let t_world_ref = pose_cw.inverse().compose(&t_cam_ref.inverse());
        positions += t_world_ref.translation;
        rotations.push(t_world_ref.rotation);
    }

    if rotations.is_empty() {
        return None;
    }

    let position = positions / rotations.len() as f64;
    let mean = average_quaternions(&rotations)?;
    let attitude = matrix_to_ypr(mean.to_rotation_matrix().matrix());

    Some(Odometry::new(timestamp_ns, position, attitude))
}
