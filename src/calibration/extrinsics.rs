//! CameraRigExtrinsics - per-camera poses relative to camera 0.

use std::fs::File;
use std::path::Path;

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::geometry::SE3;

use super::CalibrationError;

/// One pose per camera mapping camera coordinates into the reference
/// camera's frame. Camera 0 is the reference and stays at identity.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraRigExtrinsics {
    poses: Vec<SE3>,
}

impl CameraRigExtrinsics {
    pub fn new(camera_count: usize) -> Self {
        Self {
            poses: vec![SE3::identity(); camera_count],
        }
    }

    pub fn camera_count(&self) -> usize {
        self.poses.len()
    }

    pub fn global_camera_pose(&self, camera_id: usize) -> Option<&SE3> {
        self.poses.get(camera_id)
    }

    /// Set a camera's pose. Updates to camera 0 are ignored.
    pub fn set_global_camera_pose(&mut self, camera_id: usize, pose: SE3) {
        if camera_id == 0 {
            return;
        }
        if let Some(slot) = self.poses.get_mut(camera_id) {
            *slot = pose;
        }
    }

    /// Transform from camera `from` coordinates to camera `to` coordinates.
    pub fn relative_pose(&self, to: usize, from: usize) -> Option<SE3> {
        let to_pose = self.poses.get(to)?;
        let from_pose = self.poses.get(from)?;
        Some(to_pose.inverse().compose(from_pose))
    }

    pub fn poses(&self) -> &[SE3] {
        &self.poses
    }

    pub fn reset(&mut self) {
        for p in &mut self.poses {
            *p = SE3::identity();
        }
    }

    pub fn write_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), CalibrationError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| CalibrationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc = ExtrinsicsYaml {
            cameras: self
                .poses
                .iter()
                .enumerate()
                .map(|(camera_id, pose)| CameraPoseYaml::from_pose(camera_id, pose))
                .collect(),
        };
        serde_yaml::to_writer(file, &doc)?;
        Ok(())
    }

    pub fn read_yaml<P: AsRef<Path>>(path: P) -> Result<Self, CalibrationError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CalibrationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc: ExtrinsicsYaml = serde_yaml::from_reader(file)?;

        let count = doc.cameras.iter().map(|c| c.camera_id + 1).max().unwrap_or(0);
        let mut rig = Self::new(count);
        for cam in &doc.cameras {
            rig.set_global_camera_pose(cam.camera_id, cam.to_pose());
        }
        Ok(rig)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ExtrinsicsYaml {
    cameras: Vec<CameraPoseYaml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CameraPoseYaml {
    camera_id: usize,
    /// [w, x, y, z]
    rotation: [f64; 4],
    translation: [f64; 3],
}

impl CameraPoseYaml {
    fn from_pose(camera_id: usize, pose: &SE3) -> Self {
        let q = pose.rotation.quaternion();
        Self {
            camera_id,
            rotation: [q.w, q.i, q.j, q.k],
            translation: [pose.translation.x, pose.translation.y, pose.translation.z],
        }
    }

    fn to_pose(&self) -> SE3 {
        let [w, x, y, z] = self.rotation;
        SE3::new(
            UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z)),
            Vector3::from(self.translation),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pose(yaw: f64, x: f64) -> SE3 {
        SE3::new(UnitQuaternion::from_euler_angles(0.0, 0.0, yaw), Vector3::new(x, 0.0, 0.0))
    }

    #[test]
    fn test_reference_camera_stays_identity() {
        let mut rig = CameraRigExtrinsics::new(3);
        rig.set_global_camera_pose(0, pose(0.3, 1.0));
        rig.set_global_camera_pose(2, pose(0.3, 1.0));

        assert_eq!(*rig.global_camera_pose(0).unwrap(), SE3::identity());
        assert_relative_eq!(rig.global_camera_pose(2).unwrap().translation.x, 1.0);

        rig.reset();
        assert_eq!(*rig.global_camera_pose(2).unwrap(), SE3::identity());
    }

    #[test]
    fn test_relative_pose() {
        let mut rig = CameraRigExtrinsics::new(3);
        rig.set_global_camera_pose(1, pose(0.0, 1.0));
        rig.set_global_camera_pose(2, pose(0.0, 3.0));

        let t_1_2 = rig.relative_pose(1, 2).unwrap();
        assert_relative_eq!(t_1_2.translation, Vector3::new(2.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut rig = CameraRigExtrinsics::new(2);
        rig.set_global_camera_pose(1, pose(0.4, -0.7));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extrinsics.yaml");
        rig.write_yaml(&path).unwrap();
        let back = CameraRigExtrinsics::read_yaml(&path).unwrap();

        assert_eq!(back.camera_count(), 2);
        let (ang, dist) = back.global_camera_pose(1).unwrap().distance(rig.global_camera_pose(1).unwrap());
        assert!(ang < 1e-9 && dist < 1e-12);
    }
}
