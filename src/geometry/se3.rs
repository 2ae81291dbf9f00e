//! SE3: 6-DOF rigid body transformation (rotation + translation).
//!
//! Used for both per-frame camera poses (`T_cw`, world to camera) and for
//! camera-to-reference extrinsics (`T_cam_ref`).

use nalgebra::{Matrix3, Matrix4, Quaternion, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Rigid transformation acting on points as p' = R * p + t.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Construct from a rotation matrix and translation.
    ///
    /// The matrix is re-orthonormalized through the quaternion conversion.
    pub fn from_rt(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let rot3 = Rotation3::from_matrix_unchecked(rotation);
        Self {
            rotation: UnitQuaternion::from_rotation_matrix(&rot3),
            translation,
        }
    }

    /// Construct from quaternion components (w, x, y, z) and translation.
    pub fn from_quaternion(qw: f64, qx: f64, qy: f64, qz: f64, translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::from_quaternion(Quaternion::new(qw, qx, qy, qz)),
            translation,
        }
    }

    /// Construct from a homogeneous 4x4 matrix [R | t; 0 | 1].
    pub fn from_matrix(mat: Matrix4<f64>) -> Self {
        let r = mat.fixed_view::<3, 3>(0, 0).into_owned();
        let t = Vector3::new(mat[(0, 3)], mat[(1, 3)], mat[(2, 3)]);
        Self::from_rt(r, t)
    }

    pub fn to_matrix(&self) -> Matrix4<f64> {
        let mut mat = Matrix4::identity();
        mat.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(self.rotation.to_rotation_matrix().matrix());
        mat.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        mat
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// Inverse transform: [R^T | -R^T t].
    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        Self {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    /// Composition `self ∘ other`: applies `other` first.
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    /// Position of the frame origin expressed in the parent frame.
    ///
    /// For a world-to-camera pose `T_cw` this is the camera center in world
    /// coordinates.
    pub fn center(&self) -> Vector3<f64> {
        -(self.rotation.inverse() * self.translation)
    }

    /// Angular distance (radians) and translation distance to another pose.
    pub fn distance(&self, other: &SE3) -> (f64, f64) {
        (
            self.rotation.angle_to(&other.rotation),
            (self.translation - other.translation).norm(),
        )
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_pose() -> SE3 {
        SE3::new(
            UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3),
            Vector3::new(1.0, -2.0, 0.5),
        )
    }

    #[test]
    fn test_inverse_compose_is_identity() {
        let t = sample_pose();
        let id = t.compose(&t.inverse());

        assert_relative_eq!(id.translation, Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(id.rotation.angle(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_compose_matches_matrix_product() {
        let a = sample_pose();
        let b = SE3::new(
            UnitQuaternion::from_euler_angles(-0.4, 0.1, 0.05),
            Vector3::new(0.2, 0.3, -1.0),
        );

        let ab = a.compose(&b).to_matrix();
        assert_relative_eq!(ab, a.to_matrix() * b.to_matrix(), epsilon = 1e-12);
    }

    #[test]
    fn test_matrix_roundtrip() {
        let t = sample_pose();
        let back = SE3::from_matrix(t.to_matrix());

        assert_relative_eq!(back.translation, t.translation, epsilon = 1e-12);
        assert_relative_eq!(back.rotation.angle_to(&t.rotation), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_center_is_inverse_translation() {
        let t = sample_pose();
        assert_relative_eq!(t.center(), t.inverse().translation, epsilon = 1e-12);
        // The center maps to the origin of the child frame.
        assert_relative_eq!(t.transform_point(&t.center()), Vector3::zeros(), epsilon = 1e-12);
    }
}
