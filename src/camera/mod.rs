//! Camera projection models.
//!
//! The calibration core only needs a handful of capabilities from a camera:
//! lifting a pixel to a projective ray, projecting a camera-frame point and
//! measuring the pixel error of a scene point under a given pose.

mod pinhole;

pub use pinhole::{Distortion, PinholeCamera};

use std::sync::Arc;

use nalgebra::{Matrix2x3, UnitQuaternion, Vector2, Vector3};

/// Shared handle to a camera model.
pub type CameraPtr = Arc<dyn Camera>;

pub trait Camera: Send + Sync {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Lift an image point to a ray in the camera frame.
    ///
    /// The returned vector is not normalized; callers divide by `z` to get
    /// normalized image coordinates.
    fn lift_projective(&self, pixel: &Vector2<f64>) -> Vector3<f64>;

    /// Project a point in the camera frame to pixels. `None` behind the camera.
    fn project(&self, p_cam: &Vector3<f64>) -> Option<Vector2<f64>>;

    /// Jacobian of `project` with respect to the camera-frame point.
    ///
    /// The default uses central differences.
    fn project_jacobian(&self, p_cam: &Vector3<f64>) -> Option<Matrix2x3<f64>> {
        numeric_project_jacobian(self, p_cam)
    }

    /// Pixel distance between the observation and the projection of `point`
    /// under the world-to-camera transform `(rotation, translation)`.
    ///
    /// Points behind the camera yield `f64::INFINITY`.
    fn reprojection_error(
        &self,
        point: &Vector3<f64>,
        rotation: &UnitQuaternion<f64>,
        translation: &Vector3<f64>,
        observed: &Vector2<f64>,
    ) -> f64 {
        let p_cam = rotation * point + translation;
        match self.project(&p_cam) {
            Some(uv) => (uv - observed).norm(),
            None => f64::INFINITY,
        }
    }

    /// Normalized image coordinates of a pixel (ray divided by its depth).
    fn normalize(&self, pixel: &Vector2<f64>) -> Vector2<f64> {
        let ray = self.lift_projective(pixel);
        Vector2::new(ray.x / ray.z, ray.y / ray.z)
    }
}

/// Central-difference Jacobian of `camera.project` at `p_cam`.
pub(crate) fn numeric_project_jacobian<C: Camera + ?Sized>(
    camera: &C,
    p_cam: &Vector3<f64>,
) -> Option<Matrix2x3<f64>> {
    let h = 1e-6 * p_cam.norm().max(1.0);
    let mut jac = Matrix2x3::zeros();
    for i in 0..3 {
        let mut plus = *p_cam;
        let mut minus = *p_cam;
        plus[i] += h;
        minus[i] -= h;
        let col = (camera.project(&plus)? - camera.project(&minus)?) / (2.0 * h);
        jac.set_column(i, &col);
    }
    Some(jac)
}
