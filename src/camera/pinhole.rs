use nalgebra::{Matrix2x3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use super::{numeric_project_jacobian, Camera};

/// Radial-tangential (plumb bob) distortion coefficients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
}

impl Distortion {
    pub fn is_zero(&self) -> bool {
        self.k1 == 0.0 && self.k2 == 0.0 && self.p1 == 0.0 && self.p2 == 0.0
    }

    /// Distort a point on the normalized image plane.
    fn apply(&self, m: &Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (m.x, m.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2;
        Vector2::new(
            x * radial + 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x),
            y * radial + self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y,
        )
    }

    /// Invert `apply` by fixed-point iteration.
    fn remove(&self, distorted: &Vector2<f64>) -> Vector2<f64> {
        let mut m = *distorted;
        for _ in 0..20 {
            let err = self.apply(&m) - distorted;
            if err.norm() < 1e-12 {
                break;
            }
            m -= err;
        }
        m
    }
}

/// Pinhole camera with optional radial-tangential distortion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinholeCamera {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub distortion: Distortion,
}

impl PinholeCamera {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64, width: u32, height: u32) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
            distortion: Distortion::default(),
        }
    }

    pub fn with_distortion(mut self, distortion: Distortion) -> Self {
        self.distortion = distortion;
        self
    }
}

impl Camera for PinholeCamera {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn lift_projective(&self, pixel: &Vector2<f64>) -> Vector3<f64> {
        let distorted = Vector2::new((pixel.x - self.cx) / self.fx, (pixel.y - self.cy) / self.fy);
        let m = if self.distortion.is_zero() {
            distorted
        } else {
            self.distortion.remove(&distorted)
        };
        Vector3::new(m.x, m.y, 1.0)
    }

    fn project(&self, p_cam: &Vector3<f64>) -> Option<Vector2<f64>> {
        if p_cam.z <= 1e-9 {
            return None;
        }
        let m = Vector2::new(p_cam.x / p_cam.z, p_cam.y / p_cam.z);
        let d = self.distortion.apply(&m);
        Some(Vector2::new(self.fx * d.x + self.cx, self.fy * d.y + self.cy))
    }

    fn project_jacobian(&self, p_cam: &Vector3<f64>) -> Option<Matrix2x3<f64>> {
        if p_cam.z <= 1e-9 {
            return None;
        }
        if !self.distortion.is_zero() {
            return numeric_project_jacobian(self, p_cam);
        }

        let invz = 1.0 / p_cam.z;
        let invz2 = invz * invz;
        Some(Matrix2x3::new(
            self.fx * invz, 0.0, -self.fx * p_cam.x * invz2,
            0.0, self.fy * invz, -self.fy * p_cam.y * invz2,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;

    fn camera() -> PinholeCamera {
        PinholeCamera::new(450.0, 455.0, 320.0, 240.0, 640, 480)
    }

    #[test]
    fn test_project_lift_roundtrip() {
        let cam = camera();
        let p = Vector3::new(0.3, -0.2, 2.0);
        let uv = cam.project(&p).unwrap();
        let ray = cam.lift_projective(&uv);

        assert_relative_eq!(ray / ray.z * p.z, p, epsilon = 1e-9);
    }

    #[test]
    fn test_distorted_roundtrip() {
        let cam = camera().with_distortion(Distortion {
            k1: -0.28,
            k2: 0.07,
            p1: 1e-4,
            p2: -2e-4,
        });
        let p = Vector3::new(-0.4, 0.25, 1.5);
        let uv = cam.project(&p).unwrap();
        let m = cam.normalize(&uv);

        assert_relative_eq!(m, Vector2::new(p.x / p.z, p.y / p.z), epsilon = 1e-8);
    }

    #[test]
    fn test_behind_camera() {
        let cam = camera();
        assert!(cam.project(&Vector3::new(0.0, 0.0, -1.0)).is_none());

        let err = cam.reprojection_error(
            &Vector3::new(0.0, 0.0, -1.0),
            &UnitQuaternion::identity(),
            &Vector3::zeros(),
            &Vector2::new(320.0, 240.0),
        );
        assert!(err.is_infinite());
    }

    #[test]
    fn test_analytic_jacobian_matches_numeric() {
        let cam = camera();
        let p = Vector3::new(0.4, -0.3, 2.5);
        let analytic = cam.project_jacobian(&p).unwrap();

        let h = 1e-6;
        for i in 0..3 {
            let mut plus = p;
            let mut minus = p;
            plus[i] += h;
            minus[i] -= h;
            let col = (cam.project(&plus).unwrap() - cam.project(&minus).unwrap()) / (2.0 * h);
            assert_relative_eq!(analytic.column(i).into_owned(), col, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_reprojection_error_of_exact_observation_is_zero() {
        let cam = camera();
        let q = UnitQuaternion::from_euler_angles(0.1, 0.2, -0.1);
        let t = Vector3::new(0.1, 0.0, 0.5);
        let point = Vector3::new(0.2, 0.1, 3.0);
        let observed = cam.project(&(q * point + t)).unwrap();

        assert_relative_eq!(cam.reprojection_error(&point, &q, &t, &observed), 0.0, epsilon = 1e-9);
    }
}
