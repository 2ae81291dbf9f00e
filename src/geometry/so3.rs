//! SO(3) utilities: skew matrices, yaw/pitch/roll attitudes and rotation
//! averaging.
//!
//! Attitudes are stored as `(yaw, pitch, roll)` and compose as
//!
//! ```text
//! R = Rz(yaw) · Ry(pitch) · Rx(roll)
//! ```
//!
//! i.e. roll about the forward axis is applied first, then pitch, then yaw.

use nalgebra::{Matrix3, Matrix4, Quaternion, SymmetricEigen, UnitQuaternion, Vector3, Vector4};

/// Constructs the skew-symmetric matrix [v]× such that [v]× u = v × u.
///
/// ```text
/// [v]× = |  0   -v_z   v_y |
///        |  v_z   0   -v_x |
///        | -v_y  v_x    0  |
/// ```
#[inline]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y,
        v.z, 0.0, -v.x,
        -v.y, v.x, 0.0,
    )
}

pub fn rot_x(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(
        1.0, 0.0, 0.0,
        0.0, c, -s,
        0.0, s, c,
    )
}

pub fn rot_y(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(
        c, 0.0, s,
        0.0, 1.0, 0.0,
        -s, 0.0, c,
    )
}

pub fn rot_z(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(
        c, -s, 0.0,
        s, c, 0.0,
        0.0, 0.0, 1.0,
    )
}

/// Rotation matrix for an attitude stored as `(yaw, pitch, roll)`.
pub fn ypr_to_matrix(ypr: &Vector3<f64>) -> Matrix3<f64> {
    rot_z(ypr.x) * rot_y(ypr.y) * rot_x(ypr.z)
}

/// Decompose a rotation into `(yaw, pitch, roll)` such that
/// `ypr_to_matrix(matrix_to_ypr(R)) == R`.
pub fn matrix_to_ypr(r: &Matrix3<f64>) -> Vector3<f64> {
    let yaw = r[(1, 0)].atan2(r[(0, 0)]);
    let pitch = (-r[(2, 0)]).atan2((r[(0, 0)] * r[(0, 0)] + r[(1, 0)] * r[(1, 0)]).sqrt());
    let roll = r[(2, 1)].atan2(r[(2, 2)]);
    Vector3::new(yaw, pitch, roll)
}

/// Partial derivatives of `ypr_to_matrix` with respect to yaw, pitch and roll.
pub fn ypr_derivatives(ypr: &Vector3<f64>) -> [Matrix3<f64>; 3] {
    let rz = rot_z(ypr.x);
    let ry = rot_y(ypr.y);
    let rx = rot_x(ypr.z);
    [
        rz * skew(&Vector3::z()) * ry * rx,
        rz * ry * skew(&Vector3::y()) * rx,
        rz * ry * rx * skew(&Vector3::x()),
    ]
}

/// Average a set of rotations.
///
/// Computes the eigenvector of the largest eigenvalue of `Σ q qᵀ`. The outer
/// product is invariant to `q → -q`, so antipodal quaternions describing the
/// same rotation do not cancel out.
pub fn average_quaternions(quats: &[UnitQuaternion<f64>]) -> Option<UnitQuaternion<f64>> {
    if quats.is_empty() {
        return None;
    }
    if quats.len() == 1 {
        return Some(quats[0]);
    }

    let mut m = Matrix4::<f64>::zeros();
    for q in quats {
        let v: Vector4<f64> = q.as_ref().coords;
        m += v * v.transpose();
    }

    let eig = SymmetricEigen::new(m);
    let mut best = 0;
    for i in 1..4 {
        if eig.eigenvalues[i] > eig.eigenvalues[best] {
            best = i;
        }
    }
    let v = eig.eigenvectors.column(best).into_owned();
    if v.norm() < 1e-12 {
        return None;
    }
    // Quaternion coords are stored (i, j, k, w).
    Some(UnitQuaternion::from_quaternion(Quaternion::new(v[3], v[0], v[1], v[2])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_skew_cross_product() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        let u = Vector3::new(4.0, 5.0, 6.0);

        assert_relative_eq!(v.cross(&u), skew(&v) * u, epsilon = 1e-12);
    }

    #[test]
    fn test_ypr_matches_nalgebra_euler() {
        let (yaw, pitch, roll) = (0.7, -0.3, 0.2);
        let r = ypr_to_matrix(&Vector3::new(yaw, pitch, roll));
        let reference = UnitQuaternion::from_euler_angles(roll, pitch, yaw)
            .to_rotation_matrix()
            .into_inner();

        assert_relative_eq!(r, reference, epsilon = 1e-12);
    }

    #[test]
    fn test_ypr_roundtrip() {
        let ypr = Vector3::new(-2.5, 0.4, 1.1);
        let back = matrix_to_ypr(&ypr_to_matrix(&ypr));

        assert_relative_eq!(back, ypr, epsilon = 1e-10);
    }

    #[test]
    fn test_ypr_derivatives_numeric() {
        let ypr = Vector3::new(0.3, -0.2, 0.9);
        let analytic = ypr_derivatives(&ypr);
        let h = 1e-6;

        for i in 0..3 {
            let mut plus = ypr;
            let mut minus = ypr;
            plus[i] += h;
            minus[i] -= h;
            let numeric = (ypr_to_matrix(&plus) - ypr_to_matrix(&minus)) / (2.0 * h);
            assert_relative_eq!(analytic[i], numeric, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_average_handles_antipodal_sign() {
        let q = UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3);
        let flipped = UnitQuaternion::new_unchecked(-q.into_inner());

        let avg = average_quaternions(&[q, flipped, q]).unwrap();
        assert_relative_eq!(avg.angle_to(&q), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_average_is_between_inputs() {
        let a = UnitQuaternion::from_euler_angles(0.0, 0.0, 0.2);
        let b = UnitQuaternion::from_euler_angles(0.0, 0.0, 0.4);

        let avg = average_quaternions(&[a, b]).unwrap();
        let ypr = matrix_to_ypr(&avg.to_rotation_matrix().into_inner());
        assert_relative_eq!(ypr.x, 0.3, epsilon = 1e-9);
    }

    #[test]
    fn test_average_decompose_recompose() {
        let target = UnitQuaternion::from_euler_angles(0.25, -0.15, 1.3);
        let noisy = [
            target * UnitQuaternion::from_euler_angles(0.01, 0.0, 0.0),
            target * UnitQuaternion::from_euler_angles(-0.01, 0.0, 0.0),
            target,
        ];

        let avg = average_quaternions(&noisy).unwrap();
        let ypr = matrix_to_ypr(&avg.to_rotation_matrix().into_inner());
        let recomposed = ypr_to_matrix(&ypr);

        assert_relative_eq!(
            recomposed,
            target.to_rotation_matrix().into_inner(),
            epsilon = 1e-4
        );
    }

    #[test]
    fn test_average_empty() {
        assert!(average_quaternions(&[]).is_none());
    }
}
