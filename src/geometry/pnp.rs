//! PnP (Perspective-n-Point) solving in normalized image coordinates.
//!
//! Observations are rays already lifted by the camera model and divided by
//! their depth, so every solver here works with an identity camera matrix and
//! thresholds are expressed on the normalized image plane.

use nalgebra::{DMatrix, Matrix3, Matrix6, SymmetricEigen, UnitQuaternion, Vector2, Vector3, Vector6};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::geometry::so3::skew;
use crate::geometry::SE3;

/// EPnP needs at least this many points for a one-dimensional null space.
pub const EPNP_MIN_POINTS: usize = 6;

/// Result of PnP solving.
#[derive(Debug, Clone)]
pub struct PnPResult {
    /// Estimated camera pose (T_cw, world to camera).
    pub pose: SE3,
    /// Indices of inlier correspondences.
    pub inliers: Vec<usize>,
    /// Normalized-plane reprojection error per correspondence.
    pub reproj_errors: Vec<f64>,
}

/// Parameters for [`solve_pnp_ransac`].
#[derive(Debug, Clone)]
pub struct PnPRansacParams {
    /// Maximum number of hypotheses.
    pub max_iterations: usize,
    /// Inlier threshold on the normalized image plane.
    pub threshold: f64,
    /// Desired probability of drawing at least one all-inlier sample.
    pub confidence: f64,
    /// Random-number generator seed.
    pub seed: u64,
}

impl Default for PnPRansacParams {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            threshold: 2.0 / 300.0,
            confidence: 0.99,
            seed: 0x5eed,
        }
    }
}

/// EPnP pose estimation from 3D world points and normalized 2D observations.
///
/// Returns `T_cw`. Fails on degenerate (e.g. coplanar) configurations.
pub fn solve_epnp(points3d: &[Vector3<f64>], normalized: &[Vector2<f64>]) -> Option<SE3> {
    let n = points3d.len();
    if n < EPNP_MIN_POINTS || normalized.len() != n {
        return None;
    }

    let mut centroid = Vector3::zeros();
    for p in points3d {
        centroid += p;
    }
    centroid /= n as f64;

    let mut cov = Matrix3::zeros();
    for p in points3d {
        let d = p - centroid;
        cov += d * d.transpose();
    }
    cov /= n as f64;

    let eig = SymmetricEigen::new(cov);
    let mut control_w = [centroid; 4];
    for i in 0..3 {
        let scale = eig.eigenvalues[i].abs().sqrt();
        control_w[i + 1] = centroid + eig.eigenvectors.column(i).into_owned() * scale;
    }

    let basis = Matrix3::from_columns(&[
        control_w[1] - control_w[0],
        control_w[2] - control_w[0],
        control_w[3] - control_w[0],
    ]);
    let basis_inv = basis.try_inverse()?;

    let alphas: Vec<[f64; 4]> = points3d
        .iter()
        .map(|p| {
            let c = basis_inv * (p - control_w[0]);
            [1.0 - c.x - c.y - c.z, c.x, c.y, c.z]
        })
        .collect();

    let mut m = DMatrix::<f64>::zeros(2 * n, 12);
    for (i, (a, uv)) in alphas.iter().zip(normalized.iter()).enumerate() {
        for (j, &alpha) in a.iter().enumerate() {
            let c = 3 * j;
            m[(2 * i, c)] = alpha;
            m[(2 * i, c + 2)] = -uv.x * alpha;
            m[(2 * i + 1, c + 1)] = alpha;
            m[(2 * i + 1, c + 2)] = -uv.y * alpha;
        }
    }

    // Null vector of M = eigenvector of MᵀM with the smallest eigenvalue.
    let mtm = m.transpose() * &m;
    let eig_m = SymmetricEigen::new(mtm);
    let mut min_idx = 0;
    for i in 1..eig_m.eigenvalues.len() {
        if eig_m.eigenvalues[i] < eig_m.eigenvalues[min_idx] {
            min_idx = i;
        }
    }
    let sol = eig_m.eigenvectors.column(min_idx);

    let mut control_c = [Vector3::zeros(); 4];
    for (j, cc) in control_c.iter_mut().enumerate() {
        *cc = Vector3::new(sol[3 * j], sol[3 * j + 1], sol[3 * j + 2]);
    }

    let mut sum_w = 0.0;
    let mut sum_c = 0.0;
    for i in 0..4 {
        for j in (i + 1)..4 {
            sum_w += (control_w[i] - control_w[j]).norm_squared();
            sum_c += (control_c[i] - control_c[j]).norm_squared();
        }
    }
    if sum_c <= f64::EPSILON {
        return None;
    }
    let scale = (sum_w / sum_c).sqrt();

    let mut camera_pts: Vec<Vector3<f64>> = alphas
        .iter()
        .map(|a| {
            let mut pc = Vector3::zeros();
            for (j, &alpha) in a.iter().enumerate() {
                pc += control_c[j] * alpha;
            }
            pc * scale
        })
        .collect();

    // The null vector is defined up to sign; points must lie in front.
    let mean_depth: f64 = camera_pts.iter().map(|p| p.z).sum::<f64>() / n as f64;
    if mean_depth < 0.0 {
        for p in &mut camera_pts {
            *p = -*p;
        }
    }

    pose_from_points(points3d, &camera_pts)
}

/// Kabsch alignment: the rigid transform mapping `world` onto `camera`.
fn pose_from_points(world: &[Vector3<f64>], camera: &[Vector3<f64>]) -> Option<SE3> {
    if world.len() != camera.len() || world.len() < 3 {
        return None;
    }

    let n = world.len() as f64;
    let c_w = world.iter().fold(Vector3::zeros(), |acc, p| acc + p) / n;
    let c_c = camera.iter().fold(Vector3::zeros(), |acc, p| acc + p) / n;

    let mut h = Matrix3::zeros();
    for (pw, pc) in world.iter().zip(camera.iter()) {
        h += (pc - c_c) * (pw - c_w).transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fix = u;
        u_fix.column_mut(2).neg_mut();
        r = u_fix * v_t;
    }

    let t = c_c - r * c_w;
    Some(SE3::from_rt(r, t))
}

/// Normalized-plane reprojection error, `None` when the point is behind the camera.
pub fn normalized_error(pose_cw: &SE3, point: &Vector3<f64>, observed: &Vector2<f64>) -> Option<f64> {
    let pc = pose_cw.transform_point(point);
    if pc.z <= 1e-9 {
        return None;
    }
    Some((Vector2::new(pc.x / pc.z, pc.y / pc.z) - observed).norm())
}

/// Gauss-Newton refinement of `T_cw` on the normalized image plane.
///
/// Uses a left perturbation `T ← exp(δ) ∘ T` with δ = (ω, v).
pub fn refine_pose(
    pose_cw: &SE3,
    points3d: &[Vector3<f64>],
    normalized: &[Vector2<f64>],
    iterations: usize,
) -> SE3 {
    let mut pose = *pose_cw;

    for _ in 0..iterations {
        let mut h = Matrix6::<f64>::zeros();
        let mut b = Vector6::<f64>::zeros();
        let mut cost = 0.0;

        for (p, uv) in points3d.iter().zip(normalized.iter()) {
            let pc = pose.transform_point(p);
            if pc.z <= 1e-9 {
                continue;
            }
            let invz = 1.0 / pc.z;
            let r = Vector2::new(pc.x * invz - uv.x, pc.y * invz - uv.y);
            cost += r.norm_squared();

            let j_proj = nalgebra::Matrix2x3::new(
                invz, 0.0, -pc.x * invz * invz,
                0.0, invz, -pc.y * invz * invz,
            );
            let mut j_pose = nalgebra::Matrix3x6::<f64>::zeros();
            j_pose.fixed_view_mut::<3, 3>(0, 0).copy_from(&(-skew(&pc)));
            j_pose.fixed_view_mut::<3, 3>(0, 3).copy_from(&Matrix3::identity());
            let j = j_proj * j_pose;

            h += j.transpose() * j;
            b += j.transpose() * r;
        }

        let delta = match h.cholesky() {
            Some(chol) => chol.solve(&(-b)),
            None => break,
        };

        let omega = Vector3::new(delta[0], delta[1], delta[2]);
        let v = Vector3::new(delta[3], delta[4], delta[5]);
        let d_rot = UnitQuaternion::from_scaled_axis(omega);
        let candidate = SE3::new(d_rot * pose.rotation, d_rot * pose.translation + v);

        let new_cost: f64 = points3d
            .iter()
            .zip(normalized.iter())
            .map(|(p, uv)| {
                let pc = candidate.transform_point(p);
                if pc.z <= 1e-9 {
                    return 0.0;
                }
                (Vector2::new(pc.x / pc.z, pc.y / pc.z) - uv).norm_squared()
            })
            .sum();

        if new_cost >= cost {
            break;
        }
        pose = candidate;
        if delta.norm() < 1e-12 {
            break;
        }
    }

    pose
}

/// Dynamic iteration bound from the current inlier ratio.
fn required_iterations(confidence: f64, inlier_ratio: f64, sample_size: usize, max_iters: usize) -> usize {
    if confidence <= 0.0 || inlier_ratio <= 0.0 {
        return max_iters;
    }
    let denom = (1.0 - inlier_ratio.powi(sample_size as i32)).max(1e-12).ln();
    if denom >= 0.0 {
        return max_iters;
    }
    let n = ((1.0 - confidence).ln() / denom).ceil();
    if n.is_finite() && n >= 0.0 {
        (n as usize).min(max_iters)
    } else {
        max_iters
    }
}

fn collect_inliers(
    pose: &SE3,
    points3d: &[Vector3<f64>],
    normalized: &[Vector2<f64>],
    threshold: f64,
) -> (Vec<usize>, Vec<f64>) {
    let errors: Vec<f64> = points3d
        .iter()
        .zip(normalized.iter())
        .map(|(p, uv)| normalized_error(pose, p, uv).unwrap_or(f64::INFINITY))
        .collect();
    let inliers = errors
        .iter()
        .enumerate()
        .filter(|(_, &e)| e < threshold)
        .map(|(i, _)| i)
        .collect();
    (inliers, errors)
}

/// Robust PnP with EPnP hypotheses inside RANSAC.
///
/// The best hypothesis (most inliers) is refit on its inlier set and
/// refined with Gauss-Newton before the final inlier classification.
pub fn solve_pnp_ransac(
    points3d: &[Vector3<f64>],
    normalized: &[Vector2<f64>],
    params: &PnPRansacParams,
) -> Option<PnPResult> {
    let n = points3d.len();
    if n < EPNP_MIN_POINTS || normalized.len() != n {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut best: Option<(SE3, Vec<usize>)> = None;
    let mut max_iters = params.max_iterations;
    let mut iter = 0;

    let mut sample_w = Vec::with_capacity(EPNP_MIN_POINTS);
    let mut sample_i = Vec::with_capacity(EPNP_MIN_POINTS);

    while iter < max_iters {
        iter += 1;

        sample_w.clear();
        sample_i.clear();
        for idx in rand::seq::index::sample(&mut rng, n, EPNP_MIN_POINTS) {
            sample_w.push(points3d[idx]);
            sample_i.push(normalized[idx]);
        }

        let Some(pose) = solve_epnp(&sample_w, &sample_i) else {
            continue;
        };

        let (inliers, _) = collect_inliers(&pose, points3d, normalized, params.threshold);
        let better = best
            .as_ref()
            .map_or(true, |(_, b)| inliers.len() > b.len());
        if better {
            let ratio = inliers.len() as f64 / n as f64;
            max_iters = required_iterations(params.confidence, ratio, EPNP_MIN_POINTS, params.max_iterations)
                .max(iter);
            best = Some((pose, inliers));
        }
    }

    let (mut pose, mut inliers) = best?;

    if inliers.len() >= EPNP_MIN_POINTS {
        let in_w: Vec<Vector3<f64>> = inliers.iter().map(|&i| points3d[i]).collect();
        let in_i: Vec<Vector2<f64>> = inliers.iter().map(|&i| normalized[i]).collect();
        let refit = solve_epnp(&in_w, &in_i).unwrap_or(pose);
        let refined = refine_pose(&refit, &in_w, &in_i, 10);

        let (refined_inliers, _) = collect_inliers(&refined, points3d, normalized, params.threshold);
        if refined_inliers.len() >= inliers.len() {
            pose = refined;
            inliers = refined_inliers;
        }
    }

    let (_, reproj_errors) = collect_inliers(&pose, points3d, normalized, params.threshold);
    Some(PnPResult {
        pose,
        inliers,
        reproj_errors,
    })
}
