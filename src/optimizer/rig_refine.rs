//! Joint refinement of rig extrinsics, frame-set odometry and scene points.
//!
//! Minimizes the Cauchy-robustified reprojection error
//!
//! ```text
//! E = ½ Σ ρ(||π(T_cam_ref⁻¹ · T_world_ref⁻¹ · X) - u||²)
//! ```
//!
//! over the extrinsics of cameras 1..n (camera 0 is the reference and is not
//! a variable), the position and (yaw, pitch, roll) of every frame set, and
//! optionally every observed scene point.
//!
//! Uses the three-phase pattern:
//! 1. COLLECT: snapshot variables and observations
//! 2. SOLVE: Levenberg-Marquardt on the sparse normal equations
//! 3. APPLY: write the result back
//!
//! Extrinsic rotations live on the quaternion manifold and are updated by
//! right multiplication with `exp(δθ)`. The normal equations are solved with
//! Schur complements: scene points are eliminated first, then frame sets when
//! they are not coupled to each other, leaving a small dense camera system.

use std::collections::HashMap;

use nalgebra::{
    DMatrix, DVector, Matrix2x3, Matrix2x6, Matrix3, Matrix6, Matrix6x3, UnitQuaternion, Vector2, Vector3,
    Vector6,
};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::calibration::{CameraRigExtrinsics, FrameSet, Odometry, ScenePointStore};
use crate::camera::CameraPtr;
use crate::geometry::so3::{skew, ypr_derivatives, ypr_to_matrix};
use crate::geometry::SE3;
use crate::map::PointId;

/// Residual assigned to observations that fall behind the camera (pixels).
const BEHIND_CAMERA_RESIDUAL: f64 = 1e3;

/// Configuration for rig refinement.
#[derive(Debug, Clone)]
pub struct RigRefineConfig {
    /// Maximum number of LM iterations.
    pub max_iterations: usize,
    /// Worker threads used to linearize residuals.
    pub num_threads: usize,
    /// Cauchy loss scale (pixels).
    pub cauchy_scale: f64,
    /// Stop when the relative cost decrease drops below this.
    pub function_tolerance: f64,
    /// Stop when the largest gradient entry drops below this.
    pub gradient_tolerance: f64,
    /// Stop when the step is this small relative to the state.
    pub param_tolerance: f64,
    /// Also refine scene point positions.
    pub optimize_points: bool,
}

impl Default for RigRefineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            num_threads: 8,
            cauchy_scale: 1.0,
            function_tolerance: 1e-6,
            gradient_tolerance: 1e-10,
            param_tolerance: 1e-8,
            optimize_points: false,
        }
    }
}

/// A single pixel observation.
#[derive(Debug, Clone)]
pub struct RigObservation {
    pub camera: usize,
    pub frame_set: usize,
    /// Index into `RigProblemData::points`.
    pub point: usize,
    pub observed: Vector2<f64>,
}

/// Snapshot of everything the solver needs.
#[derive(Clone)]
pub struct RigProblemData {
    pub cameras: Vec<CameraPtr>,
    /// One per camera, `[0]` is held fixed.
    pub extrinsics: Vec<SE3>,
    pub odometry: Vec<Odometry>,
    pub points: Vec<Vector3<f64>>,
    /// Store id of each entry of `points`.
    pub point_ids: Vec<PointId>,
    pub observations: Vec<RigObservation>,
}

/// Outcome of [`solve_rig_problem`].
#[derive(Debug, Clone)]
pub struct RigRefineResult {
    pub extrinsics: Vec<SE3>,
    pub odometry: Vec<Odometry>,
    pub points: Vec<Vector3<f64>>,
    pub iterations: usize,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub num_residuals: usize,
    pub converged: bool,
}

/// PHASE 1: collect variables and observations.
pub fn collect_rig_problem(
    frame_sets: &[FrameSet],
    cameras: &[CameraPtr],
    extrinsics: &CameraRigExtrinsics,
    store: &ScenePointStore,
) -> RigProblemData {
    let mut point_index: HashMap<PointId, usize> = HashMap::new();
    let mut points = Vec::new();
    let mut point_ids = Vec::new();
    let mut observations = Vec::new();

    for (s, set) in frame_sets.iter().enumerate() {
        for frame in &set.frames {
            if frame.camera_id >= cameras.len() {
                continue;
            }
            for feature in &frame.features {
                let Some(pid) = feature.point else { continue };
                let Some(position) = store.position(pid) else { continue };
                let point = *point_index.entry(pid).or_insert_with(|| {
                    points.push(position);
                    point_ids.push(pid);
                    points.len() - 1
                });
                observations.push(RigObservation {
                    camera: frame.camera_id,
                    frame_set: s,
                    point,
                    observed: feature.keypoint,
                });
            }
        }
    }

    RigProblemData {
        cameras: cameras.to_vec(),
        extrinsics: extrinsics.poses().to_vec(),
        odometry: frame_sets.iter().map(|s| s.odometry).collect(),
        points,
        point_ids,
        observations,
    }
}

/// PHASE 3: write refined values back.
pub fn apply_rig_results(
    problem: &RigProblemData,
    result: &RigRefineResult,
    frame_sets: &mut [FrameSet],
    extrinsics: &mut CameraRigExtrinsics,
    store: &mut ScenePointStore,
) {
    for (camera, pose) in result.extrinsics.iter().enumerate().skip(1) {
        extrinsics.set_global_camera_pose(camera, *pose);
    }
    for (set, odo) in frame_sets.iter_mut().zip(&result.odometry) {
        set.odometry = *odo;
    }
    for (pid, position) in problem.point_ids.iter().zip(&result.points) {
        store.set_position(*pid, *position);
    }
}

#[derive(Clone)]
struct RigState {
    extrinsics: Vec<SE3>,
    odometry: Vec<Odometry>,
    points: Vec<Vector3<f64>>,
}

/// Unweighted residual and Jacobians of one observation.
struct ObservationJacobians {
    residual: Vector2<f64>,
    /// d r / d (δθ, δt) of the camera extrinsic.
    camera: Matrix2x6<f64>,
    /// d r / d (position, yaw-pitch-roll) of the frame set.
    odometry: Matrix2x6<f64>,
    /// d r / d X.
    point: Matrix2x3<f64>,
}

/// Robustly weighted linearization of one observation.
struct Linearized {
    camera_block: Option<usize>,
    odometry_block: usize,
    point: Option<usize>,
    residual: Vector2<f64>,
    j_camera: Matrix2x6<f64>,
    j_odometry: Matrix2x6<f64>,
    j_point: Matrix2x3<f64>,
}

fn cauchy_cost(squared: f64, scale: f64) -> f64 {
    let a2 = scale * scale;
    0.5 * a2 * (1.0 + squared / a2).ln()
}

fn cauchy_weight(squared: f64, scale: f64) -> f64 {
    let a2 = scale * scale;
    1.0 / (1.0 + squared / a2)
}

fn hstack(left: &Matrix2x3<f64>, right: &Matrix2x3<f64>) -> Matrix2x6<f64> {
    let mut j = Matrix2x6::zeros();
    j.fixed_view_mut::<2, 3>(0, 0).copy_from(left);
    j.fixed_view_mut::<2, 3>(0, 3).copy_from(right);
    j
}

fn observation_residual(problem: &RigProblemData, state: &RigState, obs: &RigObservation) -> Option<Vector2<f64>> {
    let extrinsic = state.extrinsics.get(obs.camera)?;
    let odometry = state.odometry.get(obs.frame_set)?;
    let t_cw = extrinsic.inverse().compose(&odometry.pose().inverse());
    let p_cam = t_cw.transform_point(state.points.get(obs.point)?);
    let uv = problem.cameras.get(obs.camera)?.project(&p_cam)?;
    Some(uv - obs.observed)
}

fn observation_jacobians(
    problem: &RigProblemData,
    state: &RigState,
    obs: &RigObservation,
) -> Option<ObservationJacobians> {
    let camera = problem.cameras.get(obs.camera)?;
    let extrinsic = state.extrinsics.get(obs.camera)?;
    let odometry = state.odometry.get(obs.frame_set)?;
    let point = state.points.get(obs.point)?;

    let r_s = ypr_to_matrix(&odometry.attitude);
    let r_c = extrinsic.rotation_matrix();
    let d = point - odometry.position;
    let p_ref = r_s.transpose() * d;
    let p_cam = r_c.transpose() * (p_ref - extrinsic.translation);

    let uv = camera.project(&p_cam)?;
    let jp = camera.project_jacobian(&p_cam)?;

    let r_cs = r_c.transpose() * r_s.transpose();
    let derivs = ypr_derivatives(&odometry.attitude);
    let mut j_ypr = Matrix2x3::zeros();
    for (i, dr) in derivs.iter().enumerate() {
        let col = jp * (r_c.transpose() * dr.transpose() * d);
        j_ypr.set_column(i, &col);
    }

    Some(ObservationJacobians {
        residual: uv - obs.observed,
        camera: hstack(&(jp * skew(&p_cam)), &(jp * (-r_c.transpose()))),
        odometry: hstack(&(jp * (-r_cs)), &j_ypr),
        point: jp * r_cs,
    })
}

fn total_cost(problem: &RigProblemData, state: &RigState, scale: f64) -> f64 {
    problem
        .observations
        .par_iter()
        .map(|obs| {
            let squared = observation_residual(problem, state, obs)
                .map_or(BEHIND_CAMERA_RESIDUAL * BEHIND_CAMERA_RESIDUAL, |r| r.norm_squared());
            cauchy_cost(squared, scale)
        })
        .sum()
}

fn linearize(problem: &RigProblemData, state: &RigState, config: &RigRefineConfig) -> Vec<Linearized> {
    let camera_blocks = problem.extrinsics.len().saturating_sub(1);
    problem
        .observations
        .par_iter()
        .filter_map(|obs| {
            let jac = observation_jacobians(problem, state, obs)?;
            let sw = cauchy_weight(jac.residual.norm_squared(), config.cauchy_scale).sqrt();
            Some(Linearized {
                camera_block: (obs.camera > 0).then(|| obs.camera - 1),
                odometry_block: camera_blocks + obs.frame_set,
                point: config.optimize_points.then_some(obs.point),
                residual: jac.residual * sw,
                j_camera: jac.camera * sw,
                j_odometry: jac.odometry * sw,
                j_point: jac.point * sw,
            })
        })
        .collect()
}

/// Block-sparse normal equations `H δ = -g`.
///
/// Pose blocks (cameras 1..n, then frame sets) are 6-dimensional, point
/// blocks 3-dimensional. Off-diagonal pose blocks are stored once with the
/// smaller block index first.
struct NormalEquations {
    camera_blocks: usize,
    pose_diag: Vec<Matrix6<f64>>,
    pose_off: HashMap<(usize, usize), Matrix6<f64>>,
    pose_g: Vec<Vector6<f64>>,
    point_diag: Vec<Matrix3<f64>>,
    point_g: Vec<Vector3<f64>>,
    point_coupling: Vec<HashMap<usize, Matrix6x3<f64>>>,
}

struct Step {
    pose: Vec<Vector6<f64>>,
    points: Vec<Vector3<f64>>,
}

fn damp6(m: &Matrix6<f64>, lambda: f64) -> Matrix6<f64> {
    let mut out = *m;
    for i in 0..6 {
        out[(i, i)] += lambda * m[(i, i)].max(1e-6);
    }
    out
}

fn damp3(m: &Matrix3<f64>, lambda: f64) -> Matrix3<f64> {
    let mut out = *m;
    for i in 0..3 {
        out[(i, i)] += lambda * m[(i, i)].max(1e-6);
    }
    out
}

impl NormalEquations {
    fn build(linearized: &[Linearized], camera_blocks: usize, pose_blocks: usize, point_count: usize) -> Self {
        let mut eq = NormalEquations {
            camera_blocks,
            pose_diag: vec![Matrix6::zeros(); pose_blocks],
            pose_off: HashMap::new(),
            pose_g: vec![Vector6::zeros(); pose_blocks],
            point_diag: vec![Matrix3::zeros(); point_count],
            point_g: vec![Vector3::zeros(); point_count],
            point_coupling: vec![HashMap::new(); point_count],
        };

        for lin in linearized {
            let mut blocks: Vec<(usize, &Matrix2x6<f64>)> = Vec::with_capacity(2);
            if let Some(c) = lin.camera_block {
                blocks.push((c, &lin.j_camera));
            }
            blocks.push((lin.odometry_block, &lin.j_odometry));

            for (i, &(a, ja)) in blocks.iter().enumerate() {
                eq.pose_diag[a] += ja.transpose() * ja;
                eq.pose_g[a] += ja.transpose() * lin.residual;
                for &(b, jb) in &blocks[i + 1..] {
                    *eq.pose_off.entry((a, b)).or_insert_with(Matrix6::zeros) += ja.transpose() * jb;
                }
            }

            if let Some(k) = lin.point {
                let jp = &lin.j_point;
                eq.point_diag[k] += jp.transpose() * jp;
                eq.point_g[k] += jp.transpose() * lin.residual;
                for &(a, ja) in &blocks {
                    *eq.point_coupling[k].entry(a).or_insert_with(Matrix6x3::zeros) += ja.transpose() * jp;
                }
            }
        }
        eq
    }

    fn max_gradient(&self) -> f64 {
        let pose = self.pose_g.iter().map(|g| g.amax()).fold(0.0, f64::max);
        let point = self.point_g.iter().map(|g| g.amax()).fold(0.0, f64::max);
        pose.max(point)
    }

    /// Solve the damped system with Schur complements.
    fn solve(&self, lambda: f64) -> Option<Step> {
        let pose_blocks = self.pose_diag.len();
        let mut diag: Vec<Matrix6<f64>> = self.pose_diag.iter().map(|m| damp6(m, lambda)).collect();
        let mut off = self.pose_off.clone();
        let mut rhs: Vec<Vector6<f64>> = self.pose_g.iter().map(|g| -g).collect();

        // Eliminate points.
        let mut point_inv: Vec<Option<Matrix3<f64>>> = Vec::with_capacity(self.point_diag.len());
        for (k, h) in self.point_diag.iter().enumerate() {
            if self.point_coupling[k].is_empty() {
                point_inv.push(None);
                continue;
            }
            let Some(w) = damp3(h, lambda).cholesky().map(|c| c.inverse()) else {
                point_inv.push(None);
                continue;
            };
            let b_p = -self.point_g[k];
            let coupling: Vec<(usize, Matrix6x3<f64>)> = self.point_coupling[k].iter().map(|(a, m)| (*a, *m)).collect();
            for (i, (a, ha)) in coupling.iter().enumerate() {
                let haw = ha * w;
                rhs[*a] -= haw * b_p;
                for (b, hb) in &coupling[i..] {
                    let block = haw * hb.transpose();
                    if a == b {
                        diag[*a] -= block;
                    } else if a < b {
                        *off.entry((*a, *b)).or_insert_with(Matrix6::zeros) -= block;
                    } else {
                        *off.entry((*b, *a)).or_insert_with(Matrix6::zeros) -= block.transpose();
                    }
                }
            }
            point_inv.push(Some(w));
        }

        let n_cam = self.camera_blocks;
        let frame_sets_coupled = off.keys().any(|&(i, j)| i >= n_cam && j >= n_cam);
        let pose = if frame_sets_coupled {
            solve_dense(&diag, &off, &rhs)?
        } else {
            solve_camera_schur(n_cam, &diag, &off, &rhs)?
        };
        debug_assert_eq!(pose.len(), pose_blocks);

        // Back-substitute points.
        let points = point_inv
            .iter()
            .enumerate()
            .map(|(k, w)| match w {
                Some(w) => {
                    let mut b = -self.point_g[k];
                    for (a, ha) in &self.point_coupling[k] {
                        b -= ha.transpose() * pose[*a];
                    }
                    w * b
                }
                None => Vector3::zeros(),
            })
            .collect();

        Some(Step { pose, points })
    }
}

/// Dense Cholesky over all pose blocks.
fn solve_dense(
    diag: &[Matrix6<f64>],
    off: &HashMap<(usize, usize), Matrix6<f64>>,
    rhs: &[Vector6<f64>],
) -> Option<Vec<Vector6<f64>>> {
    let n = diag.len();
    let mut h = DMatrix::<f64>::zeros(6 * n, 6 * n);
    let mut b = DVector::<f64>::zeros(6 * n);
    for (i, block) in diag.iter().enumerate() {
        h.fixed_view_mut::<6, 6>(6 * i, 6 * i).copy_from(block);
        b.fixed_rows_mut::<6>(6 * i).copy_from(&rhs[i]);
    }
    for (&(i, j), block) in off {
        let mut upper = h.fixed_view_mut::<6, 6>(6 * i, 6 * j);
        upper += block;
        let mut lower = h.fixed_view_mut::<6, 6>(6 * j, 6 * i);
        lower += block.transpose();
    }
    let x = h.cholesky()?.solve(&b);
    Some((0..n).map(|i| x.fixed_rows::<6>(6 * i).into_owned()).collect())
}

/// Eliminate the (mutually independent) frame-set blocks, solve the dense
/// camera system, then back-substitute.
fn solve_camera_schur(
    n_cam: usize,
    diag: &[Matrix6<f64>],
    off: &HashMap<(usize, usize), Matrix6<f64>>,
    rhs: &[Vector6<f64>],
) -> Option<Vec<Vector6<f64>>> {
    let n = diag.len();
    let mut s = DMatrix::<f64>::zeros(6 * n_cam, 6 * n_cam);
    let mut b = DVector::<f64>::zeros(6 * n_cam);
    for c in 0..n_cam {
        s.fixed_view_mut::<6, 6>(6 * c, 6 * c).copy_from(&diag[c]);
        b.fixed_rows_mut::<6>(6 * c).copy_from(&rhs[c]);
    }
    for (&(i, j), block) in off.iter().filter(|((i, j), _)| *i < n_cam && *j < n_cam) {
        let mut upper = s.fixed_view_mut::<6, 6>(6 * i, 6 * j);
        upper += block;
        let mut lower = s.fixed_view_mut::<6, 6>(6 * j, 6 * i);
        lower += block.transpose();
    }

    // couplings[f] = [(camera block, H_cf)] for frame-set block n_cam + f.
    let mut couplings: Vec<Vec<(usize, Matrix6<f64>)>> = vec![Vec::new(); n - n_cam];
    for (&(i, j), block) in off.iter().filter(|((i, j), _)| *i < n_cam && *j >= n_cam) {
        couplings[j - n_cam].push((i, *block));
    }

    let mut inverses = Vec::with_capacity(n - n_cam);
    for (f, coupling) in couplings.iter().enumerate() {
        let w = diag[n_cam + f].cholesky()?.inverse();
        for (c1, h1) in coupling {
            let h1w = h1 * w;
            let mut rows = b.fixed_rows_mut::<6>(6 * c1);
            rows -= h1w * rhs[n_cam + f];
            for (c2, h2) in coupling {
                let mut view = s.fixed_view_mut::<6, 6>(6 * c1, 6 * c2);
                view -= h1w * h2.transpose();
            }
        }
        inverses.push(w);
    }

    let dc = if n_cam > 0 { s.cholesky()?.solve(&b) } else { DVector::zeros(0) };

    let mut pose: Vec<Vector6<f64>> = (0..n_cam).map(|c| dc.fixed_rows::<6>(6 * c).into_owned()).collect();
    for (f, coupling) in couplings.iter().enumerate() {
        let mut r = rhs[n_cam + f];
        for (c, h) in coupling {
            r -= h.transpose() * pose[*c];
        }
        pose.push(inverses[f] * r);
    }
    Some(pose)
}

impl RigState {
    fn retract(&self, step: &Step, camera_blocks: usize) -> Self {
        let mut next = self.clone();
        for c in 0..camera_blocks {
            let d = &step.pose[c];
            let e = &mut next.extrinsics[c + 1];
            e.rotation *= UnitQuaternion::from_scaled_axis(Vector3::new(d[0], d[1], d[2]));
            e.translation += Vector3::new(d[3], d[4], d[5]);
        }
        for (f, odo) in next.odometry.iter_mut().enumerate() {
            let d = &step.pose[camera_blocks + f];
            odo.position += Vector3::new(d[0], d[1], d[2]);
            odo.attitude += Vector3::new(d[3], d[4], d[5]);
        }
        for (p, d) in next.points.iter_mut().zip(&step.points) {
            *p += d;
        }
        next
    }

    fn norm(&self) -> f64 {
        let e: f64 = self.extrinsics.iter().map(|e| e.translation.norm_squared() + 1.0).sum();
        let o: f64 = self
            .odometry
            .iter()
            .map(|o| o.position.norm_squared() + o.attitude.norm_squared())
            .sum();
        let p: f64 = self.points.iter().map(|p| p.norm_squared()).sum();
        (e + o + p).sqrt()
    }
}

fn step_norm(step: &Step) -> f64 {
    let pose: f64 = step.pose.iter().map(|d| d.norm_squared()).sum();
    let points: f64 = step.points.iter().map(|d| d.norm_squared()).sum();
    (pose + points).sqrt()
}

/// PHASE 2: Levenberg-Marquardt.
///
/// A step is only accepted if it lowers the robust cost.
pub fn solve_rig_problem(problem: &RigProblemData, config: &RigRefineConfig) -> Option<RigRefineResult> {
    if problem.observations.is_empty() || problem.odometry.is_empty() {
        return None;
    }

    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(config.num_threads.max(1))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!("Falling back to the global thread pool: {}", e);
            None
        }
    };
    let run = || run_levenberg_marquardt(problem, config);
    Some(match &pool {
        Some(pool) => pool.install(run),
        None => run(),
    })
}

fn run_levenberg_marquardt(problem: &RigProblemData, config: &RigRefineConfig) -> RigRefineResult {
    let camera_blocks = problem.extrinsics.len().saturating_sub(1);
    let pose_blocks = camera_blocks + problem.odometry.len();
    let point_count = if config.optimize_points { problem.points.len() } else { 0 };

    let mut state = RigState {
        extrinsics: problem.extrinsics.clone(),
        odometry: problem.odometry.clone(),
        points: problem.points.clone(),
    };

    let mut cost = total_cost(problem, &state, config.cauchy_scale);
    let initial_cost = cost;
    let mut equations = NormalEquations::build(
        &linearize(problem, &state, config),
        camera_blocks,
        pose_blocks,
        point_count,
    );

    let mut lambda = 1e-3;
    let lambda_up = 10.0;
    let lambda_down = 0.1;
    let min_lambda = 1e-10;
    let max_lambda = 1e10;
    let mut iterations = 0;
    let mut converged = false;

    for iter in 0..config.max_iterations {
        iterations = iter + 1;

        if equations.max_gradient() < config.gradient_tolerance {
            converged = true;
            break;
        }

        let Some(step) = equations.solve(lambda) else {
            if lambda >= max_lambda {
                break;
            }
            lambda = (lambda * lambda_up).min(max_lambda);
            continue;
        };

        if step_norm(&step) < config.param_tolerance * (state.norm() + config.param_tolerance) {
            converged = true;
            break;
        }

        let trial = state.retract(&step, camera_blocks);
        let trial_cost = total_cost(problem, &trial, config.cauchy_scale);

        if trial_cost < cost {
            let relative = (cost - trial_cost) / cost.max(f64::MIN_POSITIVE);
            state = trial;
            cost = trial_cost;
            lambda = (lambda * lambda_down).max(min_lambda);
            if relative < config.function_tolerance {
                converged = true;
                break;
            }
            equations = NormalEquations::build(
                &linearize(problem, &state, config),
                camera_blocks,
                pose_blocks,
                point_count,
            );
        } else {
            if lambda >= max_lambda {
                break;
            }
            lambda = (lambda * lambda_up).min(max_lambda);
        }
    }

    debug!(
        "Rig refinement: {} iterations, cost {:.6} -> {:.6}",
        iterations, initial_cost, cost
    );

    RigRefineResult {
        extrinsics: state.extrinsics,
        odometry: state.odometry,
        points: state.points,
        iterations,
        initial_cost,
        final_cost: cost,
        num_residuals: problem.observations.len(),
        converged,
    }
}

/// Collect, solve and apply in one call.
pub fn refine_rig(
    frame_sets: &mut [FrameSet],
    cameras: &[CameraPtr],
    extrinsics: &mut CameraRigExtrinsics,
    store: &mut ScenePointStore,
    config: &RigRefineConfig,
) -> Option<RigRefineResult> {
    let problem = collect_rig_problem(frame_sets, cameras, extrinsics, store);
    info!(
        "Refining rig: {} cameras, {} frame sets, {} points, {} observations{}",
        problem.extrinsics.len(),
        problem.odometry.len(),
        problem.points.len(),
        problem.observations.len(),
        if config.optimize_points { " (points free)" } else { "" }
    );

    let result = solve_rig_problem(&problem, config)?;
    apply_rig_results(&problem, &result, frame_sets, extrinsics, store);
    Some(result)
}
