//! Nonlinear least-squares refinement of the camera rig.
//!
//! Implements Levenberg-Marquardt with Schur-complement solves for joint
//! extrinsics, odometry and scene point refinement.

pub mod rig_refine;

pub use rig_refine::{
    apply_rig_results, collect_rig_problem, refine_rig, solve_rig_problem, RigProblemData, RigRefineConfig,
    RigRefineResult,
};
