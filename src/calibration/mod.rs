//! Multi-camera rig calibration against an infrastructure reference map.

pub mod calibrator;
pub mod config;
pub mod error;
pub mod extrinsics;
pub mod frame_set;
pub mod initializer;
pub mod keyframe_decision;
pub mod localizer;
pub mod persistence;
pub mod point_store;
pub mod reprojection;
pub mod trajectory;

pub use calibrator::{FrameSetOutcome, InfrastructureCalibration, RunSummary, REFERENCE_MAP_FILE};
pub use config::CalibrationConfig;
pub use error::CalibrationError;
pub use extrinsics::CameraRigExtrinsics;
pub use frame_set::{FrameSet, Odometry};
pub use keyframe_decision::{KeyFrameDecision, KeyFrameVerdict};
pub use localizer::Localizer;
pub use point_store::ScenePointStore;
pub use reprojection::ErrorStats;
