//! Initial extrinsics from complete frame sets.
//!
//! Each frame set in which every camera localized yields one hypothesis: the
//! relative poses of its frames with camera 0 at identity. A hypothesis is
//! scored by the weighted average reprojection error of all frame sets once
//! their odometry has been re-estimated under it, and the lowest score wins.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::camera::CameraPtr;
use crate::geometry::SE3;

use super::reprojection::{rig_error_with_odometry, ErrorStats};
use super::trajectory::estimate_odometry;
use super::{CalibrationError, FrameSet, Odometry, ScenePointStore};

/// Extrinsics proposed by one complete frame set.
#[derive(Debug, Clone)]
pub struct Hypothesis {
    pub frame_set_index: usize,
    pub extrinsics: Vec<SE3>,
    pub error: ErrorStats,
}

#[derive(Debug, Clone)]
pub struct InitializationReport {
    pub hypotheses: Vec<Hypothesis>,
    /// Index into `hypotheses`.
    pub best: usize,
}

impl InitializationReport {
    pub fn best(&self) -> &Hypothesis {
        &self.hypotheses[self.best]
    }
}

/// Relative camera poses of a complete frame set, camera 0 at identity.
///
/// `extrinsics[j] = T_c0w · T_cjw⁻¹` maps camera `j` into camera 0.
pub fn hypothesis_from(set: &FrameSet, camera_count: usize) -> Option<Vec<SE3>> {
    let pose0 = set.frame_for_camera(0)?.pose?;
    (0..camera_count)
        .map(|j| {
            let pose_j = set.frame_for_camera(j)?.pose?;
            Some(if j == 0 {
                SE3::identity()
            } else {
                pose0.compose(&pose_j.inverse())
            })
        })
        .collect()
}

/// Odometry for every frame set under the given extrinsics.
pub fn odometry_under(frame_sets: &[FrameSet], extrinsics: &[SE3]) -> Vec<Odometry> {
    frame_sets
        .iter()
        .map(|set| {
            estimate_odometry(&set.frames, extrinsics, set.timestamp_ns).unwrap_or(Odometry {
                timestamp_ns: set.timestamp_ns,
                ..Odometry::default()
            })
        })
        .collect()
}

/// Evaluate every complete frame set and keep the best hypothesis.
///
/// The odometry of every frame set is rewritten under the winner.
pub fn initialize(
    frame_sets: &mut [FrameSet],
    cameras: &[CameraPtr],
    points: &ScenePointStore,
) -> Result<InitializationReport, CalibrationError> {
    let camera_count = cameras.len();
    let complete: Vec<usize> = frame_sets
        .iter()
        .enumerate()
        .filter(|(_, set)| set.is_complete(camera_count))
        .map(|(i, _)| i)
        .collect();

    if complete.is_empty() {
        return Err(CalibrationError::NoCompleteFrameSet);
    }
    info!(
        "Evaluating {} extrinsics hypotheses over {} frame sets",
        complete.len(),
        frame_sets.len()
    );

    let sets: &[FrameSet] = frame_sets;
    let hypotheses: Vec<Hypothesis> = complete
        .par_iter()
        .filter_map(|&i| {
            let extrinsics = hypothesis_from(&sets[i], camera_count)?;
            let odometry = odometry_under(sets, &extrinsics);
            let error = rig_error_with_odometry(sets, &odometry, cameras, &extrinsics, points);
            debug!("Frame set {} hypothesis: avg error {:.3} px", i, error.avg);
            Some(Hypothesis {
                frame_set_index: i,
                extrinsics,
                error,
            })
        })
        .collect();

    // Ties keep the earliest frame set; non-finite scores never beat a finite one.
    let mut best = 0;
    for (i, h) in hypotheses.iter().enumerate().skip(1) {
        let current = hypotheses[best].error.avg;
        if h.error.avg < current || (!current.is_finite() && h.error.avg.is_finite()) {
            best = i;
        }
    }
    let Some(winner) = hypotheses.get(best) else {
        return Err(CalibrationError::NoCompleteFrameSet);
    };

    info!(
        "Initial extrinsics from frame set {}: avg reprojection error {:.3} px",
        winner.frame_set_index, winner.error.avg
    );

    let odometry = odometry_under(frame_sets, &winner.extrinsics);
    for (set, odo) in frame_sets.iter_mut().zip(odometry) {
        set.odometry = odo;
    }

    Ok(InitializationReport { hypotheses, best })
}
