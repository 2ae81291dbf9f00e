//! Frame set acceptance based on how far the rig moved.

use crate::map::Frame;

use super::FrameSet;

/// Outcome of testing a candidate frame set against the last accepted one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyFrameVerdict {
    /// No previous set; the candidate is always accepted.
    First,
    /// Minimum camera displacement over the shared cameras.
    Moved(f64),
    /// Shared cameras moved less than the threshold.
    TooClose(f64),
    /// The candidate has no camera in common with the previous set.
    NoSharedCamera,
}

impl KeyFrameVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, KeyFrameVerdict::First | KeyFrameVerdict::Moved(_))
    }
}

/// Rejects frame sets captured before the rig travelled far enough.
pub struct KeyFrameDecision {
    /// Every shared camera must move strictly farther than this.
    min_distance: f64,
}

impl KeyFrameDecision {
    pub fn new(min_distance: f64) -> Self {
        Self { min_distance }
    }

    /// Compare localized `frames` against the previous accepted frame set.
    pub fn evaluate(&self, previous: Option<&FrameSet>, frames: &[Frame]) -> KeyFrameVerdict {
        let Some(previous) = previous else {
            return KeyFrameVerdict::First;
        };

        let mut min_distance: Option<f64> = None;
        for frame in frames {
            let Some(pose) = frame.pose else { continue };
            let Some(prev_pose) = previous
                .frame_for_camera(frame.camera_id)
                .and_then(|f| f.pose)
            else {
                continue;
            };

            let d = (pose.center() - prev_pose.center()).norm();
            min_distance = Some(min_distance.map_or(d, |m: f64| m.min(d)));
        }

        match min_distance {
            None => KeyFrameVerdict::NoSharedCamera,
            Some(d) if d > self.min_distance => KeyFrameVerdict::Moved(d),
            Some(d) => KeyFrameVerdict::TooClose(d),
        }
    }
}
