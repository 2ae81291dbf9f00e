//! Reprojection error under rig extrinsics and frame-set odometry.

use nalgebra::{Vector2, Vector3};

use crate::camera::{Camera, CameraPtr};
use crate::geometry::SE3;
use crate::map::Frame;

use super::{FrameSet, Odometry, ScenePointStore};

/// Summary of a set of pixel errors.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ErrorStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub count: usize,
}

impl ErrorStats {
    /// All fields are zero for an empty input.
    pub fn from_samples<I: IntoIterator<Item = f64>>(samples: I) -> Self {
        let mut stats = ErrorStats {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            avg: 0.0,
            count: 0,
        };
        let mut sum = 0.0;
        for e in samples {
            stats.min = stats.min.min(e);
            stats.max = stats.max.max(e);
            sum += e;
            stats.count += 1;
        }
        if stats.count == 0 {
            return ErrorStats::default();
        }
        stats.avg = sum / stats.count as f64;
        stats
    }

    /// Merge statistics, weighting each average by its sample count.
    pub fn combine<I: IntoIterator<Item = ErrorStats>>(parts: I) -> Self {
        let mut out = ErrorStats {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            avg: 0.0,
            count: 0,
        };
        let mut weighted = 0.0;
        for s in parts.into_iter().filter(|s| s.count > 0) {
            out.min = out.min.min(s.min);
            out.max = out.max.max(s.max);
            weighted += s.avg * s.count as f64;
            out.count += s.count;
        }
        if out.count == 0 {
            return ErrorStats::default();
        }
        out.avg = weighted / out.count as f64;
        out
    }
}

/// `T_cam_world` implied by the camera's extrinsic and the rig odometry.
pub fn camera_from_world(t_cam_ref: &SE3, odometry: &Odometry) -> SE3 {
    t_cam_ref.inverse().compose(&odometry.pose().inverse())
}

/// Pixel error of one observation of `point` (world coordinates).
pub fn reprojection_error(
    camera: &dyn Camera,
    point: &Vector3<f64>,
    t_cam_ref: &SE3,
    odometry: &Odometry,
    observed: &Vector2<f64>,
) -> f64 {
    let t_cw = camera_from_world(t_cam_ref, odometry);
    camera.reprojection_error(point, &t_cw.rotation, &t_cw.translation, observed)
}

/// Observations whose point lands behind the camera are left out.
fn errors_under(frame: &Frame, camera: &dyn Camera, t_cw: &SE3, points: &ScenePointStore) -> ErrorStats {
    ErrorStats::from_samples(
        frame
            .features
            .iter()
            .filter_map(|f| {
                let position = points.position(f.point?)?;
                Some(camera.reprojection_error(&position, &t_cw.rotation, &t_cw.translation, &f.keypoint))
            })
            .filter(|e| e.is_finite()),
    )
}

/// Errors of a frame's associated features under the rig model.
pub fn frame_error(
    frame: &Frame,
    camera: &dyn Camera,
    t_cam_ref: &SE3,
    odometry: &Odometry,
    points: &ScenePointStore,
) -> ErrorStats {
    errors_under(frame, camera, &camera_from_world(t_cam_ref, odometry), points)
}

/// Errors of a frame's associated features under its own localized pose.
pub fn frame_pose_error(frame: &Frame, camera: &dyn Camera, points: &ScenePointStore) -> ErrorStats {
    match frame.pose {
        Some(t_cw) => errors_under(frame, camera, &t_cw, points),
        None => ErrorStats::default(),
    }
}

/// Errors over every frame, using `odometry[i]` for `frame_sets[i]`.
pub fn rig_error_with_odometry(
    frame_sets: &[FrameSet],
    odometry: &[Odometry],
    cameras: &[CameraPtr],
    extrinsics: &[SE3],
    points: &ScenePointStore,
) -> ErrorStats {
    ErrorStats::combine(frame_sets.iter().zip(odometry).flat_map(|(set, odo)| {
        set.frames.iter().filter_map(move |frame| {
            let camera = cameras.get(frame.camera_id)?;
            let t_cam_ref = extrinsics.get(frame.camera_id)?;
            Some(frame_error(frame, camera.as_ref(), t_cam_ref, odo, points))
        })
    }))
}

/// Errors over every frame using each set's stored odometry.
pub fn rig_error(
    frame_sets: &[FrameSet],
    cameras: &[CameraPtr],
    extrinsics: &[SE3],
    points: &ScenePointStore,
) -> ErrorStats {
    let odometry: Vec<Odometry> = frame_sets.iter().map(|s| s.odometry).collect();
    rig_error_with_odometry(frame_sets, &odometry, cameras, extrinsics, points)
}

/// Errors of every frame against its own localized pose.
pub fn frame_pose_errors(frame_sets: &[FrameSet], cameras: &[CameraPtr], points: &ScenePointStore) -> ErrorStats {
    ErrorStats::combine(frame_sets.iter().flat_map(|set| {
        set.frames.iter().filter_map(|frame| {
            let camera = cameras.get(frame.camera_id)?;
            Some(frame_pose_error(frame, camera.as_ref(), points))
        })
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PinholeCamera;
    use crate::features::Descriptor;
    use crate::map::{Feature2D, PointId};
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;
    use std::sync::Arc;

    #[test]
    fn test_stats_empty_is_zero() {
        assert_eq!(ErrorStats::from_samples(std::iter::empty()), ErrorStats::default());
        assert_eq!(ErrorStats::combine(std::iter::empty()), ErrorStats::default());
    }

    #[test]
    fn test_combine_is_count_weighted() {
        let a = ErrorStats::from_samples([1.0, 1.0, 1.0]);
        let b = ErrorStats::from_samples([5.0]);
        let total = ErrorStats::combine([a, b, ErrorStats::default()]);

        assert_eq!(total.count, 4);
        assert_relative_eq!(total.avg, 2.0);
        assert_relative_eq!(total.min, 1.0);
        assert_relative_eq!(total.max, 5.0);
    }

    #[test]
    fn test_frame_error_matches_projection() {
        let camera = PinholeCamera::new(400.0, 400.0, 320.0, 240.0, 640, 480);
        let t_cam_ref = SE3::new(UnitQuaternion::from_euler_angles(0.0, 0.2, 0.0), Vector3::new(0.1, 0.0, 0.0));
        let odometry = Odometry::new(0, Vector3::new(1.0, 2.0, 0.0), Vector3::new(0.3, 0.0, 0.0));

        let t_cw = camera_from_world(&t_cam_ref, &odometry);
        let mut points = ScenePointStore::new();
        let mut frame = Frame::new(0, 0);
        for (i, p_cam) in [Vector3::new(0.2, 0.1, 4.0), Vector3::new(-0.5, 0.3, 6.0)].iter().enumerate() {
            let world = t_cw.inverse().transform_point(p_cam);
            let id = points.find_or_create(PointId::new(i as u32), world);
            let uv = camera.project(p_cam).unwrap();
            // Second observation is offset by 3 pixels.
            let observed = uv + Vector2::new(3.0 * i as f64, 0.0);
            let mut feat = Feature2D::new(observed, Descriptor::Binary(vec![0]), i);
            feat.point = Some(id);
            frame.features.push(feat);
        }
        frame.features.push(Feature2D::new(Vector2::zeros(), Descriptor::Binary(vec![0]), 9));

        let stats = frame_error(&frame, &camera, &t_cam_ref, &odometry, &points);
        assert_eq!(stats.count, 2);
        assert_relative_eq!(stats.min, 0.0, epsilon = 1e-9);
        assert_relative_eq!(stats.max, 3.0, epsilon = 1e-9);
        assert_relative_eq!(stats.avg, 1.5, epsilon = 1e-9);

        frame.pose = Some(t_cw);
        let own = frame_pose_error(&frame, &camera, &points);
        assert_relative_eq!(own.avg, 1.5, epsilon = 1e-9);

        let cameras: Vec<CameraPtr> = vec![Arc::new(camera)];
        let mut set = FrameSet::new(0, vec![frame]);
        set.odometry = odometry;
        let global = rig_error(&[set], &cameras, &[t_cam_ref], &points);
        assert_relative_eq!(global.avg, 1.5, epsilon = 1e-9);
    }

    #[test]
    fn test_points_behind_camera_are_skipped() {
        let camera = PinholeCamera::new(400.0, 400.0, 320.0, 240.0, 640, 480);
        let mut points = ScenePointStore::new();
        let mut frame = Frame::new(0, 0);
        for (i, (p, offset)) in [(Vector3::new(0.1, 0.0, 5.0), 2.0), (Vector3::new(0.0, 0.0, -5.0), 0.0)]
            .into_iter()
            .enumerate()
        {
            let id = points.find_or_create(PointId::new(i as u32), p);
            let mut feat = Feature2D::new(Vector2::new(328.0 + offset, 240.0), Descriptor::Binary(vec![0]), i);
            feat.point = Some(id);
            frame.features.push(feat);
        }
        frame.pose = Some(SE3::identity());

        let stats = frame_pose_error(&frame, &camera, &points);
        assert_eq!(stats.count, 1);
        assert!(stats.max.is_finite());
        assert_relative_eq!(stats.avg, 2.0, epsilon = 1e-9);
    }
}
