//! Per-camera localization against the reference map.
//!
//! A query frame is matched against the most similar reference frames found
//! by place recognition. Matches that hit a triangulated reference point
//! become 2D-3D correspondences for RANSAC PnP; the candidate with the most
//! inliers wins. The winning inliers are then tied to calibration scene
//! points, creating one per reference point at most.

use std::sync::Arc;

use image::GrayImage;
use nalgebra::{Vector2, Vector3};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::camera::Camera;
use crate::features::{equalize_histogram, match_descriptors, FeatureExtractor};
use crate::geometry::{solve_pnp_ransac, PnPRansacParams, SE3};
use crate::location::PlaceRecognizer;
use crate::map::{Feature2D, Frame, FrameId, Observation, PointId, SparseGraph};

use super::{CalibrationConfig, ScenePointStore};

/// Pose hypothesis from one reference candidate.
struct CandidatePose {
    frame_id: FrameId,
    pose: SE3,
    /// (query feature position, reference point) per inlier.
    inliers: Vec<(usize, PointId)>,
}

/// Localizes single camera images; shared read-only across worker threads.
pub struct Localizer {
    reference: Arc<SparseGraph>,
    recognizer: Arc<dyn PlaceRecognizer>,
    extractor: Arc<dyn FeatureExtractor>,
    config: CalibrationConfig,
}

impl Localizer {
    pub fn new(
        reference: Arc<SparseGraph>,
        recognizer: Arc<dyn PlaceRecognizer>,
        extractor: Arc<dyn FeatureExtractor>,
        config: CalibrationConfig,
    ) -> Self {
        Self {
            reference,
            recognizer,
            extractor,
            config,
        }
    }

    pub fn reference(&self) -> &SparseGraph {
        &self.reference
    }

    /// Detect and describe features in one image.
    pub fn extract_frame(&self, image: &GrayImage, camera_id: usize, timestamp_ns: u64) -> Frame {
        let keypoints = if self.config.preprocess {
            self.extractor.extract(&equalize_histogram(image))
        } else {
            self.extractor.extract(image)
        };

        let mut frame = Frame::new(camera_id, timestamp_ns);
        frame.features = keypoints
            .into_iter()
            .enumerate()
            .map(|(i, kp)| Feature2D::new(kp.pixel, kp.descriptor, i))
            .collect();
        frame
    }

    /// Extract features and localize; `None` if the camera could not be placed.
    pub fn estimate_camera_pose(
        &self,
        image: &GrayImage,
        camera_id: usize,
        timestamp_ns: u64,
        camera: &dyn Camera,
        points: &Mutex<ScenePointStore>,
    ) -> Option<Frame> {
        let mut frame = self.extract_frame(image, camera_id, timestamp_ns);
        if self.localize_frame(&mut frame, camera, points) {
            Some(frame)
        } else {
            None
        }
    }

    /// Localize an already-described frame.
    ///
    /// On success the frame carries its `T_cw` pose and only the inlier
    /// features, each linked to a calibration scene point that now records
    /// the observation.
    pub fn localize_frame(&self, frame: &mut Frame, camera: &dyn Camera, points: &Mutex<ScenePointStore>) -> bool {
        let min_corr = self.config.min_correspondences_2d3d;
        if frame.features.len() < min_corr {
            debug!(
                "[Cam {}] Only {} features, skipping localization",
                frame.camera_id,
                frame.features.len()
            );
            return false;
        }

        let candidates = self.recognizer.knn_match(frame, self.config.nearest_image_matches);
        let normalized: Vec<Vector2<f64>> = frame.features.iter().map(|f| camera.normalize(&f.keypoint)).collect();

        let mut best: Option<CandidatePose> = None;
        for frame_id in candidates {
            let Some(candidate) = self.evaluate_candidate(frame, &normalized, frame_id) else {
                continue;
            };
            if best
                .as_ref()
                .map_or(true, |b| candidate.inliers.len() > b.inliers.len())
            {
                best = Some(candidate);
            }
        }

        let Some(best) = best else {
            debug!("[Cam {}] No reference image localized the frame", frame.camera_id);
            return false;
        };

        if self.config.verbose {
            info!(
                "[Cam {}] Found {} inlier 2D-3D correspondences from nearest image {}",
                frame.camera_id,
                best.inliers.len(),
                best.frame_id
            );
        }

        frame.pose = Some(best.pose);
        for (query_idx, reference_id) in best.inliers {
            let Some(position) = self.reference.point(reference_id).map(|p| p.position) else {
                continue;
            };
            let feature = &mut frame.features[query_idx];
            let obs = Observation {
                camera_id: frame.camera_id,
                timestamp_ns: frame.timestamp_ns,
                feature_index: feature.index,
            };

            let id = {
                let mut store = points.lock();
                let id = store.find_or_create(reference_id, position);
                store.attach(id, obs);
                id
            };
            feature.point = Some(id);
        }
        frame.prune_unassociated();
        true
    }

    fn evaluate_candidate(&self, frame: &Frame, normalized: &[Vector2<f64>], frame_id: FrameId) -> Option<CandidatePose> {
        let min_corr = self.config.min_correspondences_2d3d;
        let train = self.reference.frame(frame_id)?;

        let query_desc: Vec<_> = frame.features.iter().map(|f| &f.descriptor).collect();
        let train_desc: Vec<_> = train.features.iter().map(|f| &f.descriptor).collect();
        let matches = match_descriptors(&query_desc, &train_desc, self.config.max_distance_ratio);
        if matches.len() < min_corr {
            return None;
        }

        let mut corr: Vec<(usize, PointId)> = Vec::with_capacity(matches.len());
        let mut world: Vec<Vector3<f64>> = Vec::with_capacity(matches.len());
        let mut image: Vec<Vector2<f64>> = Vec::with_capacity(matches.len());
        for m in &matches {
            let Some(pid) = train.features[m.train_idx].point else {
                continue;
            };
            let Some(point) = self.reference.point(pid) else {
                continue;
            };
            corr.push((m.query_idx, pid));
            world.push(point.position);
            image.push(normalized[m.query_idx]);
        }
        if corr.len() < min_corr {
            return None;
        }

        let params = PnPRansacParams {
            max_iterations: self.config.ransac_iterations,
            threshold: self.config.scaled_reproj_error_thresh(),
            seed: self.config.ransac_seed,
            ..PnPRansacParams::default()
        };
        let result = solve_pnp_ransac(&world, &image, &params)?;
        if result.inliers.len() < min_corr {
            return None;
        }

        Some(CandidatePose {
            frame_id,
            pose: result.pose,
            inliers: result.inliers.iter().map(|&i| corr[i]).collect(),
        })
    }
}
