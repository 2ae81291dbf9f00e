//! InfrastructureCalibration - the public calibration session.
//!
//! A session owns the rig cameras, the reference map, the accumulated frame
//! sets and the calibration scene points. Images are localized camera by
//! camera on a pool sized to the rig, frame sets are gated on rig motion,
//! and `run` turns everything into extrinsics.

use std::path::Path;
use std::sync::Arc;

use image::GrayImage;
use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::camera::CameraPtr;
use crate::features::{FastBriefExtractor, FeatureExtractor};
use crate::location::{LocationRecognition, PlaceRecognizer};
use crate::map::{Frame, SparseGraph};
use crate::optimizer::{refine_rig, RigRefineConfig, RigRefineResult};

use super::initializer::{initialize, InitializationReport};
use super::keyframe_decision::{KeyFrameDecision, KeyFrameVerdict};
use super::localizer::Localizer;
use super::persistence;
use super::reprojection::{frame_pose_errors, rig_error, ErrorStats};
use super::{CalibrationConfig, CalibrationError, CameraRigExtrinsics, FrameSet, ScenePointStore};

/// File name of the reference map inside a map directory.
pub const REFERENCE_MAP_FILE: &str = "reference_map.bin";

/// A frame set needs at least this many localized cameras.
const MIN_FRAMES_PER_SET: usize = 2;

/// What happened to one `add_frame_set` call.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameSetOutcome {
    Accepted {
        cameras: Vec<usize>,
        verdict: KeyFrameVerdict,
    },
    /// The rig did not move far enough since the last accepted set.
    Rejected(KeyFrameVerdict),
    /// Fewer than two cameras localized.
    TooFewFrames(usize),
    /// The image count does not match the camera count.
    InputMismatch { expected: usize, got: usize },
}

/// Summary of the initialize + refine pipeline.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub initialization: InitializationReport,
    pub refinement: Option<RigRefineResult>,
    pub before: ErrorStats,
    pub after: ErrorStats,
}

pub struct InfrastructureCalibration {
    cameras: Vec<CameraPtr>,
    config: CalibrationConfig,
    extractor: Arc<dyn FeatureExtractor>,
    localizer: Option<Localizer>,
    keyframes: KeyFrameDecision,
    frame_sets: Vec<FrameSet>,
    points: Mutex<ScenePointStore>,
    extrinsics: CameraRigExtrinsics,
    last_odometry: Option<(f64, f64)>,
    odometry_distance: f64,
    pool: rayon::ThreadPool,
}

impl InfrastructureCalibration {
    pub fn new(cameras: Vec<CameraPtr>, config: CalibrationConfig) -> Result<Self, CalibrationError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cameras.len().max(1))
            .thread_name(|i| format!("localizer-{i}"))
            .build()?;
        let extractor: Arc<dyn FeatureExtractor> = Arc::new(FastBriefExtractor::new(config.extractor.clone()));

        Ok(Self {
            extrinsics: CameraRigExtrinsics::new(cameras.len()),
            keyframes: KeyFrameDecision::new(config.min_keyframe_distance),
            cameras,
            config,
            extractor,
            localizer: None,
            frame_sets: Vec::new(),
            points: Mutex::new(ScenePointStore::new()),
            last_odometry: None,
            odometry_distance: 0.0,
            pool,
        })
    }

    /// Replace the feature extractor. Takes effect for maps loaded afterwards.
    pub fn with_extractor(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Load `reference_map.bin` from `dir` and build place recognition over it.
    pub fn load_map<P: AsRef<Path>>(&mut self, dir: P) -> Result<(), CalibrationError> {
        let path = dir.as_ref().join(REFERENCE_MAP_FILE);
        let graph = SparseGraph::read_from_binary_file(&path).map_err(|source| CalibrationError::MapLoad {
            path: path.clone(),
            source,
        })?;
        info!(
            "Loaded reference map {}: {} frames, {} points",
            path.display(),
            graph.frame_count(),
            graph.points().len()
        );

        let recognizer = LocationRecognition::setup(&graph, self.config.vocabulary_size, self.config.vocabulary_seed);
        self.set_reference_map(graph, Arc::new(recognizer));
        Ok(())
    }

    /// Install a reference map with a custom place recognizer. Resets the session.
    pub fn set_reference_map(&mut self, graph: SparseGraph, recognizer: Arc<dyn PlaceRecognizer>) {
        self.localizer = Some(Localizer::new(
            Arc::new(graph),
            recognizer,
            Arc::clone(&self.extractor),
            self.config.clone(),
        ));
        self.reset();
    }

    /// Localize one synchronized image set and keep it if the rig moved enough.
    ///
    /// Missing or empty images mean the camera has no frame at this instant.
    pub fn add_frame_set(
        &mut self,
        images: &[Option<GrayImage>],
        timestamp_ns: u64,
    ) -> Result<FrameSetOutcome, CalibrationError> {
        if images.len() != self.cameras.len() {
            warn!(
                "Expected {} images but got {}; ignoring frame set",
                self.cameras.len(),
                images.len()
            );
            return Ok(FrameSetOutcome::InputMismatch {
                expected: self.cameras.len(),
                got: images.len(),
            });
        }
        let localizer = self.localizer.as_ref().ok_or(CalibrationError::NoMap)?;

        let cameras = &self.cameras;
        let points = &self.points;
        let frames: Vec<Frame> = self.pool.install(|| {
            images
                .par_iter()
                .enumerate()
                .filter_map(|(camera_id, image)| {
                    let image = image.as_ref().filter(|im| im.width() > 0 && im.height() > 0)?;
                    let camera = cameras.get(camera_id)?;
                    localizer.estimate_camera_pose(image, camera_id, timestamp_ns, camera.as_ref(), points)
                })
                .collect()
        });

        Ok(self.add_localized_frames(frames, timestamp_ns))
    }

    /// Apply the frame-set gate to frames that are already localized.
    ///
    /// Observations of rejected frames are removed from the scene points.
    pub fn add_localized_frames(&mut self, mut frames: Vec<Frame>, timestamp_ns: u64) -> FrameSetOutcome {
        frames.sort_by_key(|f| f.camera_id);
        frames.dedup_by_key(|f| f.camera_id);

        if frames.len() < MIN_FRAMES_PER_SET {
            debug!("Only {} cameras localized at {}", frames.len(), timestamp_ns);
            self.detach(&frames);
            return FrameSetOutcome::TooFewFrames(frames.len());
        }

        let verdict = self.keyframes.evaluate(self.frame_sets.last(), &frames);
        if !verdict.is_accepted() {
            if self.config.verbose {
                info!("Skipping frame set as inter-frame distance is too small ({:?})", verdict);
            }
            self.detach(&frames);
            return FrameSetOutcome::Rejected(verdict);
        }

        let cameras: Vec<usize> = frames.iter().map(|f| f.camera_id).collect();
        self.frame_sets.push(FrameSet::new(timestamp_ns, frames));
        if self.config.verbose {
            info!(
                "Added frame set {} {:?} ts = {}",
                self.frame_sets.len(),
                cameras,
                timestamp_ns
            );
        }
        FrameSetOutcome::Accepted { cameras, verdict }
    }

    fn detach(&self, frames: &[Frame]) {
        let mut store = self.points.lock();
        for frame in frames {
            store.detach_frame(frame);
        }
        debug!(
            "Scene points: {} slots, {} orphaned",
            store.len(),
            store.orphan_count()
        );
    }

    /// Accumulate planar path length; the first sample sets the origin.
    pub fn add_odometry(&mut self, x: f64, y: f64, yaw: f64, timestamp_ns: u64) {
        if let Some((lx, ly)) = self.last_odometry {
            self.odometry_distance += (x - lx).hypot(y - ly);
        }
        self.last_odometry = Some((x, y));
        debug!("Odometry ({:.3}, {:.3}, {:.3}) at {}", x, y, yaw, timestamp_ns);
    }

    pub fn odometry_distance(&self) -> f64 {
        self.odometry_distance
    }

    pub fn reset(&mut self) {
        self.frame_sets.clear();
        self.points.lock().clear();
        self.last_odometry = None;
        self.odometry_distance = 0.0;
        self.extrinsics.reset();
    }

    /// Initialize extrinsics from the best complete frame set, then refine.
    pub fn run(&mut self) -> Result<RunSummary, CalibrationError> {
        if self.config.verbose {
            let points = self.points.lock();
            let pose_errors = frame_pose_errors(&self.frame_sets, &self.cameras, &points);
            info!(
                "Average reprojection error over all frames: {:.3} px",
                pose_errors.avg
            );
            let frame_count: usize = self.frame_sets.iter().map(|s| s.frames.len()).sum();
            info!(
                "Average number of frames per set: {:.2}",
                frame_count as f64 / self.frame_sets.len().max(1) as f64
            );
        }

        let initialization = {
            let points = self.points.lock();
            initialize(&mut self.frame_sets, &self.cameras, &points)?
        };
        let best = initialization.best();
        for (camera, pose) in best.extrinsics.iter().enumerate() {
            self.extrinsics.set_global_camera_pose(camera, *pose);
        }

        let before = self.reprojection_error();
        let refinement = self.optimize(self.config.optimize_scene_points);
        let after = self.reprojection_error();

        info!("Odometry distance: {:.3} m", self.odometry_distance);

        Ok(RunSummary {
            initialization,
            refinement,
            before,
            after,
        })
    }

    /// Jointly refine extrinsics, odometry and optionally scene points.
    pub fn optimize(&mut self, optimize_scene_points: bool) -> Option<RigRefineResult> {
        let verbose = self.config.verbose;
        if verbose {
            let e = self.reprojection_error();
            info!(
                "Reprojection error before refinement: avg {:.3} px, max {:.3} px over {} features",
                e.avg, e.max, e.count
            );
        }

        let config = RigRefineConfig {
            max_iterations: self.config.max_iterations,
            num_threads: self.config.solver_threads,
            cauchy_scale: self.config.cauchy_scale,
            optimize_points: optimize_scene_points,
            ..RigRefineConfig::default()
        };
        let result = refine_rig(
            &mut self.frame_sets,
            &self.cameras,
            &mut self.extrinsics,
            self.points.get_mut(),
            &config,
        );

        if verbose {
            let e = self.reprojection_error();
            info!(
                "Reprojection error after refinement: avg {:.3} px, max {:.3} px over {} features",
                e.avg, e.max, e.count
            );
        }
        result
    }

    /// Error of every observation under the current extrinsics and odometry.
    pub fn reprojection_error(&self) -> ErrorStats {
        let points = self.points.lock();
        rig_error(&self.frame_sets, &self.cameras, self.extrinsics.poses(), &points)
    }

    pub fn extrinsics(&self) -> &CameraRigExtrinsics {
        &self.extrinsics
    }

    pub fn frame_sets(&self) -> &[FrameSet] {
        &self.frame_sets
    }

    pub fn scene_point_count(&self) -> usize {
        self.points.lock().len()
    }

    pub fn save_frame_sets<P: AsRef<Path>>(&self, path: P) -> Result<(), CalibrationError> {
        let points = self.points.lock();
        persistence::save_frame_sets(path, &self.frame_sets, &points, self.cameras.len())
    }

    /// Replace the session's frame sets and scene points with a saved state.
    pub fn load_frame_sets<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CalibrationError> {
        let (frame_sets, points) = persistence::load_frame_sets(path)?;
        self.frame_sets = frame_sets;
        *self.points.get_mut() = points;
        Ok(())
    }
}
