use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::features::ExtractorConfig;

use super::CalibrationError;

/// Tunables for the calibration pipeline.
///
/// Every field has a default, so a YAML file only needs to list overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Ratio-test threshold for descriptor matching (strict).
    pub max_distance_ratio: f32,
    /// Kept for configuration compatibility; 2D-2D matches are gated with
    /// `min_correspondences_2d3d`.
    pub min_correspondences_2d2d: usize,
    /// Minimum matches, 2D-3D correspondences and PnP inliers per camera.
    pub min_correspondences_2d3d: usize,
    /// A frame set is only accepted once every shared camera moved farther
    /// than this (map units).
    pub min_keyframe_distance: f64,
    /// Number of place-recognition candidates queried per image.
    pub nearest_image_matches: usize,
    /// Converts the pixel threshold to the normalized image plane.
    pub nominal_focal_length: f64,
    /// PnP inlier threshold in pixels.
    pub reproj_error_thresh: f64,
    pub ransac_iterations: usize,
    pub ransac_seed: u64,
    /// Histogram-equalize images before feature extraction.
    pub preprocess: bool,
    /// Also refine scene point positions during `run`.
    pub optimize_scene_points: bool,
    pub verbose: bool,
    pub solver_threads: usize,
    pub max_iterations: usize,
    pub cauchy_scale: f64,
    pub vocabulary_size: usize,
    pub vocabulary_seed: u64,
    pub extractor: ExtractorConfig,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            max_distance_ratio: 0.7,
            min_correspondences_2d2d: 20,
            min_correspondences_2d3d: 25,
            min_keyframe_distance: 0.3,
            nearest_image_matches: 10,
            nominal_focal_length: 300.0,
            reproj_error_thresh: 2.0,
            ransac_iterations: 200,
            ransac_seed: 0x5eed,
            preprocess: true,
            optimize_scene_points: false,
            verbose: true,
            solver_threads: 8,
            max_iterations: 1000,
            cauchy_scale: 1.0,
            vocabulary_size: 512,
            vocabulary_seed: 42,
            extractor: ExtractorConfig::default(),
        }
    }
}

impl CalibrationConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, CalibrationError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CalibrationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_yaml::from_reader(file)?;
        Ok(config)
    }

    /// PnP inlier threshold on the normalized image plane.
    pub fn scaled_reproj_error_thresh(&self) -> f64 {
        self.reproj_error_thresh / self.nominal_focal_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let config = CalibrationConfig::default();

        assert_relative_eq!(config.max_distance_ratio, 0.7);
        assert_eq!(config.min_correspondences_2d3d, 25);
        assert_eq!(config.nearest_image_matches, 10);
        assert_relative_eq!(config.scaled_reproj_error_thresh(), 2.0 / 300.0);
    }

    #[test]
    fn test_partial_yaml_overrides() {
        let yaml = "min_keyframe_distance: 0.5\nsolver_threads: 2\nextractor:\n  max_features: 300\n";
        let config: CalibrationConfig = serde_yaml::from_str(yaml).unwrap();

        assert_relative_eq!(config.min_keyframe_distance, 0.5);
        assert_eq!(config.solver_threads, 2);
        assert_eq!(config.extractor.max_features, 300);
        assert_eq!(config.extractor.descriptor_bytes, 32);
        assert_eq!(config.max_iterations, 1000);
    }

    #[test]
    fn test_missing_file() {
        let result = CalibrationConfig::from_yaml_file("/nonexistent/config.yaml");
        assert!(matches!(result, Err(CalibrationError::Io { .. })));
    }
}
