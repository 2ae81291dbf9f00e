//! Keypoint detection, description and matching.

pub mod brief;
pub mod descriptor;
pub mod equalize;
pub mod fast;
pub mod matcher;

pub use descriptor::{Descriptor, DescriptorKind};
pub use equalize::equalize_histogram;
pub use matcher::{FeatureMatch, match_descriptors};

use image::GrayImage;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use brief::Brief;

/// A detected keypoint with its descriptor.
#[derive(Debug, Clone)]
pub struct Keypoint {
    pub pixel: Vector2<f64>,
    pub descriptor: Descriptor,
}

/// Keypoint detection and description service.
///
/// Implementations must produce descriptors comparable to the ones stored in
/// the reference map.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, image: &GrayImage) -> Vec<Keypoint>;
}

/// Settings for [`FastBriefExtractor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub max_features: usize,
    pub fast_threshold: u8,
    /// Gaussian sigma applied before sampling descriptor pairs.
    pub blur_sigma: f32,
    pub descriptor_bytes: usize,
    pub pattern_seed: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_features: 1500,
            fast_threshold: 20,
            blur_sigma: 2.0,
            descriptor_bytes: 32,
            pattern_seed: 0x0b1e_f5ee,
        }
    }
}

/// FAST-9 corners described with BRIEF.
pub struct FastBriefExtractor {
    config: ExtractorConfig,
    brief: Brief,
}

impl FastBriefExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        let brief = Brief::new(config.descriptor_bytes, config.pattern_seed);
        Self { config, brief }
    }
}

impl Default for FastBriefExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

impl FeatureExtractor for FastBriefExtractor {
    fn extract(&self, image: &GrayImage) -> Vec<Keypoint> {
        let corners = fast::detect(
            image,
            self.config.fast_threshold,
            brief::HALF_PATCH as u32 + 1,
            self.config.max_features,
        );
        if corners.is_empty() {
            return Vec::new();
        }

        let smoothed = image::imageops::blur(image, self.config.blur_sigma);
        corners
            .iter()
            .map(|c| Keypoint {
                pixel: Vector2::new(c.x as f64, c.y as f64),
                descriptor: Descriptor::Binary(self.brief.compute(&smoothed, c.x, c.y)),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squares() -> GrayImage {
        GrayImage::from_fn(120, 100, |x, y| {
            if x % 24 < 10 && y % 24 < 10 {
                image::Luma([200])
            } else {
                image::Luma([40])
            }
        })
    }

    #[test]
    fn test_extract_is_deterministic() {
        let img = squares();
        let extractor = FastBriefExtractor::default();

        let a = extractor.extract(&img);
        let b = extractor.extract(&img);

        assert!(!a.is_empty());
        assert_eq!(a.len(), b.len());
        for (ka, kb) in a.iter().zip(b.iter()) {
            assert_eq!(ka.pixel, kb.pixel);
            assert_eq!(ka.descriptor, kb.descriptor);
        }
    }

    #[test]
    fn test_keypoints_respect_border_and_cap() {
        let img = squares();
        let extractor = FastBriefExtractor::new(ExtractorConfig {
            max_features: 5,
            ..ExtractorConfig::default()
        });

        let kps = extractor.extract(&img);
        assert!(kps.len() <= 5);
        for kp in &kps {
            assert!(kp.pixel.x >= 16.0 && kp.pixel.x < 104.0);
            assert!(kp.pixel.y >= 16.0 && kp.pixel.y < 84.0);
            assert_eq!(kp.descriptor.len(), 32);
        }
    }
}
