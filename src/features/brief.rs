use image::GrayImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Half size of the square patch sampled around each keypoint.
pub const HALF_PATCH: i32 = 15;

/// BRIEF binary descriptor with a reproducible sampling pattern.
///
/// Two extractors built with the same `bytes` and `seed` produce comparable
/// descriptors, which is what lets query frames match the reference map.
pub struct Brief {
    bytes: usize,
    pattern: Vec<[(i32, i32); 2]>,
}

impl Brief {
    pub fn new(bytes: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let pattern = (0..bytes * 8)
            .map(|_| {
                [
                    (
                        rng.random_range(-HALF_PATCH..=HALF_PATCH),
                        rng.random_range(-HALF_PATCH..=HALF_PATCH),
                    ),
                    (
                        rng.random_range(-HALF_PATCH..=HALF_PATCH),
                        rng.random_range(-HALF_PATCH..=HALF_PATCH),
                    ),
                ]
            })
            .collect();
        Self { bytes, pattern }
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Compute the descriptor at `(x, y)` on an already smoothed image.
    pub fn compute(&self, smoothed: &GrayImage, x: u32, y: u32) -> Vec<u8> {
        let mut descriptor = vec![0u8; self.bytes];
        let (x, y) = (x as i32, y as i32);

        for (i, pair) in self.pattern.iter().enumerate() {
            let v1 = pixel_or_zero(smoothed, x + pair[0].0, y + pair[0].1);
            let v2 = pixel_or_zero(smoothed, x + pair[1].0, y + pair[1].1);
            if v1 > v2 {
                descriptor[i / 8] |= 1 << (i % 8);
            }
        }
        descriptor
    }
}

fn pixel_or_zero(image: &GrayImage, x: i32, y: i32) -> u8 {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.get_pixel(x as u32, y as u32)[0]
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn textured() -> GrayImage {
        GrayImage::from_fn(64, 64, |x, y| image::Luma([((x * 7 + y * 13) % 251) as u8]))
    }

    #[test]
    fn test_same_seed_same_descriptor() {
        let img = textured();
        let a = Brief::new(32, 7).compute(&img, 32, 32);
        let b = Brief::new(32, 7).compute(&img, 32, 32);

        assert_eq!(a.len(), 32);
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_locations_differ() {
        let img = textured();
        let brief = Brief::new(32, 7);

        assert_ne!(brief.compute(&img, 20, 20), brief.compute(&img, 40, 35));
    }
}
