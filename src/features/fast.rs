use image::GrayImage;

/// Bresenham circle of radius 3, clockwise from the top.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Contiguous arc length required for a corner (FAST-9).
const ARC_LENGTH: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corner {
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

/// Corner score: summed absolute contrast of the dominant side beyond the threshold.
/// Zero if the pixel is not a FAST-9 corner.
fn corner_score(image: &GrayImage, x: u32, y: u32, threshold: u8) -> f32 {
    let p = image.get_pixel(x, y)[0] as i32;
    let t = threshold as i32;

    let mut states = [0i8; 16];
    for (k, &(dx, dy)) in CIRCLE.iter().enumerate() {
        let v = image.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0] as i32;
        states[k] = if v > p + t {
            1
        } else if v < p - t {
            -1
        } else {
            0
        };
    }

    for sign in [1i8, -1i8] {
        let mut run = 0;
        // Walk the circle twice to catch arcs wrapping past index 0.
        for k in 0..32 {
            if states[k % 16] == sign {
                run += 1;
                if run >= ARC_LENGTH {
                    let mut score = 0.0;
                    for (s, &(dx, dy)) in states.iter().zip(CIRCLE.iter()) {
                        if *s == sign {
                            let v = image.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0]
                                as i32;
                            score += ((v - p).abs() - t) as f32;
                        }
                    }
                    return score;
                }
            } else {
                run = 0;
            }
        }
    }
    0.0
}

/// Detect FAST-9 corners at least `border` pixels from the image edge, with
/// 3x3 non-maximum suppression, keeping the `max_corners` strongest.
pub fn detect(image: &GrayImage, threshold: u8, border: u32, max_corners: usize) -> Vec<Corner> {
    let (w, h) = image.dimensions();
    let border = border.max(3);
    if w <= 2 * border || h <= 2 * border {
        return Vec::new();
    }

    let mut scores = vec![0.0f32; (w * h) as usize];
    for y in border..h - border {
        for x in border..w - border {
            scores[(y * w + x) as usize] = corner_score(image, x, y, threshold);
        }
    }

    let mut corners = Vec::new();
    for y in border..h - border {
        for x in border..w - border {
            let s = scores[(y * w + x) as usize];
            if s <= 0.0 {
                continue;
            }
            let mut is_max = true;
            'nms: for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = (x as i32 + dx) as u32;
                    let ny = (y as i32 + dy) as u32;
                    let ns = scores[(ny * w + nx) as usize];
                    // Ties resolve toward the earlier pixel in raster order.
                    if ns > s || (ns == s && (dy < 0 || (dy == 0 && dx < 0))) {
                        is_max = false;
                        break 'nms;
                    }
                }
            }
            if is_max {
                corners.push(Corner { x, y, score: s });
            }
        }
    }

    corners.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    corners.truncate(max_corners);
    corners
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_bright_square_corners() {
        let img = GrayImage::from_fn(64, 64, |x, y| {
            if (20..44).contains(&x) && (20..44).contains(&y) {
                image::Luma([220])
            } else {
                image::Luma([30])
            }
        });

        let corners = detect(&img, 20, 4, 100);

        assert!(!corners.is_empty());
        for c in &corners {
            let near_corner = [(20, 20), (43, 20), (20, 43), (43, 43)]
                .iter()
                .any(|&(cx, cy)| (c.x as i32 - cx).abs() <= 2 && (c.y as i32 - cy).abs() <= 2);
            assert!(near_corner, "unexpected corner at {:?}", c);
        }
    }

    #[test]
    fn test_flat_image_has_no_corners() {
        let img = GrayImage::from_pixel(32, 32, image::Luma([128]));
        assert!(detect(&img, 10, 3, 100).is_empty());
    }

    #[test]
    fn test_tiny_image() {
        let img = GrayImage::from_pixel(5, 5, image::Luma([0]));
        assert!(detect(&img, 10, 3, 100).is_empty());
    }
}
