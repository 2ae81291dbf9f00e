use image::GrayImage;

/// Histogram equalization through a CDF lookup table.
pub fn equalize_histogram(src: &GrayImage) -> GrayImage {
    let raw = src.as_raw();
    if raw.is_empty() {
        return src.clone();
    }

    let mut hist = [0u32; 256];
    for &val in raw {
        hist[val as usize] += 1;
    }

    let mut cdf = [0u32; 256];
    cdf[0] = hist[0];
    for i in 1..256 {
        cdf[i] = cdf[i - 1] + hist[i];
    }

    let cdf_min = cdf.iter().find(|&&x| x > 0).copied().unwrap_or(0);
    let total = raw.len() as u32;

    let mut lut = [0u8; 256];
    if total > cdf_min {
        let denom = (total - cdf_min) as f64;
        for i in 0..256 {
            let v = (cdf[i].saturating_sub(cdf_min)) as f64 / denom * 255.0;
            lut[i] = v.round().clamp(0.0, 255.0) as u8;
        }
    } else {
        // Constant image: nothing to stretch.
        for (i, v) in lut.iter_mut().enumerate() {
            *v = i as u8;
        }
    }

    let mut out = src.clone();
    for p in out.iter_mut() {
        *p = lut[*p as usize];
    }
    out
}
