use crate::error::PipelineError;
use crate::preprocessing::config::ContrastParams;
use image::{GrayImage, Luma};

/// Gamma correction followed by contrast-limited local histogram equalization.
/// Either half can be switched off.
pub fn apply(gray: &GrayImage, params: &ContrastParams) -> Result<GrayImage, PipelineError> {
    let mut out = gray.clone();
    if params.use_gamma {
        out = gamma_correct(&out, params.gamma);
    }
    if params.use_clahe {
        out = clahe(&out, params.clip_limit, params.tile_grid);
    }
    Ok(out)
}

/// Power-law remap `255 * (v / 255) ^ (1 / gamma)` through a lookup table
pub fn gamma_correct(gray: &GrayImage, gamma: f32) -> GrayImage {
    let inv_gamma = 1.0 / gamma;
    let mut lut = [0u8; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        let v = (i as f32 / 255.0).powf(inv_gamma) * 255.0;
        *entry = v.round().clamp(0.0, 255.0) as u8;
    }

    let mut out = gray.clone();
    for pixel in out.pixels_mut() {
        pixel.0[0] = lut[pixel.0[0] as usize];
    }
    out
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into a `tile_grid` of regions; each region gets its own
/// clipped equalization table and pixels blend the four nearest tables
/// bilinearly so tile seams do not show.
pub fn clahe(gray: &GrayImage, clip_limit: f32, tile_grid: (u32, u32)) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let tiles_x = tile_grid.0.clamp(1, width);
    let tiles_y = tile_grid.1.clamp(1, height);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        let (y0, y1) = tile_span(ty, tiles_y, height);
        for tx in 0..tiles_x {
            let (x0, x1) = tile_span(tx, tiles_x, width);
            luts.push(tile_lut(gray, x0, x1, y0, y1, clip_limit));
        }
    }

    let tile_w = width as f32 / tiles_x as f32;
    let tile_h = height as f32 / tiles_y as f32;

    GrayImage::from_fn(width, height, |x, y| {
        let (tx0, tx1, ax) = neighbours(x, tile_w, tiles_x);
        let (ty0, ty1, ay) = neighbours(y, tile_h, tiles_y);
        let v = gray.get_pixel(x, y).0[0] as usize;

        let lookup = |tx: u32, ty: u32| luts[(ty * tiles_x + tx) as usize][v] as f32;
        let top = lookup(tx0, ty0) * (1.0 - ax) + lookup(tx1, ty0) * ax;
        let bottom = lookup(tx0, ty1) * (1.0 - ax) + lookup(tx1, ty1) * ax;
        let blended = top * (1.0 - ay) + bottom * ay;

        Luma([blended.round().clamp(0.0, 255.0) as u8])
    })
}

fn tile_span(index: u32, tiles: u32, extent: u32) -> (u32, u32) {
    let start = (index as u64 * extent as u64 / tiles as u64) as u32;
    let end = ((index as u64 + 1) * extent as u64 / tiles as u64) as u32;
    (start, end.max(start + 1).min(extent))
}

/// Index of the two tiles whose centres bracket `pos`, and the blend weight
fn neighbours(pos: u32, tile_size: f32, tiles: u32) -> (u32, u32, f32) {
    let f = (pos as f32 + 0.5) / tile_size - 0.5;
    if f <= 0.0 {
        return (0, 0, 0.0);
    }
    let lower = (f.floor() as u32).min(tiles - 1);
    let upper = (lower + 1).min(tiles - 1);
    let weight = if upper == lower { 0.0 } else { f - lower as f32 };
    (lower, upper, weight)
}

fn tile_lut(gray: &GrayImage, x0: u32, x1: u32, y0: u32, y1: u32, clip_limit: f32) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[gray.get_pixel(x, y).0[0] as usize] += 1;
        }
    }
    let area = (x1 - x0) * (y1 - y0);

    // Clip and hand the excess back out evenly
    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for count in hist.iter_mut() {
        if *count > limit {
            excess += *count - limit;
            *count = limit;
        }
    }
    let share = excess / 256;
    let remainder = (excess % 256) as usize;
    for count in hist.iter_mut() {
        *count += share;
    }
    if remainder > 0 {
        let step = 256 / remainder;
        for k in 0..remainder {
            hist[k * step] += 1;
        }
    }

    let total: u32 = hist.iter().sum();
    let scale = 255.0 / total.max(1) as f32;
    let mut lut = [0u8; 256];
    let mut cumulative = 0u32;
    for (i, count) in hist.iter().enumerate() {
        cumulative += count;
        lut[i] = (cumulative as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spread(img: &GrayImage) -> u8 {
        let (min, max) = img
            .pixels()
            .fold((255u8, 0u8), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
        max - min
    }

    #[test]
    fn test_gamma_below_one_darkens_midtones() {
        let img = GrayImage::from_pixel(4, 4, Luma([128]));
        let out = gamma_correct(&img, 0.5);
        // (128/255)^2 * 255 ~= 64
        assert_eq!(out.get_pixel(0, 0).0[0], 64);
    }

    #[test]
    fn test_gamma_keeps_extremes() {
        let mut img = GrayImage::from_pixel(2, 1, Luma([0]));
        img.put_pixel(1, 0, Luma([255]));
        let out = gamma_correct(&img, 0.5);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn test_clahe_stretches_low_contrast() {
        let img = GrayImage::from_fn(64, 64, |x, y| Luma([100 + ((x + y) % 20) as u8]));
        let out = clahe(&img, 4.0, (4, 4));
        assert!(spread(&out) > spread(&img));
    }

    #[test]
    fn test_uniform_image_does_not_panic() {
        let img = GrayImage::from_pixel(32, 32, Luma([77]));
        let out = apply(&img, &ContrastParams::default()).unwrap();
        assert_eq!(out.dimensions(), (32, 32));
        // Uniform in, uniform out
        assert_eq!(spread(&out), 0);
    }

    #[test]
    fn test_grid_larger_than_image() {
        let img = GrayImage::from_fn(3, 2, |x, _| Luma([(x * 80) as u8]));
        let out = clahe(&img, 2.0, (8, 8));
        assert_eq!(out.dimensions(), (3, 2));
    }

    #[test]
    fn test_both_disabled_is_identity() {
        let img = GrayImage::from_fn(10, 10, |x, y| Luma([(x * 10 + y) as u8]));
        let params = ContrastParams {
            use_gamma: false,
            use_clahe: false,
            ..Default::default()
        };
        assert_eq!(apply(&img, &params).unwrap(), img);
    }
}
