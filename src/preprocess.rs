use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Pixel, RgbImage, imageops};
use imageproc::filter::gaussian_blur_f32;
use ndarray::Array2;
use rayon::prelude::*;

use crate::image_utils::{gray_to_array, rgb_to_gray};

/// Aligned representations produced by preprocessing. All three buffers
/// share identical dimensions.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub mask: GrayImage,
    pub gray: GrayImage,
    pub color: RgbImage,
}

#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    pub clahe_clip_limit: f64,
    pub clahe_tiles: u32,
    pub denoise_strength: f64,
    pub denoise_template: i64,
    pub denoise_search: i64,
    pub threshold_sigma: f32,
    pub threshold_offset: i16,
    pub upscale: u32,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self {
            clahe_clip_limit: 3.0,
            clahe_tiles: 8,
            denoise_strength: 3.0,
            denoise_template: 7,
            denoise_search: 21,
            // Gaussian weighting for the 11x11 threshold neighborhood.
            threshold_sigma: 2.0,
            threshold_offset: 2,
            upscale: 2,
        }
    }
}

impl ImagePreprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes a decoded image into (mask, grayscale, color), upscaled and
    /// deskewed. The denoised buffer feeds only the binary mask; the returned
    /// grayscale keeps full contrast for the downstream detectors.
    pub fn process(&self, image: &DynamicImage) -> Preprocessed {
        let color = image.to_rgb8();
        let gray = rgb_to_gray(&color);

        let gray = self.clahe(&gray);
        let denoised = self.denoise(&gray);
        let mask = self.adaptive_mask(&denoised);

        let width = gray.width() * self.upscale;
        let height = gray.height() * self.upscale;
        let gray = imageops::resize(&gray, width, height, imageops::FilterType::CatmullRom);
        let mask = imageops::resize(&mask, width, height, imageops::FilterType::CatmullRom);
        let color = imageops::resize(&color, width, height, imageops::FilterType::CatmullRom);

        let (mask, gray, color) = self.deskew(mask, gray, color);

        Preprocessed { mask, gray, color }
    }

    /// Contrast-limited adaptive histogram equalization over a square tile
    /// grid, with bilinear blending between neighboring tile mappings.
    fn clahe(&self, gray: &GrayImage) -> GrayImage {
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return gray.clone();
        }

        let tiles = self.clahe_tiles.min(width).min(height).max(1);
        let tile_w = width.div_ceil(tiles);
        let tile_h = height.div_ceil(tiles);

        let mut luts = vec![[0u8; 256]; (tiles * tiles) as usize];
        for ty in 0..tiles {
            for tx in 0..tiles {
                let x0 = tx * tile_w;
                let y0 = ty * tile_h;
                let x1 = (x0 + tile_w).min(width);
                let y1 = (y0 + tile_h).min(height);

                let mut histogram = [0u32; 256];
                for y in y0..y1 {
                    for x in x0..x1 {
                        histogram[gray.get_pixel(x, y)[0] as usize] += 1;
                    }
                }

                let area = ((x1 - x0) * (y1 - y0)).max(1);
                let clip = ((self.clahe_clip_limit * area as f64 / 256.0).max(1.0)) as u32;

                let mut excess = 0u32;
                for count in histogram.iter_mut() {
                    if *count > clip {
                        excess += *count - clip;
                        *count = clip;
                    }
                }
                let bonus = excess / 256;
                for count in histogram.iter_mut() {
                    *count += bonus;
                }
                let mut residual = (excess % 256) as usize;
                if residual > 0 {
                    let step = (256 / residual).max(1);
                    let mut value = 0;
                    while value < 256 && residual > 0 {
                        histogram[value] += 1;
                        residual -= 1;
                        value += step;
                    }
                }

                let lut = &mut luts[(ty * tiles + tx) as usize];
                let scale = 255.0 / area as f64;
                let mut cumulative = 0u32;
                for value in 0..256 {
                    cumulative += histogram[value];
                    lut[value] = (cumulative as f64 * scale).round().clamp(0.0, 255.0) as u8;
                }
            }
        }

        let tile_index = |p: f64, half: f64, size: f64, count: u32| -> (usize, usize, f64) {
            let pos = (p - half) / size;
            let lo = pos.floor();
            let frac = pos - lo;
            let clamp = |v: f64| v.clamp(0.0, (count - 1) as f64) as usize;
            (clamp(lo), clamp(lo + 1.0), frac)
        };

        let mut out = GrayImage::new(width, height);
        let half_w = tile_w as f64 / 2.0;
        let half_h = tile_h as f64 / 2.0;
        for (x, y, pixel) in gray.enumerate_pixels() {
            let value = pixel[0] as usize;
            let (tx0, tx1, fx) = tile_index(x as f64, half_w, tile_w as f64, tiles);
            let (ty0, ty1, fy) = tile_index(y as f64, half_h, tile_h as f64, tiles);

            let at = |ty: usize, tx: usize| luts[ty * tiles as usize + tx][value] as f64;
            let top = at(ty0, tx0) * (1.0 - fx) + at(ty0, tx1) * fx;
            let bottom = at(ty1, tx0) * (1.0 - fx) + at(ty1, tx1) * fx;
            let blended = top * (1.0 - fy) + bottom * fy;
            out.put_pixel(x, y, Luma([blended.round().clamp(0.0, 255.0) as u8]));
        }

        out
    }

    /// Non-local-means denoising. Patch distances are evaluated through one
    /// integral image per search offset; offsets fan out across threads.
    fn denoise(&self, gray: &GrayImage) -> GrayImage {
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return gray.clone();
        }

        let src = gray_to_array(gray);
        let (rows, cols) = src.dim();
        let half_search = self.denoise_search / 2;
        let half_template = (self.denoise_template / 2) as usize;
        let h2 = self.denoise_strength * self.denoise_strength;

        // Self-similarity gets weight 1. Offsets run sequentially and rows in
        // parallel so the accumulation order (and hence the rounding) is
        // identical on every run.
        let mut weights = vec![1.0f64; rows * cols];
        let mut values: Vec<f64> = src.iter().copied().collect();

        for dy in -half_search..=half_search {
            for dx in -half_search..=half_search {
                if (dy, dx) == (0, 0) {
                    continue;
                }

                let shifted = shift_clamped(&src, dy, dx);
                let squared = Array2::from_shape_fn((rows, cols), |(y, x)| {
                    let d = src[[y, x]] - shifted[[y, x]];
                    d * d
                });
                let integral = integral_image(&squared);

                weights
                    .par_chunks_mut(cols)
                    .zip(values.par_chunks_mut(cols))
                    .enumerate()
                    .for_each(|(y, (weight_row, value_row))| {
                        let y0 = y.saturating_sub(half_template);
                        let y1 = (y + half_template).min(rows - 1);
                        for x in 0..cols {
                            let x0 = x.saturating_sub(half_template);
                            let x1 = (x + half_template).min(cols - 1);
                            let area = ((y1 - y0 + 1) * (x1 - x0 + 1)) as f64;
                            let distance = rect_sum(&integral, y0, x0, y1, x1) / area;
                            let weight = (-distance / h2).exp();
                            weight_row[x] += weight;
                            value_row[x] += weight * shifted[[y, x]];
                        }
                    });
            }
        }

        let mut out = GrayImage::new(width, height);
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let index = y as usize * cols + x as usize;
            let value = values[index] / weights[index];
            *pixel = Luma([value.round().clamp(0.0, 255.0) as u8]);
        }

        out
    }

    /// Binary mask from a Gaussian-weighted local threshold: a pixel is
    /// foreground when it exceeds its neighborhood mean minus the offset.
    fn adaptive_mask(&self, gray: &GrayImage) -> GrayImage {
        let local_mean = gaussian_blur_f32(gray, self.threshold_sigma);
        let mut mask = GrayImage::new(gray.width(), gray.height());

        for (x, y, pixel) in gray.enumerate_pixels() {
            let threshold = local_mean.get_pixel(x, y)[0] as i16 - self.threshold_offset;
            let value = if (pixel[0] as i16) > threshold { 255 } else { 0 };
            mask.put_pixel(x, y, Luma([value]));
        }

        mask
    }

    fn deskew(
        &self,
        mask: GrayImage,
        gray: GrayImage,
        color: RgbImage,
    ) -> (GrayImage, GrayImage, RgbImage) {
        match estimate_skew_angle(&mask) {
            Some(angle) => (
                rotate_replicate(&mask, angle),
                rotate_replicate(&gray, angle),
                rotate_replicate(&color, angle),
            ),
            None => (mask, gray, color),
        }
    }
}

/// Skew estimate from the minimum-area bounding rectangle of the mask's
/// foreground. None when there is no foreground to estimate from.
fn estimate_skew_angle(mask: &GrayImage) -> Option<f64> {
    let points: Vec<(f64, f64)> = mask
        .enumerate_pixels()
        .filter(|(_, _, p)| p[0] > 0)
        .map(|(x, y, _)| (x as f64, y as f64))
        .collect();

    if points.is_empty() {
        return None;
    }

    let hull = convex_hull(&points);
    let edge_angle = if hull.len() < 3 {
        0.0
    } else {
        min_rect_edge_angle(&hull)
    };

    // Map the base-edge direction into the (-90, 0] rectangle angle and
    // apply the deskew normalization.
    let angle = edge_angle.rem_euclid(90.0) - 90.0;
    Some(if angle < -45.0 { -(90.0 + angle) } else { -angle })
}

/// Andrew's monotone chain.
fn convex_hull(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let cross = |o: (f64, f64), a: (f64, f64), b: (f64, f64)| -> f64 {
        (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
    };

    let mut lower: Vec<(f64, f64)> = Vec::new();
    for &p in &sorted {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<(f64, f64)> = Vec::new();
    for &p in sorted.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Rotating calipers over a convex hull: the base-edge direction (degrees)
/// of the minimum-area enclosing rectangle.
fn min_rect_edge_angle(hull: &[(f64, f64)]) -> f64 {
    let n = hull.len();
    let mut min_area = f64::MAX;
    let mut best_angle = 0.0;

    for i in 0..n {
        let (x1, y1) = hull[i];
        let (x2, y2) = hull[(i + 1) % n];
        let edge_len = (x2 - x1).hypot(y2 - y1);
        if edge_len < 1e-9 {
            continue;
        }

        let ux = (x2 - x1) / edge_len;
        let uy = (y2 - y1) / edge_len;

        let mut min_u = f64::MAX;
        let mut max_u = f64::MIN;
        let mut min_v = f64::MAX;
        let mut max_v = f64::MIN;
        for &(px, py) in hull {
            let dx = px - x1;
            let dy = py - y1;
            let u = dx * ux + dy * uy;
            let v = dy * ux - dx * uy;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let area = (max_u - min_u) * (max_v - min_v);
        if area < min_area {
            min_area = area;
            best_angle = uy.atan2(ux).to_degrees();
        }
    }

    best_angle
}

/// Rotation about the image center with cubic sampling and replicated edges.
fn rotate_replicate<P>(image: &ImageBuffer<P, Vec<u8>>, degrees: f64) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let theta = degrees.to_radians();
    let (sin, cos) = theta.sin_cos();
    let cx = (width / 2) as f64;
    let cy = (height / 2) as f64;
    let channels = P::CHANNEL_COUNT as usize;

    let mut out = image.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let rx = x as f64 - cx;
        let ry = y as f64 - cy;
        let sx = cos * rx - sin * ry + cx;
        let sy = sin * rx + cos * ry + cy;

        let mut sampled = *pixel;
        for channel in 0..channels {
            sampled.channels_mut()[channel] = sample_bicubic(image, sx, sy, channel);
        }
        *pixel = sampled;
    }

    out
}

fn sample_bicubic<P>(image: &ImageBuffer<P, Vec<u8>>, x: f64, y: f64, channel: usize) -> u8
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let (width, height) = image.dimensions();
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let fetch = |ix: i64, iy: i64| -> f64 {
        let px = ix.clamp(0, width as i64 - 1) as u32;
        let py = iy.clamp(0, height as i64 - 1) as u32;
        image.get_pixel(px, py).channels()[channel] as f64
    };

    let mut accum = 0.0;
    for j in -1..=2i64 {
        let wy = cubic_weight(j as f64 - fy);
        for i in -1..=2i64 {
            let wx = cubic_weight(i as f64 - fx);
            accum += wx * wy * fetch(x0 as i64 + i, y0 as i64 + j);
        }
    }

    accum.round().clamp(0.0, 255.0) as u8
}

/// Catmull-Rom kernel (a = -0.5).
fn cubic_weight(t: f64) -> f64 {
    const A: f64 = -0.5;
    let t = t.abs();
    if t <= 1.0 {
        (A + 2.0) * t * t * t - (A + 3.0) * t * t + 1.0
    } else if t < 2.0 {
        A * t * t * t - 5.0 * A * t * t + 8.0 * A * t - 4.0 * A
    } else {
        0.0
    }
}

fn shift_clamped(src: &Array2<f64>, dy: i64, dx: i64) -> Array2<f64> {
    let (rows, cols) = src.dim();
    Array2::from_shape_fn((rows, cols), |(y, x)| {
        let sy = (y as i64 + dy).clamp(0, rows as i64 - 1) as usize;
        let sx = (x as i64 + dx).clamp(0, cols as i64 - 1) as usize;
        src[[sy, sx]]
    })
}

/// Summed-area table with a zero row/column prefix.
fn integral_image(src: &Array2<f64>) -> Array2<f64> {
    let (rows, cols) = src.dim();
    let mut integral = Array2::zeros((rows + 1, cols + 1));

    for y in 0..rows {
        let mut row_sum = 0.0;
        for x in 0..cols {
            row_sum += src[[y, x]];
            integral[[y + 1, x + 1]] = integral[[y, x + 1]] + row_sum;
        }
    }

    integral
}

fn rect_sum(integral: &Array2<f64>, y0: usize, x0: usize, y1: usize, x1: usize) -> f64 {
    integral[[y1 + 1, x1 + 1]] - integral[[y0, x1 + 1]] - integral[[y1 + 1, x0]]
        + integral[[y0, x0]]
}
