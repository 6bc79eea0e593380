use image::{GrayImage, Luma, RgbImage};
use ndarray::Array2;

pub fn rgb_to_gray(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut gray = GrayImage::new(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        let lum =
            (0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64) as u8;
        gray.put_pixel(x, y, Luma([lum]));
    }

    gray
}

pub fn gray_to_array(image: &GrayImage) -> Array2<f64> {
    let (width, height) = image.dimensions();
    let mut arr = Array2::zeros((height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        arr[[y as usize, x as usize]] = pixel[0] as f64;
    }

    arr
}

pub fn calculate_histogram(image: &GrayImage) -> [u32; 256] {
    let mut histogram = [0u32; 256];

    for pixel in image.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    histogram
}

/// Global histogram equalization. A constant image maps to itself rather
/// than saturating to white.
pub fn equalize_histogram(image: &GrayImage) -> GrayImage {
    let histogram = calculate_histogram(image);
    let total = image.pixels().len() as u32;

    if total == 0 {
        return image.clone();
    }

    let first = histogram
        .iter()
        .position(|&count| count > 0)
        .unwrap_or(0);
    let cdf_min = histogram[first];

    if cdf_min == total {
        return image.clone();
    }

    let scale = 255.0 / (total - cdf_min) as f64;
    let mut lut = [0u8; 256];
    let mut cumulative = 0u32;

    for (value, &count) in histogram.iter().enumerate() {
        cumulative += count;
        if value >= first {
            lut[value] = ((cumulative - cdf_min) as f64 * scale).round().clamp(0.0, 255.0) as u8;
        }
    }

    let mut out = GrayImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        out.put_pixel(x, y, Luma([lut[pixel[0] as usize]]));
    }

    out
}

pub fn mean_intensity(image: &GrayImage) -> f64 {
    let count = image.pixels().len();
    if count == 0 {
        return 0.0;
    }
    image.pixels().map(|p| p[0] as f64).sum::<f64>() / count as f64
}

/// 3x3 Laplacian response with replicated borders.
pub fn laplacian(gray: &Array2<f64>) -> Array2<f64> {
    let (height, width) = gray.dim();
    let mut out = Array2::zeros((height, width));

    for y in 0..height {
        for x in 0..width {
            let up = gray[[y.saturating_sub(1), x]];
            let down = gray[[(y + 1).min(height - 1), x]];
            let left = gray[[y, x.saturating_sub(1)]];
            let right = gray[[y, (x + 1).min(width - 1)]];
            out[[y, x]] = up + down + left + right - 4.0 * gray[[y, x]];
        }
    }

    out
}

/// Window-3 median filter with reflected edges.
pub fn median_filter3(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return values.to_vec();
    }

    (0..n)
        .map(|i| {
            let prev = values[i.saturating_sub(1)];
            let next = values[(i + 1).min(n - 1)];
            let mut window = [prev, values[i], next];
            window.sort_by(|a, b| a.partial_cmp(b).unwrap());
            window[1]
        })
        .collect()
}

pub fn block_mean(block: &[u8]) -> f64 {
    if block.is_empty() {
        return 0.0;
    }
    block.iter().map(|&v| v as f64).sum::<f64>() / block.len() as f64
}

pub fn block_variance(block: &[u8]) -> f64 {
    if block.is_empty() {
        return 0.0;
    }
    let mean = block_mean(block);
    block
        .iter()
        .map(|&v| {
            let diff = v as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / block.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equalize_leaves_constant_image_unchanged() {
        let img = GrayImage::from_pixel(16, 16, Luma([0u8]));
        let out = equalize_histogram(&img);
        assert!(out.pixels().all(|p| p[0] == 0));

        let img = GrayImage::from_pixel(16, 16, Luma([200u8]));
        let out = equalize_histogram(&img);
        assert!(out.pixels().all(|p| p[0] == 200));
    }

    #[test]
    fn equalize_spreads_two_level_image() {
        let mut img = GrayImage::from_pixel(10, 10, Luma([100u8]));
        for x in 0..10 {
            img.put_pixel(x, 0, Luma([150u8]));
        }
        let out = equalize_histogram(&img);
        // Dominant level maps to 0 offset, the rarer brighter level to 255.
        assert_eq!(out.get_pixel(0, 5)[0], 0);
        assert_eq!(out.get_pixel(0, 0)[0], 255);
    }

    #[test]
    fn laplacian_is_zero_on_flat_input() {
        let arr = Array2::from_elem((8, 8), 37.0);
        let lap = laplacian(&arr);
        assert!(lap.iter().all(|&v| v.abs() < 1e-12));
    }

    #[test]
    fn median_filter_smooths_spike() {
        let smoothed = median_filter3(&[10.0, 10.0, 90.0, 10.0, 10.0]);
        assert_eq!(smoothed, vec![10.0, 10.0, 10.0, 10.0, 10.0]);
    }

    #[test]
    fn block_variance_of_constant_block_is_zero() {
        assert_eq!(block_variance(&[42u8; 25]), 0.0);
        assert!(block_variance(&[0u8, 255u8]) > 0.0);
    }
}
