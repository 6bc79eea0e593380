use image::GrayImage;
use ndarray::s;
use rayon::prelude::*;
use statrs::statistics::Statistics;

use crate::image_utils::{gray_to_array, laplacian};
use crate::{AnalysisConfig, EvidenceItem, EvidenceTag};

const LOW_VARIANCE_POINTS: u32 = 20;

pub struct NoiseVarianceAnalyzer {
    patch_size: usize,
    stride: usize,
    outlier_ratio: f64,
}

impl NoiseVarianceAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            patch_size: config.noise_patch_size,
            stride: config.noise_stride,
            outlier_ratio: config.noise_outlier_ratio,
        }
    }

    /// Looks for patches whose Laplacian variance drops far below the rest of
    /// the image, the signature of locally smoothed regions. Returns None
    /// when the image is too small to produce any patch.
    pub fn analyze(&self, gray: &GrayImage) -> Option<EvidenceItem> {
        let response = laplacian(&gray_to_array(gray));
        let (height, width) = response.dim();

        let origins: Vec<(usize, usize)> = (0..height.saturating_sub(self.patch_size))
            .step_by(self.stride)
            .flat_map(|y| {
                (0..width.saturating_sub(self.patch_size))
                    .step_by(self.stride)
                    .map(move |x| (y, x))
            })
            .collect();

        if origins.is_empty() {
            return None;
        }

        let variances: Vec<f64> = origins
            .par_iter()
            .map(|&(y, x)| {
                response
                    .slice(s![y..y + self.patch_size, x..x + self.patch_size])
                    .var(0.0)
            })
            .collect();

        let mean = Statistics::mean(&variances);
        let deviation = Statistics::population_std_dev(&variances);
        let cutoff = mean - 3.0 * deviation;
        let low_outliers = variances.iter().filter(|&&v| v < cutoff).count();

        let item = if low_outliers as f64 / variances.len() as f64 > self.outlier_ratio {
            EvidenceItem::scored(
                EvidenceTag::NoiseVariance,
                LOW_VARIANCE_POINTS,
                "low variance patches (possible local smoothing/edits)",
            )
        } else {
            EvidenceItem::informational(EvidenceTag::NoiseVariance, "consistent noise variance")
        };

        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn analyzer() -> NoiseVarianceAnalyzer {
        NoiseVarianceAnalyzer::new(&AnalysisConfig::default())
    }

    #[test]
    fn image_smaller_than_patch_is_skipped() {
        let gray = GrayImage::from_pixel(8, 8, Luma([120u8]));
        assert!(analyzer().analyze(&gray).is_none());
    }

    #[test]
    fn constant_image_is_consistent() {
        let gray = GrayImage::from_pixel(60, 60, Luma([120u8]));
        let item = analyzer().analyze(&gray).unwrap();
        assert_eq!(item.contribution, 0);
        assert_eq!(item.detail, "consistent noise variance");
    }

    #[test]
    fn flat_island_in_textured_field_is_flagged() {
        // Checkerboard texture gives every patch the same Laplacian variance;
        // a flat corner block yields a tight cluster of zero-variance
        // outliers well past the 3-sigma cutoff.
        let size = 200u32;
        let mut gray = GrayImage::new(size, size);
        for y in 0..size {
            for x in 0..size {
                let value = if (x + y) % 2 == 0 { 80 } else { 180 };
                gray.put_pixel(x, y, Luma([value]));
            }
        }
        for y in 0..60 {
            for x in 0..60 {
                gray.put_pixel(x, y, Luma([128u8]));
            }
        }

        let item = analyzer().analyze(&gray).unwrap();
        assert_eq!(item.contribution, LOW_VARIANCE_POINTS);
        assert!(item.detail.contains("local smoothing"));
    }
}
