use std::io::Cursor;

use image::{DynamicImage, GrayImage, Luma};

use crate::error::Result;
use crate::image_utils::{equalize_histogram, mean_intensity};
use crate::{AnalysisConfig, EvidenceItem, EvidenceTag};

const HIGH_ELA_POINTS: u32 = 25;

/// Result of error level analysis. The score is also consumed by the
/// frequency detector as a secondary gate.
#[derive(Debug, Clone)]
pub struct ElaOutcome {
    pub score: f64,
    pub evidence: EvidenceItem,
}

pub struct ElaAnalyzer {
    quality: u8,
    amplification: i16,
    threshold: f64,
}

impl ElaAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            quality: config.ela_quality,
            amplification: 10,
            threshold: config.ela_threshold,
        }
    }

    /// Re-encodes the original decoded image as a fixed-quality JPEG and
    /// measures the equalized residual against it.
    pub fn analyze(&self, original: &DynamicImage) -> Result<ElaOutcome> {
        let original_rgb = original.to_rgb8();
        let recompressed = self.recompress_jpeg(original)?.to_rgb8();

        let (width, height) = original_rgb.dimensions();
        let mut residual = GrayImage::new(width, height);
        for (x, y, pixel) in original_rgb.enumerate_pixels() {
            let recomp = recompressed.get_pixel(x, y);
            let amplified = |channel: usize| -> f64 {
                let diff =
                    (pixel[channel] as i16 - recomp[channel] as i16).abs() * self.amplification;
                diff.min(255) as f64
            };
            let lum = 0.299 * amplified(0) + 0.587 * amplified(1) + 0.114 * amplified(2);
            residual.put_pixel(x, y, Luma([lum as u8]));
        }

        let score = mean_intensity(&equalize_histogram(&residual));

        let evidence = if score > self.threshold {
            EvidenceItem::scored(
                EvidenceTag::ErrorLevel,
                HIGH_ELA_POINTS,
                format!("high ELA score: {score:.2} (compression inconsistencies)"),
            )
        } else {
            EvidenceItem::informational(EvidenceTag::ErrorLevel, format!("normal ELA: {score:.2}"))
        };

        Ok(ElaOutcome { score, evidence })
    }

    fn recompress_jpeg(&self, image: &DynamicImage) -> Result<DynamicImage> {
        let mut buffer = Cursor::new(Vec::new());

        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, self.quality);
        DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder)?;

        Ok(image::load_from_memory(&buffer.into_inner())?)
    }
}
