use image::GrayImage;
use imageproc::edges::canny;

use crate::image_utils::block_variance;
use crate::{AnalysisConfig, EvidenceItem, EvidenceTag, TextRegion};

const LOW_EDGE_POINTS: u32 = 15;
const INPAINT_POINTS_PER_REGION: u32 = 10;

pub struct EdgeTextAnalyzer {
    canny_low: f32,
    canny_high: f32,
    density_factor: f64,
    confidence_floor: f64,
    variance_floor: f64,
}

impl EdgeTextAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            canny_low: config.canny_low,
            canny_high: config.canny_high,
            density_factor: config.edge_density_factor,
            confidence_floor: config.confidence_floor,
            variance_floor: config.region_variance_floor,
        }
    }

    /// Erasure and inpainting checks over the shared OCR pass: text-covered
    /// documents should carry proportional edge density, and genuine glyph
    /// patches are never near-uniform.
    pub fn analyze(&self, gray: &GrayImage, regions: &[TextRegion]) -> Vec<EvidenceItem> {
        if regions.is_empty() {
            return vec![EvidenceItem::informational(
                EvidenceTag::EdgeDensity,
                "no text detected",
            )];
        }

        let (width, height) = gray.dimensions();
        let image_area = (width as f64) * (height as f64);
        let mut items = Vec::new();

        let edges = canny(gray, self.canny_low, self.canny_high);
        let edge_density = edges.pixels().filter(|p| p[0] > 0).count() as f64 / image_area;

        let text_area: f64 = regions
            .iter()
            .filter(|r| r.confidence > self.confidence_floor)
            .map(TextRegion::area)
            .sum();
        let text_ratio = text_area / image_area;

        items.push(if edge_density < self.density_factor * text_ratio {
            EvidenceItem::scored(
                EvidenceTag::EdgeDensity,
                LOW_EDGE_POINTS,
                "low edge density in text areas (possible erasures)",
            )
        } else {
            EvidenceItem::informational(EvidenceTag::EdgeDensity, "normal edge density")
        });

        let low_var_regions = regions
            .iter()
            .filter(|r| r.confidence > self.confidence_floor && !r.text.trim().is_empty())
            .filter(|r| {
                region_pixels(gray, r)
                    .map(|pixels| block_variance(&pixels) < self.variance_floor)
                    .unwrap_or(false)
            })
            .count();

        if low_var_regions > 1 {
            items.push(EvidenceItem::scored(
                EvidenceTag::TextVariance,
                INPAINT_POINTS_PER_REGION * low_var_regions as u32,
                format!("low variance in {low_var_regions} text regions (inpainting)"),
            ));
        }

        items
    }
}

/// Pixels under a region's bounding box, clamped to the image. None when the
/// clamped box is degenerate.
fn region_pixels(gray: &GrayImage, region: &TextRegion) -> Option<Vec<u8>> {
    let (width, height) = gray.dimensions();
    let x1 = (region.quad[0].x as i64).clamp(0, width as i64);
    let y1 = (region.quad[0].y as i64).clamp(0, height as i64);
    let x2 = (region.quad[2].x as i64).clamp(0, width as i64);
    let y2 = (region.quad[2].y as i64).clamp(0, height as i64);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    let mut pixels = Vec::with_capacity(((x2 - x1) * (y2 - y1)) as usize);
    for y in y1..y2 {
        for x in x1..x2 {
            pixels.push(gray.get_pixel(x as u32, y as u32)[0]);
        }
    }

    Some(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn analyzer() -> EdgeTextAnalyzer {
        EdgeTextAnalyzer::new(&AnalysisConfig::default())
    }

    fn region(x: f64, y: f64, w: f64, h: f64, text: &str, confidence: f64) -> TextRegion {
        TextRegion::axis_aligned(x, y, w, h, text.to_string(), confidence)
    }

    #[test]
    fn no_regions_yields_single_marker() {
        let gray = GrayImage::from_pixel(50, 50, Luma([255u8]));
        let items = analyzer().analyze(&gray, &[]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].contribution, 0);
        assert_eq!(items[0].detail, "no text detected");
    }

    #[test]
    fn flat_image_with_claimed_text_has_low_edge_density() {
        // Reported text over a featureless image: zero edges against a
        // non-zero expected ratio.
        let gray = GrayImage::from_pixel(100, 100, Luma([200u8]));
        let regions = vec![region(10.0, 10.0, 80.0, 20.0, "total", 0.9)];
        let items = analyzer().analyze(&gray, &regions);
        assert_eq!(items[0].contribution, LOW_EDGE_POINTS);
    }

    #[test]
    fn uniform_text_patches_count_as_inpainting() {
        let gray = GrayImage::from_pixel(100, 100, Luma([128u8]));
        let regions = vec![
            region(5.0, 5.0, 20.0, 10.0, "name", 0.8),
            region(5.0, 25.0, 20.0, 10.0, "date", 0.8),
            region(5.0, 45.0, 20.0, 10.0, "", 0.8),      // blank text: skipped
            region(5.0, 65.0, 20.0, 10.0, "id", 0.3),    // low confidence: skipped
        ];
        let items = analyzer().analyze(&gray, &regions);
        let inpaint = items
            .iter()
            .find(|i| i.detail.contains("inpainting"))
            .expect("inpainting evidence");
        assert_eq!(inpaint.contribution, 2 * INPAINT_POINTS_PER_REGION);
        assert!(inpaint.detail.contains("2 text regions"));
    }

    #[test]
    fn single_low_variance_region_is_not_flagged() {
        let gray = GrayImage::from_pixel(100, 100, Luma([128u8]));
        let regions = vec![region(5.0, 5.0, 20.0, 10.0, "name", 0.8)];
        let items = analyzer().analyze(&gray, &regions);
        assert!(items.iter().all(|i| !i.detail.contains("inpainting")));
    }
}
