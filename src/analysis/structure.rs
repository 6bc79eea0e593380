use statrs::statistics::Statistics;

use crate::image_utils::median_filter3;
use crate::{AnalysisConfig, EvidenceItem, EvidenceTag, TextRegion};

const SPACING_POINTS: u32 = 8;
const WIDTH_POINTS: u32 = 8;
const CONFIDENCE_POINTS: u32 = 5;

pub struct StructuralTextAnalyzer {
    min_regions: usize,
    confidence_floor: f64,
    spacing_deviation: f64,
    width_deviation: f64,
    confidence_deviation: f64,
}

impl StructuralTextAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            min_regions: config.min_structural_regions,
            confidence_floor: config.confidence_floor,
            spacing_deviation: config.spacing_deviation,
            width_deviation: config.width_deviation,
            confidence_deviation: config.confidence_deviation,
        }
    }

    /// Layout-consistency checks over confident regions: line spacing, glyph
    /// widths, and recognition confidence should all be stable on an
    /// untouched document. Runs only with enough confident regions.
    pub fn analyze(&self, regions: &[TextRegion]) -> Vec<EvidenceItem> {
        let confident: Vec<&TextRegion> = regions
            .iter()
            .filter(|r| r.confidence > self.confidence_floor)
            .collect();

        if confident.len() < self.min_regions {
            return Vec::new();
        }

        let mut items = Vec::new();

        let mut centers: Vec<f64> = confident.iter().map(|r| r.vertical_center()).collect();
        if centers.len() > 2 {
            centers.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let spacings: Vec<f64> = centers.windows(2).map(|pair| pair[1] - pair[0]).collect();
            let smoothed = if spacings.len() > 2 {
                median_filter3(&spacings)
            } else {
                spacings
            };
            if Statistics::population_std_dev(&smoothed) > self.spacing_deviation {
                items.push(EvidenceItem::scored(
                    EvidenceTag::LineSpacing,
                    SPACING_POINTS,
                    "irregular line spacing (text addition)",
                ));
            }
        }

        let widths: Vec<f64> = confident.iter().map(|r| r.width()).collect();
        if widths.len() > 2 && Statistics::population_std_dev(&widths) > self.width_deviation {
            items.push(EvidenceItem::scored(
                EvidenceTag::GlyphWidths,
                WIDTH_POINTS,
                "inconsistent character widths (font mismatch)",
            ));
        }

        let confidences: Vec<f64> = confident.iter().map(|r| r.confidence).collect();
        if confidences.len() > 2
            && Statistics::population_std_dev(&confidences) > self.confidence_deviation
        {
            items.push(EvidenceItem::scored(
                EvidenceTag::OcrConfidence,
                CONFIDENCE_POINTS,
                "high variable OCR confidence (possible changes)",
            ));
        }

        items
    }
}
