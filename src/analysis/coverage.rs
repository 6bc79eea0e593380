use crate::{AnalysisConfig, EvidenceItem, EvidenceTag, TextRegion};

const LOW_COVERAGE_POINTS: u32 = 15;

pub struct TextCoverageAnalyzer {
    coverage_floor: f64,
    confidence_floor: f64,
}

impl TextCoverageAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            coverage_floor: config.coverage_floor,
            confidence_floor: config.confidence_floor,
        }
    }

    /// Ratio of confident text area to image area. A certificate that OCR can
    /// barely read is a candidate for wholesale erasure. None when no text
    /// regions exist at all.
    pub fn analyze(
        &self,
        dimensions: (u32, u32),
        regions: &[TextRegion],
    ) -> Option<EvidenceItem> {
        if regions.is_empty() {
            return None;
        }

        let (width, height) = dimensions;
        let image_area = (width as f64) * (height as f64);
        if image_area == 0.0 {
            return None;
        }

        let text_area: f64 = regions
            .iter()
            .filter(|r| r.confidence > self.confidence_floor)
            .map(TextRegion::area)
            .sum();
        let coverage = text_area / image_area;

        Some(if coverage < self.coverage_floor {
            EvidenceItem::scored(
                EvidenceTag::TextCoverage,
                LOW_COVERAGE_POINTS,
                format!("low text coverage: {coverage:.3} (possible erasures)"),
            )
        } else {
            EvidenceItem::informational(
                EvidenceTag::TextCoverage,
                format!("text coverage: {coverage:.3}"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> TextCoverageAnalyzer {
        TextCoverageAnalyzer::new(&AnalysisConfig::default())
    }

    fn region(w: f64, h: f64, confidence: f64) -> TextRegion {
        TextRegion::axis_aligned(0.0, 0.0, w, h, "x".to_string(), confidence)
    }

    #[test]
    fn no_regions_is_skipped() {
        assert!(analyzer().analyze((100, 100), &[]).is_none());
    }

    #[test]
    fn sparse_text_is_flagged() {
        let regions = vec![region(10.0, 10.0, 0.9)];
        let item = analyzer().analyze((1000, 1000), &regions).unwrap();
        assert_eq!(item.contribution, LOW_COVERAGE_POINTS);
        assert!(item.detail.starts_with("low text coverage"));
    }

    #[test]
    fn dense_text_is_informational() {
        let regions = vec![region(400.0, 300.0, 0.9)];
        let item = analyzer().analyze((1000, 1000), &regions).unwrap();
        assert_eq!(item.contribution, 0);
        assert!(item.detail.starts_with("text coverage"));
    }

    #[test]
    fn low_confidence_regions_do_not_count_toward_coverage() {
        let regions = vec![region(400.0, 300.0, 0.4)];
        let item = analyzer().analyze((1000, 1000), &regions).unwrap();
        assert_eq!(item.contribution, LOW_COVERAGE_POINTS);
    }
}
