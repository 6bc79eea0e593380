use image::DynamicImage;

use crate::analysis::coverage::TextCoverageAnalyzer;
use crate::analysis::edge_text::EdgeTextAnalyzer;
use crate::analysis::ela::ElaAnalyzer;
use crate::analysis::frequency::FrequencyAnalyzer;
use crate::analysis::noise::NoiseVarianceAnalyzer;
use crate::analysis::structure::StructuralTextAnalyzer;
use crate::analysis::table_cells::TableCellAnalyzer;
use crate::metadata::exif::MetadataInspector;
use crate::ocr::OcrEngine;
use crate::preprocess::Preprocessed;
use crate::{AnalysisConfig, EvidenceItem, EvidenceTag, TamperingReport, TextRegion, Verdict};

/// Runs every detector in fixed order against one preprocessed image and
/// folds their evidence into a report. Detector failures degrade to a zero
/// contribution plus a diagnostic evidence entry; nothing here is fatal.
pub struct ScoreAggregator<'a> {
    config: &'a AnalysisConfig,
    engine: &'a OcrEngine,
}

impl<'a> ScoreAggregator<'a> {
    pub fn new(config: &'a AnalysisConfig, engine: &'a OcrEngine) -> Self {
        Self { config, engine }
    }

    pub fn score(
        &self,
        original: &DynamicImage,
        pre: &Preprocessed,
        raw_bytes: &[u8],
    ) -> TamperingReport {
        let mut evidence: Vec<EvidenceItem> = Vec::new();

        // 1. Authoring-software metadata.
        evidence.push(MetadataInspector::inspect(raw_bytes));

        // 2. Recompression residual; its score doubles as the gate for the
        // frequency detector.
        let ela_score = match ElaAnalyzer::new(self.config).analyze(original) {
            Ok(outcome) => {
                evidence.push(outcome.evidence);
                Some(outcome.score)
            }
            Err(err) => {
                evidence.push(EvidenceItem::informational(
                    EvidenceTag::ErrorLevel,
                    format!("ELA error: {err}"),
                ));
                None
            }
        };

        // 3. Localized smoothness anomalies. Silent on images too small to
        // produce patches.
        if let Some(item) = NoiseVarianceAnalyzer::new(self.config).analyze(&pre.gray) {
            evidence.push(item);
        }

        // 4. High-frequency spectral energy.
        match FrequencyAnalyzer::new(self.config).analyze(&pre.gray, ela_score) {
            Ok(item) => evidence.push(item),
            Err(err) => evidence.push(EvidenceItem::informational(
                EvidenceTag::Frequency,
                format!("DCT error: {err}"),
            )),
        }

        // One OCR pass shared by the remaining text-aware detectors.
        let regions: Option<Vec<TextRegion>> = match self.engine.recognize(&pre.gray) {
            Ok(regions) => Some(regions),
            Err(err) => {
                log::warn!("text recognition failed: {err}");
                evidence.push(EvidenceItem::informational(
                    EvidenceTag::Recognition,
                    format!("text recognition error: {err}"),
                ));
                None
            }
        };

        // 5. + 6. Edge density against text coverage, and low-variance text
        // patches.
        if let Some(regions) = regions.as_deref() {
            evidence.extend(EdgeTextAnalyzer::new(self.config).analyze(&pre.gray, regions));
        }

        // 7. Empty table cells.
        evidence.push(TableCellAnalyzer::new(self.config).analyze(
            &pre.gray,
            &pre.mask,
            self.engine,
        ));

        // 8. Structural text layout.
        if let Some(regions) = regions.as_deref() {
            evidence.extend(StructuralTextAnalyzer::new(self.config).analyze(regions));
        }

        // 9. Text coverage.
        if let Some(regions) = regions.as_deref() {
            if let Some(item) =
                TextCoverageAnalyzer::new(self.config).analyze(pre.gray.dimensions(), regions)
            {
                evidence.push(item);
            }
        }

        let report = TamperingReport::from_evidence(evidence, self.config.authentic_cutoff);
        if report.verdict == Verdict::Suspicious {
            log::info!("tampering analysis: {}", report.render());
        }
        report
    }
}
