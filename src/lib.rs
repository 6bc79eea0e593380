use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::ocr::{OcrEngine, TextRecognizer};
use crate::preprocess::ImagePreprocessor;
use crate::scoring::ScoreAggregator;

pub mod analysis;
pub mod error;
pub mod image_utils;
pub mod metadata;
pub mod ocr;
pub mod preprocess;
pub mod report;
pub mod scoring;

/// Image extensions accepted for analysis, matched case-insensitively.
pub const VALID_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "tiff"];

pub fn has_valid_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            VALID_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PointF {
    pub x: f64,
    pub y: f64,
}

/// One recognized text fragment: corner points in top-left, top-right,
/// bottom-right, bottom-left order, the recognized string, and a confidence
/// in [0, 1]. Produced once per image and shared read-only across detectors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextRegion {
    pub quad: [PointF; 4],
    pub text: String,
    pub confidence: f64,
}

impl TextRegion {
    pub fn axis_aligned(x: f64, y: f64, width: f64, height: f64, text: String, confidence: f64) -> Self {
        Self {
            quad: [
                PointF { x, y },
                PointF { x: x + width, y },
                PointF { x: x + width, y: y + height },
                PointF { x, y: y + height },
            ],
            text,
            confidence,
        }
    }

    pub fn width(&self) -> f64 {
        self.quad[2].x - self.quad[0].x
    }

    pub fn height(&self) -> f64 {
        self.quad[2].y - self.quad[0].y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn vertical_center(&self) -> f64 {
        (self.quad[0].y + self.quad[2].y) / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EvidenceTag {
    Metadata,
    ErrorLevel,
    NoiseVariance,
    Frequency,
    EdgeDensity,
    TextVariance,
    TableCells,
    LineSpacing,
    GlyphWidths,
    OcrConfidence,
    TextCoverage,
    Recognition,
}

/// One detector's structured justification: the tag, the points it added to
/// the tampering score (0 when purely informational), and the detail string
/// rendered at the reporting boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceItem {
    pub tag: EvidenceTag,
    pub contribution: u32,
    pub detail: String,
}

impl EvidenceItem {
    pub fn scored(tag: EvidenceTag, contribution: u32, detail: impl Into<String>) -> Self {
        Self {
            tag,
            contribution,
            detail: detail.into(),
        }
    }

    pub fn informational(tag: EvidenceTag, detail: impl Into<String>) -> Self {
        Self {
            tag,
            contribution: 0,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Authentic,
    Suspicious,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Authentic => write!(f, "authentic certificate"),
            Verdict::Suspicious => write!(f, "suspicious"),
        }
    }
}

/// Per-image scoring outcome. The tampering score is an unbounded
/// accumulator and the trust score its signed complement; neither is
/// clamped to [0, 100].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TamperingReport {
    pub tampering_score: u32,
    pub trust_score: i64,
    pub verdict: Verdict,
    pub evidence: Vec<EvidenceItem>,
}

impl TamperingReport {
    pub fn from_evidence(evidence: Vec<EvidenceItem>, authentic_cutoff: i64) -> Self {
        let tampering_score: u32 = evidence.iter().map(|e| e.contribution).sum();
        let trust_score = 100 - tampering_score as i64;
        let verdict = if trust_score > authentic_cutoff {
            Verdict::Authentic
        } else {
            Verdict::Suspicious
        };

        Self {
            tampering_score,
            trust_score,
            verdict,
            evidence,
        }
    }

    /// Textual form: `<verdict> (Score: <trust>/100)`, with the joined
    /// evidence appended only on the suspicious branch.
    pub fn render(&self) -> String {
        match self.verdict {
            Verdict::Authentic => format!("{} (Score: {}/100)", self.verdict, self.trust_score),
            Verdict::Suspicious => {
                let details: Vec<&str> = self.evidence.iter().map(|e| e.detail.as_str()).collect();
                format!(
                    "{} (Score: {}/100) - {}",
                    self.verdict,
                    self.trust_score,
                    details.join("; ")
                )
            }
        }
    }
}

/// One entry of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: String,
    pub report: TamperingReport,
}

/// Empirical detector thresholds. Kept as configuration so they can be
/// calibrated without touching detector code.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub ela_quality: u8,
    pub ela_threshold: f64,
    pub ela_frequency_gate: f64,
    pub noise_patch_size: usize,
    pub noise_stride: usize,
    pub noise_outlier_ratio: f64,
    pub hf_energy_threshold: f64,
    pub canny_low: f32,
    pub canny_high: f32,
    pub edge_density_factor: f64,
    pub confidence_floor: f64,
    pub region_variance_floor: f64,
    pub min_structural_regions: usize,
    pub spacing_deviation: f64,
    pub width_deviation: f64,
    pub confidence_deviation: f64,
    pub coverage_floor: f64,
    pub table_margin_ratio: f64,
    pub authentic_cutoff: i64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            ela_quality: 90,
            ela_threshold: 45.0,
            ela_frequency_gate: 30.0,
            noise_patch_size: 10,
            noise_stride: 5,
            noise_outlier_ratio: 0.05,
            hf_energy_threshold: 0.005,
            canny_low: 50.0,
            canny_high: 150.0,
            edge_density_factor: 0.015,
            confidence_floor: 0.5,
            region_variance_floor: 12.0,
            min_structural_regions: 5,
            spacing_deviation: 25.0,
            width_deviation: 30.0,
            confidence_deviation: 0.20,
            coverage_floor: 0.025,
            table_margin_ratio: 0.15,
            authentic_cutoff: 90,
        }
    }
}

/// Entry point for scoring document images. Holds the process-wide OCR
/// engine, the preprocessor, and the detector configuration.
pub struct TamperingAnalyzer {
    engine: Arc<OcrEngine>,
    preprocessor: ImagePreprocessor,
    config: AnalysisConfig,
}

impl TamperingAnalyzer {
    pub fn new(recognizer: Box<dyn TextRecognizer>) -> Self {
        Self::with_engine(Arc::new(OcrEngine::new(recognizer)))
    }

    pub fn with_engine(engine: Arc<OcrEngine>) -> Self {
        Self {
            engine,
            preprocessor: ImagePreprocessor::new(),
            config: AnalysisConfig::default(),
        }
    }

    #[cfg(feature = "tesseract")]
    pub fn with_tesseract() -> Result<Self> {
        let recognizer = crate::ocr::TesseractRecognizer::new()?;
        Ok(Self::new(Box::new(recognizer)))
    }

    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Scores a single in-memory image. Fails only when the bytes do not
    /// decode; every detector failure past that point degrades into the
    /// report's evidence.
    pub fn analyze_bytes(&self, bytes: &[u8]) -> Result<TamperingReport> {
        let original = image::load_from_memory(bytes)?;
        let pre = self.preprocessor.process(&original);
        Ok(ScoreAggregator::new(&self.config, &self.engine).score(&original, &pre, bytes))
    }

    pub fn analyze_path<P: AsRef<Path>>(&self, path: P) -> Result<TamperingReport> {
        let bytes = fs::read(path)?;
        self.analyze_bytes(&bytes)
    }

    /// Scores every accepted image directly under `dir`, in sorted order. A
    /// file that fails to load is logged and excluded; the batch continues.
    pub fn analyze_directory<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<FileReport>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && has_valid_extension(path))
            .collect();
        paths.sort();

        let mut reports = Vec::new();
        for path in paths {
            let file = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            log::info!("processing {file}...");

            match self.analyze_path(&path) {
                Ok(report) => reports.push(FileReport { file, report }),
                Err(err) => log::error!("skipping {file}: {err}"),
            }
        }

        Ok(reports)
    }
}
