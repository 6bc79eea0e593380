use image::GrayImage;
use parking_lot::Mutex;

use crate::TextRegion;
use crate::error::Result;

/// External text-recognition capability. Implementations return one region
/// per recognized word/fragment with a confidence in [0, 1].
pub trait TextRecognizer: Send {
    fn recognize(&mut self, image: &GrayImage) -> Result<Vec<TextRegion>>;
}

/// Process-wide OCR engine. Constructed once and shared read-only across all
/// analyzed images; the underlying engine is not safe for unsynchronized
/// concurrent use, so every call serializes through the lock.
pub struct OcrEngine {
    inner: Mutex<Box<dyn TextRecognizer>>,
}

impl OcrEngine {
    pub fn new(recognizer: Box<dyn TextRecognizer>) -> Self {
        Self {
            inner: Mutex::new(recognizer),
        }
    }

    pub fn recognize(&self, image: &GrayImage) -> Result<Vec<TextRegion>> {
        self.inner.lock().recognize(image)
    }
}

/// Word-level rows of Tesseract's TSV output (level 5): bounding box in
/// columns 6-9, confidence in column 10, text in column 11.
pub fn parse_tesseract_tsv(tsv: &str) -> Vec<TextRegion> {
    tsv.lines()
        .filter_map(|line| {
            let columns: Vec<&str> = line.split('\t').collect();
            if columns.len() < 12 || columns[0] != "5" {
                return None;
            }

            let left: f64 = columns[6].parse().ok()?;
            let top: f64 = columns[7].parse().ok()?;
            let width: f64 = columns[8].parse().ok()?;
            let height: f64 = columns[9].parse().ok()?;
            let confidence: f64 = columns[10].parse().ok()?;
            if confidence < 0.0 {
                return None;
            }

            Some(TextRegion::axis_aligned(
                left,
                top,
                width,
                height,
                columns[11].to_string(),
                confidence / 100.0,
            ))
        })
        .collect()
}

#[cfg(feature = "tesseract")]
pub use tesseract::TesseractRecognizer;

#[cfg(feature = "tesseract")]
mod tesseract {
    use std::io::Cursor;

    use image::GrayImage;
    use leptess::LepTess;

    use super::{TextRecognizer, parse_tesseract_tsv};
    use crate::TextRegion;
    use crate::error::{ForensicsError, Result};

    /// Tesseract-backed recognizer via leptess.
    pub struct TesseractRecognizer {
        engine: LepTess,
    }

    impl TesseractRecognizer {
        pub fn new() -> Result<Self> {
            let engine = LepTess::new(None, "eng")
                .map_err(|e| ForensicsError::Recognition(e.to_string()))?;
            Ok(Self { engine })
        }
    }

    impl TextRecognizer for TesseractRecognizer {
        fn recognize(&mut self, image: &GrayImage) -> Result<Vec<TextRegion>> {
            let mut png = Vec::new();
            image.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;

            self.engine
                .set_image_from_mem(&png)
                .map_err(|e| ForensicsError::Recognition(e.to_string()))?;

            let tsv = self
                .engine
                .get_tsv_text(0)
                .map_err(|e| ForensicsError::Recognition(e.to_string()))?;

            Ok(parse_tesseract_tsv(&tsv))
        }
    }
}
