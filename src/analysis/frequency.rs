use image::GrayImage;
use ndarray::{Array2, s};
use rustdct::DctPlanner;

use crate::error::{ForensicsError, Result};
use crate::image_utils::gray_to_array;
use crate::{AnalysisConfig, EvidenceItem, EvidenceTag};

const LOW_HF_POINTS: u32 = 15;

/// Below this mean AC magnitude the spectrum is considered featureless (a
/// flat image), which carries no smoothing signal to score.
const MIN_SPECTRAL_ACTIVITY: f64 = 1e-9;

pub struct FrequencyAnalyzer {
    hf_energy_threshold: f64,
    ela_gate: f64,
}

impl FrequencyAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            hf_energy_threshold: config.hf_energy_threshold,
            ela_gate: config.ela_frequency_gate,
        }
    }

    /// Measures high-frequency energy in the orthonormal 2D DCT of the
    /// grayscale image: the band spanning the first quarter of rows and the
    /// last quarter of columns. `ela_score` is the cross-detector gate from
    /// error level analysis; low high-frequency energy is only suspicious
    /// when the compression residual is low as well.
    pub fn analyze(&self, gray: &GrayImage, ela_score: Option<f64>) -> Result<EvidenceItem> {
        let ela_score = ela_score
            .ok_or_else(|| ForensicsError::Detector("missing ELA score for frequency gate".into()))?;

        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return Err(ForensicsError::Detector("empty grayscale image".into()));
        }

        let mut spectrum = gray_to_array(gray);
        spectrum.mapv_inplace(|v| v / 255.0);
        dct2(&mut spectrum);

        let (rows, cols) = spectrum.dim();
        let band_rows = rows / 4;
        let band_cols = cols / 4;

        let coefficients = (rows * cols) as f64;
        let ac_energy = if coefficients > 1.0 {
            (spectrum.iter().map(|v| v.abs()).sum::<f64>() - spectrum[[0, 0]].abs())
                / (coefficients - 1.0)
        } else {
            0.0
        };

        let hf_energy = if band_rows == 0 || band_cols == 0 {
            0.0
        } else {
            let band = spectrum.slice(s![..band_rows, cols - band_cols..]);
            band.iter().map(|v| v.abs()).sum::<f64>() / (band_rows * band_cols) as f64
        };

        let suspicious = hf_energy < self.hf_energy_threshold
            && ac_energy > MIN_SPECTRAL_ACTIVITY
            && ela_score < self.ela_gate;

        let item = if suspicious {
            EvidenceItem::scored(
                EvidenceTag::Frequency,
                LOW_HF_POINTS,
                "very low high-frequency energy in DCT (possible smoothing)",
            )
        } else {
            EvidenceItem::informational(
                EvidenceTag::Frequency,
                format!("normal HF energy: {hf_energy:.4}"),
            )
        };

        Ok(item)
    }
}

/// In-place orthonormal 2D DCT-II (rows then columns).
fn dct2(data: &mut Array2<f64>) {
    let (rows, cols) = data.dim();
    let mut planner = DctPlanner::new();

    let row_transform = planner.plan_dct2(cols);
    let mut buffer = vec![0.0f64; cols];
    let scale_first = (1.0 / cols as f64).sqrt();
    let scale_rest = (2.0 / cols as f64).sqrt();
    for mut row in data.rows_mut() {
        for (slot, value) in buffer.iter_mut().zip(row.iter()) {
            *slot = *value;
        }
        row_transform.process_dct2(&mut buffer);
        for (index, (target, value)) in row.iter_mut().zip(buffer.iter()).enumerate() {
            let scale = if index == 0 { scale_first } else { scale_rest };
            *target = value * scale;
        }
    }

    let col_transform = planner.plan_dct2(rows);
    let mut buffer = vec![0.0f64; rows];
    let scale_first = (1.0 / rows as f64).sqrt();
    let scale_rest = (2.0 / rows as f64).sqrt();
    for mut col in data.columns_mut() {
        for (slot, value) in buffer.iter_mut().zip(col.iter()) {
            *slot = *value;
        }
        col_transform.process_dct2(&mut buffer);
        for (index, (target, value)) in col.iter_mut().zip(buffer.iter()).enumerate() {
            let scale = if index == 0 { scale_first } else { scale_rest };
            *target = value * scale;
        }
    }
}
