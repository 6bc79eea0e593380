use image::{GrayImage, Luma, imageops};
use imageproc::contours::find_contours;

use crate::error::Result;
use crate::ocr::OcrEngine;
use crate::{AnalysisConfig, EvidenceItem, EvidenceTag};

const MULTIPLE_EMPTY_POINTS: u32 = 35;
const SINGLE_EMPTY_POINTS: u32 = 10;

/// A candidate table cell recovered from the grid mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableCell {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub is_empty: bool,
}

impl TableCell {
    fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    fn overlap(&self, other: &TableCell) -> u64 {
        let dx = (self.x + self.width).min(other.x + other.width) as i64
            - self.x.max(other.x) as i64;
        let dy = (self.y + self.height).min(other.y + other.height) as i64
            - self.y.max(other.y) as i64;
        (dx.max(0) * dy.max(0)) as u64
    }
}

pub struct TableCellAnalyzer {
    margin_ratio: f64,
}

impl TableCellAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            margin_ratio: config.table_margin_ratio,
        }
    }

    /// Field-erasure check: recover the table grid from the binary mask and
    /// count interior cells whose OCR comes back blank. Any failure inside
    /// the detector degrades to (0 empty, 0 total).
    pub fn analyze(&self, gray: &GrayImage, mask: &GrayImage, engine: &OcrEngine) -> EvidenceItem {
        let (empty, total) = match self.count_empty_cells(gray, mask, engine) {
            Ok(counts) => counts,
            Err(err) => {
                log::warn!("table cell detection failed: {err}");
                (0, 0)
            }
        };

        match empty {
            n if n >= 2 => EvidenceItem::scored(
                EvidenceTag::TableCells,
                MULTIPLE_EMPTY_POINTS,
                format!("multiple empty table cells: {empty}/{total} (field erasures suspected)"),
            ),
            1 => EvidenceItem::scored(
                EvidenceTag::TableCells,
                SINGLE_EMPTY_POINTS,
                format!("single empty table cell: {empty}/{total}"),
            ),
            _ => EvidenceItem::informational(
                EvidenceTag::TableCells,
                format!("no empty table cells ({empty}/{total})"),
            ),
        }
    }

    fn count_empty_cells(
        &self,
        gray: &GrayImage,
        mask: &GrayImage,
        engine: &OcrEngine,
    ) -> Result<(usize, usize)> {
        let cells = self.detect_cells(gray, mask, engine)?;
        let empty = cells.iter().filter(|c| c.is_empty).count();
        Ok((empty, cells.len()))
    }

    fn detect_cells(
        &self,
        gray: &GrayImage,
        mask: &GrayImage,
        engine: &OcrEngine,
    ) -> Result<Vec<TableCell>> {
        let (width, height) = mask.dimensions();
        if width < 2 || height < 2 {
            return Ok(Vec::new());
        }

        // The mask keeps ink dark and background bright; line detection works
        // on the binarized ink foreground. Interpolation residue from the
        // upscale must not count as ink.
        let mut ink = GrayImage::new(width, height);
        for (x, y, pixel) in mask.enumerate_pixels() {
            let value = if pixel[0] < 128 { 255 } else { 0 };
            ink.put_pixel(x, y, Luma([value]));
        }

        let horizontal = morphological_open(&ink, (width / 20).max(1), 1, 2);
        let vertical = morphological_open(&ink, 1, (height / 20).max(1), 2);

        let mut grid = GrayImage::new(width, height);
        for (x, y, pixel) in grid.enumerate_pixels_mut() {
            let value = horizontal.get_pixel(x, y)[0].max(vertical.get_pixel(x, y)[0]);
            *pixel = Luma([value]);
        }

        let mut candidates: Vec<TableCell> = find_contours::<i32>(&grid)
            .into_iter()
            .filter_map(|contour| bounding_box(&contour.points))
            .filter(|&(_, _, w, h)| {
                w > width / 20 && w < width / 2 && h > height / 50 && h < height / 5
            })
            .map(|(x, y, w, h)| TableCell {
                x,
                y,
                width: w,
                height: h,
                is_empty: false,
            })
            .collect();

        // Greedy non-max suppression by descending area.
        candidates.sort_by(|a, b| b.area().cmp(&a.area()));
        let mut kept: Vec<TableCell> = Vec::new();
        for cell in candidates {
            let suppressed = kept
                .iter()
                .any(|existing| 2 * cell.overlap(existing) > cell.area());
            if !suppressed {
                kept.push(cell);
            }
        }

        let top_margin = height as f64 * self.margin_ratio;
        let bottom_margin = height as f64 * (1.0 - self.margin_ratio);
        for cell in kept.iter_mut() {
            // Header/footer band cells stay in the total but are never
            // evaluated for emptiness.
            if (cell.y as f64) < top_margin || (cell.y + cell.height) as f64 > bottom_margin {
                continue;
            }

            let patch = imageops::crop_imm(gray, cell.x, cell.y, cell.width, cell.height).to_image();
            if patch.is_empty() {
                continue;
            }

            let texts = engine.recognize(&patch)?;
            cell.is_empty = texts.iter().all(|t| t.text.trim().is_empty());
        }

        Ok(kept)
    }
}

/// Morphological opening with a rectangular kernel: `iterations` erosions
/// followed by the same number of dilations. Out-of-bounds samples never
/// shrink an erosion or grow a dilation.
fn morphological_open(image: &GrayImage, kernel_w: u32, kernel_h: u32, iterations: u32) -> GrayImage {
    let mut out = image.clone();
    for _ in 0..iterations {
        out = directional_filter(&out, kernel_w, kernel_h, false);
    }
    for _ in 0..iterations {
        out = directional_filter(&out, kernel_w, kernel_h, true);
    }
    out
}

fn directional_filter(image: &GrayImage, kernel_w: u32, kernel_h: u32, maximum: bool) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut out = GrayImage::new(width, height);
    let anchor_x = (kernel_w / 2) as i64;
    let anchor_y = (kernel_h / 2) as i64;

    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let mut value: Option<u8> = None;
            for ky in 0..kernel_h as i64 {
                let sy = y + ky - anchor_y;
                if sy < 0 || sy >= height as i64 {
                    continue;
                }
                for kx in 0..kernel_w as i64 {
                    let sx = x + kx - anchor_x;
                    if sx < 0 || sx >= width as i64 {
                        continue;
                    }
                    let sample = image.get_pixel(sx as u32, sy as u32)[0];
                    value = Some(match value {
                        Some(v) if maximum => v.max(sample),
                        Some(v) => v.min(sample),
                        None => sample,
                    });
                }
            }
            out.put_pixel(x as u32, y as u32, Luma([value.unwrap_or(0)]));
        }
    }

    out
}

fn bounding_box(points: &[imageproc::point::Point<i32>]) -> Option<(u32, u32, u32, u32)> {
    let first = points.first()?;
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    Some((
        min_x as u32,
        min_y as u32,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    ))
}
