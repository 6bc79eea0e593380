//! End-to-end scenarios over the full scoring pipeline, driven by a
//! deterministic scripted recognizer.

use std::io::Cursor;

use document_forensics::error::Result as ForensicsResult;
use document_forensics::ocr::TextRecognizer;
use document_forensics::{EvidenceTag, TamperingAnalyzer, TextRegion, Verdict};
use image::{DynamicImage, GrayImage, ImageFormat, Rgb, RgbImage};

/// Recognizer that never finds text.
struct SilentRecognizer;

impl TextRecognizer for SilentRecognizer {
    fn recognize(&mut self, _image: &GrayImage) -> ForensicsResult<Vec<TextRegion>> {
        Ok(Vec::new())
    }
}

/// Recognizer returning a fixed script for the full-page pass and nothing
/// for sub-region (table cell) passes, keyed on image size.
struct ScriptedRecognizer {
    page_width: u32,
    regions: Vec<TextRegion>,
}

impl TextRecognizer for ScriptedRecognizer {
    fn recognize(&mut self, image: &GrayImage) -> ForensicsResult<Vec<TextRegion>> {
        if image.width() == self.page_width {
            Ok(self.regions.clone())
        } else {
            Ok(Vec::new())
        }
    }
}

fn png_bytes(image: &RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Baseline JPEG with an APP1 EXIF segment carrying the given Software tag,
/// spliced in right after the start-of-image marker.
fn jpeg_with_software(image: &RgbImage, software: &str) -> Vec<u8> {
    let mut jpeg = Vec::new();
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
        .unwrap();

    let field = exif::Field {
        tag: exif::Tag::Software,
        ifd_num: exif::In::PRIMARY,
        value: exif::Value::Ascii(vec![software.as_bytes().to_vec()]),
    };
    let mut writer = exif::experimental::Writer::new();
    writer.push_field(&field);
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();

    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(&tiff.into_inner());

    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

#[test]
fn blank_white_page_is_fully_trusted() {
    let page = RgbImage::from_pixel(500, 500, Rgb([255, 255, 255]));
    let analyzer = TamperingAnalyzer::new(Box::new(SilentRecognizer));

    let report = analyzer.analyze_bytes(&png_bytes(&page)).unwrap();

    assert_eq!(report.tampering_score, 0);
    assert_eq!(report.trust_score, 100);
    assert_eq!(report.verdict, Verdict::Authentic);
    assert_eq!(report.render(), "authentic certificate (Score: 100/100)");
}

#[test]
fn gimp_tag_and_pasted_square_turn_suspicious() {
    let mut page = RgbImage::from_pixel(500, 500, Rgb([255, 255, 255]));
    for y in 200..250 {
        for x in 200..250 {
            page.put_pixel(x, y, Rgb([0, 0, 0]));
        }
    }
    let bytes = jpeg_with_software(&page, "GIMP");
    let analyzer = TamperingAnalyzer::new(Box::new(SilentRecognizer));

    let report = analyzer.analyze_bytes(&bytes).unwrap();

    let metadata = report
        .evidence
        .iter()
        .find(|e| e.tag == EvidenceTag::Metadata)
        .expect("metadata evidence");
    assert_eq!(metadata.contribution, 20);
    assert_eq!(metadata.detail, "editing software detected: GIMP");
    assert_eq!(report.verdict, Verdict::Suspicious);
    assert!(!report.evidence.is_empty());
    assert!(report.render().contains("editing software detected: GIMP"));
}

#[test]
fn photoshop_tag_adds_exactly_twenty() {
    let page = RgbImage::from_pixel(120, 120, Rgb([255, 255, 255]));
    let bytes = jpeg_with_software(&page, "Adobe Photoshop 2024");
    let analyzer = TamperingAnalyzer::new(Box::new(SilentRecognizer));

    let report = analyzer.analyze_bytes(&bytes).unwrap();

    let metadata = report
        .evidence
        .iter()
        .find(|e| e.tag == EvidenceTag::Metadata)
        .unwrap();
    assert_eq!(metadata.contribution, 20);
    assert!(metadata.detail.contains("editing software detected"));
    assert!(metadata.detail.contains("Adobe Photoshop 2024"));
}

#[test]
fn uniform_noise_raises_no_statistical_flags() {
    // Deterministic xorshift noise around mid-gray.
    let mut state = 0x2545f4914f6cdd1du64;
    let mut noise = || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state >> 56) as u8
    };
    let mut page = RgbImage::new(300, 300);
    for y in 0..300 {
        for x in 0..300 {
            let v = 96 + (noise() % 64);
            page.put_pixel(x, y, Rgb([v, v, v]));
        }
    }
    let analyzer = TamperingAnalyzer::new(Box::new(SilentRecognizer));

    let report = analyzer.analyze_bytes(&png_bytes(&page)).unwrap();

    for tag in [
        EvidenceTag::Metadata,
        EvidenceTag::NoiseVariance,
        EvidenceTag::Frequency,
    ] {
        let item = report
            .evidence
            .iter()
            .find(|e| e.tag == tag)
            .unwrap_or_else(|| panic!("missing evidence for {tag:?}"));
        assert_eq!(item.contribution, 0, "unexpected contribution from {tag:?}");
    }
}

#[test]
fn identical_bytes_produce_identical_reports() {
    let mut page = RgbImage::from_pixel(160, 120, Rgb([235, 235, 235]));
    for y in 30..40 {
        for x in 20..140 {
            page.put_pixel(x, y, Rgb([30, 30, 30]));
        }
    }
    for y in 60..70 {
        for x in 20..100 {
            page.put_pixel(x, y, Rgb([30, 30, 30]));
        }
    }
    let bytes = png_bytes(&page);

    // Scripted text over the upscaled page; sub-region passes see nothing.
    let make_analyzer = || {
        TamperingAnalyzer::new(Box::new(ScriptedRecognizer {
            page_width: 320,
            regions: vec![
                TextRegion::axis_aligned(40.0, 60.0, 240.0, 20.0, "certificate".into(), 0.93),
                TextRegion::axis_aligned(40.0, 120.0, 160.0, 20.0, "of merit".into(), 0.88),
            ],
        }))
    };

    let first = make_analyzer().analyze_bytes(&bytes).unwrap();
    let second = make_analyzer().analyze_bytes(&bytes).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.render(), second.render());
}

#[test]
fn corrupt_bytes_fail_to_load() {
    let analyzer = TamperingAnalyzer::new(Box::new(SilentRecognizer));
    assert!(analyzer.analyze_bytes(&[0u8; 16]).is_err());
    assert!(analyzer.analyze_bytes(&[]).is_err());
}

#[test]
fn batch_run_skips_unreadable_files_and_sorts_entries() {
    let dir = tempfile::tempdir().unwrap();
    let good = RgbImage::from_pixel(60, 60, Rgb([255, 255, 255]));
    std::fs::write(dir.path().join("b_scan.png"), png_bytes(&good)).unwrap();
    std::fs::write(dir.path().join("a_scan.png"), png_bytes(&good)).unwrap();
    std::fs::write(dir.path().join("broken.jpg"), b"not really a jpeg").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let analyzer = TamperingAnalyzer::new(Box::new(SilentRecognizer));
    let reports = analyzer.analyze_directory(dir.path()).unwrap();

    let files: Vec<&str> = reports.iter().map(|r| r.file.as_str()).collect();
    assert_eq!(files, vec!["a_scan.png", "b_scan.png"]);
    assert!(reports.iter().all(|r| r.report.verdict == Verdict::Authentic));
}
