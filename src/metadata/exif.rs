use std::io::Cursor;

use crate::error::{ForensicsError, Result};
use crate::{EvidenceItem, EvidenceTag};

/// Authoring tools whose presence in the EXIF Software tag marks an image as
/// having passed through an editor.
const EDITING_TOOLS: [&str; 6] = [
    "photoshop",
    "gimp",
    "paint",
    "adobe",
    "corel",
    "illustrator",
];

const EDITING_SOFTWARE_POINTS: u32 = 20;

pub struct MetadataInspector;

impl MetadataInspector {
    /// Inspects the authoring-software tag of the raw (pre-preprocessing)
    /// file bytes. WebP and PNG inputs carry the tag differently or not at
    /// all and are skipped. Read failures degrade to "no EXIF data" and are
    /// never fatal.
    pub fn inspect(bytes: &[u8]) -> EvidenceItem {
        if is_skipped_format(bytes) {
            return EvidenceItem::informational(EvidenceTag::Metadata, "no EXIF data");
        }

        match Self::read_software(bytes) {
            Ok(Some(software)) if !software.is_empty() => Self::classify(&software),
            Ok(Some(_)) | Ok(None) => {
                EvidenceItem::informational(EvidenceTag::Metadata, "no software tag")
            }
            Err(err) => {
                log::debug!("EXIF read error: {err}");
                EvidenceItem::informational(EvidenceTag::Metadata, "no EXIF data")
            }
        }
    }

    pub fn classify(software: &str) -> EvidenceItem {
        let lower = software.to_lowercase();
        if EDITING_TOOLS.iter().any(|tool| lower.contains(tool)) {
            EvidenceItem::scored(
                EvidenceTag::Metadata,
                EDITING_SOFTWARE_POINTS,
                format!("editing software detected: {software}"),
            )
        } else {
            EvidenceItem::informational(
                EvidenceTag::Metadata,
                format!("software: {software} (non-suspicious)"),
            )
        }
    }

    fn read_software(bytes: &[u8]) -> Result<Option<String>> {
        let mut reader = Cursor::new(bytes);
        let exif_data = exif::Reader::new()
            .read_from_container(&mut reader)
            .map_err(|e| ForensicsError::Metadata(e.to_string()))?;

        Ok(exif_data
            .get_field(exif::Tag::Software, exif::In::PRIMARY)
            .map(|field| match &field.value {
                exif::Value::Ascii(values) => values
                    .first()
                    .map(|v| {
                        String::from_utf8_lossy(v)
                            .trim_end_matches('\0')
                            .to_string()
                    })
                    .unwrap_or_default(),
                _ => field.display_value().to_string(),
            }))
    }
}

fn is_skipped_format(bytes: &[u8]) -> bool {
    matches!(
        image::guess_format(bytes),
        Ok(image::ImageFormat::WebP | image::ImageFormat::Png)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editing_software_scores_twenty() {
        let item = MetadataInspector::classify("Adobe Photoshop 2024");
        assert_eq!(item.contribution, 20);
        assert!(item.detail.contains("editing software detected"));
    }

    #[test]
    fn unknown_software_is_informational() {
        let item = MetadataInspector::classify("Epson Scan 2");
        assert_eq!(item.contribution, 0);
        assert!(item.detail.contains("non-suspicious"));
    }

    #[test]
    fn signature_match_is_case_insensitive() {
        assert_eq!(MetadataInspector::classify("GIMP 2.10").contribution, 20);
        assert_eq!(MetadataInspector::classify("CorelDRAW").contribution, 20);
    }

    #[test]
    fn unreadable_bytes_degrade_to_no_exif() {
        let item = MetadataInspector::inspect(b"not an image at all");
        assert_eq!(item.contribution, 0);
        assert_eq!(item.detail, "no EXIF data");
    }

    #[test]
    fn png_input_is_skipped() {
        let png_magic = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0];
        let item = MetadataInspector::inspect(&png_magic);
        assert_eq!(item.detail, "no EXIF data");
    }
}
