use serde::Serialize;

use crate::FileReport;

/// One tabular row of a batch report, in the `File / Tampering Status /
/// Score / Details` layout consumed by external writers. Persistence itself
/// lives outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub file: String,
    pub status: String,
    pub score: String,
    pub details: String,
}

impl ReportRow {
    /// Splits a rendered report line back into columns: the status before
    /// `" (Score: "`, then the score and the joined details around the
    /// `"/100) - "` separator (absent on the authentic branch).
    pub fn parse(file: &str, rendered: &str) -> Option<Self> {
        let (status, rest) = rendered.split_once(" (Score: ")?;
        let (score, details) = match rest.split_once("/100) - ") {
            Some((score, details)) => (score, details),
            None => (rest.strip_suffix("/100)")?, ""),
        };

        Some(Self {
            file: file.to_string(),
            status: status.to_string(),
            score: score.to_string(),
            details: details.to_string(),
        })
    }
}

pub fn rows(reports: &[FileReport]) -> Vec<ReportRow> {
    reports
        .iter()
        .filter_map(|entry| ReportRow::parse(&entry.file, &entry.report.render()))
        .collect()
}

pub fn to_json(reports: &[FileReport]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(reports)
}
