// Export module - render an AnalysisResult as a downloadable document

pub mod pdf;
pub mod spreadsheet;
pub mod text;

use std::str::FromStr;

use crate::models::AnalysisResult;

pub const DEFAULT_FILE_STEM: &str = "Medical_Report";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("PDF rendering failed: {0}")]
    Pdf(String),

    #[error("spreadsheet rendering failed: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Text,
    Spreadsheet,
    Pdf,
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "txt" | "text" => Ok(ExportFormat::Text),
            "xlsx" | "excel" => Ok(ExportFormat::Spreadsheet),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Text => "text/plain; charset=utf-8",
            ExportFormat::Spreadsheet => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Pdf => "application/pdf",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Text => "txt",
            ExportFormat::Spreadsheet => "xlsx",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn render(&self, result: &AnalysisResult) -> Result<Vec<u8>, ExportError> {
        match self {
            ExportFormat::Text => Ok(text::render_text(result).into_bytes()),
            ExportFormat::Spreadsheet => spreadsheet::render_workbook(result),
            ExportFormat::Pdf => pdf::render_pdf(result),
        }
    }
}

/// Build a Content-Disposition safe file name. Anything outside
/// `[A-Za-z0-9._-]` becomes `_`; a trailing extension for this format is
/// not doubled.
pub fn export_file_name(stem: Option<&str>, format: ExportFormat) -> String {
    let raw = stem.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(DEFAULT_FILE_STEM);
    let dotted = format!(".{}", format.extension());
    let raw = if raw.to_ascii_lowercase().ends_with(&dotted) {
        &raw[..raw.len() - dotted.len()]
    } else {
        raw
    };

    let sanitized: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_matches(|c| c == '.' || c == '_');

    let stem = if sanitized.is_empty() {
        DEFAULT_FILE_STEM
    } else {
        sanitized
    };
    format!("{}.{}", stem, format.extension())
}
