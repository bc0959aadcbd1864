// PDF report (A4, builtin Helvetica)
//
// Builtin PDF fonts only cover Latin-1, so every string is reduced to ASCII
// before it is drawn. Layout is a simple cursor that moves down the page and
// starts a new page when it reaches the bottom margin.

use std::io::BufWriter;

use chrono::Utc;
use printpdf::{
    BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
};

use super::ExportError;
use crate::models::{AnalysisResult, DiseaseCode};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_LEFT: f32 = 18.0;
const MARGIN_TOP: f32 = 280.0;
const MARGIN_BOTTOM: f32 = 22.0;
const FOOTER_Y: f32 = 10.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN_LEFT;
const PT_TO_MM: f32 = 0.3528;
const MAX_TERMS: usize = 5;

const NOT_AVAILABLE: &str = "N/A";
const NON_ASCII_REMOVED: &str = "[Non-ASCII Text Removed]";

/// Reduce text to printable ASCII for the builtin fonts
pub fn sanitize(text: &str) -> String {
    if text.trim().is_empty() {
        return NOT_AVAILABLE.to_string();
    }
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii())
        .map(|c| if c.is_ascii_control() { ' ' } else { c })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        NON_ASCII_REMOVED.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Approximate Helvetica advance width in mm
fn text_width(text: &str, size: f32) -> f32 {
    let ems: f32 = text
        .chars()
        .map(|c| match c {
            'i' | 'j' | 'l' | '.' | ',' | '\'' | '|' | '!' | ':' | ';' => 0.25,
            ' ' | 'f' | 't' | 'r' | 'I' | '(' | ')' | '[' | ']' | '-' | '/' => 0.33,
            'm' | 'w' | 'M' | 'W' => 0.85,
            c if c.is_ascii_uppercase() => 0.68,
            _ => 0.56,
        })
        .sum();
    ems * size * PT_TO_MM
}

/// Greedy word wrap; words wider than the line are split
pub fn wrap(text: &str, max_width: f32, size: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if text_width(&candidate, size) <= max_width {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        for c in word.chars() {
            current.push(c);
            if text_width(&current, size) > max_width && current.chars().count() > 1 {
                current.pop();
                lines.push(std::mem::take(&mut current));
                current.push(c);
            }
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

struct PdfWriter {
    doc: PdfDocumentReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    layer: PdfLayerReference,
    pages: Vec<PdfLayerReference>,
    y: f32,
}

impl PdfWriter {
    fn new(title: &str) -> Result<Self, ExportError> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ExportError::Pdf(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ExportError::Pdf(e.to_string()))?;
        let layer = doc.get_page(page).get_layer(layer);

        Ok(Self {
            doc,
            regular,
            bold,
            pages: vec![layer.clone()],
            layer,
            y: MARGIN_TOP,
        })
    }

    fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.pages.push(self.layer.clone());
        self.y = MARGIN_TOP;
    }

    fn ensure_space(&mut self, needed: f32) {
        if self.y - needed < MARGIN_BOTTOM {
            self.new_page();
        }
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }

    /// Draw already-sanitized text, wrapping and breaking pages per line
    fn write(&mut self, text: &str, size: f32, bold: bool, indent: f32) {
        let line_height = size * PT_TO_MM * 1.45;
        let x = MARGIN_LEFT + indent;
        for line in wrap(text, CONTENT_WIDTH - indent, size) {
            self.ensure_space(line_height);
            self.y -= line_height;
            let font = if bold { &self.bold } else { &self.regular };
            self.layer.use_text(line, size, Mm(x), Mm(self.y), font);
        }
    }

    fn body(&mut self, text: &str) {
        self.write(&sanitize(text), 10.0, false, 0.0);
    }

    fn labelled(&mut self, label: &str, value: &str) {
        self.write(&format!("{}: {}", label, sanitize(value)), 10.0, false, 0.0);
    }

    fn heading(&mut self, title: &str) {
        self.ensure_space(30.0);
        self.gap(4.0);
        self.write(title, 13.0, true, 0.0);
        self.gap(2.0);
    }

    fn diagnosis(&mut self, code: &DiseaseCode, with_evidence: bool) {
        self.ensure_space(20.0);
        let name = if code.display_name().trim().is_empty() {
            NOT_AVAILABLE.to_string()
        } else {
            sanitize(code.display_name())
        };
        self.write(&format!("{} - {}", sanitize(&code.code), name), 10.0, true, 4.0);
        self.write(&format!("Priority: {}", code.priority.as_str()), 9.0, false, 4.0);
        if !code.description.trim().is_empty() {
            self.write("Description:", 9.0, true, 4.0);
            self.write(&sanitize(&code.description), 9.0, false, 8.0);
        }
        if with_evidence && !code.observed_features.is_empty() {
            self.write("Evidence:", 9.0, true, 4.0);
            for feature in &code.observed_features {
                self.write(&format!("- {}", sanitize(feature.label())), 9.0, false, 8.0);
            }
        }
        self.gap(2.0);
    }

    /// Stamp every page with the footer, then serialize
    fn finish(self, report_id: &str) -> Result<Vec<u8>, ExportError> {
        let generated = Utc::now().format("%Y-%m-%d").to_string();
        let total = self.pages.len();
        let report_id = sanitize(report_id);
        for (idx, layer) in self.pages.iter().enumerate() {
            let footer = [
                (format!("Generated: {}", generated), MARGIN_LEFT),
                (format!("Report ID: {}", report_id), 75.0),
                (format!("Page {} of {}", idx + 1, total), 165.0),
            ];
            for (text, x) in footer {
                layer.use_text(text, 8.0, Mm(x), Mm(FOOTER_Y), &self.regular);
            }
        }

        let mut writer = BufWriter::new(Vec::new());
        self.doc
            .save(&mut writer)
            .map_err(|e| ExportError::Pdf(e.to_string()))?;
        writer
            .into_inner()
            .map_err(|e| ExportError::Pdf(e.to_string()))
    }
}

fn layout(result: &AnalysisResult) -> Result<PdfWriter, ExportError> {
    let mut pdf = PdfWriter::new("Medical Image Analysis Report")?;

    pdf.write("MEDICAL IMAGE ANALYSIS REPORT", 18.0, true, 0.0);
    pdf.write("AI-assisted preliminary analysis", 10.0, false, 0.0);
    pdf.gap(4.0);

    let p = &result.patient_info;
    pdf.heading("PATIENT INFORMATION");
    pdf.labelled("Name", &p.name);
    pdf.labelled("Patient ID", &p.patient_id);
    pdf.write(
        &format!("Age/Gender: {} / {}", sanitize(&p.age), sanitize(&p.gender)),
        10.0,
        false,
        0.0,
    );

    let e = &result.exam_info;
    pdf.heading("EXAMINATION DETAILS");
    pdf.labelled("Study Type", &e.exam_type);
    pdf.labelled("Exam Date", &e.exam_date);
    pdf.labelled("Institution", &e.institution);

    pdf.heading("FINDINGS");
    if result.findings.is_empty() {
        pdf.body("");
    }
    for (idx, finding) in result.findings.iter().enumerate() {
        let category = if finding.category.trim().is_empty() {
            "General".to_string()
        } else {
            sanitize(&finding.category)
        };
        let status = match finding.is_normal {
            Some(true) => " (normal)",
            Some(false) => " (abnormal)",
            None => "",
        };
        pdf.write(&format!("{}. {}{}", idx + 1, category, status), 10.0, true, 0.0);
        pdf.write(&sanitize(&finding.description), 10.0, false, 4.0);
    }

    let i = &result.impression;
    pdf.heading("IMPRESSION");
    pdf.body(&i.summary);
    if !i.diagnosis.trim().is_empty() {
        pdf.labelled("Diagnosis", &i.diagnosis);
    }
    if !i.overall_severity.trim().is_empty() {
        pdf.labelled("Severity", &i.overall_severity);
    }

    pdf.heading("DIAGNOSIS (ICD-10 Codes)");
    pdf.write("Primary Diagnoses:", 10.0, true, 0.0);
    for code in &result.disease_codes.primary {
        pdf.diagnosis(code, true);
    }
    if !result.disease_codes.secondary.is_empty() {
        pdf.ensure_space(20.0);
        pdf.write("Secondary Diagnoses:", 10.0, true, 0.0);
        for code in &result.disease_codes.secondary {
            pdf.diagnosis(code, false);
        }
    }

    let tests = &result.recommendations.clinic_strategy.required_tests;
    pdf.heading("RECOMMENDED ADDITIONAL TESTS");
    for category in tests {
        pdf.ensure_space(15.0);
        pdf.write(&sanitize(&category.category), 10.0, true, 0.0);
        for test in &category.tests {
            let name = if test.display_name().trim().is_empty() {
                "Test".to_string()
            } else {
                sanitize(test.display_name())
            };
            pdf.write(&format!("- {}", name), 10.0, false, 4.0);
            if !test.reason.trim().is_empty() {
                pdf.write(&format!("Reason: {}", sanitize(&test.reason)), 8.0, false, 8.0);
            }
        }
        pdf.gap(2.0);
    }

    if !result.medical_terms.is_empty() {
        pdf.heading("MEDICAL TERMINOLOGY");
        for term in result.medical_terms.iter().take(MAX_TERMS) {
            pdf.ensure_space(15.0);
            let name = if term.term.trim().is_empty() {
                "Medical Term".to_string()
            } else {
                sanitize(&term.term)
            };
            pdf.write(&name, 10.0, true, 0.0);
            if !term.simple_explanation.trim().is_empty() {
                pdf.write(&sanitize(&term.simple_explanation), 9.0, false, 4.0);
            }
        }
    }

    pdf.heading("IMPORTANT DISCLAIMER");
    for line in result.disclaimer.english.lines().filter(|l| !l.trim().is_empty()) {
        if line.trim() == "IMPORTANT DISCLAIMER" {
            continue;
        }
        pdf.write(&sanitize(line), 9.0, false, 0.0);
    }

    Ok(pdf)
}

pub fn render_pdf(result: &AnalysisResult) -> Result<Vec<u8>, ExportError> {
    layout(result)?.finish(&result.report_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::report::Finding;
    use crate::models::Disclaimer;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize(""), "N/A");
        assert_eq!(sanitize("   "), "N/A");
        assert_eq!(sanitize("뇌경색"), "[Non-ASCII Text Removed]");
        assert_eq!(sanitize("Infarct 뇌경색"), "Infarct");
        assert_eq!(sanitize("line\nbreak"), "line break");
    }

    #[test]
    fn test_wrap_respects_width() {
        let text = "Small lacunar infarct in the left basal ganglia with surrounding gliosis and no mass effect";
        let lines = wrap(text, 60.0, 10.0);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(text_width(line, 10.0) <= 60.0, "{}", line);
        }
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn test_wrap_splits_long_words() {
        let word = "x".repeat(200);
        let lines = wrap(&word, 40.0, 10.0);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), word);
    }

    #[test]
    fn test_long_report_breaks_pages() {
        let mut result = AnalysisResult {
            disclaimer: Disclaimer::standard(),
            ..AnalysisResult::default()
        };
        for n in 0..80 {
            result.findings.push(Finding {
                category: format!("Region {}", n),
                description: "Unremarkable appearance without focal abnormality.".to_string(),
                ..Finding::default()
            });
        }
        let pdf = layout(&result).unwrap();
        assert!(pdf.pages.len() > 1);
    }

    #[test]
    fn test_render_pdf_bytes() {
        let result = AnalysisResult {
            report_id: "01HZX3".to_string(),
            disclaimer: Disclaimer::standard(),
            ..AnalysisResult::default()
        };
        let bytes = render_pdf(&result).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
