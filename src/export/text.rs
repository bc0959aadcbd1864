// Plain-text report

use std::fmt::Write;

use chrono::Utc;

use crate::models::{AnalysisResult, DiseaseCode};

const WIDTH: usize = 60;

struct TextReport {
    out: String,
}

impl TextReport {
    fn new() -> Self {
        Self { out: String::new() }
    }

    fn rule(&mut self, c: char) {
        self.out.extend(std::iter::repeat(c).take(WIDTH));
        self.out.push('\n');
    }

    fn section(&mut self, title: &str) {
        let _ = writeln!(self.out, "[ {} ]", title);
        self.rule('-');
    }

    /// `label: value`, skipped when the value is blank
    fn field(&mut self, label: &str, value: &str) {
        if !value.trim().is_empty() {
            let _ = writeln!(self.out, "{}: {}", label, value.trim());
        }
    }

    fn line(&mut self, text: &str) {
        let _ = writeln!(self.out, "{}", text);
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn diagnosis(&mut self, index: usize, code: &DiseaseCode, with_evidence: bool) {
        let _ = writeln!(
            self.out,
            "\n{}. {} - {} [{}]",
            index + 1,
            if code.code.is_empty() { "N/A" } else { code.code.as_str() },
            code.display_name(),
            code.priority.as_str()
        );
        if !code.name.is_empty() && code.name != code.display_name() {
            self.field("   Name", &code.name);
        }
        self.field("   Description", &code.description);
        if with_evidence && !code.observed_features.is_empty() {
            self.line("   Evidence:");
            for feature in &code.observed_features {
                let _ = writeln!(self.out, "     - {}", feature.label());
                self.field("       What it means", &feature.what_it_means);
                self.field("       Location", &feature.location_in_image);
            }
        }
        for step in &code.next_steps {
            let _ = writeln!(self.out, "   > {}", step);
        }
    }
}

/// Render the result as a UTF-8 text document
pub fn render_text(result: &AnalysisResult) -> String {
    let mut r = TextReport::new();

    r.rule('=');
    r.line("MEDICAL IMAGE REPORT ANALYSIS");
    r.rule('=');
    r.field("Report ID", &result.report_id);
    r.blank();

    let p = &result.patient_info;
    r.section("Patient Information");
    r.field("Patient ID", &p.patient_id);
    r.field("Name", &p.name);
    r.field("Age", &p.age);
    r.field("Gender", &p.gender);
    r.field("Birth Date", &p.birth_date);
    r.blank();

    let e = &result.exam_info;
    r.section("Examination");
    r.field("Exam Type", &e.exam_type);
    r.field("Body Part", &e.exam_part);
    r.field("Modality", &e.modality);
    r.field("Exam Date", &e.exam_date);
    r.field("Institution", &e.institution);
    r.field("Referring Physician", &e.referring_physician);
    r.field("Reading Physician", &e.reading_physician);
    r.blank();

    let i = &result.impression;
    r.section("Impression");
    r.field("Severity", &i.overall_severity);
    r.field("Diagnosis", &i.diagnosis);
    r.field("Summary", &i.summary);
    r.blank();

    r.section("Findings");
    for (idx, finding) in result.findings.iter().enumerate() {
        let category = if finding.category.is_empty() {
            "General"
        } else {
            finding.category.as_str()
        };
        let _ = writeln!(r.out, "\n{}. {}", idx + 1, category);
        let status = match finding.is_normal {
            Some(true) => "Normal",
            Some(false) => "Abnormal",
            None => "Unspecified",
        };
        if finding.severity.is_empty() {
            let _ = writeln!(r.out, "   Status: {}", status);
        } else {
            let _ = writeln!(r.out, "   Status: {} ({})", status, finding.severity);
        }
        r.field("   Details", &finding.description);
    }
    r.blank();

    let codes = &result.disease_codes;
    if !codes.is_empty() {
        r.section("Diagnosis (ICD-10)");
        if !codes.primary.is_empty() {
            r.line("Primary:");
            for (idx, code) in codes.primary.iter().enumerate() {
                r.diagnosis(idx, code, true);
            }
        }
        if !codes.secondary.is_empty() {
            r.line("\nSecondary:");
            for (idx, code) in codes.secondary.iter().enumerate() {
                r.diagnosis(idx, code, false);
            }
        }
        r.blank();
    }

    if !result.medical_terms.is_empty() {
        r.section("Medical Terms");
        for (idx, term) in result.medical_terms.iter().enumerate() {
            if term.localized_term.is_empty() {
                let _ = writeln!(r.out, "\n{}. {}", idx + 1, term.term);
            } else {
                let _ = writeln!(r.out, "\n{}. {} ({})", idx + 1, term.term, term.localized_term);
            }
            r.field("   Meaning", &term.simple_explanation);
            r.field("   For you", &term.patient_context);
            r.field("   What to do", &term.what_to_do);
        }
        r.blank();
    }

    let rec = &result.recommendations;
    let tests = &rec.clinic_strategy.required_tests;
    if !tests.is_empty() {
        r.section("Recommended Tests");
        for category in tests {
            let _ = writeln!(r.out, "\n{}", category.category);
            for test in &category.tests {
                let _ = writeln!(r.out, "  - {}", test.display_name());
                r.field("    Reason", &test.reason);
                r.field("    Cost", &test.estimated_cost);
                if test.fasting_required == Some(true) {
                    match test.fasting_hours {
                        Some(h) => r.line(&format!("    Fasting: {} hours", h)),
                        None => r.line("    Fasting: required"),
                    }
                }
            }
        }
        r.blank();
    }

    r.section("Recommendations");
    r.field("Urgency", &rec.urgency);
    r.field("Follow-up", &rec.follow_up);
    r.field("Department", &rec.department);
    r.field("Notes", &rec.notes);
    let hospital = &rec.university_hospital_strategy;
    if !hospital.when_to_go.is_empty() {
        r.line("When to visit a university hospital:");
        for reason in &hospital.when_to_go {
            let _ = writeln!(r.out, "  - {}", reason);
        }
    }
    if !hospital.questions_to_ask.is_empty() {
        r.line("Questions to ask:");
        for question in &hospital.questions_to_ask {
            let _ = writeln!(r.out, "  - {}", question);
        }
    }
    r.blank();

    if !result.warnings.is_empty() {
        r.section("Warnings");
        for warning in &result.warnings {
            let _ = writeln!(r.out, "- {}", warning);
        }
        r.blank();
    }

    r.section("Disclaimer");
    if !result.disclaimer.localized.trim().is_empty() {
        r.line(result.disclaimer.localized.trim());
        r.blank();
    }
    r.line(result.disclaimer.english.trim());
    r.blank();

    r.rule('=');
    let _ = writeln!(r.out, "Generated: {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
    r.rule('=');

    r.out
}
