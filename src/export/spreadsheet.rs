// XLSX workbook - one sheet per report section

use rust_xlsxwriter::{Format, Workbook, XlsxError};

use super::ExportError;
use crate::models::{AnalysisResult, DiseaseCode};

const KEY_WIDTH: f64 = 22.0;
const VALUE_WIDTH: f64 = 70.0;

/// One worksheet of the export, in workbook order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sheet {
    Patient,
    Exam,
    Findings,
    Impression,
    Diagnoses,
    MedicalTerms,
    Tests,
    Recommendations,
}

impl Sheet {
    pub fn name(self) -> &'static str {
        match self {
            Sheet::Patient => "Patient",
            Sheet::Exam => "Exam",
            Sheet::Findings => "Findings",
            Sheet::Impression => "Impression",
            Sheet::Diagnoses => "Diagnoses",
            Sheet::MedicalTerms => "Medical Terms",
            Sheet::Tests => "Tests",
            Sheet::Recommendations => "Recommendations",
        }
    }
}

/// Sheets `render_workbook` emits, in order
pub fn sheet_plan(result: &AnalysisResult) -> Vec<Sheet> {
    let mut sheets = vec![
        Sheet::Patient,
        Sheet::Exam,
        Sheet::Findings,
        Sheet::Impression,
        Sheet::Diagnoses,
    ];
    if !result.medical_terms.is_empty() {
        sheets.push(Sheet::MedicalTerms);
    }
    sheets.extend([Sheet::Tests, Sheet::Recommendations]);
    sheets
}

pub fn render_workbook(result: &AnalysisResult) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    for sheet in sheet_plan(result) {
        let name = sheet.name();
        match sheet {
            Sheet::Patient => {
                let p = &result.patient_info;
                let rows = [
                    ("Patient ID", p.patient_id.clone()),
                    ("Name", p.name.clone()),
                    ("Age", p.age.clone()),
                    ("Gender", p.gender.clone()),
                    ("Birth Date", p.birth_date.clone()),
                    ("Report ID", result.report_id.clone()),
                ];
                key_value_sheet(&mut workbook, name, &header, &rows)?;
            }
            Sheet::Exam => {
                let e = &result.exam_info;
                let rows = [
                    ("Exam Type", e.exam_type.clone()),
                    ("Body Part", e.exam_part.clone()),
                    ("Modality", e.modality.clone()),
                    ("Exam Date", e.exam_date.clone()),
                    ("Institution", e.institution.clone()),
                    ("Referring Physician", e.referring_physician.clone()),
                    ("Reading Physician", e.reading_physician.clone()),
                ];
                key_value_sheet(&mut workbook, name, &header, &rows)?;
            }
            Sheet::Findings => {
                let columns = [
                    ("Category", 18.0),
                    ("Description", 60.0),
                    ("Status", 12.0),
                    ("Severity", 12.0),
                ];
                let rows: Vec<Vec<String>> = result
                    .findings
                    .iter()
                    .map(|f| {
                        let status = match f.is_normal {
                            Some(true) => "Normal",
                            Some(false) => "Abnormal",
                            None => "",
                        };
                        vec![
                            f.category.clone(),
                            f.description.clone(),
                            status.to_string(),
                            f.severity.clone(),
                        ]
                    })
                    .collect();
                table_sheet(&mut workbook, name, &header, &columns, &rows)?;
            }
            Sheet::Impression => {
                let i = &result.impression;
                let rows = [
                    ("Overall Severity", i.overall_severity.clone()),
                    ("Diagnosis", i.diagnosis.clone()),
                    ("Summary", i.summary.clone()),
                ];
                key_value_sheet(&mut workbook, name, &header, &rows)?;
            }
            Sheet::Diagnoses => {
                let columns = [
                    ("Type", 11.0),
                    ("ICD-10", 10.0),
                    ("Name", 30.0),
                    ("Priority", 11.0),
                    ("Description", 50.0),
                    ("Evidence", 40.0),
                    ("Next Steps", 40.0),
                ];
                let codes = &result.disease_codes;
                let rows: Vec<Vec<String>> = codes
                    .primary
                    .iter()
                    .map(|c| diagnosis_row("Primary", c))
                    .chain(codes.secondary.iter().map(|c| diagnosis_row("Secondary", c)))
                    .collect();
                table_sheet(&mut workbook, name, &header, &columns, &rows)?;
            }
            Sheet::MedicalTerms => {
                let columns = [
                    ("Term", 25.0),
                    ("Localized", 20.0),
                    ("Explanation", 60.0),
                    ("What To Do", 40.0),
                ];
                let rows: Vec<Vec<String>> = result
                    .medical_terms
                    .iter()
                    .map(|t| {
                        vec![
                            t.term.clone(),
                            t.localized_term.clone(),
                            t.simple_explanation.clone(),
                            t.what_to_do.clone(),
                        ]
                    })
                    .collect();
                table_sheet(&mut workbook, name, &header, &columns, &rows)?;
            }
            Sheet::Tests => {
                let columns = [
                    ("Category", 18.0),
                    ("Test", 28.0),
                    ("Reason", 50.0),
                    ("Fasting", 10.0),
                    ("Cost", 14.0),
                    ("Insurance", 10.0),
                    ("Priority", 10.0),
                ];
                let rows: Vec<Vec<String>> = result
                    .recommendations
                    .clinic_strategy
                    .required_tests
                    .iter()
                    .flat_map(|category| {
                        category.tests.iter().map(move |t| {
                            let fasting = match (t.fasting_required, t.fasting_hours) {
                                (Some(true), Some(h)) => format!("{} hours", h),
                                (Some(true), None) => "Yes".to_string(),
                                (Some(false), _) => "No".to_string(),
                                (None, _) => String::new(),
                            };
                            vec![
                                category.category.clone(),
                                t.display_name().to_string(),
                                t.reason.clone(),
                                fasting,
                                t.estimated_cost.clone(),
                                yes_no(t.insurance_covered),
                                t.priority.clone(),
                            ]
                        })
                    })
                    .collect();
                table_sheet(&mut workbook, name, &header, &columns, &rows)?;
            }
            Sheet::Recommendations => {
                let r = &result.recommendations;
                let h = &r.university_hospital_strategy;
                let departments = h
                    .recommended_departments
                    .iter()
                    .map(|d| d.department.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                let rows = [
                    ("Urgency", r.urgency.clone()),
                    ("Follow-up", r.follow_up.clone()),
                    ("Department", r.department.clone()),
                    ("Notes", r.notes.clone()),
                    ("Estimated Cost", r.clinic_strategy.cost_summary.total.clone()),
                    ("When To Visit Hospital", h.when_to_go.join("; ")),
                    ("Hospital Departments", departments),
                    ("Questions To Ask", h.questions_to_ask.join("; ")),
                    ("Disclaimer", result.disclaimer.english.clone()),
                ];
                key_value_sheet(&mut workbook, name, &header, &rows)?;
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

fn diagnosis_row(kind: &str, code: &DiseaseCode) -> Vec<String> {
    vec![
        kind.to_string(),
        code.code.clone(),
        code.display_name().to_string(),
        code.priority.as_str().to_string(),
        code.description.clone(),
        code.observed_features
            .iter()
            .map(|f| f.label())
            .collect::<Vec<_>>()
            .join("; "),
        code.next_steps.join("; "),
    ]
}

fn yes_no(value: Option<bool>) -> String {
    match value {
        Some(true) => "Yes".to_string(),
        Some(false) => "No".to_string(),
        None => String::new(),
    }
}

fn key_value_sheet(
    workbook: &mut Workbook,
    name: &str,
    header: &Format,
    rows: &[(&str, String)],
) -> Result<(), XlsxError> {
    let sheet = workbook.add_worksheet();
    sheet.set_name(name)?;
    sheet.write_string_with_format(0, 0, "Field", header)?;
    sheet.write_string_with_format(0, 1, "Value", header)?;
    for (idx, (key, value)) in rows.iter().enumerate() {
        let row = idx as u32 + 1;
        sheet.write_string(row, 0, *key)?;
        sheet.write_string(row, 1, value)?;
    }
    sheet.set_column_width(0, KEY_WIDTH)?;
    sheet.set_column_width(1, VALUE_WIDTH)?;
    Ok(())
}

/// Numbered table: a "No." column followed by `columns`
fn table_sheet(
    workbook: &mut Workbook,
    name: &str,
    header: &Format,
    columns: &[(&str, f64)],
    rows: &[Vec<String>],
) -> Result<(), XlsxError> {
    let sheet = workbook.add_worksheet();
    sheet.set_name(name)?;
    sheet.write_string_with_format(0, 0, "No.", header)?;
    sheet.set_column_width(0, 6.0)?;
    for (idx, (title, width)) in columns.iter().enumerate() {
        let col = idx as u16 + 1;
        sheet.write_string_with_format(0, col, *title, header)?;
        sheet.set_column_width(col, *width)?;
    }
    for (idx, cells) in rows.iter().enumerate() {
        let row = idx as u32 + 1;
        sheet.write_number(row, 0, (idx + 1) as f64)?;
        for (col, value) in cells.iter().enumerate() {
            sheet.write_string(row, col as u16 + 1, value)?;
        }
    }
    Ok(())
}
