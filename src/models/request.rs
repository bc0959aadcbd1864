// Request models for the analyze and export endpoints

use serde::Deserialize;

use super::report::AnalysisResult;

/// Optional case details sent as multipart text fields next to the image.
/// Forwarded to the model as anonymised context and used to fill gaps the
/// model leaves in patientInfo / examInfo.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseInfo {
    pub patient_name: Option<String>,
    pub patient_id: Option<String>,
    pub exam_date: Option<String>,
    pub exam_type: Option<String>,
}

impl CaseInfo {
    /// Record a multipart text field. Returns false for unknown field names.
    pub fn set_field(&mut self, name: &str, value: String) -> bool {
        let value = value.trim().to_string();
        let slot = match name {
            "patientName" => &mut self.patient_name,
            "patientId" => &mut self.patient_id,
            "examDate" => &mut self.exam_date,
            "examType" => &mut self.exam_type,
            _ => return false,
        };
        *slot = if value.is_empty() { None } else { Some(value) };
        true
    }
}

/// Body of POST /api/export/:format and POST /api/generate-pdf
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub analysis_result: Option<AnalysisResult>,
    /// File name stem for Content-Disposition
    #[serde(default)]
    pub file_name: Option<String>,
}
