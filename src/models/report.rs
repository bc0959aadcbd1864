// Report models - the JSON shape the vision model is asked to produce
//
// Every struct is `default` at the container level: the model routinely omits
// sections, so absent fields deserialize to empty values instead of failing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// PATIENT / EXAM
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatientInfo {
    pub name: String,
    pub patient_id: String,
    pub age: String,
    pub gender: String,
    pub birth_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExamInfo {
    pub exam_date: String,
    pub exam_type: String,
    /// Body part examined (brain, abdomen, ...)
    pub exam_part: String,
    #[serde(alias = "hospital")]
    pub institution: String,
    pub modality: String,
    pub referring_physician: String,
    pub reading_physician: String,
}

// ============================================================================
// FINDINGS / IMPRESSION
// ============================================================================

/// A single observation. Older prompt revisions returned findings as one
/// free-text paragraph; normalization folds that into a "General" finding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Finding {
    pub category: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_normal: Option<bool>,
    pub severity: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Impression {
    pub summary: String,
    pub diagnosis: String,
    pub overall_severity: String,
}

// ============================================================================
// DIAGNOSIS CODES
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    #[default]
    Moderate,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Moderate => "MODERATE",
            Priority::Low => "LOW",
        }
    }
}

/// Image evidence backing a diagnosis code, explained for a lay reader
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObservedFeature {
    pub technical_term: String,
    pub simple_name: String,
    pub what_it_means: String,
    pub analogy: String,
    pub why_important: String,
    pub location_in_image: String,
}

impl ObservedFeature {
    /// Best short label for exports
    pub fn label(&self) -> &str {
        if !self.technical_term.is_empty() {
            &self.technical_term
        } else if !self.simple_name.is_empty() {
            &self.simple_name
        } else {
            "Feature"
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiseaseCode {
    /// ICD-10 code as emitted by the model (not validated)
    pub code: String,
    /// Name in the report language
    pub name: String,
    pub english_name: String,
    pub description: String,
    pub priority: Priority,
    pub observed_features: Vec<ObservedFeature>,
    pub references: Vec<String>,
    pub next_steps: Vec<String>,
}

impl DiseaseCode {
    pub fn display_name(&self) -> &str {
        if !self.english_name.is_empty() {
            &self.english_name
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiseaseCodes {
    pub primary: Vec<DiseaseCode>,
    pub secondary: Vec<DiseaseCode>,
}

impl DiseaseCodes {
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.secondary.is_empty()
    }
}

// ============================================================================
// MEDICAL TERMS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MedicalTerm {
    pub term: String,
    /// Transliteration or translation of the term in the report language
    #[serde(alias = "koreanTerm")]
    pub localized_term: String,
    #[serde(alias = "koreanName")]
    pub localized_name: String,
    #[serde(alias = "explanation")]
    pub simple_explanation: String,
    pub detailed_explanation: String,
    pub patient_context: String,
    pub what_to_do: String,
    pub analogy: String,
}

// ============================================================================
// RECOMMENDATIONS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestItem {
    pub name: String,
    pub english_name: String,
    pub reason: String,
    pub what_it_checks: String,
    pub how_it_helps: String,
    pub when_needed: String,
    pub what_to_expect: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fasting_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fasting_hours: Option<u32>,
    pub estimated_cost: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insurance_covered: Option<bool>,
    pub time_required: String,
    pub priority: String,
}

impl TestItem {
    pub fn display_name(&self) -> &str {
        if !self.english_name.is_empty() {
            &self.english_name
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestCategory {
    pub category: String,
    pub tests: Vec<TestItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreparationItem {
    pub item: String,
    pub importance: String,
    pub reason: String,
    pub how_to_get: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimelineItem {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub day: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub week: String,
    pub action: String,
    pub details: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CostSummary {
    pub required: String,
    pub additional: String,
    pub total: String,
    pub with_insurance: String,
}

/// Plan for a local clinic visit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClinicStrategy {
    pub required_tests: Vec<TestCategory>,
    pub preparation_checklist: Vec<PreparationItem>,
    pub timeline: Vec<TimelineItem>,
    pub cost_summary: CostSummary,
}

impl ClinicStrategy {
    pub fn is_empty(&self) -> bool {
        self.required_tests.is_empty()
            && self.preparation_checklist.is_empty()
            && self.timeline.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DepartmentInfo {
    pub department: String,
    pub priority: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HospitalInfo {
    pub name: String,
    pub specialty: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdditionalDocument {
    pub document: String,
    pub importance: String,
    pub reason: String,
    pub how_to_get: String,
    pub template: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdditionalTest {
    pub name: String,
    pub english_name: String,
    pub when: String,
    pub cost: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insurance_covered: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invasive: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InsuranceTip {
    pub tip: String,
    pub benefit: String,
}

/// Plan for a referral to a tertiary (university) hospital
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UniversityHospitalStrategy {
    pub when_to_go: Vec<String>,
    pub recommended_departments: Vec<DepartmentInfo>,
    pub recommended_hospitals: Vec<HospitalInfo>,
    pub additional_documents: Vec<AdditionalDocument>,
    pub expected_additional_tests: Vec<AdditionalTest>,
    pub questions_to_ask: Vec<String>,
    pub insurance_tips: Vec<InsuranceTip>,
    pub timeline: Vec<TimelineItem>,
}

impl UniversityHospitalStrategy {
    pub fn is_empty(&self) -> bool {
        self.when_to_go.is_empty()
            && self.recommended_departments.is_empty()
            && self.expected_additional_tests.is_empty()
            && self.questions_to_ask.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Recommendations {
    pub clinic_strategy: ClinicStrategy,
    pub university_hospital_strategy: UniversityHospitalStrategy,
    pub follow_up: String,
    pub department: String,
    pub urgency: String,
    pub notes: String,
}

impl Recommendations {
    pub fn is_empty(&self) -> bool {
        self.clinic_strategy.is_empty()
            && self.university_hospital_strategy.is_empty()
            && self.follow_up.is_empty()
            && self.department.is_empty()
            && self.urgency.is_empty()
            && self.notes.is_empty()
    }
}

// ============================================================================
// DISCLAIMER / METADATA
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Disclaimer {
    #[serde(alias = "korean")]
    pub localized: String,
    pub english: String,
}

impl Disclaimer {
    pub fn is_empty(&self) -> bool {
        self.localized.trim().is_empty() && self.english.trim().is_empty()
    }
}

pub const DEFAULT_DISCLAIMER_EN: &str = "IMPORTANT DISCLAIMER\n\n\
This analysis is a preliminary observation generated by an AI-assisted analysis tool.\n\n\
- This is reference material, not a final diagnosis\n\
- Actual diagnosis requires official interpretation by a board-certified radiologist\n\
- Cannot be used as basis for treatment decisions\n\
- Cannot replace physician interpretation\n\n\
Please ensure you receive an official reading from a radiologist.";

impl Disclaimer {
    pub fn standard() -> Self {
        Self {
            localized: String::new(),
            english: DEFAULT_DISCLAIMER_EN.to_string(),
        }
    }
}

/// Upload and run facts attached by the server, never by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisMetadata {
    pub file_name: String,
    pub file_size: usize,
    pub mime_type: String,
    /// Hex sha256 of the uploaded bytes
    pub sha256: String,
    pub analyzed_at: DateTime<Utc>,
    pub model: String,
    /// 1 when only extraction succeeded, 2 when coding succeeded too
    pub stages_completed: u8,
}

impl Default for AnalysisMetadata {
    fn default() -> Self {
        Self {
            file_name: String::new(),
            file_size: 0,
            mime_type: String::new(),
            sha256: String::new(),
            analyzed_at: Utc::now(),
            model: String::new(),
            stages_completed: 0,
        }
    }
}

// ============================================================================
// DRAFT / RESULT
// ============================================================================

/// Payload of a single pipeline stage. Stage 1 fills patient/exam/findings,
/// stage 2 fills codes/terms/recommendations; either may spill over.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportDraft {
    pub patient_info: PatientInfo,
    pub exam_info: ExamInfo,
    pub findings: Vec<Finding>,
    pub impression: Impression,
    pub disease_codes: DiseaseCodes,
    pub medical_terms: Vec<MedicalTerm>,
    pub recommendations: Recommendations,
    pub disclaimer: Disclaimer,
}

/// Final merged analysis returned by POST /api/analyze and accepted by the
/// export endpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisResult {
    pub report_id: String,
    pub patient_info: PatientInfo,
    pub exam_info: ExamInfo,
    pub findings: Vec<Finding>,
    pub impression: Impression,
    pub disease_codes: DiseaseCodes,
    pub medical_terms: Vec<MedicalTerm>,
    pub recommendations: Recommendations,
    pub disclaimer: Disclaimer,
    pub metadata: AnalysisMetadata,
    /// Non-fatal problems, e.g. a failed coding stage
    pub warnings: Vec<String>,
}
