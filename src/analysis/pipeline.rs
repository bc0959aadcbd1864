// Two-stage analysis pipeline
//
// Stage 1 (extraction): image -> patient/exam info, findings, impression.
// Stage 2 (coding): stage-1 JSON -> ICD-10 codes, term explanations, care plan.
// The stages are merged into one AnalysisResult. A failed stage 2 degrades to
// an extraction-only result with a warning.

use chrono::Utc;
use serde_json::json;
use sha2::{Digest, Sha256};
use ulid::Ulid;

use super::normalize::normalize;
use super::repair::{self, RepairError};
use crate::config::Config;
use crate::llm::prompts::{
    coding_user_prompt, extraction_user_prompt, retry_suffix, CODING_SYSTEM_PROMPT,
    EXTRACTION_SYSTEM_PROMPT,
};
use crate::llm::{Attachment, CompletionRequest, LlmError, LlmProvider};
use crate::models::report::DEFAULT_DISCLAIMER_EN;
use crate::models::{AnalysisMetadata, AnalysisResult, CaseInfo, Disclaimer, ReportDraft};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("the model declined to analyze the file")]
    Refused,

    #[error("could not parse model output: {0}")]
    Parse(#[from] RepairError),

    #[error("LLM request failed: {0}")]
    Llm(#[from] LlmError),
}

/// A validated upload
#[derive(Debug, Clone)]
pub struct UploadedReport {
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    pub parse_retries: u32,
    pub language: String,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            parse_retries: config.parse_retries,
            language: config.report_language.clone(),
        }
    }
}

/// Hex sha256 of the upload, used in logs and metadata instead of the bytes
pub fn fingerprint(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Run both stages and merge them
pub async fn analyze_report<P: LlmProvider>(
    provider: &P,
    upload: &UploadedReport,
    case: &CaseInfo,
    settings: &PipelineSettings,
) -> Result<AnalysisResult, AnalysisError> {
    let sha256 = fingerprint(&upload.data);
    tracing::info!(
        "Analyzing {} ({} bytes, {}, sha256 {})",
        upload.file_name,
        upload.data.len(),
        upload.mime_type,
        &sha256[..12]
    );

    // Stage 1: extraction (sees the file)
    let extraction = CompletionRequest {
        system: Some(EXTRACTION_SYSTEM_PROMPT.to_string()),
        text: extraction_user_prompt(case, &settings.language),
        attachment: Some(Attachment {
            mime_type: upload.mime_type.clone(),
            file_name: upload.file_name.clone(),
            data: upload.data.clone(),
        }),
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
    };
    let extracted = run_stage(provider, "extraction", extraction, settings.parse_retries).await?;
    tracing::info!(
        "Extraction stage complete: {} findings",
        extracted.findings.len()
    );

    // Stage 2: coding (text only)
    let mut warnings = Vec::new();
    let coded = if extracted.findings.is_empty() && extracted.impression.summary.trim().is_empty() {
        tracing::warn!("Extraction produced no findings - skipping coding stage");
        warnings.push(
            "No findings were extracted, so no diagnosis codes were requested.".to_string(),
        );
        None
    } else {
        match run_coding_stage(provider, &extracted, settings).await {
            Ok(draft) => {
                tracing::info!(
                    "Coding stage complete: {} primary / {} secondary codes",
                    draft.disease_codes.primary.len(),
                    draft.disease_codes.secondary.len()
                );
                Some(draft)
            }
            Err(e) => {
                tracing::warn!("Coding stage failed, returning extraction only: {}", e);
                warnings.push(format!(
                    "Diagnosis codes and recommendations are unavailable: {}",
                    e
                ));
                None
            }
        }
    };

    let metadata = AnalysisMetadata {
        file_name: upload.file_name.clone(),
        file_size: upload.data.len(),
        mime_type: upload.mime_type.clone(),
        sha256,
        analyzed_at: Utc::now(),
        model: provider.model_name().to_string(),
        stages_completed: if coded.is_some() { 2 } else { 1 },
    };

    Ok(merge(extracted, coded, case, metadata, warnings))
}

async fn run_coding_stage<P: LlmProvider>(
    provider: &P,
    extracted: &ReportDraft,
    settings: &PipelineSettings,
) -> Result<ReportDraft, AnalysisError> {
    let input = json!({
        "examInfo": extracted.exam_info,
        "findings": extracted.findings,
        "impression": extracted.impression,
    });
    let request = CompletionRequest {
        system: Some(CODING_SYSTEM_PROMPT.to_string()),
        text: coding_user_prompt(&format!("{:#}", input), &settings.language),
        attachment: None,
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
    };
    run_stage(provider, "coding", request, settings.parse_retries).await
}

/// Call the model, repairing and retrying until a draft parses
async fn run_stage<P: LlmProvider>(
    provider: &P,
    stage: &str,
    mut request: CompletionRequest,
    retries: u32,
) -> Result<ReportDraft, AnalysisError> {
    let base_text = request.text.clone();
    let mut attempt = 0;

    loop {
        let raw = provider.complete(&request).await?;
        tracing::info!(
            "{} stage response: {} chars (attempt {})",
            stage,
            raw.len(),
            attempt + 1
        );

        match parse_draft(&raw) {
            Ok(draft) => return Ok(draft),
            Err(e) => {
                if repair::is_refusal(&raw) {
                    tracing::error!(
                        "{} stage refused: {}",
                        stage,
                        raw.chars().take(200).collect::<String>()
                    );
                    return Err(AnalysisError::Refused);
                }
                tracing::warn!(
                    "{} stage output unparseable: {}. Preview: {}",
                    stage,
                    e,
                    raw.chars().take(500).collect::<String>()
                );
                if attempt >= retries {
                    return Err(e);
                }
                attempt += 1;
                request.text = format!("{}{}", base_text, retry_suffix());
            }
        }
    }
}

fn parse_draft(raw: &str) -> Result<ReportDraft, AnalysisError> {
    let value = repair::parse_model_json(raw)?;
    serde_json::from_value(normalize(value))
        .map_err(|e| AnalysisError::Parse(RepairError::Invalid(e)))
}

/// Combine stage payloads. Extraction owns patient/exam/findings; coding
/// output replaces codes, terms and recommendations when it has any.
pub fn merge(
    extracted: ReportDraft,
    coded: Option<ReportDraft>,
    case: &CaseInfo,
    metadata: AnalysisMetadata,
    warnings: Vec<String>,
) -> AnalysisResult {
    let mut result = AnalysisResult {
        report_id: Ulid::new().to_string(),
        patient_info: extracted.patient_info,
        exam_info: extracted.exam_info,
        findings: extracted.findings,
        impression: extracted.impression,
        disease_codes: extracted.disease_codes,
        medical_terms: extracted.medical_terms,
        recommendations: extracted.recommendations,
        disclaimer: extracted.disclaimer,
        metadata,
        warnings,
    };

    if let Some(coded) = coded {
        if !coded.disease_codes.is_empty() {
            result.disease_codes = coded.disease_codes;
        }
        if !coded.medical_terms.is_empty() {
            result.medical_terms = coded.medical_terms;
        }
        if !coded.recommendations.is_empty() {
            result.recommendations = coded.recommendations;
        }
        if result.findings.is_empty() {
            result.findings = coded.findings;
        }
        if result.disclaimer.is_empty() {
            result.disclaimer = coded.disclaimer;
        }
    }

    fill_if_empty(&mut result.patient_info.name, &case.patient_name);
    fill_if_empty(&mut result.patient_info.patient_id, &case.patient_id);
    fill_if_empty(&mut result.exam_info.exam_date, &case.exam_date);
    fill_if_empty(&mut result.exam_info.exam_type, &case.exam_type);

    if result.disclaimer.is_empty() {
        result.disclaimer = Disclaimer::standard();
    } else if result.disclaimer.english.trim().is_empty() {
        result.disclaimer.english = DEFAULT_DISCLAIMER_EN.to_string();
    }

    result
}

fn fill_if_empty(field: &mut String, fallback: &Option<String>) {
    if field.trim().is_empty() {
        if let Some(value) = fallback {
            *field = value.clone();
        }
    }
}
