// Prompt templates for the two-stage analysis
//
// Stage 1 (extraction) sees the image. Stage 2 (coding) only sees the stage-1
// JSON and turns it into diagnosis codes, term explanations and a care plan.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::models::CaseInfo;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder regex is valid"))
}

/// Fill `{name}` placeholders in one pass, so substituted values are never
/// expanded again. Unknown names are left as written.
fn fill_template<'v>(template: &str, lookup: impl Fn(&str) -> Option<&'v str>) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &Captures| match lookup(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

// ============================================================================
// STAGE 1 - EXTRACTION
// ============================================================================

pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"You are an AI system that assists with reading medical imaging reports.

Safety and compliance:
- The document is provided for education, research, or review by a medical professional
- Personal identifiers have been anonymised
- This is a reference aid for professionals, not a diagnostic tool

Never:
- State unverified numbers such as "87% confidence"
- Use definitive language such as "this is certainly the diagnosis"
- Decide on treatment
- Attempt to replace a specialist's reading

Respond ONLY with JSON in exactly this shape:

{
  "patientInfo": {
    "name": "patient name, or empty string",
    "patientId": "patient number, or empty string",
    "age": "age, or empty string",
    "gender": "M/F, or empty string",
    "birthDate": "birth date if present"
  },
  "examInfo": {
    "examDate": "YYYY-MM-DD",
    "examType": "e.g. Brain MRI",
    "examPart": "body part examined",
    "institution": "institution name if present",
    "modality": "equipment type (CT, MRI, X-ray, US)",
    "referringPhysician": "if present",
    "readingPhysician": "if present"
  },
  "findings": [
    {
      "category": "finding category (parenchyma, vessels, structures, ...)",
      "description": "objective observation, 1-3 sentences",
      "isNormal": true,
      "severity": "normal/mild/moderate/severe"
    }
  ],
  "impression": {
    "summary": "overall impression, 2-3 sentences",
    "diagnosis": "main diagnosis named in the report, if any",
    "overallSeverity": "normal/mild/moderate/severe"
  }
}

Rules:
1. Describe only what is observed or written. Do not invent.
2. Use an empty string ("") for anything that cannot be confirmed.
3. The JSON must be complete and must not be cut off.
4. The response must be valid JSON (starts with {, ends with })."#;

const EXTRACTION_USER_PROMPT: &str = r#"The attached file is an anonymised medical imaging report provided for professional review.

Anonymised case information:
- Case ID: {patient_id}
- Study Date: {exam_date}
- Modality: {exam_type}

Write all free-text values in {language}.
Return the analysis in the JSON format above. Include every field and make sure the JSON is complete."#;

pub fn extraction_user_prompt(case: &CaseInfo, language: &str) -> String {
    fill_template(EXTRACTION_USER_PROMPT, |name| match name {
        "patient_id" => Some(case.patient_id.as_deref().unwrap_or("Anonymous")),
        "exam_date" => Some(case.exam_date.as_deref().unwrap_or("Not specified")),
        "exam_type" => Some(case.exam_type.as_deref().unwrap_or("Not specified")),
        "language" => Some(language),
        _ => None,
    })
}

// ============================================================================
// STAGE 2 - CODING AND CARE PLAN
// ============================================================================

pub const CODING_SYSTEM_PROMPT: &str = r#"You help patients prepare for a hospital visit after an imaging study.
You receive the structured findings of one report. Based ONLY on those findings:
- suggest ICD-10 codes that a specialist may consider
- explain the medical terms in plain language
- recommend which tests and departments to prepare for

Never state confidence percentages or definitive diagnoses, and never decide on treatment.

Respond ONLY with JSON in exactly this shape:

{
  "diseaseCodes": {
    "primary": [
      {
        "code": "ICD-10 code",
        "name": "disease name in the report language",
        "englishName": "English disease name",
        "description": "what the condition is",
        "priority": "HIGH/MODERATE/LOW",
        "observedFeatures": [
          {
            "technicalTerm": "medical term",
            "simpleName": "plain name",
            "whatItMeans": "what it means, 2-3 sentences",
            "analogy": "an everyday analogy",
            "whyImportant": "why it matters",
            "locationInImage": "where it was seen"
          }
        ],
        "references": ["ICD-10-CM Official Guidelines (WHO)"],
        "nextSteps": ["book a specialist appointment", "bring this report"]
      }
    ],
    "secondary": []
  },
  "medicalTerms": [
    {
      "term": "English medical term",
      "localizedTerm": "term in the report language",
      "localizedName": "formal name in the report language",
      "simpleExplanation": "one-sentence explanation",
      "detailedExplanation": "3-5 sentences",
      "patientContext": "what it means for this patient",
      "whatToDo": "what the patient should do",
      "analogy": "an everyday analogy"
    }
  ],
  "recommendations": {
    "followUp": "recommended follow-up",
    "department": "recommended department",
    "urgency": "low/medium/high",
    "notes": "other precautions",
    "clinicStrategy": {
      "requiredTests": [
        {
          "category": "required tests - same day",
          "tests": [
            {
              "name": "test name",
              "englishName": "English name",
              "reason": "why it is needed, 2-3 sentences",
              "whatItChecks": "what it checks",
              "howItHelps": "how it helps",
              "whenNeeded": "when it is needed",
              "whatToExpect": "what the test involves",
              "fastingRequired": true,
              "fastingHours": 8,
              "estimatedCost": "cost range",
              "insuranceCovered": true,
              "timeRequired": "same day, results in 3-5 days",
              "priority": "1-5 stars"
            }
          ]
        }
      ],
      "preparationChecklist": [
        { "item": "item", "importance": "required/recommended", "reason": "why", "howToGet": "how" }
      ],
      "timeline": [ { "day": "Day 1", "action": "first visit", "details": "details" } ],
      "costSummary": { "required": "", "additional": "", "total": "", "withInsurance": "" }
    },
    "universityHospitalStrategy": {
      "whenToGo": ["situation"],
      "recommendedDepartments": [ { "department": "", "priority": "", "reason": "" } ],
      "recommendedHospitals": [ { "name": "", "specialty": "" } ],
      "additionalDocuments": [ { "document": "", "importance": "", "reason": "", "howToGet": "", "template": "" } ],
      "expectedAdditionalTests": [ { "name": "", "englishName": "", "when": "", "cost": "", "insuranceCovered": true, "invasive": false } ],
      "questionsToAsk": ["question"],
      "insuranceTips": [ { "tip": "", "benefit": "" } ],
      "timeline": [ { "week": "Week 1", "action": "" } ]
    }
  }
}

Rules:
1. priority must be HIGH, MODERATE or LOW.
2. observedFeatures must be an array of objects, never plain strings.
3. If the findings are normal, return empty diseaseCodes arrays.
4. The JSON must be complete and valid (starts with {, ends with })."#;

const CODING_USER_PROMPT: &str = r#"Structured findings extracted from the report:

{draft}

Write all free-text values in {language}.
Return diagnosis codes, term explanations and recommendations in the JSON format above."#;

pub fn coding_user_prompt(draft_json: &str, language: &str) -> String {
    fill_template(CODING_USER_PROMPT, |name| match name {
        "draft" => Some(draft_json),
        "language" => Some(language),
        _ => None,
    })
}

/// Appended to the user prompt when a previous attempt could not be parsed
pub fn retry_suffix() -> &'static str {
    "\n\nYour previous answer was not valid JSON or was cut off. \
     Answer again with ONLY the JSON object, keep explanations short, and close every bracket."
}
