// Shape normalization - coerce whatever the model emitted toward ReportDraft
//
// Runs on the raw serde_json::Value before typed deserialization. Rules are
// keyed by field name so one walk covers both stage payloads.

use serde_json::{json, Map, Value};

/// Fields typed as Vec<String>
const STRING_LIST_KEYS: &[&str] = &["references", "nextSteps", "whenToGo", "questionsToAsk"];

/// Fields typed as Vec<struct>, with the struct field a bare string maps to
const OBJECT_LIST_KEYS: &[(&str, &str)] = &[
    ("findings", "description"),
    ("primary", "name"),
    ("secondary", "name"),
    ("observedFeatures", "technicalTerm"),
    ("medicalTerms", "term"),
    ("requiredTests", "category"),
    ("tests", "name"),
    ("preparationChecklist", "item"),
    ("timeline", "action"),
    ("recommendedDepartments", "department"),
    ("recommendedHospitals", "name"),
    ("additionalDocuments", "document"),
    ("expectedAdditionalTests", "name"),
    ("insuranceTips", "tip"),
];

/// Fields typed as a struct, with the struct field a bare string maps to
const OBJECT_KEYS: &[(&str, Option<&str>)] = &[
    ("patientInfo", None),
    ("examInfo", None),
    ("impression", Some("summary")),
    ("diseaseCodes", None),
    ("recommendations", Some("followUp")),
    ("clinicStrategy", None),
    ("universityHospitalStrategy", None),
    ("costSummary", Some("total")),
    ("disclaimer", Some("english")),
];

/// Legacy key -> current key. Both may appear in one object.
const KEY_ALIASES: &[(&str, &str)] = &[
    ("hospital", "institution"),
    ("koreanTerm", "localizedTerm"),
    ("koreanName", "localizedName"),
    ("explanation", "simpleExplanation"),
    ("korean", "localized"),
];

const BOOL_KEYS: &[&str] = &["isNormal", "fastingRequired", "insuranceCovered", "invasive"];

const NUMBER_KEYS: &[&str] = &["fastingHours"];

/// Normalize a stage payload in place and return it
pub fn normalize(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        normalize_object(map);
        normalize_disease_codes(map);
    }
    value
}

fn normalize_object(map: &mut Map<String, Value>) {
    fold_aliases(map);
    let keys: Vec<String> = map.keys().cloned().collect();
    for key in keys {
        let Some(value) = map.remove(&key) else {
            continue;
        };
        if let Some(normalized) = normalize_field(&key, value) {
            map.insert(key, normalized);
        }
    }
}

/// Move legacy keys onto their current name. An existing non-empty value
/// under the current name wins.
fn fold_aliases(map: &mut Map<String, Value>) {
    for (alias, canonical) in KEY_ALIASES {
        let Some(legacy) = map.remove(*alias) else {
            continue;
        };
        let keep_current = map.get(*canonical).is_some_and(|v| !is_blank(v));
        if !keep_current {
            map.insert(canonical.to_string(), legacy);
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Returns None when the field should be dropped so serde defaults apply
fn normalize_field(key: &str, value: Value) -> Option<Value> {
    if value.is_null() {
        return None;
    }

    if BOOL_KEYS.contains(&key) {
        return coerce_bool(&value).map(Value::Bool);
    }
    if NUMBER_KEYS.contains(&key) {
        return coerce_count(&value).map(|n| json!(n));
    }
    if STRING_LIST_KEYS.contains(&key) {
        return Some(coerce_string_list(value));
    }
    if let Some((_, field)) = OBJECT_LIST_KEYS.iter().find(|(k, _)| *k == key) {
        return Some(coerce_object_list(key, field, value));
    }
    if let Some((_, field)) = OBJECT_KEYS.iter().find(|(k, _)| *k == key) {
        return coerce_object(key, *field, value);
    }
    coerce_string(value).map(Value::String)
}

fn coerce_object(key: &str, string_field: Option<&str>, value: Value) -> Option<Value> {
    match value {
        Value::Object(mut map) => {
            normalize_object(&mut map);
            Some(Value::Object(map))
        }
        // Older payloads returned disease codes as a flat list
        Value::Array(items) if key == "diseaseCodes" => {
            let mut map = Map::new();
            map.insert("primary".to_string(), Value::Array(items));
            normalize_object(&mut map);
            Some(Value::Object(map))
        }
        Value::String(s) if !s.trim().is_empty() => {
            string_field.map(|field| json!({ field: s }))
        }
        _ => None,
    }
}

fn coerce_object_list(key: &str, string_field: &str, value: Value) -> Value {
    let items = match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    };

    let normalized = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(mut map) => {
                normalize_object(&mut map);
                Some(Value::Object(map))
            }
            Value::String(s) if !s.trim().is_empty() => Some(promote_string(key, string_field, s)),
            _ => None,
        })
        .collect();

    Value::Array(normalized)
}

/// Turn a bare string in an object list into the object the schema expects
fn promote_string(key: &str, field: &str, s: String) -> Value {
    match key {
        "findings" => json!({ "category": "General", "description": s }),
        "observedFeatures" => json!({
            "technicalTerm": s,
            "simpleName": s,
            "whatItMeans": "Finding observed in the image.",
            "analogy": "",
            "whyImportant": "Specialist consultation is recommended.",
            "locationInImage": "Seen in the image"
        }),
        _ => json!({ field: s }),
    }
}

fn coerce_string_list(value: Value) -> Value {
    let items = match value {
        Value::Array(items) => items,
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        other => vec![other],
    };
    Value::Array(
        items
            .into_iter()
            .filter_map(coerce_string)
            .filter(|s| !s.trim().is_empty())
            .map(Value::String)
            .collect(),
    )
}

fn coerce_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.into_iter().filter_map(coerce_string).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("; "))
            }
        }
        Value::Object(_) | Value::Null => None,
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" | "o" => Some(true),
            "false" | "no" | "n" | "0" | "x" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Non-negative whole number from a number or a string such as "8 hours"
fn coerce_count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|f| *f >= 0.0 && *f <= u32::MAX as f64)
            .map(|f| f.round() as u32),
        Value::String(s) => {
            let digits: String = s
                .trim()
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

// ============================================================================
// DISEASE CODE PRIORITY
// ============================================================================

fn normalize_disease_codes(root: &mut Map<String, Value>) {
    let Some(Value::Object(codes)) = root.get_mut("diseaseCodes") else {
        return;
    };
    for group in ["primary", "secondary"] {
        if let Some(Value::Array(items)) = codes.get_mut(group) {
            for item in items.iter_mut() {
                if let Value::Object(code) = item {
                    let raw = code.get("priority").and_then(|p| p.as_str());
                    let priority = normalize_priority(raw);
                    code.insert("priority".to_string(), Value::String(priority.to_string()));
                }
            }
        }
    }
}

/// Map free-form priority text onto HIGH / MODERATE / LOW
pub fn normalize_priority(raw: Option<&str>) -> &'static str {
    let Some(raw) = raw else {
        return "MODERATE";
    };
    let upper = raw.trim().to_uppercase();
    if upper.contains("HIGH") || upper.contains("URGENT") || raw.contains("높") {
        "HIGH"
    } else if upper.contains("LOW") || raw.contains("낮") {
        "LOW"
    } else {
        "MODERATE"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::report::Priority;
    use crate::models::ReportDraft;

    fn draft(value: Value) -> ReportDraft {
        serde_json::from_value(normalize(value)).expect("normalized payload deserializes")
    }

    #[test]
    fn test_findings_paragraph_becomes_general_finding() {
        let d = draft(json!({ "findings": "Small lacunar infarct in the left basal ganglia." }));
        assert_eq!(d.findings.len(), 1);
        assert_eq!(d.findings[0].category, "General");
        assert!(d.findings[0].description.starts_with("Small lacunar"));
    }

    #[test]
    fn test_impression_string_becomes_summary() {
        let d = draft(json!({ "impression": "No acute abnormality." }));
        assert_eq!(d.impression.summary, "No acute abnormality.");
    }

    #[test]
    fn test_observed_feature_strings_become_objects() {
        let d = draft(json!({
            "diseaseCodes": { "primary": [{
                "code": "I63.9",
                "priority": "high",
                "observedFeatures": ["T2 hyperintensity", { "technicalTerm": "DWI restriction" }]
            }]}
        }));
        let code = &d.disease_codes.primary[0];
        assert_eq!(code.priority, Priority::High);
        assert_eq!(code.observed_features[0].technical_term, "T2 hyperintensity");
        assert_eq!(code.observed_features[0].simple_name, "T2 hyperintensity");
        assert!(!code.observed_features[0].why_important.is_empty());
        assert_eq!(code.observed_features[1].technical_term, "DWI restriction");
    }

    #[test]
    fn test_disease_codes_flat_list() {
        let d = draft(json!({ "diseaseCodes": [{ "code": "J18.9", "priority": "MEDIUM" }] }));
        assert_eq!(d.disease_codes.primary[0].code, "J18.9");
        assert_eq!(d.disease_codes.primary[0].priority, Priority::Moderate);
    }

    #[test]
    fn test_scalar_coercions() {
        let d = draft(json!({
            "patientInfo": { "age": 70, "name": null, "patientId": 2448 },
            "findings": [{ "description": "normal", "isNormal": "yes" }],
            "recommendations": { "clinicStrategy": { "requiredTests": [{
                "category": "Same day",
                "tests": [{ "name": "MRA", "fastingHours": "8 hours", "fastingRequired": "no", "insuranceCovered": "unknown" }]
            }]}}
        }));
        assert_eq!(d.patient_info.age, "70");
        assert_eq!(d.patient_info.patient_id, "2448");
        assert_eq!(d.patient_info.name, "");
        assert_eq!(d.findings[0].is_normal, Some(true));
        let test = &d.recommendations.clinic_strategy.required_tests[0].tests[0];
        assert_eq!(test.fasting_hours, Some(8));
        assert_eq!(test.fasting_required, Some(false));
        assert_eq!(test.insurance_covered, None);
    }

    #[test]
    fn test_string_lists_and_mismatched_containers() {
        let d = draft(json!({
            "diseaseCodes": { "primary": [{ "references": "WHO ICD-10", "nextSteps": ["See neurology", 2, null] }] },
            "recommendations": {
                "universityHospitalStrategy": { "questionsToAsk": "Is surgery needed?", "timeline": "Week 1: referral" },
                "clinicStrategy": { "costSummary": "about 150,000 KRW" },
                "notes": { "unexpected": "object" }
            },
            "medicalTerms": ["Lacune"],
            "disclaimer": "Reference only"
        }));
        let code = &d.disease_codes.primary[0];
        assert_eq!(code.references, vec!["WHO ICD-10"]);
        assert_eq!(code.next_steps, vec!["See neurology", "2"]);
        let uhs = &d.recommendations.university_hospital_strategy;
        assert_eq!(uhs.questions_to_ask, vec!["Is surgery needed?"]);
        assert_eq!(uhs.timeline[0].action, "Week 1: referral");
        assert_eq!(d.recommendations.clinic_strategy.cost_summary.total, "about 150,000 KRW");
        assert_eq!(d.recommendations.notes, "");
        assert_eq!(d.medical_terms[0].term, "Lacune");
        assert_eq!(d.disclaimer.english, "Reference only");
    }

    #[test]
    fn test_recommendations_string_becomes_follow_up() {
        let d = draft(json!({ "recommendations": "Follow up in 6 months" }));
        assert_eq!(d.recommendations.follow_up, "Follow up in 6 months");
    }

    #[test]
    fn test_legacy_and_current_keys_together() {
        let d = draft(json!({
            "examInfo": { "institution": "Seoul Hospital", "hospital": "Seoul Hospital" },
            "findings": "Lacune.",
            "medicalTerms": [
                { "term": "Lacune", "simpleExplanation": "", "explanation": "A small hole", "koreanTerm": "라쿠네", "localizedTerm": null },
                { "term": "Infarct", "simpleExplanation": "Dead tissue", "explanation": "Old text" }
            ],
            "disclaimer": { "korean": "참고용", "localized": "참고용", "english": "Reference only" }
        }));
        assert_eq!(d.exam_info.institution, "Seoul Hospital");
        assert_eq!(d.medical_terms[0].simple_explanation, "A small hole");
        assert_eq!(d.medical_terms[0].localized_term, "라쿠네");
        assert_eq!(d.medical_terms[1].simple_explanation, "Dead tissue");
        assert_eq!(d.disclaimer.localized, "참고용");
    }

    #[test]
    fn test_normalize_priority() {
        assert_eq!(normalize_priority(Some("High")), "HIGH");
        assert_eq!(normalize_priority(Some("medium")), "MODERATE");
        assert_eq!(normalize_priority(Some("LOW")), "LOW");
        assert_eq!(normalize_priority(Some("높음")), "HIGH");
        assert_eq!(normalize_priority(Some("???")), "MODERATE");
        assert_eq!(normalize_priority(None), "MODERATE");
    }

    #[test]
    fn test_missing_priority_gets_default() {
        let value = normalize(json!({ "diseaseCodes": { "secondary": [{ "code": "R51" }] } }));
        assert_eq!(value["diseaseCodes"]["secondary"][0]["priority"], "MODERATE");
    }
}
