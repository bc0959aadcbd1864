// Response repair - recover a JSON object from free-text model output
//
// Models wrap JSON in code fences, prepend reasoning, emit raw newlines inside
// strings, leave trailing commas, and get cut off at max_tokens. The scanner
// below walks the text once, tracking string/escape state and an
// object/array stack, and rewrites it into something serde_json accepts.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error("no JSON object found in model response")]
    NoJsonObject,

    #[error("JSON still invalid after repair: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Output of [`repair_json`]
#[derive(Debug, Clone, PartialEq)]
pub struct Repaired {
    pub json: String,
    /// Input ended before the root object closed
    pub truncated: bool,
    /// Characters were escaped or dropped (besides truncation closers)
    pub modified: bool,
}

const REFUSAL_MARKERS: &[&str] = &[
    "i'm sorry",
    "i am sorry",
    "i can't assist",
    "i cannot",
    "i can't help",
    "i'm unable",
    "i am unable",
];

/// Objects tried before giving up on a response
const MAX_CANDIDATES: usize = 8;

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(?:json|JSON)?\s*").expect("fence regex is valid"))
}

/// Drop reasoning blocks some models emit before the answer
pub fn strip_think_blocks(text: &str) -> &str {
    match text.rfind("</think>") {
        Some(idx) => &text[idx + "</think>".len()..],
        None => text,
    }
}

/// Remove markdown code fences (```json ... ```)
pub fn strip_code_fences(text: &str) -> String {
    fence_regex().replace_all(text, "").into_owned()
}

/// True when the model declined to analyse the image
pub fn is_refusal(text: &str) -> bool {
    let lowered = text.to_lowercase().replace('\u{2019}', "'");
    REFUSAL_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Full chain: strip reasoning and fences, repair, parse.
///
/// When a closed candidate object fails to parse (prose such as
/// "see {below}"), scanning resumes at the next `{` after it.
pub fn parse_model_json(raw: &str) -> Result<Value, RepairError> {
    let cleaned = strip_code_fences(strip_think_blocks(raw));
    let mut rest = cleaned.as_str();
    let mut first_error = None;

    for _ in 0..MAX_CANDIDATES {
        let Some(start) = rest.find('{') else {
            break;
        };
        let (repaired, end) = scan_object(&rest[start..]);
        match serde_json::from_str(&repaired.json) {
            Ok(value) => {
                log_repair(&repaired, &cleaned);
                return Ok(value);
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
        match end {
            Some(end) => rest = &rest[start + end..],
            None => break,
        }
    }

    Err(first_error.map_or(RepairError::NoJsonObject, RepairError::Invalid))
}

fn log_repair(repaired: &Repaired, cleaned: &str) {
    if repaired.truncated {
        tracing::warn!(
            "Model JSON was truncated at {} chars - closed {} bytes of output",
            cleaned.chars().count(),
            repaired.json.len()
        );
    } else if repaired.modified {
        tracing::info!("Model JSON needed minor repair (control chars / trailing commas)");
    }
}

// ============================================================================
// SCANNER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum ObjState {
    Key,
    Colon,
    Value,
    Next,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ArrState {
    Value,
    Next,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Frame {
    Object(ObjState),
    Array(ArrState),
}

#[derive(Default)]
struct Scanner {
    out: String,
    stack: Vec<Frame>,
    /// Output length and stack at the last point where appending closers
    /// yields valid JSON
    safe_len: usize,
    safe_stack: Vec<Frame>,
    in_string: bool,
    string_is_key: bool,
    /// Output index of the backslash of an escape still being read, and the
    /// number of `\u` hex digits still expected
    escape: Option<(usize, u8)>,
    /// Output index of a `\u` high surrogate still waiting for its low half
    open_surrogate: Option<usize>,
    scalar_start: Option<usize>,
    pending_comma: Option<usize>,
    modified: bool,
}

impl Scanner {
    fn mark_safe(&mut self) {
        self.safe_len = self.out.len();
        self.safe_stack = self.stack.clone();
    }

    fn value_done(&mut self) {
        match self.stack.last_mut() {
            Some(Frame::Object(state)) => *state = ObjState::Next,
            Some(Frame::Array(state)) => *state = ArrState::Next,
            None => {}
        }
        self.mark_safe();
    }

    fn end_scalar(&mut self) {
        if self.scalar_start.take().is_some() {
            self.value_done();
        }
    }

    fn push_string_char(&mut self, c: char) {
        if let Some((start, hex_left)) = self.escape {
            self.out.push(c);
            match hex_left {
                0 if c == 'u' => self.escape = Some((start, 4)),
                0 => {
                    self.escape = None;
                    self.open_surrogate = None;
                }
                1 => {
                    self.escape = None;
                    self.unicode_escape_done(start);
                }
                n => self.escape = Some((start, n - 1)),
            }
            return;
        }
        if c != '\\' {
            self.open_surrogate = None;
        }
        match c {
            '\\' => {
                self.escape = Some((self.out.len(), 0));
                self.out.push(c);
            }
            '"' => {
                self.out.push(c);
                self.in_string = false;
                if self.string_is_key {
                    if let Some(Frame::Object(state)) = self.stack.last_mut() {
                        *state = ObjState::Colon;
                    }
                } else {
                    self.value_done();
                }
            }
            '\n' => self.push_escaped("\\n"),
            '\r' => self.push_escaped("\\r"),
            '\t' => self.push_escaped("\\t"),
            c if (c as u32) < 0x20 => self.push_escaped(&format!("\\u{:04x}", c as u32)),
            c => self.out.push(c),
        }
    }

    /// `start` is the backslash of a complete `\uXXXX`
    fn unicode_escape_done(&mut self, start: usize) {
        let unit = self
            .out
            .get(start + 2..)
            .and_then(|hex| u16::from_str_radix(hex, 16).ok());
        self.open_surrogate = match unit {
            Some(0xD800..=0xDBFF) => Some(start),
            _ => None,
        };
    }

    fn push_escaped(&mut self, escaped: &str) {
        self.out.push_str(escaped);
        self.modified = true;
    }

    /// Feed one character outside a string. Returns true once the root closes.
    fn push_structural(&mut self, c: char) -> bool {
        match c {
            '"' => {
                self.end_scalar();
                self.pending_comma = None;
                self.string_is_key =
                    matches!(self.stack.last(), Some(Frame::Object(ObjState::Key)));
                self.in_string = true;
                self.out.push(c);
            }
            '{' | '[' => {
                self.end_scalar();
                self.pending_comma = None;
                self.stack.push(if c == '{' {
                    Frame::Object(ObjState::Key)
                } else {
                    Frame::Array(ArrState::Value)
                });
                self.out.push(c);
                self.mark_safe();
            }
            '}' | ']' => {
                self.end_scalar();
                if let Some(idx) = self.pending_comma.take() {
                    self.out.truncate(idx);
                    self.modified = true;
                }
                self.out.push(c);
                self.stack.pop();
                if self.stack.is_empty() {
                    return true;
                }
                self.value_done();
            }
            ':' => {
                self.end_scalar();
                if let Some(Frame::Object(state @ ObjState::Colon)) = self.stack.last_mut() {
                    *state = ObjState::Value;
                }
                self.out.push(c);
            }
            ',' => {
                self.end_scalar();
                match self.stack.last_mut() {
                    Some(Frame::Object(state)) => *state = ObjState::Key,
                    Some(Frame::Array(state)) => *state = ArrState::Value,
                    None => {}
                }
                self.pending_comma = Some(self.out.len());
                self.out.push(c);
            }
            c if c.is_whitespace() => {
                self.end_scalar();
                self.out.push(c);
            }
            c => {
                if self.scalar_start.is_none() {
                    self.pending_comma = None;
                    self.scalar_start = Some(self.out.len());
                }
                self.out.push(c);
            }
        }
        false
    }

    /// Close whatever is open after the input ran out
    fn finish_truncated(mut self) -> Repaired {
        if self.in_string {
            if !self.string_is_key {
                // A partial escape or a lone high surrogate cannot be closed
                let cut = self.open_surrogate.or(self.escape.map(|(start, _)| start));
                if let Some(cut) = cut {
                    self.out.truncate(cut);
                }
                self.out.push('"');
                self.value_done();
            }
        } else if let Some(start) = self.scalar_start {
            if serde_json::from_str::<Value>(&self.out[start..]).is_ok() {
                self.value_done();
            }
        }

        self.out.truncate(self.safe_len);
        for frame in self.safe_stack.iter().rev() {
            self.out.push(match frame {
                Frame::Object(_) => '}',
                Frame::Array(_) => ']',
            });
        }

        Repaired {
            json: self.out,
            truncated: true,
            modified: self.modified,
        }
    }
}

/// Extract the first JSON object from `text` and repair it. Returns `None`
/// when the text contains no `{`.
pub fn repair_json(text: &str) -> Option<Repaired> {
    let start = text.find('{')?;
    Some(scan_object(&text[start..]).0)
}

/// Scan one object starting at the `{` that opens `text`. Also returns the
/// byte offset just past the closing brace when the root closed.
fn scan_object(text: &str) -> (Repaired, Option<usize>) {
    let mut scanner = Scanner::default();

    for (idx, c) in text.char_indices() {
        if scanner.in_string {
            scanner.push_string_char(c);
        } else if scanner.push_structural(c) {
            let repaired = Repaired {
                json: scanner.out,
                truncated: false,
                modified: scanner.modified,
            };
            return (repaired, Some(idx + c.len_utf8()));
        }
    }

    (scanner.finish_truncated(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn repaired(text: &str) -> Value {
        let r = repair_json(text).expect("object present");
        serde_json::from_str(&r.json).unwrap_or_else(|e| panic!("{} -> {}: {}", text, r.json, e))
    }

    #[test]
    fn test_complete_object_passes_through() {
        let r = repair_json(r#"{"a": [1, 2], "b": {"c": "x}y"}}"#).unwrap();
        assert!(!r.truncated);
        assert!(!r.modified);
        assert_eq!(r.json, r#"{"a": [1, 2], "b": {"c": "x}y"}}"#);
    }

    #[test]
    fn test_surrounding_prose_and_fences_are_dropped() {
        let raw = "Sure! Here is the analysis:\n```json\n{\"findings\": \"normal\"}\n```\nLet me know.";
        assert_eq!(parse_model_json(raw).unwrap(), json!({ "findings": "normal" }));
    }

    #[test]
    fn test_think_block_is_skipped() {
        let raw = "<think>maybe {\"wrong\": true}</think>{\"right\": true}";
        assert_eq!(parse_model_json(raw).unwrap(), json!({ "right": true }));
    }

    #[test]
    fn test_raw_newlines_inside_strings_are_escaped() {
        let r = repair_json("{\"findings\": \"line one\nline two\"}").unwrap();
        assert!(r.modified);
        assert_eq!(
            serde_json::from_str::<Value>(&r.json).unwrap(),
            json!({ "findings": "line one\nline two" })
        );
    }

    #[test]
    fn test_trailing_commas_are_removed() {
        assert_eq!(
            repaired(r#"{"a": [1, 2, ], "b": {"c": 1,}, }"#),
            json!({ "a": [1, 2], "b": { "c": 1 } })
        );
    }

    #[test]
    fn test_truncated_value_string_is_closed() {
        let r = repair_json(r#"{"findings": "small lacunar inf"#).unwrap();
        assert!(r.truncated);
        assert_eq!(
            serde_json::from_str::<Value>(&r.json).unwrap(),
            json!({ "findings": "small lacunar inf" })
        );
    }

    #[test]
    fn test_truncated_key_is_dropped() {
        assert_eq!(repaired(r#"{"a": 1, "imp"#), json!({ "a": 1 }));
        assert_eq!(repaired(r#"{"a": 1, "impression": "#), json!({ "a": 1 }));
        assert_eq!(repaired(r#"{"a": 1, "#), json!({ "a": 1 }));
    }

    #[test]
    fn test_truncated_nested_containers_close_in_order() {
        assert_eq!(
            repaired(r#"{"codes": {"primary": [{"code": "I63.9", "nextSteps": ["see neuro"#),
            json!({ "codes": { "primary": [{ "code": "I63.9", "nextSteps": ["see neuro"] }] } })
        );
        assert_eq!(repaired(r#"{"a": {"#), json!({ "a": {} }));
        assert_eq!(repaired(r#"{"a": [1, 2"#), json!({ "a": [1, 2] }));
    }

    #[test]
    fn test_truncated_scalars() {
        assert_eq!(repaired(r#"{"hours": 8"#), json!({ "hours": 8 }));
        assert_eq!(repaired(r#"{"ok": true, "covered": tr"#), json!({ "ok": true }));
    }

    #[test]
    fn test_dangling_escape_is_dropped() {
        assert_eq!(repaired(r#"{"a": "x\"#), json!({ "a": "x" }));
    }

    #[test]
    fn test_truncated_unicode_escape_is_dropped() {
        assert_eq!(
            parse_model_json(r#"{"findings": "Normal \u00"#).unwrap(),
            json!({ "findings": "Normal " })
        );
        assert_eq!(repaired(r#"{"a": "x\u"#), json!({ "a": "x" }));
        assert_eq!(repaired(r#"{"a": "\u00e9t\u00e"#), json!({ "a": "\u{e9}t" }));
    }

    #[test]
    fn test_truncated_lone_high_surrogate_is_dropped() {
        assert_eq!(
            parse_model_json(r#"{"findings": "x \ud83d"#).unwrap(),
            json!({ "findings": "x " })
        );
        assert_eq!(repaired(r#"{"a": "x \ud83d\ude"#), json!({ "a": "x " }));
        assert_eq!(
            repaired(r#"{"a": "ok \ud83d\ude00 and"#),
            json!({ "a": "ok \u{1F600} and" })
        );
    }

    #[test]
    fn test_braces_in_leading_prose_are_skipped() {
        let raw = "Based on the image {see below}:\n{\"findings\": \"Lacune.\"}";
        assert_eq!(parse_model_json(raw).unwrap(), json!({ "findings": "Lacune." }));
    }

    #[test]
    fn test_invalid_root_does_not_fall_back_to_nested_object() {
        let raw = r#"{"findings": [{"a": 1}], "x": bad}"#;
        assert!(matches!(parse_model_json(raw), Err(RepairError::Invalid(_))));
    }

    #[test]
    fn test_no_object() {
        assert!(repair_json("I cannot help with that.").is_none());
        assert!(matches!(
            parse_model_json("no json here"),
            Err(RepairError::NoJsonObject)
        ));
    }

    #[test]
    fn test_refusal_detection() {
        assert!(is_refusal("I’m sorry, but I can’t assist with that request."));
        assert!(is_refusal("I cannot analyze this image."));
        assert!(!is_refusal("{\"findings\": \"No acute infarction\"}"));
    }
}
