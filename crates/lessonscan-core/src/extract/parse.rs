//! Turning a model reply into a schema-shaped JSON object.

use serde_json::{Map, Value};

use super::schema::{ExtractionSchema, SELF_ASSESSMENT_KEY};

/// Parse the reply as a JSON object, with one repair attempt.
///
/// The repair strips a markdown code fence and then keeps the span from the
/// first `{` to the last `}`.
pub(crate) fn parse_object(raw: &str) -> Result<Map<String, Value>, String> {
    let first_error = match parse_strict(raw) {
        Ok(object) => return Ok(object),
        Err(e) => e,
    };

    let Some(repaired) = repair(raw) else {
        return Err(first_error);
    };
    parse_strict(repaired)
}

fn parse_strict(raw: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(format!(
            "Expected a JSON object, got {}",
            json_type_name(&other)
        )),
        Err(e) => Err(format!("Invalid JSON: {}", e)),
    }
}

fn repair(raw: &str) -> Option<&str> {
    let unfenced = strip_code_fence(raw.trim());
    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    (end > start).then(|| &unfenced[start..=end])
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. "json") on the opening line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Remove the model's self-assessment and normalize it to `[0, 1]`.
///
/// Values in `(1, 100]` are read as percentages.
pub(crate) fn take_self_assessment(object: &mut Map<String, Value>) -> Option<f64> {
    let value = object.remove(SELF_ASSESSMENT_KEY)?;
    let score = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !score.is_finite() {
        return None;
    }
    let score = if score > 1.0 && score <= 100.0 {
        score / 100.0
    } else {
        score
    };
    Some(score.clamp(0.0, 1.0))
}

/// Whether a value carries content
pub(crate) fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Schema fields the reply left out or left empty
#[derive(Debug, Default, PartialEq)]
pub(crate) struct FieldReport {
    pub missing: Vec<String>,
    pub empty: Vec<String>,
    pub populated: usize,
    pub total: usize,
}

impl FieldReport {
    pub fn completeness(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.populated as f64 / self.total as f64
        }
    }
}

/// Insert defaults for missing schema fields and report on field coverage.
/// Keys outside the schema are left alone.
pub(crate) fn fill_defaults(object: &mut Map<String, Value>, schema: &ExtractionSchema) -> FieldReport {
    let mut report = FieldReport {
        total: schema.fields.len(),
        ..Default::default()
    };

    for field in schema.fields {
        match object.get(field.name) {
            Some(value) if is_populated(value) => report.populated += 1,
            Some(_) => report.empty.push(field.name.to_string()),
            None => {
                object.insert(field.name.to_string(), field.kind.default_value());
                report.missing.push(field.name.to_string());
            }
        }
    }

    report
}

/// `clamp01((1 - w) * completeness + w * self_score)`, rounded to 2 decimals.
/// Without a self-assessment the score is the completeness alone.
pub(crate) fn confidence_score(completeness: f64, self_score: Option<f64>, weight: f64) -> f64 {
    let weight = weight.clamp(0.0, 1.0);
    let score = match self_score {
        Some(s) => (1.0 - weight) * completeness + weight * s,
        None => completeness,
    };
    (score.clamp(0.0, 1.0) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractionType;
    use serde_json::json;

    #[test]
    fn test_parse_plain_object() {
        let object = parse_object(r#"  {"title": "Math Quiz"} "#).unwrap();
        assert_eq!(object["title"], "Math Quiz");
    }

    #[test]
    fn test_parse_code_fenced_object() {
        let raw = "```json\n{\"title\": \"Fractions\", \"topics\": [\"halves\"]}\n```";
        let object = parse_object(raw).unwrap();
        assert_eq!(object["topics"], json!(["halves"]));
    }

    #[test]
    fn test_parse_object_wrapped_in_prose() {
        let raw = "Sure! Here is the data:\n{\"mainContent\": \"notes\"}\nLet me know if you need more.";
        let object = parse_object(raw).unwrap();
        assert_eq!(object["mainContent"], "notes");
    }

    #[test]
    fn test_prose_only_is_malformed() {
        let err = parse_object("I could not find any structured content.").unwrap_err();
        assert!(err.starts_with("Invalid JSON"));
    }

    #[test]
    fn test_array_reply_is_malformed() {
        let err = parse_object("[1, 2, 3]").unwrap_err();
        assert_eq!(err, "Expected a JSON object, got an array");
    }

    #[test]
    fn test_unrepairable_braces_stay_malformed() {
        assert!(parse_object("{ title: 'unquoted' }").is_err());
    }

    #[test]
    fn test_self_assessment_normalization() {
        let mut object = json!({"confidence": 85, "title": "x"})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(take_self_assessment(&mut object), Some(0.85));
        assert!(!object.contains_key("confidence"));

        let mut object = json!({"confidence": "0.4"}).as_object().cloned().unwrap();
        assert_eq!(take_self_assessment(&mut object), Some(0.4));

        let mut object = json!({"confidence": 250}).as_object().cloned().unwrap();
        assert_eq!(take_self_assessment(&mut object), Some(1.0));

        let mut object = json!({"confidence": -3}).as_object().cloned().unwrap();
        assert_eq!(take_self_assessment(&mut object), Some(0.0));

        let mut object = json!({"confidence": "high"}).as_object().cloned().unwrap();
        assert_eq!(take_self_assessment(&mut object), None);
        assert!(!object.contains_key("confidence"));
    }

    #[test]
    fn test_fill_defaults_reports_missing_and_empty() {
        let schema = ExtractionSchema::for_type(ExtractionType::FormData);
        let mut object = json!({
            "formType": "Permission slip",
            "checkboxes": [],
            "extra": "kept"
        })
        .as_object()
        .cloned()
        .unwrap();

        let report = fill_defaults(&mut object, schema);

        assert_eq!(report.populated, 1);
        assert_eq!(report.total, 5);
        assert_eq!(report.empty, ["checkboxes"]);
        assert_eq!(report.missing, ["fields", "dates", "signatures"]);
        assert_eq!(object["fields"], json!({}));
        assert_eq!(object["dates"], json!([]));
        assert_eq!(object["extra"], "kept");
        assert!((report.completeness() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_populated_values() {
        assert!(!is_populated(&json!(null)));
        assert!(!is_populated(&json!("   ")));
        assert!(!is_populated(&json!([])));
        assert!(!is_populated(&json!({})));
        assert!(is_populated(&json!(0)));
        assert!(is_populated(&json!(false)));
        assert!(is_populated(&json!(["a"])));
    }

    #[test]
    fn test_confidence_score_blend() {
        assert_eq!(confidence_score(0.5, None, 0.3), 0.5);
        assert_eq!(confidence_score(1.0, Some(0.5), 0.3), 0.85);
        assert_eq!(confidence_score(0.0, Some(1.0), 0.3), 0.3);
        assert_eq!(confidence_score(1.0, Some(1.0), 5.0), 1.0);
        assert_eq!(confidence_score(2.0 / 3.0, None, 0.3), 0.67);
    }
}
