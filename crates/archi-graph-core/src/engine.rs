//! Sanitization and validation engine.
//!
//! [`Engine::sanitize`] turns raw client input into the canonical stored
//! form for a field; [`Engine::validate`] checks a sanitized value against
//! the field's rules.
//!
//! For keys the registry does not know, sanitize falls back to the generic
//! text sanitizer while validate fails with
//! [`ValidationErrorKind::UnknownField`]. A write of an unknown key is
//! always rejected.
//!
//! # Rule order
//!
//! Generic fields are checked in this order, stopping at the first failure:
//!
//! 1. allowed-set membership (`InvalidValue`)
//! 2. numeric minimum (`TooSmall`)
//! 3. numeric maximum (`TooLarge`)
//! 4. string maximum length (`TooLong`)
//! 5. pattern match (`BadFormat`)
//!
//! Position and id-list fields use their own validators instead.

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;
use serde_json::{json, Number, Value};

use crate::error::{ValidationError, ValidationErrorKind};
use crate::schema::{FieldType, Namespace, SchemaRegistry, BOOLEAN_OPTIONS, COLOR_PATTERN};

/// Validation rules for the generic rule sequence.
struct Rules<'a> {
    expects_number: bool,
    options: Option<&'static [&'static str]>,
    min: Option<f64>,
    max: Option<f64>,
    max_len: Option<usize>,
    pattern: Option<&'a Regex>,
}

/// Sanitizes and validates metadata values against a [`SchemaRegistry`].
#[derive(Debug, Clone)]
pub struct Engine {
    schema: Arc<SchemaRegistry>,
    color: Regex,
}

impl Engine {
    pub fn new(schema: Arc<SchemaRegistry>) -> Self {
        Self {
            schema,
            color: Regex::new(COLOR_PATTERN).expect("color pattern is a valid regex"),
        }
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    /// Produce the cleaned value for `key`. Unknown keys get the generic
    /// text sanitizer.
    pub fn sanitize(&self, key: &str, raw: &Value, namespace: Option<Namespace>) -> Value {
        match self.schema.lookup(key, namespace) {
            Some(def) => def.field_type.sanitize(raw),
            None => Value::String(sanitize_text(raw)),
        }
    }

    /// Check a cleaned value against the rules of `key`.
    pub fn validate(
        &self,
        key: &str,
        value: &Value,
        namespace: Option<Namespace>,
    ) -> Result<(), ValidationError> {
        let def = self.schema.lookup(key, namespace).ok_or_else(|| {
            let message = match namespace {
                Some(ns) => format!("no field '{}' is defined in the {} namespace", key, ns),
                None => format!("no field '{}' is defined", key),
            };
            ValidationError::new(key, ValidationErrorKind::UnknownField, message)
        })?;

        match &def.field_type {
            FieldType::Position => validate_position(key, value),
            FieldType::IdList => validate_id_list(key, value),
            FieldType::Boolean => check_rules(
                key,
                value,
                Rules {
                    expects_number: false,
                    options: Some(BOOLEAN_OPTIONS),
                    min: None,
                    max: None,
                    max_len: None,
                    pattern: None,
                },
            ),
            FieldType::Color => check_rules(
                key,
                value,
                Rules {
                    expects_number: false,
                    options: None,
                    min: None,
                    max: None,
                    max_len: Some(7),
                    pattern: Some(&self.color),
                },
            ),
            FieldType::Number { min, max, integer } => {
                if *integer && value.as_f64().is_some() && value.as_i64().is_none() {
                    return Err(ValidationError::new(
                        key,
                        ValidationErrorKind::InvalidValue,
                        "must be a whole number",
                    ));
                }
                check_rules(
                    key,
                    value,
                    Rules {
                        expects_number: true,
                        options: None,
                        min: *min,
                        max: *max,
                        max_len: None,
                        pattern: None,
                    },
                )
            }
            FieldType::Select { options } => check_rules(
                key,
                value,
                Rules {
                    expects_number: false,
                    options: Some(*options),
                    min: None,
                    max: None,
                    max_len: None,
                    pattern: None,
                },
            ),
            FieldType::Text { max_len, pattern } => check_rules(
                key,
                value,
                Rules {
                    expects_number: false,
                    options: None,
                    min: None,
                    max: None,
                    max_len: *max_len,
                    pattern: pattern.as_ref(),
                },
            ),
        }
    }

    /// Sanitize then validate, returning the value that may be stored.
    pub fn clean(
        &self,
        key: &str,
        raw: &Value,
        namespace: Option<Namespace>,
    ) -> Result<Value, ValidationError> {
        let value = self.sanitize(key, raw, namespace);
        self.validate(key, &value, namespace)?;
        Ok(value)
    }
}

impl FieldType {
    /// Coerce raw input into this type's canonical stored form. Never fails;
    /// input that cannot be coerced is passed through so validation can
    /// report it.
    pub fn sanitize(&self, raw: &Value) -> Value {
        match self {
            FieldType::Boolean => json!(if is_truthy(raw) { "1" } else { "0" }),
            FieldType::Color => sanitize_color(raw),
            FieldType::Number { integer, .. } => sanitize_number(raw, *integer),
            FieldType::Select { .. } => match raw {
                Value::String(s) => Value::String(s.trim().to_lowercase()),
                Value::Number(n) => Value::String(n.to_string()),
                other => other.clone(),
            },
            FieldType::Text { .. } => Value::String(sanitize_text(raw)),
            FieldType::Position => sanitize_position(raw),
            FieldType::IdList => sanitize_id_list(raw),
        }
    }
}

fn check_rules(key: &str, value: &Value, rules: Rules<'_>) -> Result<(), ValidationError> {
    let fail = |kind, message: String| Err(ValidationError::new(key, kind, message));

    if rules.expects_number {
        if value.as_f64().is_none() {
            return fail(ValidationErrorKind::InvalidValue, "must be a number".to_string());
        }
    } else if !value.is_string() {
        return fail(ValidationErrorKind::InvalidValue, "must be a string".to_string());
    }

    if let Some(options) = rules.options {
        let ok = value.as_str().is_some_and(|s| options.contains(&s));
        if !ok {
            return fail(
                ValidationErrorKind::InvalidValue,
                format!("must be one of: {}", options.join(", ")),
            );
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = rules.min {
            if n < min {
                return fail(ValidationErrorKind::TooSmall, format!("must be at least {}", min));
            }
        }
        if let Some(max) = rules.max {
            if n > max {
                return fail(ValidationErrorKind::TooLarge, format!("must be at most {}", max));
            }
        }
    }

    if let Some(s) = value.as_str() {
        if let Some(max_len) = rules.max_len {
            if s.chars().count() > max_len {
                return fail(
                    ValidationErrorKind::TooLong,
                    format!("must be at most {} characters", max_len),
                );
            }
        }
        // An empty string clears the field and reads back as the default.
        if let Some(pattern) = rules.pattern {
            if !s.is_empty() && !pattern.is_match(s) {
                return fail(
                    ValidationErrorKind::BadFormat,
                    format!("does not match the expected format {}", pattern.as_str()),
                );
            }
        }
    }

    Ok(())
}

fn validate_position(key: &str, value: &Value) -> Result<(), ValidationError> {
    let ok = value.as_object().is_some_and(|obj| {
        obj.len() == 2
            && obj.get("x").and_then(Value::as_i64).is_some()
            && obj.get("y").and_then(Value::as_i64).is_some()
    });
    if ok {
        Ok(())
    } else {
        Err(ValidationError::new(
            key,
            ValidationErrorKind::InvalidValue,
            "must be an object with integer x and y",
        ))
    }
}

fn validate_id_list(key: &str, value: &Value) -> Result<(), ValidationError> {
    let items = value.as_array().ok_or_else(|| {
        ValidationError::new(key, ValidationErrorKind::InvalidValue, "must be an array of ids")
    })?;
    let mut seen = HashSet::new();
    for item in items {
        match item.as_i64() {
            Some(id) if id > 0 => {
                if !seen.insert(id) {
                    return Err(ValidationError::new(
                        key,
                        ValidationErrorKind::InvalidValue,
                        format!("contains duplicate id {}", id),
                    ));
                }
            }
            _ => {
                return Err(ValidationError::new(
                    key,
                    ValidationErrorKind::InvalidValue,
                    format!("contains an invalid id: {}", item),
                ))
            }
        }
    }
    Ok(())
}

fn is_truthy(raw: &Value) -> bool {
    match raw {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        _ => false,
    }
}

fn sanitize_color(raw: &Value) -> Value {
    let s = match raw {
        Value::String(s) => s.trim().to_ascii_lowercase(),
        Value::Null => return Value::String(String::new()),
        other => return other.clone(),
    };
    if s.is_empty() {
        return Value::String(s);
    }
    let hex = s.strip_prefix('#').unwrap_or(&s);
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Value::String(s);
    }
    match hex.len() {
        3 => Value::String(format!(
            "#{}",
            hex.chars().flat_map(|c| [c, c]).collect::<String>()
        )),
        _ => Value::String(format!("#{}", hex)),
    }
}

fn sanitize_number(raw: &Value, integer: bool) -> Value {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    };
    match parsed {
        Some(f) if integer => json!(f.round() as i64),
        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => json!(f as i64),
        Some(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        None => raw.clone(),
    }
}

fn coerce_coordinate(raw: Option<&Value>) -> i64 {
    let f = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    f.filter(|f| f.is_finite()).map(|f| f.round() as i64).unwrap_or(0)
}

fn sanitize_position(raw: &Value) -> Value {
    let (x, y) = match raw {
        Value::Object(obj) => (obj.get("x"), obj.get("y")),
        Value::Array(items) if items.len() == 2 => (items.first(), items.get(1)),
        _ => return json!({ "x": 0, "y": 0 }),
    };
    json!({ "x": coerce_coordinate(x), "y": coerce_coordinate(y) })
}

fn sanitize_id_list(raw: &Value) -> Value {
    let candidates: Vec<Option<i64>> = match raw {
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .collect(),
        Value::String(s) => s.split(',').map(|p| p.trim().parse().ok()).collect(),
        Value::Number(n) => vec![n.as_i64()],
        _ => Vec::new(),
    };
    let mut seen = HashSet::new();
    let ids: Vec<i64> = candidates
        .into_iter()
        .flatten()
        .filter(|id| *id > 0 && seen.insert(*id))
        .collect();
    json!(ids)
}

/// Generic text cleanup: stringify scalars, strip HTML tags, replace
/// control characters with spaces, and trim.
///
/// A `<` only opens a tag when followed by a letter, `/` or `!`; any other
/// `<` is ordinary text.
pub fn sanitize_text(raw: &Value) -> String {
    let s = match raw {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => (if *b { "1" } else { "" }).to_string(),
        _ => String::new(),
    };
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '<' if !in_tag && chars.peek().is_some_and(opens_tag) => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            c if c.is_control() => out.push(' '),
            c => out.push(c),
        }
    }
    out.trim().to_string()
}

fn opens_tag(next: &char) -> bool {
    next.is_ascii_alphabetic() || matches!(next, '/' | '!')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        GRAPH_POSITION, NODE_COLOR, NODE_SIZE, PRIORITY_LEVEL, RELATED_ARTICLES, SHOW_IN_GRAPH,
    };

    fn engine() -> Engine {
        Engine::new(Arc::new(SchemaRegistry::builtin()))
    }

    fn kind_of(result: Result<Value, ValidationError>) -> ValidationErrorKind {
        result.unwrap_err().kind
    }

    #[test]
    fn test_boolean_coercion() {
        let e = engine();
        for raw in [json!(true), json!(1), json!("yes"), json!(" ON "), json!("1")] {
            assert_eq!(e.sanitize(SHOW_IN_GRAPH, &raw, None), json!("1"), "{}", raw);
        }
        for raw in [json!(false), json!(0), json!("no"), json!(null), json!([1])] {
            assert_eq!(e.sanitize(SHOW_IN_GRAPH, &raw, None), json!("0"), "{}", raw);
        }
    }

    #[test]
    fn test_color_normalized() {
        let e = engine();
        assert_eq!(e.clean(NODE_COLOR, &json!("FF0000"), None).unwrap(), json!("#ff0000"));
        assert_eq!(e.clean(NODE_COLOR, &json!("#AbC"), None).unwrap(), json!("#aabbcc"));
        assert_eq!(
            kind_of(e.clean(NODE_COLOR, &json!("red"), None)),
            ValidationErrorKind::BadFormat
        );
        assert_eq!(
            kind_of(e.clean(NODE_COLOR, &json!("#12345"), None)),
            ValidationErrorKind::BadFormat
        );
    }

    #[test]
    fn test_number_bounds() {
        let e = engine();
        assert_eq!(e.clean(NODE_SIZE, &json!("80"), None).unwrap(), json!(80));
        assert_eq!(e.clean(NODE_SIZE, &json!(79.6), None).unwrap(), json!(80));
        assert_eq!(kind_of(e.clean(NODE_SIZE, &json!(200), None)), ValidationErrorKind::TooLarge);
        assert_eq!(kind_of(e.clean(NODE_SIZE, &json!(10), None)), ValidationErrorKind::TooSmall);
        assert_eq!(
            kind_of(e.clean(NODE_SIZE, &json!("big"), None)),
            ValidationErrorKind::InvalidValue
        );
    }

    #[test]
    fn test_select_membership() {
        let e = engine();
        assert_eq!(e.clean(PRIORITY_LEVEL, &json!(" HIGH "), None).unwrap(), json!("high"));
        assert_eq!(
            kind_of(e.clean(PRIORITY_LEVEL, &json!("urgent"), None)),
            ValidationErrorKind::InvalidValue
        );
    }

    #[test]
    fn test_text_length_and_pattern() {
        let e = engine();
        let long = "x".repeat(201);
        assert_eq!(
            kind_of(e.clean("_archi_project_client", &json!(long), None)),
            ValidationErrorKind::TooLong
        );
        assert_eq!(
            kind_of(e.clean("_archi_project_start_date", &json!("2024/01/01"), None)),
            ValidationErrorKind::BadFormat
        );
        assert!(e.clean("_archi_project_start_date", &json!("2024-01-01"), None).is_ok());
        // Empty clears the field.
        assert!(e.clean("_archi_project_start_date", &json!(""), None).is_ok());
    }

    #[test]
    fn test_rule_order_length_before_pattern() {
        let e = engine();
        // Both too long and malformed: the length rule is reported.
        assert_eq!(
            kind_of(e.clean("_archi_illustration_year", &json!("abcdefgh"), None)),
            ValidationErrorKind::TooLong
        );
    }

    #[test]
    fn test_text_strips_tags_and_control_chars() {
        assert_eq!(
            sanitize_text(&json!("  <b>Studio</b>\tNord\n ")),
            "Studio Nord".to_string()
        );
        assert_eq!(sanitize_text(&json!("a<!-- note -->b")), "ab");
        assert_eq!(sanitize_text(&json!(42)), "42");
        assert_eq!(sanitize_text(&json!({"a": 1})), "");
    }

    #[test]
    fn test_text_keeps_lone_angle_brackets() {
        assert_eq!(
            sanitize_text(&json!("Format < A3, 5 > 2")),
            "Format < A3, 5 > 2"
        );
        assert_eq!(sanitize_text(&json!("x<3 <em>big</em>")), "x<3 big");
        assert_eq!(sanitize_text(&json!("ends with <")), "ends with <");
    }

    #[test]
    fn test_position_coercion() {
        let e = engine();
        assert_eq!(
            e.sanitize(GRAPH_POSITION, &json!({"x": "abc", "y": 5}), None),
            json!({"x": 0, "y": 5})
        );
        assert_eq!(
            e.sanitize(GRAPH_POSITION, &json!({"x": 10.6, "y": "-3.2"}), None),
            json!({"x": 11, "y": -3})
        );
        assert_eq!(e.sanitize(GRAPH_POSITION, &json!({"y": 2}), None), json!({"x": 0, "y": 2}));
        assert_eq!(e.sanitize(GRAPH_POSITION, &json!([4, 9]), None), json!({"x": 4, "y": 9}));
        assert_eq!(e.sanitize(GRAPH_POSITION, &json!("12,4"), None), json!({"x": 0, "y": 0}));
    }

    #[test]
    fn test_position_validator_rejects_extra_fields() {
        let e = engine();
        assert!(e.validate(GRAPH_POSITION, &json!({"x": 1, "y": 2}), None).is_ok());
        let err = e
            .validate(GRAPH_POSITION, &json!({"x": 1, "y": 2, "z": 3}), None)
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::InvalidValue);
    }

    #[test]
    fn test_id_list_dedup_and_filter() {
        let e = engine();
        assert_eq!(
            e.clean(RELATED_ARTICLES, &json!([3, "4", 3, -1, "x", 0, 5]), None).unwrap(),
            json!([3, 4, 5])
        );
        assert_eq!(
            e.clean(RELATED_ARTICLES, &json!("7, 8,7"), None).unwrap(),
            json!([7, 8])
        );
        assert_eq!(e.clean(RELATED_ARTICLES, &json!(null), None).unwrap(), json!([]));
        assert_eq!(
            e.validate(RELATED_ARTICLES, &json!([1, 1]), None).unwrap_err().kind,
            ValidationErrorKind::InvalidValue
        );
    }

    #[test]
    fn test_unknown_key_sanitizes_but_fails_validation() {
        let e = engine();
        let cleaned = e.sanitize("_not_a_field", &json!("  <i>hi</i> "), None);
        assert_eq!(cleaned, json!("hi"));
        let err = e.validate("_not_a_field", &cleaned, None).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::UnknownField);
    }

    #[test]
    fn test_namespace_scoping_in_validate() {
        let e = engine();
        let err = e
            .validate("_archi_project_client", &json!("Acme"), Some(Namespace::Graph))
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::UnknownField);
        assert!(e
            .validate("_archi_project_client", &json!("Acme"), Some(Namespace::Project))
            .is_ok());
    }

    #[test]
    fn test_sanitized_defaults_validate() {
        let e = engine();
        for def in e.schema().all() {
            let cleaned = e.sanitize(def.key, &def.default, Some(def.namespace));
            assert!(
                e.validate(def.key, &cleaned, Some(def.namespace)).is_ok(),
                "default of {} does not validate",
                def.key
            );
        }
    }
}
