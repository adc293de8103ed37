//! Field-level input validation.
//!
//! Request bodies are JSON objects. [`Input`] walks one object field by
//! field, coercing values the way the API documents (integer strings,
//! boolean words, numeric strings for decimals) and collecting every
//! problem into [`FieldErrors`] instead of stopping at the first one.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;

pub const REQUIRED: &str = "This field is required.";
pub const NULL: &str = "This field may not be null.";
pub const BLANK: &str = "This field may not be blank.";
pub const INVALID_STRING: &str = "Not a valid string.";
pub const INVALID_INTEGER: &str = "A valid integer is required.";
pub const INVALID_BOOLEAN: &str = "Must be a valid boolean.";
pub const INVALID_NUMBER: &str = "A valid number is required.";
pub const INVALID_DATETIME: &str =
    "Datetime has wrong format. Use one of these formats instead: YYYY-MM-DDThh:mm[:ss[.uuuuuu]][+HH:MM|-HH:MM|Z].";
pub const NOT_NEGATIVE: &str = "Ensure this value is greater than or equal to 0.";
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Longest accepted value for every string column.
pub const MAX_NAME_LENGTH: usize = 100;
/// Largest value a `quantity` column can hold.
pub const MAX_QUANTITY: i64 = i32::MAX as i64;
pub const COST_MAX_DIGITS: u32 = 10;
pub const COST_DECIMAL_PLACES: u32 = 2;

pub fn too_long(max: usize) -> String {
    format!("Ensure this field has no more than {max} characters.")
}

pub fn too_large(max: i64) -> String {
    format!("Ensure this value is less than or equal to {max}.")
}

pub fn already_exists(entity: &str, field: &str) -> String {
    format!("{entity} with this {field} already exists.")
}

pub fn not_unique_together(fields: &[&str]) -> String {
    format!("The fields {} must make a unique set.", fields.join(", "))
}

pub fn does_not_exist(pk: i64) -> String {
    format!("Invalid pk \"{pk}\" - object does not exist.")
}

pub fn incorrect_pk_type(value: &Value) -> String {
    format!(
        "Incorrect type. Expected pk value, received {}.",
        json_type_name(value)
    )
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Messages keyed by field name, serialised as `{"field": ["message", ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Add every message from `other`.
    pub fn extend(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Reads typed fields out of a JSON object.
///
/// In partial mode (PATCH) an absent field is simply skipped; otherwise an
/// absent required field is an error.
pub struct Input<'a> {
    body: &'a Map<String, Value>,
    partial: bool,
    errors: FieldErrors,
}

impl<'a> Input<'a> {
    pub fn new(body: &'a Map<String, Value>, partial: bool) -> Self {
        Self {
            body,
            partial,
            errors: FieldErrors::new(),
        }
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// Record an error discovered outside the typed readers.
    pub fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.add(field, message);
    }

    pub fn finish(self) -> Result<(), FieldErrors> {
        self.errors.into_result()
    }

    pub fn into_errors(self) -> FieldErrors {
        self.errors
    }

    /// Look up a field; `None` if it is absent (recording "required" when
    /// the field is required and the input is not partial) or null.
    fn present(&mut self, field: &str, required: bool) -> Option<&'a Value> {
        match self.body.get(field) {
            None => {
                if required && !self.partial {
                    self.errors.add(field, REQUIRED);
                }
                None
            }
            Some(Value::Null) => {
                self.errors.add(field, NULL);
                None
            }
            Some(value) => Some(value),
        }
    }

    /// Required, non-blank string of at most `max_len` characters, surrounding whitespace trimmed.
    pub fn string(&mut self, field: &str, max_len: usize) -> Option<String> {
        let value = self.present(field, true)?;
        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => {
                self.errors.add(field, INVALID_STRING);
                return None;
            }
        };
        if text.is_empty() {
            self.errors.add(field, BLANK);
            return None;
        }
        if text.chars().count() > max_len {
            self.errors.add(field, too_long(max_len));
            return None;
        }
        Some(text)
    }

    /// Optional boolean; the caller supplies the default.
    pub fn boolean(&mut self, field: &str) -> Option<bool> {
        let value = self.present(field, false)?;
        let parsed = parse_boolean(value);
        if parsed.is_none() {
            self.errors.add(field, INVALID_BOOLEAN);
        }
        parsed
    }

    /// Required integer in `0 ..= max`.
    pub fn non_negative_integer(&mut self, field: &str, max: i64) -> Option<i32> {
        let value = self.present(field, true)?;
        let Some(parsed) = parse_integer(value) else {
            self.errors.add(field, INVALID_INTEGER);
            return None;
        };
        if parsed < 0 {
            self.errors.add(field, NOT_NEGATIVE);
            return None;
        }
        if parsed > i128::from(max) {
            self.errors.add(field, too_large(max));
            return None;
        }
        i32::try_from(parsed).ok()
    }

    /// Required non-negative decimal with at most `max_digits` digits, `places` of them decimals.
    pub fn non_negative_decimal(&mut self, field: &str, max_digits: u32, places: u32) -> Option<Decimal> {
        let value = self.present(field, true)?;
        let Some(parsed) = parse_decimal(value) else {
            self.errors.add(field, INVALID_NUMBER);
            return None;
        };
        if let Err(message) = check_precision(&parsed, max_digits, places) {
            self.errors.add(field, message);
            return None;
        }
        if parsed.is_sign_negative() && !parsed.is_zero() {
            self.errors.add(field, NOT_NEGATIVE);
            return None;
        }
        let mut quantized = parsed;
        quantized.rescale(places);
        // "-0.00" is stored as 0.00, the way NUMERIC columns keep it.
        if quantized.is_zero() {
            quantized.set_sign_positive(true);
        }
        Some(quantized)
    }

    /// Required primary key of another entity. Existence is checked by the caller.
    pub fn reference(&mut self, field: &str) -> Option<i64> {
        let value = self.present(field, true)?;
        let parsed = match value {
            Value::Bool(_) => None,
            other => parse_integer(other).and_then(|n| i64::try_from(n).ok()),
        };
        if parsed.is_none() {
            self.errors.add(field, incorrect_pk_type(value));
        }
        parsed
    }

    /// Optional timestamp; naive values are taken as UTC.
    pub fn datetime(&mut self, field: &str) -> Option<DateTime<Utc>> {
        let value = self.present(field, false)?;
        let parsed = value.as_str().and_then(parse_datetime);
        if parsed.is_none() {
            self.errors.add(field, INVALID_DATETIME);
        }
        parsed
    }
}

pub fn parse_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(x) if x == 1.0 => Some(true),
            Some(x) if x == 0.0 => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "on" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// JSON integers, integral floats and integer strings (`"5"`, `"5.0"`).
pub fn parse_integer(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i128::from(i))
            } else if let Some(u) = n.as_u64() {
                Some(i128::from(u))
            } else {
                let x = n.as_f64()?;
                (x.fract() == 0.0 && x.abs() < 1e30).then_some(x as i128)
            }
        }
        Value::String(s) => parse_integer_str(s.trim()),
        _ => None,
    }
}

fn parse_integer_str(text: &str) -> Option<i128> {
    // "12.000" is an integer; "12.5" is not.
    let digits = match text.split_once('.') {
        Some((whole, frac)) if frac.chars().all(|c| c == '0') => whole,
        Some(_) => return None,
        None => text,
    };
    let unsigned = digits.strip_prefix(['-', '+']).unwrap_or(digits);
    if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match digits.parse::<i128>() {
        Ok(n) => Some(n),
        // Out of i128 range: saturate so range checks still report it.
        Err(_) if digits.starts_with('-') => Some(i128::MIN),
        Err(_) => Some(i128::MAX),
    }
}

pub fn parse_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Digit and decimal-place limits, counted on the value as written (`"1.500"` has three places).
fn check_precision(value: &Decimal, max_digits: u32, places: u32) -> Result<(), String> {
    let digits = value.mantissa().unsigned_abs().to_string().len() as u32;
    let scale = value.scale();
    let (total, decimals) = if scale == 0 {
        (digits, 0)
    } else if scale > digits {
        (scale, scale)
    } else {
        (digits, scale)
    };
    let whole = total - decimals;

    if total > max_digits {
        return Err(format!(
            "Ensure that there are no more than {max_digits} digits in total."
        ));
    }
    if decimals > places {
        return Err(format!(
            "Ensure that there are no more than {places} decimal places."
        ));
    }
    if whole > max_digits - places {
        return Err(format!(
            "Ensure that there are no more than {} digits before the decimal point.",
            max_digits - places
        ));
    }
    Ok(())
}

pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

/// Money is rendered as a string with exactly two decimals, e.g. `"1.50"`.
pub fn serialize_money<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
    let mut rounded = value.round_dp(COST_DECIMAL_PLACES);
    rounded.rescale(COST_DECIMAL_PLACES);
    serializer.collect_str(&rounded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test body must be an object"),
        }
    }

    #[test]
    fn test_missing_null_and_blank_strings() {
        let body = object(json!({"location": null, "name": "   "}));
        let mut input = Input::new(&body, false);
        assert_eq!(input.string("name", 100), None);
        assert_eq!(input.string("location", 100), None);
        assert_eq!(input.string("label", 100), None);

        let errors = input.finish().expect_err("three problems");
        assert_eq!(errors.get("name"), Some(&[BLANK.to_string()][..]));
        assert_eq!(errors.get("location"), Some(&[NULL.to_string()][..]));
        assert_eq!(errors.get("label"), Some(&[REQUIRED.to_string()][..]));
    }

    #[test]
    fn test_partial_input_skips_absent_fields() {
        let body = object(json!({}));
        let mut input = Input::new(&body, true);
        assert_eq!(input.string("name", 100), None);
        assert_eq!(input.non_negative_integer("quantity", MAX_QUANTITY), None);
        assert!(input.finish().is_ok());
    }

    #[test]
    fn test_string_length_counts_characters() {
        let body = object(json!({"ok": "é".repeat(100), "long": "x".repeat(101)}));
        let mut input = Input::new(&body, false);
        assert_eq!(input.string("ok", 100).map(|s| s.chars().count()), Some(100));
        assert_eq!(input.string("long", 100), None);
        let errors = input.finish().expect_err("long is too long");
        assert_eq!(errors.get("long"), Some(&[too_long(100)][..]));
    }

    #[test]
    fn test_boolean_coercions() {
        for truthy in [json!(true), json!(1), json!("yes"), json!("ON"), json!("True"), json!("1")] {
            assert_eq!(parse_boolean(&truthy), Some(true), "{truthy}");
        }
        for falsy in [json!(false), json!(0), json!("no"), json!("off"), json!("FALSE"), json!("0")] {
            assert_eq!(parse_boolean(&falsy), Some(false), "{falsy}");
        }
        for invalid in [json!("maybe"), json!(2), json!([]), json!({})] {
            assert_eq!(parse_boolean(&invalid), None, "{invalid}");
        }
    }

    #[test]
    fn test_integer_coercions() {
        assert_eq!(parse_integer(&json!(5)), Some(5));
        assert_eq!(parse_integer(&json!(5.0)), Some(5));
        assert_eq!(parse_integer(&json!("12")), Some(12));
        assert_eq!(parse_integer(&json!(" 12.00 ")), Some(12));
        assert_eq!(parse_integer(&json!("-3")), Some(-3));
        assert_eq!(parse_integer(&json!(5.5)), None);
        assert_eq!(parse_integer(&json!("x")), None);
        assert_eq!(parse_integer(&json!("")), None);
        assert_eq!(parse_integer(&json!(true)), None);
    }

    #[test]
    fn test_quantity_bounds() {
        let body = object(json!({"zero": 0, "neg": -1, "max": 2147483647, "over": 2147483648i64, "bad": "x"}));
        let mut input = Input::new(&body, false);
        assert_eq!(input.non_negative_integer("zero", MAX_QUANTITY), Some(0));
        assert_eq!(input.non_negative_integer("max", MAX_QUANTITY), Some(i32::MAX));
        assert_eq!(input.non_negative_integer("neg", MAX_QUANTITY), None);
        assert_eq!(input.non_negative_integer("over", MAX_QUANTITY), None);
        assert_eq!(input.non_negative_integer("bad", MAX_QUANTITY), None);

        let errors = input.finish().expect_err("three invalid");
        assert_eq!(errors.get("neg"), Some(&[NOT_NEGATIVE.to_string()][..]));
        assert_eq!(errors.get("over"), Some(&[too_large(MAX_QUANTITY)][..]));
        assert_eq!(errors.get("bad"), Some(&[INVALID_INTEGER.to_string()][..]));
    }

    #[test]
    fn test_cost_precision_rules() {
        let body = object(json!({
            "zero": 0,
            "string": "1.5",
            "places": "1.505",
            "digits": "123456789.12",
            "whole": 123456789,
            "neg": "-0.01",
            "bad": "abc"
        }));
        let mut input = Input::new(&body, false);
        assert_eq!(
            input.non_negative_decimal("zero", 10, 2).map(|d| d.to_string()),
            Some("0.00".to_string())
        );
        assert_eq!(
            input.non_negative_decimal("string", 10, 2).map(|d| d.to_string()),
            Some("1.50".to_string())
        );
        for field in ["places", "digits", "whole", "neg", "bad"] {
            assert_eq!(input.non_negative_decimal(field, 10, 2), None, "{field}");
        }

        let errors = input.finish().expect_err("five invalid");
        assert_eq!(
            errors.get("places"),
            Some(&["Ensure that there are no more than 2 decimal places.".to_string()][..])
        );
        assert_eq!(
            errors.get("digits"),
            Some(&["Ensure that there are no more than 10 digits in total.".to_string()][..])
        );
        assert_eq!(
            errors.get("whole"),
            Some(&["Ensure that there are no more than 8 digits before the decimal point.".to_string()][..])
        );
        assert_eq!(errors.get("neg"), Some(&[NOT_NEGATIVE.to_string()][..]));
        assert_eq!(errors.get("bad"), Some(&[INVALID_NUMBER.to_string()][..]));
    }

    #[test]
    fn test_negative_zero_cost_loses_its_sign() {
        let body = object(json!({"int": "-0", "places": "-0.00", "float": -0.0}));
        let mut input = Input::new(&body, false);
        for field in ["int", "places", "float"] {
            let cost = input.non_negative_decimal(field, 10, 2).expect(field);
            assert!(!cost.is_sign_negative(), "{field}");
            assert_eq!(cost.to_string(), "0.00", "{field}");
        }
        assert!(input.finish().is_ok());
    }

    #[test]
    fn test_reference_types() {
        let body = object(json!({"a": 3, "b": "4", "c": "x", "d": true, "e": [1]}));
        let mut input = Input::new(&body, false);
        assert_eq!(input.reference("a"), Some(3));
        assert_eq!(input.reference("b"), Some(4));
        assert_eq!(input.reference("c"), None);
        assert_eq!(input.reference("d"), None);
        assert_eq!(input.reference("e"), None);

        let errors = input.finish().expect_err("three invalid");
        assert_eq!(
            errors.get("c"),
            Some(&["Incorrect type. Expected pk value, received str.".to_string()][..])
        );
        assert_eq!(
            errors.get("d"),
            Some(&["Incorrect type. Expected pk value, received bool.".to_string()][..])
        );
        assert_eq!(
            errors.get("e"),
            Some(&["Incorrect type. Expected pk value, received list.".to_string()][..])
        );
    }

    #[test]
    fn test_datetime_formats() {
        let expected = parse_datetime("2024-06-01T12:30:00Z").expect("rfc3339");
        assert_eq!(parse_datetime("2024-06-01T14:30:00+02:00"), Some(expected));
        assert_eq!(parse_datetime("2024-06-01T12:30:00"), Some(expected));
        assert_eq!(parse_datetime("2024-06-01T12:30"), Some(expected));
        assert_eq!(parse_datetime("yesterday"), None);
    }

    #[test]
    fn test_extend_appends_messages_per_field() {
        let mut errors = FieldErrors::single("name", BLANK);
        let mut store_errors = FieldErrors::single("name", already_exists("product", "name"));
        store_errors.add("product", does_not_exist(9));
        errors.extend(store_errors);

        assert_eq!(errors.get("name").map(<[String]>::len), Some(2));
        assert!(errors.has("product"));
    }

    #[test]
    fn test_field_errors_serialise_as_map_of_lists() {
        let mut errors = FieldErrors::single("name", BLANK);
        errors.add(NON_FIELD_ERRORS, not_unique_together(&["vending_machine", "product"]));
        let json = serde_json::to_value(&errors).expect("serialise");
        assert_eq!(
            json,
            json!({
                "name": ["This field may not be blank."],
                "non_field_errors": ["The fields vending_machine, product must make a unique set."]
            })
        );
    }
}
