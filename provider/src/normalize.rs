//! Null-vs-empty normalisation between the API's JSON and stored state.
//!
//! The API is loose about absent values: the same field may come back as a
//! missing key, JSON `null`, an empty string or the literal text `"null"`.
//! State keeps one canonical form per attribute so that a refresh does not
//! produce spurious diffs.

use serde::{Deserialize, Deserializer};

/// Deserialize JSON `null` (or a missing field, with `#[serde(default)]`) as
/// the type's zero value.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The API sometimes serializes an unset text field as the string `"null"`.
pub fn string_or_empty(value: String) -> String {
    if value == "null" {
        String::new()
    } else {
        value
    }
}

/// Empty string means unset.
pub fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Unset means empty string, for request fields the API requires as text.
pub fn empty_if_none(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

pub(crate) fn is_false(value: &bool) -> bool {
    !*value
}

pub(crate) fn is_zero(value: &f64) -> bool {
    *value == 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize, Default)]
    #[serde(default)]
    struct Probe {
        #[serde(deserialize_with = "null_as_default")]
        text: String,
        #[serde(deserialize_with = "null_as_default")]
        flag: bool,
    }

    #[test]
    fn null_and_missing_fields_become_zero_values() {
        let p: Probe = serde_json::from_str(r#"{"text": null}"#).unwrap();
        assert_eq!(p.text, "");
        assert!(!p.flag);

        let p: Probe = serde_json::from_str(r#"{"text": "x", "flag": true}"#).unwrap();
        assert_eq!(p.text, "x");
        assert!(p.flag);
    }

    #[test]
    fn literal_null_text_is_empty() {
        assert_eq!(string_or_empty("null".into()), "");
        assert_eq!(string_or_empty("Null".into()), "Null");
        assert_eq!(non_empty(String::new()), None);
        assert_eq!(non_empty("v4".into()), Some("v4".to_string()));
    }
}
