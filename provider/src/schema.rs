//! Attribute schemas for resources, data sources and the provider block.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::Diagnostic;
use crate::reference;
use crate::resources::Attributes;

/// Shown in place of sensitive values in plans and state output.
pub const SENSITIVE_PLACEHOLDER: &str = "(sensitive value)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttributeType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "int64")]
    Int64,
    #[serde(rename = "float64")]
    Float64,
    #[serde(rename = "list(string)")]
    StringList,
    /// A JSON document carried as text. Configuration may also give it inline.
    #[serde(rename = "json")]
    Json,
}

impl AttributeType {
    fn describe(self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Bool => "a bool",
            Self::Int64 => "a whole number",
            Self::Float64 => "a number",
            Self::StringList => "a list of strings",
            Self::Json => "a JSON document",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    #[serde(rename = "type")]
    pub kind: AttributeType,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub description: &'static str,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub requires_replace: bool,
}

impl Attribute {
    fn new(kind: AttributeType) -> Self {
        Self {
            kind,
            description: "",
            required: false,
            optional: false,
            computed: false,
            sensitive: false,
            default: None,
            requires_replace: false,
        }
    }

    pub fn string() -> Self {
        Self::new(AttributeType::String)
    }

    pub fn bool() -> Self {
        Self::new(AttributeType::Bool)
    }

    pub fn int64() -> Self {
        Self::new(AttributeType::Int64)
    }

    pub fn float64() -> Self {
        Self::new(AttributeType::Float64)
    }

    pub fn string_list() -> Self {
        Self::new(AttributeType::StringList)
    }

    pub fn json() -> Self {
        Self::new(AttributeType::Json)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Implies optional + computed.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self.optional = true;
        self.computed = true;
        self
    }

    pub fn requires_replace(mut self) -> Self {
        self.requires_replace = true;
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Set only by the provider, never by configuration.
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    pub description: &'static str,
    pub attributes: BTreeMap<&'static str, Attribute>,
}

impl Schema {
    pub fn new(description: &'static str) -> Self {
        Self {
            description,
            attributes: BTreeMap::new(),
        }
    }

    pub fn attribute(mut self, name: &'static str, attribute: Attribute) -> Self {
        self.attributes.insert(name, attribute);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.get(name).is_some_and(|a| a.sensitive)
    }

    /// Check a configuration block: unknown names, computed-only attributes,
    /// missing required attributes and value types. Reference expressions are
    /// accepted wherever a value is.
    pub fn validate_config(&self, config: &Attributes) -> Vec<Diagnostic> {
        let mut diags = Vec::new();

        for name in config.keys() {
            match self.get(name) {
                None => diags.push(
                    Diagnostic::error(
                        "Unsupported argument",
                        format!("An argument named {:?} is not expected here.", name),
                    )
                    .with_attribute(name.as_str()),
                ),
                Some(attr) if attr.is_computed_only() => diags.push(
                    Diagnostic::error(
                        "Invalid configuration",
                        format!("{:?} is computed by the provider and cannot be set.", name),
                    )
                    .with_attribute(name.as_str()),
                ),
                Some(_) => {}
            }
        }

        for (name, attr) in &self.attributes {
            let set = config.get(*name).is_some_and(|v| !v.is_null());
            if attr.required && !set {
                diags.push(
                    Diagnostic::error(
                        "Missing required argument",
                        format!("The argument {:?} is required, but no definition was found.", name),
                    )
                    .with_attribute(*name),
                );
            }
        }

        diags.extend(self.type_diagnostics(config));
        diags
    }

    /// Type errors only. Nulls and unknown attribute names are skipped.
    pub fn type_diagnostics(&self, config: &Attributes) -> Vec<Diagnostic> {
        config
            .iter()
            .filter_map(|(name, value)| {
                let attr = self.get(name)?;
                check_value(attr.kind, value)
                    .map(|detail| Diagnostic::error("Incorrect attribute value type", detail))
                    .map(|d| d.with_attribute(name.as_str()))
            })
            .collect()
    }

    /// Canonical form for storage: inline JSON documents become compact text.
    pub fn normalize_value(&self, name: &str, value: Value) -> Value {
        match (self.get(name).map(|a| a.kind), value) {
            (Some(AttributeType::Json), v @ (Value::Object(_) | Value::Array(_))) => {
                Value::String(v.to_string())
            }
            (_, v) => v,
        }
    }

    /// JSON attributes compare as documents and numbers as `f64`.
    pub fn values_equal(&self, name: &str, a: &Value, b: &Value) -> bool {
        match self.get(name).map(|a| a.kind) {
            Some(AttributeType::Json) => match (json_document(a), json_document(b)) {
                (Some(x), Some(y)) => x == y,
                _ => a == b,
            },
            Some(AttributeType::Float64) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => a == b,
            },
            _ => a == b,
        }
    }

    /// Copy of `attributes` with every non-null sensitive value replaced.
    pub fn mask(&self, attributes: &Attributes) -> Attributes {
        attributes
            .iter()
            .map(|(name, value)| {
                let shown = if self.is_sensitive(name) && !value.is_null() {
                    Value::String(SENSITIVE_PLACEHOLDER.to_string())
                } else {
                    value.clone()
                };
                (name.clone(), shown)
            })
            .collect()
    }
}

fn json_document(value: &Value) -> Option<Value> {
    match value {
        Value::String(text) => serde_json::from_str(text).ok(),
        Value::Null => None,
        other => Some(other.clone()),
    }
}

fn check_value(kind: AttributeType, value: &Value) -> Option<String> {
    if value.is_null() {
        return None;
    }
    if let Value::String(s) = value {
        if reference::is_reference(s) {
            return None;
        }
    }
    let ok = match kind {
        AttributeType::String => value.is_string(),
        AttributeType::Bool => value.is_boolean(),
        AttributeType::Int64 => value.is_i64() || value.is_u64(),
        AttributeType::Float64 => value.is_number(),
        AttributeType::StringList => value
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string)),
        AttributeType::Json => match value {
            Value::String(text) => {
                if let Err(e) = serde_json::from_str::<Value>(text) {
                    return Some(format!("Invalid JSON document: {}", e));
                }
                true
            }
            Value::Object(_) | Value::Array(_) => true,
            _ => false,
        },
    };
    if ok {
        None
    } else {
        Some(format!("Expected {}.", kind.describe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new("test")
            .attribute("id", Attribute::string().computed())
            .attribute("name", Attribute::string().required())
            .attribute("ppl", Attribute::json().required())
            .attribute("to", Attribute::string_list().optional())
            .attribute("rate", Attribute::float64().optional().computed())
            .attribute("token", Attribute::string().optional().sensitive())
    }

    fn config(v: Value) -> Attributes {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn reports_unknown_computed_and_missing_attributes() {
        let diags = schema().validate_config(&config(json!({"id": "x", "bogus": 1})));
        let summaries: Vec<_> = diags.iter().map(|d| d.summary.as_str()).collect();
        assert!(summaries.contains(&"Unsupported argument"));
        assert!(summaries.contains(&"Invalid configuration"));
        assert_eq!(
            diags
                .iter()
                .filter(|d| d.summary == "Missing required argument")
                .count(),
            2
        );
    }

    #[test]
    fn references_are_accepted_for_any_type() {
        let diags = schema().validate_config(&config(json!({
            "name": "${data.pomeriumzero_cluster.main.name}",
            "ppl": "${pomeriumzero_policy.p.ppl}",
            "rate": "${data.pomeriumzero_cluster.main.id}",
            "to": ["${pomeriumzero_route.r.from}"]
        })));
        assert!(diags.is_empty(), "{diags:?}");
    }

    #[test]
    fn rejects_invalid_json_documents() {
        let diags = schema().validate_config(&config(json!({"name": "n", "ppl": "{not json"})));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].attribute.as_deref(), Some("ppl"));
        assert!(diags[0].detail.starts_with("Invalid JSON document"));
    }

    #[test]
    fn json_documents_compare_semantically() {
        let s = schema();
        let inline = s.normalize_value("ppl", json!({"allow": {"and": []}}));
        assert_eq!(inline, json!(r#"{"allow":{"and":[]}}"#));
        assert!(s.values_equal("ppl", &inline, &json!("{ \"allow\" : { \"and\": [] } }")));
        assert!(!s.values_equal("ppl", &inline, &json!(r#"{"deny":{}}"#)));
        assert!(s.values_equal("rate", &json!(1), &json!(1.0)));
    }

    #[test]
    fn masks_sensitive_values() {
        let masked = schema().mask(&config(json!({"token": "t0ps3cret", "name": "n"})));
        assert_eq!(masked["token"], json!(SENSITIVE_PLACEHOLDER));
        assert_eq!(masked["name"], json!("n"));
    }
}
