//! Reference expressions between declared objects.
//!
//! A reference is a whole string of the form `${<type>.<name>.<attr>}` or
//! `${data.<type>.<name>.<attr>}`. It may appear as an attribute value or as
//! an element of a list value; it is replaced by the referenced attribute's
//! value once that is known.

use serde_json::Value;

use crate::address::{is_valid_name, Address};
use crate::error::{Diagnostic, Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub target: Address,
    pub attribute: String,
}

/// Whether `s` is written as a reference, well-formed or not.
pub fn is_reference(s: &str) -> bool {
    s.starts_with("${") && s.ends_with('}')
}

impl Reference {
    pub fn parse(s: &str) -> Result<Self> {
        let inner = s
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
            .ok_or_else(|| malformed(s))?;
        let parts: Vec<&str> = inner.split('.').collect();
        let (target, attribute) = match parts.as_slice() {
            ["data", type_name, name, attr] => (Address::data(*type_name, *name), *attr),
            [type_name, name, attr] if *type_name != "data" => {
                (Address::managed(*type_name, *name), *attr)
            }
            _ => return Err(malformed(s)),
        };
        if ![&target.type_name, &target.name]
            .iter()
            .all(|p| is_valid_name(p))
            || !is_valid_name(attribute)
        {
            return Err(malformed(s));
        }
        Ok(Self {
            target,
            attribute: attribute.to_string(),
        })
    }
}

fn malformed(s: &str) -> Error {
    Error::invalid(Diagnostic::error(
        "Invalid reference",
        format!(
            "{:?} must be ${{<type>.<name>.<attribute>}} or ${{data.<type>.<name>.<attribute>}}",
            s
        ),
    ))
}

/// Every reference in `value`, including inside list elements.
pub fn collect(value: &Value) -> Result<Vec<Reference>> {
    let mut out = Vec::new();
    collect_into(value, &mut out)?;
    Ok(out)
}

fn collect_into(value: &Value, out: &mut Vec<Reference>) -> Result<()> {
    match value {
        Value::String(s) if is_reference(s) => out.push(Reference::parse(s)?),
        Value::Array(items) => {
            for item in items {
                collect_into(item, out)?;
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_into(item, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Known(Value),
    /// Depends on a value that only exists after apply.
    Unknown,
}

/// Substitute references in `value`. `lookup` answers for a single
/// reference; any unknown part makes the whole value unknown.
pub fn resolve<F>(value: &Value, lookup: &F) -> Result<Resolved>
where
    F: Fn(&Reference) -> Result<Resolved>,
{
    match value {
        Value::String(s) if is_reference(s) => lookup(&Reference::parse(s)?),
        Value::Array(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                match resolve(item, lookup)? {
                    Resolved::Known(v) => resolved.push(v),
                    Resolved::Unknown => return Ok(Resolved::Unknown),
                }
            }
            Ok(Resolved::Known(Value::Array(resolved)))
        }
        Value::Object(map) => {
            let mut resolved = serde_json::Map::new();
            for (k, item) in map {
                match resolve(item, lookup)? {
                    Resolved::Known(v) => {
                        resolved.insert(k.clone(), v);
                    }
                    Resolved::Unknown => return Ok(Resolved::Unknown),
                }
            }
            Ok(Resolved::Known(Value::Object(resolved)))
        }
        other => Ok(Resolved::Known(other.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_managed_and_data_references() {
        let r = Reference::parse("${pomeriumzero_policy.allow.id}").unwrap();
        assert_eq!(r.target, Address::managed("pomeriumzero_policy", "allow"));
        assert_eq!(r.attribute, "id");

        let r = Reference::parse("${data.pomeriumzero_cluster.main.namespace_id}").unwrap();
        assert!(r.target.is_data());
        assert_eq!(r.attribute, "namespace_id");
    }

    #[test]
    fn rejects_malformed_references() {
        for bad in ["${}", "${a.b}", "${data.a.b}", "${a.b.c.d}", "${a b.c.d}"] {
            assert!(Reference::parse(bad).is_err(), "{bad}");
        }
        assert!(!is_reference("prefix ${a.b.c}"));
    }

    #[test]
    fn collects_references_inside_lists() {
        let refs = collect(&json!(["${pomeriumzero_policy.a.id}", "literal", "${pomeriumzero_policy.b.id}"]))
            .unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[1].target.name, "b");
    }

    #[test]
    fn unknown_parts_make_the_value_unknown() {
        let lookup = |r: &Reference| -> Result<Resolved> {
            if r.target.name == "known" {
                Ok(Resolved::Known(json!("p-1")))
            } else {
                Ok(Resolved::Unknown)
            }
        };
        assert_eq!(
            resolve(&json!(["${pomeriumzero_policy.known.id}", "x"]), &lookup).unwrap(),
            Resolved::Known(json!(["p-1", "x"]))
        );
        assert_eq!(
            resolve(&json!(["${pomeriumzero_policy.known.id}", "${pomeriumzero_policy.new.id}"]), &lookup)
                .unwrap(),
            Resolved::Unknown
        );
    }
}
