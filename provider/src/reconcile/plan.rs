//! Plan types and the per-resource diff.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::address::Address;
use crate::normalize::is_false;
use crate::resources::{Attributes, Resource};
use crate::schema::{Schema, SENSITIVE_PLACEHOLDER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    NoOp,
    Create,
    Update,
    /// Delete, then create.
    Replace,
    Delete,
    /// A data source read deferred until apply.
    Read,
}

impl Action {
    /// Whether applying this action calls the API to change something.
    pub fn is_change(self) -> bool {
        matches!(
            self,
            Self::Create | Self::Update | Self::Replace | Self::Delete
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::NoOp => " ",
            Self::Create => "+",
            Self::Update => "~",
            Self::Replace => "-/+",
            Self::Delete => "-",
            Self::Read => "<=",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoOp => "no-op",
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::Read => "read",
        })
    }
}

/// One attribute's before and after values. Sensitive values are masked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeChange {
    pub name: String,
    pub before: Value,
    pub after: Value,
    #[serde(skip_serializing_if = "is_false")]
    pub after_unknown: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub sensitive: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub forces_replacement: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceChange {
    pub address: Address,
    pub action: Action,
    /// Every attribute for create and delete; changed ones otherwise.
    pub attributes: Vec<AttributeChange>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub add: usize,
    pub change: usize,
    pub destroy: usize,
}

impl PlanSummary {
    fn count(&mut self, action: Action) {
        match action {
            Action::Create => self.add += 1,
            Action::Update => self.change += 1,
            Action::Replace => {
                self.add += 1;
                self.destroy += 1;
            }
            Action::Delete => self.destroy += 1,
            Action::NoOp | Action::Read => {}
        }
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to add, {} to change, {} to destroy",
            self.add, self.change, self.destroy
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plan {
    pub changes: Vec<ResourceChange>,
}

impl Plan {
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for change in &self.changes {
            summary.count(change.action);
        }
        summary
    }

    pub fn has_changes(&self) -> bool {
        self.changes.iter().any(|c| c.action.is_change())
    }

    pub fn get(&self, address: &Address) -> Option<&ResourceChange> {
        self.changes.iter().find(|c| &c.address == address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOptions {
    /// Read every managed resource before diffing.
    pub refresh: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self { refresh: true }
    }
}

/// Steps taken by an apply or destroy, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    pub steps: Vec<(Address, Action)>,
}

impl ApplyReport {
    pub(crate) fn record(&mut self, address: &Address, action: Action) {
        self.steps.push((address.clone(), action));
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for (_, action) in &self.steps {
            summary.count(*action);
        }
        summary
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub refreshed: Vec<Address>,
    /// No longer present remotely; dropped from state.
    pub removed: Vec<Address>,
}

/// Outcome of planning one managed resource.
pub(crate) struct Planned {
    pub change: ResourceChange,
    /// Planned values; unknown ones are null.
    pub attributes: Attributes,
    pub unknown: BTreeSet<String>,
}

/// Diff `config` (references resolved; `config_unknown` names inputs whose
/// value is not known yet) against `prior`.
pub(crate) fn plan_resource(
    resource: &dyn Resource,
    address: &Address,
    config: &Attributes,
    config_unknown: &BTreeSet<String>,
    prior: Option<&Attributes>,
) -> Planned {
    let schema = resource.schema();

    let replace_attrs: BTreeSet<&str> = match prior {
        Some(prior) => schema
            .attributes
            .iter()
            .filter(|(_, attr)| attr.requires_replace)
            .filter(|(name, _)| {
                config_unknown.contains(**name) || {
                    let configured = config_value(&schema, name, config);
                    let before = prior.get(**name).unwrap_or(&Value::Null);
                    !schema.values_equal(name, before, &configured)
                }
            })
            .map(|(name, _)| *name)
            .collect(),
        None => BTreeSet::new(),
    };
    let replace = !replace_attrs.is_empty();
    // A replacement starts from scratch: computed values are not carried over.
    let base = if replace { None } else { prior };

    let mut planned = Attributes::new();
    let mut unknown = BTreeSet::new();
    for (name, attr) in &schema.attributes {
        if config_unknown.contains(*name) {
            planned.insert(name.to_string(), Value::Null);
            unknown.insert(name.to_string());
            continue;
        }
        let mut value = config_value(&schema, name, config);
        if value.is_null() {
            if let Some(default) = &attr.default {
                value = default.clone();
            } else if attr.computed {
                match base {
                    Some(base) => value = base.get(*name).cloned().unwrap_or(Value::Null),
                    None => {
                        unknown.insert(name.to_string());
                    }
                }
            }
        }
        planned.insert(name.to_string(), value);
    }
    resource.normalize_plan(&mut planned);
    unknown.retain(|name| planned.get(name).map_or(true, Value::is_null));

    let action = match prior {
        None => Action::Create,
        Some(_) if replace => Action::Replace,
        Some(prior) => {
            let differs = schema.attributes.keys().any(|name| {
                unknown.contains(*name)
                    || !schema.values_equal(
                        name,
                        prior.get(*name).unwrap_or(&Value::Null),
                        planned.get(*name).unwrap_or(&Value::Null),
                    )
            });
            if differs {
                Action::Update
            } else {
                Action::NoOp
            }
        }
    };

    let attributes = attribute_changes(&schema, action, prior, &planned, &unknown, &replace_attrs);
    Planned {
        change: ResourceChange {
            address: address.clone(),
            action,
            attributes,
        },
        attributes: planned,
        unknown,
    }
}

pub(crate) fn delete_change(schema: &Schema, address: &Address, prior: &Attributes) -> ResourceChange {
    let attributes = prior
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(name, before)| {
            let sensitive = schema.is_sensitive(name);
            AttributeChange {
                name: name.clone(),
                before: masked(sensitive, before),
                after: Value::Null,
                after_unknown: false,
                sensitive,
                forces_replacement: false,
            }
        })
        .collect();
    ResourceChange {
        address: address.clone(),
        action: Action::Delete,
        attributes,
    }
}

fn config_value(schema: &Schema, name: &str, config: &Attributes) -> Value {
    match config.get(name) {
        Some(v) if !v.is_null() => schema.normalize_value(name, v.clone()),
        _ => Value::Null,
    }
}

fn masked(sensitive: bool, value: &Value) -> Value {
    if sensitive && !value.is_null() {
        Value::String(SENSITIVE_PLACEHOLDER.to_string())
    } else {
        value.clone()
    }
}

fn attribute_changes(
    schema: &Schema,
    action: Action,
    prior: Option<&Attributes>,
    planned: &Attributes,
    unknown: &BTreeSet<String>,
    replace_attrs: &BTreeSet<&str>,
) -> Vec<AttributeChange> {
    let null = Value::Null;
    schema
        .attributes
        .iter()
        .filter_map(|(name, attr)| {
            let before = prior.and_then(|p| p.get(*name)).unwrap_or(&null);
            let after = planned.get(*name).unwrap_or(&null);
            let after_unknown = unknown.contains(*name);
            let include = match action {
                Action::Create => after_unknown || !after.is_null(),
                _ => after_unknown || !schema.values_equal(name, before, after),
            };
            include.then(|| AttributeChange {
                name: name.to_string(),
                before: masked(attr.sensitive, before),
                after: masked(attr.sensitive, after),
                after_unknown,
                sensitive: attr.sensitive,
                forces_replacement: replace_attrs.contains(*name),
            })
        })
        .collect()
}
