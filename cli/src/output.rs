//! Human-readable rendering of plans, reports and state.

use pomerium_zero_provider::schema::SENSITIVE_PLACEHOLDER;
use pomerium_zero_provider::{
    Action, ApplyReport, AttributeChange, Attributes, Plan, RefreshReport, ResourceChange,
};
use serde_json::Value;

const UNKNOWN: &str = "(known after apply)";

pub fn render_plan(plan: &Plan) -> String {
    let mut out = String::new();
    let reads: Vec<_> = plan
        .changes
        .iter()
        .filter(|c| c.action == Action::Read)
        .collect();
    for change in &reads {
        out.push_str(&format!(
            "  # {} will be read during apply\n  {} {}\n\n",
            change.address,
            change.action.symbol(),
            change.address
        ));
    }

    if !plan.has_changes() {
        out.push_str("No changes. Remote objects match the manifest.\n");
        return out;
    }

    out.push_str("pzctl will perform the following actions:\n\n");
    for change in plan.changes.iter().filter(|c| c.action.is_change()) {
        out.push_str(&render_change(change));
        out.push('\n');
    }
    out.push_str(&format!("Plan: {}.\n", plan.summary()));
    out
}

fn render_change(change: &ResourceChange) -> String {
    let mut out = format!(
        "  # {} will be {}\n  {} {} {{\n",
        change.address,
        describe(change.action),
        change.action.symbol(),
        change.address
    );
    let width = change
        .attributes
        .iter()
        .map(|a| a.name.len())
        .max()
        .unwrap_or(0);
    for attr in &change.attributes {
        out.push_str(&render_attribute(change.action, attr, width));
    }
    out.push_str("    }\n");
    out
}

fn describe(action: Action) -> &'static str {
    match action {
        Action::Create => "created",
        Action::Update => "updated in-place",
        Action::Replace => "replaced",
        Action::Delete => "destroyed",
        Action::Read => "read during apply",
        Action::NoOp => "left unchanged",
    }
}

fn render_attribute(action: Action, attr: &AttributeChange, width: usize) -> String {
    let after = if attr.after_unknown {
        UNKNOWN.to_string()
    } else {
        format_value(&attr.after, attr.sensitive)
    };
    let before = format_value(&attr.before, attr.sensitive);
    let line = match action {
        Action::Create => format!("+ {:width$} = {}", attr.name, after),
        Action::Delete => format!("- {:width$} = {}", attr.name, before),
        _ => format!("~ {:width$} = {} -> {}", attr.name, before, after),
    };
    let suffix = if attr.forces_replacement {
        " # forces replacement"
    } else {
        ""
    };
    format!("      {}{}\n", line, suffix)
}

/// Scalars inline, strings quoted, masked values bare.
pub fn format_value(value: &Value, sensitive: bool) -> String {
    match value {
        Value::String(s) if sensitive && s == SENSITIVE_PLACEHOLDER => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

pub fn render_report(verb: &str, report: &ApplyReport) -> String {
    let summary = report.summary();
    if verb == "Destroy" {
        return format!("Destroy complete! Resources: {} destroyed.\n", summary.destroy);
    }
    format!(
        "{} complete! Resources: {} added, {} changed, {} destroyed.\n",
        verb, summary.add, summary.change, summary.destroy
    )
}

pub fn progress_line(action: Action) -> &'static str {
    match action {
        Action::Create => "Creating...",
        Action::Update => "Modifying...",
        Action::Replace => "Replacing...",
        Action::Delete => "Destroying...",
        Action::Read => "Reading...",
        Action::NoOp => "Unchanged",
    }
}

pub fn render_refresh(report: &RefreshReport) -> String {
    let mut out = String::new();
    for address in &report.refreshed {
        out.push_str(&format!("{}: Refreshed\n", address));
    }
    for address in &report.removed {
        out.push_str(&format!("{}: Removed from state (no longer exists)\n", address));
    }
    out
}

/// Attributes one per line, sorted, already masked by the caller.
pub fn render_attributes(attributes: &Attributes) -> String {
    let width = attributes.keys().map(String::len).max().unwrap_or(0);
    let mut out = String::new();
    for (name, value) in attributes {
        out.push_str(&format!(
            "    {:width$} = {}\n",
            name,
            format_value(value, true)
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pomerium_zero_provider::Address;
    use serde_json::json;

    fn change(action: Action, attributes: Vec<AttributeChange>) -> ResourceChange {
        ResourceChange {
            address: Address::managed("pomeriumzero_route", "app"),
            action,
            attributes,
        }
    }

    fn attr(name: &str, before: Value, after: Value) -> AttributeChange {
        AttributeChange {
            name: name.to_string(),
            before,
            after,
            after_unknown: false,
            sensitive: false,
            forces_replacement: false,
        }
    }

    #[test]
    fn create_shows_unknown_and_masked_values() {
        let mut id = attr("id", Value::Null, Value::Null);
        id.after_unknown = true;
        let mut token = attr(
            "kubernetes_service_account_token",
            Value::Null,
            json!(SENSITIVE_PLACEHOLDER),
        );
        token.sensitive = true;
        let plan = Plan {
            changes: vec![change(
                Action::Create,
                vec![id, attr("name", Value::Null, json!("app")), token],
            )],
        };

        let text = render_plan(&plan);
        assert!(text.contains("# pomeriumzero_route.app will be created"), "{text}");
        assert!(text.contains("+ pomeriumzero_route.app {"), "{text}");
        assert!(text.contains("= (known after apply)"), "{text}");
        assert!(text.contains("= \"app\""), "{text}");
        assert!(text.contains("= (sensitive value)"), "{text}");
        assert!(text.contains("Plan: 1 to add, 0 to change, 0 to destroy."), "{text}");
    }

    #[test]
    fn replacement_is_flagged_per_attribute() {
        let mut ns = attr("namespace_id", json!("ns-1"), json!("ns-2"));
        ns.forces_replacement = true;
        let plan = Plan {
            changes: vec![change(Action::Replace, vec![ns])],
        };
        let text = render_plan(&plan);
        assert!(text.contains("-/+ pomeriumzero_route.app"), "{text}");
        assert!(text.contains("\"ns-1\" -> \"ns-2\" # forces replacement"), "{text}");
        assert!(text.contains("Plan: 1 to add, 0 to change, 1 to destroy."), "{text}");
    }

    #[test]
    fn empty_plan_says_no_changes() {
        let plan = Plan {
            changes: vec![change(Action::NoOp, Vec::new())],
        };
        assert!(render_plan(&plan).starts_with("No changes."));
    }
}
