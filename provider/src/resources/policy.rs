//! `pomeriumzero_policy`: the policy resource and the lookup-by-name data
//! source.

use async_trait::async_trait;
use percent_encoding::{percent_encode, NON_ALPHANUMERIC};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{decode_model, encode_model, found, state_id, Attributes, DataSource, Resource};
use crate::error::{Error, Result};
use crate::models::{Policy, PolicyRequest};
use crate::normalize::string_or_empty;
use crate::schema::{Attribute, Schema};
use crate::session::Session;

pub const TYPE_NAME: &str = "pomeriumzero_policy";

pub struct PolicyResource;

pub struct PolicyDataSource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PolicyModel {
    id: Option<String>,
    name: String,
    description: String,
    enforced: bool,
    explanation: String,
    namespace_id: String,
    /// PPL document as JSON text.
    ppl: String,
    remediation: String,
}

impl PolicyModel {
    fn to_request(&self) -> Result<PolicyRequest> {
        let ppl = serde_json::from_str(&self.ppl).map_err(|e| {
            Error::diagnostic("Invalid PPL", format!("ppl is not a JSON document: {}", e))
        })?;
        Ok(PolicyRequest {
            name: self.name.clone(),
            description: self.description.clone(),
            enforced: self.enforced,
            explanation: self.explanation.clone(),
            namespace_id: self.namespace_id.clone(),
            ppl,
            remediation: self.remediation.clone(),
        })
    }

    /// `prior_ppl` is kept when it is the same document as the response's,
    /// so formatting in the configuration does not show up as drift.
    fn from_response(policy: Policy, prior_ppl: Option<&str>) -> Self {
        if !policy.routes.is_empty() {
            info!(
                policy_id = %policy.id,
                routes = policy.routes.len(),
                "ignoring routes attached to policy"
            );
        }
        let ppl = match prior_ppl {
            Some(text) if serde_json::from_str::<Value>(text).ok().as_ref() == Some(&policy.ppl) => {
                text.to_string()
            }
            _ => ppl_text(&policy.ppl),
        };
        Self {
            id: Some(policy.id),
            name: string_or_empty(policy.name),
            description: string_or_empty(policy.description),
            enforced: policy.enforced,
            explanation: string_or_empty(policy.explanation),
            namespace_id: string_or_empty(policy.namespace_id),
            ppl,
            remediation: string_or_empty(policy.remediation),
        }
    }
}

fn ppl_text(ppl: &Value) -> String {
    match ppl {
        Value::Null => String::new(),
        Value::String(s) => string_or_empty(s.clone()),
        other => other.to_string(),
    }
}

fn encode_query(value: &str) -> String {
    percent_encode(value.as_bytes(), NON_ALPHANUMERIC).to_string()
}

/// Policies in the organization, optionally limited to a namespace and its
/// descendants.
pub async fn list_policies(session: &Session, namespace_id: Option<&str>) -> Result<Vec<Policy>> {
    let path = match namespace_id {
        Some(ns) => session.org_path(&format!(
            "policies?namespaceId={}&includeDescendants=true",
            encode_query(ns)
        )),
        None => session.org_path("policies"),
    };
    session.api().get_json(&path).await
}

async fn get_policy(session: &Session, id: &str) -> Result<Policy> {
    session
        .api()
        .get_json(&session.org_path(&format!("policies/{}", id)))
        .await
}

#[async_trait]
impl Resource for PolicyResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::new("A Pomerium Zero policy.")
            .attribute("id", Attribute::string().computed().describe("Policy ID."))
            .attribute("name", Attribute::string().required())
            .attribute("description", Attribute::string().required())
            .attribute("enforced", Attribute::bool().required())
            .attribute("explanation", Attribute::string().required())
            .attribute("namespace_id", Attribute::string().required())
            .attribute(
                "ppl",
                Attribute::json()
                    .required()
                    .describe("Policy in Pomerium Policy Language, as a JSON document."),
            )
            .attribute("remediation", Attribute::string().required())
    }

    async fn create(&self, session: &Session, planned: &Attributes) -> Result<Attributes> {
        let mut model: PolicyModel = decode_model(planned)?;
        let created: Policy = session
            .api()
            .post_json(
                &session.org_path("policies"),
                &model.to_request()?,
                StatusCode::CREATED,
            )
            .await?;
        debug!(id = %created.id, name = %model.name, "created policy");
        model.id = Some(created.id);
        encode_model(&model)
    }

    async fn read(&self, session: &Session, prior: &Attributes) -> Result<Option<Attributes>> {
        let id = state_id(prior)?;
        let Some(policy) = found(get_policy(session, id).await)? else {
            return Ok(None);
        };
        let prior_ppl = prior.get("ppl").and_then(Value::as_str);
        encode_model(&PolicyModel::from_response(policy, prior_ppl)).map(Some)
    }

    async fn update(
        &self,
        session: &Session,
        planned: &Attributes,
        prior: &Attributes,
    ) -> Result<Attributes> {
        let id = state_id(prior)?.to_string();
        let mut model: PolicyModel = decode_model(planned)?;
        let result: Result<Policy> = session
            .api()
            .put_json(
                &session.org_path(&format!("policies/{}", id)),
                &model.to_request()?,
            )
            .await;
        match result {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                return Err(Error::diagnostic(
                    "Error updating policy",
                    format!(
                        "policy with ID {} not found. It may have been deleted outside of pzctl",
                        id
                    ),
                ));
            }
            Err(e) => return Err(e),
        }
        model.id = Some(id);
        encode_model(&model)
    }

    async fn delete(&self, session: &Session, prior: &Attributes) -> Result<()> {
        let id = state_id(prior)?;
        session
            .api()
            .delete(&session.org_path(&format!("policies/{}", id)))
            .await
    }

    async fn import(&self, session: &Session, id: &str) -> Result<Attributes> {
        let policy = get_policy(session, id).await?;
        encode_model(&PolicyModel::from_response(policy, None))
    }
}

#[derive(Debug, Serialize)]
struct PolicyLookup {
    id: String,
    name: String,
    namespace_id: String,
}

#[async_trait]
impl DataSource for PolicyDataSource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::new("Look up a Pomerium Zero policy by name within a namespace.")
            .attribute("name", Attribute::string().required())
            .attribute(
                "namespace_id",
                Attribute::string()
                    .required()
                    .describe("Namespace to search, including its descendants."),
            )
            .attribute("id", Attribute::string().computed())
    }

    async fn read(&self, session: &Session, config: &Attributes) -> Result<Attributes> {
        let name = config.get("name").and_then(Value::as_str).unwrap_or_default();
        let namespace_id = config
            .get("namespace_id")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let policy = list_policies(session, Some(namespace_id))
            .await?
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| {
                Error::diagnostic(
                    "Policy Not Found",
                    format!("No policy found with name: {}", name),
                )
            })?;
        encode_model(&PolicyLookup {
            id: policy.id,
            name: name.to_string(),
            namespace_id: namespace_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PolicyRouteRef;
    use serde_json::json;

    fn response() -> Policy {
        Policy {
            id: "p-1".into(),
            name: "allow".into(),
            description: "null".into(),
            enforced: true,
            explanation: String::new(),
            namespace_id: "ns-1".into(),
            ppl: json!({"allow": {"or": [{"domain": {"is": "example.com"}}]}}),
            remediation: "ask".into(),
            routes: vec![PolicyRouteRef {
                id: "r-1".into(),
                name: "app".into(),
            }],
        }
    }

    #[test]
    fn literal_null_text_reads_as_empty() {
        let model = PolicyModel::from_response(response(), None);
        assert_eq!(model.description, "");
        assert_eq!(model.id.as_deref(), Some("p-1"));
        assert_eq!(
            model.ppl,
            r#"{"allow":{"or":[{"domain":{"is":"example.com"}}]}}"#
        );
    }

    #[test]
    fn equivalent_prior_ppl_text_is_kept() {
        let prior = "{ \"allow\": { \"or\": [ { \"domain\": { \"is\": \"example.com\" } } ] } }";
        let model = PolicyModel::from_response(response(), Some(prior));
        assert_eq!(model.ppl, prior);

        let model = PolicyModel::from_response(response(), Some(r#"{"deny":{}}"#));
        assert!(model.ppl.starts_with(r#"{"allow""#));
    }

    #[test]
    fn request_carries_ppl_as_a_document() {
        let model = PolicyModel {
            id: None,
            name: "n".into(),
            description: "d".into(),
            enforced: false,
            explanation: "e".into(),
            namespace_id: "ns".into(),
            ppl: r#"[{"allow":{}}]"#.into(),
            remediation: "r".into(),
        };
        let body = serde_json::to_value(model.to_request().unwrap()).unwrap();
        assert_eq!(body["ppl"], json!([{"allow": {}}]));
        assert_eq!(body["namespaceId"], "ns");
        assert!(body.get("id").is_none());
    }

    #[test]
    fn namespace_query_is_percent_encoded() {
        assert_eq!(encode_query("ns 1/a"), "ns%201%2Fa");
    }
}
