//! `pomeriumzero_route`

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{decode_model, encode_model, found, state_id, Attributes, Resource};
use crate::error::{Error, Result};
use crate::models::{RouteRequest, RouteResponse};
use crate::normalize::empty_if_none;
use crate::schema::{Attribute, Schema};
use crate::session::Session;

pub const TYPE_NAME: &str = "pomeriumzero_route";

pub struct RouteResource;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct RouteModel {
    id: Option<String>,
    name: String,
    namespace_id: String,
    from: String,
    to: Option<Vec<String>>,
    allow_spdy: Option<bool>,
    allow_websockets: Option<bool>,
    enable_google_cloud_serverless_authentication: Option<bool>,
    pass_identity_headers: Option<bool>,
    preserve_host_header: Option<bool>,
    show_error_details: Option<bool>,
    tls_skip_verify: Option<bool>,
    tls_upstream_allow_renegotiation: Option<bool>,
    policy_ids: Option<Vec<String>>,
    prefix: Option<String>,
    prefix_rewrite: Option<String>,
    kubernetes_service_account_token: Option<String>,
}

impl RouteModel {
    fn to_request(&self) -> RouteRequest {
        RouteRequest {
            name: self.name.clone(),
            namespace_id: self.namespace_id.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            allow_spdy: self.allow_spdy.unwrap_or(false),
            allow_websockets: self.allow_websockets,
            enable_google_cloud_serverless_authentication: self
                .enable_google_cloud_serverless_authentication
                .unwrap_or(false),
            pass_identity_headers: self.pass_identity_headers,
            preserve_host_header: self.preserve_host_header,
            show_error_details: self.show_error_details.unwrap_or(true),
            tls_skip_verify: self.tls_skip_verify.unwrap_or(false),
            tls_upstream_allow_renegotiation: self
                .tls_upstream_allow_renegotiation
                .unwrap_or(false),
            policy_ids: self.policy_ids.clone(),
            prefix: self.prefix.clone(),
            prefix_rewrite: self.prefix_rewrite.clone(),
            kubernetes_service_account_token: empty_if_none(
                &self.kubernetes_service_account_token,
            ),
        }
    }

    /// The token is write-only on some API versions; `known_token` is kept
    /// when the response leaves it out.
    fn from_response(route: RouteResponse, known_token: Option<String>) -> Self {
        Self {
            id: Some(route.id),
            name: route.name,
            namespace_id: route.namespace_id,
            from: route.from,
            to: route.to,
            allow_spdy: route.allow_spdy,
            allow_websockets: route.allow_websockets,
            enable_google_cloud_serverless_authentication: route
                .enable_google_cloud_serverless_authentication,
            pass_identity_headers: route.pass_identity_headers,
            preserve_host_header: route.preserve_host_header,
            show_error_details: route.show_error_details,
            tls_skip_verify: route.tls_skip_verify,
            tls_upstream_allow_renegotiation: route.tls_upstream_allow_renegotiation,
            policy_ids: route.policy_ids,
            prefix: route.prefix,
            prefix_rewrite: route.prefix_rewrite,
            kubernetes_service_account_token: route
                .kubernetes_service_account_token
                .or(known_token),
        }
    }
}

fn route_path(session: &Session, id: &str) -> String {
    session.org_path(&format!("routes/{}", id))
}

async fn get_route(session: &Session, id: &str) -> Result<RouteResponse> {
    let body: Value = session.api().get_json(&route_path(session, id)).await?;
    RouteResponse::from_value(&body)
}

fn known_token(attrs: &Attributes) -> Option<String> {
    attrs
        .get("kubernetes_service_account_token")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl Resource for RouteResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::new("A Pomerium Zero route.")
            .attribute("id", Attribute::string().computed().describe("Route ID."))
            .attribute("name", Attribute::string().required())
            .attribute("namespace_id", Attribute::string().required())
            .attribute(
                "from",
                Attribute::string().required().describe("External URL the route matches."),
            )
            .attribute(
                "to",
                Attribute::string_list()
                    .required()
                    .describe("Upstream URLs requests are sent to."),
            )
            .attribute("allow_spdy", Attribute::bool().default_value(false))
            .attribute("allow_websockets", Attribute::bool().default_value(false))
            .attribute(
                "enable_google_cloud_serverless_authentication",
                Attribute::bool().default_value(false),
            )
            .attribute(
                "pass_identity_headers",
                Attribute::bool().optional().computed(),
            )
            .attribute("preserve_host_header", Attribute::bool().default_value(false))
            .attribute("show_error_details", Attribute::bool().default_value(true))
            .attribute("tls_skip_verify", Attribute::bool().default_value(false))
            .attribute(
                "tls_upstream_allow_renegotiation",
                Attribute::bool().default_value(false),
            )
            .attribute("policy_ids", Attribute::string_list().optional())
            .attribute("prefix", Attribute::string().optional())
            .attribute("prefix_rewrite", Attribute::string().optional())
            .attribute(
                "kubernetes_service_account_token",
                Attribute::string().optional().computed().sensitive(),
            )
    }

    async fn create(&self, session: &Session, planned: &Attributes) -> Result<Attributes> {
        let model: RouteModel = decode_model(planned)?;
        let body: Value = session
            .api()
            .post_json(
                &session.org_path("routes"),
                &model.to_request(),
                StatusCode::CREATED,
            )
            .await?;
        let created = RouteResponse::from_value(&body)?;
        debug!(id = %created.id, name = %created.name, "created route");
        encode_model(&RouteModel::from_response(
            created,
            model.kubernetes_service_account_token,
        ))
    }

    async fn read(&self, session: &Session, prior: &Attributes) -> Result<Option<Attributes>> {
        let id = state_id(prior)?;
        let Some(route) = found(get_route(session, id).await)? else {
            return Ok(None);
        };
        encode_model(&RouteModel::from_response(route, known_token(prior))).map(Some)
    }

    async fn update(
        &self,
        session: &Session,
        planned: &Attributes,
        prior: &Attributes,
    ) -> Result<Attributes> {
        let id = state_id(prior)?;
        let model: RouteModel = decode_model(planned)?;
        let body: Value = session
            .api()
            .put_json(&route_path(session, id), &model.to_request())
            .await?;
        let updated = RouteResponse::from_value(&body)?;
        encode_model(&RouteModel::from_response(
            updated,
            model.kubernetes_service_account_token,
        ))
    }

    async fn delete(&self, session: &Session, prior: &Attributes) -> Result<()> {
        let id = state_id(prior)?;
        session.api().delete(&route_path(session, id)).await
    }

    async fn import(&self, session: &Session, id: &str) -> Result<Attributes> {
        let mut prior = Attributes::new();
        prior.insert("id".into(), Value::String(id.to_string()));
        self.read(session, &prior).await?.ok_or_else(|| {
            Error::diagnostic(
                "Cannot import non-existent remote object",
                format!("no route with ID {}", id),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_sends_defaults_and_omits_unset_options() {
        let model = RouteModel {
            name: "app".into(),
            namespace_id: "ns-1".into(),
            from: "https://app.example.com".into(),
            ..Default::default()
        };
        let body = serde_json::to_value(model.to_request()).unwrap();
        assert_eq!(
            body,
            json!({
                "name": "app",
                "namespaceId": "ns-1",
                "from": "https://app.example.com",
                "allowSpdy": false,
                "enableGoogleCloudServerlessAuthentication": false,
                "showErrorDetails": true,
                "tlsSkipVerify": false,
                "tlsUpstreamAllowRenegotiation": false,
                "kubernetesServiceAccountToken": ""
            })
        );
    }

    #[test]
    fn response_without_token_keeps_the_known_one() {
        let route = RouteResponse::from_value(&json!({
            "id": "r-1",
            "name": "app",
            "namespaceId": "ns-1",
            "from": "https://app.example.com",
            "to": ["http://app:8080"]
        }))
        .unwrap();
        let model = RouteModel::from_response(route, Some("sa-token".into()));
        assert_eq!(model.kubernetes_service_account_token.as_deref(), Some("sa-token"));
        assert_eq!(model.allow_spdy, None);
        assert_eq!(model.id.as_deref(), Some("r-1"));
    }
}
