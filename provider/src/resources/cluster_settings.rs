//! `pomeriumzero_cluster_settings`: the settings document of one cluster.
//!
//! The settings always exist server-side, so most attributes are optional
//! and computed: whatever the configuration leaves out keeps the value the
//! API reports. The identity-provider group is all-or-nothing.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{decode_model, encode_model, found, is_set, Attributes, Resource};
use crate::error::{Diagnostic, Error, Result};
use crate::models::{ClusterSettings, CreateClusterSettingsRequest, UpdateClusterSettingsRequest};
use crate::normalize::{empty_if_none, non_empty};
use crate::schema::{Attribute, Schema};
use crate::session::Session;

pub const TYPE_NAME: &str = "pomeriumzero_cluster_settings";

const IDENTITY_PROVIDER_FIELDS: [&str; 5] = [
    "identity_provider",
    "identity_provider_client_id",
    "identity_provider_client_secret",
    "identity_provider_url",
    "authenticate_service_url",
];

pub struct ClusterSettingsResource;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ClusterSettingsModel {
    id: Option<String>,
    cluster_id: String,
    address: Option<String>,
    auto_apply_changesets: Option<bool>,
    cookie_expire: Option<String>,
    cookie_http_only: Option<bool>,
    cookie_name: Option<String>,
    default_upstream_timeout: Option<String>,
    dns_lookup_family: Option<String>,
    log_level: Option<String>,
    pass_identity_headers: Option<bool>,
    skip_xff_append: Option<bool>,
    timeout_idle: Option<String>,
    timeout_read: Option<String>,
    timeout_write: Option<String>,
    tracing_sample_rate: Option<f64>,
    codec_type: Option<String>,
    authenticate_service_url: Option<String>,
    identity_provider: Option<String>,
    identity_provider_client_id: Option<String>,
    identity_provider_client_secret: Option<String>,
    identity_provider_url: Option<String>,
    proxy_log_level: Option<String>,
}

impl ClusterSettingsModel {
    fn to_create_request(&self) -> CreateClusterSettingsRequest {
        CreateClusterSettingsRequest {
            id: self.cluster_id.clone(),
            address: empty_if_none(&self.address),
            authenticate_service_url: empty_if_none(&self.authenticate_service_url),
            auto_apply_changesets: self.auto_apply_changesets.unwrap_or_default(),
            cookie_expire: empty_if_none(&self.cookie_expire),
            cookie_http_only: self.cookie_http_only.unwrap_or_default(),
            cookie_name: empty_if_none(&self.cookie_name),
            default_upstream_timeout: empty_if_none(&self.default_upstream_timeout),
            dns_lookup_family: empty_if_none(&self.dns_lookup_family),
            identity_provider: empty_if_none(&self.identity_provider),
            identity_provider_client_id: empty_if_none(&self.identity_provider_client_id),
            identity_provider_client_secret: empty_if_none(&self.identity_provider_client_secret),
            identity_provider_url: empty_if_none(&self.identity_provider_url),
            log_level: empty_if_none(&self.log_level),
            pass_identity_headers: self.pass_identity_headers.unwrap_or_default(),
            proxy_log_level: empty_if_none(&self.proxy_log_level),
            skip_xff_append: self.skip_xff_append.unwrap_or_default(),
            timeout_idle: empty_if_none(&self.timeout_idle),
            timeout_read: empty_if_none(&self.timeout_read),
            timeout_write: empty_if_none(&self.timeout_write),
            tracing_sample_rate: self.tracing_sample_rate.unwrap_or_default(),
            codec_type: empty_if_none(&self.codec_type),
        }
    }

    fn to_update_request(&self) -> UpdateClusterSettingsRequest {
        UpdateClusterSettingsRequest {
            address: empty_if_none(&self.address),
            authenticate_service_url: empty_if_none(&self.authenticate_service_url),
            auto_apply_changesets: self.auto_apply_changesets.unwrap_or_default(),
            cookie_expire: empty_if_none(&self.cookie_expire),
            cookie_http_only: self.cookie_http_only.unwrap_or_default(),
            cookie_name: empty_if_none(&self.cookie_name),
            default_upstream_timeout: empty_if_none(&self.default_upstream_timeout),
            dns_lookup_family: empty_if_none(&self.dns_lookup_family),
            identity_provider: empty_if_none(&self.identity_provider),
            identity_provider_client_id: empty_if_none(&self.identity_provider_client_id),
            identity_provider_client_secret: self.identity_provider_client_secret.clone(),
            identity_provider_url: empty_if_none(&self.identity_provider_url),
            log_level: empty_if_none(&self.log_level),
            pass_identity_headers: self.pass_identity_headers.unwrap_or_default(),
            proxy_log_level: empty_if_none(&self.proxy_log_level),
            skip_xff_append: self.skip_xff_append.unwrap_or_default(),
            timeout_idle: empty_if_none(&self.timeout_idle),
            timeout_read: empty_if_none(&self.timeout_read),
            timeout_write: empty_if_none(&self.timeout_write),
            tracing_sample_rate: self.tracing_sample_rate.unwrap_or_default(),
            codec_type: empty_if_none(&self.codec_type),
        }
    }

    /// The state id is always the cluster id; the id in the response is not
    /// used. The secret is write-only, so `known_secret` is kept when the
    /// response has none.
    fn from_response(
        settings: ClusterSettings,
        cluster_id: &str,
        known_secret: Option<String>,
    ) -> Self {
        Self {
            id: Some(cluster_id.to_string()),
            cluster_id: cluster_id.to_string(),
            address: Some(settings.address),
            auto_apply_changesets: Some(settings.auto_apply_changesets),
            cookie_expire: Some(settings.cookie_expire),
            cookie_http_only: Some(settings.cookie_http_only),
            cookie_name: Some(settings.cookie_name),
            default_upstream_timeout: Some(settings.default_upstream_timeout),
            dns_lookup_family: Some(settings.dns_lookup_family),
            log_level: Some(settings.log_level),
            pass_identity_headers: Some(settings.pass_identity_headers),
            skip_xff_append: Some(settings.skip_xff_append),
            timeout_idle: Some(settings.timeout_idle),
            timeout_read: Some(settings.timeout_read),
            timeout_write: Some(settings.timeout_write),
            tracing_sample_rate: Some(settings.tracing_sample_rate),
            codec_type: Some(settings.codec_type),
            authenticate_service_url: non_empty(settings.authenticate_service_url),
            identity_provider: non_empty(settings.identity_provider),
            identity_provider_client_id: non_empty(settings.identity_provider_client_id),
            identity_provider_client_secret: settings
                .identity_provider_client_secret
                .and_then(non_empty)
                .or(known_secret),
            identity_provider_url: non_empty(settings.identity_provider_url),
            proxy_log_level: non_empty(settings.proxy_log_level),
        }
    }
}

fn settings_path(session: &Session, cluster_id: &str) -> String {
    session.org_path(&format!("clusters/{}/settings", cluster_id))
}

fn cluster_id(attrs: &Attributes) -> Result<&str> {
    attrs
        .get("cluster_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::diagnostic("Missing cluster ID", "cluster_id is not set"))
}

fn known_secret(attrs: &Attributes) -> Option<String> {
    attrs
        .get("identity_provider_client_secret")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// State after create is the plan with `id` set to the cluster id. The
/// response only fills computed attributes the plan left null.
fn state_from_plan(
    schema: &Schema,
    planned: &Attributes,
    cluster_id: &str,
    reported: Attributes,
) -> Attributes {
    let mut state = planned.clone();
    state.insert("id".into(), Value::String(cluster_id.to_string()));
    for (name, value) in reported {
        let computed = schema.get(&name).is_some_and(|a| a.computed);
        if computed && state.get(&name).map_or(true, Value::is_null) {
            state.insert(name, value);
        }
    }
    state
}

/// Either all identity-provider attributes are set or none are.
fn validate_identity_provider(config: &Attributes) -> Option<Diagnostic> {
    let set = IDENTITY_PROVIDER_FIELDS
        .iter()
        .filter(|name| is_set(config, name))
        .count();
    if set == 0 || set == IDENTITY_PROVIDER_FIELDS.len() {
        return None;
    }
    let missing: Vec<&str> = IDENTITY_PROVIDER_FIELDS
        .iter()
        .copied()
        .filter(|name| !is_set(config, name))
        .collect();
    Some(Diagnostic::error(
        "Invalid Identity Provider Configuration",
        format!(
            "identity provider settings must be given together; missing: {}",
            missing.join(", ")
        ),
    ))
}

#[async_trait]
impl Resource for ClusterSettingsResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        let mut schema = Schema::new("Settings of a Pomerium Zero cluster.")
            .attribute(
                "id",
                Attribute::string()
                    .computed()
                    .describe("Same as cluster_id."),
            )
            .attribute(
                "cluster_id",
                Attribute::string()
                    .required()
                    .requires_replace()
                    .describe("Cluster whose settings are managed."),
            );
        for name in [
            "address",
            "cookie_expire",
            "cookie_name",
            "default_upstream_timeout",
            "dns_lookup_family",
            "log_level",
            "timeout_idle",
            "timeout_read",
            "timeout_write",
            "codec_type",
        ] {
            schema = schema.attribute(name, Attribute::string().optional().computed());
        }
        for name in [
            "auto_apply_changesets",
            "cookie_http_only",
            "pass_identity_headers",
            "skip_xff_append",
        ] {
            schema = schema.attribute(name, Attribute::bool().optional().computed());
        }
        schema
            .attribute(
                "tracing_sample_rate",
                Attribute::float64().optional().computed(),
            )
            .attribute("authenticate_service_url", Attribute::string().optional())
            .attribute("identity_provider", Attribute::string().optional())
            .attribute("identity_provider_client_id", Attribute::string().optional())
            .attribute(
                "identity_provider_client_secret",
                Attribute::string().optional().sensitive(),
            )
            .attribute("identity_provider_url", Attribute::string().optional())
            .attribute("proxy_log_level", Attribute::string().optional())
    }

    fn validate(&self, config: &Attributes) -> Vec<Diagnostic> {
        validate_identity_provider(config).into_iter().collect()
    }

    fn normalize_plan(&self, planned: &mut Attributes) {
        if planned.get("proxy_log_level").and_then(Value::as_str) == Some("") {
            planned.insert("proxy_log_level".into(), Value::Null);
        }
        if let Some(id) = planned.get("cluster_id").filter(|v| v.is_string()).cloned() {
            planned.insert("id".into(), id);
        }
    }

    async fn create(&self, session: &Session, planned: &Attributes) -> Result<Attributes> {
        let model: ClusterSettingsModel = decode_model(planned)?;
        let created: ClusterSettings = session
            .api()
            .post_json(
                &settings_path(session, &model.cluster_id),
                &model.to_create_request(),
                StatusCode::CREATED,
            )
            .await?;
        debug!(cluster_id = %model.cluster_id, "created cluster settings");
        let reported = encode_model(&ClusterSettingsModel::from_response(
            created,
            &model.cluster_id,
            None,
        ))?;
        Ok(state_from_plan(&self.schema(), planned, &model.cluster_id, reported))
    }

    async fn read(&self, session: &Session, prior: &Attributes) -> Result<Option<Attributes>> {
        let cluster_id = cluster_id(prior)?;
        let settings: Option<ClusterSettings> =
            found(session.api().get_json(&settings_path(session, cluster_id)).await)?;
        let Some(settings) = settings else {
            return Ok(None);
        };
        encode_model(&ClusterSettingsModel::from_response(
            settings,
            cluster_id,
            known_secret(prior),
        ))
        .map(Some)
    }

    async fn update(
        &self,
        session: &Session,
        planned: &Attributes,
        _prior: &Attributes,
    ) -> Result<Attributes> {
        let model: ClusterSettingsModel = decode_model(planned)?;
        let updated: ClusterSettings = session
            .api()
            .put_json(
                &settings_path(session, &model.cluster_id),
                &model.to_update_request(),
            )
            .await?;
        encode_model(&ClusterSettingsModel::from_response(
            updated,
            &model.cluster_id,
            model.identity_provider_client_secret.clone(),
        ))
    }

    async fn delete(&self, session: &Session, prior: &Attributes) -> Result<()> {
        let cluster_id = cluster_id(prior)?;
        session.api().delete(&settings_path(session, cluster_id)).await
    }

    async fn import(&self, session: &Session, id: &str) -> Result<Attributes> {
        let settings: ClusterSettings = session.api().get_json(&settings_path(session, id)).await?;
        encode_model(&ClusterSettingsModel::from_response(settings, id, None))
    }
}
