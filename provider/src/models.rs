//! Wire models for the Pomerium Zero REST API.
//!
//! These mirror the API's camelCase JSON. Resource handlers convert between
//! them and their own snake_case state models.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::normalize::{is_false, is_zero, null_as_default};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cluster {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub namespace_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub domain: String,
    #[serde(deserialize_with = "null_as_default")]
    pub fqdn: String,
    #[serde(deserialize_with = "null_as_default")]
    pub auto_detect_ip_address: String,
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(deserialize_with = "null_as_default")]
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Policy {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub enforced: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub explanation: String,
    #[serde(deserialize_with = "null_as_default")]
    pub namespace_id: String,
    /// Pomerium Policy Language document, kept as raw JSON.
    pub ppl: Value,
    #[serde(deserialize_with = "null_as_default")]
    pub remediation: String,
    #[serde(deserialize_with = "null_as_default")]
    pub routes: Vec<PolicyRouteRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyRouteRef {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
}

/// Body of both `POST /policies` and `PUT /policies/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRequest {
    pub name: String,
    pub description: String,
    pub enforced: bool,
    pub explanation: String,
    pub namespace_id: String,
    pub ppl: Value,
    pub remediation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterSettings {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub address: String,
    #[serde(deserialize_with = "null_as_default")]
    pub authenticate_service_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub auto_apply_changesets: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub cookie_expire: String,
    #[serde(deserialize_with = "null_as_default")]
    pub cookie_http_only: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub cookie_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub default_upstream_timeout: String,
    #[serde(deserialize_with = "null_as_default")]
    pub dns_lookup_family: String,
    #[serde(deserialize_with = "null_as_default")]
    pub identity_provider: String,
    #[serde(deserialize_with = "null_as_default")]
    pub identity_provider_client_id: String,
    /// Write-only on most API versions: usually `null` in responses.
    pub identity_provider_client_secret: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub identity_provider_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub log_level: String,
    #[serde(deserialize_with = "null_as_default")]
    pub pass_identity_headers: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub proxy_log_level: String,
    #[serde(deserialize_with = "null_as_default")]
    pub skip_xff_append: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub timeout_idle: String,
    #[serde(deserialize_with = "null_as_default")]
    pub timeout_read: String,
    #[serde(deserialize_with = "null_as_default")]
    pub timeout_write: String,
    #[serde(deserialize_with = "null_as_default")]
    pub tracing_sample_rate: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub codec_type: String,
}

/// `POST /clusters/{id}/settings`: every zero value is omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClusterSettingsRequest {
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub address: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub authenticate_service_url: String,
    #[serde(skip_serializing_if = "is_false")]
    pub auto_apply_changesets: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cookie_expire: String,
    #[serde(skip_serializing_if = "is_false")]
    pub cookie_http_only: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cookie_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub default_upstream_timeout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub dns_lookup_family: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub identity_provider: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub identity_provider_client_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub identity_provider_client_secret: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub identity_provider_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub log_level: String,
    #[serde(skip_serializing_if = "is_false")]
    pub pass_identity_headers: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub proxy_log_level: String,
    #[serde(skip_serializing_if = "is_false")]
    pub skip_xff_append: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub timeout_idle: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub timeout_read: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub timeout_write: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub tracing_sample_rate: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub codec_type: String,
}

/// `PUT /clusters/{id}/settings`. `passIdentityHeaders`, `skipXffAppend`
/// and `codecType` are always sent so they can be switched back off; the
/// secret is only sent when set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClusterSettingsRequest {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub address: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub authenticate_service_url: String,
    #[serde(skip_serializing_if = "is_false")]
    pub auto_apply_changesets: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cookie_expire: String,
    #[serde(skip_serializing_if = "is_false")]
    pub cookie_http_only: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cookie_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub default_upstream_timeout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub dns_lookup_family: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub identity_provider: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub identity_provider_client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_provider_client_secret: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub identity_provider_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub log_level: String,
    pub pass_identity_headers: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub proxy_log_level: String,
    pub skip_xff_append: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub timeout_idle: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub timeout_read: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub timeout_write: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub tracing_sample_rate: f64,
    pub codec_type: String,
}

/// Body of both `POST /routes` and `PUT /routes/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    pub name: String,
    pub namespace_id: String,
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Vec<String>>,
    pub allow_spdy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_websockets: Option<bool>,
    pub enable_google_cloud_serverless_authentication: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_identity_headers: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preserve_host_header: Option<bool>,
    pub show_error_details: bool,
    pub tls_skip_verify: bool,
    pub tls_upstream_allow_renegotiation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_rewrite: Option<String>,
    pub kubernetes_service_account_token: String,
}

/// A route as returned by the API. Only the identifying strings are
/// mandatory; everything else is read leniently since the API omits unset
/// fields and older deployments return fewer of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteResponse {
    pub id: String,
    pub name: String,
    pub namespace_id: String,
    pub from: String,
    pub to: Option<Vec<String>>,
    pub allow_spdy: Option<bool>,
    pub allow_websockets: Option<bool>,
    pub enable_google_cloud_serverless_authentication: Option<bool>,
    pub pass_identity_headers: Option<bool>,
    pub preserve_host_header: Option<bool>,
    pub show_error_details: Option<bool>,
    pub tls_skip_verify: Option<bool>,
    pub tls_upstream_allow_renegotiation: Option<bool>,
    pub policy_ids: Option<Vec<String>>,
    pub prefix: Option<String>,
    pub prefix_rewrite: Option<String>,
    pub kubernetes_service_account_token: Option<String>,
}

impl RouteResponse {
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            Error::diagnostic("Invalid route response", "expected a JSON object")
        })?;
        Ok(Self {
            id: required_str(obj, "id")?,
            name: required_str(obj, "name")?,
            namespace_id: required_str(obj, "namespaceId")?,
            from: required_str(obj, "from")?,
            to: opt_string_list(obj, "to"),
            allow_spdy: opt_bool(obj, "allowSpdy"),
            allow_websockets: opt_bool(obj, "allowWebsockets"),
            enable_google_cloud_serverless_authentication: opt_bool(
                obj,
                "enableGoogleCloudServerlessAuthentication",
            ),
            pass_identity_headers: opt_bool(obj, "passIdentityHeaders"),
            preserve_host_header: opt_bool(obj, "preserveHostHeader"),
            show_error_details: opt_bool(obj, "showErrorDetails"),
            tls_skip_verify: opt_bool(obj, "tlsSkipVerify"),
            tls_upstream_allow_renegotiation: opt_bool(obj, "tlsUpstreamAllowRenegotiation"),
            policy_ids: opt_string_list(obj, "policyIds"),
            prefix: opt_str(obj, "prefix"),
            prefix_rewrite: opt_str(obj, "prefixRewrite"),
            kubernetes_service_account_token: opt_str(obj, "kubernetesServiceAccountToken"),
        })
    }
}

fn required_str(obj: &Map<String, Value>, key: &str) -> Result<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            Error::diagnostic(
                "Invalid route response",
                format!("field {:?} is missing or not a string", key),
            )
        })
}

fn opt_str(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn opt_bool(obj: &Map<String, Value>, key: &str) -> Option<bool> {
    obj.get(key).and_then(Value::as_bool)
}

fn opt_string_list(obj: &Map<String, Value>, key: &str) -> Option<Vec<String>> {
    let items = obj.get(key)?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
    )
}
