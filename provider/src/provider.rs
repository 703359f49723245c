//! The provider: registry of resource and data source handlers plus the
//! provider configuration schema.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::error::Result;
use crate::resources::{
    ClusterDataSource, ClusterSettingsResource, DataSource, PolicyDataSource, PolicyResource,
    Resource, RouteResource,
};
use crate::schema::{Attribute, Schema};
use crate::session::{ProviderConfig, Session};

/// Prefix of every type this provider serves.
pub const PROVIDER_TYPE_NAME: &str = "pomeriumzero";

pub struct Provider {
    resources: BTreeMap<&'static str, Box<dyn Resource>>,
    data_sources: BTreeMap<&'static str, Box<dyn DataSource>>,
}

impl Default for Provider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider {
    pub fn new() -> Self {
        let mut provider = Self {
            resources: BTreeMap::new(),
            data_sources: BTreeMap::new(),
        };
        provider.register_resource(Box::new(PolicyResource));
        provider.register_resource(Box::new(RouteResource));
        provider.register_resource(Box::new(ClusterSettingsResource));
        provider.register_data_source(Box::new(ClusterDataSource));
        provider.register_data_source(Box::new(PolicyDataSource));
        provider
    }

    fn register_resource(&mut self, resource: Box<dyn Resource>) {
        self.resources.insert(resource.type_name(), resource);
    }

    fn register_data_source(&mut self, data_source: Box<dyn DataSource>) {
        self.data_sources.insert(data_source.type_name(), data_source);
    }

    pub fn resource(&self, type_name: &str) -> Option<&dyn Resource> {
        self.resources.get(type_name).map(|r| r.as_ref())
    }

    pub fn data_source(&self, type_name: &str) -> Option<&dyn DataSource> {
        self.data_sources.get(type_name).map(|d| d.as_ref())
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.resources.keys().copied()
    }

    pub fn data_source_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.data_sources.keys().copied()
    }

    pub fn provider_schema(&self) -> Schema {
        Schema::new("Pomerium Zero provider configuration.")
            .attribute(
                "api_token",
                Attribute::string()
                    .optional()
                    .sensitive()
                    .describe("Pomerium Zero API token."),
            )
            .attribute(
                "base_url",
                Attribute::string()
                    .optional()
                    .describe("Pomerium Zero API base URL."),
            )
            .attribute(
                "timeout_secs",
                Attribute::int64()
                    .optional()
                    .describe("Per-request timeout in seconds."),
            )
    }

    /// Every schema, keyed the way they are addressed in a manifest.
    pub fn schemas(&self) -> Value {
        let resources: BTreeMap<_, _> = self
            .resources
            .iter()
            .map(|(name, r)| (*name, r.schema()))
            .collect();
        let data_sources: BTreeMap<_, _> = self
            .data_sources
            .iter()
            .map(|(name, d)| (*name, d.schema()))
            .collect();
        json!({
            "provider": self.provider_schema(),
            "resource_schemas": resources,
            "data_source_schemas": data_sources,
        })
    }

    /// Authenticate and resolve the organization.
    pub async fn configure(&self, config: &ProviderConfig) -> Result<Session> {
        Session::connect(config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_every_type_under_the_provider_prefix() {
        let provider = Provider::new();
        let resources: Vec<_> = provider.resource_types().collect();
        assert_eq!(
            resources,
            vec![
                "pomeriumzero_cluster_settings",
                "pomeriumzero_policy",
                "pomeriumzero_route"
            ]
        );
        let data_sources: Vec<_> = provider.data_source_types().collect();
        assert_eq!(data_sources, vec!["pomeriumzero_cluster", "pomeriumzero_policy"]);
        assert!(resources
            .iter()
            .chain(&data_sources)
            .all(|t| t.starts_with(&format!("{}_", PROVIDER_TYPE_NAME))));
    }

    #[test]
    fn schemas_render_as_json() {
        let schemas = Provider::new().schemas();
        assert_eq!(
            schemas["resource_schemas"]["pomeriumzero_route"]["attributes"]["show_error_details"]
                ["default"],
            true
        );
        assert_eq!(
            schemas["provider"]["attributes"]["api_token"]["sensitive"],
            true
        );
    }

    #[test]
    fn provider_timeout_is_a_whole_number_of_seconds() {
        let provider = Provider::new();
        assert_eq!(
            provider.schemas()["provider"]["attributes"]["timeout_secs"]["type"],
            "int64"
        );

        let schema = provider.provider_schema();
        let mut block = serde_json::Map::new();
        block.insert("timeout_secs".into(), json!(30));
        assert!(schema.validate_config(&block).is_empty());
        block.insert("timeout_secs".into(), json!(1.5));
        let diags = schema.validate_config(&block);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].summary, "Incorrect attribute value type");

        let manifest = crate::Manifest::from_yaml_str("provider:\n  timeout_secs: 30\n")
            .expect("manifest");
        assert_eq!(manifest.provider.timeout_secs, Some(30));
    }
}
