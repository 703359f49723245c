//! `pomeriumzero_cluster`: look up a cluster by name.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{encode_model, Attributes, DataSource};
use crate::error::{Error, Result};
use crate::models::Cluster;
use crate::schema::{Attribute, Schema};
use crate::session::Session;

pub const TYPE_NAME: &str = "pomeriumzero_cluster";

pub struct ClusterDataSource;

#[derive(Debug, Serialize)]
struct ClusterModel {
    id: String,
    name: String,
    namespace_id: String,
    domain: String,
    fqdn: String,
    auto_detect_ip_address: String,
    created_at: String,
    updated_at: String,
}

impl From<Cluster> for ClusterModel {
    fn from(c: Cluster) -> Self {
        Self {
            id: c.id,
            name: c.name,
            namespace_id: c.namespace_id,
            domain: c.domain,
            fqdn: c.fqdn,
            auto_detect_ip_address: c.auto_detect_ip_address,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// Every cluster in the organization.
pub async fn list_clusters(session: &Session) -> Result<Vec<Cluster>> {
    session.api().get_json(&session.org_path("clusters")).await
}

/// First cluster named `name`.
pub fn find_cluster(clusters: Vec<Cluster>, name: &str) -> Result<Cluster> {
    clusters
        .into_iter()
        .find(|c| c.name == name)
        .ok_or_else(|| {
            Error::diagnostic(
                "Cluster not found",
                format!("No cluster found with name: {}", name),
            )
        })
}

#[async_trait]
impl DataSource for ClusterDataSource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::new("Look up a Pomerium Zero cluster by name.")
            .attribute("name", Attribute::string().required().describe("Cluster name."))
            .attribute("id", Attribute::string().computed())
            .attribute("namespace_id", Attribute::string().computed())
            .attribute("domain", Attribute::string().computed())
            .attribute("fqdn", Attribute::string().computed())
            .attribute("auto_detect_ip_address", Attribute::string().computed())
            .attribute("created_at", Attribute::string().computed())
            .attribute("updated_at", Attribute::string().computed())
    }

    async fn read(&self, session: &Session, config: &Attributes) -> Result<Attributes> {
        let name = config.get("name").and_then(Value::as_str).unwrap_or_default();
        let cluster = find_cluster(list_clusters(session).await?, name)?;
        debug!(name, id = %cluster.id, "found cluster");
        encode_model(&ClusterModel::from(cluster))
    }
}
