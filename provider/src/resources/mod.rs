//! Resource and data source handlers.
//!
//! Each handler is a unit struct: it owns no state of its own and receives
//! the authenticated [`Session`] on every call, so schemas and validation are
//! available without a network connection.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Diagnostic, Error, Result};
use crate::schema::Schema;
use crate::session::Session;

pub mod cluster;
pub mod cluster_settings;
pub mod policy;
pub mod route;

pub use cluster::ClusterDataSource;
pub use cluster_settings::ClusterSettingsResource;
pub use policy::{PolicyDataSource, PolicyResource};
pub use route::RouteResource;

/// Attribute values of one object, keyed by attribute name.
pub type Attributes = Map<String, Value>;

/// A remote object managed through create / read / update / delete.
#[async_trait]
pub trait Resource: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    /// Cross-attribute checks beyond the schema. Reference strings count as
    /// set values.
    fn validate(&self, _config: &Attributes) -> Vec<Diagnostic> {
        Vec::new()
    }

    /// Adjust a planned value before it is diffed against prior state.
    fn normalize_plan(&self, _planned: &mut Attributes) {}

    async fn create(&self, session: &Session, planned: &Attributes) -> Result<Attributes>;

    /// `None` when the object no longer exists remotely.
    async fn read(&self, session: &Session, prior: &Attributes) -> Result<Option<Attributes>>;

    async fn update(
        &self,
        session: &Session,
        planned: &Attributes,
        prior: &Attributes,
    ) -> Result<Attributes>;

    async fn delete(&self, session: &Session, prior: &Attributes) -> Result<()>;

    /// Full state for an existing remote object, by its id.
    async fn import(&self, session: &Session, id: &str) -> Result<Attributes>;
}

/// A read-only lookup.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    async fn read(&self, session: &Session, config: &Attributes) -> Result<Attributes>;
}

/// Serialize a resource model into attribute values.
pub fn encode_model<T: Serialize>(model: &T) -> Result<Attributes> {
    match serde_json::to_value(model)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::diagnostic(
            "Internal error",
            format!("model encoded as {} instead of an object", other),
        )),
    }
}

/// Deserialize attribute values into a resource model.
pub fn decode_model<T: DeserializeOwned>(attributes: &Attributes) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(attributes.clone()))?)
}

/// A 404 becomes `None`.
pub(crate) fn found<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

pub(crate) fn state_id(prior: &Attributes) -> Result<&str> {
    prior
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::diagnostic("Missing ID", "the resource has no id in state"))
}

/// The attribute is present, non-null and not an empty string.
pub(crate) fn is_set(config: &Attributes, name: &str) -> bool {
    match config.get(name) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}
