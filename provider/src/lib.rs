//! Pomerium Zero provider
//!
//! Manages resources hosted by the Pomerium Zero control plane (cluster
//! settings, routes, policies) and looks up read-only objects (clusters,
//! policies by name) by translating declared desired state into calls against
//! the Pomerium Zero REST API.
//!
//! The crate has two layers:
//!
//! - **Provider**: a [`Session`] (API token exchange + organization lookup)
//!   and one handler per resource kind implementing create / read / update /
//!   delete / import against its REST endpoint, with typed wire models and
//!   explicit field mapping in both directions.
//! - **Host**: a small reconciliation driver. A [`Manifest`] declares desired
//!   state, a [`StateStore`] persists what was applied, and the
//!   [`Reconciler`] plans and applies the difference one request at a time.
//!
//! ```ignore
//! use pomerium_zero_provider::{Manifest, Provider, ProviderConfig, Reconciler, StateStore};
//!
//! let provider = Provider::new();
//! let manifest = Manifest::load("zero.yaml".as_ref())?;
//! let session = provider.configure(&ProviderConfig::new(token)).await?;
//! let store = StateStore::new("pzctl.state.json");
//! let mut state = store.load()?;
//! let plan = Reconciler::new(&provider, &session)
//!     .plan(&manifest, &state, Default::default())
//!     .await?;
//! ```

pub mod address;
pub mod client;
pub mod error;
pub mod manifest;
pub mod models;
pub mod normalize;
pub mod provider;
pub mod reconcile;
pub mod reference;
pub mod resources;
pub mod schema;
pub mod session;
pub mod state;

pub use address::{Address, Mode};
pub use client::{ApiClient, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
pub use error::{Diagnostic, Error, Result};
pub use manifest::Manifest;
pub use provider::{Provider, PROVIDER_TYPE_NAME};
pub use reconcile::{
    Action, ApplyReport, AttributeChange, Plan, PlanOptions, PlanSummary, Reconciler,
    RefreshReport, ResourceChange,
};
pub use resources::{Attributes, DataSource, Resource};
pub use schema::{Attribute, AttributeType, Schema};
pub use session::{ProviderConfig, Session};
pub use state::{ResourceState, StateFile, StateStore};
