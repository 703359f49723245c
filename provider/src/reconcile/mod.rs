//! Reconciliation: bring remote objects in line with a [`Manifest`].
//!
//! Every object is handled one request at a time in dependency order, and
//! state is written after each step so a failed run keeps what it finished.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::error::{Diagnostic, Error, Result};
use crate::manifest::Manifest;
use crate::provider::Provider;
use crate::reference::{self, Reference, Resolved};
use crate::resources::{Attributes, Resource};
use crate::schema::Schema;
use crate::session::Session;
use crate::state::{ResourceState, StateFile, StateStore};

mod graph;
mod plan;

pub use plan::{
    Action, ApplyReport, AttributeChange, Plan, PlanOptions, PlanSummary, RefreshReport,
    ResourceChange,
};

use plan::{delete_change, plan_resource};

/// Declared objects in dependency order.
struct Analysis {
    order: Vec<Address>,
    dependencies: BTreeMap<Address, BTreeSet<Address>>,
}

fn schema_for(provider: &Provider, address: &Address) -> Option<Schema> {
    if address.is_data() {
        provider.data_source(&address.type_name).map(|d| d.schema())
    } else {
        provider.resource(&address.type_name).map(|r| r.schema())
    }
}

fn analyze(provider: &Provider, manifest: &Manifest) -> Result<Analysis> {
    let mut diags = Vec::new();
    let mut dependencies = BTreeMap::new();

    for (address, config) in manifest.objects() {
        let prefix = address.to_string();
        let Some(schema) = schema_for(provider, &address) else {
            let kind = if address.is_data() {
                "data source"
            } else {
                "resource type"
            };
            diags.push(
                Diagnostic::error(
                    format!("Invalid {}", kind),
                    format!("The provider does not support {} {:?}.", kind, address.type_name),
                )
                .within(&prefix),
            );
            continue;
        };

        diags.extend(
            schema
                .validate_config(config)
                .into_iter()
                .map(|d| d.within(&prefix)),
        );
        if !address.is_data() {
            if let Some(resource) = provider.resource(&address.type_name) {
                diags.extend(resource.validate(config).into_iter().map(|d| d.within(&prefix)));
            }
        }

        let mut targets = BTreeSet::new();
        for (name, value) in config {
            let refs = match reference::collect(value) {
                Ok(refs) => refs,
                Err(e) => {
                    diags.extend(
                        e.into_diagnostics()
                            .into_iter()
                            .map(|d| d.with_attribute(name.as_str()).within(&prefix)),
                    );
                    continue;
                }
            };
            for r in refs {
                let target_schema = manifest
                    .contains(&r.target)
                    .then(|| schema_for(provider, &r.target))
                    .flatten();
                match target_schema {
                    None => diags.push(
                        Diagnostic::error(
                            "Reference to undeclared object",
                            format!("{} has not been declared.", r.target),
                        )
                        .with_attribute(name.as_str())
                        .within(&prefix),
                    ),
                    Some(s) if s.get(&r.attribute).is_none() => diags.push(
                        Diagnostic::error(
                            "Unsupported attribute",
                            format!("{} has no attribute {:?}.", r.target, r.attribute),
                        )
                        .with_attribute(name.as_str())
                        .within(&prefix),
                    ),
                    Some(_) => {
                        targets.insert(r.target);
                    }
                }
            }
        }
        dependencies.insert(address, targets);
    }

    if !diags.is_empty() {
        return Err(Error::Invalid(diags));
    }

    let order = graph::topological_order(&dependencies).map_err(|cycle| {
        let members: Vec<String> = cycle.iter().map(ToString::to_string).collect();
        Error::invalid(Diagnostic::error(
            "Cycle in references",
            format!("dependency cycle between: {}", members.join(", ")),
        ))
    })?;
    Ok(Analysis {
        order,
        dependencies,
    })
}

/// Check a manifest without contacting the API. Returns the objects in the
/// order they would be applied.
pub fn validate(provider: &Provider, manifest: &Manifest) -> Result<Vec<Address>> {
    analyze(provider, manifest).map(|a| a.order)
}

/// `filter`ed state resources, dependents before their dependencies.
fn delete_order(state: &StateFile, filter: impl Fn(&Address) -> bool) -> Result<Vec<Address>> {
    let deps: BTreeMap<Address, BTreeSet<Address>> = state
        .resources
        .iter()
        .filter(|(address, _)| filter(*address))
        .map(|(address, r)| (address.clone(), r.dependencies.iter().cloned().collect()))
        .collect();
    let mut order = graph::topological_order(&deps).map_err(|cycle| {
        let members: Vec<String> = cycle.iter().map(ToString::to_string).collect();
        Error::diagnostic(
            "Invalid state",
            format!("dependency cycle between: {}", members.join(", ")),
        )
    })?;
    order.reverse();
    Ok(order)
}

/// Known values of everything planned or applied so far.
#[derive(Default)]
struct Values {
    known: BTreeMap<Address, Attributes>,
    unknown: BTreeMap<Address, BTreeSet<String>>,
}

impl Values {
    fn lookup(&self, r: &Reference) -> Result<Resolved> {
        if self
            .unknown
            .get(&r.target)
            .is_some_and(|names| names.contains(&r.attribute))
        {
            return Ok(Resolved::Unknown);
        }
        let attrs = self.known.get(&r.target).ok_or_else(|| {
            Error::diagnostic(
                "Reference to unknown value",
                format!("{} has no value yet", r.target),
            )
        })?;
        Ok(Resolved::Known(
            attrs.get(&r.attribute).cloned().unwrap_or(Value::Null),
        ))
    }

    /// The configuration with references substituted, and the names of
    /// attributes whose value is not known yet (left null).
    fn resolve(&self, config: &Attributes) -> Result<(Attributes, BTreeSet<String>)> {
        let mut resolved = Attributes::new();
        let mut unknown = BTreeSet::new();
        for (name, value) in config {
            match reference::resolve(value, &|r: &Reference| self.lookup(r))? {
                Resolved::Known(v) => {
                    resolved.insert(name.clone(), v);
                }
                Resolved::Unknown => {
                    resolved.insert(name.clone(), Value::Null);
                    unknown.insert(name.clone());
                }
            }
        }
        Ok((resolved, unknown))
    }
}

pub struct Reconciler<'a> {
    provider: &'a Provider,
    session: &'a Session,
}

impl<'a> Reconciler<'a> {
    pub fn new(provider: &'a Provider, session: &'a Session) -> Self {
        Self { provider, session }
    }

    fn resource(&self, address: &Address) -> Result<&'a dyn Resource> {
        self.provider
            .resource(&address.type_name)
            .filter(|_| !address.is_data())
            .ok_or_else(|| {
                Error::invalid(Diagnostic::error(
                    "Invalid resource type",
                    format!("The provider does not support resource type {:?}.", address.type_name),
                ))
            })
    }

    /// Resolve one declared object's configuration and check the result.
    fn resolve(
        &self,
        values: &Values,
        address: &Address,
        config: &Attributes,
        schema: &Schema,
    ) -> Result<(Attributes, BTreeSet<String>)> {
        let (resolved, unknown) = values.resolve(config)?;
        let diags = schema.type_diagnostics(&resolved);
        if !diags.is_empty() {
            return Err(Error::Invalid(
                diags.into_iter().map(|d| d.within(&address.to_string())).collect(),
            ));
        }
        Ok((resolved, unknown))
    }

    async fn read_data(
        &self,
        address: &Address,
        config: &Attributes,
        values: &mut Values,
        deferred: &mut Vec<ResourceChange>,
    ) -> Result<()> {
        let data_source = self
            .provider
            .data_source(&address.type_name)
            .ok_or_else(|| Error::diagnostic("Invalid data source", address.type_name.clone()))?;
        let schema = data_source.schema();
        let (resolved, unknown) = self.resolve(values, address, config, &schema)?;
        if unknown.is_empty() {
            debug!(%address, "reading data source");
            let attrs = data_source.read(self.session, &resolved).await?;
            values.known.insert(address.clone(), attrs);
        } else {
            let pending: BTreeSet<String> = schema
                .attributes
                .keys()
                .filter(|name| resolved.get(**name).map_or(true, Value::is_null))
                .map(|name| name.to_string())
                .collect();
            values.known.insert(address.clone(), resolved);
            values.unknown.insert(address.clone(), pending);
            deferred.push(ResourceChange {
                address: address.clone(),
                action: Action::Read,
                attributes: Vec::new(),
            });
        }
        Ok(())
    }

    /// Read a managed resource; `None` if it is gone remotely.
    async fn read_resource(
        &self,
        address: &Address,
        prior: &Attributes,
    ) -> Result<Option<Attributes>> {
        let current = self.resource(address)?.read(self.session, prior).await?;
        if current.is_none() {
            warn!(%address, "resource no longer exists remotely");
        }
        Ok(current)
    }

    /// Delete tolerating objects that are already gone.
    async fn delete_remote(&self, address: &Address, prior: &Attributes) -> Result<()> {
        match self.resource(address)?.delete(self.session, prior).await {
            Err(e) if e.is_not_found() => {
                warn!(%address, "already deleted remotely");
                Ok(())
            }
            other => other,
        }
    }

    /// Compute the changes `apply` would make. Nothing is written.
    pub async fn plan(
        &self,
        manifest: &Manifest,
        state: &StateFile,
        options: PlanOptions,
    ) -> Result<Plan> {
        let analysis = analyze(self.provider, manifest)?;

        let mut prior: BTreeMap<Address, Attributes> = BTreeMap::new();
        for (address, resource) in &state.resources {
            let attrs = if options.refresh {
                self.read_resource(address, &resource.attributes)
                    .await
                    .map_err(|e| Error::at(address, e))?
            } else {
                Some(resource.attributes.clone())
            };
            if let Some(attrs) = attrs {
                prior.insert(address.clone(), attrs);
            }
        }

        let mut changes = Vec::new();
        for address in delete_order(state, |a| !manifest.contains(a))? {
            if let Some(attrs) = prior.get(&address) {
                let schema = self.resource(&address)?.schema();
                changes.push(delete_change(&schema, &address, attrs));
            }
        }

        let mut values = Values::default();
        for address in &analysis.order {
            let Some(config) = manifest.get(address) else {
                continue;
            };
            if address.is_data() {
                self.read_data(address, config, &mut values, &mut changes)
                    .await
                    .map_err(|e| Error::at(address, e))?;
                continue;
            }
            let resource = self.resource(address)?;
            let (resolved, unknown) = self
                .resolve(&values, address, config, &resource.schema())
                .map_err(|e| Error::at(address, e))?;
            let planned = plan_resource(resource, address, &resolved, &unknown, prior.get(address));
            values.known.insert(address.clone(), planned.attributes);
            values.unknown.insert(address.clone(), planned.unknown);
            changes.push(planned.change);
        }

        let plan = Plan { changes };
        info!(summary = %plan.summary(), "plan computed");
        Ok(plan)
    }

    /// Make remote objects match `manifest`, recording each step in `state`.
    ///
    /// `progress` is called before every change. The first failure stops the
    /// run; steps already taken stay in the state file.
    pub async fn apply(
        &self,
        manifest: &Manifest,
        store: &StateStore,
        state: &mut StateFile,
        progress: &mut dyn FnMut(&Address, Action),
    ) -> Result<ApplyReport> {
        let analysis = analyze(self.provider, manifest)?;
        let mut report = ApplyReport::default();

        for address in delete_order(state, |a| !manifest.contains(a))? {
            let Some(prior) = state.get(&address).map(|r| r.attributes.clone()) else {
                continue;
            };
            progress(&address, Action::Delete);
            self.delete_remote(&address, &prior)
                .await
                .map_err(|e| Error::at(&address, e))?;
            state.remove(&address);
            store.persist(state)?;
            report.record(&address, Action::Delete);
        }

        let mut values = Values::default();
        for address in &analysis.order {
            let Some(config) = manifest.get(address) else {
                continue;
            };
            if address.is_data() {
                let mut deferred = Vec::new();
                self.read_data(address, config, &mut values, &mut deferred)
                    .await
                    .map_err(|e| Error::at(address, e))?;
                continue;
            }
            let dependencies: Vec<Address> = analysis
                .dependencies
                .get(address)
                .map(|d| d.iter().cloned().collect())
                .unwrap_or_default();
            let attrs = self
                .apply_resource(
                    address,
                    config,
                    dependencies,
                    &values,
                    store,
                    state,
                    progress,
                    &mut report,
                )
                .await
                .map_err(|e| Error::at(address, e))?;
            values.known.insert(address.clone(), attrs);
        }

        info!(summary = %report.summary(), "apply complete");
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_resource(
        &self,
        address: &Address,
        config: &Attributes,
        dependencies: Vec<Address>,
        values: &Values,
        store: &StateStore,
        state: &mut StateFile,
        progress: &mut dyn FnMut(&Address, Action),
        report: &mut ApplyReport,
    ) -> Result<Attributes> {
        let resource = self.resource(address)?;
        let (resolved, unknown) = self.resolve(values, address, config, &resource.schema())?;
        if !unknown.is_empty() {
            return Err(Error::diagnostic(
                "Value not known",
                format!(
                    "{} still depend on values that are not known",
                    unknown.into_iter().collect::<Vec<_>>().join(", ")
                ),
            ));
        }

        let prior = match state.get(address).map(|r| r.attributes.clone()) {
            Some(attrs) => {
                let current = self.read_resource(address, &attrs).await?;
                if current.is_none() {
                    state.remove(address);
                    store.persist(state)?;
                }
                current
            }
            None => None,
        };

        let planned = plan_resource(resource, address, &resolved, &unknown, prior.as_ref());
        let action = planned.change.action;
        if action.is_change() {
            progress(address, action);
        }
        let attrs = match (action, prior) {
            (Action::Create, _) | (_, None) => {
                resource.create(self.session, &planned.attributes).await?
            }
            (Action::Update, Some(prior)) => {
                resource
                    .update(self.session, &planned.attributes, &prior)
                    .await?
            }
            (Action::Replace, Some(prior)) => {
                self.delete_remote(address, &prior).await?;
                state.remove(address);
                store.persist(state)?;
                resource.create(self.session, &planned.attributes).await?
            }
            (_, Some(prior)) => prior,
        };

        let updated = ResourceState::new(address, attrs.clone(), dependencies);
        if state.get(address) != Some(&updated) {
            state.insert(address.clone(), updated);
            store.persist(state)?;
        }
        if action.is_change() {
            debug!(%address, %action, "applied");
            report.record(address, action);
        }
        Ok(attrs)
    }

    /// Read every managed resource and update state; vanished ones are
    /// dropped. Each change is written as soon as it is read, so a failed
    /// read keeps the results before it.
    pub async fn refresh(&self, store: &StateStore, state: &mut StateFile) -> Result<RefreshReport> {
        let mut report = RefreshReport::default();
        let addresses: Vec<Address> = state.addresses().cloned().collect();
        for address in addresses {
            let Some(prior) = state.get(&address).map(|r| r.attributes.clone()) else {
                continue;
            };
            match self
                .read_resource(&address, &prior)
                .await
                .map_err(|e| Error::at(&address, e))?
            {
                Some(attrs) => {
                    if attrs != prior {
                        if let Some(resource) = state.resources.get_mut(&address) {
                            resource.attributes = attrs;
                        }
                        store.persist(state)?;
                    }
                    report.refreshed.push(address);
                }
                None => {
                    state.remove(&address);
                    store.persist(state)?;
                    report.removed.push(address);
                }
            }
        }
        Ok(report)
    }

    /// Bring an existing remote object under management at `address`.
    pub async fn import(
        &self,
        manifest: &Manifest,
        store: &StateStore,
        state: &mut StateFile,
        address: &Address,
        id: &str,
    ) -> Result<()> {
        if address.is_data() {
            return Err(Error::invalid(Diagnostic::error(
                "Invalid import address",
                "Data sources are read on every run and cannot be imported.",
            )));
        }
        if !manifest.contains(address) {
            return Err(Error::invalid(Diagnostic::error(
                "Configuration for import target does not exist",
                format!("{} must be declared in the manifest before importing.", address),
            )));
        }
        if state.contains(address) {
            return Err(Error::invalid(Diagnostic::error(
                "Resource already managed",
                format!("{} is already in state. Remove it first to import again.", address),
            )));
        }
        let analysis = analyze(self.provider, manifest)?;
        let resource = self.resource(address)?;
        let attrs = resource
            .import(self.session, id)
            .await
            .map_err(|e| Error::at(address, e))?;
        let dependencies = analysis
            .dependencies
            .get(address)
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default();
        state.insert(
            address.clone(),
            ResourceState::new(address, attrs, dependencies),
        );
        store.persist(state)?;
        info!(%address, id, "imported");
        Ok(())
    }

    /// Delete every resource in state, dependents first.
    pub async fn destroy(
        &self,
        store: &StateStore,
        state: &mut StateFile,
        progress: &mut dyn FnMut(&Address, Action),
    ) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();
        for address in delete_order(state, |_| true)? {
            let Some(prior) = state.get(&address).map(|r| r.attributes.clone()) else {
                continue;
            };
            progress(&address, Action::Delete);
            self.delete_remote(&address, &prior)
                .await
                .map_err(|e| Error::at(&address, e))?;
            state.remove(&address);
            store.persist(state)?;
            report.record(&address, Action::Delete);
        }
        Ok(report)
    }
}
