//! Module registry: an explicit registration table per module kind.
//!
//! A [`RegistryBuilder`] collects factories through `register(factory)`
//! calls (usually from [`PluginProvider`]s run once at startup) and freezes
//! into an immutable [`ModuleRegistry`]. Each registry instance owns its
//! maps; nothing is global, so tests and worker processes build their own.
//!
//! Registering two factories with the same display name within a kind is
//! a hard [`GaapError::DuplicateModuleName`] error. A provider that fails
//! is recorded as a [`LoadError`] and the remaining providers still load.

use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::params::{ParamValue, ParameterValidationError};
use super::traits::{
    AnalysisMethod, Canonicizer, Described, DistanceFunction, Embedding, EventCulling,
    EventDriver, Module, NO_DISTANCE,
};
use crate::errors::{GaapError, Result};
use crate::types::ModuleKind;

// ============================================================================
// Factories
// ============================================================================

/// Constructor for one module type, indexed by its display name.
pub struct ModuleFactory<T: ?Sized> {
    pub name: &'static str,
    pub description: &'static str,
    build: Arc<dyn Fn() -> Box<T> + Send + Sync>,
}

impl<T: ?Sized> ModuleFactory<T> {
    pub fn new(
        name: &'static str,
        description: &'static str,
        build: impl Fn() -> Box<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            description,
            build: Arc::new(build),
        }
    }

    /// A fresh instance with every parameter at its default.
    pub fn build(&self) -> Box<T> {
        (self.build)()
    }
}

impl<T: ?Sized> Clone for ModuleFactory<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            description: self.description,
            build: Arc::clone(&self.build),
        }
    }
}

/// A factory tagged with its module kind; the argument of `register`.
pub enum AnyFactory {
    Canonicizer(ModuleFactory<dyn Canonicizer>),
    EventDriver(ModuleFactory<dyn EventDriver>),
    EventCulling(ModuleFactory<dyn EventCulling>),
    Embedding(ModuleFactory<dyn Embedding>),
    AnalysisMethod(ModuleFactory<dyn AnalysisMethod>),
    DistanceFunction(ModuleFactory<dyn DistanceFunction>),
}

impl AnyFactory {
    pub fn canonicizer<M: Canonicizer + Described + Default + 'static>() -> Self {
        Self::Canonicizer(ModuleFactory::<dyn Canonicizer>::new(M::NAME, M::DESCRIPTION, || {
            Box::new(M::default()) as Box<dyn Canonicizer>
        }))
    }

    pub fn event_driver<M: EventDriver + Described + Default + 'static>() -> Self {
        Self::EventDriver(ModuleFactory::<dyn EventDriver>::new(M::NAME, M::DESCRIPTION, || {
            Box::new(M::default()) as Box<dyn EventDriver>
        }))
    }

    pub fn event_culling<M: EventCulling + Described + Default + 'static>() -> Self {
        Self::EventCulling(ModuleFactory::<dyn EventCulling>::new(M::NAME, M::DESCRIPTION, || {
            Box::new(M::default()) as Box<dyn EventCulling>
        }))
    }

    pub fn embedding<M: Embedding + Described + Default + 'static>() -> Self {
        Self::Embedding(ModuleFactory::<dyn Embedding>::new(M::NAME, M::DESCRIPTION, || {
            Box::new(M::default()) as Box<dyn Embedding>
        }))
    }

    pub fn analysis_method<M: AnalysisMethod + Described + Default + 'static>() -> Self {
        Self::AnalysisMethod(ModuleFactory::<dyn AnalysisMethod>::new(M::NAME, M::DESCRIPTION, || {
            Box::new(M::default()) as Box<dyn AnalysisMethod>
        }))
    }

    pub fn distance_function<M: DistanceFunction + Described + Default + 'static>() -> Self {
        Self::DistanceFunction(ModuleFactory::<dyn DistanceFunction>::new(M::NAME, M::DESCRIPTION, || {
            Box::new(M::default()) as Box<dyn DistanceFunction>
        }))
    }

    pub fn kind(&self) -> ModuleKind {
        match self {
            AnyFactory::Canonicizer(_) => ModuleKind::Canonicizer,
            AnyFactory::EventDriver(_) => ModuleKind::EventDriver,
            AnyFactory::EventCulling(_) => ModuleKind::EventCulling,
            AnyFactory::Embedding(_) => ModuleKind::Embedding,
            AnyFactory::AnalysisMethod(_) => ModuleKind::AnalysisMethod,
            AnyFactory::DistanceFunction(_) => ModuleKind::DistanceFunction,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AnyFactory::Canonicizer(f) => f.name,
            AnyFactory::EventDriver(f) => f.name,
            AnyFactory::EventCulling(f) => f.name,
            AnyFactory::Embedding(f) => f.name,
            AnyFactory::AnalysisMethod(f) => f.name,
            AnyFactory::DistanceFunction(f) => f.name,
        }
    }
}

// ============================================================================
// Per-kind catalog
// ============================================================================

/// Name -> factory map that remembers registration order.
struct Catalog<T: ?Sized> {
    by_name: FxHashMap<&'static str, ModuleFactory<T>>,
    order: Vec<&'static str>,
}

impl<T: ?Sized> Default for Catalog<T> {
    fn default() -> Self {
        Self {
            by_name: FxHashMap::default(),
            order: Vec::new(),
        }
    }
}

impl<T: ?Sized> Catalog<T> {
    fn insert(&mut self, kind: ModuleKind, factory: ModuleFactory<T>) -> Result<()> {
        if self.by_name.contains_key(factory.name) {
            return Err(GaapError::DuplicateModuleName {
                kind,
                name: factory.name.to_string(),
            });
        }
        self.order.push(factory.name);
        self.by_name.insert(factory.name, factory);
        Ok(())
    }

    fn get(&self, kind: ModuleKind, name: &str) -> Result<&ModuleFactory<T>> {
        self.by_name
            .get(name)
            .ok_or_else(|| GaapError::UnknownModule {
                kind,
                name: name.to_string(),
            })
    }

    fn listing(&self) -> Vec<(&'static str, &'static str)> {
        self.order
            .iter()
            .filter_map(|n| self.by_name.get(n).map(|f| (f.name, f.description)))
            .collect()
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    /// Fail on the first name `other` shares with this catalog.
    fn check_disjoint(&self, kind: ModuleKind, other: &Catalog<T>) -> Result<()> {
        match other.order.iter().find(|n| self.by_name.contains_key(*n)) {
            Some(name) => Err(GaapError::DuplicateModuleName {
                kind,
                name: name.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn absorb(&mut self, mut other: Catalog<T>) {
        for name in other.order {
            if let Some(factory) = other.by_name.remove(name) {
                self.order.push(name);
                self.by_name.insert(name, factory);
            }
        }
    }
}

// ============================================================================
// Plugin providers
// ============================================================================

/// A unit of registration, the analogue of one plugin file.
pub trait PluginProvider {
    fn name(&self) -> &str;

    fn register(&self, registry: &mut RegistryBuilder) -> Result<()>;
}

/// A provider that failed to register.
#[derive(Debug, Clone)]
pub struct LoadError {
    pub plugin: String,
    pub error: GaapError,
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.plugin, self.error)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Mutable registration phase of a [`ModuleRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    canonicizers: Catalog<dyn Canonicizer>,
    event_drivers: Catalog<dyn EventDriver>,
    event_culling: Catalog<dyn EventCulling>,
    embeddings: Catalog<dyn Embedding>,
    analysis_methods: Catalog<dyn AnalysisMethod>,
    distance_functions: Catalog<dyn DistanceFunction>,
    load_errors: Vec<LoadError>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one factory under its kind.
    pub fn register(&mut self, factory: AnyFactory) -> Result<()> {
        let kind = factory.kind();
        match factory {
            AnyFactory::Canonicizer(f) => self.canonicizers.insert(kind, f),
            AnyFactory::EventDriver(f) => self.event_drivers.insert(kind, f),
            AnyFactory::EventCulling(f) => self.event_culling.insert(kind, f),
            AnyFactory::Embedding(f) => self.embeddings.insert(kind, f),
            AnyFactory::AnalysisMethod(f) => self.analysis_methods.insert(kind, f),
            AnyFactory::DistanceFunction(f) => {
                if f.name == NO_DISTANCE {
                    return Err(GaapError::invalid_config(format!(
                        "'{NO_DISTANCE}' is reserved and cannot name a distance function"
                    )));
                }
                self.distance_functions.insert(kind, f)
            }
        }
    }

    /// Run a provider, recording its failure instead of propagating it.
    ///
    /// The provider registers into a scratch builder that is merged only
    /// when every registration succeeded, so a failing plugin contributes
    /// no modules.
    pub fn load_plugin(&mut self, provider: &dyn PluginProvider) -> &mut Self {
        let mut scratch = RegistryBuilder::new();
        let outcome = provider
            .register(&mut scratch)
            .and_then(|()| self.merge(scratch));
        match outcome {
            Ok(()) => debug!(plugin = provider.name(), "plugin loaded"),
            Err(error) => {
                warn!(plugin = provider.name(), %error, "plugin failed to load");
                self.load_errors.push(LoadError {
                    plugin: provider.name().to_string(),
                    error,
                });
            }
        }
        self
    }

    /// Move every factory of `other` into this builder, or none of them
    /// if any name is already taken.
    fn merge(&mut self, other: RegistryBuilder) -> Result<()> {
        self.canonicizers
            .check_disjoint(ModuleKind::Canonicizer, &other.canonicizers)?;
        self.event_drivers
            .check_disjoint(ModuleKind::EventDriver, &other.event_drivers)?;
        self.event_culling
            .check_disjoint(ModuleKind::EventCulling, &other.event_culling)?;
        self.embeddings
            .check_disjoint(ModuleKind::Embedding, &other.embeddings)?;
        self.analysis_methods
            .check_disjoint(ModuleKind::AnalysisMethod, &other.analysis_methods)?;
        self.distance_functions
            .check_disjoint(ModuleKind::DistanceFunction, &other.distance_functions)?;

        self.canonicizers.absorb(other.canonicizers);
        self.event_drivers.absorb(other.event_drivers);
        self.event_culling.absorb(other.event_culling);
        self.embeddings.absorb(other.embeddings);
        self.analysis_methods.absorb(other.analysis_methods);
        self.distance_functions.absorb(other.distance_functions);
        self.load_errors.extend(other.load_errors);
        Ok(())
    }

    /// Builder method: register the built-in module library
    pub fn with_builtin(mut self) -> Self {
        self.load_plugin(&crate::modules::BuiltinModules);
        self
    }

    pub fn build(self) -> ModuleRegistry {
        ModuleRegistry {
            canonicizers: self.canonicizers,
            event_drivers: self.event_drivers,
            event_culling: self.event_culling,
            embeddings: self.embeddings,
            analysis_methods: self.analysis_methods,
            distance_functions: self.distance_functions,
            load_errors: self.load_errors,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Immutable lookup tables for all six module kinds.
pub struct ModuleRegistry {
    canonicizers: Catalog<dyn Canonicizer>,
    event_drivers: Catalog<dyn EventDriver>,
    event_culling: Catalog<dyn EventCulling>,
    embeddings: Catalog<dyn Embedding>,
    analysis_methods: Catalog<dyn AnalysisMethod>,
    distance_functions: Catalog<dyn DistanceFunction>,
    load_errors: Vec<LoadError>,
}

/// Apply parameters to a fresh instance, naming the module in the error.
fn configure<M: Module + ?Sized>(
    mut module: Box<M>,
    params: &BTreeMap<String, ParamValue>,
) -> std::result::Result<Box<M>, ParameterValidationError> {
    module.params_mut().apply(params)?;
    Ok(module)
}

impl ModuleRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Registry containing only the built-in module library.
    pub fn with_builtin() -> Self {
        RegistryBuilder::new().with_builtin().build()
    }

    pub fn load_errors(&self) -> &[LoadError] {
        &self.load_errors
    }

    pub fn count(&self, kind: ModuleKind) -> usize {
        match kind {
            ModuleKind::Canonicizer => self.canonicizers.len(),
            ModuleKind::EventDriver => self.event_drivers.len(),
            ModuleKind::EventCulling => self.event_culling.len(),
            ModuleKind::Embedding => self.embeddings.len(),
            ModuleKind::AnalysisMethod => self.analysis_methods.len(),
            ModuleKind::DistanceFunction => self.distance_functions.len(),
        }
    }

    /// `(name, description)` of every module of `kind`, in registration order.
    pub fn catalog(&self, kind: ModuleKind) -> Vec<(&'static str, &'static str)> {
        match kind {
            ModuleKind::Canonicizer => self.canonicizers.listing(),
            ModuleKind::EventDriver => self.event_drivers.listing(),
            ModuleKind::EventCulling => self.event_culling.listing(),
            ModuleKind::Embedding => self.embeddings.listing(),
            ModuleKind::AnalysisMethod => self.analysis_methods.listing(),
            ModuleKind::DistanceFunction => self.distance_functions.listing(),
        }
    }

    pub fn contains(&self, kind: ModuleKind, name: &str) -> bool {
        self.catalog(kind).iter().any(|(n, _)| *n == name)
    }

    /// Refuse to run experiments when load errors left a kind empty.
    pub fn ensure_ready(&self) -> Result<()> {
        if self.load_errors.is_empty() {
            return Ok(());
        }
        for kind in ModuleKind::ALL {
            if self.count(kind) == 0 {
                let errors = self
                    .load_errors
                    .iter()
                    .map(LoadError::to_string)
                    .collect::<Vec<_>>()
                    .join("\n");
                return Err(GaapError::RegistryUnavailable { kind, errors });
            }
        }
        Ok(())
    }

    /// Check `params` against the module's schema and return the complete
    /// parameter map with defaults filled in. The `NA` distance sentinel
    /// resolves to an empty map.
    pub fn resolve_params(
        &self,
        kind: ModuleKind,
        name: &str,
        params: &BTreeMap<String, ParamValue>,
    ) -> Result<BTreeMap<String, ParamValue>> {
        let values = match kind {
            ModuleKind::Canonicizer => self.canonicizer(name, params)?.params().values().clone(),
            ModuleKind::EventDriver => self.event_driver(name, params)?.params().values().clone(),
            ModuleKind::EventCulling => self.event_culler(name, params)?.params().values().clone(),
            ModuleKind::Embedding => self.embedding(name, params)?.params().values().clone(),
            ModuleKind::AnalysisMethod => {
                self.analysis_method(name, params)?.params().values().clone()
            }
            ModuleKind::DistanceFunction if name == NO_DISTANCE => BTreeMap::new(),
            ModuleKind::DistanceFunction => {
                self.distance_function(name, params)?.params().values().clone()
            }
        };
        Ok(values)
    }

    /// Whether the named analysis method needs a distance function.
    pub fn needs_distance_function(&self, method: &str) -> Result<bool> {
        Ok(self
            .analysis_method(method, &BTreeMap::new())?
            .needs_distance_function())
    }

    pub fn canonicizer(
        &self,
        name: &str,
        params: &BTreeMap<String, ParamValue>,
    ) -> Result<Box<dyn Canonicizer>> {
        let factory = self.canonicizers.get(ModuleKind::Canonicizer, name)?;
        Ok(configure(factory.build(), params)?)
    }

    pub fn event_driver(
        &self,
        name: &str,
        params: &BTreeMap<String, ParamValue>,
    ) -> Result<Box<dyn EventDriver>> {
        let factory = self.event_drivers.get(ModuleKind::EventDriver, name)?;
        Ok(configure(factory.build(), params)?)
    }

    pub fn event_culler(
        &self,
        name: &str,
        params: &BTreeMap<String, ParamValue>,
    ) -> Result<Box<dyn EventCulling>> {
        let factory = self.event_culling.get(ModuleKind::EventCulling, name)?;
        Ok(configure(factory.build(), params)?)
    }

    pub fn embedding(
        &self,
        name: &str,
        params: &BTreeMap<String, ParamValue>,
    ) -> Result<Box<dyn Embedding>> {
        let factory = self.embeddings.get(ModuleKind::Embedding, name)?;
        Ok(configure(factory.build(), params)?)
    }

    pub fn analysis_method(
        &self,
        name: &str,
        params: &BTreeMap<String, ParamValue>,
    ) -> Result<Box<dyn AnalysisMethod>> {
        let factory = self.analysis_methods.get(ModuleKind::AnalysisMethod, name)?;
        Ok(configure(factory.build(), params)?)
    }

    pub fn distance_function(
        &self,
        name: &str,
        params: &BTreeMap<String, ParamValue>,
    ) -> Result<Box<dyn DistanceFunction>> {
        let factory = self
            .distance_functions
            .get(ModuleKind::DistanceFunction, name)?;
        Ok(configure(factory.build(), params)?)
    }
}
