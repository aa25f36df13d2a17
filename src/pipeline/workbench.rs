//! Caller-side experiment configuration.
//!
//! A [`Workbench`] is the mutable state a GUI or script edits between runs:
//! known authors with their files, unknown documents, in-use modules per
//! kind, and global parameters. [`Workbench::to_request`] snapshots it into
//! an [`ExperimentRequest`]; editing the workbench afterwards never reaches
//! a run that already started.

use std::collections::BTreeMap;

use super::params::ParamValue;
use super::registry::ModuleRegistry;
use super::request::{DocumentSource, ExperimentRequest, ModuleSpec};
use super::traits::NO_DISTANCE;
use crate::errors::Result;
use crate::types::{EngineConfig, GlobalParameters, ModuleKind};

/// Ordered, possibly repeating, module configuration per kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModulesInUse {
    by_kind: BTreeMap<ModuleKind, Vec<ModuleSpec>>,
}

impl ModulesInUse {
    pub fn get(&self, kind: ModuleKind) -> &[ModuleSpec] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    fn list_mut(&mut self, kind: ModuleKind) -> &mut Vec<ModuleSpec> {
        self.by_kind.entry(kind).or_default()
    }

    /// All specs flattened in stage order, for a request.
    fn flatten(&self) -> Vec<ModuleSpec> {
        self.by_kind.values().flatten().cloned().collect()
    }
}

/// Mutable experiment setup bound to a registry.
pub struct Workbench<'r> {
    registry: &'r ModuleRegistry,
    known_authors: Vec<(String, Vec<String>)>,
    unknown_docs: Vec<DocumentSource>,
    modules: ModulesInUse,
    global_parameters: GlobalParameters,
    engine: EngineConfig,
}

impl<'r> Workbench<'r> {
    pub fn new(registry: &'r ModuleRegistry) -> Self {
        Self {
            registry,
            known_authors: Vec::new(),
            unknown_docs: Vec::new(),
            modules: ModulesInUse::default(),
            global_parameters: GlobalParameters::default(),
            engine: EngineConfig::default(),
        }
    }

    // ─── Documents ──────────────────────────────────────────────────────

    /// Add files for an author, merging with an existing entry.
    pub fn add_known_author(&mut self, author: &str, paths: impl IntoIterator<Item = String>) {
        match self.known_authors.iter_mut().find(|(a, _)| a == author) {
            Some((_, files)) => files.extend(paths),
            None => self
                .known_authors
                .push((author.to_string(), paths.into_iter().collect())),
        }
    }

    pub fn add_known_document(&mut self, author: &str, path: impl Into<String>) {
        self.add_known_author(author, [path.into()]);
    }

    pub fn add_unknown_document(&mut self, doc: DocumentSource) {
        self.unknown_docs.push(doc);
    }

    pub fn known_authors(&self) -> &[(String, Vec<String>)] {
        &self.known_authors
    }

    pub fn unknown_documents(&self) -> &[DocumentSource] {
        &self.unknown_docs
    }

    // ─── Modules ────────────────────────────────────────────────────────

    /// Append a module with default parameters; returns its position.
    ///
    /// For [`ModuleKind::DistanceFunction`] the `NA` sentinel is accepted.
    pub fn add_module(&mut self, kind: ModuleKind, name: &str) -> Result<usize> {
        let params = self.registry.resolve_params(kind, name, &BTreeMap::new())?;
        let list = self.modules.list_mut(kind);
        list.push(ModuleSpec {
            kind,
            name: name.to_string(),
            params,
        });
        Ok(list.len() - 1)
    }

    /// Append an analysis method and its distance slot together. Methods
    /// that take no distance function get `NA` whatever `distance` says.
    pub fn add_analysis(&mut self, method: &str, distance: &str) -> Result<usize> {
        let slot = if self.registry.needs_distance_function(method)? {
            distance
        } else {
            NO_DISTANCE
        };
        self.registry
            .resolve_params(ModuleKind::DistanceFunction, slot, &BTreeMap::new())?;
        let index = self.add_module(ModuleKind::AnalysisMethod, method)?;
        self.add_module(ModuleKind::DistanceFunction, slot)?;
        Ok(index)
    }

    pub fn remove_module(&mut self, kind: ModuleKind, index: usize) -> Option<ModuleSpec> {
        let list = self.modules.list_mut(kind);
        (index < list.len()).then(|| list.remove(index))
    }

    pub fn clear_modules(&mut self, kind: ModuleKind) {
        self.modules.list_mut(kind).clear();
    }

    /// Set a parameter on the module at `index`. On rejection the module
    /// keeps its previous parameters.
    pub fn set_param(
        &mut self,
        kind: ModuleKind,
        index: usize,
        name: &str,
        value: ParamValue,
    ) -> Result<()> {
        let registry = self.registry;
        let spec = self
            .modules
            .list_mut(kind)
            .get_mut(index)
            .ok_or_else(|| {
                crate::errors::GaapError::invalid_config(format!(
                    "no {kind} at position {index}"
                ))
            })?;
        let mut candidate = spec.params.clone();
        candidate.insert(name.to_string(), value);
        spec.params = registry.resolve_params(kind, &spec.name, &candidate)?;
        Ok(())
    }

    pub fn modules_in_use(&self, kind: ModuleKind) -> &[ModuleSpec] {
        self.modules.get(kind)
    }

    // ─── Globals ────────────────────────────────────────────────────────

    pub fn set_global_parameter(&mut self, name: &str, value: &str) {
        self.global_parameters.set(name, value);
    }

    pub fn global_parameters(&self) -> &GlobalParameters {
        &self.global_parameters
    }

    pub fn set_engine_config(&mut self, engine: EngineConfig) {
        self.engine = engine;
    }

    /// Snapshot into a request: known documents by author, then unknown.
    pub fn to_request(&self) -> ExperimentRequest {
        let known = self.known_authors.iter().flat_map(|(author, files)| {
            files
                .iter()
                .map(move |path| DocumentSource::known(author.as_str(), path.as_str()))
        });
        ExperimentRequest {
            documents: known.chain(self.unknown_docs.iter().cloned()).collect(),
            global_parameters: self.global_parameters.clone(),
            modules: self.modules.flatten(),
            engine: self.engine.clone(),
        }
    }
}
