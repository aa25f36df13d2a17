//! Serializable experiment request.
//!
//! An [`ExperimentRequest`] is everything a run needs, by value: document
//! metadata (optionally with inline text), global parameters, the ordered
//! module configuration as `(kind, name, params)` tuples, and the engine
//! config. It is what crosses the process boundary to a worker, which
//! rebuilds module instances from its own registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::params::ParamValue;
use super::traits::NO_DISTANCE;
use crate::errors::Result;
use crate::types::{title_from_path, Document, EngineConfig, GlobalParameters, ModuleKind};

/// A document to load; empty `author` marks an unknown document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSource {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub title: String,
    pub filepath: String,
    /// Inline content; when present the file is not read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl DocumentSource {
    pub fn known(author: impl Into<String>, filepath: impl Into<String>) -> Self {
        let filepath = filepath.into();
        Self {
            author: author.into(),
            title: title_from_path(&filepath),
            filepath,
            text: None,
        }
    }

    pub fn unknown(filepath: impl Into<String>) -> Self {
        Self::known("", filepath)
    }

    /// Builder method: supply the text inline
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Builder method: override the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn is_unknown(&self) -> bool {
        self.author.is_empty()
    }

    /// Build the pipeline document, reading the file unless text is inline.
    pub fn load(&self) -> Result<Document> {
        let title = if self.title.is_empty() {
            title_from_path(&self.filepath)
        } else {
            self.title.clone()
        };
        let mut doc = Document::new(&self.author, title, &self.filepath);
        match &self.text {
            Some(text) => doc.text = text.clone(),
            None => doc.read_text()?,
        }
        Ok(doc)
    }
}

/// One configured module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub kind: ModuleKind,
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

impl ModuleSpec {
    pub fn new(kind: ModuleKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Builder method: set one parameter
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// The `NA` placeholder in a distance slot.
    pub fn no_distance() -> Self {
        Self::new(ModuleKind::DistanceFunction, NO_DISTANCE)
    }

    pub fn is_no_distance(&self) -> bool {
        self.kind == ModuleKind::DistanceFunction && self.name == NO_DISTANCE
    }
}

/// A complete, self-contained experiment description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRequest {
    #[serde(default)]
    pub documents: Vec<DocumentSource>,
    #[serde(default)]
    pub global_parameters: GlobalParameters,
    /// In configured order. Distance function entries align index-for-index
    /// with analysis method entries.
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Default for ExperimentRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl ExperimentRequest {
    pub fn new() -> Self {
        Self {
            documents: Vec::new(),
            global_parameters: GlobalParameters::default(),
            modules: Vec::new(),
            engine: EngineConfig::default(),
        }
    }

    /// Builder method: add a document
    pub fn with_document(mut self, doc: DocumentSource) -> Self {
        self.documents.push(doc);
        self
    }

    /// Builder method: append a module
    pub fn with_module(mut self, spec: ModuleSpec) -> Self {
        self.modules.push(spec);
        self
    }

    /// Builder method: append an analysis method and its distance slot
    pub fn with_analysis(mut self, method: ModuleSpec, distance: ModuleSpec) -> Self {
        self.modules.push(method);
        self.modules.push(distance);
        self
    }

    /// Builder method: replace the engine config
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Configured modules of one kind, in order.
    pub fn modules_of(&self, kind: ModuleKind) -> impl Iterator<Item = &ModuleSpec> {
        self.modules.iter().filter(move |m| m.kind == kind)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
