//! Experiment orchestrator: drives documents through the staged pipeline.
//!
//! An [`Experiment`] is built from an [`ExperimentRequest`] and a
//! [`ModuleRegistry`]. [`Experiment::run`] executes the linear stages
//!
//! ```text
//! load → validate → canonicize → extract events → cull events
//!      → { embed × classify } → finalize
//! ```
//!
//! and always ends with exactly one [`ExperimentObserver::on_complete`].
//!
//! # Failure policy
//!
//! | Stage | Per-module failure | Fatal when |
//! |-------|--------------------|------------|
//! | load | - | any file unreadable |
//! | validate | - | any rule reports an error |
//! | canonicize | warn, skip output | never |
//! | extract | warn, skip output | every driver failed, or a document has no events |
//! | cull | warn, skip output | a document has no events left |
//! | embed | warn, skip embedding | - |
//! | classify | warn, skip pair | no embedding produced a successful pair |

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::artifacts::{
    timestamp, DocumentMeta, DocumentState, DumpEntry, ExperimentResult, IntermediateSnapshot,
    ModuleRecord, Status,
};
use super::error_code::ErrorCode;
use super::errors::StageError;
use super::observer::{ExperimentObserver, StageClock};
use super::pool::WorkerPool;
use super::registry::ModuleRegistry;
use super::report::{format_block, ReportModules};
use super::request::{DocumentSource, ExperimentRequest};
use super::traits::{
    AnalysisMethod, Canonicizer, DistanceSlot, Embedding, EventCulling, EventDriver, Module,
    StageContext, NO_DISTANCE,
};
use super::validation::{DistancePairing, ValidationContext, ValidationEngine};
use crate::errors::{GaapError, Result};
use crate::types::{AuthorScores, Document, EngineConfig, GlobalParameters, ModuleKind};

/// Enter a tracing span covering one orchestrator stage.
macro_rules! trace_stage {
    ($name:expr) => {
        let _span = tracing::info_span!("experiment_stage", stage = $name).entered();
    };
}

pub const STAGE_LOAD: &str = "load_documents";
pub const STAGE_VALIDATE: &str = "validate";
pub const STAGE_CANONICIZE: &str = "canonicize";
pub const STAGE_EXTRACT: &str = "extract_events";
pub const STAGE_CULL: &str = "cull_events";
pub const STAGE_CLASSIFY: &str = "embed_classify";
pub const STAGE_FINALIZE: &str = "finalize";

// ============================================================================
// Experiment
// ============================================================================

/// An analysis method with its aligned distance slot.
struct PairedMethod {
    method: Box<dyn AnalysisMethod>,
    slot: DistanceSlot,
    pairing: DistancePairing,
}

impl PairedMethod {
    /// `"<am>"` or `"<am>, <df>"`.
    fn progress_label(&self) -> String {
        if self.slot.is_applicable() {
            format!("{}, {}", self.method.display_name(), self.slot.name())
        } else {
            self.method.display_name().to_string()
        }
    }

    fn distance_record(&self) -> ModuleRecord {
        match &self.slot {
            DistanceSlot::Function(df) => {
                ModuleRecord::pending(df.display_name(), df.params().values().clone())
            }
            DistanceSlot::NotApplicable => ModuleRecord::pending(NO_DISTANCE, BTreeMap::new()),
        }
    }
}

/// A fully instantiated experiment, ready to run.
pub struct Experiment {
    sources: Vec<DocumentSource>,
    globals: GlobalParameters,
    engine: EngineConfig,
    canonicizers: Vec<Box<dyn Canonicizer>>,
    event_drivers: Vec<Box<dyn EventDriver>>,
    event_cullers: Vec<Box<dyn EventCulling>>,
    embeddings: Vec<Box<dyn Embedding>>,
    methods: Vec<PairedMethod>,
}

/// A stage ended the run; carries the complete failure message.
struct Fatal(String);

impl Experiment {
    /// Instantiate every configured module from `registry`.
    ///
    /// Unknown module names, rejected parameters, an invalid engine config,
    /// and a registry left unusable by plugin load errors all fail here,
    /// before any document is read.
    pub fn from_request(registry: &ModuleRegistry, request: ExperimentRequest) -> Result<Self> {
        registry.ensure_ready()?;
        request.engine.validate()?;

        let canonicizers = request
            .modules_of(ModuleKind::Canonicizer)
            .map(|m| registry.canonicizer(&m.name, &m.params))
            .collect::<Result<Vec<_>>>()?;
        let event_drivers = request
            .modules_of(ModuleKind::EventDriver)
            .map(|m| registry.event_driver(&m.name, &m.params))
            .collect::<Result<Vec<_>>>()?;
        let event_cullers = request
            .modules_of(ModuleKind::EventCulling)
            .map(|m| registry.event_culler(&m.name, &m.params))
            .collect::<Result<Vec<_>>>()?;
        let embeddings = request
            .modules_of(ModuleKind::Embedding)
            .map(|m| registry.embedding(&m.name, &m.params))
            .collect::<Result<Vec<_>>>()?;

        let method_specs: Vec<_> = request.modules_of(ModuleKind::AnalysisMethod).collect();
        let distance_specs: Vec<_> = request.modules_of(ModuleKind::DistanceFunction).collect();
        if distance_specs.len() > method_specs.len() {
            return Err(GaapError::invalid_config(format!(
                "{} distance functions configured for {} analysis methods",
                distance_specs.len(),
                method_specs.len()
            )));
        }

        let mut methods = Vec::with_capacity(method_specs.len());
        for (i, spec) in method_specs.iter().enumerate() {
            let method = registry.analysis_method(&spec.name, &spec.params)?;
            let (slot, distance) = match distance_specs.get(i) {
                None => (DistanceSlot::NotApplicable, None),
                Some(d) if d.is_no_distance() => {
                    (DistanceSlot::NotApplicable, Some(NO_DISTANCE.to_string()))
                }
                Some(d) => {
                    let df = registry.distance_function(&d.name, &d.params)?;
                    (DistanceSlot::Function(Arc::from(df)), Some(d.name.clone()))
                }
            };
            let pairing = DistancePairing {
                method: spec.name.clone(),
                needs_distance: method.needs_distance_function(),
                distance,
            };
            methods.push(PairedMethod {
                method,
                slot,
                pairing,
            });
        }

        Ok(Self {
            sources: request.documents,
            globals: request.global_parameters,
            engine: request.engine,
            canonicizers,
            event_drivers,
            event_cullers,
            embeddings,
            methods,
        })
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    /// Run every stage and report the result to `observer`.
    pub fn run(&mut self, observer: &mut dyn ExperimentObserver) -> ExperimentResult {
        let clock = StageClock::start();
        info!(documents = self.sources.len(), "experiment started");
        let result = match WorkerPool::new(&self.engine) {
            Ok(pool) => {
                let mut run = RunState::new(self, pool, observer);
                match self.execute(&mut run) {
                    Ok(result) => result,
                    Err(Fatal(message)) => ExperimentResult::failure(message),
                }
            }
            Err(err) => ExperimentResult::failure(err.to_string()),
        };
        info!(
            status = u8::from(result.status),
            elapsed_ms = clock.elapsed_ms(),
            "experiment finished"
        );
        observer.on_complete(&result);
        result
    }

    fn execute(&mut self, run: &mut RunState<'_>) -> std::result::Result<ExperimentResult, Fatal> {
        self.load(run)?;
        self.validate(run)?;
        self.canonicize(run);
        self.extract(run)?;
        self.cull(run)?;
        run.observer.on_percent(0.0);
        self.classify(run)?;
        Ok(self.finalize(run))
    }

    // ─── Load ───────────────────────────────────────────────────────────

    fn load(&self, run: &mut RunState<'_>) -> std::result::Result<(), Fatal> {
        trace_stage!(STAGE_LOAD);
        run.observer.on_status("Getting documents");
        let (known, unknown): (Vec<&DocumentSource>, Vec<&DocumentSource>) =
            self.sources.iter().partition(|s| !s.is_unknown());
        run.n_known = known.len();
        run.docs = known
            .into_iter()
            .chain(unknown)
            .map(DocumentSource::load)
            .collect::<Result<Vec<_>>>()
            .map_err(|err| Fatal(err.to_string()))?;
        debug!(known = run.n_known, total = run.docs.len(), "documents loaded");
        Ok(())
    }

    // ─── Validate ───────────────────────────────────────────────────────

    fn validate(&self, run: &mut RunState<'_>) -> std::result::Result<(), Fatal> {
        trace_stage!(STAGE_VALIDATE);
        let pairings: Vec<DistancePairing> =
            self.methods.iter().map(|m| m.pairing.clone()).collect();
        let ctx = ValidationContext {
            known: run.known(),
            unknown: run.unknown(),
            event_drivers: self.event_drivers.len(),
            embeddings: self.embeddings.len(),
            pairings: &pairings,
        };
        let report = ValidationEngine::with_defaults().validate(&ctx);
        match report.first_error() {
            Some(err) => {
                warn!(code = %err.code, path = %err.path, "validation failed");
                Err(Fatal(err.message.clone()))
            }
            None => Ok(()),
        }
    }

    // ─── Canonicize ─────────────────────────────────────────────────────

    fn canonicize(&self, run: &mut RunState<'_>) {
        trace_stage!(STAGE_CANONICIZE);
        for (i, canonicizer) in self.canonicizers.iter().enumerate() {
            let name = canonicizer.display_name();
            run.observer
                .on_status(&format!("Running canonicizers\n{name}"));
            let outcome = {
                let mut ctx = StageContext {
                    pool: &run.pool,
                    progress: &mut *run.observer,
                    globals: &self.globals,
                };
                canonicizer
                    .process(&run.docs, &mut ctx)
                    .and_then(|texts| one_per_document(name, "texts", texts, run.docs.len()))
            };
            match outcome {
                Ok(texts) => {
                    for (doc, text) in run.docs.iter_mut().zip(texts) {
                        doc.canonicized = text;
                    }
                }
                Err(err) => {
                    run.module_failed(ModuleKind::Canonicizer, i, name, &err);
                    run.message
                        .push_str(&format!("\nCanonicizer failed: {name}\n{err}\n"));
                }
            }
            run.complete(ModuleKind::Canonicizer, i, name);
        }

        let mut fallbacks = 0;
        for doc in run.docs.iter_mut().filter(|d| d.canonicized.is_empty()) {
            doc.canonicized = doc.text.clone();
            fallbacks += 1;
        }
        if fallbacks > 0 && !self.canonicizers.is_empty() {
            debug!(
                fallbacks,
                total = run.docs.len(),
                "documents had no canonicized text; using original text"
            );
        }
    }

    // ─── Extract events ─────────────────────────────────────────────────

    fn extract(&self, run: &mut RunState<'_>) -> std::result::Result<(), Fatal> {
        trace_stage!(STAGE_EXTRACT);
        let mut succeeded = 0;
        for (i, driver) in self.event_drivers.iter().enumerate() {
            let name = driver.display_name();
            run.observer
                .on_status(&format!("Running event drivers\n{name}"));
            let outcome = {
                let mut ctx = StageContext {
                    pool: &run.pool,
                    progress: &mut *run.observer,
                    globals: &self.globals,
                };
                driver
                    .process(&run.docs, &mut ctx)
                    .and_then(|sets| one_per_document(name, "event sets", sets, run.docs.len()))
            };
            match outcome {
                Ok(sets) => {
                    for (doc, events) in run.docs.iter_mut().zip(sets) {
                        doc.event_set.extend(events);
                    }
                    succeeded += 1;
                }
                Err(err) => {
                    run.module_failed(ModuleKind::EventDriver, i, name, &err);
                    run.message
                        .push_str(&format!("\nEvent driver failed: {name}\n{err}\n"));
                }
            }
            run.complete(ModuleKind::EventDriver, i, name);
        }

        if succeeded == 0 {
            run.message.push_str("\nAll event drivers failed.");
            return Err(run.fatal(ErrorCode::AllEventDriversFailed, STAGE_EXTRACT));
        }

        let empty = run.docs.iter().filter(|d| d.event_set.is_empty()).count();
        if empty > 0 {
            run.message.push_str(&format!(
                "{empty}/{} docs had no event sets after event extraction.",
                run.docs.len()
            ));
            return Err(run.fatal(ErrorCode::EmptyEventSet, STAGE_EXTRACT));
        }
        Ok(())
    }

    // ─── Cull events ────────────────────────────────────────────────────

    fn cull(&self, run: &mut RunState<'_>) -> std::result::Result<(), Fatal> {
        trace_stage!(STAGE_CULL);
        for (i, culler) in self.event_cullers.iter().enumerate() {
            let name = culler.display_name();
            run.observer
                .on_status(&format!("Running event culling\n{name}"));
            let outcome = {
                let mut ctx = StageContext {
                    pool: &run.pool,
                    progress: &mut *run.observer,
                    globals: &self.globals,
                };
                culler
                    .process(&run.docs, &mut ctx)
                    .and_then(|sets| one_per_document(name, "event sets", sets, run.docs.len()))
            };
            match outcome {
                Ok(sets) => {
                    for (doc, events) in run.docs.iter_mut().zip(sets) {
                        doc.event_set = events;
                    }
                }
                Err(err) => {
                    run.module_failed(ModuleKind::EventCulling, i, name, &err);
                    run.message
                        .push_str(&format!("\nEvent culler failed: {name}\n{err}\n"));
                }
            }
            run.complete(ModuleKind::EventCulling, i, name);
        }

        let emptied: Vec<&str> = run
            .docs
            .iter()
            .filter(|d| d.event_set.is_empty())
            .map(|d| d.filepath.as_str())
            .collect();
        if emptied.is_empty() {
            return Ok(());
        }
        let listing = format!(
            "! {}/{} docs had no event sets after event culling:\n{}\n",
            emptied.len(),
            run.docs.len(),
            emptied.join("\n")
        );
        let err = GaapError::empty_event_set(
            "event culling",
            emptied.iter().map(|p| p.to_string()).collect(),
        );
        debug!(error = %err, "culling emptied event sets");
        run.message.push_str(&listing);
        Err(run.fatal(ErrorCode::EmptyEventSet, STAGE_CULL))
    }

    // ─── Embed × classify ───────────────────────────────────────────────

    fn classify(&mut self, run: &mut RunState<'_>) -> std::result::Result<(), Fatal> {
        trace_stage!(STAGE_CLASSIFY);
        let n_known = run.n_known;
        let mut embeddings_succeeded = 0;

        for (e, embedding) in self.embeddings.iter().enumerate() {
            let embedding_name = embedding.display_name();
            run.observer.on_status("Running embedders");
            run.observer.on_indeterminate(true);
            let outcome = {
                let mut ctx = StageContext {
                    pool: &run.pool,
                    progress: &mut *run.observer,
                    globals: &self.globals,
                };
                embedding.process(&mut run.docs, &mut ctx)
            };
            run.plan.embeddings[e].completed = true;
            let matrix = match outcome {
                Ok(matrix) => matrix,
                Err(err) => {
                    run.plan.embeddings[e].error = Some(err.to_string());
                    run.log_failure(ModuleKind::Embedding, embedding_name, &err);
                    run.message
                        .push_str(&format!("\nembedder failed: {embedding_name}\n{err}\n"));
                    run.snapshot(format!("{}/{embedding_name}", ModuleKind::Embedding.as_str()));
                    continue;
                }
            };
            run.snapshot(format!("{}/{embedding_name}", ModuleKind::Embedding.as_str()));

            let known_numbers = matrix.slice_rows(0, n_known);
            let unknown_numbers = matrix.slice_rows(n_known, matrix.rows());
            run.observer.on_status("Running analysis");

            let mut pairs_succeeded = 0;
            for (a, paired) in self.methods.iter_mut().enumerate() {
                let label = paired.progress_label();
                paired.method.set_distance_function(paired.slot.clone());
                run.observer.on_status(&format!("Running - {label}"));
                run.observer.on_indeterminate(true);

                let unknown_count = run.docs.len() - n_known;
                let outcome = paired
                    .method
                    .train(run.known(), &known_numbers)
                    .and_then(|()| paired.method.analyze(run.unknown(), &unknown_numbers))
                    .and_then(|scores| {
                        if scores.len() == unknown_count {
                            Ok(scores)
                        } else {
                            Err(GaapError::module(
                                paired.method.display_name(),
                                format!(
                                    "returned {} results for {unknown_count} unknown documents",
                                    scores.len()
                                ),
                            ))
                        }
                    });

                let method_name = paired.method.display_name();
                let pair = &mut run.plan.pairs[e][a];
                pair.attempted = true;
                match outcome {
                    Ok(scores) => {
                        pair.results = Some(
                            run.docs[n_known..]
                                .iter()
                                .map(|d| d.filepath.clone())
                                .zip(scores.iter().cloned())
                                .collect(),
                        );
                        let modules = ReportModules {
                            canonicizers: names(&self.canonicizers),
                            event_drivers: names(&self.event_drivers),
                            event_cullers: names(&self.event_cullers),
                            embedding: embedding_name,
                            analysis_method: method_name,
                            distance_function: paired.slot.name(),
                        };
                        for (doc, doc_scores) in run.docs[n_known..].iter().zip(&scores) {
                            run.blocks.push(format_block(doc, &modules, doc_scores));
                        }
                        pairs_succeeded += 1;
                    }
                    Err(err) => {
                        pair.error = Some(err.to_string());
                        run.log_failure(ModuleKind::AnalysisMethod, &label, &err);
                        run.message.push_str(&format!(
                            "\nAnalysis or distance function failed: {method_name}, {}\n{err}\n",
                            paired.slot.name()
                        ));
                    }
                }
                run.snapshot(format!("{}/{label}", ModuleKind::AnalysisMethod.as_str()));
            }

            if pairs_succeeded > 0 {
                embeddings_succeeded += 1;
            } else {
                debug!(embedding = embedding_name, "no analysis succeeded for embedding");
            }
        }

        if embeddings_succeeded == 0 {
            return Err(run.fatal(ErrorCode::NoSuccessfulAnalysis, STAGE_CLASSIFY));
        }
        Ok(())
    }

    // ─── Finalize ───────────────────────────────────────────────────────

    fn finalize(&self, run: &RunState<'_>) -> ExperimentResult {
        trace_stage!(STAGE_FINALIZE);
        let experiment_time = timestamp();
        let mut results_text = String::new();
        for block in &run.blocks {
            results_text.push_str(block);
            results_text.push('\n');
        }
        ExperimentResult {
            results_text,
            message: run.message.clone(),
            status: Status::Success,
            full_experiment_dump: run.plan.successful_entries(
                &run.docs,
                &self.globals,
                &experiment_time,
            ),
            experiment_time,
        }
    }
}

/// Run `request` to completion in this process.
///
/// Setup errors become a `status=1` result; `observer` sees exactly one
/// `on_complete` either way.
pub fn run_request(
    registry: &ModuleRegistry,
    request: ExperimentRequest,
    observer: &mut dyn ExperimentObserver,
) -> ExperimentResult {
    match Experiment::from_request(registry, request) {
        Ok(mut experiment) => experiment.run(observer),
        Err(err) => {
            warn!(
                error = %err,
                configuration = err.is_configuration_error(),
                "experiment setup failed"
            );
            let result = ExperimentResult::failure(err.to_string());
            observer.on_complete(&result);
            result
        }
    }
}

/// Reject module output that does not hold exactly one entry per document.
fn one_per_document<T>(
    module: &str,
    what: &str,
    output: Vec<T>,
    documents: usize,
) -> Result<Vec<T>> {
    if output.len() == documents {
        Ok(output)
    } else {
        Err(GaapError::module(
            module,
            format!("returned {} {what} for {documents} documents", output.len()),
        ))
    }
}

fn names<M: Module + ?Sized>(modules: &[Box<M>]) -> Vec<&str> {
    modules.iter().map(|m| m.display_name()).collect()
}

fn record<M: Module + ?Sized>(module: &M) -> ModuleRecord {
    ModuleRecord::pending(module.display_name(), module.params().values().clone())
}

// ============================================================================
// Per-run state
// ============================================================================

/// Outcome of one (embedding, analysis, distance) combination.
#[derive(Debug, Clone, Default)]
struct PairOutcome {
    attempted: bool,
    error: Option<String>,
    results: Option<BTreeMap<String, AuthorScores>>,
}

/// Module records for every planned combination, updated as the run moves.
struct RunPlan {
    preprocess: BTreeMap<ModuleKind, Vec<ModuleRecord>>,
    embeddings: Vec<ModuleRecord>,
    methods: Vec<ModuleRecord>,
    distances: Vec<ModuleRecord>,
    pairs: Vec<Vec<PairOutcome>>,
}

impl RunPlan {
    fn new(experiment: &Experiment) -> Self {
        let mut preprocess = BTreeMap::new();
        preprocess.insert(
            ModuleKind::Canonicizer,
            experiment.canonicizers.iter().map(|m| record(m.as_ref())).collect(),
        );
        preprocess.insert(
            ModuleKind::EventDriver,
            experiment.event_drivers.iter().map(|m| record(m.as_ref())).collect(),
        );
        preprocess.insert(
            ModuleKind::EventCulling,
            experiment.event_cullers.iter().map(|m| record(m.as_ref())).collect(),
        );
        Self {
            preprocess,
            embeddings: experiment.embeddings.iter().map(|m| record(m.as_ref())).collect(),
            methods: experiment
                .methods
                .iter()
                .map(|m| record(m.method.as_ref()))
                .collect(),
            distances: experiment
                .methods
                .iter()
                .map(PairedMethod::distance_record)
                .collect(),
            pairs: vec![
                vec![PairOutcome::default(); experiment.methods.len()];
                experiment.embeddings.len()
            ],
        }
    }

    fn record_mut(&mut self, kind: ModuleKind, index: usize) -> Option<&mut ModuleRecord> {
        self.preprocess.get_mut(&kind).and_then(|r| r.get_mut(index))
    }

    fn entry(
        &self,
        e: usize,
        a: usize,
        documents: &[Document],
        globals: &GlobalParameters,
        experiment_time: &str,
    ) -> DumpEntry {
        let pair = &self.pairs[e][a];
        let mut modules = self.preprocess.clone();
        modules.insert(ModuleKind::Embedding, vec![self.embeddings[e].clone()]);
        let mut method = self.methods[a].clone();
        method.completed = pair.attempted;
        method.error = pair.error.clone();
        let mut distance = self.distances[a].clone();
        distance.completed = pair.attempted;
        modules.insert(ModuleKind::AnalysisMethod, vec![method]);
        modules.insert(ModuleKind::DistanceFunction, vec![distance]);
        DumpEntry {
            modules,
            experiment_time: experiment_time.to_string(),
            success: pair.results.is_some(),
            documents: documents.iter().map(DocumentMeta::from).collect(),
            global_parameters: globals.clone(),
            doc_results: pair.results.clone(),
        }
    }

    /// Every planned combination, in embedding-major order.
    fn all_entries(
        &self,
        documents: &[Document],
        globals: &GlobalParameters,
        time: &str,
    ) -> Vec<DumpEntry> {
        let methods = self.methods.len();
        (0..self.embeddings.len())
            .flat_map(|e| (0..methods).map(move |a| (e, a)))
            .map(|(e, a)| self.entry(e, a, documents, globals, time))
            .collect()
    }

    fn successful_entries(
        &self,
        documents: &[Document],
        globals: &GlobalParameters,
        time: &str,
    ) -> Vec<DumpEntry> {
        self.all_entries(documents, globals, time)
            .into_iter()
            .filter(|entry| entry.success)
            .collect()
    }
}

struct RunState<'o> {
    observer: &'o mut dyn ExperimentObserver,
    pool: WorkerPool,
    globals: GlobalParameters,
    docs: Vec<Document>,
    n_known: usize,
    message: String,
    blocks: Vec<String>,
    plan: RunPlan,
    started: String,
}

impl<'o> RunState<'o> {
    fn new(
        experiment: &Experiment,
        pool: WorkerPool,
        observer: &'o mut dyn ExperimentObserver,
    ) -> Self {
        Self {
            observer,
            pool,
            globals: experiment.globals.clone(),
            docs: Vec::new(),
            n_known: 0,
            message: String::new(),
            blocks: Vec::new(),
            plan: RunPlan::new(experiment),
            started: timestamp(),
        }
    }

    fn known(&self) -> &[Document] {
        &self.docs[..self.n_known]
    }

    fn unknown(&self) -> &[Document] {
        &self.docs[self.n_known..]
    }

    fn log_failure(&self, kind: ModuleKind, name: &str, err: &GaapError) {
        let failure = StageError::module_failed(kind.as_str(), name, err.to_string());
        warn!(%failure, "module failed; skipping");
    }

    fn module_failed(&mut self, kind: ModuleKind, index: usize, name: &str, err: &GaapError) {
        if let Some(record) = self.plan.record_mut(kind, index) {
            record.error = Some(err.to_string());
        }
        self.log_failure(kind, name, err);
    }

    /// Mark a preprocessing module's step as attempted and publish a snapshot.
    fn complete(&mut self, kind: ModuleKind, index: usize, name: &str) {
        if let Some(record) = self.plan.record_mut(kind, index) {
            record.completed = true;
        }
        self.snapshot(format!("{}/{name}", kind.as_str()));
    }

    fn fatal(&self, code: ErrorCode, stage: &str) -> Fatal {
        let failure = StageError::new(code, stage, "", self.message.trim());
        warn!(%failure, "experiment aborted");
        Fatal(self.message.clone())
    }

    fn snapshot(&mut self, stage: String) {
        if !self.observer.wants_snapshots() {
            return;
        }
        let snapshot = IntermediateSnapshot {
            documents: self.docs.iter().map(DocumentState::from).collect(),
            dump: self.plan.all_entries(&self.docs, &self.globals, &self.started),
            stage,
        };
        debug!(stage = %snapshot.stage, "snapshot refreshed");
        self.observer.on_snapshot(&snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::observer::{ProgressEvent, RecordingObserver};
    use crate::pipeline::params::ParamValue;
    use crate::pipeline::request::ModuleSpec;

    fn corpus() -> Vec<DocumentSource> {
        vec![
            DocumentSource::known("Alice", "alice1.txt").with_text("the cat sat on the mat"),
            DocumentSource::known("Alice", "alice2.txt").with_text("the cat ate the rat"),
            DocumentSource::known("Bob", "bob1.txt").with_text("zebras zigzag quickly"),
            DocumentSource::known("Bob", "bob2.txt").with_text("quiz zoo zap buzz"),
            DocumentSource::unknown("unknown.txt").with_text("the cat sat on a hat"),
        ]
    }

    fn request() -> ExperimentRequest {
        let mut req = ExperimentRequest::new()
            .with_module(ModuleSpec::new(ModuleKind::EventDriver, "CharacterNGrams"))
            .with_module(ModuleSpec::new(ModuleKind::Embedding, "Frequency"))
            .with_analysis(
                ModuleSpec::new(ModuleKind::AnalysisMethod, "CentroidDriver"),
                ModuleSpec::new(ModuleKind::DistanceFunction, "EuclideanDistance"),
            )
            .with_engine(EngineConfig::default().with_multiprocessing(false));
        req.documents = corpus();
        req
    }

    fn run(req: ExperimentRequest) -> (ExperimentResult, RecordingObserver) {
        let registry = ModuleRegistry::with_builtin();
        let mut obs = RecordingObserver::new().with_snapshots();
        let result = run_request(&registry, req, &mut obs);
        (result, obs)
    }

    #[test]
    fn test_clean_run_attributes_alice() {
        let (result, obs) = run(request());
        assert!(result.is_success(), "{}", result.message);
        assert!(result.message.is_empty());
        assert_eq!(result.full_experiment_dump.len(), 1);
        assert!(result.results_text.starts_with("unknown.txt unknown.txt\n"));
        assert!(result.results_text.contains("1. Alice"));
        assert_eq!(obs.results.len(), 1);
        assert_eq!(obs.events.last(), Some(&ProgressEvent::Finished));
    }

    #[test]
    fn test_status_messages_in_stage_order() {
        let (_, obs) = run(request());
        let statuses: Vec<&str> = obs.statuses().collect();
        assert_eq!(
            statuses,
            vec![
                "Getting documents",
                "Running event drivers\nCharacterNGrams",
                "Running embedders",
                "Running analysis",
                "Running - CentroidDriver, EuclideanDistance",
            ]
        );
    }

    #[test]
    fn test_unknown_module_is_setup_failure() {
        let req = request().with_module(ModuleSpec::new(ModuleKind::Canonicizer, "Nope"));
        let (result, obs) = run(req);
        assert!(!result.is_success());
        assert!(result.message.contains("Nope"));
        assert_eq!(obs.results.len(), 1);
        assert!(obs.statuses().next().is_none());
    }

    #[test]
    fn test_extra_distance_functions_rejected() {
        let req = request().with_module(ModuleSpec::new(ModuleKind::DistanceFunction, "CosineDistance"));
        let (result, _) = run(req);
        assert!(!result.is_success());
        assert!(result.message.contains("2 distance functions"));
    }

    #[test]
    fn test_missing_distance_slot_fails_validation() {
        let mut req = request();
        req.modules.retain(|m| m.kind != ModuleKind::DistanceFunction);
        let (result, _) = run(req);
        assert_eq!(
            result.message,
            "Distance functions mismatch for CentroidDriver. Distance function: \"\""
        );
    }

    #[test]
    fn test_unreadable_file_is_fatal() {
        let mut req = request();
        req.documents.push(DocumentSource::unknown("/no/such/file.txt"));
        let (result, obs) = run(req);
        assert_eq!(result.message, "Error reading file at:\n/no/such/file.txt");
        assert!(obs.snapshots.is_empty());
    }

    #[test]
    fn test_canonicized_falls_back_to_text() {
        let (_, obs) = run(request());
        let snapshot = obs.snapshots.first().unwrap();
        assert_eq!(snapshot.documents[0].canonicized, "the cat sat on the mat");
    }

    #[test]
    fn test_snapshots_cover_every_step() {
        let req = request()
            .with_module(ModuleSpec::new(ModuleKind::Canonicizer, "UnifyCase"))
            .with_analysis(
                ModuleSpec::new(ModuleKind::AnalysisMethod, "CrossEntropy"),
                ModuleSpec::no_distance(),
            );
        let (result, obs) = run(req);
        assert!(result.is_success(), "{}", result.message);
        let stages: Vec<&str> = obs.snapshots.iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(
            stages,
            vec![
                "Canonicizers/UnifyCase",
                "EventDrivers/CharacterNGrams",
                "Embeddings/Frequency",
                "AnalysisMethods/CentroidDriver, EuclideanDistance",
                "AnalysisMethods/CrossEntropy",
            ]
        );
        for snapshot in &obs.snapshots {
            assert_eq!(snapshot.dump.len(), 2);
            assert!(snapshot.completion_is_monotonic());
        }
        assert_eq!(result.full_experiment_dump.len(), 2);
        assert!(result.full_experiment_dump.iter().all(|e| e.success));
    }

    #[test]
    fn test_dump_records_params() {
        let (result, _) = run(request());
        let entry = &result.full_experiment_dump[0];
        let drivers = &entry.modules[&ModuleKind::EventDriver];
        assert_eq!(drivers[0].params.get("n"), Some(&ParamValue::Int(2)));
        assert!(drivers[0].completed);
        assert_eq!(entry.module_names(ModuleKind::DistanceFunction), vec!["EuclideanDistance"]);
        let results = entry.doc_results.as_ref().unwrap();
        assert_eq!(results["unknown.txt"].len(), 2);
    }
}
