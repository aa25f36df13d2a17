//! Batch experiments from a CSV descriptor.
//!
//! ## Descriptor rows
//!
//! ```text
//! name,canonicizers,event drivers,event culling,embedding,analysis,distance,corpus.csv[,]
//! name,canonicizers,event drivers,analysis,distance,corpus.csv[,]
//! ```
//!
//! The first line is a header and is skipped. The short shape implies the
//! `Frequency` embedding and no culling. Several modules of one kind are
//! joined with `&`, and parameters follow the name as `|key:value`:
//!
//! ```text
//! ngrams,UnifyCase,CharacterNGrams|n:3&Words,,Frequency,CentroidDriver,CosineDistance,corpus.csv
//! ```
//!
//! ## Corpus rows
//!
//! `author,path,title`. An empty author marks an unknown document; an empty
//! title falls back to the file name. Relative paths resolve against the
//! directory of the file that names them.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::errors::{GaapError, Result};
use crate::pipeline::artifacts::ExperimentResult;
use crate::pipeline::observer::NoopObserver;
use crate::pipeline::params::ParamValue;
use crate::pipeline::registry::ModuleRegistry;
use crate::pipeline::request::{DocumentSource, ExperimentRequest};
use crate::pipeline::runner::run_request;
use crate::pipeline::workbench::Workbench;
use crate::types::{EngineConfig, ModuleKind};

const DEFAULT_EMBEDDING: &str = "Frequency";

// ─── Descriptor ─────────────────────────────────────────────────────────────

/// A module name with inline `key:value` parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry {
    pub name: String,
    pub params: Vec<(String, String)>,
}

impl ModuleEntry {
    /// Parse `Name|key:value|key:value`.
    pub fn parse(field: &str, line: usize) -> Result<Self> {
        let mut parts = field.split('|');
        let name = parts.next().unwrap_or_default().trim().to_string();
        if name.is_empty() {
            return Err(GaapError::descriptor(line, format!("empty module name in '{field}'")));
        }
        let params = parts
            .map(|pair| match pair.split_once(':') {
                Some((key, value)) => Ok((key.trim().to_string(), value.trim().to_string())),
                None => Err(GaapError::descriptor(
                    line,
                    format!("parameter '{pair}' of {name} is not key:value"),
                )),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { name, params })
    }

    /// Parse an `&`-joined list; empty members are dropped.
    pub fn parse_list(field: &str, line: usize) -> Result<Vec<Self>> {
        field
            .split('&')
            .filter(|s| !s.trim().is_empty())
            .map(|s| Self::parse(s, line))
            .collect()
    }

    /// Parse a field that must name at most one module.
    fn parse_single(field: &str, what: &str, line: usize) -> Result<Option<Self>> {
        let mut list = Self::parse_list(field, line)?;
        match list.len() {
            0 => Ok(None),
            1 => Ok(list.pop()),
            _ => Err(GaapError::descriptor(
                line,
                format!("only one {what} is allowed per experiment"),
            )),
        }
    }
}

/// One experiment row of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchExperiment {
    pub name: String,
    /// 1-based line in the descriptor.
    pub line: usize,
    pub canonicizers: Vec<ModuleEntry>,
    pub event_drivers: Vec<ModuleEntry>,
    pub event_culling: Vec<ModuleEntry>,
    pub embedding: ModuleEntry,
    pub analysis: ModuleEntry,
    pub distance: Option<ModuleEntry>,
    pub corpus: PathBuf,
}

/// Split one CSV line. Double-quoted fields may contain commas; `""`
/// inside quotes is a literal quote.
fn split_csv(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

fn resolve(base: &Path, entry: &str) -> PathBuf {
    let path = Path::new(entry.trim());
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Parse descriptor text. Relative corpus paths resolve against `base_dir`.
pub fn parse_descriptor(text: &str, base_dir: &Path) -> Result<Vec<BatchExperiment>> {
    let mut experiments = Vec::new();
    for (index, raw) in text.lines().enumerate().skip(1) {
        let line = index + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let row = split_csv(raw.trim_end_matches('\r'));
        let (canon, drivers, culling, embedding, analysis, distance, corpus) = match row.len() {
            8 | 9 => (&row[1], &row[2], row[3].as_str(), row[4].as_str(), &row[5], &row[6], &row[7]),
            6 | 7 => (&row[1], &row[2], "", "", &row[3], &row[4], &row[5]),
            n => {
                return Err(GaapError::descriptor(
                    line,
                    format!(
                        "expected 6-9 columns, found {n}; perhaps a corpus csv was given instead?"
                    ),
                ))
            }
        };
        if corpus.trim().is_empty() {
            return Err(GaapError::descriptor(line, "no corpus csv"));
        }
        let event_drivers = ModuleEntry::parse_list(drivers, line)?;
        let analysis = ModuleEntry::parse_single(analysis, "analysis method", line)?;
        let analysis = match (event_drivers.is_empty(), analysis) {
            (false, Some(analysis)) => analysis,
            _ => return Err(GaapError::descriptor(line, "missing event driver or analysis method")),
        };
        let embedding = ModuleEntry::parse_single(embedding, "embedding", line)?
            .unwrap_or_else(|| ModuleEntry {
                name: DEFAULT_EMBEDDING.to_string(),
                params: Vec::new(),
            });

        experiments.push(BatchExperiment {
            name: row[0].trim().to_string(),
            line,
            canonicizers: ModuleEntry::parse_list(canon, line)?,
            event_drivers,
            event_culling: ModuleEntry::parse_list(culling, line)?,
            embedding,
            analysis,
            distance: ModuleEntry::parse_single(distance, "distance function", line)?,
            corpus: resolve(base_dir, corpus),
        });
    }
    Ok(experiments)
}

/// Read and parse a descriptor file.
pub fn read_descriptor(path: impl AsRef<Path>) -> Result<Vec<BatchExperiment>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| GaapError::descriptor(0, format!("{}: {e}", path.display())))?;
    parse_descriptor(&text, path.parent().unwrap_or_else(|| Path::new("")))
}

/// Parse corpus text into document sources.
pub fn parse_corpus(text: &str, base_dir: &Path) -> Result<Vec<DocumentSource>> {
    let mut docs = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        if raw.trim().is_empty() {
            continue;
        }
        let row = split_csv(raw.trim_end_matches('\r'));
        if row.len() < 2 || row[1].trim().is_empty() {
            return Err(GaapError::descriptor(
                index + 1,
                "corpus rows need at least author and path",
            ));
        }
        let path = resolve(base_dir, &row[1]).to_string_lossy().into_owned();
        let mut doc = DocumentSource::known(row[0].trim(), path);
        if let Some(title) = row.get(2).map(|t| t.trim()).filter(|t| !t.is_empty()) {
            doc = doc.with_title(title);
        }
        docs.push(doc);
    }
    Ok(docs)
}

pub fn read_corpus(path: impl AsRef<Path>) -> Result<Vec<DocumentSource>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| GaapError::descriptor(0, format!("corpus {}: {e}", path.display())))?;
    parse_corpus(&text, path.parent().unwrap_or_else(|| Path::new("")))
}

// ─── Request building ───────────────────────────────────────────────────────

fn add_entry(wb: &mut Workbench<'_>, kind: ModuleKind, entry: &ModuleEntry) -> Result<usize> {
    let index = wb.add_module(kind, &entry.name)?;
    apply_params(wb, kind, index, entry)?;
    Ok(index)
}

fn apply_params(
    wb: &mut Workbench<'_>,
    kind: ModuleKind,
    index: usize,
    entry: &ModuleEntry,
) -> Result<()> {
    for (key, value) in &entry.params {
        wb.set_param(kind, index, key, ParamValue::Text(value.clone()))?;
    }
    Ok(())
}

impl BatchExperiment {
    /// Build the request for this row. Returns warnings alongside it.
    pub fn to_request(
        &self,
        registry: &ModuleRegistry,
        engine: &EngineConfig,
    ) -> Result<(ExperimentRequest, Vec<String>)> {
        let mut warnings = Vec::new();
        let mut wb = Workbench::new(registry);
        wb.set_engine_config(engine.clone());

        for entry in &self.canonicizers {
            add_entry(&mut wb, ModuleKind::Canonicizer, entry)?;
        }
        for entry in &self.event_drivers {
            add_entry(&mut wb, ModuleKind::EventDriver, entry)?;
        }
        for entry in &self.event_culling {
            add_entry(&mut wb, ModuleKind::EventCulling, entry)?;
        }
        add_entry(&mut wb, ModuleKind::Embedding, &self.embedding)?;

        let needs_distance = registry.needs_distance_function(&self.analysis.name)?;
        let distance_name = self.distance.as_ref().map_or("", |d| d.name.as_str());
        if !needs_distance && self.distance.is_some() {
            let text = format!(
                "{} does not accept a distance function but {distance_name} is specified. It will be ignored.",
                self.analysis.name
            );
            warn!(experiment = %self.name, "{text}");
            warnings.push(text);
        }
        let index = wb.add_analysis(&self.analysis.name, distance_name)?;
        apply_params(&mut wb, ModuleKind::AnalysisMethod, index, &self.analysis)?;
        if let (true, Some(distance)) = (needs_distance, &self.distance) {
            apply_params(&mut wb, ModuleKind::DistanceFunction, index, distance)?;
        }

        let mut request = wb.to_request();
        request.documents = read_corpus(&self.corpus)?;
        Ok((request, warnings))
    }

    /// File stem for this experiment's report.
    fn file_stem(&self) -> String {
        let name: String = self
            .name
            .chars()
            .map(|c| if c.is_alphanumeric() || "-_.".contains(c) { c } else { '_' })
            .collect();
        let name = if name.is_empty() { format!("line{}", self.line) } else { name };
        format!("{name}_{}", chrono::Utc::now().timestamp())
    }
}

// ─── Runner ─────────────────────────────────────────────────────────────────

/// What one batch row produced.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub name: String,
    pub result: ExperimentResult,
    pub warnings: Vec<String>,
    pub report_path: PathBuf,
    pub json_path: Option<PathBuf>,
}

/// Runs descriptor rows in-process and writes their reports.
pub struct BatchRunner<'r> {
    registry: &'r ModuleRegistry,
    engine: EngineConfig,
    write_json: bool,
}

impl<'r> BatchRunner<'r> {
    pub fn new(registry: &'r ModuleRegistry, engine: EngineConfig) -> Self {
        Self {
            registry,
            engine,
            write_json: false,
        }
    }

    /// Builder method: also write each result record as JSON
    pub fn with_json(mut self, enabled: bool) -> Self {
        self.write_json = enabled;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.engine.output_dir
    }

    /// Run one row. Setup errors (unknown module, bad parameter, unreadable
    /// corpus) become a `status=1` result rather than aborting the batch.
    pub fn run_one(&self, experiment: &BatchExperiment) -> Result<BatchOutcome> {
        info!(experiment = %experiment.name, line = experiment.line, "starting batch experiment");
        let (result, warnings) = match experiment.to_request(self.registry, &self.engine) {
            Ok((request, warnings)) => (
                run_request(self.registry, request, &mut NoopObserver),
                warnings,
            ),
            Err(err) => {
                warn!(experiment = %experiment.name, error = %err, "batch experiment setup failed");
                (ExperimentResult::failure(err.to_string()), Vec::new())
            }
        };

        fs::create_dir_all(self.output_dir())?;
        let stem = experiment.file_stem();
        let report_path = self.output_dir().join(format!("{stem}.txt"));
        let mut report = result.results_text.clone();
        if !result.message.is_empty() {
            if !report.is_empty() {
                report.push('\n');
            }
            report.push_str(&result.message);
            report.push('\n');
        }
        fs::write(&report_path, report)?;

        let json_path = if self.write_json {
            let path = self.output_dir().join(format!("{stem}.json"));
            fs::write(&path, serde_json::to_string_pretty(&result)?)?;
            Some(path)
        } else {
            None
        };
        info!(
            experiment = %experiment.name,
            status = u8::from(result.status),
            report = %report_path.display(),
            "batch experiment finished"
        );
        Ok(BatchOutcome {
            name: experiment.name.clone(),
            result,
            warnings,
            report_path,
            json_path,
        })
    }

    pub fn run_all(&self, experiments: &[BatchExperiment]) -> Result<Vec<BatchOutcome>> {
        experiments.iter().map(|e| self.run_one(e)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::artifacts::Status;

    const HEADER: &str = "name,canonicizers,drivers,culling,embedding,analysis,distance,corpus\n";

    #[test]
    fn test_module_entry_params() {
        let entry = ModuleEntry::parse("CharacterNGrams|n:3", 2).unwrap();
        assert_eq!(entry.name, "CharacterNGrams");
        assert_eq!(entry.params, vec![("n".to_string(), "3".to_string())]);
        assert!(ModuleEntry::parse("CharacterNGrams|n3", 2).is_err());

        let list = ModuleEntry::parse_list("UnifyCase&&StripNumbers", 2).unwrap();
        assert_eq!(list.len(), 2);
        assert!(ModuleEntry::parse_list("", 2).unwrap().is_empty());
    }

    #[test]
    fn test_split_csv_quotes() {
        assert_eq!(split_csv(r#"a,"b,c",d"#), vec!["a", "b,c", "d"]);
        assert_eq!(split_csv(r#""say ""hi""",x"#), vec![r#"say "hi""#, "x"]);
        assert_eq!(split_csv("a,b,"), vec!["a", "b", ""]);
    }

    #[test]
    fn test_native_and_legacy_rows() {
        let text = format!(
            "{HEADER}\
             full,UnifyCase,CharacterNGrams|n:3&Words,MostCommonEvents,,CentroidDriver,CosineDistance,corpus.csv,\n\
             \n\
             legacy,,Words,KNearestNeighbors|k:3,ManhattanDistance,/abs/corpus.csv\n"
        );
        let rows = parse_descriptor(&text, Path::new("/data")).unwrap();
        assert_eq!(rows.len(), 2);

        let full = &rows[0];
        assert_eq!(full.line, 2);
        assert_eq!(full.event_drivers.len(), 2);
        assert_eq!(full.event_culling[0].name, "MostCommonEvents");
        assert_eq!(full.embedding.name, "Frequency");
        assert_eq!(full.corpus, PathBuf::from("/data/corpus.csv"));

        let legacy = &rows[1];
        assert_eq!(legacy.line, 4);
        assert!(legacy.canonicizers.is_empty());
        assert!(legacy.event_culling.is_empty());
        assert_eq!(legacy.embedding.name, "Frequency");
        assert_eq!(legacy.analysis.params, vec![("k".into(), "3".into())]);
        assert_eq!(legacy.corpus, PathBuf::from("/abs/corpus.csv"));
    }

    #[test]
    fn test_descriptor_errors_name_line() {
        let err = parse_descriptor(&format!("{HEADER}a,b,c\n"), Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let err =
            parse_descriptor(&format!("{HEADER}x,,,,,,,\n"), Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("no corpus csv"));

        let err = parse_descriptor(
            &format!("{HEADER}x,,Words,,,CentroidDriver&CrossEntropy,,c.csv\n"),
            Path::new("."),
        )
        .unwrap_err();
        assert!(err.to_string().contains("only one analysis method"));
    }

    #[test]
    fn test_corpus_rows() {
        let docs = parse_corpus("Alice,a/one.txt,First\n,unknown.txt,\n\n", Path::new("/c")).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].author, "Alice");
        assert_eq!(docs[0].title, "First");
        assert_eq!(docs[0].filepath, "/c/a/one.txt");
        assert!(docs[1].is_unknown());
        assert_eq!(docs[1].title, "unknown.txt");
        assert!(parse_corpus("Alice\n", Path::new(".")).is_err());
    }

    fn write_corpus(dir: &Path) {
        let texts = [
            ("Alice", "alice1.txt", "the cat sat on the mat with the hat"),
            ("Alice", "alice2.txt", "the cat and the hat sat on the mat"),
            ("Bob", "bob1.txt", "zebras quickly jumped over lazy foxes"),
            ("Bob", "bob2.txt", "quick zebras jump over the lazy fox"),
            ("", "unknown.txt", "the cat sat on the hat"),
        ];
        let mut corpus = String::new();
        for (author, file, text) in texts {
            fs::write(dir.join(file), text).unwrap();
            corpus.push_str(&format!("{author},{file},\n"));
        }
        fs::write(dir.join("corpus.csv"), corpus).unwrap();
    }

    #[test]
    fn test_run_writes_reports() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path());
        let descriptor = dir.path().join("experiments.csv");
        fs::write(
            &descriptor,
            format!(
                "{HEADER}\
                 good,UnifyCase,CharacterNGrams|n:2,,,CentroidDriver,EuclideanDistance,corpus.csv\n\
                 ignored_df,,Words,,,CrossEntropy,CosineDistance,corpus.csv\n\
                 bad,,NoSuchDriver,,,CentroidDriver,EuclideanDistance,corpus.csv\n"
            ),
        )
        .unwrap();

        let registry = ModuleRegistry::with_builtin();
        let engine = EngineConfig::default()
            .with_multiprocessing(false)
            .with_output_dir(dir.path().join("out"));
        let runner = BatchRunner::new(&registry, engine).with_json(true);
        let outcomes = runner.run_all(&read_descriptor(&descriptor).unwrap()).unwrap();
        assert_eq!(outcomes.len(), 3);

        let good = &outcomes[0];
        assert_eq!(good.result.status, Status::Success);
        let report = fs::read_to_string(&good.report_path).unwrap();
        assert!(report.contains("unknown.txt"));
        assert!(good.json_path.as_ref().unwrap().exists());

        let ignored = &outcomes[1];
        assert_eq!(ignored.result.status, Status::Success);
        assert_eq!(ignored.warnings.len(), 1);
        assert!(ignored.warnings[0].contains("CrossEntropy"));

        let bad = &outcomes[2];
        assert_eq!(bad.result.status, Status::Failure);
        assert!(bad.result.message.contains("NoSuchDriver"));
        assert!(fs::read_to_string(&bad.report_path).unwrap().contains("NoSuchDriver"));
    }

    #[test]
    fn test_invalid_param_is_setup_failure() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path());
        let row = ModuleEntry::parse("CharacterNGrams|n:99", 2).unwrap();
        let experiment = BatchExperiment {
            name: "too_long".into(),
            line: 2,
            canonicizers: Vec::new(),
            event_drivers: vec![row],
            event_culling: Vec::new(),
            embedding: ModuleEntry::parse("Frequency", 2).unwrap(),
            analysis: ModuleEntry::parse("CentroidDriver", 2).unwrap(),
            distance: Some(ModuleEntry::parse("EuclideanDistance", 2).unwrap()),
            corpus: dir.path().join("corpus.csv"),
        };
        let registry = ModuleRegistry::with_builtin();
        let err = experiment
            .to_request(&registry, &EngineConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("'n'"));
    }
}
