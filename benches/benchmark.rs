//! Benchmarks for gaap_engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gaap_engine::modules::embeddings::Frequency;
use gaap_engine::modules::event_drivers::{CharacterNGrams, Words};
use gaap_engine::pipeline::pool::WorkerPool;
use gaap_engine::pipeline::traits::{Embedding, EventDriver, Module, StageContext};
use gaap_engine::*;

/// Sample text for benchmarking
const SAMPLE_TEXT: &str = r#"
It is a truth universally acknowledged, that a single man in possession of a good
fortune, must be in want of a wife. However little known the feelings or views of
such a man may be on his first entering a neighbourhood, this truth is so well fixed
in the minds of the surrounding families, that he is considered the rightful property
of some one or other of their daughters.

It was the best of times, it was the worst of times, it was the age of wisdom, it was
the age of foolishness, it was the epoch of belief, it was the epoch of incredulity,
it was the season of Light, it was the season of Darkness.
"#;

fn corpus(copies: usize) -> Vec<DocumentSource> {
    let mut docs = Vec::new();
    for i in 0..copies {
        let (author, start) = if i % 2 == 0 { ("Austen", 0) } else { ("Dickens", 300) };
        let text = SAMPLE_TEXT[start..].repeat(1 + i % 3);
        docs.push(DocumentSource::known(author, format!("{author}/{i}.txt")).with_text(text));
    }
    docs.push(DocumentSource::unknown("unknown.txt").with_text(SAMPLE_TEXT));
    docs
}

fn benchmark_event_extraction(c: &mut Criterion) {
    let words = Words::default();
    c.bench_function("extract_words", |b| {
        b.iter(|| words.extract(black_box(SAMPLE_TEXT)))
    });

    let mut group = c.benchmark_group("extract_char_ngrams");
    for n in [2i64, 3, 5] {
        let mut driver = CharacterNGrams::default();
        driver.set_param("n", ParamValue::Int(n)).unwrap();
        group.throughput(Throughput::Bytes(SAMPLE_TEXT.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &driver, |b, driver| {
            b.iter(|| driver.extract(black_box(SAMPLE_TEXT)))
        });
    }
    group.finish();
}

fn benchmark_embedding(c: &mut Criterion) {
    let driver = CharacterNGrams::default();
    let docs: Vec<Document> = corpus(20)
        .iter()
        .map(|source| {
            let mut doc = source.load().unwrap();
            doc.event_set = driver.extract(&doc.text).unwrap();
            doc
        })
        .collect();
    let embedding = Frequency::default();
    let pool = WorkerPool::sequential();
    let globals = GlobalParameters::default();

    c.bench_function("frequency_embedding", |b| {
        b.iter(|| {
            let mut observer = NoopObserver;
            let mut ctx = StageContext {
                pool: &pool,
                progress: &mut observer,
                globals: &globals,
            };
            embedding.embed(black_box(&docs), &mut ctx)
        })
    });
}

fn benchmark_full_experiment(c: &mut Criterion) {
    let registry = ModuleRegistry::with_builtin();
    let mut group = c.benchmark_group("full_experiment");
    group.sample_size(20);
    for (label, multiprocessing) in [("sequential", false), ("parallel", true)] {
        let mut request = ExperimentRequest::new()
            .with_module(ModuleSpec::new(ModuleKind::Canonicizer, "UnifyCase"))
            .with_module(ModuleSpec::new(ModuleKind::EventDriver, "CharacterNGrams"))
            .with_module(ModuleSpec::new(ModuleKind::EventCulling, "MostCommonEvents"))
            .with_module(ModuleSpec::new(ModuleKind::Embedding, "Frequency"))
            .with_analysis(
                ModuleSpec::new(ModuleKind::AnalysisMethod, "CentroidDriver"),
                ModuleSpec::new(ModuleKind::DistanceFunction, "CosineDistance"),
            )
            .with_engine(EngineConfig::default().with_multiprocessing(multiprocessing));
        request.documents = corpus(40);
        group.bench_function(label, |b| {
            b.iter(|| run_request(&registry, black_box(request.clone()), &mut NoopObserver))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_event_extraction,
    benchmark_embedding,
    benchmark_full_experiment,
);
criterion_main!(benches);
