use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pagesift::vector::search::{MaxSimScorer, RetrievalConfig, RetrievalEngine};
use pagesift::vector::{EmbeddingIndex, MultiVector, PageMetadata};

const DIMENSION: usize = 128;

fn random_multi_vector(rng: &mut StdRng, vectors: usize) -> MultiVector {
    let data = (0..vectors * DIMENSION)
        .map(|_| rng.random_range(-1.0f32..1.0))
        .collect();
    MultiVector::new(data, DIMENSION).unwrap()
}

fn random_index(rng: &mut StdRng, pages: usize, vectors_per_page: usize) -> EmbeddingIndex {
    let embeddings = (0..pages)
        .map(|_| random_multi_vector(rng, vectors_per_page))
        .collect();
    let metadata = (1..=pages as u32)
        .map(|n| PageMetadata::new("bench.pdf", n))
        .collect();
    EmbeddingIndex::new(DIMENSION, embeddings, metadata).unwrap()
}

fn bench_maxsim(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let query = random_multi_vector(&mut rng, 20);
    let mut group = c.benchmark_group("maxsim");

    for vectors_per_page in [64, 256, 1024] {
        let page = random_multi_vector(&mut rng, vectors_per_page);
        let mut scorer = MaxSimScorer::new();
        group.bench_with_input(
            BenchmarkId::from_parameter(vectors_per_page),
            &page,
            |b, page| b.iter(|| scorer.score(black_box(&query), black_box(page))),
        );
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(11);
    let index = random_index(&mut rng, 1000, 128);
    let query = random_multi_vector(&mut rng, 20);
    let mut group = c.benchmark_group("search");
    group.sample_size(20);

    let sequential = RetrievalEngine::new(RetrievalConfig {
        parallel_threshold: usize::MAX,
        ..Default::default()
    })
    .unwrap();
    let parallel = RetrievalEngine::default();

    group.bench_function("sequential_top5", |b| {
        b.iter(|| sequential.search(black_box(&index), black_box(&query), 5).unwrap())
    });
    group.bench_function("parallel_top5", |b| {
        b.iter(|| parallel.search(black_box(&index), black_box(&query), 5).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_maxsim, bench_search);
criterion_main!(benches);
