use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use bayes_oed::constraints::AllDifferent;
use bayes_oed::experiment::Experiment;
use bayes_oed::model::Coefficients;
use bayes_oed::schema::{Block, Schema};
use bayes_oed::search::{DesignSearch, ScoreFn};

fn dna(len: usize) -> Schema {
    Schema::new((0..len).map(|i| (format!("p{i}"), vec!["A", "C", "G", "T"])))
        .expect("valid schema")
}

/// Random pairwise coefficients standing in for a posterior draw.
fn random_score(schema: &Schema) -> ScoreFn {
    let mut rng = fastrand::Rng::with_seed(7);
    let blocks: Vec<(Block, Vec<f64>)> = schema
        .pairwise_blocks()
        .into_iter()
        .map(|b| {
            let n = b.resolve(schema).expect("known block").numel();
            (b, (0..n).map(|_| rng.f64() - 0.5).collect())
        })
        .collect();
    ScoreFn::new(Coefficients::new(schema, blocks, None).expect("shapes match"), None)
        .expect("no extra features")
}

fn bench_anneal(c: &mut Criterion) {
    let mut group = c.benchmark_group("anneal");
    let empty = Experiment::new(Vec::new(), Vec::new(), Vec::new()).expect("empty experiment");
    for len in [8, 32, 128] {
        let schema = dna(len);
        let score = random_score(&schema);
        let search = DesignSearch::builder(schema)
            .design_size(10)
            .sa_num_steps(1000)
            .build()
            .expect("valid search");
        group.bench_with_input(BenchmarkId::new("positions", len), &search, |b, search| {
            b.iter(|| {
                let mut rng = fastrand::Rng::with_seed(0);
                search.anneal(&score, &empty, &mut rng).expect("anneal")
            });
        });
    }
    group.finish();
}

fn bench_constrained_anneal(c: &mut Criterion) {
    let schema = dna(12);
    let score = random_score(&schema);
    let empty = Experiment::new(Vec::new(), Vec::new(), Vec::new()).expect("empty experiment");
    let search = DesignSearch::builder(schema.clone())
        .constraint(AllDifferent::new(&schema, ["p0", "p1", "p2", "p3"]).expect("known names"))
        .design_size(10)
        .sa_num_steps(1000)
        .build()
        .expect("valid search");
    c.bench_function("anneal_all_different", |b| {
        b.iter(|| {
            let mut rng = fastrand::Rng::with_seed(0);
            search.anneal(&score, &empty, &mut rng).expect("anneal")
        });
    });
}

criterion_group!(benches, bench_anneal, bench_constrained_anneal);
criterion_main!(benches);
