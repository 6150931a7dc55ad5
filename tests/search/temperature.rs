//! Lower temperatures return better batches on average.

use bayes_oed::experiment::Experiment;
use bayes_oed::model::Coefficients;
use bayes_oed::schema::{Block, Schema};
use bayes_oed::search::{DesignSearch, ScoreFn};

fn frozen_score(schema: &Schema) -> ScoreFn {
    let mut rng = fastrand::Rng::with_seed(1234);
    let blocks: Vec<(Block, Vec<f64>)> = schema
        .pairwise_blocks()
        .into_iter()
        .map(|b| {
            let n = b.resolve(schema).unwrap().numel();
            (b, (0..n).map(|_| rng.f64() - 0.5).collect())
        })
        .collect();
    ScoreFn::new(Coefficients::new(schema, blocks, None).unwrap(), None).unwrap()
}

fn mean_batch_score(schema: &Schema, score: &ScoreFn, temperature: f64) -> f64 {
    let search = DesignSearch::builder(schema.clone())
        .design_size(5)
        .temperature(temperature)
        .sa_num_steps(200)
        .build()
        .unwrap();
    let empty = Experiment::new(Vec::new(), Vec::new(), Vec::new()).unwrap();
    let runs = 30;
    let total: f64 = (0..runs)
        .map(|seed| {
            let batch = search
                .anneal(score, &empty, &mut fastrand::Rng::with_seed(seed))
                .unwrap();
            batch.iter().map(|d| score.score(d)).sum::<f64>() / batch.len() as f64
        })
        .sum();
    total / runs as f64
}

#[test]
fn cooling_does_not_hurt_the_batch() {
    let schema = Schema::new((0..6).map(|i| (format!("p{i}"), vec!["A", "C", "G", "T"]))).unwrap();
    let score = frozen_score(&schema);

    let greedy = mean_batch_score(&schema, &score, 0.0);
    let cool = mean_batch_score(&schema, &score, 0.05);
    let hot = mean_batch_score(&schema, &score, 100.0);
    assert!(greedy >= hot, "greedy {greedy} < hot {hot}");
    assert!(cool >= hot, "cool {cool} < hot {hot}");
}
