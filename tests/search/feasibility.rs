//! Returned batches are feasible and duplicate-free.

use bayes_oed::Error;
use bayes_oed::constraints::{AllDifferent, Constraints, IfThen, Not, TakesValue};
use bayes_oed::experiment::Experiment;
use bayes_oed::model::Coefficients;
use bayes_oed::schema::{Block, Design, Schema};
use bayes_oed::search::{DesignSearch, ScoreFn};

use crate::quick_svi;

fn dna(n: usize) -> Schema {
    Schema::new((0..n).map(|i| (format!("p{i}"), vec!["A", "C", "G", "T"]))).unwrap()
}

fn constraints(schema: &Schema) -> Constraints {
    Constraints::new()
        .with(AllDifferent::new(schema, ["p0", "p1", "p2"]).unwrap())
        .with(IfThen(
            Box::new(TakesValue::new(schema, "p3", "A").unwrap()),
            Box::new(Not(Box::new(TakesValue::new(schema, "p4", "A").unwrap()))),
        ))
}

#[test]
fn thompson_batches_respect_constraints() {
    let schema = dna(5);
    let experiment = Experiment::new(
        vec![Design(vec![0, 1, 2, 3, 0]), Design(vec![3, 2, 1, 0, 1])],
        vec![0, 0],
        vec![0.3, 0.6],
    )
    .unwrap();
    let check = constraints(&schema);
    let search = DesignSearch::builder(schema.clone())
        .constraints(constraints(&schema))
        .feature_blocks(schema.pairwise_blocks())
        .design_size(8)
        .sa_num_steps(400)
        .inference(quick_svi())
        .build()
        .unwrap();

    for seed in 0..5 {
        let batch = search
            .thompson_sample(&experiment, &mut fastrand::Rng::with_seed(seed))
            .expect("round should succeed");
        assert_eq!(batch.len(), 8);
        for design in &batch {
            assert!(check.is_feasible(&schema, design), "{design:?}");
        }
    }
}

#[test]
fn whole_space_can_be_requested() {
    let schema = Schema::new([("a", vec!["0", "1"]), ("b", vec!["0", "1", "2"])]).unwrap();
    let score = ScoreFn::new(
        Coefficients::new(&schema, vec![(Block::new(["a", "b"]), vec![0.0; 6])], None).unwrap(),
        None,
    )
    .unwrap();
    let search = DesignSearch::builder(schema.clone())
        .design_size(6)
        .sa_num_steps(500)
        .build()
        .unwrap();
    let empty = Experiment::new(Vec::new(), Vec::new(), Vec::new()).unwrap();
    let batch = search
        .anneal(&score, &empty, &mut fastrand::Rng::with_seed(2))
        .unwrap();
    assert_eq!(batch.len(), schema.num_designs());
}

#[test]
fn moves_that_cannot_reach_enough_designs_fail() {
    let schema = dna(3);
    let blocks = schema
        .singleton_blocks()
        .into_iter()
        .map(|b| (b, vec![0.0; 4]))
        .collect();
    let score = ScoreFn::new(Coefficients::new(&schema, blocks, None).unwrap(), None).unwrap();
    // Only p0 ever moves: four reachable designs.
    let search = DesignSearch::builder(schema)
        .move_blocks(vec![Block::new(["p0"])])
        .design_size(5)
        .sa_num_steps(300)
        .build()
        .unwrap();
    let empty = Experiment::new(Vec::new(), Vec::new(), Vec::new()).unwrap();
    assert!(matches!(
        search.anneal(&score, &empty, &mut fastrand::Rng::with_seed(4)),
        Err(Error::InsufficientDesigns {
            requested: 5,
            found: 4
        })
    ));
}
