//! Linear response structure of a fixed coefficient draw.

use bayes_oed::Error;
use bayes_oed::model::{Coefficients, Model};
use bayes_oed::schema::{Block, Design};

use crate::{dna_experiment, dna_schema};

fn drawn_coefficients() -> (Model, Coefficients) {
    let schema = dna_schema();
    let model = Model::builder(&schema, &dna_experiment(1))
        .feature_blocks(schema.pairwise_blocks())
        .build()
        .expect("model should build");
    let mut rng = fastrand::Rng::with_seed(21);
    let coefs = model.simulate(&mut rng).sample.coefficients();
    (model, coefs)
}

#[test]
fn response_is_sum_of_block_lookups() {
    let (_, coefs) = drawn_coefficients();
    let design = [1, 3, 0, 2];
    let expected: f64 = coefs.blocks().iter().map(|b| b.lookup(&design)).sum();
    assert!((coefs.linear_response(&design, None) - expected).abs() < 1e-12);
}

#[test]
fn changing_one_variable_touches_only_its_blocks() {
    let (model, coefs) = drawn_coefficients();
    let schema = model.schema();
    let before = [0, 1, 2, 3];
    let mut after = before;
    after[2] = 0;

    let delta = coefs.linear_response(&after, None) - coefs.linear_response(&before, None);
    let position = schema.index_of("p2").unwrap();
    let touched: f64 = coefs
        .blocks()
        .iter()
        .filter(|b| b.resolved.contains(position))
        .map(|b| b.lookup(&after) - b.lookup(&before))
        .sum();
    assert!((delta - touched).abs() < 1e-12);

    for b in coefs.blocks().iter().filter(|b| !b.resolved.contains(position)) {
        assert_eq!(b.lookup(&after), b.lookup(&before));
    }
}

#[test]
fn hand_built_coefficients() {
    let schema = bayes_oed::schema::Schema::new([("a", vec!["x", "y"]), ("b", vec!["x", "y", "z"])])
        .unwrap();
    let coefs = Coefficients::new(
        &schema,
        vec![
            (Block::trivial(), vec![0.5]),
            (Block::new(["a"]), vec![0.0, 1.0]),
            (Block::new(["a", "b"]), vec![0.0, 0.1, 0.2, 1.0, 1.1, 1.2]),
        ],
        Some(vec![2.0, -1.0]),
    )
    .unwrap();

    // trivial + a[y] + ab[y, z] + extra
    let value = coefs
        .try_linear_response(&schema, &Design(vec![1, 2]), Some(&[1.0, 1.0][..]))
        .unwrap();
    assert!((value - (0.5 + 1.0 + 1.2 + 1.0)).abs() < 1e-12);

    assert!(matches!(
        coefs.try_linear_response(&schema, &Design(vec![1, 2]), None),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
        coefs.try_linear_response(&schema, &Design(vec![2, 0]), Some(&[1.0, 1.0][..])),
        Err(Error::CategoryOutOfRange { .. })
    ));
    assert!(matches!(
        Coefficients::new(&schema, vec![(Block::new(["a", "b"]), vec![0.0; 5])], None),
        Err(Error::LengthMismatch { expected: 6, got: 5, .. })
    ));
}
