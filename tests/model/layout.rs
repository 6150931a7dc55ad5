//! Latent layout and build-time validation.

use bayes_oed::Error;
use bayes_oed::experiment::Experiment;
use bayes_oed::model::{Model, ResponseType};
use bayes_oed::schema::{Block, Design};

use crate::{dna_experiment, dna_schema};

#[test]
fn coefficient_sites_match_block_shapes() {
    let schema = dna_schema();
    let blocks = vec![
        Block::new(["p0"]),
        Block::new(["p1", "p2"]),
        Block::new(["p1", "p2", "p3"]),
    ];
    let model = Model::builder(&schema, &dna_experiment(1))
        .feature_blocks(blocks.clone())
        .build()
        .expect("model should build");

    let sample = model.constrain(&model.initial_position());
    let coefs = sample.coefficients();
    assert_eq!(coefs.blocks().len(), blocks.len() + 1);
    assert!(coefs.blocks()[0].block.is_trivial());
    assert_eq!(coefs.blocks()[0].values.len(), 1);

    for block in &blocks {
        let c = coefs.get(block).expect("block present");
        let expected: Vec<usize> = block
            .0
            .iter()
            .map(|name| schema.domain(name).expect("known").len())
            .collect();
        assert_eq!(c.shape(), expected.as_slice());
        assert_eq!(c.values.len(), expected.iter().product::<usize>());
    }
}

#[test]
fn batch_sites_only_with_several_batches() {
    let schema = dna_schema();
    let single = Model::builder(&schema, &dna_experiment(1)).build().unwrap();
    assert!(!single.layout().has_batch_effect());
    assert!(single.layout().site("batch_response").is_none());

    let multi = Model::builder(&schema, &dna_experiment(3)).build().unwrap();
    assert!(multi.layout().has_batch_effect());
    assert_eq!(multi.layout().site("batch_response").unwrap().len, 3);
}

#[test]
fn max_batch_id_sizes_the_batch_plate() {
    let schema = dna_schema();
    let ahead = Model::builder(&schema, &dna_experiment(1))
        .max_batch_id(4)
        .build()
        .unwrap();
    assert!(ahead.layout().has_batch_effect());
    assert_eq!(ahead.layout().site("batch_response").unwrap().len, 5);
    let mut grad = vec![0.0; ahead.dim()];
    assert!(ahead.log_density(&ahead.initial_position(), &mut grad).is_finite());

    assert!(matches!(
        Model::builder(&schema, &dna_experiment(3))
            .max_batch_id(1)
            .build(),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn logits_only_for_unit_interval() {
    let schema = dna_schema();
    let real = Model::builder(&schema, &dna_experiment(1))
        .response_type(ResponseType::Real)
        .build()
        .unwrap();
    assert!(real.layout().site("logits").is_none());

    let unit = Model::builder(&schema, &dna_experiment(1)).build().unwrap();
    assert_eq!(unit.layout().site("logits").unwrap().len, 6);
}

#[test]
fn scale_sites_are_positive() {
    let schema = dna_schema();
    let model = Model::builder(&schema, &dna_experiment(2)).build().unwrap();
    let mut rng = fastrand::Rng::with_seed(5);
    let sim = model.simulate(&mut rng);
    for name in ["coef_scale_scale", "coef_scale_0", "within_batch_scale", "across_batch_scale"] {
        let v = sim.sample.get(name).expect("site present");
        assert!(v.iter().all(|&x| x > 0.0), "{name} = {v:?}");
    }
}

#[test]
fn out_of_range_unit_interval_response_is_rejected() {
    let schema = dna_schema();
    let experiment =
        Experiment::new(vec![Design(vec![0, 0, 0, 0])], vec![0], vec![1.5]).unwrap();
    let err = Model::builder(&schema, &experiment).build().unwrap_err();
    assert!(matches!(err, Error::InvalidResponse { row: 0, .. }));

    // The same value is fine for a real response.
    assert!(
        Model::builder(&schema, &experiment)
            .response_type(ResponseType::Real)
            .build()
            .is_ok()
    );
}

#[test]
fn mismatched_design_is_rejected() {
    let schema = dna_schema();
    let experiment = Experiment::new(vec![Design(vec![0, 0])], vec![0], vec![0.5]).unwrap();
    assert!(matches!(
        Model::builder(&schema, &experiment).build(),
        Err(Error::DesignLength {
            expected: 4,
            got: 2
        })
    ));

    let experiment = Experiment::new(vec![Design(vec![0, 0, 9, 0])], vec![0], vec![0.5]).unwrap();
    assert!(matches!(
        Model::builder(&schema, &experiment).build(),
        Err(Error::CategoryOutOfRange { index: 9, .. })
    ));
}

#[test]
fn bad_blocks_and_features_are_rejected() {
    let schema = dna_schema();
    assert!(matches!(
        Model::builder(&schema, &dna_experiment(1))
            .feature_blocks(vec![Block::new(["p9"])])
            .build(),
        Err(Error::UnknownVariable(_))
    ));
    assert!(matches!(
        Model::builder(&schema, &dna_experiment(1))
            .feature_blocks(vec![Block::new(["p0"]), Block::new(["p0"])])
            .build(),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
        Model::builder(&schema, &dna_experiment(1))
            .extra_features(vec![vec![1.0]; 5])
            .build(),
        Err(Error::LengthMismatch {
            field: "extra_features",
            expected: 6,
            got: 5
        })
    ));
    assert!(matches!(
        Model::builder(&schema, &dna_experiment(1))
            .quantization_bins(0)
            .build(),
        Err(Error::InvalidConfig(_))
    ));
}
