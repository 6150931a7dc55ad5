//! Prior predictive simulation and batch handling.

use bayes_oed::experiment::Experiment;
use bayes_oed::model::{Model, ResponseType};
use bayes_oed::schema::Design;

use crate::{dna_experiment, dna_schema};

#[test]
fn unit_interval_simulations_stay_in_range() {
    let schema = dna_schema();
    let designs: Vec<Design> = (0..20).map(|i| Design(vec![i % 4, (i / 4) % 4, 0, 1])).collect();
    let experiment = Experiment::unobserved(designs, vec![0; 20]).unwrap();
    let model = Model::builder(&schema, &experiment)
        .feature_blocks(schema.pairwise_blocks())
        .build()
        .unwrap();

    let mut rng = fastrand::Rng::with_seed(8);
    for _ in 0..50 {
        let sim = model.simulate(&mut rng);
        assert_eq!(sim.responses.len(), 20);
        for r in sim.responses {
            assert!((0.0..=1.0).contains(&r), "response {r}");
            // Quantized to the default 100 bins.
            assert!(((r * 100.0).round() - r * 100.0).abs() < 1e-9);
        }
    }
}

#[test]
fn real_simulations_are_unbounded() {
    let schema = dna_schema();
    let experiment =
        Experiment::unobserved(vec![Design(vec![0, 0, 0, 0]); 50], vec![0; 50]).unwrap();
    let model = Model::builder(&schema, &experiment)
        .response_type(ResponseType::Real)
        .build()
        .unwrap();
    let mut rng = fastrand::Rng::with_seed(2);
    let outside = (0..20)
        .flat_map(|_| model.simulate(&mut rng).responses)
        .filter(|r| !(0.0..=1.0).contains(r))
        .count();
    assert!(outside > 0);
}

#[test]
fn single_batch_prediction_is_the_linear_response() {
    let schema = dna_schema();
    let experiment = dna_experiment(1);
    let model = Model::builder(&schema, &experiment).build().unwrap();
    assert!(!model.layout().has_batch_effect());

    let mut rng = fastrand::Rng::with_seed(4);
    let sample = model.simulate(&mut rng).sample;
    let coefs = sample.coefficients();
    let predicted = model.predict(&sample);
    for (design, p) in experiment.sequences().iter().zip(predicted) {
        assert!((coefs.linear_response(design.as_slice(), None) - p).abs() < 1e-12);
    }
}

#[test]
fn several_batches_shift_predictions() {
    let schema = dna_schema();
    let experiment = dna_experiment(2);
    let model = Model::builder(&schema, &experiment).build().unwrap();

    let mut rng = fastrand::Rng::with_seed(4);
    let sample = model.simulate(&mut rng).sample;
    let shifts = sample.get("batch_response").unwrap().to_vec();
    let coefs = sample.coefficients();
    let predicted = model.predict(&sample);
    for ((design, &batch), p) in experiment
        .sequences()
        .iter()
        .zip(experiment.batch_ids())
        .zip(predicted)
    {
        let expected = coefs.linear_response(design.as_slice(), None) + shifts[batch];
        assert!((expected - p).abs() < 1e-12);
    }
}

#[test]
fn same_seed_same_simulation() {
    let schema = dna_schema();
    let model = Model::builder(&schema, &dna_experiment(2)).build().unwrap();
    let a = model.simulate(&mut fastrand::Rng::with_seed(99));
    let b = model.simulate(&mut fastrand::Rng::with_seed(99));
    assert_eq!(a.responses, b.responses);
    assert_eq!(a.sample.values(), b.sample.values());
}
