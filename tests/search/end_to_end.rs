//! Full rounds: fit, Thompson sample, anneal.

use bayes_oed::experiment::Experiment;
use bayes_oed::infer::Mcmc;
use bayes_oed::schema::{Design, Schema};
use bayes_oed::search::DesignSearch;

use crate::quick_svi;

fn two_by_two() -> (Schema, Experiment) {
    let schema = Schema::new([("a", vec!["0", "1"]), ("b", vec!["0", "1"])]).unwrap();
    let experiment = Experiment::new(
        vec![Design(vec![0, 0]), Design(vec![1, 1])],
        vec![0, 0],
        vec![0.1, 0.9],
    )
    .unwrap();
    (schema, experiment)
}

#[test]
fn one_design_round_is_valid_and_reproducible() {
    let (schema, experiment) = two_by_two();
    let search = DesignSearch::builder(schema.clone())
        .feature_blocks(schema.singleton_blocks())
        .design_size(1)
        .temperature(1.0)
        .build()
        .expect("valid search");

    let first = search
        .thompson_sample(&experiment, &mut fastrand::Rng::with_seed(42))
        .expect("round should succeed");
    assert_eq!(first.len(), 1);
    let design = first.iter().next().unwrap();
    assert!(schema.validate_design(design).is_ok());

    let second = search
        .thompson_sample(&experiment, &mut fastrand::Rng::with_seed(42))
        .expect("round should succeed");
    assert_eq!(first, second);
}

#[test]
fn mcmc_backed_round() {
    let (schema, experiment) = two_by_two();
    let search = DesignSearch::builder(schema)
        .design_size(2)
        .sa_num_steps(50)
        .inference(Mcmc::builder().num_samples(30).warmup_steps(30).build())
        .build()
        .unwrap();
    let batch = search
        .thompson_sample(&experiment, &mut fastrand::Rng::with_seed(1))
        .expect("round should succeed");
    assert_eq!(batch.len(), 2);
}

#[test]
fn rounds_accumulate_into_the_experiment() {
    let schema = Schema::new((0..4).map(|i| (format!("p{i}"), vec!["A", "C", "G", "T"]))).unwrap();
    let truth = |d: &Design| d.0.iter().filter(|&&c| c == 2).count() as f64 / 4.0;

    let mut experiment = Experiment::new(
        vec![Design(vec![0, 1, 3, 0]), Design(vec![1, 1, 1, 1])],
        vec![0, 0],
        vec![0.0, 0.0],
    )
    .unwrap();
    let search = DesignSearch::builder(schema)
        .design_size(3)
        .sa_num_steps(200)
        .inference(quick_svi())
        .build()
        .unwrap();

    let mut rng = fastrand::Rng::with_seed(17);
    for round in 1..=3 {
        let batch: Vec<Design> = search
            .thompson_sample(&experiment, &mut rng)
            .expect("round should succeed")
            .into_iter()
            .collect();
        let responses = batch.iter().map(truth).collect();
        experiment = experiment.append(batch, Some(responses)).unwrap();
        assert_eq!(experiment.len(), 2 + 3 * round);
        assert_eq!(experiment.max_batch_id(), Some(round));
    }
}

#[test]
fn extra_features_flow_through_the_round() {
    let (schema, experiment) = two_by_two();
    let search = DesignSearch::builder(schema)
        .design_size(2)
        .sa_num_steps(50)
        .response_type(bayes_oed::model::ResponseType::Real)
        .feature_fn(|d: &Design| vec![d.0.iter().sum::<usize>() as f64])
        .inference(quick_svi())
        .build()
        .unwrap();
    let model = search.model(&experiment).unwrap();
    assert_eq!(model.layout().site("coef").unwrap().len, 1);
    let batch = search
        .thompson_sample(&experiment, &mut fastrand::Rng::with_seed(5))
        .unwrap();
    assert_eq!(batch.len(), 2);
}

#[test]
fn unobserved_experiment_cannot_be_fitted() {
    let (schema, _) = two_by_two();
    let experiment = Experiment::unobserved(vec![Design(vec![0, 0])], vec![0]).unwrap();
    let search = DesignSearch::builder(schema).design_size(1).build().unwrap();
    assert!(matches!(
        search.thompson_sample(&experiment, &mut fastrand::Rng::with_seed(0)),
        Err(bayes_oed::Error::Responses(_))
    ));
}
