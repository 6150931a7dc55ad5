//! Both fitting strategies behind the `Inference` trait.

use bayes_oed::Error;
use bayes_oed::experiment::Experiment;
use bayes_oed::infer::{Inference, InferenceKind, Mcmc, Svi};
use bayes_oed::model::{Model, ResponseType};
use bayes_oed::schema::{Design, Schema};

/// Responses that depend only on the first variable.
fn model() -> Model {
    let schema = Schema::new([("a", vec!["lo", "hi"]), ("b", vec!["x", "y", "z"])]).unwrap();
    let mut designs = Vec::new();
    let mut responses = Vec::new();
    for rep in 0..4_u8 {
        for a in 0..2 {
            for b in 0..3 {
                designs.push(Design(vec![a, b]));
                responses.push(2.0 * a as f64 + 0.05 * f64::from(rep));
            }
        }
    }
    let n = designs.len();
    let experiment = Experiment::new(designs, vec![0; n], responses).unwrap();
    Model::builder(&schema, &experiment)
        .response_type(ResponseType::Real)
        .build()
        .unwrap()
}

fn strategies() -> Vec<InferenceKind> {
    vec![
        Svi::builder()
            .lr(0.05)
            .num_steps(1500)
            .log_every(0)
            .build()
            .into(),
        Mcmc::builder().num_samples(300).warmup_steps(300).build().into(),
    ]
}

#[test]
fn posterior_draws_separate_the_levels() {
    let model = model();
    for strategy in strategies() {
        let mut rng = fastrand::Rng::with_seed(10);
        let sampler = strategy.fit(&model, &mut rng).expect("fit should succeed");

        let draws: u32 = 200;
        let mut gap = 0.0;
        for _ in 0..draws {
            let coefs = sampler.sample(&mut rng).coefficients();
            gap += coefs.linear_response(&[1, 0], None) - coefs.linear_response(&[0, 0], None);
        }
        gap /= f64::from(draws);
        assert!((gap - 2.0).abs() < 0.5, "{strategy:?}: mean gap {gap}");
    }
}

#[test]
fn fits_are_reproducible() {
    let model = model();
    for strategy in [
        InferenceKind::from(Svi::builder().num_steps(40).log_every(0).build()),
        InferenceKind::from(Mcmc::builder().num_samples(20).warmup_steps(20).build()),
    ] {
        let draw = |seed| {
            let mut rng = fastrand::Rng::with_seed(seed);
            let sampler = strategy.fit(&model, &mut rng).unwrap();
            sampler.sample(&mut rng).values().to_vec()
        };
        assert_eq!(draw(3), draw(3));
    }
}

#[test]
fn default_strategy_is_variational() {
    assert!(matches!(InferenceKind::default(), InferenceKind::Svi(_)));
}

#[test]
fn empty_chain_is_fatal() {
    let model = model();
    let mcmc = InferenceKind::from(Mcmc::builder().num_samples(0).warmup_steps(10).build());
    assert!(matches!(
        mcmc.fit(&model, &mut fastrand::Rng::with_seed(0)),
        Err(Error::EmptyPosterior)
    ));
}

#[test]
fn svi_loss_history_is_exposed() {
    let model = model();
    let fit = Svi::builder()
        .num_steps(25)
        .log_every(0)
        .build()
        .fit_guide(&model, &mut fastrand::Rng::with_seed(1))
        .unwrap();
    assert_eq!(fit.losses.len(), 25);
    assert!(fit.losses.iter().all(|l| l.is_finite()));
    let expected_rank = (model.dim() as f64).sqrt().ceil() as usize;
    assert_eq!(fit.sampler.rank(), expected_rank);
}
