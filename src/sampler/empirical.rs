//! Empirical sampler over stored Markov-chain draws.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::{LatentLayout, PosteriorSample};
use crate::sampler::Sampler;

/// Samples uniformly from a fixed set of stored draws.
///
/// # Examples
///
/// ```
/// use bayes_oed::experiment::Experiment;
/// use bayes_oed::model::Model;
/// use bayes_oed::sampler::{EmpiricalSampler, Sampler};
/// use bayes_oed::schema::{Design, Schema};
///
/// let schema = Schema::new([("a", vec!["0", "1"])]).unwrap();
/// let experiment = Experiment::new(vec![Design(vec![1])], vec![0], vec![0.5]).unwrap();
/// let model = Model::builder(&schema, &experiment).build().unwrap();
///
/// let draws = vec![model.initial_position(); 3];
/// let sampler = EmpiricalSampler::new(&model, draws).unwrap();
/// assert_eq!(sampler.num_samples(), 3);
///
/// let mut rng = fastrand::Rng::with_seed(0);
/// let sample = sampler.sample(&mut rng);
/// assert!(sample.get("coef_0").is_some());
/// ```
#[derive(Clone, Debug)]
pub struct EmpiricalSampler {
    samples: Vec<PosteriorSample>,
}

impl EmpiricalSampler {
    /// Creates a sampler from unconstrained draws of `model`'s latent vector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyPosterior`] if `draws` is empty and
    /// [`Error::LengthMismatch`] if a draw has the wrong dimension.
    pub fn new(model: &crate::model::Model, draws: Vec<Vec<f64>>) -> Result<Self> {
        Self::from_layout(model.shared_layout(), draws)
    }

    pub(crate) fn from_layout(layout: Arc<LatentLayout>, draws: Vec<Vec<f64>>) -> Result<Self> {
        if draws.is_empty() {
            return Err(Error::EmptyPosterior);
        }
        let samples = draws
            .into_iter()
            .map(|z| {
                if z.len() == layout.dim() {
                    Ok(PosteriorSample::from_unconstrained(Arc::clone(&layout), &z))
                } else {
                    Err(Error::LengthMismatch {
                        field: "posterior draw",
                        expected: layout.dim(),
                        got: z.len(),
                    })
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { samples })
    }

    /// Number of stored draws.
    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// All stored draws in collection order.
    #[must_use]
    pub fn samples(&self) -> &[PosteriorSample] {
        &self.samples
    }
}

impl Sampler for EmpiricalSampler {
    fn sample(&self, rng: &mut fastrand::Rng) -> PosteriorSample {
        self.samples[rng.usize(0..self.samples.len())].clone()
    }
}
