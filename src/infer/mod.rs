//! Posterior fitting strategies.
//!
//! A strategy takes a conditioned [`Model`] and returns a boxed
//! [`Sampler`]. Two are provided:
//!
//! | Strategy | Method | Sampler | Cost |
//! |----------|--------|---------|------|
//! | [`Svi`] | low-rank Gaussian guide, reparameterized ELBO | [`VariationalSampler`](crate::sampler::VariationalSampler) | fast, approximate |
//! | [`Mcmc`] | Hamiltonian Monte Carlo | [`EmpiricalSampler`](crate::sampler::EmpiricalSampler) | slow, asymptotically exact |
//!
//! [`InferenceKind`] wraps either so a search can be configured with a plain
//! value instead of a trait object.

mod mcmc;
mod optim;
mod svi;

pub use mcmc::{ChainStats, Mcmc, McmcBuilder, McmcRun};
pub use svi::{Svi, SviBuilder, SviFit};

use crate::error::Result;
use crate::model::Model;
use crate::sampler::Sampler;

/// Fits a posterior and returns a sampler over it.
pub trait Inference {
    /// Fits `model` using `rng` for every stochastic choice.
    ///
    /// # Errors
    ///
    /// Returns an error if the model has no observed responses, the
    /// configuration is invalid, or fitting fails numerically.
    fn fit(&self, model: &Model, rng: &mut fastrand::Rng) -> Result<Box<dyn Sampler>>;
}

/// A fitting strategy chosen by value.
#[derive(Clone, Debug)]
pub enum InferenceKind {
    /// Stochastic variational inference.
    Svi(Svi),
    /// Hamiltonian Monte Carlo.
    Mcmc(Mcmc),
}

impl Default for InferenceKind {
    fn default() -> Self {
        Self::Svi(Svi::default())
    }
}

impl From<Svi> for InferenceKind {
    fn from(svi: Svi) -> Self {
        Self::Svi(svi)
    }
}

impl From<Mcmc> for InferenceKind {
    fn from(mcmc: Mcmc) -> Self {
        Self::Mcmc(mcmc)
    }
}

impl Inference for InferenceKind {
    fn fit(&self, model: &Model, rng: &mut fastrand::Rng) -> Result<Box<dyn Sampler>> {
        match self {
            Self::Svi(svi) => svi.fit(model, rng),
            Self::Mcmc(mcmc) => mcmc.fit(model, rng),
        }
    }
}
