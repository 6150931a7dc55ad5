//! Posterior samplers.
//!
//! A sampler is what a fitting strategy hands back: every call to
//! [`Sampler::sample`] returns one complete draw of the latent sites as a
//! [`PosteriorSample`]. The design search depends only on this trait, so the
//! fast variational approximation and the exact Markov-chain sampler are
//! interchangeable.
//!
//! | Sampler | Produced by | One call |
//! |---------|-------------|----------|
//! | [`EmpiricalSampler`] | [`Mcmc`](crate::infer::Mcmc) | a stored draw chosen uniformly at random |
//! | [`VariationalSampler`] | [`Svi`](crate::infer::Svi) | a fresh reparameterized draw from the guide |
//!
//! # Implementing a custom sampler
//!
//! ```rust
//! use bayes_oed::model::{Model, PosteriorSample};
//! use bayes_oed::sampler::Sampler;
//!
//! /// Always returns the prior median.
//! struct MedianSampler(Model);
//!
//! impl Sampler for MedianSampler {
//!     fn sample(&self, _rng: &mut fastrand::Rng) -> PosteriorSample {
//!         self.0.constrain(&self.0.initial_position())
//!     }
//! }
//! ```

pub mod empirical;
pub mod variational;

pub use empirical::EmpiricalSampler;
pub use variational::VariationalSampler;

use crate::model::PosteriorSample;

/// Trait for drawing posterior samples.
///
/// The random stream is passed in explicitly so that a whole multi-round
/// rollout advances one generator in a fixed order. The trait requires
/// `Send + Sync` so fitted samplers can be shared across threads.
pub trait Sampler: Send + Sync {
    /// Draws one full assignment of every latent site.
    fn sample(&self, rng: &mut fastrand::Rng) -> PosteriorSample;
}
