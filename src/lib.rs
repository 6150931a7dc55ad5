#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]

//! Sequential Bayesian optimal experimental design over discrete,
//! combinatorial design spaces. Each round fits a hierarchical regression to
//! the experiment so far, draws one posterior sample, and searches the
//! constrained design space for a batch of distinct designs that score well
//! under that sample.
//!
//! # Getting Started
//!
//! One round on a two-letter alphabet, with the default variational fit:
//!
//! ```
//! use bayes_oed::prelude::*;
//!
//! let schema = Schema::new([("a", vec!["0", "1"]), ("b", vec!["0", "1"])])?;
//! let experiment = Experiment::new(
//!     vec![Design(vec![0, 0]), Design(vec![1, 1])],
//!     vec![0, 0],
//!     vec![0.1, 0.9],
//! )?;
//!
//! let search = DesignSearch::builder(schema.clone())
//!     .design_size(1)
//!     .inference(Svi::builder().num_steps(100).log_every(0).build())
//!     .build()?;
//!
//! let mut rng = fastrand::Rng::with_seed(0);
//! let batch = search.thompson_sample(&experiment, &mut rng)?;
//!
//! // Observe the chosen designs externally, then fold them back in.
//! let observed: Vec<f64> = batch.iter().map(|_| 0.5).collect();
//! let experiment = experiment.append(batch.into_iter().collect(), Some(observed))?;
//! assert_eq!(experiment.num_batches(), 2);
//! # Ok::<(), bayes_oed::Error>(())
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`Schema`](schema::Schema) | Ordered categorical variables and their label domains. |
//! | [`Design`](schema::Design) | One point of the design space: a category index per variable. |
//! | [`Block`](schema::Block) | A group of variables sharing a coefficient tensor or a local move. |
//! | [`Constraints`](constraints::Constraints) | Hard feasibility predicates over designs. |
//! | [`Experiment`](experiment::Experiment) | Accumulated designs, batch ids and responses. |
//! | [`Model`](model::Model) | Hierarchical regression conditioned on an experiment. |
//! | [`Inference`](infer::Inference) | Fits a model and returns a [`Sampler`](sampler::Sampler). |
//! | [`DesignSearch`](search::DesignSearch) | Thompson sampling plus simulated annealing. |
//!
//! # Fitting strategies
//!
//! | Strategy | Sampler | Best for |
//! |----------|---------|----------|
//! | [`Svi`](infer::Svi) | [`VariationalSampler`](sampler::VariationalSampler) | Repeated rounds, speed |
//! | [`Mcmc`](infer::Mcmc) | [`EmpiricalSampler`](sampler::EmpiricalSampler) | Reference runs, accuracy |
//!
//! # Randomness
//!
//! Every stochastic call takes a `&mut fastrand::Rng`. Seeding one generator
//! at the start of a rollout and threading it through makes whole rollouts
//! reproducible.
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `serde` | `Serialize`/`Deserialize` on schemas, designs, experiments and response curves | off |
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) during fitting and search | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

pub mod constraints;
mod error;
pub mod experiment;
pub mod infer;
pub mod model;
mod rng_util;
pub mod sampler;
pub mod schema;
pub mod search;

pub use error::{Error, Result};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use bayes_oed::prelude::*;
/// ```
pub mod prelude {
    pub use crate::constraints::{AllDifferent, Constraint, Constraints, TakesValue, TakesValues};
    pub use crate::error::{Error, Result};
    pub use crate::experiment::{Experiment, ResponseCurve};
    pub use crate::infer::{Inference, InferenceKind, Mcmc, Svi};
    pub use crate::model::{Coefficients, Model, PosteriorSample, ResponseType};
    pub use crate::sampler::{EmpiricalSampler, Sampler, VariationalSampler};
    pub use crate::schema::{Block, Design, Schema};
    pub use crate::search::{DesignSearch, ScoreFn};
}
