//! Thompson-sampling design search.
//!
//! One round of the search:
//!
//! 1. fit the regression to the experiment with the configured strategy;
//! 2. draw exactly one posterior sample and freeze it as the scoring model;
//! 3. run simulated annealing over the design space, proposing local moves
//!    that resample every variable of one randomly chosen move block;
//! 4. return the `design_size` best distinct feasible designs visited.
//!
//! Scoring against a single frozen draw, rather than the posterior mean,
//! picks designs in proportion to how likely they are to be optimal.
//!
//! # Configuration
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `feature_blocks` | singleton blocks | Regression feature blocks |
//! | `move_blocks` | overlapping triples | Variables resampled together by one move |
//! | `design_size` | 10 | Distinct designs returned per round |
//! | `temperature` | 1.0 | Annealing temperature, `<= 0` is greedy |
//! | `sa_num_steps` | 1000 | Proposals per round |
//! | `inference` | [`Svi`](crate::infer::Svi) | Fitting strategy |
//! | `response_type` | `unit_interval` | Response likelihood |
//! | `max_tries` | 1000 | Rejection attempts for a random feasible seed |
//! | `exclude_observed` | `false` | Never return already observed designs |
//!
//! # Examples
//!
//! ```
//! use bayes_oed::prelude::*;
//!
//! let schema = Schema::new([("a", vec!["0", "1"]), ("b", vec!["0", "1"])]).unwrap();
//! let experiment = Experiment::new(
//!     vec![Design(vec![0, 0]), Design(vec![1, 1])],
//!     vec![0, 0],
//!     vec![0.1, 0.9],
//! )
//! .unwrap();
//!
//! let search = DesignSearch::builder(schema)
//!     .design_size(2)
//!     .sa_num_steps(100)
//!     .inference(Svi::builder().num_steps(50).log_every(0).build())
//!     .build()
//!     .unwrap();
//!
//! let mut rng = fastrand::Rng::with_seed(42);
//! let batch = search.thompson_sample(&experiment, &mut rng).unwrap();
//! assert_eq!(batch.len(), 2);
//! ```

use core::cmp::Ordering;
use core::fmt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::constraints::{Constraint, Constraints};
use crate::error::{Error, Result};
use crate::experiment::Experiment;
use crate::infer::{Inference, InferenceKind};
use crate::model::{Coefficients, DEFAULT_QUANTIZATION_BINS, Model, ResponseType};
use crate::schema::{Block, Design, ResolvedBlock, Schema};

const DEFAULT_DESIGN_SIZE: usize = 10;
const DEFAULT_TEMPERATURE: f64 = 1.0;
const DEFAULT_SA_NUM_STEPS: usize = 1000;
const DEFAULT_MAX_TRIES: usize = 1000;

/// Maps a design to its extra continuous features.
pub type FeatureFn = dyn Fn(&Design) -> Vec<f64> + Send + Sync;

/// Deterministic score of a design under one frozen posterior draw.
#[derive(Clone)]
pub struct ScoreFn {
    coefficients: Coefficients,
    features: Option<Arc<FeatureFn>>,
}

impl ScoreFn {
    /// Scores designs with `coefficients`, computing extra features with
    /// `features`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] unless a feature function is given
    /// exactly when the coefficients carry extra-feature weights.
    pub fn new(coefficients: Coefficients, features: Option<Arc<FeatureFn>>) -> Result<Self> {
        match (coefficients.extra().is_some(), features.is_some()) {
            (true, false) => Err(Error::InvalidConfig(
                "extra-feature coefficients need a feature function".into(),
            )),
            (false, true) => Err(Error::InvalidConfig(
                "feature function given without extra-feature coefficients".into(),
            )),
            _ => Ok(Self {
                coefficients,
                features,
            }),
        }
    }

    /// The frozen coefficients.
    #[must_use]
    pub fn coefficients(&self) -> &Coefficients {
        &self.coefficients
    }

    /// Linear response of `design`. The design must fit the schema the
    /// coefficients were built for.
    #[must_use]
    pub fn score(&self, design: &Design) -> f64 {
        let x = self.features.as_ref().map(|f| f(design));
        self.coefficients.linear_response(design.as_slice(), x.as_deref())
    }
}

impl fmt::Debug for ScoreFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoreFn")
            .field("coefficients", &self.coefficients)
            .field("features", &self.features.is_some())
            .finish()
    }
}

/// Constrained batch design search driven by Thompson sampling.
pub struct DesignSearch {
    schema: Schema,
    constraints: Constraints,
    feature_blocks: Option<Vec<Block>>,
    move_blocks: Vec<ResolvedBlock>,
    design_size: usize,
    temperature: f64,
    sa_num_steps: usize,
    inference: InferenceKind,
    response_type: ResponseType,
    quantization_bins: u32,
    max_tries: usize,
    exclude_observed: bool,
    feature_fn: Option<Arc<FeatureFn>>,
}

impl DesignSearch {
    /// Starts configuring a search over `schema`.
    #[must_use]
    pub fn builder(schema: Schema) -> DesignSearchBuilder {
        DesignSearchBuilder::new(schema)
    }

    /// The schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of designs returned per round.
    #[must_use]
    pub fn design_size(&self) -> usize {
        self.design_size
    }

    /// Annealing temperature.
    #[must_use]
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Builds the regression for `experiment` with this search's feature
    /// blocks, response type and feature function.
    ///
    /// # Errors
    ///
    /// Propagates any precondition error from [`ModelBuilder::build`](crate::model::ModelBuilder::build).
    pub fn model(&self, experiment: &Experiment) -> Result<Model> {
        let mut builder = Model::builder(&self.schema, experiment)
            .response_type(self.response_type)
            .quantization_bins(self.quantization_bins);
        if let Some(blocks) = &self.feature_blocks {
            builder = builder.feature_blocks(blocks.clone());
        }
        if let Some(f) = &self.feature_fn {
            builder =
                builder.extra_features(experiment.sequences().iter().map(f.as_ref()).collect());
        }
        builder.build()
    }

    /// Runs one round: fit, draw one posterior sample, anneal against it.
    ///
    /// # Errors
    ///
    /// Returns any model or fitting error, [`Error::NoFeasibleDesign`] if no
    /// feasible starting design is found, and [`Error::InsufficientDesigns`]
    /// if fewer than `design_size` distinct feasible designs were visited.
    pub fn thompson_sample(
        &self,
        experiment: &Experiment,
        rng: &mut fastrand::Rng,
    ) -> Result<BTreeSet<Design>> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!(
            "thompson_sample",
            rows = experiment.len(),
            design_size = self.design_size,
            temperature = self.temperature
        )
        .entered();

        let model = self.model(experiment)?;
        let sampler = self.inference.fit(&model, rng)?;
        let sample = sampler.sample(rng);
        let score = ScoreFn::new(sample.coefficients(), self.feature_fn.clone())?;
        self.anneal(&score, experiment, rng)
    }

    /// Simulated annealing against a fixed score.
    ///
    /// Starts from the best feasible observed design, or a random feasible
    /// design when none exists, and records every feasible design it
    /// evaluates. Returns the `design_size` highest-scoring distinct ones,
    /// ties broken by design order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoFeasibleDesign`] or [`Error::InsufficientDesigns`].
    pub fn anneal(
        &self,
        score: &ScoreFn,
        experiment: &Experiment,
        rng: &mut fastrand::Rng,
    ) -> Result<BTreeSet<Design>> {
        let mut visited = BTreeMap::new();
        let mut current = self.seed(experiment, rng)?;
        let mut current_score = score.score(&current);
        self.record(&mut visited, experiment, &current, current_score);

        #[cfg_attr(not(feature = "tracing"), allow(unused_variables, unused_assignments))]
        let mut accepted = 0usize;
        for _ in 0..self.sa_num_steps {
            let block = &self.move_blocks[rng.usize(0..self.move_blocks.len())];
            let mut proposal = current.clone();
            for &pos in &block.positions {
                proposal.0[pos] = rng.usize(0..self.schema.domain_size(pos));
            }
            if !self.constraints.is_feasible(&self.schema, &proposal) {
                continue;
            }

            let proposal_score = score.score(&proposal);
            self.record(&mut visited, experiment, &proposal, proposal_score);
            let delta = proposal_score - current_score;
            let accept = delta >= 0.0
                || (self.temperature > 0.0 && rng.f64() < (delta / self.temperature).exp());
            if accept {
                current = proposal;
                current_score = proposal_score;
                accepted += 1;
            }
        }

        let mut ranked: Vec<(Design, f64)> = visited.into_iter().collect();
        ranked.sort_by(|(da, sa), (db, sb)| match sb.total_cmp(sa) {
            Ordering::Equal => da.cmp(db),
            other => other,
        });
        trace_info!(
            visited = ranked.len(),
            accepted,
            best = ranked.first().map_or(f64::NAN, |(_, s)| *s),
            "annealing finished"
        );

        if ranked.len() < self.design_size {
            return Err(Error::InsufficientDesigns {
                requested: self.design_size,
                found: ranked.len(),
            });
        }
        Ok(ranked
            .into_iter()
            .take(self.design_size)
            .map(|(design, _)| design)
            .collect())
    }

    fn record(
        &self,
        visited: &mut BTreeMap<Design, f64>,
        experiment: &Experiment,
        design: &Design,
        score: f64,
    ) {
        if self.exclude_observed && experiment.contains(design) {
            return;
        }
        visited.entry(design.clone()).or_insert(score);
    }

    /// Best feasible observed design, else a random feasible one.
    fn seed(&self, experiment: &Experiment, rng: &mut fastrand::Rng) -> Result<Design> {
        if let Some(responses) = experiment.responses() {
            let best = experiment
                .sequences()
                .iter()
                .zip(responses)
                .filter(|(d, _)| {
                    self.schema.validate_design(d).is_ok()
                        && self.constraints.is_feasible(&self.schema, d)
                })
                .max_by(|(_, a), (_, b)| a.total_cmp(b));
            if let Some((design, _)) = best {
                trace_debug!("seeding from best observed design");
                return Ok(design.clone());
            }
        }
        for _ in 0..self.max_tries {
            let design = self.schema.random_design(rng);
            if self.constraints.is_feasible(&self.schema, &design) {
                return Ok(design);
            }
        }
        Err(Error::NoFeasibleDesign(self.max_tries))
    }
}

impl fmt::Debug for DesignSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DesignSearch")
            .field("schema", &self.schema)
            .field("constraints", &self.constraints)
            .field("feature_blocks", &self.feature_blocks)
            .field("move_blocks", &self.move_blocks)
            .field("design_size", &self.design_size)
            .field("temperature", &self.temperature)
            .field("sa_num_steps", &self.sa_num_steps)
            .field("inference", &self.inference)
            .field("response_type", &self.response_type)
            .field("exclude_observed", &self.exclude_observed)
            .finish_non_exhaustive()
    }
}

/// Builder for [`DesignSearch`].
///
/// Only the schema is required; see the module docs for defaults.
pub struct DesignSearchBuilder {
    schema: Schema,
    constraints: Constraints,
    feature_blocks: Option<Vec<Block>>,
    move_blocks: Option<Vec<Block>>,
    design_size: Option<usize>,
    temperature: Option<f64>,
    sa_num_steps: Option<usize>,
    inference: Option<InferenceKind>,
    response_type: Option<ResponseType>,
    quantization_bins: Option<u32>,
    max_tries: Option<usize>,
    exclude_observed: bool,
    feature_fn: Option<Arc<FeatureFn>>,
}

impl DesignSearchBuilder {
    /// Creates a builder for a search over `schema`.
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            constraints: Constraints::new(),
            feature_blocks: None,
            move_blocks: None,
            design_size: None,
            temperature: None,
            sa_num_steps: None,
            inference: None,
            response_type: None,
            quantization_bins: None,
            max_tries: None,
            exclude_observed: false,
            feature_fn: None,
        }
    }

    /// Replaces the constraint set.
    #[must_use]
    pub fn constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Adds one constraint.
    #[must_use]
    pub fn constraint(mut self, constraint: impl Constraint + 'static) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Sets the regression feature blocks.
    #[must_use]
    pub fn feature_blocks(mut self, blocks: Vec<Block>) -> Self {
        self.feature_blocks = Some(blocks);
        self
    }

    /// Sets the local-move blocks.
    #[must_use]
    pub fn move_blocks(mut self, blocks: Vec<Block>) -> Self {
        self.move_blocks = Some(blocks);
        self
    }

    /// Sets the number of distinct designs returned per round.
    #[must_use]
    pub fn design_size(mut self, n: usize) -> Self {
        self.design_size = Some(n);
        self
    }

    /// Sets the annealing temperature.
    #[must_use]
    pub fn temperature(mut self, t: f64) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Sets the number of annealing proposals.
    #[must_use]
    pub fn sa_num_steps(mut self, n: usize) -> Self {
        self.sa_num_steps = Some(n);
        self
    }

    /// Sets the fitting strategy.
    #[must_use]
    pub fn inference(mut self, inference: impl Into<InferenceKind>) -> Self {
        self.inference = Some(inference.into());
        self
    }

    /// Sets the response likelihood.
    #[must_use]
    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }

    /// Sets the number of quantization bins for `unit_interval` responses.
    #[must_use]
    pub fn quantization_bins(mut self, bins: u32) -> Self {
        self.quantization_bins = Some(bins);
        self
    }

    /// Sets the rejection budget for a random feasible seed.
    #[must_use]
    pub fn max_tries(mut self, n: usize) -> Self {
        self.max_tries = Some(n);
        self
    }

    /// Excludes already observed designs from the returned batch.
    #[must_use]
    pub fn exclude_observed(mut self, exclude: bool) -> Self {
        self.exclude_observed = exclude;
        self
    }

    /// Sets a function computing extra continuous features of a design.
    #[must_use]
    pub fn feature_fn(mut self, f: impl Fn(&Design) -> Vec<f64> + Send + Sync + 'static) -> Self {
        self.feature_fn = Some(Arc::new(f));
        self
    }

    /// Validates the configuration and builds the search.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `design_size` is zero, there are
    /// no move blocks, or a move block is trivial, and
    /// [`Error::UnknownVariable`] if any block names a variable outside the
    /// schema.
    pub fn build(self) -> Result<DesignSearch> {
        let design_size = self.design_size.unwrap_or(DEFAULT_DESIGN_SIZE);
        if design_size == 0 {
            return Err(Error::InvalidConfig("design_size must be at least 1".into()));
        }
        if let Some(blocks) = &self.feature_blocks {
            for block in blocks {
                block.resolve(&self.schema)?;
            }
        }

        let move_blocks = self
            .move_blocks
            .unwrap_or_else(|| self.schema.triple_blocks());
        if move_blocks.is_empty() {
            return Err(Error::InvalidConfig("at least one move block is required".into()));
        }
        let move_blocks = move_blocks
            .iter()
            .map(|block| {
                if block.is_trivial() {
                    Err(Error::InvalidConfig("move blocks must name a variable".into()))
                } else {
                    block.resolve(&self.schema)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(DesignSearch {
            schema: self.schema,
            constraints: self.constraints,
            feature_blocks: self.feature_blocks,
            move_blocks,
            design_size,
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            sa_num_steps: self.sa_num_steps.unwrap_or(DEFAULT_SA_NUM_STEPS),
            inference: self.inference.unwrap_or_default(),
            response_type: self.response_type.unwrap_or_default(),
            quantization_bins: self.quantization_bins.unwrap_or(DEFAULT_QUANTIZATION_BINS),
            max_tries: self.max_tries.unwrap_or(DEFAULT_MAX_TRIES),
            exclude_observed: self.exclude_observed,
            feature_fn: self.feature_fn,
        })
    }
}
