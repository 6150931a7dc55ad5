//! Stochastic variational inference with a low-rank Gaussian guide.
//!
//! The guide is a multivariate normal over the model's unconstrained latent
//! vector with covariance `W Wᵀ + diag(D²)`, where `W` has `rank` columns.
//! Each step draws one reparameterized sample, evaluates the model's log
//! density and gradient there, and adds the analytic entropy of the guide.
//! Entropy gradients use the Woodbury identity, so a step costs
//! `O(dim · rank²)` plus one density evaluation.
//!
//! # Configuration
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `lr` | 0.01 | Initial learning rate |
//! | `num_steps` | 201 | Optimizer steps; the rate decays to `lr * 0.1` by the last |
//! | `rank` | `ceil(sqrt(dim))` | Columns of the covariance factor |
//! | `init_scale` | 0.1 | Initial marginal standard deviation of the guide |
//! | `log_every` | 100 | Loss logging cadence in steps, 0 disables |
//!
//! # Examples
//!
//! ```
//! use bayes_oed::infer::Svi;
//!
//! let svi = Svi::builder().lr(0.02).num_steps(500).log_every(0).build();
//! assert_eq!(svi.num_steps(), 500);
//! ```

use nalgebra::{DMatrix, DVector};

use crate::error::{Error, Result};
use crate::infer::Inference;
use crate::infer::optim::ClippedAdam;
use crate::model::Model;
use crate::rng_util::standard_normal;
use crate::sampler::{Sampler, VariationalSampler};

/// Default initial learning rate.
const DEFAULT_LR: f64 = 0.01;
/// Default number of optimizer steps.
const DEFAULT_NUM_STEPS: usize = 201;
/// Default initial guide scale.
const DEFAULT_INIT_SCALE: f64 = 0.1;
/// Default logging cadence.
const DEFAULT_LOG_EVERY: usize = 100;

/// `0.5 * (1 + ln(2π))`, the per-dimension entropy constant of a normal.
const HALF_ONE_PLUS_LN_TAU: f64 = 1.418_938_533_204_672_7;

/// Variational fitting strategy.
#[derive(Clone, Debug)]
pub struct Svi {
    lr: f64,
    num_steps: usize,
    rank: Option<usize>,
    init_scale: f64,
    log_every: usize,
}

impl Svi {
    /// Creates an SVI strategy with default settings.
    #[must_use]
    pub fn new() -> Self {
        SviBuilder::new().build()
    }

    /// Creates a builder for configuring [`Svi`].
    #[must_use]
    pub fn builder() -> SviBuilder {
        SviBuilder::new()
    }

    /// Number of optimizer steps.
    #[must_use]
    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    /// Fits the guide and returns it with the per-step loss history.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Responses`] if the model has no observed responses,
    /// [`Error::InvalidConfig`] for a non-positive learning rate or scale,
    /// [`Error::NonFiniteLoss`] if the loss diverges, and
    /// [`Error::CholeskyFailed`] if the guide covariance degenerates.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::many_single_char_names
    )]
    pub fn fit_guide(&self, model: &Model, rng: &mut fastrand::Rng) -> Result<SviFit> {
        if !model.is_observed() {
            return Err(Error::Responses("required for fitting"));
        }
        if !(self.lr > 0.0 && self.init_scale > 0.0) {
            return Err(Error::InvalidConfig(
                "svi lr and init_scale must be positive".into(),
            ));
        }

        let d = model.dim();
        let r = self
            .rank
            .unwrap_or_else(|| (d as f64).sqrt().ceil() as usize)
            .clamp(1, d.max(1));

        // Flat parameter vector: [loc | W (column-major, d x r) | log D].
        let w_off = d;
        let rho_off = d + d * r;
        let mut params = vec![0.0; d * (r + 2)];
        params[..d].copy_from_slice(&model.initial_position());
        let w_std = self.init_scale * (0.5 / r as f64).sqrt();
        for w in &mut params[w_off..rho_off] {
            *w = w_std * standard_normal(rng);
        }
        params[rho_off..].fill((self.init_scale * 0.5f64.sqrt()).ln());

        let lrd = 0.1f64.powf(1.0 / self.num_steps.max(1) as f64);
        let mut optim = ClippedAdam::new(params.len(), self.lr, lrd);
        let mut grad = vec![0.0; params.len()];
        let mut model_grad = vec![0.0; d];
        let mut losses = Vec::with_capacity(self.num_steps);

        for step in 0..self.num_steps {
            let loc = DVector::from_column_slice(&params[..d]);
            let w = DMatrix::from_column_slice(d, r, &params[w_off..rho_off]);
            let diag = DVector::from_iterator(d, params[rho_off..].iter().copied().map(f64::exp));

            let eps_low = DVector::from_fn(r, |_, _| standard_normal(rng));
            let eps_diag = DVector::from_fn(d, |_, _| standard_normal(rng));
            let z = &loc + &w * &eps_low + diag.component_mul(&eps_diag);

            let log_p = model.log_density(z.as_slice(), &mut model_grad);
            let g = DVector::from_column_slice(&model_grad);

            // Σ = W Wᵀ + D², M = I + Wᵀ D⁻² W, Σ⁻¹ W = D⁻² W M⁻¹.
            let inv_d2 = diag.map(|s| 1.0 / (s * s));
            let a = DMatrix::from_fn(d, r, |i, j| w[(i, j)] * inv_d2[i]);
            let m = DMatrix::identity(r, r) + w.transpose() * &a;
            let chol = nalgebra::linalg::Cholesky::new(m).ok_or(Error::CholeskyFailed)?;
            let log_det_m = 2.0 * chol.l().diagonal().iter().copied().map(f64::ln).sum::<f64>();
            let sigma_inv_w = chol.solve(&a.transpose()).transpose();

            let entropy = params[rho_off..].iter().sum::<f64>()
                + 0.5 * log_det_m
                + d as f64 * HALF_ONE_PLUS_LN_TAU;
            let loss = -(log_p + entropy);
            if !loss.is_finite() {
                return Err(Error::NonFiniteLoss { step });
            }
            losses.push(loss);
            if self.log_every > 0 && step % self.log_every == 0 {
                trace_info!(step, loss, lr = optim.lr(), "svi step");
            }

            // Loss gradients (negated ELBO gradients).
            for (dst, src) in grad[..d].iter_mut().zip(g.iter()) {
                *dst = -src;
            }
            let grad_w = &g * eps_low.transpose() + &sigma_inv_w;
            for (dst, src) in grad[w_off..rho_off].iter_mut().zip(grad_w.iter()) {
                *dst = -src;
            }
            for (i, dst) in grad[rho_off..].iter_mut().enumerate() {
                let quad = sigma_inv_w.row(i).dot(&w.row(i));
                *dst = -(g[i] * eps_diag[i] * diag[i] + 1.0 - quad);
            }

            optim.step(&mut params, &grad);
        }

        let loc = DVector::from_column_slice(&params[..d]);
        let w = DMatrix::from_column_slice(d, r, &params[w_off..rho_off]);
        let diag = DVector::from_iterator(d, params[rho_off..].iter().copied().map(f64::exp));
        Ok(SviFit {
            sampler: VariationalSampler::new(model.shared_layout(), loc, w, diag),
            losses,
        })
    }
}

impl Default for Svi {
    fn default() -> Self {
        Self::new()
    }
}

impl Inference for Svi {
    fn fit(&self, model: &Model, rng: &mut fastrand::Rng) -> Result<Box<dyn Sampler>> {
        Ok(Box::new(self.fit_guide(model, rng)?.sampler))
    }
}

/// Result of [`Svi::fit_guide`].
#[derive(Clone, Debug)]
pub struct SviFit {
    /// The fitted guide.
    pub sampler: VariationalSampler,
    /// Negative ELBO estimate at every step.
    pub losses: Vec<f64>,
}

/// Builder for [`Svi`].
///
/// All options have sensible defaults:
/// - `lr`: 0.01
/// - `num_steps`: 201
/// - `rank`: `ceil(sqrt(dim))`
/// - `init_scale`: 0.1
/// - `log_every`: 100
#[derive(Debug, Clone, Default)]
pub struct SviBuilder {
    lr: Option<f64>,
    num_steps: Option<usize>,
    rank: Option<usize>,
    init_scale: Option<f64>,
    log_every: Option<usize>,
}

impl SviBuilder {
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial learning rate.
    #[must_use]
    pub fn lr(mut self, lr: f64) -> Self {
        self.lr = Some(lr);
        self
    }

    /// Sets the number of optimizer steps.
    #[must_use]
    pub fn num_steps(mut self, n: usize) -> Self {
        self.num_steps = Some(n);
        self
    }

    /// Sets the rank of the covariance factor.
    #[must_use]
    pub fn rank(mut self, rank: usize) -> Self {
        self.rank = Some(rank);
        self
    }

    /// Sets the initial guide scale.
    #[must_use]
    pub fn init_scale(mut self, scale: f64) -> Self {
        self.init_scale = Some(scale);
        self
    }

    /// Sets the loss logging cadence; 0 disables logging.
    #[must_use]
    pub fn log_every(mut self, n: usize) -> Self {
        self.log_every = Some(n);
        self
    }

    /// Builds the configured [`Svi`].
    #[must_use]
    pub fn build(self) -> Svi {
        Svi {
            lr: self.lr.unwrap_or(DEFAULT_LR),
            num_steps: self.num_steps.unwrap_or(DEFAULT_NUM_STEPS),
            rank: self.rank,
            init_scale: self.init_scale.unwrap_or(DEFAULT_INIT_SCALE),
            log_every: self.log_every.unwrap_or(DEFAULT_LOG_EVERY),
        }
    }
}
