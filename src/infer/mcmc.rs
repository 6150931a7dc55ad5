//! Hamiltonian Monte Carlo with dual-averaging step-size adaptation.
//!
//! Each chain starts near the model's initial position, picks a starting
//! step size by repeated doubling or halving until a single leapfrog step
//! has an acceptance probability near one half, then tunes the step size
//! during warm-up so the average acceptance probability approaches
//! `target_accept`. The step size is frozen for the sampling phase and every
//! post-warm-up position is kept.
//!
//! Chains run one after another on the caller's generator, so a fixed seed
//! reproduces every draw.
//!
//! # Configuration
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `num_samples` | 500 | Kept draws per chain |
//! | `warmup_steps` | 500 | Adaptation iterations per chain |
//! | `num_chains` | 1 | Independent chains |
//! | `num_leapfrog` | 10 | Leapfrog steps per trajectory |
//! | `target_accept` | 0.8 | Target mean acceptance probability |

use crate::error::{Error, Result};
use crate::infer::Inference;
use crate::model::Model;
use crate::rng_util::{f64_range, standard_normal};
use crate::sampler::{EmpiricalSampler, Sampler};

const DEFAULT_NUM_SAMPLES: usize = 500;
const DEFAULT_WARMUP_STEPS: usize = 500;
const DEFAULT_NUM_CHAINS: usize = 1;
const DEFAULT_NUM_LEAPFROG: usize = 10;
const DEFAULT_TARGET_ACCEPT: f64 = 0.8;

// Dual-averaging constants.
const GAMMA: f64 = 0.05;
const T0: f64 = 10.0;
const KAPPA: f64 = 0.75;

/// Half-width of the uniform jitter applied to each chain's start.
const INIT_JITTER: f64 = 0.1;
/// Limit on doublings or halvings when searching for a first step size.
const MAX_STEP_SEARCH: usize = 100;

/// Markov-chain fitting strategy.
#[derive(Clone, Debug)]
pub struct Mcmc {
    num_samples: usize,
    warmup_steps: usize,
    num_chains: usize,
    num_leapfrog: usize,
    target_accept: f64,
}

impl Mcmc {
    /// Creates an MCMC strategy with default settings.
    #[must_use]
    pub fn new() -> Self {
        McmcBuilder::new().build()
    }

    /// Creates a builder for configuring [`Mcmc`].
    #[must_use]
    pub fn builder() -> McmcBuilder {
        McmcBuilder::new()
    }

    /// Runs every chain and returns the kept draws in unconstrained space
    /// together with per-chain diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `num_leapfrog` is zero or
    /// `target_accept` lies outside `(0, 1)`, and [`Error::Responses`] if
    /// the model has no observed responses.
    pub fn run(&self, model: &Model, rng: &mut fastrand::Rng) -> Result<McmcRun> {
        if self.num_leapfrog == 0 {
            return Err(Error::InvalidConfig("num_leapfrog must be at least 1".into()));
        }
        if !(self.target_accept > 0.0 && self.target_accept < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "target_accept must lie in (0, 1), got {}",
                self.target_accept
            )));
        }
        if !model.is_observed() {
            return Err(Error::Responses("required for fitting"));
        }

        let mut draws = Vec::with_capacity(self.num_samples * self.num_chains);
        let mut chains = Vec::with_capacity(self.num_chains);
        for _ in 0..self.num_chains {
            let stats = self.run_chain(model, rng, &mut draws);
            trace_info!(
                chain = chains.len(),
                step_size = stats.step_size,
                accept_rate = stats.accept_rate,
                "mcmc chain finished"
            );
            chains.push(stats);
        }
        Ok(McmcRun { draws, chains })
    }

    #[allow(clippy::cast_precision_loss)]
    fn run_chain(
        &self,
        model: &Model,
        rng: &mut fastrand::Rng,
        draws: &mut Vec<Vec<f64>>,
    ) -> ChainStats {
        let mut state = State::new(model, jittered_start(model, rng));
        let mut eps = find_reasonable_step_size(model, &state, rng);
        let mut adapt = DualAveraging::new(eps, self.target_accept);

        for _ in 0..self.warmup_steps {
            let accept_prob = self.transition(model, &mut state, eps, rng);
            eps = adapt.update(accept_prob);
        }
        if self.warmup_steps > 0 {
            eps = adapt.final_step_size();
        }

        let mut accept_sum = 0.0;
        for _ in 0..self.num_samples {
            accept_sum += self.transition(model, &mut state, eps, rng);
            draws.push(state.position.clone());
        }
        ChainStats {
            step_size: eps,
            accept_rate: if self.num_samples == 0 {
                0.0
            } else {
                accept_sum / self.num_samples as f64
            },
        }
    }

    /// One Metropolis-corrected trajectory. Returns the acceptance
    /// probability; a non-finite energy counts as zero.
    fn transition(
        &self,
        model: &Model,
        state: &mut State,
        eps: f64,
        rng: &mut fastrand::Rng,
    ) -> f64 {
        let momentum: Vec<f64> = (0..state.position.len()).map(|_| standard_normal(rng)).collect();
        let h0 = state.energy(&momentum);
        let (proposal, p_end) = leapfrog(model, state, momentum, eps, self.num_leapfrog);
        let h1 = proposal.energy(&p_end);

        let accept_prob = if h1.is_finite() {
            (h0 - h1).exp().min(1.0)
        } else {
            0.0
        };
        if rng.f64() < accept_prob {
            *state = proposal;
        }
        accept_prob
    }
}

impl Default for Mcmc {
    fn default() -> Self {
        Self::new()
    }
}

impl Inference for Mcmc {
    fn fit(&self, model: &Model, rng: &mut fastrand::Rng) -> Result<Box<dyn Sampler>> {
        let run = self.run(model, rng)?;
        Ok(Box::new(EmpiricalSampler::new(model, run.draws)?))
    }
}

/// Builder for [`Mcmc`].
///
/// Defaults: 500 samples after 500 warm-up steps on one chain, 10 leapfrog
/// steps per trajectory and a target acceptance of 0.8.
#[derive(Debug, Clone, Default)]
pub struct McmcBuilder {
    num_samples: Option<usize>,
    warmup_steps: Option<usize>,
    num_chains: Option<usize>,
    num_leapfrog: Option<usize>,
    target_accept: Option<f64>,
}

impl McmcBuilder {
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of kept draws per chain.
    #[must_use]
    pub fn num_samples(mut self, n: usize) -> Self {
        self.num_samples = Some(n);
        self
    }

    /// Sets the number of warm-up iterations per chain.
    #[must_use]
    pub fn warmup_steps(mut self, n: usize) -> Self {
        self.warmup_steps = Some(n);
        self
    }

    /// Sets the number of chains.
    #[must_use]
    pub fn num_chains(mut self, n: usize) -> Self {
        self.num_chains = Some(n);
        self
    }

    /// Sets the number of leapfrog steps per trajectory.
    #[must_use]
    pub fn num_leapfrog(mut self, n: usize) -> Self {
        self.num_leapfrog = Some(n);
        self
    }

    /// Sets the target acceptance probability for step-size adaptation.
    #[must_use]
    pub fn target_accept(mut self, p: f64) -> Self {
        self.target_accept = Some(p);
        self
    }

    /// Builds the configured [`Mcmc`].
    #[must_use]
    pub fn build(self) -> Mcmc {
        Mcmc {
            num_samples: self.num_samples.unwrap_or(DEFAULT_NUM_SAMPLES),
            warmup_steps: self.warmup_steps.unwrap_or(DEFAULT_WARMUP_STEPS),
            num_chains: self.num_chains.unwrap_or(DEFAULT_NUM_CHAINS),
            num_leapfrog: self.num_leapfrog.unwrap_or(DEFAULT_NUM_LEAPFROG),
            target_accept: self.target_accept.unwrap_or(DEFAULT_TARGET_ACCEPT),
        }
    }
}

/// Output of [`Mcmc::run`].
#[derive(Clone, Debug)]
pub struct McmcRun {
    /// Post-warm-up positions of every chain, chain by chain.
    pub draws: Vec<Vec<f64>>,
    /// Diagnostics per chain.
    pub chains: Vec<ChainStats>,
}

/// Diagnostics of one chain's sampling phase.
#[derive(Clone, Copy, Debug)]
pub struct ChainStats {
    /// Step size after adaptation.
    pub step_size: f64,
    /// Mean acceptance probability over kept draws.
    pub accept_rate: f64,
}

/// A position with its cached log density and gradient.
#[derive(Clone)]
struct State {
    position: Vec<f64>,
    log_density: f64,
    grad: Vec<f64>,
}

impl State {
    fn new(model: &Model, position: Vec<f64>) -> Self {
        let mut grad = vec![0.0; position.len()];
        let log_density = model.log_density(&position, &mut grad);
        Self {
            position,
            log_density,
            grad,
        }
    }

    /// Hamiltonian with identity mass matrix.
    fn energy(&self, momentum: &[f64]) -> f64 {
        -self.log_density + 0.5 * momentum.iter().map(|p| p * p).sum::<f64>()
    }
}

fn jittered_start(model: &Model, rng: &mut fastrand::Rng) -> Vec<f64> {
    model
        .initial_position()
        .into_iter()
        .map(|z| z + f64_range(rng, -INIT_JITTER, INIT_JITTER))
        .collect()
}

/// Integrates `steps` leapfrog steps from `start`, returning the end state
/// and momentum.
fn leapfrog(
    model: &Model,
    start: &State,
    mut momentum: Vec<f64>,
    eps: f64,
    steps: usize,
) -> (State, Vec<f64>) {
    let mut position = start.position.clone();
    let mut grad = start.grad.clone();
    let mut log_density = start.log_density;
    for _ in 0..steps {
        for (p, g) in momentum.iter_mut().zip(&grad) {
            *p += 0.5 * eps * g;
        }
        for (q, p) in position.iter_mut().zip(&momentum) {
            *q += eps * p;
        }
        log_density = model.log_density(&position, &mut grad);
        if !log_density.is_finite() {
            break;
        }
        for (p, g) in momentum.iter_mut().zip(&grad) {
            *p += 0.5 * eps * g;
        }
    }
    let end = State {
        position,
        log_density,
        grad,
    };
    (end, momentum)
}

/// Doubles or halves a unit step size until one leapfrog step crosses an
/// acceptance probability of one half.
fn find_reasonable_step_size(model: &Model, state: &State, rng: &mut fastrand::Rng) -> f64 {
    let dim = state.position.len();
    let mut eps = 1.0;
    let accept = |eps: f64, rng: &mut fastrand::Rng| {
        let momentum: Vec<f64> = (0..dim).map(|_| standard_normal(rng)).collect();
        let h0 = state.energy(&momentum);
        let (end, p_end) = leapfrog(model, state, momentum, eps, 1);
        let h1 = end.energy(&p_end);
        if h1.is_finite() {
            (h0 - h1).exp()
        } else {
            0.0
        }
    };

    let mut a = accept(eps, rng);
    let direction: f64 = if a > 0.5 { 1.0 } else { -1.0 };
    let factor = 2f64.powf(direction);
    for _ in 0..MAX_STEP_SEARCH {
        if a.powf(direction) <= 2f64.powf(-direction) {
            break;
        }
        eps *= factor;
        a = accept(eps, rng);
    }
    eps
}

/// Nesterov dual averaging of the log step size.
struct DualAveraging {
    mu: f64,
    target: f64,
    h_bar: f64,
    log_eps_bar: f64,
    iteration: f64,
}

impl DualAveraging {
    fn new(initial: f64, target: f64) -> Self {
        Self {
            mu: (10.0 * initial).ln(),
            target,
            h_bar: 0.0,
            log_eps_bar: 0.0,
            iteration: 0.0,
        }
    }

    /// Feeds one acceptance probability and returns the next step size.
    fn update(&mut self, accept_prob: f64) -> f64 {
        self.iteration += 1.0;
        let m = self.iteration;
        let w = 1.0 / (m + T0);
        self.h_bar = (1.0 - w) * self.h_bar + w * (self.target - accept_prob);
        let log_eps = self.mu - m.sqrt() / GAMMA * self.h_bar;
        let eta = m.powf(-KAPPA);
        self.log_eps_bar = eta * log_eps + (1.0 - eta) * self.log_eps_bar;
        log_eps.exp()
    }

    fn final_step_size(&self) -> f64 {
        self.log_eps_bar.exp()
    }
}
