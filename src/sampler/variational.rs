//! Sampler over a fitted low-rank multivariate normal guide.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use crate::model::{LatentLayout, PosteriorSample};
use crate::rng_util::standard_normal;
use crate::sampler::Sampler;

/// Draws from `Normal(loc, W Wᵀ + diag(scale²))` in unconstrained space.
///
/// Each call is a fresh reparameterized draw
/// `z = loc + W ε₁ + scale ⊙ ε₂`, mapped to constrained space.
#[derive(Clone, Debug)]
pub struct VariationalSampler {
    layout: Arc<LatentLayout>,
    loc: DVector<f64>,
    cov_factor: DMatrix<f64>,
    scale: DVector<f64>,
}

impl VariationalSampler {
    pub(crate) fn new(
        layout: Arc<LatentLayout>,
        loc: DVector<f64>,
        cov_factor: DMatrix<f64>,
        scale: DVector<f64>,
    ) -> Self {
        debug_assert_eq!(loc.len(), layout.dim());
        debug_assert_eq!(cov_factor.nrows(), layout.dim());
        debug_assert_eq!(scale.len(), layout.dim());
        Self {
            layout,
            loc,
            cov_factor,
            scale,
        }
    }

    /// Rank of the covariance factor.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.cov_factor.ncols()
    }

    /// Guide mean in unconstrained space.
    #[must_use]
    pub fn loc(&self) -> &[f64] {
        self.loc.as_slice()
    }

    /// Marginal standard deviation of each unconstrained coordinate.
    #[must_use]
    pub fn marginal_std(&self) -> Vec<f64> {
        self.cov_factor
            .row_iter()
            .zip(self.scale.iter())
            .map(|(row, s)| (row.norm_squared() + s * s).sqrt())
            .collect()
    }

    /// The guide mean mapped to constrained space, i.e. the median of every
    /// site's marginal.
    #[must_use]
    pub fn median(&self) -> PosteriorSample {
        PosteriorSample::from_unconstrained(Arc::clone(&self.layout), self.loc.as_slice())
    }

    /// One reparameterized draw in unconstrained space.
    #[must_use]
    pub fn sample_unconstrained(&self, rng: &mut fastrand::Rng) -> Vec<f64> {
        let eps_low = DVector::from_fn(self.rank(), |_, _| standard_normal(rng));
        let eps_diag = DVector::from_fn(self.loc.len(), |_, _| standard_normal(rng));
        let z = &self.loc + &self.cov_factor * eps_low + self.scale.component_mul(&eps_diag);
        z.as_slice().to_vec()
    }
}

impl Sampler for VariationalSampler {
    fn sample(&self, rng: &mut fastrand::Rng) -> PosteriorSample {
        let z = self.sample_unconstrained(rng);
        PosteriorSample::from_unconstrained(Arc::clone(&self.layout), &z)
    }
}
