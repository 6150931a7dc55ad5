//! Hierarchical Bayesian linear regression over categorical feature blocks.
//!
//! # Generative structure
//!
//! ```text
//! coef_scale_loc      ~ Normal(-2, 1)
//! coef_scale_scale    ~ LogNormal(0, 1)
//! for each block b (the trivial intercept block first):
//!     coef_scale_b    ~ LogNormal(coef_scale_loc, coef_scale_scale)
//!     coef_b[...]     ~ Normal(0, coef_scale_b)      one per category combination
//! [extra features:
//!     coef_scale      ~ LogNormal(coef_scale_loc, coef_scale_scale)
//!     coef[f]         ~ Normal(0, coef_scale)]
//! within_batch_scale  ~ LogNormal(0, 1)
//! [more than one batch:
//!     across_batch_scale ~ LogNormal(0, 1)
//!     batch_response[B]  ~ Normal(0, across_batch_scale)]
//! mean_i = Σ_b coef_b[design_i restricted to b] + extra_i · coef + batch_response[batch_i]
//! real:          response_i ~ Normal(mean_i, within_batch_scale)
//! unit_interval: logits_i   ~ Normal(mean_i, within_batch_scale)
//!                round(response_i * bins) ~ Binomial(bins, sigmoid(logits_i))
//! ```
//!
//! Overlapping blocks over-parameterize the mean; the shared hyperprior on
//! block scales lets weak blocks shrink toward zero.
//!
//! The latent sites live in an unconstrained vector described by a
//! [`LatentLayout`]. Scale sites are stored as logarithms, so
//! [`Model::log_density`] includes the log-transform Jacobian and returns the
//! analytic gradient needed by both fitting strategies.

use core::fmt;
use core::ops::Range;
use core::str::FromStr;
use std::collections::HashSet;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::experiment::Experiment;
use crate::rng_util::{binomial, normal, sigmoid, softplus, standard_normal};
use crate::schema::{Block, Design, ResolvedBlock, Schema};

/// Default number of bins for quantizing `unit_interval` responses.
pub const DEFAULT_QUANTIZATION_BINS: u32 = 100;

/// `0.5 * ln(2π)`.
const HALF_LN_TAU: f64 = 0.918_938_533_204_672_8;

/// Likelihood of the observed response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ResponseType {
    /// Gaussian noise around the mean.
    Real,
    /// Responses in `[0, 1]`, quantized and modeled as Binomial counts with
    /// a Gaussian latent logit.
    #[default]
    UnitInterval,
}

impl FromStr for ResponseType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "real" => Ok(Self::Real),
            "unit_interval" => Ok(Self::UnitInterval),
            other => Err(Error::UnknownResponseType(other.to_owned())),
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Real => "real",
            Self::UnitInterval => "unit_interval",
        })
    }
}

// ---------------------------------------------------------------------------
// Coefficients and the linear response
// ---------------------------------------------------------------------------

/// The coefficient tensor of one feature block, flattened row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockCoefficients {
    /// The block's variable names.
    pub block: Block,
    /// Positions and shape of the block.
    pub resolved: ResolvedBlock,
    /// One value per category combination.
    pub values: Vec<f64>,
}

impl BlockCoefficients {
    /// The tensor shape: one dimension per block variable, sized to its domain.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.resolved.shape
    }

    /// The coefficient selected by a design.
    #[must_use]
    pub fn lookup(&self, design: &[usize]) -> f64 {
        self.values[self.resolved.flat_index(design)]
    }
}

/// A realization of every regression coefficient.
#[derive(Clone, Debug, PartialEq)]
pub struct Coefficients {
    blocks: Vec<BlockCoefficients>,
    extra: Option<Vec<f64>>,
}

impl Coefficients {
    /// Creates coefficients from `(block, values)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownVariable`] for a block outside the schema and
    /// [`Error::LengthMismatch`] if `values` does not match the block's shape.
    pub fn new(
        schema: &Schema,
        blocks: Vec<(Block, Vec<f64>)>,
        extra: Option<Vec<f64>>,
    ) -> Result<Self> {
        let blocks = blocks
            .into_iter()
            .map(|(block, values)| {
                let resolved = block.resolve(schema)?;
                if values.len() != resolved.numel() {
                    return Err(Error::LengthMismatch {
                        field: "coefficients",
                        expected: resolved.numel(),
                        got: values.len(),
                    });
                }
                Ok(BlockCoefficients {
                    block,
                    resolved,
                    values,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { blocks, extra })
    }

    /// All block coefficient tensors, trivial block first when present.
    #[must_use]
    pub fn blocks(&self) -> &[BlockCoefficients] {
        &self.blocks
    }

    /// The coefficient tensor of a block.
    #[must_use]
    pub fn get(&self, block: &Block) -> Option<&BlockCoefficients> {
        self.blocks.iter().find(|b| &b.block == block)
    }

    /// Coefficients of the extra continuous features.
    #[must_use]
    pub fn extra(&self) -> Option<&[f64]> {
        self.extra.as_deref()
    }

    /// Sum of per-block lookups plus the extra-feature dot product.
    ///
    /// This is the unchecked hot path used by the design search; bounds are
    /// only checked in debug builds. Use [`Coefficients::try_linear_response`]
    /// for unvalidated input.
    #[must_use]
    pub fn linear_response(&self, design: &[usize], extra_features: Option<&[f64]>) -> f64 {
        debug_assert_eq!(self.extra.is_some(), extra_features.is_some());
        let mut total: f64 = self.blocks.iter().map(|b| b.lookup(design)).sum();
        if let (Some(coef), Some(x)) = (&self.extra, extra_features) {
            debug_assert_eq!(coef.len(), x.len());
            total += dot(coef, x);
        }
        total
    }

    /// Validated variant of [`Coefficients::linear_response`].
    ///
    /// # Errors
    ///
    /// Returns an error if the design does not fit the schema, or extra
    /// features are missing, unexpected, or of the wrong width.
    pub fn try_linear_response(
        &self,
        schema: &Schema,
        design: &Design,
        extra_features: Option<&[f64]>,
    ) -> Result<f64> {
        schema.validate_design(design)?;
        match (&self.extra, extra_features) {
            (Some(coef), Some(x)) if coef.len() != x.len() => {
                return Err(Error::LengthMismatch {
                    field: "extra_features",
                    expected: coef.len(),
                    got: x.len(),
                });
            }
            (Some(_), None) => {
                return Err(Error::InvalidConfig(
                    "extra features required by coefficients".into(),
                ));
            }
            (None, Some(_)) => {
                return Err(Error::InvalidConfig(
                    "extra features given without coefficients".into(),
                ));
            }
            _ => {}
        }
        Ok(self.linear_response(design.as_slice(), extra_features))
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

// ---------------------------------------------------------------------------
// Latent layout
// ---------------------------------------------------------------------------

/// How a site's unconstrained value maps to its constrained value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transform {
    /// Unconstrained real.
    Identity,
    /// Positive; stored as its logarithm.
    Log,
}

/// A named latent site occupying `offset..offset + len` of the flat vector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Site {
    /// Site name, e.g. `coef_scale_0_1`.
    pub name: String,
    /// Start of the site in the flat vector.
    pub offset: usize,
    /// Number of scalars.
    pub len: usize,
    /// Constraint transform.
    pub transform: Transform,
}

impl Site {
    /// The flat-vector range of this site.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

#[derive(Clone, Debug)]
struct BlockLayout {
    block: Block,
    resolved: ResolvedBlock,
    scale: usize,
    coefs: usize,
}

#[derive(Clone, Copy, Debug)]
struct ExtraLayout {
    scale: usize,
    coefs: usize,
    len: usize,
}

#[derive(Clone, Copy, Debug)]
struct BatchLayout {
    scale: usize,
    offset: usize,
    len: usize,
}

/// Placement of every latent site in the flat unconstrained vector.
#[derive(Clone, Debug)]
pub struct LatentLayout {
    sites: Vec<Site>,
    dim: usize,
    loc: usize,
    scale_scale: usize,
    blocks: Vec<BlockLayout>,
    extra: Option<ExtraLayout>,
    within: usize,
    batch: Option<BatchLayout>,
    logits: Option<usize>,
}

impl LatentLayout {
    fn push(
        sites: &mut Vec<Site>,
        dim: &mut usize,
        name: String,
        len: usize,
        transform: Transform,
    ) -> usize {
        let offset = *dim;
        sites.push(Site {
            name,
            offset,
            len,
            transform,
        });
        *dim += len;
        offset
    }

    fn build(
        blocks: Vec<(Block, ResolvedBlock)>,
        extra_width: Option<usize>,
        num_batches: usize,
        num_logits: Option<usize>,
    ) -> Self {
        let mut sites = Vec::new();
        let mut dim = 0;
        let loc = Self::push(
            &mut sites,
            &mut dim,
            "coef_scale_loc".into(),
            1,
            Transform::Identity,
        );
        let scale_scale = Self::push(
            &mut sites,
            &mut dim,
            "coef_scale_scale".into(),
            1,
            Transform::Log,
        );

        let blocks = blocks
            .into_iter()
            .map(|(block, resolved)| {
                let suffix = resolved.suffix();
                let scale = Self::push(
                    &mut sites,
                    &mut dim,
                    format!("coef_scale_{suffix}"),
                    1,
                    Transform::Log,
                );
                let coefs = Self::push(
                    &mut sites,
                    &mut dim,
                    format!("coef_{suffix}"),
                    resolved.numel(),
                    Transform::Identity,
                );
                BlockLayout {
                    block,
                    resolved,
                    scale,
                    coefs,
                }
            })
            .collect();

        let extra = extra_width.map(|len| ExtraLayout {
            scale: Self::push(&mut sites, &mut dim, "coef_scale".into(), 1, Transform::Log),
            coefs: Self::push(&mut sites, &mut dim, "coef".into(), len, Transform::Identity),
            len,
        });

        let within = Self::push(
            &mut sites,
            &mut dim,
            "within_batch_scale".into(),
            1,
            Transform::Log,
        );

        // A single batch would leave an unidentifiable one-element plate.
        let batch = (num_batches > 1).then(|| BatchLayout {
            scale: Self::push(
                &mut sites,
                &mut dim,
                "across_batch_scale".into(),
                1,
                Transform::Log,
            ),
            offset: Self::push(
                &mut sites,
                &mut dim,
                "batch_response".into(),
                num_batches,
                Transform::Identity,
            ),
            len: num_batches,
        });

        let logits = num_logits
            .map(|n| Self::push(&mut sites, &mut dim, "logits".into(), n, Transform::Identity));

        Self {
            sites,
            dim,
            loc,
            scale_scale,
            blocks,
            extra,
            within,
            batch,
            logits,
        }
    }

    /// Dimension of the flat unconstrained vector.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// All sites in layout order.
    #[must_use]
    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    /// Looks up a site by name.
    #[must_use]
    pub fn site(&self, name: &str) -> Option<&Site> {
        self.sites.iter().find(|s| s.name == name)
    }

    /// Returns `true` if the layout models between-batch shifts.
    #[must_use]
    pub fn has_batch_effect(&self) -> bool {
        self.batch.is_some()
    }

    /// `(log-scale index, coefficient range)` of every hierarchically scaled group.
    fn scale_groups(&self) -> impl Iterator<Item = (usize, Range<usize>)> + '_ {
        self.blocks
            .iter()
            .map(|b| (b.scale, b.coefs..b.coefs + b.resolved.numel()))
            .chain(self.extra.iter().map(|e| (e.scale, e.coefs..e.coefs + e.len)))
    }

    fn constrain(&self, z: &[f64]) -> Vec<f64> {
        let mut values = z.to_vec();
        for site in self.sites.iter().filter(|s| s.transform == Transform::Log) {
            for v in &mut values[site.range()] {
                *v = v.exp();
            }
        }
        values
    }
}

/// One posterior (or prior) draw of every latent site, in constrained space.
#[derive(Clone, Debug)]
pub struct PosteriorSample {
    layout: Arc<LatentLayout>,
    values: Vec<f64>,
}

impl PosteriorSample {
    pub(crate) fn from_unconstrained(layout: Arc<LatentLayout>, z: &[f64]) -> Self {
        let values = layout.constrain(z);
        Self { layout, values }
    }

    /// The constrained values of a named site.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.layout.site(name).map(|s| &self.values[s.range()])
    }

    /// The layout this draw follows.
    #[must_use]
    pub fn layout(&self) -> &LatentLayout {
        &self.layout
    }

    /// All constrained values in layout order.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The regression coefficients of this draw.
    #[must_use]
    pub fn coefficients(&self) -> Coefficients {
        let blocks = self
            .layout
            .blocks
            .iter()
            .map(|b| BlockCoefficients {
                block: b.block.clone(),
                resolved: b.resolved.clone(),
                values: self.values[b.coefs..b.coefs + b.resolved.numel()].to_vec(),
            })
            .collect();
        let extra = self
            .layout
            .extra
            .map(|e| self.values[e.coefs..e.coefs + e.len].to_vec());
        Coefficients { blocks, extra }
    }
}

/// A prior predictive draw.
#[derive(Clone, Debug)]
pub struct Simulation {
    /// The latent draw.
    pub sample: PosteriorSample,
    /// Simulated responses, one per experiment row.
    pub responses: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Builder for a [`Model`].
///
/// Defaults:
/// - `feature_blocks`: singleton blocks of the schema
/// - `response_type`: [`ResponseType::UnitInterval`]
/// - `quantization_bins`: 100
/// - `max_batch_id`: the largest batch id in the experiment
/// - no extra features
#[derive(Clone, Debug)]
pub struct ModelBuilder {
    schema: Schema,
    experiment: Experiment,
    feature_blocks: Option<Vec<Block>>,
    extra_features: Option<Vec<Vec<f64>>>,
    response_type: ResponseType,
    quantization_bins: u32,
    max_batch_id: Option<usize>,
}

impl ModelBuilder {
    /// Sets the feature blocks. The trivial block is always added implicitly.
    #[must_use]
    pub fn feature_blocks(mut self, blocks: Vec<Block>) -> Self {
        self.feature_blocks = Some(blocks);
        self
    }

    /// Sets per-row extra continuous features.
    #[must_use]
    pub fn extra_features(mut self, features: Vec<Vec<f64>>) -> Self {
        self.extra_features = Some(features);
        self
    }

    /// Sets the response likelihood.
    #[must_use]
    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Sets the number of quantization bins for `unit_interval` responses.
    #[must_use]
    pub fn quantization_bins(mut self, bins: u32) -> Self {
        self.quantization_bins = bins;
        self
    }

    /// Sizes the batch plate for ids `0..=max_batch_id` instead of only the
    /// ids present in the experiment, e.g. when simulating a known number of
    /// rounds ahead.
    #[must_use]
    pub fn max_batch_id(mut self, id: usize) -> Self {
        self.max_batch_id = Some(id);
        self
    }

    /// Validates every shape relation and builds the model.
    ///
    /// # Errors
    ///
    /// Returns a precondition error if designs do not fit the schema, a
    /// block names an unknown variable or is repeated, the trivial block is
    /// passed explicitly, extra features have the wrong shape, responses are
    /// non-finite or (for `unit_interval`) outside `[0, 1]`, the experiment
    /// columns disagree in length, `quantization_bins` is zero, or
    /// `max_batch_id` is below an id present in the experiment.
    pub fn build(self) -> Result<Model> {
        let Self {
            schema,
            experiment,
            feature_blocks,
            extra_features,
            response_type,
            quantization_bins,
            max_batch_id,
        } = self;

        check_columns(&experiment)?;
        experiment.validate(&schema)?;
        if quantization_bins == 0 {
            return Err(Error::InvalidConfig("quantization_bins must be positive".into()));
        }

        let feature_blocks = feature_blocks.unwrap_or_else(|| schema.singleton_blocks());
        let mut seen = HashSet::new();
        let mut blocks = Vec::with_capacity(feature_blocks.len() + 1);
        blocks.push((Block::trivial(), Block::trivial().resolve(&schema)?));
        for block in feature_blocks {
            if block.is_trivial() {
                return Err(Error::InvalidConfig("the trivial block is added implicitly".into()));
            }
            if !seen.insert(block.clone()) {
                return Err(Error::InvalidConfig(format!("duplicate feature block {:?}", block.0)));
            }
            let resolved = block.resolve(&schema)?;
            blocks.push((block, resolved));
        }

        let n = experiment.len();
        let extra_width = extra_features
            .as_deref()
            .map(|rows| extra_feature_width(rows, n))
            .transpose()?;
        let observed = experiment
            .responses()
            .map(|responses| observed_targets(responses, response_type, quantization_bins))
            .transpose()?;
        let num_batches = batch_plate_size(&experiment, max_batch_id)?;
        let num_logits = (response_type == ResponseType::UnitInterval).then_some(n);
        let layout = LatentLayout::build(blocks, extra_width, num_batches, num_logits);

        let lookups = experiment
            .sequences()
            .iter()
            .flat_map(|design| {
                layout
                    .blocks
                    .iter()
                    .map(move |b| b.coefs + b.resolved.flat_index(design.as_slice()))
            })
            .collect();
        let batch_lookup = layout.batch.map(|batch| {
            experiment
                .batch_ids()
                .iter()
                .map(|&id| batch.offset + id)
                .collect()
        });

        Ok(Model {
            schema,
            experiment,
            layout: Arc::new(layout),
            response_type,
            bins: quantization_bins,
            extra_features,
            lookups,
            batch_lookup,
            observed,
        })
    }
}

fn check_columns(experiment: &Experiment) -> Result<()> {
    let n = experiment.len();
    let ids = experiment.batch_ids().len();
    if ids != n {
        return Err(Error::LengthMismatch {
            field: "batch_ids",
            expected: n,
            got: ids,
        });
    }
    match experiment.responses() {
        Some(responses) if responses.len() != n => Err(Error::LengthMismatch {
            field: "responses",
            expected: n,
            got: responses.len(),
        }),
        _ => Ok(()),
    }
}

/// Width of the extra-feature rows, which must be non-empty, one per
/// experiment row and all equally wide.
fn extra_feature_width(rows: &[Vec<f64>], n: usize) -> Result<usize> {
    if rows.len() != n {
        return Err(Error::LengthMismatch {
            field: "extra_features",
            expected: n,
            got: rows.len(),
        });
    }
    let width = rows.first().map_or(0, Vec::len);
    if let Some(bad) = rows.iter().find(|r| r.len() != width) {
        return Err(Error::LengthMismatch {
            field: "extra_features",
            expected: width,
            got: bad.len(),
        });
    }
    if width == 0 {
        return Err(Error::InvalidConfig("extra features must be non-empty".into()));
    }
    Ok(width)
}

/// Real responses as given, or `unit_interval` responses quantized to counts.
fn observed_targets(responses: &[f64], response_type: ResponseType, bins: u32) -> Result<Vec<f64>> {
    for (row, &value) in responses.iter().enumerate() {
        let ok = match response_type {
            ResponseType::Real => value.is_finite(),
            ResponseType::UnitInterval => (0.0..=1.0).contains(&value),
        };
        if !ok {
            return Err(Error::InvalidResponse { row, value });
        }
    }
    Ok(match response_type {
        ResponseType::Real => responses.to_vec(),
        ResponseType::UnitInterval => responses
            .iter()
            .map(|r| (r * f64::from(bins)).round())
            .collect(),
    })
}

/// Number of `batch_response` entries: `max_batch_id + 1`, taken from the
/// override when given.
fn batch_plate_size(experiment: &Experiment, max_batch_id: Option<usize>) -> Result<usize> {
    match (max_batch_id, experiment.max_batch_id()) {
        (Some(max), Some(present)) if max < present => Err(Error::InvalidConfig(format!(
            "max_batch_id {max} is below batch id {present} in the experiment"
        ))),
        (Some(max), _) => Ok(max + 1),
        (None, _) => Ok(experiment.num_batches().max(1)),
    }
}

/// A hierarchical Bayesian regression bound to an experiment.
///
/// # Examples
///
/// ```
/// use bayes_oed::experiment::Experiment;
/// use bayes_oed::model::{Model, ResponseType};
/// use bayes_oed::schema::{Design, Schema};
///
/// let schema = Schema::new([("a", vec!["0", "1"]), ("b", vec!["0", "1"])]).unwrap();
/// let experiment = Experiment::new(
///     vec![Design(vec![0, 0]), Design(vec![1, 1])],
///     vec![0, 0],
///     vec![0.1, 0.9],
/// )
/// .unwrap();
///
/// let model = Model::builder(&schema, &experiment)
///     .response_type(ResponseType::Real)
///     .build()
///     .unwrap();
///
/// let z = model.initial_position();
/// let mut grad = vec![0.0; model.dim()];
/// assert!(model.log_density(&z, &mut grad).is_finite());
/// ```
#[derive(Clone, Debug)]
pub struct Model {
    schema: Schema,
    experiment: Experiment,
    layout: Arc<LatentLayout>,
    response_type: ResponseType,
    bins: u32,
    extra_features: Option<Vec<Vec<f64>>>,
    /// Absolute coefficient index per (row, block), row-major.
    lookups: Vec<usize>,
    batch_lookup: Option<Vec<usize>>,
    /// Real responses, or quantized counts for `unit_interval`.
    observed: Option<Vec<f64>>,
}

impl Model {
    /// Starts building a model for `experiment` over `schema`.
    #[must_use]
    pub fn builder(schema: &Schema, experiment: &Experiment) -> ModelBuilder {
        ModelBuilder {
            schema: schema.clone(),
            experiment: experiment.clone(),
            feature_blocks: None,
            extra_features: None,
            response_type: ResponseType::default(),
            quantization_bins: DEFAULT_QUANTIZATION_BINS,
            max_batch_id: None,
        }
    }

    /// The schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The experiment the model is conditioned on.
    #[must_use]
    pub fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    /// The response likelihood.
    #[must_use]
    pub fn response_type(&self) -> ResponseType {
        self.response_type
    }

    /// The latent layout.
    #[must_use]
    pub fn layout(&self) -> &LatentLayout {
        &self.layout
    }

    pub(crate) fn shared_layout(&self) -> Arc<LatentLayout> {
        Arc::clone(&self.layout)
    }

    /// Dimension of the unconstrained latent vector.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.layout.dim
    }

    /// Returns `true` if responses were observed.
    #[must_use]
    pub fn is_observed(&self) -> bool {
        self.observed.is_some()
    }

    /// Prior medians in unconstrained space, with logits started at the
    /// empirical log-odds of the observed counts.
    #[must_use]
    pub fn initial_position(&self) -> Vec<f64> {
        let layout = &self.layout;
        let mut z = vec![0.0; layout.dim];
        z[layout.loc] = -2.0;
        for (scale, _) in layout.scale_groups() {
            z[scale] = -2.0;
        }
        if let (Some(offset), Some(counts)) = (layout.logits, &self.observed) {
            let bins = f64::from(self.bins);
            for (i, &k) in counts.iter().enumerate() {
                z[offset + i] = ((k + 0.5) / (bins - k + 0.5)).ln();
            }
        }
        z
    }

    /// Maps an unconstrained vector to a named draw.
    #[must_use]
    pub fn constrain(&self, z: &[f64]) -> PosteriorSample {
        PosteriorSample::from_unconstrained(self.shared_layout(), z)
    }

    /// Mean response of a row: block lookups, extra features and batch shift.
    ///
    /// Only identity-transformed sites are read, so `values` may be either
    /// unconstrained or constrained.
    fn row_mean(&self, values: &[f64], row: usize) -> f64 {
        let nb = self.layout.blocks.len();
        let mut mean: f64 = self.lookups[row * nb..(row + 1) * nb]
            .iter()
            .map(|&i| values[i])
            .sum();
        if let (Some(e), Some(x)) = (&self.layout.extra, &self.extra_features) {
            mean += dot(&values[e.coefs..e.coefs + e.len], &x[row]);
        }
        if let Some(b) = &self.batch_lookup {
            mean += values[b[row]];
        }
        mean
    }

    /// Per-row mean response under a draw, including batch shifts.
    #[must_use]
    pub fn predict(&self, sample: &PosteriorSample) -> Vec<f64> {
        (0..self.experiment.len())
            .map(|row| self.row_mean(sample.values(), row))
            .collect()
    }

    /// Unnormalized log joint density at unconstrained `z`, with its
    /// gradient written to `grad`.
    ///
    /// Log-transformed sites include their Jacobian. The Binomial
    /// normalizer is omitted, so values are correct up to an additive
    /// constant. Without observed responses only the latent prior terms
    /// contribute.
    ///
    /// # Panics
    ///
    /// Panics if `z` or `grad` is shorter than [`Model::dim`].
    #[allow(clippy::similar_names, clippy::many_single_char_names)]
    pub fn log_density(&self, z: &[f64], grad: &mut [f64]) -> f64 {
        let l = &*self.layout;
        debug_assert_eq!(z.len(), l.dim);
        grad[..l.dim].fill(0.0);

        // Shared hyperprior.
        let loc = z[l.loc];
        let log_ss = z[l.scale_scale];
        let ss_prec = (-2.0 * log_ss).exp();
        let mut lp = standard_normal_lp(loc + 2.0) + standard_normal_lp(log_ss);
        grad[l.loc] -= loc + 2.0;
        grad[l.scale_scale] -= log_ss;

        for (scale, coefs) in l.scale_groups() {
            let d = z[scale] - loc;
            lp += -0.5 * d * d * ss_prec - log_ss - HALF_LN_TAU;
            grad[scale] -= d * ss_prec;
            grad[l.loc] += d * ss_prec;
            grad[l.scale_scale] += d * d * ss_prec - 1.0;
            lp += zero_mean_normal(z, grad, scale, coefs);
        }

        let log_within = z[l.within];
        lp += standard_normal_lp(log_within);
        grad[l.within] -= log_within;

        if let Some(b) = l.batch {
            let log_across = z[b.scale];
            lp += standard_normal_lp(log_across);
            grad[b.scale] -= log_across;
            lp += zero_mean_normal(z, grad, b.scale, b.offset..b.offset + b.len);
        }

        let within_prec = (-2.0 * log_within).exp();
        let nb = l.blocks.len();
        let bins = f64::from(self.bins);
        for row in 0..self.experiment.len() {
            let mean = self.row_mean(z, row);
            let target = match (self.response_type, l.logits) {
                (ResponseType::UnitInterval, Some(offset)) => z[offset + row],
                _ => match &self.observed {
                    Some(y) => y[row],
                    // A real response without observation is marginalized out.
                    None => continue,
                },
            };
            let d = target - mean;
            lp += -0.5 * d * d * within_prec - log_within - HALF_LN_TAU;
            grad[l.within] += d * d * within_prec - 1.0;
            let g_mean = d * within_prec;

            if let (ResponseType::UnitInterval, Some(offset)) = (self.response_type, l.logits) {
                let i = offset + row;
                grad[i] -= g_mean;
                if let Some(counts) = &self.observed {
                    let k = counts[row];
                    lp += k * z[i] - bins * softplus(z[i]);
                    grad[i] += k - bins * sigmoid(z[i]);
                }
            }

            for &i in &self.lookups[row * nb..(row + 1) * nb] {
                grad[i] += g_mean;
            }
            if let (Some(e), Some(x)) = (&l.extra, &self.extra_features) {
                for (g, xj) in grad[e.coefs..e.coefs + e.len].iter_mut().zip(&x[row]) {
                    *g += g_mean * xj;
                }
            }
            if let Some(b) = &self.batch_lookup {
                grad[b[row]] += g_mean;
            }
        }
        lp
    }

    /// Draws latents and responses from the prior predictive, ignoring any
    /// observed responses.
    ///
    /// `unit_interval` responses are quantized Binomial draws divided by the
    /// number of bins, so they always lie in `[0, 1]`.
    #[must_use]
    pub fn simulate(&self, rng: &mut fastrand::Rng) -> Simulation {
        let l = &*self.layout;
        let mut z = vec![0.0; l.dim];
        z[l.loc] = normal(rng, -2.0, 1.0);
        z[l.scale_scale] = standard_normal(rng);
        let ss = z[l.scale_scale].exp();
        for (scale, coefs) in l.scale_groups() {
            z[scale] = normal(rng, z[l.loc], ss);
            let sigma = z[scale].exp();
            for v in &mut z[coefs] {
                *v = normal(rng, 0.0, sigma);
            }
        }
        z[l.within] = standard_normal(rng);
        if let Some(b) = l.batch {
            z[b.scale] = standard_normal(rng);
            let sigma = z[b.scale].exp();
            for v in &mut z[b.offset..b.offset + b.len] {
                *v = normal(rng, 0.0, sigma);
            }
        }

        let within = z[l.within].exp();
        let responses = (0..self.experiment.len())
            .map(|row| {
                let mean = self.row_mean(&z, row);
                match (self.response_type, l.logits) {
                    (ResponseType::UnitInterval, Some(offset)) => {
                        let logit = normal(rng, mean, within);
                        z[offset + row] = logit;
                        binomial(rng, self.bins, sigmoid(logit)) / f64::from(self.bins)
                    }
                    _ => normal(rng, mean, within),
                }
            })
            .collect();

        Simulation {
            sample: PosteriorSample::from_unconstrained(self.shared_layout(), &z),
            responses,
        }
    }
}

fn standard_normal_lp(x: f64) -> f64 {
    -0.5 * x * x - HALF_LN_TAU
}

/// Log density of `z[coefs] ~ Normal(0, exp(z[log_scale]))` elementwise,
/// accumulating its gradient.
fn zero_mean_normal(z: &[f64], grad: &mut [f64], log_scale: usize, coefs: Range<usize>) -> f64 {
    let ls = z[log_scale];
    let prec = (-2.0 * ls).exp();
    let mut lp = 0.0;
    for i in coefs {
        let c = z[i];
        lp += -0.5 * c * c * prec - ls - HALF_LN_TAU;
        grad[i] -= c * prec;
        grad[log_scale] += c * c * prec - 1.0;
    }
    lp
}
