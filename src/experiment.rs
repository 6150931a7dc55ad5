//! Accumulated experiment data.
//!
//! An [`Experiment`] holds parallel columns of designs, batch ids, and
//! (optionally) observed responses. It grows only by [`Experiment::append`],
//! which returns a new value so earlier rounds stay available for analysis.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{Design, Schema};

/// Observed `(design, batch id, response)` rows.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "ExperimentRepr"))]
pub struct Experiment {
    sequences: Vec<Design>,
    batch_ids: Vec<usize>,
    responses: Option<Vec<f64>>,
}

impl Experiment {
    /// Creates an experiment with observed responses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LengthMismatch`] if the columns differ in length.
    pub fn new(sequences: Vec<Design>, batch_ids: Vec<usize>, responses: Vec<f64>) -> Result<Self> {
        check_len("batch_ids", sequences.len(), batch_ids.len())?;
        check_len("responses", sequences.len(), responses.len())?;
        Ok(Self {
            sequences,
            batch_ids,
            responses: Some(responses),
        })
    }

    /// Creates an experiment whose responses have not been observed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LengthMismatch`] if the columns differ in length.
    pub fn unobserved(sequences: Vec<Design>, batch_ids: Vec<usize>) -> Result<Self> {
        check_len("batch_ids", sequences.len(), batch_ids.len())?;
        Ok(Self {
            sequences,
            batch_ids,
            responses: None,
        })
    }

    /// Checks every design against the schema.
    ///
    /// # Errors
    ///
    /// Returns the first design error found.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        self.sequences
            .iter()
            .try_for_each(|design| schema.validate_design(design))
    }

    /// The designs, one per row.
    #[must_use]
    pub fn sequences(&self) -> &[Design] {
        &self.sequences
    }

    /// The batch id of each row.
    #[must_use]
    pub fn batch_ids(&self) -> &[usize] {
        &self.batch_ids
    }

    /// The observed responses, if any.
    #[must_use]
    pub fn responses(&self) -> Option<&[f64]> {
        self.responses.as_deref()
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    /// Returns `true` if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// The largest batch id, or `None` for an empty experiment.
    #[must_use]
    pub fn max_batch_id(&self) -> Option<usize> {
        self.batch_ids.iter().copied().max()
    }

    /// Number of batches, `max_batch_id + 1` (0 when empty).
    #[must_use]
    pub fn num_batches(&self) -> usize {
        self.max_batch_id().map_or(0, |b| b + 1)
    }

    /// The best observed response so far.
    #[must_use]
    pub fn best_response(&self) -> Option<f64> {
        self.responses
            .as_ref()?
            .iter()
            .copied()
            .fold(None, |best, r| Some(best.map_or(r, |b: f64| b.max(r))))
    }

    /// Returns `true` if the design was already observed.
    #[must_use]
    pub fn contains(&self, design: &Design) -> bool {
        self.sequences.contains(design)
    }

    /// Returns a new experiment with `designs` appended as the next batch.
    ///
    /// New rows get batch id `max_batch_id + 1` (0 for an empty
    /// experiment); existing rows are unchanged. `responses` must be given
    /// iff this experiment has observed responses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Responses`] when mixing observed and unobserved
    /// data, or [`Error::LengthMismatch`] for a short response column.
    pub fn append(&self, designs: Vec<Design>, responses: Option<Vec<f64>>) -> Result<Self> {
        let batch_id = self.max_batch_id().map_or(0, |b| b + 1);
        let k = designs.len();

        let responses = match (&self.responses, responses) {
            (Some(old), Some(new)) => {
                check_len("responses", k, new.len())?;
                let mut all = Vec::with_capacity(old.len() + k);
                all.extend_from_slice(old);
                all.extend(new);
                Some(all)
            }
            (None, None) => None,
            (Some(_), None) => return Err(Error::Responses("missing for an observed experiment")),
            (None, Some(_)) => {
                return Err(Error::Responses("given for an unobserved experiment"));
            }
        };

        let mut sequences = Vec::with_capacity(self.len() + k);
        sequences.extend_from_slice(&self.sequences);
        sequences.extend(designs);
        let mut batch_ids = Vec::with_capacity(self.len() + k);
        batch_ids.extend_from_slice(&self.batch_ids);
        batch_ids.extend(core::iter::repeat_n(batch_id, k));

        Ok(Self {
            sequences,
            batch_ids,
            responses,
        })
    }
}

/// Unchecked wire form of [`Experiment`]; deserialization goes through the
/// validating constructors.
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct ExperimentRepr {
    sequences: Vec<Design>,
    batch_ids: Vec<usize>,
    responses: Option<Vec<f64>>,
}

#[cfg(feature = "serde")]
impl TryFrom<ExperimentRepr> for Experiment {
    type Error = Error;

    fn try_from(repr: ExperimentRepr) -> Result<Self> {
        match repr.responses {
            Some(responses) => Self::new(repr.sequences, repr.batch_ids, responses),
            None => Self::unobserved(repr.sequences, repr.batch_ids),
        }
    }
}

fn check_len(field: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(Error::LengthMismatch {
            field,
            expected,
            got,
        })
    }
}

/// Best response observed after each round of a rollout.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResponseCurve {
    best: Vec<f64>,
}

impl ResponseCurve {
    /// Creates an empty curve.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `max(responses)` of the experiment as the next point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Responses`] if the experiment has no observed
    /// responses.
    pub fn record(&mut self, experiment: &Experiment) -> Result<f64> {
        let best = experiment
            .best_response()
            .ok_or(Error::Responses("required to record a response curve"))?;
        self.best.push(best);
        Ok(best)
    }

    /// The recorded points, one per round.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.best
    }
}
