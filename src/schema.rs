//! Categorical schemas, designs, and feature blocks.
//!
//! A [`Schema`] is an ordered list of variables, each with a finite ordered
//! domain of category labels. The order defines the positional encoding of a
//! [`Design`] and the default [`Block`] groupings.
//!
//! # Examples
//!
//! ```
//! use bayes_oed::schema::Schema;
//!
//! let schema = Schema::new(
//!     (0..4).map(|i| (format!("Nucleotide{i}"), vec!["A", "C", "G", "T"])),
//! )
//! .unwrap();
//!
//! assert_eq!(schema.len(), 4);
//! assert_eq!(schema.num_designs(), 256);
//!
//! // Overlapping windows of three consecutive variables.
//! assert_eq!(schema.triple_blocks().len(), 2);
//!
//! let design = schema.encode(&["A", "C", "G", "T"]).unwrap();
//! assert_eq!(design.as_slice(), &[0, 1, 2, 3]);
//! ```

use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An ordered mapping from variable name to its finite ordered domain.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "SchemaRepr"))]
pub struct Schema {
    variables: Vec<(String, Vec<String>)>,
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct SchemaRepr {
    variables: Vec<(String, Vec<String>)>,
}

#[cfg(feature = "serde")]
impl TryFrom<SchemaRepr> for Schema {
    type Error = Error;

    fn try_from(repr: SchemaRepr) -> Result<Self> {
        Self::new(repr.variables)
    }
}

impl Schema {
    /// Creates a schema from `(name, domain)` pairs in positional order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptySchema`] if no variables are given,
    /// [`Error::EmptyDomain`] if a domain has no labels, and
    /// [`Error::DuplicateVariable`] if two variables share a name.
    pub fn new<I, N, D, L>(variables: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, D)>,
        N: Into<String>,
        D: IntoIterator<Item = L>,
        L: Into<String>,
    {
        let variables: Vec<(String, Vec<String>)> = variables
            .into_iter()
            .map(|(name, domain)| (name.into(), domain.into_iter().map(Into::into).collect()))
            .collect();

        if variables.is_empty() {
            return Err(Error::EmptySchema);
        }
        let mut seen = HashSet::with_capacity(variables.len());
        for (name, domain) in &variables {
            if domain.is_empty() {
                return Err(Error::EmptyDomain(name.clone()));
            }
            if !seen.insert(name.as_str()) {
                return Err(Error::DuplicateVariable(name.clone()));
            }
        }
        Ok(Self { variables })
    }

    /// Returns the number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Returns `true` if the schema has no variables (never the case for a
    /// schema built through [`Schema::new`]).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Iterates over variable names in positional order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|(name, _)| name.as_str())
    }

    /// Returns the name of the variable at `position`.
    #[must_use]
    pub fn name(&self, position: usize) -> &str {
        &self.variables[position].0
    }

    /// Returns the domain of the named variable.
    #[must_use]
    pub fn domain(&self, name: &str) -> Option<&[String]> {
        self.index_of(name).map(|i| self.variables[i].1.as_slice())
    }

    /// Returns the domain size of the variable at `position`.
    #[must_use]
    pub fn domain_size(&self, position: usize) -> usize {
        self.variables[position].1.len()
    }

    /// Returns the position of the named variable.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|(n, _)| n == name)
    }

    /// Returns the category index of `label` in the named variable's domain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownVariable`] or [`Error::UnknownLabel`].
    pub fn label_index(&self, name: &str, label: &str) -> Result<usize> {
        let domain = self
            .domain(name)
            .ok_or_else(|| Error::UnknownVariable(name.to_owned()))?;
        domain
            .iter()
            .position(|l| l == label)
            .ok_or_else(|| Error::UnknownLabel {
                variable: name.to_owned(),
                label: label.to_owned(),
            })
    }

    /// Returns the total number of designs, saturating at `usize::MAX`.
    #[must_use]
    pub fn num_designs(&self) -> usize {
        self.variables
            .iter()
            .fold(1usize, |acc, (_, d)| acc.saturating_mul(d.len()))
    }

    /// Encodes a sequence of labels, one per variable, into a [`Design`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::DesignLength`] or [`Error::UnknownLabel`].
    pub fn encode<S: AsRef<str>>(&self, labels: &[S]) -> Result<Design> {
        if labels.len() != self.len() {
            return Err(Error::DesignLength {
                expected: self.len(),
                got: labels.len(),
            });
        }
        labels
            .iter()
            .zip(&self.variables)
            .map(|(label, (name, _))| self.label_index(name, label.as_ref()))
            .collect::<Result<Vec<_>>>()
            .map(Design)
    }

    /// Decodes a design back into its category labels.
    ///
    /// # Errors
    ///
    /// Returns an error if the design does not fit the schema.
    pub fn decode(&self, design: &Design) -> Result<Vec<&str>> {
        self.validate_design(design)?;
        Ok(design
            .0
            .iter()
            .zip(&self.variables)
            .map(|(&i, (_, domain))| domain[i].as_str())
            .collect())
    }

    /// Checks that a design has one in-range category per variable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DesignLength`] or [`Error::CategoryOutOfRange`].
    pub fn validate_design(&self, design: &Design) -> Result<()> {
        if design.len() != self.len() {
            return Err(Error::DesignLength {
                expected: self.len(),
                got: design.len(),
            });
        }
        for (&index, (name, domain)) in design.0.iter().zip(&self.variables) {
            if index >= domain.len() {
                return Err(Error::CategoryOutOfRange {
                    variable: name.clone(),
                    index,
                    size: domain.len(),
                });
            }
        }
        Ok(())
    }

    /// Draws a design uniformly at random.
    #[must_use]
    pub fn random_design(&self, rng: &mut fastrand::Rng) -> Design {
        Design(
            self.variables
                .iter()
                .map(|(_, domain)| rng.usize(0..domain.len()))
                .collect(),
        )
    }

    /// One singleton block per variable.
    #[must_use]
    pub fn singleton_blocks(&self) -> Vec<Block> {
        self.windows(1)
    }

    /// Singleton blocks followed by blocks for adjacent pairs.
    #[must_use]
    pub fn pairwise_blocks(&self) -> Vec<Block> {
        let mut blocks = self.windows(1);
        blocks.extend(self.windows(2));
        blocks
    }

    /// Overlapping windows of three consecutive variables, sliding by one.
    ///
    /// These are the default local-move blocks of the design search. Inner
    /// variables are covered by up to three windows, boundary variables by
    /// fewer. Schemas with fewer than three variables yield one window over
    /// all variables.
    #[must_use]
    pub fn triple_blocks(&self) -> Vec<Block> {
        if self.len() < 3 {
            return vec![Block::new(self.names())];
        }
        self.windows(3)
    }

    /// Every run of `width` consecutive variables; empty when the schema is
    /// shorter than `width`.
    fn windows(&self, width: usize) -> Vec<Block> {
        let names: Vec<&str> = self.names().collect();
        names.windows(width).map(|w| Block::new(w.iter().copied())).collect()
    }
}

/// One candidate instantiation of a schema: a category index per variable.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Design(pub Vec<usize>);

impl Design {
    /// Returns the category indices.
    #[must_use]
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Returns the number of positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the design has no positions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<usize>> for Design {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

/// A group of schema variables whose cross product indexes one coefficient
/// tensor. The empty block is the trivial (intercept) block.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Block(pub Vec<String>);

impl Block {
    /// Creates a block from variable names.
    #[must_use]
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    /// The trivial block spanning no variables.
    #[must_use]
    pub fn trivial() -> Self {
        Self(Vec::new())
    }

    /// Returns `true` for the trivial block.
    #[must_use]
    pub fn is_trivial(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolves names to schema positions and the coefficient shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownVariable`] if a name is not in the schema.
    pub fn resolve(&self, schema: &Schema) -> Result<ResolvedBlock> {
        let positions = self
            .0
            .iter()
            .map(|name| {
                schema
                    .index_of(name)
                    .ok_or_else(|| Error::UnknownVariable(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        let shape = positions.iter().map(|&p| schema.domain_size(p)).collect();
        Ok(ResolvedBlock { positions, shape })
    }
}

/// A block with names resolved to positions, ready for coefficient lookups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedBlock {
    /// Schema positions of the block's variables.
    pub positions: Vec<usize>,
    /// Domain size of each variable, i.e. the coefficient tensor shape.
    pub shape: Vec<usize>,
}

impl ResolvedBlock {
    /// Number of coefficients, the product of the shape (1 for the trivial block).
    #[must_use]
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Row-major flat index of the design's categories in this block.
    #[must_use]
    pub fn flat_index(&self, design: &[usize]) -> usize {
        self.positions
            .iter()
            .zip(&self.shape)
            .fold(0, |acc, (&p, &size)| {
                debug_assert!(design[p] < size, "category out of range");
                acc * size + design[p]
            })
    }

    /// Site suffix built from the block's positions, e.g. `"0_1"`.
    #[must_use]
    pub fn suffix(&self) -> String {
        self.positions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Returns `true` if the block spans the given schema position.
    #[must_use]
    pub fn contains(&self, position: usize) -> bool {
        self.positions.contains(&position)
    }
}
