//! Hard constraints over candidate designs.
//!
//! A design is feasible iff every constraint in a [`Constraints`] set is
//! satisfied. Any `Fn(&Schema, &Design) -> bool` closure is a constraint; a
//! small vocabulary of common predicates is provided for convenience.
//!
//! # Examples
//!
//! ```
//! use bayes_oed::constraints::{AllDifferent, Constraints, TakesValue};
//! use bayes_oed::schema::{Design, Schema};
//!
//! let schema = Schema::new([("a", vec!["x", "y"]), ("b", vec!["x", "y"])]).unwrap();
//! let constraints = Constraints::new()
//!     .with(AllDifferent::new(&schema, ["a", "b"]).unwrap())
//!     .with(TakesValue::new(&schema, "a", "y").unwrap());
//!
//! assert!(constraints.is_feasible(&schema, &Design(vec![1, 0])));
//! assert!(!constraints.is_feasible(&schema, &Design(vec![1, 1])));
//! ```

use crate::error::{Error, Result};
use crate::schema::{Design, Schema};

/// A predicate over a candidate design.
pub trait Constraint: Send + Sync {
    /// Returns `true` if the design satisfies this constraint.
    fn is_satisfied(&self, schema: &Schema, design: &Design) -> bool;
}

impl<F> Constraint for F
where
    F: Fn(&Schema, &Design) -> bool + Send + Sync,
{
    fn is_satisfied(&self, schema: &Schema, design: &Design) -> bool {
        self(schema, design)
    }
}

/// A conjunction of constraints.
#[derive(Default)]
pub struct Constraints {
    items: Vec<Box<dyn Constraint>>,
}

impl Constraints {
    /// Creates an empty set; every design is feasible.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a constraint.
    #[must_use]
    pub fn with(mut self, constraint: impl Constraint + 'static) -> Self {
        self.items.push(Box::new(constraint));
        self
    }

    /// Adds a constraint in place.
    pub fn push(&mut self, constraint: impl Constraint + 'static) {
        self.items.push(Box::new(constraint));
    }

    /// Number of constraints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if there are no constraints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns `true` if every constraint holds.
    #[must_use]
    pub fn is_feasible(&self, schema: &Schema, design: &Design) -> bool {
        self.items.iter().all(|c| c.is_satisfied(schema, design))
    }
}

impl core::fmt::Debug for Constraints {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Constraints")
            .field("len", &self.items.len())
            .finish()
    }
}

fn position(schema: &Schema, name: &str) -> Result<usize> {
    schema
        .index_of(name)
        .ok_or_else(|| Error::UnknownVariable(name.to_owned()))
}

/// The named variable takes one specific label.
#[derive(Clone, Debug)]
pub struct TakesValue {
    position: usize,
    category: usize,
}

impl TakesValue {
    /// # Errors
    ///
    /// Returns an error if the variable or label is unknown.
    pub fn new(schema: &Schema, name: &str, label: &str) -> Result<Self> {
        Ok(Self {
            position: position(schema, name)?,
            category: schema.label_index(name, label)?,
        })
    }
}

impl Constraint for TakesValue {
    fn is_satisfied(&self, _schema: &Schema, design: &Design) -> bool {
        design.0[self.position] == self.category
    }
}

/// The named variable takes one of several labels.
#[derive(Clone, Debug)]
pub struct TakesValues {
    position: usize,
    categories: Vec<usize>,
}

impl TakesValues {
    /// # Errors
    ///
    /// Returns an error if the variable or any label is unknown.
    pub fn new<S: AsRef<str>>(schema: &Schema, name: &str, labels: &[S]) -> Result<Self> {
        let categories = labels
            .iter()
            .map(|l| schema.label_index(name, l.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            position: position(schema, name)?,
            categories,
        })
    }
}

impl Constraint for TakesValues {
    fn is_satisfied(&self, _schema: &Schema, design: &Design) -> bool {
        self.categories.contains(&design.0[self.position])
    }
}

/// The named variables all take pairwise different labels.
///
/// Labels are compared by text, so variables with different domains can be
/// constrained together.
#[derive(Clone, Debug)]
pub struct AllDifferent {
    positions: Vec<usize>,
}

impl AllDifferent {
    /// # Errors
    ///
    /// Returns [`Error::UnknownVariable`] if a name is not in the schema.
    pub fn new<I, S>(schema: &Schema, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let positions = names
            .into_iter()
            .map(|n| position(schema, n.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { positions })
    }
}

impl Constraint for AllDifferent {
    fn is_satisfied(&self, schema: &Schema, design: &Design) -> bool {
        let label = |p: usize| {
            schema
                .domain(schema.name(p))
                .map(|d| d[design.0[p]].as_str())
        };
        self.positions.iter().enumerate().all(|(i, &a)| {
            self.positions[i + 1..]
                .iter()
                .all(|&b| label(a) != label(b))
        })
    }
}

/// Negation of a constraint.
pub struct Not(pub Box<dyn Constraint>);

impl Constraint for Not {
    fn is_satisfied(&self, schema: &Schema, design: &Design) -> bool {
        !self.0.is_satisfied(schema, design)
    }
}

/// Both constraints hold.
pub struct And(pub Box<dyn Constraint>, pub Box<dyn Constraint>);

impl Constraint for And {
    fn is_satisfied(&self, schema: &Schema, design: &Design) -> bool {
        self.0.is_satisfied(schema, design) && self.1.is_satisfied(schema, design)
    }
}

/// At least one constraint holds.
pub struct Or(pub Box<dyn Constraint>, pub Box<dyn Constraint>);

impl Constraint for Or {
    fn is_satisfied(&self, schema: &Schema, design: &Design) -> bool {
        self.0.is_satisfied(schema, design) || self.1.is_satisfied(schema, design)
    }
}

/// If the first constraint holds, so must the second.
pub struct IfThen(pub Box<dyn Constraint>, pub Box<dyn Constraint>);

impl Constraint for IfThen {
    fn is_satisfied(&self, schema: &Schema, design: &Design) -> bool {
        !self.0.is_satisfied(schema, design) || self.1.is_satisfied(schema, design)
    }
}
