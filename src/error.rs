/// Errors produced while configuring a model, fitting a posterior, or
/// searching the design space.
///
/// Every variant is fatal to the operation that returned it. The only
/// condition the crate recovers from internally is a rejected proposal
/// during the design search.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a schema has no variables.
    #[error("schema must contain at least one variable")]
    EmptySchema,

    /// Returned when a schema variable has an empty domain.
    #[error("variable '{0}' has an empty domain")]
    EmptyDomain(String),

    /// Returned when two schema variables share a name.
    #[error("duplicate variable name '{0}'")]
    DuplicateVariable(String),

    /// Returned when a block or constraint names a variable not in the schema.
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    /// Returned when a label is not part of a variable's domain.
    #[error("unknown label '{label}' for variable '{variable}'")]
    UnknownLabel {
        /// The variable whose domain was searched.
        variable: String,
        /// The label that was not found.
        label: String,
    },

    /// Returned when a design has the wrong number of positions.
    #[error("design length mismatch: expected {expected} positions, got {got}")]
    DesignLength {
        /// The number of schema variables.
        expected: usize,
        /// The number of positions in the design.
        got: usize,
    },

    /// Returned when a design holds a category index outside its domain.
    #[error("category {index} out of range for variable '{variable}' with {size} choices")]
    CategoryOutOfRange {
        /// The variable at the offending position.
        variable: String,
        /// The offending category index.
        index: usize,
        /// The domain size of the variable.
        size: usize,
    },

    /// Returned when parallel experiment columns have different lengths.
    #[error("length mismatch in '{field}': expected {expected}, got {got}")]
    LengthMismatch {
        /// The column whose length disagrees.
        field: &'static str,
        /// The expected length.
        expected: usize,
        /// The actual length.
        got: usize,
    },

    /// Returned when a model that needs observed responses is given none,
    /// or observed and unobserved experiments are mixed.
    #[error("responses are {0}")]
    Responses(&'static str),

    /// Returned when a `unit_interval` response lies outside `[0, 1]`, or a
    /// response is not finite.
    #[error("response {value} at row {row} is invalid for this response type")]
    InvalidResponse {
        /// The row index in the experiment.
        row: usize,
        /// The offending value.
        value: f64,
    },

    /// Returned for an unrecognized response type.
    #[error("unknown response type '{0}', expected 'real' or 'unit_interval'")]
    UnknownResponseType(String),

    /// Returned when a configuration value is outside its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Returned when fitting produced no posterior draws.
    #[error("posterior sample set is empty")]
    EmptyPosterior,

    /// Returned when the variational objective became non-finite.
    #[error("non-finite loss at svi step {step}")]
    NonFiniteLoss {
        /// The optimizer step at which the loss diverged.
        step: usize,
    },

    /// Returned when a covariance factorization of the guide failed.
    #[error("cholesky factorization failed")]
    CholeskyFailed,

    /// Returned when no feasible seed design could be found.
    #[error("no feasible design found after {0} tries")]
    NoFeasibleDesign(usize),

    /// Returned when the search visited too few distinct feasible designs.
    #[error("requested {requested} designs but only {found} distinct feasible designs were visited")]
    InsufficientDesigns {
        /// The requested batch size.
        requested: usize,
        /// The number of distinct feasible designs visited.
        found: usize,
    },
}

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, Error>;
