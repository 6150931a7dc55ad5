#![allow(
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation
)]

mod coefficients;
mod layout;
mod simulate;

use bayes_oed::experiment::Experiment;
use bayes_oed::schema::{Design, Schema};

/// Four positions over a DNA alphabet.
pub fn dna_schema() -> Schema {
    Schema::new((0..4).map(|i| (format!("p{i}"), vec!["A", "C", "G", "T"])))
        .expect("valid schema")
}

/// A small observed experiment over [`dna_schema`] in `batches` batches.
pub fn dna_experiment(batches: usize) -> Experiment {
    let designs = vec![
        Design(vec![0, 1, 2, 3]),
        Design(vec![3, 3, 0, 1]),
        Design(vec![1, 0, 1, 0]),
        Design(vec![2, 2, 2, 2]),
        Design(vec![0, 0, 3, 1]),
        Design(vec![1, 3, 2, 0]),
    ];
    let ids = (0..designs.len()).map(|i| i % batches).collect();
    Experiment::new(designs, ids, vec![0.1, 0.4, 0.35, 0.9, 0.0, 0.6]).expect("valid experiment")
}
