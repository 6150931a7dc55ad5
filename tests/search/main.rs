#![allow(
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation
)]

mod end_to_end;
mod feasibility;
mod temperature;

use bayes_oed::infer::Svi;

/// A short variational fit that keeps the tests fast.
pub fn quick_svi() -> Svi {
    Svi::builder().num_steps(60).log_every(0).build()
}
