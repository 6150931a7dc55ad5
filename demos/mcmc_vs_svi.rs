//! Compares the two fitting strategies on the same data.
//!
//! Fits a singleton-block regression to noisy measurements of a known
//! additive landscape with both SVI and HMC, then reports how well each
//! posterior recovers the per-position effects and how long it took.
//!
//! Run with: `cargo run --example mcmc_vs_svi --release`

use std::time::Instant;

use bayes_oed::prelude::*;

fn main() -> Result<()> {
    let mut rng = fastrand::Rng::with_seed(7);
    let schema = Schema::new((0..4).map(|i| (format!("p{i}"), vec!["A", "C", "G", "T"])))?;

    // True effect of each letter, shared by every position.
    let effect = [0.0, 0.5, -0.5, 1.0];
    let designs: Vec<Design> = (0..80).map(|_| schema.random_design(&mut rng)).collect();
    let responses = designs
        .iter()
        .map(|d| d.0.iter().map(|&c| effect[c]).sum::<f64>() + 0.1 * (rng.f64() - 0.5))
        .collect();
    let experiment = Experiment::new(designs, vec![0; 80], responses)?;
    let model = Model::builder(&schema, &experiment)
        .response_type(ResponseType::Real)
        .build()?;

    let strategies: [(&str, InferenceKind); 2] = [
        ("svi", Svi::builder().num_steps(2000).lr(0.02).log_every(500).build().into()),
        ("mcmc", Mcmc::builder().num_samples(500).warmup_steps(500).build().into()),
    ];

    for (name, strategy) in strategies {
        let start = Instant::now();
        let sampler = strategy.fit(&model, &mut rng)?;
        let elapsed = start.elapsed();

        // Posterior mean contrast of each letter against "A" at position 0.
        let draws: u32 = 500;
        let mut contrast = [0.0; 4];
        for _ in 0..draws {
            let coefs = sampler.sample(&mut rng).coefficients();
            let base = coefs.linear_response(&[0, 0, 0, 0], None);
            for (letter, c) in contrast.iter_mut().enumerate() {
                *c += coefs.linear_response(&[letter, 0, 0, 0], None) - base;
            }
        }
        println!("{name:>4} ({elapsed:.2?}):");
        for (letter, c) in contrast.iter().enumerate() {
            println!(
                "  {}  estimated {:+.3}  true {:+.3}",
                schema.domain("p0").map_or("?", |d| d[letter].as_str()),
                c / f64::from(draws),
                effect[letter]
            );
        }
    }
    Ok(())
}
