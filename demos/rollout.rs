//! Semi-synthetic rollout: adaptive design versus random design.
//!
//! A hidden pairwise-interaction landscape over DNA 8-mers stands in for a
//! binding-affinity assay. Starting from 30 random measurements, each round
//! picks 10 new sequences either by Thompson sampling or uniformly at random,
//! "measures" them against the hidden landscape, and records the best
//! response so far.
//!
//! Run with: `cargo run --example rollout --release [seed]`

use bayes_oed::prelude::*;

const LENGTH: usize = 8;
const NUM_INITIAL: usize = 30;
const PER_BATCH: usize = 10;
const NUM_BATCHES: usize = 7;

/// Hidden affinity landscape in `[0, 1]`.
struct Landscape {
    coefficients: Coefficients,
}

impl Landscape {
    fn new(schema: &Schema, rng: &mut fastrand::Rng) -> Result<Self> {
        let blocks = schema
            .pairwise_blocks()
            .into_iter()
            .map(|block| {
                let n = block.resolve(schema)?.numel();
                Ok((block, (0..n).map(|_| rng.f64() - 0.5).collect::<Vec<f64>>()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            coefficients: Coefficients::new(schema, blocks, None)?,
        })
    }

    fn measure(&self, design: &Design) -> f64 {
        let x = self.coefficients.linear_response(design.as_slice(), None);
        1.0 / (1.0 + (-x).exp())
    }
}

fn initial_experiment(
    schema: &Schema,
    landscape: &Landscape,
    rng: &mut fastrand::Rng,
) -> Result<Experiment> {
    let designs: Vec<Design> = (0..NUM_INITIAL).map(|_| schema.random_design(rng)).collect();
    let responses = designs.iter().map(|d| landscape.measure(d)).collect();
    Experiment::new(designs, vec![0; NUM_INITIAL], responses)
}

fn rollout<F>(
    label: &str,
    mut experiment: Experiment,
    landscape: &Landscape,
    mut choose: F,
) -> Result<ResponseCurve>
where
    F: FnMut(&Experiment) -> Result<Vec<Design>>,
{
    let mut curve = ResponseCurve::new();
    println!("[{label}] batch 0: best response {:.6}", curve.record(&experiment)?);
    for batch in 1..=NUM_BATCHES {
        let designs = choose(&experiment)?;
        let responses = designs.iter().map(|d| landscape.measure(d)).collect();
        experiment = experiment.append(designs, Some(responses))?;
        println!("[{label}] batch {batch}: best response {:.6}", curve.record(&experiment)?);
    }
    Ok(curve)
}

fn main() -> Result<()> {
    let seed: u64 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let mut rng = fastrand::Rng::with_seed(seed);

    let schema =
        Schema::new((0..LENGTH).map(|i| (format!("Nucleotide{i}"), vec!["A", "C", "G", "T"])))?;
    let landscape = Landscape::new(&schema, &mut rng)?;
    let initial = initial_experiment(&schema, &landscape, &mut rng)?;

    let search = DesignSearch::builder(schema.clone())
        .feature_blocks(schema.pairwise_blocks())
        .design_size(PER_BATCH)
        .temperature(1.0)
        .sa_num_steps(400)
        .inference(Svi::builder().num_steps(1000).log_every(0).build())
        .build()?;

    let start = std::time::Instant::now();
    let oed = rollout("oed", initial.clone(), &landscape, |experiment| {
        Ok(search.thompson_sample(experiment, &mut rng)?.into_iter().collect())
    })?;
    println!("OED rollout took {:.2?}", start.elapsed());

    let mut random_rng = fastrand::Rng::with_seed(seed.wrapping_add(1));
    let random = rollout("random", initial, &landscape, |_| {
        Ok((0..PER_BATCH).map(|_| schema.random_design(&mut random_rng)).collect())
    })?;

    println!();
    println!("batch   oed        random");
    for (i, (a, b)) in oed.values().iter().zip(random.values()).enumerate() {
        println!("{i:>5}   {a:.6}   {b:.6}");
    }
    Ok(())
}
