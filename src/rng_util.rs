/// Generate a random `f64` in the range `[low, high)`.
#[inline]
pub(crate) fn f64_range(rng: &mut fastrand::Rng, low: f64, high: f64) -> f64 {
    low + rng.f64() * (high - low)
}

/// Sample a value from the standard normal distribution using the Box-Muller transform.
#[inline]
pub(crate) fn standard_normal(rng: &mut fastrand::Rng) -> f64 {
    // 1 - u keeps the log argument in (0, 1]
    let u1 = 1.0 - rng.f64();
    let u2 = rng.f64();
    (-2.0 * u1.ln()).sqrt() * (core::f64::consts::TAU * u2).cos()
}

/// Sample from `Normal(loc, scale)`.
#[inline]
pub(crate) fn normal(rng: &mut fastrand::Rng, loc: f64, scale: f64) -> f64 {
    loc + scale * standard_normal(rng)
}

/// Sample from `Binomial(n, p)` as a sum of Bernoulli trials.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn binomial(rng: &mut fastrand::Rng, n: u32, p: f64) -> f64 {
    (0..n).filter(|_| rng.f64() < p).count() as f64
}

/// Numerically stable `ln(1 + exp(x))`.
#[inline]
pub(crate) fn softplus(x: f64) -> f64 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

/// Numerically stable logistic sigmoid.
#[inline]
pub(crate) fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_normal_moments() {
        let mut rng = fastrand::Rng::with_seed(7);
        let n: u32 = 20_000;
        let draws: Vec<f64> = (0..n).map(|_| standard_normal(&mut rng)).collect();
        let mean = draws.iter().sum::<f64>() / f64::from(n);
        let var = draws.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / f64::from(n);
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 1.0).abs() < 0.05, "var {var}");
    }

    #[test]
    fn binomial_is_bounded() {
        let mut rng = fastrand::Rng::with_seed(3);
        for _ in 0..100 {
            let k = binomial(&mut rng, 100, 0.3);
            assert!((0.0..=100.0).contains(&k));
        }
    }

    #[test]
    fn softplus_and_sigmoid_are_stable() {
        assert!((softplus(0.0) - 2f64.ln()).abs() < 1e-12);
        assert!((softplus(800.0) - 800.0).abs() < 1e-9);
        assert!(softplus(-800.0) >= 0.0);
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(-800.0).is_finite());
        assert!((sigmoid(800.0) - 1.0).abs() < 1e-12);
    }
}
