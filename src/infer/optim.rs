//! First-order optimizer for variational fitting.

/// Adam with elementwise gradient clipping and geometric learning-rate decay.
///
/// The learning rate is multiplied by `lrd` at the start of every step, so
/// after `n` steps it equals `lr * lrd^n`.
#[derive(Clone, Debug)]
pub(crate) struct ClippedAdam {
    lr: f64,
    lrd: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    clip: f64,
    step: i32,
    exp_avg: Vec<f64>,
    exp_avg_sq: Vec<f64>,
}

impl ClippedAdam {
    pub(crate) fn new(dim: usize, lr: f64, lrd: f64) -> Self {
        Self {
            lr,
            lrd,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            clip: 10.0,
            step: 0,
            exp_avg: vec![0.0; dim],
            exp_avg_sq: vec![0.0; dim],
        }
    }

    /// Current learning rate.
    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    pub(crate) fn lr(&self) -> f64 {
        self.lr
    }

    /// Takes one descent step on `params` along the loss gradient `grad`.
    pub(crate) fn step(&mut self, params: &mut [f64], grad: &[f64]) {
        debug_assert_eq!(params.len(), self.exp_avg.len());
        self.lr *= self.lrd;
        self.step = self.step.saturating_add(1);
        let bias1 = 1.0 - self.beta1.powi(self.step);
        let bias2 = 1.0 - self.beta2.powi(self.step);
        let step_size = self.lr * bias2.sqrt() / bias1;

        for (((p, &g), m), v) in params
            .iter_mut()
            .zip(grad)
            .zip(&mut self.exp_avg)
            .zip(&mut self.exp_avg_sq)
        {
            let g = g.clamp(-self.clip, self.clip);
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
            *p -= step_size * *m / (v.sqrt() + self.eps);
        }
    }
}
