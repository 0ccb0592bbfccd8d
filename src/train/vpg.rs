//! Vanilla policy gradient
//!
//! One ascent step per iteration on the likelihood-ratio surrogate
//!
//! ```text
//! L(θ) = mean_t [ log π_θ(a_t | s_t) · A_t ]
//! ∇L   = mean_t [ ∇θ log π_θ(a_t | s_t) · A_t ]
//! ```
//!
//! over every real step of the batch (padding is skipped for recurrent
//! layouts). The step is clipped to `max_grad_norm`.

use anyhow::Result;

use super::optimizer::PolicyOptimizer;
use crate::{
    logger::LogContext,
    policy::DifferentiablePolicy,
    process::{SampleTensors, SamplesData},
};

/// Plain gradient-ascent optimizer over the flat parameter vector
#[derive(Debug, Clone)]
pub struct VanillaPolicyGradient {
    learning_rate: f64,
    max_grad_norm: f64,
}

impl VanillaPolicyGradient {
    /// Create an optimizer with the given step size
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate, max_grad_norm: f64::INFINITY }
    }

    /// Clip the gradient to this L2 norm
    pub fn max_grad_norm(mut self, norm: f64) -> Self {
        self.max_grad_norm = norm;
        self
    }
}

/// `(observation, action, advantage)` for every real step
fn steps(tensors: &SampleTensors) -> Vec<(&[f32], &[f32], f32)> {
    match tensors {
        SampleTensors::Flat(b) => b
            .observations
            .iter()
            .zip(&b.actions)
            .zip(&b.advantages)
            .map(|((o, a), &adv)| (o.as_slice(), a.as_slice(), adv))
            .collect(),
        SampleTensors::Padded(b) => {
            let mut out = Vec::new();
            for (p, valid) in b.valids.iter().enumerate() {
                for (t, &v) in valid.iter().enumerate() {
                    if v {
                        out.push((b.observations[p][t].as_slice(), b.actions[p][t].as_slice(), b.advantages[p][t]));
                    }
                }
            }
            out
        }
    }
}

fn surrogate<P: DifferentiablePolicy + ?Sized>(policy: &P, steps: &[(&[f32], &[f32], f32)]) -> f64 {
    if steps.is_empty() {
        return 0.0;
    }
    let total: f64 = steps
        .iter()
        .map(|(o, a, adv)| policy.log_likelihood(o, a) as f64 * *adv as f64)
        .sum();
    total / steps.len() as f64
}

impl<P: DifferentiablePolicy + ?Sized> PolicyOptimizer<P> for VanillaPolicyGradient {
    fn optimize_policy(&mut self, _itr: usize, policy: &mut P, samples: &SamplesData, log: &mut LogContext) -> Result<()> {
        let steps = steps(&samples.tensors);
        if steps.is_empty() {
            return Ok(());
        }

        let mut params = policy.get_param_values();
        let mut grad = vec![0.0f64; params.len()];
        for (o, a, adv) in &steps {
            for (g, s) in grad.iter_mut().zip(policy.grad_log_likelihood(o, a)) {
                *g += s as f64 * *adv as f64;
            }
        }
        let n = steps.len() as f64;
        grad.iter_mut().for_each(|g| *g /= n);

        let norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();
        let clip = if norm > self.max_grad_norm { self.max_grad_norm / norm } else { 1.0 };

        let before = surrogate(policy, &steps);
        for (p, g) in params.iter_mut().zip(&grad) {
            *p += (self.learning_rate * clip * g) as f32;
        }
        policy.set_param_values(&params)?;
        let after = surrogate(policy, &steps);

        log.record_tabular("GradNorm", norm);
        log.record_tabular("SurrogateBefore", before);
        log.record_tabular("SurrogateAfter", after);
        Ok(())
    }
}
