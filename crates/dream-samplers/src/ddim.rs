//! Deterministic DDIM-style reverse-diffusion step.

use burn::prelude::*;

use crate::schedule::NoiseSchedule;

/// DDIM sampler configuration.
#[derive(Debug, Clone)]
pub struct DdimConfig {
    /// Number of inference steps.
    pub num_inference_steps: usize,
}

impl Default for DdimConfig {
    fn default() -> Self {
        Self {
            num_inference_steps: 50,
        }
    }
}

/// Deterministic reverse-diffusion stepper.
///
/// Each instance precomputes its own timestep ladder from the training
/// schedule; nothing is shared or mutated between sampling runs.
pub struct DdimSampler {
    alphas_cumprod: Vec<f32>,
    timesteps: Vec<usize>,
}

impl DdimSampler {
    /// Create a sampler over `config.num_inference_steps` evenly spaced steps.
    ///
    /// The step count is clamped to `[1, num_train_steps]`.
    pub fn new(schedule: &NoiseSchedule, config: &DdimConfig) -> Self {
        let n = schedule.num_train_steps();
        let steps = config.num_inference_steps.clamp(1, n);
        let step_ratio = n / steps;
        let timesteps = (0..steps)
            .rev()
            .map(|i| (i * step_ratio).min(n - 1))
            .collect();

        Self {
            alphas_cumprod: schedule.alphas_cumprod().to_vec(),
            timesteps,
        }
    }

    /// Timestep ladder, highest noise first.
    pub fn timesteps(&self) -> &[usize] {
        &self.timesteps
    }

    /// One reverse step from `timesteps[index]` toward the next rung.
    pub fn step<B: Backend>(
        &self,
        latent: Tensor<B, 4>,
        noise_pred: Tensor<B, 4>,
        index: usize,
    ) -> Tensor<B, 4> {
        let t = self.timesteps[index];
        let t_prev = self.timesteps.get(index + 1).copied();
        self.step_between(latent, noise_pred, t, t_prev)
    }

    /// One reverse step between two explicit timesteps.
    ///
    /// `t_prev = None` denotes the fully denoised endpoint (ᾱ = 1).
    pub fn step_between<B: Backend>(
        &self,
        latent: Tensor<B, 4>,
        noise_pred: Tensor<B, 4>,
        t: usize,
        t_prev: Option<usize>,
    ) -> Tensor<B, 4> {
        let alpha_t = self.alphas_cumprod[t] as f64;
        let alpha_prev = t_prev.map_or(1.0, |p| self.alphas_cumprod[p] as f64);

        // x0 = (x_t - sqrt(1 - a_t) * eps) / sqrt(a_t)
        let pred_x0 =
            (latent - noise_pred.clone() * (1.0 - alpha_t).sqrt()) / alpha_t.sqrt();

        // x_prev = sqrt(a_prev) * x0 + sqrt(1 - a_prev) * eps
        pred_x0 * alpha_prev.sqrt() + noise_pred * (1.0 - alpha_prev).sqrt()
    }
}
