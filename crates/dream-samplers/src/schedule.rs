//! Forward-diffusion noise schedule and timestep sampling.

use burn::prelude::*;
use burn::tensor::Distribution;

/// Beta spacing of the forward schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BetaSchedule {
    /// Betas interpolated linearly between start and end.
    Linear,
    /// Betas interpolated linearly in sqrt space, then squared (SD 1.x).
    #[default]
    ScaledLinear,
}

/// Precomputed cumulative alpha products for every training timestep.
///
/// The values live on the host: every consumer needs them as scalars
/// (per-step weights, DDIM coefficients), never as device tensors.
#[derive(Debug, Clone)]
pub struct NoiseSchedule {
    alphas_cumprod: Vec<f32>,
    num_train_steps: usize,
}

impl NoiseSchedule {
    /// Build a schedule from beta bounds and spacing.
    ///
    /// Step counts below one are clamped to one.
    pub fn new(num_steps: usize, beta_start: f64, beta_end: f64, spacing: BetaSchedule) -> Self {
        let num_steps = num_steps.max(1);
        let denom = (num_steps - 1).max(1) as f64;
        let betas = (0..num_steps).map(|i| {
            let t = i as f64 / denom;
            match spacing {
                BetaSchedule::Linear => beta_start + t * (beta_end - beta_start),
                BetaSchedule::ScaledLinear => {
                    let b = beta_start.sqrt() + t * (beta_end.sqrt() - beta_start.sqrt());
                    b * b
                }
            }
        });

        let mut alphas_cumprod = Vec::with_capacity(num_steps);
        let mut cumprod = 1.0f64;
        for beta in betas {
            cumprod *= 1.0 - beta;
            alphas_cumprod.push(cumprod as f32);
        }

        Self {
            alphas_cumprod,
            num_train_steps: num_steps,
        }
    }

    /// The SD 1.x training schedule (1000 steps, scaled-linear betas).
    pub fn sd1x() -> Self {
        Self::new(1000, 0.00085, 0.012, BetaSchedule::ScaledLinear)
    }

    /// Number of training timesteps.
    pub fn num_train_steps(&self) -> usize {
        self.num_train_steps
    }

    /// ᾱₜ at a specific timestep.
    pub fn alpha_cumprod(&self, t: usize) -> f32 {
        self.alphas_cumprod[t]
    }

    /// All ᾱ values, indexed by timestep.
    pub fn alphas_cumprod(&self) -> &[f32] {
        &self.alphas_cumprod
    }

    /// Forward diffusion: `xₜ = √ᾱₜ·x₀ + √(1−ᾱₜ)·ε`.
    pub fn add_noise<B: Backend>(
        &self,
        sample: Tensor<B, 4>,
        noise: Tensor<B, 4>,
        t: usize,
    ) -> Tensor<B, 4> {
        let alpha = self.alphas_cumprod[t] as f64;
        sample * alpha.sqrt() + noise * (1.0 - alpha).sqrt()
    }
}

/// Mid-range timestep band for guidance sampling.
///
/// Score distillation skips the extreme tails of the schedule, where the
/// noise level is numerically degenerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestepBand {
    pub min_step: usize,
    pub max_step: usize,
}

impl TimestepBand {
    /// Band covering `[low·N, high·N]` of an N-step schedule.
    pub fn new(num_train_steps: usize, low: f64, high: f64) -> Self {
        Self {
            min_step: (num_train_steps as f64 * low) as usize,
            max_step: (num_train_steps as f64 * high) as usize,
        }
    }

    /// Draw a uniform timestep in `[min_step, max_step]`.
    ///
    /// Reproducible only when the caller has seeded the backend RNG.
    pub fn sample<B: Backend>(&self, device: &B::Device) -> usize {
        let draw: Tensor<B, 1> = Tensor::random(
            [1],
            Distribution::Uniform(self.min_step as f64, (self.max_step + 1) as f64),
            device,
        );
        let value = draw.into_data().to_vec::<f32>().unwrap()[0];
        (value as usize).clamp(self.min_step, self.max_step)
    }
}
