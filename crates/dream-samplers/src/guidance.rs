//! Classifier-free guidance and score-distillation weighting.

use burn::prelude::*;

/// Combine conditional and unconditional predictions:
/// `uncond + scale * (cond - uncond)`.
pub fn apply_guidance<B: Backend>(
    noise_pred_uncond: Tensor<B, 4>,
    noise_pred_cond: Tensor<B, 4>,
    guidance_scale: f64,
) -> Tensor<B, 4> {
    noise_pred_uncond.clone() + (noise_pred_cond - noise_pred_uncond) * guidance_scale
}

/// Per-timestep weighting applied to the noise residual.
///
/// The score-matching derivation admits more than one weighting; both forms
/// appear in practice, so the choice is configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuidanceWeight {
    /// `w(t) = 1 - alpha_bar_t`, the noise variance at t.
    #[default]
    SigmaSquared,
    /// `w(t) = sqrt(alpha_bar_t) * (1 - alpha_bar_t)`.
    AlphaScaled,
}

impl GuidanceWeight {
    /// Weight value for a given ᾱₜ.
    pub fn value(&self, alpha_cumprod: f32) -> f32 {
        match self {
            GuidanceWeight::SigmaSquared => 1.0 - alpha_cumprod,
            GuidanceWeight::AlphaScaled => alpha_cumprod.sqrt() * (1.0 - alpha_cumprod),
        }
    }
}
