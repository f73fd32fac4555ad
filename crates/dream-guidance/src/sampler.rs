//! Multi-step reverse diffusion for diagnostics and offline generation.
//!
//! Nothing here is part of the training gradient path; every function runs
//! on a plain (non-autodiff) backend.

use burn::prelude::*;
use burn::tensor::Distribution;

use dream_samplers::{apply_guidance, DdimConfig, DdimSampler, NoiseSchedule};

use crate::embedding::PromptEmbedding;
use crate::models::NoisePredictor;

/// Batched classifier-free forward pass: one call, two conditions.
///
/// The latent is duplicated to batch 2 and run jointly against the
/// `[uncond, cond]` embedding rows, then the halves are recombined with the
/// guidance formula.
pub fn predict_guided<B: Backend>(
    predictor: &impl NoisePredictor<B>,
    latent: Tensor<B, 4>,
    timestep: usize,
    embedding: &PromptEmbedding<B>,
    guidance_scale: f64,
) -> Tensor<B, 4> {
    let batched = Tensor::cat(vec![latent.clone(), latent], 0);
    let prediction = predictor.predict(batched, timestep, embedding.stacked());

    let mut halves = prediction.chunk(2, 0).into_iter();
    let uncond = halves.next().unwrap();
    let cond = halves.next().unwrap();

    apply_guidance(uncond, cond, guidance_scale)
}

/// Run the reverse loop from `start_timestep` down to a clean latent.
///
/// A fresh sampler is built per call, so repeated diagnostic denoises cannot
/// leak schedule state into each other or into the training path.
pub fn denoise_fully<B: Backend>(
    predictor: &impl NoisePredictor<B>,
    schedule: &NoiseSchedule,
    embedding: &PromptEmbedding<B>,
    start_latent: Tensor<B, 4>,
    start_timestep: usize,
    steps: usize,
    guidance_scale: f64,
) -> Tensor<B, 4> {
    let sampler = DdimSampler::new(
        schedule,
        &DdimConfig {
            num_inference_steps: steps,
        },
    );

    let mut latents = start_latent;
    for (index, &t) in sampler.timesteps().iter().enumerate() {
        // Rungs above the starting noise level do not apply.
        if t > start_timestep {
            continue;
        }
        let prediction = predict_guided(predictor, latents.clone(), t, embedding, guidance_scale);
        latents = sampler.step(latents, prediction, index);
    }

    latents
}

/// Sample latents from pure noise (the prompt-to-image path).
pub fn sample_latents<B: Backend>(
    predictor: &impl NoisePredictor<B>,
    schedule: &NoiseSchedule,
    embedding: &PromptEmbedding<B>,
    shape: [usize; 4],
    steps: usize,
    guidance_scale: f64,
    device: &B::Device,
) -> Tensor<B, 4> {
    let noise = Tensor::random(shape, Distribution::Normal(0.0, 1.0), device);
    let start = schedule.num_train_steps() - 1;

    denoise_fully(
        predictor,
        schedule,
        embedding,
        noise,
        start,
        steps,
        guidance_scale,
    )
}
