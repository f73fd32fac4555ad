//! The per-iteration guidance step.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Distribution;
use thiserror::Error;

use dream_samplers::{
    BetaSchedule, DdimConfig, DdimSampler, GuidanceWeight, NoiseSchedule, TimestepBand,
};

use crate::embedding::PromptEmbedding;
use crate::latent::{decode_latents, encode_image, resize_render, LATENT_CHANNELS};
use crate::models::{LatentDecoder, LatentEncoder, NoisePredictor, TokenizerError};
use crate::sampler::{denoise_fully, predict_guided};
use crate::snapshot::{Direction, SnapshotKind, SnapshotWriter};

#[derive(Error, Debug)]
pub enum GuidanceError {
    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),

    #[error("rendered image must be [batch, 3, h, w], got {got:?}")]
    BadRenderShape { got: [usize; 4] },
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct GuidanceConfig {
    /// Training timesteps of the pretrained schedule.
    pub num_train_steps: usize,
    /// Fraction band for timestep sampling; the tails are excluded.
    pub timestep_range: (f64, f64),
    /// Guidance scale for training steps. Far above the image-generation
    /// default: the scale sharpens the gradient here, not a final image.
    pub guidance_scale: f64,
    /// Residual weighting variant.
    pub weight: GuidanceWeight,
    /// Inference steps for the `final_denoised` diagnostic.
    pub diagnostic_steps: usize,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            num_train_steps: 1000,
            timestep_range: (0.02, 0.98),
            guidance_scale: 100.0,
            weight: GuidanceWeight::default(),
            diagnostic_steps: 25,
        }
    }
}

/// Output of one guidance step.
///
/// The loss value is a placeholder for callers that expect a scalar; the
/// synthesized gradient inside `grads` is the real product. Read it off the
/// render tensor with `Tensor::grad`.
pub struct GuidanceOutput<B: AutodiffBackend> {
    pub loss: f32,
    /// The timestep drawn for this step.
    pub timestep: usize,
    pub grads: B::Gradients,
}

/// Score-distillation guidance engine.
///
/// Owns the schedule, the injected frozen models and the snapshot state.
/// One instance serves one training loop; calls are strictly sequential.
pub struct GuidanceEngine<B, E, D, P>
where
    B: AutodiffBackend,
    E: LatentEncoder<B>,
    D: LatentDecoder<B::InnerBackend>,
    P: NoisePredictor<B::InnerBackend>,
{
    config: GuidanceConfig,
    schedule: NoiseSchedule,
    band: TimestepBand,
    encoder: E,
    decoder: D,
    predictor: P,
    snapshots: Option<SnapshotWriter>,
    device: B::Device,
}

impl<B, E, D, P> GuidanceEngine<B, E, D, P>
where
    B: AutodiffBackend,
    E: LatentEncoder<B>,
    D: LatentDecoder<B::InnerBackend>,
    P: NoisePredictor<B::InnerBackend>,
{
    pub fn new(config: GuidanceConfig, encoder: E, decoder: D, predictor: P, device: B::Device) -> Self {
        let schedule = NoiseSchedule::new(
            config.num_train_steps,
            0.00085,
            0.012,
            BetaSchedule::ScaledLinear,
        );
        let band = TimestepBand::new(
            config.num_train_steps,
            config.timestep_range.0,
            config.timestep_range.1,
        );

        Self {
            config,
            schedule,
            band,
            encoder,
            decoder,
            predictor,
            snapshots: None,
            device,
        }
    }

    /// Enable diagnostic frame dumps.
    pub fn with_snapshots(mut self, writer: SnapshotWriter) -> Self {
        self.snapshots = Some(writer);
        self
    }

    pub fn config(&self) -> &GuidanceConfig {
        &self.config
    }

    pub fn schedule(&self) -> &NoiseSchedule {
        &self.schedule
    }

    /// One guidance step.
    ///
    /// Encodes the render into latent space, perturbs it at a random
    /// mid-range timestep, obtains a guided noise prediction from the frozen
    /// network and injects the weighted residual as the latent gradient.
    /// Must be called at most once per training iteration; the engine shares
    /// mutable snapshot state and is not safe for concurrent use.
    pub fn train_step(
        &mut self,
        embedding: &PromptEmbedding<B::InnerBackend>,
        rendered: Tensor<B, 4>,
        iteration: usize,
        direction: Direction,
    ) -> Result<GuidanceOutput<B>, GuidanceError> {
        let dims = rendered.dims();
        if dims[1] != 3 {
            return Err(GuidanceError::BadRenderShape { got: dims });
        }

        let capture = match &mut self.snapshots {
            Some(writer) => writer.admit(direction, iteration),
            None => false,
        };

        let rgb = resize_render(rendered);

        // Timestep in the mid-range band; extreme noise levels degenerate.
        let t = self.band.sample::<B::InnerBackend>(&self.device);

        // The encode is the only gradient-tracked segment.
        let latents = encode_image(&self.encoder, rgb.clone());
        debug_assert_eq!(latents.dims()[1], LATENT_CHANNELS);

        // Everything from here to the gradient injection treats the
        // diffusion model as a fixed black box.
        let latents_frozen = latents.clone().inner();
        let noise = Tensor::random(
            latents_frozen.dims(),
            Distribution::Normal(0.0, 1.0),
            &self.device,
        );
        let latents_noisy = self.schedule.add_noise(latents_frozen.clone(), noise.clone(), t);

        let prediction = predict_guided(
            &self.predictor,
            latents_noisy.clone(),
            t,
            embedding,
            self.config.guidance_scale,
        );

        if capture {
            self.dump_frames(
                embedding,
                direction,
                iteration,
                t,
                rgb.inner(),
                &latents_frozen,
                &latents_noisy,
                &noise,
                &prediction,
            );
        }

        let weight = self.config.weight.value(self.schedule.alpha_cumprod(t));
        let grad = synthesize_gradient(prediction, noise, weight);

        // Manual injection: backward a surrogate whose gradient w.r.t. the
        // latents is exactly `grad`. The true objective never materializes
        // as a scalar, and no gradient flows through the noise predictor.
        let grad = Tensor::<B, 4>::from_inner(grad);
        let surrogate = (latents * grad).sum();
        let grads = surrogate.backward();

        Ok(GuidanceOutput {
            loss: 0.0,
            timestep: t,
            grads,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn dump_frames(
        &self,
        embedding: &PromptEmbedding<B::InnerBackend>,
        direction: Direction,
        iteration: usize,
        t: usize,
        rgb: Tensor<B::InnerBackend, 4>,
        latents: &Tensor<B::InnerBackend, 4>,
        latents_noisy: &Tensor<B::InnerBackend, 4>,
        noise: &Tensor<B::InnerBackend, 4>,
        prediction: &Tensor<B::InnerBackend, 4>,
    ) {
        let Some(writer) = &self.snapshots else {
            return;
        };
        let decoder = &self.decoder;
        let save = |kind: SnapshotKind, image: Tensor<B::InnerBackend, 4>| {
            writer.save(direction, kind, iteration, image);
        };

        save(SnapshotKind::Nerf, rgb);
        save(SnapshotKind::Noisy, decode_latents(decoder, latents_noisy.clone()));
        save(SnapshotKind::Noise, decode_latents(decoder, noise.clone()));

        // One reverse step toward t-1.
        let sampler = DdimSampler::new(
            &self.schedule,
            &DdimConfig {
                num_inference_steps: self.config.diagnostic_steps,
            },
        );
        let previous = sampler.step_between(
            latents.clone(),
            prediction.clone(),
            t,
            Some(t.saturating_sub(1)),
        );
        save(SnapshotKind::Denoised, decode_latents(decoder, previous));

        // What the current latent would fully denoise to.
        let final_latents = denoise_fully(
            &self.predictor,
            &self.schedule,
            embedding,
            latents.clone(),
            t,
            self.config.diagnostic_steps,
            self.config.guidance_scale,
        );
        save(
            SnapshotKind::FinalDenoised,
            decode_latents(decoder, final_latents),
        );

        let noisy_pred = self.schedule.add_noise(latents.clone(), prediction.clone(), t);
        save(SnapshotKind::NoisyPred, decode_latents(decoder, noisy_pred));

        let residual = prediction.clone() - noise.clone();
        let residual_applied = self.schedule.add_noise(latents.clone(), residual.clone(), t);
        save(
            SnapshotKind::Residual,
            decode_latents(decoder, residual_applied),
        );
        save(
            SnapshotKind::PredNoise,
            decode_latents(decoder, prediction.clone()),
        );
        save(
            SnapshotKind::ResidualNoise,
            decode_latents(decoder, residual),
        );
    }
}

/// Weighted residual with non-finite entries zeroed.
///
/// `w * (eps_pred - eps)` is the analytical gradient of the distillation
/// objective with respect to the latent; NaN/Inf entries are silently
/// replaced so a single bad prediction cannot poison the renderer.
pub fn synthesize_gradient<B: Backend>(
    noise_pred: Tensor<B, 4>,
    noise: Tensor<B, 4>,
    weight: f32,
) -> Tensor<B, 4> {
    let grad = (noise_pred - noise) * weight as f64;
    let nan = grad.clone().is_nan();
    let inf = grad.clone().abs().equal_elem(f32::INFINITY);
    grad.mask_fill(nan, 0.0).mask_fill(inf, 0.0)
}
