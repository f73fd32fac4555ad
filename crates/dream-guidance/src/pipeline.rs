//! Standalone prompt-to-image generation.
//!
//! Offline path over the same injected models: embed a prompt pair, run the
//! full reverse loop from pure noise, decode, quantize. Nothing here touches
//! the training gradient path.

use burn::prelude::*;

use dream_samplers::NoiseSchedule;

use crate::embedding::PromptEmbedding;
use crate::engine::GuidanceError;
use crate::latent::{decode_latents, to_rgb8, LATENT_CHANNELS, LATENT_DOWNSCALE};
use crate::models::{LatentDecoder, NoisePredictor, PromptTokenizer, TextEncoder};
use crate::sampler::sample_latents;

/// Prompt-to-image settings.
#[derive(Debug, Clone)]
pub struct Txt2ImgConfig {
    pub height: usize,
    pub width: usize,
    pub steps: usize,
    pub guidance_scale: f64,
    /// Token length the text encoder expects.
    pub max_tokens: usize,
}

impl Default for Txt2ImgConfig {
    fn default() -> Self {
        Self {
            height: 512,
            width: 512,
            steps: 50,
            guidance_scale: 7.5,
            max_tokens: 77,
        }
    }
}

/// Prompt-to-image pipeline over injected frozen models.
pub struct TextToImage<B, T, TE, D, P>
where
    B: Backend,
    T: PromptTokenizer,
    TE: TextEncoder<B>,
    D: LatentDecoder<B>,
    P: NoisePredictor<B>,
{
    tokenizer: T,
    text_encoder: TE,
    decoder: D,
    predictor: P,
    schedule: NoiseSchedule,
    device: B::Device,
}

impl<B, T, TE, D, P> TextToImage<B, T, TE, D, P>
where
    B: Backend,
    T: PromptTokenizer,
    TE: TextEncoder<B>,
    D: LatentDecoder<B>,
    P: NoisePredictor<B>,
{
    pub fn new(tokenizer: T, text_encoder: TE, decoder: D, predictor: P, device: B::Device) -> Self {
        Self {
            tokenizer,
            text_encoder,
            decoder,
            predictor,
            schedule: NoiseSchedule::sd1x(),
            device,
        }
    }

    /// Generate one 8-bit RGB frame per prompt.
    ///
    /// Missing negative prompts default to the empty string, mirroring the
    /// unconditional row of the embedding.
    pub fn generate(
        &self,
        prompts: &[&str],
        negative_prompts: &[&str],
        config: &Txt2ImgConfig,
    ) -> Result<Vec<image::RgbImage>, GuidanceError> {
        let mut frames = Vec::with_capacity(prompts.len());

        for (index, prompt) in prompts.iter().enumerate() {
            let negative = negative_prompts.get(index).copied().unwrap_or("");
            let embedding = PromptEmbedding::encode(
                &self.tokenizer,
                &self.text_encoder,
                prompt,
                negative,
                config.max_tokens,
                &self.device,
            )?;

            let shape = [
                1,
                LATENT_CHANNELS,
                config.height / LATENT_DOWNSCALE,
                config.width / LATENT_DOWNSCALE,
            ];
            let latents = sample_latents(
                &self.predictor,
                &self.schedule,
                &embedding,
                shape,
                config.steps,
                config.guidance_scale,
                &self.device,
            );

            let image = decode_latents(&self.decoder, latents);
            frames.extend(to_rgb8(image));
        }

        Ok(frames)
    }
}
