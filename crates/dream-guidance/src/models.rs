//! Capability seams for the injected pretrained artifacts.
//!
//! The engine only ever touches the pretrained models through these traits,
//! so the guidance logic can be exercised against stubs without loading any
//! weights.

use burn::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("prompt could not be tokenized: {0}")]
    InvalidPrompt(String),

    #[error("prompt of {got} tokens exceeds the encoder maximum of {max}")]
    TooLong { got: usize, max: usize },
}

/// Text tokenizer with fixed-length padding and truncation.
pub trait PromptTokenizer {
    /// Encode `text` to exactly `max_length` token ids.
    fn encode_padded(&self, text: &str, max_length: usize) -> Result<Vec<u32>, TokenizerError>;
}

/// Frozen text encoder: token ids `[1, seq]` to embeddings `[1, seq, dim]`.
pub trait TextEncoder<B: Backend> {
    fn forward(&self, tokens: Tensor<B, 2, Int>) -> Tensor<B, 3>;
}

/// Encoder half of the frozen image autoencoder.
///
/// Maps an image in `[-1, 1]` of shape `[batch, 3, H, W]` to posterior
/// moments `[batch, 8, H/8, W/8]` (mean and logvar, channel-concatenated).
pub trait LatentEncoder<B: Backend> {
    fn encode_moments(&self, image: Tensor<B, 4>) -> Tensor<B, 4>;
}

/// Decoder half of the frozen image autoencoder.
///
/// Maps an unscaled latent `[batch, 4, h, w]` to an image in `[-1, 1]`.
pub trait LatentDecoder<B: Backend> {
    fn decode(&self, latent: Tensor<B, 4>) -> Tensor<B, 4>;
}

/// Frozen noise-prediction network.
pub trait NoisePredictor<B: Backend> {
    /// Predict the noise component of `latent` at `timestep`, conditioned on
    /// the text `context` of shape `[batch, seq, dim]`.
    fn predict(&self, latent: Tensor<B, 4>, timestep: usize, context: Tensor<B, 3>)
        -> Tensor<B, 4>;
}
