//! Prompt embeddings, computed once per run.

use burn::prelude::*;

use crate::models::{PromptTokenizer, TextEncoder, TokenizerError};

/// Conditional/unconditional embedding pair, stacked `[uncond, cond]`.
///
/// Built once at setup from a prompt pair and shared read-only across every
/// guidance step. The unconditional row comes first so a batched forward
/// pass splits cleanly into `[uncond, cond]` halves.
#[derive(Debug, Clone)]
pub struct PromptEmbedding<B: Backend> {
    stacked: Tensor<B, 3>,
}

impl<B: Backend> PromptEmbedding<B> {
    /// Tokenize and encode a prompt pair with the frozen text stack.
    ///
    /// Tokenizer failures propagate; there is nothing to recover.
    pub fn encode(
        tokenizer: &impl PromptTokenizer,
        encoder: &impl TextEncoder<B>,
        prompt: &str,
        negative_prompt: &str,
        max_length: usize,
        device: &B::Device,
    ) -> Result<Self, TokenizerError> {
        let uncond = embed_one(tokenizer, encoder, negative_prompt, max_length, device)?;
        let cond = embed_one(tokenizer, encoder, prompt, max_length, device)?;

        Ok(Self {
            stacked: Tensor::cat(vec![uncond, cond], 0),
        })
    }

    /// The `[2, seq, dim]` embedding tensor, unconditional first.
    pub fn stacked(&self) -> Tensor<B, 3> {
        self.stacked.clone()
    }
}

fn embed_one<B: Backend>(
    tokenizer: &impl PromptTokenizer,
    encoder: &impl TextEncoder<B>,
    text: &str,
    max_length: usize,
    device: &B::Device,
) -> Result<Tensor<B, 3>, TokenizerError> {
    let ids: Vec<i32> = tokenizer
        .encode_padded(text, max_length)?
        .into_iter()
        .map(|id| id as i32)
        .collect();
    let len = ids.len();
    let tokens = Tensor::<B, 2, Int>::from_data(TensorData::new(ids, [1, len]), device);

    Ok(encoder.forward(tokens))
}
