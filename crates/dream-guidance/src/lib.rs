//! Score-distillation guidance over a pretrained latent diffusion model.
//!
//! An external training loop optimizes a differentiable renderer (a NeRF or
//! similar) and calls [`GuidanceEngine::train_step`] once per iteration with
//! the current render. The engine encodes the render into the diffusion
//! model's latent space, perturbs it at a random mid-range timestep, asks the
//! frozen noise-prediction network for a classifier-free-guided noise
//! estimate, and converts the residual into an analytical gradient that flows
//! back to the renderer. The diffusion model itself is never differentiated.
//!
//! The four pretrained artifacts (tokenizer, text encoder, image
//! autoencoder, noise predictor) are injected capabilities behind the traits
//! in [`models`]; the engine carries no weights of its own.

pub mod artifacts;
pub mod embedding;
pub mod engine;
pub mod latent;
pub mod models;
pub mod pipeline;
pub mod sampler;
pub mod snapshot;

pub use artifacts::{AccessToken, ArtifactSet};
pub use embedding::PromptEmbedding;
pub use engine::{GuidanceConfig, GuidanceEngine, GuidanceError, GuidanceOutput};
pub use pipeline::{TextToImage, Txt2ImgConfig};
pub use snapshot::{Direction, SnapshotKind, SnapshotWriter};
