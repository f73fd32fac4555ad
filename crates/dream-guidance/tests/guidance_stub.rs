//! End-to-end guidance tests against stub models.
//!
//! The stubs stand in for the four pretrained artifacts: cheap,
//! deterministic-enough tensor ops with the same shapes and seams as the
//! real models, so the engine logic runs without any weights.

use burn::backend::{Autodiff, NdArray};
use burn::prelude::*;
use burn::tensor::module::{avg_pool2d, interpolate};
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};

use dream_guidance::models::{
    LatentDecoder, LatentEncoder, NoisePredictor, PromptTokenizer, TextEncoder, TokenizerError,
};
use dream_guidance::{
    Direction, GuidanceConfig, GuidanceEngine, PromptEmbedding, SnapshotWriter, TextToImage,
    Txt2ImgConfig,
};

type Inner = NdArray;
type Diff = Autodiff<NdArray>;

// ============================================================================
// Stub models
// ============================================================================

struct StubTokenizer;

impl PromptTokenizer for StubTokenizer {
    fn encode_padded(&self, text: &str, max_length: usize) -> Result<Vec<u32>, TokenizerError> {
        let bytes = text.as_bytes();
        if bytes.len() > 4 * max_length {
            return Err(TokenizerError::TooLong {
                got: bytes.len(),
                max: 4 * max_length,
            });
        }

        let mut ids: Vec<u32> = bytes.iter().take(max_length).map(|b| *b as u32 + 1).collect();
        ids.resize(max_length, 0);
        Ok(ids)
    }
}

struct StubTextEncoder {
    dim: usize,
}

impl<B: Backend> TextEncoder<B> for StubTextEncoder {
    fn forward(&self, tokens: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch, seq] = tokens.dims();
        let floats: Tensor<B, 2> = tokens.float() / 256.0;
        floats.reshape([batch, seq, 1]).repeat_dim(2, self.dim)
    }
}

/// Shape-faithful autoencoder: 8x spatial pooling on the way in, nearest
/// upsampling on the way out, with a near-zero posterior variance so the
/// encode is effectively deterministic but still differentiable.
struct StubVae;

impl<B: Backend> LatentEncoder<B> for StubVae {
    fn encode_moments(&self, image: Tensor<B, 4>) -> Tensor<B, 4> {
        let pooled = avg_pool2d(image.mean_dim(1), [8, 8], [8, 8], [0, 0], true);
        let mean = pooled.repeat_dim(1, 4);
        let logvar = mean.clone() * 0.0 - 30.0;
        Tensor::cat(vec![mean, logvar], 1)
    }
}

impl<B: Backend> LatentDecoder<B> for StubVae {
    fn decode(&self, latent: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, h, w] = latent.dims();
        let mean = latent.mean_dim(1).repeat_dim(1, 3);
        interpolate(
            mean,
            [h * 8, w * 8],
            InterpolateOptions::new(InterpolateMode::Nearest),
        )
        .clamp(-1.0, 1.0)
    }
}

/// Predicts a damped copy of the latent, biased by the text context so the
/// conditional and unconditional halves differ.
struct StubUnet;

impl<B: Backend> NoisePredictor<B> for StubUnet {
    fn predict(
        &self,
        latent: Tensor<B, 4>,
        _timestep: usize,
        context: Tensor<B, 3>,
    ) -> Tensor<B, 4> {
        let [batch, _, _, _] = latent.dims();
        let bias = context.mean_dim(2).mean_dim(1).reshape([batch, 1, 1, 1]);
        latent * 0.1 + bias
    }
}

fn embedding(device: &<Inner as Backend>::Device) -> PromptEmbedding<Inner> {
    PromptEmbedding::encode(
        &StubTokenizer,
        &StubTextEncoder { dim: 8 },
        "a photo of a hamburger",
        "",
        77,
        device,
    )
    .unwrap()
}

fn engine() -> GuidanceEngine<Diff, StubVae, StubVae, StubUnet> {
    GuidanceEngine::new(
        GuidanceConfig::default(),
        StubVae,
        StubVae,
        StubUnet,
        Default::default(),
    )
}

// ============================================================================
// Train-step path
// ============================================================================

#[test]
fn train_step_populates_render_gradient() {
    Diff::seed(42);
    let device: <Diff as Backend>::Device = Default::default();

    let mut engine = engine();
    let embedding = embedding(&device);

    // All-gray render, tracked like a renderer output would be.
    let rendered =
        (Tensor::<Diff, 4>::ones([1, 3, 64, 64], &device) * 0.5).require_grad();

    let out = engine
        .train_step(&embedding, rendered.clone(), 0, Direction::Front)
        .unwrap();

    assert_eq!(out.loss, 0.0);
    assert!((20..=980).contains(&out.timestep));

    let grad = rendered.grad(&out.grads).expect("render gradient populated");
    assert_eq!(grad.dims(), [1, 3, 64, 64]);

    let total = grad.abs().sum().into_data().to_vec::<f32>().unwrap()[0];
    assert!(total.is_finite());
    assert!(total > 0.0, "gradient is all zero");
}

#[test]
fn train_step_rejects_non_rgb_input() {
    Diff::seed(7);
    let device: <Diff as Backend>::Device = Default::default();

    let mut engine = engine();
    let embedding = embedding(&device);
    let rendered = Tensor::<Diff, 4>::ones([1, 4, 64, 64], &device).require_grad();

    assert!(engine
        .train_step(&embedding, rendered, 0, Direction::Front)
        .is_err());
}

#[test]
fn snapshot_dumps_are_throttled_per_direction() {
    Diff::seed(3);
    let device: <Diff as Backend>::Device = Default::default();

    let root = std::env::temp_dir().join(format!(
        "dream-guidance-throttle-{}",
        std::process::id()
    ));
    let writer = SnapshotWriter::create(&root).unwrap();
    let mut engine = engine().with_snapshots(writer);
    let embedding = embedding(&device);

    // Two steps 5 iterations apart: only the first may dump.
    for iteration in [0usize, 5] {
        let rendered =
            (Tensor::<Diff, 4>::ones([1, 3, 32, 32], &device) * 0.5).require_grad();
        engine
            .train_step(&embedding, rendered, iteration, Direction::Overhead)
            .unwrap();
    }

    let dumped: Vec<_> = std::fs::read_dir(root.join("overhead/nerf"))
        .unwrap()
        .collect();
    assert_eq!(dumped.len(), 1, "expected exactly one dumped frame set");
    assert!(root.join("overhead/final_denoised/0.png").is_file());
    assert!(!root.join("overhead/nerf/5.png").exists());

    std::fs::remove_dir_all(&root).unwrap();
}

// ============================================================================
// Embedding and latent plumbing
// ============================================================================

#[test]
fn embedding_orders_unconditional_first() {
    let device: <Inner as Backend>::Device = Default::default();
    let tokenizer = StubTokenizer;
    let encoder = StubTextEncoder { dim: 4 };

    let pair = PromptEmbedding::<Inner>::encode(&tokenizer, &encoder, "a dog", "blurry", 16, &device)
        .unwrap();
    let stacked = pair.stacked();
    assert_eq!(stacked.dims(), [2, 16, 4]);

    // Row 0 must be the negative ("blurry") embedding.
    let negative = PromptEmbedding::<Inner>::encode(&tokenizer, &encoder, "x", "blurry", 16, &device)
        .unwrap()
        .stacked()
        .slice([0..1])
        .into_data()
        .to_vec::<f32>()
        .unwrap();
    let row0 = stacked
        .slice([0..1])
        .into_data()
        .to_vec::<f32>()
        .unwrap();
    assert_eq!(row0, negative);
}

#[test]
fn oversized_prompt_fails_tokenization() {
    let device: <Inner as Backend>::Device = Default::default();
    let long = "x".repeat(10_000);

    let result = PromptEmbedding::<Inner>::encode(
        &StubTokenizer,
        &StubTextEncoder { dim: 4 },
        &long,
        "",
        77,
        &device,
    );
    assert!(matches!(result, Err(TokenizerError::TooLong { .. })));
}

#[test]
fn encode_decode_round_trip_preserves_shape_and_range() {
    Inner::seed(11);
    let device: <Inner as Backend>::Device = Default::default();

    let image = Tensor::<Inner, 4>::ones([1, 3, 64, 64], &device) * 0.5;
    let latents = dream_guidance::latent::encode_image::<Inner>(&StubVae, image);
    assert_eq!(latents.dims(), [1, 4, 8, 8]);

    let decoded = dream_guidance::latent::decode_latents::<Inner>(&StubVae, latents);
    assert_eq!(decoded.dims(), [1, 3, 64, 64]);
    for value in decoded.into_data().to_vec::<f32>().unwrap() {
        assert!((0.0..=1.0).contains(&value));
    }
}

// ============================================================================
// Offline prompt-to-image path
// ============================================================================

#[test]
fn prompt_to_image_produces_rgb_frames() {
    Inner::seed(5);
    let device: <Inner as Backend>::Device = Default::default();

    let pipeline: TextToImage<Inner, _, _, _, _> = TextToImage::new(
        StubTokenizer,
        StubTextEncoder { dim: 8 },
        StubVae,
        StubUnet,
        device,
    );

    let config = Txt2ImgConfig {
        height: 64,
        width: 64,
        steps: 4,
        guidance_scale: 7.5,
        max_tokens: 16,
    };
    let frames = pipeline
        .generate(&["a pig", "a chair"], &["ugly"], &config)
        .unwrap();

    assert_eq!(frames.len(), 2);
    for frame in &frames {
        assert_eq!(frame.dimensions(), (64, 64));
    }
}
