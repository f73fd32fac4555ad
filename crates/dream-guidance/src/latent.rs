//! Latent-space conversions around the frozen autoencoder.

use burn::prelude::*;
use burn::tensor::Distribution;

use crate::models::{LatentDecoder, LatentEncoder};

/// Latent scaling factors relative to the raw autoencoder output.
pub mod scaling {
    /// SD 1.x / 2.x scaling factor.
    pub const SD1X: f64 = 0.18215;
}

/// Resolution expected by the image encoder.
pub const ENCODER_RESOLUTION: usize = 512;

/// Latent channels produced by the autoencoder.
pub const LATENT_CHANNELS: usize = 4;

/// Spatial compression between image and latent space.
pub const LATENT_DOWNSCALE: usize = 8;

/// Bilinear-resize a rendered image to the encoder resolution.
pub fn resize_render<B: Backend>(image: Tensor<B, 4>) -> Tensor<B, 4> {
    resize_bilinear(image, ENCODER_RESOLUTION, ENCODER_RESOLUTION)
}

/// Bilinear resize expressed as two matmuls with per-axis weight matrices.
///
/// The renderer gradient passes through the resize, so it must stay inside
/// the autodiff graph; plain matmuls have a backward on every backend.
pub fn resize_bilinear<B: Backend>(
    image: Tensor<B, 4>,
    out_height: usize,
    out_width: usize,
) -> Tensor<B, 4> {
    let [_, _, in_height, in_width] = image.dims();
    if in_height == out_height && in_width == out_width {
        return image;
    }
    let device = image.device();

    let rows = interp_matrix::<B>(in_height, out_height, &device).unsqueeze::<4>();
    let cols = interp_matrix::<B>(in_width, out_width, &device)
        .transpose()
        .unsqueeze::<4>();

    rows.matmul(image).matmul(cols)
}

/// `[output, input]` bilinear weight matrix over half-pixel-centered samples.
fn interp_matrix<B: Backend>(input: usize, output: usize, device: &B::Device) -> Tensor<B, 2> {
    let scale = input as f64 / output as f64;
    let mut weights = vec![0.0f32; output * input];
    for o in 0..output {
        let src = ((o as f64 + 0.5) * scale - 0.5).max(0.0);
        let lo = (src.floor() as usize).min(input - 1);
        let hi = (lo + 1).min(input - 1);
        let frac = (src - lo as f64) as f32;
        weights[o * input + lo] += 1.0 - frac;
        weights[o * input + hi] += frac;
    }

    Tensor::from_data(TensorData::new(weights, [output, input]), device)
}

/// Encode a `[0, 1]` image into scaled latents.
///
/// Samples the posterior (not its mean), matching how the diffusion model
/// was trained. Whether gradients are tracked is decided by the caller's
/// choice of backend; this is the engine's only gradient path back to the
/// renderer.
pub fn encode_image<B: Backend>(
    encoder: &impl LatentEncoder<B>,
    image: Tensor<B, 4>,
) -> Tensor<B, 4> {
    let moments = encoder.encode_moments(image * 2.0 - 1.0);
    let [b, c, h, w] = moments.dims();
    let half = c / 2;

    let mean = moments.clone().slice([0..b, 0..half, 0..h, 0..w]);
    let logvar = moments.slice([0..b, half..c, 0..h, 0..w]).clamp(-30.0, 20.0);
    let std = (logvar * 0.5).exp();

    let eps = Tensor::random(mean.shape(), Distribution::Normal(0.0, 1.0), &mean.device());

    (mean + std * eps) * scaling::SD1X
}

/// Decode scaled latents back to a clamped `[0, 1]` image.
///
/// Diagnostics only; run this on a non-autodiff backend.
pub fn decode_latents<B: Backend>(
    decoder: &impl LatentDecoder<B>,
    latents: Tensor<B, 4>,
) -> Tensor<B, 4> {
    let image = decoder.decode(latents / scaling::SD1X);
    (image / 2.0 + 0.5).clamp(0.0, 1.0)
}

/// Convert a `[batch, 3, H, W]` tensor in `[0, 1]` to 8-bit RGB frames.
pub fn to_rgb8<B: Backend>(image: Tensor<B, 4>) -> Vec<image::RgbImage> {
    let [batch, channels, height, width] = image.dims();
    debug_assert_eq!(channels, 3);

    let data = image.into_data().to_vec::<f32>().unwrap();

    (0..batch)
        .map(|b| {
            let base = b * channels * height * width;
            image::RgbImage::from_fn(width as u32, height as u32, |x, y| {
                let at = |c: usize| {
                    let value = data[base + (c * height + y as usize) * width + x as usize];
                    (value * 255.0).round().clamp(0.0, 255.0) as u8
                };
                image::Rgb([at(0), at(1), at(2)])
            })
        })
        .collect()
}
