//! Reverse-diffusion building blocks for score distillation.
//!
//! This crate owns the pieces of the diffusion process the guidance engine
//! computes itself: the forward noise schedule, timestep sampling, the
//! deterministic DDIM-style reverse step, and classifier-free guidance.
//! Everything that requires pretrained weights lives behind traits in the
//! `dream-guidance` crate.

pub mod ddim;
pub mod guidance;
pub mod schedule;

pub use ddim::{DdimConfig, DdimSampler};
pub use guidance::{apply_guidance, GuidanceWeight};
pub use schedule::{BetaSchedule, NoiseSchedule, TimestepBand};
