//! Bandolier sampling
//!
//! Samplers produce batches of [`bd_types::Sample`] for a requested count.
//! [`SamplerSet`] fans a round's per-arm counts out to one sampler per arm
//! and joins every batch before handing them back.

pub mod gaussian;
pub mod noise;
pub mod sampler;

pub use gaussian::GaussianSampler;
pub use noise::{GaussianNoiseModel, NoiseModel};
pub use sampler::{SampleFactory, Sampler, SamplerSet};
