//! Attributed-network generator and benchmark utilities for netfuse.
//!
//! This crate provides deterministic generation of record-duplicated graph
//! pairs for benchmarking the integration pipeline and the diffusion
//! simulator in `netfuse-core`.

pub mod generator;

pub use generator::{GeneratorConfig, SizeTier, generate_population};
