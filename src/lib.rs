//! segpipe - Step-graph execution engine for image segmentation pipelines
//!
//! This crate provides a small pipeline engine built around named steps.
//! It supports:
//! - Declarative step graphs with per-edge input adapters
//! - Dependency-ordered evaluation with cycle detection
//! - Per-step output caching on the filesystem
//! - Mode-branched builders: train/inference, single/multitask, batch/stream
//! - A registry resolving `(pipeline name, run mode)` to a builder
//!
//! ## Entry points
//! Most callers go through [`pipelines::PipelineRegistry`] to obtain a
//! [`graph::StepGraph`] and then call
//! [`execute_with_input`](graph::StepGraph::execute_with_input) with a raw
//! data bundle.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod data;
pub mod graph;
pub mod pipelines;
pub mod transformers;

mod error;
pub use error::{Error, Result};

/// Initialize the pipeline runtime
///
/// This should be called once at startup to initialize logging.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("segpipe runtime initialized");
    Ok(())
}
