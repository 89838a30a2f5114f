//! Pipeline registry
//!
//! Maps `(pipeline name, run mode)` pairs to builder functions so callers
//! select pipelines by name at runtime. Builders are plain closures over
//! the configuration; registering a custom pipeline needs no trait impl.

use super::unet;
use crate::config::Config;
use crate::context::RunMode;
use crate::graph::StepGraph;
use crate::{Error, Result};
use std::collections::HashMap;
use tracing::debug;

/// A graph builder keyed in the registry
pub type PipelineBuilder = Box<dyn Fn(&Config) -> Result<StepGraph> + Send + Sync>;

/// Named pipeline builders, keyed by `(name, run mode)`
#[derive(Default)]
pub struct PipelineRegistry {
    builders: HashMap<(String, RunMode), PipelineBuilder>,
}

impl PipelineRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in pipelines registered
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("unet", RunMode::Train, |config| {
            unet(config, RunMode::Train)
        });
        registry.register("unet", RunMode::Inference, |config| {
            unet(config, RunMode::Inference)
        });
        registry
    }

    /// Register a builder, replacing any existing entry for the same key
    pub fn register<F>(&mut self, name: impl Into<String>, mode: RunMode, builder: F)
    where
        F: Fn(&Config) -> Result<StepGraph> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(pipeline = %name, mode = %mode, "pipeline registered");
        self.builders.insert((name, mode), Box::new(builder));
    }

    /// Whether a builder exists for this name and mode
    pub fn has_pipeline(&self, name: &str, mode: RunMode) -> bool {
        self.builders.contains_key(&(name.to_string(), mode))
    }

    /// Registered `(name, mode)` pairs, sorted for stable listings
    pub fn pipelines(&self) -> Vec<(String, RunMode)> {
        let mut keys: Vec<_> = self.builders.keys().cloned().collect();
        keys.sort_by(|a, b| (&a.0, a.1.to_string()).cmp(&(&b.0, b.1.to_string())));
        keys
    }

    /// Build the named pipeline's graph for the given mode
    pub fn build(&self, name: &str, mode: RunMode, config: &Config) -> Result<StepGraph> {
        let builder = self
            .builders
            .get(&(name.to_string(), mode))
            .ok_or_else(|| {
                let available: Vec<String> = self
                    .pipelines()
                    .into_iter()
                    .map(|(n, m)| format!("{n}/{m}"))
                    .collect();
                Error::UnsupportedMode(format!(
                    "no pipeline '{name}' registered for mode '{mode}' (available: {})",
                    available.join(", ")
                ))
            })?;
        builder(config)
    }
}

impl std::fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRegistry")
            .field("pipelines", &self.pipelines())
            .finish()
    }
}
