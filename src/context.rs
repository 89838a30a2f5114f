//! Run context and mode enums
//!
//! A [`RunContext`] is derived once from the configuration and passed into
//! the graph builders; it carries the cache root, the execution mode, and
//! the per-step cache flags so individual construction calls don't thread
//! them as arguments.

use crate::config::Config;
use crate::graph::cache::CachePolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Batch vs streaming transformer variant selection; orthogonal to graph
/// topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Whole-vector processing
    Batch,
    /// Item-at-a-time processing, yielding to the runtime between items
    Stream,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Batch => write!(f, "batch"),
            ExecutionMode::Stream => write!(f, "stream"),
        }
    }
}

/// Train vs inference branch selection; affects topology (branch count)
/// but not stage identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Two split branches (train + validation) feed the loader
    Train,
    /// A single split branch serves both loader input halves
    Inference,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Train => write!(f, "train"),
            RunMode::Inference => write!(f, "inference"),
        }
    }
}

/// Single-task vs multitask splitter/loader family selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// One target head
    Single,
    /// Multiple target heads
    Multitask,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Single => write!(f, "single"),
            TaskKind::Multitask => write!(f, "multitask"),
        }
    }
}

/// Construction-time context shared by all builder calls of one pipeline
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Root directory for persisted step outputs
    pub cache_dirpath: PathBuf,
    /// Transformer variant selection
    pub execution_mode: ExecutionMode,
    /// Whether cache-enabled steps persist their outputs
    pub save_outputs: bool,
    /// Whether cache-enabled steps load persisted outputs
    pub load_saved_outputs: bool,
}

impl RunContext {
    /// Derive the context from a configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_dirpath: config.env.cache_dirpath.clone(),
            execution_mode: if config.execution.stream_mode {
                ExecutionMode::Stream
            } else {
                ExecutionMode::Batch
            },
            save_outputs: config.execution.save_outputs,
            load_saved_outputs: config.execution.load_saved_outputs,
        }
    }

    /// Cache policy for one step, rooted at this context's cache directory
    pub fn step_cache(&self, save_output: bool, load_saved_output: bool) -> CachePolicy {
        CachePolicy {
            save_output,
            load_saved_output,
            cache_dirpath: self.cache_dirpath.clone(),
            fingerprint_inputs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn stream_flag_selects_execution_mode() {
        let mut config = Config::from_json(
            r#"{
                "xy_splitter": {"x_columns": [], "y_columns": []},
                "unet": {"num_classes": 2, "image_height": 8, "image_width": 8},
                "env": {"cache_dirpath": "/tmp/cache"}
            }"#,
        )
        .unwrap();
        assert_eq!(
            RunContext::from_config(&config).execution_mode,
            ExecutionMode::Batch
        );
        config.execution.stream_mode = true;
        assert_eq!(
            RunContext::from_config(&config).execution_mode,
            ExecutionMode::Stream
        );
    }
}
