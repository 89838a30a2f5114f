//! Pipeline configuration
//!
//! Configuration is read once at graph construction; there is no dynamic
//! reconfiguration mid-run. Groups mirror the stages they configure:
//! `xy_splitter`, `loader`, `unet`, `postprocessor`, `execution`, `env`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration consumed by the graph builders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Single-task splitter options
    pub xy_splitter: SplitterConfig,

    /// Multitask splitter options
    #[serde(default)]
    pub xy_splitter_multitask: SplitterConfig,

    /// Loader options
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Model stage hyperparameters
    pub unet: UnetConfig,

    /// Post-processing options
    #[serde(default)]
    pub postprocessor: PostprocessorConfig,

    /// Execution-mode switches
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Environment paths
    pub env: EnvConfig,
}

/// Column selection for the X/y split
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Columns forming the input side of the split
    pub x_columns: Vec<String>,
    /// Columns forming the target side of the split
    pub y_columns: Vec<String>,
}

/// Loader options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Batch size recorded on the assembled dataset
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Whether training batches should be shuffled
    #[serde(default)]
    pub shuffle: bool,

    /// Patch-based loading; no builder supports it and construction fails
    /// fast when set
    #[serde(default)]
    pub patching: bool,
}

fn default_batch_size() -> usize {
    4
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            shuffle: false,
            patching: false,
        }
    }
}

/// Model stage hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnetConfig {
    /// Number of output channels (classes)
    pub num_classes: usize,
    /// Prediction map height in pixels
    pub image_height: usize,
    /// Prediction map width in pixels
    pub image_width: usize,
}

/// Post-processing options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostprocessorConfig {
    /// Square structuring-element size for mask dilation; 0 disables the
    /// dilation step entirely (the step is not inserted into the graph)
    #[serde(default)]
    pub dilate_selem_size: u32,
}

/// Execution-mode switches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Bind streaming transformer variants instead of batch variants
    #[serde(default)]
    pub stream_mode: bool,

    /// Persist step outputs on the cache-enabled steps
    #[serde(default)]
    pub save_outputs: bool,

    /// Load persisted outputs on the cache-enabled steps instead of
    /// recomputing
    #[serde(default)]
    pub load_saved_outputs: bool,
}

/// Environment paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Root directory for persisted step outputs
    pub cache_dirpath: PathBuf,
}

impl Config {
    /// Parse a configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("JSON parse error: {e}")))
    }

    /// Parse a configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Config(format!("YAML parse error: {e}")))
    }

    /// Load a configuration file, dispatching on the file extension
    /// (`.json`, `.yaml`, `.yml`)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            Some("yaml") | Some("yml") => Self::from_yaml(&text),
            other => Err(Error::Config(format!(
                "unsupported config extension {:?} for {}",
                other,
                path.display()
            ))),
        }
    }
}
