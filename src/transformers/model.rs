//! Segmentation model stage
//!
//! Produces one multichannel probability stack per dataset sample. The
//! generator here is weightless and deterministic: per-sample class
//! regions are derived from a hash of the sample row, which keeps
//! downstream stages and tests reproducible. A trained network drops in
//! behind the same [`Transformer`] seam without touching the graph.

use crate::config::UnetConfig;
use crate::data::{DataBundle, ProbabilityMaps, StepData};
use crate::transformers::{take_dataset, Transformer};
use crate::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

const OUTPUTS: &[&str] = &["multichannel_map_prediction"];

/// Side length of the square blocks the generator tiles a map with
const BLOCK: usize = 8;

fn sample_seed(row: &[String]) -> u64 {
    let mut hasher = Sha256::new();
    for cell in row {
        hasher.update(cell.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    u64::from_le_bytes(digest[..8].try_into().unwrap())
}

/// Deterministic per-sample prediction: blocky class regions with a
/// dominant-channel probability of 0.8
fn predict(config: &UnetConfig, row: &[String]) -> ProbabilityMaps {
    let seed = sample_seed(row) as usize;
    let channels = config.num_classes.max(1);
    let mut maps = ProbabilityMaps::new(channels, config.image_height, config.image_width);
    let rest = if channels > 1 {
        0.2 / (channels as f32 - 1.0)
    } else {
        0.0
    };
    for y in 0..config.image_height {
        for x in 0..config.image_width {
            let dominant = (seed + y / BLOCK + x / BLOCK) % channels;
            for c in 0..channels {
                *maps.at_mut(c, y, x) = if c == dominant { 0.8 } else { rest };
            }
        }
    }
    maps
}

/// Batch model stage: predicts the whole dataset in one call
pub struct UnetModel {
    config: UnetConfig,
}

impl UnetModel {
    /// Create the stage from its hyperparameter group
    pub fn new(config: &UnetConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl Transformer for UnetModel {
    fn name(&self) -> &'static str {
        "UnetModel"
    }

    fn output_keys(&self) -> Option<&'static [&'static str]> {
        Some(OUTPUTS)
    }

    async fn transform(&mut self, mut inputs: DataBundle) -> Result<DataBundle> {
        let dataset = take_dataset(&mut inputs, "datagen", self.name())?;
        let maps = dataset
            .x
            .rows
            .iter()
            .map(|row| predict(&self.config, row))
            .collect();
        let mut out = DataBundle::new();
        out.insert(
            "multichannel_map_prediction".into(),
            StepData::Maps(maps),
        );
        Ok(out)
    }
}

/// Streaming model stage: one sample at a time, yielding between samples
pub struct UnetModelStream {
    config: UnetConfig,
}

impl UnetModelStream {
    /// Create the stage from its hyperparameter group
    pub fn new(config: &UnetConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl Transformer for UnetModelStream {
    fn name(&self) -> &'static str {
        "UnetModelStream"
    }

    fn output_keys(&self) -> Option<&'static [&'static str]> {
        Some(OUTPUTS)
    }

    async fn transform(&mut self, mut inputs: DataBundle) -> Result<DataBundle> {
        let dataset = take_dataset(&mut inputs, "datagen", self.name())?;
        let mut maps = Vec::with_capacity(dataset.x.len());
        for row in &dataset.x.rows {
            maps.push(predict(&self.config, row));
            tokio::task::yield_now().await;
        }
        let mut out = DataBundle::new();
        out.insert(
            "multichannel_map_prediction".into(),
            StepData::Maps(maps),
        );
        Ok(out)
    }
}
