//! Dataset assembly
//!
//! Loaders turn the splitter outputs into [`Dataset`] values for the model
//! stage. The single-task loader expects squeezed `X`/`y` tables; the
//! multitask loader keeps `y` as a sequence of target tables, one per
//! prediction head. When validation inputs are present a second
//! `validation_datagen` output is published; inference graphs wire the
//! same split into both halves, so validation mirrors the primary data
//! there by design.

use crate::config::LoaderConfig;
use crate::data::{DataBundle, Dataset, MetaTable, StepData};
use crate::transformers::{take, take_flag, take_meta, Transformer};
use crate::{Error, Result};
use async_trait::async_trait;

const OUTPUTS: &[&str] = &["datagen", "validation_datagen"];

fn check_row_counts(node: &str, x: &MetaTable, y: &[MetaTable]) -> Result<()> {
    for table in y {
        if table.len() != x.len() {
            return Err(Error::InvalidInput(format!(
                "{node}: X has {} rows but a target table has {}",
                x.len(),
                table.len()
            )));
        }
    }
    Ok(())
}

fn optional_meta(inputs: &mut DataBundle, key: &str, node: &str) -> Result<Option<MetaTable>> {
    match inputs.remove(key) {
        None => Ok(None),
        Some(StepData::Meta(t)) => Ok(Some(t)),
        Some(other) => Err(Error::InvalidInput(format!(
            "{node}: input '{key}' expected meta, got '{}'",
            other.data_type()
        ))),
    }
}

fn seq_of_meta(value: StepData, key: &str, node: &str) -> Result<Vec<MetaTable>> {
    match value {
        StepData::Seq(items) => items
            .into_iter()
            .map(|item| match item {
                StepData::Meta(t) => Ok(t),
                other => Err(Error::InvalidInput(format!(
                    "{node}: input '{key}' expected a sequence of meta tables, got '{}'",
                    other.data_type()
                ))),
            })
            .collect(),
        other => Err(Error::InvalidInput(format!(
            "{node}: input '{key}' expected seq, got '{}'",
            other.data_type()
        ))),
    }
}

/// Single-task dataset assembly (`X`/`y` squeezed to one table each)
pub struct SegmentationLoader {
    #[allow(dead_code)]
    batch_size: usize,
    #[allow(dead_code)]
    shuffle: bool,
}

impl SegmentationLoader {
    /// Create a loader from its configuration group
    pub fn new(config: &LoaderConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            shuffle: config.shuffle,
        }
    }
}

#[async_trait]
impl Transformer for SegmentationLoader {
    fn name(&self) -> &'static str {
        "SegmentationLoader"
    }

    fn output_keys(&self) -> Option<&'static [&'static str]> {
        Some(OUTPUTS)
    }

    async fn transform(&mut self, mut inputs: DataBundle) -> Result<DataBundle> {
        let node = self.name();
        let x = take_meta(&mut inputs, "X", node)?;
        let y = take_meta(&mut inputs, "y", node)?;
        let train_mode = take_flag(&mut inputs, "train_mode", node)?;
        let x_valid = optional_meta(&mut inputs, "X_valid", node)?;
        let y_valid = optional_meta(&mut inputs, "y_valid", node)?;

        let y = vec![y];
        check_row_counts(node, &x, &y)?;

        let mut out = DataBundle::new();
        out.insert(
            "datagen".into(),
            StepData::Dataset(Dataset { x, y, train_mode }),
        );
        if let (Some(xv), Some(yv)) = (x_valid, y_valid) {
            let yv = vec![yv];
            check_row_counts(node, &xv, &yv)?;
            out.insert(
                "validation_datagen".into(),
                StepData::Dataset(Dataset {
                    x: xv,
                    y: yv,
                    train_mode: false,
                }),
            );
        }
        Ok(out)
    }
}

/// Multitask dataset assembly (`y` stays a sequence of target tables)
pub struct MultitaskSegmentationLoader {
    #[allow(dead_code)]
    batch_size: usize,
    #[allow(dead_code)]
    shuffle: bool,
}

impl MultitaskSegmentationLoader {
    /// Create a loader from its configuration group
    pub fn new(config: &LoaderConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            shuffle: config.shuffle,
        }
    }
}

#[async_trait]
impl Transformer for MultitaskSegmentationLoader {
    fn name(&self) -> &'static str {
        "MultitaskSegmentationLoader"
    }

    fn output_keys(&self) -> Option<&'static [&'static str]> {
        Some(OUTPUTS)
    }

    async fn transform(&mut self, mut inputs: DataBundle) -> Result<DataBundle> {
        let node = self.name();
        let x = take_meta(&mut inputs, "X", node)?;
        let y = seq_of_meta(take(&mut inputs, "y", node)?, "y", node)?;
        let train_mode = take_flag(&mut inputs, "train_mode", node)?;
        let x_valid = optional_meta(&mut inputs, "X_valid", node)?;
        let y_valid = match inputs.remove("y_valid") {
            Some(value) => Some(seq_of_meta(value, "y_valid", node)?),
            None => None,
        };

        check_row_counts(node, &x, &y)?;

        let mut out = DataBundle::new();
        out.insert(
            "datagen".into(),
            StepData::Dataset(Dataset { x, y, train_mode }),
        );
        if let (Some(xv), Some(yv)) = (x_valid, y_valid) {
            check_row_counts(node, &xv, &yv)?;
            out.insert(
                "validation_datagen".into(),
                StepData::Dataset(Dataset {
                    x: xv,
                    y: yv,
                    train_mode: false,
                }),
            );
        }
        Ok(out)
    }
}
