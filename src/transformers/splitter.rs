//! X/y metadata splitting
//!
//! Projects the raw metadata table onto the configured input and target
//! columns. Outputs are singleton-wrapped sequences (one table per side)
//! so downstream adapters can squeeze or collect them uniformly; the same
//! implementation serves batch and streaming graphs.

use crate::config::SplitterConfig;
use crate::data::{DataBundle, StepData};
use crate::transformers::{take_flag, take_meta, Transformer};
use crate::Result;
use async_trait::async_trait;

/// Splits a metadata table into X (inputs) and y (targets) column sets
pub struct XySplitter {
    x_columns: Vec<String>,
    y_columns: Vec<String>,
}

impl XySplitter {
    /// Create a splitter from its configuration group
    pub fn new(config: &SplitterConfig) -> Self {
        Self {
            x_columns: config.x_columns.clone(),
            y_columns: config.y_columns.clone(),
        }
    }
}

#[async_trait]
impl Transformer for XySplitter {
    fn name(&self) -> &'static str {
        "XySplitter"
    }

    fn output_keys(&self) -> Option<&'static [&'static str]> {
        Some(&["X", "y"])
    }

    async fn transform(&mut self, mut inputs: DataBundle) -> Result<DataBundle> {
        let meta = take_meta(&mut inputs, "meta", self.name())?;
        // read to enforce the contract; the projection itself is mode-free
        let _train_mode = take_flag(&mut inputs, "train_mode", self.name())?;

        let x = meta.select(&self.x_columns)?;
        let y = meta.select(&self.y_columns)?;

        let mut out = DataBundle::new();
        out.insert("X".into(), StepData::Seq(vec![StepData::Meta(x)]));
        out.insert("y".into(), StepData::Seq(vec![StepData::Meta(y)]));
        Ok(out)
    }
}
