//! Transformer implementations
//!
//! A transformer is the computational unit bound to a step: named inputs
//! in, named outputs out. Two transformers are interchangeable for a step
//! iff they accept the same input names and produce the same output names;
//! the adapter layer depends on that equivalence to keep graph topology
//! stable when switching between batch and streaming variants.

pub mod category;
pub mod dilate;
pub mod dummy;
pub mod label;
pub mod loader;
pub mod model;
pub mod resize;
pub mod splitter;

pub use category::{CategoryMapper, CategoryMapperStream};
pub use dilate::{MaskDilator, MaskDilatorStream};
pub use dummy::Dummy;
pub use label::{MulticlassLabeler, MulticlassLabelerStream};
pub use loader::{MultitaskSegmentationLoader, SegmentationLoader};
pub use model::{UnetModel, UnetModelStream};
pub use resize::{Resizer, ResizerStream};
pub use splitter::XySplitter;

use crate::data::{CategoryMask, DataBundle, Dataset, MetaTable, ProbabilityMaps, StepData};
use crate::{Error, Result};
use async_trait::async_trait;

/// Computational unit bound to a step
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Stable type name, used in logs
    fn name(&self) -> &'static str;

    /// Output vocabulary this transformer publishes, or `None` for
    /// pass-through transformers whose outputs mirror their adapter
    fn output_keys(&self) -> Option<&'static [&'static str]>;

    /// Consume the resolved input bundle and produce the output bundle
    ///
    /// Outputs are published to the graph atomically after this returns.
    async fn transform(&mut self, inputs: DataBundle) -> Result<DataBundle>;
}

/// Remove a required input from the bundle
pub(crate) fn take(inputs: &mut DataBundle, key: &str, node: &str) -> Result<StepData> {
    inputs
        .remove(key)
        .ok_or_else(|| Error::InvalidInput(format!("{node}: missing required input '{key}'")))
}

fn type_mismatch(node: &str, key: &str, expected: &str, got: &StepData) -> Error {
    Error::InvalidInput(format!(
        "{node}: input '{key}' expected {expected}, got '{}'",
        got.data_type()
    ))
}

/// Required `Meta` input
pub(crate) fn take_meta(inputs: &mut DataBundle, key: &str, node: &str) -> Result<MetaTable> {
    match take(inputs, key, node)? {
        StepData::Meta(t) => Ok(t),
        other => Err(type_mismatch(node, key, "meta", &other)),
    }
}

/// Required `Flag` input
pub(crate) fn take_flag(inputs: &mut DataBundle, key: &str, node: &str) -> Result<bool> {
    match take(inputs, key, node)? {
        StepData::Flag(v) => Ok(v),
        other => Err(type_mismatch(node, key, "flag", &other)),
    }
}

/// Required `Sizes` input
pub(crate) fn take_sizes(inputs: &mut DataBundle, key: &str, node: &str) -> Result<Vec<(u32, u32)>> {
    match take(inputs, key, node)? {
        StepData::Sizes(v) => Ok(v),
        other => Err(type_mismatch(node, key, "sizes", &other)),
    }
}

/// Required `Maps` input
pub(crate) fn take_maps(
    inputs: &mut DataBundle,
    key: &str,
    node: &str,
) -> Result<Vec<ProbabilityMaps>> {
    match take(inputs, key, node)? {
        StepData::Maps(v) => Ok(v),
        other => Err(type_mismatch(node, key, "maps", &other)),
    }
}

/// Required `Masks` input
pub(crate) fn take_masks(
    inputs: &mut DataBundle,
    key: &str,
    node: &str,
) -> Result<Vec<CategoryMask>> {
    match take(inputs, key, node)? {
        StepData::Masks(v) => Ok(v),
        other => Err(type_mismatch(node, key, "masks", &other)),
    }
}

/// Required `Dataset` input
pub(crate) fn take_dataset(inputs: &mut DataBundle, key: &str, node: &str) -> Result<Dataset> {
    match take(inputs, key, node)? {
        StepData::Dataset(d) => Ok(d),
        other => Err(type_mismatch(node, key, "dataset", &other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_reports_missing_key() {
        let mut bundle = DataBundle::new();
        let err = take(&mut bundle, "images", "Resizer").unwrap_err();
        assert!(err.to_string().contains("images"));
        assert!(err.to_string().contains("Resizer"));
    }

    #[test]
    fn typed_take_reports_mismatch() {
        let mut bundle = DataBundle::new();
        bundle.insert("train_mode".into(), StepData::Sizes(vec![]));
        let err = take_flag(&mut bundle, "train_mode", "XySplitter").unwrap_err();
        assert!(err.to_string().contains("expected flag"));
    }
}
