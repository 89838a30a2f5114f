//! Data types carried on step graph edges
//!
//! Every value that flows between steps is a [`StepData`]; transformers
//! exchange named bundles of them. All payloads are serde-serializable so
//! cached step outputs can be persisted as opaque blobs.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Named input/output bundle of a transformer
pub type DataBundle = HashMap<String, StepData>;

/// Caller-supplied raw data: named bundles not produced by any step
/// (conventionally a single bundle named `"input"`)
pub type RawData = HashMap<String, DataBundle>;

/// A column-named table of string cells (sample ids, image paths, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTable {
    /// Column names, in order
    pub columns: Vec<String>,
    /// Rows; each row has one cell per column
    pub rows: Vec<Vec<String>>,
}

impl MetaTable {
    /// Create an empty table with the given columns
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row; the row must have one cell per column
    pub fn push_row(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::InvalidInput(format!(
                "row has {} cells, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Project the table onto a subset of its columns, preserving row order
    pub fn select(&self, columns: &[String]) -> Result<MetaTable> {
        let mut indices = Vec::with_capacity(columns.len());
        for name in columns {
            let idx = self
                .columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| Error::InvalidInput(format!("unknown column '{name}'")))?;
            indices.push(idx);
        }
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(MetaTable {
            columns: columns.to_vec(),
            rows,
        })
    }
}

/// Channel-major stack of per-class probability maps (`channels × height × width`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityMaps {
    /// Number of channels (classes)
    pub channels: usize,
    /// Map height in pixels
    pub height: usize,
    /// Map width in pixels
    pub width: usize,
    /// Channel-major pixel data, `channels * height * width` values
    pub data: Vec<f32>,
}

impl ProbabilityMaps {
    /// Create a zero-filled stack
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
            data: vec![0.0; channels * height * width],
        }
    }

    /// Value at (channel, y, x)
    pub fn at(&self, c: usize, y: usize, x: usize) -> f32 {
        self.data[(c * self.height + y) * self.width + x]
    }

    /// Mutable value at (channel, y, x)
    pub fn at_mut(&mut self, c: usize, y: usize, x: usize) -> &mut f32 {
        &mut self.data[(c * self.height + y) * self.width + x]
    }

    /// One channel's pixels as a slice
    pub fn channel(&self, c: usize) -> &[f32] {
        let plane = self.height * self.width;
        &self.data[c * plane..(c + 1) * plane]
    }
}

/// Per-pixel category indices (0 = background)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMask {
    /// Mask height in pixels
    pub height: usize,
    /// Mask width in pixels
    pub width: usize,
    /// Row-major category index per pixel
    pub categories: Vec<u16>,
}

impl CategoryMask {
    /// Create a background-only mask
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            categories: vec![0; height * width],
        }
    }

    /// Category at (y, x)
    pub fn at(&self, y: usize, x: usize) -> u16 {
        self.categories[y * self.width + x]
    }
}

/// Per-pixel connected-component ids (0 = background)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMap {
    /// Map height in pixels
    pub height: usize,
    /// Map width in pixels
    pub width: usize,
    /// Row-major component id per pixel
    pub labels: Vec<u32>,
}

impl LabelMap {
    /// Create a background-only label map
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            labels: vec![0; height * width],
        }
    }

    /// Label at (y, x)
    pub fn at(&self, y: usize, x: usize) -> u32 {
        self.labels[y * self.width + x]
    }
}

/// A loader's assembled output: sample table(s) ready for the model stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Input samples (one row per image)
    pub x: MetaTable,
    /// Target tables, one per prediction head (single-task loaders produce one)
    pub y: Vec<MetaTable>,
    /// Whether this dataset feeds a training loop
    pub train_mode: bool,
}

/// A value carried on a step graph edge
///
/// `Seq` is the ordered collection produced when an adapter slot declares
/// multiple references, and also how producers deliberately wrap a
/// singleton for consumers that expect a collection (the `Squeeze`
/// reshaper unwraps it again).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepData {
    /// Sample metadata table
    Meta(MetaTable),
    /// Boolean flag (e.g., `train_mode`)
    Flag(bool),
    /// Per-sample target sizes as `(height, width)`
    Sizes(Vec<(u32, u32)>),
    /// Per-sample probability map stacks
    Maps(Vec<ProbabilityMaps>),
    /// Per-sample category masks
    Masks(Vec<CategoryMask>),
    /// Per-sample connected-component label maps
    Labels(Vec<LabelMap>),
    /// A loader's assembled dataset
    Dataset(Dataset),
    /// Ordered collection of values
    Seq(Vec<StepData>),
}

impl StepData {
    /// Short type tag, used in logs and error messages
    pub fn data_type(&self) -> &'static str {
        match self {
            StepData::Meta(_) => "meta",
            StepData::Flag(_) => "flag",
            StepData::Sizes(_) => "sizes",
            StepData::Maps(_) => "maps",
            StepData::Masks(_) => "masks",
            StepData::Labels(_) => "labels",
            StepData::Dataset(_) => "dataset",
            StepData::Seq(_) => "seq",
        }
    }

    /// Count of items in this value
    ///
    /// - Meta: row count
    /// - Flag: 1
    /// - Sizes / Maps / Masks / Labels / Seq: element count
    /// - Dataset: row count of `x`
    pub fn item_count(&self) -> usize {
        match self {
            StepData::Meta(t) => t.len(),
            StepData::Flag(_) => 1,
            StepData::Sizes(v) => v.len(),
            StepData::Maps(v) => v.len(),
            StepData::Masks(v) => v.len(),
            StepData::Labels(v) => v.len(),
            StepData::Dataset(d) => d.x.len(),
            StepData::Seq(v) => v.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> MetaTable {
        let mut table = MetaTable::new(vec!["file_path".into(), "mask_path".into()]);
        table
            .push_row(vec!["img/a.png".into(), "msk/a.png".into()])
            .unwrap();
        table
            .push_row(vec!["img/b.png".into(), "msk/b.png".into()])
            .unwrap();
        table
    }

    #[test]
    fn select_projects_columns_in_order() {
        let table = sample_table();
        let selected = table.select(&["mask_path".into()]).unwrap();
        assert_eq!(selected.columns, vec!["mask_path".to_string()]);
        assert_eq!(selected.rows, vec![vec!["msk/a.png"], vec!["msk/b.png"]]);
    }

    #[test]
    fn select_unknown_column_fails() {
        let table = sample_table();
        assert!(table.select(&["annotation".into()]).is_err());
    }

    #[test]
    fn push_row_rejects_wrong_arity() {
        let mut table = sample_table();
        assert!(table.push_row(vec!["only-one".into()]).is_err());
    }

    #[test]
    fn probability_maps_indexing_is_channel_major() {
        let mut maps = ProbabilityMaps::new(2, 3, 4);
        *maps.at_mut(1, 2, 3) = 0.5;
        assert_eq!(maps.at(1, 2, 3), 0.5);
        assert_eq!(maps.channel(0).len(), 12);
        assert_eq!(maps.channel(1)[2 * 4 + 3], 0.5);
    }

    #[test]
    fn item_counts() {
        assert_eq!(StepData::Meta(sample_table()).item_count(), 2);
        assert_eq!(StepData::Flag(true).item_count(), 1);
        assert_eq!(
            StepData::Seq(vec![StepData::Flag(true), StepData::Flag(false)]).item_count(),
            2
        );
    }
}
