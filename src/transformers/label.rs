//! Connected-component labeling
//!
//! Labels 4-connected components per category within each mask; component
//! ids increase across the whole image (categories are scanned in
//! ascending order), 0 stays background.

use crate::data::{CategoryMask, DataBundle, LabelMap, StepData};
use crate::transformers::{take_masks, Transformer};
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;

const OUTPUTS: &[&str] = &["labeled_images"];

fn label_components(mask: &CategoryMask) -> LabelMap {
    let (h, w) = (mask.height, mask.width);
    let mut labels = LabelMap::new(h, w);
    let mut next_label = 0u32;

    let mut categories: Vec<u16> = mask
        .categories
        .iter()
        .copied()
        .filter(|&c| c != 0)
        .collect();
    categories.sort_unstable();
    categories.dedup();

    let mut queue = VecDeque::new();
    for category in categories {
        for start in 0..h * w {
            if mask.categories[start] != category || labels.labels[start] != 0 {
                continue;
            }
            next_label += 1;
            labels.labels[start] = next_label;
            queue.push_back(start);
            while let Some(idx) = queue.pop_front() {
                let (y, x) = (idx / w, idx % w);
                let mut try_neighbor = |ny: usize, nx: usize, labels: &mut LabelMap| {
                    let nidx = ny * w + nx;
                    if mask.categories[nidx] == category && labels.labels[nidx] == 0 {
                        labels.labels[nidx] = next_label;
                        queue.push_back(nidx);
                    }
                };
                if y > 0 {
                    try_neighbor(y - 1, x, &mut labels);
                }
                if y + 1 < h {
                    try_neighbor(y + 1, x, &mut labels);
                }
                if x > 0 {
                    try_neighbor(y, x - 1, &mut labels);
                }
                if x + 1 < w {
                    try_neighbor(y, x + 1, &mut labels);
                }
            }
        }
    }
    labels
}

/// Batch labeler
pub struct MulticlassLabeler;

#[async_trait]
impl Transformer for MulticlassLabeler {
    fn name(&self) -> &'static str {
        "MulticlassLabeler"
    }

    fn output_keys(&self) -> Option<&'static [&'static str]> {
        Some(OUTPUTS)
    }

    async fn transform(&mut self, mut inputs: DataBundle) -> Result<DataBundle> {
        let images = take_masks(&mut inputs, "images", self.name())?;
        let labeled = images.iter().map(label_components).collect();
        let mut out = DataBundle::new();
        out.insert("labeled_images".into(), StepData::Labels(labeled));
        Ok(out)
    }
}

/// Streaming labeler: one image at a time, yielding between images
pub struct MulticlassLabelerStream;

#[async_trait]
impl Transformer for MulticlassLabelerStream {
    fn name(&self) -> &'static str {
        "MulticlassLabelerStream"
    }

    fn output_keys(&self) -> Option<&'static [&'static str]> {
        Some(OUTPUTS)
    }

    async fn transform(&mut self, mut inputs: DataBundle) -> Result<DataBundle> {
        let images = take_masks(&mut inputs, "images", self.name())?;
        let mut labeled = Vec::with_capacity(images.len());
        for mask in &images {
            labeled.push(label_components(mask));
            tokio::task::yield_now().await;
        }
        let mut out = DataBundle::new();
        out.insert("labeled_images".into(), StepData::Labels(labeled));
        Ok(out)
    }
}
