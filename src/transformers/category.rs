//! Category mapping
//!
//! Collapses each per-channel probability stack into a discrete category
//! mask by per-pixel argmax (ties go to the lower channel index).

use crate::data::{CategoryMask, DataBundle, ProbabilityMaps, StepData};
use crate::transformers::{take_maps, Transformer};
use crate::Result;
use async_trait::async_trait;

const OUTPUTS: &[&str] = &["categorized_images"];

fn categorize(maps: &ProbabilityMaps) -> CategoryMask {
    let mut mask = CategoryMask::new(maps.height, maps.width);
    for y in 0..maps.height {
        for x in 0..maps.width {
            let mut best = 0usize;
            let mut best_value = maps.at(0, y, x);
            for c in 1..maps.channels {
                let value = maps.at(c, y, x);
                if value > best_value {
                    best = c;
                    best_value = value;
                }
            }
            mask.categories[y * maps.width + x] = best as u16;
        }
    }
    mask
}

/// Batch category mapper
pub struct CategoryMapper;

#[async_trait]
impl Transformer for CategoryMapper {
    fn name(&self) -> &'static str {
        "CategoryMapper"
    }

    fn output_keys(&self) -> Option<&'static [&'static str]> {
        Some(OUTPUTS)
    }

    async fn transform(&mut self, mut inputs: DataBundle) -> Result<DataBundle> {
        let images = take_maps(&mut inputs, "images", self.name())?;
        let masks = images.iter().map(categorize).collect();
        let mut out = DataBundle::new();
        out.insert("categorized_images".into(), StepData::Masks(masks));
        Ok(out)
    }
}

/// Streaming category mapper: one image at a time, yielding between images
pub struct CategoryMapperStream;

#[async_trait]
impl Transformer for CategoryMapperStream {
    fn name(&self) -> &'static str {
        "CategoryMapperStream"
    }

    fn output_keys(&self) -> Option<&'static [&'static str]> {
        Some(OUTPUTS)
    }

    async fn transform(&mut self, mut inputs: DataBundle) -> Result<DataBundle> {
        let images = take_maps(&mut inputs, "images", self.name())?;
        let mut masks = Vec::with_capacity(images.len());
        for maps in &images {
            masks.push(categorize(maps));
            tokio::task::yield_now().await;
        }
        let mut out = DataBundle::new();
        out.insert("categorized_images".into(), StepData::Masks(masks));
        Ok(out)
    }
}
