//! Mask dilation
//!
//! Morphological dilation of category masks with a square structuring
//! element. Each category is dilated as a binary mask; where dilations
//! overlap, the higher category index wins. The output key stays
//! `categorized_images` so the labeling stage reads the same vocabulary
//! whether or not a dilation step sits in between.

use crate::config::PostprocessorConfig;
use crate::data::{CategoryMask, DataBundle, StepData};
use crate::transformers::{take_masks, Transformer};
use crate::Result;
use async_trait::async_trait;

const OUTPUTS: &[&str] = &["categorized_images"];

fn dilate(mask: &CategoryMask, selem_size: u32) -> CategoryMask {
    let radius = (selem_size / 2) as isize;
    if radius == 0 {
        return mask.clone();
    }
    let (h, w) = (mask.height as isize, mask.width as isize);
    let mut out = CategoryMask::new(mask.height, mask.width);
    for y in 0..h {
        for x in 0..w {
            let mut best = 0u16;
            for dy in -radius..=radius {
                let sy = y + dy;
                if sy < 0 || sy >= h {
                    continue;
                }
                for dx in -radius..=radius {
                    let sx = x + dx;
                    if sx < 0 || sx >= w {
                        continue;
                    }
                    let c = mask.at(sy as usize, sx as usize);
                    if c > best {
                        best = c;
                    }
                }
            }
            out.categories[(y * w + x) as usize] = best;
        }
    }
    out
}

/// Batch mask dilator
pub struct MaskDilator {
    selem_size: u32,
}

impl MaskDilator {
    /// Create the dilator from the post-processing configuration group
    pub fn new(config: &PostprocessorConfig) -> Self {
        Self {
            selem_size: config.dilate_selem_size,
        }
    }
}

#[async_trait]
impl Transformer for MaskDilator {
    fn name(&self) -> &'static str {
        "MaskDilator"
    }

    fn output_keys(&self) -> Option<&'static [&'static str]> {
        Some(OUTPUTS)
    }

    async fn transform(&mut self, mut inputs: DataBundle) -> Result<DataBundle> {
        let images = take_masks(&mut inputs, "images", self.name())?;
        let dilated = images.iter().map(|m| dilate(m, self.selem_size)).collect();
        let mut out = DataBundle::new();
        out.insert("categorized_images".into(), StepData::Masks(dilated));
        Ok(out)
    }
}

/// Streaming mask dilator: one image at a time, yielding between images
pub struct MaskDilatorStream {
    selem_size: u32,
}

impl MaskDilatorStream {
    /// Create the dilator from the post-processing configuration group
    pub fn new(config: &PostprocessorConfig) -> Self {
        Self {
            selem_size: config.dilate_selem_size,
        }
    }
}

#[async_trait]
impl Transformer for MaskDilatorStream {
    fn name(&self) -> &'static str {
        "MaskDilatorStream"
    }

    fn output_keys(&self) -> Option<&'static [&'static str]> {
        Some(OUTPUTS)
    }

    async fn transform(&mut self, mut inputs: DataBundle) -> Result<DataBundle> {
        let images = take_masks(&mut inputs, "images", self.name())?;
        let mut dilated = Vec::with_capacity(images.len());
        for mask in &images {
            dilated.push(dilate(mask, self.selem_size));
            tokio::task::yield_now().await;
        }
        let mut out = DataBundle::new();
        out.insert("categorized_images".into(), StepData::Masks(dilated));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_pixel_mask() -> CategoryMask {
        let mut mask = CategoryMask::new(5, 5);
        mask.categories[2 * 5 + 2] = 1;
        mask
    }

    #[test]
    fn square_selem_grows_a_single_pixel() {
        let dilated = dilate(&single_pixel_mask(), 3);
        let foreground = dilated.categories.iter().filter(|&&c| c != 0).count();
        assert_eq!(foreground, 9);
        assert_eq!(dilated.at(1, 1), 1);
        assert_eq!(dilated.at(0, 0), 0);
    }

    #[test]
    fn selem_size_one_is_identity() {
        let mask = single_pixel_mask();
        assert_eq!(dilate(&mask, 1), mask);
    }

    #[test]
    fn higher_category_wins_on_overlap() {
        let mut mask = CategoryMask::new(1, 4);
        mask.categories[0] = 1;
        mask.categories[3] = 2;
        let dilated = dilate(&mask, 3);
        // the middle pixels see both neighborhoods
        assert_eq!(dilated.at(0, 1), 1);
        assert_eq!(dilated.at(0, 2), 2);
    }

    #[tokio::test]
    async fn batch_and_stream_variants_agree() {
        let config = PostprocessorConfig {
            dilate_selem_size: 3,
        };
        let mut inputs = DataBundle::new();
        inputs.insert("images".into(), StepData::Masks(vec![single_pixel_mask()]));

        let batch = MaskDilator::new(&config)
            .transform(inputs.clone())
            .await
            .unwrap();
        let stream = MaskDilatorStream::new(&config)
            .transform(inputs)
            .await
            .unwrap();
        assert_eq!(batch, stream);
    }
}
