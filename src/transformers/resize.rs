//! Prediction resizing
//!
//! Resizes each probability stack to its sample's original target size
//! with per-channel bilinear interpolation.

use crate::data::{DataBundle, ProbabilityMaps, StepData};
use crate::transformers::{take_maps, take_sizes, Transformer};
use crate::{Error, Result};
use async_trait::async_trait;

const OUTPUTS: &[&str] = &["resized_images"];

fn resize_maps(maps: &ProbabilityMaps, target: (u32, u32)) -> Result<ProbabilityMaps> {
    let (th, tw) = (target.0 as usize, target.1 as usize);
    if th == 0 || tw == 0 {
        return Err(Error::InvalidInput(format!(
            "target size must be non-zero, got {target:?}"
        )));
    }
    if maps.height == 0 || maps.width == 0 {
        return Err(Error::InvalidInput(format!(
            "source map has zero dimension ({}x{})",
            maps.height, maps.width
        )));
    }
    let mut out = ProbabilityMaps::new(maps.channels, th, tw);
    let sy = maps.height as f32 / th as f32;
    let sx = maps.width as f32 / tw as f32;
    for c in 0..maps.channels {
        for y in 0..th {
            // sample at the source-space pixel center
            let fy = ((y as f32 + 0.5) * sy - 0.5).clamp(0.0, (maps.height - 1) as f32);
            let y0 = fy.floor() as usize;
            let y1 = (y0 + 1).min(maps.height - 1);
            let wy = fy - y0 as f32;
            for x in 0..tw {
                let fx = ((x as f32 + 0.5) * sx - 0.5).clamp(0.0, (maps.width - 1) as f32);
                let x0 = fx.floor() as usize;
                let x1 = (x0 + 1).min(maps.width - 1);
                let wx = fx - x0 as f32;

                let top = maps.at(c, y0, x0) * (1.0 - wx) + maps.at(c, y0, x1) * wx;
                let bottom = maps.at(c, y1, x0) * (1.0 - wx) + maps.at(c, y1, x1) * wx;
                *out.at_mut(c, y, x) = top * (1.0 - wy) + bottom * wy;
            }
        }
    }
    Ok(out)
}

fn check_counts(node: &str, images: usize, sizes: usize) -> Result<()> {
    if images != sizes {
        return Err(Error::InvalidInput(format!(
            "{node}: {images} images but {sizes} target sizes"
        )));
    }
    Ok(())
}

/// Batch resizer
pub struct Resizer;

#[async_trait]
impl Transformer for Resizer {
    fn name(&self) -> &'static str {
        "Resizer"
    }

    fn output_keys(&self) -> Option<&'static [&'static str]> {
        Some(OUTPUTS)
    }

    async fn transform(&mut self, mut inputs: DataBundle) -> Result<DataBundle> {
        let images = take_maps(&mut inputs, "images", self.name())?;
        let sizes = take_sizes(&mut inputs, "target_sizes", self.name())?;
        check_counts(self.name(), images.len(), sizes.len())?;

        let resized = images
            .iter()
            .zip(&sizes)
            .map(|(maps, &target)| resize_maps(maps, target))
            .collect::<Result<Vec<_>>>()?;

        let mut out = DataBundle::new();
        out.insert("resized_images".into(), StepData::Maps(resized));
        Ok(out)
    }
}

/// Streaming resizer: one image at a time, yielding between images
pub struct ResizerStream;

#[async_trait]
impl Transformer for ResizerStream {
    fn name(&self) -> &'static str {
        "ResizerStream"
    }

    fn output_keys(&self) -> Option<&'static [&'static str]> {
        Some(OUTPUTS)
    }

    async fn transform(&mut self, mut inputs: DataBundle) -> Result<DataBundle> {
        let images = take_maps(&mut inputs, "images", self.name())?;
        let sizes = take_sizes(&mut inputs, "target_sizes", self.name())?;
        check_counts(self.name(), images.len(), sizes.len())?;

        let mut resized = Vec::with_capacity(images.len());
        for (maps, &target) in images.iter().zip(&sizes) {
            resized.push(resize_maps(maps, target)?);
            tokio::task::yield_now().await;
        }

        let mut out = DataBundle::new();
        out.insert("resized_images".into(), StepData::Maps(resized));
        Ok(out)
    }
}
