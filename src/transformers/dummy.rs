//! Pass-through transformer
//!
//! Returns its input bundle unchanged. Used as the terminal step of a
//! pipeline, where the adapter alone renames the upstream output to the
//! externally expected result key, decoupling internal step names from
//! the external contract.

use crate::data::DataBundle;
use crate::transformers::Transformer;
use crate::Result;
use async_trait::async_trait;

/// Pass-through transformer; outputs mirror the adapter's input names
pub struct Dummy;

#[async_trait]
impl Transformer for Dummy {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn output_keys(&self) -> Option<&'static [&'static str]> {
        None
    }

    async fn transform(&mut self, inputs: DataBundle) -> Result<DataBundle> {
        Ok(inputs)
    }
}
