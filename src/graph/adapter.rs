//! Per-step input adapters
//!
//! An adapter maps each input name a step's transformer requires to one or
//! more `(source, output key)` references, optionally passed through a
//! reshaping function before delivery. Sources are either raw input
//! bundles or upstream steps. Resolution is a pure read against the
//! graph's result table.

use crate::data::{DataBundle, StepData};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A `(source, output key)` reference into the result table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRef {
    /// Raw bundle name or upstream step name
    pub source: String,
    /// Output key within the source's bundle
    pub key: String,
}

impl<S: Into<String>, K: Into<String>> From<(S, K)> for DataRef {
    fn from((source, key): (S, K)) -> Self {
        Self {
            source: source.into(),
            key: key.into(),
        }
    }
}

/// Value-reshaping function applied to a resolved slot before delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reshape {
    /// Collapse a singleton `Seq` into its inner value
    Squeeze,
}

impl Reshape {
    /// Apply the reshaping function
    pub fn apply(&self, value: StepData) -> Result<StepData> {
        match self {
            Reshape::Squeeze => match value {
                StepData::Seq(mut items) if items.len() == 1 => Ok(items.remove(0)),
                other => Err(Error::InvalidInput(format!(
                    "squeeze expects a singleton sequence, got '{}' with {} items",
                    other.data_type(),
                    other.item_count()
                ))),
            },
        }
    }
}

/// One adapter slot: the references feeding a single input name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterSlot {
    /// References, in declaration order
    pub refs: Vec<DataRef>,
    /// Optional reshaping applied after collection
    pub reshape: Option<Reshape>,
}

/// Mapping from a transformer's input names to upstream output references
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adapter {
    slots: BTreeMap<String, AdapterSlot>,
}

impl Adapter {
    /// Create an empty adapter
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an input name to a single reference
    pub fn bind(mut self, input: impl Into<String>, r: impl Into<DataRef>) -> Self {
        self.slots.insert(
            input.into(),
            AdapterSlot {
                refs: vec![r.into()],
                reshape: None,
            },
        );
        self
    }

    /// Bind an input name to a single reference with a reshaping function
    pub fn bind_with(
        mut self,
        input: impl Into<String>,
        r: impl Into<DataRef>,
        reshape: Reshape,
    ) -> Self {
        self.slots.insert(
            input.into(),
            AdapterSlot {
                refs: vec![r.into()],
                reshape: Some(reshape),
            },
        );
        self
    }

    /// Bind an input name to several references, collected positionally
    /// into a sequence before the optional reshaping
    pub fn bind_many<R: Into<DataRef>>(
        mut self,
        input: impl Into<String>,
        refs: impl IntoIterator<Item = R>,
        reshape: Option<Reshape>,
    ) -> Self {
        self.slots.insert(
            input.into(),
            AdapterSlot {
                refs: refs.into_iter().map(Into::into).collect(),
                reshape,
            },
        );
        self
    }

    /// Iterate over `(input name, slot)` pairs in input-name order
    pub fn slots(&self) -> impl Iterator<Item = (&String, &AdapterSlot)> {
        self.slots.iter()
    }

    /// Whether the adapter declares no inputs
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Resolve a step's adapter against the result table, producing the
/// concrete input bundle for its transformer
///
/// A reference is legal when its source names either one of the step's raw
/// input bundles or one of its upstream steps; anything else (typos,
/// references to steps outside `upstream`) is an unresolved reference.
pub fn resolve(
    step_name: &str,
    adapter: &Adapter,
    upstream: &[String],
    raw_inputs: &[String],
    table: &HashMap<String, DataBundle>,
) -> Result<DataBundle> {
    let mut out = DataBundle::new();
    for (input, slot) in adapter.slots() {
        let mut values = Vec::with_capacity(slot.refs.len());
        for r in &slot.refs {
            let declared = raw_inputs.iter().any(|s| s == &r.source)
                || upstream.iter().any(|s| s == &r.source);
            if !declared {
                return Err(Error::UnresolvedReference {
                    step: step_name.to_string(),
                    source: r.source.clone(),
                });
            }
            let bundle = table
                .get(&r.source)
                .ok_or_else(|| Error::UnresolvedReference {
                    step: step_name.to_string(),
                    source: r.source.clone(),
                })?;
            let value = bundle.get(&r.key).ok_or_else(|| Error::MissingOutputKey {
                step: step_name.to_string(),
                source: r.source.clone(),
                key: r.key.clone(),
            })?;
            values.push(value.clone());
        }
        let mut value = if values.len() == 1 {
            values.pop().unwrap()
        } else {
            StepData::Seq(values)
        };
        if let Some(reshape) = slot.reshape {
            value = reshape.apply(value)?;
        }
        out.insert(input.clone(), value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MetaTable;

    fn table_with(source: &str, key: &str, value: StepData) -> HashMap<String, DataBundle> {
        let mut bundle = DataBundle::new();
        bundle.insert(key.to_string(), value);
        let mut table = HashMap::new();
        table.insert(source.to_string(), bundle);
        table
    }

    #[test]
    fn single_reference_passes_value_through() {
        let table = table_with("input", "train_mode", StepData::Flag(true));
        let adapter = Adapter::new().bind("train_mode", ("input", "train_mode"));
        let bundle = resolve("s", &adapter, &[], &["input".into()], &table).unwrap();
        assert_eq!(bundle["train_mode"], StepData::Flag(true));
    }

    #[test]
    fn multiple_references_collect_in_declaration_order() {
        let mut bundle = DataBundle::new();
        bundle.insert("a".into(), StepData::Flag(true));
        bundle.insert("b".into(), StepData::Flag(false));
        let mut table = HashMap::new();
        table.insert("up".to_string(), bundle);

        let adapter = Adapter::new().bind_many(
            "flags",
            [("up", "a"), ("up", "b")],
            None,
        );
        let resolved = resolve("s", &adapter, &["up".into()], &[], &table).unwrap();
        assert_eq!(
            resolved["flags"],
            StepData::Seq(vec![StepData::Flag(true), StepData::Flag(false)])
        );
    }

    #[test]
    fn squeeze_unwraps_singleton_sequence() {
        let meta = MetaTable::new(vec!["file_path".into()]);
        let wrapped = StepData::Seq(vec![StepData::Meta(meta.clone())]);
        let table = table_with("xy_train", "X", wrapped);
        let adapter = Adapter::new().bind_with("X", ("xy_train", "X"), Reshape::Squeeze);
        let bundle = resolve("loader", &adapter, &["xy_train".into()], &[], &table).unwrap();
        assert_eq!(bundle["X"], StepData::Meta(meta));
    }

    #[test]
    fn squeeze_rejects_non_singleton() {
        let table = table_with("up", "v", StepData::Seq(vec![]));
        let adapter = Adapter::new().bind_with("v", ("up", "v"), Reshape::Squeeze);
        let err = resolve("s", &adapter, &["up".into()], &[], &table).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn undeclared_source_is_unresolved() {
        let table = table_with("elsewhere", "v", StepData::Flag(true));
        let adapter = Adapter::new().bind("v", ("elsewhere", "v"));
        // "elsewhere" exists in the table but is not declared by the step
        let err = resolve("s", &adapter, &["up".into()], &[], &table).unwrap_err();
        assert!(matches!(err, Error::UnresolvedReference { source, .. } if source == "elsewhere"));
    }

    #[test]
    fn missing_key_on_existing_source() {
        let table = table_with("up", "present", StepData::Flag(true));
        let adapter = Adapter::new().bind("v", ("up", "absent"));
        let err = resolve("s", &adapter, &["up".into()], &[], &table).unwrap_err();
        assert!(matches!(err, Error::MissingOutputKey { key, .. } if key == "absent"));
    }

    #[test]
    fn resolution_is_deterministic() {
        let table = table_with("input", "meta", StepData::Meta(MetaTable::new(vec![])));
        let adapter = Adapter::new().bind("meta", ("input", "meta"));
        let first = resolve("s", &adapter, &[], &["input".into()], &table).unwrap();
        let second = resolve("s", &adapter, &[], &["input".into()], &table).unwrap();
        assert_eq!(first, second);
    }
}
