//! Step graph model and evaluation
//!
//! A [`Step`] is a named node owning a transformer, the names of the steps
//! it reads from, an adapter translating producer output keys into its
//! transformer's input names, and a caching policy. A [`StepGraph`] owns
//! the steps, enforces name uniqueness and wiring validity, computes a
//! dependency-respecting evaluation order, and evaluates steps strictly
//! sequentially with per-step memoization.

pub mod adapter;
pub mod cache;

use crate::data::{DataBundle, RawData};
use crate::transformers::Transformer;
use crate::{Error, Result};
use adapter::Adapter;
use cache::CachePolicy;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// A named node in the step graph
pub struct Step {
    name: String,
    transformer: Box<dyn Transformer>,
    upstream: Vec<String>,
    raw_inputs: Vec<String>,
    adapter: Adapter,
    cache: CachePolicy,
}

impl Step {
    /// Create a step with no dependencies, an empty adapter, and caching
    /// disabled
    pub fn new(name: impl Into<String>, transformer: Box<dyn Transformer>) -> Self {
        Self {
            name: name.into(),
            transformer,
            upstream: Vec::new(),
            raw_inputs: Vec::new(),
            adapter: Adapter::new(),
            cache: CachePolicy::disabled(),
        }
    }

    /// Declare the upstream steps this step reads from, in order
    pub fn upstream<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.upstream = steps.into_iter().map(Into::into).collect();
        self
    }

    /// Declare a raw input bundle this step may read from
    pub fn raw_input(mut self, name: impl Into<String>) -> Self {
        self.raw_inputs.push(name.into());
        self
    }

    /// Attach the input adapter
    pub fn adapter(mut self, adapter: Adapter) -> Self {
        self.adapter = adapter;
        self
    }

    /// Attach the caching policy
    pub fn cache(mut self, cache: CachePolicy) -> Self {
        self.cache = cache;
        self
    }

    /// The step's unique name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the upstream steps
    pub fn upstream_steps(&self) -> &[String] {
        &self.upstream
    }

    /// Names of the declared raw input bundles
    pub fn raw_input_names(&self) -> &[String] {
        &self.raw_inputs
    }

    /// The transformer's type name
    pub fn transformer_name(&self) -> &'static str {
        self.transformer.name()
    }

    /// Structural signature: everything about the step except the bound
    /// transformer's identity
    pub fn signature(&self) -> StepSignature {
        StepSignature {
            name: self.name.clone(),
            upstream: self.upstream.clone(),
            raw_inputs: self.raw_inputs.clone(),
            adapter: self.adapter.clone(),
        }
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("transformer", &self.transformer.name())
            .field("upstream", &self.upstream)
            .field("raw_inputs", &self.raw_inputs)
            .finish()
    }
}

/// The wiring of one step, used for topology comparisons that ignore
/// which transformer family is bound
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepSignature {
    /// Step name
    pub name: String,
    /// Upstream step names, in order
    pub upstream: Vec<String>,
    /// Raw input bundle names
    pub raw_inputs: Vec<String>,
    /// The input adapter
    pub adapter: Adapter,
}

/// The DAG of steps reachable from a designated output step
#[derive(Default)]
pub struct StepGraph {
    steps: HashMap<String, Step>,
    output_step: Option<String>,
}

impl StepGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step, validating its wiring against the steps already present
    ///
    /// Rejects duplicate names and empty adapter slots. Adapter references
    /// whose source is an upstream step already in the graph are checked
    /// against that transformer's declared output keys; references to raw
    /// bundles (and to upstream steps added later) are checked at
    /// execution time instead.
    pub fn add_step(&mut self, step: Step) -> Result<()> {
        if self.steps.contains_key(step.name()) {
            return Err(Error::Construction(format!(
                "duplicate step name: {}",
                step.name()
            )));
        }
        for (input, slot) in step.adapter.slots() {
            if slot.refs.is_empty() {
                return Err(Error::Construction(format!(
                    "step '{}': adapter slot '{}' declares no references",
                    step.name(),
                    input
                )));
            }
            for r in &slot.refs {
                if step.raw_inputs.iter().any(|s| s == &r.source) {
                    continue;
                }
                if !step.upstream.iter().any(|s| s == &r.source) {
                    return Err(Error::UnresolvedReference {
                        step: step.name().to_string(),
                        source: r.source.clone(),
                    });
                }
                if let Some(producer) = self.steps.get(&r.source) {
                    if let Some(keys) = producer.transformer.output_keys() {
                        if !keys.contains(&r.key.as_str()) {
                            return Err(Error::MissingOutputKey {
                                step: step.name().to_string(),
                                source: r.source.clone(),
                                key: r.key.clone(),
                            });
                        }
                    }
                }
            }
        }
        debug!(step = %step.name(), transformer = step.transformer_name(), "step added");
        self.steps.insert(step.name().to_string(), step);
        Ok(())
    }

    /// Designate the terminal step whose result is the pipeline's result
    pub fn set_output(&mut self, name: &str) -> Result<()> {
        if !self.steps.contains_key(name) {
            return Err(Error::Construction(format!(
                "output step '{name}' is not in the graph"
            )));
        }
        self.output_step = Some(name.to_string());
        Ok(())
    }

    /// The designated output step, if set
    pub fn output_step(&self) -> Option<&str> {
        self.output_step.as_deref()
    }

    /// Look up a step by name
    pub fn get_step(&self, name: &str) -> Option<&Step> {
        self.steps.get(name)
    }

    /// Whether a step with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    /// Number of steps in the graph (including any unreachable from the
    /// output step)
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the graph has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Evaluation order: depth-first post-order from the output step, so
    /// every step appears strictly after all steps it reads from
    ///
    /// Shared ancestors (diamond dependencies) are emitted once. Re-entering
    /// a step still on the active traversal stack is a cycle and fails
    /// before any transformer runs.
    pub fn execution_order(&self) -> Result<Vec<String>> {
        let output = self
            .output_step
            .as_deref()
            .ok_or_else(|| Error::Construction("output step not set".into()))?;
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut path = Vec::new();
        self.visit(output, None, &mut visited, &mut on_stack, &mut path, &mut order)?;
        Ok(order)
    }

    fn visit(
        &self,
        name: &str,
        dependent: Option<&str>,
        visited: &mut HashSet<String>,
        on_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        if on_stack.contains(name) {
            let start = path.iter().position(|n| n == name).unwrap();
            let mut cycle = path[start..].to_vec();
            cycle.push(name.to_string());
            return Err(Error::CyclicGraph(cycle));
        }
        if visited.contains(name) {
            return Ok(());
        }
        let step = self.steps.get(name).ok_or_else(|| {
            Error::Construction(match dependent {
                Some(d) => format!("step '{d}' depends on unknown step '{name}'"),
                None => format!("unknown step '{name}'"),
            })
        })?;
        on_stack.insert(name.to_string());
        path.push(name.to_string());
        for up in &step.upstream {
            self.visit(up, Some(name), visited, on_stack, path, order)?;
        }
        path.pop();
        on_stack.remove(name);
        visited.insert(name.to_string());
        order.push(name.to_string());
        Ok(())
    }

    /// The name → signature registry of every step reachable from the
    /// output step
    pub fn wiring(&self) -> Result<BTreeMap<String, StepSignature>> {
        let order = self.execution_order()?;
        Ok(order
            .into_iter()
            .map(|name| (name.clone(), self.steps[&name].signature()))
            .collect())
    }

    /// Evaluate the graph against caller-supplied raw data and return the
    /// output step's bundle
    ///
    /// Steps run strictly in dependency order, one at a time; a step's
    /// outputs are published atomically after its transformer completes. A
    /// transformer failure aborts the invocation with the failing step's
    /// name attached; downstream steps never run.
    pub async fn execute(&mut self, raw: RawData) -> Result<DataBundle> {
        let order = self.execution_order()?;
        info!(steps = order.len(), output = %order.last().unwrap(), "evaluating step graph");

        let mut table: HashMap<String, DataBundle> = raw;
        for name in &order {
            let (inputs, policy) = {
                let step = &self.steps[name];
                let inputs = adapter::resolve(
                    name,
                    &step.adapter,
                    &step.upstream,
                    &step.raw_inputs,
                    &table,
                )?;
                (inputs, step.cache.clone())
            };

            let blob = if policy.is_active() {
                Some(cache::blob_path(&policy, name, &inputs)?)
            } else {
                None
            };

            if policy.load_saved_output {
                if let Some(outputs) = blob.as_deref().and_then(|p| cache::load_blob(p, name)) {
                    debug!(step = %name, "using cached output");
                    table.insert(name.clone(), outputs);
                    continue;
                }
            }

            let step = self.steps.get_mut(name).unwrap();
            debug!(step = %name, transformer = step.transformer.name(), "running transformer");
            let outputs = step
                .transformer
                .transform(inputs)
                .await
                .map_err(|e| Error::TransformerExecution {
                    step: name.clone(),
                    source: Box::new(e),
                })?;

            if policy.save_output {
                // blob is Some whenever the policy is active
                cache::save_blob(blob.as_deref().unwrap(), name, &outputs)?;
            }
            table.insert(name.clone(), outputs);
        }

        let output = self.output_step.as_deref().unwrap();
        Ok(table.remove(output).unwrap())
    }

    /// Evaluate with a single raw bundle registered under the conventional
    /// `"input"` name
    pub async fn execute_with_input(&mut self, bundle: DataBundle) -> Result<DataBundle> {
        let mut raw = RawData::new();
        raw.insert("input".to_string(), bundle);
        self.execute(raw).await
    }
}

impl std::fmt::Debug for StepGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepGraph")
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .field("output_step", &self.output_step)
            .finish()
    }
}
