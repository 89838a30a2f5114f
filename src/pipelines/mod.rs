//! Mode-branched graph builders
//!
//! One construction path serves every `(task kind, run mode, execution
//! mode)` combination: the run mode decides how many split branches feed
//! the loader, the task kind decides which splitter/loader family is
//! bound, and the execution mode decides the batch or streaming variant
//! at every stage without touching topology, step names, or adapters.

pub mod registry;

pub use registry::{PipelineBuilder, PipelineRegistry};

use crate::config::{Config, SplitterConfig};
use crate::context::{ExecutionMode, RunContext, RunMode, TaskKind};
use crate::graph::adapter::{Adapter, Reshape};
use crate::graph::{Step, StepGraph};
use crate::transformers::{
    CategoryMapper, CategoryMapperStream, Dummy, MaskDilator, MaskDilatorStream,
    MulticlassLabeler, MulticlassLabelerStream, MultitaskSegmentationLoader, Resizer,
    ResizerStream, SegmentationLoader, Transformer, UnetModel, UnetModelStream, XySplitter,
};
use crate::{Error, Result};
use tracing::info;

fn unet_model(config: &Config, ctx: &RunContext) -> Box<dyn Transformer> {
    match ctx.execution_mode {
        ExecutionMode::Batch => Box::new(UnetModel::new(&config.unet)),
        ExecutionMode::Stream => Box::new(UnetModelStream::new(&config.unet)),
    }
}

fn resizer(ctx: &RunContext) -> Box<dyn Transformer> {
    match ctx.execution_mode {
        ExecutionMode::Batch => Box::new(Resizer),
        ExecutionMode::Stream => Box::new(ResizerStream),
    }
}

fn category_mapper(ctx: &RunContext) -> Box<dyn Transformer> {
    match ctx.execution_mode {
        ExecutionMode::Batch => Box::new(CategoryMapper),
        ExecutionMode::Stream => Box::new(CategoryMapperStream),
    }
}

fn dilator(config: &Config, ctx: &RunContext) -> Box<dyn Transformer> {
    match ctx.execution_mode {
        ExecutionMode::Batch => Box::new(MaskDilator::new(&config.postprocessor)),
        ExecutionMode::Stream => Box::new(MaskDilatorStream::new(&config.postprocessor)),
    }
}

fn labeler(ctx: &RunContext) -> Box<dyn Transformer> {
    match ctx.execution_mode {
        ExecutionMode::Batch => Box::new(MulticlassLabeler),
        ExecutionMode::Stream => Box::new(MulticlassLabelerStream),
    }
}

/// Build the `unet` pipeline: split → load → model → resize → categorize
/// → (dilate) → label → rename
///
/// The terminal `output` step is a pass-through whose adapter renames the
/// labeling step's `labeled_images` to the externally expected `y_pred`,
/// so internal step names can change without breaking callers.
pub fn unet(config: &Config, run_mode: RunMode) -> Result<StepGraph> {
    let ctx = RunContext::from_config(config);
    info!(mode = %run_mode, execution = %ctx.execution_mode, "building unet pipeline");

    let mut graph = StepGraph::new();
    let loader = preprocessing(&mut graph, config, &ctx, TaskKind::Single, run_mode)?;

    graph.add_step(
        Step::new("unet", unet_model(config, &ctx))
            .upstream([loader.as_str()])
            .adapter(Adapter::new().bind("datagen", (loader.as_str(), "datagen")))
            .cache(ctx.step_cache(ctx.save_outputs, ctx.load_saved_outputs)),
    )?;

    let mask_postprocessed = mask_postprocessing(&mut graph, &ctx, "unet")?;
    let mask_postprocessed = if config.postprocessor.dilate_selem_size > 0 {
        graph.add_step(
            Step::new("mask_dilation", dilator(config, &ctx))
                .upstream([mask_postprocessed.as_str()])
                .adapter(Adapter::new().bind(
                    "images",
                    (mask_postprocessed.as_str(), "categorized_images"),
                ))
                .cache(ctx.step_cache(ctx.save_outputs, false)),
        )?;
        "mask_dilation".to_string()
    } else {
        mask_postprocessed
    };

    let detached = multiclass_object_labeler(&mut graph, &ctx, &mask_postprocessed)?;

    graph.add_step(
        Step::new("output", Box::new(Dummy))
            .upstream([detached.as_str()])
            .adapter(Adapter::new().bind("y_pred", (detached.as_str(), "labeled_images"))),
    )?;
    graph.set_output("output")?;
    Ok(graph)
}

/// Build the split/load front of a pipeline and return the loader step's
/// name
///
/// Train mode builds two split branches (`xy_train`, `xy_inference`)
/// feeding one loader; inference mode builds a single branch whose
/// outputs serve both the primary and the `_valid` loader inputs (there
/// is no independent validation subset at inference time, by design).
pub fn preprocessing(
    graph: &mut StepGraph,
    config: &Config,
    ctx: &RunContext,
    task: TaskKind,
    run_mode: RunMode,
) -> Result<String> {
    if config.loader.patching {
        return Err(Error::UnsupportedMode(
            "patch-based loading has no builder".into(),
        ));
    }
    let (splitter_cfg, loader, squeeze_y): (&SplitterConfig, Box<dyn Transformer>, bool) =
        match task {
            TaskKind::Single => (
                &config.xy_splitter,
                Box::new(SegmentationLoader::new(&config.loader)),
                true,
            ),
            TaskKind::Multitask => (
                &config.xy_splitter_multitask,
                Box::new(MultitaskSegmentationLoader::new(&config.loader)),
                false,
            ),
        };
    split_branch(graph, ctx, run_mode, splitter_cfg, loader, squeeze_y)
}

fn splitter_step(name: &str, splitter_cfg: &SplitterConfig, meta_key: &str) -> Step {
    Step::new(name, Box::new(XySplitter::new(splitter_cfg)))
        .raw_input("input")
        .adapter(
            Adapter::new()
                .bind("meta", ("input", meta_key))
                .bind("train_mode", ("input", "train_mode")),
        )
}

fn bind_split_output(adapter: Adapter, input: &str, source: &str, key: &str, squeeze: bool) -> Adapter {
    if squeeze {
        adapter.bind_with(input, (source, key), Reshape::Squeeze)
    } else {
        adapter.bind(input, (source, key))
    }
}

fn split_branch(
    graph: &mut StepGraph,
    ctx: &RunContext,
    run_mode: RunMode,
    splitter_cfg: &SplitterConfig,
    loader: Box<dyn Transformer>,
    squeeze_y: bool,
) -> Result<String> {
    match run_mode {
        RunMode::Train => {
            graph.add_step(splitter_step("xy_train", splitter_cfg, "meta"))?;
            graph.add_step(splitter_step("xy_inference", splitter_cfg, "meta_valid"))?;

            let mut adapter = Adapter::new()
                .bind_with("X", ("xy_train", "X"), Reshape::Squeeze)
                .bind("train_mode", ("input", "train_mode"))
                .bind_with("X_valid", ("xy_inference", "X"), Reshape::Squeeze);
            adapter = bind_split_output(adapter, "y", "xy_train", "y", squeeze_y);
            adapter = bind_split_output(adapter, "y_valid", "xy_inference", "y", squeeze_y);

            graph.add_step(
                Step::new("loader", loader)
                    .raw_input("input")
                    .upstream(["xy_train", "xy_inference"])
                    .adapter(adapter)
                    .cache(ctx.step_cache(false, false)),
            )?;
        }
        RunMode::Inference => {
            graph.add_step(splitter_step("xy_inference", splitter_cfg, "meta"))?;

            // the single split serves both loader input halves
            let mut adapter = Adapter::new()
                .bind_with("X", ("xy_inference", "X"), Reshape::Squeeze)
                .bind("train_mode", ("input", "train_mode"))
                .bind_with("X_valid", ("xy_inference", "X"), Reshape::Squeeze);
            adapter = bind_split_output(adapter, "y", "xy_inference", "y", squeeze_y);
            adapter = bind_split_output(adapter, "y_valid", "xy_inference", "y", squeeze_y);

            graph.add_step(
                Step::new("loader", loader)
                    .raw_input("input")
                    .upstream(["xy_inference"])
                    .adapter(adapter)
                    .cache(ctx.step_cache(false, false)),
            )?;
        }
    }
    Ok("loader".to_string())
}

/// Build the resize → categorize tail shared by every run mode; returns
/// the chain's last step name
pub fn mask_postprocessing(
    graph: &mut StepGraph,
    ctx: &RunContext,
    model_step: &str,
) -> Result<String> {
    graph.add_step(
        Step::new("mask_resize", resizer(ctx))
            .raw_input("input")
            .upstream([model_step])
            .adapter(
                Adapter::new()
                    .bind("images", (model_step, "multichannel_map_prediction"))
                    .bind("target_sizes", ("input", "target_sizes")),
            )
            .cache(ctx.step_cache(ctx.save_outputs, false)),
    )?;
    graph.add_step(
        Step::new("category_mapper", category_mapper(ctx))
            .upstream(["mask_resize"])
            .adapter(Adapter::new().bind("images", ("mask_resize", "resized_images")))
            .cache(ctx.step_cache(ctx.save_outputs, false)),
    )?;
    Ok("category_mapper".to_string())
}

/// Add the connected-component labeling step; returns its name
pub fn multiclass_object_labeler(
    graph: &mut StepGraph,
    ctx: &RunContext,
    postprocessed: &str,
) -> Result<String> {
    graph.add_step(
        Step::new("labeler", labeler(ctx))
            .upstream([postprocessed])
            .adapter(Adapter::new().bind("images", (postprocessed, "categorized_images")))
            .cache(ctx.step_cache(ctx.save_outputs, false)),
    )?;
    Ok("labeler".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::from_json(
            r#"{
                "xy_splitter": {"x_columns": ["file_path"], "y_columns": ["mask_path"]},
                "unet": {"num_classes": 3, "image_height": 16, "image_width": 16},
                "env": {"cache_dirpath": "/tmp/segpipe-cache"}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn train_graph_has_two_split_branches() {
        let graph = unet(&config(), RunMode::Train).unwrap();
        let wiring = graph.wiring().unwrap();
        assert!(wiring.contains_key("xy_train"));
        assert!(wiring.contains_key("xy_inference"));
        assert_eq!(
            wiring["loader"].upstream,
            vec!["xy_train".to_string(), "xy_inference".to_string()]
        );
    }

    #[test]
    fn inference_graph_reuses_one_split_for_both_halves() {
        let graph = unet(&config(), RunMode::Inference).unwrap();
        let wiring = graph.wiring().unwrap();
        assert!(!wiring.contains_key("xy_train"));
        assert_eq!(wiring["loader"].upstream, vec!["xy_inference".to_string()]);

        let loader = &wiring["loader"].adapter;
        let refs: Vec<_> = loader
            .slots()
            .flat_map(|(_, slot)| slot.refs.iter())
            .filter(|r| r.source == "xy_inference")
            .collect();
        // X, y, X_valid, y_valid all read from the same splitter
        assert_eq!(refs.len(), 4);
    }

    #[test]
    fn dilation_disabled_gives_three_postprocessing_stages() {
        let graph = unet(&config(), RunMode::Inference).unwrap();
        let wiring = graph.wiring().unwrap();
        assert!(wiring.contains_key("mask_resize"));
        assert!(wiring.contains_key("category_mapper"));
        assert!(wiring.contains_key("labeler"));
        assert!(!wiring.contains_key("mask_dilation"));
        assert_eq!(
            wiring["labeler"].adapter,
            Adapter::new().bind("images", ("category_mapper", "categorized_images"))
        );
    }

    #[test]
    fn dilation_enabled_inserts_a_fourth_stage() {
        let mut config = config();
        config.postprocessor.dilate_selem_size = 5;
        let graph = unet(&config, RunMode::Inference).unwrap();
        let wiring = graph.wiring().unwrap();
        assert!(wiring.contains_key("mask_dilation"));
        assert_eq!(
            wiring["mask_dilation"].adapter,
            Adapter::new().bind("images", ("category_mapper", "categorized_images"))
        );
        assert_eq!(
            wiring["labeler"].adapter,
            Adapter::new().bind("images", ("mask_dilation", "categorized_images"))
        );
    }

    #[test]
    fn stream_mode_changes_transformers_but_not_wiring() {
        let batch = unet(&config(), RunMode::Train).unwrap();
        let mut stream_config = config();
        stream_config.execution.stream_mode = true;
        let stream = unet(&stream_config, RunMode::Train).unwrap();

        assert_eq!(batch.wiring().unwrap(), stream.wiring().unwrap());
        assert_eq!(
            batch.get_step("unet").unwrap().transformer_name(),
            "UnetModel"
        );
        assert_eq!(
            stream.get_step("unet").unwrap().transformer_name(),
            "UnetModelStream"
        );
    }

    #[test]
    fn patching_fails_fast_at_construction() {
        let mut config = config();
        config.loader.patching = true;
        let err = unet(&config, RunMode::Train).unwrap_err();
        assert!(matches!(err, Error::UnsupportedMode(_)));
    }

    #[test]
    fn multitask_preprocessing_keeps_y_unsqueezed() {
        let mut cfg = config();
        cfg.xy_splitter_multitask = SplitterConfig {
            x_columns: vec!["file_path".into()],
            y_columns: vec!["mask_path".into()],
        };
        let ctx = RunContext::from_config(&cfg);
        let mut graph = StepGraph::new();
        preprocessing(&mut graph, &cfg, &ctx, TaskKind::Multitask, RunMode::Train).unwrap();

        graph.set_output("loader").unwrap();
        let wiring = graph.wiring().unwrap();
        let loader = &wiring["loader"].adapter;
        let (_, y_slot) = loader.slots().find(|(name, _)| *name == "y").unwrap();
        assert!(y_slot.reshape.is_none());
        let (_, x_slot) = loader.slots().find(|(name, _)| *name == "X").unwrap();
        assert_eq!(x_slot.reshape, Some(Reshape::Squeeze));
    }
}
