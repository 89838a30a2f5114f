//! End-to-end tests for the built-in pipelines and for step output caching

use async_trait::async_trait;
use segpipe::config::Config;
use segpipe::context::RunMode;
use segpipe::data::{DataBundle, MetaTable, RawData, StepData};
use segpipe::graph::adapter::Adapter;
use segpipe::graph::cache::CachePolicy;
use segpipe::graph::{Step, StepGraph};
use segpipe::pipelines::PipelineRegistry;
use segpipe::transformers::Transformer;
use segpipe::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn config(cache_dir: &str) -> Config {
    Config::from_json(&format!(
        r#"{{
            "xy_splitter": {{"x_columns": ["file_path"], "y_columns": ["mask_path"]}},
            "unet": {{"num_classes": 3, "image_height": 16, "image_width": 16}},
            "env": {{"cache_dirpath": "{cache_dir}"}}
        }}"#
    ))
    .unwrap()
}

fn meta(rows: usize) -> MetaTable {
    let mut t = MetaTable::new(vec!["file_path".into(), "mask_path".into()]);
    for i in 0..rows {
        t.push_row(vec![format!("img/{i}.png"), format!("msk/{i}.png")])
            .unwrap();
    }
    t
}

fn inference_input(rows: usize, sizes: Vec<(u32, u32)>) -> DataBundle {
    let mut bundle = DataBundle::new();
    bundle.insert("meta".into(), StepData::Meta(meta(rows)));
    bundle.insert("train_mode".into(), StepData::Flag(false));
    bundle.insert("target_sizes".into(), StepData::Sizes(sizes));
    bundle
}

#[test]
fn train_graph_wires_two_splitters_into_the_loader() {
    let config = config("/tmp/segpipe-tests");
    let graph = PipelineRegistry::with_builtins()
        .build("unet", RunMode::Train, &config)
        .unwrap();
    let wiring = graph.wiring().unwrap();

    assert_eq!(
        wiring["loader"].upstream,
        vec!["xy_train".to_string(), "xy_inference".to_string()]
    );
    for slot in ["X", "y", "X_valid", "y_valid", "train_mode"] {
        assert!(
            wiring["loader"].adapter.slots().any(|(name, _)| name == slot),
            "loader adapter is missing slot '{slot}'"
        );
    }
}

#[test]
fn inference_graph_has_one_splitter_feeding_both_halves() {
    let config = config("/tmp/segpipe-tests");
    let graph = PipelineRegistry::with_builtins()
        .build("unet", RunMode::Inference, &config)
        .unwrap();
    let wiring = graph.wiring().unwrap();

    assert!(!wiring.contains_key("xy_train"));
    let loader = &wiring["loader"];
    assert_eq!(loader.upstream, vec!["xy_inference".to_string()]);

    let primary = loader
        .adapter
        .slots()
        .find(|(name, _)| *name == "X")
        .map(|(_, slot)| slot.refs[0].source.clone())
        .unwrap();
    let valid = loader
        .adapter
        .slots()
        .find(|(name, _)| *name == "X_valid")
        .map(|(_, slot)| slot.refs[0].source.clone())
        .unwrap();
    assert_eq!(primary, valid);
}

#[test]
fn dilation_setting_controls_postprocessing_depth() {
    let mut config = config("/tmp/segpipe-tests");
    let registry = PipelineRegistry::with_builtins();

    let without = registry
        .build("unet", RunMode::Inference, &config)
        .unwrap()
        .wiring()
        .unwrap();
    assert!(!without.contains_key("mask_dilation"));

    config.postprocessor.dilate_selem_size = 5;
    let with = registry
        .build("unet", RunMode::Inference, &config)
        .unwrap()
        .wiring()
        .unwrap();
    assert!(with.contains_key("mask_dilation"));
    assert_eq!(with.len(), without.len() + 1);
    assert_eq!(
        with["labeler"].adapter,
        Adapter::new().bind("images", ("mask_dilation", "categorized_images"))
    );
}

#[test]
fn batch_and_stream_graphs_share_topology() {
    let batch_config = config("/tmp/segpipe-tests");
    let mut stream_config = config("/tmp/segpipe-tests");
    stream_config.execution.stream_mode = true;
    let registry = PipelineRegistry::with_builtins();

    for mode in [RunMode::Train, RunMode::Inference] {
        let batch = registry.build("unet", mode, &batch_config).unwrap();
        let stream = registry.build("unet", mode, &stream_config).unwrap();
        assert_eq!(batch.wiring().unwrap(), stream.wiring().unwrap());
    }
}

#[tokio::test]
async fn inference_pipeline_produces_labeled_predictions() {
    let config = config("/tmp/segpipe-tests");
    let mut graph = PipelineRegistry::with_builtins()
        .build("unet", RunMode::Inference, &config)
        .unwrap();

    let sizes = vec![(5u32, 7u32), (9, 4)];
    let out = graph
        .execute_with_input(inference_input(2, sizes.clone()))
        .await
        .unwrap();

    match &out["y_pred"] {
        StepData::Labels(labels) => {
            assert_eq!(labels.len(), 2);
            for (label, (h, w)) in labels.iter().zip(&sizes) {
                assert_eq!((label.height, label.width), (*h as usize, *w as usize));
            }
        }
        other => panic!("expected labels, got {}", other.data_type()),
    }
}

#[tokio::test]
async fn stream_pipeline_matches_batch_output() {
    let batch_config = config("/tmp/segpipe-tests");
    let mut stream_config = config("/tmp/segpipe-tests");
    stream_config.execution.stream_mode = true;
    let registry = PipelineRegistry::with_builtins();

    let sizes = vec![(6u32, 6u32), (3, 8), (10, 2)];
    let batch_out = registry
        .build("unet", RunMode::Inference, &batch_config)
        .unwrap()
        .execute_with_input(inference_input(3, sizes.clone()))
        .await
        .unwrap();
    let stream_out = registry
        .build("unet", RunMode::Inference, &stream_config)
        .unwrap()
        .execute_with_input(inference_input(3, sizes))
        .await
        .unwrap();
    assert_eq!(batch_out, stream_out);
}

/// Emits a constant flag and counts invocations, to observe cache hits
struct Probe(Arc<AtomicUsize>);

#[async_trait]
impl Transformer for Probe {
    fn name(&self) -> &'static str {
        "Probe"
    }

    fn output_keys(&self) -> Option<&'static [&'static str]> {
        Some(&["value"])
    }

    async fn transform(&mut self, _inputs: DataBundle) -> Result<DataBundle> {
        self.0.fetch_add(1, Ordering::SeqCst);
        let mut out = DataBundle::new();
        out.insert("value".into(), StepData::Flag(true));
        Ok(out)
    }
}

#[tokio::test]
async fn cached_step_is_not_reinvoked() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut graph = StepGraph::new();
    graph
        .add_step(Step::new("probe", Box::new(Probe(calls.clone()))).cache(CachePolicy {
            save_output: true,
            load_saved_output: true,
            cache_dirpath: dir.path().to_path_buf(),
            fingerprint_inputs: false,
        }))
        .unwrap();
    graph.set_output("probe").unwrap();

    let blob = dir.path().join("probe.json");
    let first = graph.execute(RawData::new()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let first_bytes = std::fs::read(&blob).unwrap();

    let second = graph.execute(RawData::new()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1, "cached step ran again");
    assert_eq!(first, second);
    assert_eq!(
        std::fs::read(&blob).unwrap(),
        first_bytes,
        "persisted blob changed across runs"
    );
}

#[tokio::test]
async fn unwritable_cache_directory_is_fatal() {
    let mut graph = StepGraph::new();
    graph
        .add_step(Step::new("probe", Box::new(Probe(Arc::new(AtomicUsize::new(0))))).cache(
            CachePolicy {
                save_output: true,
                load_saved_output: false,
                cache_dirpath: "/proc/no-such-cache-root".into(),
                fingerprint_inputs: false,
            },
        ))
        .unwrap();
    graph.set_output("probe").unwrap();

    let err = graph.execute(RawData::new()).await.unwrap_err();
    assert!(matches!(err, Error::CacheIo(_)));
}
