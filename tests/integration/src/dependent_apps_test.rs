//! End-to-end test for apps discovered while loading
//!
//! A pipeline reads the names of its stages from a file. Each name brings a
//! stage app into the same load, whose own parameters are read from the same
//! file, falling back to pipeline-wide defaults.

use paramload_core::{
    App, AppRef, Config, DictConfig, Error, FieldKey, Fields, Key, KeyPath, LoadOptions, Method,
    Parameter, Pick, Result, ValueSink, recursive_load_from_list,
};
use paramload_sources::FileConfig;
use paramload_test_utils::{TestApp, TestDir};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

struct Pipeline {
    stages_param: Arc<Parameter>,
    fields: Fields,
    stages: RefCell<Vec<Rc<TestApp>>>,
}

fn stages_param() -> Arc<Parameter> {
    Parameter::builder()
        .named("stages")
        .getter(Key::any("stages"))
        .pick(Pick::First(Some(json!([]))))
        .on_load(|args| {
            let names = args.value.as_array().cloned().unwrap_or_default();
            let stages: Vec<Rc<TestApp>> = names
                .iter()
                .filter_map(|name| name.as_str())
                .map(stage)
                .collect();

            let Some(pipeline) = args.app.downcast_ref::<Pipeline>() else {
                return Err(Error::usage("stages must belong to a Pipeline"));
            };
            let apps: Vec<AppRef> = stages.iter().map(TestApp::app_ref).collect();
            *pipeline.stages.borrow_mut() = stages;
            recursive_load_from_list(args.loader, &apps)
        })
        .build()
}

fn stage(name: &str) -> Rc<TestApp> {
    TestApp::new()
        .named("Stage")
        .with_param(
            "command",
            Parameter::builder()
                .getter(Key::any(KeyPath::nested(["stage", name, "command"])))
                .build(),
        )
        .with_param(
            "timeout",
            Parameter::builder()
                .getter(Key::any(KeyPath::nested(["stage", name, "timeout"])))
                .getter(Key::any("default_timeout"))
                .default_value(60)
                .build(),
        )
        .with_param(
            "label",
            Parameter::builder()
                .getter(Method::new(|app: &TestApp, ctx| {
                    let command: String = ctx.field_as("command")?;
                    let timeout: i64 = ctx.field_as("timeout")?;
                    Ok(json!(format!("{} {} ({}s)", app.type_name(), command, timeout)))
                }))
                .build(),
        )
        .into_rc()
}

impl App for Pipeline {
    fn parameters(&self) -> Result<Vec<(FieldKey, Arc<Parameter>)>> {
        Ok(vec![(FieldKey::name("stages"), Arc::clone(&self.stages_param))])
    }

    fn store(&self) -> &dyn ValueSink {
        &self.fields
    }
}

fn pipeline() -> Rc<Pipeline> {
    Rc::new(Pipeline {
        stages_param: stages_param(),
        fields: Fields::new(),
        stages: RefCell::new(Vec::new()),
    })
}

fn stage_values(pipeline: &Pipeline, field: &str) -> Vec<serde_json::Value> {
    pipeline
        .stages
        .borrow()
        .iter()
        .map(|stage| stage.value(field).unwrap())
        .collect()
}

#[test]
fn test_stages_are_loaded_with_the_pipeline() {
    let dir = TestDir::new();
    let path = dir.write(
        "pipeline.yaml",
        r#"
stages: [build, test]
default_timeout: 300
stage:
  build:
    command: cargo build
  test:
    command: cargo test
    timeout: 900
"#,
    );
    let app = pipeline();
    let configs: Vec<Box<dyn Config>> = vec![Box::new(FileConfig::new(&path))];

    paramload_core::load_with(&app, LoadOptions::new().configs(configs)).unwrap();

    assert_eq!(app.fields.get::<Vec<String>>("stages").unwrap(), vec!["build", "test"]);
    assert_eq!(stage_values(&app, "timeout"), vec![json!(300), json!(900)]);
    assert_eq!(
        stage_values(&app, "label"),
        vec![json!("Stage cargo build (300s)"), json!("Stage cargo test (900s)")]
    );
}

#[test]
fn test_stages_found_during_config_load_are_replaced() {
    let dir = TestDir::new();
    let path = dir.write(
        "pipeline.toml",
        "stages = [\"lint\"]\n\n[stage.lint]\ncommand = \"cargo clippy\"\n",
    );
    let app = pipeline();

    // the observer reads "stages" while only the command line is loaded
    let observer = paramload_test_utils::RecordingConfig::new(
        "observer",
        json!({}),
        &paramload_test_utils::Log::new(),
    )
    .reading(Rc::clone(&app) as AppRef, "stages");
    let observed = observer.observed();
    let configs: Vec<Box<dyn Config>> = vec![
        Box::new(DictConfig::new("cli", json!({"stage": {"fmt": {"command": "cargo fmt"}}}))),
        Box::new(observer),
        Box::new(FileConfig::new(&path)),
    ];

    paramload_core::load_with(&app, LoadOptions::new().configs(configs)).unwrap();

    assert_eq!(*observed.borrow(), vec![json!([])]);
    assert_eq!(stage_values(&app, "command"), vec![json!("cargo clippy")]);
    assert_eq!(stage_values(&app, "timeout"), vec![json!(60)]);
}

#[test]
fn test_stage_without_command_fails_the_load() {
    let dir = TestDir::new();
    let path = dir.write("pipeline.json", r#"{"stages": ["deploy"]}"#);
    let app = pipeline();
    let configs: Vec<Box<dyn Config>> = vec![Box::new(FileConfig::new(&path))];

    let err = paramload_core::load_with(&app, LoadOptions::new().configs(configs)).unwrap_err();
    assert!(matches!(err, Error::NoValueFound { ref param } if param == "Stage.command"));
}
