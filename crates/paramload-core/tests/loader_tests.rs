//! Loader behaviour: phases, dependency resolution, cycles and registration

use paramload_core::{
    Attribute, Config, DictConfig, Error, FieldKey, Finder, Key, Loader, Method, Origin, Parameter,
    Pick, Provenance, ProvenanceSink, Result, Static, recursive_load,
};
use paramload_test_utils::{Log, RecordingConfig, TestApp};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

fn key(name: &str) -> Arc<Parameter> {
    Parameter::builder().getter(Key::any(name)).build()
}

fn reads(field: &'static str) -> Arc<Parameter> {
    Parameter::builder()
        .getter(Method::new(move |_: &TestApp, ctx| ctx.field(field)))
        .build()
}

fn loader_for(app: &Rc<TestApp>, configs: Vec<Box<dyn Config>>) -> Loader {
    let provenance = paramload_core::App::provenance(&**app).unwrap();
    let attributes = Attribute::scan(&app.app_ref(), &provenance).unwrap();
    Loader::new(attributes, configs).unwrap()
}

#[test]
fn test_load_from_dict_config_records_provenance() {
    let app = TestApp::new()
        .with_param("x", key("x"))
        .with_config(DictConfig::new("defaults", json!({"x": 1})))
        .into_rc();

    paramload_core::load(&app).unwrap();

    assert_eq!(app.get::<i64>("x"), 1);
    assert_eq!(
        app.provenance_of("x"),
        Some(Provenance::Origin(Origin::Config {
            source: "defaults".into(),
            key: "x".into()
        }))
    );
}

#[test]
fn test_earlier_configs_take_precedence() {
    let app = TestApp::new()
        .with_param("x", key("x"))
        .with_param("y", key("y"))
        .with_config(DictConfig::new("cli", json!({"x": "cli"})))
        .with_config(DictConfig::new("file", json!({"x": "file", "y": "file"})))
        .into_rc();

    paramload_core::load(&app).unwrap();

    assert_eq!(app.get::<String>("x"), "cli");
    assert_eq!(app.get::<String>("y"), "file");
}

#[test]
fn test_missing_value_is_no_value_found() {
    let app = TestApp::new().named("Server").with_param("port", key("port")).into_rc();

    let err = paramload_core::load(&app).unwrap_err();
    assert!(matches!(err, Error::NoValueFound { ref param } if param == "Server.port"));
    assert!(!err.is_usage());
}

#[test]
fn test_dependent_parameters_resolve_on_demand() {
    let app = TestApp::new()
        .with_param("url", {
            Parameter::builder()
                .getter(Method::new(|_: &TestApp, ctx| {
                    let host: String = ctx.field_as("host")?;
                    let port: u16 = ctx.field_as("port")?;
                    Ok(json!(format!("http://{}:{}", host, port)))
                }))
                .build()
        })
        .with_param("host", Parameter::builder().getter(Static::new("localhost")).build())
        .with_param("port", Parameter::builder().getter(Static::new(8080)).build())
        .into_rc();

    paramload_core::load(&app).unwrap();

    assert_eq!(app.get::<String>("url"), "http://localhost:8080");
    assert_eq!(app.get::<u16>("port"), 8080);
}

#[test]
fn test_circular_dependency_names_every_parameter() {
    let app = TestApp::new()
        .with_param("a", reads("b"))
        .with_param("b", reads("c"))
        .with_param("c", reads("a"))
        .into_rc();

    let err = paramload_core::load(&app).unwrap_err();
    assert!(err.is_usage());
    insta::assert_snapshot!(
        err.to_string(),
        @"circular dependency while loading: TestApp.a -> TestApp.b -> TestApp.c -> TestApp.a"
    );
    match err {
        Error::CircularDependency { chain } => assert_eq!(chain.len(), 4),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_self_dependency_is_circular() {
    let app = TestApp::new().with_param("a", reads("a")).into_rc();

    let err = paramload_core::load(&app).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"circular dependency while loading: TestApp.a -> TestApp.a"
    );
}

#[test]
fn test_configs_load_in_order_once_per_load() {
    let log = Log::new();
    let app = TestApp::new()
        .with_param("x", key("x"))
        .with_config(RecordingConfig::new("first", json!({"x": 1}), &log))
        .with_config(RecordingConfig::new("second", json!({}), &log))
        .into_rc();

    paramload_core::load(&app).unwrap();

    assert_eq!(log.events(), vec!["load first", "load second"]);
}

#[test]
fn test_config_sees_only_earlier_configs_and_value_is_recomputed() {
    let log = Log::new();
    let app = TestApp::new()
        .with_param(
            "x",
            Parameter::builder()
                .getter(Key::new::<RecordingConfig>("x"))
                .getter(Key::new::<DictConfig>("x"))
                .build(),
        )
        .into_rc();

    let recording =
        RecordingConfig::new("file", json!({"x": "from file"}), &log).reading(app.app_ref(), "x");
    let observed = recording.observed();
    let loader = loader_for(
        &app,
        vec![
            Box::new(DictConfig::new("cli", json!({"x": "from cli"}))),
            Box::new(recording),
        ],
    );

    loader.load().unwrap();

    assert_eq!(*observed.borrow(), vec![json!("from cli")]);
    assert_eq!(app.get::<String>("x"), "from file");
}

#[test]
fn test_config_cannot_read_its_own_values_during_load() {
    let log = Log::new();
    let app = TestApp::new().with_param("x", key("x")).into_rc();
    let recording = RecordingConfig::new("file", json!({"x": 1}), &log).reading(app.app_ref(), "x");
    let loader = loader_for(&app, vec![Box::new(recording)]);

    let err = loader.load().unwrap_err();
    assert!(matches!(err, Error::NoValueFound { .. }));
    assert!(!loader.is_running());
}

#[test]
fn test_attributes_discovered_mid_load_are_forgotten_between_phases() {
    let log = Log::new();
    let child_values = Arc::new(Mutex::new(Vec::new()));

    let child_param = {
        let child_values = Arc::clone(&child_values);
        Parameter::builder()
            .named("child")
            .getter(Static::new(10))
            .on_load(move |args| {
                child_values.lock().unwrap().push(args.value.clone());
                Ok(())
            })
            .build()
    };

    let parent_param = {
        let child_param = Arc::clone(&child_param);
        Parameter::builder()
            .getter(Key::any("n"))
            .on_load(move |args| {
                let child = TestApp::new()
                    .named("Child")
                    .with_param("y", Arc::clone(&child_param))
                    .into_rc();
                recursive_load(args.loader, child.app_ref())
            })
            .build()
    };

    let app = TestApp::new().with_param("n", parent_param).into_rc();
    let recording = RecordingConfig::new("file", json!({}), &log).reading(app.app_ref(), "n");
    let loader = loader_for(
        &app,
        vec![Box::new(DictConfig::new("cli", json!({"n": 1}))), Box::new(recording)],
    );

    loader.load().unwrap();

    // one child from the final pass; the one found while "file" loaded is gone
    assert_eq!(loader.len(), 2);
    assert_eq!(*child_values.lock().unwrap(), vec![json!(10)]);
    assert_eq!(child_param.bound_loader(), None);
}

#[test]
fn test_duplicate_attribute_is_rejected_before_load() {
    let app = TestApp::new().with_param("x", key("x")).into_rc();
    let loader = loader_for(&app, Vec::new());

    let provenance: Rc<dyn ProvenanceSink> = Rc::new(paramload_core::DiscardProvenance);
    let again = Attribute::scan(&app.app_ref(), &provenance).unwrap();
    let err = loader.add_attributes(again).unwrap_err();

    assert!(err.is_usage());
    assert!(err.to_string().contains("already registered"));
    assert_eq!(loader.len(), 1);
}

#[test]
fn test_duplicate_attribute_is_rejected_during_load() {
    let param = Parameter::builder()
        .getter(Static::new(1))
        .on_load(|args| recursive_load(args.loader, Rc::clone(args.app)))
        .build();
    let app = TestApp::new().with_param("x", param).into_rc();

    let err = paramload_core::load(&app).unwrap_err();
    assert!(err.is_usage());
    assert!(err.to_string().contains("TestApp.x is already registered"));
}

#[test]
fn test_reading_before_load_is_usage_error() {
    let app = TestApp::new().with_param("x", key("x")).into_rc();
    let loader = loader_for(&app, Vec::new());

    let err = app.fields().get::<i64>("x").unwrap_err();
    assert!(err.is_usage());

    let err = loader.value(&app.app_ref(), app.param("x")).unwrap_err();
    assert!(err.is_usage());
    assert!(err.to_string().contains("outside of load()"));
}

#[test]
fn test_failed_load_keeps_values_stored_before_the_error() {
    let app = TestApp::new()
        .with_param("a", key("a"))
        .with_param("b", key("b"))
        .with_config(DictConfig::new("cli", json!({"a": "kept"})))
        .into_rc();

    let err = paramload_core::load(&app).unwrap_err();

    assert!(matches!(err, Error::NoValueFound { .. }));
    assert_eq!(app.value("a").unwrap(), json!("kept"));
    assert!(app.value("b").unwrap_err().is_usage());
}

#[test]
fn test_failed_store_does_not_leave_attribute_locked() {
    let app = TestApp::new().into_rc();
    let provenance: Rc<dyn ProvenanceSink> = Rc::new(paramload_core::DiscardProvenance);
    let unnamed = Attribute::new(
        app.app_ref(),
        FieldKey::Path(Vec::new()),
        Parameter::builder().getter(Static::new(1)).build(),
        provenance,
    );
    let loader = Loader::new(vec![unnamed], Vec::new()).unwrap();

    for _ in 0..2 {
        let err = loader.load().unwrap_err();
        assert!(matches!(err, Error::Usage { .. }), "unexpected error: {}", err);
        assert!(err.to_string().contains("expected a field name"));
    }
}

#[test]
fn test_resolve_attribute_rejects_unknown_and_loaded() {
    let app = TestApp::new()
        .with_param("x", Parameter::builder().getter(Static::new(1)).build())
        .into_rc();
    let loader = loader_for(&app, Vec::new());
    loader.load().unwrap();

    let err = loader.resolve_attribute(&app.app_ref(), app.param("x")).unwrap_err();
    assert!(err.to_string().contains("already loaded"));

    let stranger = key("y");
    let err = loader.resolve_attribute(&app.app_ref(), &stranger).unwrap_err();
    assert!(err.is_usage());
    assert!(err.to_string().contains("not registered"));
}

#[test]
fn test_value_after_load_is_served_from_the_loader() {
    let app = TestApp::new()
        .with_param("x", Parameter::builder().getter(Static::new(5)).build())
        .into_rc();
    let loader = loader_for(&app, Vec::new());
    loader.load().unwrap();

    assert_eq!(loader.value(&app.app_ref(), app.param("x")).unwrap(), json!(5));
    let provenance = loader.provenance(&app.app_ref(), app.param("x")).unwrap();
    assert!(matches!(
        provenance,
        Some(Provenance::Origin(Origin::Source { .. }))
    ));
}

#[test]
fn test_second_load_recomputes_values() {
    let counter = Arc::new(Mutex::new(0));
    let param = {
        let counter = Arc::clone(&counter);
        Parameter::builder()
            .getter(paramload_core::Func::new(move || {
                let mut count = counter.lock().unwrap();
                *count += 1;
                Ok(json!(*count))
            }))
            .build()
    };
    let app = TestApp::new().with_param("x", param).into_rc();
    let loader = loader_for(&app, Vec::new());

    loader.load().unwrap();
    assert_eq!(app.get::<i64>("x"), 1);
    loader.load().unwrap();
    assert_eq!(app.get::<i64>("x"), 2);
}

struct Reentrant;

impl Config for Reentrant {
    fn load(&mut self, loader: &Loader) -> Result<()> {
        loader.load()
    }

    fn finders(&self) -> Vec<Rc<dyn Finder>> {
        Vec::new()
    }
}

#[test]
fn test_load_cannot_reenter() {
    let app = TestApp::new().with_param("x", key("x")).into_rc();
    let loader = loader_for(&app, vec![Box::new(Reentrant)]);

    let err = loader.load().unwrap_err();
    assert!(err.is_usage());
    assert!(err.to_string().contains("already running"));
    assert_eq!(app.param("x").bound_loader(), None);
}

struct NestedLoad {
    app: Rc<TestApp>,
}

impl Config for NestedLoad {
    fn load(&mut self, _loader: &Loader) -> Result<()> {
        paramload_core::load(&self.app)
    }

    fn finders(&self) -> Vec<Rc<dyn Finder>> {
        Vec::new()
    }
}

#[test]
fn test_parameter_cannot_serve_two_loaders_at_once() {
    let shared = Parameter::builder().named("shared").getter(Static::new(1)).build();
    let outer = TestApp::new().with_param("x", Arc::clone(&shared)).into_rc();
    let inner = TestApp::new().with_param("x", Arc::clone(&shared)).into_rc();
    let loader = loader_for(&outer, vec![Box::new(NestedLoad { app: inner })]);

    let err = loader.load().unwrap_err();
    assert!(err.is_usage());
    assert!(err.to_string().contains("parameter 'shared' is already bound"));
    assert_eq!(shared.bound_loader(), None);
}

#[test]
fn test_shared_parameter_binds_once_per_loader() {
    let shared = Parameter::builder().getter(Static::new(1)).build();
    let first = TestApp::new().with_param("x", Arc::clone(&shared)).into_rc();
    let second = TestApp::new().with_param("y", Arc::clone(&shared)).into_rc();

    let provenance: Rc<dyn ProvenanceSink> = Rc::new(paramload_core::DiscardProvenance);
    let mut attributes = Attribute::scan(&first.app_ref(), &provenance).unwrap();
    attributes.extend(Attribute::scan(&second.app_ref(), &provenance).unwrap());
    let loader = Loader::new(attributes, Vec::new()).unwrap();

    loader.load().unwrap();

    assert_eq!(first.get::<i64>("x"), 1);
    assert_eq!(second.get::<i64>("y"), 1);
    assert_eq!(shared.bound_loader(), None);
}

#[test]
fn test_same_parameter_twice_on_one_app_is_rejected() {
    let shared = Parameter::builder().getter(Static::new(1)).build();
    let app = TestApp::new()
        .with_param("x", Arc::clone(&shared))
        .with_param("y", Arc::clone(&shared))
        .into_rc();

    let err = paramload_core::load(&app).unwrap_err();
    assert!(err.is_usage());
}

#[test]
fn test_pick_list_and_merge_through_loader() {
    let app = TestApp::new()
        .with_param(
            "paths",
            Parameter::builder().getter(Key::any("path")).pick(Pick::List).build(),
        )
        .with_param(
            "env",
            Parameter::builder()
                .getter(Key::any("env"))
                .pick(Pick::MergeDicts { keep_last: false })
                .build(),
        )
        .with_config(DictConfig::new("a", json!({"path": "/a", "env": {"A": "1", "B": "1"}})))
        .with_config(DictConfig::new("b", json!({"path": "/b", "env": {"A": "2"}})))
        .into_rc();

    paramload_core::load(&app).unwrap();

    assert_eq!(app.get::<Vec<String>>("paths"), vec!["/a", "/b"]);
    assert_eq!(app.value("env").unwrap(), json!({"A": "1", "B": "1"}));

    let provenance = app.provenance_of("env").unwrap();
    let source_of = |key: &str| match provenance.key(key).and_then(Provenance::origin) {
        Some(Origin::Config { source, .. }) => source.clone(),
        other => panic!("unexpected provenance: {:?}", other),
    };
    assert_eq!(source_of("A"), "a");
}

#[test]
fn test_apply_failure_names_parameter() {
    let app = TestApp::new()
        .named("Server")
        .with_param(
            "port",
            Parameter::builder()
                .getter(Key::any("port"))
                .apply(paramload_core::apply::integer())
                .build(),
        )
        .with_config(DictConfig::new("cli", json!({"port": "eighty"})))
        .into_rc();

    let err = paramload_core::load(&app).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"invalid value for Server.port: 'eighty' is not an integer"
    );
}

#[test]
fn test_default_value_when_no_config_has_one() {
    let app = TestApp::new()
        .with_param(
            "level",
            Parameter::builder()
                .getter(Key::any("level"))
                .default_value("info")
                .build(),
        )
        .into_rc();

    paramload_core::load(&app).unwrap();

    assert_eq!(app.get::<String>("level"), "info");
    assert_eq!(app.provenance_of("level"), Some(Provenance::None));
}

#[test]
fn test_method_on_wrong_app_type_is_usage_error() {
    struct Other;
    impl paramload_core::App for Other {
        fn parameters(&self) -> Result<Vec<(paramload_core::FieldKey, Arc<Parameter>)>> {
            Ok(Vec::new())
        }
        fn store(&self) -> &dyn paramload_core::ValueSink {
            &NOWHERE
        }
    }
    struct Nowhere;
    impl paramload_core::ValueSink for Nowhere {
        fn set_value(&self, _: &paramload_core::FieldKey, _: Value) -> Result<()> {
            Ok(())
        }
        fn delete_value(&self, _: &paramload_core::FieldKey) -> Result<()> {
            Ok(())
        }
    }
    static NOWHERE: Nowhere = Nowhere;

    let app = TestApp::new()
        .with_param(
            "x",
            Parameter::builder()
                .getter(Method::new(|_: &Other, _| Ok(json!(1))))
                .build(),
        )
        .into_rc();

    let err = paramload_core::load(&app).unwrap_err();
    assert!(err.is_usage());
    assert!(err.to_string().contains("TestApp.x belongs to TestApp, not Other"));
}
