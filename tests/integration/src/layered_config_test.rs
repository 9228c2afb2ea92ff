//! End-to-end test for layered configuration
//!
//! Command-line values outrank the environment, which outranks a user file
//! whose location is itself a parameter, which outranks an optional system
//! file.

use paramload_core::{
    Config, DictConfig, Key, KeyPath, LoadOptions, Origin, Parameter, Pick, Provenance, apply, cast,
};
use paramload_sources::{EnvConfig, FileConfig};
use paramload_test_utils::{TestApp, TestDir};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::rc::Rc;

fn tool() -> Rc<TestApp> {
    TestApp::new()
        .named("Tool")
        .with_param(
            "config",
            Parameter::builder()
                .getter(Key::new::<DictConfig>("config"))
                .getter(Key::new::<EnvConfig>("TOOL_CONFIG"))
                .default_value(Value::Null)
                .build(),
        )
        .with_param(
            "name",
            Parameter::builder()
                .getter(Key::new::<DictConfig>("name"))
                .getter(Key::new::<EnvConfig>("TOOL_NAME"))
                .getter(Key::new::<FileConfig>("name"))
                .default_value("tool")
                .build(),
        )
        .with_param(
            "jobs",
            Parameter::builder()
                .getter(Key::new::<EnvConfig>("TOOL_JOBS"))
                .getter(Key::new::<FileConfig>(KeyPath::dotted("build.jobs")))
                .apply(cast::int(cast::Vars::from([(
                    "cpus".to_string(),
                    cast::Numeric::Int(8),
                )])))
                .default_value(1)
                .build(),
        )
        .with_param(
            "include",
            Parameter::builder()
                .getter(Key::new::<FileConfig>("include"))
                .pick(Pick::List)
                .build(),
        )
        .with_param(
            "env",
            Parameter::builder()
                .getter(Key::new::<FileConfig>("env"))
                .pick(Pick::MergeDicts { keep_last: false })
                .build(),
        )
        .with_param(
            "output",
            Parameter::builder()
                .getter(Key::new::<FileConfig>("output"))
                .apply(apply::relpath())
                .default_value("out")
                .build(),
        )
        .into_rc()
}

struct Fixture {
    dir: TestDir,
    user: PathBuf,
    system: PathBuf,
}

fn fixture() -> Fixture {
    let dir = TestDir::new();
    let user = dir.write(
        "home/tool.toml",
        r#"
name = "from-user"
include = "a"
output = "build/out"

[build]
jobs = "cpus // 2"

[env]
RUST_LOG = "debug"
"#,
    );
    let system = dir.write(
        "etc/tool.yaml",
        "include: c\nenv:\n  RUST_LOG: warn\n  LANG: C\nbuild:\n  jobs: 64\n",
    );
    Fixture { dir, user, system }
}

fn configs(
    app: &Rc<TestApp>,
    cli: Value,
    env: &[(&str, &str)],
    system: &PathBuf,
) -> Vec<Box<dyn Config>> {
    vec![
        Box::new(DictConfig::new("cli", cli)),
        Box::new(EnvConfig::new().with_vars(env.iter().copied())),
        Box::new(FileConfig::from_field(app.app_ref(), "config").named("user")),
        Box::new(FileConfig::new(system).named("system").optional()),
    ]
}

#[test]
fn test_layers_rank_in_order() {
    let fx = fixture();
    let app = tool();
    let configs = configs(
        &app,
        json!({"config": fx.user.to_string_lossy()}),
        &[("TOOL_NAME", "from-env")],
        &fx.system,
    );

    paramload_core::load_with(&app, LoadOptions::new().configs(configs)).unwrap();

    assert_eq!(app.get::<String>("name"), "from-env");
    assert_eq!(app.get::<i64>("jobs"), 4);
    assert_eq!(app.get::<Vec<String>>("include"), vec!["a", "c"]);
    assert_eq!(
        app.value("env").unwrap(),
        json!({"RUST_LOG": "debug", "LANG": "C"})
    );
    assert_eq!(
        app.get::<String>("output"),
        fx.dir.path("home/build/out").to_string_lossy()
    );

    assert_eq!(
        app.provenance_of("name"),
        Some(Provenance::Origin(Origin::Env {
            var: "TOOL_NAME".into(),
            value: "from-env".into()
        }))
    );
    assert_eq!(
        app.provenance_of("jobs"),
        Some(Provenance::Origin(Origin::File {
            path: fx.user.clone(),
            key: "build.jobs".into()
        }))
    );
}

#[test]
fn test_per_key_provenance_of_merged_values() {
    let fx = fixture();
    let app = tool();
    let configs = configs(
        &app,
        json!({"config": fx.user.to_string_lossy()}),
        &[],
        &fx.system,
    );

    paramload_core::load_with(&app, LoadOptions::new().configs(configs)).unwrap();

    let env = app.provenance_of("env").unwrap();
    let path_of = |key: &str| match env.key(key).and_then(Provenance::origin) {
        Some(Origin::File { path, .. }) => path.clone(),
        other => panic!("unexpected provenance for {}: {:?}", key, other),
    };
    assert_eq!(path_of("RUST_LOG"), fx.user);
    assert_eq!(path_of("LANG"), fx.system);

    let include = app.provenance_of("include").unwrap();
    assert!(matches!(
        include.index(1).and_then(Provenance::origin),
        Some(Origin::File { path, .. }) if *path == fx.system
    ));
}

#[test]
fn test_user_file_location_from_environment() {
    let fx = fixture();
    let app = tool();
    let user = fx.user.to_string_lossy().into_owned();
    let configs = configs(&app, json!({}), &[("TOOL_CONFIG", &user)], &fx.system);

    paramload_core::load_with(&app, LoadOptions::new().configs(configs)).unwrap();

    assert_eq!(app.get::<String>("name"), "from-user");
    assert_eq!(app.get::<i64>("jobs"), 4);
}

#[test]
fn test_without_user_file_system_file_and_defaults_apply() {
    let fx = fixture();
    let app = tool();
    let configs = configs(&app, json!({}), &[], &fx.system);

    paramload_core::load_with(&app, LoadOptions::new().configs(configs)).unwrap();

    assert_eq!(app.get::<String>("name"), "tool");
    assert_eq!(app.get::<i64>("jobs"), 64);
    assert_eq!(app.get::<Vec<String>>("include"), vec!["c"]);
    assert_eq!(app.get::<String>("output"), "out");
}

#[test]
fn test_missing_system_file_is_tolerated() {
    let fx = fixture();
    let app = tool();
    let missing = fx.dir.path("etc/missing.yaml");
    let configs = configs(&app, json!({"name": "cli"}), &[], &missing);

    paramload_core::load_with(&app, LoadOptions::new().configs(configs)).unwrap();

    assert_eq!(app.get::<String>("name"), "cli");
    assert_eq!(app.get::<Vec<String>>("include"), Vec::<String>::new());
}

#[test]
fn test_bad_expression_in_file_names_the_parameter() {
    let fx = fixture();
    let user = fx.dir.write("home/bad.toml", "[build]\njobs = \"cpus // 0\"\n");
    let app = tool();
    let configs = configs(
        &app,
        json!({"config": user.to_string_lossy()}),
        &[],
        &fx.system,
    );

    let err = paramload_core::load_with(&app, LoadOptions::new().configs(configs)).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"invalid value for Tool.jobs: unable to evaluate arithmetic expression 'cpus // 0': division by zero"
    );
}
