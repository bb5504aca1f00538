//! End-to-end world loading against on-disk documents.

use std::fs;
use std::path::PathBuf;

use approx::assert_relative_eq;
use planar_sim::{ConfigError, LoadError, Timekeeper, World};
use tempfile::TempDir;

const BOT_YAML: &str = r"
bodies:
  - name: base
    footprints:
      - type: circle
        radius: 0.5
        layers: [wall]
";

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn loads_example_scenario() {
    // properties: {}, one static rectangle layer named "wall", one model at
    // (1.0, 2.0) with zero heading.
    let dir = TempDir::new().unwrap();
    write(&dir, "bot.yaml", BOT_YAML);
    let world_path = write(
        &dir,
        "world.yaml",
        r"
properties: {}
layers:
  - name: wall
    rectangles: [[0.0, 5.0, 10.0, 0.2]]
models:
  - name: bot1
    pose: [1.0, 2.0, 0.0]
    model: bot.yaml
",
    );

    let world = World::load(&world_path).unwrap();
    assert_eq!(world.layers().len(), 1);
    assert_eq!(world.models().len(), 1);
    assert_eq!(world.layers()[0].name(), "wall");

    let bot = &world.models()[0];
    assert_eq!(bot.name(), "bot1");
    assert_eq!(bot.namespace(), "");
    let pose = world.scene().pose(bot.body_named("base").unwrap()).unwrap();
    assert_relative_eq!(pose.translation.x, 1.0, epsilon = 1e-12);
    assert_relative_eq!(pose.translation.y, 2.0, epsilon = 1e-12);
    assert_relative_eq!(pose.rotation.angle(), 0.0, epsilon = 1e-12);
}

#[test]
fn loads_layers_and_models_in_document_order() {
    let dir = TempDir::new().unwrap();
    write(&dir, "bot.yaml", "bodies:\n  - name: base\n");
    let world_path = write(
        &dir,
        "world.yaml",
        r"
properties: {}
layers:
  - name: ground
  - name: walls
  - name: doors
models:
  - name: alpha
    pose: [0.0, 0.0, 0.0]
    model: bot.yaml
  - name: beta
    namespace: robots
    pose: [3.0, 0.0, 1.5707963267948966]
    model: bot.yaml
",
    );

    let world = World::load(&world_path).unwrap();
    let layer_names: Vec<_> = world.layers().iter().map(|l| l.name()).collect();
    assert_eq!(layer_names, vec!["ground", "walls", "doors"]);
    let model_names: Vec<_> = world.models().iter().map(|m| m.name()).collect();
    assert_eq!(model_names, vec!["alpha", "beta"]);
    assert_eq!(world.models()[1].namespace(), "robots");

    let beta_base = world.models()[1].body_named("base").unwrap();
    let pose = world.scene().pose(beta_base).unwrap();
    assert_relative_eq!(pose.rotation.angle(), std::f64::consts::FRAC_PI_2, epsilon = 1e-9);
}

#[test]
fn failed_load_leaves_no_world_and_is_retryable() {
    let dir = TempDir::new().unwrap();
    // First attempt references a model document that does not exist.
    let broken = write(
        &dir,
        "world.yaml",
        r"
properties: {}
layers:
  - name: wall
models:
  - name: bot1
    pose: [0.0, 0.0, 0.0]
    model: missing.yaml
",
    );
    let err = World::load(&broken).unwrap_err();
    assert!(matches!(err, LoadError::Config(ConfigError::Io { .. })));

    // Retrying with a corrected document is the caller's responsibility and
    // must work from a clean slate.
    write(&dir, "missing.yaml", "bodies:\n  - name: base\n");
    let world = World::load(&broken).unwrap();
    assert_eq!(world.layers().len(), 1);
    assert_eq!(world.models().len(), 1);
}

#[test]
fn unknown_footprint_layer_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    write(&dir, "bot.yaml", BOT_YAML);
    // The bot collides with "wall", but this world has no such layer.
    let world_path = write(
        &dir,
        "world.yaml",
        r"
properties: {}
layers:
  - name: ground
models:
  - name: bot1
    pose: [0.0, 0.0, 0.0]
    model: bot.yaml
",
    );
    let err = World::load(&world_path).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Config(ConfigError::UnknownLayer { .. })
    ));
}

#[test]
fn world_without_models_section_steps_fine() {
    let dir = TempDir::new().unwrap();
    let world_path = write(
        &dir,
        "world.yaml",
        "properties: {}\nlayers:\n  - name: wall\n    lines: [[0.0, 0.0, 4.0, 0.0]]\n",
    );
    let mut world = World::load(&world_path).unwrap();
    let mut tk = Timekeeper::default();
    for _ in 0..10 {
        world.update(&mut tk);
    }
    assert_eq!(tk.step_count(), 10);
    assert_eq!(world.models().len(), 0);
}
