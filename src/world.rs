//! World lifecycle, declarative loading, and the simulation step loop.
//!
//! The [`World`] owns the single authoritative physics scene, the ordered
//! layers and models built from a world document, the collision-class
//! registry, and the behavior-unit manager. It orchestrates loading, advances
//! the scene in fixed steps, and relays every contact event to the behavior
//! layer without filtering.
//!
//! # World document
//!
//! ```yaml
//! properties: {}            # required mapping, contents reserved
//! layers:                   # required sequence
//!   - name: walls
//!     rectangles: [[0.0, 5.0, 10.0, 0.2]]
//! models:                   # optional sequence
//!   - name: bot1
//!     namespace: robot0     # optional, defaults to ""
//!     pose: [1.0, 2.0, 0.0] # x, y, heading — required
//!     model: bot.yaml       # path, relative to this document's directory
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use nalgebra::Vector2;
use serde_yaml::Value;
use tracing::{error, info};

use crate::error::{ConfigError, LoadError};
use crate::filter::{CollisionFilterRegistry, MAX_LAYERS};
use crate::layer::{Layer, LayerConfig};
use crate::model::{Model, ModelConfig};
use crate::plugin::{PluginConfig, PluginManager};
use crate::scene::{PhysicsScene, Pose};
use crate::timekeeper::Timekeeper;

/// Velocity sub-iteration count handed to every scene step.
pub const VELOCITY_ITERATIONS: usize = 10;
/// Position sub-iteration count handed to every scene step.
pub const POSITION_ITERATIONS: usize = 10;

/// The authoritative simulation world.
#[derive(Debug)]
pub struct World {
    gravity: Vector2<f64>,
    scene: PhysicsScene,
    layers: Vec<Layer>,
    models: Vec<Model>,
    registry: CollisionFilterRegistry,
    plugin_manager: PluginManager,
    torn_down: bool,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Create an empty world with no registered plugin factories.
    #[must_use]
    pub fn new() -> Self {
        Self::with_plugins(PluginManager::new())
    }

    /// Create an empty world around a prepared plugin manager.
    #[must_use]
    pub fn with_plugins(plugin_manager: PluginManager) -> Self {
        // This domain is viewed from above; nothing falls.
        let gravity = Vector2::zeros();
        Self {
            gravity,
            scene: PhysicsScene::new(gravity),
            layers: Vec::new(),
            models: Vec::new(),
            registry: CollisionFilterRegistry::new(),
            plugin_manager,
            torn_down: false,
        }
    }

    /// Load a world from a declarative document.
    ///
    /// Equivalent to [`World::load_with_plugins`] with an empty plugin
    /// manager, so any declared behavior unit fails as unknown.
    ///
    /// # Errors
    ///
    /// Fails with a [`ConfigError`] for document/schema faults and a
    /// [`crate::error::PluginError`] for behavior-unit load faults. Either
    /// way the partially built world is torn down before the error returns.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        Self::load_with_plugins(path, PluginManager::new())
    }

    /// Load a world from a declarative document, resolving behavior units
    /// through the given plugin manager's registered factories.
    ///
    /// # Errors
    ///
    /// See [`World::load`].
    pub fn load_with_plugins(
        path: impl AsRef<Path>,
        plugin_manager: PluginManager,
    ) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let doc = read_yaml(path)?;

        // The properties section is reserved: it must be present and be a
        // mapping, but its contents are not interpreted.
        if !doc.get("properties").is_some_and(Value::is_mapping) {
            return Err(ConfigError::WorldParam("properties").into());
        }

        let dir = path.parent().map_or_else(PathBuf::new, Path::to_path_buf);
        let mut world = Self::with_plugins(plugin_manager);

        if let Err(err) = world.load_layers(&doc) {
            error!("error loading layers from \"{}\"", path.display());
            return Err(err.into());
        }
        if let Err(err) = world.load_models(&doc, &dir) {
            match &err {
                LoadError::Plugin(_) => error!("error loading plugins"),
                LoadError::Config(_) => {
                    error!("error loading models from \"{}\"", path.display());
                }
            }
            return Err(err);
        }

        info!(
            "world loaded from \"{}\": {} layers, {} models",
            path.display(),
            world.layers.len(),
            world.models.len()
        );
        Ok(world)
    }

    fn load_layers(&mut self, doc: &Value) -> Result<(), ConfigError> {
        let entries = doc
            .get("layers")
            .and_then(Value::as_sequence)
            .ok_or(ConfigError::WorldParam("layers"))?;

        for (index, entry) in entries.iter().enumerate() {
            if self.registry.is_full() {
                return Err(ConfigError::LayersFull { max: MAX_LAYERS });
            }
            let config: LayerConfig = serde_yaml::from_value(entry.clone())
                .map_err(|e| ConfigError::fragment(format!("layer index={index}"), e))?;
            let layer = Layer::from_config(&mut self.scene, &mut self.registry, config)?;
            info!("layer '{}' loaded", layer.name());
            self.layers.push(layer);
        }
        Ok(())
    }

    fn load_models(&mut self, doc: &Value, dir: &Path) -> Result<(), LoadError> {
        // The models section is optional; worlds can be pure scenery.
        let Some(models) = doc.get("models") else {
            return Ok(());
        };
        let entries = models
            .as_sequence()
            .ok_or(ConfigError::WorldParam("models"))?;

        for (index, entry) in entries.iter().enumerate() {
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ConfigError::missing_field("name", format!("model index={index}"))
                })?;
            let namespace = match entry.get("namespace") {
                Some(value) => value.as_str().ok_or_else(|| {
                    ConfigError::missing_field("namespace", format!("model '{name}'"))
                })?,
                None => "",
            };
            let pose = parse_pose(entry, name)?;
            let declared = entry
                .get("model")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ConfigError::missing_field("model", format!("model '{name}'"))
                })?;
            let model_path = resolve_model_path(dir, declared);
            self.spawn_model(&model_path, namespace, name, pose)?;
        }
        Ok(())
    }

    /// Build a model from its document, place it at `pose`, and register its
    /// declared behavior units. Usable both during loading and at runtime.
    ///
    /// # Errors
    ///
    /// Fails with a [`ConfigError`] for document faults and a
    /// [`crate::error::PluginError`] for behavior-unit load faults.
    pub fn spawn_model(
        &mut self,
        model_path: &Path,
        namespace: &str,
        name: &str,
        pose: Pose,
    ) -> Result<(), LoadError> {
        let doc = read_yaml(model_path)?;
        let config: ModelConfig = serde_yaml::from_value(doc)
            .map_err(|e| ConfigError::fragment(format!("model '{name}'"), e))?;

        let model = Model::from_config(&mut self.scene, &self.registry, config, namespace, name)?;
        model.transform_all(&mut self.scene, &pose);
        self.models.push(model);

        // It is okay to have no plugins; a present section must be a list.
        if let Some(model) = self.models.last() {
            if let Some(fragments) = model.plugin_fragments() {
                let entries = fragments.as_sequence().ok_or_else(|| {
                    ConfigError::PluginsNotSequence {
                        model: name.to_string(),
                    }
                })?;
                for fragment in entries {
                    let config = PluginConfig::from_value(fragment, name)?;
                    self.plugin_manager.load_model_plugin(model, config)?;
                }
            }
        }

        info!("model '{}' loaded", name);
        Ok(())
    }

    /// Remove a model at runtime: its bodies are destroyed incrementally and
    /// its behavior units stop receiving hooks.
    ///
    /// # Errors
    ///
    /// Fails when no model of that name is in the world.
    pub fn delete_model(&mut self, name: &str) -> Result<(), ConfigError> {
        let index = self
            .models
            .iter()
            .position(|m| m.name() == name)
            .ok_or_else(|| ConfigError::NoSuchModel(name.to_string()))?;
        let model = self.models.remove(index);
        for handle in model.body_handles() {
            self.scene.destroy_body(handle);
        }
        self.plugin_manager.delete_model_plugins(name);
        info!("model '{}' deleted", name);
        Ok(())
    }

    /// Advance the simulation by one fixed step.
    ///
    /// Strictly ordered: behavior-unit before-hooks, one scene step (during
    /// which all contact events of the step are relayed to the behavior
    /// layer), elapsed-time advance, behavior-unit after-hooks. No unit ever
    /// observes a half-stepped scene.
    pub fn update(&mut self, timekeeper: &mut Timekeeper) {
        self.plugin_manager
            .before_physics_step(&mut self.scene, timekeeper);
        self.scene.step(
            timekeeper.step_size(),
            VELOCITY_ITERATIONS,
            POSITION_ITERATIONS,
            &mut self.plugin_manager,
        );
        timekeeper.step_time();
        self.plugin_manager
            .after_physics_step(&mut self.scene, timekeeper);
    }

    /// Refresh visualization snapshots: layers only on request (they are
    /// static), models always. Has no effect on simulation state.
    pub fn debug_visualize(&mut self, refresh_layers: bool) {
        if refresh_layers {
            for layer in &mut self.layers {
                layer.debug_visualize(&self.scene);
            }
        }
        for model in &mut self.models {
            model.debug_visualize(&self.scene);
        }
    }

    /// Tear the world down in its required order: contact events are silenced
    /// first so nothing dispatches into entities mid-release; layer bodies go
    /// through the bulk-release path (a layer can own a large fixture count
    /// and incremental removal is far more expensive than freeing the whole
    /// scene); model bodies are destroyed incrementally. Idempotent; also
    /// invoked from `Drop`.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        info!("destroying world");

        self.scene.disable_contact_events();

        for layer in &self.layers {
            self.scene.release_body(layer.body());
        }
        self.layers.clear();

        for model in &self.models {
            for handle in model.body_handles() {
                self.scene.destroy_body(handle);
            }
        }
        self.models.clear();

        info!("world destroyed");
    }

    /// The world gravity vector (zero in this domain).
    #[must_use]
    pub fn gravity(&self) -> Vector2<f64> {
        self.gravity
    }

    /// The loaded layers, in document order.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// The loaded models, in document order.
    #[must_use]
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    /// Look up a model by name.
    #[must_use]
    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.name() == name)
    }

    /// The physics scene.
    #[must_use]
    pub fn scene(&self) -> &PhysicsScene {
        &self.scene
    }

    /// Mutable access to the physics scene.
    #[must_use]
    pub fn scene_mut(&mut self) -> &mut PhysicsScene {
        &mut self.scene
    }

    /// The collision-class registry.
    #[must_use]
    pub fn registry(&self) -> &CollisionFilterRegistry {
        &self.registry
    }

    /// The behavior-unit manager.
    #[must_use]
    pub fn plugin_manager(&self) -> &PluginManager {
        &self.plugin_manager
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn read_yaml(path: &Path) -> Result<Value, ConfigError> {
    let text = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
    serde_yaml::from_str(&text).map_err(|e| ConfigError::yaml(path, e))
}

fn parse_pose(entry: &Value, name: &str) -> Result<Pose, ConfigError> {
    let invalid = || ConfigError::missing_field("pose", format!("model '{name}'"));
    let seq = entry
        .get("pose")
        .and_then(Value::as_sequence)
        .ok_or_else(invalid)?;
    if seq.len() != 3 {
        return Err(invalid());
    }
    let mut values = [0.0_f64; 3];
    for (i, value) in seq.iter().enumerate() {
        values[i] = value.as_f64().ok_or_else(invalid)?;
    }
    Ok(Pose::new(Vector2::new(values[0], values[1]), values[2]))
}

fn resolve_model_path(dir: &Path, declared: &str) -> PathBuf {
    let declared = Path::new(declared);
    if declared.is_absolute() {
        declared.to_path_buf()
    } else {
        dir.join(declared)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::fs;
    use tempfile::TempDir;

    const BOT_YAML: &str = "bodies:\n  - name: base\n    footprints:\n      - type: circle\n        radius: 0.5\n";

    fn write_world(dir: &TempDir, world_yaml: &str) -> PathBuf {
        let path = dir.path().join("world.yaml");
        fs::write(&path, world_yaml).unwrap();
        path
    }

    fn simple_world(dir: &TempDir) -> PathBuf {
        fs::write(dir.path().join("bot.yaml"), BOT_YAML).unwrap();
        write_world(
            dir,
            "properties: {}\nlayers:\n  - name: wall\n    rectangles: [[0.0, 0.0, 10.0, 0.2]]\nmodels:\n  - name: bot1\n    pose: [1.0, 2.0, 0.0]\n    model: bot.yaml\n",
        )
    }

    #[test]
    fn test_missing_properties_fails() {
        let dir = TempDir::new().unwrap();
        let path = write_world(&dir, "layers: []\n");
        let err = World::load(&path).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Config(ConfigError::WorldParam("properties"))
        ));
    }

    #[test]
    fn test_properties_must_be_mapping() {
        let dir = TempDir::new().unwrap();
        let path = write_world(&dir, "properties: 42\nlayers: []\n");
        let err = World::load(&path).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Config(ConfigError::WorldParam("properties"))
        ));
    }

    #[test]
    fn test_missing_layers_fails() {
        let dir = TempDir::new().unwrap();
        let path = write_world(&dir, "properties: {}\n");
        let err = World::load(&path).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Config(ConfigError::WorldParam("layers"))
        ));
    }

    #[test]
    fn test_layer_budget_enforced() {
        let dir = TempDir::new().unwrap();
        let mut yaml = String::from("properties: {}\nlayers:\n");
        for i in 0..=MAX_LAYERS {
            yaml.push_str(&format!("  - name: layer{i}\n"));
        }
        let path = write_world(&dir, &yaml);
        let err = World::load(&path).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Config(ConfigError::LayersFull { max: MAX_LAYERS })
        ));
    }

    #[test]
    fn test_model_entry_requires_name_pose_and_model() {
        let dir = TempDir::new().unwrap();

        let path = write_world(
            &dir,
            "properties: {}\nlayers: []\nmodels:\n  - pose: [0.0, 0.0, 0.0]\n    model: bot.yaml\n",
        );
        let err = World::load(&path).unwrap_err().to_string();
        assert!(err.contains("name"));
        assert!(err.contains("index=0"));

        let path = write_world(
            &dir,
            "properties: {}\nlayers: []\nmodels:\n  - name: bot1\n    model: bot.yaml\n",
        );
        let err = World::load(&path).unwrap_err().to_string();
        assert!(err.contains("pose"));
        assert!(err.contains("bot1"));

        let path = write_world(
            &dir,
            "properties: {}\nlayers: []\nmodels:\n  - name: bot1\n    pose: [0.0, 0.0]\n    model: bot.yaml\n",
        );
        let err = World::load(&path).unwrap_err().to_string();
        assert!(err.contains("pose"));

        let path = write_world(
            &dir,
            "properties: {}\nlayers: []\nmodels:\n  - name: bot1\n    pose: [0.0, 0.0, 0.0]\n",
        );
        let err = World::load(&path).unwrap_err().to_string();
        assert!(err.contains("model"));
    }

    #[test]
    fn test_models_section_must_be_sequence() {
        let dir = TempDir::new().unwrap();
        let path = write_world(&dir, "properties: {}\nlayers: []\nmodels: 7\n");
        let err = World::load(&path).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Config(ConfigError::WorldParam("models"))
        ));
    }

    #[test]
    fn test_relative_model_path_resolves_against_world_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("robots")).unwrap();
        fs::write(dir.path().join("robots/bot.yaml"), BOT_YAML).unwrap();
        let path = write_world(
            &dir,
            "properties: {}\nlayers: []\nmodels:\n  - name: bot1\n    pose: [0.0, 0.0, 0.0]\n    model: robots/bot.yaml\n",
        );
        let world = World::load(&path).unwrap();
        assert_eq!(world.models().len(), 1);
    }

    #[test]
    fn test_absolute_model_path_used_verbatim() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let bot_path = other.path().join("bot.yaml");
        fs::write(&bot_path, BOT_YAML).unwrap();
        let path = write_world(
            &dir,
            &format!(
                "properties: {{}}\nlayers: []\nmodels:\n  - name: bot1\n    pose: [0.0, 0.0, 0.0]\n    model: {}\n",
                bot_path.display()
            ),
        );
        let world = World::load(&path).unwrap();
        assert_eq!(world.models().len(), 1);
    }

    #[test]
    fn test_load_builds_layers_and_models_in_document_order() {
        let dir = TempDir::new().unwrap();
        let path = simple_world(&dir);
        let world = World::load(&path).unwrap();

        assert_eq!(world.layers().len(), 1);
        assert_eq!(world.models().len(), 1);
        assert_eq!(world.layers()[0].name(), "wall");
        assert_eq!(world.models()[0].name(), "bot1");

        let base = world.models()[0].body_named("base").unwrap();
        let pose = world.scene().pose(base).unwrap();
        assert_relative_eq!(pose.translation.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(pose.translation.y, 2.0, epsilon = 1e-12);
        assert_relative_eq!(pose.rotation.angle(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_update_advances_time_and_scene_together() {
        let dir = TempDir::new().unwrap();
        let path = simple_world(&dir);
        let mut world = World::load(&path).unwrap();
        let mut tk = Timekeeper::new(0.01);

        for _ in 0..25 {
            world.update(&mut tk);
        }
        assert_eq!(tk.step_count(), 25);
        assert_relative_eq!(tk.time(), 0.25, epsilon = 1e-12);
        assert_eq!(world.scene().step_count(), 25);
    }

    #[test]
    fn test_teardown_order_and_idempotence() {
        let dir = TempDir::new().unwrap();
        let path = simple_world(&dir);
        let mut world = World::load(&path).unwrap();
        let mut tk = Timekeeper::default();
        world.update(&mut tk);

        world.teardown();
        assert!(!world.scene().contact_events_enabled());
        assert_eq!(world.scene().body_count(), 0);
        assert_eq!(world.scene().released_bodies(), 1);
        assert_eq!(world.scene().destroyed_bodies(), 1);

        // A second teardown (and the eventual Drop) must not double-release.
        world.teardown();
        assert_eq!(world.scene().released_bodies(), 1);
        assert_eq!(world.scene().destroyed_bodies(), 1);
    }

    #[test]
    fn test_spawn_and_delete_model_at_runtime() {
        let dir = TempDir::new().unwrap();
        let path = simple_world(&dir);
        let mut world = World::load(&path).unwrap();

        let bot_path = dir.path().join("bot.yaml");
        world
            .spawn_model(&bot_path, "", "bot2", Pose::new(Vector2::new(5.0, 5.0), 0.0))
            .unwrap();
        assert_eq!(world.models().len(), 2);

        world.delete_model("bot1").unwrap();
        assert_eq!(world.models().len(), 1);
        assert_eq!(world.models()[0].name(), "bot2");

        let err = world.delete_model("bot1").unwrap_err();
        assert!(matches!(err, ConfigError::NoSuchModel(_)));
    }

    #[test]
    fn test_debug_visualize_refreshes_models_always_layers_on_request() {
        let dir = TempDir::new().unwrap();
        let path = simple_world(&dir);
        let mut world = World::load(&path).unwrap();

        world.debug_visualize(false);
        assert_eq!(world.layers()[0].viz().revision, 0);
        assert_eq!(world.models()[0].viz().revision, 1);

        world.debug_visualize(true);
        assert_eq!(world.layers()[0].viz().revision, 1);
        assert_eq!(world.models()[0].viz().revision, 2);
    }

    #[test]
    fn test_plugins_must_be_a_sequence() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("bot.yaml"),
            "bodies:\n  - name: base\nplugins: 12\n",
        )
        .unwrap();
        let path = write_world(
            &dir,
            "properties: {}\nlayers: []\nmodels:\n  - name: bot1\n    pose: [0.0, 0.0, 0.0]\n    model: bot.yaml\n",
        );
        let err = World::load(&path).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Config(ConfigError::PluginsNotSequence { .. })
        ));
    }

    #[test]
    fn test_unknown_plugin_type_fails_load() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("bot.yaml"),
            "bodies:\n  - name: base\nplugins:\n  - name: front_laser\n    type: Laser\n",
        )
        .unwrap();
        let path = write_world(
            &dir,
            "properties: {}\nlayers: []\nmodels:\n  - name: bot1\n    pose: [0.0, 0.0, 0.0]\n    model: bot.yaml\n",
        );
        let err = World::load(&path).unwrap_err();
        assert!(matches!(err, LoadError::Plugin(_)));
    }
}
