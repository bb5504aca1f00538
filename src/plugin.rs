//! Behavior units ("plugins") and their registry.
//!
//! A behavior unit is extension code bound to a model, invoked around every
//! physics step and on every contact event. Units are constructed by
//! factories registered per type name; a world document names the type and
//! the factory builds the unit from the remaining fragment.
//!
//! Units are trusted, same-process extension code: step hooks receive a
//! mutable reference to the physics scene and may mutate any entity. The core
//! offers no isolation.

use std::collections::HashMap;
use std::fmt;

use tracing::info;

use crate::error::{ConfigError, PluginError};
use crate::model::Model;
use crate::scene::{Contact, ContactImpulse, ContactListener, Manifold, PhysicsScene};
use crate::timekeeper::Timekeeper;

/// A behavior unit bound to a model.
///
/// All hooks default to no-ops; implementations override the ones they need.
pub trait ModelPlugin {
    /// Invoked before every physics step.
    fn before_physics_step(&mut self, _scene: &mut PhysicsScene, _timekeeper: &Timekeeper) {}

    /// Invoked after every physics step, once elapsed time has advanced.
    fn after_physics_step(&mut self, _scene: &mut PhysicsScene, _timekeeper: &Timekeeper) {}

    /// Two fixtures started touching this step.
    fn begin_contact(&mut self, _contact: &Contact) {}

    /// Two fixtures stopped touching.
    fn end_contact(&mut self, _contact: &Contact) {}

    /// Invoked between collision detection and impulse reporting; may disable
    /// the contact.
    fn pre_solve(&mut self, _contact: &mut Contact, _old_manifold: &Manifold) {}

    /// Invoked with the collision magnitude of an enabled contact.
    fn post_solve(&mut self, _contact: &Contact, _impulse: &ContactImpulse) {}
}

/// Factory constructing a behavior unit from its declarative fragment.
pub type PluginFactory =
    Box<dyn Fn(&Model, &PluginConfig) -> Result<Box<dyn ModelPlugin>, PluginError> + Send + Sync>;

/// Parsed behavior-unit fragment of a model entry.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    /// Unit name, unique per model.
    pub name: String,
    /// Registered type the factory is looked up under.
    pub kind: String,
    /// The full fragment, passed to the factory verbatim.
    pub raw: serde_yaml::Value,
}

impl PluginConfig {
    /// Parse a behavior-unit fragment.
    ///
    /// # Errors
    ///
    /// Fails when `name` or `type` is missing or not a string.
    pub fn from_value(value: &serde_yaml::Value, model: &str) -> Result<Self, ConfigError> {
        let context = format!("plugin of model '{model}'");
        let name = value
            .get("name")
            .and_then(serde_yaml::Value::as_str)
            .ok_or_else(|| ConfigError::missing_field("name", context.clone()))?;
        let kind = value
            .get("type")
            .and_then(serde_yaml::Value::as_str)
            .ok_or_else(|| ConfigError::missing_field("type", context))?;
        Ok(Self {
            name: name.to_string(),
            kind: kind.to_string(),
            raw: value.clone(),
        })
    }
}

/// A loaded behavior unit and its binding.
pub struct LoadedPlugin {
    name: String,
    kind: String,
    model: String,
    namespace: String,
    instance: Box<dyn ModelPlugin>,
}

impl LoadedPlugin {
    /// The unit name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The registered type the unit was built from.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Name of the model the unit is bound to.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Namespace of the model the unit is bound to.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// Registry and dispatcher for behavior units.
#[derive(Default)]
pub struct PluginManager {
    factories: HashMap<String, PluginFactory>,
    plugins: Vec<LoadedPlugin>,
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .field("plugins", &self.plugins)
            .finish()
    }
}

impl PluginManager {
    /// Create an empty manager with no registered factories.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a plugin type.
    pub fn register_factory<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&Model, &PluginConfig) -> Result<Box<dyn ModelPlugin>, PluginError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    /// Load a behavior unit bound to a model.
    ///
    /// # Errors
    ///
    /// Fails when no factory is registered for the declared type or the
    /// factory itself fails.
    pub fn load_model_plugin(
        &mut self,
        model: &Model,
        config: PluginConfig,
    ) -> Result<(), PluginError> {
        let factory = self
            .factories
            .get(&config.kind)
            .ok_or_else(|| PluginError::UnknownType {
                kind: config.kind.clone(),
                name: config.name.clone(),
                model: model.name().to_string(),
            })?;
        let instance = factory(model, &config)?;
        info!(
            "plugin '{}' of type '{}' loaded for model '{}'",
            config.name,
            config.kind,
            model.name()
        );
        self.plugins.push(LoadedPlugin {
            name: config.name,
            kind: config.kind,
            model: model.name().to_string(),
            namespace: model.namespace().to_string(),
            instance,
        });
        Ok(())
    }

    /// Remove every unit bound to the named model.
    pub fn delete_model_plugins(&mut self, model: &str) {
        self.plugins.retain(|p| p.model != model);
    }

    /// Number of loaded units.
    #[must_use]
    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Iterate over the loaded units in load order.
    pub fn plugins(&self) -> impl Iterator<Item = &LoadedPlugin> {
        self.plugins.iter()
    }

    /// Run every unit's before-step hook, in load order.
    pub fn before_physics_step(&mut self, scene: &mut PhysicsScene, timekeeper: &Timekeeper) {
        for plugin in &mut self.plugins {
            plugin.instance.before_physics_step(scene, timekeeper);
        }
    }

    /// Run every unit's after-step hook, in load order.
    pub fn after_physics_step(&mut self, scene: &mut PhysicsScene, timekeeper: &Timekeeper) {
        for plugin in &mut self.plugins {
            plugin.instance.after_physics_step(scene, timekeeper);
        }
    }
}

/// The manager is the contact sink of the world: every event is forwarded
/// verbatim to every loaded unit. Resolving which units care about which
/// fixtures is the units' responsibility.
impl ContactListener for PluginManager {
    fn begin_contact(&mut self, contact: &Contact) {
        for plugin in &mut self.plugins {
            plugin.instance.begin_contact(contact);
        }
    }

    fn end_contact(&mut self, contact: &Contact) {
        for plugin in &mut self.plugins {
            plugin.instance.end_contact(contact);
        }
    }

    fn pre_solve(&mut self, contact: &mut Contact, old_manifold: &Manifold) {
        for plugin in &mut self.plugins {
            plugin.instance.pre_solve(contact, old_manifold);
        }
    }

    fn post_solve(&mut self, contact: &Contact, impulse: &ContactImpulse) {
        for plugin in &mut self.plugins {
            plugin.instance.post_solve(contact, impulse);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::filter::CollisionFilterRegistry;
    use crate::model::ModelConfig;
    use nalgebra::Vector2;
    use std::sync::{Arc, Mutex};

    struct Recording {
        tag: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl ModelPlugin for Recording {
        fn before_physics_step(&mut self, _scene: &mut PhysicsScene, tk: &Timekeeper) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{} before {}", self.tag, tk.step_count()));
        }

        fn after_physics_step(&mut self, _scene: &mut PhysicsScene, tk: &Timekeeper) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{} after {}", self.tag, tk.step_count()));
        }
    }

    fn test_model(scene: &mut PhysicsScene) -> Model {
        let registry = CollisionFilterRegistry::new();
        let config: ModelConfig = serde_yaml::from_str("bodies:\n  - name: base\n").unwrap();
        Model::from_config(scene, &registry, config, "", "bot1").unwrap()
    }

    fn register_recording(manager: &mut PluginManager, log: &Arc<Mutex<Vec<String>>>) {
        let log = Arc::clone(log);
        manager.register_factory("Recording", move |_model: &Model, config: &PluginConfig| {
            Ok(Box::new(Recording {
                tag: config.name.clone(),
                log: Arc::clone(&log),
            }) as Box<dyn ModelPlugin>)
        });
    }

    #[test]
    fn test_unknown_type_fails() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        let model = test_model(&mut scene);
        let mut manager = PluginManager::new();
        let config = PluginConfig {
            name: "p".into(),
            kind: "Laser".into(),
            raw: serde_yaml::Value::Null,
        };
        let err = manager.load_model_plugin(&model, config).unwrap_err();
        assert!(matches!(err, PluginError::UnknownType { .. }));
    }

    #[test]
    fn test_hooks_run_in_load_order() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        let model = test_model(&mut scene);
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut manager = PluginManager::new();
        register_recording(&mut manager, &log);
        for name in ["first", "second"] {
            let config = PluginConfig {
                name: name.into(),
                kind: "Recording".into(),
                raw: serde_yaml::Value::Null,
            };
            manager.load_model_plugin(&model, config).unwrap();
        }

        let tk = Timekeeper::default();
        manager.before_physics_step(&mut scene, &tk);
        manager.after_physics_step(&mut scene, &tk);

        let events = log.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["first before 0", "second before 0", "first after 0", "second after 0"]
        );
    }

    #[test]
    fn test_delete_model_plugins() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        let model = test_model(&mut scene);
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut manager = PluginManager::new();
        register_recording(&mut manager, &log);
        let config = PluginConfig {
            name: "p".into(),
            kind: "Recording".into(),
            raw: serde_yaml::Value::Null,
        };
        manager.load_model_plugin(&model, config).unwrap();
        assert_eq!(manager.plugin_count(), 1);

        manager.delete_model_plugins("bot1");
        assert_eq!(manager.plugin_count(), 0);
    }

    #[test]
    fn test_plugin_config_requires_name_and_type() {
        let value: serde_yaml::Value =
            serde_yaml::from_str("name: front_laser\n").unwrap();
        let err = PluginConfig::from_value(&value, "bot1").unwrap_err();
        assert!(err.to_string().contains("type"));

        let value: serde_yaml::Value =
            serde_yaml::from_str("type: Laser\n").unwrap();
        let err = PluginConfig::from_value(&value, "bot1").unwrap_err();
        assert!(err.to_string().contains("name"));

        let value: serde_yaml::Value =
            serde_yaml::from_str("name: front_laser\ntype: Laser\nrange: 5.0\n").unwrap();
        let config = PluginConfig::from_value(&value, "bot1").unwrap();
        assert_eq!(config.name, "front_laser");
        assert_eq!(config.kind, "Laser");
    }
}
