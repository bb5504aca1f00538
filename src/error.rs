//! Error types for world loading and behavior-unit registration.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while validating or applying declarative world,
/// layer, or model content.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A document could not be read from disk.
    #[error("error reading {path:?}")]
    Io {
        /// Path of the document that failed to read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A document is not valid YAML.
    #[error("error loading {path:?}")]
    Yaml {
        /// Path of the document that failed to parse.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_yaml::Error,
    },

    /// A required top-level world parameter is missing or has the wrong type.
    #[error("missing/invalid world param \"{0}\"")]
    WorldParam(&'static str),

    /// A required field is missing or has the wrong type.
    #[error("missing/invalid \"{field}\" in {context}")]
    MissingField {
        /// The missing field name.
        field: &'static str,
        /// Where the field was expected (entry index or entity name).
        context: String,
    },

    /// A layer or model fragment did not deserialize into its config shape.
    #[error("invalid {context}")]
    Fragment {
        /// Which fragment was being deserialized.
        context: String,
        /// Underlying deserialization failure.
        #[source]
        source: serde_yaml::Error,
    },

    /// The collision-class budget is exhausted.
    #[error("max number of layers reached, max is {max}")]
    LayersFull {
        /// The fixed layer budget.
        max: usize,
    },

    /// Two layers declared the same name.
    #[error("duplicate layer name: {0}")]
    DuplicateLayer(String),

    /// A footprint or lookup referenced a layer that was never loaded.
    #[error("reference to unknown layer: {layer} in {context}")]
    UnknownLayer {
        /// The layer name that was referenced.
        layer: String,
        /// The context where it was referenced.
        context: String,
    },

    /// A model fragment is structurally valid YAML but semantically invalid.
    #[error("invalid model \"{model}\": {message}")]
    InvalidModel {
        /// The model being built.
        model: String,
        /// Description of why the model is invalid.
        message: String,
    },

    /// A model's `plugins` entry is present but not a sequence.
    #[error("invalid \"plugins\" in {model} model, not a list")]
    PluginsNotSequence {
        /// The model declaring the plugins.
        model: String,
    },

    /// A runtime operation referenced a model that is not in the world.
    #[error("no such model: {0}")]
    NoSuchModel(String),

    /// The physics scene rejected an operation during entity construction.
    #[error("physics scene error in {context}")]
    Scene {
        /// The entity being built.
        context: String,
        /// Underlying scene failure.
        #[source]
        source: SceneError,
    },
}

impl ConfigError {
    /// Create an I/O error for a document path.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a YAML parse error for a document path.
    pub fn yaml(path: impl AsRef<Path>, source: serde_yaml::Error) -> Self {
        Self::Yaml {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a missing-field error.
    pub fn missing_field(field: &'static str, context: impl Into<String>) -> Self {
        Self::MissingField {
            field,
            context: context.into(),
        }
    }

    /// Create a fragment deserialization error.
    pub fn fragment(context: impl Into<String>, source: serde_yaml::Error) -> Self {
        Self::Fragment {
            context: context.into(),
            source,
        }
    }

    /// Create an unknown-layer reference error.
    pub fn unknown_layer(layer: impl Into<String>, context: impl Into<String>) -> Self {
        Self::UnknownLayer {
            layer: layer.into(),
            context: context.into(),
        }
    }

    /// Create an invalid-model error.
    pub fn invalid_model(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidModel {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Create a scene-rejection error.
    pub fn scene(context: impl Into<String>, source: SceneError) -> Self {
        Self::Scene {
            context: context.into(),
            source,
        }
    }
}

/// Errors raised by the physics scene itself.
#[derive(Debug, Error)]
pub enum SceneError {
    /// An operation referenced a body that is not in the scene.
    #[error("unknown body handle {0}")]
    UnknownBody(u64),
}

/// Errors that can occur while loading or initializing a behavior unit.
#[derive(Debug, Error)]
pub enum PluginError {
    /// No factory is registered for the declared plugin type.
    #[error("unknown plugin type \"{kind}\" for plugin \"{name}\" of model \"{model}\"")]
    UnknownType {
        /// The declared plugin type.
        kind: String,
        /// The declared plugin name.
        name: String,
        /// The model the plugin is bound to.
        model: String,
    },

    /// The plugin factory failed to construct or initialize the unit.
    #[error("plugin \"{name}\" of model \"{model}\" failed to initialize: {message}")]
    Init {
        /// The declared plugin name.
        name: String,
        /// The model the plugin is bound to.
        model: String,
        /// Description of the failure.
        message: String,
    },
}

impl PluginError {
    /// Create an initialization failure.
    pub fn init(
        name: impl Into<String>,
        model: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Init {
            name: name.into(),
            model: model.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by the world load entry points.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Malformed or missing declarative content.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A behavior unit failed to load or initialize.
    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// Result type for world loading operations.
pub type Result<T, E = LoadError> = std::result::Result<T, E>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_world_param_display() {
        let err = ConfigError::WorldParam("properties");
        assert_eq!(
            err.to_string(),
            "missing/invalid world param \"properties\""
        );
    }

    #[test]
    fn test_missing_field() {
        let err = ConfigError::missing_field("pose", "model 'bot1'");
        assert!(err.to_string().contains("pose"));
        assert!(err.to_string().contains("bot1"));
    }

    #[test]
    fn test_layers_full() {
        let err = ConfigError::LayersFull { max: 16 };
        assert!(err.to_string().contains("16"));
    }

    #[test]
    fn test_unknown_layer() {
        let err = ConfigError::unknown_layer("lasers", "model 'bot1' footprint");
        assert!(err.to_string().contains("lasers"));
        assert!(err.to_string().contains("bot1"));
    }

    #[test]
    fn test_plugin_unknown_type() {
        let err = PluginError::UnknownType {
            kind: "Laser".into(),
            name: "front_laser".into(),
            model: "bot1".into(),
        };
        assert!(err.to_string().contains("Laser"));
        assert!(err.to_string().contains("front_laser"));
    }

    #[test]
    fn test_load_error_wraps_both_kinds() {
        let config: LoadError = ConfigError::WorldParam("layers").into();
        let plugin: LoadError = PluginError::init("p", "m", "boom").into();
        assert!(matches!(config, LoadError::Config(_)));
        assert!(matches!(plugin, LoadError::Plugin(_)));
    }
}
