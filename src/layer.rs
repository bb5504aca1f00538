//! Static collision geometry anchored to one body.
//!
//! A layer is built once during world loading, occupies one collision class,
//! and never moves afterwards. Model footprints opt into colliding with it by
//! naming it.

use nalgebra::Point2;
use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;
use crate::filter::{CollisionFilterRegistry, LayerId};
use crate::scene::{BodyHandle, BodyType, CollisionFilter, Fixture, PhysicsScene, Pose, Shape};
use crate::viz::DebugFrame;

/// Declarative fragment of a layer entry in the world document.
#[derive(Debug, Clone, Deserialize)]
pub struct LayerConfig {
    /// Unique layer name.
    pub name: String,
    /// Line segments, each `[x1, y1, x2, y2]`.
    #[serde(default)]
    pub lines: Vec<[f64; 4]>,
    /// Axis-aligned rectangles, each `[cx, cy, width, height]`.
    #[serde(default)]
    pub rectangles: Vec<[f64; 4]>,
}

/// Named, immutable-after-load static collision geometry.
#[derive(Debug)]
pub struct Layer {
    name: String,
    layer_id: LayerId,
    body: BodyHandle,
    viz: DebugFrame,
}

impl Layer {
    /// Build a layer into the shared scene, consuming one collision class.
    ///
    /// # Errors
    ///
    /// Fails when the collision-class budget is exhausted, the name is a
    /// duplicate, or the scene rejects the geometry.
    pub fn from_config(
        scene: &mut PhysicsScene,
        registry: &mut CollisionFilterRegistry,
        config: LayerConfig,
    ) -> Result<Self, ConfigError> {
        let layer_id = registry.register_layer(&config.name)?;
        let filter = CollisionFilter::new(layer_id.bit(), u16::MAX);

        let body = scene.create_body(BodyType::Static, Pose::identity());
        if let Some(b) = scene.body_mut(body) {
            b.name = Some(config.name.clone());
        }

        for [x1, y1, x2, y2] in &config.lines {
            let shape = Shape::segment(Point2::new(*x1, *y1), Point2::new(*x2, *y2));
            scene
                .create_fixture(body, Fixture::new(shape).with_filter(filter))
                .map_err(|e| ConfigError::scene(format!("layer '{}'", config.name), e))?;
        }
        for [cx, cy, w, h] in &config.rectangles {
            let shape = Shape::rectangle(*cx, *cy, *w, *h);
            scene
                .create_fixture(body, Fixture::new(shape).with_filter(filter))
                .map_err(|e| ConfigError::scene(format!("layer '{}'", config.name), e))?;
        }

        if config.lines.is_empty() && config.rectangles.is_empty() {
            warn!("layer '{}' declares no geometry", config.name);
        }

        Ok(Self {
            name: config.name,
            layer_id,
            body,
            viz: DebugFrame::default(),
        })
    }

    /// The layer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The collision class allocated to this layer.
    #[must_use]
    pub fn layer_id(&self) -> LayerId {
        self.layer_id
    }

    /// Handle of the layer's single static body.
    #[must_use]
    pub fn body(&self) -> BodyHandle {
        self.body
    }

    /// Refresh the layer's visualization snapshot.
    pub fn debug_visualize(&mut self, scene: &PhysicsScene) {
        self.viz.refresh(scene, [self.body]);
    }

    /// The last visualization snapshot.
    #[must_use]
    pub fn viz(&self) -> &DebugFrame {
        &self.viz
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use nalgebra::Vector2;

    fn wall_config() -> LayerConfig {
        LayerConfig {
            name: "wall".to_string(),
            lines: vec![[0.0, 0.0, 5.0, 0.0]],
            rectangles: vec![[2.0, 2.0, 1.0, 1.0]],
        }
    }

    #[test]
    fn test_builds_one_static_body_with_fixtures() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        let mut cfr = CollisionFilterRegistry::new();
        let layer = Layer::from_config(&mut scene, &mut cfr, wall_config()).unwrap();

        assert_eq!(layer.name(), "wall");
        assert_eq!(scene.body_count(), 1);
        assert_eq!(scene.fixture_count(), 2);
        let body = scene.body(layer.body()).unwrap();
        assert_eq!(body.body_type, BodyType::Static);
        assert_eq!(body.fixtures[0].filter.category, layer.layer_id().bit());
    }

    #[test]
    fn test_yaml_fragment_deserializes() {
        let value: serde_yaml::Value = serde_yaml::from_str(
            "name: wall\nrectangles:\n  - [0.0, 0.0, 10.0, 0.2]\n",
        )
        .unwrap();
        let config: LayerConfig = serde_yaml::from_value(value).unwrap();
        assert_eq!(config.name, "wall");
        assert_eq!(config.rectangles.len(), 1);
        assert!(config.lines.is_empty());
    }

    #[test]
    fn test_duplicate_layer_name_rejected() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        let mut cfr = CollisionFilterRegistry::new();
        Layer::from_config(&mut scene, &mut cfr, wall_config()).unwrap();
        let err = Layer::from_config(&mut scene, &mut cfr, wall_config()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateLayer(_)));
    }

    #[test]
    fn test_debug_visualize_refreshes_frame() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        let mut cfr = CollisionFilterRegistry::new();
        let mut layer = Layer::from_config(&mut scene, &mut cfr, wall_config()).unwrap();
        layer.debug_visualize(&scene);
        assert_eq!(layer.viz().shapes.len(), 2);
        assert_eq!(layer.viz().revision, 1);
    }
}
