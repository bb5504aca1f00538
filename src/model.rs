//! Placeable, potentially dynamic entities built from model documents.
//!
//! A model owns one or more bodies (and joint records) in the shared scene.
//! After construction it is moved to its declared pose by a single rigid
//! transform applied uniformly to every body.

use nalgebra::{Point2, Vector2};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::filter::CollisionFilterRegistry;
use crate::scene::{
    BodyHandle, BodyType, CollisionFilter, Fixture, Joint, JointHandle, JointKind, PhysicsScene,
    Pose, Shape,
};
use crate::viz::DebugFrame;

/// Body kind as declared in a model document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyTypeConfig {
    /// Integrated every step.
    #[default]
    Dynamic,
    /// Immovable.
    Static,
}

impl From<BodyTypeConfig> for BodyType {
    fn from(value: BodyTypeConfig) -> Self {
        match value {
            BodyTypeConfig::Dynamic => Self::Dynamic,
            BodyTypeConfig::Static => Self::Static,
        }
    }
}

/// A collision footprint of a model body.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FootprintConfig {
    /// Circular footprint.
    Circle {
        /// Center in body-local coordinates.
        #[serde(default)]
        center: [f64; 2],
        /// Radius in meters.
        radius: f64,
        /// Names of the layers this footprint collides with; empty means all.
        #[serde(default)]
        layers: Vec<String>,
        /// Sensor footprints report contacts without a solve phase.
        #[serde(default)]
        sensor: bool,
    },
    /// Convex polygon footprint.
    Polygon {
        /// Corners in body-local coordinates.
        points: Vec<[f64; 2]>,
        /// Names of the layers this footprint collides with; empty means all.
        #[serde(default)]
        layers: Vec<String>,
        /// Sensor footprints report contacts without a solve phase.
        #[serde(default)]
        sensor: bool,
    },
}

/// One body entry of a model document.
#[derive(Debug, Clone, Deserialize)]
pub struct BodyConfig {
    /// Body name, unique within the model.
    pub name: String,
    /// Body kind; dynamic unless declared otherwise.
    #[serde(default, rename = "type")]
    pub body_type: BodyTypeConfig,
    /// Pose `[x, y, heading]` relative to the model origin.
    #[serde(default)]
    pub pose: [f64; 3],
    /// Collision footprints.
    #[serde(default)]
    pub footprints: Vec<FootprintConfig>,
}

/// Joint kind as declared in a model document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JointKindConfig {
    /// Rigid attachment.
    Weld,
    /// Rotation about a shared anchor.
    Revolute,
}

impl From<JointKindConfig> for JointKind {
    fn from(value: JointKindConfig) -> Self {
        match value {
            JointKindConfig::Weld => Self::Weld,
            JointKindConfig::Revolute => Self::Revolute,
        }
    }
}

/// One joint entry of a model document.
#[derive(Debug, Clone, Deserialize)]
pub struct JointConfig {
    /// Joint name.
    pub name: String,
    /// Joint kind.
    #[serde(rename = "type")]
    pub kind: JointKindConfig,
    /// Names of the two connected bodies.
    pub bodies: [String; 2],
    /// Anchor points on each body, in their local frames.
    #[serde(default)]
    pub anchors: [[f64; 2]; 2],
}

/// Declarative model document.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Bodies of the model; at least one is required.
    #[serde(default)]
    pub bodies: Vec<BodyConfig>,
    /// Joints connecting model bodies.
    #[serde(default)]
    pub joints: Vec<JointConfig>,
    /// Behavior-unit fragments, validated and registered by the world.
    #[serde(default)]
    pub plugins: Option<serde_yaml::Value>,
}

/// One built body of a model.
#[derive(Debug)]
pub struct ModelBody {
    /// Body name as declared in the model document.
    pub name: String,
    /// Handle of the body in the scene.
    pub handle: BodyHandle,
}

/// A named, namespaced entity placed into the world.
#[derive(Debug)]
pub struct Model {
    name: String,
    namespace: String,
    bodies: Vec<ModelBody>,
    joints: Vec<JointHandle>,
    plugin_fragments: Option<serde_yaml::Value>,
    viz: DebugFrame,
}

impl Model {
    /// Build a model into the shared scene from its parsed document.
    ///
    /// Bodies are created at their declared local poses; the caller is
    /// expected to place the model afterwards with [`Model::transform_all`].
    ///
    /// # Errors
    ///
    /// Fails when the document is semantically invalid (no bodies, duplicate
    /// body names, degenerate footprints, joints naming unknown bodies) or a
    /// footprint references an unknown layer.
    pub fn from_config(
        scene: &mut PhysicsScene,
        registry: &CollisionFilterRegistry,
        config: ModelConfig,
        namespace: &str,
        name: &str,
    ) -> Result<Self, ConfigError> {
        validate(&config, name)?;

        let mut bodies = Vec::with_capacity(config.bodies.len());
        for body_config in &config.bodies {
            let [x, y, heading] = body_config.pose;
            let handle = scene.create_body(
                body_config.body_type.into(),
                Pose::new(Vector2::new(x, y), heading),
            );
            if let Some(body) = scene.body_mut(handle) {
                body.name = Some(format!("{name}/{}", body_config.name));
            }

            for footprint in &body_config.footprints {
                let fixture = build_footprint(registry, footprint, name)?;
                scene
                    .create_fixture(handle, fixture)
                    .map_err(|e| ConfigError::scene(format!("model '{name}'"), e))?;
            }

            bodies.push(ModelBody {
                name: body_config.name.clone(),
                handle,
            });
        }

        let mut joints = Vec::with_capacity(config.joints.len());
        for joint_config in &config.joints {
            let [ref a, ref b] = joint_config.bodies;
            let body_a = body_named(&bodies, a)
                .ok_or_else(|| joint_body_error(name, &joint_config.name, a))?;
            let body_b = body_named(&bodies, b)
                .ok_or_else(|| joint_body_error(name, &joint_config.name, b))?;
            let [[ax, ay], [bx, by]] = joint_config.anchors;
            let handle = scene
                .create_joint(Joint {
                    name: Some(joint_config.name.clone()),
                    kind: joint_config.kind.into(),
                    body_a,
                    body_b,
                    anchor_a: Point2::new(ax, ay),
                    anchor_b: Point2::new(bx, by),
                })
                .map_err(|e| ConfigError::scene(format!("model '{name}'"), e))?;
            joints.push(handle);
        }

        Ok(Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            bodies,
            joints,
            plugin_fragments: config.plugins,
            viz: DebugFrame::default(),
        })
    }

    /// Apply a single rigid transform uniformly to every body of the model.
    ///
    /// Each body's pose becomes `pose * current`, so the whole model is
    /// rotated about the placement origin and translated as one piece.
    pub fn transform_all(&self, scene: &mut PhysicsScene, pose: &Pose) {
        for body in &self.bodies {
            if let Some(b) = scene.body_mut(body.handle) {
                b.pose = pose * b.pose;
            }
        }
    }

    /// The model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The namespace used to disambiguate the model's behavior-unit topics.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The built bodies, in document order.
    #[must_use]
    pub fn bodies(&self) -> &[ModelBody] {
        &self.bodies
    }

    /// Handles of every body owned by the model.
    pub fn body_handles(&self) -> impl Iterator<Item = BodyHandle> + '_ {
        self.bodies.iter().map(|b| b.handle)
    }

    /// Handle of the named body, if the model declares it.
    #[must_use]
    pub fn body_named(&self, name: &str) -> Option<BodyHandle> {
        body_named(&self.bodies, name)
    }

    /// Joint handles owned by the model.
    #[must_use]
    pub fn joints(&self) -> &[JointHandle] {
        &self.joints
    }

    /// The declared behavior-unit fragments, if any.
    #[must_use]
    pub fn plugin_fragments(&self) -> Option<&serde_yaml::Value> {
        self.plugin_fragments.as_ref()
    }

    /// Refresh the model's visualization snapshot.
    pub fn debug_visualize(&mut self, scene: &PhysicsScene) {
        self.viz.refresh(scene, self.bodies.iter().map(|b| b.handle));
    }

    /// The last visualization snapshot.
    #[must_use]
    pub fn viz(&self) -> &DebugFrame {
        &self.viz
    }
}

fn body_named(bodies: &[ModelBody], name: &str) -> Option<BodyHandle> {
    bodies.iter().find(|b| b.name == name).map(|b| b.handle)
}

fn joint_body_error(model: &str, joint: &str, body: &str) -> ConfigError {
    ConfigError::invalid_model(
        model,
        format!("joint \"{joint}\" references unknown body \"{body}\""),
    )
}

fn build_footprint(
    registry: &CollisionFilterRegistry,
    footprint: &FootprintConfig,
    model: &str,
) -> Result<Fixture, ConfigError> {
    let context = format!("model '{model}' footprint");
    match footprint {
        FootprintConfig::Circle {
            center,
            radius,
            layers,
            sensor,
        } => {
            let bits = registry.category_bits(layers, &context)?;
            let shape = Shape::circle(Point2::new(center[0], center[1]), *radius);
            Ok(Fixture::new(shape)
                .with_filter(CollisionFilter::new(bits, bits))
                .with_sensor(*sensor))
        }
        FootprintConfig::Polygon {
            points,
            layers,
            sensor,
        } => {
            let bits = registry.category_bits(layers, &context)?;
            let shape = Shape::polygon(
                points.iter().map(|[x, y]| Point2::new(*x, *y)).collect(),
            );
            Ok(Fixture::new(shape)
                .with_filter(CollisionFilter::new(bits, bits))
                .with_sensor(*sensor))
        }
    }
}

fn validate(config: &ModelConfig, model: &str) -> Result<(), ConfigError> {
    if config.bodies.is_empty() {
        return Err(ConfigError::invalid_model(
            model,
            "must declare at least one body",
        ));
    }
    for (i, body) in config.bodies.iter().enumerate() {
        if body.name.is_empty() {
            return Err(ConfigError::invalid_model(
                model,
                format!("body index={i} has an empty name"),
            ));
        }
        if config.bodies[..i].iter().any(|b| b.name == body.name) {
            return Err(ConfigError::invalid_model(
                model,
                format!("duplicate body name \"{}\"", body.name),
            ));
        }
        for footprint in &body.footprints {
            match footprint {
                FootprintConfig::Circle { radius, .. } => {
                    if !radius.is_finite() || *radius <= 0.0 {
                        return Err(ConfigError::invalid_model(
                            model,
                            format!(
                                "body \"{}\" circle footprint radius must be positive, got {radius}",
                                body.name
                            ),
                        ));
                    }
                }
                FootprintConfig::Polygon { points, .. } => {
                    if points.len() < 3 {
                        return Err(ConfigError::invalid_model(
                            model,
                            format!(
                                "body \"{}\" polygon footprint needs at least 3 points, got {}",
                                body.name,
                                points.len()
                            ),
                        ));
                    }
                }
            }
        }
    }
    Ok(())
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

    const BOT_YAML: &str = r#"
bodies:
  - name: base
    pose: [0.0, 0.0, 0.0]
    footprints:
      - type: circle
        radius: 0.5
  - name: bumper
    pose: [0.6, 0.0, 0.0]
    footprints:
      - type: polygon
        points: [[-0.1, -0.2], [0.1, -0.2], [0.1, 0.2], [-0.1, 0.2]]
        sensor: true
joints:
  - name: bumper_mount
    type: weld
    bodies: [base, bumper]
"#;

    fn bot_config() -> ModelConfig {
        serde_yaml::from_str(BOT_YAML).unwrap()
    }

    #[test]
    fn test_builds_bodies_joints_and_footprints() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        let registry = CollisionFilterRegistry::new();
        let model =
            Model::from_config(&mut scene, &registry, bot_config(), "", "bot1").unwrap();

        assert_eq!(model.name(), "bot1");
        assert_eq!(model.bodies().len(), 2);
        assert_eq!(model.joints().len(), 1);
        assert_eq!(scene.body_count(), 2);
        assert_eq!(scene.fixture_count(), 2);
        assert_eq!(scene.joint_count(), 1);

        let bumper = model.body_named("bumper").unwrap();
        let fixture = scene.body(bumper).unwrap().fixtures.first().unwrap();
        assert!(fixture.is_sensor);
    }

    #[test]
    fn test_transform_all_is_uniform_and_rigid() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        let registry = CollisionFilterRegistry::new();
        let model =
            Model::from_config(&mut scene, &registry, bot_config(), "", "bot1").unwrap();

        // Quarter-turn, then translate to (1, 2).
        let placement = Pose::new(Vector2::new(1.0, 2.0), std::f64::consts::FRAC_PI_2);
        model.transform_all(&mut scene, &placement);

        let base = scene.pose(model.body_named("base").unwrap()).unwrap();
        assert_relative_eq!(base.translation.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(base.translation.y, 2.0, epsilon = 1e-12);
        assert_relative_eq!(
            base.rotation.angle(),
            std::f64::consts::FRAC_PI_2,
            epsilon = 1e-12
        );

        // The bumper sits 0.6 ahead of the base; after the quarter turn
        // "ahead" points along +y.
        let bumper = scene.pose(model.body_named("bumper").unwrap()).unwrap();
        assert_relative_eq!(bumper.translation.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(bumper.translation.y, 2.6, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_bodies_rejected() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        let registry = CollisionFilterRegistry::new();
        let config: ModelConfig = serde_yaml::from_str("bodies: []").unwrap();
        let err =
            Model::from_config(&mut scene, &registry, config, "", "empty").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidModel { .. }));
    }

    #[test]
    fn test_duplicate_body_name_rejected() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        let registry = CollisionFilterRegistry::new();
        let config: ModelConfig = serde_yaml::from_str(
            "bodies:\n  - name: base\n  - name: base\n",
        )
        .unwrap();
        let err =
            Model::from_config(&mut scene, &registry, config, "", "twins").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidModel { .. }));
    }

    #[test]
    fn test_unknown_footprint_layer_rejected() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        let registry = CollisionFilterRegistry::new();
        let config: ModelConfig = serde_yaml::from_str(
            "bodies:\n  - name: base\n    footprints:\n      - type: circle\n        radius: 0.5\n        layers: [lasers]\n",
        )
        .unwrap();
        let err =
            Model::from_config(&mut scene, &registry, config, "", "bot1").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownLayer { .. }));
    }

    #[test]
    fn test_joint_with_unknown_body_rejected() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        let registry = CollisionFilterRegistry::new();
        let config: ModelConfig = serde_yaml::from_str(
            "bodies:\n  - name: base\njoints:\n  - name: j\n    type: revolute\n    bodies: [base, wheel]\n",
        )
        .unwrap();
        let err =
            Model::from_config(&mut scene, &registry, config, "", "bot1").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidModel { .. }));
    }

    #[test]
    fn test_footprint_layers_pick_category_bits() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        let mut registry = CollisionFilterRegistry::new();
        registry.register_layer("ground").unwrap();
        registry.register_layer("walls").unwrap();

        let config: ModelConfig = serde_yaml::from_str(
            "bodies:\n  - name: base\n    footprints:\n      - type: circle\n        radius: 0.5\n        layers: [walls]\n",
        )
        .unwrap();
        let model =
            Model::from_config(&mut scene, &registry, config, "", "bot1").unwrap();
        let fixture_filter = scene
            .body(model.body_named("base").unwrap())
            .unwrap()
            .fixtures[0]
            .filter;
        assert_eq!(fixture_filter.category, 0b10);
        assert_eq!(fixture_filter.mask, 0b10);
    }
}
