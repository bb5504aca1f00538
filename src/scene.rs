//! The physics scene hosting all bodies built during world loading.
//!
//! The scene is deliberately minimal: it integrates body poses from their
//! velocities in fixed steps and reports fixture-overlap contact lifecycle
//! events to a listener, but computes no impulses or constraint responses.
//! Whatever forces the hosted robots need are applied through the step hooks
//! of the behavior layer, which receives mutable access to the scene between
//! steps.
//!
//! Contact events for a step are dispatched in a fixed order before
//! [`PhysicsScene::step`] returns: begins, then pre-solve/post-solve for every
//! touching pair, then ends. Sensor fixtures produce begin/end only.

use std::collections::BTreeMap;

use hashbrown::HashMap;
use nalgebra::{Isometry2, Point2, Vector2};

use crate::error::SceneError;

/// A rigid 2D pose (translation + heading).
pub type Pose = Isometry2<f64>;

/// Handle to a body in the scene. Never reused after release or destroy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(u64);

impl BodyHandle {
    /// Raw numeric value of the handle.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Handle to a joint record in the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointHandle(u64);

impl JointHandle {
    /// Raw numeric value of the handle.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Whether a body moves under integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    /// Immovable collision geometry.
    Static,
    /// Integrated every step from its velocities.
    Dynamic,
}

/// Collision geometry attached to a fixture, in body-local coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Circle with a local-frame center.
    Circle {
        /// Center in body-local coordinates.
        center: Point2<f64>,
        /// Radius in meters.
        radius: f64,
    },
    /// Convex polygon given by its corners.
    Polygon {
        /// Corners in body-local coordinates.
        points: Vec<Point2<f64>>,
    },
    /// Line segment between two endpoints.
    Segment {
        /// Start point in body-local coordinates.
        start: Point2<f64>,
        /// End point in body-local coordinates.
        end: Point2<f64>,
    },
}

impl Shape {
    /// Create a circle shape.
    #[must_use]
    pub fn circle(center: Point2<f64>, radius: f64) -> Self {
        Self::Circle { center, radius }
    }

    /// Create a polygon shape from corner points.
    #[must_use]
    pub fn polygon(points: Vec<Point2<f64>>) -> Self {
        Self::Polygon { points }
    }

    /// Create an axis-aligned rectangle polygon centered at (cx, cy).
    #[must_use]
    pub fn rectangle(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        let hw = width / 2.0;
        let hh = height / 2.0;
        Self::Polygon {
            points: vec![
                Point2::new(cx - hw, cy - hh),
                Point2::new(cx + hw, cy - hh),
                Point2::new(cx + hw, cy + hh),
                Point2::new(cx - hw, cy + hh),
            ],
        }
    }

    /// Create a line segment shape.
    #[must_use]
    pub fn segment(start: Point2<f64>, end: Point2<f64>) -> Self {
        Self::Segment { start, end }
    }

    fn aabb(&self, pose: &Pose) -> Aabb {
        match self {
            Self::Circle { center, radius } => {
                let c = pose * center;
                Aabb {
                    min: Point2::new(c.x - radius, c.y - radius),
                    max: Point2::new(c.x + radius, c.y + radius),
                }
            }
            Self::Polygon { points } => Aabb::from_points(points.iter().map(|p| pose * p)),
            Self::Segment { start, end } => {
                Aabb::from_points([pose * start, pose * end].into_iter())
            }
        }
    }
}

/// Category/mask collision filter.
///
/// Two fixtures may collide only if each one's category intersects the
/// other's mask: `(a.category & b.mask) != 0 && (b.category & a.mask) != 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionFilter {
    /// Collision classes this fixture belongs to.
    pub category: u16,
    /// Collision classes this fixture responds to.
    pub mask: u16,
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self {
            category: 0xFFFF,
            mask: 0xFFFF,
        }
    }
}

impl CollisionFilter {
    /// Create a filter with explicit category and mask bits.
    #[must_use]
    pub fn new(category: u16, mask: u16) -> Self {
        Self { category, mask }
    }

    /// Check whether two filters allow contact generation.
    #[must_use]
    pub fn should_collide(&self, other: &Self) -> bool {
        (self.category & other.mask) != 0 && (other.category & self.mask) != 0
    }
}

/// A shape attached to a body.
#[derive(Debug, Clone, PartialEq)]
pub struct Fixture {
    /// Collision geometry in body-local coordinates.
    pub shape: Shape,
    /// Collision filter bits.
    pub filter: CollisionFilter,
    /// Sensor fixtures report begin/end contact but never pre/post solve.
    pub is_sensor: bool,
}

impl Fixture {
    /// Create a fixture with the default (collide-with-everything) filter.
    #[must_use]
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            filter: CollisionFilter::default(),
            is_sensor: false,
        }
    }

    /// Set the collision filter.
    #[must_use]
    pub fn with_filter(mut self, filter: CollisionFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Mark the fixture as a sensor.
    #[must_use]
    pub fn with_sensor(mut self, is_sensor: bool) -> Self {
        self.is_sensor = is_sensor;
        self
    }
}

/// A rigid body in the scene.
#[derive(Debug, Clone)]
pub struct Body {
    /// Handle of this body.
    pub handle: BodyHandle,
    /// Optional name for diagnostics.
    pub name: Option<String>,
    /// Whether the body is integrated.
    pub body_type: BodyType,
    /// Current pose.
    pub pose: Pose,
    /// Linear velocity in m/s.
    pub linear_velocity: Vector2<f64>,
    /// Angular velocity in rad/s.
    pub angular_velocity: f64,
    /// Attached fixtures, in creation order.
    pub fixtures: Vec<Fixture>,
}

/// Kind of a joint record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointKind {
    /// Rigid attachment of two bodies.
    Weld,
    /// Rotation about a shared anchor.
    Revolute,
}

/// A joint connecting two bodies.
///
/// Joints are bookkeeping records: the kinematic scene does not solve them,
/// and they are bulk-freed with the scene.
#[derive(Debug, Clone)]
pub struct Joint {
    /// Optional name for diagnostics.
    pub name: Option<String>,
    /// Kind of constraint the joint declares.
    pub kind: JointKind,
    /// First connected body.
    pub body_a: BodyHandle,
    /// Second connected body.
    pub body_b: BodyHandle,
    /// Anchor on the first body, in its local frame.
    pub anchor_a: Point2<f64>,
    /// Anchor on the second body, in its local frame.
    pub anchor_b: Point2<f64>,
}

/// Reference to one fixture of one body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FixtureRef {
    /// Owning body.
    pub body: BodyHandle,
    /// Index of the fixture on its body.
    pub index: usize,
}

/// Contact geometry for a touching fixture pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifold {
    /// Contact normal, pointing from fixture A towards fixture B.
    pub normal: Vector2<f64>,
    /// Representative contact point in world coordinates.
    pub point: Point2<f64>,
    /// Penetration depth along the normal, in meters.
    pub overlap: f64,
}

impl Default for Manifold {
    fn default() -> Self {
        Self {
            normal: Vector2::zeros(),
            point: Point2::origin(),
            overlap: 0.0,
        }
    }
}

/// A contact between two fixtures, handed to the listener.
#[derive(Debug, Clone)]
pub struct Contact {
    /// First fixture of the pair.
    pub fixture_a: FixtureRef,
    /// Second fixture of the pair.
    pub fixture_b: FixtureRef,
    /// Current contact geometry.
    pub manifold: Manifold,
    enabled: bool,
}

impl Contact {
    /// Create a contact in the enabled state.
    #[must_use]
    pub fn new(fixture_a: FixtureRef, fixture_b: FixtureRef, manifold: Manifold) -> Self {
        Self {
            fixture_a,
            fixture_b,
            manifold,
            enabled: true,
        }
    }

    /// Whether this pair will receive a post-solve report this step.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable the contact for the rest of this step.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Check whether the contact involves the given body.
    #[must_use]
    pub fn involves(&self, body: BodyHandle) -> bool {
        self.fixture_a.body == body || self.fixture_b.body == body
    }
}

/// Collision-magnitude report for a contact pair.
///
/// The kinematic scene computes no solver impulses; the reported value is the
/// pair's penetration depth this step, a proxy behavior units can use to
/// react to collision strength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactImpulse {
    /// Magnitude along the contact normal.
    pub normal_impulse: f64,
    /// Magnitude along the contact tangent (always zero here).
    pub tangent_impulse: f64,
}

/// Sink for the four contact lifecycle events of a step.
pub trait ContactListener {
    /// Two fixtures started touching this step.
    fn begin_contact(&mut self, _contact: &Contact) {}

    /// Two fixtures stopped touching.
    fn end_contact(&mut self, _contact: &Contact) {}

    /// Called for each touching non-sensor pair before impulses are reported.
    /// `old_manifold` is the pair's manifold from the previous step (empty
    /// for pairs that began this step). Disabling the contact suppresses the
    /// post-solve report for this step.
    fn pre_solve(&mut self, _contact: &mut Contact, _old_manifold: &Manifold) {}

    /// Called for each touching, enabled, non-sensor pair after the step.
    fn post_solve(&mut self, _contact: &Contact, _impulse: &ContactImpulse) {}
}

#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Point2<f64>,
    max: Point2<f64>,
}

impl Aabb {
    fn from_points(points: impl Iterator<Item = Point2<f64>>) -> Self {
        let mut min = Point2::new(f64::INFINITY, f64::INFINITY);
        let mut max = Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in points {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        Self { min, max }
    }

    fn center(&self) -> Point2<f64> {
        Point2::new(
            f64::midpoint(self.min.x, self.max.x),
            f64::midpoint(self.min.y, self.max.y),
        )
    }

    fn manifold(&self, other: &Self) -> Option<Manifold> {
        let dx = self.max.x.min(other.max.x) - self.min.x.max(other.min.x);
        let dy = self.max.y.min(other.max.y) - self.min.y.max(other.min.y);
        if dx <= 0.0 || dy <= 0.0 {
            return None;
        }
        let point = Point2::new(
            f64::midpoint(self.min.x.max(other.min.x), self.max.x.min(other.max.x)),
            f64::midpoint(self.min.y.max(other.min.y), self.max.y.min(other.max.y)),
        );
        // Normal along the axis of least penetration, from self towards other.
        let (normal, overlap) = if dx < dy {
            let dir = if other.center().x >= self.center().x {
                1.0
            } else {
                -1.0
            };
            (Vector2::new(dir, 0.0), dx)
        } else {
            let dir = if other.center().y >= self.center().y {
                1.0
            } else {
                -1.0
            };
            (Vector2::new(0.0, dir), dy)
        };
        Some(Manifold {
            normal,
            point,
            overlap,
        })
    }
}

type PairKey = (FixtureRef, FixtureRef);

/// The single authoritative physics scene of a world.
#[derive(Debug)]
pub struct PhysicsScene {
    gravity: Vector2<f64>,
    bodies: HashMap<BodyHandle, Body>,
    /// Creation order, for deterministic pair iteration.
    body_order: Vec<BodyHandle>,
    joints: Vec<(JointHandle, Joint)>,
    next_body: u64,
    next_joint: u64,
    events_enabled: bool,
    /// Pairs touching as of the last step, with their manifolds.
    touching: BTreeMap<PairKey, Manifold>,
    step_count: u64,
    released_bodies: usize,
    destroyed_bodies: usize,
}

impl PhysicsScene {
    /// Create an empty scene with the given gravity vector.
    #[must_use]
    pub fn new(gravity: Vector2<f64>) -> Self {
        Self {
            gravity,
            bodies: HashMap::new(),
            body_order: Vec::new(),
            joints: Vec::new(),
            next_body: 1,
            next_joint: 1,
            events_enabled: true,
            touching: BTreeMap::new(),
            step_count: 0,
            released_bodies: 0,
            destroyed_bodies: 0,
        }
    }

    /// The scene gravity vector.
    #[must_use]
    pub fn gravity(&self) -> Vector2<f64> {
        self.gravity
    }

    /// Create a body and return its handle.
    pub fn create_body(&mut self, body_type: BodyType, pose: Pose) -> BodyHandle {
        let handle = BodyHandle(self.next_body);
        self.next_body += 1;
        self.bodies.insert(
            handle,
            Body {
                handle,
                name: None,
                body_type,
                pose,
                linear_velocity: Vector2::zeros(),
                angular_velocity: 0.0,
                fixtures: Vec::new(),
            },
        );
        self.body_order.push(handle);
        handle
    }

    /// Attach a fixture to a body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not in the scene.
    pub fn create_fixture(
        &mut self,
        body: BodyHandle,
        fixture: Fixture,
    ) -> Result<FixtureRef, SceneError> {
        let target = self
            .bodies
            .get_mut(&body)
            .ok_or(SceneError::UnknownBody(body.raw()))?;
        target.fixtures.push(fixture);
        Ok(FixtureRef {
            body,
            index: target.fixtures.len() - 1,
        })
    }

    /// Record a joint between two bodies.
    ///
    /// # Errors
    ///
    /// Returns an error if either body is not in the scene.
    pub fn create_joint(&mut self, joint: Joint) -> Result<JointHandle, SceneError> {
        if !self.bodies.contains_key(&joint.body_a) {
            return Err(SceneError::UnknownBody(joint.body_a.raw()));
        }
        if !self.bodies.contains_key(&joint.body_b) {
            return Err(SceneError::UnknownBody(joint.body_b.raw()));
        }
        let handle = JointHandle(self.next_joint);
        self.next_joint += 1;
        self.joints.push((handle, joint));
        Ok(handle)
    }

    /// Get a body by handle.
    #[must_use]
    pub fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(&handle)
    }

    /// Get a mutable reference to a body by handle.
    #[must_use]
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(&handle)
    }

    /// Get a body's pose by handle.
    #[must_use]
    pub fn pose(&self, handle: BodyHandle) -> Option<Pose> {
        self.bodies.get(&handle).map(|b| b.pose)
    }

    /// Set a body's pose.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not in the scene.
    pub fn set_pose(&mut self, handle: BodyHandle, pose: Pose) -> Result<(), SceneError> {
        let body = self
            .bodies
            .get_mut(&handle)
            .ok_or(SceneError::UnknownBody(handle.raw()))?;
        body.pose = pose;
        Ok(())
    }

    /// Set a body's linear and angular velocity.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not in the scene.
    pub fn set_velocity(
        &mut self,
        handle: BodyHandle,
        linear: Vector2<f64>,
        angular: f64,
    ) -> Result<(), SceneError> {
        let body = self
            .bodies
            .get_mut(&handle)
            .ok_or(SceneError::UnknownBody(handle.raw()))?;
        body.linear_velocity = linear;
        body.angular_velocity = angular;
        Ok(())
    }

    /// Get a fixture by reference.
    #[must_use]
    pub fn fixture(&self, fixture: FixtureRef) -> Option<&Fixture> {
        self.bodies
            .get(&fixture.body)
            .and_then(|b| b.fixtures.get(fixture.index))
    }

    /// Number of live bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Number of fixtures across all live bodies.
    #[must_use]
    pub fn fixture_count(&self) -> usize {
        self.bodies.values().map(|b| b.fixtures.len()).sum()
    }

    /// Number of joint records.
    #[must_use]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Number of completed steps.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Iterate over all live bodies in creation order.
    pub fn bodies(&self) -> impl Iterator<Item = &Body> {
        self.body_order.iter().filter_map(|h| self.bodies.get(h))
    }

    /// Stop delivering contact events. Used ahead of teardown so no event
    /// can be dispatched into entities mid-release.
    pub fn disable_contact_events(&mut self) {
        self.events_enabled = false;
    }

    /// Resume delivering contact events.
    pub fn enable_contact_events(&mut self) {
        self.events_enabled = true;
    }

    /// Whether contact events are currently delivered.
    #[must_use]
    pub fn contact_events_enabled(&self) -> bool {
        self.events_enabled
    }

    /// Bulk-release a body: detach it without scrubbing the touching-pair
    /// cache. This is the cheap path for fixture-heavy static geometry whose
    /// remaining state is freed wholesale when the scene drops.
    pub fn release_body(&mut self, handle: BodyHandle) {
        if self.bodies.remove(&handle).is_some() {
            self.body_order.retain(|h| *h != handle);
            self.released_bodies += 1;
        }
    }

    /// Destroy a body incrementally: remove it and scrub every touching-pair
    /// cache entry that references it.
    pub fn destroy_body(&mut self, handle: BodyHandle) -> Option<Body> {
        let body = self.bodies.remove(&handle)?;
        self.body_order.retain(|h| *h != handle);
        self.touching
            .retain(|(a, b), _| a.body != handle && b.body != handle);
        self.joints
            .retain(|(_, j)| j.body_a != handle && j.body_b != handle);
        self.destroyed_bodies += 1;
        Some(body)
    }

    /// Number of bodies removed through the bulk-release path.
    #[must_use]
    pub fn released_bodies(&self) -> usize {
        self.released_bodies
    }

    /// Number of bodies removed through the incremental-destroy path.
    #[must_use]
    pub fn destroyed_bodies(&self) -> usize {
        self.destroyed_bodies
    }

    /// Advance the scene by one fixed step and dispatch contact events.
    ///
    /// Dynamic bodies are integrated in `velocity_iterations` sub-steps. The
    /// kinematic scene has no position solver, so `_position_iterations` is
    /// accepted for interface compatibility only. All contact events for the
    /// step are delivered to `listener` before this call returns.
    pub fn step(
        &mut self,
        dt: f64,
        velocity_iterations: usize,
        _position_iterations: usize,
        listener: &mut dyn ContactListener,
    ) {
        let sub_steps = velocity_iterations.max(1);
        #[allow(clippy::cast_precision_loss)]
        let sub_dt = dt / sub_steps as f64;
        for handle in &self.body_order {
            if let Some(body) = self.bodies.get_mut(handle) {
                if body.body_type != BodyType::Dynamic {
                    continue;
                }
                for _ in 0..sub_steps {
                    body.linear_velocity += self.gravity * sub_dt;
                    let translation =
                        body.pose.translation.vector + body.linear_velocity * sub_dt;
                    let angle = body.pose.rotation.angle() + body.angular_velocity * sub_dt;
                    body.pose = Isometry2::new(translation, angle);
                }
            }
        }

        let contacts = self.find_overlaps();

        if self.events_enabled {
            for (key, manifold) in &contacts {
                if !self.touching.contains_key(key) {
                    let contact = Contact::new(key.0, key.1, manifold.clone());
                    listener.begin_contact(&contact);
                }
            }
            for (key, manifold) in &contacts {
                if self.is_sensor_pair(*key) {
                    continue;
                }
                let old = self.touching.get(key).cloned().unwrap_or_default();
                let mut contact = Contact::new(key.0, key.1, manifold.clone());
                listener.pre_solve(&mut contact, &old);
                if contact.is_enabled() {
                    let impulse = ContactImpulse {
                        normal_impulse: manifold.overlap,
                        tangent_impulse: 0.0,
                    };
                    listener.post_solve(&contact, &impulse);
                }
            }
            for (key, manifold) in &self.touching {
                if !contacts.contains_key(key) {
                    let contact = Contact::new(key.0, key.1, manifold.clone());
                    listener.end_contact(&contact);
                }
            }
        }

        self.touching = contacts;
        self.step_count += 1;
    }

    fn is_sensor_pair(&self, key: PairKey) -> bool {
        self.fixture(key.0).is_some_and(|f| f.is_sensor)
            || self.fixture(key.1).is_some_and(|f| f.is_sensor)
    }

    /// Brute-force overlap pass over every fixture pair, honoring filters.
    /// Static-static pairs never generate contacts.
    fn find_overlaps(&self) -> BTreeMap<PairKey, Manifold> {
        let mut out = BTreeMap::new();
        for (i, &ha) in self.body_order.iter().enumerate() {
            let Some(body_a) = self.bodies.get(&ha) else {
                continue;
            };
            for &hb in self.body_order.iter().skip(i + 1) {
                let Some(body_b) = self.bodies.get(&hb) else {
                    continue;
                };
                if body_a.body_type == BodyType::Static && body_b.body_type == BodyType::Static {
                    continue;
                }
                for (ia, fa) in body_a.fixtures.iter().enumerate() {
                    let aabb_a = fa.shape.aabb(&body_a.pose);
                    for (ib, fb) in body_b.fixtures.iter().enumerate() {
                        if !fa.filter.should_collide(&fb.filter) {
                            continue;
                        }
                        let aabb_b = fb.shape.aabb(&body_b.pose);
                        if let Some(manifold) = aabb_a.manifold(&aabb_b) {
                            out.insert(
                                (
                                    FixtureRef { body: ha, index: ia },
                                    FixtureRef { body: hb, index: ib },
                                ),
                                manifold,
                            );
                        }
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names,
    clippy::uninlined_format_args
)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        disable_all: bool,
    }

    impl ContactListener for Recorder {
        fn begin_contact(&mut self, contact: &Contact) {
            self.events.push(format!(
                "begin {}-{}",
                contact.fixture_a.body.raw(),
                contact.fixture_b.body.raw()
            ));
        }

        fn end_contact(&mut self, contact: &Contact) {
            self.events.push(format!(
                "end {}-{}",
                contact.fixture_a.body.raw(),
                contact.fixture_b.body.raw()
            ));
        }

        fn pre_solve(&mut self, contact: &mut Contact, old_manifold: &Manifold) {
            self.events.push(format!("pre overlap={}", old_manifold.overlap));
            if self.disable_all {
                contact.set_enabled(false);
            }
        }

        fn post_solve(&mut self, _contact: &Contact, impulse: &ContactImpulse) {
            self.events.push(format!("post {}", impulse.normal_impulse));
        }
    }

    fn unit_box_body(scene: &mut PhysicsScene, body_type: BodyType, x: f64, y: f64) -> BodyHandle {
        let h = scene.create_body(body_type, Isometry2::new(Vector2::new(x, y), 0.0));
        scene
            .create_fixture(h, Fixture::new(Shape::rectangle(0.0, 0.0, 1.0, 1.0)))
            .unwrap();
        h
    }

    #[test]
    fn test_integration_moves_dynamic_bodies() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        let h = scene.create_body(BodyType::Dynamic, Isometry2::identity());
        scene.set_velocity(h, Vector2::new(2.0, 0.0), 0.0).unwrap();
        let mut sink = Recorder::default();
        scene.step(0.5, 10, 10, &mut sink);
        let pose = scene.pose(h).unwrap();
        assert_relative_eq!(pose.translation.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(pose.translation.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_static_bodies_do_not_move() {
        let mut scene = PhysicsScene::new(Vector2::new(0.0, -9.81));
        let h = scene.create_body(BodyType::Static, Isometry2::identity());
        let mut sink = Recorder::default();
        scene.step(1.0, 10, 10, &mut sink);
        assert_relative_eq!(scene.pose(h).unwrap().translation.y, 0.0);
    }

    #[test]
    fn test_begin_and_end_contact() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        let wall = unit_box_body(&mut scene, BodyType::Static, 0.0, 0.0);
        let bot = unit_box_body(&mut scene, BodyType::Dynamic, 0.5, 0.0);
        let mut sink = Recorder::default();

        scene.step(0.01, 10, 10, &mut sink);
        assert_eq!(sink.events[0], format!("begin {}-{}", wall.raw(), bot.raw()));

        // Move the bot far away; next step reports the end.
        scene
            .set_pose(bot, Isometry2::new(Vector2::new(10.0, 0.0), 0.0))
            .unwrap();
        sink.events.clear();
        scene.step(0.01, 10, 10, &mut sink);
        assert_eq!(sink.events, vec![format!("end {}-{}", wall.raw(), bot.raw())]);
    }

    #[test]
    fn test_pre_solve_sees_previous_manifold() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        unit_box_body(&mut scene, BodyType::Static, 0.0, 0.0);
        unit_box_body(&mut scene, BodyType::Dynamic, 0.5, 0.0);
        let mut sink = Recorder::default();

        scene.step(0.01, 10, 10, &mut sink);
        // Fresh pair: previous manifold is empty.
        assert!(sink.events.contains(&"pre overlap=0".to_string()));

        sink.events.clear();
        scene.step(0.01, 10, 10, &mut sink);
        // Persisting pair: previous manifold carries last step's overlap.
        assert!(sink.events.iter().any(|e| e == "pre overlap=0.5"));
    }

    #[test]
    fn test_disabled_contact_skips_post_solve() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        unit_box_body(&mut scene, BodyType::Static, 0.0, 0.0);
        unit_box_body(&mut scene, BodyType::Dynamic, 0.5, 0.0);
        let mut sink = Recorder {
            disable_all: true,
            ..Recorder::default()
        };
        scene.step(0.01, 10, 10, &mut sink);
        assert!(sink.events.iter().any(|e| e.starts_with("pre")));
        assert!(!sink.events.iter().any(|e| e.starts_with("post")));
    }

    #[test]
    fn test_sensor_pair_reports_begin_end_only() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        let wall = scene.create_body(BodyType::Static, Isometry2::identity());
        scene
            .create_fixture(
                wall,
                Fixture::new(Shape::rectangle(0.0, 0.0, 1.0, 1.0)).with_sensor(true),
            )
            .unwrap();
        unit_box_body(&mut scene, BodyType::Dynamic, 0.5, 0.0);
        let mut sink = Recorder::default();
        scene.step(0.01, 10, 10, &mut sink);
        assert!(sink.events.iter().any(|e| e.starts_with("begin")));
        assert!(!sink.events.iter().any(|e| e.starts_with("pre")));
        assert!(!sink.events.iter().any(|e| e.starts_with("post")));
    }

    #[test]
    fn test_filters_suppress_contact() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        let a = scene.create_body(BodyType::Dynamic, Isometry2::identity());
        scene
            .create_fixture(
                a,
                Fixture::new(Shape::rectangle(0.0, 0.0, 1.0, 1.0))
                    .with_filter(CollisionFilter::new(0x0001, 0x0001)),
            )
            .unwrap();
        let b = scene.create_body(BodyType::Dynamic, Isometry2::identity());
        scene
            .create_fixture(
                b,
                Fixture::new(Shape::rectangle(0.0, 0.0, 1.0, 1.0))
                    .with_filter(CollisionFilter::new(0x0002, 0x0002)),
            )
            .unwrap();
        let mut sink = Recorder::default();
        scene.step(0.01, 10, 10, &mut sink);
        assert!(sink.events.is_empty());
    }

    #[test]
    fn test_disabled_events_are_not_delivered() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        unit_box_body(&mut scene, BodyType::Static, 0.0, 0.0);
        unit_box_body(&mut scene, BodyType::Dynamic, 0.5, 0.0);
        scene.disable_contact_events();
        let mut sink = Recorder::default();
        scene.step(0.01, 10, 10, &mut sink);
        assert!(sink.events.is_empty());
    }

    #[test]
    fn test_release_and_destroy_accounting() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        let a = unit_box_body(&mut scene, BodyType::Static, 0.0, 0.0);
        let b = unit_box_body(&mut scene, BodyType::Dynamic, 0.5, 0.0);
        let mut sink = Recorder::default();
        scene.step(0.01, 10, 10, &mut sink);

        scene.release_body(a);
        assert_eq!(scene.released_bodies(), 1);
        // Bulk release leaves the pair cache alone.
        assert!(!scene.touching.is_empty());

        scene.destroy_body(b);
        assert_eq!(scene.destroyed_bodies(), 1);
        assert!(scene.touching.is_empty());
        assert_eq!(scene.body_count(), 0);
    }

    #[test]
    fn test_joint_requires_live_bodies() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        let a = scene.create_body(BodyType::Dynamic, Isometry2::identity());
        let b = scene.create_body(BodyType::Dynamic, Isometry2::identity());
        let joint = Joint {
            name: None,
            kind: JointKind::Weld,
            body_a: a,
            body_b: b,
            anchor_a: Point2::origin(),
            anchor_b: Point2::origin(),
        };
        assert!(scene.create_joint(joint.clone()).is_ok());
        scene.destroy_body(b);
        assert!(scene.create_joint(joint).is_err());
        // Destroying a body also dropped the joint that referenced it.
        assert_eq!(scene.joint_count(), 0);
    }

    #[test]
    fn test_fixture_on_unknown_body_fails() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        let a = scene.create_body(BodyType::Dynamic, Isometry2::identity());
        scene.destroy_body(a);
        let result = scene.create_fixture(a, Fixture::new(Shape::circle(Point2::origin(), 1.0)));
        assert!(result.is_err());
    }
}
