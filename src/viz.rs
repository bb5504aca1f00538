//! Debug-visualization snapshots.
//!
//! Layers and models each hold a [`DebugFrame`] that an external renderer can
//! read. Refreshing a frame samples the current poses and shapes of the
//! entity's bodies out of the scene; it never feeds back into simulation
//! state.

use crate::scene::{BodyHandle, PhysicsScene, Pose, Shape};

/// One shape of a visualization snapshot, in world coordinates.
#[derive(Debug, Clone)]
pub struct DebugShape {
    /// Pose of the owning body at refresh time.
    pub pose: Pose,
    /// The fixture shape, in body-local coordinates.
    pub shape: Shape,
}

/// A refreshable visualization snapshot of an entity's bodies.
#[derive(Debug, Clone, Default)]
pub struct DebugFrame {
    /// Sampled shapes, one per fixture.
    pub shapes: Vec<DebugShape>,
    /// Incremented on every refresh.
    pub revision: u64,
}

impl DebugFrame {
    /// Re-sample the frame from the given bodies.
    pub fn refresh(
        &mut self,
        scene: &PhysicsScene,
        bodies: impl IntoIterator<Item = BodyHandle>,
    ) {
        self.shapes.clear();
        for handle in bodies {
            if let Some(body) = scene.body(handle) {
                for fixture in &body.fixtures {
                    self.shapes.push(DebugShape {
                        pose: body.pose,
                        shape: fixture.shape.clone(),
                    });
                }
            }
        }
        self.revision += 1;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::scene::{BodyType, Fixture};
    use nalgebra::{Isometry2, Point2, Vector2};

    #[test]
    fn test_refresh_samples_fixtures_and_bumps_revision() {
        let mut scene = PhysicsScene::new(Vector2::zeros());
        let h = scene.create_body(BodyType::Dynamic, Isometry2::new(Vector2::new(1.0, 2.0), 0.0));
        scene
            .create_fixture(h, Fixture::new(Shape::circle(Point2::origin(), 0.5)))
            .unwrap();

        let mut frame = DebugFrame::default();
        frame.refresh(&scene, [h]);
        assert_eq!(frame.shapes.len(), 1);
        assert_eq!(frame.revision, 1);
        assert!((frame.shapes[0].pose.translation.x - 1.0).abs() < 1e-12);

        frame.refresh(&scene, [h]);
        assert_eq!(frame.revision, 2);
    }
}
