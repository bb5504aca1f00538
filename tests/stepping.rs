//! Step-loop ordering, contact routing, and teardown across full worlds.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use nalgebra::{Isometry2, Vector2};
use planar_sim::{
    Contact, ContactImpulse, Manifold, Model, ModelPlugin, PhysicsScene, PluginConfig,
    PluginManager, Timekeeper, World,
};
use tempfile::TempDir;

type Log = Arc<Mutex<Vec<String>>>;

struct Recorder {
    log: Log,
}

impl ModelPlugin for Recorder {
    fn before_physics_step(&mut self, _scene: &mut PhysicsScene, tk: &Timekeeper) {
        self.log
            .lock()
            .unwrap()
            .push(format!("before {}", tk.step_count()));
    }

    fn after_physics_step(&mut self, _scene: &mut PhysicsScene, tk: &Timekeeper) {
        self.log
            .lock()
            .unwrap()
            .push(format!("after {}", tk.step_count()));
    }

    fn begin_contact(&mut self, _contact: &Contact) {
        self.log.lock().unwrap().push("begin".to_string());
    }

    fn end_contact(&mut self, _contact: &Contact) {
        self.log.lock().unwrap().push("end".to_string());
    }

    fn pre_solve(&mut self, _contact: &mut Contact, _old_manifold: &Manifold) {
        self.log.lock().unwrap().push("pre".to_string());
    }

    fn post_solve(&mut self, _contact: &Contact, impulse: &ContactImpulse) {
        self.log
            .lock()
            .unwrap()
            .push(format!("post {:.1}", impulse.normal_impulse));
    }
}

/// Teleports its model's bodies on every after-hook. Structurally disruptive
/// on purpose: the world loop must keep working regardless.
struct Teleporter {
    step: u64,
}

impl ModelPlugin for Teleporter {
    fn after_physics_step(&mut self, scene: &mut PhysicsScene, _tk: &Timekeeper) {
        self.step += 1;
        #[allow(clippy::cast_precision_loss)]
        let offset = self.step as f64 * 100.0;
        let handles: Vec<_> = scene.bodies().map(|b| b.handle).collect();
        for handle in handles {
            if let Some(body) = scene.body_mut(handle) {
                if body.body_type == planar_sim::BodyType::Dynamic {
                    body.pose = Isometry2::new(Vector2::new(offset, offset), 0.0);
                }
            }
        }
    }
}

fn recording_manager(log: &Log) -> PluginManager {
    let mut manager = PluginManager::new();
    let log = Arc::clone(log);
    manager.register_factory("Recorder", move |_model: &Model, _config: &PluginConfig| {
        Ok(Box::new(Recorder {
            log: Arc::clone(&log),
        }) as Box<dyn ModelPlugin>)
    });
    manager.register_factory("Teleporter", |_model: &Model, _config: &PluginConfig| {
        Ok(Box::new(Teleporter { step: 0 }) as Box<dyn ModelPlugin>)
    });
    manager
}

/// World with one wall layer and one circular bot overlapping it, the bot
/// carrying the named plugins.
fn overlap_world(dir: &TempDir, plugins: &str) -> PathBuf {
    fs::write(
        dir.path().join("bot.yaml"),
        format!(
            "bodies:\n  - name: base\n    footprints:\n      - type: circle\n        radius: 0.5\n{plugins}"
        ),
    )
    .unwrap();
    let path = dir.path().join("world.yaml");
    fs::write(
        &path,
        r"
properties: {}
layers:
  - name: wall
    rectangles: [[0.0, 0.0, 10.0, 0.2]]
models:
  - name: bot1
    pose: [1.0, 0.0, 0.0]
    model: bot.yaml
",
    )
    .unwrap();
    path
}

const RECORDER_PLUGIN: &str = "plugins:\n  - name: recorder\n    type: Recorder\n";

#[test]
fn hooks_alternate_strictly_and_contacts_land_between_them() {
    let dir = TempDir::new().unwrap();
    let log: Log = Arc::default();
    let path = overlap_world(&dir, RECORDER_PLUGIN);
    let mut world = World::load_with_plugins(&path, recording_manager(&log)).unwrap();

    let mut tk = Timekeeper::new(0.01);
    for _ in 0..3 {
        world.update(&mut tk);
    }

    let events = log.lock().unwrap().clone();

    // Step boundaries: before sees the pre-advance count, after the advanced
    // one, and no hook of one step interleaves with another step's.
    let hook_events: Vec<_> = events
        .iter()
        .filter(|e| e.starts_with("before") || e.starts_with("after"))
        .cloned()
        .collect();
    assert_eq!(
        hook_events,
        vec!["before 0", "after 1", "before 1", "after 2", "before 2", "after 3"]
    );

    // The bot starts overlapping the wall: begin fires inside step one,
    // between that step's hooks.
    let begin_at = events.iter().position(|e| e == "begin").unwrap();
    let before0 = events.iter().position(|e| e == "before 0").unwrap();
    let after1 = events.iter().position(|e| e == "after 1").unwrap();
    assert!(before0 < begin_at && begin_at < after1);

    // Every step with the pair touching reports pre-solve then post-solve.
    assert_eq!(events.iter().filter(|e| *e == "pre").count(), 3);
    assert_eq!(
        events.iter().filter(|e| e.starts_with("post")).count(),
        3
    );
    assert_eq!(events.iter().filter(|e| *e == "begin").count(), 1);
}

#[test]
fn elapsed_time_is_steps_times_step_size() {
    let dir = TempDir::new().unwrap();
    let log: Log = Arc::default();
    let path = overlap_world(&dir, RECORDER_PLUGIN);
    let mut world = World::load_with_plugins(&path, recording_manager(&log)).unwrap();

    let mut tk = Timekeeper::new(1.0 / 200.0);
    for _ in 0..400 {
        world.update(&mut tk);
    }
    assert_eq!(tk.step_count(), 400);
    assert_relative_eq!(tk.time(), 2.0, epsilon = 1e-9);

    // One before and one after per update, nothing dropped or duplicated.
    let events = log.lock().unwrap();
    assert_eq!(
        events.iter().filter(|e| e.starts_with("before")).count(),
        400
    );
    assert_eq!(events.iter().filter(|e| e.starts_with("after")).count(), 400);
}

#[test]
fn disruptive_plugin_does_not_break_the_loop() {
    let dir = TempDir::new().unwrap();
    let log: Log = Arc::default();
    let path = overlap_world(
        &dir,
        "plugins:\n  - name: recorder\n    type: Recorder\n  - name: chaos\n    type: Teleporter\n",
    );
    let mut world = World::load_with_plugins(&path, recording_manager(&log)).unwrap();

    let mut tk = Timekeeper::new(0.01);
    for _ in 0..5 {
        world.update(&mut tk);
    }

    // The teleporter yanks the bot away after step one, so the contact that
    // began must also end, and stepping continues to completion.
    let events = log.lock().unwrap().clone();
    assert_eq!(events.iter().filter(|e| *e == "begin").count(), 1);
    assert_eq!(events.iter().filter(|e| *e == "end").count(), 1);
    assert_eq!(tk.step_count(), 5);

    let base = world.models()[0].body_named("base").unwrap();
    let pose = world.scene().pose(base).unwrap();
    assert!(pose.translation.x > 50.0);
}

#[test]
fn teardown_after_contact_heavy_run_releases_everything_once() {
    let dir = TempDir::new().unwrap();
    let log: Log = Arc::default();
    let path = overlap_world(&dir, RECORDER_PLUGIN);
    let mut world = World::load_with_plugins(&path, recording_manager(&log)).unwrap();

    let mut tk = Timekeeper::default();
    for _ in 0..50 {
        world.update(&mut tk);
    }

    world.teardown();
    assert_eq!(world.scene().body_count(), 0);
    assert_eq!(world.scene().released_bodies(), 1);
    assert_eq!(world.scene().destroyed_bodies(), 1);

    // No contact event may be delivered during or after teardown.
    let events_at_teardown = log.lock().unwrap().len();
    drop(world);
    assert_eq!(log.lock().unwrap().len(), events_at_teardown);
}
