//! Scene composition and fixed-step simulation core for 2D robot worlds.
//!
//! This crate owns the authoritative physics scene of a simulated world,
//! builds it from a declarative YAML description, advances it in discrete
//! fixed-size steps, and routes low-level contact events into an extensible
//! behavior layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         World                                │
//! │  Orchestrates: loading → stepping → teardown                │
//! │  Owns: scene, layers, models, filter registry, plugins      │
//! └───────┬──────────────────┬──────────────────┬───────────────┘
//!         │                  │                  │
//!         ▼                  ▼                  ▼
//! ┌───────────────┐  ┌───────────────┐  ┌───────────────────────┐
//! │ PhysicsScene  │  │ Layer / Model │  │    PluginManager      │
//! │ bodies,       │  │ built from    │  │ behavior units, step  │
//! │ fixed step,   │  │ declarative   │  │ hooks, contact hooks  │
//! │ contacts      │  │ fragments     │  │                       │
//! └───────────────┘  └───────────────┘  └───────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use planar_sim::{Timekeeper, World};
//!
//! let mut world = World::load("worlds/office.yaml")?;
//! let mut timekeeper = Timekeeper::default();
//!
//! for _ in 0..1000 {
//!     world.update(&mut timekeeper);
//!     world.debug_visualize(false);
//! }
//! # Ok::<(), planar_sim::LoadError>(())
//! ```
//!
//! Behavior units attach to models through factories registered on a
//! [`PluginManager`] handed to [`World::load_with_plugins`]; they receive
//! step-phase hooks around every physics step and the four contact lifecycle
//! events, and may mutate the scene freely — the core offers no isolation.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
)]

pub mod error;
pub mod filter;
pub mod layer;
pub mod model;
pub mod plugin;
pub mod scene;
pub mod timekeeper;
pub mod viz;
mod world;

pub use error::{ConfigError, LoadError, PluginError, SceneError};
pub use filter::{CollisionFilterRegistry, LayerId, MAX_LAYERS};
pub use layer::{Layer, LayerConfig};
pub use model::{BodyConfig, FootprintConfig, JointConfig, Model, ModelBody, ModelConfig};
pub use plugin::{LoadedPlugin, ModelPlugin, PluginConfig, PluginManager};
pub use scene::{
    Body, BodyHandle, BodyType, CollisionFilter, Contact, ContactImpulse, ContactListener,
    Fixture, FixtureRef, Joint, JointHandle, JointKind, Manifold, PhysicsScene, Pose, Shape,
};
pub use timekeeper::{DEFAULT_STEP_SIZE, Timekeeper};
pub use viz::{DebugFrame, DebugShape};
pub use world::{POSITION_ITERATIONS, VELOCITY_ITERATIONS, World};
