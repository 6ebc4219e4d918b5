//! Camera Planner
//!
//! Plans camera motion through a 3D scene: derives a safety envelope from
//! scene geometry, expands canned motion patterns into primitive steps, turns
//! compiled natural-language prompts into validated keyframe paths, and
//! persists locked environment settings per model.
//!
//! ## Architecture
//!
//! ```text
//! SceneSnapshot ──► SceneAnalyzer (scene.rs) ──► SceneGeometry
//!                        │                          │
//!                        │                          ├──► PatternRegistry (composer.rs) ──► [Primitive]
//!                        │                          │
//!                        └──► EnvironmentCapture (capture.rs) ──► EnvironmentStore
//!
//! CompiledPrompt ──► PathEngine (engine.rs) ──► CameraPathProvider (provider.rs)
//!                        └──► validated CameraPath
//! ```
//!
//! Geometry, protocol, analyzer and composer are pure and always available.
//! The engine, providers and capture workflow need the `runtime` feature.

pub mod composer;
pub mod error;
pub mod protocol;
pub mod scene;
pub mod settings;
pub mod types;

#[cfg(feature = "runtime")]
pub mod capture;
#[cfg(feature = "runtime")]
pub mod engine;
#[cfg(feature = "runtime")]
pub mod provider;

// Convenience re-exports
pub use composer::{compose_pattern, PatternArgs, PatternRegistry};
pub use error::{PlannerError, Result};
pub use protocol::{CameraKeyframe, CameraPath, CompiledPrompt, Envelope, Primitive};
pub use scene::{analyze_scene, is_safe_camera_position, SceneAnalyzer, SceneSnapshot};
pub use types::{EngineConfig, SceneGeometry, Vec3};

#[cfg(feature = "runtime")]
pub use capture::{EnvironmentCapture, EnvironmentStore, LockToggle, MemoryEnvironmentStore};
#[cfg(feature = "runtime")]
pub use engine::PathEngine;
#[cfg(feature = "runtime")]
pub use provider::CameraPathProvider;
