//! Core geometry and configuration types shared across all modules.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

// ---------------------------------------------------------------------------
// Basic math
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// The fixed vertical axis. Scenes are assumed to be Y-up.
    pub const UP: Vec3 = Vec3 {
        x: 0.0,
        y: 1.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }

    pub fn dot(self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, other: Vec3) -> f32 {
        (self - other).length()
    }

    pub fn min(self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.x.min(other.x),
            self.y.min(other.y),
            self.z.min(other.z),
        )
    }

    pub fn max(self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.x.max(other.x),
            self.y.max(other.y),
            self.z.max(other.z),
        )
    }

    /// Largest of the three components.
    pub fn max_element(self) -> f32 {
        self.x.max(self.y).max(self.z)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Bounding volumes
// ---------------------------------------------------------------------------

/// Axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// An inverted box that any `expand` call will overwrite.
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn expand(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }
}

/// Bounding box as reported to callers, with derived center and size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
    pub center: Vec3,
    pub size: Vec3,
}

impl From<Aabb> for BoundingBox {
    fn from(aabb: Aabb) -> Self {
        Self {
            min: aabb.min,
            max: aabb.max,
            center: aabb.center(),
            size: aabb.size(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn contains(&self, point: Vec3) -> bool {
        // Small slack so box corners sitting exactly on the sphere count as inside.
        self.center.distance(point) <= self.radius * (1.0 + 1e-5) + 1e-5
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Floor {
    pub height: f32,
    pub normal: Vec3,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SafeDistance {
    pub min: f32,
    pub max: f32,
}

impl SafeDistance {
    pub fn contains(&self, distance: f32) -> bool {
        distance >= self.min && distance <= self.max
    }
}

// ---------------------------------------------------------------------------
// Camera
// ---------------------------------------------------------------------------

/// Live camera state as seen by the viewer at snapshot time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraSnapshot {
    pub position: Vec3,
    /// Orbit target the camera is looking at.
    pub target: Vec3,
    /// Vertical field of view in degrees.
    pub fov: f32,
}

// ---------------------------------------------------------------------------
// Scene geometry (analyzer output)
// ---------------------------------------------------------------------------

/// Geometry descriptor derived from a scene snapshot.
///
/// Recomputed on demand and never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneGeometry {
    pub bounding_box: BoundingBox,
    pub bounding_sphere: BoundingSphere,
    pub floor: Floor,
    pub safe_distance: SafeDistance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_camera: Option<CameraSnapshot>,
}

impl SceneGeometry {
    /// The subset of geometry handed to the pattern composer.
    pub fn scene_meta(&self) -> SceneMeta {
        SceneMeta {
            bounding_box: self.bounding_box,
            object_radius: self.bounding_sphere.radius,
        }
    }
}

/// Scene metadata the composer and primitive interpreters work from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SceneMeta {
    pub bounding_box: BoundingBox,
    /// Characteristic object size; equal to the bounding sphere radius.
    pub object_radius: f32,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Tunable heuristics for the scene analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// `safe_distance.min` as a multiple of the largest box dimension.
    pub min_distance_factor: f32,
    /// `safe_distance.max` as a multiple of the largest box dimension.
    pub max_distance_factor: f32,
    /// Number of keyframes in a fallback orbit.
    pub orbit_points: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_distance_factor: 1.5,
            max_distance_factor: 5.0,
            orbit_points: 8,
        }
    }
}

/// Configuration held by a path engine. Replaced wholesale on `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Provider identifier used to resolve the backend adapter.
    pub provider: String,
    /// Model name passed through to the backend.
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Path duration used when the compiled prompt does not carry one.
    pub default_duration_seconds: f32,
    /// Upper bound on a single backend call.
    pub request_timeout_secs: f32,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider: "orbit".into(),
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            max_tokens: 2048,
            default_duration_seconds: 8.0,
            request_timeout_secs: 30.0,
            endpoint: None,
            api_key: None,
        }
    }
}

impl EngineConfig {
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f32(self.request_timeout_secs.max(0.001).min(86_400.0))
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Path engine instrumentation snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PerformanceMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Failure counts keyed by error code.
    pub failures_by_code: std::collections::BTreeMap<String, u64>,
    pub total_keyframes: u64,
    pub last_latency_ms: f64,
    pub average_latency_ms: f64,
}
