//! Scene subsystem: the positioned scene graph handed in by the viewer, and
//! the analyzer that derives a camera safety envelope from it.
//!
//! The vertical axis is fixed to +Y ([`Vec3::UP`]).

use crate::protocol::CameraKeyframe;
use crate::types::{
    Aabb, AnalyzerConfig, BoundingBox, BoundingSphere, CameraSnapshot, Floor, SafeDistance,
    SceneGeometry, Vec3,
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI, TAU};

// ---------------------------------------------------------------------------
// Scene graph
// ---------------------------------------------------------------------------

fn unit_scale() -> Vec3 {
    Vec3::splat(1.0)
}

fn visible_default() -> bool {
    true
}

/// Local transform of a node relative to its parent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Transform {
    #[serde(default)]
    pub translation: Vec3,
    /// Rotation about the vertical axis, in degrees.
    #[serde(default)]
    pub yaw_degrees: f32,
    #[serde(default = "unit_scale")]
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::zero(),
            yaw_degrees: 0.0,
            scale: unit_scale(),
        }
    }
}

impl Transform {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    fn to_affine(self) -> Affine {
        let (s, c) = self.yaw_degrees.to_radians().sin_cos();
        let k = self.scale;
        // R_y * S
        Affine {
            m: [
                [c * k.x, 0.0, s * k.z],
                [0.0, k.y, 0.0],
                [-s * k.x, 0.0, c * k.z],
            ],
            t: self.translation,
        }
    }
}

/// Row-major 3x3 linear part plus translation.
#[derive(Debug, Clone, Copy)]
struct Affine {
    m: [[f32; 3]; 3],
    t: Vec3,
}

impl Affine {
    fn identity() -> Self {
        Self {
            m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            t: Vec3::zero(),
        }
    }

    fn linear(&self, p: Vec3) -> Vec3 {
        let r = |row: [f32; 3]| row[0] * p.x + row[1] * p.y + row[2] * p.z;
        Vec3::new(r(self.m[0]), r(self.m[1]), r(self.m[2]))
    }

    fn apply(&self, p: Vec3) -> Vec3 {
        self.linear(p) + self.t
    }

    /// `self ∘ child`: apply `child` first, then `self`.
    fn then(&self, child: &Affine) -> Affine {
        let mut m = [[0.0f32; 3]; 3];
        for (i, row) in m.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.m[i][k] * child.m[k][j]).sum();
            }
        }
        Affine {
            m,
            t: self.apply(child.t),
        }
    }
}

/// A positioned sub-object. Nodes with `bounds` are renderable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneNode {
    pub name: String,
    #[serde(default)]
    pub transform: Transform,
    /// Local-space bounds of this node's own geometry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Aabb>,
    /// Invisible nodes are skipped together with their subtree.
    #[serde(default = "visible_default")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::default(),
            bounds: None,
            visible: true,
            children: Vec::new(),
        }
    }

    pub fn mesh(name: impl Into<String>, bounds: Aabb) -> Self {
        Self {
            bounds: Some(bounds),
            ..Self::group(name)
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }
}

/// Scene state captured at analysis time, in world space.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SceneSnapshot {
    #[serde(default)]
    pub nodes: Vec<SceneNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraSnapshot>,
}

impl SceneSnapshot {
    pub fn new(nodes: Vec<SceneNode>) -> Self {
        Self {
            nodes,
            camera: None,
        }
    }

    /// World-space bounds of every visible renderable node.
    pub fn world_bounds(&self) -> Aabb {
        let mut aabb = Aabb::empty();
        let root = Affine::identity();
        for node in &self.nodes {
            accumulate_bounds(node, &root, &mut aabb);
        }
        aabb
    }
}

fn accumulate_bounds(node: &SceneNode, parent: &Affine, out: &mut Aabb) {
    if !node.visible {
        return;
    }
    let world = parent.then(&node.transform.to_affine());
    if let Some(local) = node.bounds.filter(|b| !b.is_empty()) {
        for corner in local.corners() {
            out.expand(world.apply(corner));
        }
    }
    for child in &node.children {
        accumulate_bounds(child, &world, out);
    }
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Derives [`SceneGeometry`] from a snapshot. Pure; safe to share across threads.
#[derive(Debug, Clone, Default)]
pub struct SceneAnalyzer {
    pub config: AnalyzerConfig,
}

impl SceneAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, snapshot: &SceneSnapshot) -> SceneGeometry {
        let mut aabb = snapshot.world_bounds();
        if aabb.is_empty() {
            aabb = Aabb::new(Vec3::zero(), Vec3::zero());
        }

        let bounding_box = BoundingBox::from(aabb);
        // Box-derived sphere: not minimal, but always encloses the box.
        let bounding_sphere = BoundingSphere {
            center: bounding_box.center,
            radius: bounding_box.size.length() * 0.5,
        };
        let floor = Floor {
            height: aabb.min.y,
            normal: Vec3::UP,
        };
        let largest = bounding_box.size.max_element();
        let safe_distance = SafeDistance {
            min: largest * self.config.min_distance_factor,
            max: largest * self.config.max_distance_factor,
        };

        debug!(
            "Analyzed scene: center={} radius={:.2} floor={:.2} safe=[{:.2}, {:.2}]",
            bounding_sphere.center,
            bounding_sphere.radius,
            floor.height,
            safe_distance.min,
            safe_distance.max
        );

        SceneGeometry {
            bounding_box,
            bounding_sphere,
            floor,
            safe_distance,
            current_camera: snapshot.camera,
        }
    }

    /// Orbit keyframes shaped by the keywords in `instruction`, kept inside
    /// the safety envelope.
    pub fn generate_safe_keyframes(
        &self,
        geometry: &SceneGeometry,
        instruction: &str,
    ) -> Vec<CameraKeyframe> {
        let plan = OrbitPlan::from_instruction(instruction);
        plan.keyframes(geometry, self.config.orbit_points)
    }
}

/// Analyze with the default heuristics.
pub fn analyze_scene(snapshot: &SceneSnapshot) -> SceneGeometry {
    SceneAnalyzer::default().analyze(snapshot)
}

/// `false` below the floor or outside the safe distance band around the
/// bounding sphere centre; `true` otherwise. `_target` is not evaluated.
pub fn is_safe_camera_position(position: Vec3, _target: Vec3, geometry: &SceneGeometry) -> bool {
    if position.y < geometry.floor.height {
        return false;
    }
    let distance = position.distance(geometry.bounding_sphere.center);
    geometry.safe_distance.contains(distance)
}

/// Fallback path when no generative backend is available.
pub fn generate_safe_keyframes(geometry: &SceneGeometry, instruction: &str) -> Vec<CameraKeyframe> {
    SceneAnalyzer::default().generate_safe_keyframes(geometry, instruction)
}

// ---------------------------------------------------------------------------
// Instruction-driven orbit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrbitDistance {
    Close,
    Default,
    Far,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrbitElevation {
    Low,
    Level,
    High,
}

/// Orbit parameters recognised from a free-text instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitPlan {
    pub distance: OrbitDistance,
    pub elevation: OrbitElevation,
    /// +1 clockwise seen from above, -1 counter-clockwise.
    pub winding: f32,
    /// Swept angle in radians.
    pub sweep: f32,
    /// Seconds per keyframe.
    pub step_seconds: f32,
}

impl Default for OrbitPlan {
    fn default() -> Self {
        Self {
            distance: OrbitDistance::Default,
            elevation: OrbitElevation::Level,
            winding: 1.0,
            sweep: TAU,
            step_seconds: 2.0,
        }
    }
}

impl OrbitPlan {
    pub fn from_instruction(instruction: &str) -> Self {
        let lower = instruction.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has = |w: &str| words.contains(&w);
        let squashed: String = lower.chars().filter(|c| c.is_alphanumeric()).collect();

        let mut plan = Self::default();

        if has("close") || has("closer") || has("tight") || has("near") {
            plan.distance = OrbitDistance::Close;
        } else if has("far") || has("wide") || has("distant") {
            plan.distance = OrbitDistance::Far;
        }

        if has("high") || has("above") || has("overhead") || has("aerial") {
            plan.elevation = OrbitElevation::High;
        } else if has("low") || has("below") || has("ground") {
            plan.elevation = OrbitElevation::Low;
        }

        if squashed.contains("counterclockwise") || squashed.contains("anticlockwise") {
            plan.winding = -1.0;
        }

        if has("half") {
            plan.sweep = PI;
        } else if has("quarter") {
            plan.sweep = FRAC_PI_2;
        }

        if has("slow") || has("slowly") {
            plan.step_seconds = 4.0;
        } else if has("fast") || has("quick") || has("quickly") {
            plan.step_seconds = 1.0;
        }

        plan
    }

    pub fn keyframes(&self, geometry: &SceneGeometry, points: usize) -> Vec<CameraKeyframe> {
        if points == 0 {
            return Vec::new();
        }

        let center = geometry.bounding_sphere.center;
        let safe = geometry.safe_distance;
        let envelope_valid = safe.max > safe.min;

        let nominal = geometry.bounding_sphere.radius * 2.0;
        let desired = match self.distance {
            OrbitDistance::Default => nominal,
            // Stay a hair inside the band so float error never lands outside it.
            OrbitDistance::Close => safe.min + (safe.max - safe.min) * 0.05,
            OrbitDistance::Far => safe.max - (safe.max - safe.min) * 0.05,
        };
        let distance = if envelope_valid {
            desired.clamp(
                safe.min + (safe.max - safe.min) * 0.01,
                safe.max - (safe.max - safe.min) * 0.01,
            )
        } else {
            desired
        };

        let headroom = (center.y - geometry.floor.height).max(0.0);
        let elevation = match self.elevation {
            OrbitElevation::Level => 0.0,
            OrbitElevation::High => distance * 0.5,
            OrbitElevation::Low => -(headroom * 0.5).min(distance * 0.5),
        };
        let horizontal = (distance * distance - elevation * elevation).max(0.0).sqrt();

        // A closed orbit must not repeat its first point; an open arc hits both ends.
        let closed = (self.sweep - TAU).abs() < 1e-6;
        let divisions = if closed || points == 1 {
            points as f32
        } else {
            (points - 1) as f32
        };

        (0..points)
            .map(|i| {
                let angle = self.winding * self.sweep * (i as f32 / divisions);
                let position = Vec3::new(
                    center.x + horizontal * angle.cos(),
                    center.y + elevation,
                    center.z + horizontal * angle.sin(),
                );
                CameraKeyframe {
                    position,
                    target: center,
                    duration: self.step_seconds,
                }
            })
            .collect()
    }
}
