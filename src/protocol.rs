//! Planner wire protocol.
//!
//! This module owns **every message that crosses the core boundary** between
//! the planner and its collaborators: the primitive interpreter, the camera
//! renderer, the prompt compiler, generative backends and the metadata store.
//!
//! ## Design rules
//!
//! 1. Every struct is `Serialize + Deserialize` with snake_case JSON.
//! 2. Primitives are typed per motion kind; a `type` tag this crate does not
//!    know is kept as [`Motion::Extension`] with its parameters untouched.
//! 3. Backend output (`RawCameraPath`) is loosely typed on purpose and only
//!    becomes a [`CameraPath`] after validation in the engine.
//! 4. Nothing here performs I/O.

use crate::error::PlannerError;
use crate::types::Vec3;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Primitive parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
    Forward,
    Backward,
    Up,
    Down,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

/// Qualitative distance descriptor, resolved to metres by the interpreter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Magnitude {
    None,
    Small,
    Medium,
    Large,
    /// Explicit metric distance.
    Metres(f32),
}

impl Magnitude {
    /// Resolve against a characteristic object radius.
    pub fn resolve(self, object_radius: f32) -> f32 {
        match self {
            Magnitude::None => 0.0,
            Magnitude::Small => object_radius * 0.5,
            Magnitude::Medium => object_radius,
            Magnitude::Large => object_radius * 2.0,
            Magnitude::Metres(m) => m,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Speed {
    Slow,
    Medium,
    Fast,
}

// ---------------------------------------------------------------------------
// Primitives  (composer → interpreter)
// ---------------------------------------------------------------------------

/// Typed motion payload of a [`Primitive`].
///
/// On the wire the variant name is the primitive's `type` tag and its fields
/// are the `parameters` object: `{"type": "truck", "parameters": {...}}`.
#[derive(Debug, Clone, PartialEq)]
pub enum Motion {
    /// Move along the view axis.
    Dolly {
        direction: Direction,
        distance: Magnitude,
        speed: Option<Speed>,
    },
    /// Move sideways, perpendicular to the view axis.
    Truck {
        direction: Direction,
        distance: Magnitude,
        speed: Option<Speed>,
    },
    /// Move along the vertical axis.
    Pedestal {
        direction: Direction,
        distance: Magnitude,
        speed: Option<Speed>,
    },
    /// A motion kind this crate has no typed variant for yet. `kind` is the
    /// wire `type` tag, `parameters` travel untouched.
    Extension {
        kind: String,
        parameters: serde_json::Map<String, serde_json::Value>,
    },
}

/// Parameters shared by the typed translation moves.
#[derive(Serialize, Deserialize)]
struct MoveParameters {
    direction: Direction,
    distance: Magnitude,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    speed: Option<Speed>,
}

/// A single atomic camera motion step.
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    pub motion: Motion,
    /// Fraction of the total path time in `(0, 1]`; `None` defers to the consumer.
    pub duration_ratio: Option<f32>,
}

/// Wire shape read before the `type` tag is dispatched.
#[derive(Deserialize)]
struct PrimitiveWire {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    duration_ratio: Option<f32>,
}

impl Serialize for Primitive {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = if self.duration_ratio.is_some() { 3 } else { 2 };
        let mut out = serializer.serialize_struct("Primitive", fields)?;
        out.serialize_field("type", self.kind())?;
        match &self.motion {
            Motion::Dolly {
                direction,
                distance,
                speed,
            }
            | Motion::Truck {
                direction,
                distance,
                speed,
            }
            | Motion::Pedestal {
                direction,
                distance,
                speed,
            } => out.serialize_field(
                "parameters",
                &MoveParameters {
                    direction: *direction,
                    distance: *distance,
                    speed: *speed,
                },
            )?,
            Motion::Extension { parameters, .. } => out.serialize_field("parameters", parameters)?,
        }
        if let Some(ratio) = self.duration_ratio {
            out.serialize_field("duration_ratio", &ratio)?;
        }
        out.end()
    }
}

impl<'de> Deserialize<'de> for Primitive {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = PrimitiveWire::deserialize(deserializer)?;
        let moves = |parameters: serde_json::Map<String, serde_json::Value>| {
            serde_json::from_value::<MoveParameters>(serde_json::Value::Object(parameters))
                .map_err(<D::Error as de::Error>::custom)
        };

        let motion = match wire.kind.as_str() {
            "dolly" => {
                let p = moves(wire.parameters)?;
                Motion::Dolly {
                    direction: p.direction,
                    distance: p.distance,
                    speed: p.speed,
                }
            }
            "truck" => {
                let p = moves(wire.parameters)?;
                Motion::Truck {
                    direction: p.direction,
                    distance: p.distance,
                    speed: p.speed,
                }
            }
            "pedestal" => {
                let p = moves(wire.parameters)?;
                Motion::Pedestal {
                    direction: p.direction,
                    distance: p.distance,
                    speed: p.speed,
                }
            }
            _ => Motion::Extension {
                kind: wire.kind,
                parameters: wire.parameters,
            },
        };

        Ok(Self {
            motion,
            duration_ratio: wire.duration_ratio,
        })
    }
}

impl Primitive {
    pub fn new(motion: Motion) -> Self {
        Self {
            motion,
            duration_ratio: None,
        }
    }

    pub fn dolly(direction: Direction, distance: Magnitude) -> Self {
        Self::new(Motion::Dolly {
            direction,
            distance,
            speed: None,
        })
    }

    pub fn truck(direction: Direction, distance: Magnitude) -> Self {
        Self::new(Motion::Truck {
            direction,
            distance,
            speed: None,
        })
    }

    pub fn pedestal(direction: Direction, distance: Magnitude) -> Self {
        Self::new(Motion::Pedestal {
            direction,
            distance,
            speed: None,
        })
    }

    pub fn with_speed(mut self, value: Speed) -> Self {
        match &mut self.motion {
            Motion::Dolly { speed, .. }
            | Motion::Truck { speed, .. }
            | Motion::Pedestal { speed, .. } => *speed = Some(value),
            Motion::Extension { .. } => {}
        }
        self
    }

    pub fn with_duration_ratio(mut self, ratio: f32) -> Self {
        self.duration_ratio = Some(ratio);
        self
    }

    /// The wire `type` tag.
    pub fn kind(&self) -> &str {
        match &self.motion {
            Motion::Dolly { .. } => "dolly",
            Motion::Truck { .. } => "truck",
            Motion::Pedestal { .. } => "pedestal",
            Motion::Extension { kind, .. } => kind,
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        match &self.motion {
            Motion::Dolly { direction, .. }
            | Motion::Truck { direction, .. }
            | Motion::Pedestal { direction, .. } => Some(*direction),
            Motion::Extension { .. } => None,
        }
    }

    /// The same step played in reverse (every direction flipped).
    pub fn mirrored(&self) -> Self {
        let mut out = self.clone();
        match &mut out.motion {
            Motion::Dolly { direction, .. }
            | Motion::Truck { direction, .. }
            | Motion::Pedestal { direction, .. } => *direction = direction.opposite(),
            Motion::Extension { .. } => {}
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Camera path  (engine → renderer)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraKeyframe {
    pub position: Vec3,
    pub target: Vec3,
    /// Seconds spent travelling to this keyframe; always > 0.
    pub duration: f32,
}

/// Spherical no-fly volume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestrictedZone {
    pub center: Vec3,
    pub radius: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl RestrictedZone {
    pub fn contains(&self, point: Vec3) -> bool {
        self.center.distance(point) < self.radius
    }
}

fn default_max_height() -> f32 {
    100.0
}

/// Resolved safety bounds attached to a generated path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SafetyConstraints {
    pub min_distance: f32,
    pub max_distance: f32,
    #[serde(default)]
    pub min_height: f32,
    #[serde(default = "default_max_height")]
    pub max_height: f32,
    pub max_speed: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restricted_zones: Option<Vec<RestrictedZone>>,
}

impl From<&PromptConstraints> for SafetyConstraints {
    fn from(c: &PromptConstraints) -> Self {
        Self {
            min_distance: c.min_distance,
            max_distance: c.max_distance,
            min_height: c.min_height.unwrap_or(0.0),
            max_height: c.max_height.unwrap_or_else(default_max_height),
            max_speed: c.max_speed,
            restricted_zones: c.restricted_zones.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
    pub safety_constraints: SafetyConstraints,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraPath {
    pub keyframes: Vec<CameraKeyframe>,
    /// Total seconds; the sum of keyframe durations.
    pub duration: f32,
    pub metadata: PathMetadata,
}

// ---------------------------------------------------------------------------
// Compiled prompt  (prompt compiler → engine)
// ---------------------------------------------------------------------------

/// Constraint block as emitted by the prompt compiler; optional bounds are
/// defaulted when copied into [`SafetyConstraints`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptConstraints {
    pub min_distance: f32,
    pub max_distance: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_height: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_height: Option<f32>,
    pub max_speed: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restricted_zones: Option<Vec<RestrictedZone>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompiledPrompt {
    /// The user's instruction after compilation.
    #[serde(default)]
    pub instruction: String,
    pub constraints: PromptConstraints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
    /// Scene the path is planned for, when the compiler had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<crate::types::SceneGeometry>,
}

impl CompiledPrompt {
    pub fn new(instruction: impl Into<String>, constraints: PromptConstraints) -> Self {
        Self {
            instruction: instruction.into(),
            constraints,
            duration_seconds: None,
            style: None,
            focus: None,
            scene: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Backend output  (provider → engine, unvalidated)
// ---------------------------------------------------------------------------

/// One keyframe as a backend produced it. Fields stay untyped JSON until the
/// engine validates them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawKeyframe {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<serde_json::Value>,
}

impl RawKeyframe {
    pub fn new(position: Vec3, target: Vec3, duration: f32) -> Self {
        Self {
            position: serde_json::to_value(position).ok(),
            target: serde_json::to_value(target).ok(),
            duration: Some(serde_json::Value::from(duration)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawCameraPath {
    #[serde(default)]
    pub keyframes: Option<Vec<RawKeyframe>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderCapabilities {
    pub name: String,
    pub version: String,
    pub max_tokens: u32,
    pub supports_json: bool,
    pub temperature: f32,
    /// Longest path, in seconds, the backend will plan.
    pub max_duration: f32,
}

// ---------------------------------------------------------------------------
// Environmental metadata  (capture → store)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LightingSettings {
    pub intensity: f32,
    pub color: String,
    pub position: Vec3,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraSettings {
    pub position: Vec3,
    pub target: Vec3,
    pub fov: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneSettings {
    pub background: String,
    pub ground: String,
    pub atmosphere: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentConstraints {
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_height: f32,
    pub max_height: f32,
}

/// Locked camera/lighting configuration for one model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentalMetadata {
    pub lighting: LightingSettings,
    pub camera: CameraSettings,
    pub scene: SceneSettings,
    pub constraints: EnvironmentConstraints,
    /// md5 of the four sections above, hex encoded.
    #[serde(default)]
    pub fingerprint: String,
}

// ---------------------------------------------------------------------------
// Result envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Serialisable result: exactly one of `data` / `error` is populated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope<T> {
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
}

impl<T> From<Result<T, PlannerError>> for Envelope<T> {
    fn from(result: Result<T, PlannerError>) -> Self {
        match result {
            Ok(data) => Self {
                data: Some(data),
                error: None,
            },
            Err(e) => Self {
                data: None,
                error: Some(ErrorBody {
                    code: e.code().to_string(),
                    message: e.to_string(),
                }),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Path validation report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    EmptyPath,
    NonPositiveDuration,
    TooClose,
    TooFar,
    BelowMinHeight,
    AboveMaxHeight,
    TooFast,
    RestrictedZone,
    OutsideSafeEnvelope,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Violation {
    /// Offending keyframe, `None` for path-level problems.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyframe: Option<usize>,
    pub kind: ViolationKind,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PathValidation {
    pub violations: Vec<Violation>,
}

impl PathValidation {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn has(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }
}
