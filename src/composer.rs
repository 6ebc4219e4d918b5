//! Pattern composer: expands qualitative motion patterns into ordered
//! [`Primitive`] sequences.
//!
//! Dispatch goes through a [`PatternRegistry`] keyed by pattern name, so new
//! patterns are added by registering an expander rather than by editing the
//! dispatcher. Unknown names are logged and produce an empty sequence.

use crate::error::{PlannerError, Result};
use crate::protocol::{Direction, Magnitude, Primitive, Speed};
use crate::types::SceneMeta;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

// ---------------------------------------------------------------------------
// Pattern arguments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ZigzagArgs {
    /// Number of truck+dolly pairs. Default 4.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<u32>,
    /// Lateral and backward step size. Default `small`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amplitude: Option<Magnitude>,
}

impl ZigzagArgs {
    pub fn segments(&self) -> u32 {
        self.segments.unwrap_or(4)
    }

    pub fn amplitude(&self) -> Magnitude {
        self.amplitude.unwrap_or(Magnitude::Small)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FlyByArgs {
    /// Height of the climb before the pass; `none` skips climb and descent. Default `large`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apex_height: Option<Magnitude>,
    /// Default `fast`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<Speed>,
    /// Append a mirrored return pass. Default `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_pass: Option<bool>,
}

impl FlyByArgs {
    pub fn apex_height(&self) -> Magnitude {
        self.apex_height.unwrap_or(Magnitude::Large)
    }

    pub fn speed(&self) -> Speed {
        self.speed.unwrap_or(Speed::Fast)
    }

    pub fn second_pass(&self) -> bool {
        self.second_pass.unwrap_or(false)
    }
}

/// Wire form of a pattern request: `{"pattern": "zigzag", "args": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternRequest {
    pub pattern: String,
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

/// Pattern descriptor, tagged by pattern name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "PatternRequest")]
pub enum PatternArgs {
    Zigzag(ZigzagArgs),
    FlyBy(FlyByArgs),
    /// A pattern without a typed argument struct; resolved purely by name.
    Custom {
        name: String,
        params: serde_json::Map<String, serde_json::Value>,
    },
}

impl PatternArgs {
    pub const ZIGZAG: &'static str = "zigzag";
    pub const FLY_BY: &'static str = "fly_by";

    pub fn name(&self) -> &str {
        match self {
            PatternArgs::Zigzag(_) => Self::ZIGZAG,
            PatternArgs::FlyBy(_) => Self::FLY_BY,
            PatternArgs::Custom { name, .. } => name,
        }
    }

    /// Typed args for a built-in pattern, falling back to parsing a `Custom`
    /// payload that happens to carry the same name.
    fn typed<T>(&self, pick: impl Fn(&PatternArgs) -> Option<&T>) -> T
    where
        T: Clone + Default + for<'de> Deserialize<'de>,
    {
        if let Some(args) = pick(self) {
            return args.clone();
        }
        match self {
            PatternArgs::Custom { name, params } => {
                serde_json::from_value(serde_json::Value::Object(params.clone()))
                    .unwrap_or_else(|e| {
                        warn!("Malformed args for pattern '{}', using defaults: {}", name, e);
                        T::default()
                    })
            }
            _ => T::default(),
        }
    }
}

impl TryFrom<PatternRequest> for PatternArgs {
    type Error = serde_json::Error;

    fn try_from(req: PatternRequest) -> std::result::Result<Self, Self::Error> {
        let args = serde_json::Value::Object(req.args);
        Ok(match req.pattern.as_str() {
            Self::ZIGZAG => PatternArgs::Zigzag(serde_json::from_value(args)?),
            Self::FLY_BY => PatternArgs::FlyBy(serde_json::from_value(args)?),
            _ => PatternArgs::Custom {
                name: req.pattern,
                params: match args {
                    serde_json::Value::Object(map) => map,
                    _ => serde_json::Map::new(),
                },
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub type Expander = Arc<dyn Fn(&PatternArgs, &SceneMeta) -> Vec<Primitive> + Send + Sync>;

/// Pattern name → expander function.
#[derive(Clone)]
pub struct PatternRegistry {
    expanders: HashMap<String, Expander>,
}

impl PatternRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            expanders: HashMap::new(),
        }
    }

    /// A registry with `zigzag` and `fly_by` registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(PatternArgs::ZIGZAG, |args, meta| {
            expand_zigzag(&args.typed(|a| match a {
                PatternArgs::Zigzag(z) => Some(z),
                _ => None,
            }), meta)
        });
        registry.register(PatternArgs::FLY_BY, |args, meta| {
            expand_fly_by(&args.typed(|a| match a {
                PatternArgs::FlyBy(f) => Some(f),
                _ => None,
            }), meta)
        });
        registry
    }

    /// Register (or replace) the expander for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, expander: F)
    where
        F: Fn(&PatternArgs, &SceneMeta) -> Vec<Primitive> + Send + Sync + 'static,
    {
        self.expanders.insert(name.into(), Arc::new(expander));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.expanders.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.expanders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Expand `args`. Unknown pattern names yield an empty sequence.
    pub fn compose(&self, args: &PatternArgs, meta: &SceneMeta) -> Vec<Primitive> {
        let Some(expander) = self.expanders.get(args.name()) else {
            warn!("Unknown camera pattern '{}', returning no primitives", args.name());
            return Vec::new();
        };
        let primitives = expander(args, meta);
        debug!(
            "Composed pattern '{}' into {} primitives",
            args.name(),
            primitives.len()
        );
        primitives
    }

    /// Like [`compose`](Self::compose), but an unknown name is an error.
    pub fn try_compose(&self, args: &PatternArgs, meta: &SceneMeta) -> Result<Vec<Primitive>> {
        if !self.contains(args.name()) {
            return Err(PlannerError::UnsupportedPattern(args.name().to_string()));
        }
        Ok(self.compose(args, meta))
    }
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for PatternRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternRegistry")
            .field("patterns", &self.names())
            .finish()
    }
}

/// Expand with the built-in registry.
pub fn compose_pattern(args: &PatternArgs, meta: &SceneMeta) -> Vec<Primitive> {
    static BUILTINS: OnceLock<PatternRegistry> = OnceLock::new();
    BUILTINS
        .get_or_init(PatternRegistry::with_builtins)
        .compose(args, meta)
}

// ---------------------------------------------------------------------------
// Built-in expanders
// ---------------------------------------------------------------------------

/// Alternating left/right trucks, each followed by a backward dolly.
pub fn expand_zigzag(args: &ZigzagArgs, _meta: &SceneMeta) -> Vec<Primitive> {
    let amplitude = args.amplitude();
    (0..args.segments())
        .flat_map(|i| {
            let side = if i % 2 == 0 {
                Direction::Left
            } else {
                Direction::Right
            };
            [
                Primitive::truck(side, amplitude),
                Primitive::dolly(Direction::Backward, amplitude),
            ]
        })
        .collect()
}

/// Approach, optional climb, lateral pass, optional descent, exit; then the
/// whole run mirrored when `second_pass` is set.
pub fn expand_fly_by(args: &FlyByArgs, _meta: &SceneMeta) -> Vec<Primitive> {
    let speed = args.speed();
    let apex = args.apex_height();
    let climbs = apex != Magnitude::None;

    let mut pass = Vec::with_capacity(5);
    pass.push(Primitive::dolly(Direction::Forward, Magnitude::Medium).with_speed(speed));
    if climbs {
        pass.push(Primitive::pedestal(Direction::Up, apex).with_speed(speed));
    }
    pass.push(Primitive::truck(Direction::Right, Magnitude::Large).with_speed(speed));
    if climbs {
        pass.push(Primitive::pedestal(Direction::Down, apex).with_speed(speed));
    }
    pass.push(Primitive::dolly(Direction::Backward, Magnitude::Medium).with_speed(speed));

    if args.second_pass() {
        let ret: Vec<Primitive> = pass.iter().rev().map(Primitive::mirrored).collect();
        pass.extend(ret);
    }
    pass
}

// ---------------------------------------------------------------------------
// Time allocation
// ---------------------------------------------------------------------------

/// Split `total` seconds across `primitives`.
///
/// Explicit `duration_ratio`s get `ratio * total`; time they leave over is
/// shared evenly by primitives without one. If every primitive is explicit and
/// the ratios sum below 1, the leftover stays unallocated. When explicit ratios
/// use up the whole budget, ratio-less primitives are weighted at the mean
/// explicit ratio and everything is renormalised to sum to `total`.
pub fn allocate_durations(primitives: &[Primitive], total: f32) -> Vec<f32> {
    if primitives.is_empty() {
        return Vec::new();
    }

    let ratios: Vec<Option<f32>> = primitives
        .iter()
        .map(|p| p.duration_ratio.filter(|r| r.is_finite() && *r > 0.0))
        .map(|r| r.map(|r| r.min(1.0)))
        .collect();

    let explicit: Vec<f32> = ratios.iter().flatten().copied().collect();
    let explicit_sum: f32 = explicit.iter().sum();
    let implicit_count = ratios.len() - explicit.len();

    let implicit_weight = if implicit_count == 0 {
        0.0
    } else if explicit_sum < 1.0 {
        (1.0 - explicit_sum) / implicit_count as f32
    } else {
        explicit_sum / explicit.len() as f32
    };

    let weights: Vec<f32> = ratios
        .iter()
        .map(|r| r.unwrap_or(implicit_weight))
        .collect();
    let scale = weights.iter().sum::<f32>().max(1.0);

    weights.iter().map(|w| total * w / scale).collect()
}
