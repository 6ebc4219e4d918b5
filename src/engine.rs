//! PathEngine – turns a compiled prompt into a validated, safety-annotated
//! [`CameraPath`] using a pluggable generative backend.
//!
//! ## Request lifecycle
//!
//! ```text
//! generate_path(prompt)
//!   ├── snapshot config (NOT_INITIALIZED if none)
//!   ├── resolve provider by id (UNSUPPORTED_PROVIDER)
//!   ├── provider.generate_camera_path  ← timeout + cancellation
//!   ├── validate raw keyframes (INVALID_STRUCTURE / INVALID_KEYFRAME)
//!   └── map → CameraPath + copy safety constraints
//! ```
//!
//! The engine is an explicit handle: build one, wrap it in an `Arc`, and hand
//! it to whoever needs paths. `initialize` swaps the whole configuration
//! atomically; each request reads its snapshot exactly once.

use crate::error::{PlannerError, Result};
use crate::protocol::{
    CameraKeyframe, CameraPath, CompiledPrompt, PathMetadata, PathValidation, RawCameraPath,
    RawKeyframe, SafetyConstraints, Violation, ViolationKind,
};
use crate::provider::{CameraPathProvider, HttpProvider, OrbitProvider};
use crate::scene::is_safe_camera_position;
use crate::types::{EngineConfig, PerformanceMetrics, SceneGeometry, Vec3};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct PathEngine {
    config: RwLock<Option<Arc<EngineConfig>>>,
    providers: HashMap<String, Arc<dyn CameraPathProvider>>,
    metrics: Mutex<MetricsState>,
}

impl PathEngine {
    /// An engine with the built-in `orbit` and `openai` providers.
    pub fn new() -> Self {
        Self::with_providers(vec![
            Arc::new(OrbitProvider::default()) as Arc<dyn CameraPathProvider>,
            Arc::new(HttpProvider::new()) as Arc<dyn CameraPathProvider>,
        ])
    }

    /// An engine whose closed provider set is exactly `providers`.
    pub fn with_providers(providers: Vec<Arc<dyn CameraPathProvider>>) -> Self {
        let mut engine = Self {
            config: RwLock::new(None),
            providers: HashMap::new(),
            metrics: Mutex::new(MetricsState::default()),
        };
        for p in providers {
            engine.register_provider(p);
        }
        engine
    }

    /// Add or replace a provider. Takes `&mut self`: the set is fixed once shared.
    pub fn register_provider(&mut self, provider: Arc<dyn CameraPathProvider>) {
        self.providers
            .insert(provider.provider_type().to_string(), provider);
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn provider(&self, id: &str) -> Option<Arc<dyn CameraPathProvider>> {
        self.providers.get(id).cloned()
    }

    /// Replace the held configuration. Requests already in flight keep the
    /// snapshot they started with.
    pub fn initialize(&self, config: EngineConfig) {
        info!(
            "Path engine initialized (provider='{}', model='{}')",
            config.provider, config.model
        );
        *self.config.write() = Some(Arc::new(config));
    }

    pub fn is_initialized(&self) -> bool {
        self.config.read().is_some()
    }

    pub fn config(&self) -> Option<Arc<EngineConfig>> {
        self.config.read().clone()
    }

    // -----------------------------------------------------------------------
    // Generation
    // -----------------------------------------------------------------------

    pub async fn generate_path(&self, prompt: &CompiledPrompt) -> Result<CameraPath> {
        self.generate_path_with_cancel(prompt, std::future::pending::<()>())
            .await
    }

    /// Like [`generate_path`](Self::generate_path), but gives up with
    /// `Cancelled` as soon as `cancel` completes.
    pub async fn generate_path_with_cancel<F>(
        &self,
        prompt: &CompiledPrompt,
        cancel: F,
    ) -> Result<CameraPath>
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let config = self.config();
        let provider_id = config
            .as_ref()
            .map(|c| c.provider.clone())
            .unwrap_or_default();

        let span = tracing::info_span!("generate_path", provider = %provider_id);
        let result = self.run(config, prompt, cancel).instrument(span).await;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.metrics.lock().record(&result, elapsed_ms);
        match &result {
            Ok(path) => debug!(
                "Generated path: {} keyframes, {:.2}s, {:.1}ms",
                path.keyframes.len(),
                path.duration,
                elapsed_ms
            ),
            Err(e) => warn!("Path generation failed [{}]: {}", e.code(), e),
        }
        result
    }

    async fn run<F>(
        &self,
        config: Option<Arc<EngineConfig>>,
        prompt: &CompiledPrompt,
        cancel: F,
    ) -> Result<CameraPath>
    where
        F: Future<Output = ()>,
    {
        let config = config.ok_or(PlannerError::NotInitialized)?;
        let provider = self
            .provider(&config.provider)
            .ok_or_else(|| PlannerError::UnsupportedProvider(config.provider.clone()))?;

        let duration = prompt
            .duration_seconds
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(config.default_duration_seconds);
        let timeout = config.request_timeout();

        let call = provider.generate_camera_path(prompt, duration, &config);
        let raw = tokio::select! {
            res = tokio::time::timeout(timeout, call) => {
                res.map_err(|_| PlannerError::Timeout(timeout))??
            }
            _ = cancel => return Err(PlannerError::Cancelled),
        };

        let keyframes = validate_raw_path(&raw)?;
        Ok(build_path(keyframes, prompt))
    }

    // -----------------------------------------------------------------------
    // Validation & metrics
    // -----------------------------------------------------------------------

    /// Check `path` against its own safety constraints and, when given, the
    /// scene's safety envelope.
    pub fn validate_path(
        &self,
        path: &CameraPath,
        geometry: Option<&SceneGeometry>,
    ) -> PathValidation {
        validate_path(path, geometry)
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.metrics.lock().snapshot()
    }

    pub fn reset_metrics(&self) {
        *self.metrics.lock() = MetricsState::default();
    }
}

impl Default for PathEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Raw path validation
// ---------------------------------------------------------------------------

/// All-or-nothing conversion of backend output into keyframes.
pub fn validate_raw_path(raw: &RawCameraPath) -> Result<Vec<CameraKeyframe>> {
    let frames = match &raw.keyframes {
        Some(frames) if !frames.is_empty() => frames,
        Some(_) => {
            return Err(PlannerError::InvalidStructure(
                "keyframes list is empty".into(),
            ))
        }
        None => {
            return Err(PlannerError::InvalidStructure(
                "keyframes list is missing".into(),
            ))
        }
    };

    frames
        .iter()
        .enumerate()
        .map(|(i, k)| parse_keyframe(i, k))
        .collect()
}

fn parse_keyframe(index: usize, raw: &RawKeyframe) -> Result<CameraKeyframe> {
    let position = parse_vec3(raw.position.as_ref())
        .ok_or_else(|| PlannerError::invalid_keyframe(index, "missing or malformed position"))?;
    let target = parse_vec3(raw.target.as_ref())
        .ok_or_else(|| PlannerError::invalid_keyframe(index, "missing or malformed target"))?;
    let duration = raw
        .duration
        .as_ref()
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| PlannerError::invalid_keyframe(index, "duration must be a number"))?
        as f32;
    if !(duration.is_finite() && duration > 0.0) {
        return Err(PlannerError::invalid_keyframe(
            index,
            format!("duration must be positive, got {}", duration),
        ));
    }

    Ok(CameraKeyframe {
        position,
        target,
        duration,
    })
}

/// Accepts `{"x":..,"y":..,"z":..}` or `[x, y, z]`.
fn parse_vec3(value: Option<&serde_json::Value>) -> Option<Vec3> {
    let v = match value? {
        serde_json::Value::Array(items) if items.len() == 3 => {
            let c: Vec<f32> = items
                .iter()
                .filter_map(|n| n.as_f64().map(|n| n as f32))
                .collect();
            (c.len() == 3).then(|| Vec3::new(c[0], c[1], c[2]))?
        }
        other => serde_json::from_value::<Vec3>(other.clone()).ok()?,
    };
    v.is_finite().then_some(v)
}

fn build_path(keyframes: Vec<CameraKeyframe>, prompt: &CompiledPrompt) -> CameraPath {
    let duration = keyframes.iter().map(|k| k.duration).sum();
    CameraPath {
        keyframes,
        duration,
        metadata: PathMetadata {
            style: prompt.style.clone(),
            focus: prompt.focus.clone(),
            safety_constraints: SafetyConstraints::from(&prompt.constraints),
        },
    }
}

// ---------------------------------------------------------------------------
// Path constraint checking
// ---------------------------------------------------------------------------

const TOLERANCE: f32 = 1e-4;

/// Report every constraint a path breaks. An empty report means the path is valid.
pub fn validate_path(path: &CameraPath, geometry: Option<&SceneGeometry>) -> PathValidation {
    let c = &path.metadata.safety_constraints;
    let mut violations = Vec::new();
    let mut flag = |keyframe: Option<usize>, kind: ViolationKind, detail: String| {
        violations.push(Violation {
            keyframe,
            kind,
            detail,
        })
    };

    if path.keyframes.is_empty() {
        flag(None, ViolationKind::EmptyPath, "path has no keyframes".into());
    }

    let mut previous: Option<Vec3> = None;
    for (i, k) in path.keyframes.iter().enumerate() {
        if !(k.duration > 0.0) {
            flag(
                Some(i),
                ViolationKind::NonPositiveDuration,
                format!("duration {}", k.duration),
            );
        }

        let distance = k.position.distance(k.target);
        if distance < c.min_distance - TOLERANCE {
            flag(
                Some(i),
                ViolationKind::TooClose,
                format!("{:.3} < min {:.3}", distance, c.min_distance),
            );
        }
        if distance > c.max_distance + TOLERANCE {
            flag(
                Some(i),
                ViolationKind::TooFar,
                format!("{:.3} > max {:.3}", distance, c.max_distance),
            );
        }

        let height = k.position.y;
        if height < c.min_height - TOLERANCE {
            flag(
                Some(i),
                ViolationKind::BelowMinHeight,
                format!("{:.3} < {:.3}", height, c.min_height),
            );
        }
        if height > c.max_height + TOLERANCE {
            flag(
                Some(i),
                ViolationKind::AboveMaxHeight,
                format!("{:.3} > {:.3}", height, c.max_height),
            );
        }

        // The first keyframe's approach starts from an unknown camera pose.
        if let Some(prev) = previous {
            if k.duration > 0.0 {
                let speed = prev.distance(k.position) / k.duration;
                if speed > c.max_speed + TOLERANCE {
                    flag(
                        Some(i),
                        ViolationKind::TooFast,
                        format!("{:.3} m/s > {:.3}", speed, c.max_speed),
                    );
                }
            }
        }
        previous = Some(k.position);

        for zone in c.restricted_zones.iter().flatten() {
            if zone.contains(k.position) {
                flag(
                    Some(i),
                    ViolationKind::RestrictedZone,
                    zone.label.clone().unwrap_or_else(|| format!("zone at {}", zone.center)),
                );
            }
        }

        if let Some(geometry) = geometry {
            if !is_safe_camera_position(k.position, k.target, geometry) {
                flag(
                    Some(i),
                    ViolationKind::OutsideSafeEnvelope,
                    format!("position {}", k.position),
                );
            }
        }
    }

    PathValidation { violations }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MetricsState {
    metrics: PerformanceMetrics,
    total_latency_ms: f64,
}

impl MetricsState {
    fn record(&mut self, result: &Result<CameraPath>, latency_ms: f64) {
        let m = &mut self.metrics;
        m.total_requests += 1;
        match result {
            Ok(path) => {
                m.successful_requests += 1;
                m.total_keyframes += path.keyframes.len() as u64;
            }
            Err(e) => {
                m.failed_requests += 1;
                *m.failures_by_code.entry(e.code().to_string()).or_insert(0) += 1;
            }
        }
        self.total_latency_ms += latency_ms;
        m.last_latency_ms = latency_ms;
        m.average_latency_ms = self.total_latency_ms / m.total_requests as f64;
    }

    fn snapshot(&self) -> PerformanceMetrics {
        self.metrics.clone()
    }
}
