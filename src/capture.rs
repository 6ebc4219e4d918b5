//! Environmental capture: snapshot and persist a locked camera/lighting
//! configuration per model.
//!
//! ```text
//! LockToggle (one per viewer)
//!   └── EnvironmentCapture (shared)      ← per-model-id async lock
//!         ├── SceneAnalyzer              ← fresh safety envelope
//!         └── dyn EnvironmentStore       ← get → store | update
//! ```
//!
//! The store's read-then-write runs while the model's lock is held, so two
//! captures racing on the same model id produce one record, never a
//! duplicate insert or a lost update.

use crate::error::{PlannerError, Result};
use crate::protocol::{
    CameraSettings, EnvironmentConstraints, EnvironmentalMetadata, LightingSettings,
    SceneSettings,
};
use crate::scene::{SceneAnalyzer, SceneSnapshot};
use crate::types::{CameraSnapshot, SceneGeometry, Vec3};
use async_trait::async_trait;
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Created,
    Updated,
    /// The stored record already matched; nothing was written.
    Unchanged,
}

/// External metadata store. Failures are returned as `Persistence` errors
/// and never retried here.
#[async_trait]
pub trait EnvironmentStore: Send + Sync {
    async fn get_environmental_metadata(
        &self,
        model_id: &str,
    ) -> Result<Option<EnvironmentalMetadata>>;

    /// Insert a new record; fails if one already exists.
    async fn store_environmental_metadata(
        &self,
        model_id: &str,
        data: &EnvironmentalMetadata,
    ) -> Result<()>;

    /// Replace an existing record; fails if there is none.
    async fn update_environmental_metadata(
        &self,
        model_id: &str,
        data: &EnvironmentalMetadata,
    ) -> Result<()>;

    /// Insert or replace. The default is read-then-branch and is only atomic
    /// when the caller serializes per model id; stores with a native upsert
    /// should override it.
    async fn upsert_environmental_metadata(
        &self,
        model_id: &str,
        data: &EnvironmentalMetadata,
    ) -> Result<CaptureOutcome> {
        match self.get_environmental_metadata(model_id).await? {
            Some(existing) if existing.fingerprint == data.fingerprint => {
                Ok(CaptureOutcome::Unchanged)
            }
            Some(_) => {
                self.update_environmental_metadata(model_id, data).await?;
                Ok(CaptureOutcome::Updated)
            }
            None => {
                self.store_environmental_metadata(model_id, data).await?;
                Ok(CaptureOutcome::Created)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Process-local store with insert/update semantics matching a keyed table.
///
/// An optional per-call latency widens the window between a read and the
/// following write, which makes races observable in tests.
#[derive(Debug, Default)]
pub struct MemoryEnvironmentStore {
    records: Mutex<HashMap<String, EnvironmentalMetadata>>,
    latency: Duration,
    writes: AtomicU64,
}

impl MemoryEnvironmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn get(&self, model_id: &str) -> Option<EnvironmentalMetadata> {
        self.records.lock().get(model_id).cloned()
    }

    /// Successful inserts plus updates.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl EnvironmentStore for MemoryEnvironmentStore {
    async fn get_environmental_metadata(
        &self,
        model_id: &str,
    ) -> Result<Option<EnvironmentalMetadata>> {
        self.delay().await;
        Ok(self.get(model_id))
    }

    async fn store_environmental_metadata(
        &self,
        model_id: &str,
        data: &EnvironmentalMetadata,
    ) -> Result<()> {
        self.delay().await;
        let mut records = self.records.lock();
        if records.contains_key(model_id) {
            return Err(PlannerError::persistence(format!(
                "record for model '{}' already exists",
                model_id
            )));
        }
        records.insert(model_id.to_string(), data.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_environmental_metadata(
        &self,
        model_id: &str,
        data: &EnvironmentalMetadata,
    ) -> Result<()> {
        self.delay().await;
        let mut records = self.records.lock();
        match records.get_mut(model_id) {
            Some(slot) => {
                *slot = data.clone();
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(PlannerError::persistence(format!(
                "no record for model '{}'",
                model_id
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Record assembly
// ---------------------------------------------------------------------------

/// Fixed lighting and scene styling written with every capture.
#[derive(Debug, Clone)]
pub struct EnvironmentDefaults {
    pub lighting: LightingSettings,
    pub scene: SceneSettings,
}

impl Default for EnvironmentDefaults {
    fn default() -> Self {
        Self {
            lighting: LightingSettings {
                intensity: 1.0,
                color: "#ffffff".into(),
                position: Vec3::new(5.0, 10.0, 7.5),
            },
            scene: SceneSettings {
                background: "#f0f0f0".into(),
                ground: "#e0e0e0".into(),
                atmosphere: "clear".into(),
            },
        }
    }
}

/// md5 over the content sections, hex encoded.
pub fn fingerprint(
    lighting: &LightingSettings,
    camera: &CameraSettings,
    scene: &SceneSettings,
    constraints: &EnvironmentConstraints,
) -> Result<String> {
    let bytes = serde_json::to_vec(&(lighting, camera, scene, constraints))?;
    Ok(format!("{:x}", md5::compute(bytes)))
}

pub fn build_environment_record(
    defaults: &EnvironmentDefaults,
    camera: &CameraSnapshot,
    orbit_target: Vec3,
    geometry: &SceneGeometry,
) -> Result<EnvironmentalMetadata> {
    let camera = CameraSettings {
        position: camera.position,
        target: orbit_target,
        fov: camera.fov,
    };
    let constraints = EnvironmentConstraints {
        min_distance: geometry.safe_distance.min,
        max_distance: geometry.safe_distance.max,
        min_height: geometry.floor.height,
        max_height: geometry.floor.height + geometry.safe_distance.max,
    };
    let fingerprint = fingerprint(&defaults.lighting, &camera, &defaults.scene, &constraints)?;

    Ok(EnvironmentalMetadata {
        lighting: defaults.lighting.clone(),
        camera,
        scene: defaults.scene.clone(),
        constraints,
        fingerprint,
    })
}

// ---------------------------------------------------------------------------
// Capture workflow
// ---------------------------------------------------------------------------

/// Everything the viewer has at the moment the lock is engaged. A capture is
/// skipped unless all four parts are present.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureContext<'a> {
    pub model_id: Option<&'a str>,
    pub scene: Option<&'a SceneSnapshot>,
    pub camera: Option<CameraSnapshot>,
    pub orbit_target: Option<Vec3>,
}

pub struct EnvironmentCapture {
    store: Arc<dyn EnvironmentStore>,
    analyzer: SceneAnalyzer,
    defaults: EnvironmentDefaults,
    model_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl EnvironmentCapture {
    pub fn new(store: Arc<dyn EnvironmentStore>) -> Self {
        Self::with_parts(store, SceneAnalyzer::default(), EnvironmentDefaults::default())
    }

    pub fn with_parts(
        store: Arc<dyn EnvironmentStore>,
        analyzer: SceneAnalyzer,
        defaults: EnvironmentDefaults,
    ) -> Self {
        Self {
            store,
            analyzer,
            defaults,
            model_locks: Mutex::new(HashMap::new()),
        }
    }

    fn lease<'a>(&'a self, model_id: &'a str) -> ModelLease<'a> {
        let lock = self
            .model_locks
            .lock()
            .entry(model_id.to_string())
            .or_default()
            .clone();
        ModelLease {
            locks: &self.model_locks,
            model_id,
            lock,
        }
    }

    /// Model ids with a capture currently running or waiting.
    pub fn active_models(&self) -> usize {
        self.model_locks.lock().len()
    }

    /// Analyze the scene, build the record and persist it.
    ///
    /// Returns `Ok(None)` when the context is incomplete.
    pub async fn capture(&self, ctx: CaptureContext<'_>) -> Result<Option<CaptureOutcome>> {
        let (Some(model_id), Some(scene), Some(camera), Some(orbit_target)) =
            (ctx.model_id, ctx.scene, ctx.camera, ctx.orbit_target)
        else {
            debug!("Environment capture skipped: viewer context incomplete");
            return Ok(None);
        };

        let geometry = self.analyzer.analyze(scene);
        let record = build_environment_record(&self.defaults, &camera, orbit_target, &geometry)?;

        let lease = self.lease(model_id);
        let _guard = lease.lock.lock().await;
        let outcome = self
            .store
            .upsert_environmental_metadata(model_id, &record)
            .await?;

        info!("Environment for model '{}': {:?}", model_id, outcome);
        Ok(Some(outcome))
    }
}

/// A caller's hold on one model's lock. The map entry goes away with the
/// last lease, so idle models cost nothing.
struct ModelLease<'a> {
    locks: &'a Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    model_id: &'a str,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for ModelLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        // One reference in the map, one here: nobody else is waiting.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(self.model_id);
        }
    }
}

/// The viewer's lock switch. Only an unlocked → locked transition captures,
/// and the switch only reads locked once that capture has stored a record.
#[derive(Debug, Default)]
pub struct LockToggle {
    locked: bool,
}

impl LockToggle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub async fn set_locked(
        &mut self,
        locked: bool,
        capture: &EnvironmentCapture,
        ctx: CaptureContext<'_>,
    ) -> Result<Option<CaptureOutcome>> {
        if !locked || self.locked {
            self.locked = locked;
            return Ok(None);
        }
        let outcome = capture.capture(ctx).await?;
        self.locked = outcome.is_some();
        Ok(outcome)
    }
}
