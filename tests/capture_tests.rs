//! Environment capture tests
#![cfg(feature = "runtime")]

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use camera_planner::capture::{
        build_environment_record, CaptureContext, CaptureOutcome, EnvironmentCapture,
        EnvironmentDefaults, EnvironmentStore, LockToggle, MemoryEnvironmentStore,
    };
    use camera_planner::error::{codes, PlannerError, Result};
    use camera_planner::protocol::EnvironmentalMetadata;
    use camera_planner::scene::{analyze_scene, SceneNode, SceneSnapshot};
    use camera_planner::types::{Aabb, CameraSnapshot, Vec3};
    use std::sync::Arc;
    use std::time::Duration;

    // -----------------------------------------------------------------------
    // Fixtures
    // -----------------------------------------------------------------------

    fn scene() -> SceneSnapshot {
        SceneSnapshot::new(vec![SceneNode::mesh(
            "statue",
            Aabb::new(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 2.0, 1.0)),
        )])
    }

    fn camera() -> CameraSnapshot {
        CameraSnapshot {
            position: Vec3::new(0.0, 2.0, 6.0),
            target: Vec3::new(0.0, 1.0, 0.0),
            fov: 45.0,
        }
    }

    fn ctx<'a>(model_id: &'a str, scene: &'a SceneSnapshot) -> CaptureContext<'a> {
        CaptureContext {
            model_id: Some(model_id),
            scene: Some(scene),
            camera: Some(camera()),
            orbit_target: Some(Vec3::new(0.0, 1.0, 0.0)),
        }
    }

    fn capture_over(store: Arc<MemoryEnvironmentStore>) -> EnvironmentCapture {
        EnvironmentCapture::new(store as Arc<dyn EnvironmentStore>)
    }

    /// Store whose every call fails.
    struct BrokenStore;

    #[async_trait]
    impl EnvironmentStore for BrokenStore {
        async fn get_environmental_metadata(
            &self,
            _model_id: &str,
        ) -> Result<Option<EnvironmentalMetadata>> {
            Err(PlannerError::persistence("connection refused"))
        }

        async fn store_environmental_metadata(
            &self,
            _model_id: &str,
            _data: &EnvironmentalMetadata,
        ) -> Result<()> {
            Err(PlannerError::persistence("connection refused"))
        }

        async fn update_environmental_metadata(
            &self,
            _model_id: &str,
            _data: &EnvironmentalMetadata,
        ) -> Result<()> {
            Err(PlannerError::persistence("connection refused"))
        }
    }

    // -----------------------------------------------------------------------
    // Record assembly
    // -----------------------------------------------------------------------

    #[test]
    fn record_uses_scene_envelope_and_orbit_target() {
        let geometry = analyze_scene(&scene());
        let target = Vec3::new(0.5, 1.0, 0.0);
        let record =
            build_environment_record(&EnvironmentDefaults::default(), &camera(), target, &geometry)
                .unwrap();

        assert_eq!(record.camera.position, camera().position);
        assert_eq!(record.camera.target, target);
        assert_eq!(record.camera.fov, 45.0);
        assert_eq!(record.constraints.min_distance, geometry.safe_distance.min);
        assert_eq!(record.constraints.max_distance, geometry.safe_distance.max);
        assert_eq!(record.constraints.min_height, 0.0);
        assert_eq!(record.constraints.max_height, geometry.safe_distance.max);
        assert_eq!(record.lighting.color, "#ffffff");
        assert_eq!(record.scene.atmosphere, "clear");
        assert_eq!(record.fingerprint.len(), 32);
    }

    #[test]
    fn fingerprint_tracks_content() {
        let geometry = analyze_scene(&scene());
        let defaults = EnvironmentDefaults::default();
        let a = build_environment_record(&defaults, &camera(), Vec3::zero(), &geometry).unwrap();
        let b = build_environment_record(&defaults, &camera(), Vec3::zero(), &geometry).unwrap();
        let c = build_environment_record(&defaults, &camera(), Vec3::UP, &geometry).unwrap();

        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.fingerprint, c.fingerprint);
    }

    // -----------------------------------------------------------------------
    // Capture workflow
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn incomplete_context_skips_capture() {
        let store = Arc::new(MemoryEnvironmentStore::new());
        let capture = capture_over(store.clone());
        let scene = scene();

        let mut partial = ctx("model-1", &scene);
        partial.camera = None;
        assert_eq!(capture.capture(partial).await.unwrap(), None);

        let mut partial = ctx("model-1", &scene);
        partial.model_id = None;
        assert_eq!(capture.capture(partial).await.unwrap(), None);

        assert_eq!(capture.capture(CaptureContext::default()).await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn recapture_updates_or_skips() {
        let store = Arc::new(MemoryEnvironmentStore::new());
        let capture = capture_over(store.clone());
        let scene = scene();

        let first = capture.capture(ctx("model-1", &scene)).await.unwrap();
        assert_eq!(first, Some(CaptureOutcome::Created));

        let same = capture.capture(ctx("model-1", &scene)).await.unwrap();
        assert_eq!(same, Some(CaptureOutcome::Unchanged));
        assert_eq!(store.write_count(), 1);

        let mut moved = ctx("model-1", &scene);
        moved.orbit_target = Some(Vec3::new(0.0, 1.5, 0.0));
        let updated = capture.capture(moved).await.unwrap();
        assert_eq!(updated, Some(CaptureOutcome::Updated));
        assert_eq!(store.write_count(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get("model-1").unwrap().camera.target,
            Vec3::new(0.0, 1.5, 0.0)
        );
    }

    #[tokio::test]
    async fn store_failure_is_propagated() {
        let capture = EnvironmentCapture::new(Arc::new(BrokenStore));
        let scene = scene();

        let err = capture.capture(ctx("model-1", &scene)).await.unwrap_err();
        assert_eq!(err.code(), codes::PERSISTENCE_ERROR);
    }

    // -----------------------------------------------------------------------
    // Lock toggle
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn only_engaging_the_lock_captures() {
        let store = Arc::new(MemoryEnvironmentStore::new());
        let capture = capture_over(store.clone());
        let scene = scene();
        let mut toggle = LockToggle::new();

        let engaged = toggle.set_locked(true, &capture, ctx("m", &scene)).await.unwrap();
        assert_eq!(engaged, Some(CaptureOutcome::Created));
        assert!(toggle.is_locked());

        let again = toggle.set_locked(true, &capture, ctx("m", &scene)).await.unwrap();
        assert_eq!(again, None);

        let released = toggle.set_locked(false, &capture, ctx("m", &scene)).await.unwrap();
        assert_eq!(released, None);
        assert!(!toggle.is_locked());

        let relocked = toggle.set_locked(true, &capture, ctx("m", &scene)).await.unwrap();
        assert_eq!(relocked, Some(CaptureOutcome::Unchanged));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn skipped_capture_leaves_toggle_unlocked() {
        let store = Arc::new(MemoryEnvironmentStore::new());
        let capture = capture_over(store.clone());
        let scene = scene();
        let mut toggle = LockToggle::new();

        let mut partial = ctx("m", &scene);
        partial.camera = None;
        assert_eq!(toggle.set_locked(true, &capture, partial).await.unwrap(), None);
        assert!(!toggle.is_locked());

        // Engaging again retries without an unlock in between.
        let retried = toggle.set_locked(true, &capture, ctx("m", &scene)).await.unwrap();
        assert_eq!(retried, Some(CaptureOutcome::Created));
        assert!(toggle.is_locked());
    }

    #[tokio::test]
    async fn failed_capture_leaves_toggle_unlocked() {
        let capture = EnvironmentCapture::new(Arc::new(BrokenStore));
        let scene = scene();
        let mut toggle = LockToggle::new();

        let err = toggle
            .set_locked(true, &capture, ctx("m", &scene))
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::PERSISTENCE_ERROR);
        assert!(!toggle.is_locked());
    }

    #[tokio::test]
    async fn concurrent_locks_on_one_model_write_once() {
        let store = Arc::new(MemoryEnvironmentStore::with_latency(Duration::from_millis(20)));
        let capture = capture_over(store.clone());
        let scene = scene();
        let mut viewer_a = LockToggle::new();
        let mut viewer_b = LockToggle::new();

        let (a, b) = tokio::join!(
            viewer_a.set_locked(true, &capture, ctx("shared", &scene)),
            viewer_b.set_locked(true, &capture, ctx("shared", &scene)),
        );
        let mut outcomes = vec![a.unwrap().unwrap(), b.unwrap().unwrap()];
        outcomes.sort_by_key(|o| format!("{:?}", o));

        assert_eq!(outcomes, [CaptureOutcome::Created, CaptureOutcome::Unchanged]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.write_count(), 1);
        assert_eq!(capture.active_models(), 0);
    }

    #[tokio::test]
    async fn different_models_capture_independently() {
        let store = Arc::new(MemoryEnvironmentStore::with_latency(Duration::from_millis(10)));
        let capture = capture_over(store.clone());
        let scene = scene();

        let (a, b) = tokio::join!(
            capture.capture(ctx("left", &scene)),
            capture.capture(ctx("right", &scene)),
        );
        assert_eq!(a.unwrap(), Some(CaptureOutcome::Created));
        assert_eq!(b.unwrap(), Some(CaptureOutcome::Created));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn per_model_locks_are_released_after_capture() {
        let store = Arc::new(MemoryEnvironmentStore::new());
        let capture = capture_over(store.clone());
        let scene = scene();

        for i in 0..16 {
            let id = format!("model-{}", i);
            capture.capture(ctx(&id, &scene)).await.unwrap();
        }
        assert_eq!(store.len(), 16);
        assert_eq!(capture.active_models(), 0);

        let broken = EnvironmentCapture::new(Arc::new(BrokenStore));
        assert!(broken.capture(ctx("m", &scene)).await.is_err());
        assert_eq!(broken.active_models(), 0);
    }

    #[tokio::test]
    async fn unserialized_upserts_collide() {
        // Without the per-model lock the read-then-write can interleave.
        let store = MemoryEnvironmentStore::with_latency(Duration::from_millis(20));
        let geometry = analyze_scene(&scene());
        let record = build_environment_record(
            &EnvironmentDefaults::default(),
            &camera(),
            Vec3::zero(),
            &geometry,
        )
        .unwrap();

        let (a, b) = tokio::join!(
            store.upsert_environmental_metadata("shared", &record),
            store.upsert_environmental_metadata("shared", &record),
        );
        assert!(a.is_ok() != b.is_ok());
        let err = a.err().or(b.err()).unwrap();
        assert_eq!(err.code(), codes::PERSISTENCE_ERROR);
        assert_eq!(store.len(), 1);
    }
}
