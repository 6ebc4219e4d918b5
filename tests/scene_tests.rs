//! Scene analyzer tests

#[cfg(test)]
mod tests {
    use camera_planner::scene::{
        analyze_scene, generate_safe_keyframes, is_safe_camera_position, OrbitDistance,
        OrbitElevation, OrbitPlan, SceneAnalyzer, SceneNode, SceneSnapshot, Transform,
    };
    use camera_planner::types::{Aabb, AnalyzerConfig, CameraSnapshot, Vec3};

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    fn approx_v(a: Vec3, b: Vec3) -> bool {
        approx(a.x, b.x) && approx(a.y, b.y) && approx(a.z, b.z)
    }

    /// 2x2x2 cube standing on y = 0, centred on the vertical axis.
    fn cube_scene() -> SceneSnapshot {
        SceneSnapshot::new(vec![SceneNode::mesh(
            "cube",
            Aabb::new(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 2.0, 1.0)),
        )])
    }

    // -----------------------------------------------------------------------
    // Bounding volumes
    // -----------------------------------------------------------------------

    #[test]
    fn box_center_and_size_follow_geometry() {
        let g = analyze_scene(&cube_scene());
        assert!(approx_v(g.bounding_box.center, Vec3::new(0.0, 1.0, 0.0)));
        assert!(approx_v(g.bounding_box.size, Vec3::new(2.0, 2.0, 2.0)));
        assert!(approx(g.bounding_sphere.radius, 12f32.sqrt() * 0.5));
    }

    #[test]
    fn sphere_encloses_box_for_varied_scenes() {
        let scenes = [
            cube_scene(),
            SceneSnapshot::new(vec![SceneNode::mesh(
                "plank",
                Aabb::new(Vec3::new(-10.0, 3.0, -0.1), Vec3::new(10.0, 3.2, 0.1)),
            )]),
            SceneSnapshot::new(vec![
                SceneNode::mesh("a", Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0))),
                SceneNode::mesh("b", Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)))
                    .with_transform(Transform {
                        translation: Vec3::new(40.0, 5.0, -7.0),
                        yaw_degrees: 33.0,
                        scale: Vec3::new(2.0, 0.5, 3.0),
                    }),
            ]),
        ];

        for scene in &scenes {
            let g = analyze_scene(scene);
            let aabb = Aabb::new(g.bounding_box.min, g.bounding_box.max);
            for corner in aabb.corners() {
                assert!(
                    g.bounding_sphere.contains(corner),
                    "corner {} outside sphere {:?}",
                    corner,
                    g.bounding_sphere
                );
            }
        }
    }

    #[test]
    fn nested_transforms_accumulate() {
        let child = SceneNode::mesh("child", Aabb::new(Vec3::zero(), Vec3::splat(1.0)))
            .with_transform(Transform::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        let parent = SceneNode::group("parent")
            .with_transform(Transform::from_translation(Vec3::new(10.0, 5.0, 0.0)))
            .with_child(child);

        let bounds = SceneSnapshot::new(vec![parent]).world_bounds();
        assert!(approx_v(bounds.min, Vec3::new(11.0, 5.0, 0.0)));
        assert!(approx_v(bounds.max, Vec3::new(12.0, 6.0, 1.0)));
    }

    #[test]
    fn yaw_rotates_about_vertical_axis() {
        let node = SceneNode::mesh(
            "slab",
            Aabb::new(Vec3::zero(), Vec3::new(2.0, 1.0, 1.0)),
        )
        .with_transform(Transform {
            yaw_degrees: 90.0,
            ..Default::default()
        });

        let bounds = SceneSnapshot::new(vec![node]).world_bounds();
        assert!(approx_v(bounds.min, Vec3::new(0.0, 0.0, -2.0)));
        assert!(approx_v(bounds.max, Vec3::new(1.0, 1.0, 0.0)));
    }

    #[test]
    fn invisible_subtrees_are_ignored() {
        let mut hidden = SceneNode::group("hidden").with_child(SceneNode::mesh(
            "far",
            Aabb::new(Vec3::splat(100.0), Vec3::splat(101.0)),
        ));
        hidden.visible = false;

        let mut scene = cube_scene();
        scene.nodes.push(hidden);

        let g = analyze_scene(&scene);
        assert!(approx_v(g.bounding_box.max, Vec3::new(1.0, 2.0, 1.0)));
    }

    #[test]
    fn empty_scene_is_degenerate_at_origin() {
        let g = analyze_scene(&SceneSnapshot::default());
        assert_eq!(g.bounding_box.center, Vec3::zero());
        assert_eq!(g.bounding_sphere.radius, 0.0);
        assert_eq!(g.safe_distance.min, 0.0);
        assert_eq!(g.safe_distance.max, 0.0);
    }

    // -----------------------------------------------------------------------
    // Floor & safe distance
    // -----------------------------------------------------------------------

    #[test]
    fn floor_is_box_minimum_with_up_normal() {
        let scene = SceneSnapshot::new(vec![SceneNode::mesh(
            "raised",
            Aabb::new(Vec3::new(0.0, -3.5, 0.0), Vec3::new(1.0, 4.0, 1.0)),
        )]);
        let g = analyze_scene(&scene);
        assert!(approx(g.floor.height, -3.5));
        assert_eq!(g.floor.normal, Vec3::UP);
    }

    #[test]
    fn safe_distance_scales_with_largest_dimension() {
        for scale in [0.5f32, 1.0, 4.0, 25.0] {
            let scene = SceneSnapshot::new(vec![SceneNode::mesh(
                "box",
                Aabb::new(Vec3::zero(), Vec3::new(scale, scale * 0.5, scale * 0.25)),
            )]);
            let g = analyze_scene(&scene);
            assert!(approx(g.safe_distance.min, 1.5 * scale));
            assert!(approx(g.safe_distance.max, 5.0 * scale));
            assert!(g.safe_distance.min < g.safe_distance.max);
        }
    }

    #[test]
    fn analyzer_factors_are_configurable() {
        let analyzer = SceneAnalyzer::new(AnalyzerConfig {
            min_distance_factor: 2.0,
            max_distance_factor: 3.0,
            ..Default::default()
        });
        let g = analyzer.analyze(&cube_scene());
        assert!(approx(g.safe_distance.min, 4.0));
        assert!(approx(g.safe_distance.max, 6.0));
    }

    #[test]
    fn current_camera_is_carried_through() {
        let mut scene = cube_scene();
        let camera = CameraSnapshot {
            position: Vec3::new(0.0, 2.0, 6.0),
            target: Vec3::new(0.0, 1.0, 0.0),
            fov: 50.0,
        };
        scene.camera = Some(camera);
        assert_eq!(analyze_scene(&scene).current_camera, Some(camera));
    }

    // -----------------------------------------------------------------------
    // Position safety
    // -----------------------------------------------------------------------

    #[test]
    fn position_below_floor_is_unsafe() {
        let g = analyze_scene(&cube_scene());
        let p = Vec3::new(5.0, -0.01, 0.0);
        assert!(!is_safe_camera_position(p, Vec3::zero(), &g));
    }

    #[test]
    fn position_outside_distance_band_is_unsafe() {
        let g = analyze_scene(&cube_scene()); // band [3, 10] around (0, 1, 0)
        let too_close = Vec3::new(2.0, 1.0, 0.0);
        let too_far = Vec3::new(11.0, 1.0, 0.0);
        assert!(!is_safe_camera_position(too_close, Vec3::zero(), &g));
        assert!(!is_safe_camera_position(too_far, Vec3::zero(), &g));
    }

    #[test]
    fn position_inside_band_is_safe_whatever_the_target() {
        let g = analyze_scene(&cube_scene());
        let p = Vec3::new(0.0, 1.0, 5.0);
        assert!(is_safe_camera_position(p, Vec3::zero(), &g));
        assert!(is_safe_camera_position(p, Vec3::splat(1000.0), &g));
    }

    // -----------------------------------------------------------------------
    // Fallback keyframes
    // -----------------------------------------------------------------------

    #[test]
    fn default_orbit_has_eight_safe_points_looking_at_center() {
        let g = analyze_scene(&cube_scene());
        let frames = generate_safe_keyframes(&g, "");
        assert_eq!(frames.len(), 8);
        for k in &frames {
            assert_eq!(k.target, g.bounding_sphere.center);
            assert!(k.duration > 0.0);
            assert!(is_safe_camera_position(k.position, k.target, &g));
            assert!(approx(
                k.position.distance(g.bounding_sphere.center),
                g.bounding_sphere.radius * 2.0
            ));
        }
    }

    #[test]
    fn default_orbit_is_pulled_into_the_envelope() {
        // A flat plank: radius * 2 is below 1.5 x its length.
        let scene = SceneSnapshot::new(vec![SceneNode::mesh(
            "plank",
            Aabb::new(Vec3::new(-5.0, 0.0, -0.5), Vec3::new(5.0, 0.2, 0.5)),
        )]);
        let g = analyze_scene(&scene);
        assert!(g.bounding_sphere.radius * 2.0 < g.safe_distance.min);
        for k in generate_safe_keyframes(&g, "orbit around it") {
            assert!(is_safe_camera_position(k.position, k.target, &g));
        }
    }

    #[test]
    fn instruction_keywords_shape_the_orbit() {
        let plan = OrbitPlan::from_instruction("Slow, close, counter-clockwise orbit from high above");
        assert_eq!(plan.distance, OrbitDistance::Close);
        assert_eq!(plan.elevation, OrbitElevation::High);
        assert_eq!(plan.winding, -1.0);
        assert_eq!(plan.step_seconds, 4.0);

        let plan = OrbitPlan::from_instruction("a quick wide half circle, low to the ground");
        assert_eq!(plan.distance, OrbitDistance::Far);
        assert_eq!(plan.elevation, OrbitElevation::Low);
        assert_eq!(plan.winding, 1.0);
        assert!(approx(plan.sweep, std::f32::consts::PI));
        assert_eq!(plan.step_seconds, 1.0);
    }

    #[test]
    fn instructed_orbits_stay_safe() {
        let g = analyze_scene(&cube_scene());
        for text in [
            "close and high",
            "far and low",
            "quarter turn anticlockwise",
            "slowly circle the model",
        ] {
            let frames = generate_safe_keyframes(&g, text);
            assert!(!frames.is_empty(), "no frames for '{}'", text);
            for k in &frames {
                assert!(
                    is_safe_camera_position(k.position, k.target, &g),
                    "'{}' produced unsafe position {}",
                    text,
                    k.position
                );
            }
        }
    }

    #[test]
    fn high_orbit_is_above_center_and_winding_flips_direction() {
        let g = analyze_scene(&cube_scene());
        let high = generate_safe_keyframes(&g, "high");
        assert!(high.iter().all(|k| k.position.y > g.bounding_sphere.center.y));

        let cw = generate_safe_keyframes(&g, "clockwise");
        let ccw = generate_safe_keyframes(&g, "counterclockwise");
        assert!(approx_v(cw[0].position, ccw[0].position));
        assert!(approx(cw[1].position.x, ccw[1].position.x));
        assert!(approx(cw[1].position.z, -ccw[1].position.z));
    }

    #[test]
    fn half_orbit_ends_opposite_its_start() {
        let g = analyze_scene(&cube_scene());
        let frames = generate_safe_keyframes(&g, "half");
        let first = frames[0].position - g.bounding_sphere.center;
        let last = frames[frames.len() - 1].position - g.bounding_sphere.center;
        assert!(approx_v(first, -last));
    }

    #[test]
    fn zero_orbit_points_yield_nothing() {
        let analyzer = SceneAnalyzer::new(AnalyzerConfig {
            orbit_points: 0,
            ..Default::default()
        });
        let g = analyzer.analyze(&cube_scene());
        assert!(analyzer.generate_safe_keyframes(&g, "").is_empty());
    }
}
