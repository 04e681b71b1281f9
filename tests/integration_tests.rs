//! Integration tests for roadspeed.
//!
//! These tests verify complete calibration and speed workflows across modules.

use std::sync::Arc;
use std::thread;

use approx::assert_relative_eq;
use nalgebra::{DMatrix, Point2};

use roadspeed::{
    Anchor, CoordinateTransformation, Error, RoadCalibration, SharedSpeedEstimator, SpeedConfig,
    SpeedEstimator, SpeedPipeline, TrackState, TrackedDetection,
};

const ROAD: [[f64; 2]; 4] = [[1252.0, 787.0], [2298.0, 803.0], [5039.0, 2159.0], [-550.0, 2159.0]];

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// =============================================================================
// Test 1: Calibration round trip
// =============================================================================

#[test]
fn test_integration_corners_reproduce_target_rectangle() {
    init_logging();

    for &(w, l) in &[(25.0, 250.0), (7.0, 60.0), (2.5, 2.5), (100.0, 30.0)] {
        let calibration = RoadCalibration::new(ROAD, w, l).expect("valid calibration");
        let corners = DMatrix::from_fn(4, 2, |i, j| ROAD[i][j]);
        let world = calibration.project(&corners).unwrap();

        let expected = [[0.0, 0.0], [w - 1.0, 0.0], [w - 1.0, l - 1.0], [0.0, l - 1.0]];
        for (i, e) in expected.iter().enumerate() {
            assert_relative_eq!(world[(i, 0)], e[0], epsilon = 1e-6);
            assert_relative_eq!(world[(i, 1)], e[1], epsilon = 1e-6);
        }
    }
}

#[test]
fn test_integration_perspective_compresses_distance() {
    // Equal pixel steps cover more road near the top of the image (further away)
    let calibration = RoadCalibration::new(ROAD, 25.0, 250.0).unwrap();
    let far = calibration.project_point(Point2::new(1775.0, 800.0));
    let far_next = calibration.project_point(Point2::new(1775.0, 850.0));
    let near = calibration.project_point(Point2::new(1775.0, 2000.0));
    let near_next = calibration.project_point(Point2::new(1775.0, 2050.0));

    let far_step = (far_next - far).norm();
    let near_step = (near_next - near).norm();
    assert!(far_step > near_step, "far {} <= near {}", far_step, near_step);
}

#[test]
fn test_integration_transformation_trait_object() {
    let calibration = RoadCalibration::new(ROAD, 25.0, 250.0).unwrap();
    let transform: Box<dyn CoordinateTransformation> = Box::new(calibration.transformation().clone());

    let world = DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 24.0, 249.0]);
    let image = transform.world_to_image(&world);
    assert_relative_eq!(image[(0, 0)], 1252.0, epsilon = 1e-6);
    assert_relative_eq!(image[(0, 1)], 787.0, epsilon = 1e-6);
    assert_relative_eq!(image[(1, 0)], 5039.0, epsilon = 1e-6);
    assert_relative_eq!(image[(1, 1)], 2159.0, epsilon = 1e-6);
}

#[test]
fn test_integration_degenerate_corners_rejected() {
    let collinear = [[0.0, 100.0], [50.0, 100.0], [100.0, 100.0], [150.0, 100.0]];
    match RoadCalibration::new(collinear, 25.0, 250.0) {
        Err(Error::DegenerateGeometry(_)) => {}
        other => panic!("expected DegenerateGeometry, got {:?}", other),
    }
}

// =============================================================================
// Test 2: Projection feeding the estimator
// =============================================================================

#[test]
fn test_integration_projected_track_speed() {
    let calibration = RoadCalibration::new(ROAD, 25.0, 250.0).unwrap();
    let mut estimator = SpeedEstimator::new(30).unwrap();

    let mut world_track = Vec::new();
    let mut last = None;
    for frame in 0..45 {
        let image = Point2::new(1800.0 + frame as f64 * 4.0, 900.0 + frame as f64 * 20.0);
        let world = calibration.project_point(image);
        world_track.push(world);
        last = estimator.update(42, world);

        if frame == 0 {
            assert!(last.is_none());
        } else {
            assert!(last.unwrap() >= 0.0);
        }
    }

    // Steady state: 30 retained samples, distance between the first and last of them
    let oldest = world_track[45 - 30];
    let newest = world_track[44];
    let expected = (newest - oldest).norm() / 1.0 * 3.6;
    assert_relative_eq!(last.unwrap(), expected, epsilon = 1e-9);
    assert_eq!(estimator.state(&42), TrackState::SteadyState);
}

#[test]
fn test_integration_multi_identity_isolation() {
    let mut interleaved = SpeedEstimator::new(10).unwrap();
    let mut solo_a = SpeedEstimator::new(10).unwrap();
    let mut solo_b = SpeedEstimator::new(10).unwrap();

    for step in 0..25 {
        let a = Point2::new(0.0, step as f64 * 1.5);
        let b = Point2::new(step as f64 * 0.3, 100.0 - step as f64);

        let ia = interleaved.update(1, a);
        let ib = interleaved.update(2, b);
        assert_eq!(ia, solo_a.update(1, a));
        assert_eq!(ib, solo_b.update(2, b));
    }

    assert_eq!(interleaved.window(&1), solo_a.window(&1));
    assert_eq!(interleaved.window(&2), solo_b.window(&2));
}

#[test]
fn test_integration_shared_estimator_across_threads() {
    let calibration = Arc::new(RoadCalibration::new(ROAD, 25.0, 250.0).unwrap());
    let estimator = Arc::new(SharedSpeedEstimator::<i64>::new(15).unwrap());
    let reference = Arc::clone(&calibration);

    let handles: Vec<_> = (0..3i64)
        .map(|id| {
            let calibration = Arc::clone(&calibration);
            let estimator = Arc::clone(&estimator);
            thread::spawn(move || {
                let mut last = None;
                for frame in 0..20 {
                    let image = Point2::new(1500.0 + id as f64 * 400.0, 1000.0 + frame as f64 * 10.0);
                    last = estimator.update(&id, calibration.project_point(image));
                }
                last
            })
        })
        .collect();

    for (id, handle) in handles.into_iter().enumerate() {
        let speed = handle.join().unwrap().unwrap();

        let mut solo = SpeedEstimator::new(15).unwrap();
        let mut expected = None;
        for frame in 0..20 {
            let image = Point2::new(1500.0 + id as f64 * 400.0, 1000.0 + frame as f64 * 10.0);
            expected = solo.update(0, reference.project_point(image));
        }
        assert_relative_eq!(speed, expected.unwrap(), epsilon = 1e-9);
    }
}

// =============================================================================
// Test 3: Config-driven pipeline
// =============================================================================

#[test]
fn test_integration_config_pipeline() {
    init_logging();

    let config = SpeedConfig::from_toml_str(
        r#"
        road_polygon = [[1252.0, 787.0], [2298.0, 803.0], [5039.0, 2159.0], [-550.0, 2159.0]]
        road_width_m = 25.0
        road_length_m = 250.0
        fps = 30
        "#,
    )
    .unwrap();
    let mut pipeline: SpeedPipeline = config.pipeline().unwrap();

    let car = |frame: usize| {
        let y = 1200.0 + frame as f64 * 8.0;
        TrackedDetection::new([1700.0, y - 120.0, 1900.0, y], 11)
            .unwrap()
            .with_class(2)
            .with_confidence(0.8)
    };
    // Person class is filtered out, off-road truck is outside the zone
    let person = TrackedDetection::new([1790.0, 1100.0, 1810.0, 1200.0], 12).unwrap().with_class(0);
    let off_road = TrackedDetection::new([10.0, 100.0, 60.0, 140.0], 13).unwrap().with_class(7);

    let first = pipeline.process_frame(&[car(0), person.clone(), off_road.clone()]).unwrap();
    assert_eq!(first.vehicles.len(), 1);
    assert_eq!(first.labels(), vec!["ID 11".to_string()]);

    let mut last = first;
    for frame in 1..10 {
        last = pipeline.process_frame(&[car(frame), person.clone(), off_road.clone()]).unwrap();
    }

    assert_eq!(last.frame_index, 9);
    assert_eq!(last.vehicles_counted, 1);
    let speed = last.vehicles[0].speed_kph.expect("speed after warm-up");
    assert!(speed > 0.0);
    assert!(last.labels()[0].starts_with("ID 11 | "));

    // Projection of the bottom-center anchor matches the calibration directly
    let expected_world = pipeline
        .calibration()
        .project_point(car(9).anchor_point(Anchor::BottomCenter));
    assert_relative_eq!(last.vehicles[0].world_point.x, expected_world.x, epsilon = 1e-9);
    assert_relative_eq!(last.vehicles[0].world_point.y, expected_world.y, epsilon = 1e-9);
}

#[test]
fn test_integration_bad_config_halts_before_frames() {
    let config = SpeedConfig::from_toml_str(
        r#"
        road_polygon = [[0.0, 0.0], [10.0, 10.0], [20.0, 20.0], [30.0, 30.0]]
        "#,
    )
    .unwrap();

    assert!(matches!(config.pipeline(), Err(Error::DegenerateGeometry(_))));
}
