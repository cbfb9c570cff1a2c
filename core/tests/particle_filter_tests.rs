//! Integration tests for the landmark particle filter
//!
//! These exercise the public filter API end to end: population invariants across full
//! predict/update/resample cycles, the motion model branches, the measurement likelihood and the
//! statistical behaviour of resampling.

use assert_approx_eq::assert_approx_eq;
use std::f64::consts::PI;

use localization::diagnostics::{SenseAxis, get_associations, get_sense_coord};
use localization::motion::propagate;
use localization::{
    FilterError, LandmarkObservation, Map, MapLandmark, ParticleFilter, ResampleOutcome,
};

fn grid_map() -> Map {
    let mut id = 0;
    let mut landmarks = Vec::new();
    for i in -2..=2 {
        for j in -2..=2 {
            id += 1;
            landmarks.push(MapLandmark::new(id, 10.0 * i as f64, 10.0 * j as f64));
        }
    }
    Map::new(landmarks)
}

/// Noiseless observations of every landmark within range, as seen from a true pose
fn observe(x: f64, y: f64, theta: f64, map: &Map, range: f64) -> Vec<LandmarkObservation> {
    map.landmarks()
        .iter()
        .filter(|l| (l.x - x).hypot(l.y - y) <= range)
        .map(|l| {
            let (dx, dy) = (l.x - x, l.y - y);
            LandmarkObservation::new(
                theta.cos() * dx + theta.sin() * dy,
                -theta.sin() * dx + theta.cos() * dy,
            )
        })
        .collect()
}

#[test]
fn particle_count_is_constant_over_cycles() {
    let map = grid_map();
    let mut pf = ParticleFilter::new_with_seed(37, 2024);
    pf.init(0.0, 0.0, 0.0, [0.5, 0.5, 0.05]).unwrap();
    let (mut x, mut y, mut theta) = (0.0, 0.0, 0.0);
    for _ in 0..40 {
        (x, y, theta) = propagate(x, y, theta, 0.1, 3.0, 0.3);
        pf.prediction(0.1, [0.1, 0.1, 0.01], 3.0, 0.3).unwrap();
        assert_eq!(pf.particles().len(), 37);
        pf.update_weights(25.0, [0.3, 0.3], &observe(x, y, theta, &map, 25.0), &map)
            .unwrap();
        assert_eq!(pf.particles().len(), 37);
        assert_eq!(pf.weights().len(), 37);
        assert!(pf.weights().iter().all(|w| *w >= 0.0));
        pf.resample().unwrap();
        assert_eq!(pf.particles().len(), 37);
        assert_eq!(pf.num_particles(), 37);
    }
}

#[test]
fn straight_motion_equivalence() {
    let mut pf = ParticleFilter::new_with_seed(30, 5);
    pf.init(2.0, -1.0, 0.0, [1.0, 1.0, PI]).unwrap();
    let before = pf.particles().to_vec();
    pf.prediction(0.7, [0.0, 0.0, 0.0], 3.0, 0.0).unwrap();
    for (old, new) in before.iter().zip(pf.particles()) {
        assert_approx_eq!(new.x - old.x, 2.1 * old.theta.cos(), 1e-12);
        assert_approx_eq!(new.y - old.y, 2.1 * old.theta.sin(), 1e-12);
        assert_eq!(new.theta, old.theta);
    }
}

#[test]
fn turning_motion_equivalence() {
    let (dt, v, w) = (0.4, 6.0, 0.8);
    let mut pf = ParticleFilter::new_with_seed(30, 6);
    pf.init(0.0, 0.0, 0.0, [3.0, 3.0, PI]).unwrap();
    let before = pf.particles().to_vec();
    pf.prediction(dt, [0.0, 0.0, 0.0], v, w).unwrap();
    for (old, new) in before.iter().zip(pf.particles()) {
        let expected_x = old.x + v / w * ((old.theta + w * dt).sin() - old.theta.sin());
        let expected_y = old.y + v / w * (-(old.theta + w * dt).cos() + old.theta.cos());
        assert_approx_eq!(new.x, expected_x, 1e-9);
        assert_approx_eq!(new.y, expected_y, 1e-9);
        assert_approx_eq!(new.theta, old.theta + w * dt, 1e-9);
    }
}

#[test]
fn turning_branch_converges_to_straight_line() {
    // 1e-4 sits below the branch threshold, so compare the closed-form arc directly as well
    let (x, y, theta, dt, v) = (1.0, 2.0, 0.7, 1.0, 10.0);
    let straight = propagate(x, y, theta, dt, v, 0.0);
    let w = 1e-4;
    let arc_x = x + v / w * ((theta + w * dt).sin() - theta.sin());
    let arc_y = y + v / w * (-(theta + w * dt).cos() + theta.cos());
    assert_approx_eq!(arc_x, straight.0, 1e-2);
    assert_approx_eq!(arc_y, straight.1, 1e-2);

    let near_threshold = propagate(x, y, theta, dt, v, 1.1e-3);
    assert_approx_eq!(near_threshold.0, straight.0, 1e-1);
    assert_approx_eq!(near_threshold.1, straight.1, 1e-1);
    let tiny = propagate(x, y, theta, dt, v, w);
    assert_eq!(tiny.0, straight.0);
    assert_eq!(tiny.1, straight.1);
}

#[test]
fn coincident_observation_gives_peak_density() {
    let map = Map::new(vec![MapLandmark::new(1, 3.0, 4.0)]);
    let mut pf = ParticleFilter::new_with_seed(5, 1);
    pf.init(3.0, 2.0, PI / 2.0, [0.0, 0.0, 0.0]).unwrap();
    // facing +y, a landmark 2 m ahead
    let observations = [LandmarkObservation::new(2.0, 0.0)];
    pf.update_weights(10.0, [0.2, 0.5], &observations, &map).unwrap();
    for w in pf.weights() {
        assert_approx_eq!(*w, 1.0 / (2.0 * PI * 0.2 * 0.5), 1e-9);
    }
}

#[test]
fn out_of_range_observation_eliminates_particle() {
    let map = Map::new(vec![MapLandmark::new(1, 0.0, 0.0)]);
    let mut pf = ParticleFilter::new_with_seed(8, 1);
    pf.init(0.0, 0.0, 0.0, [0.0, 0.0, 0.0]).unwrap();
    let observations = [LandmarkObservation::new(0.0, 0.0), LandmarkObservation::new(60.0, 0.0)];
    pf.update_weights(50.0, [0.3, 0.3], &observations, &map).unwrap();
    assert!(pf.weights().iter().all(|w| *w == 0.0));
    assert!(pf.particles().iter().all(|p| p.weight == 0.0));
}

#[test]
fn empty_observation_batch_resets_weights_to_one() {
    let map = grid_map();
    let mut pf = ParticleFilter::new_with_seed(12, 3);
    pf.init(0.0, 0.0, 0.0, [1.0, 1.0, 0.1]).unwrap();
    pf.update_weights(25.0, [0.3, 0.3], &observe(0.0, 0.0, 0.0, &map, 25.0), &map)
        .unwrap();
    assert!(pf.weights().iter().any(|w| *w != 1.0));
    pf.update_weights(25.0, [0.3, 0.3], &[], &map).unwrap();
    assert!(pf.weights().iter().all(|w| *w == 1.0));
}

#[test]
fn resampling_frequency_tracks_normalized_weight() {
    let n = 1000;
    let dominant = 0;
    let mut weights = vec![1.0; n];
    weights[dominant] = 1000.0;
    let expected = 1000.0 / (1000.0 + (n as f64 - 1.0));

    let mut pf = ParticleFilter::new_with_seed(n, 77);
    let trials = 20;
    let mut total_fraction = 0.0;
    for _ in 0..trials {
        pf.init(0.0, 0.0, 0.0, [1.0, 1.0, 0.1]).unwrap();
        pf.set_weights(&weights).unwrap();
        assert_eq!(pf.resample().unwrap(), ResampleOutcome::Weighted);
        let hits = pf.particles().iter().filter(|p| p.id == dominant).count();
        let fraction = hits as f64 / n as f64;
        // per-trial standard deviation is about 0.016
        assert!((fraction - expected).abs() < 0.08, "fraction {fraction}");
        total_fraction += fraction;
    }
    assert_approx_eq!(total_fraction / trials as f64, expected, 0.02);
}

#[test]
fn resampled_copies_share_pose_with_source() {
    let mut pf = ParticleFilter::new_with_seed(50, 8);
    pf.init(0.0, 0.0, 0.0, [5.0, 5.0, 1.0]).unwrap();
    let originals = pf.particles().to_vec();
    pf.resample().unwrap();
    for particle in pf.particles() {
        let source = &originals[particle.id];
        assert_eq!((particle.x, particle.y, particle.theta), (source.x, source.y, source.theta));
    }
}

#[test]
fn degenerate_weights_recover_through_uniform_fallback() {
    let map = Map::new(vec![MapLandmark::new(1, 0.0, 0.0)]);
    let mut pf = ParticleFilter::new_with_seed(16, 12);
    pf.init(0.0, 0.0, 0.0, [1.0, 1.0, 0.1]).unwrap();
    pf.update_weights(1.0, [0.3, 0.3], &[LandmarkObservation::new(500.0, 0.0)], &map)
        .unwrap();
    assert_eq!(pf.effective_sample_size(), 0.0);
    assert_eq!(pf.resample().unwrap(), ResampleOutcome::UniformFallback);
    assert_eq!(pf.particles().len(), 16);
    assert_approx_eq!(pf.effective_sample_size(), 16.0, 1e-9);
    // the next cycle proceeds normally
    pf.update_weights(1.0, [0.3, 0.3], &[], &map).unwrap();
    assert_eq!(pf.resample().unwrap(), ResampleOutcome::Weighted);
}

#[test]
fn end_to_end_single_landmark_scenario() {
    let mut pf = ParticleFilter::new_with_seed(20, 0);
    pf.init(0.0, 0.0, 0.0, [0.0, 0.0, 0.0]).unwrap();
    assert!(pf.particles().iter().all(|p| (p.x, p.y, p.theta) == (0.0, 0.0, 0.0)));

    pf.prediction(1.0, [0.0, 0.0, 0.0], 1.0, 0.0).unwrap();
    for particle in pf.particles() {
        assert_approx_eq!(particle.x, 1.0, 1e-12);
        assert_approx_eq!(particle.y, 0.0, 1e-12);
        assert_approx_eq!(particle.theta, 0.0, 1e-12);
    }

    let map = Map::new(vec![MapLandmark::new(1, 1.0, 0.0)]);
    let observations = [LandmarkObservation::new(0.0, 0.0)];
    pf.update_weights(50.0, [0.3, 0.3], &observations, &map).unwrap();
    for w in pf.weights() {
        assert_approx_eq!(*w, 1.0 / (2.0 * PI * 0.09), 1e-9);
    }

    let best = pf.associate_best(50.0, &observations, &map).unwrap();
    assert_eq!(get_associations(best), "1");
    assert_eq!(get_sense_coord(best, SenseAxis::X), "1");
    assert_eq!(get_sense_coord(best, SenseAxis::Y), "0");

    assert_eq!(pf.resample().unwrap(), ResampleOutcome::Weighted);
    assert_eq!(pf.particles().len(), 20);
}

#[test]
fn localizes_from_a_poor_prior() {
    let map = grid_map();
    let mut pf = ParticleFilter::new_with_seed(500, 31);
    let (mut x, mut y, mut theta) = (-5.0, -5.0, 0.3);
    pf.init(x + 1.0, y - 1.0, theta, [2.0, 2.0, 0.1]).unwrap();
    for _ in 0..30 {
        (x, y, theta) = propagate(x, y, theta, 0.1, 2.0, 0.2);
        pf.prediction(0.1, [0.05, 0.05, 0.005], 2.0, 0.2).unwrap();
        pf.update_weights(20.0, [0.3, 0.3], &observe(x, y, theta, &map, 20.0), &map)
            .unwrap();
        pf.resample().unwrap();
    }
    let estimate = pf.get_estimate();
    assert!((estimate[0] - x).hypot(estimate[1] - y) < 1.0);
}

#[test]
fn contract_violations_leave_state_untouched() {
    let map = grid_map();
    let mut pf = ParticleFilter::new_with_seed(10, 4);
    assert!(matches!(pf.resample(), Err(FilterError::NotInitialized)));
    pf.init(0.0, 0.0, 0.0, [1.0, 1.0, 0.1]).unwrap();
    let particles = pf.particles().to_vec();
    let weights = pf.weights().to_vec();
    assert!(pf.prediction(f64::NAN, [0.1; 3], 1.0, 0.0).is_err());
    assert!(pf.update_weights(-1.0, [0.3, 0.3], &[], &map).is_err());
    assert!(pf.update_weights(10.0, [0.3, -0.3], &[], &map).is_err());
    assert!(pf.init(0.0, 0.0, 0.0, [f64::INFINITY, 1.0, 0.1]).is_err());
    assert_eq!(pf.particles(), &particles[..]);
    assert_eq!(pf.weights(), &weights[..]);
}
