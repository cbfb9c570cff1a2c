//! Landmark measurement model
//!
//! Observations are range-limited detections of known landmarks expressed in the vehicle body
//! frame. For a candidate pose each observation is transformed into the map frame, associated
//! with the nearest map landmark inside the sensor range (hard nearest-neighbour, independently
//! per observation) and scored with an axis-independent bivariate Gaussian:
//!
//! $$
//! p(x, y) = \frac{1}{2\pi\sigma_x\sigma_y}
//!     \exp\left(-\left(\frac{(x - \mu_x)^2}{2\sigma_x^2} + \frac{(y - \mu_y)^2}{2\sigma_y^2}\right)\right)
//! $$
//!
//! The likelihood of a batch is the product of the per-observation densities. An observation with
//! no landmark in range zeroes the whole product.
use std::f64::consts::PI;

use crate::{LandmarkObservation, Map, MapLandmark, transform_to_map};

/// Standard deviations of a landmark detection along the map x and y axes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeasurementNoise {
    pub std_x: f64,
    pub std_y: f64,
}
impl MeasurementNoise {
    pub fn new(std_x: f64, std_y: f64) -> Self {
        MeasurementNoise { std_x, std_y }
    }
    /// Peak value of the density, $1 / (2\pi\sigma_x\sigma_y)$.
    pub fn normalizer(&self) -> f64 {
        1.0 / (2.0 * PI * self.std_x * self.std_y)
    }
}
impl From<[f64; 2]> for MeasurementNoise {
    fn from(std: [f64; 2]) -> Self {
        MeasurementNoise::new(std[0], std[1])
    }
}

/// One observation matched to a map landmark.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Association {
    /// Identifier of the associated map landmark
    pub landmark_id: u32,
    /// Map-frame x of the transformed observation
    pub sense_x: f64,
    /// Map-frame y of the transformed observation
    pub sense_y: f64,
}

/// Axis-independent bivariate normal density evaluated at the offset `(dx, dy)`.
pub fn bivariate_normal_pdf(dx: f64, dy: f64, noise: &MeasurementNoise) -> f64 {
    let exponent = dx * dx / (2.0 * noise.std_x * noise.std_x)
        + dy * dy / (2.0 * noise.std_y * noise.std_y);
    noise.normalizer() * (-exponent).exp()
}

/// Find the landmark nearest to a map-frame point.
///
/// Only landmarks strictly closer than `sensor_range` are considered. When several landmarks are
/// at exactly the same distance the first one in map order is kept.
///
/// # Returns
/// * `Some(landmark)` for the nearest in-range landmark, `None` if nothing is in range.
pub fn nearest_landmark(map: &Map, x: f64, y: f64, sensor_range: f64) -> Option<&MapLandmark> {
    let mut best_distance = sensor_range;
    let mut best = None;
    for landmark in map.landmarks() {
        let distance = (landmark.x - x).hypot(landmark.y - y);
        if distance < best_distance {
            best_distance = distance;
            best = Some(landmark);
        }
    }
    best
}

/// Likelihood of a batch of observations seen from a pose.
///
/// # Arguments
/// * `x`, `y`, `theta` - Candidate pose.
/// * `observations` - Body-frame observations.
/// * `map` - Known landmarks.
/// * `sensor_range` - Association cutoff (m).
/// * `noise` - Measurement noise.
///
/// # Returns
/// * The product of the per-observation densities; `1.0` for an empty batch, exactly `0.0` if any
///   observation has no landmark within `sensor_range`. The product saturates at `f64::MAX`
///   instead of overflowing to infinity.
pub fn observation_weight(
    x: f64,
    y: f64,
    theta: f64,
    observations: &[LandmarkObservation],
    map: &Map,
    sensor_range: f64,
    noise: &MeasurementNoise,
) -> f64 {
    let mut weight = 1.0;
    for observation in observations {
        let (x_map, y_map) = transform_to_map(x, y, theta, observation);
        match nearest_landmark(map, x_map, y_map, sensor_range) {
            Some(landmark) => {
                let density = bivariate_normal_pdf(x_map - landmark.x, y_map - landmark.y, noise);
                weight = (weight * density.min(f64::MAX)).min(f64::MAX);
            }
            None => return 0.0,
        }
    }
    weight
}

/// Associate every observation seen from a pose with its nearest in-range landmark.
///
/// Observations with no landmark in range are left out, so the result may be shorter than the
/// input.
pub fn associate(
    x: f64,
    y: f64,
    theta: f64,
    observations: &[LandmarkObservation],
    map: &Map,
    sensor_range: f64,
) -> Vec<Association> {
    observations
        .iter()
        .filter_map(|observation| {
            let (sense_x, sense_y) = transform_to_map(x, y, theta, observation);
            nearest_landmark(map, sense_x, sense_y, sensor_range).map(|landmark| Association {
                landmark_id: landmark.id,
                sense_x,
                sense_y,
            })
        })
        .collect()
}
