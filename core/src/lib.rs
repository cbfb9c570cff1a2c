//! Landmark-based particle filter localization
//!
//! This crate implements a sampling-importance-resampling (SIR) particle filter for estimating the
//! planar pose of a vehicle from noisy motion commands and noisy observations of known landmarks.
//! The filter maintains a fixed-size population of weighted pose hypotheses ("particles") whose
//! weighted distribution approximates the posterior over the vehicle's pose.
//!
//! # The SIR cycle
//!
//! A filter run consists of a single initialization followed by a repeated three-stage cycle:
//!
//! 1. **Initialize** ([`particle::ParticleFilter::init`]): draw every particle from a Gaussian prior
//!    centred on an initial pose estimate (typically a GPS fix).
//! 2. **Predict** ([`particle::ParticleFilter::prediction`]): propagate every particle through the
//!    constant-turn-rate and velocity motion model and perturb it with process noise.
//! 3. **Update** ([`particle::ParticleFilter::update_weights`]): transform the body-frame
//!    observations into the map frame of each particle, associate each one with its nearest
//!    landmark and weight the particle by the bivariate Gaussian likelihood of the residuals.
//! 4. **Resample** ([`particle::ParticleFilter::resample`]): draw a new population with replacement,
//!    proportional to the weights.
//!
//! # Coordinate conventions
//!
//! Map coordinates are a fixed Cartesian frame in which the [`Map`] landmarks are expressed. The
//! vehicle heading $\theta$ is measured counter-clockwise from the map x-axis in radians.
//! Observations are given in the vehicle body frame, x forward and y to the left. An observation
//! $(x_o, y_o)$ seen from a particle at $(x_p, y_p, \theta)$ lies at
//!
//! $$
//! \begin{bmatrix} x_m \\\\ y_m \end{bmatrix} =
//! \begin{bmatrix} \cos\theta & -\sin\theta \\\\ \sin\theta & \cos\theta \end{bmatrix}
//! \begin{bmatrix} x_o \\\\ y_o \end{bmatrix} +
//! \begin{bmatrix} x_p \\\\ y_p \end{bmatrix}
//! $$
//!
//! in the map frame.
//!
//! Reading recorded maps or sensor logs and transporting poses to a display are left to the
//! caller. The [`sim`] module provides a synthetic scenario that plays those roles in memory.
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod measurements;
pub mod motion;
pub mod particle;
pub mod sim;

use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

pub use crate::error::{FilterError, Result};
pub use crate::particle::{Particle, ParticleFilter, ResampleOutcome};

/// A single landmark detection in the vehicle body frame.
///
/// The identifier is unset for raw detections; association with a map landmark happens inside the
/// filter update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkObservation {
    /// Identifier of the detected landmark, if known
    pub id: Option<u32>,
    /// Forward offset from the vehicle (m)
    pub x: f64,
    /// Leftward offset from the vehicle (m)
    pub y: f64,
}
impl LandmarkObservation {
    /// Create a raw (unassociated) observation from a body-frame offset.
    pub fn new(x: f64, y: f64) -> Self {
        LandmarkObservation { id: None, x, y }
    }
}
impl Display for LandmarkObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "Observation #{id} ({:.3}, {:.3})", self.x, self.y),
            None => write!(f, "Observation ({:.3}, {:.3})", self.x, self.y),
        }
    }
}

/// A static, known landmark in map coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapLandmark {
    /// Landmark identifier
    pub id: u32,
    /// Map-frame x position (m)
    pub x: f64,
    /// Map-frame y position (m)
    pub y: f64,
}
impl MapLandmark {
    pub fn new(id: u32, x: f64, y: f64) -> Self {
        MapLandmark { id, x, y }
    }
}

/// Ordered collection of known landmarks.
///
/// The map is owned by the caller and only ever borrowed by the filter. Landmark order matters:
/// when two landmarks are exactly equidistant from an observation the first one wins.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Map {
    pub landmarks: Vec<MapLandmark>,
}
impl Map {
    pub fn new(landmarks: Vec<MapLandmark>) -> Self {
        Map { landmarks }
    }
    pub fn landmarks(&self) -> &[MapLandmark] {
        &self.landmarks
    }
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}
impl FromIterator<MapLandmark> for Map {
    fn from_iter<I: IntoIterator<Item = MapLandmark>>(iter: I) -> Self {
        Map::new(iter.into_iter().collect())
    }
}

/// Transform a body-frame observation into the map frame of a pose.
///
/// # Arguments
/// * `x`, `y`, `theta` - Pose of the observer in the map frame.
/// * `observation` - The body-frame observation.
///
/// # Returns
/// * The `(x, y)` map-frame coordinates of the observation.
///
/// # Example
/// ```rust
/// use localization::{LandmarkObservation, transform_to_map};
///
/// let (x, y) = transform_to_map(1.0, 2.0, std::f64::consts::FRAC_PI_2, &LandmarkObservation::new(1.0, 0.0));
/// assert!((x - 1.0).abs() < 1e-12);
/// assert!((y - 3.0).abs() < 1e-12);
/// ```
pub fn transform_to_map(x: f64, y: f64, theta: f64, observation: &LandmarkObservation) -> (f64, f64) {
    let rotated = Rotation2::new(theta) * Vector2::new(observation.x, observation.y);
    (rotated.x + x, rotated.y + y)
}

/// Wrap an angle in radians to the interval (-pi, pi].
pub fn wrap_to_pi(angle: f64) -> f64 {
    use std::f64::consts::PI;
    let mut wrapped = angle % (2.0 * PI);
    if wrapped > PI {
        wrapped -= 2.0 * PI;
    } else if wrapped <= -PI {
        wrapped += 2.0 * PI;
    }
    wrapped
}
