//! Sampling-importance-resampling particle filter for planar landmark localization.
//!
//! The [`ParticleFilter`] owns a fixed-size population of [`Particle`]s, an index-aligned mirror of
//! their weights and a single seeded random number generator that is reused by every stochastic
//! stage for the lifetime of the filter. The canonical per-tick call sequence is
//! [`ParticleFilter::prediction`], [`ParticleFilter::update_weights`], [`ParticleFilter::resample`].
//!
//! Weights are never normalized in place. They are the raw products of measurement densities and
//! the resampling distribution normalizes them implicitly.
//!
//! Resampling divides the weights by their maximum first, so very large weights keep their
//! proportions even when their sum would overflow. If every weight is zero when
//! [`ParticleFilter::resample`] is called, the filter falls back to resampling uniformly with
//! replacement and resets the weights of the drawn copies to `1.0`; the returned
//! [`ResampleOutcome::UniformFallback`] reports that this happened.
use log::{debug, warn};
use nalgebra::{Matrix3, Vector3};
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};

use crate::config::FilterConfig;
use crate::error::{FilterError, Result, ensure_finite, ensure_non_negative, ensure_positive};
use crate::measurements::{MeasurementNoise, associate, observation_weight};
use crate::motion::propagate;
use crate::{LandmarkObservation, Map, wrap_to_pi};

/// Default population size.
pub const DEFAULT_NUM_PARTICLES: usize = 20;

/// One pose hypothesis.
///
/// `associations`, `sense_x` and `sense_y` are parallel diagnostic sequences. They are only filled
/// for particles selected for display (see [`ParticleFilter::associate_best`]).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Particle {
    /// Identifier assigned at initialization. Resampled copies keep their source's id.
    pub id: usize,
    /// Map-frame x position (m)
    pub x: f64,
    /// Map-frame y position (m)
    pub y: f64,
    /// Heading (rad)
    pub theta: f64,
    /// Unnormalized importance weight
    pub weight: f64,
    /// Identifiers of the landmarks associated with each observation
    pub associations: Vec<u32>,
    /// Map-frame x of each associated observation
    pub sense_x: Vec<f64>,
    /// Map-frame y of each associated observation
    pub sense_y: Vec<f64>,
}
impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("id", &self.id)
            .field("x", &self.x)
            .field("y", &self.y)
            .field("theta", &self.theta)
            .field("weight", &self.weight)
            .finish()
    }
}
impl Particle {
    pub fn new(id: usize, x: f64, y: f64, theta: f64, weight: f64) -> Particle {
        Particle {
            id,
            x,
            y,
            theta,
            weight,
            ..Default::default()
        }
    }
    /// Pose as an `[x, y, theta]` vector.
    pub fn pose(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.theta)
    }
    /// Replace the diagnostic association data.
    ///
    /// # Arguments
    /// * `associations` - Landmark identifiers.
    /// * `sense_x`, `sense_y` - Map-frame coordinates of each associated observation.
    ///
    /// # Errors
    /// * `InvalidArgument` if the three sequences differ in length.
    pub fn set_associations(
        &mut self,
        associations: Vec<u32>,
        sense_x: Vec<f64>,
        sense_y: Vec<f64>,
    ) -> Result<()> {
        if sense_x.len() != associations.len() || sense_y.len() != associations.len() {
            return Err(FilterError::InvalidArgument {
                name: "associations",
                value: associations.len() as f64,
                reason: "association ids and sense coordinates must have equal lengths",
            });
        }
        self.associations = associations;
        self.sense_x = sense_x;
        self.sense_y = sense_y;
        Ok(())
    }
    /// Drop any diagnostic association data.
    pub fn clear_associations(&mut self) {
        self.associations.clear();
        self.sense_x.clear();
        self.sense_y.clear();
    }
}

/// How [`ParticleFilter::get_estimate`] collapses the population into one pose.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticleAveragingStrategy {
    /// Weight-normalized mean; heading is averaged on the unit circle.
    #[default]
    WeightedMean,
    /// Pose of the single highest-weight particle.
    HighestWeight,
}

/// Which distribution [`ParticleFilter::resample`] drew from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResampleOutcome {
    /// Categorical draw proportional to the weights.
    Weighted,
    /// All weights were zero; drew uniformly instead.
    UniformFallback,
}

pub struct ParticleFilter {
    num_particles: usize,
    particles: Vec<Particle>,
    weights: Vec<f64>,
    is_initialized: bool,
    averaging_strategy: ParticleAveragingStrategy,
    rng: StdRng,
}
impl Debug for ParticleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min_weight = self.weights.iter().copied().fold(f64::INFINITY, f64::min);
        let max_weight = self.weights.iter().copied().fold(0.0, f64::max);
        let mut s = f.debug_struct("ParticleFilter");
        s.field("num_particles", &self.num_particles)
            .field("initialized", &self.is_initialized)
            .field("effective_particles", &self.effective_sample_size())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            );
        if self.is_initialized {
            let mean = self.get_estimate();
            s.field(
                "mean_pose",
                &format_args!("({:.3} m, {:.3} m, {:.4} rad)", mean[0], mean[1], mean[2]),
            );
        }
        s.finish()
    }
}
impl ParticleFilter {
    /// Create an uninitialized filter seeded from system entropy.
    ///
    /// # Arguments
    /// * `num_particles` - Fixed population size for the filter's lifetime.
    pub fn new(num_particles: usize) -> Self {
        Self::new_with_seed(num_particles, rand::random())
    }

    /// Create an uninitialized filter with a specific random seed.
    ///
    /// Two filters built with the same seed and driven with the same inputs produce identical
    /// populations, which is what reproducible tests rely on.
    ///
    /// # Example
    /// ```rust
    /// use localization::ParticleFilter;
    ///
    /// let mut pf = ParticleFilter::new_with_seed(100, 42);
    /// assert!(!pf.initialized());
    /// pf.init(0.0, 0.0, 0.0, [0.3, 0.3, 0.01]).unwrap();
    /// assert_eq!(pf.particles().len(), 100);
    /// ```
    pub fn new_with_seed(num_particles: usize, seed: u64) -> Self {
        assert!(num_particles > 0, "Number of particles must be positive");
        ParticleFilter {
            num_particles,
            particles: Vec::with_capacity(num_particles),
            weights: Vec::with_capacity(num_particles),
            is_initialized: false,
            averaging_strategy: ParticleAveragingStrategy::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create an uninitialized filter from a validated configuration.
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        config.validate()?;
        let mut filter = match config.seed {
            Some(seed) => Self::new_with_seed(config.num_particles, seed),
            None => Self::new(config.num_particles),
        };
        filter.averaging_strategy = config.averaging;
        Ok(filter)
    }

    /// Draw the initial population around a pose estimate.
    ///
    /// Each particle's `x`, `y` and `theta` are sampled independently from normal distributions
    /// centred on the given pose. All weights start at `1.0`. Calling `init` again discards the
    /// previous population.
    ///
    /// # Arguments
    /// * `x`, `y`, `theta` - Initial pose estimate (m, m, rad).
    /// * `std` - Standard deviations of the prior for `[x, y, theta]`. Zero is allowed.
    ///
    /// # Errors
    /// * `InvalidArgument` for a non-finite pose or a negative / non-finite deviation.
    pub fn init(&mut self, x: f64, y: f64, theta: f64, std: [f64; 3]) -> Result<()> {
        ensure_finite("x", x)?;
        ensure_finite("y", y)?;
        ensure_finite("theta", theta)?;
        ensure_non_negative("std_x", std[0])?;
        ensure_non_negative("std_y", std[1])?;
        ensure_non_negative("std_theta", std[2])?;

        let dist_x = gaussian(x, std[0])?;
        let dist_y = gaussian(y, std[1])?;
        let dist_theta = gaussian(theta, std[2])?;

        self.particles.clear();
        self.weights.clear();
        for id in 0..self.num_particles {
            let particle = Particle::new(
                id,
                dist_x.sample(&mut self.rng),
                dist_y.sample(&mut self.rng),
                dist_theta.sample(&mut self.rng),
                1.0,
            );
            self.weights.push(particle.weight);
            self.particles.push(particle);
        }
        self.is_initialized = true;
        debug!(
            "Initialized {} particles around ({:.3}, {:.3}, {:.4})",
            self.num_particles, x, y, theta
        );
        Ok(())
    }

    /// Whether [`init`](Self::init) has been called.
    pub fn initialized(&self) -> bool {
        self.is_initialized
    }

    /// Motion update: propagate every particle and add process noise.
    ///
    /// Each particle is moved through [`propagate`] and then perturbed with independent
    /// zero-mean Gaussian noise on `x`, `y` and `theta`.
    ///
    /// # Arguments
    /// * `delta_t` - Time since the last prediction (s), strictly positive.
    /// * `std_pos` - Process noise standard deviations for `[x, y, theta]`. Zero is allowed.
    /// * `velocity` - Linear velocity (m/s).
    /// * `yaw_rate` - Yaw rate (rad/s).
    ///
    /// # Errors
    /// * `NotInitialized` before [`init`](Self::init).
    /// * `InvalidArgument` for a non-positive `delta_t`, negative deviations or non-finite
    ///   controls.
    pub fn prediction(
        &mut self,
        delta_t: f64,
        std_pos: [f64; 3],
        velocity: f64,
        yaw_rate: f64,
    ) -> Result<()> {
        self.ensure_initialized()?;
        ensure_positive("delta_t", delta_t)?;
        ensure_non_negative("std_x", std_pos[0])?;
        ensure_non_negative("std_y", std_pos[1])?;
        ensure_non_negative("std_theta", std_pos[2])?;
        ensure_finite("velocity", velocity)?;
        ensure_finite("yaw_rate", yaw_rate)?;

        let noise_x = gaussian(0.0, std_pos[0])?;
        let noise_y = gaussian(0.0, std_pos[1])?;
        let noise_theta = gaussian(0.0, std_pos[2])?;

        for particle in &mut self.particles {
            let (x, y, theta) = propagate(
                particle.x,
                particle.y,
                particle.theta,
                delta_t,
                velocity,
                yaw_rate,
            );
            particle.x = x + noise_x.sample(&mut self.rng);
            particle.y = y + noise_y.sample(&mut self.rng);
            particle.theta = theta + noise_theta.sample(&mut self.rng);
        }
        Ok(())
    }

    /// Measurement update: reweight every particle by the likelihood of the observations.
    ///
    /// For each particle the observations are transformed into its map frame, associated with the
    /// nearest landmark closer than `sensor_range` and scored with a bivariate Gaussian (see
    /// [`crate::measurements`]). The weight is replaced (not multiplied) by the product of those
    /// densities. A particle for which any observation finds no landmark in range gets weight
    /// exactly `0.0`; an empty batch gives every particle weight `1.0`. Weights are not
    /// normalized.
    ///
    /// # Arguments
    /// * `sensor_range` - Association cutoff (m), strictly positive.
    /// * `std_landmark` - Measurement noise standard deviations `[x, y]`, strictly positive.
    /// * `observations` - Body-frame observations for this tick.
    /// * `map` - Known landmarks.
    ///
    /// # Errors
    /// * `NotInitialized` before [`init`](Self::init).
    /// * `InvalidArgument` for a non-positive range or deviation.
    pub fn update_weights(
        &mut self,
        sensor_range: f64,
        std_landmark: [f64; 2],
        observations: &[LandmarkObservation],
        map: &Map,
    ) -> Result<()> {
        self.ensure_initialized()?;
        ensure_positive("sensor_range", sensor_range)?;
        ensure_positive("std_landmark_x", std_landmark[0])?;
        ensure_positive("std_landmark_y", std_landmark[1])?;

        let noise = MeasurementNoise::from(std_landmark);
        self.weights.clear();
        for particle in &mut self.particles {
            particle.weight = observation_weight(
                particle.x,
                particle.y,
                particle.theta,
                observations,
                map,
                sensor_range,
                &noise,
            );
            self.weights.push(particle.weight);
        }
        debug!(
            "Updated weights from {} observations against {} landmarks; {} of {} particles eliminated",
            observations.len(),
            map.len(),
            self.weights.iter().filter(|w| **w == 0.0).count(),
            self.num_particles
        );
        Ok(())
    }

    /// Importance resampling.
    ///
    /// Draws `num_particles` indices with replacement from a categorical distribution whose
    /// probabilities are proportional to the current weights, and replaces the population with
    /// copies of the drawn particles. Copies keep their source's id and weight. Infinite weights
    /// share the probability mass equally among themselves.
    ///
    /// If every weight is zero the draw is uniform instead and every copy's weight is reset to
    /// `1.0`.
    ///
    /// # Errors
    /// * `NotInitialized` before [`init`](Self::init).
    pub fn resample(&mut self) -> Result<ResampleOutcome> {
        self.ensure_initialized()?;

        let (resampled, outcome) = if let Some(scaled) = self.scaled_weights() {
            let distribution = WeightedIndex::new(&scaled)?;
            let resampled: Vec<Particle> = (0..self.num_particles)
                .map(|_| self.particles[distribution.sample(&mut self.rng)].clone())
                .collect();
            (resampled, ResampleOutcome::Weighted)
        } else {
            warn!(
                "All {} particle weights are zero; resampling uniformly",
                self.num_particles
            );
            let resampled: Vec<Particle> = (0..self.num_particles)
                .map(|_| {
                    let mut particle =
                        self.particles[self.rng.random_range(0..self.num_particles)].clone();
                    particle.weight = 1.0;
                    particle
                })
                .collect();
            (resampled, ResampleOutcome::UniformFallback)
        };

        self.weights = resampled.iter().map(|p| p.weight).collect();
        self.particles = resampled;
        Ok(outcome)
    }

    /// Fill the diagnostic association fields of the current best particle.
    ///
    /// Only the highest-weight particle is annotated; any stale annotations on other particles are
    /// cleared. Observations with no landmark within `sensor_range` are omitted.
    ///
    /// # Returns
    /// * The annotated particle.
    pub fn associate_best(
        &mut self,
        sensor_range: f64,
        observations: &[LandmarkObservation],
        map: &Map,
    ) -> Result<&Particle> {
        self.ensure_initialized()?;
        ensure_positive("sensor_range", sensor_range)?;
        let best = self.best_index();
        for particle in &mut self.particles {
            particle.clear_associations();
        }
        let particle = &mut self.particles[best];
        let matched = associate(
            particle.x,
            particle.y,
            particle.theta,
            observations,
            map,
            sensor_range,
        );
        particle.set_associations(
            matched.iter().map(|a| a.landmark_id).collect(),
            matched.iter().map(|a| a.sense_x).collect(),
            matched.iter().map(|a| a.sense_y).collect(),
        )?;
        Ok(&self.particles[best])
    }

    /// Overwrite every particle's weight.
    ///
    /// # Errors
    /// * `WeightMismatch` if `weights` does not have one entry per particle.
    /// * `InvalidArgument` if any weight is negative or not finite.
    pub fn set_weights(&mut self, weights: &[f64]) -> Result<()> {
        self.ensure_initialized()?;
        if weights.len() != self.particles.len() {
            return Err(FilterError::WeightMismatch {
                expected: self.particles.len(),
                actual: weights.len(),
            });
        }
        for &w in weights {
            ensure_non_negative("weight", w)?;
        }
        for (particle, &w) in self.particles.iter_mut().zip(weights.iter()) {
            particle.weight = w;
        }
        self.weights = weights.to_vec();
        Ok(())
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Current (unnormalized) weights, index-aligned with [`particles`](Self::particles).
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn num_particles(&self) -> usize {
        self.num_particles
    }

    pub fn averaging_strategy(&self) -> ParticleAveragingStrategy {
        self.averaging_strategy
    }

    pub fn set_averaging_strategy(&mut self, strategy: ParticleAveragingStrategy) {
        self.averaging_strategy = strategy;
    }

    /// Weights scaled to sum to one. Uniform if every weight is zero.
    pub fn normalized_weights(&self) -> Vec<f64> {
        match self.scaled_weights() {
            Some(scaled) => {
                let total: f64 = scaled.iter().sum();
                scaled.iter().map(|w| w / total).collect()
            }
            None => {
                let n = self.weights.len().max(1) as f64;
                vec![1.0 / n; self.weights.len()]
            }
        }
    }

    /// Effective sample size of the normalized weights.
    ///
    /// N_eff = 1 / sum(w_i^2), or 0 if every weight is zero.
    pub fn effective_sample_size(&self) -> f64 {
        let Some(scaled) = self.scaled_weights() else {
            return 0.0;
        };
        let total: f64 = scaled.iter().sum();
        let sum_of_squares: f64 = scaled.iter().map(|w| (w / total).powi(2)).sum();
        1.0 / sum_of_squares
    }

    /// Particle with the largest weight; the first one wins ties.
    pub fn best_particle(&self) -> Option<&Particle> {
        if self.particles.is_empty() {
            None
        } else {
            Some(&self.particles[self.best_index()])
        }
    }

    /// Collapse the population into a single `[x, y, theta]` estimate.
    ///
    /// The heading of the estimate is wrapped to (-pi, pi]. An uninitialized filter returns zeros.
    pub fn get_estimate(&self) -> Vector3<f64> {
        if self.particles.is_empty() {
            return Vector3::zeros();
        }
        match self.averaging_strategy {
            ParticleAveragingStrategy::WeightedMean => self.weighted_mean(),
            ParticleAveragingStrategy::HighestWeight => {
                let mut pose = self.particles[self.best_index()].pose();
                pose[2] = wrap_to_pi(pose[2]);
                pose
            }
        }
    }

    /// Weighted sample covariance of the population about [`get_estimate`](Self::get_estimate).
    ///
    /// Heading residuals are wrapped before accumulation. The highest-weight strategy reports a
    /// zero covariance.
    pub fn get_certainty(&self) -> Matrix3<f64> {
        if self.particles.is_empty()
            || self.averaging_strategy == ParticleAveragingStrategy::HighestWeight
        {
            return Matrix3::zeros();
        }
        let mean = self.weighted_mean();
        let mut cov = Matrix3::zeros();
        for (particle, w) in self.particles.iter().zip(self.normalized_weights()) {
            let mut diff = particle.pose() - mean;
            diff[2] = wrap_to_pi(diff[2]);
            cov += w * diff * diff.transpose();
        }
        cov
    }

    fn weighted_mean(&self) -> Vector3<f64> {
        let (mut x, mut y, mut sin, mut cos) = (0.0, 0.0, 0.0, 0.0);
        for (particle, w) in self.particles.iter().zip(self.normalized_weights()) {
            x += w * particle.x;
            y += w * particle.y;
            sin += w * particle.theta.sin();
            cos += w * particle.theta.cos();
        }
        Vector3::new(x, y, sin.atan2(cos))
    }

    /// Weights divided by the largest one, so every entry lies in `[0, 1]` and the sum stays
    /// finite. When some weights are infinite those count as `1.0` and all others as `0.0`.
    /// `None` if no weight is positive.
    fn scaled_weights(&self) -> Option<Vec<f64>> {
        let max = self.weights.iter().copied().fold(0.0, f64::max);
        if max <= 0.0 {
            return None;
        }
        let scaled = self
            .weights
            .iter()
            .map(|&w| match (w.is_nan(), max.is_infinite()) {
                (true, _) => 0.0,
                (false, true) => {
                    if w.is_infinite() {
                        1.0
                    } else {
                        0.0
                    }
                }
                (false, false) => w / max,
            })
            .collect();
        Some(scaled)
    }

    fn best_index(&self) -> usize {
        let mut best = 0;
        for (i, particle) in self.particles.iter().enumerate() {
            if particle.weight > self.particles[best].weight {
                best = i;
            }
        }
        best
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized {
            Ok(())
        } else {
            Err(FilterError::NotInitialized)
        }
    }
}

fn gaussian(mean: f64, std_dev: f64) -> Result<Normal<f64>> {
    Normal::new(mean, std_dev).map_err(|e| FilterError::Config(e.to_string()))
}
