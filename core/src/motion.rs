//! Constant turn-rate and velocity motion model
//!
//! The deterministic part of the filter's prediction step. A vehicle moving at linear velocity $v$
//! and yaw rate $\omega$ for $\Delta t$ seconds moves along a circular arc:
//!
//! $$
//! x' = x + \frac{v}{\omega}\left(\sin(\theta + \omega \Delta t) - \sin\theta\right), \quad
//! y' = y + \frac{v}{\omega}\left(\cos\theta - \cos(\theta + \omega \Delta t)\right), \quad
//! \theta' = \theta + \omega \Delta t
//! $$
//!
//! The arc integral divides by the yaw rate, so below [`YAW_RATE_THRESHOLD`] the straight-line
//! limit $x' = x + v \Delta t \cos\theta$, $y' = y + v \Delta t \sin\theta$ is used instead.
use serde::{Deserialize, Serialize};

/// Yaw rates (rad/s) with a magnitude below this use the straight-line model.
pub const YAW_RATE_THRESHOLD: f64 = 1e-3;

/// Commanded (or measured) motion over one control interval.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlInput {
    /// Linear velocity (m/s)
    pub velocity: f64,
    /// Yaw rate (rad/s)
    pub yaw_rate: f64,
}
impl ControlInput {
    pub fn new(velocity: f64, yaw_rate: f64) -> Self {
        ControlInput { velocity, yaw_rate }
    }
    /// Move a pose through [`propagate`] with this control held for `delta_t` seconds.
    pub fn apply(&self, pose: (f64, f64, f64), delta_t: f64) -> (f64, f64, f64) {
        propagate(pose.0, pose.1, pose.2, delta_t, self.velocity, self.yaw_rate)
    }
}

/// Propagate a pose through the motion model without noise.
///
/// # Arguments
/// * `x`, `y`, `theta` - Current pose (m, m, rad).
/// * `delta_t` - Elapsed time (s).
/// * `velocity` - Linear velocity (m/s).
/// * `yaw_rate` - Yaw rate (rad/s).
///
/// # Returns
/// * The propagated `(x, y, theta)`. Heading is not wrapped.
///
/// # Example
/// ```rust
/// use localization::motion::propagate;
///
/// let (x, y, theta) = propagate(0.0, 0.0, 0.0, 1.0, 2.0, 0.0);
/// assert_eq!((x, y, theta), (2.0, 0.0, 0.0));
/// ```
pub fn propagate(
    x: f64,
    y: f64,
    theta: f64,
    delta_t: f64,
    velocity: f64,
    yaw_rate: f64,
) -> (f64, f64, f64) {
    if yaw_rate.abs() < YAW_RATE_THRESHOLD {
        (
            x + velocity * delta_t * theta.cos(),
            y + velocity * delta_t * theta.sin(),
            theta,
        )
    } else {
        let new_theta = theta + yaw_rate * delta_t;
        let radius = velocity / yaw_rate;
        (
            x + radius * (new_theta.sin() - theta.sin()),
            y + radius * (-new_theta.cos() + theta.cos()),
            new_theta,
        )
    }
}
