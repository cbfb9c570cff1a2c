//! Display helpers for per-particle association data.
//!
//! These render the diagnostic fields of a [`Particle`] as space-separated strings for an
//! external viewer. They carry no filter semantics.
use std::fmt::Display;
use std::str::FromStr;

use crate::Particle;
use crate::error::FilterError;

/// Which sense coordinate to render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SenseAxis {
    X,
    Y,
}
impl FromStr for SenseAxis {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "X" | "x" => Ok(SenseAxis::X),
            "Y" | "y" => Ok(SenseAxis::Y),
            other => Err(FilterError::UnknownAxis(other.to_string())),
        }
    }
}

fn join<T: Display>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Associated landmark ids of a particle, space separated.
///
/// # Example
/// ```rust
/// use localization::Particle;
/// use localization::diagnostics::get_associations;
///
/// let mut particle = Particle::new(0, 0.0, 0.0, 0.0, 1.0);
/// particle.set_associations(vec![3, 1, 4], vec![0.0; 3], vec![0.0; 3]).unwrap();
/// assert_eq!(get_associations(&particle), "3 1 4");
/// ```
pub fn get_associations(particle: &Particle) -> String {
    join(&particle.associations)
}

/// Map-frame sense coordinates along one axis, space separated.
///
/// Values use the shortest `f64` representation that round-trips, so `1.5` renders as `1.5`
/// and no precision is lost. They are not rounded to a fixed number of significant digits.
pub fn get_sense_coord(particle: &Particle, axis: SenseAxis) -> String {
    match axis {
        SenseAxis::X => join(&particle.sense_x),
        SenseAxis::Y => join(&particle.sense_y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotated() -> Particle {
        let mut particle = Particle::new(2, 1.0, 1.0, 0.0, 0.5);
        particle
            .set_associations(vec![12, 7], vec![1.5, -2.25], vec![0.0, 10.0])
            .unwrap();
        particle
    }

    #[test]
    fn associations_in_order_without_trailing_space() {
        assert_eq!(get_associations(&annotated()), "12 7");
    }

    #[test]
    fn sense_coordinates_per_axis() {
        let particle = annotated();
        assert_eq!(get_sense_coord(&particle, SenseAxis::X), "1.5 -2.25");
        assert_eq!(get_sense_coord(&particle, SenseAxis::Y), "0 10");
    }

    #[test]
    fn sense_coordinates_keep_full_precision() {
        let mut particle = Particle::new(0, 0.0, 0.0, 0.0, 1.0);
        particle
            .set_associations(vec![1], vec![1.0 / 3.0], vec![123456.789])
            .unwrap();
        assert_eq!(get_sense_coord(&particle, SenseAxis::X), "0.3333333333333333");
        assert_eq!(get_sense_coord(&particle, SenseAxis::Y), "123456.789");
    }

    #[test]
    fn empty_lists_render_empty() {
        let particle = Particle::new(0, 0.0, 0.0, 0.0, 1.0);
        assert_eq!(get_associations(&particle), "");
        assert_eq!(get_sense_coord(&particle, SenseAxis::Y), "");
    }

    #[test]
    fn parse_axis() {
        assert_eq!("X".parse::<SenseAxis>().unwrap(), SenseAxis::X);
        assert_eq!(" y ".parse::<SenseAxis>().unwrap(), SenseAxis::Y);
        assert!(matches!(
            "Z".parse::<SenseAxis>(),
            Err(FilterError::UnknownAxis(axis)) if axis == "Z"
        ));
    }
}
