//! Orbit model: Keplerian angle advance and polar-ellipse distance.

use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use crate::bodies::{BodySet, DistanceModel, normalize_angle};

/// One-shot jump of every body to a named point of its orbit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PositionOverride {
    /// The angle where r(θ) equals the mean distance.
    Average,
    Aphelion,
    Perihelion,
}

/// Global orbital clock and controls.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitState {
    /// Seconds of unpaused orbital time.
    pub elapsed: f64,
    pub paused: bool,
    pub speed: f64,
    pub distance_model: DistanceModel,
    /// Consumed by the next animation frame.
    pub pending_override: Option<PositionOverride>,
}

impl OrbitState {
    pub fn new(speed: f64, distance_model: DistanceModel) -> Self {
        OrbitState {
            elapsed: 0.0,
            paused: false,
            speed,
            distance_model,
            pending_override: None,
        }
    }
}

/// Angle and focus distance of one body at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitSample {
    pub angle: f64,
    pub distance: f64,
}

/// Kepler's third law with `a` in AU and the period in years.
pub fn orbital_period(mean_distance: f64) -> f64 {
    mean_distance.powf(1.5)
}

/// r(θ) = a(1 − e²) / (1 + e·cosθ), focus at the origin.
pub fn distance_at(mean_distance: f64, eccentricity: f64, angle: f64) -> f64 {
    mean_distance * (1.0 - eccentricity * eccentricity) / (1.0 + eccentricity * angle.cos())
}

/// Angle a position override jumps to.
pub fn override_angle(position: PositionOverride, eccentricity: f64) -> f64 {
    match position {
        PositionOverride::Perihelion => 0.0,
        PositionOverride::Aphelion => PI,
        // r(θ) = a  ⇔  cosθ = −e
        PositionOverride::Average => (-eccentricity).acos(),
    }
}

/// Cartesian position of a sample in the orbital plane.
pub fn position(sample: OrbitSample) -> (f64, f64) {
    (
        sample.distance * sample.angle.cos(),
        sample.distance * sample.angle.sin(),
    )
}

/// Advances orbital angles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitModel {
    /// Wall-clock seconds per unit orbital period.
    pub time_scale: f64,
}

impl OrbitModel {
    pub fn new(time_scale: f64) -> Self {
        OrbitModel { time_scale }
    }

    /// Radians per second for a body at mean distance `a`.
    pub fn angular_velocity(&self, mean_distance: f64, speed: f64) -> f64 {
        TAU / (orbital_period(mean_distance) * self.time_scale) * speed
    }

    /// Compute the next angle of every body.
    ///
    /// A pending override is consumed and replaces the advance for this
    /// frame. Returns `None` when nothing moves (paused, no override).
    /// `speed_factor` scales the state's speed multiplier.
    pub fn step(
        &self,
        bodies: &BodySet,
        state: &mut OrbitState,
        dt: f64,
        speed_factor: f64,
    ) -> Option<Vec<f64>> {
        if let Some(position) = state.pending_override.take() {
            return Some(
                bodies
                    .iter()
                    .map(|s| override_angle(position, s.body.eccentricity))
                    .collect(),
            );
        }
        if state.paused || dt <= 0.0 {
            return None;
        }
        state.elapsed += dt;
        let speed = state.speed * speed_factor;
        Some(
            bodies
                .iter()
                .map(|s| {
                    let a = s.body.mean_distance(state.distance_model);
                    normalize_angle(s.angle + self.angular_velocity(a, speed) * dt)
                })
                .collect(),
        )
    }

    /// Current angle and distance of every body (table order).
    pub fn sample(&self, bodies: &BodySet, model: DistanceModel) -> Vec<OrbitSample> {
        bodies
            .iter()
            .map(|s| OrbitSample {
                angle: s.angle,
                distance: distance_at(s.body.mean_distance(model), s.body.eccentricity, s.angle),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodies::{Body, solar_system};

    #[test]
    fn perihelion_and_aphelion_distances() {
        for &e in &[0.0, 0.0167, 0.2056, 0.5, 0.99] {
            for &a in &[0.387, 1.0, 39.5] {
                let r0 = distance_at(a, e, 0.0);
                let rpi = distance_at(a, e, PI);
                assert!((r0 - a * (1.0 - e)).abs() < 1e-9, "r(0) a={a} e={e}: {r0}");
                assert!((rpi - a * (1.0 + e)).abs() < 1e-9, "r(π) a={a} e={e}: {rpi}");
            }
        }
    }

    #[test]
    fn average_override_lands_on_mean_distance() {
        for &e in &[0.0, 0.1, 0.2488, 0.9] {
            let theta = override_angle(PositionOverride::Average, e);
            let r = distance_at(2.0, e, theta);
            assert!((r - 2.0).abs() < 1e-9, "e={e}: r={r}");
        }
    }

    #[test]
    fn earth_period_is_one() {
        assert!((orbital_period(1.0) - 1.0).abs() < 1e-12);
        assert!((orbital_period(4.0) - 8.0).abs() < 1e-12);
    }

    #[test]
    fn angle_advances_one_orbit_per_scaled_period() {
        let bodies = BodySet::new(vec![Body::new("Earth", -1, 1.0, 0.0)]).unwrap();
        let model = OrbitModel::new(10.0);
        let mut state = OrbitState::new(1.0, DistanceModel::Actual);

        // A quarter of the 10 s period
        let angles = model.step(&bodies, &mut state, 2.5, 1.0).unwrap();
        assert!((angles[0] - PI / 2.0).abs() < 1e-9, "got {}", angles[0]);
        assert!((state.elapsed - 2.5).abs() < 1e-12);
    }

    #[test]
    fn speed_multiplier_scales_velocity() {
        let model = OrbitModel::new(10.0);
        let w1 = model.angular_velocity(1.0, 1.0);
        let w3 = model.angular_velocity(1.0, 3.0);
        assert!((w3 - 3.0 * w1).abs() < 1e-12);
        // Outer bodies move slower
        assert!(model.angular_velocity(5.2, 1.0) < w1);
    }

    #[test]
    fn paused_does_not_advance() {
        let bodies = BodySet::new(solar_system()).unwrap();
        let model = OrbitModel::new(20.0);
        let mut state = OrbitState::new(1.0, DistanceModel::Theoretical);
        state.paused = true;
        assert!(model.step(&bodies, &mut state, 0.016, 1.0).is_none());
        assert_eq!(state.elapsed, 0.0);
    }

    #[test]
    fn override_is_one_shot_and_applies_while_paused() {
        let mut bodies = BodySet::new(solar_system()).unwrap();
        let model = OrbitModel::new(20.0);
        let mut state = OrbitState::new(1.0, DistanceModel::Actual);
        state.paused = true;
        state.pending_override = Some(PositionOverride::Aphelion);

        let angles = model.step(&bodies, &mut state, 0.016, 1.0).unwrap();
        bodies.apply_orbit(&angles);
        assert!(state.pending_override.is_none());

        for (s, sample) in bodies.iter().zip(model.sample(&bodies, DistanceModel::Actual)) {
            assert!((s.angle - PI).abs() < 1e-12);
            let expected = s.body.actual_distance * (1.0 + s.body.eccentricity);
            assert!((sample.distance - expected).abs() < 1e-9, "{}", s.body.name);
        }
        // Still paused: no further motion
        assert!(model.step(&bodies, &mut state, 0.016, 1.0).is_none());
    }

    #[test]
    fn angles_stay_normalized_over_long_runs() {
        let mut bodies = BodySet::new(solar_system()).unwrap();
        let model = OrbitModel::new(0.5);
        let mut state = OrbitState::new(7.0, DistanceModel::Theoretical);
        for _ in 0..2000 {
            if let Some(angles) = model.step(&bodies, &mut state, 1.0 / 60.0, 1.0) {
                bodies.apply_orbit(&angles);
            }
        }
        assert!(bodies.iter().all(|s| (0.0..TAU).contains(&s.angle)));
    }

    #[test]
    fn position_is_polar_to_cartesian() {
        let (x, y) = position(OrbitSample {
            angle: PI / 2.0,
            distance: 2.0,
        });
        assert!(x.abs() < 1e-12);
        assert!((y - 2.0).abs() < 1e-12);
    }
}
