//! Body descriptors and the versioned per-body state.
//!
//! Every per-body constant lives on one typed [`Body`] record. The mutable
//! part (enabled flag, orbital angle) lives in a [`BodySet`], which is owned
//! by the engine and bumps its version on every mutation.

use std::collections::HashSet;
use std::f64::consts::TAU;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Index of a body in its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BodyId(pub usize);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which mean distance drives periods and frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistanceModel {
    /// Modified Titius–Bode law indexed by the body's orbital index.
    #[default]
    Theoretical,
    /// Measured semi-major axis in AU.
    Actual,
}

/// Static description of an orbiting body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub name: String,
    /// Orbital index `n` of the theoretical model. Not derived from table position.
    pub orbital_index: i32,
    /// Mean distance under the theoretical model (AU).
    pub theoretical_distance: f64,
    /// Mean distance under the actual model (AU).
    pub actual_distance: f64,
    pub eccentricity: f64,
    /// Drawing radius for renderers, in pixels.
    pub display_radius: f64,
    /// Drawing colour for renderers, `#rrggbb`.
    pub color: String,
}

/// Titius–Bode distance `0.4 + 0.3 * 2^n` in AU.
pub fn titius_bode_distance(orbital_index: i32) -> f64 {
    0.4 + 0.3 * 2.0_f64.powi(orbital_index)
}

impl Body {
    pub fn new(name: &str, orbital_index: i32, actual_distance: f64, eccentricity: f64) -> Self {
        Body {
            name: name.to_string(),
            orbital_index,
            theoretical_distance: titius_bode_distance(orbital_index),
            actual_distance,
            eccentricity,
            display_radius: 3.0,
            color: "#999999".to_string(),
        }
    }

    pub fn with_theoretical_distance(mut self, distance: f64) -> Self {
        self.theoretical_distance = distance;
        self
    }

    pub fn with_display(mut self, radius: f64, color: &str) -> Self {
        self.display_radius = radius;
        self.color = color.to_string();
        self
    }

    /// Mean distance `a` under the given model.
    pub fn mean_distance(&self, model: DistanceModel) -> f64 {
        match model {
            DistanceModel::Theoretical => self.theoretical_distance,
            DistanceModel::Actual => self.actual_distance,
        }
    }

    /// Reject eccentricities outside [0, 1) and non-positive distances.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let e = self.eccentricity;
        if !(0.0..1.0).contains(&e) {
            return Err(ConfigError::InvalidEccentricity {
                body: self.name.clone(),
                value: e,
            });
        }
        for (model, value) in [
            ("theoretical", self.theoretical_distance),
            ("actual", self.actual_distance),
        ] {
            if !(value > 0.0) || !value.is_finite() {
                return Err(ConfigError::NonPositiveDistance {
                    body: self.name.clone(),
                    model,
                    value,
                });
            }
        }
        Ok(())
    }
}

/// The default table: the solar system with Murch's orbital indices.
pub fn solar_system() -> Vec<Body> {
    vec![
        Body::new("Mercury", -10, 0.387, 0.2056).with_display(4.0, "#A9A9A9"),
        Body::new("Venus", -2, 0.723, 0.0068).with_display(5.0, "#E6D3A3"),
        Body::new("Earth", -1, 1.0, 0.0167).with_display(5.0, "#1E90FF"),
        Body::new("Mars", 0, 1.524, 0.0934).with_display(4.5, "#CD5C5C"),
        Body::new("Ceres", 1, 2.767, 0.0758).with_display(3.0, "#8B8B83"),
        Body::new("Jupiter", 2, 5.203, 0.0489).with_display(9.0, "#E59866"),
        Body::new("Saturn", 3, 9.537, 0.0565).with_display(8.0, "#F4D03F"),
        Body::new("Uranus", 4, 19.191, 0.0457).with_display(7.0, "#AFDBF5"),
        Body::new("Neptune", 5, 30.069, 0.0113).with_display(7.0, "#4166F5"),
        Body::new("Pluto", 6, 39.482, 0.2488).with_display(3.0, "#C2B280"),
    ]
}

/// Mutable state of one body.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyState {
    pub id: BodyId,
    pub body: Body,
    pub enabled: bool,
    /// Orbital angle in radians, always in [0, 2π).
    pub angle: f64,
}

/// Record of an enabled-flag change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyDiff {
    pub id: BodyId,
    pub was_enabled: bool,
    pub enabled: bool,
    pub version: u64,
}

impl BodyDiff {
    pub fn changed(&self) -> bool {
        self.was_enabled != self.enabled
    }
}

/// Normalize an angle into [0, 2π).
pub fn normalize_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if a >= TAU { 0.0 } else { a }
}

/// Owned, versioned state of every body.
#[derive(Debug, Clone, PartialEq)]
pub struct BodySet {
    version: u64,
    states: Vec<BodyState>,
}

impl BodySet {
    /// Validate a body table and build its initial state (all enabled, angle 0).
    pub fn new(bodies: Vec<Body>) -> Result<Self, ConfigError> {
        if bodies.is_empty() {
            return Err(ConfigError::EmptyTable);
        }
        let mut names = HashSet::new();
        for body in &bodies {
            body.validate()?;
            if !names.insert(body.name.clone()) {
                return Err(ConfigError::DuplicateBody {
                    name: body.name.clone(),
                });
            }
        }
        let states = bodies
            .into_iter()
            .enumerate()
            .map(|(i, body)| BodyState {
                id: BodyId(i),
                body,
                enabled: true,
                angle: 0.0,
            })
            .collect();
        Ok(BodySet { version: 0, states })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, id: BodyId) -> Option<&BodyState> {
        self.states.get(id.0)
    }

    pub fn find(&self, name: &str) -> Option<&BodyState> {
        self.states.iter().find(|s| s.body.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BodyState> {
        self.states.iter()
    }

    /// Enabled bodies in table order.
    pub fn enabled(&self) -> impl Iterator<Item = &BodyState> {
        self.states.iter().filter(|s| s.enabled)
    }

    pub fn set_enabled(&mut self, id: BodyId, enabled: bool) -> Option<BodyDiff> {
        let state = self.states.get_mut(id.0)?;
        let was_enabled = state.enabled;
        state.enabled = enabled;
        if was_enabled != enabled {
            self.version += 1;
        }
        Some(BodyDiff {
            id,
            was_enabled,
            enabled,
            version: self.version,
        })
    }

    pub fn toggle(&mut self, id: BodyId) -> Option<BodyDiff> {
        let enabled = self.get(id)?.enabled;
        self.set_enabled(id, !enabled)
    }

    /// Replace every angle with the given values (table order).
    pub fn apply_orbit(&mut self, angles: &[f64]) -> u64 {
        for (state, &angle) in self.states.iter_mut().zip(angles) {
            state.angle = normalize_angle(angle);
        }
        self.version += 1;
        self.version
    }
}
