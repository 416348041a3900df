//! Distance attenuation and cutoff-radius derivation
//!
//! Attenuated intensity at distance `r` is `I / (a0 + a1*r + a2*r^2)`. The
//! cutoff radius is the distance at which that falls to a fixed threshold;
//! it sizes the bounding proxy volumes of point and spot lights.

use crate::render::{RenderError, RenderResult};

/// Quadratic attenuation coefficients
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attenuation {
    /// Constant term
    pub constant: f32,
    /// Linear term, per unit distance
    pub linear: f32,
    /// Quadratic term, per unit distance squared
    pub quadratic: f32,
}

impl Attenuation {
    /// Validate and construct an attenuation triple
    ///
    /// All coefficients must be finite and non-negative, and at least one
    /// distance-dependent term must be positive so the light actually
    /// falls off with distance; a constant-only triple would give an
    /// unbounded cutoff radius.
    pub fn new(constant: f32, linear: f32, quadratic: f32) -> RenderResult<Self> {
        let all_finite = constant.is_finite() && linear.is_finite() && quadratic.is_finite();
        if !all_finite || constant < 0.0 || linear < 0.0 || quadratic < 0.0 {
            return Err(RenderError::InvalidLightParameters(format!(
                "attenuation coefficients must be finite and non-negative, \
                 got ({constant}, {linear}, {quadratic})"
            )));
        }
        if linear <= 0.0 && quadratic <= 0.0 {
            return Err(RenderError::InvalidLightParameters(
                "attenuation needs a positive linear or quadratic term".to_string(),
            ));
        }
        Ok(Self {
            constant,
            linear,
            quadratic,
        })
    }

    /// The denominator of the attenuation curve at distance `r`
    pub fn denominator_at(&self, r: f32) -> f32 {
        self.constant + self.linear * r + self.quadratic * r * r
    }
}

/// Distance at which `brightness` attenuated by `attenuation` drops to
/// `threshold`
///
/// Solves `brightness / (a0 + a1*r + a2*r^2) = threshold` for the positive
/// root. Returns `0.0` when the light is already below threshold at the
/// source.
pub fn cutoff_radius(attenuation: &Attenuation, brightness: f32, threshold: f32) -> f32 {
    let target = brightness.max(0.0) / threshold;
    // Looking for a0 + a1*r + a2*r^2 = target with r >= 0.
    let c = attenuation.constant - target;
    if c >= 0.0 {
        return 0.0;
    }
    let (a, b) = (attenuation.quadratic, attenuation.linear);
    if a > 0.0 {
        (-b + (b * b - 4.0 * a * c).sqrt()) / (2.0 * a)
    } else {
        -c / b
    }
}
