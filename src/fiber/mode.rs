//! Mode-shape overlaps with doping rings.

use crate::fiber::doping::DopingProfile;
use crate::{Error, Result};
use std::f64::consts::PI;

/// How a channel's transverse mode couples to the doping rings.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeShape {
    /// Gaussian intensity profile. Without an explicit mode-field radius the
    /// Marcuse approximation for the fundamental mode of a step-index fiber is used.
    Gaussian {
        /// 1/e² intensity radius (m)
        mode_field_radius: Option<f64>,
    },
    /// Precomputed overlap fraction for each ring.
    Overlaps(Vec<f64>),
}

impl Default for ModeShape {
    fn default() -> Self {
        Self::Gaussian {
            mode_field_radius: None,
        }
    }
}

impl ModeShape {
    /// Overlap fraction of this mode with every ring of `doping`.
    pub fn overlaps(
        &self,
        wavelength: f64,
        core_radius: f64,
        core_na: f64,
        doping: &DopingProfile,
    ) -> Result<Vec<f64>> {
        let overlaps = match self {
            ModeShape::Overlaps(values) => {
                if values.len() != doping.num_rings() {
                    return Err(Error::Config(format!(
                        "{} overlaps given for {} doping rings",
                        values.len(),
                        doping.num_rings()
                    )));
                }
                values.clone()
            }
            ModeShape::Gaussian { mode_field_radius } => {
                let w = match mode_field_radius {
                    Some(w) => *w,
                    None => marcuse_mode_field_radius(wavelength, core_radius, core_na)?,
                };
                if !(w > 0.0) {
                    return Err(Error::Config(format!(
                        "Mode-field radius must be positive, got {w}"
                    )));
                }
                doping
                    .rings()
                    .iter()
                    .map(|ring| {
                        let (inner, outer) = ring.radii.ok_or_else(|| {
                            Error::Config(
                                "Doping rings defined by area need explicit channel overlaps"
                                    .into(),
                            )
                        })?;
                        Ok(gaussian_ring_overlap(w, inner, outer))
                    })
                    .collect::<Result<Vec<_>>>()?
            }
        };

        if let Some(bad) = overlaps.iter().find(|&&g| !(0.0..=1.0).contains(&g)) {
            return Err(Error::Config(format!(
                "Overlap fractions must lie in [0, 1], got {bad}"
            )));
        }
        Ok(overlaps)
    }
}

/// Normalized frequency V of a step-index fiber.
pub fn v_number(wavelength: f64, core_radius: f64, core_na: f64) -> f64 {
    2.0 * PI * core_radius * core_na / wavelength
}

/// Marcuse estimate of the fundamental mode-field radius.
pub fn marcuse_mode_field_radius(wavelength: f64, core_radius: f64, core_na: f64) -> Result<f64> {
    if !(wavelength > 0.0 && core_radius > 0.0 && core_na > 0.0) {
        return Err(Error::Config(format!(
            "Gaussian mode needs positive wavelength, core radius and NA \
             (got {wavelength}, {core_radius}, {core_na})"
        )));
    }
    let v = v_number(wavelength, core_radius, core_na);
    Ok(core_radius * (0.65 + 1.619 / v.powf(1.5) + 2.879 / v.powi(6)))
}

/// Power fraction of a Gaussian beam of radius `w` inside the ring [inner, outer].
pub fn gaussian_ring_overlap(w: f64, inner: f64, outer: f64) -> f64 {
    let w2 = w * w;
    (-2.0 * inner * inner / w2).exp() - (-2.0 * outer * outer / w2).exp()
}
