//! Fiber description consumed by the simulation.
//!
//! A [`FiberParameters`] value is immutable once handed to a simulation.
//! Variants (extra doping rings, different loss) are built as modified
//! copies with the `with_*` methods.

pub mod doping;
pub mod mode;
pub mod spectroscopy;

pub use doping::{DopingProfile, DopingRing};
pub use mode::ModeShape;
pub use spectroscopy::{CrossSections, SpectralPoint, Spectroscopy};

use crate::{Error, Result};

/// Geometry, doping and spectroscopy of a doped fiber.
#[derive(Debug, Clone, PartialEq)]
pub struct FiberParameters {
    /// Fiber length (m)
    pub length: f64,
    /// Core radius (m)
    pub core_radius: f64,
    /// Core numerical aperture
    pub core_na: f64,
    /// Background loss applied to every channel without its own value (1/m)
    pub background_loss: f64,
    /// Dopant cross-sections and lifetime
    pub spectroscopy: Spectroscopy,
    /// Radial doping profile
    pub doping: DopingProfile,
}

impl FiberParameters {
    /// Create a fiber from its parts.
    pub fn new(
        length: f64,
        core_radius: f64,
        core_na: f64,
        spectroscopy: Spectroscopy,
        doping: DopingProfile,
    ) -> Self {
        Self {
            length,
            core_radius,
            core_na,
            background_loss: 0.0,
            spectroscopy,
            doping,
        }
    }

    /// Uniformly doped ytterbium fiber with the built-in Yb spectra.
    pub fn ytterbium(
        length: f64,
        core_radius: f64,
        core_na: f64,
        ion_number_density: f64,
    ) -> Result<Self> {
        let doping = DopingProfile::uniform(core_radius, ion_number_density)?;
        Ok(Self::new(
            length,
            core_radius,
            core_na,
            Spectroscopy::ytterbium_silica(),
            doping,
        ))
    }

    /// Copy of this fiber with a different doping profile.
    pub fn with_doping_profile(&self, doping: DopingProfile) -> Self {
        Self {
            doping,
            ..self.clone()
        }
    }

    /// Copy of this fiber with a different background loss (1/m).
    pub fn with_background_loss(&self, background_loss: f64) -> Self {
        Self {
            background_loss,
            ..self.clone()
        }
    }

    /// Check that all scalar parameters are physical.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("length", self.length, false),
            ("core radius", self.core_radius, false),
            ("core NA", self.core_na, false),
            ("background loss", self.background_loss, true),
        ];
        for (name, value, allow_zero) in checks {
            let ok = value.is_finite() && (value > 0.0 || (allow_zero && value == 0.0));
            if !ok {
                return Err(Error::Config(format!(
                    "Fiber {name} must be {}, got {value}",
                    if allow_zero { "non-negative" } else { "positive" }
                )));
            }
        }
        Ok(())
    }
}
