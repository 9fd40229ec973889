//! Absorption and emission cross-section spectra.

use crate::{Error, Result};

/// Source of dopant cross-sections and lifetime.
pub trait CrossSections {
    /// (absorption, emission) cross-sections in m² at a wavelength in m.
    fn cross_sections(&self, wavelength: f64) -> Result<(f64, f64)>;

    /// Upper-state (spontaneous) lifetime in seconds.
    fn upper_state_lifetime(&self) -> f64;
}

/// One tabulated spectral point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralPoint {
    /// Wavelength (m)
    pub wavelength: f64,
    /// Absorption cross-section (m²)
    pub absorption: f64,
    /// Emission cross-section (m²)
    pub emission: f64,
}

/// Tabulated cross-sections of a two-level dopant plus its upper-state lifetime.
///
/// Cross-sections between table points are linearly interpolated. Wavelengths
/// outside the table are rejected rather than extrapolated.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectroscopy {
    points: Vec<SpectralPoint>,
    upper_state_lifetime: f64,
}

impl Spectroscopy {
    /// Create from a table of spectral points (any order) and a lifetime in seconds.
    pub fn new(mut points: Vec<SpectralPoint>, upper_state_lifetime: f64) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::Config("Spectroscopy table is empty".into()));
        }
        if !(upper_state_lifetime > 0.0 && upper_state_lifetime.is_finite()) {
            return Err(Error::Config(format!(
                "Upper-state lifetime must be positive, got {upper_state_lifetime}"
            )));
        }
        let non_negative = |x: f64| x >= 0.0 && x.is_finite();
        for p in &points {
            let valid = p.wavelength > 0.0
                && p.wavelength.is_finite()
                && non_negative(p.absorption)
                && non_negative(p.emission);
            if !valid {
                return Err(Error::Config(format!(
                    "Invalid spectral point at {:.3e} m: absorption={:.3e}, emission={:.3e}",
                    p.wavelength, p.absorption, p.emission
                )));
            }
        }
        points.sort_by(|a, b| a.wavelength.total_cmp(&b.wavelength));
        if points.windows(2).any(|w| w[0].wavelength == w[1].wavelength) {
            return Err(Error::Config("Duplicate wavelength in spectroscopy table".into()));
        }
        Ok(Self {
            points,
            upper_state_lifetime,
        })
    }

    /// Coarse representative spectra of ytterbium in silica, 1 ms lifetime.
    pub fn ytterbium_silica() -> Self {
        // (nm, absorption 1e-24 m², emission 1e-24 m²)
        const TABLE: [(f64, f64, f64); 19] = [
            (900.0, 0.20, 0.01),
            (915.0, 0.80, 0.05),
            (930.0, 0.55, 0.06),
            (950.0, 0.35, 0.08),
            (960.0, 0.55, 0.15),
            (970.0, 1.40, 0.70),
            (976.0, 2.60, 2.60),
            (980.0, 1.80, 1.90),
            (990.0, 0.60, 0.80),
            (1000.0, 0.25, 0.55),
            (1010.0, 0.14, 0.45),
            (1020.0, 0.08, 0.55),
            (1030.0, 0.05, 0.60),
            (1040.0, 0.03, 0.50),
            (1050.0, 0.02, 0.38),
            (1060.0, 0.012, 0.28),
            (1080.0, 0.005, 0.18),
            (1100.0, 0.002, 0.10),
            (1120.0, 0.001, 0.05),
        ];
        let points = TABLE
            .iter()
            .map(|&(nm, a, e)| SpectralPoint {
                wavelength: nm * 1e-9,
                absorption: a * 1e-24,
                emission: e * 1e-24,
            })
            .collect();
        Self {
            points,
            upper_state_lifetime: 1e-3,
        }
    }

    /// Tabulated points sorted by wavelength.
    pub fn points(&self) -> &[SpectralPoint] {
        &self.points
    }
}

impl CrossSections for Spectroscopy {
    fn upper_state_lifetime(&self) -> f64 {
        self.upper_state_lifetime
    }

    /// Linear interpolation between the bracketing table points.
    fn cross_sections(&self, wavelength: f64) -> Result<(f64, f64)> {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if !(wavelength >= first.wavelength && wavelength <= last.wavelength) {
            return Err(Error::Config(format!(
                "Wavelength {:.3e} m outside spectroscopy range [{:.3e}, {:.3e}] m",
                wavelength, first.wavelength, last.wavelength
            )));
        }

        let upper = self
            .points
            .partition_point(|p| p.wavelength < wavelength)
            .min(self.points.len() - 1);
        let hi = self.points[upper];
        if hi.wavelength == wavelength || upper == 0 {
            return Ok((hi.absorption, hi.emission));
        }
        let lo = self.points[upper - 1];
        let alpha = (wavelength - lo.wavelength) / (hi.wavelength - lo.wavelength);
        Ok((
            lo.absorption + alpha * (hi.absorption - lo.absorption),
            lo.emission + alpha * (hi.emission - lo.emission),
        ))
    }
}
