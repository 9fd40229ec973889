//! Radial doping profiles.
//!
//! A profile is an ordered list of rings. Each ring has its own ion density
//! and population inversion; channels couple to rings through per-ring
//! overlap fractions.

use crate::{Error, Result};
use std::f64::consts::PI;

/// One doped ring of the fiber cross-section.
#[derive(Debug, Clone, PartialEq)]
pub struct DopingRing {
    /// Ion number density (1/m³)
    pub ion_number_density: f64,
    /// Ring cross-section area (m²)
    pub area: f64,
    /// (inner, outer) radius in meters, if the ring was built from radii
    pub radii: Option<(f64, f64)>,
}

/// Ordered set of doping rings.
#[derive(Debug, Clone, PartialEq)]
pub struct DopingProfile {
    rings: Vec<DopingRing>,
}

impl DopingProfile {
    /// Single uniformly doped core.
    pub fn uniform(core_radius: f64, ion_number_density: f64) -> Result<Self> {
        Self::from_radii(&[ion_number_density], &[core_radius])
    }

    /// Concentric rings given by their outer radii (ascending).
    ///
    /// Ring `i` spans `[radii[i-1], radii[i]]`, the first ring starts at the axis.
    pub fn from_radii(ion_number_densities: &[f64], radii: &[f64]) -> Result<Self> {
        check_lengths(ion_number_densities.len(), radii.len(), "radii")?;
        let mut rings = Vec::with_capacity(radii.len());
        let mut inner = 0.0;
        for (&density, &outer) in ion_number_densities.iter().zip(radii) {
            if !(outer > inner) || !outer.is_finite() {
                return Err(Error::Config(format!(
                    "Ring radii must be positive and strictly increasing, got {radii:?}"
                )));
            }
            rings.push(DopingRing {
                ion_number_density: density,
                area: PI * (outer * outer - inner * inner),
                radii: Some((inner, outer)),
            });
            inner = outer;
        }
        Self::from_rings(rings)
    }

    /// Rings given directly by their areas. Channels must then supply explicit overlaps.
    pub fn from_areas(ion_number_densities: &[f64], areas: &[f64]) -> Result<Self> {
        check_lengths(ion_number_densities.len(), areas.len(), "areas")?;
        let rings = ion_number_densities
            .iter()
            .zip(areas)
            .map(|(&density, &area)| DopingRing {
                ion_number_density: density,
                area,
                radii: None,
            })
            .collect();
        Self::from_rings(rings)
    }

    fn from_rings(rings: Vec<DopingRing>) -> Result<Self> {
        for (i, ring) in rings.iter().enumerate() {
            if !(ring.ion_number_density >= 0.0) || !ring.ion_number_density.is_finite() {
                return Err(Error::Config(format!(
                    "Ring {i}: ion number density must be non-negative, got {}",
                    ring.ion_number_density
                )));
            }
            if !(ring.area > 0.0) || !ring.area.is_finite() {
                return Err(Error::Config(format!(
                    "Ring {i}: area must be positive, got {}",
                    ring.area
                )));
            }
        }
        Ok(Self { rings })
    }

    pub fn rings(&self) -> &[DopingRing] {
        &self.rings
    }

    pub fn num_rings(&self) -> usize {
        self.rings.len()
    }

    /// True if every ring carries radii, so Gaussian overlaps can be computed.
    pub fn has_radii(&self) -> bool {
        self.rings.iter().all(|r| r.radii.is_some())
    }
}

fn check_lengths(densities: usize, other: usize, what: &str) -> Result<()> {
    if densities == 0 {
        return Err(Error::Config("Doping profile needs at least one ring".into()));
    }
    if densities != other {
        return Err(Error::Config(format!(
            "Doping profile has {densities} densities but {other} {what}"
        )));
    }
    Ok(())
}
