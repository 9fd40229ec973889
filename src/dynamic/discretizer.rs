//! Spatial discretization of the fiber.
//!
//! The discretizer turns a fiber description and a resolved channel list into
//! the immutable coefficient set used by the stepping kernels:
//!
//! - `a[r](i, k) = σa(λi) · Γ(i, r) · n(r)`: absorption coefficient (1/m)
//! - `e[r](i, k) = σe(λi) · Γ(i, r) · n(r)`: emission coefficient (1/m)
//! - `u[r][i] = σa(λi) · Γ(i, r) / (h νi A(r))`: absorption rate per watt
//! - `w[r][i] = σe(λi) · Γ(i, r) / (h νi A(r))`: emission rate per watt
//! - `s[i] = m · h νi · Δνi`: spontaneous emission factor (ASE bins only)

use crate::arrays::{Dimensions, NodeField};
use crate::channels::{Channel, Direction, ReflectionLink, ResolvedChannels};
use crate::constants::H;
use crate::dynamic::batch::ScheduledInput;
use crate::fiber::{CrossSections, FiberParameters};
use crate::{Error, Result};

/// Uniform node grid along the fiber.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialGrid {
    length: f64,
    z: Vec<f64>,
}

impl SpatialGrid {
    /// `nodes` uniformly spaced positions covering [0, length].
    pub fn uniform(length: f64, nodes: usize) -> Result<Self> {
        if nodes < 2 {
            return Err(Error::Config(format!(
                "At least 2 spatial nodes are required, got {nodes}"
            )));
        }
        if !(length > 0.0 && length.is_finite()) {
            return Err(Error::Config(format!(
                "Fiber length must be positive, got {length}"
            )));
        }
        let dz = length / (nodes - 1) as f64;
        let mut z: Vec<f64> = (0..nodes).map(|k| k as f64 * dz).collect();
        // Pin the last node to the exact fiber end
        z[nodes - 1] = length;
        Ok(Self { length, z })
    }

    #[inline]
    pub fn nodes(&self) -> usize {
        self.z.len()
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Node spacing (m).
    #[inline]
    pub fn dz(&self) -> f64 {
        self.length / (self.z.len() - 1) as f64
    }

    /// Node positions (m).
    pub fn z(&self) -> &[f64] {
        &self.z
    }
}

/// Size summary of a discretized problem, for logging.
#[derive(Debug, Clone, Copy)]
pub struct DiscretizationInfo {
    pub num_channels: usize,
    pub num_nodes: usize,
    pub num_rings: usize,
    pub dz: f64,
    pub dt: f64,
    /// Approximate bytes of state plus coefficients
    pub memory_bytes: usize,
}

impl DiscretizationInfo {
    /// Human-readable memory estimate.
    pub fn memory_display(&self) -> String {
        let bytes = self.memory_bytes as f64;
        if bytes >= 1024.0 * 1024.0 {
            format!("{:.1} MiB", bytes / (1024.0 * 1024.0))
        } else if bytes >= 1024.0 {
            format!("{:.1} KiB", bytes / 1024.0)
        } else {
            format!("{} B", self.memory_bytes)
        }
    }
}

/// Immutable per-run model: grid, channels, coefficients and time step.
#[derive(Debug, Clone)]
pub struct DiscretizedFiber {
    grid: SpatialGrid,
    channels: Vec<Channel>,
    reflections: Vec<ReflectionLink>,
    /// One channels × nodes field per ring
    absorption: Vec<NodeField>,
    emission: Vec<NodeField>,
    /// [ring][channel], 1/(W·s)
    absorption_rate: Vec<Vec<f64>>,
    emission_rate: Vec<Vec<f64>>,
    /// Per-channel background loss (1/m)
    loss: Vec<f64>,
    /// Per-channel spontaneous emission factor (W·m per unit emission coefficient)
    spontaneous: Vec<f64>,
    upper_state_lifetime: f64,
    dt: f64,
}

impl DiscretizedFiber {
    /// Discretize `fiber` into `z_nodes` nodes for the given channels and time step.
    pub fn new(
        fiber: &FiberParameters,
        resolved: &ResolvedChannels,
        z_nodes: usize,
        dt: f64,
    ) -> Result<Self> {
        fiber.validate()?;
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(Error::Config(format!("Time step must be positive, got {dt}")));
        }
        let grid = SpatialGrid::uniform(fiber.length, z_nodes)?;
        let channels = resolved.channels.clone();
        let rings = fiber.doping.rings();
        let nodes = grid.nodes();
        let dims = Dimensions::new(channels.len(), nodes);

        let mut absorption = vec![NodeField::new(dims); rings.len()];
        let mut emission = vec![NodeField::new(dims); rings.len()];
        let mut absorption_rate = vec![vec![0.0; channels.len()]; rings.len()];
        let mut emission_rate = vec![vec![0.0; channels.len()]; rings.len()];
        let mut loss = Vec::with_capacity(channels.len());
        let mut spontaneous = Vec::with_capacity(channels.len());

        for (i, channel) in channels.iter().enumerate() {
            let (sigma_a, sigma_e) = fiber
                .spectroscopy
                .cross_sections(channel.wavelength)
                .map_err(|e| Error::Config(format!("Channel '{}': {e}", channel.label)))?;
            let overlaps = channel
                .mode_shape
                .overlaps(
                    channel.wavelength,
                    fiber.core_radius,
                    fiber.core_na,
                    &fiber.doping,
                )
                .map_err(|e| Error::Config(format!("Channel '{}': {e}", channel.label)))?;
            let photon_energy = H * channel.frequency();

            for (r, (ring, &overlap)) in rings.iter().zip(&overlaps).enumerate() {
                let a = sigma_a * overlap * ring.ion_number_density;
                let e = sigma_e * overlap * ring.ion_number_density;
                absorption[r].row_mut(i).fill(a);
                emission[r].row_mut(i).fill(e);
                absorption_rate[r][i] = sigma_a * overlap / (photon_energy * ring.area);
                emission_rate[r][i] = sigma_e * overlap / (photon_energy * ring.area);
            }

            loss.push(channel.loss.unwrap_or(fiber.background_loss));
            spontaneous.push(channel.num_modes * photon_energy * channel.bandwidth);
        }

        Ok(Self {
            grid,
            channels,
            reflections: resolved.reflections.clone(),
            absorption,
            emission,
            absorption_rate,
            emission_rate,
            loss,
            spontaneous,
            upper_state_lifetime: fiber.spectroscopy.upper_state_lifetime(),
            dt,
        })
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.grid.nodes()
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn num_rings(&self) -> usize {
        self.absorption.len()
    }

    /// Shape of the power state (channels × nodes).
    pub fn power_dimensions(&self) -> Dimensions {
        Dimensions::new(self.num_channels(), self.num_nodes())
    }

    /// Shape of the population state (rings × nodes).
    pub fn population_dimensions(&self) -> Dimensions {
        Dimensions::new(self.num_rings(), self.num_nodes())
    }

    /// Channels in canonical order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn reflections(&self) -> &[ReflectionLink] {
        &self.reflections
    }

    /// Absorption coefficients of one ring (channels × nodes, 1/m).
    pub fn absorption(&self, ring: usize) -> &NodeField {
        &self.absorption[ring]
    }

    /// Emission coefficients of one ring (channels × nodes, 1/m).
    pub fn emission(&self, ring: usize) -> &NodeField {
        &self.emission[ring]
    }

    /// Absorption coefficient summed over rings.
    pub fn total_absorption(&self, channel: usize, node: usize) -> f64 {
        self.absorption.iter().map(|a| a.get(channel, node)).sum()
    }

    /// Emission coefficient summed over rings.
    pub fn total_emission(&self, channel: usize, node: usize) -> f64 {
        self.emission.iter().map(|e| e.get(channel, node)).sum()
    }

    /// Absorption transition rate per watt of each channel in one ring.
    pub fn absorption_rate(&self, ring: usize) -> &[f64] {
        &self.absorption_rate[ring]
    }

    /// Emission transition rate per watt of each channel in one ring.
    pub fn emission_rate(&self, ring: usize) -> &[f64] {
        &self.emission_rate[ring]
    }

    pub fn loss(&self) -> &[f64] {
        &self.loss
    }

    pub fn spontaneous(&self) -> &[f64] {
        &self.spontaneous
    }

    pub fn upper_state_lifetime(&self) -> f64 {
        self.upper_state_lifetime
    }

    /// Time step (s).
    #[inline]
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Node at which a channel is launched.
    #[inline]
    pub fn launch_node(&self, channel: usize) -> usize {
        match self.channels[channel].direction {
            Direction::Forward => 0,
            Direction::Backward => self.num_nodes() - 1,
        }
    }

    /// Node at which a channel leaves the fiber.
    #[inline]
    pub fn output_node(&self, channel: usize) -> usize {
        match self.channels[channel].direction {
            Direction::Forward => self.num_nodes() - 1,
            Direction::Backward => 0,
        }
    }

    /// Launch power of every channel for the next step.
    ///
    /// Reflected power is taken from the output ends in `powers`, the state
    /// before the step, so reflections lag by one step.
    pub fn launch_powers(
        &self,
        inputs: &[ScheduledInput],
        offset: usize,
        powers: &NodeField,
        launch: &mut [f64],
    ) {
        for (value, input) in launch.iter_mut().zip(inputs) {
            *value = input.at(offset);
        }
        for link in &self.reflections {
            launch[link.target] +=
                link.reflectance * powers.get(link.source, self.output_node(link.source));
        }
    }

    /// Step from which no channel input changes any more.
    ///
    /// Steady-state comparisons must not reach back before this step.
    pub fn inputs_settled_at(&self) -> u64 {
        self.channels
            .iter()
            .map(|c| c.input.settled_at())
            .max()
            .unwrap_or(0)
    }

    /// Output-end power of every channel in canonical order.
    pub fn output_powers(&self, powers: &NodeField) -> Vec<f64> {
        (0..self.num_channels())
            .map(|i| powers.get(i, self.output_node(i)))
            .collect()
    }

    pub fn info(&self) -> DiscretizationInfo {
        let state = (self.num_channels() + self.num_rings()) * self.num_nodes();
        let coefficients = 2 * self.num_rings() * self.num_channels() * self.num_nodes();
        DiscretizationInfo {
            num_channels: self.num_channels(),
            num_nodes: self.num_nodes(),
            num_rings: self.num_rings(),
            dz: self.grid.dz(),
            dt: self.dt,
            memory_bytes: (state + coefficients) * std::mem::size_of::<f64>(),
        }
    }
}
