//! Optical channel registry.
//!
//! Channels are registered in any order but always simulated and reported in
//! the canonical order: forward signals, forward pumps, forward ASE, then the
//! same three groups for the backward direction. Insertion order is kept
//! within each group.

use crate::constants::{ASE_MODES, C0};
use crate::fiber::ModeShape;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Propagation direction along the fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Launched at z = 0, output at z = L
    Forward,
    /// Launched at z = L, output at z = 0
    Backward,
}

impl Direction {
    /// Label prefix used for generated channel names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }
}

/// Physical role of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    Signal,
    Pump,
    /// Amplified spontaneous emission bin
    Ase,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Signal => "signal",
            ChannelKind::Pump => "pump",
            ChannelKind::Ase => "ase",
        }
    }
}

/// Launch power of a channel over time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputPower {
    /// Same power (W) every step
    Constant(f64),
    /// One value (W) per time step; the last value is held afterwards
    Sampled(Vec<f64>),
}

impl InputPower {
    /// Launch power at a time step.
    #[inline]
    pub fn at_step(&self, step: u64) -> f64 {
        match self {
            InputPower::Constant(p) => *p,
            InputPower::Sampled(samples) => {
                let idx = (step as usize).min(samples.len().saturating_sub(1));
                samples.get(idx).copied().unwrap_or(0.0)
            }
        }
    }

    /// First step after which the launch power stays constant.
    ///
    /// Step `s` (counted from 1) launches `at_step(s - 1)`, so a sampled
    /// input holds its last value from step `samples.len()` on.
    pub fn settled_at(&self) -> u64 {
        match self {
            InputPower::Constant(_) => 0,
            InputPower::Sampled(samples) => samples.len() as u64,
        }
    }

    fn validate(&self, label: &str) -> Result<()> {
        let values: &[f64] = match self {
            InputPower::Constant(p) => std::slice::from_ref(p),
            InputPower::Sampled(samples) if samples.is_empty() => {
                return Err(Error::Config(format!(
                    "Channel '{label}': sampled input power is empty"
                )))
            }
            InputPower::Sampled(samples) => samples,
        };
        if let Some(bad) = values.iter().find(|p| !(p.is_finite() && **p >= 0.0)) {
            return Err(Error::Config(format!(
                "Channel '{label}': input power must be finite and non-negative, got {bad}"
            )));
        }
        Ok(())
    }
}

impl From<f64> for InputPower {
    fn from(power: f64) -> Self {
        InputPower::Constant(power)
    }
}

impl From<Vec<f64>> for InputPower {
    fn from(samples: Vec<f64>) -> Self {
        InputPower::Sampled(samples)
    }
}

/// Reflection of a channel's output into another channel's launch end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    /// Label of the channel receiving the reflected power
    pub target: String,
    /// Power reflectance in [0, 1]
    pub reflectance: f64,
}

/// Optional per-channel settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelOptions {
    pub label: Option<String>,
    pub reflection: Option<Reflection>,
    pub mode_shape: Option<ModeShape>,
    /// Background loss override (1/m)
    pub loss: Option<f64>,
}

impl ChannelOptions {
    /// Options with only a label set.
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Default::default()
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Reflect this channel's output power into `target` with the given reflectance.
    pub fn reflect_into(mut self, target: impl Into<String>, reflectance: f64) -> Self {
        self.reflection = Some(Reflection {
            target: target.into(),
            reflectance,
        });
        self
    }

    pub fn mode_shape(mut self, shape: ModeShape) -> Self {
        self.mode_shape = Some(shape);
        self
    }

    /// Shorthand for [`ModeShape::Overlaps`].
    pub fn overlaps(self, overlaps: Vec<f64>) -> Self {
        self.mode_shape(ModeShape::Overlaps(overlaps))
    }

    pub fn loss(mut self, loss: f64) -> Self {
        self.loss = Some(loss);
        self
    }
}

/// A registered optical channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub direction: Direction,
    pub kind: ChannelKind,
    /// Wavelength (m)
    pub wavelength: f64,
    pub input: InputPower,
    pub label: String,
    pub reflection: Option<Reflection>,
    pub mode_shape: ModeShape,
    /// Background loss override (1/m)
    pub loss: Option<f64>,
    /// Optical bandwidth (Hz), non-zero only for ASE bins
    pub bandwidth: f64,
    /// Number of modes seeded by spontaneous emission
    pub num_modes: f64,
}

impl Channel {
    /// Optical frequency (Hz).
    #[inline]
    pub fn frequency(&self) -> f64 {
        C0 / self.wavelength
    }
}

/// Reflection coupling between two channels, by canonical index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReflectionLink {
    /// Channel whose output power is reflected
    pub source: usize,
    /// Channel whose launch power receives the reflection
    pub target: usize,
    pub reflectance: f64,
}

/// Channels in canonical order with reflection links resolved to indices.
#[derive(Debug, Clone)]
pub struct ResolvedChannels {
    pub channels: Vec<Channel>,
    pub reflections: Vec<ReflectionLink>,
}

impl ResolvedChannels {
    /// Index of a channel by label.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.label == label)
    }
}

/// Collects channels before a run.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
    /// Problems found while adding, reported by `resolve`
    invalid: Vec<String>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a signal or pump channel.
    pub fn add(
        &mut self,
        direction: Direction,
        kind: ChannelKind,
        wavelength: f64,
        input: impl Into<InputPower>,
        options: ChannelOptions,
    ) {
        let label = options
            .label
            .unwrap_or_else(|| self.generated_label(direction, kind));
        self.channels.push(Channel {
            direction,
            kind,
            wavelength,
            input: input.into(),
            label,
            reflection: options.reflection,
            mode_shape: options.mode_shape.unwrap_or_default(),
            loss: options.loss,
            bandwidth: 0.0,
            num_modes: 0.0,
        });
    }

    /// Register forward and backward ASE bins spanning [wl_start, wl_end].
    ///
    /// Bin centers are evenly spaced in wavelength including both ends. Each
    /// bin's bandwidth is the frequency spacing between centers, or the whole
    /// span for a single bin.
    pub fn add_ase(&mut self, wl_start: f64, wl_end: f64, n_bins: usize) {
        let valid = n_bins > 0
            && wl_start > 0.0
            && wl_end > 0.0
            && wl_start.is_finite()
            && wl_end.is_finite()
            && wl_start != wl_end;
        if !valid {
            self.invalid.push(format!(
                "Invalid ASE band: {wl_start:.3e}..{wl_end:.3e} m with {n_bins} bins"
            ));
            return;
        }

        let span = (C0 / wl_start - C0 / wl_end).abs();
        let (wavelengths, bandwidth) = if n_bins == 1 {
            (vec![0.5 * (wl_start + wl_end)], span)
        } else {
            let step = (wl_end - wl_start) / (n_bins - 1) as f64;
            let wls = (0..n_bins).map(|i| wl_start + step * i as f64).collect();
            (wls, span / (n_bins - 1) as f64)
        };

        for direction in [Direction::Forward, Direction::Backward] {
            for &wavelength in &wavelengths {
                let label = self.generated_label(direction, ChannelKind::Ase);
                self.channels.push(Channel {
                    direction,
                    kind: ChannelKind::Ase,
                    wavelength,
                    input: InputPower::Constant(0.0),
                    label,
                    reflection: None,
                    mode_shape: ModeShape::default(),
                    loss: None,
                    bandwidth,
                    num_modes: ASE_MODES,
                });
            }
        }
    }

    fn generated_label(&self, direction: Direction, kind: ChannelKind) -> String {
        let n = self
            .channels
            .iter()
            .filter(|c| c.direction == direction && c.kind == kind)
            .count();
        format!("{}_{}_{}", direction.as_str(), kind.as_str(), n)
    }

    /// Channels in registration order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Remove all channels.
    pub fn clear(&mut self) {
        self.channels.clear();
        self.invalid.clear();
    }

    /// Validate and return the channels in canonical order with resolved reflections.
    pub fn resolve(&self) -> Result<ResolvedChannels> {
        if let Some(problem) = self.invalid.first() {
            return Err(Error::Config(problem.clone()));
        }
        if self.channels.is_empty() {
            return Err(Error::Config("No channels registered".into()));
        }

        let mut channels = self.channels.clone();
        // Stable sort keeps insertion order within a group
        channels.sort_by_key(|c| (c.direction, c.kind));

        for (i, channel) in channels.iter().enumerate() {
            if channels[..i].iter().any(|c| c.label == channel.label) {
                return Err(Error::Config(format!(
                    "Duplicate channel label '{}'",
                    channel.label
                )));
            }
            if !(channel.wavelength > 0.0 && channel.wavelength.is_finite()) {
                return Err(Error::Config(format!(
                    "Channel '{}': wavelength must be positive, got {}",
                    channel.label, channel.wavelength
                )));
            }
            if let Some(loss) = channel.loss {
                if !(loss >= 0.0 && loss.is_finite()) {
                    return Err(Error::Config(format!(
                        "Channel '{}': loss must be non-negative, got {loss}",
                        channel.label
                    )));
                }
            }
            channel.input.validate(&channel.label)?;
        }

        let mut reflections = Vec::new();
        for (source, channel) in channels.iter().enumerate() {
            let Some(reflection) = &channel.reflection else {
                continue;
            };
            if !(0.0..=1.0).contains(&reflection.reflectance) {
                return Err(Error::Config(format!(
                    "Channel '{}': reflectance must lie in [0, 1], got {}",
                    channel.label, reflection.reflectance
                )));
            }
            let target = channels
                .iter()
                .position(|c| c.label == reflection.target)
                .ok_or_else(|| {
                    Error::Config(format!(
                        "Channel '{}': unknown reflection target '{}'",
                        channel.label, reflection.target
                    ))
                })?;
            if target == source {
                return Err(Error::Config(format!(
                    "Channel '{}' cannot reflect into itself",
                    channel.label
                )));
            }
            reflections.push(ReflectionLink {
                source,
                target,
                reflectance: reflection.reflectance,
            });
        }

        Ok(ResolvedChannels {
            channels,
            reflections,
        })
    }
}
