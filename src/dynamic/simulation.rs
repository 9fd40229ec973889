//! High-level simulation control.
//!
//! [`DynamicSimulation`] collects the fiber and channels, then discretizes
//! the fiber and drives a kernel in batches for every call to
//! [`run`](DynamicSimulation::run). Nothing is carried over between runs.

use crate::arrays::NodeField;
use crate::channels::{ChannelKind, ChannelOptions, ChannelRegistry, Direction, InputPower};
use crate::dynamic::{
    Backend, DiscretizedFiber, Kernel, MonitorConfig, ScheduledInput, SimulationResult,
    SteadyStateCriterion, StepBatch, TerminationConfig, TerminationReason,
};
use crate::fiber::FiberParameters;
use crate::{Error, Result};

use indicatif::{ProgressBar, ProgressStyle};
use instant::Instant;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Simulation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationState {
    /// Not yet run, or being set up for a run
    Initializing,
    /// Currently stepping
    Stepping,
    /// Stopped because the power profile became stationary
    Converged,
    /// Executed the maximum number of steps
    StepLimitReached,
}

/// Parameters of a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of spatial nodes including both fiber ends
    pub z_nodes: usize,
    /// Time step (s)
    pub dt: f64,
    /// Upper limit on executed steps
    pub max_steps: u64,
    /// Stop as soon as the power profile is stationary
    pub stop_at_steady_state: bool,
    /// Tolerances for the steady-state check
    pub steady_state: SteadyStateCriterion,
    /// Record output powers every N steps (0 = disabled).
    ///
    /// Every sample holds one value per channel, so an interval of 1 keeps
    /// `max_steps × channels` values for the whole run.
    pub sample_interval: u64,
    /// Steps per kernel batch
    pub batch_size: u64,
    /// Populations at step 0
    pub initial_state: InitialState,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            z_nodes: 100,
            dt: 1e-6,
            max_steps: 1_000_000,
            stop_at_steady_state: false,
            steady_state: SteadyStateCriterion::default(),
            sample_interval: 100,
            batch_size: 1000,
            initial_state: InitialState::Dark,
        }
    }
}

impl RunConfig {
    /// Check that the configuration describes a runnable problem.
    pub fn validate(&self) -> Result<()> {
        if self.z_nodes < 2 {
            return Err(Error::Config(format!(
                "At least 2 spatial nodes are required, got {}",
                self.z_nodes
            )));
        }
        if !(self.dt > 0.0 && self.dt.is_finite()) {
            return Err(Error::Config(format!(
                "Time step must be positive, got {}",
                self.dt
            )));
        }
        if self.max_steps == 0 {
            return Err(Error::Config("Maximum step count must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("Batch size must be positive".into()));
        }
        if self.stop_at_steady_state {
            let criterion = &self.steady_state;
            if criterion.window == 0 {
                return Err(Error::Config("Steady-state window must be positive".into()));
            }
            if !(criterion.rtol >= 0.0 && criterion.atol >= 0.0) {
                return Err(Error::Config(format!(
                    "Steady-state tolerances must be non-negative, got rtol={} atol={}",
                    criterion.rtol, criterion.atol
                )));
            }
        }
        Ok(())
    }
}

/// Populations a run starts from. Powers always start dark.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum InitialState {
    /// Every ion in the ground state
    #[default]
    Dark,
    /// One excited fraction per doping ring, the same at every node
    UniformPopulation(Vec<f64>),
    /// Excited fraction per ring and node (rings × nodes)
    Populations(Vec<Vec<f64>>),
}

impl InitialState {
    /// Final populations of a previous run on the same grid.
    pub fn from_result(result: &SimulationResult) -> Self {
        InitialState::Populations(result.populations().to_rows())
    }

    /// Write the initial populations into a zeroed rings × nodes field.
    fn apply(&self, populations: &mut NodeField) -> Result<()> {
        let dims = populations.dimensions();
        match self {
            InitialState::Dark => populations.clear(),
            InitialState::UniformPopulation(values) => {
                if values.len() != dims.rows {
                    return Err(Error::Config(format!(
                        "Initial state has {} ring populations, the fiber has {} rings",
                        values.len(),
                        dims.rows
                    )));
                }
                check_population_range(values)?;
                for (r, &n) in values.iter().enumerate() {
                    populations.row_mut(r).fill(n);
                }
            }
            InitialState::Populations(rows) => {
                let field = NodeField::from_rows(rows)?;
                if field.dimensions() != dims {
                    return Err(Error::Config(format!(
                        "Initial populations are {}x{}, expected {}x{} (rings x nodes)",
                        field.dimensions().rows,
                        field.dimensions().nodes,
                        dims.rows,
                        dims.nodes
                    )));
                }
                check_population_range(field.as_slice())?;
                populations.as_mut_slice().copy_from_slice(field.as_slice());
            }
        }
        Ok(())
    }
}

fn check_population_range(values: &[f64]) -> Result<()> {
    match values.iter().find(|n| !(0.0..=1.0).contains(*n)) {
        Some(bad) => Err(Error::Config(format!(
            "Initial populations must lie in [0, 1], got {bad}"
        ))),
        None => Ok(()),
    }
}

/// Dynamic fiber amplifier simulation.
///
/// ```no_run
/// use fiberamp::{ChannelOptions, DynamicSimulation, FiberParameters};
///
/// let fiber = FiberParameters::ytterbium(0.1, 3e-6, 0.12, 1e25).unwrap();
/// let mut sim = DynamicSimulation::new(50_000);
/// sim.set_fiber(fiber)
///     .add_forward_signal(1040e-9, 0.1, ChannelOptions::default())
///     .add_forward_pump(976e-9, 0.25, ChannelOptions::default())
///     .add_backward_pump(976e-9, 0.25, ChannelOptions::default())
///     .add_ase(1000e-9, 1100e-9, 3);
/// let result = sim.run(150, 1e-5, true).unwrap();
/// println!("{:?}", result.powers_at_fiber_end());
/// ```
pub struct DynamicSimulation {
    /// Step limit per run
    max_steps: u64,
    fiber: Option<FiberParameters>,
    channels: ChannelRegistry,
    backend: Backend,
    steady_state: SteadyStateCriterion,
    sample_interval: u64,
    batch_size: u64,
    initial_state: InitialState,
    /// Current state
    state: SimulationState,
    /// Verbosity level
    verbose: u8,
    /// Show progress bar
    show_progress: bool,
}

impl DynamicSimulation {
    /// Create a simulation that runs at most `max_steps` steps.
    pub fn new(max_steps: u64) -> Self {
        let defaults = RunConfig::default();
        Self {
            max_steps,
            fiber: None,
            channels: ChannelRegistry::new(),
            backend: Backend::default(),
            steady_state: defaults.steady_state,
            sample_interval: defaults.sample_interval,
            batch_size: defaults.batch_size,
            initial_state: defaults.initial_state,
            state: SimulationState::Initializing,
            verbose: 1,
            show_progress: true,
        }
    }

    /// Set the fiber to simulate.
    pub fn set_fiber(&mut self, fiber: FiberParameters) -> &mut Self {
        self.fiber = Some(fiber);
        self
    }

    pub fn fiber(&self) -> Option<&FiberParameters> {
        self.fiber.as_ref()
    }

    /// Add a signal launched at z = 0.
    pub fn add_forward_signal(
        &mut self,
        wavelength: f64,
        input: impl Into<InputPower>,
        options: ChannelOptions,
    ) -> &mut Self {
        self.channels
            .add(Direction::Forward, ChannelKind::Signal, wavelength, input, options);
        self
    }

    /// Add a signal launched at z = L.
    pub fn add_backward_signal(
        &mut self,
        wavelength: f64,
        input: impl Into<InputPower>,
        options: ChannelOptions,
    ) -> &mut Self {
        self.channels
            .add(Direction::Backward, ChannelKind::Signal, wavelength, input, options);
        self
    }

    /// Add a pump launched at z = 0.
    pub fn add_forward_pump(
        &mut self,
        wavelength: f64,
        input: impl Into<InputPower>,
        options: ChannelOptions,
    ) -> &mut Self {
        self.channels
            .add(Direction::Forward, ChannelKind::Pump, wavelength, input, options);
        self
    }

    /// Add a pump launched at z = L.
    pub fn add_backward_pump(
        &mut self,
        wavelength: f64,
        input: impl Into<InputPower>,
        options: ChannelOptions,
    ) -> &mut Self {
        self.channels
            .add(Direction::Backward, ChannelKind::Pump, wavelength, input, options);
        self
    }

    /// Add `n_bins` forward and `n_bins` backward ASE channels over a band.
    ///
    /// An invalid band is reported by the next `run`.
    pub fn add_ase(&mut self, wl_start: f64, wl_end: f64, n_bins: usize) -> &mut Self {
        self.channels.add_ase(wl_start, wl_end, n_bins);
        self
    }

    /// Remove all channels.
    pub fn clear_channels(&mut self) -> &mut Self {
        self.channels.clear();
        self
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Use the single-threaded reference kernel.
    pub fn use_reference_backend(&mut self) -> &mut Self {
        self.set_backend(Backend::Reference)
    }

    /// Use the data-parallel kernel.
    pub fn use_optimized_backend(&mut self) -> &mut Self {
        self.set_backend(Backend::Optimized)
    }

    pub fn set_backend(&mut self, backend: Backend) -> &mut Self {
        self.backend = backend;
        self
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn set_max_steps(&mut self, max_steps: u64) -> &mut Self {
        self.max_steps = max_steps;
        self
    }

    /// Set tolerances used when stopping at steady state.
    pub fn set_steady_state_criterion(&mut self, criterion: SteadyStateCriterion) -> &mut Self {
        self.steady_state = criterion;
        self
    }

    /// Record output powers every `interval` steps (0 disables recording).
    pub fn set_sample_interval(&mut self, interval: u64) -> &mut Self {
        self.sample_interval = interval;
        self
    }

    /// Set the number of steps handed to the kernel at once.
    pub fn set_batch_size(&mut self, batch_size: u64) -> &mut Self {
        self.batch_size = batch_size;
        self
    }

    /// Start runs from these populations instead of the dark fiber.
    pub fn set_initial_state(&mut self, initial_state: InitialState) -> &mut Self {
        self.initial_state = initial_state;
        self
    }

    /// Set verbosity level (0=quiet, 1=normal, 2=verbose).
    pub fn set_verbose(&mut self, level: u8) -> &mut Self {
        self.verbose = level;
        self
    }

    /// Enable/disable progress bar.
    pub fn set_show_progress(&mut self, show: bool) -> &mut Self {
        self.show_progress = show;
        self
    }

    /// Get the current state.
    pub fn state(&self) -> SimulationState {
        self.state
    }

    /// Run configuration built from this simulation's settings.
    pub fn run_config(&self, z_nodes: usize, dt: f64, stop_at_steady_state: bool) -> RunConfig {
        RunConfig {
            z_nodes,
            dt,
            max_steps: self.max_steps,
            stop_at_steady_state,
            steady_state: self.steady_state,
            sample_interval: self.sample_interval,
            batch_size: self.batch_size,
            initial_state: self.initial_state.clone(),
        }
    }

    /// Run from the configured initial state (dark unless set).
    ///
    /// # Arguments
    /// * `z_nodes` - Number of spatial nodes
    /// * `dt` - Time step (s)
    /// * `stop_at_steady_state` - Stop once the power profile is stationary
    pub fn run(
        &mut self,
        z_nodes: usize,
        dt: f64,
        stop_at_steady_state: bool,
    ) -> Result<SimulationResult> {
        let config = self.run_config(z_nodes, dt, stop_at_steady_state);
        self.run_with(&config)
    }

    /// Run with an explicit configuration.
    ///
    /// The simulation's own step limit, criterion and batching settings are
    /// ignored in favor of `config`.
    pub fn run_with(&mut self, config: &RunConfig) -> Result<SimulationResult> {
        self.state = SimulationState::Initializing;
        let outcome = self.execute(config);
        if outcome.is_err() {
            self.state = SimulationState::Initializing;
        }
        outcome
    }

    fn execute(&mut self, config: &RunConfig) -> Result<SimulationResult> {
        config.validate()?;
        let fiber = self
            .fiber
            .as_ref()
            .ok_or_else(|| Error::Config("No fiber set".into()))?;
        let resolved = self.channels.resolve()?;
        let model = DiscretizedFiber::new(fiber, &resolved, config.z_nodes, config.dt)?;
        let info = model.info();

        if self.verbose >= 1 {
            info!(
                "Fiber amplifier simulation: {} channels x {} nodes, {} doping ring(s)",
                info.num_channels, info.num_nodes, info.num_rings
            );
            info!(
                "Step sizes: dz = {:.4e} m, dt = {:.4e} s, up to {} steps",
                info.dz, info.dt, config.max_steps
            );
            info!("Estimated memory: {}", info.memory_display());
        }

        let mut kernel = Kernel::new(&model, self.backend)?;
        config.initial_state.apply(kernel.write_state().1)?;
        if self.verbose >= 1 && config.initial_state != InitialState::Dark {
            info!("Starting from preset populations");
        }
        self.state = SimulationState::Stepping;

        let progress = if self.show_progress {
            let pb = ProgressBar::new(config.max_steps);
            let style = ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({per_sec})")
                .map(|style| style.progress_chars("##-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            pb.set_style(style);
            Some(pb)
        } else {
            None
        };

        let termination = TerminationConfig {
            steady_state: config.stop_at_steady_state.then_some(config.steady_state),
        };
        let start_time = Instant::now();
        let mut output_samples = Vec::new();
        let mut steps_run = 0u64;
        let mut converged = false;

        // Main batching loop
        while steps_run < config.max_steps {
            let this_batch_size = (config.max_steps - steps_run).min(config.batch_size);
            let inputs = model
                .channels()
                .iter()
                .map(|c| ScheduledInput::from_input(&c.input, steps_run, this_batch_size))
                .collect();

            let batch = StepBatch {
                num_steps: this_batch_size,
                inputs,
                termination: termination.clone(),
                monitoring: MonitorConfig {
                    sample_interval: config.sample_interval,
                },
            };

            let result = kernel.run_batch(batch)?;
            steps_run += result.steps_executed;
            output_samples.extend(result.output_samples);

            if let Some(ref pb) = progress {
                pb.set_position(steps_run);
            }
            if self.verbose >= 2 {
                debug!(
                    "Batch of {} steps finished in {:.3}s",
                    result.steps_executed,
                    result.elapsed_time.as_secs_f64()
                );
            }

            if let TerminationReason::SteadyState {
                step,
                max_normalized_change,
            } = result.termination_reason
            {
                if self.verbose >= 1 {
                    info!(
                        "Steady state reached at step {} (max normalized change {:.3e})",
                        step, max_normalized_change
                    );
                }
                converged = true;
                break;
            }
        }

        if let Some(pb) = progress {
            pb.finish_with_message("Simulation complete");
        }

        let elapsed = start_time.elapsed();
        self.state = if converged {
            SimulationState::Converged
        } else {
            SimulationState::StepLimitReached
        };

        if self.verbose >= 1 {
            info!(
                "Completed {} steps ({:.4e} s simulated) in {:.2}s",
                steps_run,
                steps_run as f64 * config.dt,
                elapsed.as_secs_f64()
            );
        }

        let (powers, populations) = kernel.read_state();
        Ok(SimulationResult {
            z: model.grid().z().to_vec(),
            channel_labels: model.channels().iter().map(|c| c.label.clone()).collect(),
            wavelengths: model.channels().iter().map(|c| c.wavelength).collect(),
            output_powers: model.output_powers(powers),
            powers: powers.clone(),
            populations: populations.clone(),
            output_samples,
            status: self.state,
            steps_executed: steps_run,
            dt: config.dt,
            elapsed,
        })
    }
}
