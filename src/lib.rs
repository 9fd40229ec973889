//! Dynamic simulation of rare-earth doped fiber amplifiers.
//!
//! The fiber is discretized into uniformly spaced nodes. Every time step the
//! optical powers of all channels (signals, pumps and ASE bins) are propagated
//! through the current population inversion, and the inversion of every
//! doping ring is then relaxed toward the equilibrium set by those powers.
//!
//! Two interchangeable stepping kernels implement the same numerics:
//! - [`dynamic::ReferenceKernel`]: straightforward nested loops
//! - [`dynamic::OptimizedKernel`]: flat arrays with data-parallel updates
//!
//! # Example
//!
//! ```no_run
//! use fiberamp::channels::ChannelOptions;
//! use fiberamp::dynamic::DynamicSimulation;
//! use fiberamp::fiber::FiberParameters;
//!
//! let fiber = FiberParameters::ytterbium(0.1, 3e-6, 0.12, 1e25).unwrap();
//! let mut sim = DynamicSimulation::new(50_000);
//! sim.set_fiber(fiber)
//!     .add_forward_signal(1040e-9, 0.1, ChannelOptions::default())
//!     .add_backward_pump(980e-9, 0.5, ChannelOptions::default());
//! sim.use_optimized_backend();
//! let result = sim.run(150, 1e-5, true).unwrap();
//! println!("{:?}", result.powers_at_fiber_end());
//! ```

pub mod arrays;
pub mod channels;
pub mod constants;
pub mod dynamic;
pub mod fiber;

/// Errors produced while configuring or running a simulation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid setup: node counts, physical parameters, labels, array shapes.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The state became non-finite while stepping. The run is aborted.
    #[error("Numerical divergence at step {step}: {detail}")]
    NumericalDivergence {
        /// Step at which the non-finite value was detected
        step: u64,
        /// Which quantity diverged
        detail: String,
    },
}

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

pub use channels::{Channel, ChannelKind, ChannelOptions, Direction, InputPower};
pub use dynamic::{
    Backend, DynamicSimulation, InitialState, RunConfig, SimulationResult, SimulationState,
    SteadyStateCriterion,
};
pub use fiber::FiberParameters;
