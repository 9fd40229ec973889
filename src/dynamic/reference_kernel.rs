//! Reference single-threaded kernel.
//!
//! This is the readable implementation of the time step, written as plain
//! nested loops over channels, rings and nodes. It serves as:
//! - The correctness reference for the optimized kernel
//! - A clear statement of the update order within one step

use crate::arrays::NodeField;
use crate::channels::Direction;
use crate::dynamic::batch::{
    BatchResult, OutputSample, ScheduledInput, StepBatch, SteadyStateTracker, TerminationReason,
};
use crate::dynamic::discretizer::DiscretizedFiber;
use crate::dynamic::kernel_impl::{check_finite, check_inputs};
use crate::dynamic::rate_equations::{
    propagate_segment, relax_population, ring_gain, spontaneous_source, transition_rates,
};
use crate::dynamic::KernelImpl;
use crate::Result;
use instant::Instant;

/// Reference kernel.
pub struct ReferenceKernel {
    model: DiscretizedFiber,
    /// Channel powers (channels × nodes, W)
    powers: NodeField,
    /// Excited fraction (rings × nodes)
    populations: NodeField,
    /// Per-step scratch: net gain (1/m) and spontaneous source (W/m)
    gain: NodeField,
    source: NodeField,
    launch: Vec<f64>,
    step: u64,
    /// First step with constant channel inputs
    settled_at: u64,
    tracker: SteadyStateTracker,
}

impl KernelImpl for ReferenceKernel {
    fn new(model: &DiscretizedFiber) -> Result<Self> {
        let power_dims = model.power_dimensions();
        Ok(Self {
            model: model.clone(),
            powers: NodeField::new(power_dims),
            populations: NodeField::new(model.population_dimensions()),
            gain: NodeField::new(power_dims),
            source: NodeField::new(power_dims),
            launch: vec![0.0; model.num_channels()],
            step: 0,
            settled_at: model.inputs_settled_at(),
            tracker: SteadyStateTracker::new(),
        })
    }

    fn run_batch(&mut self, batch: StepBatch) -> Result<BatchResult> {
        check_inputs(&self.model, &batch)?;
        let start_time = Instant::now();
        let mut output_samples = Vec::new();
        let mut steps_executed = 0u64;
        let mut termination_reason = TerminationReason::StepsCompleted;

        if batch.termination.steady_state.is_some() {
            self.tracker.prime(&self.powers);
        }

        for offset in 0..batch.num_steps {
            self.step_once(&batch.inputs, offset as usize);
            self.step += 1;
            steps_executed += 1;

            check_finite(&self.model, self.step, &self.powers, &self.populations)?;

            let interval = batch.monitoring.sample_interval;
            if interval > 0 && self.step % interval == 0 {
                output_samples.push(OutputSample {
                    step: self.step,
                    time: self.step as f64 * self.model.dt(),
                    output_powers: self.model.output_powers(&self.powers),
                });
            }

            if let Some(criterion) = &batch.termination.steady_state {
                if criterion.window > 0 && self.step % criterion.window == 0 {
                    // Compare only across windows with settled inputs
                    if self.step < self.settled_at + criterion.window {
                        self.tracker.rebase(&self.powers);
                    } else if let Some(change) = self.tracker.observe(&self.powers, criterion) {
                        termination_reason = TerminationReason::SteadyState {
                            step: self.step,
                            max_normalized_change: change,
                        };
                        break;
                    }
                }
            }
        }

        Ok(BatchResult {
            steps_executed,
            termination_reason,
            output_samples,
            elapsed_time: start_time.elapsed(),
        })
    }

    fn current_step(&self) -> u64 {
        self.step
    }

    fn read_state(&self) -> (&NodeField, &NodeField) {
        (&self.powers, &self.populations)
    }

    fn write_state(&mut self) -> (&mut NodeField, &mut NodeField) {
        (&mut self.powers, &mut self.populations)
    }

    fn reset(&mut self) {
        self.powers.clear();
        self.populations.clear();
        self.step = 0;
        self.tracker.reset();
    }
}

impl ReferenceKernel {
    /// Advance the state by one time step.
    fn step_once(&mut self, inputs: &[ScheduledInput], offset: usize) {
        self.update_gain();
        self.model
            .launch_powers(inputs, offset, &self.powers, &mut self.launch);
        self.propagate();
        self.update_populations();
    }

    /// Net gain and spontaneous source of every channel at every node from
    /// the current populations.
    fn update_gain(&mut self) {
        let model = &self.model;
        for i in 0..model.num_channels() {
            for k in 0..model.num_nodes() {
                let mut gain = 0.0;
                let mut emission = 0.0;
                for r in 0..model.num_rings() {
                    let a = model.absorption(r).get(i, k);
                    let e = model.emission(r).get(i, k);
                    let n = self.populations.get(r, k);
                    gain += ring_gain(a + e, a, n);
                    emission += e * n;
                }
                gain -= model.loss()[i];
                self.gain.set(i, k, gain);
                self.source
                    .set(i, k, spontaneous_source(model.spontaneous()[i], emission));
            }
        }
    }

    /// Integrate every channel from its launch end to its output end.
    fn propagate(&mut self) {
        let model = &self.model;
        let nodes = model.num_nodes();
        let dz = model.grid().dz();

        for i in 0..model.num_channels() {
            match model.channels()[i].direction {
                Direction::Forward => {
                    self.powers.set(i, 0, self.launch[i]);
                    for k in 0..nodes - 1 {
                        let p = propagate_segment(
                            self.powers.get(i, k),
                            self.gain.get(i, k),
                            self.gain.get(i, k + 1),
                            self.source.get(i, k),
                            self.source.get(i, k + 1),
                            dz,
                        );
                        self.powers.set(i, k + 1, p);
                    }
                }
                Direction::Backward => {
                    self.powers.set(i, nodes - 1, self.launch[i]);
                    for k in (1..nodes).rev() {
                        let p = propagate_segment(
                            self.powers.get(i, k),
                            self.gain.get(i, k),
                            self.gain.get(i, k - 1),
                            self.source.get(i, k),
                            self.source.get(i, k - 1),
                            dz,
                        );
                        self.powers.set(i, k - 1, p);
                    }
                }
            }
        }
    }

    /// Relax every ring toward the populations driven by the new powers.
    fn update_populations(&mut self) {
        let model = &self.model;
        let lifetime = model.upper_state_lifetime();
        let dt = model.dt();

        for r in 0..model.num_rings() {
            for k in 0..model.num_nodes() {
                let powers = &self.powers;
                let (up, down) = transition_rates(
                    model.absorption_rate(r),
                    model.emission_rate(r),
                    (0..model.num_channels()).map(|i| powers.get(i, k)),
                );
                let n = relax_population(self.populations.get(r, k), up, down, lifetime, dt);
                self.populations.set(r, k, n);
            }
        }
    }
}
