//! Scenario-based testing infrastructure for the stepping kernels.
//!
//! Every scenario describes a fiber, its channels and a number of steps, and
//! checks physical expectations on the final state. The macros at the bottom
//! generate one test per kernel and one cross-kernel comparison per scenario.

use crate::arrays::NodeField;
use crate::channels::{ChannelKind, ChannelOptions, ChannelRegistry, Direction, InputPower};
use crate::dynamic::{
    BatchResult, DiscretizedFiber, KernelImpl, MonitorConfig, ScheduledInput,
    SteadyStateCriterion, StepBatch, TerminationConfig, TerminationReason,
};
use crate::fiber::{DopingProfile, FiberParameters, ModeShape};
use crate::Error;

/// Failure of a scenario run or of its checks.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Setup or stepping failed inside the crate
    #[error(transparent)]
    Simulation(#[from] Error),

    /// Results differ from expectations or from another kernel
    #[error("Scenario check failed: {0}")]
    Mismatch(String),
}

pub type HarnessResult<T> = std::result::Result<T, HarnessError>;

/// A complete kernel test scenario with physics verification.
pub trait FiberScenario {
    /// Scenario name for test identification.
    fn name(&self) -> &str;

    /// Build the complete setup.
    fn build(&self) -> ScenarioSetup;

    /// Verify physical correctness after the run completes.
    fn verify(&self, result: &ScenarioResult) -> HarnessResult<()>;
}

/// Complete scenario configuration.
pub struct ScenarioSetup {
    pub fiber: FiberParameters,
    pub channels: ChannelRegistry,
    pub z_nodes: usize,
    pub dt: f64,
    /// Number of steps to execute (upper limit with a steady-state criterion)
    pub num_steps: u64,
    /// Stop early once stationary
    pub steady_state: Option<SteadyStateCriterion>,
    /// Output sampling interval
    pub sample_interval: u64,
}

/// Results from running a complete scenario.
pub struct ScenarioResult {
    /// The discretized fiber (channels, coefficients, grid)
    pub model: DiscretizedFiber,
    /// Batch execution results
    pub batch_result: BatchResult,
    /// Final powers (channels × nodes)
    pub powers: NodeField,
    /// Final populations (rings × nodes)
    pub populations: NodeField,
}

impl ScenarioResult {
    /// Final output-end power of a channel by label.
    pub fn output(&self, label: &str) -> f64 {
        let i = self.index(label);
        self.powers.get(i, self.model.output_node(i))
    }

    /// Final launch-end power of a channel by label.
    pub fn launch(&self, label: &str) -> f64 {
        let i = self.index(label);
        self.powers.get(i, self.model.launch_node(i))
    }

    pub fn index(&self, label: &str) -> usize {
        self.model
            .channels()
            .iter()
            .position(|c| c.label == label)
            .unwrap_or_else(|| panic!("unknown channel '{label}'"))
    }
}

/// Run a scenario with a specific kernel and verify it.
pub fn test_scenario_with_kernel_impl<K: KernelImpl>(
    scenario: &dyn FiberScenario,
) -> HarnessResult<()> {
    let result = run_scenario_with_kernel::<K>(scenario)?;
    scenario.verify(&result)?;
    Ok(())
}

/// Run a scenario with a specific kernel and return the result.
pub fn run_scenario_with_kernel<K: KernelImpl>(
    scenario: &dyn FiberScenario,
) -> HarnessResult<ScenarioResult> {
    let setup = scenario.build();
    let resolved = setup.channels.resolve()?;
    let model = DiscretizedFiber::new(&setup.fiber, &resolved, setup.z_nodes, setup.dt)?;

    let mut kernel = K::new(&model)?;

    // Pre-sample inputs for the full run
    let inputs = model
        .channels()
        .iter()
        .map(|c| ScheduledInput::from_input(&c.input, 0, setup.num_steps))
        .collect();

    let batch = StepBatch {
        num_steps: setup.num_steps,
        inputs,
        termination: TerminationConfig {
            steady_state: setup.steady_state,
        },
        monitoring: MonitorConfig {
            sample_interval: setup.sample_interval,
        },
    };

    let batch_result = kernel.run_batch(batch)?;

    let (powers, populations) = kernel.read_state();
    let powers = powers.clone();
    let populations = populations.clone();

    Ok(ScenarioResult {
        model,
        batch_result,
        powers,
        populations,
    })
}

// =============================================================================
// CROSS-KERNEL COMPARISON TESTING
// =============================================================================

/// Tolerances for comparing floating-point arrays.
///
/// Uses the numpy `allclose()` formula:
/// ```text
/// |a - b| <= atol + rtol * max(|a|, |b|)
/// ```
#[derive(Debug, Clone)]
pub struct ComparisonConfig {
    /// Relative tolerance
    pub rtol: f64,
    /// Absolute tolerance
    pub atol: f64,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-18,
        }
    }
}

impl ComparisonConfig {
    #[inline]
    pub fn is_close(&self, a: f64, b: f64) -> bool {
        let diff = (a - b).abs();
        diff <= self.atol + self.rtol * a.abs().max(b.abs())
    }

    /// |a - b| divided by the tolerance; <= 1.0 means within tolerance.
    #[inline]
    pub fn normalized_error(&self, a: f64, b: f64) -> f64 {
        let diff = (a - b).abs();
        let tolerance = self.atol + self.rtol * a.abs().max(b.abs());
        if tolerance > 0.0 {
            diff / tolerance
        } else if diff == 0.0 {
            0.0
        } else {
            f64::INFINITY
        }
    }
}

/// Comparison statistics for one field.
#[derive(Debug, Default)]
pub struct FieldComparisonStats {
    /// Maximum absolute difference
    pub max_abs_diff: f64,
    /// Maximum normalized error (diff / tolerance)
    pub max_normalized_error: f64,
    /// Number of values exceeding tolerance
    pub num_mismatches: usize,
    /// Total number of values compared
    pub total_values: usize,
}

impl FieldComparisonStats {
    pub fn compute(reference: &[f64], test: &[f64], config: &ComparisonConfig) -> Self {
        assert_eq!(reference.len(), test.len(), "Field lengths must match");

        let mut stats = FieldComparisonStats {
            total_values: reference.len(),
            ..Default::default()
        };

        for (i, (&r, &t)) in reference.iter().zip(test).enumerate() {
            let norm_err = config.normalized_error(r, t);
            stats.max_abs_diff = stats.max_abs_diff.max((r - t).abs());
            stats.max_normalized_error = stats.max_normalized_error.max(norm_err);
            if norm_err > 1.0 {
                stats.num_mismatches += 1;
                if stats.num_mismatches <= 10 {
                    eprintln!(
                        "  Mismatch at index {}: ref={:.6e}, test={:.6e}, norm_err={:.3}",
                        i, r, t, norm_err
                    );
                }
            }
        }

        stats
    }

    pub fn passed(&self) -> bool {
        self.num_mismatches == 0
    }

    pub fn summary(&self, field_name: &str) -> String {
        format!(
            "{}: max_abs={:.2e}, max_norm_err={:.3}, mismatches={}/{}",
            field_name,
            self.max_abs_diff,
            self.max_normalized_error,
            self.num_mismatches,
            self.total_values
        )
    }
}

/// Compare two scenario results with the allclose formula.
pub fn compare_scenario_results_allclose(
    reference: &ScenarioResult,
    test: &ScenarioResult,
    config: &ComparisonConfig,
) -> HarnessResult<()> {
    if reference.batch_result.steps_executed != test.batch_result.steps_executed {
        return Err(HarnessError::Mismatch(format!(
            "Step counts differ: {} vs {}",
            reference.batch_result.steps_executed, test.batch_result.steps_executed
        )));
    }

    let power_stats =
        FieldComparisonStats::compute(reference.powers.as_slice(), test.powers.as_slice(), config);
    let population_stats = FieldComparisonStats::compute(
        reference.populations.as_slice(),
        test.populations.as_slice(),
        config,
    );
    eprintln!("  {}", power_stats.summary("powers"));
    eprintln!("  {}", population_stats.summary("populations"));

    if !power_stats.passed() || !population_stats.passed() {
        return Err(HarnessError::Mismatch(format!(
            "State comparison failed: {} power and {} population mismatches",
            power_stats.num_mismatches, population_stats.num_mismatches
        )));
    }
    Ok(())
}

/// Check that two kernels produce the same state for a scenario.
pub fn test_cross_kernel_comparison<Reference: KernelImpl, Test: KernelImpl>(
    scenario: &dyn FiberScenario,
    tolerance: f64,
) -> HarnessResult<()> {
    let config = ComparisonConfig {
        rtol: tolerance,
        ..Default::default()
    };

    eprintln!("\n=== Cross-kernel comparison: {} ===", scenario.name());
    let reference_result = run_scenario_with_kernel::<Reference>(scenario)?;
    let test_result = run_scenario_with_kernel::<Test>(scenario)?;
    compare_scenario_results_allclose(&reference_result, &test_result, &config)
}

// =============================================================================
// TEST SCENARIOS
// =============================================================================

const SIGNAL_WL: f64 = 1040e-9;
const PUMP_WL: f64 = 980e-9;
const CORE_RADIUS: f64 = 3e-6;
const DENSITY: f64 = 1e25;

fn yb_fiber() -> FiberParameters {
    // Valid constant parameters
    FiberParameters::ytterbium(0.1, CORE_RADIUS, 0.12, DENSITY).unwrap()
}

fn two_ring_profile() -> DopingProfile {
    DopingProfile::from_radii(&[DENSITY, DENSITY], &[CORE_RADIUS / 2.0, CORE_RADIUS]).unwrap()
}

fn split_pump_channels(options: impl Fn() -> ChannelOptions) -> ChannelRegistry {
    let mut channels = ChannelRegistry::new();
    channels.add(Direction::Forward, ChannelKind::Signal, SIGNAL_WL, 0.1, options());
    channels.add(Direction::Backward, ChannelKind::Pump, PUMP_WL, 0.25, options());
    channels.add(Direction::Forward, ChannelKind::Pump, PUMP_WL, 0.25, options());
    channels
}

fn check_finite_and_bounded(result: &ScenarioResult) -> HarnessResult<()> {
    if !result.powers.is_finite() || result.powers.as_slice().iter().any(|&p| p < 0.0) {
        return Err(HarnessError::Mismatch("Powers must be finite and non-negative".into()));
    }
    if result
        .populations
        .as_slice()
        .iter()
        .any(|n| !(0.0..=1.0).contains(n))
    {
        return Err(HarnessError::Mismatch("Populations must lie in [0, 1]".into()));
    }
    Ok(())
}

/// Scenario 1: Signal with pump split between both ends plus ASE.
pub struct SplitPumpAseScenario;

impl FiberScenario for SplitPumpAseScenario {
    fn name(&self) -> &str {
        "split_pump_with_ase"
    }

    fn build(&self) -> ScenarioSetup {
        let mut channels = split_pump_channels(ChannelOptions::default);
        channels.add_ase(1020e-9, 1040e-9, 3);
        ScenarioSetup {
            fiber: yb_fiber(),
            channels,
            z_nodes: 40,
            dt: 1e-5,
            num_steps: 2000,
            steady_state: None,
            sample_interval: 100,
        }
    }

    fn verify(&self, result: &ScenarioResult) -> HarnessResult<()> {
        check_finite_and_bounded(result)?;
        assert_eq!(result.model.num_channels(), 9);
        assert_eq!(result.batch_result.output_samples.len(), 20);

        // The pumped fiber amplifies the signal and absorbs the pumps
        assert!(result.output("forward_signal_0") > 0.1);
        assert!(result.output("forward_pump_0") < 0.25);
        assert!(result.output("backward_pump_0") < 0.25);
        for label in ["forward_ase_0", "forward_ase_2", "backward_ase_1"] {
            assert!(result.output(label) > 0.0, "{label} should carry ASE");
        }
        Ok(())
    }
}

/// Scenario 2: Two concentric doping rings with ASE.
pub struct TwoRingAseScenario;

impl FiberScenario for TwoRingAseScenario {
    fn name(&self) -> &str {
        "two_rings_with_ase"
    }

    fn build(&self) -> ScenarioSetup {
        let mut channels = split_pump_channels(ChannelOptions::default);
        channels.add_ase(1020e-9, 1040e-9, 3);
        ScenarioSetup {
            fiber: yb_fiber().with_doping_profile(two_ring_profile()),
            channels,
            z_nodes: 40,
            dt: 1e-5,
            num_steps: 2000,
            steady_state: None,
            sample_interval: 0,
        }
    }

    fn verify(&self, result: &ScenarioResult) -> HarnessResult<()> {
        check_finite_and_bounded(result)?;
        assert_eq!(result.populations.dimensions().rows, 2);
        assert!(result.batch_result.output_samples.is_empty());
        // The inner ring sees more of the Gaussian mode and is excited more
        assert!(result.populations.get(0, 20) > result.populations.get(1, 20));
        Ok(())
    }
}

/// Scenario 3: Rings given by area with explicit overlaps.
pub struct PresetOverlapsScenario;

impl FiberScenario for PresetOverlapsScenario {
    fn name(&self) -> &str {
        "preset_areas_and_overlaps"
    }

    fn build(&self) -> ScenarioSetup {
        let r = CORE_RADIUS;
        let areas = [
            std::f64::consts::PI * (r / 2.0).powi(2),
            std::f64::consts::PI * (r * r - (r / 2.0).powi(2)),
        ];
        let doping = DopingProfile::from_areas(&[DENSITY, DENSITY], &areas).unwrap();
        ScenarioSetup {
            fiber: yb_fiber().with_doping_profile(doping),
            channels: split_pump_channels(|| ChannelOptions::default().overlaps(vec![0.5, 0.2])),
            z_nodes: 40,
            dt: 1e-6,
            num_steps: 3000,
            steady_state: None,
            sample_interval: 0,
        }
    }

    fn verify(&self, result: &ScenarioResult) -> HarnessResult<()> {
        check_finite_and_bounded(result)?;
        assert_eq!(result.model.num_channels(), 3);
        assert!(result.output("forward_signal_0") > 0.0);
        Ok(())
    }
}

/// Scenario 4: Signal output partially reflected into a backward channel.
pub struct ReflectionScenario;

impl FiberScenario for ReflectionScenario {
    fn name(&self) -> &str {
        "reflection"
    }

    fn build(&self) -> ScenarioSetup {
        let mut channels = ChannelRegistry::new();
        channels.add(
            Direction::Forward,
            ChannelKind::Signal,
            SIGNAL_WL,
            0.1,
            ChannelOptions::labeled("forward_signal").reflect_into("reflected_signal", 0.04),
        );
        channels.add(
            Direction::Backward,
            ChannelKind::Signal,
            SIGNAL_WL,
            1e-15,
            ChannelOptions::labeled("reflected_signal"),
        );
        channels.add(
            Direction::Backward,
            ChannelKind::Pump,
            PUMP_WL,
            0.5,
            ChannelOptions::default(),
        );
        ScenarioSetup {
            fiber: yb_fiber(),
            channels,
            z_nodes: 40,
            dt: 1e-5,
            num_steps: 1500,
            steady_state: None,
            sample_interval: 1,
        }
    }

    fn verify(&self, result: &ScenarioResult) -> HarnessResult<()> {
        check_finite_and_bounded(result)?;
        let samples = &result.batch_result.output_samples;
        let source = result.index("forward_signal");

        // Launch power of the last step = input + R × output of the step before
        let previous_output = samples[samples.len() - 2].output_powers[source];
        let expected = 1e-15 + 0.04 * previous_output;
        let launched = result.launch("reflected_signal");
        assert!(
            (launched - expected).abs() <= 1e-12 * expected,
            "launched {launched:e}, expected {expected:e}"
        );
        Ok(())
    }
}

/// Scenario 5: Two channels reflecting into each other.
pub struct MutualReflectionScenario;

impl FiberScenario for MutualReflectionScenario {
    fn name(&self) -> &str {
        "mutual_reflection"
    }

    fn build(&self) -> ScenarioSetup {
        let mut channels = ChannelRegistry::new();
        channels.add(
            Direction::Forward,
            ChannelKind::Signal,
            SIGNAL_WL,
            0.01,
            ChannelOptions::labeled("a").reflect_into("b", 0.3),
        );
        channels.add(
            Direction::Backward,
            ChannelKind::Signal,
            SIGNAL_WL,
            0.0,
            ChannelOptions::labeled("b").reflect_into("a", 0.3),
        );
        channels.add(
            Direction::Forward,
            ChannelKind::Pump,
            PUMP_WL,
            0.3,
            ChannelOptions::default(),
        );
        ScenarioSetup {
            fiber: yb_fiber(),
            channels,
            z_nodes: 30,
            dt: 1e-5,
            num_steps: 1000,
            steady_state: None,
            sample_interval: 0,
        }
    }

    fn verify(&self, result: &ScenarioResult) -> HarnessResult<()> {
        check_finite_and_bounded(result)?;
        // Feedback adds to the launched input of both channels
        assert!(result.launch("a") > 0.01);
        assert!(result.launch("b") > 0.0);
        Ok(())
    }
}

/// Scenario 6: Nothing launched; the fiber stays dark.
pub struct ZeroInputScenario;

impl FiberScenario for ZeroInputScenario {
    fn name(&self) -> &str {
        "zero_input"
    }

    fn build(&self) -> ScenarioSetup {
        let mut channels = ChannelRegistry::new();
        channels.add(
            Direction::Forward,
            ChannelKind::Signal,
            SIGNAL_WL,
            0.0,
            ChannelOptions::default(),
        );
        channels.add_ase(1020e-9, 1040e-9, 2);
        ScenarioSetup {
            fiber: yb_fiber(),
            channels,
            z_nodes: 20,
            dt: 1e-5,
            num_steps: 500,
            steady_state: Some(SteadyStateCriterion::default()),
            sample_interval: 0,
        }
    }

    fn verify(&self, result: &ScenarioResult) -> HarnessResult<()> {
        assert!(result.powers.as_slice().iter().all(|&p| p == 0.0));
        assert!(result.populations.as_slice().iter().all(|&n| n == 0.0));
        // A dark fiber is stationary at the first comparison
        assert_eq!(
            result.batch_result.termination_reason,
            TerminationReason::SteadyState {
                step: 100,
                max_normalized_change: 0.0
            }
        );
        Ok(())
    }
}

/// Scenario 7: Pump switched on after a dark interval.
pub struct PulsedPumpScenario;

impl FiberScenario for PulsedPumpScenario {
    fn name(&self) -> &str {
        "pulsed_pump"
    }

    fn build(&self) -> ScenarioSetup {
        let mut pump = vec![0.0; 300];
        pump.push(0.4);
        let mut channels = ChannelRegistry::new();
        channels.add(
            Direction::Forward,
            ChannelKind::Signal,
            SIGNAL_WL,
            0.05,
            ChannelOptions::default(),
        );
        channels.add(
            Direction::Forward,
            ChannelKind::Pump,
            PUMP_WL,
            InputPower::Sampled(pump),
            ChannelOptions::default(),
        );
        ScenarioSetup {
            fiber: yb_fiber(),
            channels,
            z_nodes: 30,
            dt: 1e-5,
            num_steps: 1200,
            steady_state: None,
            sample_interval: 10,
        }
    }

    fn verify(&self, result: &ScenarioResult) -> HarnessResult<()> {
        check_finite_and_bounded(result)?;
        let samples = &result.batch_result.output_samples;
        let signal = result.index("forward_signal_0");
        let pump = result.index("forward_pump_0");

        // Dark until the pump switches on
        assert_eq!(samples[28].step, 290);
        assert_eq!(samples[28].output_powers[pump], 0.0);
        assert!(samples[28].output_powers[signal] < 0.05);

        // The pump inverts the fiber and the signal gains afterwards
        let last = &samples[samples.len() - 1];
        assert!(last.output_powers[pump] > 0.0);
        assert!(last.output_powers[signal] > samples[28].output_powers[signal]);
        Ok(())
    }
}

/// Scenario 8: Weak signal in the absorption band of an unpumped fiber.
pub struct UnpumpedAbsorptionScenario;

impl FiberScenario for UnpumpedAbsorptionScenario {
    fn name(&self) -> &str {
        "unpumped_absorption"
    }

    fn build(&self) -> ScenarioSetup {
        let mut channels = ChannelRegistry::new();
        channels.add(
            Direction::Forward,
            ChannelKind::Signal,
            976e-9,
            1e-6,
            ChannelOptions::default(),
        );
        ScenarioSetup {
            fiber: yb_fiber(),
            channels,
            z_nodes: 30,
            dt: 1e-5,
            num_steps: 500,
            steady_state: None,
            sample_interval: 0,
        }
    }

    fn verify(&self, result: &ScenarioResult) -> HarnessResult<()> {
        check_finite_and_bounded(result)?;
        // Excitation is negligible, so the signal follows Beer-Lambert
        let alpha = result.model.total_absorption(0, 0);
        let expected = 1e-6 * (-alpha * 0.1).exp();
        let output = result.output("forward_signal_0");
        assert!(
            (output - expected).abs() <= 1e-2 * expected,
            "output {output:e}, expected {expected:e}"
        );
        assert!(result.populations.get(0, 0) < 1e-3);
        Ok(())
    }
}

/// Scenario 9: Undoped fiber with background loss in both directions.
pub struct LossyUndopedScenario;

impl FiberScenario for LossyUndopedScenario {
    fn name(&self) -> &str {
        "lossy_undoped"
    }

    fn build(&self) -> ScenarioSetup {
        let fiber = yb_fiber()
            .with_doping_profile(DopingProfile::uniform(CORE_RADIUS, 0.0).unwrap())
            .with_background_loss(2.0);
        let mut channels = ChannelRegistry::new();
        channels.add(
            Direction::Forward,
            ChannelKind::Signal,
            SIGNAL_WL,
            1.0,
            ChannelOptions::default(),
        );
        channels.add(
            Direction::Backward,
            ChannelKind::Signal,
            SIGNAL_WL,
            0.5,
            ChannelOptions::default()
                .loss(5.0)
                .mode_shape(ModeShape::Gaussian {
                    mode_field_radius: Some(4e-6),
                }),
        );
        ScenarioSetup {
            fiber,
            channels,
            z_nodes: 11,
            dt: 1e-5,
            num_steps: 10,
            steady_state: None,
            sample_interval: 0,
        }
    }

    fn verify(&self, result: &ScenarioResult) -> HarnessResult<()> {
        let forward = result.output("forward_signal_0");
        let backward = result.output("backward_signal_0");
        assert!((forward - (-0.2f64).exp()).abs() < 1e-12);
        assert!((backward - 0.5 * (-0.5f64).exp()).abs() < 1e-12);
        Ok(())
    }
}

/// Scenario 10: Run until the profile is stationary.
pub struct SteadyStateScenario;

impl FiberScenario for SteadyStateScenario {
    fn name(&self) -> &str {
        "steady_state_detection"
    }

    fn build(&self) -> ScenarioSetup {
        ScenarioSetup {
            fiber: yb_fiber(),
            channels: split_pump_channels(ChannelOptions::default),
            z_nodes: 30,
            dt: 1e-5,
            num_steps: 50_000,
            steady_state: Some(SteadyStateCriterion::default()),
            sample_interval: 0,
        }
    }

    fn verify(&self, result: &ScenarioResult) -> HarnessResult<()> {
        check_finite_and_bounded(result)?;
        match result.batch_result.termination_reason {
            TerminationReason::SteadyState { step, .. } => {
                assert!(step < 50_000);
                assert_eq!(step, result.batch_result.steps_executed);
                Ok(())
            }
            ref other => Err(HarnessError::Mismatch(format!(
                "Expected steady state, got {other:?}"
            ))),
        }
    }
}

/// Scenario 11: Pump switched on long after the signal is stationary.
///
/// The dark-pump profile settles within a few hundred steps, so comparisons
/// before the switch-on step would report a steady state that never holds.
pub struct DelayedPumpScenario;

impl FiberScenario for DelayedPumpScenario {
    fn name(&self) -> &str {
        "delayed_pump_steady_state"
    }

    fn build(&self) -> ScenarioSetup {
        let mut pump = vec![0.0; 3000];
        pump.push(0.5);
        let mut channels = ChannelRegistry::new();
        channels.add(
            Direction::Forward,
            ChannelKind::Signal,
            SIGNAL_WL,
            0.1,
            ChannelOptions::default(),
        );
        channels.add(
            Direction::Backward,
            ChannelKind::Pump,
            PUMP_WL,
            InputPower::Sampled(pump),
            ChannelOptions::default(),
        );
        ScenarioSetup {
            fiber: yb_fiber(),
            channels,
            z_nodes: 30,
            dt: 1e-5,
            num_steps: 50_000,
            steady_state: Some(SteadyStateCriterion::default()),
            sample_interval: 0,
        }
    }

    fn verify(&self, result: &ScenarioResult) -> HarnessResult<()> {
        check_finite_and_bounded(result)?;
        match result.batch_result.termination_reason {
            TerminationReason::SteadyState { step, .. } => {
                // First full window after the pump input stops changing
                assert!(step >= 3001 + 100, "stopped at step {step}");
                assert_eq!(step % 100, 0);
                assert!(result.output("backward_pump_0") > 0.4);
                assert!(result.output("forward_signal_0") > 0.1);
                Ok(())
            }
            ref other => Err(HarnessError::Mismatch(format!(
                "Expected steady state, got {other:?}"
            ))),
        }
    }
}

/// Scenario 12: Every input dark for a while, then switched on together.
pub struct DarkStartScenario;

impl FiberScenario for DarkStartScenario {
    fn name(&self) -> &str {
        "dark_start_steady_state"
    }

    fn build(&self) -> ScenarioSetup {
        let switched_on = |power: f64| {
            let mut samples = vec![0.0; 500];
            samples.push(power);
            InputPower::Sampled(samples)
        };
        let mut channels = ChannelRegistry::new();
        channels.add(
            Direction::Forward,
            ChannelKind::Signal,
            SIGNAL_WL,
            switched_on(0.1),
            ChannelOptions::default(),
        );
        channels.add(
            Direction::Backward,
            ChannelKind::Pump,
            PUMP_WL,
            switched_on(0.5),
            ChannelOptions::default(),
        );
        ScenarioSetup {
            fiber: yb_fiber(),
            channels,
            z_nodes: 30,
            dt: 1e-5,
            num_steps: 50_000,
            steady_state: Some(SteadyStateCriterion::default()),
            sample_interval: 100,
        }
    }

    fn verify(&self, result: &ScenarioResult) -> HarnessResult<()> {
        check_finite_and_bounded(result)?;
        let samples = &result.batch_result.output_samples;
        // Stationary but dark before the switch-on
        assert!(samples[3].output_powers.iter().all(|&p| p == 0.0));
        match result.batch_result.termination_reason {
            TerminationReason::SteadyState { step, .. } => {
                assert!(step > 600, "stopped at step {step}");
                assert!(result.output("forward_signal_0") > 0.1);
                assert!(result.output("backward_pump_0") > 0.0);
                Ok(())
            }
            ref other => Err(HarnessError::Mismatch(format!(
                "Expected steady state, got {other:?}"
            ))),
        }
    }
}

// =============================================================================
// TEST GENERATION MACROS
// =============================================================================

/// Generate one test per kernel implementation for a scenario.
///
/// ```ignore
/// test_all_kernels!(SplitPumpAseScenario, test_split_pump);
/// ```
#[macro_export]
macro_rules! test_all_kernels {
    ($scenario:expr, $test_name_base:ident) => {
        paste::paste! {
            #[test]
            fn [<$test_name_base _reference>]() {
                let scenario = $scenario;
                $crate::dynamic::kernel_testing::test_scenario_with_kernel_impl::<$crate::dynamic::ReferenceKernel>(&scenario).unwrap();
            }

            #[test]
            fn [<$test_name_base _optimized>]() {
                let scenario = $scenario;
                $crate::dynamic::kernel_testing::test_scenario_with_kernel_impl::<$crate::dynamic::OptimizedKernel>(&scenario).unwrap();
            }
        }
    };
}

/// Generate a test comparing the optimized kernel against the reference kernel.
#[macro_export]
macro_rules! test_cross_kernel {
    ($scenario:expr, $test_name_base:ident, $tolerance:expr) => {
        paste::paste! {
            #[test]
            fn [<$test_name_base _optimized_vs_reference>]() {
                let scenario = $scenario;
                $crate::dynamic::kernel_testing::test_cross_kernel_comparison::<
                    $crate::dynamic::ReferenceKernel,
                    $crate::dynamic::OptimizedKernel
                >(&scenario, $tolerance).unwrap();
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    // Individual kernel tests: scenarios × 2 kernels
    test_all_kernels!(super::SplitPumpAseScenario, test_split_pump_ase);
    test_all_kernels!(super::TwoRingAseScenario, test_two_ring_ase);
    test_all_kernels!(super::PresetOverlapsScenario, test_preset_overlaps);
    test_all_kernels!(super::ReflectionScenario, test_reflection);
    test_all_kernels!(super::MutualReflectionScenario, test_mutual_reflection);
    test_all_kernels!(super::ZeroInputScenario, test_zero_input);
    test_all_kernels!(super::PulsedPumpScenario, test_pulsed_pump);
    test_all_kernels!(super::UnpumpedAbsorptionScenario, test_unpumped_absorption);
    test_all_kernels!(super::LossyUndopedScenario, test_lossy_undoped);
    test_all_kernels!(super::SteadyStateScenario, test_steady_state);
    test_all_kernels!(super::DelayedPumpScenario, test_delayed_pump);
    test_all_kernels!(super::DarkStartScenario, test_dark_start);

    // Cross-kernel comparison: the optimized kernel must reproduce the reference
    test_cross_kernel!(super::SplitPumpAseScenario, compare_split_pump_ase, 1e-6);
    test_cross_kernel!(super::TwoRingAseScenario, compare_two_ring_ase, 1e-6);
    test_cross_kernel!(super::PresetOverlapsScenario, compare_preset_overlaps, 1e-6);
    test_cross_kernel!(super::ReflectionScenario, compare_reflection, 1e-6);
    test_cross_kernel!(super::MutualReflectionScenario, compare_mutual_reflection, 1e-6);
    test_cross_kernel!(super::PulsedPumpScenario, compare_pulsed_pump, 1e-6);
    test_cross_kernel!(super::SteadyStateScenario, compare_steady_state, 1e-6);
    test_cross_kernel!(super::DelayedPumpScenario, compare_delayed_pump, 1e-6);

    #[test]
    fn test_comparison_config() {
        let config = ComparisonConfig::default();
        assert!(config.is_close(1.0, 1.0 + 5e-7));
        assert!(!config.is_close(1.0, 1.0 + 5e-6));
        assert_eq!(config.normalized_error(0.0, 0.0), 0.0);

        let exact = ComparisonConfig { rtol: 0.0, atol: 0.0 };
        assert_eq!(exact.normalized_error(1.0, 2.0), f64::INFINITY);
    }

    #[test]
    fn test_field_comparison_stats() {
        let config = ComparisonConfig::default();
        let stats = FieldComparisonStats::compute(&[1.0, 2.0, 3.0], &[1.0, 2.1, 3.0], &config);
        assert_eq!(stats.total_values, 3);
        assert_eq!(stats.num_mismatches, 1);
        assert!(!stats.passed());
        assert!((stats.max_abs_diff - 0.1).abs() < 1e-12);
        assert!(stats.summary("powers").starts_with("powers:"));
    }

    #[test]
    fn test_comparison_detects_perturbed_state() {
        let reference =
            run_scenario_with_kernel::<crate::dynamic::ReferenceKernel>(&LossyUndopedScenario)
                .unwrap();
        let mut perturbed =
            run_scenario_with_kernel::<crate::dynamic::OptimizedKernel>(&LossyUndopedScenario)
                .unwrap();
        let config = ComparisonConfig::default();
        assert!(compare_scenario_results_allclose(&reference, &perturbed, &config).is_ok());

        perturbed.powers.as_mut_slice()[3] *= 1.01;
        assert!(compare_scenario_results_allclose(&reference, &perturbed, &config).is_err());
    }
}
