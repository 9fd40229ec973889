//! Two-level rate equations at a single spatial node.
//!
//! These are the scalar building blocks shared by both kernels. Keeping the
//! arithmetic in one place means the kernels differ only in memory layout and
//! iteration strategy, never in floating-point evaluation order.

/// Upward and downward transition rates (1/s) of one ring at one node.
///
/// `powers` yields the channel powers at the node in canonical order.
#[inline]
pub fn transition_rates<I>(absorption_rate: &[f64], emission_rate: &[f64], powers: I) -> (f64, f64)
where
    I: IntoIterator<Item = f64>,
{
    let mut up = 0.0;
    let mut down = 0.0;
    for ((&u, &w), p) in absorption_rate.iter().zip(emission_rate).zip(powers) {
        up += u * p;
        down += w * p;
    }
    (up, down)
}

/// Total relaxation rate Λ = W↑ + W↓ + 1/τ.
#[inline]
pub fn relaxation_rate(up: f64, down: f64, lifetime: f64) -> f64 {
    up + down + 1.0 / lifetime
}

/// Excited fraction the ring would settle to under constant rates.
#[inline]
pub fn steady_population(up: f64, down: f64, lifetime: f64) -> f64 {
    (up / relaxation_rate(up, down, lifetime)).clamp(0.0, 1.0)
}

/// Advance an excited fraction by `dt` under constant rates.
///
/// Exact exponential relaxation toward the steady value, so it stays bounded
/// for any step size.
#[inline]
pub fn relax_population(population: f64, up: f64, down: f64, lifetime: f64, dt: f64) -> f64 {
    let rate = relaxation_rate(up, down, lifetime);
    let target = (up / rate).clamp(0.0, 1.0);
    (target + (population - target) * (-rate * dt).exp()).clamp(0.0, 1.0)
}

/// Net gain contribution (1/m) of one ring: e·n − a·(1 − n).
///
/// `absorption_plus_emission` is a + e, which the optimized kernel precomputes.
#[inline]
pub fn ring_gain(absorption_plus_emission: f64, absorption: f64, population: f64) -> f64 {
    absorption_plus_emission * population - absorption
}

/// Spontaneous emission power density (W/m) given Σ_r e·n.
#[inline]
pub fn spontaneous_source(spontaneous_factor: f64, emission_times_population: f64) -> f64 {
    spontaneous_factor * emission_times_population
}

/// Spatial derivative of power along the propagation direction.
#[inline]
pub fn power_derivative(gain: f64, power: f64, source: f64) -> f64 {
    gain * power + source
}

/// Carry power across one segment of length `dz`.
///
/// Gain is integrated exactly with trapezoidal coefficients; the source term
/// is added with the trapezoidal rule.
#[inline]
pub fn propagate_segment(
    power: f64,
    gain_from: f64,
    gain_to: f64,
    source_from: f64,
    source_to: f64,
    dz: f64,
) -> f64 {
    power * (0.5 * (gain_from + gain_to) * dz).exp() + 0.5 * (source_from + source_to) * dz
}
