//! Physical constants (SI units).

/// Speed of light in vacuum (m/s)
pub const C0: f64 = 299_792_458.0;

/// Planck constant (J·s)
pub const H: f64 = 6.626_070_15e-34;

/// Number of polarization modes carried by an ASE bin
pub const ASE_MODES: f64 = 2.0;
