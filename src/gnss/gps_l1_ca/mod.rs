
pub mod channel;
pub mod correlator;
pub mod ephemeris;
pub mod signal_modulation;
pub mod synth;
pub mod telemetry_decode;
pub mod tracking;

pub const L1_FREQ_HZ:f64 = 1.57542e9;					// [Hz] L1 carrier
pub const CODE_RATE_CHIPS_PER_SEC:f64 = 1.023e6;		// [chips/s] nominal C/A chipping rate
pub const CODE_LENGTH_CHIPS:usize = 1023;
pub const CODE_PERIOD_SEC:f64 = 1.0e-3;
pub const DATA_BIT_RATE_HZ:f64 = 50.0;
pub const CODE_PERIODS_PER_BIT:usize = 20;

/// Number of samples in one code period at the given sample rate
pub fn samples_per_code_period(fs:f64) -> usize { (fs * CODE_PERIOD_SEC).round() as usize }
