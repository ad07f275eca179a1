
/// Scalar loop filters driven once per integration period by a discriminator output
pub trait ScalarFilter {

	fn apply(&mut self, x:f64) -> f64;
	fn initialize(&mut self);

}

/// First-order loop filter, a pure gain.  The NCO behind it supplies the integration,
/// which is all a delay-locked loop needs.
pub struct ProportionalFilter {
	pub gain: f64,
}

impl ScalarFilter for ProportionalFilter {

	fn apply(&mut self, x:f64) -> f64 { self.gain * x }

	fn initialize(&mut self) {}

}

/// Second-order proportional-plus-integral loop filter.  Output is the total
/// correction relative to the seeded frequency, not an increment.
pub struct PiFilter {
	pub k_prop: f64,
	pub k_int: f64,
	integrator: f64,
}

impl ScalarFilter for PiFilter {

	fn apply(&mut self, x:f64) -> f64 {
		self.integrator += self.k_int * x;
		self.k_prop * x + self.integrator
	}

	fn initialize(&mut self) { self.integrator = 0.0; }

}

/// Pure integrator with gain, for frequency-lock assistance where the discriminator
/// already measures a rate
pub struct IntegratorFilter {
	pub gain: f64,
	acc: f64,
}

impl ScalarFilter for IntegratorFilter {

	fn apply(&mut self, x:f64) -> f64 {
		self.acc += self.gain * x;
		self.acc
	}

	fn initialize(&mut self) { self.acc = 0.0; }

}

// Natural frequency from noise bandwidth and damping ratio
fn wn_from_bn(bn_hz:f64, zeta:f64) -> f64 { (bn_hz * 8.0 * zeta) / (4.0 * zeta * zeta + 1.0) }

/// Carrier loop filter for the given noise bandwidth, damping ratio and update
/// interval.  Phase error in cycles in, frequency correction in Hz out.
pub fn pll_filter(bn_hz:f64, zeta:f64, t_int:f64) -> PiFilter {
	let wn = wn_from_bn(bn_hz, zeta);
	PiFilter{ k_prop: 2.0 * zeta * wn, k_int: wn * wn * t_int, integrator: 0.0 }
}

/// Code loop filter.  Chip error in, chip-rate correction in chips/s out.
pub fn dll_filter(bn_hz:f64) -> ProportionalFilter {
	ProportionalFilter{ gain: 4.0 * bn_hz }
}

/// Frequency-assist filter for pull-in.  Frequency error in Hz in, accumulated
/// frequency correction in Hz out.
pub fn fll_filter(bn_hz:f64, t_int:f64) -> IntegratorFilter {
	IntegratorFilter{ gain: 4.0 * bn_hz * t_int, acc: 0.0 }
}
