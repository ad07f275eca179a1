
use num_complex::Complex;

use crate::{GnssError, IqEpoch};
use crate::gnss::gps_l1_ca::{signal_modulation, CODE_LENGTH_CHIPS};

/// Carrier and code NCO state at the start of an integration period.  The correlator
/// reads this and never writes it; committing the advanced phases is the tracking
/// channel's job.
#[derive(Debug, Clone, Copy)]
pub struct NcoState {
	pub carrier_phase_rad: f64,
	pub carrier_freq_hz: f64,
	pub code_phase_chips: f64,
	pub code_freq_chips_per_sec: f64,
}

impl NcoState {

	/// Phases after integrating over `n` samples at sample rate `fs`, wrapped into
	/// [0, 2pi) and [0, 1023)
	pub fn advanced(&self, n:usize, fs:f64) -> NcoState {
		let dt = (n as f64) / fs;
		NcoState {
			carrier_phase_rad: (self.carrier_phase_rad + 2.0 * std::f64::consts::PI * self.carrier_freq_hz * dt)
				.rem_euclid(2.0 * std::f64::consts::PI),
			carrier_freq_hz: self.carrier_freq_hz,
			code_phase_chips: (self.code_phase_chips + self.code_freq_chips_per_sec * dt)
				.rem_euclid(CODE_LENGTH_CHIPS as f64),
			code_freq_chips_per_sec: self.code_freq_chips_per_sec,
		}
	}

}

/// Early, prompt and late accumulators for one integration period
#[derive(Debug, Clone, Copy)]
pub struct EplCorrelation {
	pub early:  Complex<f64>,
	pub prompt: Complex<f64>,
	pub late:   Complex<f64>,
}

impl EplCorrelation {

	pub fn power_early(&self)  -> f64 { self.early.norm_sqr() }
	pub fn power_prompt(&self) -> f64 { self.prompt.norm_sqr() }
	pub fn power_late(&self)   -> f64 { self.late.norm_sqr() }

}

/// E/P/L correlator for one satellite.  Scratch buffers are allocated once and reused
/// every epoch so the per-millisecond path allocates nothing.
pub struct Correlator {
	pub prn: usize,
	code: [i8; 1023],
	mix_i: Vec<f64>,
	mix_q: Vec<f64>,
	code_e: Vec<f64>,
	code_p: Vec<f64>,
	code_l: Vec<f64>,
}

impl Correlator {

	pub fn new(prn:usize) -> Result<Correlator, GnssError> {
		let code = signal_modulation::ca_code_bipolar(prn)?;
		Ok(Correlator{ prn, code, mix_i: vec![], mix_q: vec![], code_e: vec![], code_p: vec![], code_l: vec![] })
	}

	/// Correlates one integration period against the local carrier and the three code
	/// replicas at the given NCO state.  Returns the complex accumulators; the NCO
	/// state handed in is left untouched.
	pub fn correlate(&mut self, epoch:&IqEpoch, nco:&NcoState, spacing_chips:f64) -> EplCorrelation {
		let n = epoch.samples.len();
		self.ensure_scratch(n);

		let code_len = CODE_LENGTH_CHIPS as f64;
		let phase_rate = 2.0 * std::f64::consts::PI * nco.carrier_freq_hz / epoch.fs;
		let chip_rate = nco.code_freq_chips_per_sec / epoch.fs;

		// Stage the carrier-wiped samples and the three code replicas as flat arrays;
		// the accumulation kernel below runs over contiguous memory only
		for k in 0..n {
			let phase = nco.carrier_phase_rad + phase_rate * (k as f64);
			let (sin, cos) = phase.sin_cos();
			let s = epoch.samples[k];
			// conjugate mix: s * exp(-j*phase)
			self.mix_i[k] = s.re.mul_add(cos, s.im * sin);
			self.mix_q[k] = s.im.mul_add(cos, -(s.re * sin));

			let cp = nco.code_phase_chips + chip_rate * (k as f64);
			self.code_p[k] = self.code[(cp.rem_euclid(code_len)).floor() as usize] as f64;
			self.code_e[k] = self.code[((cp + spacing_chips).rem_euclid(code_len)).floor() as usize] as f64;
			self.code_l[k] = self.code[((cp - spacing_chips).rem_euclid(code_len)).floor() as usize] as f64;
		}

		let (early, prompt, late) = accumulate_epl(&self.mix_i, &self.mix_q, &self.code_e, &self.code_p, &self.code_l);

		EplCorrelation{ early, prompt, late }
	}

	fn ensure_scratch(&mut self, n:usize) {
		if self.mix_i.len() != n {
			self.mix_i  = vec![0.0; n];
			self.mix_q  = vec![0.0; n];
			self.code_e = vec![0.0; n];
			self.code_p = vec![0.0; n];
			self.code_l = vec![0.0; n];
		}
	}

}

// Triple code correlation over contiguous arrays.  Blocked in 8-wide strips with
// fused multiply-adds so an 8-lane SIMD path can replace it without changing the
// accumulation structure.
fn accumulate_epl(mix_i:&[f64], mix_q:&[f64], code_e:&[f64], code_p:&[f64], code_l:&[f64])
		-> (Complex<f64>, Complex<f64>, Complex<f64>) {

	let mut acc:[[f64; 8]; 6] = [[0.0; 8]; 6];

	let n = mix_i.len();
	let blocks = n / 8;
	for b in 0..blocks {
		let base = b * 8;
		for lane in 0..8 {
			let k = base + lane;
			acc[0][lane] = code_e[k].mul_add(mix_i[k], acc[0][lane]);
			acc[1][lane] = code_e[k].mul_add(mix_q[k], acc[1][lane]);
			acc[2][lane] = code_p[k].mul_add(mix_i[k], acc[2][lane]);
			acc[3][lane] = code_p[k].mul_add(mix_q[k], acc[3][lane]);
			acc[4][lane] = code_l[k].mul_add(mix_i[k], acc[4][lane]);
			acc[5][lane] = code_l[k].mul_add(mix_q[k], acc[5][lane]);
		}
	}

	// Tail shorter than one block
	for k in (blocks * 8)..n {
		acc[0][0] = code_e[k].mul_add(mix_i[k], acc[0][0]);
		acc[1][0] = code_e[k].mul_add(mix_q[k], acc[1][0]);
		acc[2][0] = code_p[k].mul_add(mix_i[k], acc[2][0]);
		acc[3][0] = code_p[k].mul_add(mix_q[k], acc[3][0]);
		acc[4][0] = code_l[k].mul_add(mix_i[k], acc[4][0]);
		acc[5][0] = code_l[k].mul_add(mix_q[k], acc[5][0]);
	}

	let sums:Vec<f64> = acc.iter().map(|lanes| lanes.iter().sum()).collect();
	(Complex{ re: sums[0], im: sums[1] },
	 Complex{ re: sums[2], im: sums[3] },
	 Complex{ re: sums[4], im: sums[5] })
}
