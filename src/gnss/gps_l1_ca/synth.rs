
use num_complex::Complex;

use crate::IqBuffer;
use crate::gnss::gps_l1_ca::{signal_modulation, CODE_LENGTH_CHIPS, CODE_PERIODS_PER_BIT, CODE_RATE_CHIPS_PER_SEC, L1_FREQ_HZ};

// xorshift64* followed by Box-Muller; deterministic for a given seed so every test
// renders the same waveform
struct GaussianSource {
	state: u64,
	spare: Option<f64>,
}

impl GaussianSource {

	fn new(seed:u64) -> Self { Self{ state: seed.max(1), spare: None } }

	fn next_uniform(&mut self) -> f64 {
		let mut x = self.state;
		x ^= x >> 12;
		x ^= x << 25;
		x ^= x >> 27;
		self.state = x;
		let y = x.wrapping_mul(0x2545F4914F6CDD1D);
		((y >> 11) as f64) / ((1u64 << 53) as f64)
	}

	fn next_gaussian(&mut self) -> f64 {
		if let Some(z) = self.spare.take() { return z; }
		let u1 = self.next_uniform().max(1e-16);
		let u2 = self.next_uniform();
		let r = (-2.0 * u1.ln()).sqrt();
		let (s, c) = (2.0 * std::f64::consts::PI * u2).sin_cos();
		self.spare = Some(r * s);
		r * c
	}

}

/// Synthetic L1 C/A baseband signal description.  Builder-style; `generate` renders
/// the waveform.
#[derive(Debug, Clone)]
pub struct SignalParams {
	pub prn: usize,
	pub fs: f64,
	pub doppler: f64,
	pub code_phase: f64,
	pub carrier_phase: f64,
	pub snr_db: Option<f64>,
	pub data_bits: Option<Vec<u8>>,
}

impl SignalParams {

	pub fn new(prn:usize, fs:f64) -> Self {
		Self{ prn, fs, doppler: 0.0, code_phase: 0.0, carrier_phase: 0.0, snr_db: None, data_bits: None }
	}

	pub fn doppler_hz(mut self, hz:f64) -> Self { self.doppler = hz; self }
	pub fn code_phase_chips(mut self, chips:f64) -> Self { self.code_phase = chips; self }
	pub fn carrier_phase_rad(mut self, rad:f64) -> Self { self.carrier_phase = rad; self }
	pub fn snr_db(mut self, db:f64) -> Self { self.snr_db = Some(db); self }
	/// 50 bps data pattern, cycled; bit edges land on 20-code-period boundaries of the
	/// transmitted chip count
	pub fn data_bits(mut self, bits:Vec<u8>) -> Self { self.data_bits = Some(bits); self }

	pub fn generate(&self, duration_s:f64, seed:u64) -> IqBuffer {
		let n = (duration_s * self.fs).round() as usize;
		let chips = signal_modulation::ca_code_bipolar(self.prn).expect("synth PRN out of range");

		// The code rate moves with the carrier the way a real satellite's does
		let chip_rate = CODE_RATE_CHIPS_PER_SEC * (1.0 + self.doppler / L1_FREQ_HZ);
		let chips_per_bit = (CODE_LENGTH_CHIPS * CODE_PERIODS_PER_BIT) as f64;

		let mut noise = GaussianSource::new(seed);
		let sigma = self.snr_db.map(|snr| (10.0f64).powf(-snr / 20.0) / (2.0f64).sqrt());

		let samples:Vec<Complex<f64>> = (0..n).map(|k| {
			let t = (k as f64) / self.fs;
			let chip_count = self.code_phase + chip_rate * t;
			let chip = chips[(chip_count.rem_euclid(CODE_LENGTH_CHIPS as f64)).floor() as usize] as f64;

			let data = match &self.data_bits {
				Some(bits) if !bits.is_empty() => {
					let bit_idx = (chip_count / chips_per_bit).floor() as usize;
					if bits[bit_idx % bits.len()] == 1 { 1.0 } else { -1.0 }
				},
				_ => 1.0,
			};

			let phase = self.carrier_phase + 2.0 * std::f64::consts::PI * self.doppler * t;
			let mut s = Complex{ re: phase.cos(), im: phase.sin() } * (chip * data);
			if let Some(sigma) = sigma {
				s += Complex{ re: sigma * noise.next_gaussian(), im: sigma * noise.next_gaussian() };
			}
			s
		}).collect();

		IqBuffer::new(samples, self.fs, 0.0)
	}

}
