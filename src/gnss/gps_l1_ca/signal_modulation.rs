
use num_complex::Complex;

use crate::GnssError;
use crate::gnss::gps_l1_ca::{CODE_LENGTH_CHIPS, CODE_RATE_CHIPS_PER_SEC};

// G2 output tap pairs per PRN, 1-indexed register positions from the GPS ICD phase
// assignment table.  Only the pair matters; the equivalent delay formulation produces
// the same sequences.
const G2_TAP_PAIRS:[(usize, usize); 32] = [
	(2,6),  (3,7),  (4,8),  (5,9),  (1,9),  (2,10), (1,8),  (2,9),
	(3,10), (2,3),  (3,4),  (5,6),  (6,7),  (7,8),  (8,9),  (9,10),
	(1,4),  (2,5),  (3,6),  (4,7),  (5,8),  (6,9),  (1,3),  (4,6),
	(5,7),  (6,8),  (7,9),  (8,10), (1,6),  (2,7),  (3,8),  (4,9)];

fn check_prn(prn:usize) -> Result<(), GnssError> {
	if prn >= 1 && prn <= 32 { Ok(()) } else { Err(GnssError::InvalidPrn(prn)) }
}

// Runs both 10-bit LFSRs for one full period and returns the chips along with the
// final register states.  Both registers are back to all-ones after 1023 steps; the
// test module uses the returned states to verify that sequence-length property.
fn run_generator(prn:usize) -> ([u8; 1023], [u8; 10], [u8; 10]) {
	let (s1, s2) = G2_TAP_PAIRS[prn - 1];
	let mut g1:[u8; 10] = [1; 10];
	let mut g2:[u8; 10] = [1; 10];
	let mut chips:[u8; 1023] = [0; 1023];

	for chip in chips.iter_mut() {
		// Tap the registers before shifting
		*chip = g1[9] ^ g2[s1 - 1] ^ g2[s2 - 1];

		let fb1 = g1[2] ^ g1[9];
		let fb2 = g2[1] ^ g2[2] ^ g2[5] ^ g2[7] ^ g2[8] ^ g2[9];

		for i in (1..10).rev() {
			g1[i] = g1[i-1];
			g2[i] = g2[i-1];
		}
		g1[0] = fb1;
		g2[0] = fb2;
	}

	(chips, g1, g2)
}

/// One period of the C/A code for this satellite as 0/1 chips
pub fn ca_code(prn:usize) -> Result<[u8; 1023], GnssError> {
	check_prn(prn)?;
	let (chips, _, _) = run_generator(prn);
	Ok(chips)
}

/// One period of the C/A code as bipolar chips, 0 mapped to -1 and 1 to +1
pub fn ca_code_bipolar(prn:usize) -> Result<[i8; 1023], GnssError> {
	let chips = ca_code(prn)?;
	let mut ans:[i8; 1023] = [0; 1023];
	for (b, c) in ans.iter_mut().zip(chips.iter()) {
		*b = if *c == 1 { 1 } else { -1 };
	}
	Ok(ans)
}

/// One period of the bipolar code on the complex plane, one chip per element
pub fn prn_complex(prn:usize) -> Result<Vec<Complex<f64>>, GnssError> {
	let chips = ca_code_bipolar(prn)?;
	Ok(chips.iter().map(|&c| Complex{ re: c as f64, im: 0.0 }).collect())
}

/// The bipolar code resampled to `num_samples` at sample rate `fs` by nearest-neighbor
/// chip lookup.  Spans as many code periods as the requested length covers.
pub fn prn_sampled(prn:usize, fs:f64, num_samples:usize) -> Result<Vec<i8>, GnssError> {
	let chips = ca_code_bipolar(prn)?;
	let chips_per_sample = CODE_RATE_CHIPS_PER_SEC / fs;
	Ok((0..num_samples)
		.map(|i| chips[((i as f64 * chips_per_sample).floor() as usize) % CODE_LENGTH_CHIPS])
		.collect())
}

/// One code period (1 ms) of the resampled bipolar code
pub fn prn_sampled_one_period(prn:usize, fs:f64) -> Result<Vec<i8>, GnssError> {
	prn_sampled(prn, fs, super::samples_per_code_period(fs))
}
