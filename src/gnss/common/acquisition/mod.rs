
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Serialize, Deserialize};

use crate::{GnssError, IqBuffer};

pub mod pcps;

pub use self::pcps::Acquisition;

/// Search grid and detection parameters for a full acquisition scan
#[derive(Debug, Clone)]
pub struct AcqConfig {
	pub doppler_max_hz: f64,
	pub doppler_step_hz: f64,
	pub threshold: f64,
	/// Wall-clock budget for one full-grid scan; exceeded scans return their best
	/// candidate with `found = false`
	pub deadline: Duration,
}

impl Default for AcqConfig {

	fn default() -> Self {
		Self{ doppler_max_hz: 5000.0, doppler_step_hz: 500.0, threshold: 2.5, deadline: Duration::from_secs(2) }
	}

}

/// Outcome of one PRN search.  `code_phase` is the received code phase in chips at
/// the first sample of the analyzed buffer; `t0` carries that buffer's time offset so
/// a channel can propagate the phase forward before locking on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AcquisitionResult {
	pub found: bool,
	pub prn: usize,
	pub code_phase: f64,
	pub doppler_hz: f64,
	pub peak_ratio: f64,
	pub snr_db: f64,
	pub t0: f64,
}

/// Searches every requested PRN independently over a bounded worker pool.  Engines
/// are built per task so FFT plans never cross threads; the shared deadline covers
/// the whole scan.
pub fn search_all(buffer:&IqBuffer, prns:&[usize], cfg:&AcqConfig) -> Vec<Result<AcquisitionResult, GnssError>> {
	let deadline = Instant::now() + cfg.deadline;
	prns.par_iter().map(|&prn| {
		let mut acq = Acquisition::new(prn, buffer.fs, cfg.clone())?;
		acq.search(buffer, Some(deadline))
	}).collect()
}
