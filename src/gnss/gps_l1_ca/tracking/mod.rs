
use num_complex::Complex;
use serde::{Serialize, Deserialize};

use crate::{GnssError, IqEpoch};
use crate::filters::{self, ScalarFilter, PiFilter, ProportionalFilter, IntegratorFilter};
use crate::gnss::common::acquisition::AcquisitionResult;
use crate::gnss::gps_l1_ca::{CODE_LENGTH_CHIPS, CODE_PERIODS_PER_BIT, CODE_RATE_CHIPS_PER_SEC, L1_FREQ_HZ};
use crate::gnss::gps_l1_ca::correlator::{Correlator, EplCorrelation, NcoState};


const TWO_PI:f64 = 2.0 * std::f64::consts::PI;

/// Loop and supervision parameters of one tracking channel
#[derive(Debug, Clone)]
pub struct TrackingConfig {
	pub pll_bw_hz: f64,
	pub dll_bw_hz: f64,
	pub fll_bw_hz: f64,
	pub damping: f64,
	pub integration_ms: usize,
	pub el_spacing_chips: f64,
	pub cn0_loss_threshold_dbhz: f64,
	pub loss_dwell_ms: usize,
	pub phase_err_dwell_ms: usize,
	/// Epochs of frequency-lock assistance right after seeding
	pub fll_epochs: usize,
	/// Pull-in epochs allowed before giving up on bit synchronization
	pub pull_in_timeout_epochs: usize,
}

impl Default for TrackingConfig {

	fn default() -> Self {
		Self{ pll_bw_hz: 18.0, dll_bw_hz: 2.0, fll_bw_hz: 4.0, damping: std::f64::consts::FRAC_1_SQRT_2,
			integration_ms: 1, el_spacing_chips: 0.5, cn0_loss_threshold_dbhz: 28.0,
			loss_dwell_ms: 500, phase_err_dwell_ms: 200, fll_epochs: 100, pull_in_timeout_epochs: 2000 }
	}

}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ChannelState {
	Idle,
	Acquiring,
	PullIn,
	Tracking,
	Lost,
}

/// Per-epoch measurement snapshot.  Carrier phase is the accumulated NCO cycle count
/// since seeding; code phase is wrapped into one period.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Observables {
	pub prn: usize,
	pub code_phase_chips: f64,
	pub carrier_phase_cycles: f64,
	pub doppler_hz: f64,
	pub cn0_dbhz: f64,
	pub epoch_time_s: f64,
}

/// One navigation data bit with the time of its trailing edge
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NavBit {
	pub prn: usize,
	pub value: bool,
	pub epoch_time_s: f64,
}

#[derive(Debug)]
pub enum TrackingResult {
	/// Channel is not in a sample-consuming state
	NotReady,
	/// One epoch integrated; a bit rides along every twentieth epoch once synchronized
	Epoch{ observables:Observables, nav_bit:Option<NavBit> },
	/// Signal lost this epoch; observables are withdrawn and the channel waits for a reseed
	LostLock,
}

// Two-quadrant arctangent discriminator, insensitive to the data-bit sign.
// Output in radians.
pub fn costas_discriminator(prompt:Complex<f64>) -> f64 {
	if prompt.re == 0.0 { 0.0 } else { (prompt.im / prompt.re).atan() }
}

// Decision-directed phase discriminator, cheaper and tolerant of low SNR during
// pull-in.  Output in radians (small-error approximation).
pub fn decision_directed_discriminator(prompt:Complex<f64>) -> f64 {
	let norm = prompt.norm();
	if norm == 0.0 { 0.0 } else { prompt.re.signum() * prompt.im / norm }
}

// Cross-product frequency discriminator over consecutive prompts.  Output in Hz.
pub fn fll_cross_product(prev:Complex<f64>, cur:Complex<f64>, t_int:f64) -> f64 {
	let denom = prev.norm() * cur.norm();
	if denom == 0.0 { 0.0 } else {
		let cross = prev.re * cur.im - cur.re * prev.im;
		(cross / denom) / (TWO_PI * t_int)
	}
}

// Normalized early-minus-late envelope.  Odd in the code offset, zero at alignment,
// bounded to half the correlator spacing.
pub fn code_discriminator(epl:&EplCorrelation) -> f64 {
	let e = epl.early.norm();
	let l = epl.late.norm();
	if e + l == 0.0 { 0.0 } else { 0.5 * (e - l) / (e + l) }
}

// Sign-transition histogram over the 20 possible bit phases.  A real boundary
// concentrates flips in one bin; everything else is noise.
struct BitSync {
	bins: [u32; CODE_PERIODS_PER_BIT],
	locked_phase: Option<usize>,
	hold: usize,
}

impl BitSync {

	fn new() -> Self { Self{ bins: [0; CODE_PERIODS_PER_BIT], locked_phase: None, hold: 0 } }

	fn record_flip(&mut self, epoch:usize) {
		self.bins[epoch % CODE_PERIODS_PER_BIT] += 1;
	}

	// Peak bin against the mean of the rest; requires a handful of observed flips
	// before it will vote at all
	fn candidate(&self) -> Option<(usize, f64)> {
		let (peak_bin, peak) = self.bins.iter().enumerate().max_by_key(|(_, &c)| c).map(|(i, &c)| (i, c))?;
		if peak < 5 { return None; }
		let rest:u32 = self.bins.iter().sum::<u32>() - peak;
		let mean_rest = ((rest as f64) / ((CODE_PERIODS_PER_BIT - 1) as f64)).max(0.05);
		Some((peak_bin, (peak as f64) / mean_rest))
	}

	/// Feeds one epoch's verdict; returns the locked bit phase once the histogram
	/// ratio has held for 20 consecutive epochs
	fn update(&mut self, epoch:usize, ratio_threshold:f64) -> Option<usize> {
		if self.locked_phase.is_some() { return self.locked_phase; }
		if epoch < 200 { return None; }

		match self.candidate() {
			Some((bin, ratio)) if ratio > ratio_threshold => {
				self.hold += 1;
				if self.hold >= CODE_PERIODS_PER_BIT {
					self.locked_phase = Some(bin);
				}
			},
			_ => { self.hold = 0; },
		}
		self.locked_phase
	}

}

// Narrowband/wideband power C/N0 estimator over bit-length windows, smoothed with a
// light EMA so single bad windows don't whipsaw the loss logic
struct Cn0Estimator {
	nb_acc: Complex<f64>,
	wb_acc: f64,
	count: usize,
	value: Option<f64>,
}

impl Cn0Estimator {

	fn new() -> Self { Self{ nb_acc: Complex{ re: 0.0, im: 0.0 }, wb_acc: 0.0, count: 0, value: None } }

	fn push(&mut self, prompt:Complex<f64>, t_int:f64) {
		self.nb_acc += prompt;
		self.wb_acc += prompt.norm_sqr();
		self.count += 1;

		if self.count == CODE_PERIODS_PER_BIT {
			let nbp = self.nb_acc.norm_sqr();
			let wbp = self.wb_acc;
			let raw = if nbp > wbp && wbp > 0.0 {
				10.0 * ((nbp - wbp) / (wbp * t_int)).log10()
			} else {
				0.0
			};
			self.value = Some(match self.value {
				Some(v) => 0.9 * v + 0.1 * raw,
				None => raw,
			});
			self.nb_acc = Complex{ re: 0.0, im: 0.0 };
			self.wb_acc = 0.0;
			self.count = 0;
		}
	}

	fn restart_window(&mut self) {
		self.nb_acc = Complex{ re: 0.0, im: 0.0 };
		self.wb_acc = 0.0;
		self.count = 0;
	}

	fn db_hz(&self) -> f64 { self.value.unwrap_or(0.0) }

}

/// One satellite's code/carrier tracking channel.  Owns its correlator, NCOs, loop
/// filters, bit synchronizer and lock supervision; shares nothing with its siblings.
pub struct TrackingChannel {
	pub prn: usize,
	pub fs: f64,
	cfg: TrackingConfig,
	state: ChannelState,
	corr: Correlator,
	nco: NcoState,
	/// Frequency the current carrier loop correction is measured against
	ref_doppler_hz: f64,
	pll: PiFilter,
	dll: ProportionalFilter,
	fll: IntegratorFilter,
	prev_prompt: Option<Complex<f64>>,
	epoch_len: usize,
	t_int: f64,
	epoch_count: usize,
	carrier_cycles: f64,
	bit_sync: BitSync,
	bit_sum: f64,
	bit_epochs: usize,
	cn0: Cn0Estimator,
	low_cn0_epochs: usize,
	big_phase_err_epochs: usize,
	seed_t0: f64,
	first_epoch_pending: bool,
	last_observables: Option<Observables>,
}

impl TrackingChannel {

	pub fn new(prn:usize, fs:f64, cfg:TrackingConfig) -> Result<TrackingChannel, GnssError> {
		let t_int = (cfg.integration_ms as f64) * 1.0e-3;
		let epoch_len = (fs * t_int).round() as usize;
		let corr = Correlator::new(prn)?;

		Ok(TrackingChannel{
			prn, fs,
			pll: filters::pll_filter(cfg.pll_bw_hz, cfg.damping, t_int),
			dll: filters::dll_filter(cfg.dll_bw_hz),
			fll: filters::fll_filter(cfg.fll_bw_hz, t_int),
			cfg,
			state: ChannelState::Idle,
			corr,
			nco: NcoState{ carrier_phase_rad: 0.0, carrier_freq_hz: 0.0, code_phase_chips: 0.0, code_freq_chips_per_sec: CODE_RATE_CHIPS_PER_SEC },
			ref_doppler_hz: 0.0,
			prev_prompt: None,
			epoch_len, t_int,
			epoch_count: 0,
			carrier_cycles: 0.0,
			bit_sync: BitSync::new(),
			bit_sum: 0.0,
			bit_epochs: 0,
			cn0: Cn0Estimator::new(),
			low_cn0_epochs: 0,
			big_phase_err_epochs: 0,
			seed_t0: 0.0,
			first_epoch_pending: false,
			last_observables: None,
		})
	}

	pub fn state(&self) -> ChannelState { self.state }
	pub fn cn0_dbhz(&self) -> f64 { self.cn0.db_hz() }
	pub fn carrier_freq_hz(&self) -> f64 { self.nco.carrier_freq_hz }
	pub fn code_phase_chips(&self) -> f64 { self.nco.code_phase_chips }
	pub fn samples_per_epoch(&self) -> usize { self.epoch_len }
	/// Last published measurement, withdrawn on loss of lock
	pub fn observables(&self) -> Option<Observables> { self.last_observables }

	/// Marks the channel as waiting on an acquisition engine result
	pub fn start_acquisition(&mut self) {
		self.state = ChannelState::Acquiring;
	}

	/// Operator retry path out of `Lost`
	pub fn reset(&mut self) {
		self.state = ChannelState::Idle;
		self.last_observables = None;
	}

	/// Seeds the loops from a detection and enters pull-in.  The next epoch handed to
	/// `step` may start later than the acquisition buffer did; the code and carrier
	/// phases are propagated across that gap on first use.
	pub fn seed(&mut self, acq:&AcquisitionResult) {
		self.nco = NcoState{
			carrier_phase_rad: 0.0,
			carrier_freq_hz: acq.doppler_hz,
			code_phase_chips: acq.code_phase,
			code_freq_chips_per_sec: CODE_RATE_CHIPS_PER_SEC * (1.0 + acq.doppler_hz / L1_FREQ_HZ),
		};
		self.ref_doppler_hz = acq.doppler_hz;
		self.pll.initialize();
		self.dll.initialize();
		self.fll.initialize();
		self.prev_prompt = None;
		self.epoch_count = 0;
		self.carrier_cycles = 0.0;
		self.bit_sync = BitSync::new();
		self.bit_sum = 0.0;
		self.bit_epochs = 0;
		self.cn0 = Cn0Estimator::new();
		self.low_cn0_epochs = 0;
		self.big_phase_err_epochs = 0;
		self.seed_t0 = acq.t0;
		self.first_epoch_pending = true;
		self.last_observables = None;
		self.state = ChannelState::PullIn;
	}

	/// Integrates exactly one epoch of samples and runs every loop once.  Only
	/// contract violations surface as errors; losing the signal is a state change
	/// reported in the result.
	pub fn step(&mut self, epoch:&IqEpoch) -> Result<TrackingResult, GnssError> {
		match self.state {
			ChannelState::Idle | ChannelState::Acquiring | ChannelState::Lost => return Ok(TrackingResult::NotReady),
			ChannelState::PullIn | ChannelState::Tracking => {},
		}

		if epoch.samples.len() != self.epoch_len {
			return Err(GnssError::BufferTooShort{ needed: self.epoch_len, got: epoch.samples.len() });
		}

		if self.first_epoch_pending {
			self.first_epoch_pending = false;
			let gap = epoch.t0 - self.seed_t0;
			if gap.abs() > 0.5 / self.fs {
				self.nco.code_phase_chips = (self.nco.code_phase_chips + self.nco.code_freq_chips_per_sec * gap)
					.rem_euclid(CODE_LENGTH_CHIPS as f64);
				self.nco.carrier_phase_rad = (self.nco.carrier_phase_rad + TWO_PI * self.nco.carrier_freq_hz * gap)
					.rem_euclid(TWO_PI);
			}
		}

		let epl = self.corr.correlate(epoch, &self.nco, self.cfg.el_spacing_chips);
		let prompt = epl.prompt;

		// Carrier loop: frequency assistance first, then the phase loop once the
		// frequency error is small enough for the Costas detector to hold
		let phase_err_rad = if self.state == ChannelState::PullIn {
			decision_directed_discriminator(prompt)
		} else {
			costas_discriminator(prompt)
		};

		if self.epoch_count < self.cfg.fll_epochs {
			if let Some(prev) = self.prev_prompt {
				let f_err = fll_cross_product(prev, prompt, self.t_int);
				self.nco.carrier_freq_hz = self.ref_doppler_hz + self.fll.apply(f_err);
			}
			if self.epoch_count + 1 == self.cfg.fll_epochs {
				// Hand the frequency the FLL settled on over to the phase loop and
				// drop the sign transitions collected while the carrier was still
				// slewing
				self.ref_doppler_hz = self.nco.carrier_freq_hz;
				self.pll.initialize();
				self.bit_sync = BitSync::new();
			}
		} else {
			self.nco.carrier_freq_hz = self.ref_doppler_hz + self.pll.apply(phase_err_rad / TWO_PI);
		}

		// Code loop rides on the carrier: scale the chipping rate by the observed
		// doppler, then correct the residual with the early-late detector
		let tau_err = code_discriminator(&epl);
		self.nco.code_freq_chips_per_sec =
			CODE_RATE_CHIPS_PER_SEC * (1.0 + self.nco.carrier_freq_hz / L1_FREQ_HZ) + self.dll.apply(tau_err);

		// Commit the epoch: advance both NCOs at the updated rates
		self.nco = self.nco.advanced(self.epoch_len, self.fs);
		self.carrier_cycles += self.nco.carrier_freq_hz * self.t_int;
		let epoch_end = epoch.t0 + self.t_int;

		// Bit synchronization bookkeeping
		if let Some(prev) = self.prev_prompt {
			if (prev.re > 0.0) != (prompt.re > 0.0) {
				self.bit_sync.record_flip(self.epoch_count);
			}
		}
		self.prev_prompt = Some(prompt);

		let mut nav_bit = None;
		match self.state {
			ChannelState::PullIn => {
				if self.bit_sync.update(self.epoch_count, 4.0).is_some() {
					self.state = ChannelState::Tracking;
					self.bit_sum = 0.0;
					self.bit_epochs = 0;
					self.cn0.restart_window();
				} else if self.epoch_count >= self.cfg.pull_in_timeout_epochs {
					return Ok(self.declare_lost());
				}
			},
			ChannelState::Tracking => {
				let bit_phase = self.bit_sync.locked_phase.expect("tracking requires bit sync");
				if self.epoch_count % CODE_PERIODS_PER_BIT == bit_phase {
					if self.bit_epochs == CODE_PERIODS_PER_BIT {
						nav_bit = Some(NavBit{ prn: self.prn, value: self.bit_sum > 0.0, epoch_time_s: epoch.t0 });
					}
					self.bit_sum = 0.0;
					self.bit_epochs = 0;
				}
				self.bit_sum += prompt.re;
				self.bit_epochs += 1;
			},
			_ => unreachable!(),
		}

		self.cn0.push(prompt, self.t_int);

		// Lock supervision only once the channel claims to be tracking
		if self.state == ChannelState::Tracking {
			if self.cn0.db_hz() < self.cfg.cn0_loss_threshold_dbhz { self.low_cn0_epochs += 1; } else { self.low_cn0_epochs = 0; }
			if phase_err_rad.abs() > std::f64::consts::FRAC_PI_4 { self.big_phase_err_epochs += 1; } else { self.big_phase_err_epochs = 0; }

			let epochs_per_ms = 1.0 / (self.t_int * 1000.0);
			if (self.low_cn0_epochs as f64) > (self.cfg.loss_dwell_ms as f64) * epochs_per_ms
					|| (self.big_phase_err_epochs as f64) > (self.cfg.phase_err_dwell_ms as f64) * epochs_per_ms {
				return Ok(self.declare_lost());
			}
		}

		self.epoch_count += 1;

		let observables = Observables{
			prn: self.prn,
			code_phase_chips: self.nco.code_phase_chips,
			carrier_phase_cycles: self.carrier_cycles,
			doppler_hz: self.nco.carrier_freq_hz,
			cn0_dbhz: self.cn0.db_hz(),
			epoch_time_s: epoch_end,
		};
		self.last_observables = Some(observables);

		Ok(TrackingResult::Epoch{ observables, nav_bit })
	}

	fn declare_lost(&mut self) -> TrackingResult {
		self.state = ChannelState::Lost;
		self.last_observables = None;
		self.prev_prompt = None;
		TrackingResult::LostLock
	}

}
