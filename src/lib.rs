
use num_complex::Complex;

pub mod config;
pub mod filters;
pub mod gnss;
pub mod io;
pub mod rt;

/// Errors produced by the receiver core.  Decoder-internal parity failures are not
/// represented here; a bad subframe is discarded and the decoder re-synchronizes on
/// its own.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum GnssError {
	/// PRN outside 1..=32; a caller bug, returned immediately
	InvalidPrn(usize),
	/// Fewer samples supplied than the operation needs; recoverable by buffering more
	BufferTooShort{ needed:usize, got:usize },
	/// The sample producer ended; tracking stops gracefully
	SampleSourceClosed,
	/// Full-grid scan exceeded its deadline; best-effort result was returned with found=false
	AcquisitionTimedOut,
	/// Telemetry stream violated a structural contract
	InvalidTelemetryData(&'static str),
	/// Channel lost its signal; a state change, not a failure of the caller
	LossOfLock,
}

impl std::fmt::Display for GnssError {

	fn fmt(&self, f:&mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			GnssError::InvalidPrn(prn)                 => write!(f, "PRN {} outside 1..=32", prn),
			GnssError::BufferTooShort{ needed, got }   => write!(f, "buffer too short, needed {} samples, got {}", needed, got),
			GnssError::SampleSourceClosed              => write!(f, "sample source closed"),
			GnssError::AcquisitionTimedOut             => write!(f, "acquisition deadline exceeded"),
			GnssError::InvalidTelemetryData(why)       => write!(f, "invalid telemetry data: {}", why),
			GnssError::LossOfLock                      => write!(f, "loss of lock"),
		}
	}

}

impl std::error::Error for GnssError {}

/// A block of complex baseband samples with its sample rate and the time offset of the
/// first sample relative to capture start.  All core timing is derived from these two
/// numbers; conversions between samples and seconds are always explicit.
#[derive(Debug, Clone)]
pub struct IqBuffer {
	pub samples: Vec<Complex<f64>>,
	pub fs: f64,
	pub t0: f64,
}

impl IqBuffer {

	pub fn new(samples:Vec<Complex<f64>>, fs:f64, t0:f64) -> Self { Self{ samples, fs, t0 } }

	pub fn len(&self) -> usize { self.samples.len() }
	pub fn is_empty(&self) -> bool { self.samples.is_empty() }

	/// Duration covered by this buffer in seconds
	pub fn duration(&self) -> f64 { (self.samples.len() as f64) / self.fs }

	/// Time offset of the sample one past the end of this buffer
	pub fn t_end(&self) -> f64 { self.t0 + self.duration() }

	/// Borrow the n-th span of `len` samples as an epoch-sized view, or report how
	/// many samples would have been needed
	pub fn epoch(&self, n:usize, len:usize) -> Result<IqEpoch, GnssError> {
		let start = n * len;
		if self.samples.len() < start + len {
			Err(GnssError::BufferTooShort{ needed: start + len, got: self.samples.len() })
		} else {
			Ok(IqEpoch{ samples: &self.samples[start..(start+len)], fs: self.fs, t0: self.t0 + (start as f64)/self.fs })
		}
	}

}

/// Borrowed view of exactly one integration period of samples
#[derive(Debug, Clone, Copy)]
pub struct IqEpoch<'a> {
	pub samples: &'a [Complex<f64>],
	pub fs: f64,
	pub t0: f64,
}
