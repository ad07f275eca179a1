
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use byteorder::{LittleEndian, ReadBytesExt};
use num_complex::Complex;

use crate::{GnssError, IqBuffer};
use crate::rt::SampleRing;

/// Why a pull produced no samples.  `TimedOut` is recoverable; `Closed` means the
/// producer is gone for good.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceError {
	TimedOut,
	Closed,
}

impl SourceError {

	/// The core-facing error for a pull that can no longer succeed; timeouts are
	/// retryable and have no core equivalent
	pub fn as_gnss(self) -> Option<GnssError> {
		match self {
			SourceError::Closed => Some(GnssError::SampleSourceClosed),
			SourceError::TimedOut => None,
		}
	}

}

/// Anything that can deliver timestamped complex baseband samples at a known rate.
/// The source owns DC removal and gain control; the core just consumes unit-ish
/// normalized samples.
pub trait SampleSource {

	fn initialize(&mut self, device_index:usize, sample_rate_hz:f64, center_freq_hz:f64) -> Result<(), GnssError>;
	fn start(&mut self) -> Result<(), GnssError>;
	fn stop(&mut self);

	/// Blocks for up to `timeout_ms` waiting for `n` samples.  May return fewer on a
	/// clean end of stream; returns `Closed` once drained.
	fn pull_samples(&mut self, n:usize, timeout_ms:u32) -> Result<IqBuffer, SourceError>;

	fn sample_rate(&self) -> f64;

}

const I16_SCALE:f64 = 1.0 / 32768.0;

/// Little-endian interleaved i16 IQ capture file, normalized on read.  The offline
/// path used by the binaries and the end-to-end tests.
pub struct FileSource {
	reader: BufReader<File>,
	fs: f64,
	idx: usize,
}

impl FileSource {

	pub fn new(filename:&str, fs:f64) -> std::io::Result<FileSource> {
		Ok(FileSource{ reader: BufReader::new(File::open(filename)?), fs, idx: 0 })
	}

}

impl SampleSource for FileSource {

	fn initialize(&mut self, _device_index:usize, sample_rate_hz:f64, _center_freq_hz:f64) -> Result<(), GnssError> {
		self.fs = sample_rate_hz;
		Ok(())
	}

	fn start(&mut self) -> Result<(), GnssError> { Ok(()) }
	fn stop(&mut self) {}

	fn pull_samples(&mut self, n:usize, _timeout_ms:u32) -> Result<IqBuffer, SourceError> {
		let t0 = (self.idx as f64) / self.fs;
		let mut samples:Vec<Complex<f64>> = Vec::with_capacity(n);

		for _ in 0..n {
			match (self.reader.read_i16::<LittleEndian>(), self.reader.read_i16::<LittleEndian>()) {
				(Ok(re), Ok(im)) => {
					samples.push(Complex{ re: (re as f64) * I16_SCALE, im: (im as f64) * I16_SCALE });
					self.idx += 1;
				},
				(_, _) => break,
			}
		}

		if samples.is_empty() {
			Err(SourceError::Closed)
		} else {
			Ok(IqBuffer::new(samples, self.fs, t0))
		}
	}

	fn sample_rate(&self) -> f64 { self.fs }

}

/// Producer half of a live sample stream; hand this to the SDR callback thread
pub struct RingProducer {
	ring: Arc<SampleRing<Complex<f64>>>,
	closed: Arc<AtomicBool>,
}

impl RingProducer {

	pub fn push(&self, samples:&[Complex<f64>]) {
		self.ring.push_slice(samples);
	}

	pub fn close(&self) {
		self.closed.store(true, Ordering::Release);
	}

}

/// Consumer half: a `SampleSource` over the shared drop-oldest ring.  Sample
/// timestamps stay honest across overruns because the ring's overflow counter is
/// folded into the stream position.
pub struct RingSource {
	ring: Arc<SampleRing<Complex<f64>>>,
	closed: Arc<AtomicBool>,
	fs: f64,
	consumed: usize,
}

impl RingSource {

	/// Samples dropped so far because the consumer fell behind
	pub fn overflow_count(&self) -> u64 { self.ring.overflow_count() }

}

/// Builds a connected producer/consumer pair around a bounded ring
pub fn ring_channel(capacity:usize, fs:f64) -> (RingProducer, RingSource) {
	let ring = Arc::new(SampleRing::new(capacity));
	let closed = Arc::new(AtomicBool::new(false));
	(RingProducer{ ring: ring.clone(), closed: closed.clone() },
	 RingSource{ ring, closed, fs, consumed: 0 })
}

impl SampleSource for RingSource {

	fn initialize(&mut self, _device_index:usize, sample_rate_hz:f64, _center_freq_hz:f64) -> Result<(), GnssError> {
		self.fs = sample_rate_hz;
		Ok(())
	}

	fn start(&mut self) -> Result<(), GnssError> { Ok(()) }
	fn stop(&mut self) { self.closed.store(true, Ordering::Release); }

	fn pull_samples(&mut self, n:usize, timeout_ms:u32) -> Result<IqBuffer, SourceError> {
		let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
		let mut samples:Vec<Complex<f64>> = vec![Complex{ re: 0.0, im: 0.0 }; n];
		let mut filled = 0usize;
		// Position of the first sample in the produced stream, dropped samples
		// included
		let mut t0 = None;

		loop {
			if filled == 0 {
				t0 = Some(((self.consumed as u64 + self.ring.overflow_count()) as f64) / self.fs);
			}
			let got = self.ring.pop_slice(&mut samples[filled..]);
			filled += got;
			self.consumed += got;
			if filled == n { break; }

			if self.closed.load(Ordering::Acquire) && self.ring.is_empty() {
				if filled == 0 { return Err(SourceError::Closed); }
				break;
			}
			if Instant::now() >= deadline {
				if filled == 0 { return Err(SourceError::TimedOut); }
				break;
			}
			std::thread::sleep(Duration::from_micros(200));
		}

		samples.truncate(filled);
		Ok(IqBuffer::new(samples, self.fs, t0.unwrap_or(0.0)))
	}

	fn sample_rate(&self) -> f64 { self.fs }

}

#[cfg(test)]
mod tests {

	use std::io::Write;

	use super::*;

	#[test]
	fn file_source_reads_normalized_iq() {
		let path = std::env::temp_dir().join("rust_gps_file_source_test.iq");
		{
			let mut f = File::create(&path).unwrap();
			for v in [16384i16, -16384, 0, 32767, -32768, 100].iter() {
				f.write_all(&v.to_le_bytes()).unwrap();
			}
		}

		let mut src = FileSource::new(path.to_str().unwrap(), 2.048e6).unwrap();
		let buf = src.pull_samples(2, 0).unwrap();
		assert_eq!(buf.len(), 2);
		assert_eq!(buf.t0, 0.0);
		assert!((buf.samples[0].re - 0.5).abs() < 1e-12);
		assert!((buf.samples[0].im + 0.5).abs() < 1e-12);

		// Third pair exists, then the stream ends
		let buf = src.pull_samples(8, 0).unwrap();
		assert_eq!(buf.len(), 1);
		assert!((buf.t0 - 2.0 / 2.048e6).abs() < 1e-15);
		assert!(matches!(src.pull_samples(1, 0), Err(SourceError::Closed)));

		std::fs::remove_file(&path).ok();
	}

	#[test]
	fn ring_source_times_out_when_starved() {
		let (_producer, mut source) = ring_channel(1024, 1000.0);
		assert!(matches!(source.pull_samples(4, 5), Err(SourceError::TimedOut)));
	}

	#[test]
	fn ring_source_delivers_and_closes() {
		let (producer, mut source) = ring_channel(1024, 1000.0);
		let chunk:Vec<Complex<f64>> = (0..10).map(|i| Complex{ re: i as f64, im: 0.0 }).collect();
		producer.push(&chunk);

		let buf = source.pull_samples(10, 100).unwrap();
		assert_eq!(buf.len(), 10);
		assert_eq!(buf.t0, 0.0);
		assert_eq!(buf.samples[9].re, 9.0);

		producer.close();
		assert!(matches!(source.pull_samples(1, 10), Err(SourceError::Closed)));
	}

	#[test]
	fn ring_source_timestamps_skip_dropped_samples() {
		let (producer, mut source) = ring_channel(16, 1000.0);
		let chunk:Vec<Complex<f64>> = (0..40).map(|i| Complex{ re: i as f64, im: 0.0 }).collect();
		producer.push(&chunk);

		// 24 samples were dropped; time starts at their position
		let buf = source.pull_samples(16, 10).unwrap();
		assert_eq!(source.overflow_count(), 24);
		assert!((buf.t0 - 24.0 / 1000.0).abs() < 1e-12);
		assert_eq!(buf.samples[0].re, 24.0);
	}

}
