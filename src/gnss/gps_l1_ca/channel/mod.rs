
use std::sync::Arc;

use rayon::prelude::*;

use crate::{GnssError, IqBuffer, IqEpoch};
use crate::gnss::common::acquisition::{self, AcqConfig, AcquisitionResult};
use crate::gnss::gps_l1_ca::ephemeris::{Ephemeris, EphemerisUpdate};
use crate::gnss::gps_l1_ca::telemetry_decode::NavDecoder;
use crate::gnss::gps_l1_ca::tracking::{ChannelState, Observables, TrackingChannel, TrackingConfig, TrackingResult};
use crate::rt::Latest;

/// Owns one tracking channel per requested satellite plus the shared navigation
/// decoder, drives them in lockstep over each sample batch, and publishes per-channel
/// observables through lock-free snapshot cells.
pub struct ChannelManager {
	pub fs: f64,
	channels: Vec<TrackingChannel>,
	snapshots: Vec<Arc<Latest<Observables>>>,
	decoder: NavDecoder,
	acq_cfg: AcqConfig,
	epoch_len: usize,
}

impl ChannelManager {

	pub fn new(fs:f64, prn_list:&[usize], trk_cfg:TrackingConfig, acq_cfg:AcqConfig) -> Result<ChannelManager, GnssError> {
		let mut channels = vec![];
		for &prn in prn_list {
			channels.push(TrackingChannel::new(prn, fs, trk_cfg.clone())?);
		}
		let epoch_len = channels.first().map(|c| c.samples_per_epoch())
			.unwrap_or((fs * 1.0e-3).round() as usize);
		let snapshots = channels.iter().map(|_| Arc::new(Latest::new())).collect();

		Ok(ChannelManager{ fs, channels, snapshots, decoder: NavDecoder::new(), acq_cfg, epoch_len })
	}

	pub fn samples_per_epoch(&self) -> usize { self.epoch_len }
	pub fn channels(&self) -> &[TrackingChannel] { &self.channels }
	pub fn decoder(&self) -> &NavDecoder { &self.decoder }

	/// Ephemeris for a satellite, if its publication rule has been met
	pub fn ephemeris(&self, prn:usize) -> Option<&Ephemeris> { self.decoder.ephemeris(prn) }

	/// Cloneable read handle for one channel's latest observables; safe to poll from
	/// any thread while the manager keeps stepping
	pub fn snapshot_handle(&self, idx:usize) -> Arc<Latest<Observables>> { self.snapshots[idx].clone() }

	/// Runs the acquisition engine over every idle or lost channel and seeds the
	/// hits.  Returns everything the scan produced, found or not.
	pub fn acquire_idle(&mut self, buffer:&IqBuffer) -> Vec<AcquisitionResult> {
		let idle:Vec<usize> = (0..self.channels.len())
			.filter(|&i| matches!(self.channels[i].state(), ChannelState::Idle | ChannelState::Lost))
			.collect();
		if idle.is_empty() { return vec![]; }

		let prns:Vec<usize> = idle.iter().map(|&i| self.channels[i].prn).collect();
		for &i in &idle { self.channels[i].start_acquisition(); }

		let mut results = vec![];
		for (pos, outcome) in acquisition::search_all(buffer, &prns, &self.acq_cfg).into_iter().enumerate() {
			let ch = &mut self.channels[idle[pos]];
			match outcome {
				Ok(result) => {
					if result.found { ch.seed(&result); } else { ch.reset(); }
					results.push(result);
				},
				Err(_) => { ch.reset(); },
			}
		}
		results
	}

	/// Advances every active channel over the same epoch.  Channels share no mutable
	/// state, so they run on the worker pool; bits are routed into the decoder in
	/// channel order afterwards.
	pub fn step_epoch(&mut self, epoch:&IqEpoch) -> Result<Vec<EphemerisUpdate>, GnssError> {
		let outcomes:Vec<Result<TrackingResult, GnssError>> = self.channels.par_iter_mut()
			.map(|ch| ch.step(epoch))
			.collect();

		let mut updates = vec![];
		for (i, outcome) in outcomes.into_iter().enumerate() {
			match outcome? {
				TrackingResult::Epoch{ observables, nav_bit } => {
					self.snapshots[i].publish(Some(observables));
					if let Some(bit) = nav_bit {
						if let Some(update) = self.decoder.feed(bit.prn, bit.value, bit.epoch_time_s)? {
							updates.push(update);
						}
					}
				},
				TrackingResult::LostLock => {
					self.snapshots[i].publish(None);
				},
				TrackingResult::NotReady => {},
			}
		}
		Ok(updates)
	}

	/// Distributes a whole buffer epoch by epoch; the tail shorter than one epoch is
	/// left to the caller's next buffer
	pub fn step_buffer(&mut self, buffer:&IqBuffer) -> Result<Vec<EphemerisUpdate>, GnssError> {
		let mut updates = vec![];
		let n_epochs = buffer.len() / self.epoch_len;
		for e in 0..n_epochs {
			let epoch = buffer.epoch(e, self.epoch_len)?;
			updates.append(&mut self.step_epoch(&epoch)?);
		}
		Ok(updates)
	}

}
