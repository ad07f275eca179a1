
use std::time::Duration;

use serde::Deserialize;

use crate::GnssError;
use crate::gnss::common::acquisition::AcqConfig;
use crate::gnss::gps_l1_ca::tracking::TrackingConfig;

/// Receiver-wide configuration.  Every field has the documented default, so a TOML
/// file only needs to name what it changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
	pub sample_rate_hz: f64,
	pub center_freq_hz: f64,
	pub doppler_search_hz: f64,
	pub doppler_step_hz: f64,
	pub acq_threshold: f64,
	pub acq_deadline_ms: u64,
	pub pll_bw_hz: f64,
	pub dll_bw_hz: f64,
	pub integration_ms: usize,
	pub el_spacing_chips: f64,
	pub cn0_loss_threshold_dbhz: f64,
	pub loss_dwell_ms: usize,
	pub ring_capacity_samples: usize,
	pub prn_list: Vec<usize>,
}

impl Default for ReceiverConfig {

	fn default() -> Self {
		Self{
			sample_rate_hz: 2.048e6,
			center_freq_hz: 1.57542e9,
			doppler_search_hz: 5000.0,
			doppler_step_hz: 500.0,
			acq_threshold: 2.5,
			acq_deadline_ms: 2000,
			pll_bw_hz: 18.0,
			dll_bw_hz: 2.0,
			integration_ms: 1,
			el_spacing_chips: 0.5,
			cn0_loss_threshold_dbhz: 28.0,
			loss_dwell_ms: 500,
			ring_capacity_samples: 1 << 20,
			prn_list: (1..=32).collect(),
		}
	}

}

impl ReceiverConfig {

	pub fn from_toml_file(path:&str) -> Result<Self, Box<dyn std::error::Error>> {
		let text = std::fs::read_to_string(path)?;
		let config:ReceiverConfig = toml::from_str(&text)?;
		config.validate()?;
		Ok(config)
	}

	/// Configuration mistakes fail loudly, like any other caller contract violation
	pub fn validate(&self) -> Result<(), GnssError> {
		for &prn in &self.prn_list {
			if prn < 1 || prn > 32 { return Err(GnssError::InvalidPrn(prn)); }
		}
		Ok(())
	}

	pub fn acq_config(&self) -> AcqConfig {
		AcqConfig{
			doppler_max_hz: self.doppler_search_hz,
			doppler_step_hz: self.doppler_step_hz,
			threshold: self.acq_threshold,
			deadline: Duration::from_millis(self.acq_deadline_ms),
		}
	}

	pub fn tracking_config(&self) -> TrackingConfig {
		TrackingConfig{
			pll_bw_hz: self.pll_bw_hz,
			dll_bw_hz: self.dll_bw_hz,
			integration_ms: self.integration_ms,
			el_spacing_chips: self.el_spacing_chips,
			cn0_loss_threshold_dbhz: self.cn0_loss_threshold_dbhz,
			loss_dwell_ms: self.loss_dwell_ms,
			..TrackingConfig::default()
		}
	}

}

#[cfg(test)]
mod tests {

	use super::*;

	#[test]
	fn defaults_match_documented_values() {
		let cfg = ReceiverConfig::default();
		assert_eq!(cfg.sample_rate_hz, 2.048e6);
		assert_eq!(cfg.doppler_step_hz, 500.0);
		assert_eq!(cfg.acq_threshold, 2.5);
		assert_eq!(cfg.pll_bw_hz, 18.0);
		assert_eq!(cfg.dll_bw_hz, 2.0);
		assert_eq!(cfg.el_spacing_chips, 0.5);
		assert_eq!(cfg.cn0_loss_threshold_dbhz, 28.0);
		assert_eq!(cfg.ring_capacity_samples, 1 << 20);
		assert_eq!(cfg.prn_list.len(), 32);
		assert!(cfg.validate().is_ok());
	}

	#[test]
	fn partial_toml_overrides_only_named_fields() {
		let cfg:ReceiverConfig = toml::from_str(r#"
			sample_rate_hz = 4.096e6
			acq_threshold = 3.0
			prn_list = [5, 9, 23]
		"#).unwrap();
		assert_eq!(cfg.sample_rate_hz, 4.096e6);
		assert_eq!(cfg.acq_threshold, 3.0);
		assert_eq!(cfg.prn_list, vec![5, 9, 23]);
		assert_eq!(cfg.doppler_step_hz, 500.0);
	}

	#[test]
	fn bad_prn_list_is_rejected() {
		let mut cfg = ReceiverConfig::default();
		cfg.prn_list.push(40);
		assert_eq!(cfg.validate(), Err(GnssError::InvalidPrn(40)));
	}

}
