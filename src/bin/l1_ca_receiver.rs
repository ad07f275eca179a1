
use clap::{App, Arg};
use colored::*;
use serde::Serialize;

use rust_gps::GnssError;
use rust_gps::config::ReceiverConfig;
use rust_gps::gnss::gps_l1_ca::channel::ChannelManager;
use rust_gps::gnss::gps_l1_ca::ephemeris::Ephemeris;
use rust_gps::gnss::gps_l1_ca::tracking::{ChannelState, Observables};
use rust_gps::io::{FileSource, SampleSource};

#[derive(Debug, Serialize)]
struct ReceiverOutput {
	ephemerides: Vec<Ephemeris>,
	observables: Vec<Observables>,
	seconds_processed: f64,
}

fn main() {

	let matches = App::new("GPS L1 C/A Receiver Core")
		.version("0.1.0")
		.about("Acquires, tracks and decodes GPS L1 C/A satellites from a baseband IQ capture")
		.arg(Arg::with_name("filename")
			.short("f").long("filename")
			.help("Input file, interleaved LE i16 IQ")
			.required(true).takes_value(true))
		.arg(Arg::with_name("sample_rate_sps")
			.short("s").long("sample_rate_sps")
			.takes_value(true))
		.arg(Arg::with_name("config")
			.short("c").long("config")
			.help("TOML receiver configuration")
			.takes_value(true))
		.arg(Arg::with_name("prns")
			.short("p").long("prns")
			.help("Comma-separated PRN list, overrides the configuration")
			.takes_value(true))
		.arg(Arg::with_name("max_seconds")
			.long("max_seconds")
			.takes_value(true))
		.get_matches();

	let mut cfg = match matches.value_of("config") {
		Some(path) => ReceiverConfig::from_toml_file(path).expect("Bad configuration file"),
		None => ReceiverConfig::default(),
	};
	if let Some(s) = matches.value_of("sample_rate_sps") {
		cfg.sample_rate_hz = s.parse().unwrap();
	}
	if let Some(list) = matches.value_of("prns") {
		cfg.prn_list = list.split(',').map(|p| p.trim().parse().unwrap()).collect();
		cfg.validate().expect("Bad PRN list");
	}
	let max_seconds:f64 = matches.value_of("max_seconds").map(|s| s.parse().unwrap()).unwrap_or(std::f64::INFINITY);

	let fname = matches.value_of("filename").unwrap();
	let fs = cfg.sample_rate_hz;
	eprintln!("Decoding {} at {} [samples/sec], {} channels", &fname, &fs, cfg.prn_list.len());

	let mut src = FileSource::new(&fname, fs).expect("Unable to open source file");
	let mut mgr = ChannelManager::new(fs, &cfg.prn_list, cfg.tracking_config(), cfg.acq_config()).unwrap();

	// Pull in bursts of 20 epochs; reacquire idle channels once a second
	let burst = mgr.samples_per_epoch() * 20;
	let mut processed_s = 0.0f64;
	let mut next_acq_s = 0.0f64;
	let mut next_status_s = 1.0f64;
	let mut ephemerides:Vec<Ephemeris> = vec![];

	loop {
		if processed_s >= max_seconds { break; }

		let buffer = match src.pull_samples(burst, 1000) {
			Ok(buffer) => buffer,
			Err(e) => {
				match e.as_gnss() {
					Some(GnssError::SampleSourceClosed) => eprintln!("End of capture"),
					_ => eprintln!("{}", format!("Sample pull failed: {:?}", e).red()),
				}
				break;
			},
		};
		if buffer.len() < burst { break; }

		if buffer.t0 >= next_acq_s {
			next_acq_s = buffer.t0 + 1.0;
			for result in mgr.acquire_idle(&buffer) {
				if result.found {
					eprintln!("{}", format!("PRN {:2}: acquired at {:6.0} [Hz] doppler, {:7.1} [chips], peak ratio {:.2}",
						result.prn, result.doppler_hz, result.code_phase, result.peak_ratio).green());
				}
			}
		}

		let updates = mgr.step_buffer(&buffer).expect("channel manager contract violation");
		for update in updates {
			eprintln!("{}", format!("PRN {:2}: ephemeris published, IODE {} at {:.1} [sec]",
				update.prn, update.ephemeris.iode, update.time_s).cyan());
			ephemerides.retain(|e| e.prn != update.prn);
			ephemerides.push(update.ephemeris);
		}

		processed_s = buffer.t_end();

		if processed_s >= next_status_s {
			next_status_s = processed_s + 1.0;
			for ch in mgr.channels() {
				match ch.state() {
					ChannelState::Idle | ChannelState::Acquiring => {},
					state => {
						let line = format!("{:6.1} [sec] PRN {:2}: {:?}, C/N0 {:4.1} [dB-Hz], doppler {:6.0} [Hz]",
							processed_s, ch.prn, state, ch.cn0_dbhz(), ch.carrier_freq_hz());
						match state {
							ChannelState::Tracking => eprintln!("{}", line),
							_ => eprintln!("{}", line.yellow()),
						}
					},
				}
			}
		}
	}

	let observables:Vec<Observables> = mgr.channels().iter().filter_map(|ch| ch.observables()).collect();
	let output = ReceiverOutput{ ephemerides, observables, seconds_processed: processed_s };
	println!("{}", serde_json::to_string_pretty(&output).unwrap());

}
