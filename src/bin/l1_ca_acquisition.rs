
use clap::{App, Arg};
use colored::*;

use rust_gps::gnss::common::acquisition::{search_all, AcqConfig};
use rust_gps::io::{FileSource, SampleSource};

fn main() {

	let matches = App::new("GPS L1 C/A Acquisition")
		.version("0.1.0")
		.about("Scans baseband IQ samples for visible GPS satellites and reports code phase and doppler per PRN")
		.arg(Arg::with_name("filename")
			.short("f").long("filename")
			.help("Input file, interleaved LE i16 IQ")
			.required(true).takes_value(true))
		.arg(Arg::with_name("sample_rate_sps")
			.short("s").long("sample_rate_sps")
			.required(true).takes_value(true))
		.arg(Arg::with_name("threshold")
			.short("t").long("threshold")
			.help("Peak-to-second-peak detection threshold")
			.takes_value(true))
		.arg(Arg::with_name("prns")
			.short("p").long("prns")
			.help("Comma-separated PRN list, default 1-32")
			.takes_value(true))
		.get_matches();

	let fname:&str = matches.value_of("filename").unwrap();
	let fs:f64 = matches.value_of("sample_rate_sps").unwrap().parse().unwrap();

	let mut cfg = AcqConfig::default();
	if let Some(t) = matches.value_of("threshold") {
		cfg.threshold = t.parse().unwrap();
	}
	let prns:Vec<usize> = match matches.value_of("prns") {
		Some(list) => list.split(',').map(|p| p.trim().parse().unwrap()).collect(),
		None => (1..=32).collect(),
	};

	eprintln!("Scanning {} at {} [samples/sec] for {} PRNs", &fname, &fs, prns.len());

	let mut src = FileSource::new(&fname, fs).expect("Unable to open source file");
	let n = (fs * 0.002) as usize;
	let buffer = src.pull_samples(n, 0).expect("Not enough samples in file");

	let mut all_results = vec![];
	for outcome in search_all(&buffer, &prns, &cfg) {
		match outcome {
			Ok(result) => {
				if result.found {
					eprintln!("{}", format!("PRN {:2}: code phase {:7.1} [chips], doppler {:6.0} [Hz], peak ratio {:.2}",
						result.prn, result.code_phase, result.doppler_hz, result.peak_ratio).green());
				}
				all_results.push(result);
			},
			Err(e) => eprintln!("{}", format!("{}", e).red()),
		}
	}

	let found = all_results.iter().filter(|r| r.found).count();
	eprintln!("{} of {} PRNs visible", found, prns.len());

	println!("{}", serde_json::to_string_pretty(&all_results).unwrap());

}
