
use serde::{Serialize, Deserialize};

use crate::gnss::gps_l1_ca::telemetry_decode::subframe::{Subframe1, Subframe2, Subframe3};

/// Complete broadcast ephemeris and clock set for one satellite, as decoded from
/// subframes 1 through 3 of a single frame.  Angles are in semicircles as
/// transmitted; consumers multiply by pi where radians are needed.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct Ephemeris {
	pub prn: usize,
	pub week_number: u16,
	pub sv_health: u8,
	pub ura_index: u8,
	pub iodc: u16,
	pub iode: u8,
	pub t_gd: f64,
	pub t_oc: f64,
	pub a_f0: f64,
	pub a_f1: f64,
	pub a_f2: f64,
	pub t_oe: f64,
	pub sqrt_a: f64,
	pub e: f64,
	pub dn: f64,
	pub m0: f64,
	pub omega0: f64,
	pub omega: f64,
	pub omega_dot: f64,
	pub i0: f64,
	pub idot: f64,
	pub cuc: f64,
	pub cus: f64,
	pub crc: f64,
	pub crs: f64,
	pub cic: f64,
	pub cis: f64,
	pub fit_interval: bool,
	pub aodo: u8,
}

impl Ephemeris {

	/// SV clock offset from GPS system time at time-of-week `t`, excluding the
	/// relativistic term, which needs the orbit solution
	pub fn sv_clock_offset(&self, t:f64) -> f64 {
		let dt = t - self.t_oc;
		self.a_f0 + self.a_f1 * dt + self.a_f2 * dt * dt
	}

}

/// A freshly published ephemeris with the epoch time of the bit that completed it
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct EphemerisUpdate {
	pub prn: usize,
	pub time_s: f64,
	pub ephemeris: Ephemeris,
}

/// Joins the three ephemeris-bearing subframes into one set, provided their issue of
/// data tags agree: `iodc % 256 == iode(2) == iode(3)`
pub fn assemble(prn:usize, sf1:&Subframe1, sf2:&Subframe2, sf3:&Subframe3) -> Option<Ephemeris> {
	if (sf1.iodc % 256) != (sf2.iode as u16) || sf2.iode != sf3.iode { return None; }

	Some(Ephemeris{
		prn,
		week_number: sf1.week_number,
		sv_health: sf1.sv_health,
		ura_index: sf1.ura_index,
		iodc: sf1.iodc,
		iode: sf2.iode,
		t_gd: sf1.t_gd,
		t_oc: sf1.t_oc,
		a_f0: sf1.a_f0,
		a_f1: sf1.a_f1,
		a_f2: sf1.a_f2,
		t_oe: sf2.t_oe,
		sqrt_a: sf2.sqrt_a,
		e: sf2.e,
		dn: sf2.dn,
		m0: sf2.m0,
		omega0: sf3.omega0,
		omega: sf3.omega,
		omega_dot: sf3.omega_dot,
		i0: sf3.i0,
		idot: sf3.idot,
		cuc: sf2.cuc,
		cus: sf2.cus,
		crc: sf3.crc,
		crs: sf2.crs,
		cic: sf3.cic,
		cis: sf3.cis,
		fit_interval: sf2.fit_interval,
		aodo: sf2.aodo,
	})
}
