
use serde::{Serialize, Deserialize};

use crate::GnssError;

pub const SUBFRAME_BITS:usize = 300;
pub const WORD_BITS:usize = 30;

/// One navigation field as the ICD defines it: a primary bit range, an optional low
/// half for fields split across words, a signedness flag and a power-of-two scale.
/// Positions index the full 300-bit subframe, zero-based.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
	pub hi: (usize, usize),
	pub lo: Option<(usize, usize)>,
	pub signed: bool,
	pub scale_p2: i32,
}

const fn whole(start:usize, len:usize, signed:bool, scale_p2:i32) -> FieldDef {
	FieldDef{ hi: (start, len), lo: None, signed, scale_p2 }
}

const fn split(hi:(usize, usize), lo:(usize, usize), signed:bool, scale_p2:i32) -> FieldDef {
	FieldDef{ hi, lo: Some(lo), signed, scale_p2 }
}

// Handover word, common to every subframe
const TOW_TRUNCATED:FieldDef = whole( 30, 17, false,   0);
const SUBFRAME_ID:FieldDef   = whole( 49,  3, false,   0);

// Subframe 1: clock correction and health
const SF1_WEEK_NUMBER:FieldDef = whole( 60, 10, false,   0);
const SF1_URA_INDEX:FieldDef   = whole( 72,  4, false,   0);
const SF1_SV_HEALTH:FieldDef   = whole( 76,  6, false,   0);
const SF1_IODC:FieldDef        = split((82, 2), (210, 8), false, 0);
const SF1_T_GD:FieldDef        = whole(196,  8, true,  -31);
const SF1_T_OC:FieldDef        = whole(218, 16, false,   4);
const SF1_A_F2:FieldDef        = whole(240,  8, true,  -55);
const SF1_A_F1:FieldDef        = whole(248, 16, true,  -43);
const SF1_A_F0:FieldDef        = whole(270, 22, true,  -31);

// Subframe 2: first half of the ephemeris.  Angles are in semicircles.
const SF2_IODE:FieldDef   = whole( 60,  8, false,   0);
const SF2_CRS:FieldDef    = whole( 68, 16, true,   -5);
const SF2_DN:FieldDef     = whole( 90, 16, true,  -43);
const SF2_M0:FieldDef     = split((106, 8), (120, 24), true, -31);
const SF2_CUC:FieldDef    = whole(150, 16, true,  -29);
const SF2_ECC:FieldDef    = split((166, 8), (180, 24), false, -33);
const SF2_CUS:FieldDef    = whole(210, 16, true,  -29);
const SF2_SQRT_A:FieldDef = split((226, 8), (240, 24), false, -19);
const SF2_T_OE:FieldDef   = whole(270, 16, false,   4);
const SF2_AODO:FieldDef   = whole(287,  5, false,   0);
const SF2_FIT_INTERVAL_BIT:usize = 286;

// Subframe 3: second half of the ephemeris
const SF3_CIC:FieldDef       = whole( 60, 16, true,  -29);
const SF3_OMEGA0:FieldDef    = split(( 76, 8), ( 90, 24), true, -31);
const SF3_CIS:FieldDef       = whole(120, 16, true,  -29);
const SF3_I0:FieldDef        = split((136, 8), (150, 24), true, -31);
const SF3_CRC:FieldDef       = whole(180, 16, true,   -5);
const SF3_OMEGA:FieldDef     = split((196, 8), (210, 24), true, -31);
const SF3_OMEGA_DOT:FieldDef = whole(240, 24, true,  -43);
const SF3_IODE:FieldDef      = whole(270,  8, false,   0);
const SF3_IDOT:FieldDef      = whole(278, 14, true,  -43);

// Subframes 4/5 page header and the ionospheric page
const SF45_DATA_ID:FieldDef = whole( 60, 2, false, 0);
const SF45_SV_ID:FieldDef   = whole( 62, 6, false, 0);
const SF4_ALPHA0:FieldDef = whole( 68, 8, true, -30);
const SF4_ALPHA1:FieldDef = whole( 76, 8, true, -27);
const SF4_ALPHA2:FieldDef = whole( 90, 8, true, -24);
const SF4_ALPHA3:FieldDef = whole( 98, 8, true, -24);
const SF4_BETA0:FieldDef  = whole(106, 8, true,  11);
const SF4_BETA1:FieldDef  = whole(120, 8, true,  14);
const SF4_BETA2:FieldDef  = whole(128, 8, true,  16);
const SF4_BETA3:FieldDef  = whole(136, 8, true,  16);
const SF4_IONO_PAGE_SV_ID:u32 = 56;

/// Reads `len` bits MSB-first starting at `start`
pub fn extract(bits:&[bool; SUBFRAME_BITS], start:usize, len:usize) -> u32 {
	bits[start..(start + len)].iter().fold(0u32, |acc, &b| (acc << 1) | (b as u32))
}

/// Reads a two's-complement field
pub fn extract_signed(bits:&[bool; SUBFRAME_BITS], start:usize, len:usize) -> i32 {
	let raw = extract(bits, start, len) as i64;
	let half = 1i64 << (len - 1);
	(if raw >= half { raw - (half << 1) } else { raw }) as i32
}

fn field_raw(bits:&[bool; SUBFRAME_BITS], f:&FieldDef) -> (i64, usize) {
	match f.lo {
		None => (extract(bits, f.hi.0, f.hi.1) as i64, f.hi.1),
		Some(lo) => {
			let hi = extract(bits, f.hi.0, f.hi.1) as i64;
			let low = extract(bits, lo.0, lo.1) as i64;
			((hi << lo.1) | low, f.hi.1 + lo.1)
		},
	}
}

fn field_u32(bits:&[bool; SUBFRAME_BITS], f:&FieldDef) -> u32 {
	field_raw(bits, f).0 as u32
}

/// Field value with its sign and LSB scale applied
pub fn field_scaled(bits:&[bool; SUBFRAME_BITS], f:&FieldDef) -> f64 {
	let (raw, len) = field_raw(bits, f);
	let value = if f.signed {
		let half = 1i64 << (len - 1);
		if raw >= half { raw - (half << 1) } else { raw }
	} else {
		raw
	};
	(value as f64) * (2.0f64).powi(f.scale_p2)
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Subframe {
	pub time_of_week_truncated: u32,
	pub subframe_id: u8,
	pub body: SubframeBody,
}

impl Subframe {

	/// Time of week of the NEXT subframe's leading edge, in seconds
	pub fn time_of_week(&self) -> f64 { (self.time_of_week_truncated as f64) * 6.0 }

}

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub enum SubframeBody {
	Subframe1(Subframe1),
	Subframe2(Subframe2),
	Subframe3(Subframe3),
	Subframe4(Subframe4),
	/// Almanac pages; parity checked then discarded
	Subframe5{ data_id:u8, sv_id:u8 },
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Subframe1 {
	pub week_number: u16,
	pub ura_index: u8,
	pub sv_health: u8,
	pub iodc: u16,
	pub t_gd: f64,
	pub t_oc: f64,
	pub a_f2: f64,
	pub a_f1: f64,
	pub a_f0: f64,
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Subframe2 {
	pub iode: u8,
	pub crs: f64,
	pub dn: f64,
	pub m0: f64,
	pub cuc: f64,
	pub e: f64,
	pub cus: f64,
	pub sqrt_a: f64,
	pub t_oe: f64,
	pub fit_interval: bool,
	pub aodo: u8,
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Subframe3 {
	pub cic: f64,
	pub omega0: f64,
	pub cis: f64,
	pub i0: f64,
	pub crc: f64,
	pub omega: f64,
	pub omega_dot: f64,
	pub iode: u8,
	pub idot: f64,
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Subframe4 {
	pub data_id: u8,
	pub sv_id: u8,
	pub ionosphere: Option<IonoParams>,
}

/// Klobuchar broadcast coefficients from subframe 4 page 18.  Extraction only; the
/// correction model itself lives with whoever consumes these.
#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct IonoParams {
	pub alpha0: f64, pub alpha1: f64, pub alpha2: f64, pub alpha3: f64,
	pub beta0: f64,  pub beta1: f64,  pub beta2: f64,  pub beta3: f64,
}

/// Decodes one parity-corrected subframe into its typed body
pub fn decode(bits:&[bool; SUBFRAME_BITS]) -> Result<Subframe, GnssError> {
	let time_of_week_truncated = field_u32(bits, &TOW_TRUNCATED);
	let subframe_id = field_u32(bits, &SUBFRAME_ID) as u8;

	let body = match subframe_id {
		1 => SubframeBody::Subframe1(Subframe1{
			week_number: field_u32(bits, &SF1_WEEK_NUMBER) as u16,
			ura_index:   field_u32(bits, &SF1_URA_INDEX) as u8,
			sv_health:   field_u32(bits, &SF1_SV_HEALTH) as u8,
			iodc:        field_u32(bits, &SF1_IODC) as u16,
			t_gd:        field_scaled(bits, &SF1_T_GD),
			t_oc:        field_scaled(bits, &SF1_T_OC),
			a_f2:        field_scaled(bits, &SF1_A_F2),
			a_f1:        field_scaled(bits, &SF1_A_F1),
			a_f0:        field_scaled(bits, &SF1_A_F0),
		}),
		2 => SubframeBody::Subframe2(Subframe2{
			iode:         field_u32(bits, &SF2_IODE) as u8,
			crs:          field_scaled(bits, &SF2_CRS),
			dn:           field_scaled(bits, &SF2_DN),
			m0:           field_scaled(bits, &SF2_M0),
			cuc:          field_scaled(bits, &SF2_CUC),
			e:            field_scaled(bits, &SF2_ECC),
			cus:          field_scaled(bits, &SF2_CUS),
			sqrt_a:       field_scaled(bits, &SF2_SQRT_A),
			t_oe:         field_scaled(bits, &SF2_T_OE),
			fit_interval: bits[SF2_FIT_INTERVAL_BIT],
			aodo:         field_u32(bits, &SF2_AODO) as u8,
		}),
		3 => SubframeBody::Subframe3(Subframe3{
			cic:       field_scaled(bits, &SF3_CIC),
			omega0:    field_scaled(bits, &SF3_OMEGA0),
			cis:       field_scaled(bits, &SF3_CIS),
			i0:        field_scaled(bits, &SF3_I0),
			crc:       field_scaled(bits, &SF3_CRC),
			omega:     field_scaled(bits, &SF3_OMEGA),
			omega_dot: field_scaled(bits, &SF3_OMEGA_DOT),
			iode:      field_u32(bits, &SF3_IODE) as u8,
			idot:      field_scaled(bits, &SF3_IDOT),
		}),
		4 => {
			let sv_id = field_u32(bits, &SF45_SV_ID);
			let ionosphere = if sv_id == SF4_IONO_PAGE_SV_ID {
				Some(IonoParams{
					alpha0: field_scaled(bits, &SF4_ALPHA0),
					alpha1: field_scaled(bits, &SF4_ALPHA1),
					alpha2: field_scaled(bits, &SF4_ALPHA2),
					alpha3: field_scaled(bits, &SF4_ALPHA3),
					beta0:  field_scaled(bits, &SF4_BETA0),
					beta1:  field_scaled(bits, &SF4_BETA1),
					beta2:  field_scaled(bits, &SF4_BETA2),
					beta3:  field_scaled(bits, &SF4_BETA3),
				})
			} else { None };
			SubframeBody::Subframe4(Subframe4{ data_id: field_u32(bits, &SF45_DATA_ID) as u8, sv_id: sv_id as u8, ionosphere })
		},
		5 => SubframeBody::Subframe5{
			data_id: field_u32(bits, &SF45_DATA_ID) as u8,
			sv_id:   field_u32(bits, &SF45_SV_ID) as u8,
		},
		_ => return Err(GnssError::InvalidTelemetryData("subframe ID outside 1..=5")),
	};

	Ok(Subframe{ time_of_week_truncated, subframe_id, body })
}
