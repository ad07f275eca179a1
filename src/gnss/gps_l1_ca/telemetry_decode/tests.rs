
use crate::GnssError;

use super::*;
use super::subframe::SUBFRAME_BITS;

// ---- Test-side subframe encoder ------------------------------------------------
//
// Builds transmitted bit streams the way the satellites do: fields written into the
// data bits, parity computed per word with the D30* complement applied to the next
// word's data, and the two solve bits at the end of words 2 and 10 chosen so both
// trailing parity bits come out zero, which is what keeps every TLM preamble
// upright on the air.

fn set_field(plain:&mut [bool; SUBFRAME_BITS], start:usize, len:usize, value:i64) {
	for i in 0..len {
		plain[start + i] = ((value >> (len - 1 - i)) & 1) == 1;
	}
}

fn set_split_field(plain:&mut [bool; SUBFRAME_BITS], hi:(usize, usize), lo:(usize, usize), value:i64) {
	set_field(plain, hi.0, hi.1, value >> lo.1);
	set_field(plain, lo.0, lo.1, value & ((1i64 << lo.1) - 1));
}

fn word_parity(data:&[bool], d29:bool, d30:bool) -> [bool; 6] {
	let packed:u32 = data.iter().fold(0u32, |acc, &b| (acc << 1) | (b as u32));
	let mut parity = [false; 6];
	for i in 0..6 {
		let seed = if PARITY_USES_D29[i] { d29 } else { d30 };
		parity[i] = seed ^ odd_parity(packed & PARITY_MASKS[i]);
	}
	parity
}

// Words 2 and 10 carry two non-information bits reserved for exactly this: forcing
// D29 and D30 of the word to zero
fn solve_trailing_bits(data:&mut [bool], d29:bool, d30:bool) {
	for a in [false, true].iter() {
		for b in [false, true].iter() {
			data[22] = *a;
			data[23] = *b;
			let parity = word_parity(data, d29, d30);
			if !parity[4] && !parity[5] { return; }
		}
	}
	panic!("no solve-bit assignment zeroes the trailing parity");
}

// Renders one subframe as transmitted, chaining from and updating (D29*, D30*)
fn transmit_subframe(plain:&[bool; SUBFRAME_BITS], prev:&mut (bool, bool), out:&mut Vec<bool>) {
	for w in 0..10 {
		let mut data:Vec<bool> = plain[(w * 30)..(w * 30 + 24)].to_vec();
		if w == 1 || w == 9 {
			solve_trailing_bits(&mut data, prev.0, prev.1);
		}
		let parity = word_parity(&data, prev.0, prev.1);
		for &b in data.iter() { out.push(b ^ prev.1); }
		for &p in parity.iter() { out.push(p); }
		*prev = (parity[4], parity[5]);
	}
}

fn new_plain(subframe_id:u8, tow:u32) -> [bool; SUBFRAME_BITS] {
	let mut plain = [false; SUBFRAME_BITS];
	for (i, &b) in PREAMBLE.iter().enumerate() { plain[i] = b; }
	set_field(&mut plain, 30, 17, tow as i64);
	set_field(&mut plain, 49, 3, subframe_id as i64);
	plain
}

// Reference raw field values used across the decode tests; chosen to exercise signs
// and the split fields
const WEEK:i64 = 150;
const URA:i64 = 3;
const HEALTH:i64 = 0;
const IODC:i64 = 157;
const IODE:i64 = 157;
const T_GD_RAW:i64 = -7;
const T_OC_RAW:i64 = 2345;
const A_F2_RAW:i64 = 0;
const A_F1_RAW:i64 = 45;
const A_F0_RAW:i64 = -12345;

fn subframe1_plain(tow:u32) -> [bool; SUBFRAME_BITS] {
	let mut p = new_plain(1, tow);
	set_field(&mut p,  60, 10, WEEK);
	set_field(&mut p,  72,  4, URA);
	set_field(&mut p,  76,  6, HEALTH);
	set_split_field(&mut p, (82, 2), (210, 8), IODC);
	set_field(&mut p, 196,  8, T_GD_RAW);
	set_field(&mut p, 218, 16, T_OC_RAW);
	set_field(&mut p, 240,  8, A_F2_RAW);
	set_field(&mut p, 248, 16, A_F1_RAW);
	set_field(&mut p, 270, 22, A_F0_RAW);
	p
}

const CRS_RAW:i64 = -89;
const DN_RAW:i64 = 12000;
const M0_RAW:i64 = -1234567890;
const CUC_RAW:i64 = 1200;
const ECC_RAW:i64 = 8388608;
const CUS_RAW:i64 = -900;
const SQRT_A_RAW:i64 = 2702924800;
const T_OE_RAW:i64 = 2345;
const AODO_RAW:i64 = 27;

fn subframe2_plain(tow:u32) -> [bool; SUBFRAME_BITS] {
	let mut p = new_plain(2, tow);
	set_field(&mut p,  60,  8, IODE);
	set_field(&mut p,  68, 16, CRS_RAW);
	set_field(&mut p,  90, 16, DN_RAW);
	set_split_field(&mut p, (106, 8), (120, 24), M0_RAW);
	set_field(&mut p, 150, 16, CUC_RAW);
	set_split_field(&mut p, (166, 8), (180, 24), ECC_RAW);
	set_field(&mut p, 210, 16, CUS_RAW);
	set_split_field(&mut p, (226, 8), (240, 24), SQRT_A_RAW);
	set_field(&mut p, 270, 16, T_OE_RAW);
	set_field(&mut p, 287,  5, AODO_RAW);
	p
}

const CIC_RAW:i64 = -300;
const OMEGA0_RAW:i64 = 987654321;
const CIS_RAW:i64 = 250;
const I0_RAW:i64 = 676543210;
const CRC_RAW:i64 = 1023;
const OMEGA_RAW:i64 = -456789012;
const OMEGA_DOT_RAW:i64 = -654321;
const IDOT_RAW:i64 = -2900;

fn subframe3_plain(tow:u32) -> [bool; SUBFRAME_BITS] {
	let mut p = new_plain(3, tow);
	set_field(&mut p,  60, 16, CIC_RAW);
	set_split_field(&mut p, (76, 8), (90, 24), OMEGA0_RAW);
	set_field(&mut p, 120, 16, CIS_RAW);
	set_split_field(&mut p, (136, 8), (150, 24), I0_RAW);
	set_field(&mut p, 180, 16, CRC_RAW);
	set_split_field(&mut p, (196, 8), (210, 24), OMEGA_RAW);
	set_field(&mut p, 240, 24, OMEGA_DOT_RAW);
	set_field(&mut p, 270,  8, IODE);
	set_field(&mut p, 278, 14, IDOT_RAW);
	p
}

fn transmit(frames:&[[bool; SUBFRAME_BITS]]) -> Vec<bool> {
	// Two idle bits seed the parity chain the way the all-zero tail of a previous
	// word would
	let mut out = vec![false, false];
	let mut prev = (false, false);
	for plain in frames {
		transmit_subframe(plain, &mut prev, &mut out);
	}
	out
}

fn feed_all(dec:&mut NavDecoder, prn:usize, bits:&[bool]) -> Vec<EphemerisUpdate> {
	let mut updates = vec![];
	for (i, &b) in bits.iter().enumerate() {
		if let Some(u) = dec.feed(prn, b, (i as f64) * 0.02).unwrap() {
			updates.push(u);
		}
	}
	updates
}

fn scale(raw:i64, p2:i32) -> f64 { (raw as f64) * (2.0f64).powi(p2) }

// ---- Parity ---------------------------------------------------------------------

#[test]
fn parity_accepts_encoded_word_and_rejects_any_single_flip() {
	let data:[bool; 24] = [true, false, true, true, false, false, true, false,
	                       true, true, true, false, false, true, false, true,
	                       false, false, false, true, true, false, true, true];
	for &(d29, d30) in [(false, false), (true, false), (false, true), (true, true)].iter() {
		let parity = word_parity(&data, d29, d30);
		let word:Vec<bool> = data.iter().map(|&b| b ^ d30).chain(parity.iter().cloned()).collect();
		assert!(word_parity_ok(&word, d29, d30));

		for flip in 0..30 {
			let mut bad = word.clone();
			bad[flip] = !bad[flip];
			assert!(!word_parity_ok(&bad, d29, d30), "flip of bit {} went undetected", flip);
		}
	}
}

#[test]
fn full_subframe_parity_chains_across_words() {
	let stream = transmit(&[subframe1_plain(1000), subframe1_plain(1001)]);
	// Skip the two seed bits; the first subframe must check out as one unit
	assert!(subframe_parity_ok(&stream[2..(2 + SUBFRAME_BITS)], stream[0], stream[1]));
}

// ---- Field extraction -----------------------------------------------------------

#[test]
fn subframe1_fields_decode_to_reference_values() {
	let mut dec = NavDecoder::new();
	// Two copies so the preamble is confirmed; both decode
	let stream = transmit(&[subframe1_plain(1000), subframe1_plain(1001)]);
	feed_all(&mut dec, 7, &stream);

	let sf = dec.last_subframe(7).expect("no subframe decoded");
	assert_eq!(sf.subframe_id, 1);
	assert_eq!(sf.time_of_week_truncated, 1001);
	assert!((dec.time_of_week(7).unwrap() - 1001.0 * 6.0).abs() < 1e-9);

	match sf.body {
		SubframeBody::Subframe1(sf1) => {
			assert_eq!(sf1.week_number, WEEK as u16);
			assert_eq!(sf1.ura_index, URA as u8);
			assert_eq!(sf1.sv_health, HEALTH as u8);
			assert_eq!(sf1.iodc, IODC as u16);
			assert_eq!(sf1.t_gd, scale(T_GD_RAW, -31));
			assert_eq!(sf1.t_oc, scale(T_OC_RAW, 4));
			assert_eq!(sf1.a_f2, scale(A_F2_RAW, -55));
			assert_eq!(sf1.a_f1, scale(A_F1_RAW, -43));
			assert_eq!(sf1.a_f0, scale(A_F0_RAW, -31));
		},
		ref other => panic!("wrong body {:?}", other),
	}
}

// ---- Ephemeris assembly ---------------------------------------------------------

#[test]
fn ephemeris_round_trips_to_lsb_precision() {
	let mut dec = NavDecoder::new();
	let stream = transmit(&[subframe1_plain(100), subframe2_plain(101), subframe3_plain(102)]);
	let updates = feed_all(&mut dec, 12, &stream);

	assert_eq!(updates.len(), 1, "exactly one publication expected");
	let eph = updates[0].ephemeris;
	assert_eq!(updates[0].prn, 12);

	assert_eq!(eph.week_number, WEEK as u16);
	assert_eq!(eph.iodc, IODC as u16);
	assert_eq!(eph.iode, IODE as u8);
	assert_eq!(eph.t_gd, scale(T_GD_RAW, -31));
	assert_eq!(eph.t_oc, scale(T_OC_RAW, 4));
	assert_eq!(eph.a_f0, scale(A_F0_RAW, -31));
	assert_eq!(eph.a_f1, scale(A_F1_RAW, -43));
	assert_eq!(eph.a_f2, scale(A_F2_RAW, -55));
	assert_eq!(eph.crs, scale(CRS_RAW, -5));
	assert_eq!(eph.dn, scale(DN_RAW, -43));
	assert_eq!(eph.m0, scale(M0_RAW, -31));
	assert_eq!(eph.cuc, scale(CUC_RAW, -29));
	assert_eq!(eph.e, scale(ECC_RAW, -33));
	assert_eq!(eph.cus, scale(CUS_RAW, -29));
	assert_eq!(eph.sqrt_a, scale(SQRT_A_RAW, -19));
	assert_eq!(eph.t_oe, scale(T_OE_RAW, 4));
	assert_eq!(eph.aodo, AODO_RAW as u8);
	assert_eq!(eph.cic, scale(CIC_RAW, -29));
	assert_eq!(eph.omega0, scale(OMEGA0_RAW, -31));
	assert_eq!(eph.cis, scale(CIS_RAW, -29));
	assert_eq!(eph.i0, scale(I0_RAW, -31));
	assert_eq!(eph.crc, scale(CRC_RAW, -5));
	assert_eq!(eph.omega, scale(OMEGA_RAW, -31));
	assert_eq!(eph.omega_dot, scale(OMEGA_DOT_RAW, -43));
	assert_eq!(eph.idot, scale(IDOT_RAW, -43));

	// The getter view matches the update
	assert_eq!(dec.ephemeris(12).unwrap().iode, eph.iode);

	// Clock polynomial at t_oc reduces to a_f0
	assert_eq!(eph.sv_clock_offset(eph.t_oc), eph.a_f0);
}

#[test]
fn mismatched_iode_blocks_publication() {
	let mut sf3 = subframe3_plain(102);
	set_field(&mut sf3, 270, 8, IODE + 1);

	let mut dec = NavDecoder::new();
	let stream = transmit(&[subframe1_plain(100), subframe2_plain(101), sf3]);
	let updates = feed_all(&mut dec, 3, &stream);

	assert!(updates.is_empty(), "issue-of-data mismatch must not publish");
	assert!(dec.ephemeris(3).is_none());
}

#[test]
fn stale_halves_outside_the_frame_window_do_not_publish() {
	let mut dec = NavDecoder::new();

	// Subframes 1 and 2 early in the stream
	let head = transmit(&[subframe1_plain(100), subframe2_plain(101)]);
	for (i, &b) in head.iter().enumerate() {
		assert!(dec.feed(30, b, (i as f64) * 0.02).unwrap().is_none());
	}

	// Subframe 3 arrives 40 seconds later, outside one 30 s frame.  The chain of
	// trailing parity bits continues (the encoder leaves them zero), so the decoder
	// stays locked across the gap.
	let mut prev = (false, false);
	let mut tail:Vec<bool> = vec![];
	transmit_subframe(&subframe3_plain(102), &mut prev, &mut tail);
	let t_base = 40.0 + (head.len() as f64) * 0.02;
	let mut published = vec![];
	for (i, &b) in tail.iter().enumerate() {
		if let Some(u) = dec.feed(30, b, t_base + (i as f64) * 0.02).unwrap() { published.push(u); }
	}
	assert!(published.is_empty(), "halves 40 s apart must not combine");
}

// ---- Frame synchronization ------------------------------------------------------

#[test]
fn single_preamble_without_confirmation_does_not_lock() {
	let mut dec = NavDecoder::new();
	let mut stream = transmit(&[subframe1_plain(1000)]);
	// Follow the lone subframe with bits that never form a second preamble
	stream.extend(std::iter::repeat(false).take(SUBFRAME_BITS));
	feed_all(&mut dec, 9, &stream);
	assert!(dec.last_subframe(9).is_none(), "locked without the 300-bit confirmation");
}

#[test]
fn global_bit_inversion_is_transparent() {
	let mut dec = NavDecoder::new();
	let stream:Vec<bool> = transmit(&[subframe1_plain(1000), subframe2_plain(1001), subframe3_plain(1002)])
		.iter().map(|b| !b).collect();
	let updates = feed_all(&mut dec, 21, &stream);
	assert_eq!(updates.len(), 1, "inverted stream must decode identically");
	assert_eq!(updates[0].ephemeris.m0, scale(M0_RAW, -31));
}

#[test]
fn corrupted_subframe_is_discarded_and_decoding_resumes() {
	let mut dec = NavDecoder::new();
	let frames = [subframe1_plain(100), subframe2_plain(101), subframe1_plain(102), subframe2_plain(103)];
	let mut stream = transmit(&frames);

	// Flip a data bit inside the third subframe, well past its preamble
	let idx = 2 + 2 * SUBFRAME_BITS + 100;
	stream[idx] = !stream[idx];

	feed_all(&mut dec, 14, &stream);

	// Subframes 1, 2 and 4 decode; the corrupted third never surfaces
	let sf = dec.last_subframe(14).expect("stream stopped decoding after one bad subframe");
	assert_eq!(sf.time_of_week_truncated, 103);
}

#[test]
fn ionosphere_page_yields_klobuchar_coefficients() {
	let mut p = new_plain(4, 500);
	set_field(&mut p, 60, 2, 1);		// data id
	set_field(&mut p, 62, 6, 56);		// page 18
	set_field(&mut p, 68, 8, 8);		// alpha0 raw
	set_field(&mut p, 76, 8, -6);		// alpha1 raw
	set_field(&mut p, 90, 8, -1);		// alpha2 raw
	set_field(&mut p, 98, 8, 2);		// alpha3 raw
	set_field(&mut p, 106, 8, 10);		// beta0 raw
	set_field(&mut p, 120, 8, -3);		// beta1 raw
	set_field(&mut p, 128, 8, 4);		// beta2 raw
	set_field(&mut p, 136, 8, -5);		// beta3 raw

	let mut dec = NavDecoder::new();
	let stream = transmit(&[p, subframe1_plain(501)]);
	feed_all(&mut dec, 26, &stream);

	let iono = dec.ionosphere(26).expect("page 18 not extracted");
	assert_eq!(iono.alpha0, scale(8, -30));
	assert_eq!(iono.alpha1, scale(-6, -27));
	assert_eq!(iono.alpha2, scale(-1, -24));
	assert_eq!(iono.alpha3, scale(2, -24));
	assert_eq!(iono.beta0, scale(10, 11));
	assert_eq!(iono.beta1, scale(-3, 14));
	assert_eq!(iono.beta2, scale(4, 16));
	assert_eq!(iono.beta3, scale(-5, 16));
}

#[test]
fn feed_rejects_out_of_range_prn() {
	let mut dec = NavDecoder::new();
	match dec.feed(0, true, 0.0) {
		Err(GnssError::InvalidPrn(0)) => {},
		other => panic!("expected InvalidPrn, got {:?}", other),
	}
	match dec.feed(33, true, 0.0) {
		Err(GnssError::InvalidPrn(33)) => {},
		other => panic!("expected InvalidPrn, got {:?}", other),
	}
}
