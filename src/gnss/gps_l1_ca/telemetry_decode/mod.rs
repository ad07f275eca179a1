
use std::collections::{HashMap, VecDeque};

use crate::GnssError;
use crate::gnss::gps_l1_ca::ephemeris::{self, Ephemeris, EphemerisUpdate};

pub mod subframe;

#[cfg(test)]
mod tests;

use self::subframe::{Subframe, SubframeBody, IonoParams, SUBFRAME_BITS, WORD_BITS};

pub const PREAMBLE:[bool; 8] = [true, false, false, false, true, false, true, true];	// 0x8B

// ICD-GPS-200 parity: each of the six parity bits XORs a fixed subset of the 24
// (polarity-corrected) data bits with one of the two trailing parity bits of the
// previous word.  The subsets are encoded as 24-bit masks, MSB = data bit 1.
const PARITY_MASKS:[u32; 6] = [0xEC7CD2, 0x763E69, 0xBB1F34, 0x5D8F9A, 0xAEC7CD, 0x2DEA27];
const PARITY_USES_D29:[bool; 6] = [true, false, true, false, false, true];

fn odd_parity(x:u32) -> bool { x.count_ones() % 2 == 1 }

/// Checks one 30-bit word as received against the parity of its 24 data bits, given
/// the last two bits of the previous word
pub fn word_parity_ok(word:&[bool], d29_star:bool, d30_star:bool) -> bool {
	debug_assert_eq!(word.len(), WORD_BITS);

	// Undo the transmit-side complement before computing parity
	let data:u32 = word.iter().take(24).fold(0u32, |acc, &b| (acc << 1) | ((b ^ d30_star) as u32));

	(0..6).all(|i| {
		let seed = if PARITY_USES_D29[i] { d29_star } else { d30_star };
		(seed ^ odd_parity(data & PARITY_MASKS[i])) == word[24 + i]
	})
}

// All ten word parities of a 300-bit subframe, chained through the trailing bits of
// each previous word.  `d29`/`d30` belong to the word right before the subframe.
fn subframe_parity_ok(bits:&[bool], d29:bool, d30:bool) -> bool {
	debug_assert_eq!(bits.len(), SUBFRAME_BITS);

	let mut prev = (d29, d30);
	for w in 0..10 {
		let word = &bits[(w * WORD_BITS)..((w + 1) * WORD_BITS)];
		if !word_parity_ok(word, prev.0, prev.1) { return false; }
		prev = (word[28], word[29]);
	}
	true
}

// Strips the D30* complement from every word, leaving parity bits in place
fn polarity_corrected(bits:&[bool], d30_before:bool) -> [bool; SUBFRAME_BITS] {
	let mut ans = [false; SUBFRAME_BITS];
	let mut d30 = d30_before;
	for w in 0..10 {
		for b in 0..24 { ans[w * WORD_BITS + b] = bits[w * WORD_BITS + b] ^ d30; }
		for b in 24..30 { ans[w * WORD_BITS + b] = bits[w * WORD_BITS + b]; }
		d30 = bits[w * WORD_BITS + 29];
	}
	ans
}

enum SyncState {
	/// Hunting for a preamble confirmed one subframe later, both candidates parity-clean
	Searching,
	/// Bit boundary known; `inverted` carries the Costas half-cycle ambiguity
	Locked{ inverted:bool, consecutive_failures:u8 },
}

// Everything the decoder knows about one satellite's bit stream
struct PrnDecoder {
	// (bit, epoch time); two bits of history are kept in front of the active
	// candidate so D29*/D30* of the preceding word are always available
	buffer: VecDeque<(bool, f64)>,
	state: SyncState,
	pending_sf1: Option<(subframe::Subframe1, f64)>,
	pending_sf2: Option<(subframe::Subframe2, f64)>,
	pending_sf3: Option<(subframe::Subframe3, f64)>,
	ephemeris: Option<Ephemeris>,
	ionosphere: Option<IonoParams>,
	last_subframe: Option<Subframe>,
	last_tow_truncated: Option<u32>,
}

// Keep at most this many undecoded bits around while hunting for a preamble; two
// subframes plus slack
const SEARCH_BUFFER_LIMIT:usize = 2 * SUBFRAME_BITS + 64;

impl PrnDecoder {

	fn new() -> Self {
		Self{ buffer: VecDeque::new(), state: SyncState::Searching,
			pending_sf1: None, pending_sf2: None, pending_sf3: None,
			ephemeris: None, ionosphere: None, last_subframe: None, last_tow_truncated: None }
	}

	fn push(&mut self, prn:usize, bit:bool, epoch_time:f64) -> Option<EphemerisUpdate> {
		self.buffer.push_back((bit, epoch_time));

		match self.state {
			SyncState::Searching => self.try_sync(prn),
			SyncState::Locked{ .. } => self.try_decode_next(prn),
		}
	}

	// A candidate at position p is accepted only when a second preamble sits exactly
	// 300 bits later and both candidate subframes pass all ten parities.  The two
	// bits ahead of p seed the parity chain, so candidates start at p = 2.
	fn try_sync(&mut self, prn:usize) -> Option<EphemerisUpdate> {
		if self.buffer.len() < 2 + 2 * SUBFRAME_BITS { return None; }

		let bits:Vec<bool> = self.buffer.iter().map(|(b, _)| *b).collect();

		for p in 2..=(bits.len() - 2 * SUBFRAME_BITS) {
			for &inverted in [false, true].iter() {
				let b = |i:usize| bits[i] ^ inverted;

				if (0..8).any(|i| b(p + i) != PREAMBLE[i]) { continue; }
				if (0..8).any(|i| b(p + SUBFRAME_BITS + i) != PREAMBLE[i]) { continue; }

				let first:Vec<bool>  = (p..(p + SUBFRAME_BITS)).map(|i| b(i)).collect();
				let second:Vec<bool> = ((p + SUBFRAME_BITS)..(p + 2 * SUBFRAME_BITS)).map(|i| b(i)).collect();
				if !subframe_parity_ok(&first, b(p - 2), b(p - 1)) { continue; }
				if !subframe_parity_ok(&second, first[SUBFRAME_BITS - 2], first[SUBFRAME_BITS - 1]) { continue; }

				// Synchronized; drop everything ahead of the two history bits and
				// let the locked path consume both confirmed subframes
				for _ in 0..(p - 2) { self.buffer.pop_front(); }
				self.state = SyncState::Locked{ inverted, consecutive_failures: 0 };
				return self.try_decode_next(prn);
			}
		}

		while self.buffer.len() > SEARCH_BUFFER_LIMIT { self.buffer.pop_front(); }
		None
	}

	// Consumes as many complete subframes as the buffer holds.  A parity failure
	// discards that subframe; two in a row drop back to the preamble hunt.
	fn try_decode_next(&mut self, prn:usize) -> Option<EphemerisUpdate> {
		let mut update = None;

		while self.buffer.len() >= 2 + SUBFRAME_BITS {
			let (inverted, failures) = match self.state {
				SyncState::Locked{ inverted, consecutive_failures } => (inverted, consecutive_failures),
				SyncState::Searching => break,
			};

			let bits:Vec<bool> = self.buffer.iter().take(2 + SUBFRAME_BITS).map(|(b, _)| *b ^ inverted).collect();
			let t_first_bit = self.buffer[2].1;
			let ok = subframe_parity_ok(&bits[2..], bits[0], bits[1]);

			if ok {
				let corrected = polarity_corrected(&bits[2..], bits[1]);
				if let Some(u) = self.handle_subframe(prn, &corrected, t_first_bit) { update = Some(u); }
				self.state = SyncState::Locked{ inverted, consecutive_failures: 0 };
			} else if failures + 1 >= 2 {
				self.state = SyncState::Searching;
			} else {
				self.state = SyncState::Locked{ inverted, consecutive_failures: failures + 1 };
			}

			// Consume the subframe, leaving its last two bits as the next history
			for _ in 0..SUBFRAME_BITS { self.buffer.pop_front(); }
		}

		update
	}

	fn handle_subframe(&mut self, prn:usize, corrected:&[bool; SUBFRAME_BITS], t:f64) -> Option<EphemerisUpdate> {
		let sf = match subframe::decode(corrected) {
			Ok(sf) => sf,
			Err(_) => return None,
		};

		self.last_subframe = Some(sf);
		self.last_tow_truncated = Some(sf.time_of_week_truncated);

		match sf.body {
			SubframeBody::Subframe1(sf1) => { self.pending_sf1 = Some((sf1, t)); },
			SubframeBody::Subframe2(sf2) => { self.pending_sf2 = Some((sf2, t)); },
			SubframeBody::Subframe3(sf3) => { self.pending_sf3 = Some((sf3, t)); },
			SubframeBody::Subframe4(sf4) => {
				if let Some(iono) = sf4.ionosphere { self.ionosphere = Some(iono); }
				return None;
			},
			SubframeBody::Subframe5{ .. } => return None,
		}

		self.try_publish(prn, t)
	}

	// Ephemeris goes public only when all three halves agree on the issue of data and
	// fall inside one 30-second frame
	fn try_publish(&mut self, prn:usize, t:f64) -> Option<EphemerisUpdate> {
		let (sf1, t1) = self.pending_sf1?;
		let (sf2, t2) = self.pending_sf2?;
		let (sf3, t3) = self.pending_sf3?;

		let newest = t1.max(t2).max(t3);
		let oldest = t1.min(t2).min(t3);
		if newest - oldest > 30.0 { return None; }

		let eph = ephemeris::assemble(prn, &sf1, &sf2, &sf3)?;

		// Same issue of data as what is already public is not news
		if let Some(prev) = &self.ephemeris {
			if prev.iode == eph.iode { return None; }
		}

		self.ephemeris = Some(eph);
		Some(EphemerisUpdate{ prn, time_s: t, ephemeris: eph })
	}

}

/// Navigation-message decoder for any number of satellites.  Bits arrive tagged with
/// their PRN and epoch time; ephemerides surface once their publication rule is met.
pub struct NavDecoder {
	prns: HashMap<usize, PrnDecoder>,
}

impl NavDecoder {

	pub fn new() -> Self { Self{ prns: HashMap::new() } }

	/// Feeds one navigation bit.  Returns a published ephemeris exactly when this bit
	/// completed a fresh subframe 1/2/3 set.
	pub fn feed(&mut self, prn:usize, bit:bool, epoch_time:f64) -> Result<Option<EphemerisUpdate>, GnssError> {
		if prn < 1 || prn > 32 { return Err(GnssError::InvalidPrn(prn)); }
		Ok(self.prns.entry(prn).or_insert_with(PrnDecoder::new).push(prn, bit, epoch_time))
	}

	pub fn ephemeris(&self, prn:usize) -> Option<&Ephemeris> {
		self.prns.get(&prn).and_then(|d| d.ephemeris.as_ref())
	}

	pub fn ionosphere(&self, prn:usize) -> Option<&IonoParams> {
		self.prns.get(&prn).and_then(|d| d.ionosphere.as_ref())
	}

	/// Most recent parity-clean subframe, for status display
	pub fn last_subframe(&self, prn:usize) -> Option<&Subframe> {
		self.prns.get(&prn).and_then(|d| d.last_subframe.as_ref())
	}

	/// Truncated time of week from the most recent handover word, scaled to seconds
	pub fn time_of_week(&self, prn:usize) -> Option<f64> {
		self.prns.get(&prn).and_then(|d| d.last_tow_truncated).map(|tow| (tow as f64) * 6.0)
	}

}
