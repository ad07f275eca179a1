
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

// Cache-line padding keeps the producer and consumer cursors from false sharing
#[repr(align(64))]
struct PaddedAtomicUsize {
	value: AtomicUsize,
}

impl PaddedAtomicUsize {

	fn new(v:usize) -> Self { Self{ value: AtomicUsize::new(v) } }

}

/// Bounded single-producer/single-consumer ring for plain sample data.  When the
/// producer outruns the consumer the oldest samples are overwritten and counted;
/// nothing ever blocks and nothing allocates after construction.
///
/// `head` and `tail` are monotonically increasing sample counts; the slot of count
/// `c` is `c & mask`.  The producer owns `head` and also advances `tail` when it
/// must drop; the consumer advances `tail` by compare-exchange so a concurrent drop
/// simply makes it retry.
pub struct SampleRing<T: Copy + Default> {
	buffer: Box<[UnsafeCell<T>]>,
	head: PaddedAtomicUsize,
	tail: PaddedAtomicUsize,
	overflow: AtomicU64,
	mask: usize,
}

unsafe impl<T: Copy + Default + Send> Sync for SampleRing<T> {}
unsafe impl<T: Copy + Default + Send> Send for SampleRing<T> {}

impl<T: Copy + Default> SampleRing<T> {

	/// Capacity is rounded up to the next power of two, minimum 2
	pub fn new(capacity:usize) -> Self {
		let capacity = capacity.max(2).next_power_of_two();
		let buffer:Vec<UnsafeCell<T>> = (0..capacity).map(|_| UnsafeCell::new(T::default())).collect();
		Self{
			buffer: buffer.into_boxed_slice(),
			head: PaddedAtomicUsize::new(0),
			tail: PaddedAtomicUsize::new(0),
			overflow: AtomicU64::new(0),
			mask: capacity - 1,
		}
	}

	pub fn capacity(&self) -> usize { self.mask + 1 }

	pub fn len(&self) -> usize {
		let head = self.head.value.load(Ordering::Acquire);
		let tail = self.tail.value.load(Ordering::Acquire);
		head.wrapping_sub(tail)
	}

	pub fn is_empty(&self) -> bool { self.len() == 0 }

	/// Samples lost to drop-oldest overwrites since construction
	pub fn overflow_count(&self) -> u64 { self.overflow.load(Ordering::Relaxed) }

	/// Producer side.  Appends all of `items`, overwriting the oldest samples if the
	/// consumer is behind.  Slices longer than the whole ring only keep their tail.
	pub fn push_slice(&self, items:&[T]) {
		let cap = self.capacity();

		// A burst larger than the ring reduces to its last `cap` samples
		let (skipped, items) = if items.len() > cap {
			(items.len() - cap, &items[(items.len() - cap)..])
		} else {
			(0, items)
		};
		if skipped > 0 { self.overflow.fetch_add(skipped as u64, Ordering::Relaxed); }

		let head = self.head.value.load(Ordering::Relaxed);
		let tail = self.tail.value.load(Ordering::Acquire);
		let free = cap - head.wrapping_sub(tail);
		if items.len() > free {
			let drop = items.len() - free;
			self.tail.value.fetch_add(drop, Ordering::AcqRel);
			self.overflow.fetch_add(drop as u64, Ordering::Relaxed);
		}

		for (i, &item) in items.iter().enumerate() {
			let slot = (head.wrapping_add(i)) & self.mask;
			unsafe { *self.buffer[slot].get() = item; }
		}
		self.head.value.store(head.wrapping_add(items.len()), Ordering::Release);
	}

	/// Consumer side.  Copies up to `out.len()` of the oldest samples and returns
	/// how many were taken.  Retries internally if the producer overwrote the region
	/// mid-read.
	pub fn pop_slice(&self, out:&mut [T]) -> usize {
		loop {
			let tail = self.tail.value.load(Ordering::Acquire);
			let head = self.head.value.load(Ordering::Acquire);
			let avail = head.wrapping_sub(tail);
			if avail == 0 { return 0; }

			let n = avail.min(out.len());
			for i in 0..n {
				let slot = (tail.wrapping_add(i)) & self.mask;
				out[i] = unsafe { *self.buffer[slot].get() };
			}

			// If the producer wrapped into the span we just copied, the data is
			// torn; take the new tail and go again
			let head_now = self.head.value.load(Ordering::Acquire);
			if head_now.wrapping_sub(tail) > self.capacity() { continue; }

			match self.tail.value.compare_exchange(tail, tail.wrapping_add(n), Ordering::AcqRel, Ordering::Acquire) {
				Ok(_) => return n,
				Err(_) => continue,	// producer dropped samples under us
			}
		}
	}

}

/// Last-value snapshot cell: one writer, any number of readers, no locks.  A seqlock
/// version counter is odd while a write is in flight; readers retry until they see a
/// stable even version on both sides of the copy.
pub struct Latest<T: Copy> {
	seq: AtomicUsize,
	cell: UnsafeCell<Option<T>>,
}

unsafe impl<T: Copy + Send> Sync for Latest<T> {}
unsafe impl<T: Copy + Send> Send for Latest<T> {}

impl<T: Copy> Latest<T> {

	pub fn new() -> Self { Self{ seq: AtomicUsize::new(0), cell: UnsafeCell::new(None) } }

	/// Single-writer publish
	pub fn publish(&self, value:Option<T>) {
		let s = self.seq.load(Ordering::Relaxed);
		self.seq.store(s.wrapping_add(1), Ordering::Release);
		unsafe { *self.cell.get() = value; }
		self.seq.store(s.wrapping_add(2), Ordering::Release);
	}

	pub fn read(&self) -> Option<T> {
		loop {
			let s1 = self.seq.load(Ordering::Acquire);
			if s1 % 2 == 1 {
				std::hint::spin_loop();
				continue;
			}
			let value = unsafe { *self.cell.get() };
			let s2 = self.seq.load(Ordering::Acquire);
			if s1 == s2 { return value; }
		}
	}

}
