// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Ownership records. Every transactional word hashes to one record in a
//! fixed-size table; the record is a word-sized versioned lock, using a
//! single bit to indicate ownership while the rest of the bits carry either
//! a version or the owner's lock token.

use std::sync::atomic::{AtomicU64, Ordering};

/// Number of records in the default table, as a power of two.
pub const DEFAULT_TABLE_BITS: u32 = 20;

/// Returns the word size in number of bits
const fn word_size_bits() -> u32 {
    (std::mem::size_of::<u64>() * 8) as u32
}

/// Returns the number of bits to shift left to reach the most significant bit
const fn shift_by() -> u32 {
    word_size_bits() - 1
}

/// The most significant bit marks a locked record; everything below it is
/// either a version (unlocked) or the owner slot (locked).
pub(crate) const LOCK_BIT: u64 = 1u64 << shift_by();

/// Returns `true` if the lock word carries an owner token rather than a version.
pub(crate) const fn is_locked(word: u64) -> bool {
    word & LOCK_BIT != 0
}

/// A single ownership record.
///
/// The lock word is read optimistically by everyone and written by CAS on
/// acquisition and by a plain release store by the owner. `prev` is written
/// only by the owner while it holds the lock, and read back when the owner
/// releases after an abort.
#[derive(Default, Debug)]
pub struct Orec {
    state: AtomicU64,
    prev: AtomicU64,
}

impl Orec {
    /// Loads the lock word: a version if unlocked, an owner token if locked.
    #[inline]
    pub fn load(&self) -> u64 {
        self.state.load(Ordering::Acquire)
    }

    /// Attempts to swing the lock word from the unlocked version `expected`
    /// to the owner token `lock_token`. Returns `true` on success.
    #[inline]
    pub fn try_acquire(&self, expected: u64, lock_token: u64) -> bool {
        debug_assert!(!is_locked(expected));
        debug_assert!(is_locked(lock_token));

        self.state
            .compare_exchange(expected, lock_token, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Stores an unlocked version into the lock word, releasing ownership.
    /// Must only be called by the current owner.
    #[inline]
    pub fn release(&self, version: u64) {
        debug_assert!(!is_locked(version));
        debug_assert!(is_locked(self.state.load(Ordering::Relaxed)));

        self.state.store(version, Ordering::Release);
    }

    /// The version this record held immediately before the current owner
    /// acquired it. Owner-only.
    #[inline]
    pub fn prev(&self) -> u64 {
        self.prev.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_prev(&self, version: u64) {
        self.prev.store(version, Ordering::Relaxed)
    }
}

/// The shared table of ownership records.
///
/// Distinct words may hash to the same record; a collision manufactures a
/// false conflict, never a consistency violation.
pub struct OrecTable {
    records: Box<[Orec]>,
    shift: u32,
}

impl OrecTable {
    /// Allocates a table of `2^bits` records.
    pub fn new(bits: u32) -> Self {
        assert!((1..=32).contains(&bits), "table size out of range");

        let len = 1usize << bits;
        let records: Vec<Orec> = (0..len).map(|_| Orec::default()).collect();

        Self {
            records: records.into_boxed_slice(),
            shift: word_size_bits() - bits,
        }
    }

    /// Maps a word address onto a record index. Pure function of the address.
    #[inline]
    pub fn index_of(&self, addr: usize) -> usize {
        // Fibonacci hashing over the word-aligned address
        let key = (addr as u64) >> 3;
        (key.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> self.shift) as usize
    }

    #[inline]
    pub fn get(&self, index: usize) -> &Orec {
        &self.records[index]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for OrecTable {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE_BITS)
    }
}
