// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The per-thread transaction descriptor and the eager acquire/undo
//! protocol: optimistic consistent reads, in-place writes behind an owned
//! record, read-set validation, and the two finalization paths.

use log::*;

use crate::{
    cm::ContentionManager,
    error::TxError,
    orec::{is_locked, LOCK_BIT},
    stm::Stm,
    tword::TWord,
};

struct UndoEntry {
    word: TWord,
    old: u64,
    mask: u64,
}

/// A transaction descriptor. Created once per thread via
/// [`Stm::register`](crate::Stm::register) and reset at each [`begin`](Self::begin).
///
/// The descriptor itself is accessed only by its owning thread; the only
/// piece of it other threads ever observe is the lock token stored into
/// ownership records it has acquired.
pub struct Transaction {
    stm: Stm,

    /// Token identifying this descriptor inside a locked record.
    my_lock: u64,

    /// Snapshot of the global clock taken at begin.
    start_time: u64,

    /// Set once in-flight serialization succeeded; accesses bypass the
    /// protocol from then on.
    irrevocable: bool,

    /// Indices of the records this transaction has read from. Duplicates
    /// are allowed.
    r_orecs: Vec<usize>,

    /// Indices of the records this transaction currently owns.
    locks: Vec<usize>,

    /// Old values in write order, replayed backwards on abort.
    undo_log: Vec<UndoEntry>,

    cm: Box<dyn ContentionManager>,
}

impl Transaction {
    pub(crate) fn new(stm: Stm, slot: u64, cm: Box<dyn ContentionManager>) -> Self {
        Self {
            stm,
            my_lock: LOCK_BIT | slot,
            start_time: 0,
            irrevocable: false,
            r_orecs: Vec::new(),
            locks: Vec::new(),
            undo_log: Vec::new(),
            cm,
        }
    }

    /// The table slot this descriptor registered under.
    pub fn slot(&self) -> u64 {
        self.my_lock & !LOCK_BIT
    }

    /// Starts a fresh transaction on this descriptor. Cannot fail.
    pub fn begin(&mut self) {
        // leftovers mean the previous attempt was neither committed nor
        // rolled back; clean up before sampling a new start time
        if !self.locks.is_empty() || !self.undo_log.is_empty() {
            self.rollback();
        }

        self.r_orecs.clear();
        self.irrevocable = false;
        self.start_time = self.stm.clock().now();
        self.cm.on_begin();

        info!("TX({}): begin at {}", self.slot(), self.start_time);
    }

    /// Optimistic read of a transactional word.
    ///
    /// The two loads of the covering record's lock word bracket the value
    /// load; if both samples agree on an unlocked version no newer than
    /// `start_time`, the value belongs to a consistent snapshot. Anything
    /// else is a conflict and aborts the transaction.
    pub fn read(&mut self, word: &TWord) -> Result<u64, TxError> {
        if self.irrevocable {
            return Ok(word.load_raw());
        }

        let index = self.stm.orecs().index_of(word.addr());
        let orec = self.stm.orecs().get(index);

        let v1 = orec.load();
        let value = word.load_raw();

        // a record we own covers a word we already wrote; the in-place value
        // is ours to see
        if v1 == self.my_lock {
            return Ok(value);
        }

        let v2 = orec.load();

        // a locked sample carries the lock bit and always compares greater
        // than any start time
        if v1 == v2 && v1 <= self.start_time {
            self.r_orecs.push(index);
            return Ok(value);
        }

        info!("TX({}): read conflict on record {}", self.slot(), index);
        self.rollback();
        Err(TxError::Conflict)
    }

    /// Eager write: acquire the covering record at encounter time, log the
    /// old value, and update the word in place.
    pub fn write(&mut self, word: &TWord, value: u64, mask: u64) -> Result<(), TxError> {
        if self.irrevocable {
            word.store_masked(value, mask);
            return Ok(());
        }

        let index = self.stm.orecs().index_of(word.addr());
        let orec = self.stm.orecs().get(index);
        let v = orec.load();

        if !is_locked(v) && v <= self.start_time {
            if orec.try_acquire(v, self.my_lock) {
                orec.set_prev(v);
                self.locks.push(index);
                self.undo_log.push(UndoEntry {
                    word: word.clone(),
                    old: word.load_raw(),
                    mask,
                });
                word.store_masked(value, mask);
                return Ok(());
            }

            // lost the race for an otherwise writable record
            info!("TX({}): lost acquisition race on record {}", self.slot(), index);
            self.rollback();
            return Err(TxError::Conflict);
        }

        // many words hash onto one record; a record we already own covers
        // this word too
        if v == self.my_lock {
            self.undo_log.push(UndoEntry {
                word: word.clone(),
                old: word.load_raw(),
                mask,
            });
            word.store_masked(value, mask);
            return Ok(());
        }

        // foreign owner, or unlocked but newer than our snapshot
        info!("TX({}): write conflict on record {}", self.slot(), index);
        self.rollback();
        Err(TxError::Conflict)
    }

    /// Whole-word write.
    pub fn store(&mut self, word: &TWord, value: u64) -> Result<(), TxError> {
        self.write(word, value, u64::MAX)
    }

    /// Checks that no record in the read set has moved past `start_time`.
    /// Read-only; does not modify the descriptor.
    fn validate(&self) -> Result<(), TxError> {
        for &index in &self.r_orecs {
            let v = self.stm.orecs().get(index).load();
            if v > self.start_time && v != self.my_lock {
                return Err(TxError::ValidationFailed);
            }
        }

        Ok(())
    }

    /// Two-phase finalize.
    ///
    /// A transaction that owns no records is read-only and serializes at its
    /// start time without touching the clock. A writer takes a fresh end
    /// timestamp, re-validates its reads, and releases every owned record at
    /// the end timestamp; the in-place stores precede the releasing stores,
    /// so all written values are visible the instant a lock comes off.
    pub fn commit(&mut self) -> Result<(), TxError> {
        if self.irrevocable {
            self.irrevocable = false;
            self.cm.on_commit();
            return Ok(());
        }

        if self.locks.is_empty() {
            self.cm.on_commit();
            self.r_orecs.clear();
            return Ok(());
        }

        let end_time = self.stm.clock().tick();

        if self.validate().is_err() {
            info!("TX({}): validation failed at commit", self.slot());
            self.rollback();
            return Err(TxError::ValidationFailed);
        }

        for &index in &self.locks {
            self.stm.orecs().get(index).release(end_time);
        }

        info!("TX({}): committed at {}", self.slot(), end_time);

        self.cm.on_commit();
        self.r_orecs.clear();
        self.locks.clear();
        self.undo_log.clear();

        Ok(())
    }

    /// Aborts the transaction: replays the undo log backwards, releases
    /// every owned record one past its pre-acquisition version, and pushes
    /// the global clock past the largest version handed out this way.
    ///
    /// The bumped version is what lets a concurrent reader that sampled the
    /// record before the acquisition detect the ownership episode.
    pub fn rollback(&mut self) {
        while let Some(entry) = self.undo_log.pop() {
            entry.word.store_masked(entry.old, entry.mask);
        }

        let mut max_version = 0;
        for &index in &self.locks {
            let orec = self.stm.orecs().get(index);
            debug_assert_eq!(orec.load(), self.my_lock);

            let new_version = orec.prev() + 1;
            orec.release(new_version);
            max_version = max_version.max(new_version);
        }

        if max_version > 0 {
            self.stm.clock().advance_past(max_version);
        }

        self.locks.clear();
        self.r_orecs.clear();
        self.cm.on_abort();

        info!("TX({}): rolled back", self.slot());
    }

    /// Attempts in-flight serialization: validate the read set against a
    /// fresh end timestamp and, on success, release all owned records so the
    /// rest of the transaction runs directly against memory.
    ///
    /// Returns `false` if validation refuses irrevocability; the caller must
    /// then abort through the normal path.
    pub fn become_irrevocable(&mut self) -> bool {
        if self.irrevocable {
            return true;
        }

        let end_time = self.stm.clock().tick();

        if self.validate().is_err() {
            return false;
        }

        for &index in &self.locks {
            self.stm.orecs().get(index).release(end_time);
        }

        self.r_orecs.clear();
        self.locks.clear();
        self.undo_log.clear();
        self.irrevocable = true;

        info!("TX({}): irrevocable at {}", self.slot(), end_time);

        true
    }

    pub fn is_irrevocable(&self) -> bool {
        self.irrevocable
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        // a descriptor dropped mid-transaction must not leave records owned
        if !self.locks.is_empty() || !self.undo_log.is_empty() {
            self.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Config, Stm, TWord, TxError};

    fn small_stm() -> Stm {
        Stm::with_config(Config {
            table_bits: 10,
            ..Config::default()
        })
    }

    #[test]
    fn test_write_read_back_within_transaction() {
        let stm = small_stm();
        let word = TWord::new(3);

        let mut tx = stm.register();
        tx.begin();

        assert_eq!(tx.read(&word), Ok(3));
        tx.store(&word, 9).unwrap();
        assert_eq!(tx.read(&word), Ok(9));

        tx.commit().unwrap();
        assert_eq!(word.read_atomic(), 9);
    }

    #[test]
    fn test_read_only_commit_leaves_records_untouched() {
        let stm = small_stm();
        let word = TWord::new(5);
        let before = stm.orec_version(&word);

        let mut tx = stm.register();
        tx.begin();
        assert_eq!(tx.read(&word), Ok(5));
        tx.commit().unwrap();

        assert_eq!(stm.orec_version(&word), before);
    }

    #[test]
    fn test_foreign_lock_aborts_writer() {
        let stm = small_stm();
        let word = TWord::new(0);

        let mut holder = stm.register();
        holder.begin();
        holder.store(&word, 1).unwrap();

        let mut tx = stm.register();
        tx.begin();
        assert_eq!(tx.store(&word, 2), Err(TxError::Conflict));

        holder.commit().unwrap();
        assert_eq!(word.read_atomic(), 1);
    }

    #[test]
    fn test_drop_releases_owned_records() {
        let stm = small_stm();
        let word = TWord::new(7);

        {
            let mut tx = stm.register();
            tx.begin();
            tx.store(&word, 8).unwrap();
        }

        assert_eq!(word.read_atomic(), 7);

        // the record must be writable again
        let mut tx = stm.register();
        tx.begin();
        tx.store(&word, 9).unwrap();
        tx.commit().unwrap();
        assert_eq!(word.read_atomic(), 9);
    }
}
