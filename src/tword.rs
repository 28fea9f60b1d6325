// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// A word-sized transactional cell.
///
/// [`TWord`] is the unit of instrumented access: transactions load and store
/// it through [`crate::Transaction::read`] and [`crate::Transaction::write`].
/// Cloning shares the underlying word, and the address of the shared word is
/// what the ownership-record table hashes on. Isolation between concurrent
/// transactions comes entirely from the record protocol, which is why plain
/// relaxed accesses on the cell itself suffice.
#[derive(Clone, Debug, Default)]
pub struct TWord {
    cell: Arc<AtomicU64>,
}

impl TWord {
    pub fn new(value: u64) -> Self {
        Self {
            cell: Arc::new(AtomicU64::new(value)),
        }
    }

    /// The transactional address of this cell.
    #[inline]
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.cell) as usize
    }

    #[inline]
    pub(crate) fn load_raw(&self) -> u64 {
        self.cell.load(Ordering::Relaxed)
    }

    /// Overwrites the bytes selected by `mask`, leaving the rest untouched.
    /// Only the transaction owning the covering record may call this.
    #[inline]
    pub(crate) fn store_masked(&self, value: u64, mask: u64) {
        if mask == u64::MAX {
            self.cell.store(value, Ordering::Relaxed);
            return;
        }

        let old = self.cell.load(Ordering::Relaxed);
        self.cell
            .store((old & !mask) | (value & mask), Ordering::Relaxed);
    }

    /// Reads the current value outside of any transaction.
    pub fn read_atomic(&self) -> u64 {
        self.cell.load(Ordering::SeqCst)
    }
}
