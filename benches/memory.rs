// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use criterion::Criterion;
use orec_stm::{Stm, TWord};

/// Uncontended read-modify-write commit path
pub fn bnc_uncontended_rmw(c: &mut Criterion) {
    c.bench_function("bench_uncontended_rmw", |b| {
        let stm = Stm::new();
        let word = TWord::new(0);

        b.iter(|| {
            stm.atomically(|tx| {
                let v = tx.read(&word)?;
                tx.store(&word, v.wrapping_add(1))
            })
            .expect("Transaction failed")
        })
    });
}

/// Read-only commit path, which never touches the clock
pub fn bnc_read_only(c: &mut Criterion) {
    c.bench_function("bench_read_only", |b| {
        let stm = Stm::new();
        let words: Vec<TWord> = (0..64u64).map(TWord::new).collect();

        b.iter(|| {
            stm.atomically(|tx| {
                let mut sum = 0u64;
                for word in words.iter() {
                    sum = sum.wrapping_add(tx.read(word)?);
                }
                Ok(sum)
            })
            .expect("Transaction failed")
        })
    });
}
