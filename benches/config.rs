// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! # Transactional memory micro benchmarks
//!
//! Test subjects:
//! - the uncontended read-modify-write commit path
//! - the read-only fast path
mod memory;

use criterion::{criterion_group, criterion_main};
use memory::*;

criterion_group!(benches, bnc_uncontended_rmw, bnc_read_only);

criterion_main!(benches);
