// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! # Eager Versioned-Lock Software Transactional Memory
//!
//! This crate implements an eager, encounter-time-locking STM over
//! word-sized shared cells. A fixed table of versioned ownership records
//! guards the transactional heap: readers sample a record's version around
//! each load to obtain a consistent snapshot, while writers acquire the
//! record in place, log the old value, and update memory directly. Commit
//! stamps every owned record with a fresh global-clock value; abort replays
//! the undo log backwards and re-stamps the records one past their previous
//! version.
//!
//! ```
//! use orec_stm::{Stm, TWord};
//!
//! let stm = Stm::new();
//! let counter = TWord::new(0);
//!
//! let c = counter.clone();
//! stm.atomically(|tx| {
//!     let v = tx.read(&c)?;
//!     tx.store(&c, v + 1)
//! })
//! .expect("Transaction failed");
//!
//! assert_eq!(counter.read_atomic(), 1);
//! ```

pub mod clock;
pub mod cm;
pub mod error;
pub mod orec;
pub mod stm;
pub mod transaction;
pub mod tword;

pub use cm::{Backoff, ContentionManager, HyperAggressive, Policy};
pub use error::TxError;
pub use stm::{atomically, global, Config, Stm, Strategy, ALGORITHM};
pub use transaction::Transaction;
pub use tword::TWord;
