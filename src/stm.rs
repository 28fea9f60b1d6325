// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The runtime: global clock, ownership-record table, descriptor slots, and
//! the retry loop that drives a transaction body to commit.

use lazy_static::lazy_static;
use log::*;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crate::{
    clock::GlobalClock,
    cm::Policy,
    error::TxError,
    orec::{OrecTable, DEFAULT_TABLE_BITS},
    transaction::Transaction,
    tword::TWord,
};

/// Name of the packaged algorithm variant.
pub const ALGORITHM: &str = "OrecEager";

/// Environment variable naming the requested algorithm variant.
const ALGORITHM_ENV: &str = "STM_CONFIG";

/// Environment variable naming the requested contention manager.
const POLICY_ENV: &str = "STM_CM";

/// What [`Stm::atomically`] does when an attempt fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Retry the body until it commits.
    Retry,

    /// Give up after the first failed attempt.
    Abort,
}

/// Runtime construction parameters.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Size of the ownership-record table, as a power of two.
    pub table_bits: u32,
    pub policy: Policy,
    pub strategy: Strategy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            table_bits: DEFAULT_TABLE_BITS,
            policy: Policy::default(),
            strategy: Strategy::Retry,
        }
    }
}

struct StmInner {
    clock: GlobalClock,
    orecs: OrecTable,
    slots: AtomicU64,
    config: Config,
}

/// A handle on a transactional-memory runtime. Cloning shares the clock, the
/// record table and the descriptor slot counter.
#[derive(Clone)]
pub struct Stm {
    inner: Arc<StmInner>,
}

impl Default for Stm {
    fn default() -> Self {
        Self::new()
    }
}

impl Stm {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            inner: Arc::new(StmInner {
                clock: GlobalClock::default(),
                orecs: OrecTable::new(config.table_bits),
                slots: AtomicU64::new(0),
                config,
            }),
        }
    }

    /// Builds a runtime from the process environment: `STM_CONFIG` names the
    /// algorithm variant, `STM_CM` the contention manager. Unknown names log
    /// a warning and fall back to the defaults.
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(name) = std::env::var(ALGORITHM_ENV) {
            if name != ALGORITHM {
                warn!("unknown algorithm {:?} requested, staying on {}", name, ALGORITHM);
            }
        }

        if let Ok(name) = std::env::var(POLICY_ENV) {
            match name.as_str() {
                "HyperAggressive" => config.policy = Policy::HyperAggressive,
                "Backoff" => config.policy = Policy::Backoff,
                other => warn!("unknown contention manager {:?}, using {:?}", other, config.policy),
            }
        }

        let stm = Self::with_config(config);
        stm.on_switch_to();
        stm
    }

    /// Hook invoked when this variant becomes the active algorithm.
    pub fn on_switch_to(&self) {
        info!("activating {}", ALGORITHM);
    }

    /// Creates a descriptor for the calling thread. The slot assignment is
    /// what makes the descriptor's lock token unambiguous inside a locked
    /// record.
    pub fn register(&self) -> Transaction {
        let slot = self.inner.slots.fetch_add(1, Ordering::SeqCst);
        Transaction::new(self.clone(), slot, self.inner.config.policy.build())
    }

    /// Runs `body` as a transaction, retrying until it commits (under the
    /// default [`Strategy::Retry`]).
    ///
    /// A conflicting read or write inside the body rolls the descriptor back
    /// and surfaces as an `Err`, which the body is expected to propagate
    /// with `?`; this loop then begins the next attempt. That propagation is
    /// the whole abort path. There is no non-local control transfer.
    pub fn atomically<F, R>(&self, body: F) -> Result<R, TxError>
    where
        F: Fn(&mut Transaction) -> Result<R, TxError>,
    {
        let mut tx = self.register();

        loop {
            tx.begin();

            match body(&mut tx) {
                Ok(result) => match tx.commit() {
                    Ok(()) => return Ok(result),
                    Err(_) => match self.inner.config.strategy {
                        Strategy::Retry => continue,
                        Strategy::Abort => return Err(TxError::Failed),
                    },
                },
                Err(TxError::Conflict) | Err(TxError::ValidationFailed) => {
                    // the failing operation already rolled the descriptor back
                    match self.inner.config.strategy {
                        Strategy::Retry => continue,
                        Strategy::Abort => return Err(TxError::Failed),
                    }
                }
                Err(error) => {
                    // the body gave up on its own; undo any writes it made
                    tx.rollback();
                    return Err(error);
                }
            }
        }
    }

    /// Current value of the global clock.
    pub fn clock_now(&self) -> u64 {
        self.inner.clock.now()
    }

    /// Current lock word of the record covering `word`: a version if the
    /// record is unlocked, an owner token otherwise. Diagnostic.
    pub fn orec_version(&self, word: &TWord) -> u64 {
        self.inner.orecs.get(self.inner.orecs.index_of(word.addr())).load()
    }

    /// Index of the record covering `word`. Diagnostic; two words reporting
    /// the same index contend on the same lock.
    pub fn orec_index(&self, word: &TWord) -> usize {
        self.inner.orecs.index_of(word.addr())
    }

    pub(crate) fn clock(&self) -> &GlobalClock {
        &self.inner.clock
    }

    pub(crate) fn orecs(&self) -> &OrecTable {
        &self.inner.orecs
    }
}

lazy_static! {
    static ref GLOBAL: Stm = Stm::from_env();
}

/// The process-wide runtime, configured from the environment on first use.
pub fn global() -> &'static Stm {
    &GLOBAL
}

/// Runs `body` atomically on the process-wide runtime.
pub fn atomically<F, R>(body: F) -> Result<R, TxError>
where
    F: Fn(&mut Transaction) -> Result<R, TxError>,
{
    global().atomically(body)
}
