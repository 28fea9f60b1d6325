// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error as DeriveError;

#[derive(Debug, DeriveError, PartialEq, Eq)]
pub enum TxError {
    #[error("conflicting ownership record")]
    Conflict,

    #[error("read set validation failed")]
    ValidationFailed,

    #[error("transaction failed")]
    Failed,
}
