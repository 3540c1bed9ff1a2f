//! Error types for every fallible boundary in this crate.

use thiserror::Error;

use crate::types::TransactionHash;

/// Errors which can occur while building [`crate::TransferInfo`]s for a single account's
/// matched outputs.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum TransferBuildError {
  /// The scanner returned an output index past the end of the transaction.
  #[error("output index {index} is out of domain for a transaction with {output_count} outputs")]
  ArgumentOutOfDomain {
    /// The offending index.
    index: u32,
    /// The number of outputs the transaction actually has.
    output_count: u32,
  },
}

/// Errors returned while preprocessing a single transaction for every subscription.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum PreprocessError {
  /// The node failed to resolve global output indices for a confirmed transaction.
  #[error("node lookup of global output indices failed with code {0:?}")]
  NodeLookupFailed(ErrorCode),
  /// Building transfers for a matched subscription failed.
  #[error(transparent)]
  TransferBuild(#[from] TransferBuildError),
}

/// Errors returned by pool-update and single-transaction pool operations.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum PoolError {
  /// Preprocessing the pool transaction failed.
  #[error(transparent)]
  Preprocess(#[from] PreprocessError),
}

/// Errors surfaced synchronously to the caller of a Consumer operation.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum ConfigError {
  /// `add_subscription` was called with a view secret key that does not match the one this
  /// consumer was constructed with.
  #[error("subscription's view secret key does not match this consumer's view secret key")]
  ViewKeyMismatch,
}

/// A generic error code, carried through hard preprocessing failures and surfaced to every
/// subscription's `on_error` observer callback.
///
/// This mirrors the node's own error-code shape rather than introducing a second taxonomy: a
/// consumer that fails mid-batch doesn't get to decide what the node's failure "meant", it just
/// forwards it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorCode {
  /// The node's request failed for an internal reason.
  Internal,
  /// The node does not know of this transaction.
  NotFound(TransactionHash),
  /// Preprocessing hit an [`PreprocessError`].
  Preprocessing(PreprocessError),
}

impl From<PreprocessError> for ErrorCode {
  fn from(err: PreprocessError) -> Self {
    Self::Preprocessing(err)
  }
}
