//! Multi-observer broadcast for consumer-level lifecycle events (spec.md §6, "Observers").
//!
//! Dispatch is synchronous; per spec.md §9, observers must never call back into the `Consumer`
//! from within a callback — that contract is the caller's responsibility, not something this
//! crate can enforce at the type level.

use crate::{error::ErrorCode, types::AccountPublicAddress};

/// Receives notifications about a `Consumer`'s lifecycle.
pub trait ConsumerObserver {
  /// Called once per successful `on_new_blocks` batch, before any `on_transaction_updated`, with
  /// the hashes of the blocks that were added.
  fn on_blocks_added(&mut self, _block_hashes: &[[u8; 32]]) {}

  /// Called when the chain detaches above `height`.
  fn on_blockchain_detach(&mut self, _height: u64) {}

  /// Called after a transaction was applied to one or more subscriptions, naming which accounts
  /// now hold it.
  fn on_transaction_updated(&mut self, _tx_hash: [u8; 32], _accounts: &[AccountPublicAddress]) {}

  /// Called before a pool transaction is removed from every subscription.
  fn on_transaction_delete_begin(&mut self, _tx_hash: [u8; 32]) {}

  /// Called after a pool transaction has been removed from every subscription.
  fn on_transaction_delete_end(&mut self, _tx_hash: [u8; 32]) {}

  /// Called once per failed batch/pool-update, fanned out to every subscription's `on_error` as
  /// well.
  fn on_error(&mut self, _error: ErrorCode, _start_height: u64) {}
}
