//! The per-account subscriber this consumer feeds (spec.md §6, "Subscription (consumed)").
//!
//! `Subscription` and its `TransactionsContainer` are external collaborators: they own the
//! durable record of what's been received and spent. This crate only ever calls into them; it
//! never inspects or persists their state itself (spec.md §1's non-goals).
//!
//! `Subscription` is generic over the concrete [`TransactionReader`] type the surrounding wallet
//! uses, rather than taking `impl TransactionReader` per method — that would make the trait
//! unusable as a type parameter bound on `Consumer` (generic trait methods aren't object-safe
//! and complicate monomorphization for no benefit here, since one `Consumer` only ever talks to
//! one transaction representation).

use crate::{
  error::ErrorCode,
  transaction::TransactionReader,
  types::{
    AccountKeys, AccountPublicAddress, SynchronizationStart, TransactionBlockInfo, TransferInfo,
  },
};

/// The container a `Subscription` keeps of everything it has recorded.
pub trait TransactionsContainer {
  /// Whether this container already has a record for `tx_hash`, and if so, the block info it
  /// was recorded under.
  fn get_transaction_information(&self, tx_hash: &[u8; 32]) -> Option<TransactionBlockInfo>;

  /// The hashes of every unconfirmed (pool) transaction this container currently knows about.
  fn get_unconfirmed_transactions(&self) -> Vec<[u8; 32]>;
}

/// One wallet account's subscription to this consumer's scanning results.
pub trait Subscription<Tx: TransactionReader> {
  /// The container type this subscription records into.
  type Container: TransactionsContainer;

  /// This subscription's lower scanning bound.
  fn get_sync_start(&self) -> SynchronizationStart;

  /// This subscription's transaction container.
  fn get_container(&self) -> &Self::Container;

  /// This subscription's full key material.
  fn get_keys(&self) -> &AccountKeys;

  /// This subscription's public address (and therefore its identity within the consumer).
  fn get_address(&self) -> AccountPublicAddress;

  /// Forwarded chain-reorg notification; this subscription rolls back anything above `height`.
  fn on_blockchain_detach(&mut self, height: u64);

  /// Forwarded hard-failure notification for a batch this subscription was part of.
  fn on_error(&mut self, error: ErrorCode, start_height: u64);

  /// Records a transaction this subscription has not seen before.
  ///
  /// Returns whether anything was actually recorded: a subscription may choose to ignore a
  /// transaction that neither pays it nor spends one of its existing outputs.
  fn add_transaction(
    &mut self,
    block_info: TransactionBlockInfo,
    tx: &Tx,
    transfers: &[TransferInfo],
  ) -> bool;

  /// The pool→chain transition for a transaction this subscription already knows about as
  /// unconfirmed. A strict one-way transition (spec.md §3 invariants).
  fn mark_transaction_confirmed(
    &mut self,
    block_info: TransactionBlockInfo,
    tx_hash: [u8; 32],
    global_idxs: &[u32],
  );

  /// Marks a transaction as safe (e.g. re-announced by a trusted relay), per
  /// `Consumer::mark_transaction_safe`.
  fn mark_transaction_safe(&mut self, tx_hash: [u8; 32]);

  /// Removes an unconfirmed transaction dropped from the pool.
  fn delete_unconfirmed_transaction(&mut self, tx_hash: [u8; 32]);

  /// Advances this subscription's recorded height to `height`, called once per `on_new_blocks`
  /// batch after every transaction in it has been applied.
  fn advance_height(&mut self, height: u64);
}
