//! The duplicate-output-key defense.
//!
//! Rather than a process-wide global, this is a value owned by the `Consumer` (or shared across a
//! wallet-wide context) and passed by reference into the transfer builder. It is deliberately
//! never persisted — its purpose is to catch ledger anomalies observed within a single run, not
//! across restarts.

use std::{
  collections::{HashMap, HashSet},
  sync::Mutex,
};

use crate::types::{PublicKey, TransactionHash};

/// Tracks every output key this consumer has credited to any subscription, and which
/// transaction it came from, so a later transaction reusing the same key can be rejected.
#[derive(Default)]
pub struct SeenKeysRegistry {
  inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
  public_keys_seen: HashMap<PublicKey, TransactionHash>,
  transactions_hash_seen: HashSet<TransactionHash>,
}

impl SeenKeysRegistry {
  /// An empty registry.
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Whether `tx_hash` has already had its output keys committed.
  #[must_use]
  pub fn has_seen_transaction(&self, tx_hash: &TransactionHash) -> bool {
    self.inner.lock().expect("seen-keys registry poisoned").transactions_hash_seen.contains(tx_hash)
  }

  /// Directly inserts a single `(tx_hash, output_key)` pair, bypassing the staged-commit
  /// protocol `check_and_stage`/`commit` use.
  ///
  /// This exists for recovery of persisted wallet state: when a wallet file is reloaded, the keys
  /// it already knows about must be re-seeded here before any new block is scanned.
  pub fn add_public_key_seen(&self, tx_hash: TransactionHash, output_key: PublicKey) {
    let mut inner = self.inner.lock().expect("seen-keys registry poisoned");
    inner.transactions_hash_seen.insert(tx_hash);
    inner.public_keys_seen.insert(output_key, tx_hash);
  }

  /// Runs `f` with exclusive access to the registry, for the duration of building one
  /// transaction's transfers. `f` receives a transaction-scoped view to check candidate keys
  /// against and stage acceptances into; staged keys are committed only after `f` returns,
  /// keeping the read-then-insert atomic relative to concurrent builders in other worker
  /// threads.
  pub fn with_lock<T>(&self, f: impl FnOnce(&mut SeenKeysTransaction<'_>) -> T) -> T {
    let mut inner = self.inner.lock().expect("seen-keys registry poisoned");
    let mut txn = SeenKeysTransaction { inner: &inner, staged: Vec::new() };
    let result = f(&mut txn);
    for (tx_hash, key) in txn.staged {
      inner.transactions_hash_seen.insert(tx_hash);
      inner.public_keys_seen.insert(key, tx_hash);
    }
    result
  }
}

/// A transaction-scoped view into the registry, held for the lifetime of one `with_lock` call.
pub struct SeenKeysTransaction<'a> {
  inner: &'a Inner,
  staged: Vec<(TransactionHash, PublicKey)>,
}

impl SeenKeysTransaction<'_> {
  /// Whether `output_key` is already owned by a transaction other than `tx_hash`.
  #[must_use]
  pub fn is_taken_by_other_transaction(
    &self,
    tx_hash: &TransactionHash,
    output_key: &PublicKey,
  ) -> bool {
    match self.inner.public_keys_seen.get(output_key) {
      Some(owner) => owner != tx_hash,
      None => false,
    }
  }

  /// Stages `(tx_hash, output_key)` for commit once the enclosing `with_lock` call returns.
  pub fn stage(&mut self, tx_hash: TransactionHash, output_key: PublicKey) {
    self.staged.push((tx_hash, output_key));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn second_transaction_with_same_key_is_rejected() {
    let registry = SeenKeysRegistry::new();
    let key: PublicKey = [7; 32];
    let tx_a: TransactionHash = [1; 32];
    let tx_b: TransactionHash = [2; 32];

    registry.with_lock(|txn| {
      assert!(!txn.is_taken_by_other_transaction(&tx_a, &key));
      txn.stage(tx_a, key);
    });

    registry.with_lock(|txn| {
      assert!(txn.is_taken_by_other_transaction(&tx_b, &key));
    });
  }

  #[test]
  fn same_transaction_reusing_its_own_key_is_not_other_owned() {
    let registry = SeenKeysRegistry::new();
    let key: PublicKey = [9; 32];
    let tx_a: TransactionHash = [3; 32];

    registry.with_lock(|txn| {
      txn.stage(tx_a, key);
    });

    registry.with_lock(|txn| {
      assert!(!txn.is_taken_by_other_transaction(&tx_a, &key));
    });
  }
}
