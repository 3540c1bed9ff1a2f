//! The capability set this consumer needs from a transaction, independent of its wire encoding.
//!
//! Scanning, transfer-building and preprocessing are all generic over [`TransactionReader`]
//! rather than over a concrete transaction type, mirroring how `monero-wallet`'s scanner is
//! generic over `Transaction<Pruned>` plus an externally-supplied RPC boundary
//! (`monero_rpc::ScannableBlock`) instead of owning transaction parsing itself.

use crate::types::{Output, OutputType, PublicKey, TransactionHash};

/// A null transaction public key; transactions carrying it are skipped during enumeration
/// (spec.md §4.4).
pub const NULL_PUBLIC_KEY: PublicKey = [0u8; 32];

/// Read-only access to one transaction's addressable surface.
pub trait TransactionReader {
  /// This transaction's `R`, the one-time transaction public key used for derivation.
  fn transaction_public_key(&self) -> PublicKey;

  /// This transaction's hash.
  fn transaction_hash(&self) -> TransactionHash;

  /// The number of outputs in this transaction.
  fn output_count(&self) -> u32;

  /// The type tag of the output at `index`, without materializing it.
  fn output_type(&self, index: u32) -> OutputType;

  /// The output at `index`, plus its cleartext amount.
  ///
  /// Implementers may panic if `index >= output_count()`; callers in this crate never invoke
  /// this out of bounds.
  fn get_output(&self, index: u32) -> (Output, u64);
}

/// A minimal in-memory [`TransactionReader`], used by this crate's own tests and by the
/// `demos/` binary to exercise the `Consumer` without a real node.
#[derive(Clone, Debug)]
pub struct InMemoryTransaction {
  /// See [`TransactionReader::transaction_hash`].
  pub hash: TransactionHash,
  /// See [`TransactionReader::transaction_public_key`].
  pub public_key: PublicKey,
  /// The outputs, in transaction order, paired with their amounts.
  pub outputs: Vec<(Output, u64)>,
}

impl TransactionReader for InMemoryTransaction {
  fn transaction_public_key(&self) -> PublicKey {
    self.public_key
  }

  fn transaction_hash(&self) -> TransactionHash {
    self.hash
  }

  fn output_count(&self) -> u32 {
    u32::try_from(self.outputs.len()).expect("more than u32::MAX outputs in one transaction")
  }

  fn output_type(&self, index: u32) -> OutputType {
    self.outputs[index as usize].0.output_type()
  }

  fn get_output(&self, index: u32) -> (Output, u64) {
    self.outputs[index as usize].clone()
  }
}
