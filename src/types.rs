//! The core data model: addresses, keys, per-transaction positioning, and the per-subscriber
//! results the preprocessing pipeline produces.

use std::collections::HashMap;

use curve25519_dalek::scalar::Scalar;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A compressed Edwards25519 point used for public keys, stealth addresses and key images.
pub type PublicKey = [u8; 32];

/// An Ed25519 scalar used for secret keys.
pub type SecretKey = Scalar;

/// A one-time key image tag, preventing double-spend of the output it was derived for.
pub type KeyImage = [u8; 32];

/// A transaction hash.
pub type TransactionHash = [u8; 32];

/// The sentinel height denoting a mempool-resident (not yet confirmed) transaction.
///
/// Must match the value the rest of the wallet (ledger height accounting, persistence) uses.
pub const UNCONFIRMED: u64 = u64::MAX;

/// The sentinel global output index carried by a `TransferInfo` for an unconfirmed output.
pub const UNCONFIRMED_GLOBAL: u64 = u64::MAX;

/// `(spend_public_key, view_public_key)`, the public half of a CryptoNote account.
///
/// The `spend_public_key` is this consumer's subscription key: every subscription living inside
/// one `Consumer` is keyed by it, and it must be unique within that consumer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct AccountPublicAddress {
  /// The account's spend public key.
  pub spend_public_key: PublicKey,
  /// The account's view public key.
  pub view_public_key: PublicKey,
}

/// The full key material for one subscribed account.
///
/// Held only by the owning `Subscription`; used solely when building transfers (key-image
/// generation needs the spend secret key).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccountKeys {
  /// The public address matching this key material.
  #[zeroize(skip)]
  pub address: AccountPublicAddress,
  /// The account's spend secret key.
  pub spend_secret_key: SecretKey,
  /// The account's view secret key, shared by every subscription within a single consumer.
  pub view_secret_key: SecretKey,
}

/// The lower bound in (height, timestamp) a subscription wants scanning to start from.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SynchronizationStart {
  /// The block height to start scanning from.
  pub height: u64,
  /// The block timestamp to start scanning from, in seconds since the epoch.
  pub timestamp: u64,
}

impl SynchronizationStart {
  /// The aggregate over zero subscriptions: maximal in both fields, so any real subscription's
  /// start is always smaller.
  pub const MAX: Self = Self { height: u64::MAX, timestamp: u64::MAX };

  /// Component-wise minimum of two starts.
  #[must_use]
  pub fn componentwise_min(self, other: Self) -> Self {
    Self { height: self.height.min(other.height), timestamp: self.timestamp.min(other.timestamp) }
  }
}

/// Tunable parameters for a `Consumer`, standing in for file/CLI-parsed currency configuration
/// (left to the embedding application) while keeping the handful of values this crate itself
/// needs (worker count) as a plain value type rather than a global.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ConsumerConfig {
  /// Overrides the batch pipeline's worker count; `None` derives it from hardware parallelism.
  pub worker_count: Option<usize>,
}

/// Where a transaction sits within the chain (or the pool), as observed by this consumer.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TransactionBlockInfo {
  /// The containing block's height, or [`UNCONFIRMED`] for a pool transaction.
  pub height: u64,
  /// The containing block's timestamp, meaningless when `height == UNCONFIRMED`.
  pub timestamp: u64,
  /// This transaction's index within its block, assigned by the enumeration stage.
  pub transaction_index: u32,
}

impl TransactionBlockInfo {
  /// Whether this refers to a mempool-resident transaction.
  #[must_use]
  pub fn is_unconfirmed(&self) -> bool {
    self.height == UNCONFIRMED
  }
}

/// The tag distinguishing the output variants a `TransactionReader` can hand back.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OutputType {
  /// A standard one-time-key output.
  Key,
  /// A legacy N-of-M multisignature output.
  Multisignature,
  /// Anything else (e.g. a future output type this consumer doesn't understand).
  Other,
}

/// A standard one-time-key output.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct KeyOutput {
  /// The output's one-time stealth public key.
  pub key: PublicKey,
}

/// A legacy N-of-M multisignature output.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MultisignatureOutput {
  /// The participating one-time public keys, one per co-signer.
  pub keys: Vec<PublicKey>,
  /// The number of signatures required to spend this output.
  pub required_signatures: u32,
}

/// The output read from a transaction at a given index, before ownership has been determined.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Output {
  /// A one-time-key output.
  Key(KeyOutput),
  /// A multisignature output.
  Multisignature(MultisignatureOutput),
  /// Any other output type; never addressable, skipped by the scanner.
  Other,
}

impl Output {
  /// This output's [`OutputType`] tag.
  #[must_use]
  pub fn output_type(&self) -> OutputType {
    match self {
      Self::Key(_) => OutputType::Key,
      Self::Multisignature(_) => OutputType::Multisignature,
      Self::Other => OutputType::Other,
    }
  }
}

/// A single owned output's fully materialized spend-relevant data.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TransferInfo {
  /// The output's type.
  pub output_type: OutputType,
  /// The transaction's public key (`R`), used in derivation.
  pub tx_public_key: PublicKey,
  /// This output's index within its transaction.
  pub output_in_transaction: u32,
  /// This output's ledger-wide global index, or [`UNCONFIRMED_GLOBAL`] if unconfirmed.
  pub global_output_index: u64,
  /// The output's cleartext amount.
  pub amount: u64,
  /// Key-output-only: the stealth public key, re-derived and sanity-checked against the
  /// transaction's own output key.
  pub output_key: Option<PublicKey>,
  /// Key-output-only: the key image, needed to spend this output.
  pub key_image: Option<KeyImage>,
  /// Multisig-output-only: the number of co-signer signatures required to spend.
  pub required_signatures: Option<u32>,
}

/// The per-transaction, per-consumer result of preprocessing.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct PreprocessInfo {
  /// The whole transaction's global output indices, empty when the transaction is unconfirmed.
  pub global_idxs: Vec<u32>,
  /// Transfers found, grouped by the spend key of the subscription that owns them.
  pub outputs: HashMap<PublicKey, Vec<TransferInfo>>,
}

impl PreprocessInfo {
  /// Whether any subscription matched any output in this transaction.
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.outputs.values().all(Vec::is_empty)
  }
}
