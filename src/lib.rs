//! Wallet-side transaction consumer for a CryptoNote-family cryptocurrency.
//!
//! Given newly-announced blocks and mempool deltas, this crate identifies which outputs belong
//! to a set of subscribed accounts sharing one view secret key, and materializes the
//! cryptographic artifacts (key images, amounts, global ledger indices) a wallet needs to later
//! spend them.
//!
//! The entry point is [`consumer::Consumer`]; everything else in this crate exists to support it:
//!
//! - [`scanner`] — the per-output stealth-address ownership test.
//! - [`transfer_builder`] — materializes matched outputs into spendable [`types::TransferInfo`],
//!   enforcing the duplicate-output-key defense.
//! - [`preprocessor`] — scanner + global-index lookup + transfer builder, per transaction.
//! - [`pipeline`] — fans preprocessing out across worker threads for one batch of blocks.
//! - [`seen_keys`] — the process-wide (consumer-owned) duplicate output key registry.
//! - [`crypto`] — the underlying elliptic-curve primitives.
//! - [`node`], [`subscription`], [`observer`] — the external collaborators this consumer depends
//!   on or reports to, expressed as traits so this crate never owns chain I/O or wallet state.

pub mod consumer;
pub mod crypto;
pub mod error;
pub mod node;
pub mod observer;
pub mod pipeline;
pub mod preprocessor;
pub mod scanner;
pub mod seen_keys;
pub mod subscription;
pub mod transaction;
pub mod transfer_builder;
pub mod types;

pub use consumer::Consumer;
pub use error::{ConfigError, ErrorCode, PoolError, PreprocessError, TransferBuildError};
pub use types::{
  AccountKeys, AccountPublicAddress, ConsumerConfig, OutputType, SynchronizationStart,
  TransactionBlockInfo, TransferInfo, UNCONFIRMED, UNCONFIRMED_GLOBAL,
};
