//! The blockchain/pool event source this consumer depends on (spec.md §6, "Node (consumed)").
//!
//! Specified only by interface: block/pool delivery and global-index resolution are owned by
//! whatever concrete chain client the wallet is wired to. The spec's C++ API is callback-shaped;
//! here it is a plain `async fn`, bridged back to the synchronous preprocessing worker threads via
//! a `tokio::runtime::Handle::block_on` call (spec.md §9's "callback-to-sync bridge").

use crate::error::ErrorCode;
use crate::types::TransactionHash;

/// Async access to the chain state needed to resolve a confirmed transaction's global output
/// indices.
#[async_trait::async_trait]
pub trait Node: Send + Sync {
  /// Resolves the ledger-wide global output index of every output in `tx_hash`, in output order.
  ///
  /// Only ever called for confirmed (non-pool) transactions; preprocessing calls this
  /// synchronously from a worker thread and blocks until it resolves (spec.md §4.3).
  async fn get_transaction_outs_global_indices(
    &self,
    tx_hash: TransactionHash,
  ) -> Result<Vec<u32>, ErrorCode>;
}
