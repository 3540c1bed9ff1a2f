//! Fan-out of preprocessing across worker threads for one `on_new_blocks` batch, and the
//! deterministic re-serialization of their results.
//!
//! The worker pool uses `std::thread` plus an `Arc<Mutex<mpsc::Receiver<_>>>` shared queue — the
//! standard Rust pattern for a fixed-size worker pool pulling from one channel — bridged to the
//! async [`crate::node::Node`] trait via a `tokio::runtime::Handle::block_on` call per item.

use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicBool, Ordering},
    mpsc, Arc, Mutex,
  },
  thread,
};

use crate::{
  error::PreprocessError,
  node::Node,
  preprocessor,
  seen_keys::SeenKeysRegistry,
  transaction::{TransactionReader, NULL_PUBLIC_KEY},
  types::{AccountKeys, PreprocessInfo, PublicKey, SecretKey, SynchronizationStart, TransactionBlockInfo},
};

/// One contiguous block as delivered by the node for a single `on_new_blocks` call.
pub struct CompleteBlock<Tx> {
  /// This block's hash.
  pub hash: [u8; 32],
  /// This block's timestamp, in seconds since the epoch.
  pub timestamp: u64,
  /// The transactions within this block, in block order.
  pub transactions: Vec<Tx>,
}

/// One transaction's preprocessing result, still carrying its positioning and its own data so
/// the aggregation stage can apply it without a second lookup.
pub struct PreprocessedTransaction<Tx> {
  /// Where this transaction sits in the batch.
  pub block_info: TransactionBlockInfo,
  /// The transaction itself.
  pub tx: Tx,
  /// What preprocessing found for it.
  pub info: PreprocessInfo,
}

/// Runs the three-stage batch pipeline over `blocks`, returning preprocessed transactions sorted
/// by `(height, transaction_index)` — the total order in which they must be applied to
/// subscriptions, independent of worker scheduling.
///
/// On the first hard preprocessing error, returns it paired with `start_height`; no partial
/// results are returned in that case, matching "no partial commit".
#[allow(clippy::too_many_arguments)]
pub fn run_batch<Tx, N>(
  blocks: &[CompleteBlock<Tx>],
  start_height: u64,
  sync_start: SynchronizationStart,
  accounts: Arc<HashMap<PublicKey, AccountKeys>>,
  view_secret: SecretKey,
  node: Arc<N>,
  seen_keys: Arc<SeenKeysRegistry>,
  runtime: &tokio::runtime::Runtime,
  worker_count: usize,
) -> Result<Vec<PreprocessedTransaction<Tx>>, (PreprocessError, u64)>
where
  Tx: TransactionReader + Clone + Send + Sync + 'static,
  N: Node + Send + Sync + 'static,
{
  // The `max(2, hardware_parallelism)` default policy is applied by the caller (`Consumer`); here
  // we only guard against 0, which would leave the queue with no consumer at all.
  let worker_count = worker_count.max(1);
  let (sender, receiver) = mpsc::sync_channel::<(TransactionBlockInfo, Tx)>(2 * worker_count);
  let receiver = Arc::new(Mutex::new(receiver));

  let stop = Arc::new(AtomicBool::new(false));
  let accumulator: Arc<Mutex<Vec<PreprocessedTransaction<Tx>>>> = Arc::new(Mutex::new(Vec::new()));
  let first_error: Arc<Mutex<Option<PreprocessError>>> = Arc::new(Mutex::new(None));
  let runtime_handle = runtime.handle().clone();

  let workers: Vec<_> = (0..worker_count)
    .map(|i| {
      let receiver = receiver.clone();
      let stop = stop.clone();
      let accumulator = accumulator.clone();
      let first_error = first_error.clone();
      let accounts = accounts.clone();
      let view_secret = view_secret;
      let node = node.clone();
      let seen_keys = seen_keys.clone();
      let runtime_handle = runtime_handle.clone();

      thread::Builder::new()
        .name(format!("transfers-consumer-worker-{i}"))
        .spawn(move || {
          loop {
            let item = receiver.lock().expect("worker queue poisoned").recv();
            let Ok((block_info, tx)) = item else { break };

            // Another worker already hit an error: drain without doing further work so the
            // producer (blocked on a full bounded channel) can observe `stop` and close it.
            if stop.load(Ordering::Acquire) {
              continue;
            }

            let result = runtime_handle.block_on(preprocessor::preprocess(
              block_info,
              &tx,
              accounts.as_ref(),
              &view_secret,
              node.as_ref(),
              &seen_keys,
            ));

            match result {
              Ok(info) => {
                accumulator
                  .lock()
                  .expect("accumulator poisoned")
                  .push(PreprocessedTransaction { block_info, tx, info });
              }
              Err(err) => {
                let mut guard = first_error.lock().expect("first-error slot poisoned");
                if guard.is_none() {
                  *guard = Some(err);
                }
                stop.store(true, Ordering::Release);
              }
            }
          }
        })
        .expect("failed to spawn a preprocessing worker thread")
    })
    .collect();

  // Stage 1: enumeration, run on the calling thread.
  'blocks: for (block_index, block) in blocks.iter().enumerate() {
    if stop.load(Ordering::Acquire) {
      break;
    }
    if sync_start.timestamp > 0 && block.timestamp < sync_start.timestamp {
      continue;
    }
    let height = start_height + u64::try_from(block_index).expect("block index fits in u64");
    for (tx_index, tx) in block.transactions.iter().enumerate() {
      if stop.load(Ordering::Acquire) {
        break 'blocks;
      }
      if tx.transaction_public_key() == NULL_PUBLIC_KEY {
        continue;
      }
      let block_info = TransactionBlockInfo {
        height,
        timestamp: block.timestamp,
        transaction_index: u32::try_from(tx_index).expect("more transactions than u32::MAX in one block"),
      };
      if sender.send((block_info, tx.clone())).is_err() {
        break 'blocks;
      }
    }
  }
  drop(sender);

  for worker in workers {
    let _ = worker.join();
  }

  if let Some(err) = first_error.lock().expect("first-error slot poisoned").take() {
    return Err((err, start_height));
  }

  let mut results = Arc::try_unwrap(accumulator)
    .unwrap_or_else(|arc| Mutex::new(std::mem::take(&mut *arc.lock().expect("accumulator poisoned"))))
    .into_inner()
    .expect("accumulator poisoned");
  results.sort_by_key(|r| (r.block_info.height, r.block_info.transaction_index));
  Ok(results)
}
