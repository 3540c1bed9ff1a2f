//! The consumer facade: lifecycle, pool updates, detach and observer notifications (spec.md §4.4
//! through §4.8 and §6's "Consumer-facing API").
//!
//! This is the only part of the crate that mutates `Subscription` state. Everything upstream
//! (scanner, transfer builder, preprocessor, batch pipeline) is pure relative to subscriptions;
//! `Consumer` is where their results are finally, serially, applied.

use std::{
  collections::{HashMap, HashSet},
  sync::Arc,
};

use crate::{
  error::{ConfigError, ErrorCode, PoolError},
  node::Node,
  observer::ConsumerObserver,
  pipeline::{self, CompleteBlock, PreprocessedTransaction},
  seen_keys::SeenKeysRegistry,
  subscription::{Subscription, TransactionsContainer},
  transaction::TransactionReader,
  types::{
    AccountKeys, AccountPublicAddress, ConsumerConfig, PreprocessInfo, PublicKey,
    SecretKey, SynchronizationStart, TransactionBlockInfo, TransactionHash, UNCONFIRMED,
  },
};

/// Scans blocks and pool deltas on behalf of every subscribed account sharing `view_secret`,
/// and serially applies the results to each account's [`Subscription`] (spec.md §2, §6).
pub struct Consumer<Tx, N, Sub>
where
  Tx: TransactionReader + Clone + Send + Sync + 'static,
  N: Node + Send + Sync + 'static,
  Sub: Subscription<Tx>,
{
  node: Arc<N>,
  view_secret: SecretKey,
  config: ConsumerConfig,
  subscriptions: HashMap<PublicKey, Sub>,
  sync_start: SynchronizationStart,
  pool_txs: HashSet<TransactionHash>,
  seen_keys: Arc<SeenKeysRegistry>,
  observers: Vec<Box<dyn ConsumerObserver>>,
  runtime: tokio::runtime::Runtime,
  _tx: std::marker::PhantomData<Tx>,
}

impl<Tx, N, Sub> Consumer<Tx, N, Sub>
where
  Tx: TransactionReader + Clone + Send + Sync + 'static,
  N: Node + Send + Sync + 'static,
  Sub: Subscription<Tx>,
{
  /// Constructs a consumer bound to `view_secret`. `sync_start` begins at
  /// [`SynchronizationStart::MAX`] — the aggregate over zero subscriptions.
  ///
  /// # Panics
  ///
  /// Panics if a `tokio` multi-thread runtime could not be built (matching the rest of this
  /// crate's fail-fast treatment of environment failures that aren't meant to be recoverable).
  #[must_use]
  pub fn new(node: Arc<N>, view_secret: SecretKey, config: ConsumerConfig) -> Self {
    let runtime = tokio::runtime::Builder::new_multi_thread()
      .enable_all()
      .build()
      .expect("failed to build the tokio runtime backing the node callback bridge");
    Self {
      node,
      view_secret,
      config,
      subscriptions: HashMap::new(),
      sync_start: SynchronizationStart::MAX,
      pool_txs: HashSet::new(),
      seen_keys: Arc::new(SeenKeysRegistry::new()),
      observers: Vec::new(),
      runtime,
      _tx: std::marker::PhantomData,
    }
  }

  /// Registers an observer to receive lifecycle notifications.
  pub fn add_observer(&mut self, observer: Box<dyn ConsumerObserver>) {
    self.observers.push(observer);
  }

  /// `max(2, hardware_parallelism)`, per spec, unless [`ConsumerConfig::worker_count`] overrides it
  /// (e.g. pinning to 1 for deterministic single-threaded processing order in tests).
  fn worker_count(&self) -> usize {
    self.config.worker_count.unwrap_or_else(|| {
      let parallelism =
        std::thread::available_parallelism().map(std::num::NonZeroUsize::get).unwrap_or(1);
      parallelism.max(2)
    })
  }

  fn recompute_sync_start(&mut self) {
    self.sync_start = self
      .subscriptions
      .values()
      .map(Subscription::<Tx>::get_sync_start)
      .fold(SynchronizationStart::MAX, SynchronizationStart::componentwise_min);
  }

  /// Adds `subscription` if no subscription with the same `spend_public_key` already exists
  /// (idempotent), rejecting it if its view secret key doesn't match this consumer's.
  ///
  /// # Errors
  ///
  /// Returns [`ConfigError::ViewKeyMismatch`] if `subscription`'s view secret key differs from
  /// this consumer's.
  pub fn add_subscription(&mut self, subscription: Sub) -> Result<&mut Sub, ConfigError> {
    if subscription.get_keys().view_secret_key.as_bytes() != self.view_secret.as_bytes() {
      return Err(ConfigError::ViewKeyMismatch);
    }
    let spend_public_key = subscription.get_address().spend_public_key;
    self.subscriptions.entry(spend_public_key).or_insert(subscription);
    self.recompute_sync_start();
    Ok(self.subscriptions.get_mut(&spend_public_key).expect("just inserted or already present"))
  }

  /// Removes the subscription for `address`, if any, recomputing `sync_start`.
  ///
  /// Returns whether no subscriptions remain afterward. Never fails.
  pub fn remove_subscription(&mut self, address: &AccountPublicAddress) -> bool {
    self.subscriptions.remove(&address.spend_public_key);
    self.recompute_sync_start();
    self.subscriptions.is_empty()
  }

  /// Looks up the subscription for `address`.
  #[must_use]
  pub fn get_subscription(&self, address: &AccountPublicAddress) -> Option<&Sub> {
    self.subscriptions.get(&address.spend_public_key)
  }

  /// Enumerates every currently-subscribed address.
  #[must_use]
  pub fn get_subscriptions(&self) -> Vec<AccountPublicAddress> {
    self.subscriptions.values().map(Subscription::<Tx>::get_address).collect()
  }

  /// Re-seeds `pool_txs` from every subscription's unconfirmed transaction list, minus
  /// `uncommitted` (spec.md §9: "seeds `pool_txs` from subscriptions but not from the network").
  pub fn init_transaction_pool(&mut self, uncommitted: &HashSet<TransactionHash>) {
    self.pool_txs.clear();
    for sub in self.subscriptions.values() {
      for hash in sub.get_container().get_unconfirmed_transactions() {
        if !uncommitted.contains(&hash) {
          self.pool_txs.insert(hash);
        }
      }
    }
  }

  /// The current aggregate scanning lower bound across all subscriptions.
  #[must_use]
  pub fn get_sync_start(&self) -> SynchronizationStart {
    self.sync_start
  }

  /// Snapshot of every transaction hash currently believed to be in the pool.
  #[must_use]
  pub fn get_known_pool_tx_ids(&self) -> HashSet<TransactionHash> {
    self.pool_txs.clone()
  }

  /// Injects a `(tx_hash, output_key)` pair directly into the seen-keys registry, used when
  /// recovering persisted wallet state (spec.md §6).
  pub fn add_public_keys_seen(&self, tx_hash: TransactionHash, output_key: PublicKey) {
    self.seen_keys.add_public_key_seen(tx_hash, output_key);
  }

  /// Forwards a chain detach to every subscription, notifying observers first.
  ///
  /// The consumer itself carries no per-height state to roll back (spec.md §4.8).
  pub fn on_blockchain_detach(&mut self, height: u64) {
    for observer in &mut self.observers {
      observer.on_blockchain_detach(height);
    }
    for sub in self.subscriptions.values_mut() {
      sub.on_blockchain_detach(height);
    }
  }

  /// Marks a pool transaction as safe (e.g. re-announced by a trusted relay), fanning the call
  /// out to every subscription.
  pub fn mark_transaction_safe(&mut self, tx_hash: TransactionHash) {
    for sub in self.subscriptions.values_mut() {
      sub.mark_transaction_safe(tx_hash);
    }
  }

  fn accounts(&self) -> HashMap<PublicKey, AccountKeys> {
    self.subscriptions.iter().map(|(key, sub)| (*key, sub.get_keys().clone())).collect()
  }

  /// Runs the batch pipeline over `blocks` (a contiguous, non-empty run starting at
  /// `start_height`) and serially applies the results to every subscription (spec.md §4.4).
  ///
  /// Returns `false` on a hard preprocessing error, after fanning `on_error` out to every
  /// subscription and to every observer; no partial commit occurs in that case.
  pub fn on_new_blocks(&mut self, blocks: &[CompleteBlock<Tx>], start_height: u64) -> bool {
    if blocks.is_empty() {
      return true;
    }

    let accounts = Arc::new(self.accounts());
    let result = pipeline::run_batch(
      blocks,
      start_height,
      self.sync_start,
      accounts,
      self.view_secret,
      self.node.clone(),
      self.seen_keys.clone(),
      &self.runtime,
      self.worker_count(),
    );

    let preprocessed = match result {
      Ok(preprocessed) => preprocessed,
      Err((err, start_height)) => {
        let code = ErrorCode::Preprocessing(err);
        for sub in self.subscriptions.values_mut() {
          sub.on_error(code, start_height);
        }
        for observer in &mut self.observers {
          observer.on_error(code, start_height);
        }
        return false;
      }
    };

    let block_hashes: Vec<[u8; 32]> = blocks.iter().map(|b| b.hash).collect();
    for observer in &mut self.observers {
      observer.on_blocks_added(&block_hashes);
    }

    for PreprocessedTransaction { block_info, tx, info } in &preprocessed {
      self.apply(*block_info, tx, info);
    }

    let final_height = start_height + u64::try_from(blocks.len() - 1).expect("batch length fits in u64");
    for sub in self.subscriptions.values_mut() {
      sub.advance_height(final_height);
    }

    true
  }

  /// Applies added and deleted pool transactions (spec.md §4.5).
  ///
  /// On a hard preprocessing error for an added transaction, fans `on_error` out to every
  /// subscription and to every observer and aborts: any transaction processed before the failing
  /// one has already been applied, and the failing hash is already in `pool_txs` (spec.md §7,
  /// §9 — the recovery-logic-preserving quirk).
  ///
  /// # Errors
  ///
  /// Returns the first [`PoolError`] hit while preprocessing an added transaction.
  pub fn on_pool_updated(&mut self, added: &[Tx], deleted: &[TransactionHash]) -> Result<(), PoolError> {
    for tx in added {
      let tx_hash = tx.transaction_hash();
      self.pool_txs.insert(tx_hash);

      let block_info = TransactionBlockInfo { height: UNCONFIRMED, timestamp: 0, transaction_index: 0 };
      let accounts = self.accounts();
      let result = self.runtime.block_on(crate::preprocessor::preprocess(
        block_info,
        tx,
        &accounts,
        &self.view_secret,
        self.node.as_ref(),
        &self.seen_keys,
      ));

      match result {
        Ok(info) => self.apply(block_info, tx, &info),
        Err(err) => {
          let code = ErrorCode::Preprocessing(err);
          for sub in self.subscriptions.values_mut() {
            sub.on_error(code, UNCONFIRMED);
          }
          for observer in &mut self.observers {
            observer.on_error(code, UNCONFIRMED);
          }
          return Err(PoolError::Preprocess(err));
        }
      }
    }

    for &tx_hash in deleted {
      self.pool_txs.remove(&tx_hash);
      for observer in &mut self.observers {
        observer.on_transaction_delete_begin(tx_hash);
      }
      for sub in self.subscriptions.values_mut() {
        sub.delete_unconfirmed_transaction(tx_hash);
      }
      for observer in &mut self.observers {
        observer.on_transaction_delete_end(tx_hash);
      }
    }

    Ok(())
  }

  /// Adds a single unconfirmed transaction to the pool; a thin wrapper over
  /// [`Self::on_pool_updated`] with one added, none deleted.
  ///
  /// # Errors
  ///
  /// See [`Self::on_pool_updated`].
  pub fn add_unconfirmed_transaction(&mut self, tx: &Tx) -> Result<(), PoolError> {
    self.on_pool_updated(std::slice::from_ref(tx), &[])
  }

  /// Removes a single unconfirmed transaction from the pool; never fails, per
  /// [`Self::on_pool_updated`]'s deletion path.
  pub fn remove_unconfirmed_transaction(&mut self, tx_hash: TransactionHash) {
    let _: Result<(), PoolError> = self.on_pool_updated(&[], &[tx_hash]);
  }

  /// Applies one transaction's preprocessed result to every subscription (spec.md §4.6).
  fn apply(&mut self, block_info: TransactionBlockInfo, tx: &Tx, info: &PreprocessInfo) {
    let tx_hash = tx.transaction_hash();
    let empty: Vec<crate::types::TransferInfo> = Vec::new();
    let mut updated = Vec::new();

    for sub in self.subscriptions.values_mut() {
      let transfers = info.outputs.get(&sub.get_address().spend_public_key).unwrap_or(&empty);
      let recorded = match sub.get_container().get_transaction_information(&tx_hash) {
        Some(existing) if existing.is_unconfirmed() && !block_info.is_unconfirmed() => {
          sub.mark_transaction_confirmed(block_info, tx_hash, &info.global_idxs);
          true
        }
        Some(existing) => {
          debug_assert_eq!(
            existing.height, block_info.height,
            "subscription already holds {} confirmed at a different height than this apply call",
            hex::encode(tx_hash)
          );
          false
        }
        None => sub.add_transaction(block_info, tx, transfers),
      };
      if recorded {
        updated.push(sub.get_address());
      }
    }

    if !updated.is_empty() {
      for observer in &mut self.observers {
        observer.on_transaction_updated(tx_hash, &updated);
      }
    }
  }
}
