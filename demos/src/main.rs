//! Exercises [`monero_transfers_consumer::Consumer`] end to end against an in-memory `Node` and
//! `Subscription` stand-in, wiring `env_logger` the way `processor/bin` wires it for the real
//! wallet binary (spec.md §1 scopes logging setup and node I/O out of the library itself).

use std::{collections::HashMap, sync::Arc};

use curve25519_dalek::{constants::ED25519_BASEPOINT_TABLE, scalar::Scalar};
use rand_core::OsRng;

use monero_transfers_consumer::{
  consumer::Consumer,
  crypto::{derivation_to_scalar, generate_key_derivation, generate_key_image},
  error::ErrorCode,
  node::Node,
  observer::ConsumerObserver,
  pipeline::CompleteBlock,
  subscription::{Subscription, TransactionsContainer},
  transaction::InMemoryTransaction,
  types::{
    AccountKeys, AccountPublicAddress, ConsumerConfig, KeyOutput, Output, SynchronizationStart,
    TransactionBlockInfo, TransferInfo,
  },
};

/// A `Node` that always reports the same global indices, standing in for a real chain client.
struct DemoNode;

#[async_trait::async_trait]
impl Node for DemoNode {
  async fn get_transaction_outs_global_indices(
    &self,
    _tx_hash: [u8; 32],
  ) -> Result<Vec<u32>, ErrorCode> {
    Ok(vec![1000, 1001])
  }
}

/// A minimal in-memory transaction record and container, enough to drive `Consumer` without a
/// real wallet database.
#[derive(Default)]
struct DemoContainer {
  transactions: HashMap<[u8; 32], TransactionBlockInfo>,
  transfers: Vec<TransferInfo>,
}

impl TransactionsContainer for DemoContainer {
  fn get_transaction_information(&self, tx_hash: &[u8; 32]) -> Option<TransactionBlockInfo> {
    self.transactions.get(tx_hash).copied()
  }

  fn get_unconfirmed_transactions(&self) -> Vec<[u8; 32]> {
    self
      .transactions
      .iter()
      .filter(|(_, info)| info.is_unconfirmed())
      .map(|(hash, _)| *hash)
      .collect()
  }
}

struct DemoSubscription {
  keys: AccountKeys,
  sync_start: SynchronizationStart,
  container: DemoContainer,
  height: u64,
}

impl Subscription<InMemoryTransaction> for DemoSubscription {
  type Container = DemoContainer;

  fn get_sync_start(&self) -> SynchronizationStart {
    self.sync_start
  }

  fn get_container(&self) -> &DemoContainer {
    &self.container
  }

  fn get_keys(&self) -> &AccountKeys {
    &self.keys
  }

  fn get_address(&self) -> AccountPublicAddress {
    self.keys.address
  }

  fn on_blockchain_detach(&mut self, height: u64) {
    self.container.transactions.retain(|_, info| info.is_unconfirmed() || info.height < height);
  }

  fn on_error(&mut self, error: ErrorCode, start_height: u64) {
    log::error!("subscription notified of batch failure at height {start_height}: {error:?}");
  }

  fn add_transaction(
    &mut self,
    block_info: TransactionBlockInfo,
    tx: &InMemoryTransaction,
    transfers: &[TransferInfo],
  ) -> bool {
    if transfers.is_empty() {
      return false;
    }
    self.container.transactions.insert(tx.hash, block_info);
    self.container.transfers.extend_from_slice(transfers);
    true
  }

  fn mark_transaction_confirmed(
    &mut self,
    block_info: TransactionBlockInfo,
    tx_hash: [u8; 32],
    _global_idxs: &[u32],
  ) {
    self.container.transactions.insert(tx_hash, block_info);
  }

  fn mark_transaction_safe(&mut self, _tx_hash: [u8; 32]) {}

  fn delete_unconfirmed_transaction(&mut self, tx_hash: [u8; 32]) {
    self.container.transactions.remove(&tx_hash);
  }

  fn advance_height(&mut self, height: u64) {
    self.height = height;
  }
}

struct LoggingObserver;

impl ConsumerObserver for LoggingObserver {
  fn on_blocks_added(&mut self, block_hashes: &[[u8; 32]]) {
    log::info!("{} block(s) added", block_hashes.len());
  }

  fn on_transaction_updated(&mut self, tx_hash: [u8; 32], accounts: &[AccountPublicAddress]) {
    log::info!("transaction {} recorded for {} account(s)", hex::encode(tx_hash), accounts.len());
  }
}

fn random_keypair() -> (Scalar, [u8; 32]) {
  let secret = Scalar::random(&mut OsRng);
  let public = (&secret * ED25519_BASEPOINT_TABLE).compress().to_bytes();
  (secret, public)
}

fn main() {
  env_logger::init();

  let view_secret = Scalar::random(&mut OsRng);
  let view_public = (&view_secret * ED25519_BASEPOINT_TABLE).compress().to_bytes();

  let (spend_secret, spend_public) = random_keypair();
  let address = AccountPublicAddress { spend_public_key: spend_public, view_public_key: view_public };
  let keys = AccountKeys { address, spend_secret_key: spend_secret, view_secret_key: view_secret };

  let mut consumer = Consumer::<InMemoryTransaction, DemoNode, DemoSubscription>::new(
    Arc::new(DemoNode),
    view_secret,
    ConsumerConfig::default(),
  );
  consumer.add_observer(Box::new(LoggingObserver));

  consumer
    .add_subscription(DemoSubscription {
      keys: keys.clone(),
      sync_start: SynchronizationStart { height: 0, timestamp: 0 },
      container: DemoContainer::default(),
      height: 0,
    })
    .expect("view secret matches the consumer we just constructed");

  // Build one transaction paying the subscribed account.
  let (tx_secret, tx_public) = random_keypair();
  let _ = tx_secret;
  let derivation = generate_key_derivation(&tx_public, &view_secret).expect("valid tx public key");
  let scalar = derivation_to_scalar(&derivation, 0);
  let (ephemeral_public, _key_image) = generate_key_image(&spend_secret, &scalar);

  let tx = InMemoryTransaction {
    hash: [0x42; 32],
    public_key: tx_public,
    outputs: vec![(Output::Key(KeyOutput { key: ephemeral_public }), 7_000_000_000)],
  };

  let block = CompleteBlock { hash: [0x11; 32], timestamp: 1_700_000_000, transactions: vec![tx] };
  let ok = consumer.on_new_blocks(std::slice::from_ref(&block), 100);
  println!("on_new_blocks succeeded: {ok}");

  let address = keys.address;
  if let Some(sub) = consumer.get_subscription(&address) {
    println!("recorded transfers: {}", sub.get_container().transfers.len());
  }
}
