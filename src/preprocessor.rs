//! Scanner + global-index lookup + transfer builder, run once per transaction (spec.md §4.3).
//!
//! Pure relative to subscription state: the only side effects are on the process-wide seen-keys
//! registry and the `Node` it queries. Nothing here ever mutates a `Subscription`'s container.

use std::collections::{HashMap, HashSet};

use crate::{
  error::PreprocessError,
  node::Node,
  scanner,
  seen_keys::SeenKeysRegistry,
  transaction::TransactionReader,
  transfer_builder,
  types::{AccountKeys, PreprocessInfo, PublicKey, SecretKey},
};

/// Preprocesses one transaction against every subscribed account sharing `view_secret`.
///
/// `accounts` maps each subscribed `spend_public_key` to its full key material. If the scanner
/// finds nothing, this returns `Ok(PreprocessInfo::default())` without ever calling `node`.
pub async fn preprocess(
  block_info: crate::types::TransactionBlockInfo,
  tx: &impl TransactionReader,
  accounts: &HashMap<PublicKey, AccountKeys>,
  view_secret: &SecretKey,
  node: &impl Node,
  seen_keys: &SeenKeysRegistry,
) -> Result<PreprocessInfo, PreprocessError> {
  let spend_keys: HashSet<PublicKey> = accounts.keys().copied().collect();
  let matches = scanner::scan(tx, view_secret, &spend_keys);
  if matches.is_empty() {
    return Ok(PreprocessInfo::default());
  }

  let global_idxs = if block_info.is_unconfirmed() {
    vec![]
  } else {
    node
      .get_transaction_outs_global_indices(tx.transaction_hash())
      .await
      .map_err(PreprocessError::NodeLookupFailed)?
  };

  let mut outputs = HashMap::new();
  for (spend_key, owned_indices) in matches {
    let account_keys = accounts.get(&spend_key).expect("scanner only returns keys we passed it");
    let transfers =
      transfer_builder::build(account_keys, &block_info, tx, &owned_indices, &global_idxs, seen_keys)?;
    outputs.insert(spend_key, transfers);
  }

  Ok(PreprocessInfo { global_idxs, outputs })
}
