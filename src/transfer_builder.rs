//! Builds [`TransferInfo`] records for one account's matched outputs, enforcing the duplicate-
//! output-key defense (spec.md §4.2).

use crate::{
  crypto::{derivation_to_scalar, generate_key_derivation, generate_key_image},
  error::TransferBuildError,
  seen_keys::SeenKeysRegistry,
  types::{AccountKeys, Output, OutputType, TransactionBlockInfo, TransferInfo, UNCONFIRMED_GLOBAL},
};
use crate::transaction::TransactionReader;

/// Builds transfers for one account's matched output indices within one transaction.
///
/// On the soft "duplicate output key" ledger anomaly, this returns `Ok(vec![])` rather than an
/// error: the caller must not abort the batch over it, only skip crediting this account for this
/// transaction (spec.md §4.2, §7 kind 2). A high-severity log entry is always emitted in that
/// case.
///
/// # Panics
///
/// Panics (via `debug_assert!`-style invariant) if the scanner handed us an ephemeral public key
/// that doesn't match the transaction's own output key — that indicates corrupted scanner input,
/// a programmer error per spec.md §7 kind 3, not a recoverable condition.
pub fn build(
  account_keys: &AccountKeys,
  block_info: &TransactionBlockInfo,
  tx: &impl TransactionReader,
  owned_indices: &[u32],
  global_idxs: &[u32],
  seen_keys: &SeenKeysRegistry,
) -> Result<Vec<TransferInfo>, TransferBuildError> {
  let tx_hash = tx.transaction_hash();
  let tx_public_key = tx.transaction_public_key();
  let output_count = tx.output_count();

  // Every output this call considers emitting, with its candidate dedup key. Gathered before
  // touching the registry so the registry lock is held for exactly one pass: a read-then-insert
  // that must be atomic relative to concurrent builders running on other worker threads
  // (spec.md §5).
  struct Candidate {
    transfer: TransferInfo,
    // Every output key this candidate would emit. A Key output contributes its single ephemeral
    // key; a Multisig output contributes every co-signer's one-time key, since any of them
    // colliding with a prior transaction is equally a burning-bug-style anomaly.
    dedup_keys: Vec<[u8; 32]>,
  }
  let mut candidates = Vec::with_capacity(owned_indices.len());

  for &idx in owned_indices {
    if idx >= output_count {
      return Err(TransferBuildError::ArgumentOutOfDomain { index: idx, output_count });
    }

    let (output, amount) = tx.get_output(idx);
    let output_type = output.output_type();
    if !matches!(output_type, OutputType::Key | OutputType::Multisignature) {
      continue;
    }

    let global_output_index = if block_info.is_unconfirmed() {
      UNCONFIRMED_GLOBAL
    } else {
      u64::from(global_idxs[idx as usize])
    };

    let mut output_key = None;
    let mut key_image = None;
    let mut required_signatures = None;
    let dedup_keys;

    match &output {
      Output::Key(key_output) => {
        // Recompute the ephemeral keypair to both sanity-check the scanner's output and obtain
        // the key image needed to spend this output.
        let derivation = generate_key_derivation(&tx_public_key, &account_keys.view_secret_key)
          .expect("scanner already derived successfully for this transaction");
        let scalar = derivation_to_scalar(&derivation, u64::from(idx));
        let (ephemeral_public, image) =
          generate_key_image(&account_keys.spend_secret_key, &scalar);
        assert_eq!(
          ephemeral_public, key_output.key,
          "recomputed ephemeral public key did not match the scanner's output key: corrupted scanner input"
        );
        dedup_keys = vec![ephemeral_public];
        output_key = Some(ephemeral_public);
        key_image = Some(image);
      }
      Output::Multisignature(multisig) => {
        dedup_keys = multisig.keys.clone();
        required_signatures = Some(multisig.required_signatures);
      }
      Output::Other => unreachable!("filtered above"),
    }

    candidates.push(Candidate {
      transfer: TransferInfo {
        output_type,
        tx_public_key,
        output_in_transaction: idx,
        global_output_index,
        amount,
        output_key,
        key_image,
        required_signatures,
      },
      dedup_keys,
    });
  }

  if candidates.is_empty() {
    return Ok(vec![]);
  }

  let all_keys = || candidates.iter().flat_map(|c| c.dedup_keys.iter());

  let dropped = seen_keys.with_lock(|txn| {
    for key in all_keys() {
      let taken_by_other = txn.is_taken_by_other_transaction(&tx_hash, key);
      let taken_within_this_call = all_keys().filter(|k| *k == key).count() > 1;
      if taken_by_other || taken_within_this_call {
        return true;
      }
    }
    for key in all_keys() {
      txn.stage(tx_hash, *key);
    }
    false
  });

  if dropped {
    log::error!(
      "duplicate output key detected while processing transaction {}: dropping its transfers for this account",
      hex::encode(tx_hash)
    );
    return Ok(vec![]);
  }

  Ok(candidates.into_iter().map(|c| c.transfer).collect())
}

#[cfg(test)]
mod tests {
  use curve25519_dalek::{constants::ED25519_BASEPOINT_TABLE, scalar::Scalar};
  use rand_core::OsRng;

  use super::*;
  use crate::{
    transaction::InMemoryTransaction,
    types::{AccountPublicAddress, KeyOutput},
  };

  fn account() -> AccountKeys {
    let spend_secret_key = Scalar::random(&mut OsRng);
    let view_secret_key = Scalar::random(&mut OsRng);
    let spend_public_key = (&spend_secret_key * ED25519_BASEPOINT_TABLE).compress().to_bytes();
    let view_public_key = (&view_secret_key * ED25519_BASEPOINT_TABLE).compress().to_bytes();
    AccountKeys {
      address: AccountPublicAddress { spend_public_key, view_public_key },
      spend_secret_key,
      view_secret_key,
    }
  }

  fn owned_tx(account: &AccountKeys, hash: [u8; 32], idx: u64) -> InMemoryTransaction {
    let tx_secret = Scalar::random(&mut OsRng);
    let tx_public = (&tx_secret * ED25519_BASEPOINT_TABLE).compress().to_bytes();
    let derivation =
      generate_key_derivation(&tx_public, &account.view_secret_key).unwrap();
    let scalar = derivation_to_scalar(&derivation, idx);
    let (ephemeral_public, _) = generate_key_image(&account.spend_secret_key, &scalar);
    InMemoryTransaction {
      hash,
      public_key: tx_public,
      outputs: vec![(Output::Key(KeyOutput { key: ephemeral_public }), 10)],
    }
  }

  #[test]
  fn out_of_domain_index_errors() {
    let account = account();
    let tx = owned_tx(&account, [1; 32], 0);
    let registry = SeenKeysRegistry::new();
    let block_info =
      TransactionBlockInfo { height: 100, timestamp: 0, transaction_index: 0 };
    let err = build(&account, &block_info, &tx, &[5], &[0], &registry).unwrap_err();
    assert_eq!(err, TransferBuildError::ArgumentOutOfDomain { index: 5, output_count: 1 });
  }

  #[test]
  fn second_transaction_reusing_output_key_is_dropped() {
    let account = account();
    let registry = SeenKeysRegistry::new();
    let block_info =
      TransactionBlockInfo { height: 100, timestamp: 0, transaction_index: 0 };

    let tx_a = owned_tx(&account, [1; 32], 0);
    let first = build(&account, &block_info, &tx_a, &[0], &[7], &registry).unwrap();
    assert_eq!(first.len(), 1);

    // Craft a second transaction whose output key happens to equal the first's ephemeral key
    // (simulating a ledger-level duplicate stealth address).
    let tx_b = InMemoryTransaction {
      hash: [2; 32],
      public_key: tx_a.public_key,
      outputs: tx_a.outputs.clone(),
    };
    let second = build(&account, &block_info, &tx_b, &[0], &[8], &registry).unwrap();
    assert!(second.is_empty());
  }

  #[test]
  fn unconfirmed_block_info_yields_sentinel_global_index() {
    let account = account();
    let tx = owned_tx(&account, [3; 32], 0);
    let registry = SeenKeysRegistry::new();
    let block_info =
      TransactionBlockInfo { height: crate::types::UNCONFIRMED, timestamp: 0, transaction_index: 0 };
    let transfers = build(&account, &block_info, &tx, &[0], &[], &registry).unwrap();
    assert_eq!(transfers[0].global_output_index, UNCONFIRMED_GLOBAL);
  }
}
