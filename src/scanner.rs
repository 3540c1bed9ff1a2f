//! The per-output stealth-address ownership test (spec.md §4.1).

use std::collections::{HashMap, HashSet};

use crate::{
  crypto::{generate_key_derivation, underive_public_key},
  transaction::TransactionReader,
  types::{OutputType, PublicKey, SecretKey},
};

/// Scans one transaction for outputs owned by any of `spend_keys`.
///
/// Pure: no I/O, no state mutation, depends only on its arguments. Output indices are returned
/// in transaction order per key; duplicates within one key's list are not deduplicated here (the
/// transfer builder's duplicate-key defense handles that).
///
/// The multisig path intentionally derives the spend-key candidate from the raw output index
/// rather than the running `key_index` used for Key outputs — this diverges from the Key path
/// but must be preserved for ledger compatibility (spec.md §4.1).
#[must_use]
pub fn scan(
  tx: &impl TransactionReader,
  view_secret: &SecretKey,
  spend_keys: &HashSet<PublicKey>,
) -> HashMap<PublicKey, Vec<u32>> {
  let mut result: HashMap<PublicKey, Vec<u32>> = HashMap::new();
  if spend_keys.is_empty() {
    return result;
  }

  let tx_public_key = tx.transaction_public_key();
  let Some(derivation) = generate_key_derivation(&tx_public_key, view_secret) else {
    return result;
  };

  let mut key_index: u64 = 0;
  for i in 0..tx.output_count() {
    match tx.output_type(i) {
      OutputType::Key => {
        let (output, _amount) = tx.get_output(i);
        let crate::types::Output::Key(key_output) = output else {
          unreachable!("output_type reported Key but get_output disagreed")
        };
        if let Some(candidate) = underive_public_key(&derivation, key_index, &key_output.key) {
          if spend_keys.contains(&candidate) {
            result.entry(candidate).or_default().push(i);
          }
        }
        key_index += 1;
      }
      OutputType::Multisignature => {
        let (output, _amount) = tx.get_output(i);
        let crate::types::Output::Multisignature(multisig) = output else {
          unreachable!("output_type reported Multisignature but get_output disagreed")
        };
        for sub_key in &multisig.keys {
          if let Some(candidate) =
            underive_public_key(&derivation, u64::from(i), sub_key)
          {
            if spend_keys.contains(&candidate) {
              result.entry(candidate).or_default().push(i);
            }
          }
          key_index += 1;
        }
      }
      OutputType::Other => {}
    }
  }

  result
}
