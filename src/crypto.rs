//! The elliptic-curve primitives the rest of this crate treats as an opaque contract.
//!
//! One concrete, testable implementation of CryptoNote's classic (pre-RingCT) stealth-address
//! scheme over Ed25519, following `monero-wallet`'s approach of committing to `curve25519-dalek`
//! concretely rather than abstracting over a generic curve.

use curve25519_dalek::{
  constants::ED25519_BASEPOINT_TABLE,
  edwards::{CompressedEdwardsY, EdwardsPoint},
  scalar::Scalar,
};
use sha3::{Digest, Keccak256};

use crate::types::{KeyImage, PublicKey, SecretKey};

/// A shared secret derived from a transaction's public key and a view secret key.
///
/// Opaque beyond being convertible into per-output scalars via [`derivation_to_scalar`].
#[derive(Clone, Copy)]
pub struct KeyDerivation(EdwardsPoint);

fn decompress(key: &PublicKey) -> Option<EdwardsPoint> {
  CompressedEdwardsY(*key).decompress()
}

/// Computes the shared secret `D = 8 * (view_secret * R)` for transaction public key `R`.
///
/// Returns `None` if `R` does not decompress to a valid curve point (a degenerate/malformed
/// key); callers treat this the same as "no outputs owned" rather than a hard error.
#[must_use]
pub fn generate_key_derivation(
  tx_public_key: &PublicKey,
  view_secret_key: &SecretKey,
) -> Option<KeyDerivation> {
  let point = decompress(tx_public_key)?;
  // Clear the cofactor, matching the reference client's generate_key_derivation.
  Some(KeyDerivation((point * view_secret_key).mul_by_cofactor()))
}

/// `Hs(D || varint(output_index))`, folded into a scalar the way CryptoNote's
/// `derivation_to_scalar` does.
#[must_use]
pub fn derivation_to_scalar(derivation: &KeyDerivation, output_index: u64) -> Scalar {
  let mut hasher = Keccak256::new();
  hasher.update(derivation.0.compress().as_bytes());
  hasher.update(varint(output_index));
  Scalar::from_bytes_mod_order_wide(&hasher.finalize().into())
}

fn varint(mut value: u64) -> Vec<u8> {
  let mut out = vec![];
  loop {
    let mut byte = u8::try_from(value & 0x7f).expect("masked with 0x7f");
    value >>= 7;
    if value != 0 {
      byte |= 0x80;
    }
    out.push(byte);
    if value == 0 {
      break;
    }
  }
  out
}

/// Recovers the spend-key candidate `output_key - Hs(D, index)*G` for an output.
///
/// Used identically for Key outputs (with the running `key_index`) and Multisig outputs (with
/// the raw output index) — the caller is responsible for passing the right index for each.
#[must_use]
pub fn underive_public_key(
  derivation: &KeyDerivation,
  index: u64,
  output_key: &PublicKey,
) -> Option<PublicKey> {
  let output_point = decompress(output_key)?;
  let scalar = derivation_to_scalar(derivation, index);
  let candidate = output_point - (&scalar * ED25519_BASEPOINT_TABLE);
  Some(candidate.compress().to_bytes())
}

/// A simplified hash-to-point, adequate for this crate's contract: bit-for-bit compatibility with
/// the reference client's `ge_fromfe_frombytes_vartime` is not attempted.
fn hash_to_point(bytes: &[u8]) -> EdwardsPoint {
  let mut hasher = Keccak256::new();
  hasher.update(bytes);
  let digest = hasher.finalize();
  let mut wide = [0u8; 64];
  wide[..32].copy_from_slice(&digest);
  (&Scalar::from_bytes_mod_order_wide(&wide) * ED25519_BASEPOINT_TABLE).mul_by_cofactor()
}

/// Regenerates the ephemeral spend keypair for an owned Key output and derives its key image.
///
/// Returns `(ephemeral_public_key, key_image)`. The caller must assert the returned public key
/// equals the transaction's own output key as a sanity check; a mismatch indicates corrupted
/// scanner input and is a programmer error, not a recoverable failure.
#[must_use]
pub fn generate_key_image(
  spend_secret_key: &SecretKey,
  derivation_scalar: &Scalar,
) -> (PublicKey, KeyImage) {
  let ephemeral_secret = spend_secret_key + derivation_scalar;
  let ephemeral_public = (&ephemeral_secret * ED25519_BASEPOINT_TABLE).compress().to_bytes();
  let key_image = (ephemeral_secret * hash_to_point(&ephemeral_public)).compress().to_bytes();
  (ephemeral_public, key_image)
}
