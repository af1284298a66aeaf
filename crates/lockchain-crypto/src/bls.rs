//! Thin wrapper around BLS12-381 signatures (min_pk scheme: 48-byte public
//! keys, 96-byte signatures). The rest of the node treats these as opaque
//! sign/verify/aggregate primitives.

use crate::{CryptoError, Result};
use blst::min_pk::{AggregatePublicKey, AggregateSignature, PublicKey, SecretKey, Signature};
use blst::BLST_ERROR;
use rand::RngCore;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const BLS_PUBLIC_KEY_LEN: usize = 48;
pub const BLS_SIGNATURE_LEN: usize = 96;

// ciphersuite for the basic min_pk scheme
const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

/// A BLS secret key. Kept as raw scalar bytes; parsed on use.
#[derive(Clone)]
pub struct BlsSecretKey([u8; 32]);

impl BlsSecretKey {
	/// Generate a fresh secret key from OS randomness.
	pub fn generate() -> Self {
		let mut ikm = [0u8; 32];
		rand::thread_rng().fill_bytes(&mut ikm);
		// key_gen only fails on short ikm
		let sk = SecretKey::key_gen(&ikm, &[]).expect("32 bytes of ikm");
		Self(sk.to_bytes())
	}

	/// Derive a secret key deterministically from 32 bytes of seed material.
	pub fn from_seed(seed: &[u8; 32]) -> Self {
		let sk = SecretKey::key_gen(seed, &[]).expect("32 bytes of ikm");
		Self(sk.to_bytes())
	}

	pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
		let sk = SecretKey::from_bytes(bytes)
			.map_err(|e| CryptoError::InvalidKey(format!("{:?}", e)))?;
		Ok(Self(sk.to_bytes()))
	}

	pub fn to_bytes(&self) -> [u8; 32] {
		self.0
	}

	pub fn public_key(&self) -> BlsPublicKey {
		let sk = SecretKey::from_bytes(&self.0).expect("stored key bytes are valid");
		BlsPublicKey(sk.sk_to_pk().to_bytes())
	}

	pub fn sign(&self, msg: &[u8]) -> BlsSignature {
		let sk = SecretKey::from_bytes(&self.0).expect("stored key bytes are valid");
		BlsSignature(sk.sign(msg, DST, &[]).to_bytes())
	}
}

impl fmt::Debug for BlsSecretKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		// never print key material
		write!(f, "BlsSecretKey(..)")
	}
}

/// A BLS public key, stored in compressed form.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlsPublicKey(pub [u8; BLS_PUBLIC_KEY_LEN]);

impl BlsPublicKey {
	pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
		if bytes.len() != BLS_PUBLIC_KEY_LEN {
			return Err(CryptoError::InvalidKey(format!(
				"expected {} bytes, got {}",
				BLS_PUBLIC_KEY_LEN,
				bytes.len()
			)));
		}
		let mut out = [0u8; BLS_PUBLIC_KEY_LEN];
		out.copy_from_slice(bytes);
		Ok(Self(out))
	}

	pub fn to_bytes(&self) -> [u8; BLS_PUBLIC_KEY_LEN] {
		self.0
	}

	pub fn to_hex(&self) -> String {
		hex::encode(self.0)
	}

	pub fn from_hex(s: &str) -> Result<Self> {
		let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
		Self::from_bytes(&bytes)
	}

	/// Verify `sig` over `msg` under this key.
	pub fn verify(&self, msg: &[u8], sig: &BlsSignature) -> bool {
		let pk = match PublicKey::from_bytes(&self.0) {
			Ok(pk) => pk,
			Err(_) => return false,
		};
		let sig = match Signature::from_bytes(&sig.0) {
			Ok(sig) => sig,
			Err(_) => return false,
		};
		sig.verify(true, msg, DST, &[], &pk, true) == BLST_ERROR::BLST_SUCCESS
	}
}

impl fmt::Debug for BlsPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "BlsPublicKey({})", self.to_hex())
	}
}

impl fmt::Display for BlsPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_hex())
	}
}

impl Serialize for BlsPublicKey {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_hex())
	}
}

impl<'de> Deserialize<'de> for BlsPublicKey {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		Self::from_hex(&s).map_err(D::Error::custom)
	}
}

/// A BLS signature, stored in compressed form.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BlsSignature(pub [u8; BLS_SIGNATURE_LEN]);

impl BlsSignature {
	/// The all-zero placeholder signature. Never verifies.
	pub fn empty() -> Self {
		Self([0u8; BLS_SIGNATURE_LEN])
	}

	pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
		if bytes.len() != BLS_SIGNATURE_LEN {
			return Err(CryptoError::InvalidKey(format!(
				"expected {} bytes, got {}",
				BLS_SIGNATURE_LEN,
				bytes.len()
			)));
		}
		let mut out = [0u8; BLS_SIGNATURE_LEN];
		out.copy_from_slice(bytes);
		Ok(Self(out))
	}

	pub fn to_bytes(&self) -> [u8; BLS_SIGNATURE_LEN] {
		self.0
	}

	pub fn to_hex(&self) -> String {
		hex::encode(self.0)
	}
}

impl fmt::Debug for BlsSignature {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "BlsSignature({})", self.to_hex())
	}
}

/// Aggregate a set of public keys into one.
pub fn aggregate_public_keys(keys: &[BlsPublicKey]) -> Result<BlsPublicKey> {
	if keys.is_empty() {
		return Err(CryptoError::AggregationFailed("no keys".to_string()));
	}
	let parsed: Vec<PublicKey> = keys
		.iter()
		.map(|k| {
			PublicKey::from_bytes(&k.0).map_err(|e| CryptoError::InvalidKey(format!("{:?}", e)))
		})
		.collect::<Result<_>>()?;
	let refs: Vec<&PublicKey> = parsed.iter().collect();
	let agg = AggregatePublicKey::aggregate(&refs, true)
		.map_err(|e| CryptoError::AggregationFailed(format!("{:?}", e)))?;
	Ok(BlsPublicKey(agg.to_public_key().to_bytes()))
}

/// Aggregate a set of signatures into one.
pub fn aggregate_signatures(sigs: &[BlsSignature]) -> Result<BlsSignature> {
	if sigs.is_empty() {
		return Err(CryptoError::AggregationFailed("no signatures".to_string()));
	}
	let parsed: Vec<Signature> = sigs
		.iter()
		.map(|s| {
			Signature::from_bytes(&s.0).map_err(|e| CryptoError::InvalidKey(format!("{:?}", e)))
		})
		.collect::<Result<_>>()?;
	let refs: Vec<&Signature> = parsed.iter().collect();
	let agg = AggregateSignature::aggregate(&refs, true)
		.map_err(|e| CryptoError::AggregationFailed(format!("{:?}", e)))?;
	Ok(BlsSignature(agg.to_signature().to_bytes()))
}

/// Verify an aggregate signature where each signer signed its own message.
/// `msgs` and `keys` are parallel; with a single distinct message this is
/// equivalent to verifying against the aggregated public key.
pub fn aggregate_verify(msgs: &[Vec<u8>], keys: &[BlsPublicKey], sig: &BlsSignature) -> bool {
	if msgs.len() != keys.len() || msgs.is_empty() {
		return false;
	}
	let parsed_keys: Vec<PublicKey> = match keys
		.iter()
		.map(|k| PublicKey::from_bytes(&k.0))
		.collect::<std::result::Result<_, _>>()
	{
		Ok(keys) => keys,
		Err(_) => return false,
	};
	let sig = match Signature::from_bytes(&sig.0) {
		Ok(sig) => sig,
		Err(_) => return false,
	};
	let msg_refs: Vec<&[u8]> = msgs.iter().map(|m| m.as_slice()).collect();
	let key_refs: Vec<&PublicKey> = parsed_keys.iter().collect();
	sig.aggregate_verify(true, &msg_refs, DST, &key_refs, true) == BLST_ERROR::BLST_SUCCESS
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_sign_verify_round_trip() {
		let sk = BlsSecretKey::from_seed(&[7u8; 32]);
		let pk = sk.public_key();
		let sig = sk.sign(b"hello");
		assert!(pk.verify(b"hello", &sig));
		assert!(!pk.verify(b"goodbye", &sig));
	}

	#[test]
	fn test_empty_signature_never_verifies() {
		let sk = BlsSecretKey::from_seed(&[8u8; 32]);
		assert!(!sk.public_key().verify(b"msg", &BlsSignature::empty()));
	}

	#[test]
	fn test_aggregate_same_message() {
		let sks: Vec<BlsSecretKey> = (0u8..4)
			.map(|i| BlsSecretKey::from_seed(&[i + 1; 32]))
			.collect();
		let msg = b"vote payload".to_vec();
		let sigs: Vec<BlsSignature> = sks.iter().map(|sk| sk.sign(&msg)).collect();
		let pks: Vec<BlsPublicKey> = sks.iter().map(|sk| sk.public_key()).collect();

		let agg_sig = aggregate_signatures(&sigs).unwrap();
		let agg_pk = aggregate_public_keys(&pks).unwrap();
		assert!(agg_pk.verify(&msg, &agg_sig));

		// dropping a signer breaks verification
		let partial = aggregate_signatures(&sigs[..3]).unwrap();
		assert!(!agg_pk.verify(&msg, &partial));
	}

	#[test]
	fn test_aggregate_distinct_messages() {
		let sks: Vec<BlsSecretKey> = (0u8..3)
			.map(|i| BlsSecretKey::from_seed(&[i + 10; 32]))
			.collect();
		let msgs: Vec<Vec<u8>> = (0u8..3).map(|i| vec![i, i, i]).collect();
		let sigs: Vec<BlsSignature> = sks
			.iter()
			.zip(msgs.iter())
			.map(|(sk, m)| sk.sign(m))
			.collect();
		let pks: Vec<BlsPublicKey> = sks.iter().map(|sk| sk.public_key()).collect();
		let agg = aggregate_signatures(&sigs).unwrap();
		assert!(aggregate_verify(&msgs, &pks, &agg));

		let mut wrong = msgs.clone();
		wrong[1] = vec![9, 9, 9];
		assert!(!aggregate_verify(&wrong, &pks, &agg));
	}

	#[test]
	fn test_key_bytes_round_trip() {
		let sk = BlsSecretKey::from_seed(&[42u8; 32]);
		let pk = sk.public_key();
		let parsed = BlsPublicKey::from_bytes(&pk.to_bytes()).unwrap();
		assert_eq!(pk, parsed);
		let sk2 = BlsSecretKey::from_bytes(&sk.to_bytes()).unwrap();
		assert_eq!(sk.public_key(), sk2.public_key());
	}
}
