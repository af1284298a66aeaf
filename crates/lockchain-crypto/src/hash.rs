use crate::{CryptoError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 32-byte hash value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
	pub fn zero() -> Self {
		Self([0u8; 32])
	}

	pub fn is_zero(&self) -> bool {
		self.0 == [0u8; 32]
	}

	pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
		if bytes.len() != 32 {
			return Err(CryptoError::InvalidHash(format!(
				"expected 32 bytes, got {}",
				bytes.len()
			)));
		}
		let mut out = [0u8; 32];
		out.copy_from_slice(bytes);
		Ok(Self(out))
	}

	pub fn as_bytes(&self) -> &[u8; 32] {
		&self.0
	}

	pub fn to_hex(&self) -> String {
		hex::encode(self.0)
	}

	pub fn from_hex(s: &str) -> Result<Self> {
		let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidHash(e.to_string()))?;
		Self::from_bytes(&bytes)
	}
}

impl fmt::Display for Hash256 {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_hex())
	}
}

impl AsRef<[u8]> for Hash256 {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

/// Compute the SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> Hash256 {
	let mut hasher = Sha256::new();
	hasher.update(data);
	Hash256(hasher.finalize().into())
}
