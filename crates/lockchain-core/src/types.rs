use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub use lockchain_crypto::Hash256;
pub use primitive_types::U256;

/// Block height type
pub type BlockHeight = u64;

/// Consensus view number
pub type View = u64;

/// Epoch number
pub type EpochNumber = u64;

/// Timestamps are signed nanoseconds
pub type TimestampNanos = i64;

/// Hash identifying a block
pub type BlockHash = Hash256;

pub const PUB_KEY_LEN: usize = 33;

pub const NANOS_PER_SECOND: i64 = 1_000_000_000;
pub const NANOS_PER_YEAR: i64 = 365 * 24 * 60 * 60 * NANOS_PER_SECOND;

/// Interest rates are expressed in basis points (1 bps = 0.01%).
pub const BASIS_POINTS_PER_UNIT: u64 = 10_000;

/// A compressed secp256k1-style public key (33 bytes, opaque to the core).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PubKey(pub [u8; PUB_KEY_LEN]);

impl PubKey {
	/// The distinguished zero key, used as the "creator" of the native coin.
	pub fn zero() -> Self {
		Self([0u8; PUB_KEY_LEN])
	}

	pub fn is_zero(&self) -> bool {
		self.0 == [0u8; PUB_KEY_LEN]
	}

	pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
		if bytes.len() != PUB_KEY_LEN {
			return None;
		}
		let mut out = [0u8; PUB_KEY_LEN];
		out.copy_from_slice(bytes);
		Some(Self(out))
	}

	pub fn as_bytes(&self) -> &[u8; PUB_KEY_LEN] {
		&self.0
	}

	pub fn to_hex(&self) -> String {
		hex::encode(self.0)
	}

	pub fn from_hex(s: &str) -> Option<Self> {
		Self::from_bytes(&hex::decode(s).ok()?)
	}
}

impl fmt::Debug for PubKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "PubKey({})", self.to_hex())
	}
}

impl fmt::Display for PubKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_hex())
	}
}

impl Serialize for PubKey {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_hex())
	}
}

impl<'de> Deserialize<'de> for PubKey {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		Self::from_hex(&s).ok_or_else(|| D::Error::custom("expected 33 hex-encoded bytes"))
	}
}

/// Stable alias of a public key. Survives key rotation in the full protocol;
/// here the alias is the identity mapping.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pkid(pub [u8; PUB_KEY_LEN]);

impl Pkid {
	pub fn zero() -> Self {
		Self([0u8; PUB_KEY_LEN])
	}

	pub fn is_zero(&self) -> bool {
		self.0 == [0u8; PUB_KEY_LEN]
	}

	pub fn from_pub_key(pk: &PubKey) -> Self {
		Self(pk.0)
	}

	pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
		if bytes.len() != PUB_KEY_LEN {
			return None;
		}
		let mut out = [0u8; PUB_KEY_LEN];
		out.copy_from_slice(bytes);
		Some(Self(out))
	}

	pub fn as_bytes(&self) -> &[u8; PUB_KEY_LEN] {
		&self.0
	}

	pub fn to_hex(&self) -> String {
		hex::encode(self.0)
	}

	pub fn from_hex(s: &str) -> Option<Self> {
		Self::from_bytes(&hex::decode(s).ok()?)
	}
}

impl fmt::Debug for Pkid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Pkid({})", self.to_hex())
	}
}

impl fmt::Display for Pkid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_hex())
	}
}

impl Serialize for Pkid {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_hex())
	}
}

impl<'de> Deserialize<'de> for Pkid {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		Self::from_hex(&s).ok_or_else(|| D::Error::custom("expected 33 hex-encoded bytes"))
	}
}

/// True when `v` fits in an unsigned 64-bit integer. The native coin caps
/// every balance at this width.
pub fn fits_u64(v: &U256) -> bool {
	*v <= U256::from(u64::MAX)
}
