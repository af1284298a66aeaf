//! Transactions and their metadata payloads. Metadata is a tagged enum;
//! each variant carries exactly the fields its connect handler needs and
//! serializes with the deterministic codec.

use crate::ser::{self, ByteReader, ByteWriter, Error, Readable, Writeable, RECORD_VERSION};
use crate::types::{BlockHash, PubKey, TimestampNanos, U256};
use lockchain_crypto::{sha256, BlsPublicKey};

const TXN_TYPE_COIN_LOCKUP: u8 = 1;
const TXN_TYPE_UPDATE_LOCKUP_PARAMS: u8 = 2;
const TXN_TYPE_COIN_LOCKUP_TRANSFER: u8 = 3;
const TXN_TYPE_COIN_UNLOCK: u8 = 4;
const TXN_TYPE_REGISTER_VALIDATOR: u8 = 5;
const TXN_TYPE_UNREGISTER_VALIDATOR: u8 = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinLockupMetadata {
	pub creator_public_key: PubKey,
	pub unlock_timestamp_nanos: TimestampNanos,
	pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateLockupParamsMetadata {
	pub lockup_duration_nanos: TimestampNanos,
	pub lockup_yield_apy_basis_points: u64,
	pub remove_yield_curve_point: bool,
	pub new_lockup_transfer_restrictions: bool,
	/// Raw restriction byte; validated by the connect handler.
	pub lockup_transfer_restriction: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinLockupTransferMetadata {
	pub recipient_public_key: PubKey,
	pub creator_public_key: PubKey,
	pub unlock_timestamp_nanos: TimestampNanos,
	pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinUnlockMetadata {
	pub creator_public_key: PubKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterValidatorMetadata {
	pub voting_public_key: BlsPublicKey,
	pub domains: Vec<Vec<u8>>,
	pub disable_delegated_stake: bool,
	/// Self-stake moved from the transactor's native balance.
	pub stake_amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnregisterValidatorMetadata {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnMeta {
	CoinLockup(CoinLockupMetadata),
	UpdateLockupParams(UpdateLockupParamsMetadata),
	CoinLockupTransfer(CoinLockupTransferMetadata),
	CoinUnlock(CoinUnlockMetadata),
	RegisterValidator(RegisterValidatorMetadata),
	UnregisterValidator(UnregisterValidatorMetadata),
}

impl TxnMeta {
	pub fn type_byte(&self) -> u8 {
		match self {
			TxnMeta::CoinLockup(_) => TXN_TYPE_COIN_LOCKUP,
			TxnMeta::UpdateLockupParams(_) => TXN_TYPE_UPDATE_LOCKUP_PARAMS,
			TxnMeta::CoinLockupTransfer(_) => TXN_TYPE_COIN_LOCKUP_TRANSFER,
			TxnMeta::CoinUnlock(_) => TXN_TYPE_COIN_UNLOCK,
			TxnMeta::RegisterValidator(_) => TXN_TYPE_REGISTER_VALIDATOR,
			TxnMeta::UnregisterValidator(_) => TXN_TYPE_UNREGISTER_VALIDATOR,
		}
	}

	pub fn type_name(&self) -> &'static str {
		match self {
			TxnMeta::CoinLockup(_) => "coin_lockup",
			TxnMeta::UpdateLockupParams(_) => "update_lockup_params",
			TxnMeta::CoinLockupTransfer(_) => "coin_lockup_transfer",
			TxnMeta::CoinUnlock(_) => "coin_unlock",
			TxnMeta::RegisterValidator(_) => "register_validator",
			TxnMeta::UnregisterValidator(_) => "unregister_validator",
		}
	}
}

fn write_pub_key(writer: &mut ByteWriter, pk: &PubKey) {
	writer.write_bytes(pk.as_bytes());
}

fn read_pub_key(reader: &mut ByteReader<'_>) -> Result<PubKey, Error> {
	let bytes = reader.read_bytes()?;
	PubKey::from_bytes(&bytes).ok_or_else(|| Error::Corrupted("bad public key".to_string()))
}

fn write_timestamp(writer: &mut ByteWriter, ts: TimestampNanos) {
	writer.write_uvarint(ts as u64);
}

fn read_timestamp(reader: &mut ByteReader<'_>) -> Result<TimestampNanos, Error> {
	let raw = reader.read_uvarint()?;
	if raw > i64::MAX as u64 {
		return Err(Error::Corrupted("timestamp exceeds i64".to_string()));
	}
	Ok(raw as i64)
}

impl Writeable for TxnMeta {
	fn write(&self, writer: &mut ByteWriter) {
		writer.write_u8(self.type_byte());
		match self {
			TxnMeta::CoinLockup(meta) => {
				write_pub_key(writer, &meta.creator_public_key);
				write_timestamp(writer, meta.unlock_timestamp_nanos);
				writer.write_u256_var(&meta.amount);
			}
			TxnMeta::UpdateLockupParams(meta) => {
				write_timestamp(writer, meta.lockup_duration_nanos);
				writer.write_uvarint(meta.lockup_yield_apy_basis_points);
				writer.write_u8(meta.remove_yield_curve_point as u8);
				writer.write_u8(meta.new_lockup_transfer_restrictions as u8);
				writer.write_u8(meta.lockup_transfer_restriction);
			}
			TxnMeta::CoinLockupTransfer(meta) => {
				write_pub_key(writer, &meta.recipient_public_key);
				write_pub_key(writer, &meta.creator_public_key);
				write_timestamp(writer, meta.unlock_timestamp_nanos);
				writer.write_u256_var(&meta.amount);
			}
			TxnMeta::CoinUnlock(meta) => {
				write_pub_key(writer, &meta.creator_public_key);
			}
			TxnMeta::RegisterValidator(meta) => {
				writer.write_bytes(&meta.voting_public_key.to_bytes());
				writer.write_uvarint(meta.domains.len() as u64);
				for domain in &meta.domains {
					writer.write_bytes(domain);
				}
				writer.write_u8(meta.disable_delegated_stake as u8);
				writer.write_u256_var(&meta.stake_amount);
			}
			TxnMeta::UnregisterValidator(_) => {}
		}
	}
}

fn read_bool(reader: &mut ByteReader<'_>) -> Result<bool, Error> {
	match reader.read_u8()? {
		0 => Ok(false),
		1 => Ok(true),
		other => Err(Error::Corrupted(format!("bad bool byte {}", other))),
	}
}

impl Readable for TxnMeta {
	fn read(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
		match reader.read_u8()? {
			TXN_TYPE_COIN_LOCKUP => Ok(TxnMeta::CoinLockup(CoinLockupMetadata {
				creator_public_key: read_pub_key(reader)?,
				unlock_timestamp_nanos: read_timestamp(reader)?,
				amount: reader.read_u256_var()?,
			})),
			TXN_TYPE_UPDATE_LOCKUP_PARAMS => {
				Ok(TxnMeta::UpdateLockupParams(UpdateLockupParamsMetadata {
					lockup_duration_nanos: read_timestamp(reader)?,
					lockup_yield_apy_basis_points: reader.read_uvarint()?,
					remove_yield_curve_point: read_bool(reader)?,
					new_lockup_transfer_restrictions: read_bool(reader)?,
					lockup_transfer_restriction: reader.read_u8()?,
				}))
			}
			TXN_TYPE_COIN_LOCKUP_TRANSFER => {
				Ok(TxnMeta::CoinLockupTransfer(CoinLockupTransferMetadata {
					recipient_public_key: read_pub_key(reader)?,
					creator_public_key: read_pub_key(reader)?,
					unlock_timestamp_nanos: read_timestamp(reader)?,
					amount: reader.read_u256_var()?,
				}))
			}
			TXN_TYPE_COIN_UNLOCK => Ok(TxnMeta::CoinUnlock(CoinUnlockMetadata {
				creator_public_key: read_pub_key(reader)?,
			})),
			TXN_TYPE_REGISTER_VALIDATOR => {
				let voting_public_key = BlsPublicKey::from_bytes(&reader.read_bytes()?)
					.map_err(|e| Error::Corrupted(e.to_string()))?;
				let count = reader.read_uvarint()?;
				if count > 64 {
					return Err(Error::Corrupted("too many validator domains".to_string()));
				}
				let mut domains = Vec::with_capacity(count as usize);
				for _ in 0..count {
					domains.push(reader.read_bytes()?);
				}
				Ok(TxnMeta::RegisterValidator(RegisterValidatorMetadata {
					voting_public_key,
					domains,
					disable_delegated_stake: read_bool(reader)?,
					stake_amount: reader.read_u256_var()?,
				}))
			}
			TXN_TYPE_UNREGISTER_VALIDATOR => {
				Ok(TxnMeta::UnregisterValidator(UnregisterValidatorMetadata {}))
			}
			other => Err(Error::Corrupted(format!("unknown txn type {}", other))),
		}
	}
}

/// A transaction: the transactor's public key plus typed metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
	pub public_key: PubKey,
	pub metadata: TxnMeta,
}

impl Transaction {
	pub fn new(public_key: PubKey, metadata: TxnMeta) -> Self {
		Self {
			public_key,
			metadata,
		}
	}

	pub fn hash(&self) -> BlockHash {
		sha256(&ser::to_bytes(self))
	}
}

impl Writeable for Transaction {
	fn write(&self, writer: &mut ByteWriter) {
		writer.write_u8(RECORD_VERSION);
		writer.write_fixed(self.public_key.as_bytes());
		self.metadata.write(writer);
	}
}

impl Readable for Transaction {
	fn read(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
		reader.read_version()?;
		let public_key = PubKey::from_bytes(reader.read_fixed(33)?)
			.ok_or_else(|| Error::Corrupted("bad transactor key".to_string()))?;
		let metadata = TxnMeta::read(reader)?;
		Ok(Self {
			public_key,
			metadata,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_metadata_round_trips() {
		let metas = vec![
			TxnMeta::CoinLockup(CoinLockupMetadata {
				creator_public_key: PubKey::zero(),
				unlock_timestamp_nanos: 100,
				amount: U256::from(500u64),
			}),
			TxnMeta::UpdateLockupParams(UpdateLockupParamsMetadata {
				lockup_duration_nanos: 86_400,
				lockup_yield_apy_basis_points: 350,
				remove_yield_curve_point: false,
				new_lockup_transfer_restrictions: true,
				lockup_transfer_restriction: 2,
			}),
			TxnMeta::CoinLockupTransfer(CoinLockupTransferMetadata {
				recipient_public_key: PubKey([9u8; 33]),
				creator_public_key: PubKey([8u8; 33]),
				unlock_timestamp_nanos: 7,
				amount: U256::from(1u8),
			}),
			TxnMeta::CoinUnlock(CoinUnlockMetadata {
				creator_public_key: PubKey([5u8; 33]),
			}),
			TxnMeta::UnregisterValidator(UnregisterValidatorMetadata {}),
		];
		for meta in metas {
			let txn = Transaction::new(PubKey([1u8; 33]), meta);
			let decoded: Transaction = ser::from_bytes(&ser::to_bytes(&txn)).unwrap();
			assert_eq!(txn, decoded);
		}
	}

	#[test]
	fn test_hash_changes_with_metadata() {
		let a = Transaction::new(
			PubKey([1u8; 33]),
			TxnMeta::CoinUnlock(CoinUnlockMetadata {
				creator_public_key: PubKey::zero(),
			}),
		);
		let b = Transaction::new(
			PubKey([1u8; 33]),
			TxnMeta::CoinUnlock(CoinUnlockMetadata {
				creator_public_key: PubKey([2u8; 33]),
			}),
		);
		assert_ne!(a.hash(), b.hash());
	}

	#[test]
	fn test_unknown_type_rejected() {
		let mut w = ByteWriter::new();
		w.write_u8(RECORD_VERSION);
		w.write_fixed(&[1u8; 33]);
		w.write_u8(99);
		assert!(ser::from_bytes::<Transaction>(&w.into_bytes()).is_err());
	}
}
