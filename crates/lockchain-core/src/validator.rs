//! Validator registry and global stake tally. Every write that changes a
//! validator's stake re-indexes the by-stake sort key and adjusts the global
//! tally by the signed delta; the tally counts non-jailed validators only.

use crate::error::RuleError;
use crate::keys;
use crate::safemath::{safe_add, safe_sub};
use crate::ser::{ByteReader, ByteWriter, Error, Readable, Writeable, RECORD_VERSION};
use crate::txn::RegisterValidatorMetadata;
use crate::types::{BlockHash, EpochNumber, Hash256, Pkid, PubKey, U256};
use crate::undo::UndoOp;
use crate::view::{ConnectContext, Staged, UtxoView};
use crate::{ChainError, Result};
use lockchain_crypto::BlsPublicKey;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorStatus {
	Active,
	Jailed,
}

impl ValidatorStatus {
	pub fn to_u8(self) -> u8 {
		match self {
			ValidatorStatus::Active => 0,
			ValidatorStatus::Jailed => 1,
		}
	}

	pub fn from_u8(v: u8) -> Option<Self> {
		match v {
			0 => Some(ValidatorStatus::Active),
			1 => Some(ValidatorStatus::Jailed),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorEntry {
	/// Hash of the registration transaction that produced this entry.
	pub validator_id: BlockHash,
	pub pkid: Pkid,
	pub voting_public_key: BlsPublicKey,
	pub domains: Vec<Vec<u8>>,
	pub disable_delegated_stake: bool,
	pub total_stake: U256,
	pub created_at_height: u32,
	pub status: ValidatorStatus,
	pub jailed_at_epoch: Option<EpochNumber>,
	pub last_active_at_epoch: EpochNumber,
	pub extra: BTreeMap<String, Vec<u8>>,
}

impl ValidatorEntry {
	pub fn is_active(&self) -> bool {
		self.status == ValidatorStatus::Active
	}

	/// What this entry contributes to the global stake tally.
	pub fn tally_contribution(&self) -> U256 {
		if self.is_active() {
			self.total_stake
		} else {
			U256::zero()
		}
	}

	pub fn stake_index_key(&self) -> Vec<u8> {
		keys::validator_by_stake_key(&self.total_stake, self.created_at_height, &self.pkid)
	}
}

impl Writeable for ValidatorEntry {
	fn write(&self, writer: &mut ByteWriter) {
		writer.write_u8(RECORD_VERSION);
		writer.write_fixed(self.validator_id.as_bytes());
		writer.write_fixed(self.pkid.as_bytes());
		writer.write_bytes(&self.voting_public_key.to_bytes());
		writer.write_uvarint(self.domains.len() as u64);
		for domain in &self.domains {
			writer.write_bytes(domain);
		}
		writer.write_u8(self.disable_delegated_stake as u8);
		writer.write_u256_var(&self.total_stake);
		writer.write_u32(self.created_at_height);
		writer.write_u8(self.status.to_u8());
		match self.jailed_at_epoch {
			Some(epoch) => {
				writer.write_u8(1);
				writer.write_uvarint(epoch);
			}
			None => writer.write_u8(0),
		}
		writer.write_uvarint(self.last_active_at_epoch);
		// BTreeMap iteration is sorted, keeping the encoding deterministic
		writer.write_uvarint(self.extra.len() as u64);
		for (key, value) in &self.extra {
			writer.write_bytes(key.as_bytes());
			writer.write_bytes(value);
		}
	}
}

impl Readable for ValidatorEntry {
	fn read(reader: &mut ByteReader<'_>) -> std::result::Result<Self, Error> {
		reader.read_version()?;
		let validator_id = Hash256::from_bytes(reader.read_fixed(32)?)
			.map_err(|e| Error::Corrupted(e.to_string()))?;
		let pkid = Pkid::from_bytes(reader.read_fixed(33)?)
			.ok_or_else(|| Error::Corrupted("bad validator pkid".to_string()))?;
		let voting_public_key = BlsPublicKey::from_bytes(&reader.read_bytes()?)
			.map_err(|e| Error::Corrupted(e.to_string()))?;
		let domain_count = reader.read_uvarint()?;
		if domain_count > 64 {
			return Err(Error::Corrupted("too many validator domains".to_string()));
		}
		let mut domains = Vec::with_capacity(domain_count as usize);
		for _ in 0..domain_count {
			domains.push(reader.read_bytes()?);
		}
		let disable_delegated_stake = reader.read_u8()? != 0;
		let total_stake = reader.read_u256_var()?;
		let created_at_height = reader.read_u32()?;
		let status = ValidatorStatus::from_u8(reader.read_u8()?)
			.ok_or_else(|| Error::Corrupted("bad validator status".to_string()))?;
		let jailed_at_epoch = match reader.read_u8()? {
			0 => None,
			1 => Some(reader.read_uvarint()?),
			other => return Err(Error::Corrupted(format!("bad option byte {}", other))),
		};
		let last_active_at_epoch = reader.read_uvarint()?;
		let extra_count = reader.read_uvarint()?;
		let mut extra = BTreeMap::new();
		for _ in 0..extra_count {
			let key = String::from_utf8(reader.read_bytes()?)
				.map_err(|_| Error::Corrupted("extra key is not utf8".to_string()))?;
			extra.insert(key, reader.read_bytes()?);
		}
		Ok(Self {
			validator_id,
			pkid,
			voting_public_key,
			domains,
			disable_delegated_stake,
			total_stake,
			created_at_height,
			status,
			jailed_at_epoch,
			last_active_at_epoch,
			extra,
		})
	}
}

impl UtxoView {
	pub fn get_validator_by_pkid(&mut self, pkid: &Pkid) -> Result<Option<ValidatorEntry>> {
		if let Some(staged) = self.validators.get(pkid) {
			if staged.is_deleted {
				return Ok(None);
			}
			return Ok(Some(staged.entry.clone()));
		}
		let Some(raw) = self.snapshot.get(&keys::validator_by_pkid_key(pkid))? else {
			return Ok(None);
		};
		let entry: ValidatorEntry = crate::ser::from_bytes(&raw)?;
		self.validators
			.insert(*pkid, Staged::live(entry.clone()));
		Ok(Some(entry))
	}

	/// Current global stake tally (sum of stake over non-jailed validators).
	pub fn get_global_stake(&mut self) -> Result<U256> {
		if let Some(tally) = self.global_stake {
			return Ok(tally);
		}
		let tally = match self.snapshot.get(&keys::global_stake_key())? {
			Some(raw) if raw.len() == 32 => U256::from_big_endian(&raw),
			Some(_) => {
				return Err(ChainError::Invariant(
					"global stake record has the wrong width".to_string(),
				))
			}
			None => U256::zero(),
		};
		self.global_stake = Some(tally);
		Ok(tally)
	}

	/// Upsert a validator, re-indexing its stake key and adjusting the
	/// global tally by the signed delta.
	pub fn set_validator_entry(&mut self, entry: ValidatorEntry) -> Result<()> {
		let prev = self.get_validator_by_pkid(&entry.pkid)?;
		let tally = self.get_global_stake()?;
		let old_contribution = prev
			.as_ref()
			.map(|p| p.tally_contribution())
			.unwrap_or_default();
		let adjusted = safe_sub(tally, old_contribution)
			.and_then(|t| safe_add(t, entry.tally_contribution()))?;
		self.global_stake = Some(adjusted);

		if let Some(prev) = prev {
			self.stale_stake_index_keys.push(prev.stake_index_key());
		}
		self.validators.insert(entry.pkid, Staged::live(entry));
		Ok(())
	}

	/// Tombstone a validator and remove its contribution from the tally.
	pub fn delete_validator_entry(&mut self, pkid: &Pkid) -> Result<()> {
		let Some(prev) = self.get_validator_by_pkid(pkid)? else {
			return Ok(());
		};
		let tally = self.get_global_stake()?;
		self.global_stake = Some(safe_sub(tally, prev.tally_contribution())?);
		self.stale_stake_index_keys.push(prev.stake_index_key());
		self.validators.insert(*pkid, Staged::deleted(prev));
		Ok(())
	}

	/// Pull every persisted validator into the overlay so full-registry
	/// queries see staged and stored entries together.
	pub fn load_all_validators(&mut self) -> Result<()> {
		if self.validators_fully_loaded {
			return Ok(());
		}
		let rows = self
			.snapshot
			.prefix_scan(&keys::validator_by_pkid_prefix(), 0, false)?;
		for (_, raw) in rows {
			let entry: ValidatorEntry = crate::ser::from_bytes(&raw)?;
			if !self.validators.contains_key(&entry.pkid) {
				self.validators.insert(entry.pkid, Staged::live(entry));
			}
		}
		self.validators_fully_loaded = true;
		Ok(())
	}

	/// Every live validator, in pkid order.
	pub fn get_all_validators(&mut self) -> Result<Vec<ValidatorEntry>> {
		self.load_all_validators()?;
		let mut out: Vec<ValidatorEntry> = self
			.validators
			.values()
			.filter(|staged| !staged.is_deleted)
			.map(|staged| staged.entry.clone())
			.collect();
		out.sort_by(|a, b| a.pkid.cmp(&b.pkid));
		Ok(out)
	}

	/// Active validators ordered by stake (descending), oldest first among
	/// ties, pkid as the final tie-break. Matches the by-stake key order.
	pub fn get_top_validators_by_stake(&mut self, limit: usize) -> Result<Vec<ValidatorEntry>> {
		let mut out: Vec<ValidatorEntry> = self
			.get_all_validators()?
			.into_iter()
			.filter(|entry| entry.is_active())
			.collect();
		out.sort_by(|a, b| {
			b.total_stake
				.cmp(&a.total_stake)
				.then(a.created_at_height.cmp(&b.created_at_height))
				.then(a.pkid.cmp(&b.pkid))
		});
		out.truncate(limit);
		Ok(out)
	}

	pub fn connect_register_validator(
		&mut self,
		transactor: &PubKey,
		meta: &RegisterValidatorMetadata,
		txn_hash: &BlockHash,
		ctx: &ConnectContext,
	) -> Result<UndoOp> {
		if meta.domains.is_empty() {
			return Err(RuleError::InvalidValidatorDomains.into());
		}
		let pkid = Pkid::from_pub_key(transactor);
		let prev_validator_entry = self.get_validator_by_pkid(&pkid)?;
		let epoch = self.get_current_epoch()?.epoch_number;

		// stake moves between the native balance and the registry
		let old_stake = prev_validator_entry
			.as_ref()
			.map(|p| p.total_stake)
			.unwrap_or_default();
		let native = Pkid::zero();
		let prev_balance_entry = if meta.stake_amount >= old_stake {
			let delta = safe_sub(meta.stake_amount, old_stake)?;
			self.spend_balance(&pkid, &native, delta)?
		} else {
			let delta = safe_sub(old_stake, meta.stake_amount)?;
			self.credit_balance(&pkid, &native, delta)?
		};

		let entry = ValidatorEntry {
			validator_id: *txn_hash,
			pkid,
			voting_public_key: meta.voting_public_key,
			domains: meta.domains.clone(),
			disable_delegated_stake: meta.disable_delegated_stake,
			total_stake: meta.stake_amount,
			created_at_height: prev_validator_entry
				.as_ref()
				.map(|p| p.created_at_height)
				.unwrap_or(ctx.block_height as u32),
			// re-registration unjails
			status: ValidatorStatus::Active,
			jailed_at_epoch: None,
			last_active_at_epoch: epoch,
			extra: prev_validator_entry
				.as_ref()
				.map(|p| p.extra.clone())
				.unwrap_or_default(),
		};
		self.set_validator_entry(entry)?;

		Ok(UndoOp::RegisterValidator {
			prev_validator_entry,
			prev_balance_entry,
		})
	}

	pub fn disconnect_register_validator(
		&mut self,
		transactor: &PubKey,
		op: UndoOp,
	) -> Result<()> {
		let UndoOp::RegisterValidator {
			prev_validator_entry,
			prev_balance_entry,
		} = op
		else {
			return Err(ChainError::Invariant(
				"register validator disconnect consumed a mismatched undo op".to_string(),
			));
		};
		let pkid = Pkid::from_pub_key(transactor);
		match prev_validator_entry {
			Some(prev) => self.set_validator_entry(prev)?,
			None => self.delete_validator_entry(&pkid)?,
		}
		self.restore_balance_entry(&pkid, &Pkid::zero(), prev_balance_entry);
		Ok(())
	}

	pub fn connect_unregister_validator(
		&mut self,
		transactor: &PubKey,
		_ctx: &ConnectContext,
	) -> Result<UndoOp> {
		let pkid = Pkid::from_pub_key(transactor);
		let prev_validator_entry = self
			.get_validator_by_pkid(&pkid)?
			.ok_or(RuleError::ValidatorMissing)?;

		// return the self-stake to the native balance
		let prev_balance_entry =
			self.credit_balance(&pkid, &Pkid::zero(), prev_validator_entry.total_stake)?;
		self.delete_validator_entry(&pkid)?;

		Ok(UndoOp::UnregisterValidator {
			prev_validator_entry,
			prev_balance_entry,
		})
	}

	pub fn disconnect_unregister_validator(
		&mut self,
		transactor: &PubKey,
		op: UndoOp,
	) -> Result<()> {
		let UndoOp::UnregisterValidator {
			prev_validator_entry,
			prev_balance_entry,
		} = op
		else {
			return Err(ChainError::Invariant(
				"unregister validator disconnect consumed a mismatched undo op".to_string(),
			));
		};
		let pkid = Pkid::from_pub_key(transactor);
		self.set_validator_entry(prev_validator_entry)?;
		self.restore_balance_entry(&pkid, &Pkid::zero(), prev_balance_entry);
		Ok(())
	}
}
