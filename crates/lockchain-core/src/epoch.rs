//! Epoch rollover. At the flush of the block that closes an epoch the node
//! freezes the validator set: global params, every validator, the top-N
//! stake list, the active-stake sum, and a deterministic stake-weighted
//! leader schedule. Consensus consumes a snapshot two epochs after it is
//! written so stake churn cannot retroactively change who signs.

use crate::keys;
use crate::safemath::safe_add;
use crate::ser::{self, ByteReader, ByteWriter, Error, Readable, Writeable, RECORD_VERSION};
use crate::types::{BlockHeight, EpochNumber, Pkid, PubKey, U256};
use crate::validator::{ValidatorEntry, ValidatorStatus};
use crate::view::UtxoView;
use crate::{ChainError, Result};
use lockchain_crypto::sha256;
use serde::{Deserialize, Serialize};
use tracing::info;

/// The currently open epoch. Exactly one is current at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochEntry {
	pub epoch_number: EpochNumber,
	/// Height of the last block belonging to this epoch.
	pub final_block_height: BlockHeight,
}

impl Writeable for EpochEntry {
	fn write(&self, writer: &mut ByteWriter) {
		writer.write_u8(RECORD_VERSION);
		writer.write_uvarint(self.epoch_number);
		writer.write_uvarint(self.final_block_height);
	}
}

impl Readable for EpochEntry {
	fn read(reader: &mut ByteReader<'_>) -> std::result::Result<Self, Error> {
		reader.read_version()?;
		Ok(Self {
			epoch_number: reader.read_uvarint()?,
			final_block_height: reader.read_uvarint()?,
		})
	}
}

/// Which party's unlocked balance satisfies the DAO-members-only transfer
/// restriction. Configurable because the upstream semantics are uncertain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DaoMemberCheck {
	Recipient,
	Sender,
}

impl DaoMemberCheck {
	pub fn to_u8(self) -> u8 {
		match self {
			DaoMemberCheck::Recipient => 0,
			DaoMemberCheck::Sender => 1,
		}
	}

	pub fn from_u8(v: u8) -> Option<Self> {
		match v {
			0 => Some(DaoMemberCheck::Recipient),
			1 => Some(DaoMemberCheck::Sender),
			_ => None,
		}
	}
}

/// Chain-wide parameters, stored behind an explicit key so a fresh pipeline
/// can be constructed by pointing at a fresh store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalParamsEntry {
	/// Height at which lockup transactions become live.
	pub lockup_fork_height: BlockHeight,
	pub epoch_duration_blocks: u64,
	/// Epochs a validator may stay idle before the jail sweep takes it.
	pub grace_period_epochs: u64,
	/// Consensus at epoch e uses the snapshot written at e - lookback.
	pub snapshot_lookback_epochs: u64,
	pub top_validators_snapshot_size: u16,
	/// Key allowed to curate the native coin's yield curve.
	pub lockup_param_updater: PubKey,
	pub dao_member_check: DaoMemberCheck,
}

impl Default for GlobalParamsEntry {
	fn default() -> Self {
		Self {
			lockup_fork_height: 0,
			epoch_duration_blocks: 3_600,
			grace_period_epochs: 10,
			snapshot_lookback_epochs: 2,
			top_validators_snapshot_size: 100,
			lockup_param_updater: PubKey::zero(),
			dao_member_check: DaoMemberCheck::Recipient,
		}
	}
}

impl Writeable for GlobalParamsEntry {
	fn write(&self, writer: &mut ByteWriter) {
		writer.write_u8(RECORD_VERSION);
		writer.write_uvarint(self.lockup_fork_height);
		writer.write_uvarint(self.epoch_duration_blocks);
		writer.write_uvarint(self.grace_period_epochs);
		writer.write_uvarint(self.snapshot_lookback_epochs);
		writer.write_u16(self.top_validators_snapshot_size);
		writer.write_fixed(self.lockup_param_updater.as_bytes());
		writer.write_u8(self.dao_member_check.to_u8());
	}
}

impl Readable for GlobalParamsEntry {
	fn read(reader: &mut ByteReader<'_>) -> std::result::Result<Self, Error> {
		reader.read_version()?;
		Ok(Self {
			lockup_fork_height: reader.read_uvarint()?,
			epoch_duration_blocks: reader.read_uvarint()?,
			grace_period_epochs: reader.read_uvarint()?,
			snapshot_lookback_epochs: reader.read_uvarint()?,
			top_validators_snapshot_size: reader.read_u16()?,
			lockup_param_updater: PubKey::from_bytes(reader.read_fixed(33)?)
				.ok_or_else(|| Error::Corrupted("bad param updater key".to_string()))?,
			dao_member_check: DaoMemberCheck::from_u8(reader.read_u8()?)
				.ok_or_else(|| Error::Corrupted("bad dao member check".to_string()))?,
		})
	}
}

/// Deterministic stake-weighted permutation of the snapshot validator set,
/// seeded by the epoch number and the active stake. Every honest node must
/// derive the same schedule from the same snapshot.
pub fn generate_leader_schedule(
	epoch: EpochNumber,
	active_stake: U256,
	top_validators: &[ValidatorEntry],
) -> Vec<Pkid> {
	let mut seed_input = Vec::with_capacity(8 + 32);
	seed_input.extend_from_slice(&epoch.to_be_bytes());
	let mut stake_bytes = [0u8; 32];
	active_stake.to_big_endian(&mut stake_bytes);
	seed_input.extend_from_slice(&stake_bytes);
	let seed = sha256(&seed_input);

	let mut remaining: Vec<(Pkid, U256)> = top_validators
		.iter()
		.map(|entry| (entry.pkid, entry.total_stake))
		.collect();
	let mut total: U256 = remaining
		.iter()
		.fold(U256::zero(), |acc, (_, stake)| acc.saturating_add(*stake));

	let mut schedule = Vec::with_capacity(remaining.len());
	let mut slot: u16 = 0;
	while !remaining.is_empty() {
		let picked = if total.is_zero() {
			// stakeless tail keeps the deterministic input order
			0
		} else {
			let mut entropy_input = Vec::with_capacity(32 + 2);
			entropy_input.extend_from_slice(seed.as_bytes());
			entropy_input.extend_from_slice(&slot.to_be_bytes());
			let entropy = sha256(&entropy_input);
			let mut cursor = U256::from_big_endian(entropy.as_bytes()) % total;
			let mut index = 0;
			for (i, (_, stake)) in remaining.iter().enumerate() {
				if cursor < *stake {
					index = i;
					break;
				}
				cursor -= *stake;
			}
			index
		};
		let (pkid, stake) = remaining.remove(picked);
		total -= stake;
		schedule.push(pkid);
		slot += 1;
	}
	schedule
}

impl UtxoView {
	/// Close the epoch whose final height is `block_height`: write the
	/// epoch snapshots, sweep idle validators into jail, and install the
	/// next epoch entry. Runs inside the flush of that block.
	pub fn run_epoch_complete_hook(&mut self, block_height: BlockHeight) -> Result<()> {
		let epoch = self.get_current_epoch()?;
		if block_height != epoch.final_block_height {
			return Err(ChainError::Invariant(format!(
				"epoch hook ran at height {} but epoch {} ends at {}",
				block_height, epoch.epoch_number, epoch.final_block_height
			)));
		}
		let e = epoch.epoch_number;
		let params = self.get_global_params()?;

		self.write_epoch_snapshot(
			keys::snapshot_global_params_key(e),
			ser::to_bytes(&params),
		)?;

		let validators = self.get_all_validators()?;
		for entry in &validators {
			self.write_epoch_snapshot(
				keys::snapshot_validator_key(e, &entry.pkid),
				ser::to_bytes(entry),
			)?;
		}

		let top =
			self.get_top_validators_by_stake(params.top_validators_snapshot_size as usize)?;
		let mut writer = ByteWriter::new();
		writer.write_u8(RECORD_VERSION);
		writer.write_uvarint(top.len() as u64);
		for entry in &top {
			writer.write_fixed(entry.pkid.as_bytes());
		}
		self.write_epoch_snapshot(keys::snapshot_top_validators_key(e), writer.into_bytes())?;

		let mut active_stake = U256::zero();
		for entry in &validators {
			if entry.is_active() {
				active_stake = safe_add(active_stake, entry.total_stake)?;
			}
		}
		let mut stake_bytes = [0u8; 32];
		active_stake.to_big_endian(&mut stake_bytes);
		self.write_epoch_snapshot(
			keys::snapshot_global_active_stake_key(e),
			stake_bytes.to_vec(),
		)?;

		let schedule = generate_leader_schedule(e, active_stake, &top);
		for (slot, pkid) in schedule.iter().enumerate() {
			self.write_epoch_snapshot(
				keys::snapshot_leader_schedule_key(e, slot as u16),
				pkid.as_bytes().to_vec(),
			)?;
		}

		// sweep after the snapshots so a fresh jailing reaches consensus
		// only once the lookback window passes over it
		let mut jailed_count = 0u32;
		for entry in validators {
			if entry.is_active()
				&& e.saturating_sub(entry.last_active_at_epoch) >= params.grace_period_epochs
			{
				let mut jailed = entry;
				jailed.status = ValidatorStatus::Jailed;
				jailed.jailed_at_epoch = Some(e);
				self.set_validator_entry(jailed)?;
				jailed_count += 1;
			}
		}

		let next = EpochEntry {
			epoch_number: e + 1,
			final_block_height: block_height + params.epoch_duration_blocks,
		};
		info!(
			epoch = e,
			next_epoch = next.epoch_number,
			snapshot_size = schedule.len(),
			jailed = jailed_count,
			"epoch rolled over"
		);
		self.set_current_epoch(next);
		Ok(())
	}

	pub fn get_snapshot_validator(
		&mut self,
		epoch: EpochNumber,
		pkid: &Pkid,
	) -> Result<Option<ValidatorEntry>> {
		match self.get_epoch_snapshot(&keys::snapshot_validator_key(epoch, pkid))? {
			Some(raw) => Ok(Some(ser::from_bytes(&raw)?)),
			None => Ok(None),
		}
	}

	pub fn get_snapshot_top_validators(
		&mut self,
		epoch: EpochNumber,
	) -> Result<Option<Vec<Pkid>>> {
		let Some(raw) = self.get_epoch_snapshot(&keys::snapshot_top_validators_key(epoch))?
		else {
			return Ok(None);
		};
		let mut reader = ByteReader::new(&raw);
		reader.read_version().map_err(ChainError::Ser)?;
		let count = reader.read_uvarint().map_err(ChainError::Ser)?;
		let mut out = Vec::with_capacity(count as usize);
		for _ in 0..count {
			let pkid = Pkid::from_bytes(reader.read_fixed(33).map_err(ChainError::Ser)?)
				.ok_or_else(|| ChainError::Invariant("bad pkid in snapshot".to_string()))?;
			out.push(pkid);
		}
		Ok(Some(out))
	}

	pub fn get_snapshot_global_active_stake(
		&mut self,
		epoch: EpochNumber,
	) -> Result<Option<U256>> {
		match self.get_epoch_snapshot(&keys::snapshot_global_active_stake_key(epoch))? {
			Some(raw) if raw.len() == 32 => Ok(Some(U256::from_big_endian(&raw))),
			Some(_) => Err(ChainError::Invariant(
				"active stake snapshot has the wrong width".to_string(),
			)),
			None => Ok(None),
		}
	}

	pub fn get_snapshot_leader(
		&mut self,
		epoch: EpochNumber,
		slot: u16,
	) -> Result<Option<Pkid>> {
		match self.get_epoch_snapshot(&keys::snapshot_leader_schedule_key(epoch, slot))? {
			Some(raw) => Pkid::from_bytes(&raw)
				.map(Some)
				.ok_or_else(|| ChainError::Invariant("bad pkid in leader slot".to_string())),
			None => Ok(None),
		}
	}

	/// Leader schedule for an epoch, read slot by slot.
	pub fn get_snapshot_leader_schedule(&mut self, epoch: EpochNumber) -> Result<Vec<Pkid>> {
		let mut out = Vec::new();
		let mut slot: u16 = 0;
		while let Some(pkid) = self.get_snapshot_leader(epoch, slot)? {
			out.push(pkid);
			slot += 1;
		}
		Ok(out)
	}
}
