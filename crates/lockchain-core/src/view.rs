//! The UtxoView: a staged, transactional overlay on the persistent store.
//! Every block is applied against a fresh view so individual transactions
//! can be rejected without side effects, whole blocks can be rolled back,
//! and the accumulated delta commits as one atomic batch.
//!
//! Reads consult the staged maps first and fall through to the read
//! snapshot, caching hits back into the map. Writes only ever touch the
//! maps; `flush` is the single place persistent state changes.

use crate::balance::BalanceEntry;
use crate::epoch::{EpochEntry, GlobalParamsEntry};
use crate::error::RuleError;
use crate::keys;
use crate::lockup::{LockedBalanceEntry, ProfileEntry, YieldCurvePoint};
use crate::safemath::{safe_add, safe_sub};
use crate::ser;
use crate::txn::{Transaction, TxnMeta};
use crate::types::{fits_u64, BlockHeight, Pkid, TimestampNanos, U256};
use crate::undo::UndoOp;
use crate::validator::ValidatorEntry;
use crate::{ChainError, Result};
use lockchain_storage::{KvSnapshot, WriteBatch};
use std::collections::{BTreeMap, BTreeSet};

/// A staged entry with its tombstone bit.
#[derive(Debug, Clone)]
pub struct Staged<T> {
	pub entry: T,
	pub is_deleted: bool,
}

impl<T> Staged<T> {
	pub fn live(entry: T) -> Self {
		Self {
			entry,
			is_deleted: false,
		}
	}

	pub fn deleted(entry: T) -> Self {
		Self {
			entry,
			is_deleted: true,
		}
	}
}

/// Per-block facts handed to every connect handler.
#[derive(Debug, Clone, Copy)]
pub struct ConnectContext {
	pub block_height: BlockHeight,
	pub block_timestamp_nanos: TimestampNanos,
}

pub struct UtxoView {
	pub(crate) snapshot: Box<dyn KvSnapshot>,
	pub(crate) balances: BTreeMap<(Pkid, Pkid), Staged<BalanceEntry>>,
	pub(crate) locked_balances: BTreeMap<(Pkid, Pkid, TimestampNanos), Staged<LockedBalanceEntry>>,
	pub(crate) loaded_locked_ranges: BTreeSet<(Pkid, Pkid)>,
	pub(crate) yield_curve_points: BTreeMap<(Pkid, TimestampNanos), Staged<YieldCurvePoint>>,
	pub(crate) loaded_yield_curves: BTreeSet<Pkid>,
	pub(crate) profiles: BTreeMap<Pkid, Staged<ProfileEntry>>,
	pub(crate) validators: BTreeMap<Pkid, Staged<ValidatorEntry>>,
	pub(crate) validators_fully_loaded: bool,
	/// By-stake index keys superseded by a stake change this view.
	pub(crate) stale_stake_index_keys: Vec<Vec<u8>>,
	pub(crate) global_stake: Option<U256>,
	pub(crate) current_epoch: Option<EpochEntry>,
	pub(crate) global_params: Option<GlobalParamsEntry>,
	/// Write-once epoch snapshot records, keyed by their full store key.
	pub(crate) epoch_snapshots: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl UtxoView {
	pub fn new(snapshot: Box<dyn KvSnapshot>) -> Self {
		Self {
			snapshot,
			balances: BTreeMap::new(),
			locked_balances: BTreeMap::new(),
			loaded_locked_ranges: BTreeSet::new(),
			yield_curve_points: BTreeMap::new(),
			loaded_yield_curves: BTreeSet::new(),
			profiles: BTreeMap::new(),
			validators: BTreeMap::new(),
			validators_fully_loaded: false,
			stale_stake_index_keys: Vec::new(),
			global_stake: None,
			current_epoch: None,
			global_params: None,
			epoch_snapshots: BTreeMap::new(),
		}
	}

	// ---- balances ----

	pub fn get_balance_entry(
		&mut self,
		hodler: &Pkid,
		creator: &Pkid,
	) -> Result<Option<BalanceEntry>> {
		if let Some(staged) = self.balances.get(&(*hodler, *creator)) {
			if staged.is_deleted {
				return Ok(None);
			}
			return Ok(Some(staged.entry.clone()));
		}
		let Some(raw) = self.snapshot.get(&keys::balance_key(hodler, creator))? else {
			return Ok(None);
		};
		let entry: BalanceEntry = ser::from_bytes(&raw)?;
		self.balances
			.insert((*hodler, *creator), Staged::live(entry.clone()));
		Ok(Some(entry))
	}

	pub fn set_balance_entry(&mut self, entry: BalanceEntry) {
		self.balances
			.insert((entry.hodler, entry.creator), Staged::live(entry));
	}

	/// Add `amount` to a balance, creating the entry on first touch. The
	/// native coin rejects totals at or above 2^64. Returns the prior entry
	/// for undo capture.
	pub fn credit_balance(
		&mut self,
		hodler: &Pkid,
		creator: &Pkid,
		amount: U256,
	) -> Result<Option<BalanceEntry>> {
		let prev = self.get_balance_entry(hodler, creator)?;
		let mut entry = prev
			.clone()
			.unwrap_or_else(|| BalanceEntry::new(*hodler, *creator));
		entry.balance = safe_add(entry.balance, amount)?;
		if entry.is_native() && !fits_u64(&entry.balance) {
			return Err(RuleError::AmountTooLarge.into());
		}
		self.set_balance_entry(entry);
		Ok(prev)
	}

	/// Remove `amount` from a balance; the balance must cover it. Returns
	/// the prior entry for undo capture.
	pub fn spend_balance(
		&mut self,
		hodler: &Pkid,
		creator: &Pkid,
		amount: U256,
	) -> Result<Option<BalanceEntry>> {
		let prev = self.get_balance_entry(hodler, creator)?;
		if amount.is_zero() {
			return Ok(prev);
		}
		let Some(prev_entry) = prev.clone() else {
			return Err(RuleError::InsufficientBalance.into());
		};
		if prev_entry.balance < amount {
			return Err(RuleError::InsufficientBalance.into());
		}
		let mut entry = prev_entry;
		entry.balance = safe_sub(entry.balance, amount)?;
		self.set_balance_entry(entry);
		Ok(prev)
	}

	/// Put a balance back to its captured prior state.
	pub fn restore_balance_entry(
		&mut self,
		hodler: &Pkid,
		creator: &Pkid,
		prev: Option<BalanceEntry>,
	) {
		match prev {
			Some(entry) => self.set_balance_entry(entry),
			None => {
				self.balances.insert(
					(*hodler, *creator),
					Staged::deleted(BalanceEntry::new(*hodler, *creator)),
				);
			}
		}
	}

	// ---- locked balances ----

	pub fn get_locked_balance_entry(
		&mut self,
		hodler: &Pkid,
		creator: &Pkid,
		unlock_timestamp_nanos: TimestampNanos,
	) -> Result<Option<LockedBalanceEntry>> {
		let map_key = (*hodler, *creator, unlock_timestamp_nanos);
		if let Some(staged) = self.locked_balances.get(&map_key) {
			if staged.is_deleted {
				return Ok(None);
			}
			return Ok(Some(staged.entry.clone()));
		}
		let store_key = keys::locked_balance_key(hodler, creator, unlock_timestamp_nanos);
		let Some(raw) = self.snapshot.get(&store_key)? else {
			return Ok(None);
		};
		let entry: LockedBalanceEntry = ser::from_bytes(&raw)?;
		self.locked_balances
			.insert(map_key, Staged::live(entry.clone()));
		Ok(Some(entry))
	}

	pub fn set_locked_balance_entry(&mut self, entry: LockedBalanceEntry) {
		self.locked_balances.insert(
			(entry.hodler, entry.creator, entry.unlock_timestamp_nanos),
			Staged::live(entry),
		);
	}

	pub fn delete_locked_balance_entry(
		&mut self,
		hodler: &Pkid,
		creator: &Pkid,
		unlock_timestamp_nanos: TimestampNanos,
	) {
		let tombstone = LockedBalanceEntry {
			hodler: *hodler,
			creator: *creator,
			unlock_timestamp_nanos,
			balance: U256::zero(),
		};
		self.locked_balances.insert(
			(*hodler, *creator, unlock_timestamp_nanos),
			Staged::deleted(tombstone),
		);
	}

	pub fn restore_locked_balance_entry(
		&mut self,
		hodler: &Pkid,
		creator: &Pkid,
		unlock_timestamp_nanos: TimestampNanos,
		prev: Option<LockedBalanceEntry>,
	) {
		match prev {
			Some(entry) => self.set_locked_balance_entry(entry),
			None => self.delete_locked_balance_entry(hodler, creator, unlock_timestamp_nanos),
		}
	}

	/// Pull every persisted locked balance of (hodler, creator) into the
	/// overlay so range queries see staged and stored entries together.
	fn load_locked_balances(&mut self, hodler: &Pkid, creator: &Pkid) -> Result<()> {
		if self.loaded_locked_ranges.contains(&(*hodler, *creator)) {
			return Ok(());
		}
		let rows = self
			.snapshot
			.prefix_scan(&keys::locked_balance_prefix(hodler, creator), 0, false)?;
		for (_, raw) in rows {
			let entry: LockedBalanceEntry = ser::from_bytes(&raw)?;
			let map_key = (entry.hodler, entry.creator, entry.unlock_timestamp_nanos);
			self.locked_balances
				.entry(map_key)
				.or_insert_with(|| Staged::live(entry));
		}
		self.loaded_locked_ranges.insert((*hodler, *creator));
		Ok(())
	}

	/// Every live locked balance of (hodler, creator) that has matured by
	/// `as_of`, sorted ascending by unlock timestamp.
	pub fn get_unlockable_locked_balances(
		&mut self,
		hodler: &Pkid,
		creator: &Pkid,
		as_of: TimestampNanos,
	) -> Result<Vec<LockedBalanceEntry>> {
		self.load_locked_balances(hodler, creator)?;
		let mut out: Vec<LockedBalanceEntry> = self
			.locked_balances
			.range((*hodler, *creator, i64::MIN)..=(*hodler, *creator, i64::MAX))
			.filter(|(_, staged)| !staged.is_deleted)
			.map(|(_, staged)| staged.entry.clone())
			.filter(|entry| entry.unlock_timestamp_nanos <= as_of && !entry.balance.is_zero())
			.collect();
		// BTreeMap range order already ascends by timestamp; keep it explicit
		out.sort_by_key(|entry| entry.unlock_timestamp_nanos);
		Ok(out)
	}

	// ---- yield curves ----

	pub fn get_yield_curve_point(
		&mut self,
		creator: &Pkid,
		duration_nanos: TimestampNanos,
	) -> Result<Option<YieldCurvePoint>> {
		let map_key = (*creator, duration_nanos);
		if let Some(staged) = self.yield_curve_points.get(&map_key) {
			if staged.is_deleted {
				return Ok(None);
			}
			return Ok(Some(staged.entry.clone()));
		}
		let store_key = keys::yield_curve_point_key(creator, duration_nanos);
		let Some(raw) = self.snapshot.get(&store_key)? else {
			return Ok(None);
		};
		let point: YieldCurvePoint = ser::from_bytes(&raw)?;
		self.yield_curve_points
			.insert(map_key, Staged::live(point.clone()));
		Ok(Some(point))
	}

	pub fn set_yield_curve_point(&mut self, point: YieldCurvePoint) {
		self.yield_curve_points.insert(
			(point.creator, point.lockup_duration_nanos),
			Staged::live(point),
		);
	}

	pub fn delete_yield_curve_point(&mut self, creator: &Pkid, duration_nanos: TimestampNanos) {
		let tombstone = YieldCurvePoint {
			creator: *creator,
			lockup_duration_nanos: duration_nanos,
			apy_basis_points: 0,
		};
		self.yield_curve_points
			.insert((*creator, duration_nanos), Staged::deleted(tombstone));
	}

	/// The creator's full yield curve, loaded into the overlay on first
	/// touch, sorted ascending by duration.
	pub fn get_yield_curve(&mut self, creator: &Pkid) -> Result<Vec<YieldCurvePoint>> {
		if !self.loaded_yield_curves.contains(creator) {
			let rows = self
				.snapshot
				.prefix_scan(&keys::yield_curve_prefix(creator), 0, false)?;
			for (_, raw) in rows {
				let point: YieldCurvePoint = ser::from_bytes(&raw)?;
				let map_key = (point.creator, point.lockup_duration_nanos);
				self.yield_curve_points
					.entry(map_key)
					.or_insert_with(|| Staged::live(point));
			}
			self.loaded_yield_curves.insert(*creator);
		}
		Ok(self
			.yield_curve_points
			.range((*creator, i64::MIN)..=(*creator, i64::MAX))
			.filter(|(_, staged)| !staged.is_deleted)
			.map(|(_, staged)| staged.entry.clone())
			.collect())
	}

	// ---- profiles ----

	pub fn get_profile(&mut self, pkid: &Pkid) -> Result<Option<ProfileEntry>> {
		if let Some(staged) = self.profiles.get(pkid) {
			if staged.is_deleted {
				return Ok(None);
			}
			return Ok(Some(staged.entry.clone()));
		}
		let Some(raw) = self.snapshot.get(&keys::profile_key(pkid))? else {
			return Ok(None);
		};
		let profile: ProfileEntry = ser::from_bytes(&raw)?;
		self.profiles
			.insert(*pkid, Staged::live(profile.clone()));
		Ok(Some(profile))
	}

	pub fn set_profile(&mut self, profile: ProfileEntry) {
		self.profiles.insert(profile.pkid, Staged::live(profile));
	}

	// ---- epoch and params ----

	pub fn get_current_epoch(&mut self) -> Result<EpochEntry> {
		if let Some(epoch) = self.current_epoch {
			return Ok(epoch);
		}
		let Some(raw) = self.snapshot.get(&keys::current_epoch_key())? else {
			return Err(ChainError::Invariant(
				"no current epoch entry; the store was never seeded".to_string(),
			));
		};
		let epoch: EpochEntry = ser::from_bytes(&raw)?;
		self.current_epoch = Some(epoch);
		Ok(epoch)
	}

	pub fn set_current_epoch(&mut self, epoch: EpochEntry) {
		self.current_epoch = Some(epoch);
	}

	pub fn get_global_params(&mut self) -> Result<GlobalParamsEntry> {
		if let Some(params) = &self.global_params {
			return Ok(params.clone());
		}
		let params = match self.snapshot.get(&keys::global_params_key())? {
			Some(raw) => ser::from_bytes(&raw)?,
			None => GlobalParamsEntry::default(),
		};
		self.global_params = Some(params.clone());
		Ok(params)
	}

	pub fn set_global_params(&mut self, params: GlobalParamsEntry) {
		self.global_params = Some(params);
	}

	// ---- epoch snapshots (write-once) ----

	pub(crate) fn write_epoch_snapshot(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
		if self.epoch_snapshots.contains_key(&key) || self.snapshot.get(&key)?.is_some() {
			return Err(ChainError::Invariant(format!(
				"epoch snapshot overwrite at key {}",
				hex::encode(&key)
			)));
		}
		self.epoch_snapshots.insert(key, value);
		Ok(())
	}

	pub(crate) fn get_epoch_snapshot(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
		if let Some(value) = self.epoch_snapshots.get(key) {
			return Ok(Some(value.clone()));
		}
		Ok(self.snapshot.get(key)?)
	}

	// ---- transaction dispatch ----

	pub fn connect_transaction(
		&mut self,
		txn: &Transaction,
		ctx: &ConnectContext,
	) -> Result<UndoOp> {
		let txn_hash = txn.hash();
		match &txn.metadata {
			TxnMeta::CoinLockup(meta) => self.connect_coin_lockup(&txn.public_key, meta, ctx),
			TxnMeta::UpdateLockupParams(meta) => {
				self.connect_update_lockup_params(&txn.public_key, meta, ctx)
			}
			TxnMeta::CoinLockupTransfer(meta) => {
				self.connect_coin_lockup_transfer(&txn.public_key, meta, ctx)
			}
			TxnMeta::CoinUnlock(meta) => self.connect_coin_unlock(&txn.public_key, meta, ctx),
			TxnMeta::RegisterValidator(meta) => {
				self.connect_register_validator(&txn.public_key, meta, &txn_hash, ctx)
			}
			TxnMeta::UnregisterValidator(_) => {
				self.connect_unregister_validator(&txn.public_key, ctx)
			}
		}
	}

	/// Undo one transaction by consuming the tail of `ops`.
	pub fn disconnect_transaction(
		&mut self,
		txn: &Transaction,
		ops: &mut Vec<UndoOp>,
	) -> Result<()> {
		let op = ops.pop().ok_or_else(|| {
			ChainError::Invariant("disconnect with an empty undo list".to_string())
		})?;
		match &txn.metadata {
			TxnMeta::CoinLockup(meta) => self.disconnect_coin_lockup(&txn.public_key, meta, op),
			TxnMeta::UpdateLockupParams(_) => self.disconnect_update_lockup_params(op),
			TxnMeta::CoinLockupTransfer(meta) => {
				self.disconnect_coin_lockup_transfer(&txn.public_key, meta, op)
			}
			TxnMeta::CoinUnlock(meta) => self.disconnect_coin_unlock(&txn.public_key, meta, op),
			TxnMeta::RegisterValidator(_) => {
				self.disconnect_register_validator(&txn.public_key, op)
			}
			TxnMeta::UnregisterValidator(_) => {
				self.disconnect_unregister_validator(&txn.public_key, op)
			}
		}
	}

	// ---- flush ----

	/// Reconcile the overlay into `batch`: for every staged key issue a
	/// delete, then re-put every live, non-empty entry. The flush is an
	/// unconditional upsert of the overlay's closure, which makes it
	/// idempotent.
	pub fn flush(&self, batch: &mut WriteBatch) -> Result<()> {
		for ((hodler, creator), staged) in &self.balances {
			let key = keys::balance_key(hodler, creator);
			batch.delete(key.clone());
			if !staged.is_deleted && !staged.entry.is_empty() {
				batch.put(key, ser::to_bytes(&staged.entry));
			}
		}

		for ((hodler, creator, unlock_ts), staged) in &self.locked_balances {
			let key = keys::locked_balance_key(hodler, creator, *unlock_ts);
			batch.delete(key.clone());
			if !staged.is_deleted && !staged.entry.is_empty() {
				batch.put(key, ser::to_bytes(&staged.entry));
			}
		}

		for ((creator, duration), staged) in &self.yield_curve_points {
			let key = keys::yield_curve_point_key(creator, *duration);
			batch.delete(key.clone());
			if !staged.is_deleted {
				batch.put(key, ser::to_bytes(&staged.entry));
			}
		}

		for (pkid, staged) in &self.profiles {
			let key = keys::profile_key(pkid);
			batch.delete(key.clone());
			if !staged.is_deleted {
				batch.put(key, ser::to_bytes(&staged.entry));
			}
		}

		// superseded stake-index keys go first so a later re-put wins
		for key in &self.stale_stake_index_keys {
			batch.delete(key.clone());
		}
		for (pkid, staged) in &self.validators {
			let pkid_key = keys::validator_by_pkid_key(pkid);
			let stake_key = staged.entry.stake_index_key();
			batch.delete(pkid_key.clone());
			batch.delete(stake_key.clone());
			if !staged.is_deleted {
				batch.put(pkid_key, ser::to_bytes(&staged.entry));
				// jailed validators are delisted from the stake index
				if staged.entry.is_active() {
					batch.put(stake_key, pkid.as_bytes().to_vec());
				}
			}
		}

		if let Some(tally) = &self.global_stake {
			let key = keys::global_stake_key();
			batch.delete(key.clone());
			let mut be = [0u8; 32];
			tally.to_big_endian(&mut be);
			batch.put(key, be.to_vec());
		}

		if let Some(epoch) = &self.current_epoch {
			let key = keys::current_epoch_key();
			batch.delete(key.clone());
			batch.put(key, ser::to_bytes(epoch));
		}

		if let Some(params) = &self.global_params {
			let key = keys::global_params_key();
			batch.delete(key.clone());
			batch.put(key, ser::to_bytes(params));
		}

		for (key, value) in &self.epoch_snapshots {
			batch.delete(key.clone());
			batch.put(key.clone(), value.clone());
		}

		Ok(())
	}
}
