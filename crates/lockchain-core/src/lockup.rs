//! Coin lockup engine: time-locked balances with yield-curve interest,
//! transfer restrictions, and batched unlocks. Each transaction type has a
//! connect handler that mutates the overlay and records an undo op, and a
//! disconnect handler that consumes the undo in reverse.

use crate::error::RuleError;
use crate::safemath::{safe_add, safe_div, safe_mul, safe_sub};
use crate::ser::{ByteReader, ByteWriter, Error, Readable, Writeable, RECORD_VERSION};
use crate::txn::{
	CoinLockupMetadata, CoinLockupTransferMetadata, CoinUnlockMetadata,
	UpdateLockupParamsMetadata,
};
use crate::types::{fits_u64, Pkid, PubKey, TimestampNanos, BASIS_POINTS_PER_UNIT, NANOS_PER_YEAR, U256};
use crate::undo::UndoOp;
use crate::view::{ConnectContext, UtxoView};
use crate::{ChainError, Result};

/// Who may move a creator's locked coins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferRestriction {
	Unrestricted,
	ProfileOwnerOnly,
	DaoMembersOnly,
	/// Terminal: once set, no further restriction changes are allowed.
	PermanentlyUnrestricted,
}

impl TransferRestriction {
	pub fn to_u8(self) -> u8 {
		match self {
			TransferRestriction::Unrestricted => 0,
			TransferRestriction::ProfileOwnerOnly => 1,
			TransferRestriction::DaoMembersOnly => 2,
			TransferRestriction::PermanentlyUnrestricted => 3,
		}
	}

	pub fn from_u8(v: u8) -> Option<Self> {
		match v {
			0 => Some(TransferRestriction::Unrestricted),
			1 => Some(TransferRestriction::ProfileOwnerOnly),
			2 => Some(TransferRestriction::DaoMembersOnly),
			3 => Some(TransferRestriction::PermanentlyUnrestricted),
			_ => None,
		}
	}
}

/// The slice of a creator profile the lockup engine cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEntry {
	pub pkid: Pkid,
	pub lockup_transfer_restriction: TransferRestriction,
}

impl Writeable for ProfileEntry {
	fn write(&self, writer: &mut ByteWriter) {
		writer.write_u8(RECORD_VERSION);
		writer.write_fixed(self.pkid.as_bytes());
		writer.write_u8(self.lockup_transfer_restriction.to_u8());
	}
}

impl Readable for ProfileEntry {
	fn read(reader: &mut ByteReader<'_>) -> std::result::Result<Self, Error> {
		reader.read_version()?;
		let pkid = Pkid::from_bytes(reader.read_fixed(33)?)
			.ok_or_else(|| Error::Corrupted("bad profile pkid".to_string()))?;
		let restriction = TransferRestriction::from_u8(reader.read_u8()?)
			.ok_or_else(|| Error::Corrupted("bad transfer restriction".to_string()))?;
		Ok(Self {
			pkid,
			lockup_transfer_restriction: restriction,
		})
	}
}

/// A time-locked balance, keyed by (hodler, creator, unlock timestamp).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedBalanceEntry {
	pub hodler: Pkid,
	pub creator: Pkid,
	pub unlock_timestamp_nanos: TimestampNanos,
	pub balance: U256,
}

impl LockedBalanceEntry {
	/// Zero balances are deleted on flush rather than persisted.
	pub fn is_empty(&self) -> bool {
		self.balance.is_zero()
	}
}

impl Writeable for LockedBalanceEntry {
	fn write(&self, writer: &mut ByteWriter) {
		writer.write_u8(RECORD_VERSION);
		writer.write_fixed(self.hodler.as_bytes());
		writer.write_fixed(self.creator.as_bytes());
		writer.write_i64(self.unlock_timestamp_nanos);
		writer.write_u256_var(&self.balance);
	}
}

impl Readable for LockedBalanceEntry {
	fn read(reader: &mut ByteReader<'_>) -> std::result::Result<Self, Error> {
		reader.read_version()?;
		let hodler = Pkid::from_bytes(reader.read_fixed(33)?)
			.ok_or_else(|| Error::Corrupted("bad hodler pkid".to_string()))?;
		let creator = Pkid::from_bytes(reader.read_fixed(33)?)
			.ok_or_else(|| Error::Corrupted("bad creator pkid".to_string()))?;
		let unlock_timestamp_nanos = reader.read_i64()?;
		let balance = reader.read_u256_var()?;
		Ok(Self {
			hodler,
			creator,
			unlock_timestamp_nanos,
			balance,
		})
	}
}

/// One (duration, APY) coordinate of a creator's yield curve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YieldCurvePoint {
	pub creator: Pkid,
	pub lockup_duration_nanos: TimestampNanos,
	pub apy_basis_points: u64,
}

impl Writeable for YieldCurvePoint {
	fn write(&self, writer: &mut ByteWriter) {
		writer.write_u8(RECORD_VERSION);
		writer.write_fixed(self.creator.as_bytes());
		writer.write_i64(self.lockup_duration_nanos);
		writer.write_uvarint(self.apy_basis_points);
	}
}

impl Readable for YieldCurvePoint {
	fn read(reader: &mut ByteReader<'_>) -> std::result::Result<Self, Error> {
		reader.read_version()?;
		let creator = Pkid::from_bytes(reader.read_fixed(33)?)
			.ok_or_else(|| Error::Corrupted("bad creator pkid".to_string()))?;
		let lockup_duration_nanos = reader.read_i64()?;
		let apy_basis_points = reader.read_uvarint()?;
		Ok(Self {
			creator,
			lockup_duration_nanos,
			apy_basis_points,
		})
	}
}

/// Select the two local points around `duration`: the highest-duration point
/// strictly below it and the lowest-duration point at or above it. Absent
/// sides are modeled with i64::MIN / i64::MAX sentinels so that one missing
/// side never poisons the comparison.
pub fn select_local_yield_curve_points(
	points: &[YieldCurvePoint],
	duration: TimestampNanos,
) -> (Option<&YieldCurvePoint>, Option<&YieldCurvePoint>) {
	let mut left: Option<&YieldCurvePoint> = None;
	let mut right: Option<&YieldCurvePoint> = None;
	let mut left_duration = i64::MIN;
	let mut right_duration = i64::MAX;
	for point in points {
		if point.lockup_duration_nanos < duration && point.lockup_duration_nanos > left_duration {
			left_duration = point.lockup_duration_nanos;
			left = Some(point);
		}
		if point.lockup_duration_nanos >= duration && point.lockup_duration_nanos < right_duration {
			right_duration = point.lockup_duration_nanos;
			right = Some(point);
		}
	}
	(left, right)
}

/// Simple interest, floored:
/// `amount * apy_bps * duration / (NANOS_PER_YEAR * 10_000)`.
/// Intermediate overflow surfaces as `YieldOverflow`.
pub fn compute_lockup_yield(
	amount: U256,
	apy_basis_points: u64,
	duration_nanos: TimestampNanos,
) -> std::result::Result<U256, RuleError> {
	if apy_basis_points == 0 || duration_nanos <= 0 {
		return Ok(U256::zero());
	}
	let numerator = safe_mul(amount, U256::from(apy_basis_points))
		.and_then(|n| safe_mul(n, U256::from(duration_nanos as u64)))
		.map_err(|_| RuleError::YieldOverflow)?;
	// NANOS_PER_YEAR * 10_000 exceeds u64 but not u256
	let denominator = U256::from(NANOS_PER_YEAR as u64) * U256::from(BASIS_POINTS_PER_UNIT);
	safe_div(numerator, denominator)
}

impl UtxoView {
	fn check_lockups_live(&mut self, ctx: &ConnectContext) -> Result<()> {
		let params = self.get_global_params()?;
		if ctx.block_height < params.lockup_fork_height {
			return Err(RuleError::LockupsNotLive.into());
		}
		Ok(())
	}

	fn creator_pkid_checked(&mut self, creator_public_key: &PubKey) -> Result<Pkid> {
		if creator_public_key.is_zero() {
			return Ok(Pkid::zero());
		}
		let creator = Pkid::from_pub_key(creator_public_key);
		if self.get_profile(&creator)?.is_none() {
			return Err(RuleError::ProfileMissing.into());
		}
		Ok(creator)
	}

	pub fn connect_coin_lockup(
		&mut self,
		transactor: &PubKey,
		meta: &CoinLockupMetadata,
		ctx: &ConnectContext,
	) -> Result<UndoOp> {
		self.check_lockups_live(ctx)?;
		if meta.amount.is_zero() {
			return Err(RuleError::ZeroAmount.into());
		}
		if meta.unlock_timestamp_nanos <= ctx.block_timestamp_nanos {
			return Err(RuleError::UnlockTimestampNotInFuture.into());
		}
		let creator = self.creator_pkid_checked(&meta.creator_public_key)?;
		if creator.is_zero() && !fits_u64(&meta.amount) {
			return Err(RuleError::AmountTooLarge.into());
		}

		let hodler = Pkid::from_pub_key(transactor);
		let prev_transactor_balance = self.spend_balance(&hodler, &creator, meta.amount)?;

		// pick the yield rate off the creator's curve; the earning duration
		// is the left point's duration, so a lockup between two points locks
		// longer than it earns
		let duration = meta.unlock_timestamp_nanos - ctx.block_timestamp_nanos;
		let curve = self.get_yield_curve(&creator)?;
		let (left, right) = select_local_yield_curve_points(&curve, duration);
		let (apy_basis_points, earning_duration) = match (left, right) {
			(_, Some(right)) if right.lockup_duration_nanos == duration => {
				(right.apy_basis_points, duration)
			}
			(Some(left), _) => (left.apy_basis_points, left.lockup_duration_nanos),
			_ => (0, 0),
		};
		let lockup_yield = compute_lockup_yield(meta.amount, apy_basis_points, earning_duration)?;

		let total = safe_add(meta.amount, lockup_yield)?;
		if creator.is_zero() && !fits_u64(&total) {
			return Err(RuleError::AmountTooLarge.into());
		}

		// consolidate with any existing entry at the same unlock timestamp
		let prev_locked_balance =
			self.get_locked_balance_entry(&hodler, &creator, meta.unlock_timestamp_nanos)?;
		let consolidated = match &prev_locked_balance {
			Some(existing) => safe_add(existing.balance, total)?,
			None => total,
		};
		// the consolidated entry must stay unlockable, so the native cap
		// applies to the sum as well
		if creator.is_zero() && !fits_u64(&consolidated) {
			return Err(RuleError::AmountTooLarge.into());
		}
		self.set_locked_balance_entry(LockedBalanceEntry {
			hodler,
			creator,
			unlock_timestamp_nanos: meta.unlock_timestamp_nanos,
			balance: consolidated,
		});

		Ok(UndoOp::CoinLockup {
			prev_transactor_balance,
			prev_locked_balance,
		})
	}

	pub fn disconnect_coin_lockup(
		&mut self,
		transactor: &PubKey,
		meta: &CoinLockupMetadata,
		op: UndoOp,
	) -> Result<()> {
		let UndoOp::CoinLockup {
			prev_transactor_balance,
			prev_locked_balance,
		} = op
		else {
			return Err(ChainError::Invariant(
				"coin lockup disconnect consumed a mismatched undo op".to_string(),
			));
		};
		let hodler = Pkid::from_pub_key(transactor);
		let creator = if meta.creator_public_key.is_zero() {
			Pkid::zero()
		} else {
			Pkid::from_pub_key(&meta.creator_public_key)
		};

		let current = self
			.get_locked_balance_entry(&hodler, &creator, meta.unlock_timestamp_nanos)?
			.ok_or_else(|| {
				ChainError::Invariant("lockup disconnect finds no locked entry".to_string())
			})?;
		if let Some(prev) = &prev_locked_balance {
			if current.balance < prev.balance {
				return Err(ChainError::Invariant(
					"lockup disconnect would increase locked money".to_string(),
				));
			}
		}
		self.restore_locked_balance_entry(
			&hodler,
			&creator,
			meta.unlock_timestamp_nanos,
			prev_locked_balance,
		);
		self.restore_balance_entry(&hodler, &creator, prev_transactor_balance);
		Ok(())
	}

	pub fn connect_update_lockup_params(
		&mut self,
		transactor: &PubKey,
		meta: &UpdateLockupParamsMetadata,
		ctx: &ConnectContext,
	) -> Result<UndoOp> {
		self.check_lockups_live(ctx)?;
		if meta.lockup_duration_nanos < 0 {
			return Err(RuleError::InvalidLockupDuration.into());
		}
		let params = self.get_global_params()?;
		// the designated param updater curates the native coin's curve
		let creator = if *transactor == params.lockup_param_updater {
			Pkid::zero()
		} else {
			Pkid::from_pub_key(transactor)
		};

		let mut touched_point_duration = None;
		let mut prev_point = None;
		if meta.lockup_duration_nanos > 0 {
			let existing =
				self.get_yield_curve_point(&creator, meta.lockup_duration_nanos)?;
			if meta.remove_yield_curve_point {
				if existing.is_none() {
					return Err(RuleError::YieldCurvePointMissing.into());
				}
				self.delete_yield_curve_point(&creator, meta.lockup_duration_nanos);
			} else {
				self.set_yield_curve_point(YieldCurvePoint {
					creator,
					lockup_duration_nanos: meta.lockup_duration_nanos,
					apy_basis_points: meta.lockup_yield_apy_basis_points,
				});
			}
			touched_point_duration = Some(meta.lockup_duration_nanos);
			prev_point = existing;
		}

		let mut prev_restriction = None;
		if meta.new_lockup_transfer_restrictions {
			let restriction = TransferRestriction::from_u8(meta.lockup_transfer_restriction)
				.ok_or(RuleError::InvalidTransferRestriction)?;
			let mut profile = self
				.get_profile(&creator)?
				.ok_or(RuleError::ProfileMissing)?;
			if profile.lockup_transfer_restriction
				== TransferRestriction::PermanentlyUnrestricted
			{
				return Err(RuleError::TransferRestrictionPermanent.into());
			}
			prev_restriction = Some(profile.lockup_transfer_restriction);
			profile.lockup_transfer_restriction = restriction;
			self.set_profile(profile);
		}

		Ok(UndoOp::UpdateLockupParams {
			creator,
			touched_point_duration,
			prev_point,
			prev_restriction,
		})
	}

	pub fn disconnect_update_lockup_params(&mut self, op: UndoOp) -> Result<()> {
		let UndoOp::UpdateLockupParams {
			creator,
			touched_point_duration,
			prev_point,
			prev_restriction,
		} = op
		else {
			return Err(ChainError::Invariant(
				"update lockup params disconnect consumed a mismatched undo op".to_string(),
			));
		};
		if let Some(duration) = touched_point_duration {
			match prev_point {
				Some(point) => self.set_yield_curve_point(point),
				None => self.delete_yield_curve_point(&creator, duration),
			}
		}
		if let Some(restriction) = prev_restriction {
			let mut profile = self.get_profile(&creator)?.ok_or_else(|| {
				ChainError::Invariant(
					"restriction disconnect finds no profile".to_string(),
				)
			})?;
			profile.lockup_transfer_restriction = restriction;
			self.set_profile(profile);
		}
		Ok(())
	}

	pub fn connect_coin_lockup_transfer(
		&mut self,
		transactor: &PubKey,
		meta: &CoinLockupTransferMetadata,
		ctx: &ConnectContext,
	) -> Result<UndoOp> {
		self.check_lockups_live(ctx)?;
		if meta.amount.is_zero() {
			return Err(RuleError::ZeroAmount.into());
		}
		let sender = Pkid::from_pub_key(transactor);
		let recipient = Pkid::from_pub_key(&meta.recipient_public_key);
		if sender == recipient {
			return Err(RuleError::SenderIsRecipient.into());
		}
		let creator = self.creator_pkid_checked(&meta.creator_public_key)?;
		if creator.is_zero() && !fits_u64(&meta.amount) {
			return Err(RuleError::AmountTooLarge.into());
		}

		if !creator.is_zero() {
			let profile = self.get_profile(&creator)?.ok_or(RuleError::ProfileMissing)?;
			match profile.lockup_transfer_restriction {
				TransferRestriction::Unrestricted
				| TransferRestriction::PermanentlyUnrestricted => {}
				TransferRestriction::ProfileOwnerOnly => {
					if sender != creator {
						return Err(RuleError::TransferRestricted.into());
					}
				}
				TransferRestriction::DaoMembersOnly => {
					// which party must hold the coin is a configurable policy
					let params = self.get_global_params()?;
					let member = match params.dao_member_check {
						crate::epoch::DaoMemberCheck::Recipient => recipient,
						crate::epoch::DaoMemberCheck::Sender => sender,
					};
					let holds = self
						.get_balance_entry(&member, &creator)?
						.map_or(false, |entry| !entry.balance.is_zero());
					if !holds {
						return Err(RuleError::TransferRestricted.into());
					}
				}
			}
		}

		let prev_sender_entry = self
			.get_locked_balance_entry(&sender, &creator, meta.unlock_timestamp_nanos)?
			.ok_or(RuleError::InsufficientLockedBalance)?;
		if prev_sender_entry.balance < meta.amount {
			return Err(RuleError::InsufficientLockedBalance.into());
		}
		let sender_balance = safe_sub(prev_sender_entry.balance, meta.amount)?;
		if sender_balance.is_zero() {
			self.delete_locked_balance_entry(&sender, &creator, meta.unlock_timestamp_nanos);
		} else {
			self.set_locked_balance_entry(LockedBalanceEntry {
				balance: sender_balance,
				..prev_sender_entry.clone()
			});
		}

		let prev_recipient_entry =
			self.get_locked_balance_entry(&recipient, &creator, meta.unlock_timestamp_nanos)?;
		let recipient_balance = match &prev_recipient_entry {
			Some(existing) => safe_add(existing.balance, meta.amount)?,
			None => meta.amount,
		};
		if creator.is_zero() && !fits_u64(&recipient_balance) {
			return Err(RuleError::AmountTooLarge.into());
		}
		self.set_locked_balance_entry(LockedBalanceEntry {
			hodler: recipient,
			creator,
			unlock_timestamp_nanos: meta.unlock_timestamp_nanos,
			balance: recipient_balance,
		});

		Ok(UndoOp::CoinLockupTransfer {
			prev_sender_entry,
			prev_recipient_entry,
		})
	}

	pub fn disconnect_coin_lockup_transfer(
		&mut self,
		transactor: &PubKey,
		meta: &CoinLockupTransferMetadata,
		op: UndoOp,
	) -> Result<()> {
		let UndoOp::CoinLockupTransfer {
			prev_sender_entry,
			prev_recipient_entry,
		} = op
		else {
			return Err(ChainError::Invariant(
				"locked transfer disconnect consumed a mismatched undo op".to_string(),
			));
		};
		let sender = Pkid::from_pub_key(transactor);
		let recipient = Pkid::from_pub_key(&meta.recipient_public_key);
		let creator = if meta.creator_public_key.is_zero() {
			Pkid::zero()
		} else {
			Pkid::from_pub_key(&meta.creator_public_key)
		};

		let current_recipient = self
			.get_locked_balance_entry(&recipient, &creator, meta.unlock_timestamp_nanos)?;
		if let (Some(current), Some(prev)) = (&current_recipient, &prev_recipient_entry) {
			if current.balance < prev.balance {
				return Err(ChainError::Invariant(
					"locked transfer disconnect would increase recipient money".to_string(),
				));
			}
		}
		self.restore_locked_balance_entry(
			&recipient,
			&creator,
			meta.unlock_timestamp_nanos,
			prev_recipient_entry,
		);
		self.restore_locked_balance_entry(
			&sender,
			&creator,
			meta.unlock_timestamp_nanos,
			Some(prev_sender_entry),
		);
		Ok(())
	}

	pub fn connect_coin_unlock(
		&mut self,
		transactor: &PubKey,
		meta: &CoinUnlockMetadata,
		ctx: &ConnectContext,
	) -> Result<UndoOp> {
		self.check_lockups_live(ctx)?;
		let creator = self.creator_pkid_checked(&meta.creator_public_key)?;
		let hodler = Pkid::from_pub_key(transactor);

		let prev_locked_entries = self.get_unlockable_locked_balances(
			&hodler,
			&creator,
			ctx.block_timestamp_nanos,
		)?;
		if prev_locked_entries.is_empty() {
			return Err(RuleError::NoUnlockableBalance.into());
		}

		let mut total = U256::zero();
		for entry in &prev_locked_entries {
			total = safe_add(total, entry.balance)?;
		}
		for entry in &prev_locked_entries {
			self.delete_locked_balance_entry(
				&hodler,
				&creator,
				entry.unlock_timestamp_nanos,
			);
		}

		if creator.is_zero() && !fits_u64(&total) {
			return Err(RuleError::AmountTooLarge.into());
		}
		let prev_balance_entry = self.credit_balance(&hodler, &creator, total)?;

		Ok(UndoOp::CoinUnlock {
			prev_locked_entries,
			prev_balance_entry,
		})
	}

	pub fn disconnect_coin_unlock(
		&mut self,
		transactor: &PubKey,
		meta: &CoinUnlockMetadata,
		op: UndoOp,
	) -> Result<()> {
		let UndoOp::CoinUnlock {
			prev_locked_entries,
			prev_balance_entry,
		} = op
		else {
			return Err(ChainError::Invariant(
				"coin unlock disconnect consumed a mismatched undo op".to_string(),
			));
		};
		let hodler = Pkid::from_pub_key(transactor);
		let creator = if meta.creator_public_key.is_zero() {
			Pkid::zero()
		} else {
			Pkid::from_pub_key(&meta.creator_public_key)
		};

		for entry in &prev_locked_entries {
			// each entry was tombstoned by the unlock; finding one that has
			// since grown means we are disconnecting out of order
			if self
				.get_locked_balance_entry(&hodler, &creator, entry.unlock_timestamp_nanos)?
				.is_some()
			{
				return Err(ChainError::Invariant(
					"unlock disconnect would re-credit a regrown locked balance".to_string(),
				));
			}
			self.set_locked_balance_entry(entry.clone());
		}

		if let Some(prev) = &prev_balance_entry {
			let current = self.get_balance_entry(&hodler, &creator)?;
			if current.map_or(true, |entry| entry.balance < prev.balance) {
				return Err(ChainError::Invariant(
					"unlock disconnect would increase liquid money".to_string(),
				));
			}
		}
		self.restore_balance_entry(&hodler, &creator, prev_balance_entry);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ser;

	fn pkid(b: u8) -> Pkid {
		Pkid([b; 33])
	}

	#[test]
	fn test_entry_round_trips() {
		let locked = LockedBalanceEntry {
			hodler: pkid(1),
			creator: pkid(2),
			unlock_timestamp_nanos: 12_345,
			balance: U256::from(999u64),
		};
		let decoded: LockedBalanceEntry = ser::from_bytes(&ser::to_bytes(&locked)).unwrap();
		assert_eq!(locked, decoded);

		let point = YieldCurvePoint {
			creator: pkid(3),
			lockup_duration_nanos: 777,
			apy_basis_points: 350,
		};
		let decoded: YieldCurvePoint = ser::from_bytes(&ser::to_bytes(&point)).unwrap();
		assert_eq!(point, decoded);

		let profile = ProfileEntry {
			pkid: pkid(4),
			lockup_transfer_restriction: TransferRestriction::DaoMembersOnly,
		};
		let decoded: ProfileEntry = ser::from_bytes(&ser::to_bytes(&profile)).unwrap();
		assert_eq!(profile, decoded);
	}

	#[test]
	fn test_restriction_values() {
		for v in 0..4u8 {
			assert_eq!(TransferRestriction::from_u8(v).unwrap().to_u8(), v);
		}
		assert_eq!(TransferRestriction::from_u8(4), None);
	}

	fn curve(creator: Pkid, points: &[(i64, u64)]) -> Vec<YieldCurvePoint> {
		points
			.iter()
			.map(|(duration, apy)| YieldCurvePoint {
				creator,
				lockup_duration_nanos: *duration,
				apy_basis_points: *apy,
			})
			.collect()
	}

	#[test]
	fn test_select_local_points() {
		let c = pkid(1);
		let points = curve(c, &[(100, 10), (200, 20), (300, 30)]);

		let (left, right) = select_local_yield_curve_points(&points, 250);
		assert_eq!(left.unwrap().lockup_duration_nanos, 200);
		assert_eq!(right.unwrap().lockup_duration_nanos, 300);

		// exact hit lands on the right point
		let (left, right) = select_local_yield_curve_points(&points, 200);
		assert_eq!(left.unwrap().lockup_duration_nanos, 100);
		assert_eq!(right.unwrap().lockup_duration_nanos, 200);

		// below the whole curve: no left
		let (left, right) = select_local_yield_curve_points(&points, 50);
		assert!(left.is_none());
		assert_eq!(right.unwrap().lockup_duration_nanos, 100);

		// above the whole curve: no right
		let (left, right) = select_local_yield_curve_points(&points, 500);
		assert_eq!(left.unwrap().lockup_duration_nanos, 300);
		assert!(right.is_none());

		let (left, right) = select_local_yield_curve_points(&[], 500);
		assert!(left.is_none());
		assert!(right.is_none());
	}

	#[test]
	fn test_yield_floor_law() {
		// 1_000_000 at 350 bps for 12 months of a 365-day year
		let twelve_months = NANOS_PER_YEAR;
		let earned =
			compute_lockup_yield(U256::from(1_000_000u64), 350, twelve_months).unwrap();
		assert_eq!(earned, U256::from(35_000u64));

		// floor: one nanosecond earns nothing
		let dust = compute_lockup_yield(U256::from(1_000_000u64), 350, 1).unwrap();
		assert_eq!(dust, U256::zero());

		// zero apy or non-positive duration earn nothing
		assert_eq!(
			compute_lockup_yield(U256::from(5u64), 0, twelve_months).unwrap(),
			U256::zero()
		);
		assert_eq!(compute_lockup_yield(U256::from(5u64), 10, 0).unwrap(), U256::zero());
	}

	#[test]
	fn test_yield_overflow_is_reported() {
		let err = compute_lockup_yield(U256::MAX, u64::MAX, NANOS_PER_YEAR).unwrap_err();
		assert_eq!(err, RuleError::YieldOverflow);
	}
}
