//! Persisted key layout. Each logical index owns a unique prefix byte; the
//! field order inside a key is chosen so the range scans the node needs fall
//! out of the natural key order. Prefix values are fixed per deployment and
//! must never change.

use crate::types::{EpochNumber, Pkid, TimestampNanos, U256};

pub const PREFIX_BALANCE: u8 = 0x01;
pub const PREFIX_LOCKED_BALANCE: u8 = 0x02;
pub const PREFIX_YIELD_CURVE_POINT: u8 = 0x03;
pub const PREFIX_PROFILE: u8 = 0x04;
pub const PREFIX_VALIDATOR_BY_PKID: u8 = 0x05;
pub const PREFIX_VALIDATOR_BY_STAKE: u8 = 0x06;
pub const PREFIX_GLOBAL_STAKE: u8 = 0x07;
pub const PREFIX_CURRENT_EPOCH: u8 = 0x08;
pub const PREFIX_GLOBAL_PARAMS: u8 = 0x09;
pub const PREFIX_SNAPSHOT_GLOBAL_PARAMS: u8 = 0x0a;
pub const PREFIX_SNAPSHOT_VALIDATOR: u8 = 0x0b;
pub const PREFIX_SNAPSHOT_TOP_VALIDATORS: u8 = 0x0c;
pub const PREFIX_SNAPSHOT_LEADER_SCHEDULE: u8 = 0x0d;
pub const PREFIX_SNAPSHOT_GLOBAL_ACTIVE_STAKE: u8 = 0x0e;
pub const PREFIX_COMMITTED_TIP: u8 = 0x0f;

fn u256_be(v: &U256) -> [u8; 32] {
	let mut out = [0u8; 32];
	v.to_big_endian(&mut out);
	out
}

pub fn balance_key(hodler: &Pkid, creator: &Pkid) -> Vec<u8> {
	let mut key = Vec::with_capacity(1 + 33 + 33);
	key.push(PREFIX_BALANCE);
	key.extend_from_slice(hodler.as_bytes());
	key.extend_from_slice(creator.as_bytes());
	key
}

pub fn locked_balance_key(hodler: &Pkid, creator: &Pkid, unlock_ts: TimestampNanos) -> Vec<u8> {
	let mut key = locked_balance_prefix(hodler, creator);
	key.extend_from_slice(&unlock_ts.to_be_bytes());
	key
}

/// Prefix covering every locked balance of one (hodler, creator) pair.
/// Scanning it yields entries in ascending unlock-timestamp order.
pub fn locked_balance_prefix(hodler: &Pkid, creator: &Pkid) -> Vec<u8> {
	let mut key = Vec::with_capacity(1 + 33 + 33 + 8);
	key.push(PREFIX_LOCKED_BALANCE);
	key.extend_from_slice(hodler.as_bytes());
	key.extend_from_slice(creator.as_bytes());
	key
}

pub fn yield_curve_point_key(creator: &Pkid, duration_nanos: TimestampNanos) -> Vec<u8> {
	let mut key = yield_curve_prefix(creator);
	key.extend_from_slice(&duration_nanos.to_be_bytes());
	key
}

pub fn yield_curve_prefix(creator: &Pkid) -> Vec<u8> {
	let mut key = Vec::with_capacity(1 + 33 + 8);
	key.push(PREFIX_YIELD_CURVE_POINT);
	key.extend_from_slice(creator.as_bytes());
	key
}

pub fn profile_key(pkid: &Pkid) -> Vec<u8> {
	let mut key = Vec::with_capacity(1 + 33);
	key.push(PREFIX_PROFILE);
	key.extend_from_slice(pkid.as_bytes());
	key
}

pub fn validator_by_pkid_key(pkid: &Pkid) -> Vec<u8> {
	let mut key = Vec::with_capacity(1 + 33);
	key.push(PREFIX_VALIDATOR_BY_PKID);
	key.extend_from_slice(pkid.as_bytes());
	key
}

pub fn validator_by_pkid_prefix() -> Vec<u8> {
	vec![PREFIX_VALIDATOR_BY_PKID]
}

/// Stake index key: big-endian stake, then inverted creation height, then
/// pkid. A reverse scan therefore yields highest stake first with the oldest
/// validator first among stake ties.
pub fn validator_by_stake_key(stake: &U256, created_at_height: u32, pkid: &Pkid) -> Vec<u8> {
	let mut key = Vec::with_capacity(1 + 32 + 4 + 33);
	key.push(PREFIX_VALIDATOR_BY_STAKE);
	key.extend_from_slice(&u256_be(stake));
	key.extend_from_slice(&(u32::MAX - created_at_height).to_be_bytes());
	key.extend_from_slice(pkid.as_bytes());
	key
}

pub fn validator_by_stake_prefix() -> Vec<u8> {
	vec![PREFIX_VALIDATOR_BY_STAKE]
}

pub fn global_stake_key() -> Vec<u8> {
	vec![PREFIX_GLOBAL_STAKE]
}

pub fn current_epoch_key() -> Vec<u8> {
	vec![PREFIX_CURRENT_EPOCH]
}

pub fn global_params_key() -> Vec<u8> {
	vec![PREFIX_GLOBAL_PARAMS]
}

pub fn committed_tip_key() -> Vec<u8> {
	vec![PREFIX_COMMITTED_TIP]
}

pub fn snapshot_global_params_key(epoch: EpochNumber) -> Vec<u8> {
	let mut key = Vec::with_capacity(1 + 8);
	key.push(PREFIX_SNAPSHOT_GLOBAL_PARAMS);
	key.extend_from_slice(&epoch.to_be_bytes());
	key
}

pub fn snapshot_validator_key(epoch: EpochNumber, pkid: &Pkid) -> Vec<u8> {
	let mut key = Vec::with_capacity(1 + 8 + 33);
	key.push(PREFIX_SNAPSHOT_VALIDATOR);
	key.extend_from_slice(&epoch.to_be_bytes());
	key.extend_from_slice(pkid.as_bytes());
	key
}

pub fn snapshot_top_validators_key(epoch: EpochNumber) -> Vec<u8> {
	let mut key = Vec::with_capacity(1 + 8);
	key.push(PREFIX_SNAPSHOT_TOP_VALIDATORS);
	key.extend_from_slice(&epoch.to_be_bytes());
	key
}

pub fn snapshot_leader_schedule_key(epoch: EpochNumber, slot: u16) -> Vec<u8> {
	let mut key = Vec::with_capacity(1 + 8 + 2);
	key.push(PREFIX_SNAPSHOT_LEADER_SCHEDULE);
	key.extend_from_slice(&epoch.to_be_bytes());
	key.extend_from_slice(&slot.to_be_bytes());
	key
}

pub fn snapshot_leader_schedule_prefix(epoch: EpochNumber) -> Vec<u8> {
	let mut key = Vec::with_capacity(1 + 8);
	key.push(PREFIX_SNAPSHOT_LEADER_SCHEDULE);
	key.extend_from_slice(&epoch.to_be_bytes());
	key
}

pub fn snapshot_global_active_stake_key(epoch: EpochNumber) -> Vec<u8> {
	let mut key = Vec::with_capacity(1 + 8);
	key.push(PREFIX_SNAPSHOT_GLOBAL_ACTIVE_STAKE);
	key.extend_from_slice(&epoch.to_be_bytes());
	key
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_locked_balance_keys_order_by_timestamp() {
		let hodler = Pkid([1u8; 33]);
		let creator = Pkid([2u8; 33]);
		let early = locked_balance_key(&hodler, &creator, 100);
		let late = locked_balance_key(&hodler, &creator, 200);
		assert!(early < late);
		assert!(early.starts_with(&locked_balance_prefix(&hodler, &creator)));
	}

	#[test]
	fn test_stake_keys_order_by_stake_then_age() {
		let a = Pkid([1u8; 33]);
		let b = Pkid([2u8; 33]);

		// higher stake sorts later, so a reverse scan sees it first
		let small = validator_by_stake_key(&U256::from(10u8), 5, &a);
		let large = validator_by_stake_key(&U256::from(20u8), 5, &b);
		assert!(small < large);

		// equal stake: older validator (lower height) sorts later
		let young = validator_by_stake_key(&U256::from(10u8), 9, &a);
		let old = validator_by_stake_key(&U256::from(10u8), 3, &b);
		assert!(young < old);
	}
}
