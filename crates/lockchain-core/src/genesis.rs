//! Genesis configuration. A fresh pipeline pointed at an empty store seeds
//! balances, profiles, validators, global params, and epoch 0 from this.

use crate::epoch::GlobalParamsEntry;
use crate::lockup::TransferRestriction;
use crate::types::{PubKey, TimestampNanos};
use lockchain_crypto::BlsPublicKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisValidator {
	pub public_key: PubKey,
	pub voting_public_key: BlsPublicKey,
	pub domains: Vec<String>,
	/// Initial self-stake, denominated in the native coin.
	pub stake: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisConfig {
	pub timestamp_nanos: TimestampNanos,
	/// Pre-funded native balances.
	pub initial_balances: Vec<(PubKey, u64)>,
	/// Profiles seeded with an initial transfer restriction.
	pub seeded_profiles: Vec<(PubKey, u8)>,
	pub initial_validators: Vec<GenesisValidator>,
	pub global_params: GlobalParamsEntry,
}

impl Default for GenesisConfig {
	fn default() -> Self {
		Self {
			timestamp_nanos: 0,
			initial_balances: Vec::new(),
			seeded_profiles: Vec::new(),
			initial_validators: Vec::new(),
			global_params: GlobalParamsEntry::default(),
		}
	}
}

impl GenesisConfig {
	pub fn seeded_restriction(raw: u8) -> TransferRestriction {
		TransferRestriction::from_u8(raw).unwrap_or(TransferRestriction::Unrestricted)
	}
}
