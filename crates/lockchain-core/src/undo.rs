//! Per-operation undo records. Every connect handler appends exactly one op
//! to the transaction's undo list; disconnect peels ops from the tail and
//! restores the captured prior entries.

use crate::balance::BalanceEntry;
use crate::lockup::{LockedBalanceEntry, TransferRestriction, YieldCurvePoint};
use crate::types::{Pkid, TimestampNanos};
use crate::validator::ValidatorEntry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOp {
	CoinLockup {
		prev_transactor_balance: Option<BalanceEntry>,
		prev_locked_balance: Option<LockedBalanceEntry>,
	},
	UpdateLockupParams {
		creator: Pkid,
		touched_point_duration: Option<TimestampNanos>,
		prev_point: Option<YieldCurvePoint>,
		prev_restriction: Option<TransferRestriction>,
	},
	CoinLockupTransfer {
		prev_sender_entry: LockedBalanceEntry,
		prev_recipient_entry: Option<LockedBalanceEntry>,
	},
	CoinUnlock {
		prev_locked_entries: Vec<LockedBalanceEntry>,
		prev_balance_entry: Option<BalanceEntry>,
	},
	RegisterValidator {
		prev_validator_entry: Option<ValidatorEntry>,
		prev_balance_entry: Option<BalanceEntry>,
	},
	UnregisterValidator {
		prev_validator_entry: ValidatorEntry,
		prev_balance_entry: Option<BalanceEntry>,
	},
}

impl UndoOp {
	pub fn kind(&self) -> &'static str {
		match self {
			UndoOp::CoinLockup { .. } => "coin_lockup",
			UndoOp::UpdateLockupParams { .. } => "update_lockup_params",
			UndoOp::CoinLockupTransfer { .. } => "coin_lockup_transfer",
			UndoOp::CoinUnlock { .. } => "coin_unlock",
			UndoOp::RegisterValidator { .. } => "register_validator",
			UndoOp::UnregisterValidator { .. } => "unregister_validator",
		}
	}
}
