//! Checked 256-bit arithmetic. Every arithmetic step touching user balances
//! or stake goes through these helpers so that overflow surfaces as a
//! deterministic rule error instead of silent wraparound.

use crate::error::RuleError;
use crate::types::U256;

pub fn safe_add(a: U256, b: U256) -> Result<U256, RuleError> {
	a.checked_add(b).ok_or(RuleError::NumericOverflow)
}

pub fn safe_sub(a: U256, b: U256) -> Result<U256, RuleError> {
	a.checked_sub(b).ok_or(RuleError::NumericOverflow)
}

pub fn safe_mul(a: U256, b: U256) -> Result<U256, RuleError> {
	a.checked_mul(b).ok_or(RuleError::NumericOverflow)
}

/// Checked division; division by zero is reported as `NumericOverflow`.
pub fn safe_div(a: U256, b: U256) -> Result<U256, RuleError> {
	a.checked_div(b).ok_or(RuleError::NumericOverflow)
}
