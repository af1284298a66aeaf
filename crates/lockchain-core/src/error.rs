use lockchain_crypto::CryptoError;
use lockchain_storage::StorageError;
use thiserror::Error;

/// Deterministic, consensus-relevant rule violations. A `RuleError` rejects
/// the current transaction or block and must never leave a side effect in
/// the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
	// money math
	#[error("numeric overflow")]
	NumericOverflow,
	#[error("yield computation overflowed")]
	YieldOverflow,

	// lockup engine
	#[error("lockup transactions are not live at this height")]
	LockupsNotLive,
	#[error("amount must be positive")]
	ZeroAmount,
	#[error("unlock timestamp must be in the future")]
	UnlockTimestampNotInFuture,
	#[error("profile does not exist")]
	ProfileMissing,
	#[error("amount exceeds the 64-bit native coin ceiling")]
	AmountTooLarge,
	#[error("insufficient balance")]
	InsufficientBalance,
	#[error("insufficient locked balance")]
	InsufficientLockedBalance,
	#[error("yield curve point does not exist")]
	YieldCurvePointMissing,
	#[error("lockup duration is invalid")]
	InvalidLockupDuration,
	#[error("invalid transfer restriction value")]
	InvalidTransferRestriction,
	#[error("transfer restriction is permanently fixed")]
	TransferRestrictionPermanent,
	#[error("transfer restricted by the coin's profile")]
	TransferRestricted,
	#[error("sender and recipient must differ")]
	SenderIsRecipient,
	#[error("no unlockable balance")]
	NoUnlockableBalance,

	// validator registry
	#[error("validator does not exist")]
	ValidatorMissing,
	#[error("validator must advertise at least one domain")]
	InvalidValidatorDomains,

	// block pipeline
	#[error("block already known")]
	BlockAlreadyExists,
	#[error("invalid block version")]
	InvalidBlockVersion,
	#[error("malformed block header")]
	InvalidBlockHeader,
	#[error("transaction commitment does not match the block body")]
	InvalidTxnCommitment,
	#[error("block timestamp is not after its parent")]
	TimestampNotMonotonic,
	#[error("block height does not extend its parent")]
	InvalidBlockHeight,
	#[error("block view is not past the committed tip")]
	StaleView,
	#[error("block must carry exactly one of a vote QC or a timeout QC")]
	MissingQuorumCert,
	#[error("vote QC view must directly follow the parent view")]
	InvalidVoteQcView,
	#[error("timeout QC view must skip past the parent view")]
	InvalidTimeoutQcView,
	#[error("block proposer is not the scheduled leader")]
	InvalidProposer,
	#[error("quorum certificate failed validation")]
	InvalidQuorumCert,
	#[error("quorum certificate carries less than 2/3 of snapshot stake")]
	InsufficientQuorumStake,

	// consensus glue
	#[error("timeout view is stale")]
	StaleTimeoutView,
	#[error("malformed consensus event")]
	MalformedConsensusEvent,
}

/// Top-level error for the state-transition core.
#[derive(Error, Debug)]
pub enum ChainError {
	#[error("rule violation: {0}")]
	Rule(#[from] RuleError),

	#[error("storage error: {0}")]
	Storage(#[from] StorageError),

	#[error("serialization error: {0}")]
	Ser(#[from] crate::ser::Error),

	#[error("crypto error: {0}")]
	Crypto(#[from] CryptoError),

	/// A violated internal invariant. Treated as a bug; the node aborts
	/// rather than continue with inconsistent state.
	#[error("invariant violated: {0}")]
	Invariant(String),
}

impl ChainError {
	/// True for deterministic rejections that leave the node healthy.
	pub fn is_rule_error(&self) -> bool {
		matches!(self, ChainError::Rule(_))
	}
}
