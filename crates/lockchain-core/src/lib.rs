pub mod balance;
pub mod block;
pub mod epoch;
pub mod error;
pub mod events;
pub mod genesis;
pub mod keys;
pub mod lockup;
pub mod pipeline;
pub mod safemath;
pub mod ser;
pub mod txn;
pub mod types;
pub mod undo;
pub mod validator;
pub mod view;

// Re-export commonly used types
pub use balance::BalanceEntry;
pub use block::{Block, BlockHeader, QuorumCert, SignerBitmap, TimeoutAggregateQc};
pub use epoch::{EpochEntry, GlobalParamsEntry};
pub use error::{ChainError, RuleError};
pub use genesis::GenesisConfig;
pub use lockup::{LockedBalanceEntry, ProfileEntry, TransferRestriction, YieldCurvePoint};
pub use pipeline::{ChainPipeline, ProcessOutcome};
pub use txn::{Transaction, TxnMeta};
pub use types::{BlockHash, Pkid, PubKey, U256};
pub use validator::{ValidatorEntry, ValidatorStatus};
pub use view::{ConnectContext, UtxoView};

// Convenient Result type for this crate
pub type Result<T> = std::result::Result<T, error::ChainError>;
