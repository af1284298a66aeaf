pub mod bls;
pub mod hash;

use thiserror::Error;

/// Errors surfaced by the crypto primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
	#[error("invalid key material: {0}")]
	InvalidKey(String),
	#[error("signature verification failed")]
	InvalidSignature,
	#[error("invalid hash format: {0}")]
	InvalidHash(String),
	#[error("aggregation failed: {0}")]
	AggregationFailed(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;

// re-export commonly used types
pub use bls::{
	aggregate_public_keys, aggregate_signatures, aggregate_verify, BlsPublicKey, BlsSecretKey,
	BlsSignature,
};
pub use hash::{sha256, Hash256};
