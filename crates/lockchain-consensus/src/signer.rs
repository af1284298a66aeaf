//! Produces signed votes and timeouts from local consensus events.

use crate::messages::{TimeoutMessage, VoteMessage};
use lockchain_core::block::{timeout_signature_payload, vote_signature_payload, QuorumCert};
use lockchain_core::error::RuleError;
use lockchain_core::types::{BlockHash, BlockHeight, Pkid, View};
use lockchain_crypto::BlsSecretKey;

/// A well-formed tip the node is asked to vote on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteEvent {
	pub view: View,
	pub tip_height: BlockHeight,
	pub tip_hash: BlockHash,
}

/// A view the node is asked to time out of, with its current high QC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutEvent {
	pub view: View,
	pub high_qc: QuorumCert,
}

/// Owns the node's BLS voting key and signs consensus payloads. The
/// domain-separation opcodes baked into the payload builders prevent a
/// signature produced here from verifying as any other message kind.
pub struct ConsensusSigner {
	secret_key: BlsSecretKey,
	pkid: Pkid,
}

impl ConsensusSigner {
	pub fn new(secret_key: BlsSecretKey, pkid: Pkid) -> Self {
		Self { secret_key, pkid }
	}

	pub fn pkid(&self) -> &Pkid {
		&self.pkid
	}

	/// Sign a vote for the event's tip. Rejects degenerate events.
	pub fn vote(&self, event: &VoteEvent) -> Result<VoteMessage, RuleError> {
		if event.view == 0 || event.tip_hash.is_zero() {
			return Err(RuleError::MalformedConsensusEvent);
		}
		let payload = vote_signature_payload(event.view, &event.tip_hash);
		Ok(VoteMessage {
			view: event.view,
			block_hash: event.tip_hash,
			voter: self.pkid,
			signature: self.secret_key.sign(&payload),
		})
	}

	/// Sign a timeout for the event's view. Events behind the local view
	/// are stale and rejected.
	pub fn timeout(
		&self,
		event: &TimeoutEvent,
		current_view: View,
	) -> Result<TimeoutMessage, RuleError> {
		if event.view < current_view {
			return Err(RuleError::StaleTimeoutView);
		}
		let payload = timeout_signature_payload(event.view, event.high_qc.view);
		Ok(TimeoutMessage {
			view: event.view,
			high_qc: event.high_qc.clone(),
			sender: self.pkid,
			signature: self.secret_key.sign(&payload),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use lockchain_core::block::SignerBitmap;
	use lockchain_core::types::Hash256;
	use lockchain_crypto::BlsSignature;

	fn signer() -> ConsensusSigner {
		ConsensusSigner::new(BlsSecretKey::from_seed(&[5u8; 32]), Pkid([5u8; 33]))
	}

	fn high_qc(view: u64) -> QuorumCert {
		QuorumCert {
			view,
			block_hash: lockchain_crypto::sha256(b"tip"),
			signers: SignerBitmap::with_capacity(1),
			aggregate_signature: BlsSignature::empty(),
		}
	}

	#[test]
	fn test_vote_signs_and_verifies() {
		let signer = signer();
		let vote = signer
			.vote(&VoteEvent {
				view: 7,
				tip_height: 3,
				tip_hash: lockchain_crypto::sha256(b"tip"),
			})
			.unwrap();
		assert!(vote.verify(&BlsSecretKey::from_seed(&[5u8; 32]).public_key()));
	}

	#[test]
	fn test_vote_rejects_malformed_event() {
		let signer = signer();
		let err = signer
			.vote(&VoteEvent {
				view: 7,
				tip_height: 3,
				tip_hash: Hash256::zero(),
			})
			.unwrap_err();
		assert_eq!(err, RuleError::MalformedConsensusEvent);
	}

	#[test]
	fn test_timeout_rejects_stale_view() {
		let signer = signer();
		let err = signer
			.timeout(
				&TimeoutEvent {
					view: 4,
					high_qc: high_qc(3),
				},
				5,
			)
			.unwrap_err();
		assert_eq!(err, RuleError::StaleTimeoutView);
	}

	#[test]
	fn test_timeout_signature_covers_high_qc_view() {
		let signer = signer();
		let timeout = signer
			.timeout(
				&TimeoutEvent {
					view: 9,
					high_qc: high_qc(6),
				},
				9,
			)
			.unwrap();
		let pk = BlsSecretKey::from_seed(&[5u8; 32]).public_key();
		assert!(timeout.verify(&pk));

		// tampering with the reported high QC view breaks verification
		let mut tampered = timeout.clone();
		tampered.high_qc.view = 7;
		assert!(!tampered.verify(&pk));
	}

	#[test]
	fn test_vote_and_timeout_domains_never_cross() {
		let signer = signer();
		let tip = lockchain_crypto::sha256(b"tip");
		let vote = signer
			.vote(&VoteEvent {
				view: 7,
				tip_height: 3,
				tip_hash: tip,
			})
			.unwrap();
		let pk = BlsSecretKey::from_seed(&[5u8; 32]).public_key();
		// a vote signature must not verify as a timeout payload
		let timeout_payload = timeout_signature_payload(7, 7);
		assert!(!pk.verify(&timeout_payload, &vote.signature));
	}
}
