//! Signed consensus messages exchanged between validators.

use lockchain_core::block::{timeout_signature_payload, vote_signature_payload, QuorumCert};
use lockchain_core::types::{BlockHash, Pkid, View};
use lockchain_crypto::{BlsPublicKey, BlsSignature};

/// A vote for the chain tip at a view. The signature covers
/// `0x01 || be_u64(view) || block_hash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteMessage {
	pub view: View,
	pub block_hash: BlockHash,
	pub voter: Pkid,
	pub signature: BlsSignature,
}

impl VoteMessage {
	pub fn verify(&self, voting_public_key: &BlsPublicKey) -> bool {
		let payload = vote_signature_payload(self.view, &self.block_hash);
		voting_public_key.verify(&payload, &self.signature)
	}
}

/// A timeout for a view, reporting the sender's high QC. The signature
/// covers `0x02 || be_u64(view) || be_u64(high_qc_view)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutMessage {
	pub view: View,
	pub high_qc: QuorumCert,
	pub sender: Pkid,
	pub signature: BlsSignature,
}

impl TimeoutMessage {
	pub fn verify(&self, voting_public_key: &BlsPublicKey) -> bool {
		let payload = timeout_signature_payload(self.view, self.high_qc.view);
		voting_public_key.verify(&payload, &self.signature)
	}
}
