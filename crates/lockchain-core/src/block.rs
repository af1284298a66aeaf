//! Blocks, quorum certificates, and the canonical signed payloads. The
//! signing opcodes (0x01..0x04) are mandatory domain separation: no byte
//! string signed for one purpose verifies for another.

use crate::ser::{self, ByteReader, ByteWriter, Error, Readable, Writeable, RECORD_VERSION};
use crate::txn::Transaction;
use crate::types::{BlockHash, BlockHeight, Hash256, Pkid, TimestampNanos, View};
use lockchain_crypto::{sha256, BlsSignature};

pub const CURRENT_BLOCK_VERSION: u8 = 1;

pub const SIGNING_OPCODE_VOTE: u8 = 0x01;
pub const SIGNING_OPCODE_TIMEOUT: u8 = 0x02;
pub const SIGNING_OPCODE_PROPOSAL: u8 = 0x03;
pub const SIGNING_OPCODE_HANDSHAKE: u8 = 0x04;

/// `0x01 || be_u64(view) || block_hash`
pub fn vote_signature_payload(view: View, block_hash: &BlockHash) -> Vec<u8> {
	let mut out = Vec::with_capacity(1 + 8 + 32);
	out.push(SIGNING_OPCODE_VOTE);
	out.extend_from_slice(&view.to_be_bytes());
	out.extend_from_slice(block_hash.as_bytes());
	out
}

/// `0x02 || be_u64(view) || be_u64(high_qc_view)`
pub fn timeout_signature_payload(view: View, high_qc_view: View) -> Vec<u8> {
	let mut out = Vec::with_capacity(1 + 8 + 8);
	out.push(SIGNING_OPCODE_TIMEOUT);
	out.extend_from_slice(&view.to_be_bytes());
	out.extend_from_slice(&high_qc_view.to_be_bytes());
	out
}

/// `0x03 || be_u64(view) || block_hash`
pub fn proposal_signature_payload(view: View, block_hash: &BlockHash) -> Vec<u8> {
	let mut out = Vec::with_capacity(1 + 8 + 32);
	out.push(SIGNING_OPCODE_PROPOSAL);
	out.extend_from_slice(&view.to_be_bytes());
	out.extend_from_slice(block_hash.as_bytes());
	out
}

/// `0x04 || peer_nonce || our_nonce`
pub fn handshake_signature_payload(peer_nonce: &[u8; 32], our_nonce: &[u8; 32]) -> Vec<u8> {
	let mut out = Vec::with_capacity(1 + 32 + 32);
	out.push(SIGNING_OPCODE_HANDSHAKE);
	out.extend_from_slice(peer_nonce);
	out.extend_from_slice(our_nonce);
	out
}

/// Bit i set means validator i of the snapshot top-validator list signed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignerBitmap(Vec<u8>);

impl SignerBitmap {
	pub fn with_capacity(validators: usize) -> Self {
		Self(vec![0u8; (validators + 7) / 8])
	}

	pub fn from_vec(bytes: Vec<u8>) -> Self {
		Self(bytes)
	}

	pub fn set(&mut self, index: usize) {
		let byte = index / 8;
		if byte >= self.0.len() {
			self.0.resize(byte + 1, 0);
		}
		self.0[byte] |= 1 << (index % 8);
	}

	pub fn get(&self, index: usize) -> bool {
		self.0
			.get(index / 8)
			.map_or(false, |byte| byte & (1 << (index % 8)) != 0)
	}

	/// Indices of set bits below `limit`, ascending.
	pub fn set_indices(&self, limit: usize) -> Vec<usize> {
		(0..limit).filter(|i| self.get(*i)).collect()
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

/// A BLS-aggregated vote proving >= 2/3 stake-weighted agreement on
/// (view, block_hash).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumCert {
	pub view: View,
	pub block_hash: BlockHash,
	pub signers: SignerBitmap,
	pub aggregate_signature: BlsSignature,
}

impl Writeable for QuorumCert {
	fn write(&self, writer: &mut ByteWriter) {
		writer.write_uvarint(self.view);
		writer.write_fixed(self.block_hash.as_bytes());
		writer.write_bytes(self.signers.as_bytes());
		writer.write_bytes(&self.aggregate_signature.to_bytes());
	}
}

impl Readable for QuorumCert {
	fn read(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
		let view = reader.read_uvarint()?;
		let block_hash = Hash256::from_bytes(reader.read_fixed(32)?)
			.map_err(|e| Error::Corrupted(e.to_string()))?;
		let signers = SignerBitmap::from_vec(reader.read_bytes()?);
		let aggregate_signature = BlsSignature::from_bytes(&reader.read_bytes()?)
			.map_err(|e| Error::Corrupted(e.to_string()))?;
		Ok(Self {
			view,
			block_hash,
			signers,
			aggregate_signature,
		})
	}
}

/// Aggregated timeout messages that let the chain skip a view. Each signer
/// signed its own (timed_out_view, high_qc_view) pair; `high_qc` is the
/// highest QC any of them reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutAggregateQc {
	pub timed_out_view: View,
	pub high_qc: QuorumCert,
	/// Parallel to the set bits of `signers`, ascending by signer index.
	pub high_qc_views: Vec<View>,
	pub signers: SignerBitmap,
	pub aggregate_signature: BlsSignature,
}

impl Writeable for TimeoutAggregateQc {
	fn write(&self, writer: &mut ByteWriter) {
		writer.write_uvarint(self.timed_out_view);
		self.high_qc.write(writer);
		writer.write_uvarint(self.high_qc_views.len() as u64);
		for view in &self.high_qc_views {
			writer.write_uvarint(*view);
		}
		writer.write_bytes(self.signers.as_bytes());
		writer.write_bytes(&self.aggregate_signature.to_bytes());
	}
}

impl Readable for TimeoutAggregateQc {
	fn read(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
		let timed_out_view = reader.read_uvarint()?;
		let high_qc = QuorumCert::read(reader)?;
		let count = reader.read_uvarint()?;
		if count > u16::MAX as u64 {
			return Err(Error::Corrupted("too many high QC views".to_string()));
		}
		let mut high_qc_views = Vec::with_capacity(count as usize);
		for _ in 0..count {
			high_qc_views.push(reader.read_uvarint()?);
		}
		let signers = SignerBitmap::from_vec(reader.read_bytes()?);
		let aggregate_signature = BlsSignature::from_bytes(&reader.read_bytes()?)
			.map_err(|e| Error::Corrupted(e.to_string()))?;
		Ok(Self {
			timed_out_view,
			high_qc,
			high_qc_views,
			signers,
			aggregate_signature,
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
	pub version: u8,
	pub prev_block_hash: BlockHash,
	pub height: BlockHeight,
	pub view: View,
	pub timestamp_nanos: TimestampNanos,
	pub proposer: Pkid,
	/// Commitment over the transaction list.
	pub txn_commitment: Hash256,
	/// Proposer's signature over the proposal payload; absent on genesis.
	pub proposer_signature: Option<BlsSignature>,
}

impl BlockHeader {
	// the block hash commits to every field except the proposer signature
	fn write_fields(&self, writer: &mut ByteWriter, include_signature: bool) {
		writer.write_u8(RECORD_VERSION);
		writer.write_u8(self.version);
		writer.write_fixed(self.prev_block_hash.as_bytes());
		writer.write_uvarint(self.height);
		writer.write_uvarint(self.view);
		writer.write_i64(self.timestamp_nanos);
		writer.write_fixed(self.proposer.as_bytes());
		writer.write_fixed(self.txn_commitment.as_bytes());
		if include_signature {
			match &self.proposer_signature {
				Some(sig) => {
					writer.write_u8(1);
					writer.write_bytes(&sig.to_bytes());
				}
				None => writer.write_u8(0),
			}
		}
	}

	pub fn hash(&self) -> BlockHash {
		let mut writer = ByteWriter::new();
		self.write_fields(&mut writer, false);
		sha256(&writer.into_bytes())
	}
}

impl Writeable for BlockHeader {
	fn write(&self, writer: &mut ByteWriter) {
		self.write_fields(writer, true);
	}
}

impl Readable for BlockHeader {
	fn read(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
		reader.read_version()?;
		let version = reader.read_u8()?;
		let prev_block_hash = Hash256::from_bytes(reader.read_fixed(32)?)
			.map_err(|e| Error::Corrupted(e.to_string()))?;
		let height = reader.read_uvarint()?;
		let view = reader.read_uvarint()?;
		let timestamp_nanos = reader.read_i64()?;
		let proposer = Pkid::from_bytes(reader.read_fixed(33)?)
			.ok_or_else(|| Error::Corrupted("bad proposer pkid".to_string()))?;
		let txn_commitment = Hash256::from_bytes(reader.read_fixed(32)?)
			.map_err(|e| Error::Corrupted(e.to_string()))?;
		let proposer_signature = match reader.read_u8()? {
			0 => None,
			1 => Some(
				BlsSignature::from_bytes(&reader.read_bytes()?)
					.map_err(|e| Error::Corrupted(e.to_string()))?,
			),
			other => return Err(Error::Corrupted(format!("bad option byte {}", other))),
		};
		Ok(Self {
			version,
			prev_block_hash,
			height,
			view,
			timestamp_nanos,
			proposer,
			txn_commitment,
			proposer_signature,
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
	pub header: BlockHeader,
	pub txns: Vec<Transaction>,
	pub vote_qc: Option<QuorumCert>,
	pub timeout_qc: Option<TimeoutAggregateQc>,
}

impl Block {
	pub fn hash(&self) -> BlockHash {
		self.header.hash()
	}

	pub fn height(&self) -> BlockHeight {
		self.header.height
	}

	pub fn view(&self) -> View {
		self.header.view
	}

	/// Commitment over the transaction list: the hash of all txn hashes in
	/// block order.
	pub fn compute_txn_commitment(txns: &[Transaction]) -> Hash256 {
		let mut concat = Vec::with_capacity(txns.len() * 32);
		for txn in txns {
			concat.extend_from_slice(txn.hash().as_bytes());
		}
		sha256(&concat)
	}
}

impl Writeable for Block {
	fn write(&self, writer: &mut ByteWriter) {
		self.header.write(writer);
		writer.write_uvarint(self.txns.len() as u64);
		for txn in &self.txns {
			txn.write(writer);
		}
		match &self.vote_qc {
			Some(qc) => {
				writer.write_u8(1);
				qc.write(writer);
			}
			None => writer.write_u8(0),
		}
		match &self.timeout_qc {
			Some(qc) => {
				writer.write_u8(1);
				qc.write(writer);
			}
			None => writer.write_u8(0),
		}
	}
}

impl Readable for Block {
	fn read(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
		let header = BlockHeader::read(reader)?;
		let count = reader.read_uvarint()?;
		if count > 1 << 20 {
			return Err(Error::Corrupted("unreasonable txn count".to_string()));
		}
		let mut txns = Vec::with_capacity(count as usize);
		for _ in 0..count {
			txns.push(Transaction::read(reader)?);
		}
		let vote_qc = match reader.read_u8()? {
			0 => None,
			1 => Some(QuorumCert::read(reader)?),
			other => return Err(Error::Corrupted(format!("bad option byte {}", other))),
		};
		let timeout_qc = match reader.read_u8()? {
			0 => None,
			1 => Some(TimeoutAggregateQc::read(reader)?),
			other => return Err(Error::Corrupted(format!("bad option byte {}", other))),
		};
		Ok(Self {
			header,
			txns,
			vote_qc,
			timeout_qc,
		})
	}
}
