//! The block-acceptance pipeline for the Fast-HotStuff chain:
//! validate -> index -> (reorg) -> connect -> commit grandparent -> advance
//! view. One pipeline instance serializes all block processing for a chain;
//! overlays are created per block and never shared.

use crate::block::{
	proposal_signature_payload, vote_signature_payload, Block, QuorumCert, TimeoutAggregateQc,
	CURRENT_BLOCK_VERSION,
};
use crate::epoch::EpochEntry;
use crate::error::RuleError;
use crate::events::EventBus;
use crate::genesis::GenesisConfig;
use crate::keys;
use crate::safemath::{safe_add, safe_mul};
use crate::ser::{self, ByteReader, ByteWriter, Error as SerError, Readable, Writeable, RECORD_VERSION};
use crate::types::{BlockHash, BlockHeight, Hash256, Pkid, TimestampNanos, View, U256};
use crate::validator::ValidatorEntry;
use crate::view::{ConnectContext, UtxoView};
use crate::{ChainError, Result};
use lockchain_crypto::{aggregate_public_keys, aggregate_verify, BlsPublicKey};
use lockchain_storage::{KvStore, WriteBatch};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

/// The view the genesis block occupies.
pub const GENESIS_VIEW: View = 1;

/// Durable record of the committed tip, updated inside every commit batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommittedTip {
	pub hash: BlockHash,
	pub height: BlockHeight,
	pub view: View,
	pub timestamp_nanos: TimestampNanos,
}

impl Writeable for CommittedTip {
	fn write(&self, writer: &mut ByteWriter) {
		writer.write_u8(RECORD_VERSION);
		writer.write_fixed(self.hash.as_bytes());
		writer.write_uvarint(self.height);
		writer.write_uvarint(self.view);
		writer.write_i64(self.timestamp_nanos);
	}
}

impl Readable for CommittedTip {
	fn read(reader: &mut ByteReader<'_>) -> std::result::Result<Self, SerError> {
		reader.read_version()?;
		Ok(Self {
			hash: Hash256::from_bytes(reader.read_fixed(32)?)
				.map_err(|e| SerError::Corrupted(e.to_string()))?,
			height: reader.read_uvarint()?,
			view: reader.read_uvarint()?,
			timestamp_nanos: reader.read_i64()?,
		})
	}
}

/// What happened to a submitted block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
	/// Joined the best chain; `committed` lists blocks flushed by the
	/// three-chain rule, oldest first.
	Accepted {
		block_hash: BlockHash,
		committed: Vec<BlockHash>,
	},
	/// Valid but on a branch the node does not currently prefer.
	SideBranch { block_hash: BlockHash },
	/// Ancestors are missing; the caller should fetch them.
	Orphan {
		block_hash: BlockHash,
		missing: Vec<BlockHash>,
	},
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStats {
	pub committed_height: BlockHeight,
	pub committed_view: View,
	pub current_view: View,
	pub uncommitted_blocks: usize,
	pub orphan_blocks: usize,
	pub indexed_blocks: usize,
	pub global_stake: U256,
}

pub struct ChainPipeline {
	store: Arc<dyn KvStore>,
	events: EventBus,
	/// All known uncommitted blocks, orphans included.
	block_index: BTreeMap<BlockHash, Block>,
	/// Blocks in the index whose ancestry does not reach the committed tip.
	orphans: BTreeSet<BlockHash>,
	/// Missing parent hash -> orphans waiting on it.
	orphan_waiters: BTreeMap<BlockHash, Vec<BlockHash>>,
	committed_tip: CommittedTip,
	/// Uncommitted best chain above the committed tip, oldest first.
	best_chain: Vec<BlockHash>,
	/// Highest QC view observed anywhere; advanced monotonically.
	highest_qc_view: View,
	current_view: View,
	flush_counter: u64,
}

impl ChainPipeline {
	/// Open a pipeline over `store`, seeding genesis state when the store
	/// is fresh.
	pub fn new(
		store: Arc<dyn KvStore>,
		genesis: &GenesisConfig,
		events: EventBus,
	) -> Result<Self> {
		let mut pipeline = Self {
			store,
			events,
			block_index: BTreeMap::new(),
			orphans: BTreeSet::new(),
			orphan_waiters: BTreeMap::new(),
			committed_tip: CommittedTip {
				hash: Hash256::zero(),
				height: 0,
				view: GENESIS_VIEW,
				timestamp_nanos: 0,
			},
			best_chain: Vec::new(),
			highest_qc_view: 0,
			current_view: GENESIS_VIEW + 1,
			flush_counter: 0,
		};

		match pipeline.store.get(&keys::committed_tip_key())? {
			Some(raw) => {
				let tip: CommittedTip = ser::from_bytes(&raw)?;
				info!(height = tip.height, view = tip.view, "resuming at committed tip");
				pipeline.committed_tip = tip;
				pipeline.current_view = tip.view + 1;
			}
			None => pipeline.seed_genesis(genesis)?,
		}
		Ok(pipeline)
	}

	fn seed_genesis(&mut self, genesis: &GenesisConfig) -> Result<()> {
		info!("seeding genesis state");
		let mut view = UtxoView::new(self.store.snapshot());
		view.set_global_params(genesis.global_params.clone());
		view.set_current_epoch(EpochEntry {
			epoch_number: 0,
			final_block_height: genesis.global_params.epoch_duration_blocks,
		});
		for (public_key, amount) in &genesis.initial_balances {
			view.credit_balance(
				&Pkid::from_pub_key(public_key),
				&Pkid::zero(),
				U256::from(*amount),
			)?;
		}
		for (public_key, raw_restriction) in &genesis.seeded_profiles {
			view.set_profile(crate::lockup::ProfileEntry {
				pkid: Pkid::from_pub_key(public_key),
				lockup_transfer_restriction: GenesisConfig::seeded_restriction(*raw_restriction),
			});
		}
		for validator in &genesis.initial_validators {
			// genesis stake is minted into the registry directly
			view.set_validator_entry(ValidatorEntry {
				validator_id: Hash256::zero(),
				pkid: Pkid::from_pub_key(&validator.public_key),
				voting_public_key: validator.voting_public_key,
				domains: validator
					.domains
					.iter()
					.map(|d| d.as_bytes().to_vec())
					.collect(),
				disable_delegated_stake: false,
				total_stake: U256::from(validator.stake),
				created_at_height: 0,
				status: crate::validator::ValidatorStatus::Active,
				jailed_at_epoch: None,
				last_active_at_epoch: 0,
				extra: BTreeMap::new(),
			})?;
		}

		let genesis_block = genesis_block(genesis.timestamp_nanos);
		let tip = CommittedTip {
			hash: genesis_block.hash(),
			height: 0,
			view: GENESIS_VIEW,
			timestamp_nanos: genesis.timestamp_nanos,
		};

		let mut batch = WriteBatch::new();
		view.flush(&mut batch)?;
		batch.delete(keys::committed_tip_key());
		batch.put(keys::committed_tip_key(), ser::to_bytes(&tip));
		self.apply_batch(batch)?;

		self.committed_tip = tip;
		self.current_view = GENESIS_VIEW + 1;
		Ok(())
	}

	pub fn committed_tip(&self) -> &CommittedTip {
		&self.committed_tip
	}

	pub fn current_view(&self) -> View {
		self.current_view
	}

	pub fn best_chain(&self) -> &[BlockHash] {
		&self.best_chain
	}

	pub fn has_block(&self, hash: &BlockHash) -> bool {
		self.block_index.contains_key(hash) || *hash == self.committed_tip.hash
	}

	pub fn events_mut(&mut self) -> &mut EventBus {
		&mut self.events
	}

	/// Advance the local view, e.g. on a timeout. Never moves backwards.
	pub fn advance_view(&mut self, view: View) {
		if view > self.current_view {
			self.current_view = view;
		}
	}

	/// A fresh overlay over the committed store state with every
	/// uncommitted best-chain block replayed onto it.
	pub fn uncommitted_tip_view(&self) -> Result<UtxoView> {
		let mut view = UtxoView::new(self.store.snapshot());
		for hash in &self.best_chain {
			let block = self.block_index.get(hash).ok_or_else(|| {
				ChainError::Invariant("best chain references an unindexed block".to_string())
			})?;
			let ctx = ConnectContext {
				block_height: block.height(),
				block_timestamp_nanos: block.header.timestamp_nanos,
			};
			for txn in &block.txns {
				view.connect_transaction(txn, &ctx)?;
			}
		}
		Ok(view)
	}

	/// A fresh overlay over the committed store state only.
	pub fn committed_view(&self) -> UtxoView {
		UtxoView::new(self.store.snapshot())
	}

	pub fn stats(&mut self) -> Result<PipelineStats> {
		let mut view = self.committed_view();
		Ok(PipelineStats {
			committed_height: self.committed_tip.height,
			committed_view: self.committed_tip.view,
			current_view: self.current_view,
			uncommitted_blocks: self.best_chain.len(),
			orphan_blocks: self.orphans.len(),
			indexed_blocks: self.block_index.len(),
			global_stake: view.get_global_stake()?,
		})
	}

	/// Run one block through the acceptance procedure.
	pub fn process_block(&mut self, block: Block) -> Result<ProcessOutcome> {
		let block_hash = block.hash();
		info!(
			hash = %block_hash,
			height = block.height(),
			view = block.view(),
			txns = block.txns.len(),
			"processing block"
		);

		// surface checks that need no ancestry
		if block.header.version != CURRENT_BLOCK_VERSION {
			return Err(RuleError::InvalidBlockVersion.into());
		}
		if Block::compute_txn_commitment(&block.txns) != block.header.txn_commitment {
			return Err(RuleError::InvalidTxnCommitment.into());
		}
		if self.has_block(&block_hash) {
			return Err(RuleError::BlockAlreadyExists.into());
		}
		// a view at or below the committed tip can never be accepted
		if block.view() <= self.committed_tip.view {
			return Err(RuleError::StaleView.into());
		}
		// exactly one of the two certificate kinds
		if block.vote_qc.is_some() == block.timeout_qc.is_some() {
			return Err(RuleError::MissingQuorumCert.into());
		}

		// ancestry: the parent must chain back to the committed tip
		let parent_hash = block.header.prev_block_hash;
		let parent_known = parent_hash == self.committed_tip.hash
			|| (self.block_index.contains_key(&parent_hash)
				&& !self.orphans.contains(&parent_hash));
		if !parent_known {
			info!(hash = %block_hash, missing = %parent_hash, "indexing orphan block");
			self.block_index.insert(block_hash, block);
			self.orphans.insert(block_hash);
			self.orphan_waiters
				.entry(parent_hash)
				.or_default()
				.push(block_hash);
			return Ok(ProcessOutcome::Orphan {
				block_hash,
				missing: vec![parent_hash],
			});
		}

		let (parent_height, parent_view, parent_ts) = if parent_hash == self.committed_tip.hash {
			(
				self.committed_tip.height,
				self.committed_tip.view,
				self.committed_tip.timestamp_nanos,
			)
		} else {
			let parent = &self.block_index[&parent_hash];
			(
				parent.height(),
				parent.view(),
				parent.header.timestamp_nanos,
			)
		};

		// exactly one past its parent
		if block.height() != parent_height + 1 {
			return Err(RuleError::InvalidBlockHeight.into());
		}
		if block.header.timestamp_nanos <= parent_ts {
			return Err(RuleError::TimestampNotMonotonic.into());
		}

		// view rules for the carried certificate
		if let Some(vote_qc) = &block.vote_qc {
			if block.view() != parent_view + 1 {
				return Err(RuleError::InvalidVoteQcView.into());
			}
			if vote_qc.view != parent_view || vote_qc.block_hash != parent_hash {
				return Err(RuleError::InvalidQuorumCert.into());
			}
		}
		if let Some(timeout_qc) = &block.timeout_qc {
			if block.view() <= parent_view + 1 {
				return Err(RuleError::InvalidTimeoutQcView.into());
			}
			if timeout_qc.timed_out_view + 1 != block.view() {
				return Err(RuleError::InvalidTimeoutQcView.into());
			}
			let max_reported = timeout_qc.high_qc_views.iter().copied().max();
			if max_reported != Some(timeout_qc.high_qc.view) {
				return Err(RuleError::InvalidQuorumCert.into());
			}
		}

		// leader and certificate crypto, against the consumable snapshot
		self.validate_against_snapshot(&block, &block_hash)?;

		// track the highest QC we have seen
		let justification = block_justification_view(&block);
		if justification > self.highest_qc_view {
			self.highest_qc_view = justification;
		}

		// index the block
		self.block_index.insert(block_hash, block.clone());

		let candidate = self.branch_from_committed(&block_hash).ok_or_else(|| {
			ChainError::Invariant("connected parent produced no branch".to_string())
		})?;

		// fork choice: plain extension of the best chain always wins, a
		// competing branch only on a strictly higher justification
		let extends_best = candidate.len() == self.best_chain.len() + 1
			&& candidate[..self.best_chain.len()] == self.best_chain[..];
		let adopt = extends_best || self.best_chain.is_empty() || {
			let best_tip = &self.block_index[self.best_chain.last().unwrap()];
			justification > block_justification_view(best_tip)
		};
		if !adopt {
			info!(hash = %block_hash, "valid block parked on a side branch");
			return Ok(ProcessOutcome::SideBranch { block_hash });
		}

		// connect the whole candidate branch on a fresh overlay; any rule
		// error rejects the new block outright
		if let Err(err) = self.connect_branch(&candidate) {
			self.block_index.remove(&block_hash);
			return Err(err);
		}
		// listeners hear about transactions only once the block held up
		for txn in &block.txns {
			self.events.transaction_connected(&block_hash, txn);
		}

		// reorg bookkeeping: blocks leaving the best chain stay indexed
		let diverge = self
			.best_chain
			.iter()
			.zip(candidate.iter())
			.take_while(|(a, b)| a == b)
			.count();
		for stale_hash in self.best_chain[diverge..].to_vec() {
			if stale_hash != block_hash {
				if let Some(stale) = self.block_index.get(&stale_hash) {
					let stale = stale.clone();
					warn!(hash = %stale_hash, "block detached from best chain");
					self.events.block_disconnected(&stale);
				}
			}
		}

		self.events.block_connected(&block);

		// three-chain commit rule: three consecutive direct children with
		// consecutive views commit the grandparent
		let mut committed = Vec::new();
		let n = candidate.len();
		let mut remaining = candidate.clone();
		if n >= 3 {
			let newest = &self.block_index[&candidate[n - 1]];
			let parent = &self.block_index[&candidate[n - 2]];
			let grandparent = &self.block_index[&candidate[n - 3]];
			if newest.view() == parent.view() + 1 && parent.view() == grandparent.view() + 1 {
				for hash in &candidate[..n - 2] {
					self.commit_block(hash)?;
					committed.push(*hash);
				}
				remaining = candidate[n - 2..].to_vec();
			}
		}
		self.best_chain = remaining;

		// advance the view and drop stale uncommitted blocks
		self.advance_view(block.view() + 1);
		self.prune_stale_blocks();

		self.events.block_accepted(&block);
		info!(
			hash = %block_hash,
			committed = committed.len(),
			current_view = self.current_view,
			"block accepted"
		);

		// retry orphans that were waiting on this block
		self.retry_orphans_of(&block_hash);

		Ok(ProcessOutcome::Accepted {
			block_hash,
			committed,
		})
	}

	/// Walk ancestry from `tip_hash` back to the committed tip. Returns the
	/// uncommitted branch oldest-first, or None if the walk dead-ends.
	fn branch_from_committed(&self, tip_hash: &BlockHash) -> Option<Vec<BlockHash>> {
		let mut branch = Vec::new();
		let mut cursor = *tip_hash;
		while cursor != self.committed_tip.hash {
			if self.orphans.contains(&cursor) {
				return None;
			}
			let block = self.block_index.get(&cursor)?;
			branch.push(cursor);
			cursor = block.header.prev_block_hash;
		}
		branch.reverse();
		Some(branch)
	}

	fn connect_branch(&mut self, branch: &[BlockHash]) -> Result<()> {
		let mut view = UtxoView::new(self.store.snapshot());
		for hash in branch {
			let block = self.block_index[hash].clone();
			let ctx = ConnectContext {
				block_height: block.height(),
				block_timestamp_nanos: block.header.timestamp_nanos,
			};
			for txn in &block.txns {
				view.connect_transaction(txn, &ctx)?;
			}
		}
		Ok(())
	}

	/// Flush one block's effects to the store. The epoch hook runs inside
	/// the same batch when this block closes the current epoch.
	fn commit_block(&mut self, hash: &BlockHash) -> Result<()> {
		let block = self
			.block_index
			.get(hash)
			.ok_or_else(|| {
				ChainError::Invariant("committing a block missing from the index".to_string())
			})?
			.clone();
		let mut view = UtxoView::new(self.store.snapshot());
		let ctx = ConnectContext {
			block_height: block.height(),
			block_timestamp_nanos: block.header.timestamp_nanos,
		};
		for txn in &block.txns {
			view.connect_transaction(txn, &ctx)?;
		}

		let epoch = view.get_current_epoch()?;
		if block.height() == epoch.final_block_height {
			view.run_epoch_complete_hook(block.height())?;
		}

		let tip = CommittedTip {
			hash: *hash,
			height: block.height(),
			view: block.view(),
			timestamp_nanos: block.header.timestamp_nanos,
		};
		let mut batch = WriteBatch::new();
		view.flush(&mut batch)?;
		batch.delete(keys::committed_tip_key());
		batch.put(keys::committed_tip_key(), ser::to_bytes(&tip));
		self.apply_batch(batch)?;

		self.committed_tip = tip;
		info!(hash = %hash, height = tip.height, "block committed");
		Ok(())
	}

	/// Apply one atomic batch, fanning out per-op and per-flush events.
	fn apply_batch(&mut self, batch: WriteBatch) -> Result<()> {
		self.flush_counter += 1;
		let flush_id = self.flush_counter;
		for op in &batch.ops {
			self.events.store_write(op);
		}
		match self.store.write_batch(&batch) {
			Ok(()) => {
				self.events.store_flushed(flush_id, true);
				Ok(())
			}
			Err(err) => {
				self.events.store_flushed(flush_id, false);
				Err(err.into())
			}
		}
	}

	/// Drop uncommitted blocks whose view the committed tip has passed.
	fn prune_stale_blocks(&mut self) {
		let keep: BTreeSet<BlockHash> = self.best_chain.iter().copied().collect();
		let tip_view = self.committed_tip.view;
		let stale: Vec<BlockHash> = self
			.block_index
			.iter()
			.filter(|(hash, block)| !keep.contains(*hash) && block.view() <= tip_view)
			.map(|(hash, _)| *hash)
			.collect();
		for hash in stale {
			self.block_index.remove(&hash);
			self.orphans.remove(&hash);
			self.orphan_waiters.remove(&hash);
		}
	}

	fn retry_orphans_of(&mut self, parent_hash: &BlockHash) {
		let Some(waiters) = self.orphan_waiters.remove(parent_hash) else {
			return;
		};
		for orphan_hash in waiters {
			if !self.orphans.remove(&orphan_hash) {
				continue;
			}
			let Some(block) = self.block_index.remove(&orphan_hash) else {
				continue;
			};
			info!(hash = %orphan_hash, "retrying orphan block");
			match self.process_block(block) {
				Ok(_) => {}
				Err(ChainError::Rule(reason)) => {
					warn!(hash = %orphan_hash, %reason, "orphan block rejected");
				}
				Err(err) => {
					// storage or invariant failures must not be swallowed
					// on the orphan path either
					warn!(hash = %orphan_hash, %err, "orphan retry failed fatally");
				}
			}
		}
	}

	// ---- snapshot-backed validation ----

	/// Leader and certificate checks against the snapshot consensus
	/// consumes (current epoch minus the lookback). Before the first such
	/// snapshot exists the chain is bootstrapping and the checks are
	/// skipped.
	fn validate_against_snapshot(&mut self, block: &Block, block_hash: &BlockHash) -> Result<()> {
		let mut view = UtxoView::new(self.store.snapshot());
		let epoch = view.get_current_epoch()?;
		let params = view.get_global_params()?;
		if epoch.epoch_number < params.snapshot_lookback_epochs {
			return Ok(());
		}
		let snapshot_epoch = epoch.epoch_number - params.snapshot_lookback_epochs;

		let schedule = view.get_snapshot_leader_schedule(snapshot_epoch)?;
		if schedule.is_empty() {
			return Ok(());
		}
		let slot = (block.view() % schedule.len() as u64) as usize;
		if block.header.proposer != schedule[slot] {
			return Err(RuleError::InvalidProposer.into());
		}

		// the proposer must have signed the proposal payload with its
		// snapshotted voting key
		let proposer_entry = view
			.get_snapshot_validator(snapshot_epoch, &block.header.proposer)?
			.ok_or(RuleError::InvalidProposer)?;
		let Some(signature) = &block.header.proposer_signature else {
			return Err(RuleError::InvalidBlockHeader.into());
		};
		let payload = proposal_signature_payload(block.view(), block_hash);
		if !proposer_entry.voting_public_key.verify(&payload, signature) {
			return Err(RuleError::InvalidBlockHeader.into());
		}

		let top = view
			.get_snapshot_top_validators(snapshot_epoch)?
			.unwrap_or_default();
		let active_stake = view
			.get_snapshot_global_active_stake(snapshot_epoch)?
			.unwrap_or_default();
		let mut resolve = |pkid: &Pkid| -> Result<ValidatorEntry> {
			view.get_snapshot_validator(snapshot_epoch, pkid)?
				.ok_or_else(|| {
					ChainError::Invariant(
						"snapshot top list references an unsnapshotted validator".to_string(),
					)
				})
		};

		if let Some(vote_qc) = &block.vote_qc {
			validate_vote_qc(vote_qc, &top, active_stake, &mut resolve)?;
		}
		if let Some(timeout_qc) = &block.timeout_qc {
			validate_timeout_qc(timeout_qc, &top, active_stake, &mut resolve)?;
		}
		Ok(())
	}
}

fn block_justification_view(block: &Block) -> View {
	match (&block.vote_qc, &block.timeout_qc) {
		(Some(qc), _) => qc.view,
		(_, Some(timeout_qc)) => timeout_qc.timed_out_view,
		_ => 0,
	}
}

/// Deterministic genesis block for a chain started from `timestamp_nanos`.
pub fn genesis_block(timestamp_nanos: TimestampNanos) -> Block {
	Block {
		header: crate::block::BlockHeader {
			version: CURRENT_BLOCK_VERSION,
			prev_block_hash: Hash256::zero(),
			height: 0,
			view: GENESIS_VIEW,
			timestamp_nanos,
			proposer: Pkid::zero(),
			txn_commitment: Block::compute_txn_commitment(&[]),
			proposer_signature: None,
		},
		txns: Vec::new(),
		vote_qc: None,
		timeout_qc: None,
	}
}

/// Recompute the aggregate key from the signer bitmap, verify the vote
/// payload, and check the stake-weighted 2/3 quorum.
fn validate_vote_qc<F>(
	qc: &QuorumCert,
	top: &[Pkid],
	active_stake: U256,
	resolve: &mut F,
) -> Result<()>
where
	F: FnMut(&Pkid) -> Result<ValidatorEntry>,
{
	let indices = qc.signers.set_indices(top.len());
	if indices.is_empty() {
		return Err(RuleError::InvalidQuorumCert.into());
	}
	let mut signer_keys = Vec::with_capacity(indices.len());
	let mut signed_stake = U256::zero();
	for index in indices {
		let entry = resolve(&top[index])?;
		signer_keys.push(entry.voting_public_key);
		signed_stake = safe_add(signed_stake, entry.total_stake)?;
	}
	let payload = vote_signature_payload(qc.view, &qc.block_hash);
	let aggregate = aggregate_public_keys(&signer_keys)?;
	if !aggregate.verify(&payload, &qc.aggregate_signature) {
		return Err(RuleError::InvalidQuorumCert.into());
	}
	check_quorum_stake(signed_stake, active_stake)
}

/// Timeout aggregates carry one message per signer (each reports its own
/// high QC view); the embedded high QC is itself verified as a vote QC.
fn validate_timeout_qc<F>(
	timeout_qc: &TimeoutAggregateQc,
	top: &[Pkid],
	active_stake: U256,
	resolve: &mut F,
) -> Result<()>
where
	F: FnMut(&Pkid) -> Result<ValidatorEntry>,
{
	let indices = timeout_qc.signers.set_indices(top.len());
	if indices.is_empty() || indices.len() != timeout_qc.high_qc_views.len() {
		return Err(RuleError::InvalidQuorumCert.into());
	}
	let mut signer_keys: Vec<BlsPublicKey> = Vec::with_capacity(indices.len());
	let mut messages = Vec::with_capacity(indices.len());
	let mut signed_stake = U256::zero();
	for (position, index) in indices.into_iter().enumerate() {
		let entry = resolve(&top[index])?;
		signer_keys.push(entry.voting_public_key);
		messages.push(crate::block::timeout_signature_payload(
			timeout_qc.timed_out_view,
			timeout_qc.high_qc_views[position],
		));
		signed_stake = safe_add(signed_stake, entry.total_stake)?;
	}
	if !aggregate_verify(&messages, &signer_keys, &timeout_qc.aggregate_signature) {
		return Err(RuleError::InvalidQuorumCert.into());
	}
	check_quorum_stake(signed_stake, active_stake)?;
	validate_vote_qc(&timeout_qc.high_qc, top, active_stake, resolve)
}

/// `signed * 3 >= active * 2`, all checked.
fn check_quorum_stake(signed_stake: U256, active_stake: U256) -> Result<()> {
	let weighted_signed = safe_mul(signed_stake, U256::from(3u8))?;
	let weighted_active = safe_mul(active_stake, U256::from(2u8))?;
	if weighted_signed < weighted_active {
		return Err(RuleError::InsufficientQuorumStake.into());
	}
	Ok(())
}
