//! End-to-end block pipeline scenarios: the three-chain commit rule, epoch
//! rollover inside a commit, reorgs, orphans, and full certificate
//! validation once the first consumable snapshot exists.

use lockchain_core::block::{
	proposal_signature_payload, vote_signature_payload, Block, BlockHeader, QuorumCert,
	SignerBitmap, TimeoutAggregateQc, CURRENT_BLOCK_VERSION,
};
use lockchain_core::epoch::{EpochEntry, GlobalParamsEntry};
use lockchain_core::error::{ChainError, RuleError};
use lockchain_core::events::{ChainListener, EventBus, ListenerResult};
use lockchain_core::genesis::{GenesisConfig, GenesisValidator};
use lockchain_core::pipeline::{ChainPipeline, ProcessOutcome};
use lockchain_core::txn::{CoinLockupMetadata, Transaction, TxnMeta};
use lockchain_core::types::{BlockHash, Pkid, PubKey, U256};
use lockchain_core::validator::{ValidatorEntry, ValidatorStatus};
use lockchain_core::view::UtxoView;
use lockchain_crypto::{BlsSecretKey, BlsSignature};
use lockchain_storage::{KvStore, MemoryKvStore, WriteBatch};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

fn pk(b: u8) -> PubKey {
	PubKey([b; 33])
}

fn pkid(b: u8) -> Pkid {
	Pkid([b; 33])
}

struct Parent {
	hash: BlockHash,
	view: u64,
	timestamp_nanos: i64,
}

fn build_block(
	parent: &Parent,
	height: u64,
	view: u64,
	txns: Vec<Transaction>,
	proposer: Pkid,
	signer: Option<&BlsSecretKey>,
) -> Block {
	let vote_qc = QuorumCert {
		view: parent.view,
		block_hash: parent.hash,
		signers: {
			let mut bitmap = SignerBitmap::with_capacity(1);
			bitmap.set(0);
			bitmap
		},
		aggregate_signature: match signer {
			Some(sk) => sk.sign(&vote_signature_payload(parent.view, &parent.hash)),
			None => BlsSignature::empty(),
		},
	};
	let mut header = BlockHeader {
		version: CURRENT_BLOCK_VERSION,
		prev_block_hash: parent.hash,
		height,
		view,
		timestamp_nanos: parent.timestamp_nanos + 1_000,
		proposer,
		txn_commitment: Block::compute_txn_commitment(&txns),
		proposer_signature: None,
	};
	if let Some(sk) = signer {
		let hash = header.hash();
		header.proposer_signature = Some(sk.sign(&proposal_signature_payload(view, &hash)));
	}
	Block {
		header,
		txns,
		vote_qc: Some(vote_qc),
		timeout_qc: None,
	}
}

fn as_parent(block: &Block) -> Parent {
	Parent {
		hash: block.hash(),
		view: block.view(),
		timestamp_nanos: block.header.timestamp_nanos,
	}
}

fn genesis_parent(pipeline: &ChainPipeline) -> Parent {
	let tip = pipeline.committed_tip();
	Parent {
		hash: tip.hash,
		view: tip.view,
		timestamp_nanos: tip.timestamp_nanos,
	}
}

fn simple_genesis(epoch_duration_blocks: u64) -> GenesisConfig {
	let mut genesis = GenesisConfig::default();
	genesis.global_params.epoch_duration_blocks = epoch_duration_blocks;
	genesis.initial_balances = vec![(pk(1), 1_000_000)];
	genesis
}

fn lockup_txn(amount: u64, unlock_ts: i64) -> Transaction {
	Transaction::new(
		pk(1),
		TxnMeta::CoinLockup(CoinLockupMetadata {
			creator_public_key: PubKey::zero(),
			unlock_timestamp_nanos: unlock_ts,
			amount: U256::from(amount),
		}),
	)
}

#[test]
fn test_genesis_bootstrap_and_resume() {
	let store = Arc::new(MemoryKvStore::new());
	let genesis = simple_genesis(3_600);
	let mut pipeline =
		ChainPipeline::new(store.clone(), &genesis, EventBus::new()).unwrap();

	let stats = pipeline.stats().unwrap();
	assert_eq!(stats.committed_height, 0);
	assert_eq!(stats.committed_view, 1);
	assert_eq!(stats.current_view, 2);

	let mut view = pipeline.committed_view();
	assert_eq!(
		view.get_balance_entry(&pkid(1), &Pkid::zero())
			.unwrap()
			.unwrap()
			.balance,
		U256::from(1_000_000u64)
	);
	assert_eq!(view.get_current_epoch().unwrap().epoch_number, 0);

	// a second pipeline over the same store resumes at the same tip
	let resumed = ChainPipeline::new(store, &genesis, EventBus::new()).unwrap();
	assert_eq!(resumed.committed_tip(), pipeline.committed_tip());
}

#[test]
fn test_three_chain_commit_rule_with_epoch_hook() {
	// epoch 0 closes at height 1, so committing the first block must run
	// the hook inside the same flush
	let store = Arc::new(MemoryKvStore::new());
	let mut pipeline =
		ChainPipeline::new(store.clone(), &simple_genesis(1), EventBus::new()).unwrap();

	let genesis = genesis_parent(&pipeline);
	let b1 = build_block(
		&genesis,
		1,
		2,
		vec![lockup_txn(500, 1_000_000)],
		pkid(1),
		None,
	);
	let b2 = build_block(&as_parent(&b1), 2, 3, vec![], pkid(1), None);
	let b3 = build_block(&as_parent(&b2), 3, 4, vec![], pkid(1), None);

	// two blocks: tip is speculative, nothing committed yet
	pipeline.process_block(b1.clone()).unwrap();
	pipeline.process_block(b2.clone()).unwrap();
	assert_eq!(pipeline.committed_tip().height, 0);
	let mut store_view = pipeline.committed_view();
	assert!(store_view
		.get_locked_balance_entry(&pkid(1), &Pkid::zero(), 1_000_000)
		.unwrap()
		.is_none());

	// the third consecutive view commits the grandparent
	let outcome = pipeline.process_block(b3.clone()).unwrap();
	assert_eq!(
		outcome,
		ProcessOutcome::Accepted {
			block_hash: b3.hash(),
			committed: vec![b1.hash()],
		}
	);
	assert_eq!(pipeline.committed_tip().height, 1);
	assert_eq!(pipeline.best_chain().len(), 2);

	// b1's lockup landed durably, and the epoch hook ran in the same batch
	let mut store_view = pipeline.committed_view();
	assert_eq!(
		store_view
			.get_locked_balance_entry(&pkid(1), &Pkid::zero(), 1_000_000)
			.unwrap()
			.unwrap()
			.balance,
		U256::from(500u64)
	);
	let epoch = store_view.get_current_epoch().unwrap();
	assert_eq!(epoch.epoch_number, 1);
	assert_eq!(epoch.final_block_height, 2);
	assert!(store_view
		.get_snapshot_global_active_stake(0)
		.unwrap()
		.is_some());

	// the speculative tip view can still be built over the uncommitted suffix
	let uncommitted = pipeline.uncommitted_tip_view().unwrap();
	drop(uncommitted);
}

#[test]
fn test_reorg_to_higher_justification_branch() {
	let store = Arc::new(MemoryKvStore::new());
	let mut pipeline =
		ChainPipeline::new(store, &simple_genesis(3_600), EventBus::new()).unwrap();

	let genesis = genesis_parent(&pipeline);
	let a1 = build_block(&genesis, 1, 2, vec![], pkid(1), None);
	pipeline.process_block(a1.clone()).unwrap();
	assert_eq!(pipeline.best_chain(), &[a1.hash()]);

	// chain B extends the committed tip at a higher view, justified by a
	// timeout aggregate over the skipped views
	let high_qc = QuorumCert {
		view: genesis.view,
		block_hash: genesis.hash,
		signers: SignerBitmap::with_capacity(1),
		aggregate_signature: BlsSignature::empty(),
	};
	let b1 = Block {
		header: BlockHeader {
			version: CURRENT_BLOCK_VERSION,
			prev_block_hash: genesis.hash,
			height: 1,
			view: 4,
			timestamp_nanos: genesis.timestamp_nanos + 2_000,
			proposer: pkid(2),
			txn_commitment: Block::compute_txn_commitment(&[]),
			proposer_signature: None,
		},
		txns: vec![],
		vote_qc: None,
		timeout_qc: Some(TimeoutAggregateQc {
			timed_out_view: 3,
			high_qc: high_qc.clone(),
			high_qc_views: vec![genesis.view],
			signers: SignerBitmap::with_capacity(1),
			aggregate_signature: BlsSignature::empty(),
		}),
	};

	let outcome = pipeline.process_block(b1.clone()).unwrap();
	assert!(matches!(outcome, ProcessOutcome::Accepted { .. }));

	// best chain switched to B; A stays in the block index
	assert_eq!(pipeline.best_chain(), &[b1.hash()]);
	assert!(pipeline.has_block(&a1.hash()));
	assert_eq!(pipeline.current_view(), 5);
}

#[test]
fn test_lower_justification_branch_is_parked() {
	let store = Arc::new(MemoryKvStore::new());
	let mut pipeline =
		ChainPipeline::new(store, &simple_genesis(3_600), EventBus::new()).unwrap();

	let genesis = genesis_parent(&pipeline);
	let a1 = build_block(&genesis, 1, 2, vec![], pkid(1), None);
	let a2 = build_block(&as_parent(&a1), 2, 3, vec![], pkid(1), None);
	pipeline.process_block(a1).unwrap();
	pipeline.process_block(a2).unwrap();

	// a competing single block from the committed tip with an equal-view
	// justification does not displace the longer chain
	let mut competing = build_block(&genesis, 1, 2, vec![], pkid(3), None);
	competing.header.timestamp_nanos += 5_000;
	let outcome = pipeline.process_block(competing.clone()).unwrap();
	assert_eq!(
		outcome,
		ProcessOutcome::SideBranch {
			block_hash: competing.hash()
		}
	);
	assert_eq!(pipeline.best_chain().len(), 2);
}

#[test]
fn test_orphan_is_retried_when_parent_arrives() {
	let store = Arc::new(MemoryKvStore::new());
	let mut pipeline =
		ChainPipeline::new(store, &simple_genesis(3_600), EventBus::new()).unwrap();

	let genesis = genesis_parent(&pipeline);
	let a1 = build_block(&genesis, 1, 2, vec![], pkid(1), None);
	let a2 = build_block(&as_parent(&a1), 2, 3, vec![], pkid(1), None);

	let outcome = pipeline.process_block(a2.clone()).unwrap();
	assert_eq!(
		outcome,
		ProcessOutcome::Orphan {
			block_hash: a2.hash(),
			missing: vec![a1.hash()],
		}
	);

	// the parent's arrival pulls the orphan in behind it
	pipeline.process_block(a1.clone()).unwrap();
	assert_eq!(pipeline.best_chain(), &[a1.hash(), a2.hash()]);
}

#[test]
fn test_stale_view_is_rejected_forever() {
	let store = Arc::new(MemoryKvStore::new());
	let mut pipeline =
		ChainPipeline::new(store, &simple_genesis(3_600), EventBus::new()).unwrap();

	let genesis = genesis_parent(&pipeline);
	let mut stale = build_block(&genesis, 1, 2, vec![], pkid(1), None);
	stale.header.view = 1;
	stale.vote_qc = Some(QuorumCert {
		view: 0,
		block_hash: genesis.hash,
		signers: SignerBitmap::with_capacity(1),
		aggregate_signature: BlsSignature::empty(),
	});
	let err = pipeline.process_block(stale).unwrap_err();
	assert!(matches!(err, ChainError::Rule(RuleError::StaleView)));
}

#[test]
fn test_full_certificate_validation_after_bootstrap() {
	// one real validator; once the committed epoch reaches the lookback,
	// every block must carry a verifiable proposer signature and vote QC
	let sk = BlsSecretKey::from_seed(&[42u8; 32]);
	let mut genesis_config = simple_genesis(2);
	genesis_config.initial_validators = vec![GenesisValidator {
		public_key: pk(7),
		voting_public_key: sk.public_key(),
		domains: vec!["node.example:17000".to_string()],
		stake: 100,
	}];

	let store = Arc::new(MemoryKvStore::new());
	let mut pipeline =
		ChainPipeline::new(store, &genesis_config, EventBus::new()).unwrap();

	let mut parent = genesis_parent(&pipeline);
	let mut blocks = Vec::new();
	for height in 1..=10u64 {
		let block = build_block(&parent, height, height + 1, vec![], pkid(7), Some(&sk));
		parent = as_parent(&block);
		blocks.push(block);
	}
	for block in blocks {
		let outcome = pipeline.process_block(block).unwrap();
		assert!(matches!(outcome, ProcessOutcome::Accepted { .. }));
	}

	// committed well past epoch 2: certificate validation is now live
	let mut view = pipeline.committed_view();
	assert!(view.get_current_epoch().unwrap().epoch_number >= 2);

	// a block from the wrong proposer bounces
	let wrong_proposer = build_block(&parent, 11, 12, vec![], pkid(9), Some(&sk));
	let err = pipeline.process_block(wrong_proposer).unwrap_err();
	assert!(matches!(err, ChainError::Rule(RuleError::InvalidProposer)));

	// a QC signed by the wrong key bounces
	let imposter = BlsSecretKey::from_seed(&[43u8; 32]);
	let mut bad_qc = build_block(&parent, 11, 12, vec![], pkid(7), Some(&sk));
	bad_qc.vote_qc = Some(QuorumCert {
		view: parent.view,
		block_hash: parent.hash,
		signers: {
			let mut bitmap = SignerBitmap::with_capacity(1);
			bitmap.set(0);
			bitmap
		},
		aggregate_signature: imposter
			.sign(&vote_signature_payload(parent.view, &parent.hash)),
	});
	let err = pipeline.process_block(bad_qc).unwrap_err();
	assert!(matches!(err, ChainError::Rule(RuleError::InvalidQuorumCert)));

	// the honest version of the same block is accepted
	let honest = build_block(&parent, 11, 12, vec![], pkid(7), Some(&sk));
	let outcome = pipeline.process_block(honest).unwrap();
	assert!(matches!(outcome, ProcessOutcome::Accepted { .. }));
}

#[test]
fn test_jail_sweep_propagates_with_two_epoch_lag() {
	// grace 10, lookback 2; validator last active in epoch 1
	let store = MemoryKvStore::new();
	let sk = BlsSecretKey::from_seed(&[9u8; 32]);
	{
		let mut view = UtxoView::new(store.snapshot());
		let mut params = GlobalParamsEntry::default();
		params.epoch_duration_blocks = 1;
		view.set_global_params(params);
		view.set_current_epoch(EpochEntry {
			epoch_number: 1,
			final_block_height: 1,
		});
		view.set_validator_entry(ValidatorEntry {
			validator_id: lockchain_core::types::Hash256::zero(),
			pkid: pkid(5),
			voting_public_key: sk.public_key(),
			domains: vec![b"node:1".to_vec()],
			disable_delegated_stake: false,
			total_stake: U256::from(50u64),
			created_at_height: 0,
			status: ValidatorStatus::Active,
			jailed_at_epoch: None,
			last_active_at_epoch: 1,
			extra: BTreeMap::new(),
		})
		.unwrap();
		let mut batch = WriteBatch::new();
		view.flush(&mut batch).unwrap();
		store.write_batch(&batch).unwrap();
	}

	// run the hook for epochs 1 through 13
	for height in 1..=13u64 {
		let mut view = UtxoView::new(store.snapshot());
		view.run_epoch_complete_hook(height).unwrap();
		let mut batch = WriteBatch::new();
		view.flush(&mut batch).unwrap();
		store.write_batch(&batch).unwrap();
	}

	let mut view = UtxoView::new(store.snapshot());
	// jailed at the end of epoch 11 (idle for the full grace period)
	let live = view.get_validator_by_pkid(&pkid(5)).unwrap().unwrap();
	assert_eq!(live.status, ValidatorStatus::Jailed);
	assert_eq!(live.jailed_at_epoch, Some(11));

	// snapshots consumed two epochs later: the sets used by epochs 12 and
	// 13 (written at 10 and 11) still show the validator active; the set
	// used by epoch 14 (written at 12) shows it jailed
	let used_by_12 = view.get_snapshot_validator(10, &pkid(5)).unwrap().unwrap();
	assert_eq!(used_by_12.status, ValidatorStatus::Active);
	let used_by_13 = view.get_snapshot_validator(11, &pkid(5)).unwrap().unwrap();
	assert_eq!(used_by_13.status, ValidatorStatus::Active);
	let used_by_14 = view.get_snapshot_validator(12, &pkid(5)).unwrap().unwrap();
	assert_eq!(used_by_14.status, ValidatorStatus::Jailed);

	// the jailed validator left the global tally but kept its stake
	assert_eq!(view.get_global_stake().unwrap(), U256::zero());
	assert_eq!(used_by_14.total_stake, U256::from(50u64));
}

struct OrderRecorder {
	log: Arc<Mutex<Vec<String>>>,
}

impl ChainListener for OrderRecorder {
	fn on_transaction_connected(
		&mut self,
		_block_hash: &BlockHash,
		_txn: &Transaction,
	) -> ListenerResult {
		self.log.lock().unwrap().push("txn".to_string());
		Ok(())
	}

	fn on_block_connected(&mut self, _block: &Block) -> ListenerResult {
		self.log.lock().unwrap().push("connected".to_string());
		Ok(())
	}

	fn on_block_accepted(&mut self, _block: &Block) -> ListenerResult {
		self.log.lock().unwrap().push("accepted".to_string());
		Ok(())
	}

	fn on_store_flushed(&mut self, _flush_id: u64, success: bool) -> ListenerResult {
		self.log
			.lock()
			.unwrap()
			.push(format!("flushed:{}", success));
		Ok(())
	}
}

#[test]
fn test_event_ordering() {
	let log = Arc::new(Mutex::new(Vec::new()));
	let mut bus = EventBus::new();
	bus.register(Box::new(OrderRecorder { log: log.clone() }));

	let store = Arc::new(MemoryKvStore::new());
	let mut pipeline = ChainPipeline::new(store, &simple_genesis(3_600), bus).unwrap();
	log.lock().unwrap().clear(); // drop the genesis flush noise

	let genesis = genesis_parent(&pipeline);
	let b1 = build_block(
		&genesis,
		1,
		2,
		vec![lockup_txn(100, 1_000_000)],
		pkid(1),
		None,
	);
	pipeline.process_block(b1).unwrap();

	// transaction events precede block-connected, which precedes accepted
	let events = log.lock().unwrap().clone();
	assert_eq!(events, vec!["txn", "connected", "accepted"]);
}
