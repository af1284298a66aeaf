//! Synchronous fan-out of chain notifications. Listeners run on the calling
//! thread in registration order; a failing listener is logged and skipped so
//! it can never break consensus.

use crate::block::Block;
use crate::txn::Transaction;
use crate::types::BlockHash;
use lockchain_storage::WriteOp;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerError(pub String);

impl std::fmt::Display for ListenerError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

pub type ListenerResult = std::result::Result<(), ListenerError>;

/// Chain notifications. Listeners must be non-blocking. Default impls make
/// every hook optional.
pub trait ChainListener: Send {
	fn on_transaction_connected(
		&mut self,
		_block_hash: &BlockHash,
		_txn: &Transaction,
	) -> ListenerResult {
		Ok(())
	}

	fn on_block_connected(&mut self, _block: &Block) -> ListenerResult {
		Ok(())
	}

	fn on_block_disconnected(&mut self, _block: &Block) -> ListenerResult {
		Ok(())
	}

	fn on_block_accepted(&mut self, _block: &Block) -> ListenerResult {
		Ok(())
	}

	fn on_store_write(&mut self, _op: &WriteOp) -> ListenerResult {
		Ok(())
	}

	fn on_store_flushed(&mut self, _flush_id: u64, _success: bool) -> ListenerResult {
		Ok(())
	}
}

/// Registration-ordered listener fan-out.
#[derive(Default)]
pub struct EventBus {
	listeners: Vec<Box<dyn ChainListener>>,
}

impl EventBus {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&mut self, listener: Box<dyn ChainListener>) {
		self.listeners.push(listener);
	}

	pub fn listener_count(&self) -> usize {
		self.listeners.len()
	}

	fn dispatch<F>(&mut self, event: &str, mut f: F)
	where
		F: FnMut(&mut dyn ChainListener) -> ListenerResult,
	{
		for listener in &mut self.listeners {
			if let Err(err) = f(listener.as_mut()) {
				warn!(event, error = %err, "chain listener failed; continuing");
			}
		}
	}

	pub fn transaction_connected(&mut self, block_hash: &BlockHash, txn: &Transaction) {
		self.dispatch("transaction_connected", |l| {
			l.on_transaction_connected(block_hash, txn)
		});
	}

	pub fn block_connected(&mut self, block: &Block) {
		self.dispatch("block_connected", |l| l.on_block_connected(block));
	}

	pub fn block_disconnected(&mut self, block: &Block) {
		self.dispatch("block_disconnected", |l| l.on_block_disconnected(block));
	}

	pub fn block_accepted(&mut self, block: &Block) {
		self.dispatch("block_accepted", |l| l.on_block_accepted(block));
	}

	pub fn store_write(&mut self, op: &WriteOp) {
		self.dispatch("store_write", |l| l.on_store_write(op));
	}

	pub fn store_flushed(&mut self, flush_id: u64, success: bool) {
		self.dispatch("store_flushed", |l| l.on_store_flushed(flush_id, success));
	}
}
