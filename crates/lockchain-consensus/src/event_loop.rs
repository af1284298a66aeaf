//! The single-threaded consensus event loop. Peripheral subsystems push
//! events onto the inbound queue; this loop drains it, drives the block
//! pipeline, and emits signed messages on the outbound queue. It blocks
//! only on the empty inbox and inside store flushes.

use crate::signer::{ConsensusSigner, TimeoutEvent, VoteEvent};
use lockchain_core::block::Block;
use lockchain_core::pipeline::{ChainPipeline, ProcessOutcome};
use lockchain_core::types::BlockHash;
use lockchain_core::{ChainError, Result};
use std::sync::mpsc::{Receiver, Sender};
use tracing::{error, info, warn};

pub enum ConsensusEvent {
	/// A block arrived from the network.
	BlockProposal(Box<Block>),
	/// The node is asked to vote on its tip.
	VoteRequest(VoteEvent),
	/// The node's view timer expired.
	TimeoutRequest(TimeoutEvent),
	Shutdown,
}

#[derive(Debug, Clone)]
pub enum OutboundMessage {
	Vote(crate::messages::VoteMessage),
	Timeout(crate::messages::TimeoutMessage),
	/// Ancestors the pipeline needs before an orphan can connect.
	BlocksWanted(Vec<BlockHash>),
}

pub struct EventLoop {
	pipeline: ChainPipeline,
	signer: Option<ConsensusSigner>,
	inbox: Receiver<ConsensusEvent>,
	outbox: Sender<OutboundMessage>,
}

impl EventLoop {
	pub fn new(
		pipeline: ChainPipeline,
		signer: Option<ConsensusSigner>,
		inbox: Receiver<ConsensusEvent>,
		outbox: Sender<OutboundMessage>,
	) -> Self {
		Self {
			pipeline,
			signer,
			inbox,
			outbox,
		}
	}

	pub fn pipeline(&self) -> &ChainPipeline {
		&self.pipeline
	}

	/// Drain the inbox until shutdown or a fatal error. Rule violations
	/// reject the offending input and the loop keeps running; storage and
	/// invariant failures halt it.
	pub fn run(mut self) -> Result<ChainPipeline> {
		info!("consensus event loop started");
		while let Ok(event) = self.inbox.recv() {
			if !self.handle_event(event)? {
				break;
			}
		}
		info!("consensus event loop stopped");
		Ok(self.pipeline)
	}

	fn handle_event(&mut self, event: ConsensusEvent) -> Result<bool> {
		match event {
			ConsensusEvent::BlockProposal(block) => {
				match self.pipeline.process_block(*block) {
					Ok(ProcessOutcome::Accepted { block_hash, committed }) => {
						info!(%block_hash, committed = committed.len(), "proposal accepted");
					}
					Ok(ProcessOutcome::SideBranch { block_hash }) => {
						info!(%block_hash, "proposal parked on side branch");
					}
					Ok(ProcessOutcome::Orphan { block_hash, missing }) => {
						info!(%block_hash, "proposal is an orphan");
						self.send(OutboundMessage::BlocksWanted(missing));
					}
					Err(ChainError::Rule(reason)) => {
						warn!(%reason, "proposal rejected");
					}
					Err(err) => {
						// a failed flush or broken invariant leaves nothing
						// safe to continue with
						error!(%err, "fatal pipeline error; halting");
						return Err(err);
					}
				}
			}
			ConsensusEvent::VoteRequest(vote_event) => {
				let Some(signer) = &self.signer else {
					warn!("vote requested but no signer is configured");
					return Ok(true);
				};
				match signer.vote(&vote_event) {
					Ok(vote) => self.send(OutboundMessage::Vote(vote)),
					Err(reason) => warn!(%reason, "vote request rejected"),
				}
			}
			ConsensusEvent::TimeoutRequest(timeout_event) => {
				let Some(signer) = &self.signer else {
					warn!("timeout requested but no signer is configured");
					return Ok(true);
				};
				let timed_out_view = timeout_event.view;
				match signer.timeout(&timeout_event, self.pipeline.current_view()) {
					Ok(timeout) => {
						self.send(OutboundMessage::Timeout(timeout));
						// a timed-out view is over; move past it
						self.pipeline.advance_view(timed_out_view + 1);
					}
					Err(reason) => warn!(%reason, "timeout request rejected"),
				}
			}
			ConsensusEvent::Shutdown => return Ok(false),
		}
		Ok(true)
	}

	fn send(&self, message: OutboundMessage) {
		if self.outbox.send(message).is_err() {
			warn!("outbound queue closed; dropping message");
		}
	}
}
