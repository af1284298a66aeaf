pub mod event_loop;
pub mod messages;
pub mod signer;

pub use event_loop::{ConsensusEvent, EventLoop, OutboundMessage};
pub use messages::{TimeoutMessage, VoteMessage};
pub use signer::ConsensusSigner;
