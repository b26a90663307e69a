//! Peer sessions and the registry that owns them.

mod registry;
mod senders;
mod session;
mod state;

pub use registry::PeerRegistry;
pub use senders::{LocalSender, SenderSet};
pub use session::{DeferredSignal, PeerSession};
pub use state::{NegotiationOp, NegotiationRole, PeerState, SenderAttachState};
