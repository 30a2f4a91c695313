//! HTTP exchange with the IDE peer
//!
//! `protocol` holds the wire types; `server` is the callback listener that
//! receives answers and resolves correlation entries.

pub mod protocol;
pub mod server;

pub use protocol::{Ack, AskReply, AskRequest, ResolutionPayload};
pub use server::{router, start_listener, ListenerHandle, ListenerState};
