//! Request/response relay between the agent and the IDE peer
//!
//! Push mode: [`Dispatcher`] sends to a peer discovered by [`EndpointRegistry`]
//! and waits on a [`CorrelationTable`] entry that the callback listener
//! resolves. Pull mode: [`FsTransport`] exchanges files in a shared directory.

pub mod correlation;
pub mod discovery;
pub mod dispatcher;
pub mod filesystem;
pub mod parser;

pub use correlation::{CorrelationTable, PendingEntry, Resolution, WaitOutcome};
pub use discovery::EndpointRegistry;
pub use dispatcher::{DispatchRequest, Dispatcher};
pub use filesystem::{CollectRequest, FeedbackResult, FsTransport, ResponseFile};
pub use parser::parse;
