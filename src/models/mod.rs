mod agent;
mod request;
mod segment;

pub use agent::{generate_friendly_name, AgentIdentity, AgentRegistration};
pub use request::{new_request_id, Request, RequestStatus, Response};
pub use segment::Segment;
