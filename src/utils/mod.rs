/// Utility modules shared across the relay, the listener and the history store.
pub mod time;

pub use time::now_utc;
