//! Primary/Secondary Failover
//!
//! A secondary instance receives the same traps as its primary but stays
//! silent while the primary answers its liveness probe.

mod error;
mod gate;
mod probe;

pub use error::FailoverError;
pub use gate::{FailoverGate, DEFAULT_CHECK_INTERVAL};
pub use probe::{HttpPeerProbe, PeerProbe};
