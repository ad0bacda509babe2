//! Trap Event Model
//!
//! Parsed network-management alert events as handed over by the transport
//! layer: sender address, ordered variable bindings and a handled flag.

mod error;
mod event;
mod oid;
mod value;

pub use error::ModelError;
pub use event::{TrapEvent, VarBinding};
pub use oid::Oid;
pub use value::Value;
