//! Trap Match Groups
//!
//! A match group is a named rule set deciding which traps belong together,
//! plus the consolidation policy that applies to them:
//! - Sender, variable and body filters
//! - Rolling-window or fixed daily schedule consolidation
//! - Per-group digest accumulator and send bookkeeping

mod config;
mod digest;
mod error;
mod group;
mod matcher;
mod schedule;

pub use config::{ForwardConfig, GroupConfig, VarConfig, DEFAULT_LIMIT, DEFAULT_MINUTES};
pub use digest::Digest;
pub use error::GroupError;
pub use group::{GroupRuntime, MatchGroup, Placeholders, Policy};
pub use matcher::{SenderPattern, VarPredicate};
pub use schedule::ScheduleIndex;

/// `chrono` format used for the `start_date` digest placeholder
pub const START_DATE_FORMAT: &str = "%m-%d %H:%M";
