//! Core data model.
//!
//! An event envelope is what travels on the queue. Result rows come back from
//! the upstream lookup, and each one becomes a persisted result once the
//! schedule period has been resolved.

pub mod event;
pub mod result;

pub use event::{EventEnvelope, LeagueType};
pub use result::{PersistedResult, ResultRow, ScheduleRef};
