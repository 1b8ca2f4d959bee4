//! Domain layer containing the realtime notification types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, auth, errors)
//! - `realtime` - The notification [`Event`](realtime::Event) and its payload shapes

pub mod foundation;
pub mod realtime;
