//! In-memory adapters for the change source ports.
//!
//! Used by tests and by local runs without a database.

mod change_feed;
mod dashboard_resolver;

pub use change_feed::InMemoryChangeFeed;
pub use dashboard_resolver::InMemoryDashboardResolver;
