//! ChangeListener port - receives resolved changes from the watcher.
//!
//! The watcher stays ignorant of delivery: it hands one unscoped event plus
//! the list of affected dashboards to its listener, which does the
//! per-dashboard fan-out.

use async_trait::async_trait;

use crate::domain::foundation::DashboardId;
use crate::domain::realtime::Event;

/// Callback invoked for every change that resolved to at least one dashboard.
#[async_trait]
pub trait ChangeListener: Send + Sync {
    /// Handle one resolved change. Must not fail; errors are logged inside.
    async fn on_change(&self, event: Event, dashboard_ids: Vec<DashboardId>);

    /// Listener name for logging.
    fn name(&self) -> &'static str;
}
