//! Application layer - background services of the realtime subsystem.
//!
//! - `ChangeWatcher` - Tails the change feed and resolves affected dashboards
//! - `EventCoordinator` - Wires watcher, bus and heartbeat; owns their lifecycles

pub mod change_watcher;
pub mod coordinator;

pub use change_watcher::ChangeWatcher;
pub use coordinator::{
    ChangeSource, CoordinatorStatus, DashboardFanout, EventCoordinator, SupervisedTask,
};
