//! DashboardResolver port - which dashboards reference a data collection.

use async_trait::async_trait;

use crate::domain::foundation::{DashboardId, DataCollectionId};

/// Errors that can occur while resolving dashboards.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("Database error: {0}")]
    Database(String),
}

/// Port for finding the dashboards affected by a data collection change.
///
/// # Contract
///
/// A dashboard is affected when any of its stored component metadata
/// references the data collection under `dc_id`, in either the string form
/// (`"<id>"`) or the native form (`{"$oid": "<id>"}`). Both must match.
/// Returns an empty vec when nothing references the id.
#[async_trait]
pub trait DashboardResolver: Send + Sync {
    async fn resolve_affected_dashboards(
        &self,
        data_collection_id: &DataCollectionId,
    ) -> Result<Vec<DashboardId>, ResolveError>;
}
