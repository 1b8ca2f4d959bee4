//! In-memory dashboard resolver for testing.
//!
//! Stores each dashboard's component metadata as JSON, the same shape as
//! `dashboards.stored_metadata`, and matches references in both forms.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;

use crate::domain::foundation::{DashboardId, DataCollectionId};
use crate::ports::{DashboardResolver, ResolveError};

#[derive(Default)]
pub struct InMemoryDashboardResolver {
    dashboards: RwLock<BTreeMap<DashboardId, Vec<JsonValue>>>,
    force_error: RwLock<Option<ResolveError>>,
}

impl InMemoryDashboardResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a dashboard with the given component metadata.
    pub async fn insert_dashboard(&self, dashboard_id: DashboardId, components: Vec<JsonValue>) {
        self.dashboards.write().await.insert(dashboard_id, components);
    }

    /// Forces all lookups to fail until cleared with `None`.
    pub async fn set_error(&self, error: Option<ResolveError>) {
        *self.force_error.write().await = error;
    }
}

#[async_trait]
impl DashboardResolver for InMemoryDashboardResolver {
    async fn resolve_affected_dashboards(
        &self,
        data_collection_id: &DataCollectionId,
    ) -> Result<Vec<DashboardId>, ResolveError> {
        if let Some(error) = self.force_error.read().await.clone() {
            return Err(error);
        }

        let dashboards = self.dashboards.read().await;
        Ok(dashboards
            .iter()
            .filter(|(_, components)| {
                components.iter().any(|component| {
                    component
                        .get(DataCollectionId::REFERENCE_KEY)
                        .is_some_and(|reference| data_collection_id.is_referenced_by(reference))
                })
            })
            .map(|(id, _)| id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dashboard(id: &str) -> DashboardId {
        DashboardId::new(id).unwrap()
    }

    fn dc(id: &str) -> DataCollectionId {
        DataCollectionId::new(id).unwrap()
    }

    #[tokio::test]
    async fn matches_string_and_native_references() {
        let resolver = InMemoryDashboardResolver::new();
        resolver
            .insert_dashboard(dashboard("d-string"), vec![json!({"dc_id": "dc-7", "index": 1})])
            .await;
        resolver
            .insert_dashboard(dashboard("d-native"), vec![json!({"dc_id": {"$oid": "dc-7"}})])
            .await;
        resolver
            .insert_dashboard(dashboard("d-other"), vec![json!({"dc_id": "dc-8"})])
            .await;

        let affected = resolver.resolve_affected_dashboards(&dc("dc-7")).await.unwrap();
        assert_eq!(affected, vec![dashboard("d-native"), dashboard("d-string")]);
    }

    #[tokio::test]
    async fn unreferenced_collection_resolves_to_nothing() {
        let resolver = InMemoryDashboardResolver::new();
        resolver
            .insert_dashboard(dashboard("d1"), vec![json!({"wf_id": "dc-42"})])
            .await;

        assert!(resolver
            .resolve_affected_dashboards(&dc("dc-42"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn forced_error_is_returned() {
        let resolver = InMemoryDashboardResolver::new();
        resolver
            .set_error(Some(ResolveError::Database("down".to_string())))
            .await;

        assert!(resolver.resolve_affected_dashboards(&dc("dc-1")).await.is_err());
    }
}
