//! PostgreSQL implementation of DashboardResolver.
//!
//! `dashboards.stored_metadata` is a JSONB array of component metadata
//! objects. A component references a data collection through its `dc_id`
//! key, stored either as a plain string or in extended-JSON object id form.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::domain::foundation::{DashboardId, DataCollectionId};
use crate::ports::{DashboardResolver, ResolveError};

/// Matches both reference forms through JSONB containment, which the GIN
/// index on `stored_metadata` serves.
const AFFECTED_DASHBOARDS_SQL: &str = r#"
    SELECT dashboard_id FROM dashboards
    WHERE stored_metadata @> jsonb_build_array(jsonb_build_object('dc_id', $1::text))
       OR stored_metadata @> jsonb_build_array(
            jsonb_build_object('dc_id', jsonb_build_object('$oid', $1::text)))
    ORDER BY dashboard_id
"#;

#[derive(Clone)]
pub struct PostgresDashboardResolver {
    pool: PgPool,
}

impl PostgresDashboardResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DashboardResolver for PostgresDashboardResolver {
    async fn resolve_affected_dashboards(
        &self,
        data_collection_id: &DataCollectionId,
    ) -> Result<Vec<DashboardId>, ResolveError> {
        let rows = sqlx::query(AFFECTED_DASHBOARDS_SQL)
            .bind(data_collection_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ResolveError::Database(e.to_string()))?;

        let dashboards = rows
            .iter()
            .filter_map(|row| {
                let id: String = row.get("dashboard_id");
                DashboardId::new(id).ok()
            })
            .collect();

        Ok(dashboards)
    }
}
