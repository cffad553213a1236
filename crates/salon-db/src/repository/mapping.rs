//! # Service Consumption Mappings
//!
//! How much of each product a service uses, e.g. a hair-color service
//! consuming 2 tubes of dye. Maintained by the catalog collaborator.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use salon_core::ServiceProductUsage;

#[derive(Debug, Clone)]
pub struct MappingRepository {
    pool: SqlitePool,
}

impl MappingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MappingRepository { pool }
    }

    /// Inserts or replaces the quantity for a (service, product) pair.
    pub async fn upsert(&self, usage: &ServiceProductUsage) -> DbResult<()> {
        debug!(
            service_id = %usage.service_id,
            product_id = %usage.product_id,
            quantity = usage.quantity_per_service,
            "Upserting service consumption mapping"
        );

        sqlx::query(
            r#"
            INSERT INTO service_product_usage (service_id, product_id, quantity_per_service)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (service_id, product_id)
            DO UPDATE SET quantity_per_service = excluded.quantity_per_service
            "#,
        )
        .bind(&usage.service_id)
        .bind(&usage.product_id)
        .bind(usage.quantity_per_service)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Products consumed by one service.
    pub async fn for_service(&self, service_id: &str) -> DbResult<Vec<ServiceProductUsage>> {
        let rows: Vec<ServiceProductUsage> = sqlx::query_as(
            r#"
            SELECT service_id, product_id, quantity_per_service
            FROM service_product_usage
            WHERE service_id = ?1
            ORDER BY product_id
            "#,
        )
        .bind(service_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn list_all(&self) -> DbResult<Vec<ServiceProductUsage>> {
        let rows: Vec<ServiceProductUsage> = sqlx::query_as(
            r#"
            SELECT service_id, product_id, quantity_per_service
            FROM service_product_usage
            ORDER BY service_id, product_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
