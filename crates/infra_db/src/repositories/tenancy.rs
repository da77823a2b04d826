//! Tenancy repository
//!
//! Properties and leases are read-only for the engine; the upserts exist so a
//! sync job or a test can mirror them in. Settings are owned here and are only
//! ever replaced as whole sets inside a transaction.

use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::debug;
use uuid::Uuid;

use domain_allocation::{AllocationSetting, Lease, Property, UtilityType};

use crate::error::DatabaseError;
use crate::rows::{
    convert_all, DbLeaseStatus, LeaseRow, PropertyRow, SettingRow, LEASE_COLUMNS, PROPERTY_COLUMNS,
    SETTING_COLUMNS,
};

/// Repository for properties, leases and responsibility settings
#[derive(Debug, Clone)]
pub struct TenancyRepository {
    pool: PgPool,
}

impl TenancyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_property(&self, property_id: Uuid) -> Result<Property, DatabaseError> {
        let sql = format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE property_id = $1");
        let row = sqlx::query_as::<_, PropertyRow>(&sql)
            .bind(property_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Property", property_id))?;
        Ok(row.into())
    }

    pub async fn properties_for_owner(&self, owner_id: Uuid) -> Result<Vec<Property>, DatabaseError> {
        let sql = format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE owner_id = $1 ORDER BY name");
        let rows = sqlx::query_as::<_, PropertyRow>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_lease(&self, lease_id: Uuid) -> Result<Lease, DatabaseError> {
        let sql = format!("SELECT {LEASE_COLUMNS} FROM leases WHERE lease_id = $1");
        let row = sqlx::query_as::<_, LeaseRow>(&sql)
            .bind(lease_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Lease", lease_id))?;
        Ok(row.into())
    }

    pub async fn leases_for_property(&self, property_id: Uuid) -> Result<Vec<Lease>, DatabaseError> {
        let sql = format!(
            "SELECT {LEASE_COLUMNS} FROM leases WHERE property_id = $1 ORDER BY unit_label NULLS LAST, tenant_name"
        );
        let rows = sqlx::query_as::<_, LeaseRow>(&sql)
            .bind(property_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Inserts or refreshes a mirrored property
    pub async fn upsert_property(&self, property: &Property) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO properties (property_id, owner_id, name, address)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (property_id) DO UPDATE
            SET owner_id = EXCLUDED.owner_id, name = EXCLUDED.name, address = EXCLUDED.address
            "#,
        )
        .bind(Uuid::from(property.id))
        .bind(Uuid::from(property.owner_id))
        .bind(&property.name)
        .bind(&property.address)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Inserts or refreshes a mirrored lease
    pub async fn upsert_lease(&self, lease: &Lease) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO leases (lease_id, property_id, unit_id, unit_label, tenant_name, status, start_date, end_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (lease_id) DO UPDATE
            SET unit_id = EXCLUDED.unit_id,
                unit_label = EXCLUDED.unit_label,
                tenant_name = EXCLUDED.tenant_name,
                status = EXCLUDED.status,
                start_date = EXCLUDED.start_date,
                end_date = EXCLUDED.end_date
            "#,
        )
        .bind(Uuid::from(lease.id))
        .bind(Uuid::from(lease.property_id))
        .bind(lease.unit_id.map(Uuid::from))
        .bind(&lease.unit_label)
        .bind(&lease.tenant_name)
        .bind(DbLeaseStatus::from(lease.status))
        .bind(lease.start_date)
        .bind(lease.end_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn settings_for_lease(&self, lease_id: Uuid) -> Result<Vec<AllocationSetting>, DatabaseError> {
        let sql = format!(
            "SELECT {SETTING_COLUMNS} FROM lease_utility_settings WHERE lease_id = $1 ORDER BY utility_type"
        );
        let rows = sqlx::query_as::<_, SettingRow>(&sql)
            .bind(lease_id)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    pub async fn settings_for_property(&self, property_id: Uuid) -> Result<Vec<AllocationSetting>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT {cols}
            FROM lease_utility_settings s
            JOIN leases l USING (lease_id)
            WHERE l.property_id = $1
            ORDER BY s.utility_type, s.lease_id
            "#,
            cols = qualified(SETTING_COLUMNS, "s")
        );
        let rows = sqlx::query_as::<_, SettingRow>(&sql)
            .bind(property_id)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    /// Swaps every `utility_type` setting on the property's leases for `settings`
    pub async fn replace_property_settings(
        &self,
        property_id: Uuid,
        utility_type: UtilityType,
        settings: &[AllocationSetting],
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            r#"
            DELETE FROM lease_utility_settings
            WHERE utility_type = $2
              AND lease_id IN (SELECT lease_id FROM leases WHERE property_id = $1)
            "#,
        )
        .bind(property_id)
        .bind(utility_type.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        insert_settings(&mut tx, settings).await?;
        tx.commit().await?;

        debug!(%property_id, %utility_type, removed, inserted = settings.len(), "Replaced property settings");
        Ok(())
    }

    /// Swaps every setting one lease holds for `settings`
    pub async fn replace_lease_settings(
        &self,
        lease_id: Uuid,
        settings: &[AllocationSetting],
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM lease_utility_settings WHERE lease_id = $1")
            .bind(lease_id)
            .execute(&mut *tx)
            .await?;

        insert_settings(&mut tx, settings).await?;
        tx.commit().await?;

        debug!(%lease_id, inserted = settings.len(), "Replaced lease settings");
        Ok(())
    }
}

async fn insert_settings(
    tx: &mut Transaction<'_, Postgres>,
    settings: &[AllocationSetting],
) -> Result<(), DatabaseError> {
    if settings.is_empty() {
        return Ok(());
    }
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "INSERT INTO lease_utility_settings ({SETTING_COLUMNS}) "
    ));
    builder.push_values(settings, |mut row, setting| {
        row.push_bind(Uuid::from(setting.id))
            .push_bind(Uuid::from(setting.lease_id))
            .push_bind(setting.utility_type.as_str())
            .push_bind(setting.percentage.value())
            .push_bind(setting.updated_at);
    });
    builder.build().execute(&mut **tx).await?;
    Ok(())
}

/// Prefixes each column in a column list with a table alias
pub(crate) fn qualified(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}
