//! Bill and charge repository
//!
//! A bill and its charges are always written in the same transaction. The
//! `uq_bill_property_type_month` constraint is the final word on duplicates;
//! its violation surfaces as `DatabaseError::DuplicateEntry`.

use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::debug;
use uuid::Uuid;

use core_kernel::BillingMonth;
use domain_allocation::UtilityType;
use domain_billing::{BillQuery, ChargeQuery, TenantUtilityCharge, UtilityBill};

use crate::error::DatabaseError;
use crate::rows::{convert_all, BillRow, ChargeRow, BILL_COLUMNS, CHARGE_COLUMNS};

/// Repository for utility bills and their tenant charges
#[derive(Debug, Clone)]
pub struct BillRepository {
    pool: PgPool,
}

impl BillRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, bill_id: Uuid) -> Result<UtilityBill, DatabaseError> {
        let sql = format!("SELECT {BILL_COLUMNS} FROM utility_bills WHERE bill_id = $1");
        let row = sqlx::query_as::<_, BillRow>(&sql)
            .bind(bill_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("UtilityBill", bill_id))?;
        row.try_into()
    }

    pub async fn find_one(
        &self,
        property_id: Uuid,
        utility_type: UtilityType,
        billing_month: BillingMonth,
    ) -> Result<Option<UtilityBill>, DatabaseError> {
        let sql = format!(
            "SELECT {BILL_COLUMNS} FROM utility_bills \
             WHERE property_id = $1 AND utility_type = $2 AND billing_month = $3"
        );
        let row = sqlx::query_as::<_, BillRow>(&sql)
            .bind(property_id)
            .bind(utility_type.as_str())
            .bind(billing_month.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(UtilityBill::try_from).transpose()
    }

    /// Lists bills matching every set field of `query`, newest month first
    pub async fn find(&self, query: &BillQuery) -> Result<Vec<UtilityBill>, DatabaseError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {BILL_COLUMNS} FROM utility_bills WHERE owner_id = "));
        builder.push_bind(Uuid::from(query.owner_id));

        if let Some(property_id) = query.property_id {
            builder.push(" AND property_id = ").push_bind(Uuid::from(property_id));
        }
        if let Some(month) = query.billing_month {
            builder.push(" AND billing_month = ").push_bind(month.to_string());
        }
        if let Some(utility_type) = query.utility_type {
            builder.push(" AND utility_type = ").push_bind(utility_type.as_str());
        }
        if let Some(owner_paid) = query.owner_paid {
            builder.push(" AND owner_paid = ").push_bind(owner_paid);
        }
        // "YYYY-MM" sorts the same as the month it names
        if let Some(from) = query.from_month {
            builder.push(" AND billing_month >= ").push_bind(from.to_string());
        }
        if let Some(to) = query.to_month {
            builder.push(" AND billing_month <= ").push_bind(to.to_string());
        }
        builder.push(" ORDER BY billing_month DESC, utility_type");

        let rows: Vec<BillRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        convert_all(rows)
    }

    pub async fn insert(
        &self,
        bill: &UtilityBill,
        charges: &[TenantUtilityCharge],
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        insert_bill(&mut tx, bill).await?;
        insert_charges(&mut tx, charges).await?;
        tx.commit().await?;

        debug!(bill_id = %bill.id, charges = charges.len(), "Inserted utility bill");
        Ok(())
    }

    /// Saves the bill row, and when `charges` is given, its whole charge set
    pub async fn update(
        &self,
        bill: &UtilityBill,
        charges: Option<&[TenantUtilityCharge]>,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE utility_bills
            SET utility_type = $2, provider = $3, billing_month = $4, total_amount = $5, currency = $6,
                bill_date = $7, due_date = $8, owner_paid = $9, owner_paid_date = $10, is_paid = $11,
                paid_date = $12, notes = $13, document_id = $14, updated_at = $15
            WHERE bill_id = $1
            "#,
        )
        .bind(Uuid::from(bill.id))
        .bind(bill.utility_type.as_str())
        .bind(&bill.provider)
        .bind(bill.billing_month.to_string())
        .bind(bill.total_amount.amount())
        .bind(bill.total_amount.currency().code())
        .bind(bill.bill_date)
        .bind(bill.due_date)
        .bind(bill.owner_paid)
        .bind(bill.owner_paid_date)
        .bind(bill.is_paid)
        .bind(bill.paid_date)
        .bind(&bill.notes)
        .bind(bill.document_id.map(Uuid::from))
        .bind(bill.updated_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(DatabaseError::not_found("UtilityBill", bill.id));
        }

        if let Some(charges) = charges {
            // Fails on the ledger's foreign key if any replaced charge has entries
            sqlx::query("DELETE FROM tenant_utility_charges WHERE bill_id = $1")
                .bind(Uuid::from(bill.id))
                .execute(&mut *tx)
                .await?;
            insert_charges(&mut tx, charges).await?;
        }

        tx.commit().await?;
        debug!(bill_id = %bill.id, replaced_charges = charges.is_some(), "Updated utility bill");
        Ok(())
    }

    pub async fn delete(&self, bill_id: Uuid) -> Result<(), DatabaseError> {
        let deleted = sqlx::query("DELETE FROM utility_bills WHERE bill_id = $1")
            .bind(bill_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(DatabaseError::not_found("UtilityBill", bill_id));
        }
        Ok(())
    }

    pub async fn get_charge(&self, charge_id: Uuid) -> Result<TenantUtilityCharge, DatabaseError> {
        let sql = format!("SELECT {CHARGE_COLUMNS} FROM tenant_utility_charges WHERE charge_id = $1");
        let row = sqlx::query_as::<_, ChargeRow>(&sql)
            .bind(charge_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("TenantUtilityCharge", charge_id))?;
        row.try_into()
    }

    pub async fn charges_for_bill(&self, bill_id: Uuid) -> Result<Vec<TenantUtilityCharge>, DatabaseError> {
        let sql = format!(
            "SELECT {CHARGE_COLUMNS} FROM tenant_utility_charges WHERE bill_id = $1 ORDER BY tenant_name"
        );
        let rows = sqlx::query_as::<_, ChargeRow>(&sql)
            .bind(bill_id)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    pub async fn find_charges(&self, query: &ChargeQuery) -> Result<Vec<TenantUtilityCharge>, DatabaseError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {CHARGE_COLUMNS} FROM tenant_utility_charges WHERE owner_id = "
        ));
        builder.push_bind(Uuid::from(query.owner_id));

        if let Some(property_id) = query.property_id {
            builder.push(" AND property_id = ").push_bind(Uuid::from(property_id));
        }
        if let Some(lease_id) = query.lease_id {
            builder.push(" AND lease_id = ").push_bind(Uuid::from(lease_id));
        }
        if query.unpaid_only {
            builder.push(" AND NOT is_paid");
        }
        builder.push(" ORDER BY due_date, tenant_name");

        let rows: Vec<ChargeRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        convert_all(rows)
    }
}

async fn insert_bill(tx: &mut Transaction<'_, Postgres>, bill: &UtilityBill) -> Result<(), DatabaseError> {
    let sql = format!(
        "INSERT INTO utility_bills ({BILL_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)"
    );
    sqlx::query(&sql)
        .bind(Uuid::from(bill.id))
        .bind(Uuid::from(bill.owner_id))
        .bind(Uuid::from(bill.property_id))
        .bind(bill.utility_type.as_str())
        .bind(&bill.provider)
        .bind(bill.billing_month.to_string())
        .bind(bill.total_amount.amount())
        .bind(bill.total_amount.currency().code())
        .bind(bill.bill_date)
        .bind(bill.due_date)
        .bind(bill.owner_paid)
        .bind(bill.owner_paid_date)
        .bind(bill.is_paid)
        .bind(bill.paid_date)
        .bind(&bill.notes)
        .bind(bill.document_id.map(Uuid::from))
        .bind(bill.created_at)
        .bind(bill.updated_at)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn insert_charges(
    tx: &mut Transaction<'_, Postgres>,
    charges: &[TenantUtilityCharge],
) -> Result<(), DatabaseError> {
    if charges.is_empty() {
        return Ok(());
    }
    let mut builder = QueryBuilder::<Postgres>::new(format!("INSERT INTO tenant_utility_charges ({CHARGE_COLUMNS}) "));
    builder.push_values(charges, |mut row, charge| {
        row.push_bind(Uuid::from(charge.id))
            .push_bind(Uuid::from(charge.bill_id))
            .push_bind(Uuid::from(charge.lease_id))
            .push_bind(Uuid::from(charge.property_id))
            .push_bind(Uuid::from(charge.owner_id))
            .push_bind(charge.tenant_name.clone())
            .push_bind(charge.unit_label.clone())
            .push_bind(charge.charged_amount.amount())
            .push_bind(charge.charged_amount.currency().code())
            .push_bind(charge.responsibility_percentage.value())
            .push_bind(charge.due_date)
            .push_bind(charge.is_paid)
            .push_bind(charge.paid_date)
            .push_bind(charge.notes.clone())
            .push_bind(charge.created_at)
            .push_bind(charge.updated_at);
    });
    builder.build().execute(&mut **tx).await?;
    Ok(())
}

/// Writes the derived charge state produced by a ledger mutation
pub(crate) async fn update_charge_state(
    tx: &mut Transaction<'_, Postgres>,
    charge: &TenantUtilityCharge,
) -> Result<(), DatabaseError> {
    let updated = sqlx::query(
        "UPDATE tenant_utility_charges SET is_paid = $2, paid_date = $3, notes = $4, updated_at = $5 \
         WHERE charge_id = $1",
    )
    .bind(Uuid::from(charge.id))
    .bind(charge.is_paid)
    .bind(charge.paid_date)
    .bind(&charge.notes)
    .bind(charge.updated_at)
    .execute(&mut **tx)
    .await?
    .rows_affected();
    if updated == 0 {
        return Err(DatabaseError::not_found("TenantUtilityCharge", charge.id));
    }
    Ok(())
}

/// Writes the bill's derived paid flag
pub(crate) async fn update_bill_paid_state(
    tx: &mut Transaction<'_, Postgres>,
    bill: &UtilityBill,
) -> Result<(), DatabaseError> {
    sqlx::query("UPDATE utility_bills SET is_paid = $2, paid_date = $3, updated_at = $4 WHERE bill_id = $1")
        .bind(Uuid::from(bill.id))
        .bind(bill.is_paid)
        .bind(bill.paid_date)
        .bind(bill.updated_at)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
