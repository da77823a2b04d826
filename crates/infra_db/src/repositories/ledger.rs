//! Payment ledger repository
//!
//! Entries are only ever inserted. Each ledger mutation writes the new entry
//! and the derived charge and bill state in one transaction, so a reader
//! never sees a payment without the paid flags it produced.
//!
//! The transaction locks the bill row and its charge rows before reading the
//! ledger, so concurrent writes against one bill run one after another and
//! each is settled against what the previous one committed.

use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use domain_billing::{LedgerOutcome, LedgerWrite, PaymentQuery, TenantUtilityCharge, UtilityBill, UtilityPayment};

use crate::error::DatabaseError;
use crate::repositories::bills::{update_bill_paid_state, update_charge_state};
use crate::rows::{
    convert_all, BillRow, ChargeRow, DbEntryKind, PaymentRow, BILL_COLUMNS, CHARGE_COLUMNS, PAYMENT_COLUMNS,
};

/// Repository for ledger entries
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Entries for any of `charge_ids`, oldest first
    pub async fn entries_for_charges(&self, charge_ids: &[Uuid]) -> Result<Vec<UtilityPayment>, DatabaseError> {
        if charge_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM utility_payments WHERE charge_id = ANY($1) \
             ORDER BY payment_date, created_at"
        );
        let rows = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(charge_ids)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    pub async fn find(&self, query: &PaymentQuery) -> Result<Vec<UtilityPayment>, DatabaseError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {PAYMENT_COLUMNS} FROM utility_payments WHERE owner_id = "
        ));
        builder.push_bind(Uuid::from(query.owner_id));

        if let Some(property_id) = query.property_id {
            builder.push(" AND property_id = ").push_bind(Uuid::from(property_id));
        }
        if let Some(lease_id) = query.lease_id {
            builder.push(" AND lease_id = ").push_bind(Uuid::from(lease_id));
        }
        if let Some(range) = query.range {
            builder
                .push(" AND payment_date BETWEEN ")
                .push_bind(range.start)
                .push(" AND ")
                .push_bind(range.end);
        }
        builder.push(" ORDER BY payment_date DESC, created_at DESC");

        let rows: Vec<PaymentRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        convert_all(rows)
    }

    /// Settles the write against the locked ledger, then appends the entry,
    /// if any, and saves the charge and bill state it produced
    pub async fn apply(&self, write: LedgerWrite) -> Result<LedgerOutcome, DatabaseError> {
        let started = Utc::now();
        let charge_id = Uuid::from(write.charge.id);
        let bill_id = Uuid::from(write.charge.bill_id);
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {BILL_COLUMNS} FROM utility_bills WHERE bill_id = $1 FOR UPDATE");
        let bill: UtilityBill = sqlx::query_as::<_, BillRow>(&sql)
            .bind(bill_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DatabaseError::not_found("UtilityBill", bill_id))?
            .try_into()?;

        let sql = format!(
            "SELECT {CHARGE_COLUMNS} FROM tenant_utility_charges WHERE bill_id = $1 \
             ORDER BY charge_id FOR UPDATE"
        );
        let siblings: Vec<TenantUtilityCharge> = convert_all(
            sqlx::query_as::<_, ChargeRow>(&sql)
                .bind(bill_id)
                .fetch_all(&mut *tx)
                .await?,
        )?;

        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM utility_payments WHERE charge_id = $1 \
             ORDER BY payment_date, created_at"
        );
        let entries: Vec<UtilityPayment> = convert_all(
            sqlx::query_as::<_, PaymentRow>(&sql)
                .bind(charge_id)
                .fetch_all(&mut *tx)
                .await?,
        )?;

        // dropping the transaction rolls it back
        let (entry, outcome) = write.resolve(bill, siblings, &entries)?;

        if let Some(entry) = &entry {
            let sql = format!(
                "INSERT INTO utility_payments ({PAYMENT_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
            );
            sqlx::query(&sql)
                .bind(Uuid::from(entry.id))
                .bind(Uuid::from(entry.charge_id))
                .bind(Uuid::from(entry.bill_id))
                .bind(Uuid::from(entry.lease_id))
                .bind(Uuid::from(entry.property_id))
                .bind(Uuid::from(entry.owner_id))
                .bind(DbEntryKind::from(entry.kind))
                .bind(entry.amount.amount())
                .bind(entry.amount.currency().code())
                .bind(entry.payment_date)
                .bind(entry.method.as_str())
                .bind(&entry.reference)
                .bind(&entry.notes)
                .bind(entry.created_at)
                .execute(&mut *tx)
                .await?;
        }

        update_charge_state(&mut tx, &outcome.charge).await?;
        update_bill_paid_state(&mut tx, &outcome.bill).await?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        debug!(
            %charge_id,
            entry = entry.is_some(),
            bill_paid = outcome.bill.is_paid,
            elapsed_ms = (Utc::now() - started).num_milliseconds(),
            "Applied ledger write"
        );
        Ok(outcome)
    }
}
