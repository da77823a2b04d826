//! Batch operations over the payment ledger
//!
//! Every item is applied as its own atomic ledger write. A failing item is
//! recorded and the batch moves on, so earlier items stay committed.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use core_kernel::{ChargeId, UserId};

use crate::error::{BillingError, ErrorKind};
use crate::ledger::{MarkPaidOutcome, PaymentLedger, PaymentReceipt, PaymentRequest};
use crate::ports::BillingStore;

/// Why one item of a batch failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&BillingError> for ItemError {
    fn from(error: &BillingError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Outcome of one item in a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem<T> {
    pub charge_id: ChargeId,
    pub success: bool,
    pub outcome: Option<T>,
    pub error: Option<ItemError>,
}

/// Per-item outcomes plus aggregate counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult<T> {
    pub results: Vec<BatchItem<T>>,
    pub succeeded: usize,
    pub failed: usize,
    /// True only when every item succeeded
    pub success: bool,
}

impl<T> BatchResult<T> {
    fn collect(results: Vec<BatchItem<T>>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        Self {
            results,
            succeeded,
            failed,
            success: failed == 0,
        }
    }
}

fn item<T>(charge_id: ChargeId, result: Result<T, BillingError>) -> BatchItem<T> {
    match result {
        Ok(outcome) => BatchItem {
            charge_id,
            success: true,
            outcome: Some(outcome),
            error: None,
        },
        Err(e) => {
            warn!(%charge_id, error = %e, "Batch item failed");
            BatchItem {
                charge_id,
                success: false,
                outcome: None,
                error: Some(ItemError::from(&e)),
            }
        }
    }
}

impl<S: BillingStore + ?Sized> PaymentLedger<S> {
    /// Marks each charge paid or unpaid independently
    #[instrument(skip(self, charge_ids), fields(count = charge_ids.len()))]
    pub async fn mark_bulk_paid(
        &self,
        user: UserId,
        charge_ids: Vec<ChargeId>,
        is_paid: bool,
    ) -> BatchResult<MarkPaidOutcome> {
        let mut results = Vec::with_capacity(charge_ids.len());
        for charge_id in charge_ids {
            results.push(item(charge_id, self.mark_paid(user, charge_id, is_paid, None).await));
        }
        let batch = BatchResult::collect(results);
        info!(succeeded = batch.succeeded, failed = batch.failed, is_paid, "Bulk marked charges");
        batch
    }

    /// Records each payment independently
    #[instrument(skip(self, requests), fields(count = requests.len()))]
    pub async fn apply_bulk_payments(
        &self,
        user: UserId,
        requests: Vec<PaymentRequest>,
    ) -> BatchResult<PaymentReceipt> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let charge_id = request.charge_id;
            results.push(item(charge_id, self.record_payment(user, request).await));
        }
        let batch = BatchResult::collect(results);
        info!(succeeded = batch.succeeded, failed = batch.failed, "Applied bulk payments");
        batch
    }
}
