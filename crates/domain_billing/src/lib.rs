//! Billing Domain - utility bills, tenant charges and the payment ledger
//!
//! This crate turns utility invoices into per-lease charges and tracks what
//! tenants have paid against them.
//!
//! # Flow
//!
//! 1. `BillService::add_bill` stores a bill together with the charges the
//!    `ChargeCalculator` derives from the property's allocation settings
//! 2. `PaymentLedger::record_payment` appends ledger entries against a
//!    charge; a charge is paid once its entries cover it
//! 3. A bill is paid exactly when every one of its charges is paid
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::{BillService, InMemoryStore, PaymentLedger};
//!
//! let store = Arc::new(InMemoryStore::new());
//! let bills = BillService::new(store.clone(), clock.clone());
//! let bill = bills.add_bill(owner, request).await?;
//!
//! let ledger = PaymentLedger::new(store, clock);
//! let receipt = ledger.record_payment(owner, payment).await?;
//! ```

pub mod error;
pub mod bill;
pub mod charge;
pub mod payment;
pub mod calculator;
pub mod ports;
pub mod memory;
pub mod lifecycle;
pub mod ledger;
pub mod reconciliation;
pub mod statement;

#[cfg(test)]
mod testing;

pub use error::{BillingError, ErrorKind};
pub use bill::{
    BillFilter, BillQuery, BillUpdate, BulkAddResult, BulkBillSpec, BulkItemError, BulkItemWarning,
    MonthlyBillTotal, NewBill, UnpaidBill, UtilityBill,
};
pub use charge::{is_bill_settled, ChargeBalance, TenantUtilityCharge};
pub use payment::{EntryKind, PaymentMethod, UtilityPayment};
pub use calculator::{ChargeCalculator, PreviewLine, SplitPreview};
pub use ports::{BillingStore, BillingStoreExt, ChargeQuery, LedgerOutcome, LedgerWrite, PaymentQuery};
pub use memory::InMemoryStore;
pub use lifecycle::{BillService, BillWithCharges};
pub use ledger::{
    LedgerConflict, MarkPaidOutcome, PaymentLedger, PaymentReceipt, PaymentRequest, ReversalOutcome,
};
pub use reconciliation::{BatchItem, BatchResult, ItemError};
pub use statement::{
    BalanceTotals, ChargesSummary, LeaseBalance, MethodTotal, OldestCharge, OutstandingCharge, PaymentRecord,
    PaymentSummary, ReportFilter, StatementLine, StatementService, TenantOutstanding, TenantStatement,
};
