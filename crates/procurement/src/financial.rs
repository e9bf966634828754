//! Financial reconciliation: bounding payments and deriving invoice state.
//!
//! The authoritative input is the invoice's set of completed payments.
//! `paid_amount` and the paid/partial/pending status are recomputed from that
//! set on every payment write; nothing increments in place. A cancelled
//! invoice's status is sticky and survives every recomputation.

use procura_core::{DomainError, DomainResult, SupplierPaymentId};

use crate::invoice::PurchaseInvoice;
use crate::payment::SupplierPayment;
use crate::status::{InvoiceStatus, PaymentStatus};

/// Sum of completed payment amounts.
pub fn paid_total(payments: &[SupplierPayment]) -> u64 {
    payments
        .iter()
        .filter(|payment| payment.status == PaymentStatus::Completed)
        .map(|payment| payment.amount)
        .sum()
}

/// Sum of completed payment amounts, leaving out the payment being edited.
pub fn paid_total_excluding(payments: &[SupplierPayment], excluding: SupplierPaymentId) -> u64 {
    payments
        .iter()
        .filter(|payment| payment.id != excluding)
        .filter(|payment| payment.status == PaymentStatus::Completed)
        .map(|payment| payment.amount)
        .sum()
}

/// Gate a new payment amount against the invoice balance.
///
/// `paid` must be freshly recomputed from the invoice's completed payments.
pub fn ensure_new_payment(
    invoice: &PurchaseInvoice,
    paid: u64,
    amount: u64,
) -> DomainResult<()> {
    if invoice.status == InvoiceStatus::Cancelled {
        return Err(DomainError::validation(format!(
            "invoice {} is cancelled and does not accept payments",
            invoice.id
        )));
    }
    if invoice.status == InvoiceStatus::Paid || paid >= invoice.total_amount {
        return Err(DomainError::validation(format!(
            "invoice {} is already fully paid ({paid} of {})",
            invoice.id, invoice.total_amount
        )));
    }

    ensure_amount_within_balance(invoice, paid, amount)
}

/// Gate an edited payment amount, with the edited payment excluded from the
/// paid total.
pub fn ensure_updated_amount(
    invoice: &PurchaseInvoice,
    paid_excluding: u64,
    new_amount: u64,
) -> DomainResult<()> {
    ensure_amount_within_balance(invoice, paid_excluding, new_amount)
}

fn ensure_amount_within_balance(
    invoice: &PurchaseInvoice,
    paid: u64,
    amount: u64,
) -> DomainResult<()> {
    if amount == 0 {
        return Err(DomainError::validation("payment amount must be positive"));
    }

    let remaining = invoice.total_amount.saturating_sub(paid);
    if amount > remaining {
        return Err(DomainError::validation(format!(
            "payment amount {amount} exceeds invoice balance: total {}, paid {paid} \
             (remaining balance = {remaining})",
            invoice.total_amount
        )));
    }
    Ok(())
}

/// Derive the invoice status from a freshly recomputed paid total.
///
/// Cancelled is sticky. Every other current status (overdue included) yields
/// to the derivation: paid when covered, partial when anything has landed,
/// pending otherwise.
pub fn derive_status(current: InvoiceStatus, paid: u64, total: u64) -> InvoiceStatus {
    if current == InvoiceStatus::Cancelled {
        return InvoiceStatus::Cancelled;
    }
    if paid >= total {
        InvoiceStatus::Paid
    } else if paid > 0 {
        InvoiceStatus::Partial
    } else {
        InvoiceStatus::Pending
    }
}
