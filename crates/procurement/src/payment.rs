//! Supplier payments and payment numbering.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use procura_core::{
    DomainError, DomainResult, PurchaseInvoiceId, SupplierId, SupplierPaymentId, TenantId,
};

use crate::status::PaymentStatus;

/// Human-facing payment number, `PAY-{year}-{seq:03}`, unique per tenant per
/// year.
///
/// Sequences start at 1 each year and are allocated by the store inside the
/// payment-insert commit; the zero-padding widens naturally past 999.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaymentNumber {
    year: i32,
    seq: u32,
}

impl PaymentNumber {
    pub fn new(year: i32, seq: u32) -> Self {
        Self { year, seq }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }
}

impl core::fmt::Display for PaymentNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PAY-{}-{:03}", self.year, self.seq)
    }
}

impl FromStr for PaymentNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("PAY-")
            .ok_or_else(|| DomainError::invalid_id(format!("PaymentNumber: {s}")))?;
        let (year, seq) = rest
            .split_once('-')
            .ok_or_else(|| DomainError::invalid_id(format!("PaymentNumber: {s}")))?;
        let year: i32 = year
            .parse()
            .map_err(|_| DomainError::invalid_id(format!("PaymentNumber year: {s}")))?;
        let seq: u32 = seq
            .parse()
            .map_err(|_| DomainError::invalid_id(format!("PaymentNumber seq: {s}")))?;
        Ok(Self { year, seq })
    }
}

impl From<PaymentNumber> for String {
    fn from(value: PaymentNumber) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for PaymentNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A monetary settlement against an invoice, partial or full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierPayment {
    pub id: SupplierPaymentId,
    pub tenant_id: TenantId,
    pub purchase_invoice_id: PurchaseInvoiceId,
    pub supplier_id: Option<SupplierId>,
    pub payment_number: PaymentNumber,
    /// Amount in smallest currency unit (e.g. cents).
    pub amount: u64,
    pub payment_method: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SupplierPayment {
    /// Create a pending payment. The amount bound against the invoice balance
    /// is the financial reconciler's check, not this constructor's.
    pub fn new(
        tenant_id: TenantId,
        purchase_invoice_id: PurchaseInvoiceId,
        supplier_id: Option<SupplierId>,
        payment_number: PaymentNumber,
        amount: u64,
        payment_method: String,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if payment_method.trim().is_empty() {
            return Err(DomainError::validation("payment_method must not be empty"));
        }

        Ok(Self {
            id: SupplierPaymentId::new(),
            tenant_id,
            purchase_invoice_id,
            supplier_id,
            payment_number,
            amount,
            payment_method,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_number_formats_with_zero_padding() {
        assert_eq!(PaymentNumber::new(2026, 1).to_string(), "PAY-2026-001");
        assert_eq!(PaymentNumber::new(2026, 42).to_string(), "PAY-2026-042");
        assert_eq!(PaymentNumber::new(2026, 1234).to_string(), "PAY-2026-1234");
    }

    #[test]
    fn payment_number_round_trips_through_parse() {
        let number: PaymentNumber = "PAY-2025-007".parse().unwrap();
        assert_eq!(number.year(), 2025);
        assert_eq!(number.seq(), 7);
        assert_eq!(number.to_string(), "PAY-2025-007");
    }

    #[test]
    fn malformed_payment_numbers_are_rejected() {
        for bad in ["PAY-2025", "INV-2025-001", "PAY-abcd-001", "PAY-2025-xyz", ""] {
            assert!(bad.parse::<PaymentNumber>().is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn payment_number_serializes_as_its_string_form() {
        let number = PaymentNumber::new(2026, 3);
        assert_eq!(
            serde_json::to_string(&number).unwrap(),
            "\"PAY-2026-003\""
        );
        let parsed: PaymentNumber = serde_json::from_str("\"PAY-2026-003\"").unwrap();
        assert_eq!(parsed, number);
    }

    #[test]
    fn new_payment_starts_pending() {
        let payment = SupplierPayment::new(
            TenantId::new(),
            PurchaseInvoiceId::new(),
            None,
            PaymentNumber::new(2026, 1),
            400,
            "bank_transfer".to_string(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount, 400);
    }

    #[test]
    fn blank_payment_method_is_rejected() {
        let err = SupplierPayment::new(
            TenantId::new(),
            PurchaseInvoiceId::new(),
            None,
            PaymentNumber::new(2026, 1),
            400,
            "  ".to_string(),
            Utc::now(),
        )
        .unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("payment_method")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
