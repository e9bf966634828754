//! Status enums and their transition tables.
//!
//! One closed enum per entity kind, wire names lowercase. The tables are the
//! single authority on allowed moves; there are no ad-hoc status checks
//! anywhere else. Terminal statuses have empty tables.

use serde::{Deserialize, Serialize};

use procura_core::StatusMachine;

/// Purchase order lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Draft,
    Pending,
    Approved,
    Ordered,
    PartiallyReceived,
    Received,
    Cancelled,
}

impl core::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            PurchaseOrderStatus::Draft => "draft",
            PurchaseOrderStatus::Pending => "pending",
            PurchaseOrderStatus::Approved => "approved",
            PurchaseOrderStatus::Ordered => "ordered",
            PurchaseOrderStatus::PartiallyReceived => "partially_received",
            PurchaseOrderStatus::Received => "received",
            PurchaseOrderStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl StatusMachine for PurchaseOrderStatus {
    const ENTITY: &'static str = "purchase order";

    fn transitions(self) -> &'static [Self] {
        use PurchaseOrderStatus::*;
        match self {
            Draft => &[Pending, Cancelled],
            Pending => &[Approved, Cancelled],
            Approved => &[Ordered, Cancelled],
            Ordered => &[PartiallyReceived, Received, Cancelled],
            PartiallyReceived => &[Received, Cancelled],
            Received => &[],
            Cancelled => &[],
        }
    }
}

impl PurchaseOrderStatus {
    /// Whether goods receipts may be created against a PO in this status.
    pub fn accepts_receipts(self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Approved
                | PurchaseOrderStatus::Ordered
                | PurchaseOrderStatus::PartiallyReceived
        )
    }
}

/// Goods receipt lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoodsReceiptStatus {
    Pending,
    Inspected,
    Approved,
    Rejected,
    Completed,
}

impl core::fmt::Display for GoodsReceiptStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            GoodsReceiptStatus::Pending => "pending",
            GoodsReceiptStatus::Inspected => "inspected",
            GoodsReceiptStatus::Approved => "approved",
            GoodsReceiptStatus::Rejected => "rejected",
            GoodsReceiptStatus::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

impl StatusMachine for GoodsReceiptStatus {
    const ENTITY: &'static str = "goods receipt";

    fn transitions(self) -> &'static [Self] {
        use GoodsReceiptStatus::*;
        match self {
            Pending => &[Inspected, Rejected],
            Inspected => &[Approved, Rejected],
            Approved => &[Completed, Rejected],
            Rejected => &[],
            Completed => &[],
        }
    }
}

impl GoodsReceiptStatus {
    /// Statuses whose planned quantities still count against availability.
    pub fn holds_quantity(self) -> bool {
        matches!(self, GoodsReceiptStatus::Pending | GoodsReceiptStatus::Inspected)
    }
}

/// Purchase invoice lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Partial,
    Paid,
    Overdue,
    Cancelled,
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Partial => "partial",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl StatusMachine for InvoiceStatus {
    const ENTITY: &'static str = "purchase invoice";

    fn transitions(self) -> &'static [Self] {
        use InvoiceStatus::*;
        match self {
            Pending => &[Partial, Paid, Overdue, Cancelled],
            Partial => &[Paid, Overdue, Cancelled],
            Overdue => &[Paid, Partial, Cancelled],
            Paid => &[],
            Cancelled => &[],
        }
    }
}

/// Supplier payment lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl core::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl StatusMachine for PaymentStatus {
    const ENTITY: &'static str = "supplier payment";

    fn transitions(self) -> &'static [Self] {
        use PaymentStatus::*;
        match self {
            Pending => &[Processing, Cancelled],
            Processing => &[Completed, Failed, Cancelled],
            Failed => &[Pending, Processing, Cancelled],
            Completed => &[],
            Cancelled => &[],
        }
    }
}

impl PaymentStatus {
    /// The administrative shortcut: pending straight to completed, skipping
    /// processing. Only callers holding the admin capability may use it.
    pub fn admin_bypass_allows(current: Self, requested: Self) -> bool {
        current == PaymentStatus::Pending && requested == PaymentStatus::Completed
    }
}
