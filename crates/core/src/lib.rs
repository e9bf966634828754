//! `procura-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod transition;
pub mod version;

pub use error::{DomainError, DomainResult};
pub use id::{
    GoodsReceiptId, ProductId, PurchaseInvoiceId, PurchaseOrderId, PurchaseOrderItemId,
    StockMovementId, SupplierId, SupplierPaymentId, TenantId, UserId, VariantId, WarehouseId,
};
pub use transition::{StatusMachine, ensure_transition};
pub use version::ExpectedVersion;
