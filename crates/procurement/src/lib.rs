//! `procura-procurement`: the procurement-to-payment chain, pure domain.
//!
//! Four linked records, each with its own status machine:
//! purchase order → goods receipt → purchase invoice → supplier payment.
//! Every state-changing write is gated by the transition tables in
//! [`status`], then by the numeric bounds in [`quantity`] (receivable
//! quantities) or [`financial`] (payable amounts). Derived values (PO
//! received totals, invoice paid amount and status) are recomputed from
//! their source records, never incremented in place.
//!
//! Nothing in this crate performs IO; storage and retry live in the infra
//! layer.

pub mod financial;
pub mod invoice;
pub mod order;
pub mod payment;
pub mod quantity;
pub mod receipt;
pub mod status;

pub use invoice::{InvoiceVariancePolicy, PurchaseInvoice};
pub use order::{NewOrderItem, PurchaseOrder, PurchaseOrderItem};
pub use payment::{PaymentNumber, SupplierPayment};
pub use quantity::ItemAvailability;
pub use receipt::{GoodsReceipt, GoodsReceiptItem};
pub use status::{GoodsReceiptStatus, InvoiceStatus, PaymentStatus, PurchaseOrderStatus};
