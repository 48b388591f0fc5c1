//! Invoice and credit-note financial engine (event-sourced).
//!
//! VAT is a flat percentage per line. Credit notes reverse bounded parts of an issued invoice;
//! the invoice enforces the per-line bounds.

pub mod credit_note;
pub mod invoice;
pub mod totals;

pub use credit_note::{
    CreditNote, CreditNoteCommand, CreditNoteEvent, CreditNoteId, CreditNoteIssued,
    CreditNoteLine, IssueCreditNote, validate_credit_lines,
};
pub use invoice::{
    ApplyCreditNote, CancelInvoice, CreditNoteApplied, CreditedAmounts, Invoice, InvoiceCancelled,
    InvoiceCommand, InvoiceCredited, InvoiceEvent, InvoiceId, InvoiceIssued, InvoiceLine,
    InvoiceMarkedOverdue, InvoiceSent, InvoiceStatus, IssueInvoice, MarkOverdue, NewInvoiceLine,
    PaymentRegistered, RegisterPayment, SendInvoice,
};
pub use totals::{InvoiceTotals, LineAmounts, line_amounts};
