//! Invoice issue, lifecycle and credit notes.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument};

use ordercash_core::{CustomerId, DomainError, TenantId};
use ordercash_events::{EventBus, JsonEnvelope};
use ordercash_invoicing::{
    ApplyCreditNote, CancelInvoice, CreditNote, CreditNoteCommand, CreditNoteId, CreditNoteLine,
    Invoice, InvoiceCommand, InvoiceId, InvoiceStatus, IssueCreditNote, IssueInvoice, MarkOverdue,
    NewInvoiceLine, RegisterPayment, SendInvoice,
};
use ordercash_sales::{
    MarkInvoiced, OrderTransition, SalesOrder, SalesOrderCommand, SalesOrderId, TransitionPlan,
};

use super::OrderToCashEngine;
use crate::error::EngineResult;
use crate::event_store::EventStore;

impl<S, B> OrderToCashEngine<S, B>
where
    S: EventStore,
    B: EventBus<JsonEnvelope>,
{
    /// Invoice a delivered order. The invoice is issued and the order moves to `INVOICED` in
    /// the same commit.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id), err)]
    pub fn create_invoice_from_order(
        &self,
        tenant_id: TenantId,
        order_id: SalesOrderId,
        invoice_date: DateTime<Utc>,
    ) -> EngineResult<InvoiceId> {
        let mut uow = self.begin(tenant_id);
        let mut order = uow.load_existing(order_id.0, || SalesOrder::empty(order_id))?;

        if order.plan(OrderTransition::MarkInvoiced)? == TransitionPlan::AlreadyApplied {
            return Err(DomainError::conflict(format!("order {order_id} is already invoiced")).into());
        }
        let customer_id = order
            .customer_id()
            .ok_or_else(|| DomainError::invariant("order without customer"))?;

        let mut lines = Vec::with_capacity(order.lines().len());
        for line in order.lines() {
            let item = self.item(tenant_id, line.item_id)?;
            lines.push(NewInvoiceLine::from_order_line(line, item.name()));
        }

        let invoice_id = InvoiceId::generate();
        let mut invoice = uow.load(invoice_id.0, || Invoice::empty(invoice_id))?;
        let now = Utc::now();
        uow.execute(
            &mut invoice,
            &InvoiceCommand::IssueInvoice(IssueInvoice {
                tenant_id,
                invoice_id,
                customer_id,
                sales_order_id: Some(order_id),
                lines,
                invoice_date,
                due_date: self.due_date(invoice_date)?,
                occurred_at: now,
            }),
        )?;
        uow.execute(
            &mut order,
            &SalesOrderCommand::MarkInvoiced(MarkInvoiced {
                tenant_id,
                order_id,
                invoice_id: invoice_id.0,
                occurred_at: now,
            }),
        )?;
        self.finish(uow)?;

        info!(
            invoice_id = %invoice_id,
            total_amount = %invoice.total_amount(),
            total_vat = %invoice.total_vat(),
            "invoice issued from order"
        );
        Ok(invoice_id)
    }

    /// Invoice with no order behind it; same arithmetic as an order invoice.
    #[instrument(skip(self, lines), fields(tenant_id = %tenant_id, customer_id = %customer_id), err)]
    pub fn create_manual_invoice(
        &self,
        tenant_id: TenantId,
        customer_id: CustomerId,
        lines: Vec<NewInvoiceLine>,
        invoice_date: DateTime<Utc>,
    ) -> EngineResult<InvoiceId> {
        let invoice_id = InvoiceId::generate();
        let mut uow = self.begin(tenant_id);
        let mut invoice = uow.load(invoice_id.0, || Invoice::empty(invoice_id))?;
        uow.execute(
            &mut invoice,
            &InvoiceCommand::IssueInvoice(IssueInvoice {
                tenant_id,
                invoice_id,
                customer_id,
                sales_order_id: None,
                lines,
                invoice_date,
                due_date: self.due_date(invoice_date)?,
                occurred_at: Utc::now(),
            }),
        )?;
        self.finish(uow)?;

        info!(
            invoice_id = %invoice_id,
            total_amount = %invoice.total_amount(),
            total_vat = %invoice.total_vat(),
            "manual invoice issued"
        );
        Ok(invoice_id)
    }

    /// Issue a credit note against an invoice. Every line is checked against what is still
    /// creditable; one violation rejects the whole note.
    #[instrument(skip(self, lines, notes), fields(tenant_id = %tenant_id, invoice_id = %invoice_id), err)]
    pub fn create_credit_note(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        lines: Vec<CreditNoteLine>,
        notes: Option<String>,
    ) -> EngineResult<CreditNoteId> {
        let mut uow = self.begin(tenant_id);
        let mut invoice = uow.load_existing(invoice_id.0, || Invoice::empty(invoice_id))?;

        let credit_note_id = CreditNoteId::generate();
        let mut credit_note = uow.load(credit_note_id.0, || CreditNote::empty(credit_note_id))?;
        let now = Utc::now();

        uow.execute(
            &mut invoice,
            &InvoiceCommand::ApplyCreditNote(ApplyCreditNote {
                tenant_id,
                invoice_id,
                credit_note_id,
                lines: lines.clone(),
                tolerance: self.config.credit_tolerance,
                occurred_at: now,
            }),
        )?;
        uow.execute(
            &mut credit_note,
            &CreditNoteCommand::IssueCreditNote(IssueCreditNote {
                tenant_id,
                credit_note_id,
                invoice_id,
                lines,
                notes,
                occurred_at: now,
            }),
        )?;
        self.finish(uow)?;

        info!(
            credit_note_id = %credit_note_id,
            total_amount = %credit_note.total_amount(),
            total_vat = %credit_note.total_vat(),
            invoice_status = ?invoice.status(),
            "credit note issued"
        );
        Ok(credit_note_id)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id), err)]
    pub fn send_invoice(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> EngineResult<InvoiceStatus> {
        self.invoice_command(
            tenant_id,
            invoice_id,
            InvoiceCommand::SendInvoice(SendInvoice {
                tenant_id,
                invoice_id,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Partial or full payment; a payment covering the outstanding amount marks it paid.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id), err)]
    pub fn register_payment(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        amount: Decimal,
    ) -> EngineResult<InvoiceStatus> {
        self.invoice_command(
            tenant_id,
            invoice_id,
            InvoiceCommand::RegisterPayment(RegisterPayment {
                tenant_id,
                invoice_id,
                amount,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id), err)]
    pub fn mark_invoice_overdue(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        as_of: DateTime<Utc>,
    ) -> EngineResult<InvoiceStatus> {
        self.invoice_command(
            tenant_id,
            invoice_id,
            InvoiceCommand::MarkOverdue(MarkOverdue {
                tenant_id,
                invoice_id,
                as_of,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[instrument(skip(self, reason), fields(tenant_id = %tenant_id, invoice_id = %invoice_id), err)]
    pub fn cancel_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        reason: Option<String>,
    ) -> EngineResult<InvoiceStatus> {
        self.invoice_command(
            tenant_id,
            invoice_id,
            InvoiceCommand::CancelInvoice(CancelInvoice {
                tenant_id,
                invoice_id,
                reason,
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn invoice(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> EngineResult<Invoice> {
        self.read(tenant_id, invoice_id.0, || Invoice::empty(invoice_id))
    }

    pub fn credit_note(
        &self,
        tenant_id: TenantId,
        credit_note_id: CreditNoteId,
    ) -> EngineResult<CreditNote> {
        self.read(tenant_id, credit_note_id.0, || CreditNote::empty(credit_note_id))
    }

    fn due_date(&self, invoice_date: DateTime<Utc>) -> Result<DateTime<Utc>, DomainError> {
        Duration::try_days(self.config.payment_terms_days)
            .and_then(|terms| invoice_date.checked_add_signed(terms))
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "due date out of range for {} payment days",
                    self.config.payment_terms_days
                ))
            })
    }

    fn invoice_command(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        command: InvoiceCommand,
    ) -> EngineResult<InvoiceStatus> {
        let mut uow = self.begin(tenant_id);
        let mut invoice = uow.load_existing(invoice_id.0, || Invoice::empty(invoice_id))?;
        let from = invoice.status();
        uow.execute(&mut invoice, &command)?;
        self.finish(uow)?;

        info!(from = ?from, to = ?invoice.status(), "invoice updated");
        Ok(invoice.status())
    }
}
