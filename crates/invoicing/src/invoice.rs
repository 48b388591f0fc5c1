use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ordercash_core::{
    Aggregate, AggregateId, AggregateRoot, CreditComponent, CustomerId, DomainError, TenantId,
    round_money, rounded_sum, typed_aggregate_id,
};
use ordercash_events::Event;
use ordercash_inventory::InventoryItemId;
use ordercash_sales::{OrderLine, SalesOrderId};

use crate::credit_note::{CreditNoteId, CreditNoteLine, validate_credit_lines};
use crate::totals::{InvoiceTotals, LineAmounts, line_amounts};

typed_aggregate_id!(
    /// Invoice identifier (tenant-scoped via `tenant_id` fields in events/commands).
    InvoiceId
);

/// Invoice status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
    Credited,
}

/// Immutable invoice line. `original_*` snapshot what was billed when the invoice was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub line_no: u32,
    pub description: String,
    pub item_id: Option<InventoryItemId>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub vat_rate_percent: Decimal,
    pub original_quantity: Decimal,
    pub original_unit_price: Decimal,
}

impl InvoiceLine {
    pub fn amounts(&self) -> LineAmounts {
        line_amounts(
            self.original_quantity,
            self.original_unit_price,
            self.vat_rate_percent,
        )
    }

    pub fn line_total(&self) -> Decimal {
        self.amounts().net
    }

    pub fn line_vat(&self) -> Decimal {
        self.amounts().vat
    }
}

/// Line as supplied by the caller (manual invoice) or copied from an order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoiceLine {
    pub description: String,
    pub item_id: Option<InventoryItemId>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub vat_rate_percent: Decimal,
}

impl NewInvoiceLine {
    pub fn from_order_line(line: &OrderLine, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            item_id: Some(line.item_id),
            quantity: line.quantity,
            unit_price: line.unit_price,
            vat_rate_percent: line.vat_rate_percent,
        }
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.description.trim().is_empty() {
            return Err(DomainError::validation("invoice line needs a description"));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(DomainError::validation(
                "invoice line quantity must be positive",
            ));
        }
        if self.unit_price < Decimal::ZERO {
            return Err(DomainError::validation(
                "invoice line unit_price cannot be negative",
            ));
        }
        if self.vat_rate_percent < Decimal::ZERO || self.vat_rate_percent > Decimal::ONE_HUNDRED {
            return Err(DomainError::validation(
                "vat_rate_percent must be between 0 and 100",
            ));
        }
        Ok(())
    }
}

/// Running credit totals for one invoice line (exact).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreditedAmounts {
    pub amount: Decimal,
    pub vat: Decimal,
}

/// Aggregate root: Invoice.
///
/// Lines never change after issue; corrections only ever arrive as applied credit notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceId,
    tenant_id: Option<TenantId>,
    customer_id: Option<CustomerId>,
    sales_order_id: Option<SalesOrderId>,
    status: InvoiceStatus,
    lines: Vec<InvoiceLine>,
    invoice_date: Option<DateTime<Utc>>,
    due_date: Option<DateTime<Utc>>,
    totals: InvoiceTotals,
    total_paid: Decimal,
    credited: BTreeMap<u32, CreditedAmounts>,
    credit_notes: Vec<CreditNoteId>,
    version: u64,
    created: bool,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            customer_id: None,
            sales_order_id: None,
            status: InvoiceStatus::Draft,
            lines: Vec::new(),
            invoice_date: None,
            due_date: None,
            totals: InvoiceTotals::default(),
            total_paid: Decimal::ZERO,
            credited: BTreeMap::new(),
            credit_notes: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn sales_order_id(&self) -> Option<SalesOrderId> {
        self.sales_order_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&InvoiceLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    pub fn invoice_date(&self) -> Option<DateTime<Utc>> {
        self.invoice_date
    }

    pub fn due_date(&self) -> Option<DateTime<Utc>> {
        self.due_date
    }

    pub fn total_amount(&self) -> Decimal {
        self.totals.total_amount
    }

    pub fn total_vat(&self) -> Decimal {
        self.totals.total_vat
    }

    pub fn gross_total(&self) -> Decimal {
        self.totals.gross()
    }

    pub fn total_paid(&self) -> Decimal {
        self.total_paid
    }

    pub fn credited(&self, line_no: u32) -> CreditedAmounts {
        self.credited.get(&line_no).copied().unwrap_or_default()
    }

    pub fn credit_note_ids(&self) -> &[CreditNoteId] {
        &self.credit_notes
    }

    /// Rounded net plus VAT credited so far.
    pub fn credited_gross(&self) -> Decimal {
        rounded_sum(self.credited.values().map(|c| c.amount))
            + rounded_sum(self.credited.values().map(|c| c.vat))
    }

    /// What the customer still owes; never negative.
    pub fn outstanding_amount(&self) -> Decimal {
        (self.gross_total() - self.credited_gross() - self.total_paid).max(Decimal::ZERO)
    }

    pub fn can_accept_payment(&self) -> bool {
        matches!(self.status, InvoiceStatus::Sent | InvoiceStatus::Overdue)
            && self.outstanding_amount() > Decimal::ZERO
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    const AGGREGATE_TYPE: &'static str = "invoicing.invoice";

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn aggregate_id(&self) -> AggregateId {
        self.id.0
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: IssueInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    /// `None` for manual invoices.
    pub sales_order_id: Option<SalesOrderId>,
    pub lines: Vec<NewInvoiceLine>,
    pub invoice_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SendInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RegisterPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPayment {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkOverdue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkOverdue {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub as_of: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApplyCreditNote.
///
/// `tolerance` is how far a line may be over-credited to absorb rounding; zero rejects any
/// excess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyCreditNote {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub credit_note_id: CreditNoteId,
    pub lines: Vec<CreditNoteLine>,
    pub tolerance: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    IssueInvoice(IssueInvoice),
    SendInvoice(SendInvoice),
    RegisterPayment(RegisterPayment),
    MarkOverdue(MarkOverdue),
    CancelInvoice(CancelInvoice),
    ApplyCreditNote(ApplyCreditNote),
}

/// Event: InvoiceIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    pub sales_order_id: Option<SalesOrderId>,
    pub lines: Vec<InvoiceLine>,
    pub invoice_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub total_amount: Decimal,
    pub total_vat: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceSent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSent {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRegistered {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub amount: Decimal,
    pub new_total_paid: Decimal,
    pub fully_paid: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceMarkedOverdue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceMarkedOverdue {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub as_of: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCancelled {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CreditNoteApplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNoteApplied {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub credit_note_id: CreditNoteId,
    pub lines: Vec<CreditNoteLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceCredited (everything billed has been credited).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCredited {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceIssued(InvoiceIssued),
    InvoiceSent(InvoiceSent),
    PaymentRegistered(PaymentRegistered),
    InvoiceMarkedOverdue(InvoiceMarkedOverdue),
    InvoiceCancelled(InvoiceCancelled),
    CreditNoteApplied(CreditNoteApplied),
    InvoiceCredited(InvoiceCredited),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceIssued(_) => "invoicing.invoice.issued",
            InvoiceEvent::InvoiceSent(_) => "invoicing.invoice.sent",
            InvoiceEvent::PaymentRegistered(_) => "invoicing.invoice.payment_registered",
            InvoiceEvent::InvoiceMarkedOverdue(_) => "invoicing.invoice.overdue",
            InvoiceEvent::InvoiceCancelled(_) => "invoicing.invoice.cancelled",
            InvoiceEvent::CreditNoteApplied(_) => "invoicing.invoice.credit_note_applied",
            InvoiceEvent::InvoiceCredited(_) => "invoicing.invoice.credited",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceIssued(e) => e.occurred_at,
            InvoiceEvent::InvoiceSent(e) => e.occurred_at,
            InvoiceEvent::PaymentRegistered(e) => e.occurred_at,
            InvoiceEvent::InvoiceMarkedOverdue(e) => e.occurred_at,
            InvoiceEvent::InvoiceCancelled(e) => e.occurred_at,
            InvoiceEvent::CreditNoteApplied(e) => e.occurred_at,
            InvoiceEvent::InvoiceCredited(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceIssued(e) => {
                self.id = e.invoice_id;
                self.tenant_id = Some(e.tenant_id);
                self.customer_id = Some(e.customer_id);
                self.sales_order_id = e.sales_order_id;
                self.status = InvoiceStatus::Draft;
                self.lines = e.lines.clone();
                self.invoice_date = Some(e.invoice_date);
                self.due_date = Some(e.due_date);
                self.totals = InvoiceTotals {
                    total_amount: e.total_amount,
                    total_vat: e.total_vat,
                };
                self.total_paid = Decimal::ZERO;
                self.credited.clear();
                self.credit_notes.clear();
                self.created = true;
            }
            InvoiceEvent::InvoiceSent(_) => {
                self.status = InvoiceStatus::Sent;
            }
            InvoiceEvent::PaymentRegistered(e) => {
                self.total_paid = e.new_total_paid;
                if e.fully_paid {
                    self.status = InvoiceStatus::Paid;
                }
            }
            InvoiceEvent::InvoiceMarkedOverdue(_) => {
                self.status = InvoiceStatus::Overdue;
            }
            InvoiceEvent::InvoiceCancelled(_) => {
                self.status = InvoiceStatus::Cancelled;
            }
            InvoiceEvent::CreditNoteApplied(e) => {
                for line in &e.lines {
                    let entry = self.credited.entry(line.invoice_line_no).or_default();
                    entry.amount += line.credit_amount;
                    entry.vat += line.credit_vat_amount;
                }
                self.credit_notes.push(e.credit_note_id);
            }
            InvoiceEvent::InvoiceCredited(_) => {
                self.status = InvoiceStatus::Credited;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::IssueInvoice(cmd) => self.handle_issue(cmd),
            InvoiceCommand::SendInvoice(cmd) => self.handle_send(cmd),
            InvoiceCommand::RegisterPayment(cmd) => self.handle_register_payment(cmd),
            InvoiceCommand::MarkOverdue(cmd) => self.handle_mark_overdue(cmd),
            InvoiceCommand::CancelInvoice(cmd) => self.handle_cancel(cmd),
            InvoiceCommand::ApplyCreditNote(cmd) => self.handle_apply_credit_note(cmd),
        }
    }
}

impl Invoice {
    fn ensure_target(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn handle_issue(&self, cmd: &IssueInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("cannot issue invoice without lines"));
        }
        if cmd.due_date < cmd.invoice_date {
            return Err(DomainError::validation(
                "due_date cannot be before invoice_date",
            ));
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, line) in cmd.lines.iter().enumerate() {
            line.validate()?;
            lines.push(InvoiceLine {
                line_no: idx as u32 + 1,
                description: line.description.trim().to_string(),
                item_id: line.item_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                vat_rate_percent: line.vat_rate_percent,
                original_quantity: line.quantity,
                original_unit_price: line.unit_price,
            });
        }
        let totals = InvoiceTotals::from_lines(lines.iter().map(InvoiceLine::amounts));

        Ok(vec![InvoiceEvent::InvoiceIssued(InvoiceIssued {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            customer_id: cmd.customer_id,
            sales_order_id: cmd.sales_order_id,
            lines,
            invoice_date: cmd.invoice_date,
            due_date: cmd.due_date,
            total_amount: totals.total_amount,
            total_vat: totals.total_vat,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_send(&self, cmd: &SendInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.invoice_id)?;

        match self.status {
            InvoiceStatus::Draft => Ok(vec![InvoiceEvent::InvoiceSent(InvoiceSent {
                tenant_id: cmd.tenant_id,
                invoice_id: cmd.invoice_id,
                occurred_at: cmd.occurred_at,
            })]),
            InvoiceStatus::Sent => Ok(vec![]),
            other => Err(DomainError::invalid_transition(other, InvoiceStatus::Sent)),
        }
    }

    fn handle_register_payment(
        &self,
        cmd: &RegisterPayment,
    ) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.invoice_id)?;

        if !self.can_accept_payment() {
            return Err(DomainError::invariant(
                "invoice is not open for payment",
            ));
        }
        if cmd.amount <= Decimal::ZERO {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        let amount = round_money(cmd.amount);
        let outstanding = self.outstanding_amount();
        if amount > outstanding {
            return Err(DomainError::validation(format!(
                "payment {amount} exceeds outstanding {outstanding}"
            )));
        }

        Ok(vec![InvoiceEvent::PaymentRegistered(PaymentRegistered {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            amount,
            new_total_paid: self.total_paid + amount,
            fully_paid: amount == outstanding,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_overdue(&self, cmd: &MarkOverdue) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.invoice_id)?;

        match self.status {
            InvoiceStatus::Overdue => return Ok(vec![]),
            InvoiceStatus::Sent => {}
            other => return Err(DomainError::invalid_transition(other, InvoiceStatus::Overdue)),
        }

        let due_date = self
            .due_date
            .ok_or_else(|| DomainError::invariant("issued invoice without due_date"))?;
        if cmd.as_of <= due_date {
            return Err(DomainError::validation(format!(
                "invoice is not past its due date {due_date}"
            )));
        }

        Ok(vec![InvoiceEvent::InvoiceMarkedOverdue(InvoiceMarkedOverdue {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            as_of: cmd.as_of,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.invoice_id)?;

        match self.status {
            InvoiceStatus::Cancelled => return Ok(vec![]),
            InvoiceStatus::Draft | InvoiceStatus::Sent | InvoiceStatus::Overdue => {}
            other => {
                return Err(DomainError::invalid_transition(
                    other,
                    InvoiceStatus::Cancelled,
                ));
            }
        }
        if !self.total_paid.is_zero() || !self.credit_notes.is_empty() {
            return Err(DomainError::invariant(
                "cannot cancel an invoice with payments or credit notes",
            ));
        }

        Ok(vec![InvoiceEvent::InvoiceCancelled(InvoiceCancelled {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_apply_credit_note(
        &self,
        cmd: &ApplyCreditNote,
    ) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.invoice_id)?;

        if self.credit_notes.contains(&cmd.credit_note_id) {
            return Ok(vec![]);
        }
        if self.status == InvoiceStatus::Cancelled {
            return Err(DomainError::invariant("cannot credit a cancelled invoice"));
        }
        if cmd.tolerance < Decimal::ZERO {
            return Err(DomainError::validation("credit tolerance cannot be negative"));
        }
        validate_credit_lines(&cmd.lines)?;
        if let (InvoiceStatus::Credited, Some(first)) = (self.status, cmd.lines.first()) {
            return Err(self.nothing_left_to_credit(first)?);
        }

        let mut after = self.credited.clone();
        for credit in &cmd.lines {
            let line = self.line(credit.invoice_line_no).ok_or_else(|| {
                DomainError::validation(format!(
                    "invoice has no line {}",
                    credit.invoice_line_no
                ))
            })?;
            let already = self.credited(line.line_no);

            let remaining = line.line_total() - already.amount;
            if credit.credit_amount > remaining + cmd.tolerance {
                return Err(DomainError::OverCredit {
                    line_no: line.line_no,
                    component: CreditComponent::Amount,
                    requested: credit.credit_amount,
                    remaining,
                });
            }
            let remaining_vat = line.line_vat() - already.vat;
            if credit.credit_vat_amount > remaining_vat + cmd.tolerance {
                return Err(DomainError::OverCredit {
                    line_no: line.line_no,
                    component: CreditComponent::Vat,
                    requested: credit.credit_vat_amount,
                    remaining: remaining_vat,
                });
            }

            let entry = after.entry(line.line_no).or_default();
            entry.amount += credit.credit_amount;
            entry.vat += credit.credit_vat_amount;
        }

        let mut events = vec![InvoiceEvent::CreditNoteApplied(CreditNoteApplied {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            credit_note_id: cmd.credit_note_id,
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })];

        if self.fully_credited(&after) {
            events.push(InvoiceEvent::InvoiceCredited(InvoiceCredited {
                tenant_id: cmd.tenant_id,
                invoice_id: cmd.invoice_id,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    /// Every line has its whole net and VAT credited, compared exactly.
    fn fully_credited(&self, credited: &BTreeMap<u32, CreditedAmounts>) -> bool {
        self.lines.iter().all(|line| {
            let done = credited.get(&line.line_no).copied().unwrap_or_default();
            done.amount >= line.line_total() && done.vat >= line.line_vat()
        })
    }

    /// Rejection for any credit against an invoice that is already fully credited.
    fn nothing_left_to_credit(&self, credit: &CreditNoteLine) -> Result<DomainError, DomainError> {
        let line = self.line(credit.invoice_line_no).ok_or_else(|| {
            DomainError::validation(format!("invoice has no line {}", credit.invoice_line_no))
        })?;
        let remaining = (line.line_total() - self.credited(line.line_no).amount).max(Decimal::ZERO);
        Ok(DomainError::OverCredit {
            line_no: line.line_no,
            component: CreditComponent::Amount,
            requested: credit.credit_amount,
            remaining,
        })
    }
}
