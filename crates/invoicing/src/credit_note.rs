use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ordercash_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, rounded_sum, typed_aggregate_id,
};
use ordercash_events::Event;

use crate::invoice::InvoiceId;

typed_aggregate_id!(
    /// Credit note identifier (tenant-scoped via `tenant_id` fields in events/commands).
    CreditNoteId
);

/// Credit against one original invoice line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNoteLine {
    pub invoice_line_no: u32,
    pub credit_amount: Decimal,
    pub credit_vat_amount: Decimal,
}

/// Shape checks shared by the credit note and the invoice it reverses.
pub fn validate_credit_lines(lines: &[CreditNoteLine]) -> Result<(), DomainError> {
    if lines.is_empty() {
        return Err(DomainError::validation("credit note needs at least one line"));
    }

    let mut seen = Vec::with_capacity(lines.len());
    for line in lines {
        if line.credit_amount < Decimal::ZERO || line.credit_vat_amount < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "credit amounts on invoice line {} cannot be negative",
                line.invoice_line_no
            )));
        }
        if seen.contains(&line.invoice_line_no) {
            return Err(DomainError::validation(format!(
                "invoice line {} credited more than once in one note",
                line.invoice_line_no
            )));
        }
        seen.push(line.invoice_line_no);
    }

    if lines
        .iter()
        .all(|l| l.credit_amount.is_zero() && l.credit_vat_amount.is_zero())
    {
        return Err(DomainError::validation("credit note credits nothing"));
    }

    Ok(())
}

/// Aggregate root: CreditNote. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditNote {
    id: CreditNoteId,
    tenant_id: Option<TenantId>,
    invoice_id: Option<InvoiceId>,
    lines: Vec<CreditNoteLine>,
    notes: Option<String>,
    issued_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl CreditNote {
    pub fn empty(id: CreditNoteId) -> Self {
        Self {
            id,
            tenant_id: None,
            invoice_id: None,
            lines: Vec::new(),
            notes: None,
            issued_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CreditNoteId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn invoice_id(&self) -> Option<InvoiceId> {
        self.invoice_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn lines(&self) -> &[CreditNoteLine] {
        &self.lines
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn total_amount(&self) -> Decimal {
        rounded_sum(self.lines.iter().map(|l| l.credit_amount))
    }

    pub fn total_vat(&self) -> Decimal {
        rounded_sum(self.lines.iter().map(|l| l.credit_vat_amount))
    }
}

impl AggregateRoot for CreditNote {
    type Id = CreditNoteId;

    const AGGREGATE_TYPE: &'static str = "invoicing.credit_note";

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

/// Command: IssueCreditNote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueCreditNote {
    pub tenant_id: TenantId,
    pub credit_note_id: CreditNoteId,
    pub invoice_id: InvoiceId,
    pub lines: Vec<CreditNoteLine>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditNoteCommand {
    IssueCreditNote(IssueCreditNote),
}

/// Event: CreditNoteIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNoteIssued {
    pub tenant_id: TenantId,
    pub credit_note_id: CreditNoteId,
    pub invoice_id: InvoiceId,
    pub lines: Vec<CreditNoteLine>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditNoteEvent {
    CreditNoteIssued(CreditNoteIssued),
}

impl Event for CreditNoteEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CreditNoteEvent::CreditNoteIssued(_) => "invoicing.credit_note.issued",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CreditNoteEvent::CreditNoteIssued(e) => e.occurred_at,
        }
    }
}

impl Aggregate for CreditNote {
    type Command = CreditNoteCommand;
    type Event = CreditNoteEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CreditNoteEvent::CreditNoteIssued(e) => {
                self.id = e.credit_note_id;
                self.tenant_id = Some(e.tenant_id);
                self.invoice_id = Some(e.invoice_id);
                self.lines = e.lines.clone();
                self.notes = e.notes.clone();
                self.issued_at = Some(e.occurred_at);
                self.created = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CreditNoteCommand::IssueCreditNote(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("credit note already exists"));
                }
                validate_credit_lines(&cmd.lines)?;

                Ok(vec![CreditNoteEvent::CreditNoteIssued(CreditNoteIssued {
                    tenant_id: cmd.tenant_id,
                    credit_note_id: cmd.credit_note_id,
                    invoice_id: cmd.invoice_id,
                    lines: cmd.lines.clone(),
                    notes: cmd.notes.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}
