//! Line and invoice-level VAT arithmetic.
//!
//! Line values are exact. Totals are the rounded sums of exact line values, never sums of
//! rounded lines.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ordercash_core::{percent_of, round_money, rounded_sum};

/// Exact (unrounded) net amount and VAT of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    pub net: Decimal,
    pub vat: Decimal,
}

pub fn line_amounts(quantity: Decimal, unit_price: Decimal, vat_rate_percent: Decimal) -> LineAmounts {
    let net = quantity * unit_price;
    LineAmounts {
        net,
        vat: percent_of(net, vat_rate_percent),
    }
}

/// Rounded invoice totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub total_amount: Decimal,
    pub total_vat: Decimal,
}

impl InvoiceTotals {
    pub fn from_lines<I>(lines: I) -> Self
    where
        I: IntoIterator<Item = LineAmounts>,
    {
        let (nets, vats): (Vec<_>, Vec<_>) = lines.into_iter().map(|l| (l.net, l.vat)).unzip();
        Self {
            total_amount: rounded_sum(nets),
            total_vat: rounded_sum(vats),
        }
    }

    pub fn gross(&self) -> Decimal {
        round_money(self.total_amount + self.total_vat)
    }
}
