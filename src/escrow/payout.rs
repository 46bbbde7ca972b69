//! Payout aggregation
//!
//! Turns requested outputs into the final destination → amount table that
//! every signer must reproduce byte for byte. The fee/rounding remainder
//! between the funded total and the requested outputs is spread evenly over
//! every non-moderator output, with the integer remainder going to the first
//! of them in request order, so no value is created or lost.

use crate::core::{Address, TransactionInput, TransactionOutput};
use crate::escrow::error::EscrowError;
use std::collections::BTreeMap;

/// A single destination and the net amount it receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutLine {
    pub destination: Address,
    pub value: u64,
}

/// Address-ordered, address-deduplicated payout table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payouts {
    lines: Vec<PayoutLine>,
}

impl Payouts {
    /// Lines in address order
    pub fn lines(&self) -> &[PayoutLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of all payouts
    pub fn total(&self) -> u64 {
        self.lines.iter().map(|l| l.value).sum()
    }

    /// Amount paid to `destination`, if any
    pub fn amount_for(&self, destination: &Address) -> Option<u64> {
        self.lines
            .iter()
            .find(|l| &l.destination == destination)
            .map(|l| l.value)
    }

    pub fn destinations(&self) -> Vec<Address> {
        self.lines.iter().map(|l| l.destination).collect()
    }

    pub fn amounts(&self) -> Vec<u64> {
        self.lines.iter().map(|l| l.value).collect()
    }
}

fn checked_total<I: Iterator<Item = u64>>(
    mut values: I,
    what: &'static str,
) -> Result<u64, EscrowError> {
    values.try_fold(0u64, |acc, v| {
        acc.checked_add(v).ok_or(EscrowError::AmountOverflow(what))
    })
}

/// Compute the payout table for an escrow release
///
/// With no inputs there is no funded total to reconcile against and the
/// outputs are taken as-is.
pub fn aggregate(
    inputs: &[TransactionInput],
    outputs: &[TransactionOutput],
    moderator: &Address,
) -> Result<Payouts, EscrowError> {
    let outputs_total = checked_total(outputs.iter().map(|o| o.value), "outputs")?;

    let mut difference = 0u64;
    if !inputs.is_empty() {
        let input_total = checked_total(inputs.iter().map(|i| i.value), "inputs")?;
        if outputs_total > input_total {
            return Err(EscrowError::OverPayout {
                inputs: input_total,
                outputs: outputs_total,
            });
        }
        difference = input_total - outputs_total;
    }

    let mut lines: Vec<PayoutLine> = outputs
        .iter()
        .map(|o| PayoutLine {
            destination: o.address,
            value: o.value,
        })
        .collect();

    let distributable: Vec<usize> = outputs
        .iter()
        .enumerate()
        .filter(|(_, o)| &o.address != moderator)
        .map(|(i, _)| i)
        .collect();

    if let Some(&first) = distributable.first() {
        let share = difference / distributable.len() as u64;
        let remainder = difference - share * distributable.len() as u64;
        for &i in &distributable {
            lines[i].value += share;
        }
        lines[first].value += remainder;
    }

    // Stable sort keeps request order among equal destinations
    lines.sort_by(|a, b| a.destination.cmp(&b.destination));

    let mut merged: BTreeMap<Address, u64> = BTreeMap::new();
    for line in lines.into_iter().filter(|l| l.value > 0) {
        let entry = merged.entry(line.destination).or_insert(0);
        *entry = entry
            .checked_add(line.value)
            .ok_or(EscrowError::AmountOverflow("payouts"))?;
    }

    Ok(Payouts {
        lines: merged
            .into_iter()
            .map(|(destination, value)| PayoutLine { destination, value })
            .collect(),
    })
}
