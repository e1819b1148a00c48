//! Quantity handling and the over-stock justification rule.
//!
//! Stock levels are whole units; an outbound quantity above the last known
//! stock is allowed, but only with a written justification. Inbound bookings
//! add stock and are never held back.

use crate::draft::BookingDraft;
use crate::error::ValidationError;
use crate::models::{BookingKind, Product, BASE_UNIT, BULK_UNIT, DECIMAL_UNIT};

/// Result of comparing a requested quantity with the known stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockCheck {
    pub exceeds_stock: bool,
}

pub fn evaluate(requested: f64, stock: i64) -> StockCheck {
    StockCheck {
        exceeds_stock: requested > stock as f64,
    }
}

/// Re-evaluate the justification flag after the quantity or product changed.
/// Lowering the flag keeps whatever justification was typed.
pub fn on_quantity_changed(draft: &mut BookingDraft) {
    draft.justification_required = match draft.product.as_ref() {
        Some(product) if draft.kind() == BookingKind::Outbound => {
            evaluate(draft.quantity, product.stock_quantity).exceeds_stock
        }
        _ => false,
    };
}

/// Submission gate: within stock, or justified.
pub fn check_submission(draft: &BookingDraft) -> Result<(), ValidationError> {
    let Some(product) = draft.product.as_ref() else {
        return Err(ValidationError::MissingProduct);
    };
    if draft.quantity < 1.0 {
        return Err(ValidationError::QuantityBelowMinimum);
    }
    if draft.kind() == BookingKind::Outbound
        && evaluate(draft.quantity, product.stock_quantity).exceeds_stock
        && draft.justification.trim().is_empty()
    {
        return Err(ValidationError::MissingJustification);
    }
    Ok(())
}

pub fn can_submit(draft: &BookingDraft) -> bool {
    check_submission(draft).is_ok() && !draft.location.trim().is_empty()
}

// ---------------------------------------------------------------------------
// Quantity input
// ---------------------------------------------------------------------------

pub fn is_decimal_unit(unit: &str) -> bool {
    unit == DECIMAL_UNIT
}

/// Parse typed quantity text. Only digits are accepted; the decimal unit also
/// takes one comma-separated fraction ("2,5"). Anything else is `None`.
pub fn parse_quantity_input(text: &str, unit: &str) -> Option<f64> {
    let (whole, fraction) = match text.split_once(',') {
        Some((whole, fraction)) if is_decimal_unit(unit) => (whole, Some(fraction)),
        Some(_) => return None,
        None => (text, None),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match fraction {
        None => whole.parse::<f64>().ok(),
        Some(fraction) => {
            if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            format!("{whole}.{fraction}").parse::<f64>().ok()
        }
    }
}

pub fn step_for(unit: &str) -> f64 {
    if is_decimal_unit(unit) {
        0.1
    } else {
        1.0
    }
}

fn round_to_step(value: f64, unit: &str) -> f64 {
    if is_decimal_unit(unit) {
        (value * 10.0).round() / 10.0
    } else {
        value.round()
    }
}

pub fn increment(quantity: f64, unit: &str) -> f64 {
    round_to_step(quantity + step_for(unit), unit)
}

/// Never goes below zero.
pub fn decrement(quantity: f64, unit: &str) -> f64 {
    round_to_step((quantity - step_for(unit)).max(0.0), unit)
}

/// Render a quantity the way the input field shows it ("2,5", "3").
pub fn format_quantity(quantity: f64, unit: &str) -> String {
    if is_decimal_unit(unit) && quantity.fract() != 0.0 {
        format!("{quantity:.1}").replace('.', ",")
    } else {
        format!("{}", quantity.round() as i64)
    }
}

/// Units offered for a product: base unit, the product's own unit, bulk unit.
pub fn available_units(product: Option<&Product>) -> Vec<String> {
    let own = product
        .and_then(|p| p.unit.as_deref())
        .map(str::trim)
        .filter(|u| !u.is_empty());

    let mut units: Vec<String> = Vec::with_capacity(3);
    for unit in [Some(BASE_UNIT), own, Some(BULK_UNIT)].into_iter().flatten() {
        if !units.iter().any(|u| u == unit) {
            units.push(unit.to_string());
        }
    }
    units
}
