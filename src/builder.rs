//! Turns a finished draft into the two shapes a booking is written in: the
//! request body for the remote service and the row for the local mirror.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Serialize, Serializer};

use crate::draft::BookingDraft;
use crate::error::ValidationError;
use crate::models::{new_local_booking_id, Booking, BookingKind, BookingOrigin, ProductId};
use crate::stock_guard;

/// Body of `POST /wareneingaenge`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRequest {
    pub product_id: ProductId,
    #[serde(serialize_with = "serialize_quantity")]
    pub quantity: f64,
    pub unit_price: f64,
    pub erfassungstyp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenz: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Body of `POST /warenausgaenge`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundRequest {
    pub product_id: ProductId,
    #[serde(serialize_with = "serialize_quantity")]
    pub quantity: f64,
    pub unit_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub attribut: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub begruendung: Option<String>,
}

/// The backend binds whole quantities to integer fields; send `8`, not `8.0`.
fn serialize_quantity<S: Serializer>(quantity: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if quantity.fract() == 0.0 && quantity.abs() < i64::MAX as f64 {
        serializer.serialize_i64(*quantity as i64)
    } else {
        serializer.serialize_f64(*quantity)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemotePayload {
    Inbound(InboundRequest),
    Outbound(OutboundRequest),
}

impl RemotePayload {
    pub fn kind(&self) -> BookingKind {
        match self {
            RemotePayload::Inbound(_) => BookingKind::Inbound,
            RemotePayload::Outbound(_) => BookingKind::Outbound,
        }
    }
}

/// A validated booking, ready for the persistor.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltBooking {
    pub remote: RemotePayload,
    /// Used as-is when the booking ends up on the local path.
    pub local: Booking,
}

/// Validate `draft` and assemble both record shapes.
pub fn build(draft: &BookingDraft) -> Result<BuiltBooking, ValidationError> {
    build_at(draft, Utc::now(), new_local_booking_id())
}

pub fn build_at(
    draft: &BookingDraft,
    now: DateTime<Utc>,
    local_id: String,
) -> Result<BuiltBooking, ValidationError> {
    stock_guard::check_submission(draft)?;
    let product = draft.product.as_ref().ok_or(ValidationError::MissingProduct)?;

    let location = draft.location.trim();
    if location.is_empty() {
        return Err(ValidationError::MissingLocation);
    }
    let notes = non_empty(&draft.notes);
    if draft.booking_type.requires_notes() && notes.is_none() {
        return Err(ValidationError::MissingNotes);
    }

    let quantity = draft.quantity;
    let unit_price = product.price;
    let total_price = quantity * unit_price;
    let type_tag = draft.booking_type.label().to_string();
    let justification = non_empty(&draft.justification);
    let supplier = non_empty(&draft.supplier);

    let (remote, local) = match draft.kind() {
        BookingKind::Inbound => {
            let reference = non_empty(&draft.reference_text);
            let batch_number = non_empty(&draft.batch_number);
            let expiry_date = match non_empty(&draft.expiry_date) {
                Some(raw) => Some(normalize_expiry_date(&raw)?),
                None => None,
            };
            let request = InboundRequest {
                product_id: product.id,
                quantity,
                unit_price,
                erfassungstyp: type_tag.clone(),
                referenz: reference.clone(),
                location: Some(location.to_string()),
                supplier: supplier.clone(),
                batch_number: batch_number.clone(),
                expiry_date: expiry_date.clone(),
                notes: notes.clone(),
            };
            let local = Booking {
                id: local_id,
                kind: BookingKind::Inbound,
                product_id: product.id,
                product_name: product.name.clone(),
                quantity,
                unit_price,
                total_price,
                type_tag: Some(type_tag),
                reference,
                location: Some(location.to_string()),
                supplier,
                batch_number,
                expiry_date,
                notes,
                reason: None,
                project_name: None,
                justification,
                created_at: now,
                origin: BookingOrigin::LocalPending,
            };
            (RemotePayload::Inbound(request), local)
        }
        BookingKind::Outbound => {
            let reason = non_empty(&draft.reason);
            let project_name = non_empty(&draft.project_name);
            let request = OutboundRequest {
                product_id: product.id,
                quantity,
                unit_price,
                customer: None,
                order_number: None,
                notes: Some(compose_outbound_notes(
                    reason.as_deref(),
                    location,
                    notes.as_deref(),
                )),
                attribut: type_tag.clone(),
                project_name: project_name.clone(),
                begruendung: justification.clone(),
            };
            let local = Booking {
                id: local_id,
                kind: BookingKind::Outbound,
                product_id: product.id,
                product_name: product.name.clone(),
                quantity,
                unit_price,
                total_price,
                type_tag: Some(type_tag),
                reference: None,
                location: Some(location.to_string()),
                supplier: None,
                batch_number: None,
                expiry_date: None,
                notes,
                reason,
                project_name,
                justification,
                created_at: now,
                origin: BookingOrigin::LocalPending,
            };
            (RemotePayload::Outbound(request), local)
        }
    };

    Ok(BuiltBooking { remote, local })
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// The outbound endpoint has no reason/location columns; both travel in the
/// notes as `Grund: …, Lagerort: …[, Bemerkung: …]`.
pub fn compose_outbound_notes(reason: Option<&str>, location: &str, notes: Option<&str>) -> String {
    let mut composed = format!("Grund: {}, Lagerort: {location}", reason.unwrap_or_default());
    if let Some(notes) = notes {
        composed.push_str(", Bemerkung: ");
        composed.push_str(notes);
    }
    composed
}

/// Accepts `YYYY-MM-DD` or `DD.MM.YYYY`; yields midnight UTC in RFC 3339.
fn normalize_expiry_date(raw: &str) -> Result<String, ValidationError> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d.%m.%Y"))
        .map_err(|_| ValidationError::InvalidExpiryDate(raw.to_string()))?;
    Ok(format!("{}T00:00:00Z", date.format("%Y-%m-%d")))
}
