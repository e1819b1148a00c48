//! Domain records shared by the remote client, the local mirror and the
//! booking workflow.
//!
//! Remote responses come from an ASP.NET backend that is not consistent about
//! key casing, so every field accepts both the camelCase and the PascalCase
//! spelling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Universal base unit offered for every product.
pub const BASE_UNIT: &str = "Stück";
/// Bulk unit offered for every product.
pub const BULK_UNIT: &str = "Palette";
/// The only unit that accepts fractional quantities ("2,5").
pub const DECIMAL_UNIT: &str = "Paket";

pub type ProductId = i64;

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(alias = "Id")]
    pub id: ProductId,
    #[serde(alias = "Sku")]
    pub sku: String,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(default, alias = "Description")]
    pub description: Option<String>,
    #[serde(default, alias = "Unit")]
    pub unit: Option<String>,
    #[serde(alias = "Price")]
    pub price: f64,
    /// Last-known authoritative stock. Negative after prior overrides.
    #[serde(alias = "StockQuantity")]
    pub stock_quantity: i64,
    #[serde(default, alias = "LocationStock")]
    pub location_stock: f64,
    #[serde(default, alias = "DefaultSupplier")]
    pub default_supplier: Option<String>,
    #[serde(default, alias = "ItemType")]
    pub item_type: Option<String>,
    #[serde(default, alias = "CreatedAt")]
    pub created_at: Option<String>,
    #[serde(default, alias = "UpdatedAt")]
    pub updated_at: Option<String>,
}

/// An order a reference text can resolve to. Each order has at most one
/// supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReference {
    #[serde(alias = "Id")]
    pub id: i64,
    #[serde(default, alias = "OrderNumber")]
    pub order_number: String,
    #[serde(default, alias = "OrderDate")]
    pub order_date: Option<String>,
    #[serde(default, alias = "Status")]
    pub status: Option<String>,
    #[serde(default, alias = "Supplier")]
    pub supplier: Option<String>,
    #[serde(default, alias = "SupplierId")]
    pub supplier_id: Option<i64>,
    #[serde(default, alias = "AssignedItemCount")]
    pub assigned_item_count: i64,
    #[serde(default, alias = "CreatedAt")]
    pub created_at: Option<String>,
    #[serde(default, alias = "UpdatedAt")]
    pub updated_at: Option<String>,
}

impl OrderReference {
    /// Supplier name, ignoring blank values.
    pub fn supplier_name(&self) -> Option<&str> {
        self.supplier
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JustificationTemplate {
    #[serde(alias = "Id")]
    pub id: i64,
    #[serde(alias = "Text")]
    pub text: String,
    #[serde(default, alias = "OrderIndex")]
    pub order_index: i64,
    #[serde(default = "default_true", alias = "IsActive")]
    pub is_active: bool,
}

/// A selectable reason ("Grund") for an outbound booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundReason {
    #[serde(alias = "Id")]
    pub id: i64,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(default, alias = "OrderIndex")]
    pub order_index: i64,
    #[serde(default = "default_true", alias = "IsActive")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Booking classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookingKind {
    /// Wareneingang: increases stock.
    Inbound,
    /// Warenausgang: decreases stock.
    Outbound,
}

impl BookingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingKind::Inbound => "inbound",
            BookingKind::Outbound => "outbound",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "inbound" => Some(BookingKind::Inbound),
            "outbound" => Some(BookingKind::Outbound),
            _ => None,
        }
    }
}

/// Erfassungstyp (inbound) or Warenausgangstyp (outbound).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookingType {
    InboundOrder,
    InboundProject,
    InboundStock,
    InboundWithoutOrder,
    OutboundSupplierReturn,
    OutboundProject,
    OutboundStock,
    OutboundDisposal,
}

impl BookingType {
    pub const INBOUND: [BookingType; 4] = [
        BookingType::InboundOrder,
        BookingType::InboundProject,
        BookingType::InboundStock,
        BookingType::InboundWithoutOrder,
    ];

    pub const OUTBOUND: [BookingType; 4] = [
        BookingType::OutboundSupplierReturn,
        BookingType::OutboundProject,
        BookingType::OutboundStock,
        BookingType::OutboundDisposal,
    ];

    pub fn kind(self) -> BookingKind {
        match self {
            BookingType::InboundOrder
            | BookingType::InboundProject
            | BookingType::InboundStock
            | BookingType::InboundWithoutOrder => BookingKind::Inbound,
            _ => BookingKind::Outbound,
        }
    }

    /// Label the backend stores in `erfassungstyp` / `attribut`.
    pub fn label(self) -> &'static str {
        match self {
            BookingType::InboundOrder => "Bestellung",
            BookingType::InboundProject => "Projekt (Baustelle)",
            BookingType::InboundStock => "Lager",
            BookingType::InboundWithoutOrder => "Ohne Bestellung",
            BookingType::OutboundSupplierReturn => "Rücksendung Lieferant",
            BookingType::OutboundProject => "Projekt",
            BookingType::OutboundStock => "Lager",
            BookingType::OutboundDisposal => "Entsorgung",
        }
    }

    pub fn from_label(kind: BookingKind, label: &str) -> Option<Self> {
        let candidates: &[BookingType] = match kind {
            BookingKind::Inbound => &Self::INBOUND,
            BookingKind::Outbound => &Self::OUTBOUND,
        };
        candidates
            .iter()
            .copied()
            .find(|t| t.label() == label.trim())
    }

    /// Only order-bound inbound bookings resolve their reference against
    /// remote orders.
    pub fn is_reference_bound(self) -> bool {
        self == BookingType::InboundOrder
    }

    /// The backend refuses inbound "Lager" bookings without a remark.
    pub fn requires_notes(self) -> bool {
        self == BookingType::InboundStock
    }
}

// ---------------------------------------------------------------------------
// Persisted bookings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingOrigin {
    /// Acknowledged by the remote service; id is remote-issued.
    RemoteConfirmed,
    /// Written only to the local mirror; id is locally generated.
    LocalPending,
}

impl BookingOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingOrigin::RemoteConfirmed => "remote",
            BookingOrigin::LocalPending => "local_pending",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "remote" => Some(BookingOrigin::RemoteConfirmed),
            "local_pending" => Some(BookingOrigin::LocalPending),
            _ => None,
        }
    }

    pub fn is_local_only(self) -> bool {
        self == BookingOrigin::LocalPending
    }
}

/// A committed stock movement with its product snapshot at booking time.
#[derive(Debug, Clone, PartialEq)]
pub struct Booking {
    pub id: String,
    pub kind: BookingKind,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: f64,
    pub unit_price: f64,
    /// quantity × unit_price, fixed when the record was built.
    pub total_price: f64,
    /// Erfassungstyp / attribut label as stored by the backend.
    pub type_tag: Option<String>,
    /// Referenz (inbound) or order number (outbound).
    pub reference: Option<String>,
    pub location: Option<String>,
    pub supplier: Option<String>,
    pub batch_number: Option<String>,
    pub expiry_date: Option<String>,
    pub notes: Option<String>,
    pub reason: Option<String>,
    pub project_name: Option<String>,
    pub justification: Option<String>,
    pub created_at: DateTime<Utc>,
    pub origin: BookingOrigin,
}

impl Booking {
    pub fn is_local_only(&self) -> bool {
        self.origin.is_local_only()
    }
}

/// Prefix of locally generated booking ids; remote ids are plain integers.
pub const LOCAL_ID_PREFIX: &str = "local-";

pub fn new_local_booking_id() -> String {
    format!("{LOCAL_ID_PREFIX}{}", uuid::Uuid::new_v4())
}

pub fn is_local_booking_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}
