//! The in-progress booking form.
//!
//! A draft is owned by one `BookingSession` and shared with the reference
//! resolver's debounce task, hence [`SharedDraft`]. Nothing in here touches
//! the network or the local store.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::ValidationError;
use crate::models::{BookingKind, BookingType, OrderReference, Product, BASE_UNIT};

pub type SharedDraft = Arc<Mutex<BookingDraft>>;

/// Where the reference lookup stands, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupState {
    Idle,
    Searching,
    Disambiguating,
    Resolved,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingDraft {
    pub(crate) booking_type: BookingType,
    pub(crate) product: Option<Product>,
    pub(crate) quantity: f64,
    pub(crate) quantity_text: String,
    pub(crate) unit: String,
    pub(crate) reference_text: String,
    pub(crate) reference: Option<OrderReference>,
    pub(crate) candidates: Vec<OrderReference>,
    pub(crate) lookup: LookupState,
    pub(crate) location: String,
    pub(crate) supplier: String,
    pub(crate) batch_number: String,
    pub(crate) expiry_date: String,
    pub(crate) notes: String,
    pub(crate) reason: String,
    pub(crate) project_name: String,
    pub(crate) justification: String,
    pub(crate) justification_required: bool,
    pub(crate) low_stock_warning: bool,
}

impl BookingDraft {
    pub fn new(booking_type: BookingType, default_location: &str) -> Self {
        Self {
            booking_type,
            product: None,
            quantity: 1.0,
            quantity_text: "1".to_string(),
            unit: BASE_UNIT.to_string(),
            reference_text: String::new(),
            reference: None,
            candidates: Vec::new(),
            lookup: LookupState::Idle,
            location: default_location.to_string(),
            supplier: String::new(),
            batch_number: String::new(),
            expiry_date: String::new(),
            notes: String::new(),
            reason: String::new(),
            project_name: String::new(),
            justification: String::new(),
            justification_required: false,
            low_stock_warning: false,
        }
    }

    pub fn shared(self) -> SharedDraft {
        Arc::new(Mutex::new(self))
    }

    pub fn kind(&self) -> BookingKind {
        self.booking_type.kind()
    }

    pub fn booking_type(&self) -> BookingType {
        self.booking_type
    }

    pub fn product(&self) -> Option<&Product> {
        self.product.as_ref()
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn quantity_text(&self) -> &str {
        &self.quantity_text
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn reference_text(&self) -> &str {
        &self.reference_text
    }

    pub fn reference(&self) -> Option<&OrderReference> {
        self.reference.as_ref()
    }

    pub fn candidates(&self) -> &[OrderReference] {
        &self.candidates
    }

    pub fn lookup_state(&self) -> LookupState {
        self.lookup
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn supplier(&self) -> &str {
        &self.supplier
    }

    pub fn batch_number(&self) -> &str {
        &self.batch_number
    }

    pub fn expiry_date(&self) -> &str {
        &self.expiry_date
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn justification(&self) -> &str {
        &self.justification
    }

    pub fn justification_required(&self) -> bool {
        self.justification_required
    }

    pub fn low_stock_warning(&self) -> bool {
        self.low_stock_warning
    }

    /// The supplier is fixed while an order that names one stays selected.
    pub fn supplier_locked(&self) -> bool {
        self.reference
            .as_ref()
            .and_then(OrderReference::supplier_name)
            .is_some()
    }

    pub fn set_supplier(&mut self, supplier: &str) -> Result<(), ValidationError> {
        if self.supplier_locked() {
            return Err(ValidationError::SupplierLocked);
        }
        self.supplier = supplier.to_string();
        Ok(())
    }

    /// Switch to another type of the same kind. Leaving the order-bound type
    /// drops the reference together with the supplier it implied.
    ///
    /// Returns `false` (and changes nothing) for a type of the other kind.
    pub fn set_booking_type(&mut self, booking_type: BookingType) -> bool {
        if booking_type.kind() != self.kind() {
            return false;
        }
        let leaves_reference_bound =
            self.booking_type.is_reference_bound() && !booking_type.is_reference_bound();
        self.booking_type = booking_type;
        if leaves_reference_bound {
            self.reference_text.clear();
            self.reference = None;
            self.candidates.clear();
            self.lookup = LookupState::Idle;
            self.supplier.clear();
        }
        true
    }

    /// Select a product. Justification state starts over; the unit falls back
    /// to the product's own unit, and an empty supplier is filled from the
    /// product's default supplier.
    pub fn select_product(&mut self, product: Product) {
        self.unit = product
            .unit
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(BASE_UNIT)
            .to_string();
        if self.supplier.trim().is_empty() && !self.supplier_locked() {
            if let Some(default) = product
                .default_supplier
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
            {
                self.supplier = default.to_string();
            }
        }
        self.justification.clear();
        self.justification_required = false;
        self.low_stock_warning = product.stock_quantity <= 0;
        self.product = Some(product);
    }

    pub fn clear_product(&mut self) {
        self.product = None;
        self.justification_required = false;
        self.low_stock_warning = false;
    }
}

/// Lock a shared draft, recovering the data from a poisoned lock: the draft
/// holds no invariants that a panicking writer could leave half-applied.
pub(crate) fn lock_draft(draft: &SharedDraft) -> MutexGuard<'_, BookingDraft> {
    draft.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
