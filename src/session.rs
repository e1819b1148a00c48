//! One booking form as seen by the presentation layer.
//!
//! Getters and setters are synchronous; only `submit` awaits. Reference
//! edits schedule the debounced order search on the current tokio runtime.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::api::RemoteService;
use crate::builder;
use crate::connectivity::ConnectivityGate;
use crate::draft::{lock_draft, BookingDraft, LookupState, SharedDraft};
use crate::error::{BookingError, ValidationError};
use crate::history::BookingHistory;
use crate::models::{Booking, BookingType, OrderReference, Product};
use crate::persistor::{BookingPersistor, PersistOutcome};
use crate::resolver::ReferenceResolver;
use crate::stock_guard;

pub struct BookingSession {
    draft: SharedDraft,
    resolver: ReferenceResolver,
    persistor: Arc<BookingPersistor>,
    history: Arc<BookingHistory>,
}

impl BookingSession {
    pub fn new(
        booking_type: BookingType,
        default_location: &str,
        remote: Arc<dyn RemoteService>,
        gate: Arc<ConnectivityGate>,
        persistor: Arc<BookingPersistor>,
        history: Arc<BookingHistory>,
        search_debounce: Duration,
    ) -> Self {
        let draft = BookingDraft::new(booking_type, default_location).shared();
        let resolver = ReferenceResolver::new(remote, gate, draft.clone(), search_debounce);
        Self {
            draft,
            resolver,
            persistor,
            history,
        }
    }

    fn with_draft<T>(&self, f: impl FnOnce(&mut BookingDraft) -> T) -> T {
        f(&mut lock_draft(&self.draft))
    }

    /// Copy of the current form state.
    pub fn snapshot(&self) -> BookingDraft {
        lock_draft(&self.draft).clone()
    }

    // -----------------------------------------------------------------------
    // Booking type and reference
    // -----------------------------------------------------------------------

    pub fn booking_type(&self) -> BookingType {
        self.with_draft(|d| d.booking_type())
    }

    /// Returns `false` for a type of the other booking kind.
    pub fn set_booking_type(&self, booking_type: BookingType) -> bool {
        let changed = self.with_draft(|d| d.set_booking_type(booking_type));
        if changed && !booking_type.is_reference_bound() {
            self.resolver.cancel();
        }
        changed
    }

    pub fn set_reference_text(&self, text: &str) {
        self.resolver.on_text_changed(text);
    }

    pub fn select_order(&self, order: OrderReference) {
        self.resolver.resolve(order);
    }

    pub fn reference_text(&self) -> String {
        self.with_draft(|d| d.reference_text().to_string())
    }

    pub fn selected_order(&self) -> Option<OrderReference> {
        self.with_draft(|d| d.reference().cloned())
    }

    pub fn candidates(&self) -> Vec<OrderReference> {
        self.with_draft(|d| d.candidates().to_vec())
    }

    pub fn lookup_state(&self) -> LookupState {
        self.with_draft(|d| d.lookup_state())
    }

    // -----------------------------------------------------------------------
    // Product and quantity
    // -----------------------------------------------------------------------

    pub fn select_product(&self, product: Product) {
        self.with_draft(|d| {
            d.select_product(product);
            stock_guard::on_quantity_changed(d);
        });
    }

    pub fn clear_product(&self) {
        self.with_draft(BookingDraft::clear_product);
    }

    pub fn product(&self) -> Option<Product> {
        self.with_draft(|d| d.product().cloned())
    }

    pub fn quantity(&self) -> f64 {
        self.with_draft(|d| d.quantity())
    }

    pub fn quantity_text(&self) -> String {
        self.with_draft(|d| d.quantity_text().to_string())
    }

    /// Typed quantity. Input outside the grammar is refused and the field
    /// keeps its previous value.
    pub fn set_quantity_text(&self, text: &str) -> Result<(), ValidationError> {
        self.with_draft(|d| {
            let quantity = stock_guard::parse_quantity_input(text, d.unit())
                .ok_or_else(|| ValidationError::InvalidQuantityInput(text.to_string()))?;
            d.quantity = quantity;
            d.quantity_text = text.to_string();
            stock_guard::on_quantity_changed(d);
            Ok(())
        })
    }

    pub fn increment_quantity(&self) {
        self.with_draft(|d| {
            let quantity = stock_guard::increment(d.quantity, &d.unit);
            set_quantity(d, quantity);
        });
    }

    pub fn decrement_quantity(&self) {
        self.with_draft(|d| {
            let quantity = stock_guard::decrement(d.quantity, &d.unit);
            set_quantity(d, quantity);
        });
    }

    pub fn unit(&self) -> String {
        self.with_draft(|d| d.unit().to_string())
    }

    pub fn available_units(&self) -> Vec<String> {
        self.with_draft(|d| stock_guard::available_units(d.product()))
    }

    /// Leaving the decimal unit rounds a fractional quantity to whole units.
    pub fn set_unit(&self, unit: &str) -> Result<(), ValidationError> {
        self.with_draft(|d| {
            if !stock_guard::available_units(d.product()).iter().any(|u| u == unit) {
                return Err(ValidationError::UnknownUnit(unit.to_string()));
            }
            d.unit = unit.to_string();
            if !stock_guard::is_decimal_unit(unit) && d.quantity.fract() != 0.0 {
                let quantity = d.quantity.round();
                set_quantity(d, quantity);
            }
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Free-text fields
    // -----------------------------------------------------------------------

    pub fn set_justification(&self, text: &str) {
        self.with_draft(|d| d.justification = text.to_string());
    }

    pub fn set_location(&self, text: &str) {
        self.with_draft(|d| d.location = text.to_string());
    }

    pub fn set_supplier(&self, text: &str) -> Result<(), ValidationError> {
        self.with_draft(|d| d.set_supplier(text))
    }

    pub fn supplier(&self) -> String {
        self.with_draft(|d| d.supplier().to_string())
    }

    pub fn supplier_locked(&self) -> bool {
        self.with_draft(|d| d.supplier_locked())
    }

    pub fn set_notes(&self, text: &str) {
        self.with_draft(|d| d.notes = text.to_string());
    }

    pub fn set_batch_number(&self, text: &str) {
        self.with_draft(|d| d.batch_number = text.to_string());
    }

    pub fn set_expiry_date(&self, text: &str) {
        self.with_draft(|d| d.expiry_date = text.to_string());
    }

    pub fn set_reason(&self, text: &str) {
        self.with_draft(|d| d.reason = text.to_string());
    }

    pub fn set_project_name(&self, text: &str) {
        self.with_draft(|d| d.project_name = text.to_string());
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    pub fn justification_required(&self) -> bool {
        self.with_draft(|d| d.justification_required())
    }

    pub fn low_stock_warning(&self) -> bool {
        self.with_draft(|d| d.low_stock_warning())
    }

    /// Whether the submit button is enabled.
    pub fn can_submit(&self) -> bool {
        self.with_draft(|d| stock_guard::can_submit(d))
    }

    /// Validate, persist and start a fresh form. The booking type and
    /// location carry over to the next form.
    pub async fn submit(&self) -> Result<PersistOutcome, BookingError> {
        let built = builder::build(&lock_draft(&self.draft))?;
        debug!(kind = built.remote.kind().as_str(), "submitting booking");

        let outcome = self.persistor.persist(built).await?;
        self.history.record(&outcome.booking);

        self.resolver.cancel();
        self.with_draft(|d| {
            let next = BookingDraft::new(d.booking_type, &d.location);
            *d = next;
        });
        info!(booking_id = %outcome.id(), local_only = outcome.is_local_only(), "booking submitted");
        Ok(outcome)
    }

    /// Earlier bookings of a product in this login.
    pub fn history_for(&self, product: &Product) -> Vec<Booking> {
        self.history.for_product(product.id)
    }
}

fn set_quantity(draft: &mut BookingDraft, quantity: f64) {
    draft.quantity = quantity;
    draft.quantity_text = stock_guard::format_quantity(quantity, &draft.unit);
    stock_guard::on_quantity_changed(draft);
}
