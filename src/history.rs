//! Per-product booking history for the current login.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use crate::models::{Booking, BookingKind, ProductId};

#[derive(Default)]
pub struct BookingHistory {
    entries: RwLock<HashMap<ProductId, Vec<Booking>>>,
}

impl BookingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or update a booking (by id).
    pub fn record(&self, booking: &Booking) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let list = entries.entry(booking.product_id).or_default();
        match list.iter_mut().find(|b| b.id == booking.id) {
            Some(existing) => *existing = booking.clone(),
            None => list.push(booking.clone()),
        }
    }

    /// Replace the history of `kind` (both kinds for `None`) with a freshly
    /// loaded booking list.
    pub fn seed(&self, kind: Option<BookingKind>, bookings: &[Booking]) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match kind {
            Some(kind) => {
                for list in entries.values_mut() {
                    list.retain(|b| b.kind != kind);
                }
                entries.retain(|_, list| !list.is_empty());
            }
            None => entries.clear(),
        }
        for booking in bookings.iter().filter(|b| kind.map_or(true, |k| b.kind == k)) {
            entries
                .entry(booking.product_id)
                .or_default()
                .push(booking.clone());
        }
        debug!(products = entries.len(), "booking history seeded");
    }

    pub fn remove(&self, booking_id: &str) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for list in entries.values_mut() {
            list.retain(|b| b.id != booking_id);
        }
        entries.retain(|_, list| !list.is_empty());
    }

    /// Bookings of one product, newest first.
    pub fn for_product(&self, product_id: ProductId) -> Vec<Booking> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut list = entries.get(&product_id).cloned().unwrap_or_default();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    pub fn last_for_product(&self, product_id: ProductId) -> Option<Booking> {
        self.for_product(product_id).into_iter().next()
    }

    /// Forget everything, e.g. on logout.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}
