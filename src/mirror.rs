//! Keeps the on-device copy in step with what the remote service confirmed
//! and with bookings that only exist locally.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::db::LocalStore;
use crate::error::StoreError;
use crate::models::{Booking, BookingKind, Product};

pub struct LocalMirrorSync {
    store: Arc<dyn LocalStore>,
}

impl LocalMirrorSync {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    // -----------------------------------------------------------------------
    // Remote reads
    // -----------------------------------------------------------------------

    pub fn mirror_products(&self, products: &[Product]) -> Result<usize, StoreError> {
        let count = self.store.save_products(products)?;
        debug!(count, "products mirrored");
        Ok(count)
    }

    pub fn mirror_bookings(&self, bookings: &[Booking]) -> Result<usize, StoreError> {
        let count = self.store.save_bookings(bookings)?;
        debug!(count, "bookings mirrored");
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Booking writes
    // -----------------------------------------------------------------------

    /// Record the canonical copy of a booking the remote service accepted.
    pub fn record_remote_write(&self, booking: &Booking) -> Result<(), StoreError> {
        let inserted = self.store.commit_booking(booking)?;
        info!(booking_id = %booking.id, kind = booking.kind.as_str(), inserted, "remote booking mirrored");
        Ok(())
    }

    /// Insert a booking that only exists on this device. A second insert of
    /// the same id is refused.
    pub fn record_local_write(&self, booking: &Booking) -> Result<(), StoreError> {
        if self.store.booking(&booking.id)?.is_some() {
            return Err(StoreError::DuplicateBooking(booking.id.clone()));
        }
        self.store.commit_booking(booking)?;
        info!(booking_id = %booking.id, kind = booking.kind.as_str(), "booking stored locally");
        Ok(())
    }

    /// Replace a pending local booking by its confirmed remote copy.
    pub fn confirm_pending(&self, local_id: &str, confirmed: &Booking) -> Result<(), StoreError> {
        self.store.replace_booking(local_id, confirmed)?;
        info!(local_id, booking_id = %confirmed.id, "pending booking superseded");
        Ok(())
    }

    pub fn remove_booking(&self, id: &str) -> Result<bool, StoreError> {
        self.store.delete_booking(id)
    }

    pub fn reset(&self) -> Result<(), StoreError> {
        self.store.reset()
    }

    // -----------------------------------------------------------------------
    // Reads with recovery
    // -----------------------------------------------------------------------

    /// Run `read`; if it fails, wipe the store and try once more. A second
    /// failure is unrecoverable for this session.
    pub fn read_with_recovery<T>(
        &self,
        what: &str,
        read: impl Fn(&dyn LocalStore) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        match read(self.store.as_ref()) {
            Ok(value) => Ok(value),
            Err(first) => {
                warn!(what, error = %first, "local read failed, resetting store");
                if let Err(reset_err) = self.store.reset() {
                    error!(what, error = %reset_err, "local store reset failed");
                    return Err(StoreError::Unrecoverable(reset_err.to_string()));
                }
                read(self.store.as_ref()).map_err(|second| {
                    error!(what, error = %second, "local read failed after reset");
                    StoreError::Unrecoverable(second.to_string())
                })
            }
        }
    }

    pub fn products(&self) -> Result<Vec<Product>, StoreError> {
        self.read_with_recovery("products", |store| store.products())
    }

    pub fn bookings(&self, kind: BookingKind) -> Result<Vec<Booking>, StoreError> {
        self.read_with_recovery("bookings", |store| store.bookings(Some(kind)))
    }

    pub fn all_bookings(&self) -> Result<Vec<Booking>, StoreError> {
        self.read_with_recovery("bookings", |store| store.bookings(None))
    }
}
