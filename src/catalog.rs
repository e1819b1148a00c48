//! Reads that feed the booking screens: products, booking lists and the
//! selectable texts. Online reads refresh the mirror; offline (or after a
//! failed remote read) the mirror answers.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::RemoteService;
use crate::connectivity::ConnectivityGate;
use crate::error::{BookingError, StoreError};
use crate::history::BookingHistory;
use crate::mirror::LocalMirrorSync;
use crate::models::{Booking, BookingKind, Product};

pub const DEFAULT_JUSTIFICATIONS: [&str; 8] = [
    "Notfall-Entnahme für dringenden Auftrag",
    "Nachbestellung bereits veranlasst",
    "Lieferant bestätigt Nachschub",
    "Interne Umbuchung zwischen Standorten",
    "Qualitätsprüfung erforderlich",
    "Kundenspezifische Anpassung",
    "Wartungsarbeiten am Lager",
    "Inventur-Korrektur",
];

pub const DEFAULT_REASONS: [&str; 4] = ["Kommission", "Auftrag", "Umbuchung", "Beschädigung"];

pub struct Catalog {
    gate: Arc<ConnectivityGate>,
    remote: Arc<dyn RemoteService>,
    mirror: Arc<LocalMirrorSync>,
    history: Arc<BookingHistory>,
}

impl Catalog {
    pub fn new(
        gate: Arc<ConnectivityGate>,
        remote: Arc<dyn RemoteService>,
        mirror: Arc<LocalMirrorSync>,
        history: Arc<BookingHistory>,
    ) -> Self {
        Self {
            gate,
            remote,
            mirror,
            history,
        }
    }

    fn mirror_quietly<T>(&self, what: &str, result: Result<T, StoreError>) {
        if let Err(e) = result {
            warn!(what, error = %e, "could not refresh local mirror");
        }
    }

    pub async fn load_products(&self) -> Result<Vec<Product>, StoreError> {
        if self.gate.is_remote_available().await {
            match self.remote.get_products().await {
                Ok(products) => {
                    self.mirror_quietly("products", self.mirror.mirror_products(&products));
                    return Ok(products);
                }
                Err(e) => warn!(error = %e, "loading products failed, using local mirror"),
            }
        }
        self.mirror.products()
    }

    /// Products whose SKU or name contains `query`. The caller always picks
    /// from the list, even when it has a single entry.
    pub async fn search_products(&self, query: &str) -> Result<Vec<Product>, StoreError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        if self.gate.is_remote_available().await {
            match self.remote.search_products(query).await {
                Ok(products) => {
                    self.mirror_quietly("products", self.mirror.mirror_products(&products));
                    return Ok(products);
                }
                Err(e) => warn!(query, error = %e, "product search failed, searching local mirror"),
            }
        }
        let needle = query.to_lowercase();
        let matches: Vec<Product> = self
            .mirror
            .products()?
            .into_iter()
            .filter(|p| {
                p.sku.to_lowercase().contains(&needle) || p.name.to_lowercase().contains(&needle)
            })
            .collect();
        debug!(query, matches = matches.len(), "local product search");
        Ok(matches)
    }

    /// Bookings of one kind, newest first. The list replaces the history of
    /// that kind; local-only bookings are kept in the result either way.
    pub async fn load_bookings(&self, kind: BookingKind) -> Result<Vec<Booking>, StoreError> {
        if self.gate.is_remote_available().await {
            match self.remote.list_bookings(kind).await {
                Ok(remote) => {
                    self.mirror_quietly("bookings", self.mirror.mirror_bookings(&remote));
                }
                Err(e) => warn!(kind = kind.as_str(), error = %e, "loading bookings failed, using local mirror"),
            }
        }
        let bookings = self.mirror.bookings(kind)?;
        self.history.seed(Some(kind), &bookings);
        Ok(bookings)
    }

    /// Delete a booking. Remote bookings need the remote service; local-only
    /// ones are removed from the mirror directly.
    pub async fn delete_booking(&self, booking: &Booking) -> Result<(), BookingError> {
        if !booking.is_local_only() {
            if !self.gate.is_remote_available().await {
                return Err(BookingError::RemoteUnavailable);
            }
            self.remote
                .delete_booking(booking.kind, &booking.id)
                .await
                .map_err(BookingError::Remote)?;
        }
        self.mirror.remove_booking(&booking.id)?;
        self.history.remove(&booking.id);
        debug!(booking_id = %booking.id, "booking deleted");
        Ok(())
    }

    /// Active justification texts in display order; built-in defaults when
    /// the server has none or cannot be asked.
    pub async fn justification_templates(&self) -> Vec<String> {
        if self.gate.is_remote_available().await {
            match self.remote.get_justification_templates().await {
                Ok(mut templates) => {
                    templates.retain(|t| t.is_active && !t.text.trim().is_empty());
                    templates.sort_by(|a, b| {
                        a.order_index.cmp(&b.order_index).then_with(|| a.text.cmp(&b.text))
                    });
                    if !templates.is_empty() {
                        return templates.into_iter().map(|t| t.text).collect();
                    }
                }
                Err(e) => warn!(error = %e, "loading justification templates failed"),
            }
        }
        DEFAULT_JUSTIFICATIONS.iter().map(|s| s.to_string()).collect()
    }

    /// Active outbound reasons in display order, with built-in defaults.
    pub async fn outbound_reasons(&self) -> Vec<String> {
        if self.gate.is_remote_available().await {
            match self.remote.get_outbound_reasons().await {
                Ok(mut reasons) => {
                    reasons.retain(|r| r.is_active && !r.name.trim().is_empty());
                    reasons.sort_by(|a, b| {
                        a.order_index.cmp(&b.order_index).then_with(|| a.name.cmp(&b.name))
                    });
                    if !reasons.is_empty() {
                        return reasons.into_iter().map(|r| r.name).collect();
                    }
                }
                Err(e) => warn!(error = %e, "loading outbound reasons failed"),
            }
        }
        DEFAULT_REASONS.iter().map(|s| s.to_string()).collect()
    }
}
