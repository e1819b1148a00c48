//! Commits a built booking: remote when possible, otherwise (or after a
//! failed remote attempt) once to the local mirror.
//!
//! The mirror is written only after the write it mirrors was acknowledged,
//! and a booking is never written to both paths.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::api::RemoteService;
use crate::builder::{BuiltBooking, RemotePayload};
use crate::connectivity::ConnectivityGate;
use crate::error::{BookingError, RemoteError};
use crate::mirror::LocalMirrorSync;
use crate::models::Booking;

/// Which path the booking took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistPath {
    Remote,
    /// The remote write was attempted and failed.
    LocalFallback,
    /// The remote service was unavailable, nothing was attempted.
    LocalOffline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistOutcome {
    pub booking: Booking,
    pub path: PersistPath,
}

impl PersistOutcome {
    /// Remote-issued id, or the local `local-<uuid>` id.
    pub fn id(&self) -> &str {
        &self.booking.id
    }

    pub fn is_local_only(&self) -> bool {
        self.booking.is_local_only()
    }
}

pub struct BookingPersistor {
    gate: Arc<ConnectivityGate>,
    remote: Arc<dyn RemoteService>,
    mirror: Arc<LocalMirrorSync>,
}

impl BookingPersistor {
    pub fn new(
        gate: Arc<ConnectivityGate>,
        remote: Arc<dyn RemoteService>,
        mirror: Arc<LocalMirrorSync>,
    ) -> Self {
        Self {
            gate,
            remote,
            mirror,
        }
    }

    pub async fn persist(&self, built: BuiltBooking) -> Result<PersistOutcome, BookingError> {
        let BuiltBooking { remote, local } = built;

        if !self.gate.is_remote_available().await {
            info!(kind = local.kind.as_str(), "remote unavailable, booking locally");
            return self.write_local(local, PersistPath::LocalOffline);
        }

        match self.write_remote(&remote).await {
            Ok(mut confirmed) => {
                if confirmed.product_name.trim().is_empty() {
                    confirmed.product_name = local.product_name.clone();
                }
                if confirmed.justification.is_none() {
                    confirmed.justification = local.justification.clone();
                }
                if let Err(e) = self.mirror.record_remote_write(&confirmed) {
                    error!(booking_id = %confirmed.id, error = %e, "remote booking could not be mirrored");
                    return Err(BookingError::MirrorFailed {
                        remote_id: confirmed.id,
                        source: e,
                    });
                }
                info!(booking_id = %confirmed.id, kind = confirmed.kind.as_str(), "booking confirmed remotely");
                Ok(PersistOutcome {
                    booking: confirmed,
                    path: PersistPath::Remote,
                })
            }
            Err(e @ RemoteError::InvalidResponse { .. }) => {
                error!(error = %e, "remote accepted booking but its answer is unusable");
                Err(BookingError::Unconfirmed(e))
            }
            Err(e) if e.allows_local_fallback() => {
                warn!(error = %e, "remote booking failed, falling back to local store");
                self.write_local(local, PersistPath::LocalFallback)
            }
            Err(e) => {
                warn!(error = %e, "remote booking rejected");
                Err(BookingError::Rejected(e))
            }
        }
    }

    async fn write_remote(&self, payload: &RemotePayload) -> Result<Booking, RemoteError> {
        match payload {
            RemotePayload::Inbound(request) => self.remote.create_inbound_booking(request).await,
            RemotePayload::Outbound(request) => self.remote.create_outbound_booking(request).await,
        }
    }

    fn write_local(
        &self,
        booking: Booking,
        path: PersistPath,
    ) -> Result<PersistOutcome, BookingError> {
        self.mirror.record_local_write(&booking).map_err(|e| {
            error!(booking_id = %booking.id, error = %e, "local booking write failed");
            BookingError::LocalStore(e)
        })?;
        Ok(PersistOutcome { booking, path })
    }
}
