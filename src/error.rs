//! Error taxonomy for the booking core.
//!
//! Validation problems are reported before any I/O happens, remote failures
//! are classified so the persistor can decide whether a local fallback is
//! allowed, and local-store failures are always fatal for the operation that
//! hit them.

use thiserror::Error;

/// A draft that cannot be submitted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Bitte wählen Sie ein Produkt aus")]
    MissingProduct,
    #[error("Die Anzahl muss mindestens 1 betragen")]
    QuantityBelowMinimum,
    #[error("Bitte geben Sie einen Lagerort ein")]
    MissingLocation,
    #[error("Bitte geben Sie eine Begründung für die Überschreitung des Lagerbestands ein")]
    MissingJustification,
    #[error("Bei Erfassungstyp 'Lager' muss eine Bemerkung angegeben werden")]
    MissingNotes,
    #[error("Ungültige Mengeneingabe: {0}")]
    InvalidQuantityInput(String),
    #[error("Lieferant ist durch die ausgewählte Bestellung festgelegt")]
    SupplierLocked,
    #[error("Ungültiges Verfallsdatum: {0}")]
    InvalidExpiryDate(String),
    #[error("Einheit {0} ist für dieses Produkt nicht verfügbar")]
    UnknownUnit(String),
}

/// Failure talking to the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The request never produced an HTTP response (DNS, connect, timeout).
    #[error("{0}")]
    Transport(String),
    /// 401/403: the session is gone or not allowed.
    #[error("Unauthorized (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },
    /// The server understood the request and refused it on business grounds.
    #[error("Rejected by server (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    /// Any other non-success status.
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },
    /// The server answered 2xx but the body could not be read or decoded.
    /// The request itself took effect.
    #[error("Invalid response from server (HTTP {status}): {message}")]
    InvalidResponse { status: u16, message: String },
    /// The request body could not be encoded; nothing was sent.
    #[error("Ungültige Anfrage: {0}")]
    Encode(String),
}

impl RemoteError {
    /// Only failures where the server did not take the write may fall back to
    /// the local path. Business rejections must reach the user, and a 2xx with
    /// an unreadable body already booked remotely.
    pub fn allows_local_fallback(&self) -> bool {
        !matches!(
            self,
            RemoteError::Rejected { .. } | RemoteError::InvalidResponse { .. }
        )
    }
}

/// Failure of the on-device store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("local store: {0}")]
    Sqlite(String),
    #[error("local store lock poisoned")]
    LockPoisoned,
    #[error("local record is corrupt: {0}")]
    Corrupt(String),
    #[error("booking {0} already exists in the local store")]
    DuplicateBooking(String),
    #[error("Lokale Datenbank konnte nicht wiederhergestellt werden ({0}). Bitte starten Sie die App neu.")]
    Unrecoverable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::FromSqlConversionFailure(..) => StoreError::Corrupt(err.to_string()),
            other => StoreError::Sqlite(other.to_string()),
        }
    }
}

/// Outcome of a failed booking submission, as surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The remote service refused the booking; no local copy was written.
    #[error("{0}")]
    Rejected(RemoteError),
    /// The operation needs the remote service and it is not reachable.
    #[error("Keine Verbindung zum Server")]
    RemoteUnavailable,
    /// The server accepted the booking but its answer was unusable. No local
    /// copy was written; the booking appears with the next list refresh.
    #[error("Buchung wurde vom Server angenommen, die Antwort war aber ungültig: {0}")]
    Unconfirmed(RemoteError),
    /// A remote call outside the booking write failed.
    #[error("{0}")]
    Remote(RemoteError),
    /// The write (or its mirror update) failed on the device.
    #[error("Fehler beim Speichern der Buchung: {0}")]
    LocalStore(#[from] StoreError),
    /// The remote write succeeded but the mirror could not record it.
    #[error("Buchung {remote_id} wurde gebucht, aber nicht lokal gespeichert: {source}")]
    MirrorFailed {
        remote_id: String,
        #[source]
        source: StoreError,
    },
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_business_rejections_block_fallback() {
        assert!(RemoteError::Transport("offline".into()).allows_local_fallback());
        assert!(RemoteError::Server {
            status: 503,
            message: "down".into()
        }
        .allows_local_fallback());
        assert!(RemoteError::Unauthorized {
            status: 401,
            message: String::new()
        }
        .allows_local_fallback());
        assert!(!RemoteError::Rejected {
            status: 400,
            message: "Insufficient stock quantity".into()
        }
        .allows_local_fallback());
        assert!(!RemoteError::InvalidResponse {
            status: 201,
            message: "invalid type: string \"abc\", expected i64".into()
        }
        .allows_local_fallback());
    }

    #[test]
    fn test_validation_error_converts_into_booking_error() {
        let err: BookingError = ValidationError::MissingLocation.into();
        assert_eq!(err, BookingError::Validation(ValidationError::MissingLocation));
        assert_eq!(err.to_string(), "Bitte geben Sie einen Lagerort ein");
    }
}
