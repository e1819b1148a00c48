//! Warenbuchung booking core.
//!
//! Records incoming and outgoing stock movements (Wareneingang /
//! Warenausgang) against the remote Warenbuchung service and falls back to
//! an on-device SQLite mirror when the service cannot be reached. The host
//! app drives a [`BookingSession`] per form; [`app::bootstrap`] wires the
//! shared services.

pub mod api;
pub mod app;
pub mod builder;
pub mod catalog;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod draft;
pub mod error;
pub mod history;
pub mod logging;
pub mod mirror;
pub mod models;
pub mod persistor;
pub mod resolver;
pub mod session;
pub mod stock_guard;

#[cfg(test)]
mod test_support;

pub use api::{HttpRemoteService, RemoteService};
pub use app::{bootstrap, App};
pub use config::AppConfig;
pub use connectivity::ConnectivityGate;
pub use db::{LocalStore, SqliteStore};
pub use draft::{BookingDraft, LookupState};
pub use error::{BookingError, ConfigError, RemoteError, StoreError, ValidationError};
pub use models::{Booking, BookingKind, BookingOrigin, BookingType, OrderReference, Product};
pub use persistor::{BookingPersistor, PersistOutcome, PersistPath};
pub use session::BookingSession;
