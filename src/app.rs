//! Wiring of the booking core: one remote client, one local store and the
//! services built on them, shared by every booking form.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::api::{ConnectivityResult, HttpRemoteService, RemoteService};
use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::connectivity::ConnectivityGate;
use crate::db::{self, LocalStore};
use crate::error::StoreError;
use crate::history::BookingHistory;
use crate::mirror::LocalMirrorSync;
use crate::models::{Booking, BookingType, Product};
use crate::persistor::BookingPersistor;
use crate::session::BookingSession;

pub struct App {
    config: AppConfig,
    remote: Arc<dyn RemoteService>,
    http: Option<Arc<HttpRemoteService>>,
    gate: Arc<ConnectivityGate>,
    mirror: Arc<LocalMirrorSync>,
    persistor: Arc<BookingPersistor>,
    history: Arc<BookingHistory>,
    catalog: Catalog,
}

/// Open the local store, build the HTTP client and wire everything up.
/// Logging is the host's business (`logging::init`).
pub fn bootstrap(config: AppConfig) -> Result<App> {
    info!(
        "Starting Warenbuchung core v{} ({}) against {}",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_GIT_SHA"),
        config.api_base_url
    );

    let store = db::init(&config.data_dir).with_context(|| {
        format!(
            "failed to open local store in {}",
            config.data_dir.display()
        )
    })?;
    let http = Arc::new(
        HttpRemoteService::new(&config.api_base_url, config.request_timeout)
            .context("failed to create HTTP client")?,
    );

    let mut app = App::with_ports(config, http.clone(), Arc::new(store));
    app.http = Some(http);
    Ok(app)
}

impl App {
    /// Wire the core around arbitrary ports.
    pub fn with_ports(
        config: AppConfig,
        remote: Arc<dyn RemoteService>,
        store: Arc<dyn LocalStore>,
    ) -> Self {
        let gate = Arc::new(ConnectivityGate::new(
            remote.clone(),
            config.connectivity_timeout,
        ));
        let mirror = Arc::new(LocalMirrorSync::new(store));
        let persistor = Arc::new(BookingPersistor::new(
            gate.clone(),
            remote.clone(),
            mirror.clone(),
        ));
        let history = Arc::new(BookingHistory::new());
        let catalog = Catalog::new(
            gate.clone(),
            remote.clone(),
            mirror.clone(),
            history.clone(),
        );
        Self {
            config,
            remote,
            http: None,
            gate,
            mirror,
            persistor,
            history,
            catalog,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn gate(&self) -> &ConnectivityGate {
        &self.gate
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn mirror(&self) -> &LocalMirrorSync {
        &self.mirror
    }

    pub fn history(&self) -> &BookingHistory {
        &self.history
    }

    /// Hand over the bearer token from the host's login flow.
    pub fn login(&self, token: &str) {
        if let Some(http) = &self.http {
            http.set_token(token);
        }
        info!("session token installed");
    }

    /// Probe the server's health endpoint for the settings screen. `None`
    /// when the core runs without the HTTP client.
    pub async fn check_connection(&self) -> Option<ConnectivityResult> {
        match &self.http {
            Some(http) => Some(http.check_health().await),
            None => None,
        }
    }

    /// Forget the session and everything remembered for it.
    pub fn logout(&self) {
        if let Some(http) = &self.http {
            http.clear_token();
        }
        self.history.clear();
        info!("logged out");
    }

    /// First read after start. A broken store is reset once; a second
    /// failure asks the user to restart.
    pub fn startup_check(&self) -> Result<(Vec<Product>, Vec<Booking>), StoreError> {
        let products = self.mirror.products()?;
        let bookings = self.mirror.all_bookings()?;
        self.history.seed(None, &bookings);
        info!(
            products = products.len(),
            bookings = bookings.len(),
            "local store ready"
        );
        Ok((products, bookings))
    }

    /// A new booking form.
    pub fn open_session(&self, booking_type: BookingType) -> BookingSession {
        BookingSession::new(
            booking_type,
            &self.config.default_location,
            self.remote.clone(),
            self.gate.clone(),
            self.persistor.clone(),
            self.history.clone(),
            self.config.search_debounce,
        )
    }
}
