//! Warenbuchung REST API client.
//!
//! [`RemoteService`] is the port the booking core talks to; the HTTP
//! implementation authenticates with a bearer token and maps every failure
//! onto [`RemoteError`] so callers can tell transport trouble from business
//! rejections.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::builder::{InboundRequest, OutboundRequest};
use crate::error::RemoteError;
use crate::models::{
    Booking, BookingKind, BookingOrigin, JustificationTemplate, OrderReference, OutboundReason,
    Product, ProductId,
};

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Whether the current session is accepted by the server. Never errors.
    async fn is_authenticated(&self) -> bool;
    async fn get_products(&self) -> Result<Vec<Product>, RemoteError>;
    async fn search_products(&self, query: &str) -> Result<Vec<Product>, RemoteError>;
    /// Orders whose number contains `order_number`.
    async fn get_orders(&self, order_number: &str) -> Result<Vec<OrderReference>, RemoteError>;
    async fn create_inbound_booking(&self, request: &InboundRequest)
        -> Result<Booking, RemoteError>;
    async fn create_outbound_booking(
        &self,
        request: &OutboundRequest,
    ) -> Result<Booking, RemoteError>;
    async fn list_bookings(&self, kind: BookingKind) -> Result<Vec<Booking>, RemoteError>;
    async fn delete_booking(&self, kind: BookingKind, id: &str) -> Result<(), RemoteError>;
    async fn get_justification_templates(&self) -> Result<Vec<JustificationTemplate>, RemoteError>;
    async fn get_outbound_reasons(&self) -> Result<Vec<OutboundReason>, RemoteError>;
}

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the API base URL:
/// - ensure a scheme is present (http for local hosts, https otherwise)
/// - strip trailing slashes
/// - ensure it ends in `/api`
pub fn normalize_api_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        let local = ["localhost", "127.0.0.1", "10.0.2.2"]
            .iter()
            .any(|host| url.starts_with(host));
        url = if local {
            format!("http://{url}")
        } else {
            format!("https://{url}")
        };
    }

    while url.ends_with('/') {
        url.pop();
    }

    if !url.ends_with("/api") {
        url.push_str("/api");
    }

    url
}

fn kind_path(kind: BookingKind) -> &'static str {
    match kind {
        BookingKind::Inbound => "/wareneingaenge",
        BookingKind::Outbound => "/warenausgaenge",
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Server unter {url} nicht erreichbar");
    }
    if err.is_timeout() {
        return format!("Zeitüberschreitung bei der Verbindung zu {url}");
    }
    if err.is_builder() {
        return format!("Ungültige Server-URL: {url}");
    }
    format!("Netzwerkfehler bei der Kommunikation mit {url}: {err}")
}

fn status_message(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Sitzung abgelaufen, bitte erneut anmelden".to_string(),
        403 => "Keine Berechtigung".to_string(),
        404 => "Endpunkt nicht gefunden".to_string(),
        s if s >= 500 => format!("Serverfehler (HTTP {s})"),
        s => format!("Unerwartete Antwort vom Server (HTTP {s})"),
    }
}

/// Pull a readable message out of an error body. ASP.NET returns plain text,
/// `{ "message": … }`, or a problem-details object with `title`/`errors`.
fn error_detail(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let message = ["message", "error", "title", "detail"]
            .iter()
            .find_map(|key| json.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| status_message(status));
        return match json.get("errors") {
            Some(errors) => format!("{message}: {errors}"),
            None => message,
        };
    }
    if let Some(unquoted) = body.strip_prefix('"').and_then(|b| b.strip_suffix('"')) {
        return unquoted.to_string();
    }
    if body.is_empty() {
        status_message(status)
    } else {
        body.to_string()
    }
}

fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    let message = error_detail(status, body);
    let status = status.as_u16();
    match status {
        400 | 409 | 422 => RemoteError::Rejected { status, message },
        401 | 403 => RemoteError::Unauthorized { status, message },
        _ => RemoteError::Server { status, message },
    }
}

// ---------------------------------------------------------------------------
// Connectivity test
// ---------------------------------------------------------------------------

/// Result of a health check.
#[derive(Debug, Serialize)]
pub struct ConnectivityResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

pub struct HttpRemoteService {
    base_url: String,
    client: Client,
    token: RwLock<Option<Zeroizing<String>>>,
}

impl HttpRemoteService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Transport(format!("HTTP-Client konnte nicht erstellt werden: {e}")))?;
        Ok(Self {
            base_url: normalize_api_url(base_url),
            client,
            token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Install the bearer token obtained by the host's login flow.
    pub fn set_token(&self, token: &str) {
        if let Ok(mut slot) = self.token.write() {
            *slot = Some(Zeroizing::new(token.to_string()));
        }
    }

    pub fn clear_token(&self) {
        if let Ok(mut slot) = self.token.write() {
            *slot = None;
        }
    }

    fn has_token(&self) -> bool {
        self.token
            .read()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Lightweight unauthenticated probe of `/health`.
    pub async fn check_health(&self) -> ConnectivityResult {
        let url = format!("{}/health", self.base_url);
        let start = Instant::now();

        let resp = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                return ConnectivityResult {
                    success: false,
                    latency_ms: None,
                    error: Some(friendly_error(&self.base_url, &e)),
                };
            }
        };

        let latency = start.elapsed().as_millis() as u64;
        let status = resp.status();
        if status.is_success() {
            info!(latency_ms = latency, "health check passed");
            ConnectivityResult {
                success: true,
                latency_ms: Some(latency),
                error: None,
            }
        } else {
            ConnectivityResult {
                success: false,
                latency_ms: Some(latency),
                error: Some(status_message(status)),
            }
        }
    }

    /// Perform an authenticated request and return status and raw body.
    ///
    /// `path` is relative to the base URL and starts with a slash.
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<(StatusCode, String), RemoteError> {
        let url = format!("{}{path}", self.base_url);
        let mut req = self.client.request(method.clone(), &url);
        if !query.is_empty() {
            req = req.query(query);
        }
        let token: Option<Zeroizing<String>> = self
            .token
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().map(|t| Zeroizing::new(t.to_string())));
        if let Some(token) = &token {
            req = req.bearer_auth(token.as_str());
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        debug!(%method, path, "remote request");
        let resp = req
            .send()
            .await
            .map_err(|e| RemoteError::Transport(friendly_error(&self.base_url, &e)))?;
        let status = resp.status();

        if status.is_success() {
            let text = resp.text().await.map_err(|e| {
                warn!(%method, path, status = status.as_u16(), error = %e, "response body unreadable");
                invalid_response(status, e)
            })?;
            return Ok((status, text));
        }

        // An error page that cannot be read still carries its status.
        let text = resp.text().await.unwrap_or_default();
        let err = classify_status(status, &text);
        warn!(%method, path, status = status.as_u16(), error = %err, "remote request failed");
        if matches!(err, RemoteError::Unauthorized { status: 401, .. }) {
            self.clear_token();
        }
        Err(err)
    }

    /// Perform a request and decode the JSON answer.
    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<T, RemoteError> {
        let (status, text) = self.send(method, path, query, body).await?;
        decode(status, &text)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, RemoteError> {
        self.send_json(Method::GET, path, query, None).await
    }
}

/// The server answered 2xx, so whatever it was asked to do has happened.
fn invalid_response(status: StatusCode, err: impl std::fmt::Display) -> RemoteError {
    RemoteError::InvalidResponse {
        status: status.as_u16(),
        message: err.to_string(),
    }
}

fn decode<T: DeserializeOwned>(status: StatusCode, text: &str) -> Result<T, RemoteError> {
    serde_json::from_str(text).map_err(|e| invalid_response(status, e))
}

fn to_body<T: Serialize>(value: &T) -> Result<Value, RemoteError> {
    serde_json::to_value(value).map_err(|e| RemoteError::Encode(e.to_string()))
}

#[async_trait]
impl RemoteService for HttpRemoteService {
    async fn is_authenticated(&self) -> bool {
        if !self.has_token() {
            return false;
        }
        match self.send(Method::GET, "/auth/me", &[], None).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "session check failed");
                false
            }
        }
    }

    async fn get_products(&self) -> Result<Vec<Product>, RemoteError> {
        self.get_json("/products", &[]).await
    }

    async fn search_products(&self, query: &str) -> Result<Vec<Product>, RemoteError> {
        self.get_json("/products/search", &[("query", query)]).await
    }

    async fn get_orders(&self, order_number: &str) -> Result<Vec<OrderReference>, RemoteError> {
        self.get_json("/orders", &[("orderNumber", order_number)])
            .await
    }

    async fn create_inbound_booking(
        &self,
        request: &InboundRequest,
    ) -> Result<Booking, RemoteError> {
        let record: InboundRecord = self
            .send_json(
                Method::POST,
                kind_path(BookingKind::Inbound),
                &[],
                Some(to_body(request)?),
            )
            .await?;
        Ok(record.into_booking())
    }

    async fn create_outbound_booking(
        &self,
        request: &OutboundRequest,
    ) -> Result<Booking, RemoteError> {
        let record: OutboundRecord = self
            .send_json(
                Method::POST,
                kind_path(BookingKind::Outbound),
                &[],
                Some(to_body(request)?),
            )
            .await?;
        Ok(record.into_booking())
    }

    async fn list_bookings(&self, kind: BookingKind) -> Result<Vec<Booking>, RemoteError> {
        match kind {
            BookingKind::Inbound => {
                let records: Vec<InboundRecord> = self.get_json(kind_path(kind), &[]).await?;
                Ok(records.into_iter().map(InboundRecord::into_booking).collect())
            }
            BookingKind::Outbound => {
                let records: Vec<OutboundRecord> = self.get_json(kind_path(kind), &[]).await?;
                Ok(records
                    .into_iter()
                    .map(OutboundRecord::into_booking)
                    .collect())
            }
        }
    }

    async fn delete_booking(&self, kind: BookingKind, id: &str) -> Result<(), RemoteError> {
        let path = format!("{}/{id}", kind_path(kind));
        self.send(Method::DELETE, &path, &[], None).await?;
        Ok(())
    }

    async fn get_justification_templates(&self) -> Result<Vec<JustificationTemplate>, RemoteError> {
        self.get_json("/settings/justifications", &[]).await
    }

    async fn get_outbound_reasons(&self) -> Result<Vec<OutboundReason>, RemoteError> {
        self.get_json("/settings/reasons", &[]).await
    }
}

// ---------------------------------------------------------------------------
// Response records
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundRecord {
    #[serde(alias = "Id")]
    id: i64,
    #[serde(alias = "ProductId")]
    product_id: ProductId,
    #[serde(default, alias = "ProductName")]
    product_name: String,
    #[serde(alias = "Quantity")]
    quantity: f64,
    #[serde(default, alias = "UnitPrice")]
    unit_price: f64,
    #[serde(default, alias = "TotalPrice")]
    total_price: f64,
    #[serde(default, alias = "Erfassungstyp")]
    erfassungstyp: Option<String>,
    #[serde(default, alias = "Referenz")]
    referenz: Option<String>,
    #[serde(default, alias = "Location")]
    location: Option<String>,
    #[serde(default, alias = "Supplier")]
    supplier: Option<String>,
    #[serde(default, alias = "BatchNumber")]
    batch_number: Option<String>,
    #[serde(default, alias = "ExpiryDate")]
    expiry_date: Option<String>,
    #[serde(default, alias = "Notes")]
    notes: Option<String>,
    #[serde(default, alias = "CreatedAt")]
    created_at: Option<String>,
}

impl InboundRecord {
    fn into_booking(self) -> Booking {
        Booking {
            id: self.id.to_string(),
            kind: BookingKind::Inbound,
            product_id: self.product_id,
            product_name: self.product_name,
            quantity: self.quantity,
            unit_price: self.unit_price,
            total_price: self.total_price,
            type_tag: self.erfassungstyp,
            reference: self.referenz,
            location: self.location,
            supplier: self.supplier,
            batch_number: self.batch_number,
            expiry_date: self.expiry_date,
            notes: self.notes,
            reason: None,
            project_name: None,
            justification: None,
            created_at: parse_server_timestamp(self.created_at.as_deref()),
            origin: BookingOrigin::RemoteConfirmed,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutboundRecord {
    #[serde(alias = "Id")]
    id: i64,
    #[serde(alias = "ProductId")]
    product_id: ProductId,
    #[serde(default, alias = "ProductName")]
    product_name: String,
    #[serde(alias = "Quantity")]
    quantity: f64,
    #[serde(default, alias = "UnitPrice")]
    unit_price: f64,
    #[serde(default, alias = "TotalPrice")]
    total_price: f64,
    #[serde(default, alias = "OrderNumber")]
    order_number: Option<String>,
    #[serde(default, alias = "Notes")]
    notes: Option<String>,
    #[serde(default, alias = "Attribut")]
    attribut: Option<String>,
    #[serde(default, alias = "ProjectName")]
    project_name: Option<String>,
    #[serde(default, alias = "Begruendung")]
    begruendung: Option<String>,
    #[serde(default, alias = "CreatedAt")]
    created_at: Option<String>,
}

impl OutboundRecord {
    fn into_booking(self) -> Booking {
        let (reason, location, notes) = split_outbound_notes(self.notes.as_deref());
        Booking {
            id: self.id.to_string(),
            kind: BookingKind::Outbound,
            product_id: self.product_id,
            product_name: self.product_name,
            quantity: self.quantity,
            unit_price: self.unit_price,
            total_price: self.total_price,
            type_tag: self.attribut,
            reference: self.order_number,
            location,
            supplier: None,
            batch_number: None,
            expiry_date: None,
            notes,
            reason,
            project_name: self.project_name,
            justification: self.begruendung.filter(|j| !j.trim().is_empty()),
            created_at: parse_server_timestamp(self.created_at.as_deref()),
            origin: BookingOrigin::RemoteConfirmed,
        }
    }
}

/// Inverse of `builder::compose_outbound_notes`. Notes that do not follow the
/// `Grund: …, Lagerort: …` layout are kept verbatim.
fn split_outbound_notes(
    notes: Option<&str>,
) -> (Option<String>, Option<String>, Option<String>) {
    let Some(raw) = notes.map(str::trim).filter(|n| !n.is_empty()) else {
        return (None, None, None);
    };
    let Some(rest) = raw.strip_prefix("Grund: ") else {
        return (None, None, Some(raw.to_string()));
    };
    let Some((reason, rest)) = rest.split_once(", Lagerort: ") else {
        return (None, None, Some(raw.to_string()));
    };
    let (location, remark) = match rest.split_once(", Bemerkung: ") {
        Some((location, remark)) => (location, Some(remark.to_string())),
        None => (rest, None),
    };
    let non_empty = |s: &str| (!s.trim().is_empty()).then(|| s.trim().to_string());
    (non_empty(reason), non_empty(location), remark)
}

/// The backend emits either RFC 3339 or zone-less timestamps (UTC).
fn parse_server_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    let Some(raw) = raw else {
        return Utc::now();
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.with_timezone(&Utc);
    }
    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => naive.and_utc(),
        Err(_) => {
            warn!(raw, "unparseable server timestamp, using now");
            Utc::now()
        }
    }
}
