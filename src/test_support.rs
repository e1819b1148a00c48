//! Fixtures and in-memory fakes of the remote and local ports.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::api::RemoteService;
use crate::builder::{InboundRequest, OutboundRequest};
use crate::db::{LocalStore, SqliteStore};
use crate::error::{RemoteError, StoreError};
use crate::models::{
    is_local_booking_id, Booking, BookingKind, BookingOrigin, JustificationTemplate,
    OrderReference, OutboundReason, Product, ProductId,
};

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 10, 15, 0)
        .single()
        .expect("valid timestamp")
}

pub fn product(id: ProductId, stock: i64) -> Product {
    Product {
        id,
        sku: format!("SKU-{id:04}"),
        name: format!("Artikel {id}"),
        description: None,
        unit: None,
        price: 1.0,
        stock_quantity: stock,
        location_stock: 0.0,
        default_supplier: None,
        item_type: None,
        created_at: None,
        updated_at: None,
    }
}

pub fn order(id: i64, number: &str, supplier: Option<&str>) -> OrderReference {
    OrderReference {
        id,
        order_number: number.to_string(),
        order_date: None,
        status: Some("Offen".into()),
        supplier: supplier.map(str::to_string),
        supplier_id: None,
        assigned_item_count: 0,
        created_at: None,
        updated_at: None,
    }
}

pub fn booking(id: &str, kind: BookingKind, product_id: ProductId, quantity: f64) -> Booking {
    Booking {
        id: id.to_string(),
        kind,
        product_id,
        product_name: format!("Artikel {product_id}"),
        quantity,
        unit_price: 1.0,
        total_price: quantity,
        type_tag: None,
        reference: None,
        location: Some("Lager S03".into()),
        supplier: None,
        batch_number: None,
        expiry_date: None,
        notes: None,
        reason: None,
        project_name: None,
        justification: None,
        created_at: fixed_time(),
        origin: if is_local_booking_id(id) {
            BookingOrigin::LocalPending
        } else {
            BookingOrigin::RemoteConfirmed
        },
    }
}

// ---------------------------------------------------------------------------
// Remote fake
// ---------------------------------------------------------------------------

pub struct FakeRemote {
    pub authenticated: AtomicBool,
    pub auth_delay: Mutex<Duration>,
    pub products: Mutex<Vec<Product>>,
    pub orders: Mutex<Vec<OrderReference>>,
    pub order_delay: Mutex<Duration>,
    pub orders_error: Mutex<Option<RemoteError>>,
    pub read_error: Mutex<Option<RemoteError>>,
    pub create_error: Mutex<Option<RemoteError>>,
    pub delete_error: Mutex<Option<RemoteError>>,
    pub bookings: Mutex<Vec<Booking>>,
    pub templates: Mutex<Vec<JustificationTemplate>>,
    pub reasons: Mutex<Vec<OutboundReason>>,
    next_id: AtomicI64,
    calls: Mutex<Vec<String>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            authenticated: AtomicBool::new(true),
            auth_delay: Mutex::new(Duration::ZERO),
            products: Mutex::new(Vec::new()),
            orders: Mutex::new(Vec::new()),
            order_delay: Mutex::new(Duration::ZERO),
            orders_error: Mutex::new(None),
            read_error: Mutex::new(None),
            create_error: Mutex::new(None),
            delete_error: Mutex::new(None),
            bookings: Mutex::new(Vec::new()),
            templates: Mutex::new(Vec::new()),
            reasons: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(100),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_authenticated(&self, value: bool) {
        self.authenticated.store(value, Ordering::SeqCst);
    }

    pub fn set_orders(&self, orders: Vec<OrderReference>) {
        *self.orders.lock().expect("lock") = orders;
    }

    pub fn set_products(&self, products: Vec<Product>) {
        *self.products.lock().expect("lock") = products;
    }

    pub fn fail_creates_with(&self, err: RemoteError) {
        *self.create_error.lock().expect("lock") = Some(err);
    }

    pub fn fail_reads_with(&self, err: RemoteError) {
        *self.read_error.lock().expect("lock") = Some(err);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("lock").push(call);
    }

    fn read_result(&self) -> Result<(), RemoteError> {
        match self.read_error.lock().expect("lock").clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn product_name(&self, id: ProductId) -> String {
        self.products
            .lock()
            .expect("lock")
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.name.clone())
            .unwrap_or_default()
    }

    fn confirm(&self, mut booking: Booking) -> Booking {
        booking.id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        booking.origin = BookingOrigin::RemoteConfirmed;
        self.bookings.lock().expect("lock").push(booking.clone());
        booking
    }
}

#[async_trait]
impl RemoteService for FakeRemote {
    async fn is_authenticated(&self) -> bool {
        self.record("is_authenticated".into());
        let delay = *self.auth_delay.lock().expect("lock");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn get_products(&self) -> Result<Vec<Product>, RemoteError> {
        self.record("get_products".into());
        self.read_result()?;
        Ok(self.products.lock().expect("lock").clone())
    }

    async fn search_products(&self, query: &str) -> Result<Vec<Product>, RemoteError> {
        self.record(format!("search_products:{query}"));
        self.read_result()?;
        let needle = query.to_lowercase();
        Ok(self
            .products
            .lock()
            .expect("lock")
            .iter()
            .filter(|p| {
                p.sku.to_lowercase().contains(&needle) || p.name.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }

    async fn get_orders(&self, order_number: &str) -> Result<Vec<OrderReference>, RemoteError> {
        self.record(format!("get_orders:{order_number}"));
        let delay = *self.order_delay.lock().expect("lock");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.orders_error.lock().expect("lock").clone() {
            return Err(err);
        }
        let needle = order_number.to_lowercase();
        Ok(self
            .orders
            .lock()
            .expect("lock")
            .iter()
            .filter(|o| o.order_number.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn create_inbound_booking(
        &self,
        request: &InboundRequest,
    ) -> Result<Booking, RemoteError> {
        self.record("create_inbound_booking".into());
        if let Some(err) = self.create_error.lock().expect("lock").clone() {
            return Err(err);
        }
        Ok(self.confirm(Booking {
            id: String::new(),
            kind: BookingKind::Inbound,
            product_id: request.product_id,
            product_name: self.product_name(request.product_id),
            quantity: request.quantity,
            unit_price: request.unit_price,
            total_price: request.quantity * request.unit_price,
            type_tag: Some(request.erfassungstyp.clone()),
            reference: request.referenz.clone(),
            location: request.location.clone(),
            supplier: request.supplier.clone(),
            batch_number: request.batch_number.clone(),
            expiry_date: request.expiry_date.clone(),
            notes: request.notes.clone(),
            reason: None,
            project_name: None,
            justification: None,
            created_at: fixed_time(),
            origin: BookingOrigin::RemoteConfirmed,
        }))
    }

    async fn create_outbound_booking(
        &self,
        request: &OutboundRequest,
    ) -> Result<Booking, RemoteError> {
        self.record("create_outbound_booking".into());
        if let Some(err) = self.create_error.lock().expect("lock").clone() {
            return Err(err);
        }
        Ok(self.confirm(Booking {
            id: String::new(),
            kind: BookingKind::Outbound,
            product_id: request.product_id,
            product_name: self.product_name(request.product_id),
            quantity: request.quantity,
            unit_price: request.unit_price,
            total_price: request.quantity * request.unit_price,
            type_tag: Some(request.attribut.clone()),
            reference: request.order_number.clone(),
            location: None,
            supplier: None,
            batch_number: None,
            expiry_date: None,
            notes: request.notes.clone(),
            reason: None,
            project_name: request.project_name.clone(),
            justification: request.begruendung.clone(),
            created_at: fixed_time(),
            origin: BookingOrigin::RemoteConfirmed,
        }))
    }

    async fn list_bookings(&self, kind: BookingKind) -> Result<Vec<Booking>, RemoteError> {
        self.record(format!("list_bookings:{}", kind.as_str()));
        self.read_result()?;
        Ok(self
            .bookings
            .lock()
            .expect("lock")
            .iter()
            .filter(|b| b.kind == kind)
            .cloned()
            .collect())
    }

    async fn delete_booking(&self, kind: BookingKind, id: &str) -> Result<(), RemoteError> {
        self.record(format!("delete_booking:{}:{id}", kind.as_str()));
        if let Some(err) = self.delete_error.lock().expect("lock").clone() {
            return Err(err);
        }
        self.bookings.lock().expect("lock").retain(|b| b.id != id);
        Ok(())
    }

    async fn get_justification_templates(&self) -> Result<Vec<JustificationTemplate>, RemoteError> {
        self.record("get_justification_templates".into());
        self.read_result()?;
        Ok(self.templates.lock().expect("lock").clone())
    }

    async fn get_outbound_reasons(&self) -> Result<Vec<OutboundReason>, RemoteError> {
        self.record("get_outbound_reasons".into());
        self.read_result()?;
        Ok(self.reasons.lock().expect("lock").clone())
    }
}

// ---------------------------------------------------------------------------
// Local store with injectable failures
// ---------------------------------------------------------------------------

/// Delegates to an in-memory [`SqliteStore`] unless told to fail.
pub struct FlakyStore {
    pub inner: SqliteStore,
    /// Number of upcoming reads that fail.
    pub failing_reads: AtomicUsize,
    pub fail_writes: AtomicBool,
    pub resets: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteStore::open_in_memory().expect("in-memory store"),
            failing_reads: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            resets: AtomicUsize::new(0),
        })
    }

    fn read_gate(&self) -> Result<(), StoreError> {
        let failing = self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match failing {
            Ok(_) => Err(StoreError::Corrupt("injected read failure".into())),
            Err(_) => Ok(()),
        }
    }

    fn write_gate(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Sqlite("disk I/O error".into()))
        } else {
            Ok(())
        }
    }
}

impl LocalStore for FlakyStore {
    fn products(&self) -> Result<Vec<Product>, StoreError> {
        self.read_gate()?;
        self.inner.products()
    }

    fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.read_gate()?;
        self.inner.product(id)
    }

    fn save_product(&self, product: &Product) -> Result<(), StoreError> {
        self.write_gate()?;
        self.inner.save_product(product)
    }

    fn save_products(&self, products: &[Product]) -> Result<usize, StoreError> {
        self.write_gate()?;
        self.inner.save_products(products)
    }

    fn bookings(&self, kind: Option<BookingKind>) -> Result<Vec<Booking>, StoreError> {
        self.read_gate()?;
        self.inner.bookings(kind)
    }

    fn booking(&self, id: &str) -> Result<Option<Booking>, StoreError> {
        self.read_gate()?;
        self.inner.booking(id)
    }

    fn save_booking(&self, booking: &Booking, local_only: bool) -> Result<(), StoreError> {
        self.write_gate()?;
        self.inner.save_booking(booking, local_only)
    }

    fn save_bookings(&self, bookings: &[Booking]) -> Result<usize, StoreError> {
        self.write_gate()?;
        self.inner.save_bookings(bookings)
    }

    fn commit_booking(&self, booking: &Booking) -> Result<bool, StoreError> {
        self.write_gate()?;
        self.inner.commit_booking(booking)
    }

    fn replace_booking(&self, old_id: &str, replacement: &Booking) -> Result<(), StoreError> {
        self.write_gate()?;
        self.inner.replace_booking(old_id, replacement)
    }

    fn delete_booking(&self, id: &str) -> Result<bool, StoreError> {
        self.write_gate()?;
        self.inner.delete_booking(id)
    }

    fn reset(&self) -> Result<(), StoreError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        self.inner.reset()
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.inner.clear()
    }
}
