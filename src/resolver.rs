//! Resolves the free-text reference of an order-bound booking into one
//! remote order.
//!
//! Every text change bumps a generation counter and cancels the pending
//! debounce task. A search result is applied only if its generation is still
//! current when the draft lock is taken, so stale responses never win.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::RemoteService;
use crate::connectivity::ConnectivityGate;
use crate::draft::{lock_draft, BookingDraft, LookupState, SharedDraft};
use crate::models::OrderReference;

// ---------------------------------------------------------------------------
// Draft transitions
// ---------------------------------------------------------------------------

/// Drop the selected reference and everything derived from it.
fn unresolve(draft: &mut BookingDraft) {
    draft.reference = None;
    if draft.booking_type.is_reference_bound() {
        draft.supplier.clear();
    }
    draft.candidates.clear();
    draft.lookup = LookupState::Idle;
}

/// Apply edited reference text. Returns whether a search should be scheduled.
pub(crate) fn apply_text_change(draft: &mut BookingDraft, text: &str) -> bool {
    draft.reference_text = text.to_string();
    let trimmed = text.trim();

    if trimmed.is_empty() {
        unresolve(draft);
        return false;
    }
    if let Some(selected) = draft.reference.as_ref() {
        if selected.order_number.trim() == trimmed {
            return false;
        }
        unresolve(draft);
    }
    if !draft.booking_type.is_reference_bound() {
        return false;
    }
    draft.candidates.clear();
    draft.lookup = LookupState::Idle;
    true
}

/// Select `order`: its number becomes the text, its supplier (or none)
/// becomes the draft supplier.
pub(crate) fn resolve(draft: &mut BookingDraft, order: OrderReference) {
    draft.reference_text = order.order_number.clone();
    draft.supplier = order.supplier_name().unwrap_or_default().to_string();
    draft.reference = Some(order);
    draft.candidates.clear();
    draft.lookup = LookupState::Resolved;
}

pub(crate) fn apply_search_results(draft: &mut BookingDraft, mut orders: Vec<OrderReference>) {
    match orders.len() {
        0 => {
            draft.candidates.clear();
            draft.lookup = LookupState::Idle;
        }
        1 => {
            let order = orders.remove(0);
            debug!(order_number = %order.order_number, "single match, auto-resolving");
            resolve(draft, order);
        }
        n => {
            debug!(candidates = n, "several matches, awaiting selection");
            draft.candidates = orders;
            draft.lookup = LookupState::Disambiguating;
        }
    }
}

// ---------------------------------------------------------------------------
// Debounced search
// ---------------------------------------------------------------------------

pub struct ReferenceResolver {
    remote: Arc<dyn RemoteService>,
    gate: Arc<ConnectivityGate>,
    draft: SharedDraft,
    debounce: Duration,
    generation: Arc<AtomicU64>,
    pending: Mutex<Option<CancellationToken>>,
}

impl ReferenceResolver {
    pub fn new(
        remote: Arc<dyn RemoteService>,
        gate: Arc<ConnectivityGate>,
        draft: SharedDraft,
        debounce: Duration,
    ) -> Self {
        Self {
            remote,
            gate,
            draft,
            debounce,
            generation: Arc::new(AtomicU64::new(0)),
            pending: Mutex::new(None),
        }
    }

    /// Invalidate in-flight work and return the new generation.
    fn supersede(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(token) = previous {
            token.cancel();
        }
        generation
    }

    /// The reference text changed. Must be called from within a tokio
    /// runtime for the debounced search to be scheduled.
    pub fn on_text_changed(&self, text: &str) {
        let generation = self.supersede();
        let should_search = apply_text_change(&mut lock_draft(&self.draft), text);
        if !should_search {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime, reference search skipped");
            return;
        };

        let token = CancellationToken::new();
        *self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.clone());

        let search = PendingSearch {
            remote: self.remote.clone(),
            gate: self.gate.clone(),
            draft: self.draft.clone(),
            generation: self.generation.clone(),
            issued_at: generation,
            query: text.trim().to_string(),
        };
        let debounce = self.debounce;
        runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(debounce) => search.run().await,
            }
        });
    }

    /// Explicitly select a candidate. Cancels any pending search.
    pub fn resolve(&self, order: OrderReference) {
        self.supersede();
        resolve(&mut lock_draft(&self.draft), order);
    }

    /// Drop all pending work, e.g. when the booking type changes.
    pub fn cancel(&self) {
        self.supersede();
    }
}

impl Drop for ReferenceResolver {
    fn drop(&mut self) {
        self.supersede();
    }
}

struct PendingSearch {
    remote: Arc<dyn RemoteService>,
    gate: Arc<ConnectivityGate>,
    draft: SharedDraft,
    generation: Arc<AtomicU64>,
    issued_at: u64,
    query: String,
}

impl PendingSearch {
    fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.issued_at
    }

    async fn run(self) {
        {
            let mut draft = lock_draft(&self.draft);
            if !self.is_current() {
                return;
            }
            draft.lookup = LookupState::Searching;
        }

        let result = if self.gate.is_remote_available().await {
            self.remote.get_orders(&self.query).await
        } else {
            debug!(query = %self.query, "remote unavailable, no reference candidates");
            Ok(Vec::new())
        };

        let mut draft = lock_draft(&self.draft);
        if !self.is_current() {
            debug!(query = %self.query, "discarding stale reference search result");
            return;
        }
        match result {
            Ok(orders) => apply_search_results(&mut draft, orders),
            Err(e) => {
                warn!(query = %self.query, error = %e, "reference search failed");
                draft.candidates.clear();
                draft.lookup = LookupState::Idle;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::models::BookingType;
    use crate::test_support::{order, FakeRemote};

    const WINDOW: Duration = Duration::from_millis(500);

    struct Fixture {
        remote: Arc<FakeRemote>,
        gate: Arc<ConnectivityGate>,
        draft: SharedDraft,
        resolver: ReferenceResolver,
    }

    fn fixture(booking_type: BookingType) -> Fixture {
        let remote = FakeRemote::new();
        let gate = Arc::new(ConnectivityGate::new(remote.clone(), Duration::from_secs(5)));
        let draft = BookingDraft::new(booking_type, "Lager S03").shared();
        let resolver = ReferenceResolver::new(remote.clone(), gate.clone(), draft.clone(), WINDOW);
        Fixture {
            remote,
            gate,
            draft,
            resolver,
        }
    }

    fn snapshot(draft: &SharedDraft) -> BookingDraft {
        lock_draft(draft).clone()
    }

    /// Let spawned tasks observe the advanced clock.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_match_resolves_after_quiet_period() {
        let fx = fixture(BookingType::InboundOrder);
        fx.remote
            .set_orders(vec![order(1, "PO-2025-001", Some("ACME"))]);

        fx.resolver.on_text_changed("PO-2025-001");
        tokio::time::advance(Duration::from_millis(499)).await;
        settle().await;
        assert_eq!(fx.remote.call_count("get_orders"), 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;

        let draft = snapshot(&fx.draft);
        assert_eq!(draft.lookup_state(), LookupState::Resolved);
        assert_eq!(draft.reference().map(|o| o.id), Some(1));
        assert_eq!(draft.reference_text(), "PO-2025-001");
        assert_eq!(draft.supplier(), "ACME");
        assert!(draft.supplier_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_restarts_the_quiet_period() {
        let fx = fixture(BookingType::InboundOrder);
        fx.remote.set_orders(vec![order(1, "PO-2025-001", None)]);

        fx.resolver.on_text_changed("PO-2025");
        tokio::time::advance(Duration::from_millis(300)).await;
        settle().await;
        fx.resolver.on_text_changed("PO-2025-001");
        tokio::time::advance(Duration::from_millis(300)).await;
        settle().await;
        assert_eq!(fx.remote.call_count("get_orders"), 0);

        tokio::time::advance(Duration::from_millis(200)).await;
        settle().await;
        let searches: Vec<String> = fx
            .remote
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("get_orders"))
            .collect();
        assert_eq!(searches, vec!["get_orders:PO-2025-001".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_multiple_matches_resolve_nothing() {
        let fx = fixture(BookingType::InboundOrder);
        fx.remote.set_orders(vec![
            order(1, "PO-2025-001", Some("ACME")),
            order(2, "PO-2025-002", Some("Würth")),
        ]);

        fx.resolver.on_text_changed("PO-2025");
        tokio::time::advance(WINDOW).await;
        settle().await;

        let draft = snapshot(&fx.draft);
        assert_eq!(draft.lookup_state(), LookupState::Disambiguating);
        assert_eq!(draft.candidates().len(), 2);
        assert!(draft.reference().is_none());
        assert_eq!(draft.supplier(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_matches_leave_nothing_resolved() {
        let fx = fixture(BookingType::InboundOrder);
        fx.resolver.on_text_changed("PO-9999");
        tokio::time::advance(WINDOW).await;
        settle().await;

        let draft = snapshot(&fx.draft);
        assert_eq!(draft.lookup_state(), LookupState::Idle);
        assert!(draft.candidates().is_empty());
        assert!(draft.reference().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_is_suppressed() {
        let fx = fixture(BookingType::InboundProject);
        fx.resolver.on_text_changed("PO-2025-001");
        tokio::time::advance(WINDOW * 2).await;
        settle().await;
        assert_eq!(fx.remote.call_count("get_orders"), 0);

        let fx = fixture(BookingType::InboundOrder);
        fx.resolver.on_text_changed("   ");
        tokio::time::advance(WINDOW * 2).await;
        settle().await;
        assert_eq!(fx.remote.call_count("get_orders"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_remote_yields_no_candidates() {
        let fx = fixture(BookingType::InboundOrder);
        fx.remote.set_orders(vec![order(1, "PO-1", None)]);
        fx.gate.set_network_reachable(false);

        fx.resolver.on_text_changed("PO-1");
        tokio::time::advance(WINDOW).await;
        settle().await;

        assert_eq!(fx.remote.call_count("get_orders"), 0);
        let draft = snapshot(&fx.draft);
        assert!(draft.reference().is_none());
        assert_eq!(draft.lookup_state(), LookupState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_error_clears_candidates() {
        let fx = fixture(BookingType::InboundOrder);
        *fx.remote.orders_error.lock().expect("lock") =
            Some(RemoteError::Transport("offline".into()));

        fx.resolver.on_text_changed("PO-1");
        tokio::time::advance(WINDOW).await;
        settle().await;

        let draft = snapshot(&fx.draft);
        assert!(draft.candidates().is_empty());
        assert_eq!(draft.lookup_state(), LookupState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_result_is_discarded() {
        let fx = fixture(BookingType::InboundOrder);
        fx.remote.set_orders(vec![order(1, "PO-2025-001", Some("ACME"))]);
        *fx.remote.order_delay.lock().expect("lock") = Duration::from_secs(2);

        fx.resolver.on_text_changed("PO-2025-001");
        tokio::time::advance(WINDOW).await;
        settle().await;
        assert_eq!(snapshot(&fx.draft).lookup_state(), LookupState::Searching);

        // The user keeps typing while the first search is in flight.
        fx.resolver.on_text_changed("PO-2025-0011");
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;

        let draft = snapshot(&fx.draft);
        assert!(draft.reference().is_none());
        assert_eq!(draft.reference_text(), "PO-2025-0011");
    }

    #[test]
    fn test_resolve_is_idempotent_and_searches_nothing() {
        let remote = FakeRemote::new();
        let gate = Arc::new(ConnectivityGate::new(remote.clone(), Duration::from_secs(5)));
        let draft = BookingDraft::new(BookingType::InboundOrder, "Lager S03").shared();
        let resolver = ReferenceResolver::new(remote.clone(), gate, draft.clone(), WINDOW);

        let po = order(3, "PO-3", Some("ACME"));
        resolver.resolve(po.clone());
        let first = snapshot(&draft);
        resolver.resolve(po);
        let second = snapshot(&draft);

        assert_eq!(first, second);
        assert_eq!(second.lookup_state(), LookupState::Resolved);
        assert!(remote.calls().is_empty());
    }

    #[test]
    fn test_editing_or_clearing_text_unresolves() {
        let mut draft = BookingDraft::new(BookingType::InboundOrder, "Lager S03");
        resolve(&mut draft, order(1, "PO-2025-001", Some("ACME")));

        // Echo of the selected number keeps the selection.
        assert!(!apply_text_change(&mut draft, "PO-2025-001 "));
        assert!(draft.reference().is_some());

        assert!(apply_text_change(&mut draft, "PO-2025-00"));
        assert!(draft.reference().is_none());
        assert_eq!(draft.supplier(), "");

        resolve(&mut draft, order(1, "PO-2025-001", Some("ACME")));
        assert!(!apply_text_change(&mut draft, ""));
        assert!(draft.reference().is_none());
        assert_eq!(draft.reference_text(), "");
        assert_eq!(draft.supplier(), "");
        assert!(draft.candidates().is_empty());
    }

    #[test]
    fn test_resolving_order_without_supplier_clears_supplier() {
        let mut draft = BookingDraft::new(BookingType::InboundOrder, "Lager S03");
        draft.supplier = "Hilti".into();
        resolve(&mut draft, order(2, "PO-2", None));
        assert_eq!(draft.supplier(), "");
        assert!(!draft.supplier_locked());
    }

    #[test]
    fn test_text_change_without_runtime_does_not_panic() {
        let remote = FakeRemote::new();
        let gate = Arc::new(ConnectivityGate::new(remote.clone(), Duration::from_secs(5)));
        let draft = BookingDraft::new(BookingType::InboundOrder, "Lager S03").shared();
        let resolver = ReferenceResolver::new(remote, gate, draft.clone(), WINDOW);
        resolver.on_text_changed("PO-1");
        assert_eq!(snapshot(&draft).reference_text(), "PO-1");
    }
}
