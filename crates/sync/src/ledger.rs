//! Persisted cart ledger.
//!
//! The ledger is the authoritative `(product, quantity)` record. Every
//! mutation is applied and persisted inside one `watch` transition, so
//! subscribers never observe a state that differs from what is stored.
//!
//! Invariant: every line has `quantity >= 1` and there is at most one line per
//! product. Operations that would drop a quantity to zero remove the line.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shop_sync_core::{CartLine, ProductId};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::store::{self, Namespace, StateStore};

/// Snapshot of the ledger's lines, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerState {
    lines: Vec<CartLine>,
}

impl LedgerState {
    /// Lines in the order they were first added.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Quantity of `product_id`, 0 when absent.
    #[must_use]
    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.lines
            .iter()
            .find(|l| l.product_id == product_id)
            .map_or(0, |l| l.quantity)
    }

    /// Sum of all quantities.
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.lines
            .iter()
            .fold(0u32, |acc, l| acc.saturating_add(l.quantity))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    fn position(&self, product_id: ProductId) -> Option<usize> {
        self.lines.iter().position(|l| l.product_id == product_id)
    }

    /// Set the quantity of a product; `0` removes the line.
    fn set(&mut self, product_id: ProductId, quantity: u32) -> bool {
        match (self.position(product_id), quantity) {
            (Some(idx), 0) => {
                self.lines.remove(idx);
                true
            }
            (Some(idx), q) => match self.lines.get_mut(idx) {
                Some(line) if line.quantity != q => {
                    line.quantity = q;
                    true
                }
                _ => false,
            },
            (None, 0) => false,
            (None, q) => {
                self.lines.push(CartLine::new(product_id, q));
                true
            }
        }
    }

    /// Build a state from arbitrary lines, merging duplicates and dropping
    /// non-positive quantities.
    fn from_records(records: impl IntoIterator<Item = PersistedLine>) -> Self {
        let mut state = Self::default();
        for record in records {
            if record.quantity <= 0 {
                continue;
            }
            let product_id = ProductId::new(record.product_id);
            let quantity = state
                .quantity_of(product_id)
                .saturating_add(u32::try_from(record.quantity).unwrap_or(u32::MAX));
            state.set(product_id, quantity);
        }
        state
    }
}

/// Stored form of a cart line.
///
/// Quantities are read as signed integers so that hand-edited or legacy
/// documents with zero or negative values are normalized instead of rejected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedLine {
    product_id: i64,
    quantity: i64,
}

impl From<&CartLine> for PersistedLine {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id.as_i64(),
            quantity: i64::from(line.quantity),
        }
    }
}

// =============================================================================
// CartLedger
// =============================================================================

/// The persisted cart ledger.
///
/// Cheap to clone; clones share state and subscribers.
#[derive(Clone)]
pub struct CartLedger {
    inner: Arc<CartLedgerInner>,
}

struct CartLedgerInner {
    state: watch::Sender<LedgerState>,
    store: Arc<dyn StateStore>,
}

impl CartLedger {
    /// Open the ledger, restoring any lines persisted in `store`.
    #[must_use]
    pub fn open(store: Arc<dyn StateStore>) -> Self {
        let restored = store::load_json::<Vec<PersistedLine>>(store.as_ref(), Namespace::CartLedger)
            .map(LedgerState::from_records)
            .unwrap_or_default();

        if !restored.is_empty() {
            info!(lines = restored.len(), "Restored cart ledger");
        }

        let (state, _) = watch::channel(restored);
        Self {
            inner: Arc::new(CartLedgerInner { state, store }),
        }
    }

    /// Subscribe to ledger changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LedgerState> {
        self.inner.state.subscribe()
    }

    /// Clone of the current state.
    #[must_use]
    pub fn snapshot(&self) -> LedgerState {
        self.inner.state.borrow().clone()
    }

    /// Current lines, in insertion order.
    #[must_use]
    pub fn lines(&self) -> Vec<CartLine> {
        self.inner.state.borrow().lines.clone()
    }

    /// Quantity of `product_id`, 0 when absent.
    #[must_use]
    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.inner.state.borrow().quantity_of(product_id)
    }

    /// Sum of all quantities (cart badge count).
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.inner.state.borrow().total_quantity()
    }

    /// Add one unit, creating the line at quantity 1 if absent.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if the new state could not be persisted;
    /// the ledger is left unchanged.
    pub fn increase(&self, product_id: ProductId) -> Result<()> {
        self.mutate("increase", |state| {
            let quantity = state.quantity_of(product_id).saturating_add(1);
            state.set(product_id, quantity)
        })
    }

    /// Remove one unit; the line disappears when it reaches zero.
    /// No-op if the line is absent.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if the new state could not be persisted.
    pub fn decrease(&self, product_id: ProductId) -> Result<()> {
        self.mutate("decrease", |state| {
            let quantity = state.quantity_of(product_id);
            quantity > 0 && state.set(product_id, quantity - 1)
        })
    }

    /// Set an exact quantity. `quantity <= 0` removes the line.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if the new state could not be persisted.
    pub fn set_quantity(&self, product_id: ProductId, quantity: i64) -> Result<()> {
        let quantity = if quantity <= 0 {
            0
        } else {
            u32::try_from(quantity).unwrap_or(u32::MAX)
        };
        self.mutate("set_quantity", |state| state.set(product_id, quantity))
    }

    /// Delete the line for `product_id`. No-op if absent.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if the new state could not be persisted.
    pub fn remove(&self, product_id: ProductId) -> Result<()> {
        self.mutate("remove", |state| state.set(product_id, 0))
    }

    /// Remove every line.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if the new state could not be persisted.
    pub fn clear(&self) -> Result<()> {
        self.mutate("clear", |state| {
            let changed = !state.lines.is_empty();
            state.lines.clear();
            changed
        })
    }

    /// Replace all lines at once. Duplicates are merged and non-positive
    /// quantities dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if the new state could not be persisted.
    pub fn replace_all(&self, lines: impl IntoIterator<Item = CartLine>) -> Result<()> {
        let next = LedgerState::from_records(lines.into_iter().map(|l| PersistedLine::from(&l)));
        self.mutate("replace_all", |state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        })
    }

    /// Apply `op` to a copy of the state and commit it only once the copy
    /// has been persisted. On a failed write nothing is published.
    fn mutate(&self, op: &'static str, apply: impl FnOnce(&mut LedgerState) -> bool) -> Result<()> {
        let store = self.inner.store.as_ref();
        let mut outcome = Ok(());
        self.inner.state.send_if_modified(|state| {
            let mut next = state.clone();
            if !apply(&mut next) {
                return false;
            }

            let records: Vec<PersistedLine> = next.lines.iter().map(PersistedLine::from).collect();
            if let Err(e) = store::save_json(store, Namespace::CartLedger, &records) {
                warn!(op, error = %e, "Failed to persist cart ledger, change rolled back");
                outcome = Err(SyncError::Store(e));
                return false;
            }

            *state = next;
            debug!(op, lines = state.lines.len(), "Cart ledger updated");
            true
        });
        outcome
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::FlakyStore;

    fn ledger() -> (CartLedger, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (CartLedger::open(store.clone()), store)
    }

    const P101: ProductId = ProductId::new(101);
    const P202: ProductId = ProductId::new(202);

    #[test]
    fn test_increase_twice_makes_one_line() {
        let (ledger, _) = ledger();
        ledger.increase(P101).unwrap();
        ledger.increase(P101).unwrap();

        assert_eq!(ledger.lines(), vec![CartLine::new(P101, 2)]);
    }

    #[test]
    fn test_decrease_to_zero_removes_line() {
        let (ledger, _) = ledger();
        ledger.increase(P101).unwrap();
        ledger.decrease(P101).unwrap();

        assert!(ledger.lines().is_empty());
        assert_eq!(ledger.quantity_of(P101), 0);
    }

    #[test]
    fn test_decrease_absent_is_noop() {
        let (ledger, store) = ledger();
        ledger.decrease(P101).unwrap();

        assert!(ledger.lines().is_empty());
        assert_eq!(store.load(Namespace::CartLedger).unwrap(), None);
    }

    #[test]
    fn test_set_quantity_non_positive_removes() {
        let (ledger, _) = ledger();
        ledger.set_quantity(P101, 5).unwrap();
        assert_eq!(ledger.quantity_of(P101), 5);

        ledger.set_quantity(P101, 0).unwrap();
        assert_eq!(ledger.quantity_of(P101), 0);

        ledger.set_quantity(P202, -3).unwrap();
        assert!(ledger.lines().is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let (ledger, _) = ledger();
        ledger.increase(P101).unwrap();
        ledger.increase(P202).unwrap();
        ledger.remove(P101).unwrap();
        ledger.remove(P101).unwrap();
        assert_eq!(ledger.lines(), vec![CartLine::new(P202, 1)]);

        ledger.clear().unwrap();
        assert!(ledger.lines().is_empty());
        assert_eq!(ledger.total_quantity(), 0);
    }

    #[test]
    fn test_quantities_stay_positive_under_mixed_operations() {
        let (ledger, _) = ledger();
        let ops: [(u8, ProductId); 12] = [
            (0, P101),
            (1, P101),
            (1, P101),
            (0, P202),
            (0, P202),
            (1, P202),
            (2, P101),
            (0, P101),
            (1, P202),
            (1, P202),
            (0, P202),
            (2, P202),
        ];

        for (op, id) in ops {
            match op {
                0 => ledger.increase(id),
                1 => ledger.decrease(id),
                _ => ledger.remove(id),
            }
            .unwrap();
            assert!(ledger.lines().iter().all(|l| l.quantity >= 1));
            let ids: HashSet<_> = ledger.lines().iter().map(|l| l.product_id).collect();
            assert_eq!(ids.len(), ledger.lines().len());
        }

        assert_eq!(ledger.lines(), vec![CartLine::new(P101, 1)]);
    }

    #[test]
    fn test_persistence_roundtrip_is_order_independent() {
        let (ledger, store) = ledger();
        ledger.increase(P202).unwrap();
        ledger.set_quantity(P101, 3).unwrap();

        let reopened = CartLedger::open(store);
        let before: HashSet<CartLine> = ledger.lines().into_iter().collect();
        let after: HashSet<CartLine> = reopened.lines().into_iter().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_persisted_document_layout() {
        let (ledger, store) = ledger();
        ledger.set_quantity(P101, 2).unwrap();

        let raw = store.load(Namespace::CartLedger).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            json["state"],
            serde_json::json!([{ "productId": 101, "quantity": 2 }])
        );
    }

    #[test]
    fn test_restore_normalizes_bad_records() {
        let store = Arc::new(MemoryStore::new());
        let records = vec![
            PersistedLine {
                product_id: 101,
                quantity: 2,
            },
            PersistedLine {
                product_id: 202,
                quantity: 0,
            },
            PersistedLine {
                product_id: 101,
                quantity: 1,
            },
            PersistedLine {
                product_id: 303,
                quantity: -4,
            },
        ];
        store::save_json(store.as_ref(), Namespace::CartLedger, &records).unwrap();

        let ledger = CartLedger::open(store);
        assert_eq!(ledger.lines(), vec![CartLine::new(P101, 3)]);
    }

    #[test]
    fn test_replace_all_merges_duplicates() {
        let (ledger, _) = ledger();
        ledger.replace_all([
            CartLine::new(P101, 1),
            CartLine::new(P202, 2),
            CartLine::new(P101, 4),
        ])
        .unwrap();

        assert_eq!(ledger.quantity_of(P101), 5);
        assert_eq!(ledger.total_quantity(), 7);
    }

    #[tokio::test]
    async fn test_subscribers_see_persisted_state() {
        let (ledger, store) = ledger();
        let mut rx = ledger.subscribe();

        ledger.increase(P101).unwrap();
        rx.changed().await.unwrap();

        let seen = rx.borrow_and_update().clone();
        let reopened = CartLedger::open(store);
        assert_eq!(seen, reopened.snapshot());
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let store = Arc::new(FlakyStore::default());
        let ledger = CartLedger::open(store.clone());
        ledger.increase(P101).unwrap();
        let rx = ledger.subscribe();

        store.fail_saves(true);
        let err = ledger.increase(P202).unwrap_err();
        assert!(matches!(err, SyncError::Store(_)));
        assert!(ledger.clear().is_err());

        assert_eq!(ledger.lines(), vec![CartLine::new(P101, 1)]);
        assert!(!rx.has_changed().unwrap());
        let reopened = CartLedger::open(store.clone());
        assert_eq!(reopened.snapshot(), ledger.snapshot());

        store.fail_saves(false);
        ledger.increase(P202).unwrap();
        assert_eq!(CartLedger::open(store).total_quantity(), 2);
    }

    #[tokio::test]
    async fn test_noop_does_not_notify() {
        let (ledger, _) = ledger();
        let rx = ledger.subscribe();

        ledger.remove(P101).unwrap();
        ledger.decrease(P101).unwrap();
        assert!(!rx.has_changed().unwrap());
    }
}
