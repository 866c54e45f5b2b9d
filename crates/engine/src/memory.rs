//! In-memory store for tests and development.
//!
//! Every operation takes the single mutex for its whole duration, which
//! gives the same all-or-nothing and guard-revalidation semantics the
//! Postgres implementation gets from SQL transactions.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;

use stockroom_core::{BranchCode, SerialNo, WithdrawalId};
use stockroom_inventory::{
    Item, ItemStatus, ItemTransition, Withdrawal, WithdrawalDraft, WithdrawalFilter,
    WithdrawalStatus,
};

use crate::store::{
    CascadeOutcome, Page, ReleaseOutcome, ReserveOutcome, StoreError, WithdrawalStore,
};

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    withdrawals: BTreeMap<WithdrawalId, Withdrawal>,
    items: BTreeMap<SerialNo, Item>,
    links: BTreeSet<(WithdrawalId, SerialNo)>,
}

/// In-memory `WithdrawalStore`.
#[derive(Debug, Default)]
pub struct InMemoryWithdrawalStore {
    inner: Mutex<State>,
}

impl InMemoryWithdrawalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an item into the registry (items are created outside the
    /// withdrawal subsystem).
    pub fn put_item(&self, item: Item) {
        let mut state = self.lock();
        state.items.insert(item.serial_no.clone(), item);
    }

    /// Snapshot of an item, for assertions.
    pub fn item(&self, serial: &SerialNo) -> Option<Item> {
        self.lock().items.get(serial).cloned()
    }

    /// Number of association rows a withdrawal currently has.
    pub fn association_count(&self, id: WithdrawalId) -> usize {
        self.lock().links.iter().filter(|(w, _)| *w == id).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned mutex means a test already panicked; propagating the
        // panic is the honest outcome here.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn materialize(id: WithdrawalId, draft: &WithdrawalDraft) -> Withdrawal {
    Withdrawal {
        id,
        kind: draft.kind,
        status: WithdrawalStatus::Pending,
        for_branch_code: draft.for_branch_code.clone(),
        for_department_code: draft.for_department_code.clone(),
        created_by_staff_code: draft.created_by_staff_code.clone(),
        date: draft.date,
        return_by: draft.return_by,
        install_date: draft.install_date,
        remarks: draft.remarks.clone(),
    }
}

#[async_trait]
impl WithdrawalStore for InMemoryWithdrawalStore {
    async fn insert_withdrawal(
        &self,
        draft: &WithdrawalDraft,
    ) -> Result<WithdrawalId, StoreError> {
        let mut state = self.lock();
        state.next_id += 1;
        let id = WithdrawalId::new(state.next_id);
        let record = materialize(id, draft);
        state.withdrawals.insert(id, record);
        Ok(id)
    }

    async fn fetch_withdrawal(&self, id: WithdrawalId) -> Result<Option<Withdrawal>, StoreError> {
        Ok(self.lock().withdrawals.get(&id).cloned())
    }

    async fn update_header(
        &self,
        id: WithdrawalId,
        draft: &WithdrawalDraft,
    ) -> Result<CascadeOutcome, StoreError> {
        let mut state = self.lock();
        let Some(existing) = state.withdrawals.get_mut(&id) else {
            return Ok(CascadeOutcome::NotFound);
        };
        if existing.status != WithdrawalStatus::Pending {
            return Ok(CascadeOutcome::WrongStatus {
                current: existing.status,
            });
        }
        let remarks = existing.remarks.clone();
        let mut updated = materialize(id, draft);
        // Remarks have their own update path; header edits leave them alone.
        updated.remarks = remarks;
        *existing = updated;
        Ok(CascadeOutcome::Applied)
    }

    async fn update_remarks(
        &self,
        id: WithdrawalId,
        remarks: Option<&str>,
    ) -> Result<CascadeOutcome, StoreError> {
        let mut state = self.lock();
        match state.withdrawals.get_mut(&id) {
            Some(w) => {
                w.remarks = remarks.map(str::to_string);
                Ok(CascadeOutcome::Applied)
            }
            None => Ok(CascadeOutcome::NotFound),
        }
    }

    async fn list_withdrawals(
        &self,
        filter: &WithdrawalFilter,
        page: Page,
    ) -> Result<Vec<Withdrawal>, StoreError> {
        let state = self.lock();
        let rows = state
            .withdrawals
            .values()
            .filter(|w| filter.kind.is_none_or(|k| w.kind == k))
            .filter(|w| filter.status.is_none_or(|s| w.status == s))
            .filter(|w| filter.date_from.is_none_or(|d| w.date >= d))
            .filter(|w| filter.date_to.is_none_or(|d| w.date <= d))
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn fetch_item(&self, serial: &SerialNo) -> Result<Option<Item>, StoreError> {
        Ok(self.lock().items.get(serial).cloned())
    }

    async fn items_of(&self, id: WithdrawalId) -> Result<Vec<Item>, StoreError> {
        let state = self.lock();
        let rows = state
            .links
            .iter()
            .filter(|(w, _)| *w == id)
            .filter_map(|(_, serial)| state.items.get(serial).cloned())
            .collect();
        Ok(rows)
    }

    async fn reserve_and_associate(
        &self,
        id: WithdrawalId,
        serial: &SerialNo,
        eligible_from: &[ItemStatus],
        target: ItemStatus,
        branch: Option<&BranchCode>,
    ) -> Result<ReserveOutcome, StoreError> {
        let mut state = self.lock();
        let Some(item) = state.items.get_mut(serial) else {
            return Ok(ReserveOutcome::NotFound);
        };
        if !eligible_from.contains(&item.status) {
            return Ok(ReserveOutcome::Ineligible {
                current: item.status,
            });
        }
        item.status = target;
        item.reserved_branch_code = branch.cloned();
        state.links.insert((id, serial.clone()));
        Ok(ReserveOutcome::Reserved)
    }

    async fn release_and_dissociate(
        &self,
        id: WithdrawalId,
        serial: &SerialNo,
        revert_to: ItemStatus,
    ) -> Result<ReleaseOutcome, StoreError> {
        let mut state = self.lock();
        if !state.links.remove(&(id, serial.clone())) {
            return Ok(ReleaseOutcome::NotAssociated);
        }
        if let Some(item) = state.items.get_mut(serial) {
            item.status = revert_to;
            item.reserved_branch_code = None;
        }
        Ok(ReleaseOutcome::Released)
    }

    async fn confirm_withdrawal(
        &self,
        id: WithdrawalId,
        transition: Option<ItemTransition>,
    ) -> Result<CascadeOutcome, StoreError> {
        let mut state = self.lock();
        match state.withdrawals.get(&id) {
            None => return Ok(CascadeOutcome::NotFound),
            Some(w) if w.status != WithdrawalStatus::Pending => {
                return Ok(CascadeOutcome::WrongStatus { current: w.status });
            }
            Some(_) => {}
        }

        if let Some(t) = transition {
            let serials: Vec<SerialNo> = state
                .links
                .iter()
                .filter(|(w, _)| *w == id)
                .map(|(_, s)| s.clone())
                .collect();
            for serial in serials {
                if let Some(item) = state.items.get_mut(&serial) {
                    if item.status == t.from {
                        item.status = t.to;
                        item.reserved_branch_code = None;
                    }
                }
            }
        }

        if let Some(w) = state.withdrawals.get_mut(&id) {
            w.status = WithdrawalStatus::Confirmed;
        }
        Ok(CascadeOutcome::Applied)
    }

    async fn cancel_withdrawal(&self, id: WithdrawalId) -> Result<CascadeOutcome, StoreError> {
        let mut state = self.lock();
        match state.withdrawals.get(&id) {
            None => return Ok(CascadeOutcome::NotFound),
            Some(w) if w.status.is_terminal() => {
                return Ok(CascadeOutcome::WrongStatus { current: w.status });
            }
            Some(_) => {}
        }

        let serials: Vec<SerialNo> = state
            .links
            .iter()
            .filter(|(w, _)| *w == id)
            .map(|(_, s)| s.clone())
            .collect();
        for serial in &serials {
            if let Some(item) = state.items.get_mut(serial) {
                item.status = ItemStatus::InStock;
                item.reserved_branch_code = None;
            }
        }
        state.links.retain(|(w, _)| *w != id);

        if let Some(w) = state.withdrawals.get_mut(&id) {
            w.status = WithdrawalStatus::Cancelled;
        }
        Ok(CascadeOutcome::Applied)
    }

    async fn delete_withdrawal(&self, id: WithdrawalId) -> Result<CascadeOutcome, StoreError> {
        let mut state = self.lock();
        match state.withdrawals.get(&id) {
            None => return Ok(CascadeOutcome::NotFound),
            Some(w) if w.status != WithdrawalStatus::Cancelled => {
                return Ok(CascadeOutcome::WrongStatus { current: w.status });
            }
            Some(_) => {}
        }
        state.links.retain(|(w, _)| *w != id);
        state.withdrawals.remove(&id);
        Ok(CascadeOutcome::Applied)
    }
}
