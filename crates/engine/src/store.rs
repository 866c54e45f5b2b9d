//! Persistence port of the transition engine.
//!
//! The engine never opens transactions itself; instead the port exposes the
//! multi-row mutations it needs as single atomic operations, and each
//! implementation supplies the atomicity (a SQL transaction in Postgres, one
//! mutex in memory). Status preconditions are re-validated *inside* those
//! operations, so a concurrent confirm and cancel of the same withdrawal can
//! never both succeed, and per-serial reservation is one compare-and-set so
//! two callers cannot both reserve a serial.

use async_trait::async_trait;
use thiserror::Error;

use stockroom_core::{BranchCode, EngineError, SerialNo, WithdrawalId};
use stockroom_inventory::{
    Item, ItemStatus, ItemTransition, Withdrawal, WithdrawalDraft, WithdrawalFilter,
    WithdrawalStatus,
};

/// Store-level failure. Carries no business meaning; the engine maps it to
/// `EngineError::Persistence` (or `NotDeletable` for the delete cascade).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Concurrent writers collided (e.g. unique constraint violation).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A referential or check constraint rejected the mutation.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// Anything else the backend reported.
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::Persistence(err.to_string())
    }
}

/// Outcome of the per-serial reserve compare-and-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Item updated and association row created, atomically.
    Reserved,
    /// No item carries this serial number.
    NotFound,
    /// The item exists but was not in an eligible state.
    Ineligible { current: ItemStatus },
}

/// Outcome of the per-serial release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Item reverted to stock and association row removed, atomically.
    Released,
    /// The serial is not associated with this withdrawal; nothing changed.
    NotAssociated,
}

/// Outcome of a guarded header mutation or cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeOutcome {
    Applied,
    /// No withdrawal with this id.
    NotFound,
    /// The withdrawal exists but its status failed the guard; nothing
    /// changed. Carries the status observed inside the transaction.
    WrongStatus { current: WithdrawalStatus },
}

/// Limit/offset window for list queries.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

/// Persistence collaborator of the transition engine.
#[async_trait]
pub trait WithdrawalStore: Send + Sync {
    /// Insert a new PENDING withdrawal, returning its id.
    async fn insert_withdrawal(&self, draft: &WithdrawalDraft)
        -> Result<WithdrawalId, StoreError>;

    /// Point lookup by id.
    async fn fetch_withdrawal(&self, id: WithdrawalId) -> Result<Option<Withdrawal>, StoreError>;

    /// Update the header of a PENDING withdrawal (status is untouched).
    /// The PENDING guard is evaluated inside the mutation.
    async fn update_header(
        &self,
        id: WithdrawalId,
        draft: &WithdrawalDraft,
    ) -> Result<CascadeOutcome, StoreError>;

    /// Update remarks regardless of status.
    async fn update_remarks(
        &self,
        id: WithdrawalId,
        remarks: Option<&str>,
    ) -> Result<CascadeOutcome, StoreError>;

    /// Filtered, paginated listing.
    async fn list_withdrawals(
        &self,
        filter: &WithdrawalFilter,
        page: Page,
    ) -> Result<Vec<Withdrawal>, StoreError>;

    /// Point lookup of an item by serial number.
    async fn fetch_item(&self, serial: &SerialNo) -> Result<Option<Item>, StoreError>;

    /// Items currently associated with a withdrawal, ordered by serial.
    async fn items_of(&self, id: WithdrawalId) -> Result<Vec<Item>, StoreError>;

    /// Atomically move an item from one of `eligible_from` to `target`
    /// (annotating `branch`) and insert the association row. Either both
    /// happen or neither does: a failed association insert must roll the
    /// item update back.
    async fn reserve_and_associate(
        &self,
        id: WithdrawalId,
        serial: &SerialNo,
        eligible_from: &[ItemStatus],
        target: ItemStatus,
        branch: Option<&BranchCode>,
    ) -> Result<ReserveOutcome, StoreError>;

    /// Atomically revert an associated item to `revert_to` (branch cleared)
    /// and delete its association row. The revert applies whatever reserved
    /// state the item is in, as long as the association row exists.
    async fn release_and_dissociate(
        &self,
        id: WithdrawalId,
        serial: &SerialNo,
        revert_to: ItemStatus,
    ) -> Result<ReleaseOutcome, StoreError>;

    /// Confirm cascade, one atomic unit: re-check the withdrawal is PENDING,
    /// apply `transition` to every associated item that is in
    /// `transition.from` (clearing its branch annotation), set the
    /// withdrawal CONFIRMED.
    async fn confirm_withdrawal(
        &self,
        id: WithdrawalId,
        transition: Option<ItemTransition>,
    ) -> Result<CascadeOutcome, StoreError>;

    /// Cancel cascade, one atomic unit: re-check the withdrawal is not
    /// terminal, revert every associated item to IN_STOCK with the branch
    /// annotation cleared, delete every association row, set the withdrawal
    /// CANCELLED.
    async fn cancel_withdrawal(&self, id: WithdrawalId) -> Result<CascadeOutcome, StoreError>;

    /// Delete cascade, one atomic unit: re-check the withdrawal is
    /// CANCELLED, delete its association rows, delete the header. A failed
    /// header delete rolls the association deletes back.
    async fn delete_withdrawal(&self, id: WithdrawalId) -> Result<CascadeOutcome, StoreError>;
}

#[async_trait]
impl<S> WithdrawalStore for std::sync::Arc<S>
where
    S: WithdrawalStore + ?Sized,
{
    async fn insert_withdrawal(
        &self,
        draft: &WithdrawalDraft,
    ) -> Result<WithdrawalId, StoreError> {
        (**self).insert_withdrawal(draft).await
    }

    async fn fetch_withdrawal(&self, id: WithdrawalId) -> Result<Option<Withdrawal>, StoreError> {
        (**self).fetch_withdrawal(id).await
    }

    async fn update_header(
        &self,
        id: WithdrawalId,
        draft: &WithdrawalDraft,
    ) -> Result<CascadeOutcome, StoreError> {
        (**self).update_header(id, draft).await
    }

    async fn update_remarks(
        &self,
        id: WithdrawalId,
        remarks: Option<&str>,
    ) -> Result<CascadeOutcome, StoreError> {
        (**self).update_remarks(id, remarks).await
    }

    async fn list_withdrawals(
        &self,
        filter: &WithdrawalFilter,
        page: Page,
    ) -> Result<Vec<Withdrawal>, StoreError> {
        (**self).list_withdrawals(filter, page).await
    }

    async fn fetch_item(&self, serial: &SerialNo) -> Result<Option<Item>, StoreError> {
        (**self).fetch_item(serial).await
    }

    async fn items_of(&self, id: WithdrawalId) -> Result<Vec<Item>, StoreError> {
        (**self).items_of(id).await
    }

    async fn reserve_and_associate(
        &self,
        id: WithdrawalId,
        serial: &SerialNo,
        eligible_from: &[ItemStatus],
        target: ItemStatus,
        branch: Option<&BranchCode>,
    ) -> Result<ReserveOutcome, StoreError> {
        (**self)
            .reserve_and_associate(id, serial, eligible_from, target, branch)
            .await
    }

    async fn release_and_dissociate(
        &self,
        id: WithdrawalId,
        serial: &SerialNo,
        revert_to: ItemStatus,
    ) -> Result<ReleaseOutcome, StoreError> {
        (**self).release_and_dissociate(id, serial, revert_to).await
    }

    async fn confirm_withdrawal(
        &self,
        id: WithdrawalId,
        transition: Option<ItemTransition>,
    ) -> Result<CascadeOutcome, StoreError> {
        (**self).confirm_withdrawal(id, transition).await
    }

    async fn cancel_withdrawal(&self, id: WithdrawalId) -> Result<CascadeOutcome, StoreError> {
        (**self).cancel_withdrawal(id).await
    }

    async fn delete_withdrawal(&self, id: WithdrawalId) -> Result<CascadeOutcome, StoreError> {
        (**self).delete_withdrawal(id).await
    }
}
