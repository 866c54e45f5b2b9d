//! The transition engine service.
//!
//! One instance per process, owning nothing but the store handle it is
//! given (no global state). All status rules live here and in the domain
//! crate; the store only supplies atomicity.

use tracing::instrument;

use stockroom_core::{BatchOutcome, EngineError, EngineResult, SerialNo, WithdrawalId};
use stockroom_inventory::{
    policy_for, return_policy, Item, RejectReason, ReserveContext, Withdrawal, WithdrawalDraft,
    WithdrawalFilter, WithdrawalStatus,
};

use crate::store::{
    CascadeOutcome, Page, ReleaseOutcome, ReserveOutcome, WithdrawalStore,
};

/// Outcome of an item add/remove call: updated serials in input order plus
/// per-serial rejections.
pub type ItemBatch = BatchOutcome<SerialNo, RejectReason>;

/// Coordinates withdrawal status transitions and the matching item
/// cascades over a [`WithdrawalStore`].
pub struct TransitionEngine<S> {
    store: S,
}

impl<S: WithdrawalStore> TransitionEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Validate, normalize and persist a new PENDING withdrawal.
    #[instrument(skip(self, draft), fields(kind = %draft.kind))]
    pub async fn create(&self, draft: &WithdrawalDraft) -> EngineResult<WithdrawalId> {
        draft.validate()?;
        let id = self.store.insert_withdrawal(&draft.normalized()).await?;
        tracing::info!(%id, "withdrawal created");
        Ok(id)
    }

    /// Replace the header of a PENDING withdrawal. Status and remarks are
    /// never touched through this path.
    #[instrument(skip(self, draft), fields(%id))]
    pub async fn update_header(
        &self,
        id: WithdrawalId,
        draft: &WithdrawalDraft,
    ) -> EngineResult<()> {
        draft.validate()?;
        let outcome = self.store.update_header(id, &draft.normalized()).await?;
        require_applied(outcome, WithdrawalStatus::Pending)
    }

    /// Update remarks; allowed regardless of status.
    #[instrument(skip(self, remarks), fields(%id))]
    pub async fn update_remarks(&self, id: WithdrawalId, remarks: Option<&str>) -> EngineResult<()> {
        match self.store.update_remarks(id, remarks).await? {
            CascadeOutcome::Applied | CascadeOutcome::WrongStatus { .. } => Ok(()),
            CascadeOutcome::NotFound => Err(EngineError::NotFound),
        }
    }

    /// Point lookup.
    pub async fn find(&self, id: WithdrawalId) -> EngineResult<Withdrawal> {
        self.store
            .fetch_withdrawal(id)
            .await?
            .ok_or(EngineError::NotFound)
    }

    /// Items currently associated with a withdrawal.
    pub async fn items(&self, id: WithdrawalId) -> EngineResult<Vec<Item>> {
        self.find(id).await?;
        Ok(self.store.items_of(id).await?)
    }

    /// Filtered, paginated listing.
    pub async fn list(
        &self,
        filter: &WithdrawalFilter,
        page: Page,
    ) -> EngineResult<Vec<Withdrawal>> {
        Ok(self.store.list_withdrawals(filter, page).await?)
    }

    /// Move a withdrawal to CONFIRMED or CANCELLED, cascading to its items.
    ///
    /// PENDING is never a valid target. The status precondition is checked
    /// here for a clean error, and re-validated inside the store's
    /// transaction so concurrent callers cannot both win.
    #[instrument(skip(self), fields(%id, target = %target))]
    pub async fn change_status(
        &self,
        id: WithdrawalId,
        target: WithdrawalStatus,
    ) -> EngineResult<()> {
        if target == WithdrawalStatus::Pending {
            return Err(EngineError::validation("cannot change status to PENDING"));
        }

        let withdrawal = self.find(id).await?;
        if !withdrawal.status.can_become(target) {
            return Err(EngineError::precondition(format!(
                "withdrawal {id} is {} and cannot become {target}",
                withdrawal.status
            )));
        }

        let outcome = match target {
            WithdrawalStatus::Confirmed => {
                let policy = policy_for(withdrawal.kind);
                self.store
                    .confirm_withdrawal(id, policy.confirm_transition())
                    .await?
            }
            WithdrawalStatus::Cancelled => self.store.cancel_withdrawal(id).await?,
            WithdrawalStatus::Pending => unreachable!("rejected above"),
        };

        require_applied(outcome, WithdrawalStatus::Pending)?;
        tracing::info!(%id, %target, "withdrawal status changed");
        Ok(())
    }

    /// Reserve items into a PENDING withdrawal.
    ///
    /// Dispatches to the reservation policy of the withdrawal's kind; each
    /// serial is reserved and associated in one atomic store operation.
    /// Ineligible serials are reported per-serial without aborting the rest.
    #[instrument(skip(self, serials), fields(%id, count = serials.len()))]
    pub async fn add_items(&self, id: WithdrawalId, serials: &[SerialNo]) -> EngineResult<ItemBatch> {
        let withdrawal = self.find(id).await?;
        require_pending(&withdrawal)?;

        let policy = policy_for(withdrawal.kind);
        let ctx = ReserveContext {
            destination: withdrawal.for_branch_code.as_ref(),
        };
        let target = policy.reserved_status();
        let branch = policy.reserved_branch(ctx);

        let mut batch = ItemBatch::new();
        for serial in serials {
            let result = self
                .store
                .reserve_and_associate(id, serial, policy.eligible_from(), target, branch)
                .await;
            match result {
                Ok(ReserveOutcome::Reserved) => batch.record_updated(serial.clone()),
                Ok(ReserveOutcome::NotFound) => {
                    batch.record_rejected(serial.clone(), RejectReason::NotFound)
                }
                Ok(ReserveOutcome::Ineligible { current }) => {
                    batch.record_rejected(serial.clone(), RejectReason::for_ineligible(current))
                }
                // A store failure on one serial leaves that serial fully
                // untouched (reserve + associate are one unit); siblings
                // still proceed.
                Err(e) => batch.record_rejected(serial.clone(), RejectReason::Store(e.to_string())),
            }
        }

        tracing::info!(
            %id,
            updated = batch.updated.len(),
            rejected = batch.rejected.len(),
            "items added"
        );
        Ok(batch)
    }

    /// Return items from a PENDING withdrawal back to stock.
    #[instrument(skip(self, serials), fields(%id, count = serials.len()))]
    pub async fn remove_items(
        &self,
        id: WithdrawalId,
        serials: &[SerialNo],
    ) -> EngineResult<ItemBatch> {
        let withdrawal = self.find(id).await?;
        require_pending(&withdrawal)?;

        // The return policy is kind-independent; the store reverts the item
        // and drops the association in one unit.
        let revert_to = return_policy().reserved_status();

        let mut batch = ItemBatch::new();
        for serial in serials {
            match self.store.release_and_dissociate(id, serial, revert_to).await {
                Ok(ReleaseOutcome::Released) => batch.record_updated(serial.clone()),
                Ok(ReleaseOutcome::NotAssociated) => {
                    batch.record_rejected(serial.clone(), RejectReason::NotAssociated)
                }
                Err(e) => batch.record_rejected(serial.clone(), RejectReason::Store(e.to_string())),
            }
        }

        tracing::info!(
            %id,
            updated = batch.updated.len(),
            rejected = batch.rejected.len(),
            "items removed"
        );
        Ok(batch)
    }

    /// Delete a CANCELLED withdrawal together with its association rows.
    #[instrument(skip(self), fields(%id))]
    pub async fn delete(&self, id: WithdrawalId) -> EngineResult<()> {
        let withdrawal = self.find(id).await?;
        if withdrawal.status != WithdrawalStatus::Cancelled {
            return Err(EngineError::precondition(format!(
                "withdrawal {id} must be CANCELLED to be deleted, currently {}",
                withdrawal.status
            )));
        }

        match self.store.delete_withdrawal(id).await {
            Ok(outcome) => {
                require_applied(outcome, WithdrawalStatus::Cancelled)?;
                tracing::info!(%id, "withdrawal deleted");
                Ok(())
            }
            Err(e) => Err(EngineError::not_deletable(e.to_string())),
        }
    }
}

fn require_pending(withdrawal: &Withdrawal) -> EngineResult<()> {
    if withdrawal.status != WithdrawalStatus::Pending {
        return Err(EngineError::precondition(format!(
            "withdrawal {} must be PENDING, currently {}",
            withdrawal.id, withdrawal.status
        )));
    }
    Ok(())
}

fn require_applied(outcome: CascadeOutcome, required: WithdrawalStatus) -> EngineResult<()> {
    match outcome {
        CascadeOutcome::Applied => Ok(()),
        CascadeOutcome::NotFound => Err(EngineError::NotFound),
        CascadeOutcome::WrongStatus { current } => Err(EngineError::precondition(format!(
            "withdrawal must be {required}, currently {current}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use stockroom_core::{BranchCode, DepartmentCode, StaffCode};
    use stockroom_inventory::{Item, ItemStatus, WithdrawalKind};

    use crate::memory::InMemoryWithdrawalStore;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn serial(s: &str) -> SerialNo {
        SerialNo::new(s)
    }

    fn installation_draft(branch: &str) -> WithdrawalDraft {
        WithdrawalDraft {
            kind: WithdrawalKind::Installation,
            for_branch_code: Some(BranchCode::new(branch)),
            for_department_code: None,
            created_by_staff_code: StaffCode::new("ST-100"),
            date: date("2026-03-02"),
            return_by: None,
            install_date: Some(date("2026-03-09")),
            remarks: None,
        }
    }

    fn lending_draft() -> WithdrawalDraft {
        WithdrawalDraft {
            kind: WithdrawalKind::Lending,
            for_branch_code: Some(BranchCode::new("BR-02")),
            for_department_code: None,
            created_by_staff_code: StaffCode::new("ST-100"),
            date: date("2026-03-02"),
            return_by: Some(date("2026-04-30")),
            install_date: None,
            remarks: None,
        }
    }

    fn transfer_draft() -> WithdrawalDraft {
        WithdrawalDraft {
            kind: WithdrawalKind::Transfer,
            for_branch_code: None,
            for_department_code: Some(DepartmentCode::new("DPT-7")),
            created_by_staff_code: StaffCode::new("ST-100"),
            date: date("2026-03-02"),
            return_by: None,
            install_date: None,
            remarks: None,
        }
    }

    fn engine_with_items(
        serials: &[&str],
    ) -> TransitionEngine<std::sync::Arc<InMemoryWithdrawalStore>> {
        let store = std::sync::Arc::new(InMemoryWithdrawalStore::new());
        for s in serials {
            store.put_item(Item::in_stock(*s));
        }
        TransitionEngine::new(store)
    }

    fn store_of<'a>(
        engine: &'a TransitionEngine<std::sync::Arc<InMemoryWithdrawalStore>>,
    ) -> &'a InMemoryWithdrawalStore {
        &engine.store
    }

    #[tokio::test]
    async fn create_rejects_invalid_drafts_without_touching_the_store() {
        let engine = engine_with_items(&[]);
        let mut draft = installation_draft("BR-01");
        draft.install_date = None;

        let err = engine.create(&draft).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn create_normalizes_kind_inappropriate_fields() {
        let engine = engine_with_items(&[]);
        let mut draft = installation_draft("BR-01");
        draft.for_department_code = Some(DepartmentCode::new("DPT-9"));
        draft.return_by = Some(date("2026-06-01"));

        let id = engine.create(&draft).await.unwrap();
        let stored = engine.find(id).await.unwrap();
        assert_eq!(stored.status, WithdrawalStatus::Pending);
        assert!(stored.for_department_code.is_none());
        assert!(stored.return_by.is_none());
        assert_eq!(stored.for_branch_code, Some(BranchCode::new("BR-01")));
    }

    #[tokio::test]
    async fn add_items_reserves_eligible_and_rejects_ineligible_per_serial() {
        // S1 is IN_STOCK, S2 is already reserved elsewhere.
        let engine = engine_with_items(&["S1"]);
        store_of(&engine).put_item(Item {
            serial_no: serial("S2"),
            status: ItemStatus::Reserved,
            reserved_branch_code: Some(BranchCode::new("BR-09")),
        });

        let id = engine.create(&installation_draft("BR-01")).await.unwrap();
        let batch = engine
            .add_items(id, &[serial("S1"), serial("S2")])
            .await
            .unwrap();

        assert_eq!(batch.updated, vec![serial("S1")]);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].subject, serial("S2"));
        assert_eq!(
            batch.rejected[0].reason,
            RejectReason::AlreadyReserved(ItemStatus::Reserved)
        );

        // Association rows exist exactly for the serials reported updated.
        assert_eq!(store_of(&engine).association_count(id), 1);

        let s1 = store_of(&engine).item(&serial("S1")).unwrap();
        assert_eq!(s1.status, ItemStatus::Reserved);
        assert_eq!(s1.reserved_branch_code, Some(BranchCode::new("BR-01")));

        // S2 untouched.
        let s2 = store_of(&engine).item(&serial("S2")).unwrap();
        assert_eq!(s2.reserved_branch_code, Some(BranchCode::new("BR-09")));
    }

    #[tokio::test]
    async fn add_items_rejects_broken_and_unknown_serials() {
        let engine = engine_with_items(&[]);
        store_of(&engine).put_item(Item {
            serial_no: serial("S3"),
            status: ItemStatus::Broken,
            reserved_branch_code: None,
        });

        let id = engine.create(&installation_draft("BR-01")).await.unwrap();
        let batch = engine
            .add_items(id, &[serial("S3"), serial("GHOST")])
            .await
            .unwrap();

        assert!(batch.updated.is_empty());
        assert_eq!(batch.rejected[0].reason, RejectReason::Broken);
        assert_eq!(batch.rejected[1].reason, RejectReason::NotFound);
        assert_eq!(store_of(&engine).association_count(id), 0);
    }

    #[tokio::test]
    async fn add_items_requires_pending() {
        let engine = engine_with_items(&["S1"]);
        let id = engine.create(&installation_draft("BR-01")).await.unwrap();
        engine
            .change_status(id, WithdrawalStatus::Cancelled)
            .await
            .unwrap();

        let err = engine.add_items(id, &[serial("S1")]).await.unwrap_err();
        assert!(matches!(err, EngineError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn lending_reservation_records_no_branch() {
        let engine = engine_with_items(&["S1"]);
        let id = engine.create(&lending_draft()).await.unwrap();
        engine.add_items(id, &[serial("S1")]).await.unwrap();

        let s1 = store_of(&engine).item(&serial("S1")).unwrap();
        assert_eq!(s1.status, ItemStatus::Reserved);
        assert_eq!(s1.reserved_branch_code, None);
    }

    #[tokio::test]
    async fn transfer_reserves_straight_to_transferred() {
        let engine = engine_with_items(&["S1"]);
        let id = engine.create(&transfer_draft()).await.unwrap();
        engine.add_items(id, &[serial("S1")]).await.unwrap();

        let s1 = store_of(&engine).item(&serial("S1")).unwrap();
        assert_eq!(s1.status, ItemStatus::Transferred);

        // Confirming a transfer changes nothing further about the item.
        engine
            .change_status(id, WithdrawalStatus::Confirmed)
            .await
            .unwrap();
        let s1 = store_of(&engine).item(&serial("S1")).unwrap();
        assert_eq!(s1.status, ItemStatus::Transferred);
    }

    #[tokio::test]
    async fn remove_items_returns_to_stock_and_drops_association() {
        let engine = engine_with_items(&["S1", "S2"]);
        let id = engine.create(&installation_draft("BR-01")).await.unwrap();
        engine
            .add_items(id, &[serial("S1"), serial("S2")])
            .await
            .unwrap();

        let batch = engine
            .remove_items(id, &[serial("S1"), serial("S9")])
            .await
            .unwrap();
        assert_eq!(batch.updated, vec![serial("S1")]);
        assert_eq!(batch.rejected[0].reason, RejectReason::NotAssociated);

        let s1 = store_of(&engine).item(&serial("S1")).unwrap();
        assert_eq!(s1.status, ItemStatus::InStock);
        assert_eq!(s1.reserved_branch_code, None);
        assert_eq!(store_of(&engine).association_count(id), 1);
    }

    #[tokio::test]
    async fn change_status_to_pending_is_always_a_validation_error() {
        let engine = engine_with_items(&[]);
        let id = engine.create(&installation_draft("BR-01")).await.unwrap();

        let err = engine
            .change_status(id, WithdrawalStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        engine
            .change_status(id, WithdrawalStatus::Confirmed)
            .await
            .unwrap();
        let err = engine
            .change_status(id, WithdrawalStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn confirm_moves_all_items_to_their_operational_state() {
        let engine = engine_with_items(&["S1", "S2", "S3"]);
        let id = engine.create(&installation_draft("BR-01")).await.unwrap();
        engine
            .add_items(id, &[serial("S1"), serial("S2"), serial("S3")])
            .await
            .unwrap();

        engine
            .change_status(id, WithdrawalStatus::Confirmed)
            .await
            .unwrap();

        let withdrawal = engine.find(id).await.unwrap();
        assert_eq!(withdrawal.status, WithdrawalStatus::Confirmed);
        for s in ["S1", "S2", "S3"] {
            let item = store_of(&engine).item(&serial(s)).unwrap();
            assert_eq!(item.status, ItemStatus::Installed);
            // An installed item no longer carries its reservation branch.
            assert_eq!(item.reserved_branch_code, None);
        }
        // Confirmation removes no associations.
        assert_eq!(store_of(&engine).association_count(id), 3);
    }

    #[tokio::test]
    async fn confirm_of_lending_marks_items_lent() {
        let engine = engine_with_items(&["S1"]);
        let id = engine.create(&lending_draft()).await.unwrap();
        engine.add_items(id, &[serial("S1")]).await.unwrap();

        engine
            .change_status(id, WithdrawalStatus::Confirmed)
            .await
            .unwrap();
        let s1 = store_of(&engine).item(&serial("S1")).unwrap();
        assert_eq!(s1.status, ItemStatus::Lent);
    }

    #[tokio::test]
    async fn cancel_reverts_all_items_and_purges_associations() {
        let engine = engine_with_items(&["S1", "S2"]);
        let id = engine.create(&installation_draft("BR-01")).await.unwrap();
        engine
            .add_items(id, &[serial("S1"), serial("S2")])
            .await
            .unwrap();

        engine
            .change_status(id, WithdrawalStatus::Cancelled)
            .await
            .unwrap();

        let withdrawal = engine.find(id).await.unwrap();
        assert_eq!(withdrawal.status, WithdrawalStatus::Cancelled);
        assert_eq!(store_of(&engine).association_count(id), 0);
        for s in ["S1", "S2"] {
            let item = store_of(&engine).item(&serial(s)).unwrap();
            assert_eq!(item.status, ItemStatus::InStock);
            assert_eq!(item.reserved_branch_code, None);
        }
    }

    #[tokio::test]
    async fn concurrent_confirm_and_cancel_have_exactly_one_winner() {
        let engine = engine_with_items(&["S1"]);
        let id = engine.create(&installation_draft("BR-01")).await.unwrap();
        engine.add_items(id, &[serial("S1")]).await.unwrap();

        let (confirm, cancel) = tokio::join!(
            engine.change_status(id, WithdrawalStatus::Confirmed),
            engine.change_status(id, WithdrawalStatus::Cancelled),
        );
        let confirmed = confirm.is_ok();
        assert_ne!(confirmed, cancel.is_ok(), "exactly one transition may win");
        let loser = if confirmed { cancel } else { confirm };
        assert!(matches!(
            loser.unwrap_err(),
            EngineError::PreconditionFailed(_)
        ));

        // Item and withdrawal state reflect the winner only.
        let w = engine.find(id).await.unwrap();
        let s1 = store_of(&engine).item(&serial("S1")).unwrap();
        if confirmed {
            assert_eq!(w.status, WithdrawalStatus::Confirmed);
            assert_eq!(s1.status, ItemStatus::Installed);
        } else {
            assert_eq!(w.status, WithdrawalStatus::Cancelled);
            assert_eq!(s1.status, ItemStatus::InStock);
        }
        assert_eq!(s1.reserved_branch_code, None);
    }

    #[tokio::test]
    async fn terminal_statuses_reject_further_transitions() {
        let engine = engine_with_items(&["S1"]);
        let id = engine.create(&installation_draft("BR-01")).await.unwrap();
        engine.add_items(id, &[serial("S1")]).await.unwrap();
        engine
            .change_status(id, WithdrawalStatus::Confirmed)
            .await
            .unwrap();

        // Confirmed → Cancelled must fail and leave item state unchanged.
        let err = engine
            .change_status(id, WithdrawalStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PreconditionFailed(_)));
        let s1 = store_of(&engine).item(&serial("S1")).unwrap();
        assert_eq!(s1.status, ItemStatus::Installed);

        // Confirmed → Confirmed fails too.
        let err = engine
            .change_status(id, WithdrawalStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn delete_requires_cancelled_and_leaves_no_orphans() {
        let engine = engine_with_items(&["S1"]);
        let id = engine.create(&installation_draft("BR-01")).await.unwrap();
        engine.add_items(id, &[serial("S1")]).await.unwrap();

        let err = engine.delete(id).await.unwrap_err();
        assert!(matches!(err, EngineError::PreconditionFailed(_)));

        engine
            .change_status(id, WithdrawalStatus::Cancelled)
            .await
            .unwrap();
        engine.delete(id).await.unwrap();

        assert!(matches!(
            engine.find(id).await.unwrap_err(),
            EngineError::NotFound
        ));
        assert_eq!(store_of(&engine).association_count(id), 0);
    }

    #[tokio::test]
    async fn header_edit_is_pending_only_and_keeps_remarks() {
        let engine = engine_with_items(&[]);
        let id = engine.create(&installation_draft("BR-01")).await.unwrap();
        engine
            .update_remarks(id, Some("rack 4, needs a ladder"))
            .await
            .unwrap();

        engine
            .update_header(id, &installation_draft("BR-02"))
            .await
            .unwrap();
        let w = engine.find(id).await.unwrap();
        assert_eq!(w.for_branch_code, Some(BranchCode::new("BR-02")));
        assert_eq!(w.remarks.as_deref(), Some("rack 4, needs a ladder"));

        engine
            .change_status(id, WithdrawalStatus::Cancelled)
            .await
            .unwrap();
        let err = engine
            .update_header(id, &installation_draft("BR-03"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PreconditionFailed(_)));

        // Remarks stay editable after cancellation.
        engine.update_remarks(id, Some("cancelled by customer")).await.unwrap();
        let w = engine.find(id).await.unwrap();
        assert_eq!(w.remarks.as_deref(), Some("cancelled by customer"));
    }

    #[tokio::test]
    async fn operations_on_missing_withdrawals_report_not_found() {
        let engine = engine_with_items(&["S1"]);
        let missing = WithdrawalId::new(404);

        assert!(matches!(
            engine.find(missing).await.unwrap_err(),
            EngineError::NotFound
        ));
        assert!(matches!(
            engine
                .change_status(missing, WithdrawalStatus::Confirmed)
                .await
                .unwrap_err(),
            EngineError::NotFound
        ));
        assert!(matches!(
            engine.add_items(missing, &[serial("S1")]).await.unwrap_err(),
            EngineError::NotFound
        ));
        assert!(matches!(
            engine.delete(missing).await.unwrap_err(),
            EngineError::NotFound
        ));
    }

    #[tokio::test]
    async fn same_serial_twice_in_one_call_is_rejected_second_time() {
        let engine = engine_with_items(&["S1"]);
        let id = engine.create(&installation_draft("BR-01")).await.unwrap();

        let batch = engine
            .add_items(id, &[serial("S1"), serial("S1")])
            .await
            .unwrap();
        assert_eq!(batch.updated, vec![serial("S1")]);
        assert_eq!(
            batch.rejected[0].reason,
            RejectReason::AlreadyReserved(ItemStatus::Reserved)
        );
        assert_eq!(store_of(&engine).association_count(id), 1);
    }

    #[tokio::test]
    async fn listing_filters_by_kind_and_status() {
        let engine = engine_with_items(&[]);
        let a = engine.create(&installation_draft("BR-01")).await.unwrap();
        let _b = engine.create(&lending_draft()).await.unwrap();
        engine
            .change_status(a, WithdrawalStatus::Cancelled)
            .await
            .unwrap();

        let cancelled = engine
            .list(
                &WithdrawalFilter {
                    status: Some(WithdrawalStatus::Cancelled),
                    ..WithdrawalFilter::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, a);

        let lendings = engine
            .list(
                &WithdrawalFilter {
                    kind: Some(WithdrawalKind::Lending),
                    ..WithdrawalFilter::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(lendings.len(), 1);
        assert_eq!(lendings[0].kind, WithdrawalKind::Lending);
    }

    #[tokio::test]
    async fn full_installation_scenario() {
        // End-to-end: PENDING installation for branch B, S1 in stock,
        // S2 reserved elsewhere; then confirm; then cancel must fail.
        let engine = engine_with_items(&["S1"]);
        store_of(&engine).put_item(Item {
            serial_no: serial("S2"),
            status: ItemStatus::Reserved,
            reserved_branch_code: Some(BranchCode::new("ELSEWHERE")),
        });

        let id = engine.create(&installation_draft("B")).await.unwrap();
        let batch = engine
            .add_items(id, &[serial("S1"), serial("S2")])
            .await
            .unwrap();
        assert_eq!(batch.updated, vec![serial("S1")]);
        assert_eq!(batch.rejected.len(), 1);

        let s1 = store_of(&engine).item(&serial("S1")).unwrap();
        assert_eq!(s1.status, ItemStatus::Reserved);
        assert_eq!(s1.reserved_branch_code, Some(BranchCode::new("B")));

        engine
            .change_status(id, WithdrawalStatus::Confirmed)
            .await
            .unwrap();
        let s1 = store_of(&engine).item(&serial("S1")).unwrap();
        assert_eq!(s1.status, ItemStatus::Installed);
        assert_eq!(
            engine.find(id).await.unwrap().status,
            WithdrawalStatus::Confirmed
        );

        let err = engine
            .change_status(id, WithdrawalStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn items_listing_reflects_current_associations() {
        let engine = engine_with_items(&["S1", "S2"]);
        let id = engine.create(&installation_draft("BR-01")).await.unwrap();
        engine
            .add_items(id, &[serial("S2"), serial("S1")])
            .await
            .unwrap();

        let items = engine.items(id).await.unwrap();
        let serials: Vec<_> = items.iter().map(|i| i.serial_no.clone()).collect();
        assert_eq!(serials, vec![serial("S1"), serial("S2")]);
    }
}
