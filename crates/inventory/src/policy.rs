//! Reservation policies: the per-kind rules for moving items.
//!
//! Each withdrawal kind has one policy deciding which item states are
//! eligible for reservation, what state an eligible item moves to, whether a
//! branch annotation is recorded, and what item transition a confirmation
//! applies. The kind-independent return policy reverts items to stock when
//! they are removed from a pending withdrawal.
//!
//! Policies are selected once at the engine boundary (`policy_for`) and
//! carry no state, so they are shared as `'static` trait objects.

use stockroom_core::BranchCode;

use crate::item::{ItemStatus, ItemTransition};
use crate::withdrawal::WithdrawalKind;

/// Context a policy may consult while reserving: the withdrawal's
/// destination branch, where the kind has one.
#[derive(Debug, Copy, Clone)]
pub struct ReserveContext<'a> {
    pub destination: Option<&'a BranchCode>,
}

/// Per-kind reservation rules.
pub trait ReservationPolicy: Send + Sync {
    /// Item states this policy may act on. Anything else is rejected
    /// per-serial, without aborting the rest of the batch.
    fn eligible_from(&self) -> &'static [ItemStatus];

    /// State an eligible item moves to when reserved under this policy.
    fn reserved_status(&self) -> ItemStatus;

    /// Branch annotation recorded on the item while reserved, if any.
    fn reserved_branch<'a>(&self, ctx: ReserveContext<'a>) -> Option<&'a BranchCode> {
        let _ = ctx;
        None
    }

    /// Item-state change applied to every associated item when the
    /// withdrawal is confirmed. `None` means confirmation changes nothing
    /// about the items.
    fn confirm_transition(&self) -> Option<ItemTransition>;
}

/// Installation: reserve in-stock items for a branch; confirmation installs
/// them there.
pub struct InstallationPolicy;

impl ReservationPolicy for InstallationPolicy {
    fn eligible_from(&self) -> &'static [ItemStatus] {
        &[ItemStatus::InStock]
    }

    fn reserved_status(&self) -> ItemStatus {
        ItemStatus::Reserved
    }

    fn reserved_branch<'a>(&self, ctx: ReserveContext<'a>) -> Option<&'a BranchCode> {
        ctx.destination
    }

    fn confirm_transition(&self) -> Option<ItemTransition> {
        Some(ItemTransition {
            from: ItemStatus::Reserved,
            to: ItemStatus::Installed,
        })
    }
}

/// Lending: reserve in-stock items; confirmation marks them lent. Lending
/// has no destination branch in this model, so no annotation is recorded.
pub struct LendingPolicy;

impl ReservationPolicy for LendingPolicy {
    fn eligible_from(&self) -> &'static [ItemStatus] {
        &[ItemStatus::InStock]
    }

    fn reserved_status(&self) -> ItemStatus {
        ItemStatus::Reserved
    }

    fn confirm_transition(&self) -> Option<ItemTransition> {
        Some(ItemTransition {
            from: ItemStatus::Reserved,
            to: ItemStatus::Lent,
        })
    }
}

/// Transfer: items go straight to TRANSFERRED when reserved; the transfer is
/// complete at that point and confirmation applies no further item change.
/// The destination of a transfer is a department, so no branch annotation.
pub struct TransferPolicy;

impl ReservationPolicy for TransferPolicy {
    fn eligible_from(&self) -> &'static [ItemStatus] {
        &[ItemStatus::InStock]
    }

    fn reserved_status(&self) -> ItemStatus {
        ItemStatus::Transferred
    }

    fn confirm_transition(&self) -> Option<ItemTransition> {
        None
    }
}

/// Return: revert an associated item to stock whatever reserved state it is
/// in, clearing any branch annotation.
pub struct ReturnPolicy;

impl ReservationPolicy for ReturnPolicy {
    fn eligible_from(&self) -> &'static [ItemStatus] {
        &[ItemStatus::Reserved, ItemStatus::Transferred, ItemStatus::Lent]
    }

    fn reserved_status(&self) -> ItemStatus {
        ItemStatus::InStock
    }

    fn confirm_transition(&self) -> Option<ItemTransition> {
        None
    }
}

/// Select the reservation policy for a withdrawal kind.
pub fn policy_for(kind: WithdrawalKind) -> &'static dyn ReservationPolicy {
    match kind {
        WithdrawalKind::Installation => &InstallationPolicy,
        WithdrawalKind::Lending => &LendingPolicy,
        WithdrawalKind::Transfer => &TransferPolicy,
    }
}

/// The kind-independent policy used when items are removed from a pending
/// withdrawal.
pub fn return_policy() -> &'static dyn ReservationPolicy {
    &ReturnPolicy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(branch: Option<&BranchCode>) -> ReserveContext<'_> {
        ReserveContext {
            destination: branch,
        }
    }

    #[test]
    fn installation_reserves_for_the_destination_branch() {
        let branch = BranchCode::new("BR-01");
        let policy = policy_for(WithdrawalKind::Installation);

        assert_eq!(policy.eligible_from(), &[ItemStatus::InStock]);
        assert_eq!(policy.reserved_status(), ItemStatus::Reserved);
        assert_eq!(policy.reserved_branch(ctx(Some(&branch))), Some(&branch));
        assert_eq!(
            policy.confirm_transition(),
            Some(ItemTransition {
                from: ItemStatus::Reserved,
                to: ItemStatus::Installed,
            })
        );
    }

    #[test]
    fn lending_records_no_branch_and_confirms_to_lent() {
        let branch = BranchCode::new("BR-01");
        let policy = policy_for(WithdrawalKind::Lending);

        assert_eq!(policy.reserved_status(), ItemStatus::Reserved);
        assert_eq!(policy.reserved_branch(ctx(Some(&branch))), None);
        assert_eq!(
            policy.confirm_transition().map(|t| t.to),
            Some(ItemStatus::Lent)
        );
    }

    #[test]
    fn transfer_is_complete_once_reserved() {
        let policy = policy_for(WithdrawalKind::Transfer);

        assert_eq!(policy.reserved_status(), ItemStatus::Transferred);
        assert_eq!(policy.confirm_transition(), None);
        assert_eq!(policy.reserved_branch(ctx(None)), None);
    }

    #[test]
    fn return_policy_reverts_every_reserved_state_to_stock() {
        let policy = return_policy();

        for status in [ItemStatus::Reserved, ItemStatus::Transferred, ItemStatus::Lent] {
            assert!(policy.eligible_from().contains(&status));
        }
        assert!(!policy.eligible_from().contains(&ItemStatus::Broken));
        assert_eq!(policy.reserved_status(), ItemStatus::InStock);
    }
}
