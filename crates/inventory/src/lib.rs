//! Inventory withdrawal domain.
//!
//! This crate contains the business rules for items and withdrawals,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage): status lifecycles, cross-field draft validation, and the
//! reservation policies that decide how items move when a withdrawal
//! reserves, confirms, or releases them.

pub mod item;
pub mod policy;
pub mod withdrawal;

pub use item::{Item, ItemStatus, ItemTransition, RejectReason};
pub use policy::{
    policy_for, return_policy, InstallationPolicy, LendingPolicy, ReservationPolicy,
    ReserveContext, ReturnPolicy, TransferPolicy,
};
pub use withdrawal::{
    Withdrawal, WithdrawalDraft, WithdrawalFilter, WithdrawalKind, WithdrawalStatus,
};
