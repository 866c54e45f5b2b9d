//! `stockroom-engine` — the withdrawal status transition engine.
//!
//! The engine owns the rules governing how a withdrawal and the items
//! attached to it change together: reserving items into a pending
//! withdrawal, confirming or cancelling the withdrawal with the matching
//! item cascade, and deleting cancelled records. It talks to storage only
//! through the [`store::WithdrawalStore`] port; every multi-row cascade is a
//! single atomic unit of that port, so partial application is impossible by
//! construction.

pub mod memory;
pub mod service;
pub mod store;

pub use memory::InMemoryWithdrawalStore;
pub use service::TransitionEngine;
pub use store::{CascadeOutcome, Page, ReleaseOutcome, ReserveOutcome, StoreError, WithdrawalStore};
