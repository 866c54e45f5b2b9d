//! `stockroom-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod batch;
pub mod error;
pub mod id;

pub use batch::{BatchOutcome, Fault, Rejection};
pub use error::{EngineError, EngineResult};
pub use id::{BranchCode, DepartmentCode, SerialNo, StaffCode, WithdrawalId};
