//! Withdrawal records and their status lifecycle.
//!
//! A withdrawal is created PENDING and ends CONFIRMED or CANCELLED; both end
//! states are terminal. Which optional header fields are populated is fully
//! determined by the withdrawal kind, and `WithdrawalDraft` enforces that
//! before anything reaches the transition engine.

use core::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stockroom_core::{
    BranchCode, DepartmentCode, EngineError, EngineResult, StaffCode, WithdrawalId,
};

/// Why items leave stock.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalKind {
    Installation,
    Lending,
    Transfer,
}

impl WithdrawalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalKind::Installation => "INSTALLATION",
            WithdrawalKind::Lending => "LENDING",
            WithdrawalKind::Transfer => "TRANSFER",
        }
    }
}

impl core::fmt::Display for WithdrawalKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WithdrawalKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSTALLATION" => Ok(WithdrawalKind::Installation),
            "LENDING" => Ok(WithdrawalKind::Lending),
            "TRANSFER" => Ok(WithdrawalKind::Transfer),
            other => Err(EngineError::validation(format!(
                "unknown withdrawal type: {other}"
            ))),
        }
    }
}

/// Lifecycle status of a withdrawal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "PENDING",
            WithdrawalStatus::Confirmed => "CONFIRMED",
            WithdrawalStatus::Cancelled => "CANCELLED",
        }
    }

    /// CONFIRMED and CANCELLED admit no outgoing transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Confirmed | WithdrawalStatus::Cancelled)
    }

    /// The complete transition relation of the lifecycle.
    ///
    /// PENDING is never a valid target, and nothing leaves a terminal
    /// status. Everything the engine permits reduces to this predicate.
    pub fn can_become(&self, target: WithdrawalStatus) -> bool {
        match target {
            WithdrawalStatus::Pending => false,
            WithdrawalStatus::Confirmed | WithdrawalStatus::Cancelled => !self.is_terminal(),
        }
    }
}

impl core::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WithdrawalStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(WithdrawalStatus::Pending),
            "CONFIRMED" => Ok(WithdrawalStatus::Confirmed),
            "CANCELLED" => Ok(WithdrawalStatus::Cancelled),
            other => Err(EngineError::validation(format!(
                "unknown withdrawal status: {other}"
            ))),
        }
    }
}

/// A persisted withdrawal header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub kind: WithdrawalKind,
    pub status: WithdrawalStatus,
    pub for_branch_code: Option<BranchCode>,
    pub for_department_code: Option<DepartmentCode>,
    pub created_by_staff_code: StaffCode,
    pub date: NaiveDate,
    pub return_by: Option<NaiveDate>,
    pub install_date: Option<NaiveDate>,
    pub remarks: Option<String>,
}

/// Header fields supplied when creating or editing a withdrawal.
///
/// Status is deliberately absent: new withdrawals are always PENDING and
/// status only ever changes through the transition engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalDraft {
    pub kind: WithdrawalKind,
    pub for_branch_code: Option<BranchCode>,
    pub for_department_code: Option<DepartmentCode>,
    pub created_by_staff_code: StaffCode,
    pub date: NaiveDate,
    pub return_by: Option<NaiveDate>,
    pub install_date: Option<NaiveDate>,
    pub remarks: Option<String>,
}

impl WithdrawalDraft {
    /// Cross-field validation: each kind mandates its own optional fields.
    ///
    /// Installation and lending target a branch; a transfer targets a
    /// department. Lending requires a return-by date, installation an
    /// install date. Faults are collected so the caller sees them all.
    pub fn validate(&self) -> EngineResult<()> {
        let mut faults: Vec<&str> = Vec::new();

        match self.kind {
            WithdrawalKind::Installation => {
                if self.for_branch_code.is_none() {
                    faults.push("an installation requires for_branch_code");
                }
                if self.install_date.is_none() {
                    faults.push("an installation requires install_date");
                }
            }
            WithdrawalKind::Lending => {
                if self.for_branch_code.is_none() {
                    faults.push("a lending requires for_branch_code");
                }
                if self.return_by.is_none() {
                    faults.push("a lending requires return_by");
                }
            }
            WithdrawalKind::Transfer => {
                if self.for_department_code.is_none() {
                    faults.push("a transfer requires for_department_code");
                }
            }
        }

        if faults.is_empty() {
            Ok(())
        } else {
            Err(EngineError::validation(faults.join("; ")))
        }
    }

    /// Clear every field the kind does not use, so exactly the
    /// kind-appropriate fields are persisted and all others are null.
    pub fn normalized(&self) -> WithdrawalDraft {
        let mut draft = self.clone();
        match draft.kind {
            WithdrawalKind::Installation => {
                draft.for_department_code = None;
                draft.return_by = None;
            }
            WithdrawalKind::Lending => {
                draft.for_department_code = None;
                draft.install_date = None;
            }
            WithdrawalKind::Transfer => {
                draft.for_branch_code = None;
                draft.return_by = None;
                draft.install_date = None;
            }
        }
        draft
    }
}

/// Filter for listing withdrawals. All fields optional; absent means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WithdrawalFilter {
    pub kind: Option<WithdrawalKind>,
    pub status: Option<WithdrawalStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn draft(kind: WithdrawalKind) -> WithdrawalDraft {
        WithdrawalDraft {
            kind,
            for_branch_code: Some(BranchCode::new("BR-01")),
            for_department_code: Some(DepartmentCode::new("DPT-7")),
            created_by_staff_code: StaffCode::new("ST-100"),
            date: date("2026-03-02"),
            return_by: Some(date("2026-04-01")),
            install_date: Some(date("2026-03-05")),
            remarks: None,
        }
    }

    #[test]
    fn installation_draft_requires_branch_and_install_date() {
        let mut d = draft(WithdrawalKind::Installation);
        d.for_branch_code = None;
        d.install_date = None;
        let err = d.validate().unwrap_err();
        match err {
            EngineError::Validation(msg) => {
                assert!(msg.contains("for_branch_code"));
                assert!(msg.contains("install_date"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn lending_draft_requires_return_by() {
        let mut d = draft(WithdrawalKind::Lending);
        d.return_by = None;
        assert!(d.validate().is_err());
        d.return_by = Some(date("2026-04-01"));
        assert!(d.validate().is_ok());
    }

    #[test]
    fn transfer_draft_requires_department() {
        let mut d = draft(WithdrawalKind::Transfer);
        d.for_department_code = None;
        assert!(d.validate().is_err());
    }

    #[test]
    fn normalization_clears_fields_the_kind_does_not_use() {
        let installation = draft(WithdrawalKind::Installation).normalized();
        assert!(installation.for_department_code.is_none());
        assert!(installation.return_by.is_none());
        assert!(installation.for_branch_code.is_some());
        assert!(installation.install_date.is_some());

        let lending = draft(WithdrawalKind::Lending).normalized();
        assert!(lending.for_department_code.is_none());
        assert!(lending.install_date.is_none());
        assert!(lending.return_by.is_some());

        let transfer = draft(WithdrawalKind::Transfer).normalized();
        assert!(transfer.for_branch_code.is_none());
        assert!(transfer.return_by.is_none());
        assert!(transfer.install_date.is_none());
        assert!(transfer.for_department_code.is_some());
    }

    #[test]
    fn only_pending_has_outgoing_transitions() {
        use WithdrawalStatus::*;
        assert!(Pending.can_become(Confirmed));
        assert!(Pending.can_become(Cancelled));
        assert!(!Pending.can_become(Pending));
        assert!(!Confirmed.can_become(Cancelled));
        assert!(!Cancelled.can_become(Confirmed));
    }

    fn any_status() -> impl Strategy<Value = WithdrawalStatus> {
        prop_oneof![
            Just(WithdrawalStatus::Pending),
            Just(WithdrawalStatus::Confirmed),
            Just(WithdrawalStatus::Cancelled),
        ]
    }

    proptest! {
        /// Property: terminal statuses never admit any transition, and
        /// PENDING is never a reachable target, for every (from, target)
        /// pair the lifecycle can be asked about.
        #[test]
        fn terminal_statuses_never_transition(from in any_status(), target in any_status()) {
            if from.is_terminal() {
                prop_assert!(!from.can_become(target));
            }
            if target == WithdrawalStatus::Pending {
                prop_assert!(!from.can_become(target));
            }
        }

        /// Property: applying any permitted transition lands in a terminal
        /// status, so no chain of transitions is longer than one step.
        #[test]
        fn lifecycle_has_single_step_chains(from in any_status(), target in any_status()) {
            if from.can_become(target) {
                prop_assert!(target.is_terminal());
            }
        }
    }
}
