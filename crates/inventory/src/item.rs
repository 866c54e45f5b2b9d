//! Physical items and their reservation lifecycle.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockroom_core::{BranchCode, EngineError, SerialNo};

/// Current state of a physical item.
///
/// `InStock` is the only state a reservation policy accepts items from.
/// `Installed`, `Lent` and `Transferred` are the operational states a
/// confirmed withdrawal commits items into. `Broken` items are managed
/// outside this subsystem and are never eligible.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    InStock,
    Reserved,
    Installed,
    Lent,
    Transferred,
    Broken,
}

impl ItemStatus {
    /// Database / wire literal for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::InStock => "IN_STOCK",
            ItemStatus::Reserved => "RESERVED",
            ItemStatus::Installed => "INSTALLED",
            ItemStatus::Lent => "LENT",
            ItemStatus::Transferred => "TRANSFERRED",
            ItemStatus::Broken => "BROKEN",
        }
    }

    /// True while the item is earmarked for a pending withdrawal.
    pub fn is_reserved(&self) -> bool {
        matches!(
            self,
            ItemStatus::Reserved | ItemStatus::Transferred | ItemStatus::Lent
        )
    }

    /// A branch annotation is permitted only in these states.
    pub fn allows_branch_annotation(&self) -> bool {
        matches!(self, ItemStatus::Reserved | ItemStatus::Transferred)
    }
}

impl core::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_STOCK" => Ok(ItemStatus::InStock),
            "RESERVED" => Ok(ItemStatus::Reserved),
            "INSTALLED" => Ok(ItemStatus::Installed),
            "LENT" => Ok(ItemStatus::Lent),
            "TRANSFERRED" => Ok(ItemStatus::Transferred),
            "BROKEN" => Ok(ItemStatus::Broken),
            other => Err(EngineError::validation(format!(
                "unknown item status: {other}"
            ))),
        }
    }
}

/// A physical item as the registry sees it.
///
/// Items are created outside this subsystem and never deleted by it; the
/// transition engine mutates `status` and `reserved_branch_code` only
/// through a reservation policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub serial_no: SerialNo,
    pub status: ItemStatus,
    pub reserved_branch_code: Option<BranchCode>,
}

impl Item {
    pub fn in_stock(serial_no: impl Into<SerialNo>) -> Self {
        Self {
            serial_no: serial_no.into(),
            status: ItemStatus::InStock,
            reserved_branch_code: None,
        }
    }
}

/// An item-state change applied to every associated item when a withdrawal
/// is confirmed (e.g. RESERVED → INSTALLED for an installation).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ItemTransition {
    pub from: ItemStatus,
    pub to: ItemStatus,
}

/// Why a single serial was rejected inside a batch operation.
///
/// These are per-serial outcomes, never operation-level errors: one
/// rejected serial does not abort its siblings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("no item with this serial number")]
    NotFound,

    #[error("item is broken")]
    Broken,

    #[error("item is already reserved (currently {0})")]
    AlreadyReserved(ItemStatus),

    #[error("item is not in an eligible state (currently {0})")]
    WrongStatus(ItemStatus),

    #[error("item is not associated with this withdrawal")]
    NotAssociated,

    #[error("store failure: {0}")]
    Store(String),
}

impl RejectReason {
    /// Classify an ineligible item by the status it was found in.
    pub fn for_ineligible(current: ItemStatus) -> Self {
        match current {
            ItemStatus::Broken => RejectReason::Broken,
            s if s.is_reserved() => RejectReason::AlreadyReserved(s),
            s => RejectReason::WrongStatus(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_wire_literal() {
        for status in [
            ItemStatus::InStock,
            ItemStatus::Reserved,
            ItemStatus::Installed,
            ItemStatus::Lent,
            ItemStatus::Transferred,
            ItemStatus::Broken,
        ] {
            assert_eq!(status.as_str().parse::<ItemStatus>().unwrap(), status);
        }
    }

    #[test]
    fn serde_uses_the_database_literals() {
        let json = serde_json::to_string(&ItemStatus::InStock).unwrap();
        assert_eq!(json, r#""IN_STOCK""#);
        let back: ItemStatus = serde_json::from_str(r#""TRANSFERRED""#).unwrap();
        assert_eq!(back, ItemStatus::Transferred);
    }

    #[test]
    fn unknown_literal_is_a_validation_error() {
        let err = "MISPLACED".parse::<ItemStatus>().unwrap_err();
        match err {
            EngineError::Validation(msg) if msg.contains("MISPLACED") => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn ineligible_classification() {
        assert_eq!(
            RejectReason::for_ineligible(ItemStatus::Broken),
            RejectReason::Broken
        );
        assert_eq!(
            RejectReason::for_ineligible(ItemStatus::Reserved),
            RejectReason::AlreadyReserved(ItemStatus::Reserved)
        );
        assert_eq!(
            RejectReason::for_ineligible(ItemStatus::Lent),
            RejectReason::AlreadyReserved(ItemStatus::Lent)
        );
        assert_eq!(
            RejectReason::for_ineligible(ItemStatus::Installed),
            RejectReason::WrongStatus(ItemStatus::Installed)
        );
    }
}
