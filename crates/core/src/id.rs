//! Strongly-typed identifiers and codes used across the domain.

use serde::{Deserialize, Serialize};

/// Serial number of a physical item (externally assigned, unique).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerialNo(String);

/// Code of a branch (customer site a withdrawal installs or reserves for).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchCode(String);

/// Code of an internal department (target of an inter-branch transfer).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepartmentCode(String);

/// Code of the staff member who created a withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaffCode(String);

macro_rules! impl_code_newtype {
    ($t:ty) => {
        impl $t {
            pub fn new(code: impl Into<String>) -> Self {
                Self(code.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<String> for $t {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $t {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

impl_code_newtype!(SerialNo);
impl_code_newtype!(BranchCode);
impl_code_newtype!(DepartmentCode);
impl_code_newtype!(StaffCode);

/// Identifier of a withdrawal record (store-assigned, monotonic).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WithdrawalId(i64);

impl WithdrawalId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for WithdrawalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for WithdrawalId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<WithdrawalId> for i64 {
    fn from(value: WithdrawalId) -> Self {
        value.0
    }
}
