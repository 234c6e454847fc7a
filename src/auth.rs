//! Permission-check boundary.
//!
//! Identity itself lives outside the core; callers arrive with a
//! [`PermissionProvider`] that answers capability checks for the current
//! principal. Mutating operations refuse with `PermissionDenied` when the
//! required capability is absent; reads and derived views need none.

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    CanManageUsers,
    CanManageInventory,
    CanManageSuppliers,
    CanManageOrders,
    CanViewReports,
    CanManageSettings,
    CanDeleteItems,
}

#[cfg_attr(test, mockall::automock)]
pub trait PermissionProvider: Send + Sync {
    fn has_permission(&self, capability: Capability) -> bool;
}

/// Checks a capability and produces the structured refusal on failure.
pub fn require(
    provider: &dyn PermissionProvider,
    capability: Capability,
    operation: &'static str,
) -> Result<(), CoreError> {
    if provider.has_permission(capability) {
        Ok(())
    } else {
        Err(CoreError::PermissionDenied {
            operation,
            capability,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Staff,
}

impl Role {
    pub fn capabilities(self) -> &'static [Capability] {
        use Capability::*;
        match self {
            Role::Admin => &[
                CanManageUsers,
                CanManageInventory,
                CanManageSuppliers,
                CanManageOrders,
                CanViewReports,
                CanManageSettings,
                CanDeleteItems,
            ],
            Role::Manager => &[
                CanManageInventory,
                CanManageSuppliers,
                CanManageOrders,
                CanViewReports,
                CanDeleteItems,
            ],
            Role::Staff => &[CanManageInventory, CanManageOrders],
        }
    }
}

/// Default provider: a fixed role-to-capability matrix.
#[derive(Clone, Copy, Debug)]
pub struct RolePermissions {
    role: Role,
}

impl RolePermissions {
    pub fn new(role: Role) -> Self {
        Self { role }
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

impl PermissionProvider for RolePermissions {
    fn has_permission(&self, capability: Capability) -> bool {
        self.role.capabilities().contains(&capability)
    }
}
