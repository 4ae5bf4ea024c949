//! Single authorization checkpoint for mutating operations.
//!
//! Every service that changes state calls [`PermissionGuard::authorize`]
//! before touching anything. A disabled actor is rejected with an
//! authentication-level error *before* the capability matrix is consulted —
//! the two failure classes stay distinct all the way to the caller.

use std::sync::Arc;

use crate::directory::{Actor, StaffStatus};
use crate::error::{OpsError, OpsResult};
use crate::policy::capability::{Action, CapabilityMatrix, Module};

pub struct PermissionGuard {
    matrix: Arc<CapabilityMatrix>,
}

impl PermissionGuard {
    pub fn new(matrix: Arc<CapabilityMatrix>) -> Self {
        Self { matrix }
    }

    /// Reject actors whose account is not active.
    pub fn ensure_active(&self, actor: &Actor) -> OpsResult<()> {
        if actor.status != StaffStatus::Active {
            return Err(OpsError::Authentication(format!(
                "account '{}' is disabled",
                actor.username
            )));
        }
        Ok(())
    }

    /// Check that `actor` is active and holds `action` on `module`.
    pub fn authorize(&self, actor: &Actor, module: Module, action: Action) -> OpsResult<()> {
        self.ensure_active(actor)?;
        if self.matrix.allows(actor.role, module, action) {
            Ok(())
        } else {
            Err(OpsError::PermissionDenied { module, action })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::capability::Role;

    fn actor(role: Role, status: StaffStatus) -> Actor {
        Actor {
            id: "u-1".to_string(),
            username: "casey".to_string(),
            full_name: "Casey Nguyen".to_string(),
            role,
            department_id: None,
            status,
        }
    }

    #[test]
    fn active_manager_passes() {
        let guard = PermissionGuard::new(Arc::new(CapabilityMatrix::standard()));
        let a = actor(Role::ChiefEditor, StaffStatus::Active);
        assert!(guard
            .authorize(&a, Module::TaskAssignment, Action::Create)
            .is_ok());
    }

    #[test]
    fn capability_denial_is_permission_error() {
        let guard = PermissionGuard::new(Arc::new(CapabilityMatrix::standard()));
        let a = actor(Role::Reporter, StaffStatus::Active);
        let err = guard
            .authorize(&a, Module::HrManagement, Action::Create)
            .unwrap_err();
        assert!(matches!(
            err,
            OpsError::PermissionDenied {
                module: Module::HrManagement,
                action: Action::Create
            }
        ));
    }

    #[test]
    fn disabled_actor_rejected_before_matrix() {
        let guard = PermissionGuard::new(Arc::new(CapabilityMatrix::standard()));
        // Admin holds every task capability, but a disabled account must be
        // turned away as an authentication failure, not a permission one.
        let a = actor(Role::Admin, StaffStatus::Disabled);
        let err = guard
            .authorize(&a, Module::TaskAssignment, Action::View)
            .unwrap_err();
        assert!(matches!(err, OpsError::Authentication(_)));
    }
}
