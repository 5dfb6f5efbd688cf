//! Authorization predicate for mutating operations.
//!
//! Every operation that writes to the directory funnels through
//! [`require_editor`]; call sites never re-derive the role check.

use crate::error::{Result, StoreError};
use crate::models::{Identity, Role};

/// `true` when the identity may create, edit, soft-delete or restore clients.
pub fn can_manage_clients(actor: &Identity) -> bool {
    actor.is_superuser || matches!(actor.role, Role::Admin | Role::Superadmin)
}

/// Reject the operation unless the identity may mutate the directory.
pub fn require_editor(actor: &Identity) -> Result<()> {
    if can_manage_clients(actor) {
        Ok(())
    } else {
        Err(StoreError::PermissionDenied(actor.username.clone()))
    }
}
