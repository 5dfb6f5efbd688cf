//! Domain model structs persisted in the directory database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the HTTP layer or dumped by the admin tooling.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Access level of an [`Identity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Read-only access to the directory.
    Viewer,
    /// May create, edit, soft-delete and restore clients.
    Admin,
    /// Admin rights plus identity management.
    Superadmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewer" => Ok(Role::Viewer),
            "admin" => Ok(Role::Admin),
            "superadmin" => Ok(Role::Superadmin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// An authenticated principal.
///
/// Identities are persisted locally so that weak references from clients and
/// history entries can degrade to `NULL` when an identity is removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    /// Unique identity identifier.
    pub id: Uuid,
    /// Unique login name.
    pub username: String,
    /// Directory role.
    pub role: Role,
    /// Overrides the role check everywhere when set.
    pub is_superuser: bool,
    /// Opaque bearer token consumed by the HTTP layer.
    pub access_token: String,
    /// When the identity was created.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A customer/account record in the directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Client {
    /// Surrogate key.
    pub id: Uuid,
    /// System-generated unique token, immutable after creation.
    pub external_code: String,
    /// Display name.  The only required field.
    pub name: String,
    pub company: Option<String>,
    /// Human-assigned code intended to uniquely identify the client.
    /// Uniqueness is not enforced by the schema; see
    /// [`Database::dedupe_clients`](crate::Database::dedupe_clients).
    pub business_identifier: Option<String>,
    pub email: Option<String>,
    /// ISO-style country or state code.
    pub country_code: Option<String>,
    pub address: Option<String>,
    /// File name of the stored logo image.  Compared by name only; the store
    /// never inspects image bytes.
    pub logo_reference: Option<String>,
    /// `false` means the record is soft-deleted and hidden from the active
    /// listing until restored or purged.
    pub active: bool,
    /// Set iff `active` is `false`.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Weak reference to the creating identity; `None` once that identity is
    /// removed.
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    /// Refreshed on every save; whole-second precision.
    pub updated_at: DateTime<Utc>,
}

/// The editable field set accepted by `create_client` / `save_client`.
///
/// Callers updating a single field load the current [`Client`], convert it
/// with [`ClientFields::from`] and change what they need.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientFields {
    pub name: String,
    pub company: Option<String>,
    pub business_identifier: Option<String>,
    pub email: Option<String>,
    pub country_code: Option<String>,
    pub address: Option<String>,
    pub logo_reference: Option<String>,
}

impl From<&Client> for ClientFields {
    fn from(client: &Client) -> Self {
        ClientFields {
            name: client.name.clone(),
            company: client.company.clone(),
            business_identifier: client.business_identifier.clone(),
            email: client.email.clone(),
            country_code: client.country_code.clone(),
            address: client.address.clone(),
            logo_reference: client.logo_reference.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// One recorded change to one field of one client.  Immutable once written;
/// rows are removed only when the owning client is hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: Uuid,
    /// Owning client; cascades on client deletion.
    pub client_id: Uuid,
    pub field_name: String,
    pub previous_value: Option<String>,
    pub new_value: Option<String>,
    /// Weak reference to the editing identity.
    pub edited_by: Option<Uuid>,
    pub edited_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trip() {
        for role in [Role::Viewer, Role::Admin, Role::Superadmin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn fields_from_client_preserve_logo() {
        let now = Utc::now();
        let client = Client {
            id: Uuid::new_v4(),
            external_code: "CL-000000000001".to_string(),
            name: "Acme Corp".to_string(),
            company: None,
            business_identifier: Some("X-1".to_string()),
            email: None,
            country_code: None,
            address: None,
            logo_reference: Some("CL-000000000001.png".to_string()),
            active: true,
            deleted_at: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        };

        let fields = ClientFields::from(&client);
        assert_eq!(fields.name, "Acme Corp");
        assert_eq!(fields.logo_reference.as_deref(), Some("CL-000000000001.png"));
    }
}
