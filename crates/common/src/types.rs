// Core domain types shared across the huddle crates.

use serde::{Deserialize, Serialize};

/// The pre-authenticated identity tuple a connection arrives with.
///
/// Resolved by the external handshake collaborator (gateway) before the
/// relay ever sees the connection; the relay treats every field as opaque.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectIdentity {
    pub user_id: String,
    /// Display name carried on every envelope this connection produces.
    pub user_name: String,
    /// Display role (e.g. "customer", "provider", "staff"); never interpreted.
    pub user_role: String,
}

impl ConnectIdentity {
    pub fn new(
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        user_role: impl Into<String>,
    ) -> Self {
        Self { user_id: user_id.into(), user_name: user_name.into(), user_role: user_role.into() }
    }
}
