use serde::{Deserialize, Serialize};

pub const ADMIN_ROLE: &str = "admin";

/// The single privileged principal allowed to mutate the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminIdentity {
    pub username: String,
    pub role: String,
}

impl AdminIdentity {
    pub fn admin(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role: ADMIN_ROLE.to_string(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}
