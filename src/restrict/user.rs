use serde::{Deserialize, Serialize};

/// The current caller, as far as restriction checks are concerned. Token
/// validation and session plumbing live behind the transport boundary;
/// by the time a request reaches this crate it is reduced to an identifier
/// and a role set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub id: String,
    pub roles: Vec<String>,
}

impl UserContext {
    pub fn new(id: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            id: id.into(),
            roles,
        }
    }

    pub fn with_role(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self::new(id, vec![role.into()])
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_any_role(&self, roles: &[String]) -> bool {
        roles.iter().any(|r| self.has_role(r))
    }
}
