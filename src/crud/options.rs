use serde_json::Value;

use crate::restrict::UserContext;

/// Per-call service configuration. Constructed fresh for every operation,
/// owned by that call, and discarded when it completes.
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions<'a> {
    /// The caller. `None` means anonymous.
    pub user: Option<&'a UserContext>,
    /// Skip the authorization stages (input/output restriction and
    /// record-level checks) while keeping preparation and mapping. For
    /// system jobs acting on behalf of no particular user.
    pub force: bool,
    /// Skip authorization AND preparation/mapping. Dangerous: secrets
    /// survive in raw mode.
    pub raw: bool,
    /// Roles of which the caller must hold at least one.
    pub required_roles: Vec<String>,
    /// Companion record for membership/creator checks when the operation
    /// itself does not fetch one.
    pub db_object: Option<Value>,
    /// Projection applied to raw results before mapping.
    pub select: Option<Vec<String>>,
}

impl<'a> ServiceOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_user(user: &'a UserContext) -> Self {
        Self {
            user: Some(user),
            ..Self::default()
        }
    }

    pub fn user(mut self, user: &'a UserContext) -> Self {
        self.user = Some(user);
        self
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    pub fn require_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn db_object(mut self, db_object: Value) -> Self {
        self.db_object = Some(db_object);
        self
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Authorization is bypassed by both flags.
    pub fn skip_authorization(&self) -> bool {
        self.force || self.raw
    }
}
