use serde::{Deserialize, Serialize};

/// Role sentinels with engine-level semantics. Any other role string is an
/// ordinary deployment-defined role matched against the user's role set.
pub mod roles {
    /// Always passes.
    pub const EVERYONE: &str = "everyone";
    /// Always fails, even for users holding every other role. Checked
    /// before anything else so a field can be made permanently
    /// inaccessible through ordinary rule tooling.
    pub const NO_ONE: &str = "no one";
    /// Passes for any signed-in user.
    pub const AUTHENTICATED: &str = "authenticated user";
    /// Passes when the subject object's identifier is the current user's.
    pub const SELF: &str = "self";
    /// Passes when the subject's `createdBy` is the current user, or, for
    /// embedded objects without their own audit field, when the nearest
    /// enclosing object was created by the user.
    pub const CREATOR: &str = "creator";
    pub const ADMIN: &str = "admin";
}

/// Which processing direction a rule applies to. Rules without a process
/// type apply to both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessType {
    Input,
    Output,
}

impl std::fmt::Display for ProcessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessType::Input => write!(f, "input"),
            ProcessType::Output => write!(f, "output"),
        }
    }
}

/// One access-control statement attached to a type or property. A rule set
/// is a disjunction: any passing rule grants access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, rename_all = "camelCase")]
pub enum RestrictionRule {
    /// Bare role name, both directions.
    Role(String),
    /// Role list, optionally direction-scoped.
    #[serde(rename_all = "camelCase")]
    Roles {
        roles: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        process_type: Option<ProcessType>,
    },
    /// Membership rule: the named properties of the companion database
    /// object hold identifier pools the current user must appear in.
    #[serde(rename_all = "camelCase")]
    MemberOf {
        member_of: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        process_type: Option<ProcessType>,
    },
}

impl RestrictionRule {
    pub fn role(name: impl Into<String>) -> Self {
        RestrictionRule::Role(name.into())
    }

    pub fn roles<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RestrictionRule::Roles {
            roles: names.into_iter().map(Into::into).collect(),
            process_type: None,
        }
    }

    pub fn roles_for<I, S>(names: I, process_type: ProcessType) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RestrictionRule::Roles {
            roles: names.into_iter().map(Into::into).collect(),
            process_type: Some(process_type),
        }
    }

    pub fn member_of<I, S>(properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RestrictionRule::MemberOf {
            member_of: properties.into_iter().map(Into::into).collect(),
            process_type: None,
        }
    }

    pub fn member_of_for<I, S>(properties: I, process_type: ProcessType) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RestrictionRule::MemberOf {
            member_of: properties.into_iter().map(Into::into).collect(),
            process_type: Some(process_type),
        }
    }

    /// Whether this rule participates in the given direction.
    pub fn applies_to(&self, direction: ProcessType) -> bool {
        let scoped = match self {
            RestrictionRule::Role(_) => None,
            RestrictionRule::Roles { process_type, .. } => *process_type,
            RestrictionRule::MemberOf { process_type, .. } => *process_type,
        };
        scoped.is_none() || scoped == Some(direction)
    }
}
