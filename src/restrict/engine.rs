use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config;
use crate::ident;

use super::error::RestrictError;
use super::registry::RestrictionRegistry;
use super::rules::{roles, ProcessType, RestrictionRule};
use super::user::UserContext;

/// Per-call behavior of an [`RestrictionEngine::enforce`] walk. Constructed
/// fresh for every invocation and never shared across calls.
#[derive(Debug, Clone)]
pub struct EnforceOptions<'a> {
    /// Registered type of the subject value.
    pub type_name: &'a str,
    pub direction: ProcessType,
    /// Violations raise instead of redacting. Input defaults to true
    /// (a disallowed input field is an attempted escalation), output to
    /// false (over-fetch and redact).
    pub throw_on_violation: bool,
    /// Evaluate the subject's own class-level rules, rejecting the whole
    /// object when they fail. Applies to the root value and, for a root
    /// array, each of its elements.
    pub check_subject_rules: bool,
    /// Merge class-level rules into every property's rule set.
    pub merge_class_rules: bool,
    /// In redacting mode, drop rejected array elements instead of leaving
    /// null holes.
    pub filter_rejected_items: bool,
    /// Pre-fetched companion record; source of truth for membership pools.
    pub db_object: Option<&'a Value>,
    /// Treat the subject as created by the current user even without an
    /// audit field or companion. Set during create: the caller inserting a
    /// record is its creator before anything is stamped.
    pub assume_creatorship: bool,
}

impl<'a> EnforceOptions<'a> {
    pub fn input(type_name: &'a str) -> Self {
        Self {
            type_name,
            direction: ProcessType::Input,
            throw_on_violation: true,
            check_subject_rules: false,
            merge_class_rules: true,
            filter_rejected_items: true,
            db_object: None,
            assume_creatorship: false,
        }
    }

    pub fn output(type_name: &'a str) -> Self {
        Self {
            type_name,
            direction: ProcessType::Output,
            throw_on_violation: false,
            check_subject_rules: false,
            merge_class_rules: true,
            filter_rejected_items: true,
            db_object: None,
            assume_creatorship: false,
        }
    }

    pub fn db_object(mut self, db_object: &'a Value) -> Self {
        self.db_object = Some(db_object);
        self
    }

    pub fn throw_on_violation(mut self, throw: bool) -> Self {
        self.throw_on_violation = throw;
        self
    }

    pub fn check_subject_rules(mut self, check: bool) -> Self {
        self.check_subject_rules = check;
        self
    }

    pub fn merge_class_rules(mut self, merge: bool) -> Self {
        self.merge_class_rules = merge;
        self
    }

    pub fn filter_rejected_items(mut self, filter: bool) -> Self {
        self.filter_rejected_items = filter;
        self
    }

    pub fn assume_creatorship(mut self, assume: bool) -> Self {
        self.assume_creatorship = assume;
        self
    }
}

/// Recursive field-visibility enforcement over dynamic record values.
pub struct RestrictionEngine {
    registry: Arc<RestrictionRegistry>,
    max_depth: u32,
}

impl RestrictionEngine {
    pub fn new(registry: Arc<RestrictionRegistry>) -> Self {
        Self::with_max_depth(registry, config::CONFIG.restrict.max_depth)
    }

    pub fn with_max_depth(registry: Arc<RestrictionRegistry>, max_depth: u32) -> Self {
        Self {
            registry,
            max_depth,
        }
    }

    pub fn registry(&self) -> &RestrictionRegistry {
        &self.registry
    }

    /// Walk `value`, removing (or rejecting, in throwing mode) everything
    /// the user may not access in the configured direction. Returns the
    /// pruned value; a subject rejected wholesale comes back as null.
    ///
    /// The walk is deterministic, so enforcing an already-enforced value is
    /// a no-op: surviving properties pass again, removed ones are gone.
    pub fn enforce(
        &self,
        value: Value,
        user: Option<&UserContext>,
        opts: &EnforceOptions,
    ) -> Result<Value, RestrictError> {
        // Input values rarely carry their own audit field (it is stamped
        // after restriction), so root-level creator-ship falls back to the
        // companion record when one is supplied, or to the explicit
        // assumption made by create flows.
        let inherited = (opts.assume_creatorship && user.is_some())
            || opts
                .db_object
                .map(|db| object_created_by(db, user))
                .unwrap_or(false);
        let walked = self.walk(value, Some(opts.type_name), user, opts, 0, true, inherited)?;
        Ok(walked.unwrap_or(Value::Null))
    }

    /// Evaluate only the subject's class-level rules against a record.
    /// Used for record-level authorization on update/delete, where no
    /// property is being read or written.
    pub fn subject_allowed(
        &self,
        value: &Value,
        user: Option<&UserContext>,
        opts: &EnforceOptions,
    ) -> bool {
        let Value::Object(map) = value else {
            return true;
        };
        let created_here = object_created_by(value, user);
        self.rule_set_passes(
            self.registry.class_rules(opts.type_name),
            user,
            map,
            created_here,
            opts,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn walk(
        &self,
        value: Value,
        type_name: Option<&str>,
        user: Option<&UserContext>,
        opts: &EnforceOptions,
        depth: u32,
        at_subject: bool,
        parent_created: bool,
    ) -> Result<Option<Value>, RestrictError> {
        if depth > self.max_depth {
            return Err(RestrictError::DepthExceeded(self.max_depth));
        }
        match value {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match self.walk(item, type_name, user, opts, depth + 1, at_subject, parent_created)? {
                        Some(v) => out.push(v),
                        None if opts.filter_rejected_items => {}
                        None => out.push(Value::Null),
                    }
                }
                Ok(Some(Value::Array(out)))
            }
            Value::Object(map) => {
                self.walk_object(map, type_name, user, opts, depth, at_subject, parent_created)
            }
            primitive => Ok(Some(primitive)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn walk_object(
        &self,
        map: Map<String, Value>,
        type_name: Option<&str>,
        user: Option<&UserContext>,
        opts: &EnforceOptions,
        depth: u32,
        at_subject: bool,
        parent_created: bool,
    ) -> Result<Option<Value>, RestrictError> {
        // Creator-ship of this object: its own audit field when present,
        // otherwise inherited from the nearest enclosing object.
        let created_here = match map.get("createdBy") {
            Some(cb) => creator_matches(cb, user),
            None => parent_created,
        };

        if at_subject && opts.check_subject_rules {
            if let Some(tn) = type_name {
                let class_rules = self.registry.class_rules(tn);
                if !self.rule_set_passes(class_rules, user, &map, created_here, opts) {
                    if opts.throw_on_violation {
                        return Err(RestrictError::AccessDenied {
                            location: tn.to_string(),
                            direction: opts.direction,
                        });
                    }
                    tracing::debug!(type_name = tn, "subject rejected by class-level rules");
                    return Ok(None);
                }
            }
        }

        // Decide every property before rebuilding, so rule evaluation sees
        // the whole object (self/creator checks read sibling fields).
        let mut rejected: Vec<String> = Vec::new();
        if let Some(tn) = type_name {
            for key in map.keys() {
                let merged;
                let rules: &[RestrictionRule] = if opts.merge_class_rules {
                    merged = self.registry.merged_rules(tn, key);
                    &merged
                } else {
                    self.registry.property_rules(tn, key)
                };
                if !self.rule_set_passes(rules, user, &map, created_here, opts) {
                    if opts.throw_on_violation {
                        return Err(RestrictError::AccessDenied {
                            location: format!("{tn}.{key}"),
                            direction: opts.direction,
                        });
                    }
                    tracing::debug!(type_name = tn, property = %key, "redacting property");
                    rejected.push(key.clone());
                }
            }
        }

        let mut out = Map::with_capacity(map.len());
        let type_name_owned = type_name.map(str::to_string);
        for (key, val) in map {
            if rejected.contains(&key) {
                continue;
            }
            let nested = type_name_owned
                .as_deref()
                .and_then(|tn| self.registry.nested_type(tn, &key));
            match self.walk(val, nested, user, opts, depth + 1, false, created_here)? {
                Some(v) => {
                    out.insert(key, v);
                }
                None => {}
            }
        }
        Ok(Some(Value::Object(out)))
    }

    /// Disjunctive evaluation of one rule set. Empty set or no rule
    /// matching the current direction means unrestricted. The "no one"
    /// sentinel short-circuits to failure before any grant is considered;
    /// it is the one way to make a field inaccessible regardless of role
    /// elevation.
    fn rule_set_passes(
        &self,
        rules: &[RestrictionRule],
        user: Option<&UserContext>,
        data: &Map<String, Value>,
        created_here: bool,
        opts: &EnforceOptions,
    ) -> bool {
        if rules.is_empty() {
            return true;
        }

        let mut role_names: Vec<&str> = Vec::new();
        let mut member_props: Vec<&str> = Vec::new();
        for rule in rules.iter().filter(|r| r.applies_to(opts.direction)) {
            match rule {
                RestrictionRule::Role(name) => role_names.push(name),
                RestrictionRule::Roles { roles, .. } => {
                    role_names.extend(roles.iter().map(String::as_str))
                }
                RestrictionRule::MemberOf { member_of, .. } => {
                    member_props.extend(member_of.iter().map(String::as_str))
                }
            }
        }

        // Rules exist but none applies to this direction.
        if role_names.is_empty() && member_props.is_empty() {
            return true;
        }

        if role_names.contains(&roles::NO_ONE) {
            return false;
        }
        if role_names.contains(&roles::EVERYONE) {
            return true;
        }

        let Some(user) = user else {
            return false;
        };

        if role_names.iter().any(|r| user.has_role(r)) {
            return true;
        }
        if role_names.contains(&roles::AUTHENTICATED) {
            return true;
        }
        if role_names.contains(&roles::SELF) {
            // Input values may carry no identifier of their own; the
            // companion record supplies the subject identity then.
            let subject_id = data
                .get("id")
                .or_else(|| data.get("_id"))
                .and_then(ident::normalize)
                .or_else(|| opts.db_object.and_then(ident::normalize));
            if subject_id.as_deref() == Some(user.id.as_str()) {
                return true;
            }
        }
        if role_names.contains(&roles::CREATOR) && created_here {
            return true;
        }

        if !member_props.is_empty() {
            if let Some(db_object) = opts.db_object {
                let mut pool: Vec<Value> = Vec::new();
                for prop in &member_props {
                    match db_object.get(*prop) {
                        Some(Value::Array(items)) => pool.extend(items.iter().cloned()),
                        Some(v) if !v.is_null() => pool.push(v.clone()),
                        _ => {}
                    }
                }
                if ident::contains(&pool, &Value::String(user.id.clone())) {
                    return true;
                }
            }
        }

        false
    }
}

fn creator_matches(created_by: &Value, user: Option<&UserContext>) -> bool {
    user.is_some_and(|u| ident::normalize(created_by).as_deref() == Some(u.id.as_str()))
}

fn object_created_by(value: &Value, user: Option<&UserContext>) -> bool {
    value
        .get("createdBy")
        .is_some_and(|cb| creator_matches(cb, user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine(registry: RestrictionRegistry) -> RestrictionEngine {
        RestrictionEngine::with_max_depth(Arc::new(registry), 32)
    }

    fn admin() -> UserContext {
        UserContext::with_role("admin-1", roles::ADMIN)
    }

    #[test]
    fn unrestricted_properties_pass_through() {
        let e = engine(RestrictionRegistry::empty());
        let value = json!({ "name": "a", "nested": { "x": 1 } });
        let out = e
            .enforce(value.clone(), None, &EnforceOptions::output("Thing"))
            .unwrap();
        assert_eq!(out, value);
    }

    #[test]
    fn role_restricted_property_is_redacted_on_output() {
        let registry = RestrictionRegistry::builder()
            .rule("User", Some("email"), RestrictionRule::roles([roles::ADMIN]))
            .build();
        let e = engine(registry);
        let value = json!({ "name": "a", "email": "a@example.com" });

        let out = e
            .enforce(value.clone(), None, &EnforceOptions::output("User"))
            .unwrap();
        assert_eq!(out, json!({ "name": "a" }));

        let out = e
            .enforce(value, Some(&admin()), &EnforceOptions::output("User"))
            .unwrap();
        assert_eq!(out["email"], json!("a@example.com"));
    }

    #[test]
    fn input_violation_throws_and_names_the_property() {
        let registry = RestrictionRegistry::builder()
            .rule("User", Some("roles"), RestrictionRule::roles([roles::ADMIN]))
            .build();
        let e = engine(registry);
        let err = e
            .enforce(
                json!({ "roles": ["admin"] }),
                Some(&UserContext::with_role("u1", "user")),
                &EnforceOptions::input("User"),
            )
            .unwrap_err();
        match err {
            RestrictError::AccessDenied { location, direction } => {
                assert_eq!(location, "User.roles");
                assert_eq!(direction, ProcessType::Input);
            }
            other => panic!("expected AccessDenied, got {other:?}"),
        }
    }

    #[test]
    fn no_one_beats_everyone_for_every_user() {
        let registry = RestrictionRegistry::builder()
            .rule(
                "Doc",
                Some("legacy"),
                RestrictionRule::roles([roles::NO_ONE, roles::EVERYONE]),
            )
            .build();
        let e = engine(registry);
        let value = json!({ "legacy": 1, "title": "t" });

        for user in [None, Some(admin())] {
            let out = e
                .enforce(value.clone(), user.as_ref(), &EnforceOptions::output("Doc"))
                .unwrap();
            assert_eq!(out, json!({ "title": "t" }), "user={user:?}");
        }
    }

    #[test]
    fn authenticated_user_sentinel() {
        let registry = RestrictionRegistry::builder()
            .rule(
                "Doc",
                Some("internal"),
                RestrictionRule::roles([roles::AUTHENTICATED]),
            )
            .build();
        let e = engine(registry);
        let value = json!({ "internal": true });

        let anon = e
            .enforce(value.clone(), None, &EnforceOptions::output("Doc"))
            .unwrap();
        assert_eq!(anon, json!({}));

        let signed_in = e
            .enforce(
                value,
                Some(&UserContext::new("u1", vec![])),
                &EnforceOptions::output("Doc"),
            )
            .unwrap();
        assert_eq!(signed_in, json!({ "internal": true }));
    }

    #[test]
    fn self_sentinel_compares_subject_identifier() {
        let registry = RestrictionRegistry::builder()
            .rule("User", Some("email"), RestrictionRule::roles([roles::SELF]))
            .build();
        let e = engine(registry);
        let value = json!({ "id": "u1", "email": "a@example.com" });

        let own = e
            .enforce(
                value.clone(),
                Some(&UserContext::new("u1", vec![])),
                &EnforceOptions::output("User"),
            )
            .unwrap();
        assert_eq!(own["email"], json!("a@example.com"));

        let other = e
            .enforce(
                value,
                Some(&UserContext::new("u2", vec![])),
                &EnforceOptions::output("User"),
            )
            .unwrap();
        assert_eq!(other, json!({ "id": "u1" }));
    }

    #[test]
    fn creator_inherits_into_embedded_objects() {
        let registry = RestrictionRegistry::builder()
            .rule("Doc", Some("secret"), RestrictionRule::roles([roles::CREATOR]))
            .property_type("Doc", "meta", "Doc")
            .build();
        let e = engine(registry);
        // meta has no createdBy of its own; creator-ship comes from the parent.
        let value = json!({
            "createdBy": "u1",
            "secret": "top",
            "meta": { "secret": "nested" }
        });

        let creator = e
            .enforce(
                value.clone(),
                Some(&UserContext::new("u1", vec![])),
                &EnforceOptions::output("Doc"),
            )
            .unwrap();
        assert_eq!(creator["secret"], json!("top"));
        assert_eq!(creator["meta"]["secret"], json!("nested"));

        let stranger = e
            .enforce(
                value,
                Some(&UserContext::new("u2", vec![])),
                &EnforceOptions::output("Doc"),
            )
            .unwrap();
        assert!(stranger.get("secret").is_none());
        assert!(stranger["meta"].get("secret").is_none());
    }

    #[test]
    fn embedded_object_with_own_creator_does_not_inherit() {
        let registry = RestrictionRegistry::builder()
            .rule("Doc", Some("secret"), RestrictionRule::roles([roles::CREATOR]))
            .property_type("Doc", "meta", "Doc")
            .build();
        let e = engine(registry);
        let value = json!({
            "createdBy": "u1",
            "meta": { "createdBy": "u2", "secret": "nested" }
        });
        let out = e
            .enforce(
                value,
                Some(&UserContext::new("u1", vec![])),
                &EnforceOptions::output("Doc"),
            )
            .unwrap();
        assert!(out["meta"].get("secret").is_none());
    }

    #[test]
    fn input_creator_check_uses_the_companion_record() {
        let registry = RestrictionRegistry::builder()
            .rule("Doc", Some("secret"), RestrictionRule::roles([roles::CREATOR]))
            .build();
        let e = engine(registry);
        let companion = json!({ "id": "d1", "createdBy": "u1" });

        let ok = e.enforce(
            json!({ "secret": "new" }),
            Some(&UserContext::new("u1", vec![])),
            &EnforceOptions::input("Doc").db_object(&companion),
        );
        assert!(ok.is_ok());

        let denied = e.enforce(
            json!({ "secret": "new" }),
            Some(&UserContext::new("u2", vec![])),
            &EnforceOptions::input("Doc").db_object(&companion),
        );
        assert!(denied.is_err());
    }

    #[test]
    fn create_flows_may_assume_creatorship() {
        let registry = RestrictionRegistry::builder()
            .rule("Doc", Some("secret"), RestrictionRule::roles([roles::CREATOR]))
            .build();
        let e = engine(registry);
        let user = UserContext::new("u1", vec![]);

        let ok = e.enforce(
            json!({ "secret": "initial" }),
            Some(&user),
            &EnforceOptions::input("Doc").assume_creatorship(true),
        );
        assert!(ok.is_ok());

        // Anonymous callers get no such assumption.
        let denied = e.enforce(
            json!({ "secret": "initial" }),
            None,
            &EnforceOptions::input("Doc").assume_creatorship(true),
        );
        assert!(denied.is_err());
    }

    #[test]
    fn member_of_checks_the_companion_pool() {
        let registry = RestrictionRegistry::builder()
            .rule(
                "Group",
                Some("notes"),
                RestrictionRule::member_of(["members", "owners"]),
            )
            .build();
        let e = engine(registry);
        let db_object = json!({ "members": ["u1", "u2"], "owners": "u3" });
        let value = json!({ "notes": "internal" });

        let member = e
            .enforce(
                value.clone(),
                Some(&UserContext::new("u2", vec![])),
                &EnforceOptions::output("Group").db_object(&db_object),
            )
            .unwrap();
        assert_eq!(member["notes"], json!("internal"));

        let owner = e
            .enforce(
                value.clone(),
                Some(&UserContext::new("u3", vec![])),
                &EnforceOptions::output("Group").db_object(&db_object),
            )
            .unwrap();
        assert_eq!(owner["notes"], json!("internal"));

        let outsider = e
            .enforce(
                value.clone(),
                Some(&UserContext::new("u9", vec![])),
                &EnforceOptions::output("Group").db_object(&db_object),
            )
            .unwrap();
        assert_eq!(outsider, json!({}));

        // No companion object at all: membership cannot be proven.
        let no_companion = e
            .enforce(
                value,
                Some(&UserContext::new("u1", vec![])),
                &EnforceOptions::output("Group"),
            )
            .unwrap();
        assert_eq!(no_companion, json!({}));
    }

    #[test]
    fn direction_scoped_rules_ignore_the_other_direction() {
        let registry = RestrictionRegistry::builder()
            .rule(
                "User",
                Some("email"),
                RestrictionRule::roles_for([roles::ADMIN], ProcessType::Input),
            )
            .build();
        let e = engine(registry);
        let value = json!({ "email": "a@example.com" });

        // Output walk: the input-scoped rule does not apply, field passes.
        let out = e
            .enforce(value.clone(), None, &EnforceOptions::output("User"))
            .unwrap();
        assert_eq!(out["email"], json!("a@example.com"));

        // Input walk: it does.
        assert!(e
            .enforce(value, None, &EnforceOptions::input("User"))
            .is_err());
    }

    #[test]
    fn class_rules_merge_into_property_sets_unless_disabled() {
        let registry = RestrictionRegistry::builder()
            .rule("Audit", None, RestrictionRule::roles([roles::ADMIN]))
            .build();
        let e = engine(registry);
        let value = json!({ "entry": 1 });

        let plain = e
            .enforce(value.clone(), None, &EnforceOptions::output("Audit"))
            .unwrap();
        assert_eq!(plain, json!({}));

        let unmerged = e
            .enforce(
                value,
                None,
                &EnforceOptions::output("Audit").merge_class_rules(false),
            )
            .unwrap();
        assert_eq!(unmerged, json!({ "entry": 1 }));
    }

    #[test]
    fn subject_rules_reject_whole_objects_and_filter_array_elements() {
        let registry = RestrictionRegistry::builder()
            .rule("Secret", None, RestrictionRule::roles([roles::ADMIN]))
            .build();
        let e = engine(registry);

        let rejected = e
            .enforce(
                json!({ "x": 1 }),
                None,
                &EnforceOptions::output("Secret").check_subject_rules(true),
            )
            .unwrap();
        assert_eq!(rejected, Value::Null);

        let list = e
            .enforce(
                json!([{ "x": 1 }, { "x": 2 }]),
                None,
                &EnforceOptions::output("Secret").check_subject_rules(true),
            )
            .unwrap();
        assert_eq!(list, json!([]));

        let holes = e
            .enforce(
                json!([{ "x": 1 }]),
                None,
                &EnforceOptions::output("Secret")
                    .check_subject_rules(true)
                    .filter_rejected_items(false),
            )
            .unwrap();
        assert_eq!(holes, json!([null]));
    }

    #[test]
    fn redaction_is_idempotent() {
        let registry = RestrictionRegistry::builder()
            .rule("User", Some("email"), RestrictionRule::roles([roles::ADMIN]))
            .rule("User", Some("secret"), RestrictionRule::roles([roles::NO_ONE]))
            .build();
        let e = engine(registry);
        let value = json!({ "name": "a", "email": "x", "secret": "s" });

        let once = e
            .enforce(value, None, &EnforceOptions::output("User"))
            .unwrap();
        let twice = e
            .enforce(once.clone(), None, &EnforceOptions::output("User"))
            .unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn walk_terminates_on_excessive_depth() {
        let e = engine(RestrictionRegistry::empty());
        let mut value = json!({ "leaf": true });
        for _ in 0..64 {
            value = json!({ "next": value });
        }
        let err = e
            .enforce(value, None, &EnforceOptions::output("Deep"))
            .unwrap_err();
        assert!(matches!(err, RestrictError::DepthExceeded(_)));
    }
}
