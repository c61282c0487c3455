use std::collections::HashMap;

use super::rules::RestrictionRule;

type RuleKey = (String, Option<String>);

/// Collects restriction metadata before startup freezes it into a
/// [`RestrictionRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    rules: HashMap<RuleKey, Vec<RestrictionRule>>,
    nested_types: HashMap<(String, String), String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a rule to a type (`property = None`) or a named property.
    pub fn rule(
        mut self,
        type_name: impl Into<String>,
        property: Option<&str>,
        rule: RestrictionRule,
    ) -> Self {
        self.rules
            .entry((type_name.into(), property.map(str::to_string)))
            .or_default()
            .push(rule);
        self
    }

    pub fn rules<I>(mut self, type_name: impl Into<String>, property: Option<&str>, rules: I) -> Self
    where
        I: IntoIterator<Item = RestrictionRule>,
    {
        let key = (type_name.into(), property.map(str::to_string));
        self.rules.entry(key).or_default().extend(rules);
        self
    }

    /// Declare the registered type of an embedded object property, so the
    /// engine can apply that type's rules when it descends.
    pub fn property_type(
        mut self,
        type_name: impl Into<String>,
        property: impl Into<String>,
        nested_type: impl Into<String>,
    ) -> Self {
        self.nested_types
            .insert((type_name.into(), property.into()), nested_type.into());
        self
    }

    pub fn build(self) -> RestrictionRegistry {
        RestrictionRegistry {
            rules: self.rules,
            nested_types: self.nested_types,
        }
    }
}

/// Process-wide restriction metadata: `(type, property?) -> rules`.
/// Immutable after [`RegistryBuilder::build`]; concurrent reads need no
/// synchronization.
#[derive(Debug, Default)]
pub struct RestrictionRegistry {
    rules: HashMap<RuleKey, Vec<RestrictionRule>>,
    nested_types: HashMap<(String, String), String>,
}

impl RestrictionRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// An empty registry: every lookup is unrestricted.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn class_rules(&self, type_name: &str) -> &[RestrictionRule] {
        self.rules
            .get(&(type_name.to_string(), None))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn property_rules(&self, type_name: &str, property: &str) -> &[RestrictionRule] {
        self.rules
            .get(&(type_name.to_string(), Some(property.to_string())))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn nested_type(&self, type_name: &str, property: &str) -> Option<&str> {
        self.nested_types
            .get(&(type_name.to_string(), property.to_string()))
            .map(String::as_str)
    }

    /// Class- and property-level rules merged, deduplicated, class first.
    pub fn merged_rules(&self, type_name: &str, property: &str) -> Vec<RestrictionRule> {
        let mut merged: Vec<RestrictionRule> = self.class_rules(type_name).to_vec();
        for rule in self.property_rules(type_name, property) {
            if !merged.contains(rule) {
                merged.push(rule.clone());
            }
        }
        merged
    }
}
