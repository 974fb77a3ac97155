//! Directory group → target group resolution.
//!
//! Two sources feed the desired groups of a user: the static `groups` table,
//! and regex rules that derive a target group name from any directory group a
//! user belongs to.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;

use crate::config::{AdditionalGroupConfig, GroupMappingConfig};
use crate::error::SyncError;
use crate::target_info::normalize_group;
use crate::types::AdobeGroup;

/// A rule deriving a target group from a matching directory group name.
///
/// The template may reference capture groups (`$1`, `${name}`).
#[derive(Debug, Clone)]
pub struct AdditionalGroupRule {
    pattern: Regex,
    template: String,
}

impl AdditionalGroupRule {
    pub fn new(source: &str, template: impl Into<String>) -> Result<Self, SyncError> {
        let pattern = Regex::new(source).map_err(|e| {
            SyncError::InvalidConfig(format!("additional group rule '{source}': {e}"))
        })?;
        Ok(AdditionalGroupRule {
            pattern,
            template: template.into(),
        })
    }

    /// The target group spec derived from `group`, if the rule matches it.
    pub fn apply(&self, group: &str) -> Option<String> {
        let captures = self.pattern.captures(group)?;
        let mut spec = String::new();
        captures.expand(&self.template, &mut spec);
        let spec = spec.trim().to_string();
        (!spec.is_empty()).then_some(spec)
    }
}

/// A target group spec a user should hold, and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResolvedGroup {
    pub spec: String,
    /// The directory group that produced this spec through an additional rule.
    pub additional_source: Option<String>,
}

/// Compiled group mapping table plus additional-group rules.
#[derive(Debug, Clone, Default)]
pub struct GroupMapper {
    mappings: BTreeMap<String, Vec<String>>,
    rules: Vec<AdditionalGroupRule>,
}

impl GroupMapper {
    pub fn new(
        mappings: &[GroupMappingConfig],
        rules: &[AdditionalGroupConfig],
    ) -> Result<Self, SyncError> {
        let mut mapper = GroupMapper::default();
        for mapping in mappings {
            let directory_group = normalize_group(&mapping.directory_group);
            if directory_group.is_empty() {
                return Err(SyncError::InvalidConfig(
                    "group mapping with an empty directory_group".to_string(),
                ));
            }
            let specs = mapper.mappings.entry(directory_group).or_default();
            for spec in &mapping.adobe_groups {
                AdobeGroup::parse(spec)?;
                if !specs.contains(spec) {
                    specs.push(spec.clone());
                }
            }
        }
        mapper.rules = rules
            .iter()
            .map(|rule| AdditionalGroupRule::new(&rule.source, rule.target.clone()))
            .collect::<Result<_, _>>()?;
        Ok(mapper)
    }

    /// Every spec the static table can produce.
    pub fn mapped_specs(&self) -> BTreeSet<&str> {
        self.mappings
            .values()
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// The target groups implied by `directory_groups`, deduplicated by spec.
    pub fn resolve(&self, directory_groups: &BTreeSet<String>) -> Vec<ResolvedGroup> {
        let mut resolved: BTreeMap<String, Option<String>> = BTreeMap::new();

        for group in directory_groups {
            if let Some(specs) = self.mappings.get(&normalize_group(group)) {
                for spec in specs {
                    resolved.insert(spec.clone(), None);
                }
            }
            for rule in &self.rules {
                if let Some(spec) = rule.apply(group) {
                    resolved.entry(spec).or_insert_with(|| Some(group.clone()));
                }
            }
        }

        resolved
            .into_iter()
            .map(|(spec, additional_source)| ResolvedGroup {
                spec,
                additional_source,
            })
            .collect()
    }
}
