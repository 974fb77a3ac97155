//! Desired state accumulated for one target during a run.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::types::{TargetId, UserKey};

/// Groups the engine manages on one target and the groups each user should hold there.
///
/// Only grows during a run. `mapped_groups` and `non_normalize_mapped_groups`
/// are updated together: the former is the lower-cased key set, the latter the
/// first-seen spelling for each key.
#[derive(Debug, Clone, Default)]
pub struct UmapiTargetInfo {
    target: TargetId,
    mapped_groups: BTreeSet<String>,
    non_normalize_mapped_groups: BTreeMap<String, String>,
    additional_group_map: BTreeMap<String, Vec<String>>,
    desired_groups_by_user_key: HashMap<UserKey, BTreeSet<String>>,
}

impl UmapiTargetInfo {
    pub fn new(target: TargetId) -> Self {
        UmapiTargetInfo {
            target,
            ..Default::default()
        }
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    pub fn add_mapped_group(&mut self, name: &str) {
        let normalized = normalize_group(name);
        self.non_normalize_mapped_groups
            .entry(normalized.clone())
            .or_insert_with(|| name.to_string());
        self.mapped_groups.insert(normalized);
    }

    /// Lower-cased names of every group the engine may manage on this target.
    pub fn mapped_groups(&self) -> &BTreeSet<String> {
        &self.mapped_groups
    }

    /// Case-preserving names of the mapped groups.
    pub fn non_normalize_mapped_groups(&self) -> BTreeSet<String> {
        self.non_normalize_mapped_groups.values().cloned().collect()
    }

    pub fn is_mapped(&self, group: &str) -> bool {
        self.mapped_groups.contains(&normalize_group(group))
    }

    /// Record that directory group `source_name` also expands to `dest_name`.
    /// Destinations keep insertion order and are recorded once.
    pub fn add_additional_group(&mut self, source_name: &str, dest_name: &str) {
        let dests = self
            .additional_group_map
            .entry(source_name.to_string())
            .or_default();
        if !dests.iter().any(|d| d == dest_name) {
            dests.push(dest_name.to_string());
        }
    }

    pub fn additional_group_map(&self) -> &BTreeMap<String, Vec<String>> {
        &self.additional_group_map
    }

    pub fn add_desired_group_for(&mut self, user_key: &UserKey, group_name: &str) {
        self.desired_groups_by_user_key
            .entry(user_key.clone())
            .or_default()
            .insert(group_name.to_string());
    }

    /// The groups `user_key` should hold here; empty when never visited.
    pub fn get_desired_groups(&self, user_key: &UserKey) -> BTreeSet<String> {
        self.desired_groups_by_user_key
            .get(user_key)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether any directory group resolved to this target for `user_key`.
    pub fn has_desired_groups(&self, user_key: &UserKey) -> bool {
        self.desired_groups_by_user_key
            .get(user_key)
            .is_some_and(|groups| !groups.is_empty())
    }
}

/// Group names compare case-insensitively.
pub(crate) fn normalize_group(name: &str) -> String {
    name.trim().to_lowercase()
}
