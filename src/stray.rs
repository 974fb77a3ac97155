//! Stray detection and the bounded stray-disposition policy.
//!
//! A stray is an account present on a target that the directory pass did not
//! claim. The map is seeded once per target before the pass, drained as
//! directory users are matched, and whatever remains afterwards is the
//! authoritative stray set for that target. It is never recomputed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum_macros::{Display, EnumString};

use crate::error::SyncError;
use crate::target_info::{UmapiTargetInfo, normalize_group};
use crate::types::{Operation, TargetId, TargetUser, UserKey};

/// One entry to seed the stray map with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrayRecord {
    pub key: UserKey,
    /// Routes the entry to this target instead of the caller's default.
    pub target: Option<TargetId>,
    /// Groups the account holds, when known.
    pub groups: Option<BTreeSet<String>>,
}

impl StrayRecord {
    pub fn new(key: UserKey) -> Self {
        StrayRecord {
            key,
            target: None,
            groups: None,
        }
    }

    pub fn on_target(mut self, target: TargetId) -> Self {
        self.target = Some(target);
        self
    }
}

impl From<&TargetUser> for StrayRecord {
    fn from(user: &TargetUser) -> Self {
        StrayRecord {
            key: user.key.clone(),
            target: None,
            groups: Some(user.groups.clone()),
        }
    }
}

/// Per-target map of accounts not (yet) claimed by the directory.
#[derive(Debug, Clone, Default)]
pub struct StrayKeyMap {
    by_target: BTreeMap<TargetId, BTreeMap<UserKey, Option<BTreeSet<String>>>>,
    seeded: BTreeMap<TargetId, usize>,
}

impl StrayKeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from an enumeration of existing accounts. Records carrying their own
    /// target go to that target's sub-map, the rest to `target`.
    pub fn read<I>(&mut self, target: &TargetId, source: I)
    where
        I: IntoIterator<Item = StrayRecord>,
    {
        self.by_target.entry(target.clone()).or_default();
        self.seeded.entry(target.clone()).or_default();
        for record in source {
            let routed = record.target.unwrap_or_else(|| target.clone());
            *self.seeded.entry(routed.clone()).or_default() += 1;
            self.by_target
                .entry(routed)
                .or_default()
                .insert(record.key, record.groups);
        }
    }

    /// The directory claimed `user_key` on `target`; it is not a stray there.
    pub fn mark_present(&mut self, target: &TargetId, user_key: &UserKey) {
        if let Some(keys) = self.by_target.get_mut(target) {
            keys.remove(user_key);
        }
    }

    pub fn remaining(&self, target: &TargetId) -> BTreeSet<UserKey> {
        self.by_target
            .get(target)
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn remaining_count(&self, target: &TargetId) -> usize {
        self.by_target.get(target).map_or(0, BTreeMap::len)
    }

    /// Groups recorded for a stray, `None` when unknown (seeded from a snapshot).
    pub fn annotation(&self, target: &TargetId, user_key: &UserKey) -> Option<&BTreeSet<String>> {
        self.by_target
            .get(target)
            .and_then(|keys| keys.get(user_key))
            .and_then(Option::as_ref)
    }

    /// How many entries were seeded for `target`, before any draining.
    pub fn seeded_count(&self, target: &TargetId) -> usize {
        self.seeded.get(target).copied().unwrap_or(0)
    }

    pub fn targets(&self) -> impl Iterator<Item = &TargetId> {
        self.by_target.keys()
    }
}

/// Upper bound on how many strays a target may lose in one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaxStrays {
    /// Absolute ceiling; `0` disables the check.
    Count(usize),
    /// Share of the seeded target population; `0` disables the check.
    Percent(f64),
}

pub const DEFAULT_MAX_ADOBE_ONLY_USERS: MaxStrays = MaxStrays::Count(200);

impl Default for MaxStrays {
    fn default() -> Self {
        DEFAULT_MAX_ADOBE_ONLY_USERS
    }
}

impl MaxStrays {
    pub fn is_disabled(&self) -> bool {
        match self {
            MaxStrays::Count(n) => *n == 0,
            MaxStrays::Percent(p) => *p == 0.0,
        }
    }

    /// Whether `count` strays out of a seeded `population` breaks the ceiling.
    pub fn exceeded_by(&self, count: usize, population: usize) -> bool {
        if self.is_disabled() {
            return false;
        }
        match self {
            MaxStrays::Count(limit) => count > *limit,
            MaxStrays::Percent(pct) => {
                population > 0 && (count as f64) * 100.0 > pct * population as f64
            }
        }
    }
}

impl Display for MaxStrays {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MaxStrays::Count(n) => write!(f, "{n}"),
            MaxStrays::Percent(p) => write!(f, "{p}%"),
        }
    }
}

impl FromStr for MaxStrays {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || {
            SyncError::InvalidConfig(format!(
                "max_adobe_only_users must be a count or a percentage like '10%', got '{s}'"
            ))
        };
        match s.strip_suffix('%') {
            Some(pct) => {
                let pct: f64 = pct.trim().parse().map_err(|_| invalid())?;
                if !(0.0..=100.0).contains(&pct) {
                    return Err(invalid());
                }
                Ok(MaxStrays::Percent(pct))
            }
            None => s.parse().map(MaxStrays::Count).map_err(|_| invalid()),
        }
    }
}

impl Serialize for MaxStrays {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MaxStrays::Count(n) => serializer.serialize_u64(*n as u64),
            MaxStrays::Percent(_) => serializer.collect_str(self),
        }
    }
}

impl<'de> Deserialize<'de> for MaxStrays {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Count(usize),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Count(n) => Ok(MaxStrays::Count(n)),
            Repr::Text(text) => text.parse().map_err(D::Error::custom),
        }
    }
}

/// The account-level action taken on a stray. At most one may be configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum DeletionAction {
    /// Remove the account from the organization, keep the account itself.
    #[strum(serialize = "remove")]
    RemoveFromOrg,
    /// Remove from the organization and delete the account.
    Delete,
    /// Strip entitlements and groups, keep a minimal account.
    Disentitle,
}

/// What to do with the strays left after the directory pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrayActions {
    pub remove_adobe_groups: bool,
    pub deletion: Option<DeletionAction>,
}

impl StrayActions {
    /// Parse `adobe_only_user_action` values.
    ///
    /// `preserve`, `exclude` and `write-file` take no action on the target
    /// (`write-file` only matters together with an output path).
    pub fn parse<I, S>(names: I) -> Result<Self, SyncError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut actions = StrayActions::default();
        for name in names {
            let name = name.as_ref().trim().to_lowercase();
            match name.as_str() {
                "preserve" | "exclude" | "write-file" => {}
                "remove-adobe-groups" => actions.remove_adobe_groups = true,
                other => {
                    let action = DeletionAction::from_str(other).map_err(|_| {
                        SyncError::InvalidConfig(format!("unknown adobe_only_user_action '{other}'"))
                    })?;
                    match actions.deletion {
                        Some(existing) if existing != action => {
                            return Err(SyncError::InvalidConfig(format!(
                                "conflicting adobe_only_user_action values '{existing}' and '{action}'"
                            )));
                        }
                        _ => actions.deletion = Some(action),
                    }
                }
            }
        }
        Ok(actions)
    }

    pub fn is_empty(&self) -> bool {
        !self.remove_adobe_groups && self.deletion.is_none()
    }

    /// The operations to apply, in order, to one stray on `info`'s target.
    ///
    /// Group removal covers the stray's mapped groups, or every mapped group
    /// when its memberships are unknown. Account deletion only exists on the
    /// primary target; on a secondary it becomes a removal from the org.
    pub fn operations_for(
        &self,
        info: &UmapiTargetInfo,
        annotation: Option<&BTreeSet<String>>,
    ) -> Vec<Operation> {
        let mut operations = Vec::new();

        if self.remove_adobe_groups {
            let groups: BTreeSet<String> = match annotation {
                Some(groups) => groups
                    .iter()
                    .filter(|g| info.is_mapped(g))
                    .cloned()
                    .collect(),
                None => info.non_normalize_mapped_groups(),
            };
            if !groups.is_empty() {
                operations.push(Operation::RemoveGroups(groups));
            }
        }

        match self.deletion {
            Some(DeletionAction::RemoveFromOrg) => operations.push(Operation::RemoveFromOrg),
            Some(DeletionAction::Delete) if info.target().is_primary() => {
                operations.push(Operation::Delete)
            }
            Some(DeletionAction::Delete) => operations.push(Operation::RemoveFromOrg),
            Some(DeletionAction::Disentitle) => operations.push(Operation::Disentitle),
            None => {}
        }

        operations
    }
}

/// Whether `group` is one of `groups`, ignoring case.
pub(crate) fn contains_group(groups: &BTreeSet<String>, group: &str) -> bool {
    let wanted = normalize_group(group);
    groups.iter().any(|g| normalize_group(g) == wanted)
}
