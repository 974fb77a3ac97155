//! Target groups and the per-run group registry.

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::{Arc, RwLock};

use crate::error::SyncError;

use super::target::TargetId;

/// Separator between a group name and the target it lives on.
pub const GROUP_NAME_DELIMITER: &str = "::";

/// A group on a specific target, e.g. `Designers` or `Designers::edu`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AdobeGroup {
    group_name: String,
    target: TargetId,
}

impl AdobeGroup {
    /// Split a qualified specification into `(group_name, target)`.
    ///
    /// `name` resolves to the primary target and `name::target` to a named one.
    /// Empty parts or a second delimiter are rejected.
    pub fn parse(spec: &str) -> Result<(String, TargetId), SyncError> {
        let parts: Vec<&str> = spec.split(GROUP_NAME_DELIMITER).map(str::trim).collect();
        match parts.as_slice() {
            [group] if !group.is_empty() => Ok((group.to_string(), TargetId::Primary)),
            [group, target] if !group.is_empty() && !target.is_empty() => {
                Ok((group.to_string(), TargetId::named(*target)))
            }
            _ => Err(SyncError::MalformedGroupSpec(format!(
                "'{spec}' (expected format: group_name[::target_name])"
            ))),
        }
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    /// The specification this group parses back from.
    pub fn qualified_name(&self) -> String {
        match self.target.name() {
            None => self.group_name.clone(),
            Some(target) => format!("{}{GROUP_NAME_DELIMITER}{target}", self.group_name),
        }
    }
}

impl Display for AdobeGroup {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.qualified_name())
    }
}

/// Interning index for [`AdobeGroup`]s, owned by one run.
///
/// `create` is an atomic get-or-create keyed by the parsed tuple, so equivalent
/// specifications always return the same shared entry. Entries are never
/// removed; the registry is dropped with the run that owns it.
#[derive(Debug, Default)]
pub struct GroupRegistry {
    index: RwLock<HashMap<(String, TargetId), Arc<AdobeGroup>>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, spec: &str) -> Result<Arc<AdobeGroup>, SyncError> {
        let (group_name, target) = AdobeGroup::parse(spec)?;
        let mut index = self.index.write()?;
        let entry = index
            .entry((group_name.clone(), target.clone()))
            .or_insert_with(|| Arc::new(AdobeGroup { group_name, target }));
        Ok(Arc::clone(entry))
    }

    pub fn lookup(&self, group_name: &str, target: &TargetId) -> Result<Option<Arc<AdobeGroup>>, SyncError> {
        let index = self.index.read()?;
        Ok(index
            .get(&(group_name.to_string(), target.clone()))
            .cloned())
    }

    /// Every registered group living on `target`, sorted by name.
    pub fn groups_for(&self, target: &TargetId) -> Result<Vec<Arc<AdobeGroup>>, SyncError> {
        let index = self.index.read()?;
        let mut groups: Vec<Arc<AdobeGroup>> = index
            .values()
            .filter(|g| g.target() == target)
            .cloned()
            .collect();
        groups.sort();
        Ok(groups)
    }

    pub fn len(&self) -> usize {
        self.index.read().map(|index| index.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
