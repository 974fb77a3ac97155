//! Target identifiers.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

/// Which target an operation, group or stray belongs to.
///
/// Serializes as `null` for the primary target and as the plain name otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetId {
    #[default]
    Primary,
    Named(String),
}

impl TargetId {
    pub fn named(name: impl Into<String>) -> Self {
        TargetId::Named(name.into())
    }

    /// `None` and the empty string both denote the primary target.
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            None | Some("") => TargetId::Primary,
            Some(name) => TargetId::Named(name.to_string()),
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, TargetId::Primary)
    }

    /// The secondary target's name, `None` for the primary.
    pub fn name(&self) -> Option<&str> {
        match self {
            TargetId::Primary => None,
            TargetId::Named(name) => Some(name),
        }
    }
}

impl Display for TargetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TargetId::Primary => write!(f, "primary"),
            TargetId::Named(name) => write!(f, "{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        none = { None, TargetId::Primary },
        empty = { Some(""), TargetId::Primary },
        blank = { Some("  "), TargetId::Primary },
        named = { Some("secondary"), TargetId::Named("secondary".to_string()) },
    )]
    fn test_from_name(name: Option<&str>, expected: TargetId) {
        assert_eq!(TargetId::from_name(name), expected);
    }

    #[test]
    fn test_primary_sorts_first() {
        let mut ids = vec![TargetId::named("b"), TargetId::Primary, TargetId::named("a")];
        ids.sort();
        assert_eq!(ids, vec![TargetId::Primary, TargetId::named("a"), TargetId::named("b")]);
    }

    #[test]
    fn test_serde_untagged() {
        assert_eq!(serde_json::to_string(&TargetId::Primary).unwrap(), "null");
        assert_eq!(
            serde_json::to_string(&TargetId::named("edu")).unwrap(),
            "\"edu\""
        );
        let back: TargetId = serde_json::from_str("\"edu\"").unwrap();
        assert_eq!(back, TargetId::named("edu"));
        let back: TargetId = serde_json::from_str("null").unwrap();
        assert_eq!(back, TargetId::Primary);
    }
}
