//! Attribute-level diffing between a directory candidate and a target account.

use strum::IntoEnumIterator;

use crate::types::{AttributeChanges, SyncField, UserAttributes};

/// Fields of `candidate` that must be written to bring `current` in line.
///
/// A field is proposed only when the candidate specifies it and its value
/// differs from the current one. Unspecified candidate fields never clear
/// anything on the target, so identical inputs always yield an empty map.
pub fn diff(candidate: &UserAttributes, current: &UserAttributes) -> AttributeChanges {
    SyncField::iter()
        .filter_map(|field| {
            let wanted = candidate.get(field)?;
            (current.get(field) != Some(wanted)).then(|| (field, wanted.to_string()))
        })
        .collect()
}
