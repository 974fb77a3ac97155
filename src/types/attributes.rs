//! The attribute set the engine keeps in sync on every target.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

/// A field the engine may create or update on a target.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SyncField {
    Email,
    Firstname,
    Lastname,
    Country,
    Username,
}

/// Field → new value, as proposed by the diff engine.
pub type AttributeChanges = BTreeMap<SyncField, String>;

/// Syncable attributes of one user. `None` means "not specified".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firstname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl UserAttributes {
    pub fn get(&self, field: SyncField) -> Option<&str> {
        match field {
            SyncField::Email => self.email.as_deref(),
            SyncField::Firstname => self.firstname.as_deref(),
            SyncField::Lastname => self.lastname.as_deref(),
            SyncField::Country => self.country.as_deref(),
            SyncField::Username => self.username.as_deref(),
        }
    }

    pub fn set(&mut self, field: SyncField, value: Option<String>) {
        let slot = match field {
            SyncField::Email => &mut self.email,
            SyncField::Firstname => &mut self.firstname,
            SyncField::Lastname => &mut self.lastname,
            SyncField::Country => &mut self.country,
            SyncField::Username => &mut self.username,
        };
        *slot = value;
    }

    /// Every specified field, in field order.
    pub fn to_map(&self) -> AttributeChanges {
        SyncField::iter()
            .filter_map(|field| self.get(field).map(|v| (field, v.to_string())))
            .collect()
    }

    pub fn with(mut self, field: SyncField, value: impl Into<String>) -> Self {
        self.set(field, Some(value.into()));
        self
    }
}

impl Display for UserAttributes {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{{{}}}",
            self.to_map()
                .iter()
                .map(|(field, value)| format!("{field}: '{value}'"))
                .join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_get_set() {
        let mut attrs = UserAttributes::default();
        assert_eq!(attrs.get(SyncField::Email), None);
        attrs.set(SyncField::Email, Some("a@b.c".into()));
        assert_eq!(attrs.get(SyncField::Email), Some("a@b.c"));
        attrs.set(SyncField::Email, None);
        assert_eq!(attrs.email, None);
    }

    #[test]
    fn test_field_names() {
        assert_eq!(SyncField::Firstname.to_string(), "firstname");
        assert_eq!(SyncField::from_str("country").unwrap(), SyncField::Country);
    }

    #[test]
    fn test_display_skips_unspecified() {
        let attrs = UserAttributes::default()
            .with(SyncField::Lastname, "Flores")
            .with(SyncField::Email, "billy.flores@x.com");
        insta::assert_snapshot!(attrs.to_string(), @"{email: 'billy.flores@x.com', lastname: 'Flores'}");
    }

    #[test]
    fn test_serialize_skips_none() {
        let attrs = UserAttributes::default().with(SyncField::Country, "US");
        insta::assert_json_snapshot!(attrs, @r#"
        {
          "country": "US"
        }
        "#);
    }
}
