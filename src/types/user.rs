//! Directory-side and target-side user records.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

use super::attr_value::AttrValue;
use super::attributes::UserAttributes;
use super::identity_type::IdentityType;
use super::user_key::UserKey;

/// One user as read from a source directory.
///
/// Known fields are typed; everything else the connector pulled (including the
/// configured extended attributes) is kept in `source_attributes`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    #[serde(default)]
    pub identity_type: Option<IdentityType>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    /// Directory group names this user is a member of.
    #[serde(default)]
    pub groups: BTreeSet<String>,
    #[serde(default)]
    pub source_attributes: BTreeMap<String, AttrValue>,
}

impl DirectoryUser {
    /// The key this record addresses, using `default_type` when the record has none.
    pub fn user_key(&self, default_type: IdentityType) -> Option<UserKey> {
        UserKey::from_directory(
            self.identity_type.unwrap_or(default_type),
            self.username.as_deref(),
            self.domain.as_deref(),
            self.email.as_deref(),
        )
    }

    /// The attributes a target account for this user should carry.
    pub fn attributes(&self) -> UserAttributes {
        UserAttributes {
            email: self.email.clone(),
            firstname: self.firstname.clone(),
            lastname: self.lastname.clone(),
            country: self.country.clone(),
            username: self.username.clone(),
        }
    }

    /// The typed fields as attribute entries, named after the fields.
    pub fn known_attributes(&self) -> BTreeMap<String, AttrValue> {
        [
            ("identity_type", self.identity_type.map(|t| t.to_string())),
            ("username", self.username.clone()),
            ("domain", self.domain.clone()),
            ("email", self.email.clone()),
            ("firstname", self.firstname.clone()),
            ("lastname", self.lastname.clone()),
            ("country", self.country.clone()),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name.to_string(), AttrValue::from(v))))
        .collect()
    }

    /// Reload the typed fields from `attributes`, the inverse of [`known_attributes`].
    ///
    /// A missing or empty entry clears its field.
    ///
    /// [`known_attributes`]: DirectoryUser::known_attributes
    pub fn read_known_attributes(
        &mut self,
        attributes: &BTreeMap<String, AttrValue>,
    ) -> Result<(), SyncError> {
        let get = |name: &str| {
            attributes
                .get(name)
                .and_then(AttrValue::as_str)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        self.identity_type = match get("identity_type") {
            Some(text) => Some(text.parse::<IdentityType>().map_err(|_| SyncError::AttributeFormatError {
                user: get("email").or_else(|| get("username")).unwrap_or_default(),
                message: format!("invalid identity type '{text}'"),
            })?),
            None => None,
        };
        self.username = get("username");
        self.domain = get("domain");
        self.email = get("email");
        self.firstname = get("firstname");
        self.lastname = get("lastname");
        self.country = get("country");
        Ok(())
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }
}

/// One account as it currently exists on a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetUser {
    pub key: UserKey,
    #[serde(default)]
    pub attributes: UserAttributes,
    /// Group names as the target reports them.
    #[serde(default)]
    pub groups: BTreeSet<String>,
}

impl TargetUser {
    pub fn new(key: UserKey) -> Self {
        TargetUser {
            key,
            attributes: UserAttributes::default(),
            groups: BTreeSet::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: UserAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }
}
