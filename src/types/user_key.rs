//! Canonical user identity shared by the directory and every target.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SyncError;

use super::identity_type::IdentityType;

const KEY_DELIMITER: char = ',';

/// Identity of a user as the targets see it: `identity_type,username,domain`.
///
/// The domain is empty when it is already embedded in the username (an email
/// style login). Equality, ordering and hashing are by value, so two directory
/// records that normalise to the same triple address the same target account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserKey {
    identity_type: IdentityType,
    username: String,
    domain: String,
}

impl UserKey {
    /// Build a key from its parts exactly as given.
    pub fn new(
        identity_type: IdentityType,
        username: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        UserKey {
            identity_type,
            username: username.into(),
            domain: domain.into(),
        }
    }

    /// Build the key for a directory record.
    ///
    /// Values are trimmed and lower-cased. A missing username falls back to the
    /// email. When the username is email-shaped the domain is dropped; otherwise a
    /// domain is required. Returns `None` when no usable key can be formed.
    pub fn from_directory(
        identity_type: IdentityType,
        username: Option<&str>,
        domain: Option<&str>,
        email: Option<&str>,
    ) -> Option<Self> {
        let username = normalize(username).or_else(|| normalize(email))?;
        let domain = if username.contains('@') {
            String::new()
        } else {
            normalize(domain)?
        };
        Some(UserKey::new(identity_type, username, domain))
    }

    pub fn identity_type(&self) -> IdentityType {
        self.identity_type
    }

    /// The username part. Combining it with [`UserKey::domain`] is left to the
    /// target connector, since that rule is target specific.
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

impl Display for UserKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{}{KEY_DELIMITER}{}{KEY_DELIMITER}{}",
            self.identity_type, self.username, self.domain
        )
    }
}

impl FromStr for UserKey {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(3, KEY_DELIMITER).collect();
        let [identity_type, username, domain] = parts.as_slice() else {
            return Err(SyncError::MalformedKey(format!(
                "'{s}' (expected format: identity_type,username,domain)"
            )));
        };

        let raw_type = *identity_type;
        let identity_type = raw_type.parse::<IdentityType>().map_err(|_| {
            SyncError::MalformedKey(format!("'{s}': unknown identity type '{raw_type}'"))
        })?;
        if identity_type.to_string() != raw_type {
            return Err(SyncError::MalformedKey(format!(
                "'{s}': identity type must be spelled '{identity_type}'"
            )));
        }

        if username.is_empty() {
            return Err(SyncError::MalformedKey(format!("'{s}': empty username")));
        }

        Ok(UserKey::new(identity_type, *username, *domain))
    }
}

impl Serialize for UserKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UserKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        email_style = { "federatedID,test_user@email.com," },
        with_domain = { "federatedID,test_user,email.com" },
        enterprise = { "enterpriseID,jdoe,example.org" },
        adobe = { "adobeID,someone@example.com," },
    )]
    fn test_user_key_roundtrip(raw: &str) {
        let key: UserKey = raw.parse().unwrap();
        assert_eq!(key.to_string(), raw);
    }

    #[test]
    fn test_parse_parts() {
        let key: UserKey = "federatedID,test_user@email.com,".parse().unwrap();
        assert_eq!(key.identity_type(), IdentityType::Federated);
        assert_eq!(key.username(), "test_user@email.com");
        assert_eq!(key.domain(), "");

        let key: UserKey = "federatedID,test_user,email.com".parse().unwrap();
        assert_eq!(key.username(), "test_user");
        assert_eq!(key.domain(), "email.com");
    }

    #[parameterized(
        one_part = { "federatedID" },
        two_parts = { "federatedID,user@example.com" },
        unknown_type = { "googleID,user@example.com," },
        empty_username = { "federatedID,,example.com" },
        upper_case_type = { "FEDERATEDID,a@x.com," },
        lower_case_type = { "enterpriseid,jdoe,example.org" },
    )]
    fn test_malformed_keys(raw: &str) {
        assert!(matches!(
            raw.parse::<UserKey>(),
            Err(SyncError::MalformedKey(_))
        ));
    }

    #[parameterized(
        email_only = { None, None, Some(" Jane.Doe@Example.com "), Some("federatedID,jane.doe@example.com,") },
        username_with_domain = { Some("JDoe"), Some("Example.COM"), None, Some("federatedID,jdoe,example.com") },
        email_username_drops_domain = { Some("jdoe@example.com"), Some("example.com"), None, Some("federatedID,jdoe@example.com,") },
        username_without_domain = { Some("jdoe"), None, None, None },
        nothing = { None, None, None, None },
        blank_username_falls_back = { Some("  "), None, Some("a@b.c"), Some("federatedID,a@b.c,") },
    )]
    fn test_from_directory(
        username: Option<&str>,
        domain: Option<&str>,
        email: Option<&str>,
        expected: Option<&str>,
    ) {
        let key = UserKey::from_directory(IdentityType::Federated, username, domain, email);
        assert_eq!(key.map(|k| k.to_string()).as_deref(), expected);
    }

    #[test]
    fn test_equality_is_by_value() {
        let a = UserKey::new(IdentityType::Enterprise, "jdoe", "example.com");
        let b: UserKey = "enterpriseID,jdoe,example.com".parse().unwrap();
        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_serde_as_string() {
        let key = UserKey::new(IdentityType::Federated, "jane@example.com", "");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"federatedID,jane@example.com,\"");
        let back: UserKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
