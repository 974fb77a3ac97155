//! Turns raw roster records into directory users.

use std::collections::BTreeMap;

use tracing::warn;

use crate::error::SyncError;
use crate::types::{AttrValue, DirectoryUser, IdentityType};

use super::formatter::{ValueFormatter, describe_record, get_attribute_value, plain};
use super::{RosterOptions, RosterRecord};

const STATUS_ATTRIBUTE: &str = "status";
const ACTIVE_STATUS: &str = "active";

#[derive(Debug, Clone)]
pub struct RecordHandler {
    key_identifier: String,
    country_code: Option<String>,
    identity_type: Option<IdentityType>,
    include_only: BTreeMap<String, String>,
    email: ValueFormatter,
    username: ValueFormatter,
    domain: ValueFormatter,
    given_name: ValueFormatter,
    surname: ValueFormatter,
    country: ValueFormatter,
    identity_type_format: ValueFormatter,
}

impl RecordHandler {
    pub fn new(options: &RosterOptions) -> Self {
        RecordHandler {
            key_identifier: options.key_identifier.clone(),
            country_code: options.country_code.clone(),
            identity_type: options.user_identity_type,
            include_only: options.include_only.clone(),
            email: ValueFormatter::new(options.user_email_format.as_deref()),
            username: ValueFormatter::new(options.user_username_format.as_deref()),
            domain: ValueFormatter::new(options.user_domain_format.as_deref()),
            given_name: ValueFormatter::new(options.user_given_name_format.as_deref()),
            surname: ValueFormatter::new(options.user_surname_format.as_deref()),
            country: ValueFormatter::new(options.user_country_code_format.as_deref()),
            identity_type_format: ValueFormatter::new(options.user_identity_type_format.as_deref()),
        }
    }

    fn key_of(&self, record: &RosterRecord) -> Option<String> {
        record
            .get(&self.key_identifier)
            .filter(|v| !v.is_empty())
            .map(plain)
    }

    /// True when the record fails any `include_only` condition.
    ///
    /// Values compare case-insensitively. A record without the filtering
    /// attribute is excluded.
    pub fn exclude_user(&self, record: &RosterRecord) -> bool {
        self.include_only.iter().any(|(attribute, wanted)| {
            match record.get(attribute).filter(|v| !v.is_empty()) {
                Some(value) => plain(value).to_lowercase() != wanted.to_lowercase(),
                None => {
                    warn!(
                        event = "Roster",
                        phase = "Filter",
                        "No key for filtering attribute {} for user {}",
                        attribute,
                        self.key_of(record).unwrap_or_default()
                    );
                    true
                }
            }
        })
    }

    /// Active, included records keyed by their key identifier.
    ///
    /// A record that cannot be turned into a user is logged and skipped.
    pub fn parse_results(
        &self,
        records: &[RosterRecord],
        extended_attributes: &[String],
    ) -> BTreeMap<String, DirectoryUser> {
        let mut users = BTreeMap::new();
        for record in records {
            let active = record
                .get(STATUS_ATTRIBUTE)
                .and_then(AttrValue::as_str)
                .is_some_and(|s| s.eq_ignore_ascii_case(ACTIVE_STATUS));
            if !active || self.exclude_user(record) {
                continue;
            }
            let Some(id) = self.key_of(record) else {
                warn!(
                    event = "Roster",
                    phase = "Parse",
                    user = %describe_record(record),
                    "Skipping record without key attribute {}",
                    self.key_identifier
                );
                continue;
            };
            match self.create_user(record, extended_attributes) {
                Ok(Some(user)) => {
                    users.insert(id, user);
                }
                Ok(None) => {}
                Err(e) => warn!(event = "Roster", phase = "Parse", user = %id, error = %e),
            }
        }
        users
    }

    /// Build a directory user from one record, `None` when it has no email.
    pub fn create_user(
        &self,
        record: &RosterRecord,
        extended_attributes: &[String],
    ) -> Result<Option<DirectoryUser>, SyncError> {
        let (email, last_attribute) = self.email.generate_value(record)?;
        let email = email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty());
        let Some(email) = email else {
            if let Some(attribute) = last_attribute {
                warn!(
                    event = "Roster",
                    phase = "Parse",
                    "Skipping user with id {}: empty email attribute ({})",
                    self.key_of(record).unwrap_or_default(),
                    attribute
                );
            }
            return Ok(None);
        };

        let username = self.username.generate_value(record)?.0.unwrap_or_else(|| email.clone());
        let domain = match self.domain.generate_value(record)?.0 {
            Some(domain) => Some(domain),
            None => email.split_once('@').map(|(_, d)| d.to_string()),
        };
        let country = self
            .country
            .generate_value(record)?
            .0
            .or_else(|| self.country_code.clone());
        let identity_type = match self.identity_type_format.generate_value(record)?.0 {
            Some(text) => Some(text.parse::<IdentityType>().map_err(|_| {
                SyncError::AttributeFormatError {
                    user: email.clone(),
                    message: format!("invalid identity type '{text}'"),
                }
            })?),
            None => self.identity_type,
        };

        let mut source_attributes = BTreeMap::new();
        let formatted = [
            &self.email,
            &self.username,
            &self.domain,
            &self.given_name,
            &self.surname,
            &self.country,
            &self.identity_type_format,
        ];
        for name in formatted.iter().flat_map(|f| f.attribute_names()) {
            if let Some(value) = get_attribute_value(record, name, false)? {
                source_attributes.insert(name.clone(), value);
            }
        }
        for name in extended_attributes {
            let value = get_attribute_value(record, name, false)?.unwrap_or(AttrValue::Null);
            source_attributes.insert(name.clone(), value);
        }
        if let Some(key) = record.get(&self.key_identifier) {
            source_attributes.insert(self.key_identifier.clone(), key.clone());
        }

        Ok(Some(DirectoryUser {
            identity_type,
            username: Some(username),
            domain,
            email: Some(email),
            firstname: self.given_name.generate_value(record)?.0,
            lastname: self.surname.generate_value(record)?.0,
            country,
            groups: Default::default(),
            source_attributes,
        }))
    }
}
