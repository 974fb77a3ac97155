//! Roster-backed directory source.
//!
//! Roster services organize people into classes, courses and schools, and
//! each query returns students, teachers or everyone. A directory group
//! specification names both halves: `classes::Art I - Fall::teachers`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing::{debug, info};

use crate::error::SyncError;
use crate::traits::RosterSource;
use crate::types::{AttrValue, DirectoryUser, GROUP_NAME_DELIMITER, IdentityType};

mod formatter;
mod roster;

pub use formatter::{ValueFormatter, get_attribute_value};
pub use roster::RecordHandler;

/// One raw user record as returned by the roster service.
pub type RosterRecord = BTreeMap<String, AttrValue>;

/// `group_filter → group name (lower-cased) → original spec → user_filter`.
pub type GroupSpecs = BTreeMap<GroupFilter, BTreeMap<String, BTreeMap<String, UserFilter>>>;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GroupFilter {
    Classes,
    Courses,
    Schools,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserFilter {
    Students,
    Teachers,
    Users,
}

fn default_key_identifier() -> String {
    "sourcedId".to_string()
}

fn default_email_format() -> Option<String> {
    Some("{email}".to_string())
}

fn default_given_name_format() -> Option<String> {
    Some("{givenName}".to_string())
}

fn default_surname_format() -> Option<String> {
    Some("{familyName}".to_string())
}

fn default_country_code_format() -> Option<String> {
    Some("{countryCode}".to_string())
}

fn default_group_filter() -> GroupFilter {
    GroupFilter::Classes
}

fn default_user_filter() -> UserFilter {
    UserFilter::Students
}

/// Options of the roster directory source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterOptions {
    /// Record attribute that identifies a user uniquely.
    #[serde(default = "default_key_identifier")]
    pub key_identifier: String,
    /// Country for users whose record yields none.
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub user_identity_type: Option<IdentityType>,
    #[serde(default = "default_email_format")]
    pub user_email_format: Option<String>,
    #[serde(default = "default_given_name_format")]
    pub user_given_name_format: Option<String>,
    #[serde(default = "default_surname_format")]
    pub user_surname_format: Option<String>,
    #[serde(default = "default_country_code_format")]
    pub user_country_code_format: Option<String>,
    #[serde(default)]
    pub user_username_format: Option<String>,
    #[serde(default)]
    pub user_domain_format: Option<String>,
    #[serde(default)]
    pub user_identity_type_format: Option<String>,
    #[serde(default = "default_group_filter")]
    pub default_group_filter: GroupFilter,
    #[serde(default = "default_user_filter")]
    pub default_user_filter: UserFilter,
    /// Attribute → required value; users not matching every entry are dropped.
    #[serde(default)]
    pub include_only: BTreeMap<String, String>,
    /// Stop admitting users past this many; 0 means no limit.
    #[serde(default)]
    pub max_user_count: usize,
}

impl Default for RosterOptions {
    fn default() -> Self {
        RosterOptions {
            key_identifier: default_key_identifier(),
            country_code: None,
            user_identity_type: None,
            user_email_format: default_email_format(),
            user_given_name_format: default_given_name_format(),
            user_surname_format: default_surname_format(),
            user_country_code_format: default_country_code_format(),
            user_username_format: None,
            user_domain_format: None,
            user_identity_type_format: None,
            default_group_filter: default_group_filter(),
            default_user_filter: default_user_filter(),
            include_only: BTreeMap::new(),
            max_user_count: 0,
        }
    }
}

/// Parse roster group specifications.
///
/// Each spec is `group_filter::group_name::user_filter` (case-insensitive) or a
/// bare group name, which uses the default filters.
pub fn parse_group_specs<I, S>(
    specs: I,
    default_group: GroupFilter,
    default_user: UserFilter,
) -> Result<GroupSpecs, SyncError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parsed = GroupSpecs::new();
    for spec in specs {
        let text = spec.as_ref();
        let lowered = text.to_lowercase();
        let parts: Vec<&str> = lowered.split(GROUP_NAME_DELIMITER).collect();
        let (group_filter, group_name, user_filter) = match parts.as_slice() {
            [name] => (default_group, name.to_string(), default_user),
            [group_filter, name, user_filter] => {
                let group_filter = group_filter.parse::<GroupFilter>().map_err(|_| {
                    SyncError::MalformedGroupSpec(format!(
                        "'{text}': group filter must be one of classes, courses or schools"
                    ))
                })?;
                let user_filter = user_filter.parse::<UserFilter>().map_err(|_| {
                    SyncError::MalformedGroupSpec(format!(
                        "'{text}': user filter must be one of students, teachers or users"
                    ))
                })?;
                (group_filter, name.to_string(), user_filter)
            }
            _ => {
                return Err(SyncError::MalformedGroupSpec(format!(
                    "'{text}' (expected group_filter::group_name::user_filter)"
                )));
            }
        };
        parsed
            .entry(group_filter)
            .or_default()
            .entry(group_name)
            .or_default()
            .insert(text.to_string(), user_filter);
    }
    Ok(parsed)
}

/// Query `source` for every spec and merge the results into one user per id.
///
/// Each user carries the original specs that found it as its groups. Once
/// `options.max_user_count` users are admitted, further new users are ignored.
pub fn load_users_and_groups<S, I, G>(
    source: &S,
    options: &RosterOptions,
    specs: I,
    extended_attributes: &[String],
) -> Result<Vec<DirectoryUser>, SyncError>
where
    S: RosterSource + ?Sized,
    I: IntoIterator<Item = G>,
    G: AsRef<str>,
{
    let specs = parse_group_specs(specs, options.default_group_filter, options.default_user_filter)?;
    let handler = RecordHandler::new(options);
    let mut users: BTreeMap<String, DirectoryUser> = BTreeMap::new();

    for (group_filter, names) in &specs {
        for (group_name, queries) in names {
            for (spec, user_filter) in queries {
                let records = source.users_for(*group_filter, group_name, *user_filter)?;
                debug!(
                    event = "Roster",
                    phase = "Query",
                    group_filter = %group_filter,
                    group = %group_name,
                    user_filter = %user_filter,
                    records = records.len()
                );
                for (id, user) in handler.parse_results(&records, extended_attributes) {
                    let limit_reached =
                        options.max_user_count > 0 && users.len() >= options.max_user_count;
                    if !users.contains_key(&id) && limit_reached {
                        continue;
                    }
                    users
                        .entry(id)
                        .or_insert(user)
                        .groups
                        .insert(spec.clone());
                }
            }
        }
    }

    info!(event = "Roster", phase = "Loaded", users = users.len());
    Ok(users.into_values().collect())
}
