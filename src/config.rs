//! Run configuration.
//!
//! [`RuleOptions`] is the user-facing, serde-loadable shape. [`RuleOptions::compile`]
//! validates it once and produces the immutable [`RuleConfig`] the engine runs on.

use std::collections::BTreeSet;
use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::mapping::GroupMapper;
use crate::stray::{MaxStrays, StrayActions};
use crate::target_info::normalize_group;
use crate::types::{IdentityType, TargetUser};

/// A directory group and the target groups its members should hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMappingConfig {
    pub directory_group: String,
    #[serde(default)]
    pub adobe_groups: Vec<String>,
}

/// Regex rule: `source` matches directory group names, `target` is the
/// replacement template producing a target group spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalGroupConfig {
    pub source: String,
    pub target: String,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOptions {
    #[serde(default)]
    pub groups: Vec<GroupMappingConfig>,
    #[serde(default)]
    pub additional_groups: Vec<AdditionalGroupConfig>,
    /// Identity type for directory records that do not carry one.
    #[serde(default)]
    pub new_account_type: IdentityType,
    /// Country used for new accounts whose record has none.
    #[serde(default)]
    pub default_country_code: Option<String>,
    #[serde(default = "default_true")]
    pub process_groups: bool,
    #[serde(default)]
    pub update_user_info: bool,
    /// Compute and log every operation without submitting any.
    #[serde(default)]
    pub test_mode: bool,
    /// Only directory users whose username matches are processed.
    #[serde(default)]
    pub username_filter_regex: Option<String>,
    #[serde(default)]
    pub exclude_identity_types: Vec<IdentityType>,
    /// Regexes matched against the full username of target accounts.
    #[serde(default)]
    pub exclude_users: Vec<String>,
    #[serde(default)]
    pub exclude_groups: Vec<String>,
    #[serde(default)]
    pub max_adobe_only_users: MaxStrays,
    #[serde(default)]
    pub adobe_only_user_action: Vec<String>,
    /// Seed strays from this file instead of enumerating the targets.
    #[serde(default)]
    pub stray_list_input_path: Option<PathBuf>,
    /// Write undisposed strays here at the end of the run.
    #[serde(default)]
    pub stray_list_output_path: Option<PathBuf>,
    #[serde(default)]
    pub extended_attributes: Vec<String>,
}

impl Default for RuleOptions {
    fn default() -> Self {
        RuleOptions {
            groups: Vec::new(),
            additional_groups: Vec::new(),
            new_account_type: IdentityType::default(),
            default_country_code: None,
            process_groups: true,
            update_user_info: false,
            test_mode: false,
            username_filter_regex: None,
            exclude_identity_types: Vec::new(),
            exclude_users: Vec::new(),
            exclude_groups: Vec::new(),
            max_adobe_only_users: MaxStrays::default(),
            adobe_only_user_action: Vec::new(),
            stray_list_input_path: None,
            stray_list_output_path: None,
            extended_attributes: Vec::new(),
        }
    }
}

impl RuleOptions {
    pub fn from_json_str(json: &str) -> Result<Self, SyncError> {
        serde_json::from_str(json).map_err(|e| SyncError::InvalidConfig(e.to_string()))
    }

    pub fn compile(self) -> Result<RuleConfig, SyncError> {
        let mapper = GroupMapper::new(&self.groups, &self.additional_groups)?;
        let username_filter = self
            .username_filter_regex
            .as_deref()
            .map(|re| compile_regex("username_filter_regex", re))
            .transpose()?;
        let exclude_users = self
            .exclude_users
            .iter()
            .map(|re| compile_regex("exclude_users", &format!("^(?:{re})$")))
            .collect::<Result<Vec<_>, _>>()?;
        let exclude_groups = self
            .exclude_groups
            .iter()
            .map(|g| normalize_group(g))
            .collect();
        let stray_actions = StrayActions::parse(&self.adobe_only_user_action)?;

        Ok(RuleConfig {
            options: self,
            mapper,
            username_filter,
            exclude_users,
            exclude_groups,
            stray_actions,
        })
    }
}

fn compile_regex(field: &str, pattern: &str) -> Result<Regex, SyncError> {
    Regex::new(pattern).map_err(|e| SyncError::InvalidConfig(format!("{field} '{pattern}': {e}")))
}

/// Validated configuration for one processor.
#[derive(Debug, Clone)]
pub struct RuleConfig {
    options: RuleOptions,
    mapper: GroupMapper,
    username_filter: Option<Regex>,
    exclude_users: Vec<Regex>,
    exclude_groups: BTreeSet<String>,
    stray_actions: StrayActions,
}

impl RuleConfig {
    pub fn options(&self) -> &RuleOptions {
        &self.options
    }

    pub fn mapper(&self) -> &GroupMapper {
        &self.mapper
    }

    pub fn stray_actions(&self) -> &StrayActions {
        &self.stray_actions
    }

    pub fn max_adobe_only_users(&self) -> MaxStrays {
        self.options.max_adobe_only_users
    }

    /// Whether a directory username passes `username_filter_regex`.
    pub fn selects_username(&self, username: &str) -> bool {
        self.username_filter
            .as_ref()
            .is_none_or(|re| re.is_match(username))
    }

    /// Target accounts the engine must leave alone entirely.
    pub fn is_excluded(&self, user: &TargetUser) -> bool {
        if self
            .options
            .exclude_identity_types
            .contains(&user.key.identity_type())
        {
            return true;
        }
        if self
            .exclude_users
            .iter()
            .any(|re| re.is_match(user.key.username()))
        {
            return true;
        }
        user.groups
            .iter()
            .any(|g| self.exclude_groups.contains(&normalize_group(g)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stray::DeletionAction;
    use crate::types::UserKey;

    #[test]
    fn test_defaults() {
        let options = RuleOptions::from_json_str("{}").unwrap();
        assert_eq!(options, RuleOptions::default());
        assert!(options.process_groups);
        assert!(!options.update_user_info);
        assert_eq!(options.max_adobe_only_users, MaxStrays::Count(200));
    }

    #[test]
    fn test_from_json() {
        let options = RuleOptions::from_json_str(
            r#"{
                "groups": [{"directory_group": "Staff", "adobe_groups": ["All Staff", "Designers::edu"]}],
                "additional_groups": [{"source": "^ACL-(.+)$", "target": "$1"}],
                "new_account_type": "enterpriseID",
                "max_adobe_only_users": "10%",
                "adobe_only_user_action": ["remove-adobe-groups", "delete"],
                "exclude_identity_types": ["adobeID"]
            }"#,
        )
        .unwrap();
        assert_eq!(options.new_account_type, IdentityType::Enterprise);
        assert_eq!(options.max_adobe_only_users, MaxStrays::Percent(10.0));

        let config = options.compile().unwrap();
        assert!(config.stray_actions().remove_adobe_groups);
        assert_eq!(config.stray_actions().deletion, Some(DeletionAction::Delete));
        assert_eq!(config.mapper().mapped_specs().len(), 2);
    }

    #[test]
    fn test_unknown_json_is_invalid_config() {
        assert!(matches!(
            RuleOptions::from_json_str(r#"{"max_adobe_only_users": "many"}"#),
            Err(SyncError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_conflicting_actions_fail_compile() {
        let options = RuleOptions {
            adobe_only_user_action: vec!["remove".to_string(), "delete".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            options.compile(),
            Err(SyncError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_username_filter() {
        let config = RuleOptions {
            username_filter_regex: Some("^b".to_string()),
            ..Default::default()
        }
        .compile()
        .unwrap();
        assert!(config.selects_username("billy.flores@x.com"));
        assert!(!config.selects_username("alice@x.com"));
        assert!(RuleOptions::default().compile().unwrap().selects_username("x"));
    }

    #[test]
    fn test_is_excluded() {
        let config = RuleOptions {
            exclude_identity_types: vec![IdentityType::Adobe],
            exclude_users: vec![".*@admin\\.x\\.com".to_string()],
            exclude_groups: vec!["Service Accounts".to_string()],
            ..Default::default()
        }
        .compile()
        .unwrap();

        let user = |t, name: &str| TargetUser::new(UserKey::new(t, name, ""));
        assert!(config.is_excluded(&user(IdentityType::Adobe, "a@x.com")));
        assert!(config.is_excluded(&user(IdentityType::Federated, "root@admin.x.com")));
        assert!(config.is_excluded(
            &user(IdentityType::Federated, "bot@x.com").with_groups(["service accounts"])
        ));
        assert!(!config.is_excluded(&user(IdentityType::Federated, "a@x.com")));
        assert!(!config.is_excluded(&user(IdentityType::Federated, "root@admin.x.com.evil")));
    }
}
