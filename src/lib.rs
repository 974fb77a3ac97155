// src/lib.rs
pub use config::{AdditionalGroupConfig, GroupMappingConfig, RuleConfig, RuleOptions};
pub use connectors::UmapiConnectors;
pub use diff::diff;
pub use directory::{
    GroupFilter, RecordHandler, RosterOptions, RosterRecord, UserFilter, load_users_and_groups,
    parse_group_specs,
};
pub use engine::{RuleProcessor, RunPhase};
pub use error::{SyncError, TargetError};
pub use hook::{HookLogger, HookScope};
pub use loader::{load_stray_list, read_stray_list, save_stray_list, write_stray_list};
pub use mapping::GroupMapper;
pub use stray::{DeletionAction, MaxStrays, StrayActions, StrayKeyMap, StrayRecord};
pub use target_info::UmapiTargetInfo;
pub use traits::{AfterMappingHook, RosterSource, TargetConnector};
pub use types::*;

mod config;
mod connectors;
mod diff;
mod directory;
mod engine;
mod error;
mod hook;
mod loader;
mod mapping;
mod stray;
mod target_info;
#[cfg(test)]
mod testing;
mod timers;
mod traits;
mod types;
