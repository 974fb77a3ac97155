//! Data model shared by the engine and its collaborators.
//!
//! Canonical string forms:
//! - UserKey: `identity_type,username,domain`, e.g. `federatedID,jane@example.com,`
//! - AdobeGroup: `group_name` (primary target) or `group_name::target_name`
//! - TargetId: `primary` or the secondary target's name

mod attr_value;
mod attributes;
mod group;
mod identity_type;
mod operation;
mod report;
mod target;
mod user;
mod user_key;

pub use attr_value::AttrValue;
pub use attributes::{AttributeChanges, SyncField, UserAttributes};
pub use group::{AdobeGroup, GROUP_NAME_DELIMITER, GroupRegistry};
pub use identity_type::IdentityType;
pub use operation::{Operation, OperationKind};
pub use report::{ErrorRecord, RunReport};
pub use target::TargetId;
pub use user::{DirectoryUser, TargetUser};
pub use user_key::UserKey;
