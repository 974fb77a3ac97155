//! The scope handed to an [`AfterMappingHook`](crate::AfterMappingHook).

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Formatter, Result as FmtResult};

use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::types::{AttrValue, UserAttributes, UserKey};

/// Longest rendering of one scope collection in the logs.
pub const SCOPE_LOG_WIDTH: usize = 120;

/// Logger bound to the user currently being mapped.
#[derive(Debug, Clone, Default)]
pub struct HookLogger {
    user: String,
}

impl HookLogger {
    fn for_user(user: &str) -> Self {
        HookLogger {
            user: user.to_string(),
        }
    }

    pub fn debug(&self, message: &str) {
        debug!(event = "Hook", user = %self.user, "{message}");
    }

    pub fn info(&self, message: &str) {
        info!(event = "Hook", user = %self.user, "{message}");
    }

    pub fn warn(&self, message: &str) {
        warn!(event = "Hook", user = %self.user, "{message}");
    }
}

/// Mutable per-user view shared with the hook.
///
/// Everything but `hook_storage` is reset before each user. The engine reads
/// the scope back after every hook call, so whatever the hook leaves in
/// `source_*` (before) or `target_*` (after) is what gets synced.
pub struct HookScope {
    /// Raw directory attributes plus the typed fields (`email`, `firstname`, ...),
    /// which are read back after `before_user`.
    pub source_attributes: BTreeMap<String, AttrValue>,
    pub source_groups: BTreeSet<String>,
    /// The full attribute payload for the user, before any diff against a target.
    pub target_attributes: UserAttributes,
    /// Qualified group specifications (`name` or `name::target`).
    pub target_groups: BTreeSet<String>,
    pub user_key: Option<UserKey>,
    pub logger: HookLogger,
    /// Free-form state that survives from one user to the next within a run.
    pub hook_storage: Option<Box<dyn Any + Send>>,
}

impl Default for HookScope {
    fn default() -> Self {
        HookScope {
            source_attributes: BTreeMap::new(),
            source_groups: BTreeSet::new(),
            target_attributes: UserAttributes::default(),
            target_groups: BTreeSet::new(),
            user_key: None,
            logger: HookLogger::default(),
            hook_storage: None,
        }
    }
}

impl Debug for HookScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("HookScope")
            .field("source_attributes", &self.source_attributes)
            .field("source_groups", &self.source_groups)
            .field("target_attributes", &self.target_attributes)
            .field("target_groups", &self.target_groups)
            .field("user_key", &self.user_key)
            .field("hook_storage", &self.hook_storage.is_some())
            .finish()
    }
}

impl HookScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start mapping a new user, keeping `hook_storage`.
    pub(crate) fn begin_user(
        &mut self,
        user_key: &UserKey,
        source_attributes: BTreeMap<String, AttrValue>,
        source_groups: BTreeSet<String>,
    ) {
        self.source_attributes = source_attributes;
        self.source_groups = source_groups;
        self.target_attributes = UserAttributes::default();
        self.target_groups = BTreeSet::new();
        self.logger = HookLogger::for_user(&user_key.to_string());
        self.user_key = Some(user_key.clone());
    }

    /// Typed access to `hook_storage`; `None` when empty or holding another type.
    pub fn storage_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.hook_storage
            .as_mut()
            .and_then(|storage| storage.downcast_mut::<T>())
    }

    pub fn set_storage<T: Any + Send>(&mut self, value: T) {
        self.hook_storage = Some(Box::new(value));
    }

    /// One line per collection, each clipped to [`SCOPE_LOG_WIDTH`].
    pub fn render(&self) -> Vec<(&'static str, String)> {
        let source_attributes = self
            .source_attributes
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .join(", ");
        vec![
            ("source_attributes", clip(&format!("{{{source_attributes}}}"))),
            ("source_groups", clip(&render_set(&self.source_groups))),
            ("target_attributes", clip(&self.target_attributes.to_string())),
            ("target_groups", clip(&render_set(&self.target_groups))),
        ]
    }

    pub(crate) fn log(&self, stage: &str) {
        let user = self
            .user_key
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        for (field, value) in self.render() {
            debug!(event = "Hook", phase = stage, user = %user, field, value = %value);
        }
    }
}

fn render_set(values: &BTreeSet<String>) -> String {
    format!("[{}]", values.iter().join(", "))
}

fn clip(line: &str) -> String {
    if line.chars().count() <= SCOPE_LOG_WIDTH {
        return line.to_string();
    }
    let mut clipped: String = line.chars().take(SCOPE_LOG_WIDTH - 3).collect();
    clipped.push_str("...");
    clipped
}
