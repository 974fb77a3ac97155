use crate::directory::{GroupFilter, RosterRecord, UserFilter};
use crate::error::{SyncError, TargetError};
use crate::hook::HookScope;
use crate::types::{Operation, TargetUser, UserKey};

/// Client for one identity-management target.
///
/// Transport, authentication and rate limiting live behind this trait; the
/// engine only sees records and per-call success or failure.
pub trait TargetConnector: Send + Sync {
    /// Enumerate every account currently on the target.
    fn list_users(&self) -> Result<Vec<TargetUser>, TargetError>;

    /// Fetch one account, `None` when it does not exist.
    fn get_user(&self, key: &UserKey) -> Result<Option<TargetUser>, TargetError>;

    /// Apply one operation to one account.
    fn submit(&self, key: &UserKey, operation: &Operation) -> Result<(), TargetError>;
}

/// Customization invoked around the mapping of every directory user.
///
/// `before_user` runs ahead of group and attribute resolution and may rewrite
/// `source_attributes` / `source_groups`. `after_user` runs once the target
/// attributes and groups are known and may rewrite `target_attributes` /
/// `target_groups`. The engine re-reads the scope after each call.
///
/// An error from either call aborts the run.
pub trait AfterMappingHook: Send {
    fn before_user(&mut self, _scope: &mut HookScope) -> Result<(), SyncError> {
        Ok(())
    }

    fn after_user(&mut self, scope: &mut HookScope) -> Result<(), SyncError>;
}

impl<F> AfterMappingHook for F
where
    F: FnMut(&mut HookScope) -> Result<(), SyncError> + Send,
{
    fn after_user(&mut self, scope: &mut HookScope) -> Result<(), SyncError> {
        self(scope)
    }
}

/// Query side of a roster service.
///
/// Returns the raw records of `user_filter` members of the named class, course
/// or school. Paging and authentication are the implementation's concern.
pub trait RosterSource {
    fn users_for(
        &self,
        group_filter: GroupFilter,
        group_name: &str,
        user_filter: UserFilter,
    ) -> Result<Vec<RosterRecord>, SyncError>;
}
