//! Routing of target-qualified calls to the right connector.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{SyncError, TargetError};
use crate::traits::TargetConnector;
use crate::types::{Operation, TargetId, TargetUser, UserKey};

/// One connector per target; the primary is mandatory.
pub struct UmapiConnectors {
    connectors: BTreeMap<TargetId, Box<dyn TargetConnector>>,
}

impl UmapiConnectors {
    pub fn new(primary: impl TargetConnector + 'static) -> Self {
        let mut connectors: BTreeMap<TargetId, Box<dyn TargetConnector>> = BTreeMap::new();
        connectors.insert(TargetId::Primary, Box::new(primary));
        UmapiConnectors { connectors }
    }

    /// Register a secondary target. Registering the same name twice replaces it.
    pub fn add_secondary(
        &mut self,
        name: impl Into<String>,
        connector: impl TargetConnector + 'static,
    ) -> Result<(), SyncError> {
        let name: String = name.into();
        let target = TargetId::from_name(Some(name.as_str()));
        if target.is_primary() {
            return Err(SyncError::InvalidConfig(
                "secondary target name must not be empty".to_string(),
            ));
        }
        debug!(event = "Connectors", phase = "Register", target = %target);
        self.connectors.insert(target, Box::new(connector));
        Ok(())
    }

    pub fn with_secondary(
        mut self,
        name: impl Into<String>,
        connector: impl TargetConnector + 'static,
    ) -> Result<Self, SyncError> {
        self.add_secondary(name, connector)?;
        Ok(self)
    }

    pub fn get(&self, target: &TargetId) -> Result<&dyn TargetConnector, SyncError> {
        self.connectors
            .get(target)
            .map(|c| c.as_ref())
            .ok_or_else(|| SyncError::UnknownTarget(target.to_string()))
    }

    pub fn contains(&self, target: &TargetId) -> bool {
        self.connectors.contains_key(target)
    }

    /// Fail with `UnknownTarget` unless `target` has a connector.
    pub fn ensure_registered(&self, target: &TargetId) -> Result<(), SyncError> {
        self.get(target).map(|_| ())
    }

    /// Registered targets, primary first.
    pub fn targets(&self) -> impl Iterator<Item = &TargetId> {
        self.connectors.keys()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    pub fn list_users(&self, target: &TargetId) -> Result<Vec<TargetUser>, SyncError> {
        self.get(target)?
            .list_users()
            .map_err(|e| unavailable(target, e))
    }

    pub fn get_user(
        &self,
        target: &TargetId,
        key: &UserKey,
    ) -> Result<Option<TargetUser>, SyncError> {
        self.get(target)?
            .get_user(key)
            .map_err(|e| SyncError::SubmissionError {
                target: target.to_string(),
                user: key.to_string(),
                operation: "GetUser".to_string(),
                message: e.to_string(),
            })
    }

    pub fn submit(
        &self,
        target: &TargetId,
        key: &UserKey,
        operation: &Operation,
    ) -> Result<(), SyncError> {
        self.get(target)?
            .submit(key, operation)
            .map_err(|e| SyncError::SubmissionError {
                target: target.to_string(),
                user: key.to_string(),
                operation: operation.kind().to_string(),
                message: e.to_string(),
            })
    }
}

fn unavailable(target: &TargetId, err: TargetError) -> SyncError {
    SyncError::TargetUnavailable {
        target: target.to_string(),
        message: err.to_string(),
    }
}
