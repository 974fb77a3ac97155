//! In-memory target used by the unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::error::TargetError;
use crate::traits::TargetConnector;
use crate::types::{Operation, TargetUser, UserKey};

#[derive(Default)]
struct State {
    users: BTreeMap<UserKey, TargetUser>,
    submitted: Vec<(UserKey, Operation)>,
    failures: HashMap<UserKey, String>,
    listing_failure: Option<String>,
    get_user_calls: usize,
    list_calls: usize,
}

/// A target that records every submission and applies it to its own user table.
#[derive(Clone, Default)]
pub(crate) struct RecordingConnector {
    state: Arc<Mutex<State>>,
}

impl RecordingConnector {
    pub(crate) fn with_users(users: impl IntoIterator<Item = TargetUser>) -> Self {
        let connector = RecordingConnector::default();
        {
            let mut state = connector.state.lock().unwrap();
            for user in users {
                state.users.insert(user.key.clone(), user);
            }
        }
        connector
    }

    pub(crate) fn submitted(&self) -> Vec<(UserKey, Operation)> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub(crate) fn submitted_for(&self, key: &UserKey) -> Vec<Operation> {
        self.submitted()
            .into_iter()
            .filter(|(k, _)| k == key)
            .map(|(_, op)| op)
            .collect()
    }

    pub(crate) fn user(&self, key: &UserKey) -> Option<TargetUser> {
        self.state.lock().unwrap().users.get(key).cloned()
    }

    pub(crate) fn fail_on(&self, key: &UserKey, message: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(key.clone(), message.to_string());
    }

    pub(crate) fn fail_listing(&self, message: &str) {
        self.state.lock().unwrap().listing_failure = Some(message.to_string());
    }

    pub(crate) fn get_user_calls(&self) -> usize {
        self.state.lock().unwrap().get_user_calls
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }
}

impl TargetConnector for RecordingConnector {
    fn list_users(&self) -> Result<Vec<TargetUser>, TargetError> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if let Some(message) = &state.listing_failure {
            return Err(TargetError::Unavailable(message.clone()));
        }
        Ok(state.users.values().cloned().collect())
    }

    fn get_user(&self, key: &UserKey) -> Result<Option<TargetUser>, TargetError> {
        let mut state = self.state.lock().unwrap();
        state.get_user_calls += 1;
        Ok(state.users.get(key).cloned())
    }

    fn submit(&self, key: &UserKey, operation: &Operation) -> Result<(), TargetError> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.failures.get(key) {
            return Err(TargetError::Rejected(message.clone()));
        }
        state.submitted.push((key.clone(), operation.clone()));

        match operation {
            Operation::Create { attributes, groups } => {
                let user = TargetUser::new(key.clone())
                    .with_attributes(attributes.clone())
                    .with_groups(groups.iter().cloned());
                state.users.insert(key.clone(), user);
            }
            Operation::UpdateAttributes(changes) => {
                if let Some(user) = state.users.get_mut(key) {
                    for (field, value) in changes {
                        user.attributes.set(*field, Some(value.clone()));
                    }
                }
            }
            Operation::AddGroups(groups) => {
                if let Some(user) = state.users.get_mut(key) {
                    user.groups.extend(groups.iter().cloned());
                }
            }
            Operation::RemoveGroups(groups) => {
                if let Some(user) = state.users.get_mut(key) {
                    user.groups.retain(|g| !groups.contains(g));
                }
            }
            Operation::Disentitle => {
                if let Some(user) = state.users.get_mut(key) {
                    user.groups.clear();
                }
            }
            Operation::RemoveFromOrg | Operation::Delete => {
                state.users.remove(key);
            }
        }
        Ok(())
    }
}
