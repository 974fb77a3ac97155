//! The reconciliation pass.
//!
//! A [`RuleProcessor`] owns all desired state for one run: the group registry,
//! one [`UmapiTargetInfo`] per target and the stray map. It maps every directory
//! user to its desired groups, brings each target account in line, then applies
//! the stray policy to whatever the directory did not claim.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use strum_macros::Display;
use tracing::{debug, error, info, warn};

use crate::config::{RuleConfig, RuleOptions};
use crate::connectors::UmapiConnectors;
use crate::diff::diff;
use crate::error::SyncError;
use crate::hook::HookScope;
use crate::loader;
use crate::stray::{StrayKeyMap, StrayRecord, contains_group};
use crate::target_info::UmapiTargetInfo;
use crate::timers::{PhaseTimer, PhaseTimings};
use crate::traits::AfterMappingHook;
use crate::types::{
    DirectoryUser, GroupRegistry, IdentityType, Operation, OperationKind, RunReport, TargetId,
    TargetUser, UserAttributes, UserKey,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum RunPhase {
    Init,
    Mapping,
    Diffing,
    Hooking,
    Submitting,
    StrayDisposition,
    Done,
}

/// A directory user after mapping. Its desired groups live in the target infos.
#[derive(Debug, Clone)]
struct MappedUser {
    key: UserKey,
    attributes: UserAttributes,
}

/// What a target currently holds for a key.
enum Current {
    Missing,
    Found(TargetUser),
    Excluded,
}

#[derive(Clone, Copy)]
enum HookPoint {
    BeforeUser,
    AfterUser,
}

/// Drives one reconciliation run. A processor runs once; build a new one per run.
pub struct RuleProcessor {
    config: RuleConfig,
    registry: GroupRegistry,
    target_infos: BTreeMap<TargetId, UmapiTargetInfo>,
    stray_keys: StrayKeyMap,
    hook: Option<Box<dyn AfterMappingHook>>,
    scope: HookScope,
    target_users: BTreeMap<TargetId, HashMap<UserKey, TargetUser>>,
    excluded: BTreeMap<TargetId, HashSet<UserKey>>,
    shutdown: Arc<AtomicBool>,
    phase: RunPhase,
}

impl RuleProcessor {
    pub fn new(options: RuleOptions) -> Result<Self, SyncError> {
        Ok(Self::with_config(options.compile()?))
    }

    pub fn with_config(config: RuleConfig) -> Self {
        RuleProcessor {
            config,
            registry: GroupRegistry::new(),
            target_infos: BTreeMap::new(),
            stray_keys: StrayKeyMap::new(),
            hook: None,
            scope: HookScope::new(),
            target_users: BTreeMap::new(),
            excluded: BTreeMap::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            phase: RunPhase::Init,
        }
    }

    pub fn with_hook(mut self, hook: impl AfterMappingHook + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Flag that stops the run between users when set from another thread.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn cancel(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    pub fn registry(&self) -> &GroupRegistry {
        &self.registry
    }

    pub fn target_info(&self, target: &TargetId) -> Option<&UmapiTargetInfo> {
        self.target_infos.get(target)
    }

    pub fn stray_keys(&self) -> &StrayKeyMap {
        &self.stray_keys
    }

    /// Reconcile every target in `connectors` against `directory_users`.
    ///
    /// Per-user and per-target failures land in the report; configuration-level
    /// failures abort the run with an error.
    pub fn run<I>(
        &mut self,
        directory_users: I,
        connectors: &UmapiConnectors,
    ) -> Result<RunReport, SyncError>
    where
        I: IntoIterator<Item = DirectoryUser>,
    {
        if self.phase != RunPhase::Init {
            return Err(SyncError::InvalidConfig(
                "a rule processor can only run once".to_string(),
            ));
        }

        let mut timings = PhaseTimings::default();
        let mut report = RunReport {
            test_mode: self.config.options().test_mode,
            ..Default::default()
        };

        info!(
            event = "Run",
            phase = "Start",
            targets = connectors.len(),
            test_mode = report.test_mode
        );
        let result = self.run_phases(directory_users, connectors, &mut report, &mut timings);
        self.set_phase(RunPhase::Done);
        report.phase_ms = timings.to_millis();

        if let Err(err) = result {
            error!(event = "Run", phase = "Aborted", error = %err);
            return Err(err);
        }

        info!(
            event = "Run",
            phase = "Done",
            read = report.directory_users_read,
            created = report.created,
            updated = report.updated,
            groups_changed = report.groups_changed,
            strays_removed = report.strays_removed,
            errors = report.errors.len(),
            cancelled = report.cancelled
        );
        Ok(report)
    }

    fn run_phases<I>(
        &mut self,
        directory_users: I,
        connectors: &UmapiConnectors,
        report: &mut RunReport,
        timings: &mut PhaseTimings,
    ) -> Result<(), SyncError>
    where
        I: IntoIterator<Item = DirectoryUser>,
    {
        {
            let _timer = PhaseTimer::new(timings, RunPhase::Init);
            self.prepare(connectors, report)?;
        }

        let mut mapped: Vec<MappedUser> = Vec::new();
        let mut seen: HashSet<UserKey> = HashSet::new();
        for user in directory_users {
            if self.check_cancelled(report) {
                break;
            }
            report.directory_users_read += 1;
            match self.map_user(user, connectors, timings) {
                Ok(Some(user)) => {
                    report.directory_users_selected += 1;
                    if seen.insert(user.key.clone()) {
                        mapped.push(user);
                    } else {
                        debug!(event = "User", phase = "Duplicate", user = %user.key);
                    }
                }
                Ok(None) => {}
                Err(err) => absorb(err, report)?,
            }
        }

        let targets: Vec<TargetId> = connectors.targets().cloned().collect();
        for user in &mapped {
            if self.check_cancelled(report) {
                break;
            }
            for target in &targets {
                if let Err(err) = self.sync_user(user, target, connectors, report, timings) {
                    absorb(err, report)?;
                }
            }
        }

        if report.cancelled {
            warn!(event = "Run", phase = "Cancelled", "skipping stray disposition");
            return Ok(());
        }

        let _timer = PhaseTimer::new(timings, RunPhase::StrayDisposition);
        self.dispose_strays(connectors, report)
    }

    fn set_phase(&mut self, phase: RunPhase) {
        if self.phase != phase {
            debug!(event = "Run", phase = %phase, from = %self.phase);
            self.phase = phase;
        }
    }

    fn check_cancelled(&self, report: &mut RunReport) -> bool {
        if !self.is_cancelled() {
            return false;
        }
        if !report.cancelled {
            warn!(event = "Run", phase = %self.phase, "cancellation requested");
        }
        report.cancelled = true;
        true
    }

    fn info_mut(&mut self, target: &TargetId) -> &mut UmapiTargetInfo {
        self.target_infos
            .entry(target.clone())
            .or_insert_with(|| UmapiTargetInfo::new(target.clone()))
    }

    /// Register mapped groups, read the targets and seed the stray map.
    fn prepare(
        &mut self,
        connectors: &UmapiConnectors,
        report: &mut RunReport,
    ) -> Result<(), SyncError> {
        self.set_phase(RunPhase::Init);

        for target in connectors.targets() {
            self.info_mut(target);
        }

        let specs: Vec<String> = self
            .config
            .mapper()
            .mapped_specs()
            .into_iter()
            .map(str::to_string)
            .collect();
        for spec in specs {
            let group = self.registry.create(&spec)?;
            connectors.ensure_registered(group.target())?;
            self.info_mut(group.target())
                .add_mapped_group(group.group_name());
        }

        if let Some(path) = self.config.options().stray_list_input_path.clone() {
            let records = loader::load_stray_list(&path)?;
            for target in records.iter().filter_map(|r| r.target.as_ref()) {
                connectors.ensure_registered(target)?;
            }
            self.stray_keys.read(&TargetId::Primary, records);
            return Ok(());
        }

        let targets: Vec<TargetId> = connectors.targets().cloned().collect();
        for target in targets {
            let mut kept = HashMap::new();
            let mut excluded = HashSet::new();
            for user in connectors.list_users(&target)? {
                if self.config.is_excluded(&user) {
                    debug!(event = "Target", phase = "Excluded", target = %target, user = %user.key);
                    excluded.insert(user.key);
                } else {
                    kept.insert(user.key.clone(), user);
                }
            }
            info!(
                event = "Target",
                phase = "Listed",
                target = %target,
                users = kept.len(),
                excluded = excluded.len()
            );
            report.target_users_excluded += excluded.len();
            self.stray_keys
                .read(&target, kept.values().map(StrayRecord::from));
            self.target_users.insert(target.clone(), kept);
            self.excluded.insert(target, excluded);
        }
        Ok(())
    }

    /// Resolve one directory user to its desired groups on every target.
    ///
    /// Returns `None` for users the username filter drops.
    fn map_user(
        &mut self,
        mut user: DirectoryUser,
        connectors: &UmapiConnectors,
        timings: &mut PhaseTimings,
    ) -> Result<Option<MappedUser>, SyncError> {
        self.set_phase(RunPhase::Mapping);
        let account_type = self.config.options().new_account_type;
        let mut key = user_key(&user, account_type)?;

        if !self.config.selects_username(key.username()) {
            debug!(event = "User", phase = "Filtered", user = %key);
            return Ok(None);
        }

        let mut source_groups = user.groups.clone();
        if self.hook.is_some() {
            let _timer = PhaseTimer::new(timings, RunPhase::Hooking);
            let mut source_attributes = user.source_attributes.clone();
            source_attributes.extend(user.known_attributes());
            self.scope
                .begin_user(&key, source_attributes, user.groups.clone());
            self.invoke_hook(HookPoint::BeforeUser)?;
            source_groups = self.scope.source_groups.clone();
            user.read_known_attributes(&self.scope.source_attributes)?;
            key = user_key(&user, account_type)?;
        }

        let mut target_groups = BTreeSet::new();
        for resolved in self.config.mapper().resolve(&source_groups) {
            let group = self.registry.create(&resolved.spec)?;
            connectors.ensure_registered(group.target())?;
            if let Some(source) = &resolved.additional_source {
                let info = self.info_mut(group.target());
                info.add_additional_group(source, group.group_name());
                info.add_mapped_group(group.group_name());
            }
            target_groups.insert(group.qualified_name());
        }

        let mut attributes = user.attributes();
        if self.hook.is_some() {
            let _timer = PhaseTimer::new(timings, RunPhase::Hooking);
            self.set_phase(RunPhase::Hooking);
            self.scope.target_attributes = attributes;
            self.scope.target_groups = target_groups;
            self.invoke_hook(HookPoint::AfterUser)?;
            attributes = self.scope.target_attributes.clone();
            target_groups = self.scope.target_groups.clone();
        }

        for spec in &target_groups {
            let group = self.registry.create(spec)?;
            connectors.ensure_registered(group.target())?;
            let info = self.info_mut(group.target());
            info.add_mapped_group(group.group_name());
            info.add_desired_group_for(&key, group.group_name());
        }

        debug!(
            event = "User",
            phase = "Mapped",
            user = %key,
            groups = target_groups.len()
        );
        Ok(Some(MappedUser { key, attributes }))
    }

    fn invoke_hook(&mut self, point: HookPoint) -> Result<(), SyncError> {
        let Some(hook) = self.hook.as_mut() else {
            return Ok(());
        };
        let (entry, exit) = match point {
            HookPoint::BeforeUser => ("before_user/entry", "before_user/exit"),
            HookPoint::AfterUser => ("after_user/entry", "after_user/exit"),
        };
        self.scope.log(entry);
        let result = match point {
            HookPoint::BeforeUser => hook.before_user(&mut self.scope),
            HookPoint::AfterUser => hook.after_user(&mut self.scope),
        };
        self.scope.log(exit);
        result.map_err(|err| match err {
            SyncError::HookError(_) => err,
            other => SyncError::HookError(other.to_string()),
        })
    }

    /// Bring `user`'s account on `target` in line with its desired state.
    ///
    /// The user is claimed on every target. A missing account is only created
    /// on the primary and on secondaries where the user has desired groups.
    fn sync_user(
        &mut self,
        user: &MappedUser,
        target: &TargetId,
        connectors: &UmapiConnectors,
        report: &mut RunReport,
        timings: &mut PhaseTimings,
    ) -> Result<(), SyncError> {
        if self
            .excluded
            .get(target)
            .is_some_and(|keys| keys.contains(&user.key))
        {
            debug!(event = "User", phase = "Excluded", user = %user.key, target = %target);
            return Ok(());
        }

        self.set_phase(RunPhase::Diffing);
        self.stray_keys.mark_present(target, &user.key);
        let operations = {
            let _timer = PhaseTimer::new(timings, RunPhase::Diffing);
            match self.current_user(target, &user.key, connectors)? {
                Current::Excluded => {
                    report.target_users_excluded += 1;
                    return Ok(());
                }
                Current::Missing if !self.creates_on(target, &user.key) => {
                    debug!(event = "User", phase = "NotOnTarget", user = %user.key, target = %target);
                    return Ok(());
                }
                Current::Missing => self.plan(user, target, None),
                Current::Found(current) => self.plan(user, target, Some(&current)),
            }
        };
        if operations.is_empty() {
            debug!(event = "User", phase = "InSync", user = %user.key, target = %target);
            return Ok(());
        }

        self.set_phase(RunPhase::Submitting);
        let _timer = PhaseTimer::new(timings, RunPhase::Submitting);
        let test_mode = self.config.options().test_mode;
        let mut groups_changed = false;
        let mut result = Ok(());
        for operation in &operations {
            if let Err(err) = apply(connectors, test_mode, target, &user.key, operation) {
                result = Err(err);
                break;
            }
            match operation.kind() {
                OperationKind::Create => report.created += 1,
                OperationKind::UpdateAttributes => report.updated += 1,
                OperationKind::AddGroups | OperationKind::RemoveGroups => groups_changed = true,
                _ => {}
            }
        }
        if groups_changed {
            report.groups_changed += 1;
        }
        result
    }

    fn creates_on(&self, target: &TargetId, key: &UserKey) -> bool {
        target.is_primary()
            || self
                .target_infos
                .get(target)
                .is_some_and(|info| info.has_desired_groups(key))
    }

    fn current_user(
        &self,
        target: &TargetId,
        key: &UserKey,
        connectors: &UmapiConnectors,
    ) -> Result<Current, SyncError> {
        if let Some(users) = self.target_users.get(target) {
            return Ok(users
                .get(key)
                .cloned()
                .map_or(Current::Missing, Current::Found));
        }
        match connectors.get_user(target, key)? {
            None => Ok(Current::Missing),
            Some(user) if self.config.is_excluded(&user) => {
                debug!(event = "Target", phase = "Excluded", target = %target, user = %key);
                Ok(Current::Excluded)
            }
            Some(user) => Ok(Current::Found(user)),
        }
    }

    /// Operations for one user on one target, in submission order.
    fn plan(
        &self,
        user: &MappedUser,
        target: &TargetId,
        current: Option<&TargetUser>,
    ) -> Vec<Operation> {
        let options = self.config.options();
        let info = self.target_infos.get(target);
        let desired = info
            .map(|info| info.get_desired_groups(&user.key))
            .unwrap_or_default();

        let Some(current) = current else {
            let mut attributes = user.attributes.clone();
            if attributes.country.is_none() {
                attributes.country = options.default_country_code.clone();
            }
            let groups = if options.process_groups {
                desired
            } else {
                BTreeSet::new()
            };
            return vec![Operation::Create { attributes, groups }];
        };

        let mut operations = Vec::new();
        if options.update_user_info {
            let changes = diff(&user.attributes, &current.attributes);
            if !changes.is_empty() {
                operations.push(Operation::UpdateAttributes(changes));
            }
        }
        if options.process_groups {
            let to_add: BTreeSet<String> = desired
                .iter()
                .filter(|g| !contains_group(&current.groups, g))
                .cloned()
                .collect();
            let to_remove: BTreeSet<String> = current
                .groups
                .iter()
                .filter(|g| info.is_some_and(|info| info.is_mapped(g)))
                .filter(|g| !contains_group(&desired, g))
                .cloned()
                .collect();
            if !to_add.is_empty() {
                operations.push(Operation::AddGroups(to_add));
            }
            if !to_remove.is_empty() {
                operations.push(Operation::RemoveGroups(to_remove));
            }
        }
        operations
    }

    /// Apply the stray policy on every seeded target, then persist what is left.
    fn dispose_strays(
        &mut self,
        connectors: &UmapiConnectors,
        report: &mut RunReport,
    ) -> Result<(), SyncError> {
        self.set_phase(RunPhase::StrayDisposition);
        let actions = *self.config.stray_actions();
        let limit = self.config.max_adobe_only_users();
        let test_mode = self.config.options().test_mode;

        let targets: Vec<TargetId> = self.stray_keys.targets().cloned().collect();
        for target in &targets {
            self.info_mut(target);
        }

        let mut undisposed: BTreeMap<TargetId, BTreeSet<UserKey>> = BTreeMap::new();
        for target in targets {
            if self.check_cancelled(report) {
                return Ok(());
            }
            let strays = self.stray_keys.remaining(&target);
            report.strays_found.insert(target.to_string(), strays.len());
            if strays.is_empty() {
                continue;
            }
            info!(event = "Strays", phase = "Found", target = %target, count = strays.len());

            if actions.is_empty() {
                undisposed.insert(target, strays);
                continue;
            }

            let population = self.stray_keys.seeded_count(&target);
            if limit.exceeded_by(strays.len(), population) {
                let err = SyncError::SafetyThresholdExceeded {
                    target: target.to_string(),
                    count: strays.len(),
                    limit: limit.to_string(),
                };
                error!(event = "Strays", phase = "Threshold", target = %target, error = %err);
                report.stray_thresholds_exceeded.push(target.to_string());
                report.record_error(&err);
                undisposed.insert(target, strays);
                continue;
            }

            let Some(info) = self.target_infos.get(&target) else {
                continue;
            };
            for key in strays {
                let operations = actions.operations_for(info, self.stray_keys.annotation(&target, &key));
                let mut disposed = !operations.is_empty();
                for operation in &operations {
                    if let Err(err) = apply(connectors, test_mode, &target, &key, operation) {
                        warn!(event = "Strays", phase = "Failed", target = %target, user = %key, error = %err);
                        report.record_error(&err);
                        disposed = false;
                        break;
                    }
                }
                if disposed {
                    report.strays_removed += 1;
                } else {
                    undisposed.entry(target.clone()).or_default().insert(key);
                }
            }
        }

        if let Some(path) = &self.config.options().stray_list_output_path {
            loader::save_stray_list(path, &undisposed)?;
        }
        Ok(())
    }
}

/// Submit `operation`, or only log it in test mode.
fn apply(
    connectors: &UmapiConnectors,
    test_mode: bool,
    target: &TargetId,
    key: &UserKey,
    operation: &Operation,
) -> Result<(), SyncError> {
    if test_mode {
        info!(event = "Operation", phase = "TestMode", target = %target, user = %key, operation = %operation);
        return Ok(());
    }
    connectors.submit(target, key, operation)?;
    info!(event = "Operation", phase = "Submitted", target = %target, user = %key, operation = %operation);
    Ok(())
}

/// Record a per-user or per-target error, or hand back a fatal one.
fn absorb(err: SyncError, report: &mut RunReport) -> Result<(), SyncError> {
    if err.is_fatal() {
        return Err(err);
    }
    warn!(event = "Run", phase = "Error", kind = %err.kind(), error = %err);
    report.record_error(&err);
    Ok(())
}

fn user_key(user: &DirectoryUser, account_type: IdentityType) -> Result<UserKey, SyncError> {
    user.user_key(account_type)
        .ok_or_else(|| SyncError::AttributeFormatError {
            user: describe(user),
            message: "record has neither a usable username nor an email".to_string(),
        })
}

fn describe(user: &DirectoryUser) -> String {
    user.email
        .as_deref()
        .or(user.username.as_deref())
        .unwrap_or("<unnamed>")
        .to_string()
}

#[cfg(test)]
mod tests;
