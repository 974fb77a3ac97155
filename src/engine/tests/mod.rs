use super::*;
use crate::config::GroupMappingConfig;
use crate::testing::RecordingConnector;
use crate::types::{IdentityType, SyncField};


fn key(name: &str) -> UserKey {
    UserKey::new(IdentityType::Federated, format!("{name}@x.com"), "")
}

fn attributes(name: &str) -> UserAttributes {
    UserAttributes::default()
        .with(SyncField::Email, format!("{name}@x.com"))
        .with(SyncField::Firstname, name.to_uppercase())
        .with(SyncField::Lastname, "Flores")
        .with(SyncField::Country, "US")
}

fn directory_user(name: &str, groups: &[&str]) -> DirectoryUser {
    DirectoryUser {
        email: Some(format!("{name}@x.com")),
        firstname: Some(name.to_uppercase()),
        lastname: Some("Flores".to_string()),
        country: Some("US".to_string()),
        ..Default::default()
    }
    .with_groups(groups.iter().copied())
}

fn target_user(name: &str, groups: &[&str]) -> TargetUser {
    TargetUser::new(key(name))
        .with_attributes(attributes(name))
        .with_groups(groups.iter().copied())
}

fn options(mappings: &[(&str, &[&str])]) -> RuleOptions {
    RuleOptions {
        groups: mappings
            .iter()
            .map(|(directory_group, adobe_groups)| GroupMappingConfig {
                directory_group: directory_group.to_string(),
                adobe_groups: adobe_groups.iter().map(|g| g.to_string()).collect(),
            })
            .collect(),
        ..Default::default()
    }
}

fn staff_options() -> RuleOptions {
    options(&[("Staff", &["All Staff"]), ("Former", &["Old Group"])])
}

fn groups(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|g| g.to_string()).collect()
}

fn run(
    options: RuleOptions,
    users: Vec<DirectoryUser>,
    primary: &RecordingConnector,
) -> Result<RunReport, SyncError> {
    let connectors = UmapiConnectors::new(primary.clone());
    RuleProcessor::new(options)?.run(users, &connectors)
}

#[test]
fn test_creates_missing_user() {
    let primary = RecordingConnector::default();
    let report = run(
        staff_options(),
        vec![directory_user("billy", &["Staff"])],
        &primary,
    )
    .unwrap();

    assert_eq!(
        primary.submitted(),
        vec![(
            key("billy"),
            Operation::Create {
                attributes: attributes("billy"),
                groups: groups(&["All Staff"]),
            }
        )]
    );
    assert_eq!(report.created, 1);
    assert_eq!(report.directory_users_read, 1);
    assert_eq!(report.directory_users_selected, 1);
    assert_eq!(report.strays_found["primary"], 0);
}

#[test]
fn test_in_sync_user_submits_nothing() {
    let primary = RecordingConnector::with_users([target_user("billy", &["All Staff"])]);
    let report = run(
        RuleOptions {
            update_user_info: true,
            ..staff_options()
        },
        vec![directory_user("billy", &["Staff"])],
        &primary,
    )
    .unwrap();

    assert!(primary.submitted().is_empty());
    assert_eq!(report.created + report.updated + report.groups_changed, 0);
}

#[test]
fn test_group_membership_is_reconciled() {
    let primary = RecordingConnector::with_users([target_user(
        "billy",
        &["old group", "Unmanaged"],
    )]);
    let report = run(
        staff_options(),
        vec![directory_user("billy", &["staff"])],
        &primary,
    )
    .unwrap();

    assert_eq!(
        primary.submitted_for(&key("billy")),
        vec![
            Operation::AddGroups(groups(&["All Staff"])),
            Operation::RemoveGroups(groups(&["old group"])),
        ]
    );
    assert_eq!(report.groups_changed, 1);
    assert_eq!(
        primary.user(&key("billy")).unwrap().groups,
        groups(&["All Staff", "Unmanaged"])
    );
}

#[test]
fn test_process_groups_disabled() {
    let primary = RecordingConnector::with_users([target_user("billy", &["Old Group"])]);
    run(
        RuleOptions {
            process_groups: false,
            ..staff_options()
        },
        vec![directory_user("billy", &["Staff"])],
        &primary,
    )
    .unwrap();
    assert!(primary.submitted().is_empty());
}

#[test]
fn test_attributes_only_updated_when_enabled() {
    let mut stale = target_user("billy", &["All Staff"]);
    stale.attributes.lastname = Some("Smith".to_string());

    let primary = RecordingConnector::with_users([stale.clone()]);
    run(staff_options(), vec![directory_user("billy", &["Staff"])], &primary).unwrap();
    assert!(primary.submitted().is_empty());

    let primary = RecordingConnector::with_users([stale]);
    let report = run(
        RuleOptions {
            update_user_info: true,
            ..staff_options()
        },
        vec![directory_user("billy", &["Staff"])],
        &primary,
    )
    .unwrap();
    assert_eq!(
        primary.submitted_for(&key("billy")),
        vec![Operation::UpdateAttributes(BTreeMap::from([(
            SyncField::Lastname,
            "Flores".to_string()
        )]))]
    );
    assert_eq!(report.updated, 1);
}

#[test]
fn test_default_country_code_on_create() {
    let primary = RecordingConnector::default();
    let mut user = directory_user("billy", &[]);
    user.country = None;
    run(
        RuleOptions {
            default_country_code: Some("CA".to_string()),
            ..staff_options()
        },
        vec![user],
        &primary,
    )
    .unwrap();

    let created = primary.user(&key("billy")).unwrap();
    assert_eq!(created.attributes.country.as_deref(), Some("CA"));
}

#[test]
fn test_test_mode_submits_nothing() {
    let primary = RecordingConnector::with_users([target_user("stray", &["All Staff"])]);
    let report = run(
        RuleOptions {
            test_mode: true,
            adobe_only_user_action: vec!["remove".to_string()],
            ..staff_options()
        },
        vec![directory_user("billy", &["Staff"])],
        &primary,
    )
    .unwrap();

    assert!(primary.submitted().is_empty());
    assert!(report.test_mode);
    assert_eq!(report.created, 1);
    assert_eq!(report.strays_removed, 1);
}

#[test]
fn test_username_filter_leaves_user_unclaimed() {
    let primary = RecordingConnector::with_users([target_user("alice", &[])]);
    let report = run(
        RuleOptions {
            username_filter_regex: Some("^billy".to_string()),
            ..staff_options()
        },
        vec![directory_user("alice", &[]), directory_user("billy", &[])],
        &primary,
    )
    .unwrap();

    assert_eq!(report.directory_users_read, 2);
    assert_eq!(report.directory_users_selected, 1);
    assert_eq!(report.strays_found["primary"], 1);
    assert!(primary.submitted_for(&key("alice")).is_empty());
}

#[test]
fn test_submission_failure_is_isolated() {
    let primary = RecordingConnector::default();
    primary.fail_on(&key("billy"), "quota exceeded");
    let report = run(
        staff_options(),
        vec![directory_user("billy", &["Staff"]), directory_user("maria", &["Staff"])],
        &primary,
    )
    .unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, "SubmissionError");
    assert!(primary.user(&key("maria")).is_some());
}

#[test]
fn test_failed_operation_stops_remaining_ops_for_user() {
    let primary = RecordingConnector::with_users([target_user("billy", &["Old Group"])]);
    primary.fail_on(&key("billy"), "rejected");
    let report = run(
        staff_options(),
        vec![directory_user("billy", &["Staff"])],
        &primary,
    )
    .unwrap();

    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].message.starts_with("AddGroups for federatedID,billy@x.com,"));
}

#[test]
fn test_user_without_key_is_skipped() {
    let primary = RecordingConnector::default();
    let report = run(
        staff_options(),
        vec![DirectoryUser::default(), directory_user("billy", &[])],
        &primary,
    )
    .unwrap();

    assert_eq!(report.created, 1);
    insta::assert_json_snapshot!(report.errors, @r#"
    [
      {
        "kind": "AttributeFormatError",
        "message": "attribute format error for <unnamed>: record has neither a usable username nor an email"
      }
    ]
    "#);
}

#[test]
fn test_target_listing_failure_aborts() {
    let primary = RecordingConnector::default();
    primary.fail_listing("timeout");
    let err = run(staff_options(), vec![directory_user("billy", &[])], &primary).unwrap_err();
    assert!(matches!(err, SyncError::TargetUnavailable { .. }));
    assert!(primary.submitted().is_empty());
}

#[test]
fn test_processor_runs_once() {
    let primary = RecordingConnector::default();
    let connectors = UmapiConnectors::new(primary);
    let mut processor = RuleProcessor::new(staff_options()).unwrap();

    processor.run(Vec::new(), &connectors).unwrap();
    assert_eq!(processor.phase(), RunPhase::Done);
    assert!(matches!(
        processor.run(Vec::new(), &connectors),
        Err(SyncError::InvalidConfig(_))
    ));
}

#[test]
fn test_cancelled_run_skips_everything_left() {
    let primary = RecordingConnector::with_users([target_user("stray", &[])]);
    let connectors = UmapiConnectors::new(primary.clone());
    let mut processor = RuleProcessor::new(RuleOptions {
        adobe_only_user_action: vec!["delete".to_string()],
        ..staff_options()
    })
    .unwrap();

    let handle = processor.cancel_handle();
    handle.store(true, Ordering::SeqCst);
    let report = processor
        .run(vec![directory_user("billy", &["Staff"])], &connectors)
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.directory_users_read, 0);
    assert!(report.strays_found.is_empty());
    assert!(primary.submitted().is_empty());
}

#[test]
fn test_excluded_target_users_are_left_alone() {
    let primary = RecordingConnector::with_users([
        target_user("svc", &["Service Accounts"]),
        target_user("admin", &["Old Group"]),
    ]);
    let report = run(
        RuleOptions {
            exclude_groups: vec!["service accounts".to_string()],
            exclude_users: vec!["admin@.*".to_string()],
            adobe_only_user_action: vec!["remove".to_string()],
            ..staff_options()
        },
        vec![directory_user("admin", &["Staff"])],
        &primary,
    )
    .unwrap();

    assert!(primary.submitted().is_empty());
    assert_eq!(report.target_users_excluded, 2);
    assert_eq!(report.strays_found["primary"], 0);
}

#[test]
fn test_report_has_phase_timings() {
    let primary = RecordingConnector::default();
    let report = run(staff_options(), vec![directory_user("billy", &[])], &primary).unwrap();
    assert!(report.phase_ms.contains_key("Init"));
    assert!(report.phase_ms.contains_key("Submitting"));
    assert!(report.phase_ms.contains_key("StrayDisposition"));
}

#[test]
fn test_duplicate_directory_records_sync_once() {
    let primary = RecordingConnector::default();
    let report = run(
        staff_options(),
        vec![directory_user("billy", &["Staff"]), directory_user("Billy", &["Former"])],
        &primary,
    )
    .unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(
        primary.user(&key("billy")).unwrap().groups,
        groups(&["All Staff", "Old Group"])
    );
}
